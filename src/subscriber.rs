use std::{fmt, sync::Arc};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  message::Message,
  pool::Sample,
  topic::{SubState, TopicHub},
};

/// Subscribing endpoint for one topic.
///
/// Messages wait in a bounded FIFO until fetched with [`get`](Self::get) (or,
/// for callback subscribers, until the owning node's `spin` drains them).
/// Dropping the returned [`Sample`] releases the buffer back to the
/// publisher's pool; hold it as long as the data is needed.
pub struct Subscriber<M: Message> {
  state: Arc<SubState<M>>,
  hub: Arc<TopicHub<M>>,
}

impl<M: Message> Subscriber<M> {
  pub(crate) fn from_parts(state: Arc<SubState<M>>, hub: Arc<TopicHub<M>>) -> Self {
    Subscriber { state, hub }
  }

  pub fn topic(&self) -> &str {
    self.hub.name()
  }

  /// The oldest queued message, or `None` when the queue is empty. Never
  /// blocks.
  pub fn get(&self) -> Option<Sample<M>> {
    self.state.queue.pop()
  }

  /// Messages currently queued.
  pub fn queued(&self) -> usize {
    self.state.queue.len()
  }

  /// The queue depth chosen at subscription.
  pub fn depth(&self) -> usize {
    self.state.queue.depth()
  }
}

impl<M: Message> fmt::Debug for Subscriber<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscriber")
      .field("topic", &self.topic())
      .field("queued", &self.queued())
      .field("depth", &self.depth())
      .finish()
  }
}
