use std::{fmt, sync::Arc};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  message::Message,
  pool::SampleMut,
  topic::{PubState, TopicHub},
};

/// Publishing endpoint for one topic.
///
/// The publish cycle is allocate, fill, broadcast: `alloc` takes a buffer
/// from the publisher's own fixed pool, the application writes the payload in
/// place, and `broadcast` fans the same buffer out to every subscriber
/// without copying. Handles are cheap to clone and share one pool.
pub struct Publisher<M: Message> {
  state: Arc<PubState<M>>,
  hub: Arc<TopicHub<M>>,
}

impl<M: Message> Publisher<M> {
  pub(crate) fn from_parts(state: Arc<PubState<M>>, hub: Arc<TopicHub<M>>) -> Self {
    Publisher { state, hub }
  }

  pub fn topic(&self) -> &str {
    self.hub.name()
  }

  /// A writable buffer initialized to `M::default()`, or `None` when every
  /// buffer of this publisher is still in flight. Skip the sample and try
  /// again later; the pool refills as subscribers release.
  pub fn alloc(&self) -> Option<SampleMut<M>> {
    let sample = self.state.pool.alloc();
    if sample.is_none() {
      trace!("`{}`: buffer pool exhausted", self.hub.name());
    }
    sample
  }

  /// Delivers the buffer to every subscriber of the topic, local and remote.
  /// Returns how many accepted it; saturated subscribers and rejected
  /// transport submissions are skipped silently.
  pub fn broadcast(&self, sample: SampleMut<M>) -> usize {
    self.hub.broadcast(sample)
  }

  /// Buffers currently available to `alloc`.
  pub fn free_buffers(&self) -> usize {
    self.state.pool.free()
  }

  pub fn pool_capacity(&self) -> usize {
    self.state.pool.capacity()
  }

  pub(crate) fn hub(&self) -> &Arc<TopicHub<M>> {
    &self.hub
  }
}

impl<M: Message> fmt::Debug for Publisher<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Publisher")
      .field("topic", &self.topic())
      .field("free_buffers", &self.free_buffers())
      .finish()
  }
}

impl<M: Message> Clone for Publisher<M> {
  fn clone(&self) -> Self {
    Publisher {
      state: Arc::clone(&self.state),
      hub: Arc::clone(&self.hub),
    }
  }
}
