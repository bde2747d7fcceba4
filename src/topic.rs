use std::{
  fmt,
  sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
  },
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  message::Message,
  pool::{BufferPool, Sample, SampleMut},
  queue::SubQueue,
  signal::WakeSignal,
};

pub(crate) type EndpointId = u32;

static NEXT_ENDPOINT: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_endpoint_id() -> EndpointId {
  NEXT_ENDPOINT.fetch_add(1, Ordering::Relaxed)
}

pub(crate) type SubCallback<M> = Box<dyn Fn(&M) + Send + Sync>;

/// Subscriber-side endpoint record, shared between the topic hub (enqueue),
/// the owning node (drain, teardown) and the user-facing handle (get).
pub(crate) struct SubState<M: Message> {
  pub(crate) id: EndpointId,
  pub(crate) queue: SubQueue<M>,
  pub(crate) callback: Option<SubCallback<M>>,
  pub(crate) signal: Arc<WakeSignal>,
}

/// Publisher-side endpoint record. The pool belongs to the publisher; its
/// capacity bounds that publisher's in-flight messages.
pub(crate) struct PubState<M: Message> {
  pub(crate) id: EndpointId,
  pub(crate) pool: BufferPool<M>,
}

/// An outbound bridge attached to a topic. `forward` is called from the
/// broadcast walk and must not block for long; a false return means the frame
/// was dropped and must not count as a delivery.
pub(crate) trait RemoteLink<M: Message>: Send + Sync {
  fn id(&self) -> EndpointId;
  fn forward(&self, sample: &Sample<M>) -> bool;
}

struct HubLists<M: Message> {
  publishers: Vec<Arc<PubState<M>>>,
  subscribers: Vec<Arc<SubState<M>>>,
  remotes: Vec<Arc<dyn RemoteLink<M>>>,
}

/// Per-topic fan-out record: the endpoint lists and the broadcast algorithm.
///
/// One mutex guards the lists and is held for the whole broadcast walk, so a
/// publisher's messages are enqueued in call order everywhere (per-subscriber
/// FIFO). Individual queues have their own short locks for dequeue.
pub(crate) struct TopicHub<M: Message> {
  name: String,
  lists: Mutex<HubLists<M>>,
}

impl<M: Message> TopicHub<M> {
  pub(crate) fn new(name: &str) -> Self {
    TopicHub {
      name: name.to_string(),
      lists: Mutex::new(HubLists {
        publishers: Vec::new(),
        subscribers: Vec::new(),
        remotes: Vec::new(),
      }),
    }
  }

  pub(crate) fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn link_publisher(&self, state: Arc<PubState<M>>) {
    self.lists.lock().unwrap().publishers.push(state);
  }

  pub(crate) fn unlink_publisher(&self, id: EndpointId) {
    self.lists.lock().unwrap().publishers.retain(|p| p.id != id);
  }

  pub(crate) fn link_subscriber(&self, state: Arc<SubState<M>>) {
    self.lists.lock().unwrap().subscribers.push(state);
  }

  /// Unlinks the subscriber and releases every buffer its queue still holds.
  pub(crate) fn unlink_subscriber(&self, id: EndpointId) {
    let mut lists = self.lists.lock().unwrap();
    if let Some(pos) = lists.subscribers.iter().position(|s| s.id == id) {
      let state = lists.subscribers.remove(pos);
      state.queue.clear();
    }
  }

  pub(crate) fn link_remote(&self, link: Arc<dyn RemoteLink<M>>) {
    self.lists.lock().unwrap().remotes.push(link);
  }

  pub(crate) fn unlink_remote(&self, id: EndpointId) {
    self.lists.lock().unwrap().remotes.retain(|r| r.id() != id);
  }

  pub(crate) fn first_publisher(&self) -> Option<Arc<PubState<M>>> {
    self.lists.lock().unwrap().publishers.first().cloned()
  }

  /// Fans the buffer out to every subscriber of the topic.
  ///
  /// Local subscribers get a cloned handle into their queue (refcount +1 per
  /// accepted delivery) and their node is woken; remote links serialize and
  /// submit. A full queue or rejected submission drops that one delivery and
  /// leaves the rest alone. The publisher's own reference is released when
  /// the walk is done, so a message nobody accepted is freed right here.
  pub(crate) fn broadcast(&self, sample: SampleMut<M>) -> usize {
    let sample = sample.into_shared();
    let lists = self.lists.lock().unwrap();
    let mut delivered = 0;
    for sub in &lists.subscribers {
      if sub.queue.try_push(&sample) {
        delivered += 1;
        sub.signal.notify();
      } else {
        trace!("`{}`: subscriber queue full, message dropped", self.name);
      }
    }
    for remote in &lists.remotes {
      if remote.forward(&sample) {
        delivered += 1;
      }
    }
    delivered
  }
}

impl<M: Message> fmt::Debug for TopicHub<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TopicHub")
      .field("name", &self.name)
      .finish_non_exhaustive()
  }
}
