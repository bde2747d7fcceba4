use std::sync::{Arc, Mutex, Weak};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  error::BindError,
  message::Message,
  middleware::Middleware,
  pool::{BufferPool, DEFAULT_POOL_CAPACITY},
  publisher::Publisher,
  queue::SubQueue,
  signal::WakeSignal,
  subscriber::Subscriber,
  topic::{next_endpoint_id, EndpointId, PubState, SubCallback, SubState, TopicHub},
};

pub(crate) struct NodeState {
  name: String,
  pub(crate) signal: Arc<WakeSignal>,
  endpoints: Mutex<Vec<Box<dyn NodeEndpoint>>>,
}

impl NodeState {
  pub(crate) fn name(&self) -> &str {
    &self.name
  }
}

// What the node needs from each endpoint it owns: unhook it from its topic on
// teardown, and run its callback drain during spin.
trait NodeEndpoint: Send {
  fn detach(&self);
  fn dispatch(&self);
}

struct PubEndpoint<M: Message> {
  id: EndpointId,
  hub: Arc<TopicHub<M>>,
}

impl<M: Message> NodeEndpoint for PubEndpoint<M> {
  fn detach(&self) {
    self.hub.unlink_publisher(self.id);
  }

  fn dispatch(&self) {}
}

struct SubEndpoint<M: Message> {
  state: Arc<SubState<M>>,
  hub: Arc<TopicHub<M>>,
}

impl<M: Message> NodeEndpoint for SubEndpoint<M> {
  fn detach(&self) {
    self.hub.unlink_subscriber(self.state.id);
  }

  fn dispatch(&self) {
    if let Some(callback) = &self.state.callback {
      while let Some(sample) = self.state.queue.pop() {
        callback(&sample);
      }
    }
  }
}

/// A thread-local group of endpoints sharing one wake event.
///
/// Every publisher and subscriber is created through a node; dropping the
/// node unlinks them all from their topics and releases any buffers still
/// sitting in subscriber queues.
///
/// ```
/// use std::sync::Arc;
/// use canmw::{Middleware, Node};
///
/// let mw = Arc::new(Middleware::new());
/// let node = Node::with_middleware(mw, "sensors");
/// let publisher = node.advertise::<u32>("ticks").unwrap();
/// let sub = node.subscribe::<u32>("ticks", 5).unwrap();
///
/// let mut tick = publisher.alloc().unwrap();
/// *tick = 42;
/// publisher.broadcast(tick);
/// assert_eq!(*sub.get().unwrap(), 42);
/// ```
pub struct Node {
  mw: Arc<Middleware>,
  state: Arc<NodeState>,
}

impl Node {
  /// A node on the default process-wide [`Middleware::instance`].
  pub fn new(name: &str) -> Node {
    Node::with_middleware(Middleware::instance(), name)
  }

  /// A node on an explicitly provided registry.
  pub fn with_middleware(mw: Arc<Middleware>, name: &str) -> Node {
    let state = Arc::new(NodeState {
      name: name.to_string(),
      signal: Arc::new(WakeSignal::new()),
      endpoints: Mutex::new(Vec::new()),
    });
    mw.register_node(&state);
    debug!("node `{}` registered", name);
    Node { mw, state }
  }

  /// The name this node was registered under; it is what
  /// [`Middleware::node_names`] reports.
  pub fn name(&self) -> &str {
    self.state.name()
  }

  pub fn middleware(&self) -> &Arc<Middleware> {
    &self.mw
  }

  /// Creates a publisher on `topic` with the default pool capacity.
  pub fn advertise<M: Message>(&self, topic: &str) -> Result<Publisher<M>, BindError> {
    self.advertise_with_pool(topic, DEFAULT_POOL_CAPACITY)
  }

  /// Creates a publisher with an explicit in-flight buffer budget.
  pub fn advertise_with_pool<M: Message>(
    &self,
    topic: &str,
    pool_capacity: usize,
  ) -> Result<Publisher<M>, BindError> {
    let hub = self.mw.bind_topic::<M>(topic)?;
    let state = Arc::new(PubState {
      id: next_endpoint_id(),
      pool: BufferPool::with_capacity(pool_capacity),
    });
    hub.link_publisher(state.clone());
    self.track(Box::new(PubEndpoint {
      id: state.id,
      hub: hub.clone(),
    }));
    debug!("node `{}` advertises `{}`", self.state.name, topic);
    Ok(Publisher::from_parts(state, hub))
  }

  /// Creates a subscriber that buffers up to `depth` messages for [`Subscriber::get`].
  ///
  /// Subscribing to a topic nobody publishes yet is fine; messages start
  /// arriving once a publisher appears.
  pub fn subscribe<M: Message>(&self, topic: &str, depth: usize) -> Result<Subscriber<M>, BindError> {
    self.subscribe_inner(topic, depth, None)
  }

  /// Creates a subscriber whose queue is drained by [`Node::spin`], invoking
  /// `callback` for every message.
  pub fn subscribe_with_callback<M, F>(
    &self,
    topic: &str,
    depth: usize,
    callback: F,
  ) -> Result<Subscriber<M>, BindError>
  where
    M: Message,
    F: Fn(&M) + Send + Sync + 'static,
  {
    self.subscribe_inner(topic, depth, Some(Box::new(callback)))
  }

  fn subscribe_inner<M: Message>(
    &self,
    topic: &str,
    depth: usize,
    callback: Option<SubCallback<M>>,
  ) -> Result<Subscriber<M>, BindError> {
    let hub = self.mw.bind_topic::<M>(topic)?;
    let state = Arc::new(SubState {
      id: next_endpoint_id(),
      queue: SubQueue::new(depth),
      callback,
      signal: self.state.signal.clone(),
    });
    hub.link_subscriber(state.clone());
    self.track(Box::new(SubEndpoint {
      state: state.clone(),
      hub: hub.clone(),
    }));
    debug!("node `{}` subscribes to `{}` (depth {})", self.state.name, topic, depth);
    Ok(Subscriber::from_parts(state, hub))
  }

  /// Blocks until a message lands in any of this node's subscriber queues,
  /// then drains every callback-bearing subscriber. Subscribers without a
  /// callback keep their messages queued for [`Subscriber::get`].
  ///
  /// Returns false once the node has been shut down. Performs no allocation.
  pub fn spin(&self) -> bool {
    if !self.state.signal.wait() {
      return false;
    }
    let endpoints = self.state.endpoints.lock().unwrap();
    for endpoint in endpoints.iter() {
      endpoint.dispatch();
    }
    true
  }

  /// A handle that can interrupt [`Node::spin`] from another thread.
  pub fn shutdown_handle(&self) -> ShutdownHandle {
    ShutdownHandle {
      state: Arc::downgrade(&self.state),
    }
  }

  fn track(&self, endpoint: Box<dyn NodeEndpoint>) {
    self.state.endpoints.lock().unwrap().push(endpoint);
  }
}

impl Drop for Node {
  fn drop(&mut self) {
    self.mw.unregister_node(&self.state);
    let mut endpoints = self.state.endpoints.lock().unwrap();
    for endpoint in endpoints.drain(..) {
      endpoint.detach();
    }
    drop(endpoints);
    self.state.signal.terminate();
    debug!("node `{}` unregistered", self.state.name);
  }
}

/// Unblocks a node's `spin` loop from outside the owning thread. Holding one
/// does not keep the node alive.
pub struct ShutdownHandle {
  state: Weak<NodeState>,
}

impl ShutdownHandle {
  pub fn shutdown(&self) {
    if let Some(state) = self.state.upgrade() {
      state.signal.terminate();
    }
  }
}
