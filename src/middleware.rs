use std::{
  any::{Any, TypeId},
  sync::{Arc, Mutex, OnceLock, Weak},
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  error::BindError,
  message::{payload_size, Message},
  node::NodeState,
  publisher::Publisher,
  topic::TopicHub,
};

/// Upper bound on the number of distinct topics a registry will hold.
/// Topic records are created on first reference and never removed.
pub const MAX_TOPICS: usize = 32;

/// Topic names are short ASCII identifiers, like CAN mailbox labels.
pub const MAX_TOPIC_NAME: usize = 16;

// Name -> typed hub binding. The hub is stored type-erased; `type_id` is the
// payload type recorded at creation and guards every later downcast.
struct TopicRecord {
  name: String,
  payload_size: usize,
  type_id: TypeId,
  has_remote_publisher: bool,
  hub: Arc<dyn Any + Send + Sync>,
}

/// Process-wide topic registry.
///
/// Publishers and subscribers may bind in any order; whichever references a
/// topic first creates its record, and everyone later must agree on the
/// payload type and size. Most programs use the shared [`Middleware::instance`],
/// but independent registries can be constructed for tests or for hosting
/// several isolated buses in one process.
///
/// ```
/// use std::sync::Arc;
/// use canmw::{Middleware, Node};
///
/// #[derive(Default)]
/// struct Blink { pin: u8, on: bool }
///
/// let mw = Arc::new(Middleware::new());
/// let node = Node::with_middleware(mw.clone(), "demo");
/// // subscribing first is fine; the publisher shows up later
/// let sub = node.subscribe::<Blink>("led", 2).unwrap();
/// let publisher = node.advertise::<Blink>("led").unwrap();
///
/// let mut msg = publisher.alloc().unwrap();
/// msg.pin = 2;
/// msg.on = true;
/// assert_eq!(publisher.broadcast(msg), 1);
/// assert!(sub.get().is_some());
/// ```
pub struct Middleware {
  max_topics: usize,
  topics: Mutex<Vec<TopicRecord>>,
  nodes: Mutex<Vec<Weak<NodeState>>>,
}

impl Middleware {
  pub fn new() -> Self {
    Self::with_capacity(MAX_TOPICS)
  }

  /// A registry with a non-default topic-table bound.
  pub fn with_capacity(max_topics: usize) -> Self {
    assert!(max_topics > 0, "topic table cannot be empty");
    Middleware {
      max_topics,
      topics: Mutex::new(Vec::new()),
      nodes: Mutex::new(Vec::new()),
    }
  }

  /// The default process-wide registry, created on first use.
  pub fn instance() -> Arc<Middleware> {
    static INSTANCE: OnceLock<Arc<Middleware>> = OnceLock::new();
    INSTANCE.get_or_init(|| Arc::new(Middleware::new())).clone()
  }

  pub fn topic_count(&self) -> usize {
    self.topics.lock().unwrap().len()
  }

  /// Live nodes currently registered. Mostly for diagnostics shells.
  pub fn node_count(&self) -> usize {
    let mut nodes = self.nodes.lock().unwrap();
    nodes.retain(|n| n.strong_count() > 0);
    nodes.len()
  }

  /// Names of the live nodes, in registration order. This is what a status
  /// shell prints when asked to list the threads of the system.
  pub fn node_names(&self) -> Vec<String> {
    let mut nodes = self.nodes.lock().unwrap();
    nodes.retain(|n| n.strong_count() > 0);
    nodes
      .iter()
      .filter_map(|n| n.upgrade())
      .map(|state| state.name().to_string())
      .collect()
  }

  pub(crate) fn register_node(&self, state: &Arc<NodeState>) {
    let mut nodes = self.nodes.lock().unwrap();
    let handle = Arc::downgrade(state);
    if !nodes.iter().any(|n| Weak::ptr_eq(n, &handle)) {
      nodes.push(handle);
    }
  }

  pub(crate) fn unregister_node(&self, state: &Arc<NodeState>) {
    let handle = Arc::downgrade(state);
    self
      .nodes
      .lock()
      .unwrap()
      .retain(|n| !Weak::ptr_eq(n, &handle));
  }

  /// Finds or creates the topic record for `name` and returns its typed hub.
  pub(crate) fn bind_topic<M: Message>(&self, name: &str) -> Result<Arc<TopicHub<M>>, BindError> {
    validate_name(name)?;
    let mut topics = self.topics.lock().unwrap();
    match topics.iter().find(|r| r.name == name) {
      Some(record) => downcast_hub::<M>(record),
      None => {
        if topics.len() >= self.max_topics {
          warn!("cannot create topic `{}`: table full", name);
          return Err(BindError::TopicTableFull);
        }
        let hub = Arc::new(TopicHub::<M>::new(name));
        topics.push(TopicRecord {
          name: name.to_string(),
          payload_size: payload_size::<M>(),
          type_id: TypeId::of::<M>(),
          has_remote_publisher: false,
          hub: hub.clone(),
        });
        info!("topic `{}` created ({} byte payload)", name, payload_size::<M>());
        Ok(hub)
      }
    }
  }

  /// Like [`bind_topic`](Self::bind_topic), but also claims the topic's single
  /// remote-publisher slot.
  pub(crate) fn bind_remote_topic<M: Message>(
    &self,
    name: &str,
  ) -> Result<Arc<TopicHub<M>>, BindError> {
    validate_name(name)?;
    let mut topics = self.topics.lock().unwrap();
    if let Some(record) = topics.iter_mut().find(|r| r.name == name) {
      let hub = downcast_hub::<M>(record)?;
      if record.has_remote_publisher {
        return Err(BindError::DuplicateRemotePublisher(name.to_string()));
      }
      record.has_remote_publisher = true;
      return Ok(hub);
    }
    if topics.len() >= self.max_topics {
      warn!("cannot create topic `{}`: table full", name);
      return Err(BindError::TopicTableFull);
    }
    let hub = Arc::new(TopicHub::<M>::new(name));
    topics.push(TopicRecord {
      name: name.to_string(),
      payload_size: payload_size::<M>(),
      type_id: TypeId::of::<M>(),
      has_remote_publisher: true,
      hub: hub.clone(),
    });
    info!("topic `{}` created by inbound bridge", name);
    Ok(hub)
  }

  /// Frees the remote-publisher slot when an inbound bridge is torn down.
  pub(crate) fn clear_remote_publisher(&self, name: &str) {
    if let Some(record) = self
      .topics
      .lock()
      .unwrap()
      .iter_mut()
      .find(|r| r.name == name)
    {
      record.has_remote_publisher = false;
    }
  }

  /// A handle to the first local publisher of `name`, if any. This is how an
  /// outbound bridge locates the publisher it should shadow.
  pub fn find_local_publisher<M: Message>(&self, name: &str) -> Option<Publisher<M>> {
    let topics = self.topics.lock().unwrap();
    let record = topics.iter().find(|r| r.name == name)?;
    let hub = record.hub.clone().downcast::<TopicHub<M>>().ok()?;
    let state = hub.first_publisher()?;
    Some(Publisher::from_parts(state, hub))
  }
}

impl Default for Middleware {
  fn default() -> Self {
    Self::new()
  }
}

fn validate_name(name: &str) -> Result<(), BindError> {
  if name.is_empty() || name.len() > MAX_TOPIC_NAME || !name.is_ascii() {
    return Err(BindError::BadTopicName(name.to_string()));
  }
  Ok(())
}

fn downcast_hub<M: Message>(record: &TopicRecord) -> Result<Arc<TopicHub<M>>, BindError> {
  if record.payload_size != payload_size::<M>() {
    return Err(BindError::SizeMismatch {
      topic: record.name.clone(),
      expected: record.payload_size,
      requested: payload_size::<M>(),
    });
  }
  if record.type_id != TypeId::of::<M>() {
    return Err(BindError::TypeMismatch(record.name.clone()));
  }
  let hub = record
    .hub
    .clone()
    .downcast::<TopicHub<M>>()
    .expect("topic record type verified");
  Ok(hub)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Small(u16);
  #[derive(Default)]
  struct AlsoSmall(u16);
  #[derive(Default)]
  struct Wide(u64);

  #[test]
  fn rebinding_same_type_reuses_record() {
    let mw = Middleware::new();
    let a = mw.bind_topic::<Small>("imu").unwrap();
    let b = mw.bind_topic::<Small>("imu").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(mw.topic_count(), 1);
  }

  #[test]
  fn size_mismatch_is_refused_and_leaves_topic_alone() {
    let mw = Middleware::new();
    mw.bind_topic::<Small>("imu").unwrap();
    let err = mw.bind_topic::<Wide>("imu").unwrap_err();
    assert_eq!(
      err,
      BindError::SizeMismatch {
        topic: "imu".into(),
        expected: 2,
        requested: 8,
      }
    );
    // original binding still works
    assert!(mw.bind_topic::<Small>("imu").is_ok());
  }

  #[test]
  fn same_size_different_type_is_refused() {
    let mw = Middleware::new();
    mw.bind_topic::<Small>("imu").unwrap();
    assert_eq!(
      mw.bind_topic::<AlsoSmall>("imu").unwrap_err(),
      BindError::TypeMismatch("imu".into())
    );
  }

  #[test]
  fn table_bound_is_enforced() {
    let mw = Middleware::with_capacity(2);
    mw.bind_topic::<Small>("a").unwrap();
    mw.bind_topic::<Small>("b").unwrap();
    assert_eq!(mw.bind_topic::<Small>("c").unwrap_err(), BindError::TopicTableFull);
    // existing topics still reachable when the table is full
    assert!(mw.bind_topic::<Small>("a").is_ok());
  }

  #[test]
  fn bad_names_are_refused() {
    let mw = Middleware::new();
    assert!(matches!(
      mw.bind_topic::<Small>(""),
      Err(BindError::BadTopicName(_))
    ));
    assert!(matches!(
      mw.bind_topic::<Small>("name-way-too-long-for-a-topic"),
      Err(BindError::BadTopicName(_))
    ));
    assert!(matches!(
      mw.bind_topic::<Small>("n\u{f8}n-ascii"),
      Err(BindError::BadTopicName(_))
    ));
  }

  #[test]
  fn remote_publisher_slot_is_exclusive() {
    let mw = Middleware::new();
    mw.bind_remote_topic::<Small>("gps").unwrap();
    assert_eq!(
      mw.bind_remote_topic::<Small>("gps").unwrap_err(),
      BindError::DuplicateRemotePublisher("gps".into())
    );
    mw.clear_remote_publisher("gps");
    assert!(mw.bind_remote_topic::<Small>("gps").is_ok());
  }
}
