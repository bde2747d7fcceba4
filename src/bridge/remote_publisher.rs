use std::{
  fmt,
  sync::{
    mpsc::{sync_channel, SyncSender},
    Arc,
  },
  thread,
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{checked_wire_size, decode, WireMessage};
use crate::{
  error::BindError,
  middleware::Middleware,
  pool::{BufferPool, SampleMut, DEFAULT_POOL_CAPACITY},
  transport::{Frame, FrameSource, RoutingKey},
};

/// Inbound bridge: re-publishes a topic that originates on another node.
///
/// It claims the topic's single remote-publisher slot, registers a receive
/// callback for its [`RoutingKey`], and broadcasts every decoded frame
/// through the same path a local publisher uses, out of its own buffer pool.
///
/// The receive callback runs in driver context, so it only allocates a
/// buffer, decodes into it, and posts it to a bounded mailbox; a dedicated
/// worker thread performs the broadcast, where taking topic locks is safe.
/// A burst that outruns the worker drops frames at the mailbox, and an empty
/// pool drops them even earlier; size the pool for the worst burst the bus
/// can deliver.
pub struct RemotePublisher<M: WireMessage> {
  mw: Arc<Middleware>,
  topic: String,
  key: RoutingKey,
  pool: BufferPool<M>,
  source: Arc<dyn FrameSource>,
  mailbox: Option<SyncSender<SampleMut<M>>>,
  worker: Option<thread::JoinHandle<()>>,
}

impl<M: WireMessage> RemotePublisher<M> {
  /// Claims `topic` on `mw` and starts decoding frames keyed `key` from
  /// `source`. Fails if the topic already has a remote publisher, disagrees
  /// on payload type, or does not fit a frame.
  pub fn advertise(
    mw: &Arc<Middleware>,
    topic: &str,
    key: RoutingKey,
    source: &Arc<dyn FrameSource>,
  ) -> Result<Self, BindError> {
    Self::advertise_with_pool(mw, topic, key, source, DEFAULT_POOL_CAPACITY)
  }

  /// Like [`advertise`](Self::advertise) with an explicit pool capacity: the
  /// most frames that can be in flight between the bus and the local
  /// subscribers.
  pub fn advertise_with_pool(
    mw: &Arc<Middleware>,
    topic: &str,
    key: RoutingKey,
    source: &Arc<dyn FrameSource>,
    pool_capacity: usize,
  ) -> Result<Self, BindError> {
    checked_wire_size::<M>()?;
    let hub = mw.bind_remote_topic::<M>(topic)?;
    let pool = BufferPool::with_capacity(pool_capacity);
    let (mailbox, deliveries) = sync_channel::<SampleMut<M>>(pool_capacity);

    let worker_hub = hub.clone();
    let worker = thread::Builder::new()
      .name(format!("canmw-rx-{topic}"))
      .spawn(move || {
        // Broadcasts happen here, never in the driver callback.
        while let Ok(sample) = deliveries.recv() {
          let n = worker_hub.broadcast(sample);
          trace!("`{}`: inbound frame delivered {} times", worker_hub.name(), n);
        }
      })
      .expect("cannot spawn bridge worker thread");

    let rx_pool = pool.clone();
    let rx_mailbox = mailbox.clone();
    let rx_topic = topic.to_string();
    source.register_rx(
      key,
      Box::new(move |frame: &Frame| {
        let Some(mut sample) = rx_pool.alloc() else {
          trace!("`{rx_topic}`: pool exhausted, frame dropped");
          return;
        };
        match decode::<M>(frame.payload.as_ref()) {
          Ok(value) => *sample = value,
          Err(e) => {
            warn!("`{rx_topic}`: undecodable frame from {}: {e}", frame.key);
            return;
          }
        }
        if rx_mailbox.try_send(sample).is_err() {
          trace!("`{rx_topic}`: mailbox full, frame dropped");
        }
      }),
    );
    info!("topic `{topic}` now fed from bus key {key}");

    Ok(RemotePublisher {
      mw: mw.clone(),
      topic: topic.to_string(),
      key,
      pool,
      source: source.clone(),
      mailbox: Some(mailbox),
      worker: Some(worker),
    })
  }

  pub fn topic(&self) -> &str {
    &self.topic
  }

  pub fn key(&self) -> RoutingKey {
    self.key
  }

  /// Buffers currently free in the decode pool.
  pub fn free_buffers(&self) -> usize {
    self.pool.free()
  }
}

impl<M: WireMessage> fmt::Debug for RemotePublisher<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RemotePublisher")
      .field("topic", &self.topic)
      .field("key", &self.key)
      .finish()
  }
}

impl<M: WireMessage> Drop for RemotePublisher<M> {
  fn drop(&mut self) {
    self.source.unregister_rx(self.key);
    // Closing the mailbox stops the worker once it drains.
    self.mailbox.take();
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
    self.mw.clear_remote_publisher(&self.topic);
    debug!("inbound bridge for `{}` torn down", self.topic);
  }
}
