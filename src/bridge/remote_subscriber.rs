use std::{
  fmt,
  marker::PhantomData,
  sync::{Arc, Mutex},
  time::Duration,
};

use bytes::Bytes;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{checked_wire_size, encode, WireMessage, DEFAULT_SEND_TIMEOUT};
use crate::{
  error::BindError,
  pool::Sample,
  publisher::Publisher,
  topic::{next_endpoint_id, EndpointId, RemoteLink, TopicHub},
  transport::{Frame, FrameSink, RoutingKey, TrafficClass, MAX_FRAME_PAYLOAD},
};

// The piece that actually hangs off the topic. Forward runs inside the
// broadcast walk: encode, submit, report success. Any transport refusal
// drops this one frame; local subscribers already have the message.
struct OutboundLink<M: WireMessage> {
  id: EndpointId,
  key: RoutingKey,
  class: TrafficClass,
  timeout: Duration,
  sink: Arc<dyn FrameSink>,
  _payload: PhantomData<fn(&M)>,
}

impl<M: WireMessage> RemoteLink<M> for OutboundLink<M> {
  fn id(&self) -> EndpointId {
    self.id
  }

  fn forward(&self, sample: &Sample<M>) -> bool {
    // Hold a reference for the whole submission, mirroring the refcount
    // contract local queues follow.
    let held = sample.clone();
    let body = match encode(&*held) {
      Ok(body) => body,
      Err(e) => {
        error!("{}: encode failed: {e}", self.key);
        return false;
      }
    };
    if body.len() > MAX_FRAME_PAYLOAD {
      warn!("{}: {}-byte payload exceeds frame limit, dropped", self.key, body.len());
      return false;
    }
    let frame = Frame {
      key: self.key,
      class: self.class,
      payload: Bytes::from(body),
    };
    match self.sink.send(frame, self.timeout) {
      Ok(()) => true,
      Err(e) => {
        debug!("{}: frame dropped: {e}", self.key);
        false
      }
    }
  }
}

struct Attachment<M: WireMessage> {
  hub: Arc<TopicHub<M>>,
  link_id: EndpointId,
}

/// Outbound bridge: forwards a locally published topic onto the bus.
///
/// Attach it to a local publisher (usually found through
/// [`Middleware::find_local_publisher`](crate::Middleware::find_local_publisher));
/// from then on every broadcast on that topic is also encoded into a frame
/// keyed by this bridge's [`RoutingKey`] and submitted to the driver.
/// Frames the driver refuses are dropped; delivery to local subscribers is
/// never affected. Frames for one (source, topic) pair leave in broadcast
/// order.
pub struct RemoteSubscriber<M: WireMessage> {
  key: RoutingKey,
  class: TrafficClass,
  timeout: Duration,
  sink: Arc<dyn FrameSink>,
  attachment: Mutex<Option<Attachment<M>>>,
}

impl<M: WireMessage> RemoteSubscriber<M> {
  pub fn new(key: RoutingKey, sink: Arc<dyn FrameSink>) -> Self {
    RemoteSubscriber {
      key,
      class: TrafficClass::default(),
      timeout: DEFAULT_SEND_TIMEOUT,
      sink,
      attachment: Mutex::new(None),
    }
  }

  /// Selects the traffic class frames are submitted under. Soft real-time by
  /// default.
  pub fn with_class(mut self, class: TrafficClass) -> Self {
    self.class = class;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn key(&self) -> RoutingKey {
    self.key
  }

  /// Links this bridge into the publisher's topic. Verifies once that the
  /// payload type fits a transport frame. Attaching twice is a no-op.
  pub fn attach(&self, publisher: &Publisher<M>) -> Result<(), BindError> {
    checked_wire_size::<M>()?;
    let mut attachment = self.attachment.lock().unwrap();
    if attachment.is_some() {
      return Ok(());
    }
    let link = Arc::new(OutboundLink::<M> {
      id: next_endpoint_id(),
      key: self.key,
      class: self.class,
      timeout: self.timeout,
      sink: Arc::clone(&self.sink),
      _payload: PhantomData,
    });
    let hub = Arc::clone(publisher.hub());
    hub.link_remote(link.clone());
    info!("topic `{}` now forwarded to bus as {}", hub.name(), self.key);
    *attachment = Some(Attachment {
      hub,
      link_id: link.id,
    });
    Ok(())
  }

  /// Stops forwarding. Dropping the bridge does the same.
  pub fn detach(&self) {
    if let Some(attachment) = self.attachment.lock().unwrap().take() {
      attachment.hub.unlink_remote(attachment.link_id);
      debug!("topic `{}` no longer forwarded as {}", attachment.hub.name(), self.key);
    }
  }
}

impl<M: WireMessage> fmt::Debug for RemoteSubscriber<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RemoteSubscriber")
      .field("key", &self.key)
      .field("class", &self.class)
      .finish()
  }
}

impl<M: WireMessage> Drop for RemoteSubscriber<M> {
  fn drop(&mut self) {
    self.detach();
  }
}
