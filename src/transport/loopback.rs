use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
  },
  time::Duration,
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{Frame, FrameSink, FrameSource, RoutingKey, RxHandler, TransportError};

/// In-process frame bus.
///
/// Frames submitted through the sink side are dispatched synchronously, on
/// the sender's thread, to every handler registered for the frame's key.
/// That makes the receive path run in "driver context" exactly like a real
/// interrupt-driven transport, so bridge code exercised against the loopback
/// obeys the same rules it would on hardware. Handlers must not send on the
/// same bus from within the callback.
///
/// `jam` simulates a saturated transmit queue for failure-policy tests.
pub struct LoopbackBus {
  handlers: Mutex<HashMap<u16, Vec<RxHandler>>>,
  jammed: AtomicBool,
}

impl LoopbackBus {
  pub fn new() -> Self {
    LoopbackBus {
      handlers: Mutex::new(HashMap::new()),
      jammed: AtomicBool::new(false),
    }
  }

  /// While jammed, every `send` fails with [`TransportError::Busy`].
  pub fn jam(&self, on: bool) {
    self.jammed.store(on, Ordering::SeqCst);
  }
}

impl Default for LoopbackBus {
  fn default() -> Self {
    Self::new()
  }
}

impl FrameSink for LoopbackBus {
  fn send(&self, frame: Frame, _timeout: Duration) -> Result<(), TransportError> {
    if self.jammed.load(Ordering::SeqCst) {
      return Err(TransportError::Busy);
    }
    let handlers = self.handlers.lock().unwrap();
    match handlers.get(&frame.key.raw()) {
      Some(receivers) => {
        for handler in receivers {
          handler(&frame);
        }
      }
      None => trace!("no receiver registered for {}", frame.key),
    }
    Ok(())
  }
}

impl FrameSource for LoopbackBus {
  fn register_rx(&self, key: RoutingKey, handler: RxHandler) {
    self
      .handlers
      .lock()
      .unwrap()
      .entry(key.raw())
      .or_default()
      .push(handler);
  }

  fn unregister_rx(&self, key: RoutingKey) {
    self.handlers.lock().unwrap().remove(&key.raw());
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  };

  use bytes::Bytes;

  use super::*;
  use crate::transport::TrafficClass;

  fn frame(key: RoutingKey, body: &[u8]) -> Frame {
    Frame {
      key,
      class: TrafficClass::Soft,
      payload: Bytes::copy_from_slice(body),
    }
  }

  #[test]
  fn frames_reach_only_matching_handlers() {
    let bus = LoopbackBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    bus.register_rx(
      RoutingKey::new(1, 7),
      Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
      }),
    );

    bus.send(frame(RoutingKey::new(1, 7), &[1]), Duration::ZERO).unwrap();
    bus.send(frame(RoutingKey::new(2, 7), &[2]), Duration::ZERO).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn jammed_bus_rejects_sends() {
    let bus = LoopbackBus::new();
    bus.jam(true);
    assert_eq!(
      bus.send(frame(RoutingKey::new(1, 1), &[]), Duration::ZERO),
      Err(TransportError::Busy)
    );
    bus.jam(false);
    assert!(bus.send(frame(RoutingKey::new(1, 1), &[]), Duration::ZERO).is_ok());
  }

  #[test]
  fn unregister_silences_handler() {
    let bus = LoopbackBus::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let key = RoutingKey::new(3, 3);
    bus.register_rx(
      key,
      Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
      }),
    );
    bus.unregister_rx(key);
    bus.send(frame(key, &[9]), Duration::ZERO).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
  }
}
