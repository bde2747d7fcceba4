//! The seam between the middleware and a CAN-class driver.
//!
//! The core never talks to hardware. Outbound bridges hand [`Frame`]s to a
//! [`FrameSink`]; inbound bridges register per-key callbacks with a
//! [`FrameSource`]. A real RTCAN driver implements both; [`LoopbackBus`]
//! implements them in-process for tests and demos.

use std::{fmt, time::Duration};

use bytes::Bytes;

pub use crate::error::TransportError;

mod loopback;
pub use loopback::LoopbackBus;

/// Hard upper bound on a frame body. Larger payloads must be fragmented by a
/// higher layer, which this crate does not provide; the bridge refuses to
/// bind such topics instead.
pub const MAX_FRAME_PAYLOAD: usize = 64;

/// Transport routing key: `source_node_id << 8 | topic_id`.
///
/// Both halves matter. Keying frames by topic id alone collides as soon as
/// two nodes bridge the same topic, so the compound form is mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutingKey(u16);

impl RoutingKey {
  pub const fn new(source_node: u8, topic: u8) -> Self {
    RoutingKey((source_node as u16) << 8 | topic as u16)
  }

  pub const fn from_raw(raw: u16) -> Self {
    RoutingKey(raw)
  }

  pub const fn raw(&self) -> u16 {
    self.0
  }

  pub const fn source_node(&self) -> u8 {
    (self.0 >> 8) as u8
  }

  pub const fn topic(&self) -> u8 {
    (self.0 & 0xff) as u8
  }
}

impl fmt::Display for RoutingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02x}:{:02x}", self.source_node(), self.topic())
  }
}

/// Traffic class the driver schedules the frame under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrafficClass {
  /// Hard real-time: missing the deadline is a fault.
  Hard,
  /// Soft real-time: late frames lose value but are still scheduled.
  #[default]
  Soft,
  /// Whatever bandwidth is left over.
  BestEffort,
}

/// One transport message: routing key, traffic class, encoded body.
#[derive(Debug, Clone)]
pub struct Frame {
  pub key: RoutingKey,
  pub class: TrafficClass,
  pub payload: Bytes,
}

/// Outbound half of a driver. `send` returns once the frame is accepted for
/// transmission (or rejected); it must not block past `timeout`.
pub trait FrameSink: Send + Sync {
  fn send(&self, frame: Frame, timeout: Duration) -> Result<(), TransportError>;
}

/// Receive callback. Runs in driver context: it must not block and must not
/// take middleware locks. Inbound bridges only decode and hand off here.
pub type RxHandler = Box<dyn Fn(&Frame) + Send + Sync>;

/// Inbound half of a driver: routes received frames by exact key match.
///
/// `unregister_rx` must drop the handlers registered for `key`, not merely
/// stop calling them; bridge teardown relies on the resources a handler
/// captures being released.
pub trait FrameSource: Send + Sync {
  fn register_rx(&self, key: RoutingKey, handler: RxHandler);
  fn unregister_rx(&self, key: RoutingKey);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn routing_key_packs_node_and_topic() {
    let key = RoutingKey::new(0x12, 0x34);
    assert_eq!(key.raw(), 0x1234);
    assert_eq!(key.source_node(), 0x12);
    assert_eq!(key.topic(), 0x34);
    assert_eq!(RoutingKey::from_raw(0x1234), key);
  }

  #[test]
  fn keys_with_same_topic_from_different_nodes_differ() {
    assert_ne!(RoutingKey::new(1, 9), RoutingKey::new(2, 9));
  }
}
