//! Extends a topic across the CAN-class transport.
//!
//! A [`RemoteSubscriber`] shadows a local publisher and forwards each
//! broadcast onto the bus; a [`RemotePublisher`] on the peer decodes those
//! frames and re-broadcasts them locally, indistinguishable from a local
//! publisher. The frame body is the `speedy`-encoded message value and
//! nothing else: the refcount header that prefixes every local buffer never
//! leaves the process.

use std::time::Duration;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use speedy::{LittleEndian, Readable, Writable};

use crate::{error::BindError, message::Message, transport::MAX_FRAME_PAYLOAD};

mod remote_publisher;
mod remote_subscriber;

pub use remote_publisher::RemotePublisher;
pub use remote_subscriber::RemoteSubscriber;

/// How long an outbound bridge waits for the driver to accept a frame before
/// giving up on it.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Payloads that can cross the bus: a [`Message`] with a `speedy` wire form.
/// Derive `Readable` and `Writable` on the payload struct to qualify.
pub trait WireMessage:
  Message + Writable<LittleEndian> + for<'a> Readable<'a, LittleEndian>
{
}

impl<M> WireMessage for M where
  M: Message + Writable<LittleEndian> + for<'a> Readable<'a, LittleEndian>
{
}

pub(crate) fn encode<M>(value: &M) -> Result<Vec<u8>, speedy::Error>
where
  M: Writable<LittleEndian>,
{
  value.write_to_vec()
}

pub(crate) fn decode<'a, M>(bytes: &'a [u8]) -> Result<M, speedy::Error>
where
  M: Readable<'a, LittleEndian>,
{
  M::read_from_buffer(bytes)
}

/// Checks at bind time that the payload type fits a transport frame, by
/// encoding a probe value. Variable-size payloads are re-checked per frame.
pub(crate) fn checked_wire_size<M: WireMessage>() -> Result<usize, BindError> {
  let probe = encode(&M::default()).map_err(|e| BindError::Codec(e.to_string()))?;
  if probe.len() > MAX_FRAME_PAYLOAD {
    return Err(BindError::PayloadTooLarge {
      size: probe.len(),
      limit: MAX_FRAME_PAYLOAD,
    });
  }
  Ok(probe.len())
}
