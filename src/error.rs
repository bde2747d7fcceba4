use thiserror::Error;

/// Why an `advertise`, `subscribe`, or bridge attachment was refused.
///
/// Binding failures leave the topic table and the endpoint untouched; the
/// application can log and carry on. Runtime degradation (pool exhaustion,
/// full queues, transport rejections) is deliberately not an error: those
/// paths drop data and report it through counters and return values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
  /// Topic names are short ASCII identifiers, at most
  /// [`MAX_TOPIC_NAME`](crate::MAX_TOPIC_NAME) bytes.
  #[error("invalid topic name `{0}`")]
  BadTopicName(String),

  /// The topic already carries payloads of a different size.
  #[error("payload size mismatch on `{topic}`: topic carries {expected} bytes, endpoint wants {requested}")]
  SizeMismatch {
    topic: String,
    expected: usize,
    requested: usize,
  },

  /// Same payload size, different Rust type. The registry refuses to alias
  /// two types over one topic even when their sizes agree.
  #[error("payload type mismatch on topic `{0}`")]
  TypeMismatch(String),

  /// The bounded topic table is full. Topics are never removed, so this is a
  /// static sizing problem, not a transient one.
  #[error("topic table is full")]
  TopicTableFull,

  /// A topic accepts at most one inbound bridge.
  #[error("topic `{0}` already has a remote publisher")]
  DuplicateRemotePublisher(String),

  /// The encoded payload does not fit a transport frame. Fragmentation is a
  /// higher-layer concern; the bridge refuses the binding instead.
  #[error("encoded payload of {size} bytes exceeds the {limit}-byte frame limit")]
  PayloadTooLarge { size: usize, limit: usize },

  /// The wire codec could not encode a probe value of the payload type.
  #[error("wire codec rejected the payload type: {0}")]
  Codec(String),
}

/// Transport-side submission failures, as reported by a [`FrameSink`](crate::FrameSink).
///
/// The bridge treats every variant the same way: drop the frame, keep going.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
  #[error("transmit queue busy")]
  Busy,
  #[error("transmission timed out")]
  Timeout,
  #[error("bus-off or driver failure")]
  Bus,
}
