use std::mem;

/// Marker trait for payload types that can travel through a topic.
///
/// Buffers are recycled through fixed pools, so a freshly allocated sample is
/// initialized to `M::default()` before the publisher fills it in. Payloads
/// are shared read-only between subscribers, hence the `Sync` requirement.
///
/// The trait is implemented automatically; plain-data structs qualify as-is.
pub trait Message: Default + Send + Sync + 'static {}

impl<M: Default + Send + Sync + 'static> Message for M {}

/// Fixed per-topic payload size. All endpoints bound to a topic must agree on
/// this value; the registry enforces it at bind time.
pub(crate) fn payload_size<M: Message>() -> usize {
  mem::size_of::<M>()
}
