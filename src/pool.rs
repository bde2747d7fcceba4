use std::{
  cell::UnsafeCell,
  fmt,
  mem::{ManuallyDrop, MaybeUninit},
  ops::{Deref, DerefMut},
  ptr,
  sync::{
    atomic::{fence, AtomicU32, Ordering},
    Arc, Mutex,
  },
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::message::Message;

/// Default number of in-flight buffers per publisher. Publishing faster than
/// subscribers drain makes `alloc` return `None`; that is back-pressure at the
/// source, not a bug to be fixed with a larger pool.
pub const DEFAULT_POOL_CAPACITY: usize = 4;

// One pool slot: the sample header (refcount) followed by the payload.
// refs == 0 <=> the slot index is on the free list.
struct Slot<M> {
  refs: AtomicU32,
  cell: UnsafeCell<MaybeUninit<M>>,
}

pub(crate) struct PoolInner<M> {
  slots: Box<[Slot<M>]>,
  free: Mutex<Vec<u16>>,
}

// Sample handles hand out `&M` only while they hold a nonzero refcount, and
// `&mut M` only from the single SampleMut that exists before a broadcast.
unsafe impl<M: Send + Sync> Send for PoolInner<M> {}
unsafe impl<M: Send + Sync> Sync for PoolInner<M> {}

impl<M> PoolInner<M> {
  fn release(&self, idx: u16) {
    let slot = &self.slots[idx as usize];
    if slot.refs.fetch_sub(1, Ordering::Release) == 1 {
      fence(Ordering::Acquire);
      // Last holder: run the payload destructor and recycle the slot.
      unsafe { (*slot.cell.get()).assume_init_drop() };
      self.free.lock().unwrap().push(idx);
    }
  }
}

/// Fixed-capacity block pool. Every buffer a publisher hands out lives here;
/// the free list is the only allocation and it happens once, at construction.
///
/// `alloc` and the release on sample drop are O(1) and never block beyond a
/// short critical section on the free list.
pub(crate) struct BufferPool<M: Message> {
  inner: Arc<PoolInner<M>>,
}

impl<M: Message> BufferPool<M> {
  pub(crate) fn with_capacity(capacity: usize) -> Self {
    assert!(capacity > 0, "buffer pool cannot be empty");
    assert!(capacity <= usize::from(u16::MAX), "buffer pool capacity out of range");
    let slots = (0..capacity)
      .map(|_| Slot {
        refs: AtomicU32::new(0),
        cell: UnsafeCell::new(MaybeUninit::uninit()),
      })
      .collect::<Vec<_>>()
      .into_boxed_slice();
    let free = (0..capacity as u16).rev().collect();
    BufferPool {
      inner: Arc::new(PoolInner {
        slots,
        free: Mutex::new(free),
      }),
    }
  }

  /// Take a free buffer, or `None` when every buffer is in flight.
  pub(crate) fn alloc(&self) -> Option<SampleMut<M>> {
    let idx = self.inner.free.lock().unwrap().pop()?;
    let slot = &self.inner.slots[idx as usize];
    slot.refs.store(1, Ordering::Relaxed);
    unsafe { (*slot.cell.get()).write(M::default()) };
    Some(SampleMut {
      pool: Arc::clone(&self.inner),
      idx,
    })
  }

  pub(crate) fn capacity(&self) -> usize {
    self.inner.slots.len()
  }

  /// Buffers currently on the free list. Equals `capacity()` at quiescence.
  pub(crate) fn free(&self) -> usize {
    self.inner.free.lock().unwrap().len()
  }
}

impl<M: Message> Clone for BufferPool<M> {
  fn clone(&self) -> Self {
    BufferPool {
      inner: Arc::clone(&self.inner),
    }
  }
}

/// Exclusive handle to a freshly allocated buffer. The publisher fills the
/// payload through `DerefMut`, then hands the sample to `broadcast`, which
/// converts it into shared [`Sample`]s. Dropping it without broadcasting
/// returns the buffer to its pool.
pub struct SampleMut<M: Message> {
  pool: Arc<PoolInner<M>>,
  idx: u16,
}

impl<M: Message> SampleMut<M> {
  // Consumes the writer handle without touching the refcount: the publisher's
  // initial reference becomes the broadcast loop's working reference.
  pub(crate) fn into_shared(self) -> Sample<M> {
    let this = ManuallyDrop::new(self);
    Sample {
      pool: unsafe { ptr::read(&this.pool) },
      idx: this.idx,
    }
  }
}

impl<M: Message> Deref for SampleMut<M> {
  type Target = M;
  fn deref(&self) -> &M {
    let slot = &self.pool.slots[self.idx as usize];
    unsafe { (*slot.cell.get()).assume_init_ref() }
  }
}

impl<M: Message> DerefMut for SampleMut<M> {
  fn deref_mut(&mut self) -> &mut M {
    let slot = &self.pool.slots[self.idx as usize];
    unsafe { (*slot.cell.get()).assume_init_mut() }
  }
}

impl<M: Message> Drop for SampleMut<M> {
  fn drop(&mut self) {
    self.pool.release(self.idx);
  }
}

impl<M: Message + fmt::Debug> fmt::Debug for SampleMut<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("SampleMut").field(&**self).finish()
  }
}

/// Shared read-only handle to a broadcast buffer. Subscribers read the exact
/// bytes the publisher wrote; cloning increments the refcount, dropping
/// decrements it, and the last drop returns the buffer to its pool.
pub struct Sample<M: Message> {
  pool: Arc<PoolInner<M>>,
  idx: u16,
}

impl<M: Message> Clone for Sample<M> {
  fn clone(&self) -> Self {
    let slot = &self.pool.slots[self.idx as usize];
    slot.refs.fetch_add(1, Ordering::Relaxed);
    Sample {
      pool: Arc::clone(&self.pool),
      idx: self.idx,
    }
  }
}

impl<M: Message> Deref for Sample<M> {
  type Target = M;
  fn deref(&self) -> &M {
    let slot = &self.pool.slots[self.idx as usize];
    unsafe { (*slot.cell.get()).assume_init_ref() }
  }
}

impl<M: Message> Drop for Sample<M> {
  fn drop(&mut self) {
    self.pool.release(self.idx);
  }
}

impl<M: Message + fmt::Debug> fmt::Debug for Sample<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Sample").field(&**self).finish()
  }
}

static_assertions::assert_impl_all!(Sample<u64>: Send, Sync);
static_assertions::assert_impl_all!(SampleMut<u64>: Send, Sync);
