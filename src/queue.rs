use std::{collections::VecDeque, sync::Mutex};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{message::Message, pool::Sample};

/// Bounded FIFO of shared samples, one per subscriber.
///
/// Enqueue comes from publisher context (possibly a transport callback),
/// dequeue from the subscriber's thread. Saturation drops the new sample
/// without blocking; the subscriber simply misses it.
pub(crate) struct SubQueue<M: Message> {
  depth: usize,
  items: Mutex<VecDeque<Sample<M>>>,
}

impl<M: Message> SubQueue<M> {
  pub(crate) fn new(depth: usize) -> Self {
    assert!(depth > 0, "subscriber queue depth cannot be zero");
    SubQueue {
      depth,
      items: Mutex::new(VecDeque::with_capacity(depth)),
    }
  }

  /// Clones the sample into the queue. Returns false when the queue is full,
  /// in which case the refcount is left untouched.
  pub(crate) fn try_push(&self, sample: &Sample<M>) -> bool {
    let mut items = self.items.lock().unwrap();
    if items.len() >= self.depth {
      return false;
    }
    items.push_back(sample.clone());
    true
  }

  pub(crate) fn pop(&self) -> Option<Sample<M>> {
    self.items.lock().unwrap().pop_front()
  }

  /// Drops every queued sample, releasing the buffers back to their pools.
  pub(crate) fn clear(&self) {
    self.items.lock().unwrap().clear();
  }

  pub(crate) fn len(&self) -> usize {
    self.items.lock().unwrap().len()
  }

  pub(crate) fn depth(&self) -> usize {
    self.depth
  }
}

#[cfg(test)]
mod tests {
  use test_case::test_case;

  use super::*;
  use crate::pool::BufferPool;

  #[test_case(1; "depth one")]
  #[test_case(2; "depth two")]
  #[test_case(5; "depth five")]
  fn saturation_drops_newest(depth: usize) {
    let pool = BufferPool::<u32>::with_capacity(depth + 1);
    let queue = SubQueue::new(depth);
    for n in 0..depth {
      let mut s = pool.alloc().unwrap();
      *s = n as u32;
      assert!(queue.try_push(&s.into_shared()));
    }
    let overflow = pool.alloc().unwrap().into_shared();
    assert!(!queue.try_push(&overflow));
    assert_eq!(queue.len(), depth);
    drop(overflow);
    // the rejected sample did not leak a reference
    assert_eq!(pool.free(), 1);
  }

  #[test]
  fn pops_in_fifo_order() {
    let pool = BufferPool::<u32>::with_capacity(3);
    let queue = SubQueue::new(3);
    for n in [11, 22, 33] {
      let mut s = pool.alloc().unwrap();
      *s = n;
      assert!(queue.try_push(&s.into_shared()));
    }
    assert_eq!(*queue.pop().unwrap(), 11);
    assert_eq!(*queue.pop().unwrap(), 22);
    assert_eq!(*queue.pop().unwrap(), 33);
    assert!(queue.pop().is_none());
  }

  #[test]
  fn clear_releases_buffers() {
    let pool = BufferPool::<u32>::with_capacity(2);
    let queue = SubQueue::new(2);
    queue.try_push(&pool.alloc().unwrap().into_shared());
    queue.try_push(&pool.alloc().unwrap().into_shared());
    assert_eq!(pool.free(), 0);
    queue.clear();
    assert_eq!(pool.free(), 2);
  }
}
