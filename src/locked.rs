use std::ptr::NonNull;

use spin::{Mutex, MutexGuard};

use crate::{
  allocator::{Allocator, HeapStats},
  error::Result,
  region::HeapRegion,
};

/// An [`Allocator`] behind one spin lock.
///
/// Each operation holds the lock from the free-list search to the last
/// split, merge or heap adjustment, so no other thread ever sees the list
/// mid-mutation.
pub struct LockedAllocator<R: HeapRegion> {
  inner: Mutex<Allocator<R>>,
}

impl<R: HeapRegion> LockedAllocator<R> {
  pub const fn new(region: R) -> Self {
    Self {
      inner: Mutex::new(Allocator::new(region)),
    }
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.inner.lock().allocate(size)
  }

  pub fn zero_allocate(
    &self,
    count: usize,
    element_size: usize,
  ) -> Result<NonNull<u8>> {
    self.inner.lock().zero_allocate(count, element_size)
  }

  pub fn release(
    &self,
    ptr: NonNull<u8>,
  ) {
    self.inner.lock().release(ptr);
  }

  pub fn try_release(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<()> {
    self.inner.lock().try_release(ptr)
  }

  pub fn is_valid(
    &self,
    ptr: NonNull<u8>,
  ) -> bool {
    self.inner.lock().is_valid(ptr)
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.lock().stats()
  }

  /// Exclusive access for a sequence of operations.
  pub fn lock(&self) -> MutexGuard<'_, Allocator<R>> {
    self.inner.lock()
  }

  pub fn into_inner(self) -> Allocator<R> {
    self.inner.into_inner()
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::arena::Arena;

  #[test]
  fn test_shared_between_threads() {
    let allocator = LockedAllocator::new(Arena::with_capacity(64 * 1024));

    thread::scope(|scope| {
      for t in 0..4usize {
        let allocator = &allocator;
        scope.spawn(move || {
          for i in 0..50 {
            let size = 4 + (t * 7 + i) % 40;
            let ptr = allocator.allocate(size).unwrap();

            unsafe { ptr.as_ptr().write_bytes(t as u8, size) };
            let first = unsafe { *ptr.as_ptr() };
            assert_eq!(first, t as u8);

            allocator.release(ptr);
          }
        });
      }
    });

    let allocator = allocator.into_inner();
    assert_eq!(allocator.check(), Ok(()));
    assert_eq!(allocator.stats().used_bytes, 0);
  }

  #[test]
  fn test_lock_groups_operations() {
    let allocator = LockedAllocator::new(Arena::with_capacity(4096));

    {
      let mut heap = allocator.lock();
      let a = heap.allocate(16).unwrap();
      let b = heap.allocate(16).unwrap();
      heap.release(a);
      assert!(heap.is_valid(b));
    }

    assert_eq!(allocator.stats().blocks, 2);
  }
}
