use std::ptr::{self, NonNull};

use log::debug;

use crate::{
  align_to,
  region::{HeapRegion, RegionError},
};

/// A fixed-capacity region carved out of one boxed buffer.
///
/// The buffer is reserved once and never moves, so addresses handed out stay
/// valid for the arena's whole life. Growth past the capacity is refused the
/// way an exhausted `sbrk` would refuse it. The grow and shrink counters make
/// heap traffic observable from tests.
pub struct Arena {
  base: NonNull<u64>,
  words: usize,
  top: usize,
  grow_count: usize,
  shrink_count: usize,
}

unsafe impl Send for Arena {}

impl Arena {
  /// Reserves `capacity` bytes, rounded up to a whole word.
  pub fn with_capacity(capacity: usize) -> Self {
    let words = align_to!(capacity, 8) / 8;
    let buffer: Box<[u64]> = vec![0u64; words].into_boxed_slice();
    let base = NonNull::from(Box::leak(buffer)).cast::<u64>();

    Self {
      base,
      words,
      top: 0,
      grow_count: 0,
      shrink_count: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.words * 8
  }

  /// Bytes between the base and the high-water mark.
  pub fn used(&self) -> usize {
    self.top
  }

  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr().cast()
  }

  /// Number of successful [`HeapRegion::grow`] calls.
  pub fn grow_count(&self) -> usize {
    self.grow_count
  }

  /// Number of successful [`HeapRegion::shrink`] calls.
  pub fn shrink_count(&self) -> usize {
    self.shrink_count
  }

  /// Advances the high-water mark without handing the bytes to anyone,
  /// as if a foreign caller had grown the arena.
  pub fn skip(
    &mut self,
    bytes: usize,
  ) -> Result<(), RegionError> {
    self.reserve(bytes).map(|_| ())
  }

  fn reserve(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError> {
    let available = self.capacity() - self.top;
    if bytes > available {
      return Err(RegionError::Refused { requested: bytes });
    }

    let start = unsafe { self.base.cast::<u8>().add(self.top) };
    self.top += bytes;

    Ok(start)
  }
}

impl HeapRegion for Arena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError> {
    let start = self.reserve(bytes)?;
    self.grow_count += 1;

    debug!(
      "arena grew by {} bytes, {} of {} in use",
      bytes,
      self.top,
      self.capacity()
    );

    Ok(start)
  }

  unsafe fn shrink(
    &mut self,
    to: NonNull<u8>,
  ) -> Result<(), RegionError> {
    let base = self.base() as usize;
    let to = to.as_ptr() as usize;

    if to < base || to - base > self.top {
      return Err(RegionError::OutOfRange { addr: to });
    }

    self.top = to - base;
    self.shrink_count += 1;

    debug!("arena shrank to {} of {} bytes", self.top, self.capacity());

    Ok(())
  }

  fn high_water_mark(&self) -> *mut u8 {
    self.base().wrapping_add(self.top)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let slice = ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.words);
    drop(unsafe { Box::from_raw(slice) });
  }
}
