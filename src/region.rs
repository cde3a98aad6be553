use std::ptr::NonNull;

use thiserror::Error;

/// Errors reported by a [`HeapRegion`] when it cannot move its high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
  #[error("the environment refused to grow the heap by {requested} bytes")]
  Refused { requested: usize },
  #[error("address {addr:#x} lies outside the heap region")]
  OutOfRange { addr: usize },
  #[error("heap top moved behind our back (expected {expected:#x}, found {found:#x})")]
  Moved { expected: usize, found: usize },
}

/// A contiguous arena whose upper boundary only the owner moves.
///
/// Growth hands back the start of the fresh bytes. That start is normally the
/// previous high-water mark, but may lie further up when something else grew
/// the same arena in between; the allocator copes with such seams.
pub trait HeapRegion {
  /// Extends the region by exactly `bytes` bytes (after any alignment
  /// padding the region needs) and returns where they begin.
  ///
  /// The returned address is 4-aligned.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError>;

  /// Retracts the high-water mark down to `to`, giving the memory back.
  ///
  /// # Safety
  ///
  /// Nothing in `[to, high_water_mark())` may still be referenced.
  unsafe fn shrink(
    &mut self,
    to: NonNull<u8>,
  ) -> Result<(), RegionError>;

  /// Current upper boundary of the region.
  fn high_water_mark(&self) -> *mut u8;
}
