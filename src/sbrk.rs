use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::debug;

use crate::{
  align::ALIGNMENT,
  align_to,
  region::{HeapRegion, RegionError},
};

pub fn print_alloc(
  size: usize,
  addr: *const u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr,
    Sbrk::program_break()
  );
}

/// The process data segment, moved with `sbrk(2)`.
///
/// Only one `Sbrk` should be active per process: the break is global state,
/// and a shrink is refused whenever the break is not where this region last
/// left it.
pub struct Sbrk {
  top: *mut u8,
}

unsafe impl Send for Sbrk {}

impl Sbrk {
  pub const fn new() -> Self {
    Self {
      top: ptr::null_mut(),
    }
  }

  /// Current program break as reported by `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) }.cast()
  }
}

impl Default for Sbrk {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapRegion for Sbrk {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError> {
    let refused = RegionError::Refused { requested: bytes };

    let current = Sbrk::program_break() as usize;
    let padding = align_to!(current, ALIGNMENT) - current;
    let total = bytes.checked_add(padding).ok_or(refused)?;
    let increment = intptr_t::try_from(total).map_err(|_| refused)?;

    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return Err(refused);
    }

    let address = address.cast::<u8>();
    self.top = address.wrapping_add(total);

    debug!(
      "sbrk grew by {} bytes (+{} padding), program break = {:?}",
      bytes, padding, self.top
    );

    NonNull::new(address.wrapping_add(padding)).ok_or(refused)
  }

  unsafe fn shrink(
    &mut self,
    to: NonNull<u8>,
  ) -> Result<(), RegionError> {
    let current = Sbrk::program_break();

    if current != self.top {
      return Err(RegionError::Moved {
        expected: self.top as usize,
        found: current as usize,
      });
    }

    let to = to.as_ptr();
    if to > current {
      return Err(RegionError::OutOfRange { addr: to as usize });
    }

    let decrement = current as usize - to as usize;
    let refused = RegionError::Refused { requested: decrement };
    let delta = intptr_t::try_from(decrement).map_err(|_| refused)?;

    if unsafe { sbrk(-delta) } == usize::MAX as *mut c_void {
      return Err(refused);
    }

    self.top = to;

    debug!("sbrk shrank by {} bytes, program break = {:?}", decrement, to);

    Ok(())
  }

  fn high_water_mark(&self) -> *mut u8 {
    if self.top.is_null() {
      Sbrk::program_break()
    } else {
      self.top
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  #[ignore = "moves the real program break, which the test harness shares"]
  fn test_grow_and_shrink_break() {
    let mut region = Sbrk::new();

    let start = region.grow(64).unwrap();
    assert_eq!(start.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(region.high_water_mark(), start.as_ptr().wrapping_add(64));

    unsafe {
      start.as_ptr().write_bytes(0xAB, 64);
      assert_eq!(*start.as_ptr().add(63), 0xAB);

      region.shrink(start).unwrap();
    }

    assert_eq!(Sbrk::program_break(), start.as_ptr());
  }

  #[test]
  fn test_shrink_before_grow_is_refused() {
    let mut region = Sbrk::new();
    let somewhere = NonNull::new(Sbrk::program_break()).unwrap();

    let result = unsafe { region.shrink(somewhere) };

    assert!(matches!(result, Err(RegionError::Moved { .. })));
  }
}
