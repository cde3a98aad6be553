use std::{mem, ptr::NonNull};

/// Header placed in front of every payload handed out by the allocator.
///
/// The header is packed to 4 bytes so it can live at any address a split
/// produces; fields are only ever copied in and out, never borrowed.
#[repr(C, packed(4))]
pub struct Block {
  pub size: usize,
  pub next: Option<NonNull<Block>>,
  pub prev: Option<NonNull<Block>>,
  pub is_free: bool,
}

/// Bytes taken by a [`Block`] header in front of its payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(HEADER_SIZE % crate::align::ALIGNMENT == 0);
const _: () = assert!(mem::align_of::<Block>() <= crate::align::ALIGNMENT);

impl Block {
  /// Writes a fresh, unlinked header at `at`.
  ///
  /// # Safety
  ///
  /// `at` must be 4-aligned and valid for writes of `HEADER_SIZE + size`
  /// bytes that nothing else references.
  pub unsafe fn write(
    at: NonNull<u8>,
    size: usize,
    is_free: bool,
  ) -> NonNull<Block> {
    let block = at.cast::<Block>();
    unsafe {
      block.write(Block {
        size,
        next: None,
        prev: None,
        is_free,
      });
    }
    block
  }

  /// Address where caller-visible data begins.
  pub fn payload(block: NonNull<Block>) -> NonNull<u8> {
    unsafe { block.cast::<u8>().add(HEADER_SIZE) }
  }

  /// Recovers the header from a payload address.
  ///
  /// Pure arithmetic: the result is only meaningful once the payload was
  /// matched against a tracked block.
  pub fn from_payload(payload: NonNull<u8>) -> *mut Block {
    payload.as_ptr().wrapping_sub(HEADER_SIZE).cast()
  }

  /// One past the last payload byte.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: NonNull<Block>) -> *mut u8 {
    unsafe {
      let size = (*block.as_ptr()).size;
      Block::payload(block).as_ptr().wrapping_add(size)
    }
  }

  /// Whether `next` starts exactly where `block` ends.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn abuts(
    block: NonNull<Block>,
    next: NonNull<Block>,
  ) -> bool {
    unsafe { Block::end(block) == next.as_ptr().cast::<u8>() }
  }

  /// Copies the header out into an owned snapshot.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn info(block: NonNull<Block>) -> BlockInfo {
    let (size, is_free) = unsafe {
      let header = block.as_ptr();
      ((*header).size, (*header).is_free)
    };

    BlockInfo {
      addr: block.as_ptr() as usize,
      payload: Block::payload(block).as_ptr() as usize,
      size,
      is_free,
    }
  }
}

/// Owned view of one block, detached from the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header.
  pub addr: usize,
  /// Address of the first payload byte.
  pub payload: usize,
  /// Payload capacity in bytes.
  pub size: usize,
  pub is_free: bool,
}

impl BlockInfo {
  pub fn end(&self) -> usize {
    self.payload + self.size
  }

  pub fn contains(
    &self,
    addr: usize,
  ) -> bool {
    (self.payload..self.end()).contains(&addr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE % 4, 0);
    assert!(HEADER_SIZE >= mem::size_of::<usize>() * 3 + 1);
  }

  #[test]
  fn test_write_and_info() {
    let mut backing = [0u64; 16];
    let at = NonNull::new(backing.as_mut_ptr().cast::<u8>()).unwrap();

    let block = unsafe { Block::write(at, 40, false) };
    let info = unsafe { Block::info(block) };

    assert_eq!(info.addr, at.as_ptr() as usize);
    assert_eq!(info.payload, info.addr + HEADER_SIZE);
    assert_eq!(info.size, 40);
    assert!(!info.is_free);
    assert_eq!(info.end(), info.payload + 40);
    assert!(info.contains(info.payload));
    assert!(info.contains(info.payload + 39));
    assert!(!info.contains(info.payload + 40));

    assert_eq!(Block::from_payload(Block::payload(block)), block.as_ptr());
  }

  #[test]
  fn test_abuts() {
    let mut backing = [0u64; 32];
    let base = backing.as_mut_ptr().cast::<u8>();

    unsafe {
      let a = Block::write(NonNull::new(base).unwrap(), 12, true);
      let b_addr = base.add(HEADER_SIZE + 12);
      let b = Block::write(NonNull::new(b_addr).unwrap(), 4, true);
      let c = Block::write(NonNull::new(b_addr.add(HEADER_SIZE + 8)).unwrap(), 4, true);

      assert!(Block::abuts(a, b));
      assert!(!Block::abuts(b, c));
    }
  }
}
