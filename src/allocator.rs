use std::ptr::NonNull;

use log::{debug, warn};

use crate::{
  align::{self, MIN_QUANTUM},
  block::{Block, BlockInfo, HEADER_SIZE},
  block_list::{BlockList, InvariantError},
  error::{AllocError, Result},
  region::HeapRegion,
};

/// Aggregate view of the tracked heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes currently owned by callers.
  pub used_bytes: usize,
  /// Payload bytes sitting in free blocks.
  pub free_bytes: usize,
  /// Header and payload bytes of every tracked block.
  pub heap_bytes: usize,
}

/// First-fit allocator over a single [`HeapRegion`].
///
/// Owns the block list and the region. Single-threaded: wrap it in a
/// [`LockedAllocator`](crate::LockedAllocator) to share it.
pub struct Allocator<R: HeapRegion> {
  blocks: BlockList,
  region: R,
}

unsafe impl<R: HeapRegion + Send> Send for Allocator<R> {}

impl<R: HeapRegion> Allocator<R> {
  pub const fn new(region: R) -> Self {
    Self {
      blocks: BlockList::new(),
      region,
    }
  }

  /// Hands out at least `size` bytes, rounded up to a multiple of 4.
  ///
  /// The contents are unspecified. A zero-byte request still gets its own
  /// 4-byte block.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let size = align::request_size(size).ok_or(AllocError::SizeOverflow)?;

    let block = match self.blocks.find_free(size) {
      Some(block) => {
        self.claim(block, size);
        block
      }
      None => self.extend(size)?,
    };

    self.verify();

    Ok(Block::payload(block))
  }

  /// Allocates `count * element_size` bytes and zeroes the whole usable
  /// payload. The product is checked; overflow is rejected before the heap
  /// is touched.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> Result<NonNull<u8>> {
    let size = count
      .checked_mul(element_size)
      .ok_or(AllocError::SizeOverflow)?;

    let payload = self.allocate(size)?;

    unsafe {
      let usable = (*Block::from_payload(payload)).size;
      payload.as_ptr().write_bytes(0, usable);
    }

    Ok(payload)
  }

  /// Gives a block back. Pointers this allocator does not own are logged and
  /// ignored; see [`Allocator::try_release`] for the typed outcome.
  pub fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    if let Err(err) = self.try_release(ptr) {
      warn!("release ignored: {}", err);
    }
  }

  /// Gives a block back, merging it with free neighbours and returning the
  /// heap tail to the region when possible.
  ///
  /// Only the exact address handed out by [`Allocator::allocate`] is
  /// accepted. On error nothing is changed.
  pub fn try_release(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<()> {
    let addr = ptr.as_ptr() as usize;

    let mut block = self
      .blocks
      .find_by_payload(ptr)
      .ok_or(AllocError::InvalidPointer { addr })?;

    unsafe {
      let header = block.as_ptr();
      if (*header).is_free {
        return Err(AllocError::DoubleFree { addr });
      }
      (*header).is_free = true;

      if let Some(prev) = (*header).prev {
        if (*prev.as_ptr()).is_free && Block::abuts(prev, block) {
          block = self.blocks.coalesce(prev);
        }
      }
    }

    block = self.blocks.coalesce(block);

    if self.blocks.tail() == Some(block) {
      self.trim(block);
    }

    self.verify();

    Ok(())
  }

  /// Whether `ptr` is the payload start of a tracked block.
  pub fn is_valid(
    &self,
    ptr: NonNull<u8>,
  ) -> bool {
    self.blocks.find_by_payload(ptr).is_some()
  }

  /// Bytes the caller may use behind `ptr`, if it is a live allocation.
  pub fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<usize> {
    let info = unsafe { Block::info(self.blocks.find_by_payload(ptr)?) };
    (!info.is_free).then_some(info.size)
  }

  /// Every tracked block, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.blocks.iter()
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(HeapStats::default(), |mut stats, block| {
      stats.blocks += 1;
      stats.heap_bytes += HEADER_SIZE + block.size;
      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      } else {
        stats.used_bytes += block.size;
      }
      stats
    })
  }

  /// Verifies the structural invariants of the block list.
  pub fn check(&self) -> std::result::Result<(), InvariantError> {
    self.blocks.check()
  }

  pub fn region(&self) -> &R {
    &self.region
  }

  /// Mutable access to the region, e.g. to grow it on someone else's behalf.
  pub fn region_mut(&mut self) -> &mut R {
    &mut self.region
  }

  fn claim(
    &mut self,
    block: NonNull<Block>,
    size: usize,
  ) {
    unsafe {
      let header = block.as_ptr();
      let available = (*header).size;

      if available - size >= HEADER_SIZE + MIN_QUANTUM {
        self.blocks.split_off(block, size);
      }

      (*header).is_free = false;
    }

    debug!("reused block {:?} for {} bytes", block, size);
  }

  fn extend(
    &mut self,
    size: usize,
  ) -> Result<NonNull<Block>> {
    let total = size
      .checked_add(HEADER_SIZE)
      .ok_or(AllocError::SizeOverflow)?;

    let at = self.region.grow(total)?;

    let block = unsafe {
      let block = Block::write(at, size, false);
      self.blocks.push_back(block);
      block
    };

    debug!("grew heap by {} bytes for block {:?}", total, block);

    Ok(block)
  }

  /// Returns the free tail block to the region. Keeps it as a free tail if
  /// it does not reach the high-water mark or the region refuses.
  fn trim(
    &mut self,
    block: NonNull<Block>,
  ) {
    if unsafe { Block::end(block) } != self.region.high_water_mark() {
      debug!("tail block {:?} does not reach the heap top, keeping it", block);
      return;
    }

    self.blocks.pop_back();

    match unsafe { self.region.shrink(block.cast()) } {
      Ok(()) => debug!("returned tail block {:?} to the region", block),
      Err(err) => {
        warn!("keeping free tail block {:?}: {}", block, err);
        unsafe { self.blocks.push_back(block) };
      }
    }
  }

  fn verify(&self) {
    if cfg!(any(debug_assertions, feature = "paranoid")) {
      if let Err(err) = self.blocks.check() {
        panic!("heap corrupted: {err}");
      }
    }
  }
}

impl<R: HeapRegion + Default> Default for Allocator<R> {
  fn default() -> Self {
    Self::new(R::default())
  }
}

#[cfg(unix)]
impl Allocator<crate::sbrk::Sbrk> {
  /// An allocator on the process break.
  pub const fn sbrk() -> Self {
    Self::new(crate::sbrk::Sbrk::new())
  }
}
