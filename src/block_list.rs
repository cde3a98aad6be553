//! Address-ordered, doubly linked list of block headers.
//!
//! Every rewiring of `next`/`prev` goes through [`BlockList::push_back`],
//! [`BlockList::insert_after`] or the private `unlink`; nothing outside this
//! module touches the links.
//!
//! ```text
//!   head                                                         tail
//!    │                                                             │
//!    ▼                                                             ▼
//!   ┌────────┬──────────┐┌────────┬──────────┐   ┌────────┬──────────┐
//!   │ header │ payload  ││ header │ payload  │...│ header │ payload  │
//!   └────────┴──────────┘└────────┴──────────┘   └────────┴──────────┘
//!        next ──────────────▶   next ─────────▶  ▲
//!        ◀────────────── prev   ◀──────── prev   │
//!                                           (seam: only where the
//!                                            region grew non-contiguously)
//! ```

use std::{marker::PhantomData, ptr::NonNull};

use log::trace;
use thiserror::Error;

use crate::{
  align::{ALIGNMENT, MIN_QUANTUM},
  block::{Block, BlockInfo, HEADER_SIZE},
};

/// A structural invariant of the list that does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantError {
  #[error("block at {addr:#x} has a prev link that disagrees with the forward walk")]
  BrokenBackLink { addr: usize },
  #[error("block at {addr:#x} has size {size}, not a multiple of the alignment")]
  Misaligned { addr: usize, size: usize },
  #[error("block at {addr:#x} overlaps or precedes its predecessor")]
  OutOfOrder { addr: usize },
  #[error("free block at {addr:#x} abuts a free predecessor without being merged")]
  Unmerged { addr: usize },
  #[error("recorded tail is not the last block reached by the forward walk")]
  TailMismatch,
  #[error("walked {counted} blocks but {recorded} are recorded")]
  LengthMismatch { counted: usize, recorded: usize },
}

pub struct BlockList {
  head: Option<NonNull<Block>>,
  tail: Option<NonNull<Block>>,
  len: usize,
}

impl BlockList {
  pub const fn new() -> Self {
    Self {
      head: None,
      tail: None,
      len: 0,
    }
  }

  pub fn tail(&self) -> Option<NonNull<Block>> {
    self.tail
  }

  /// First block, in address order, that is free and holds `min_size` bytes.
  pub fn find_free(
    &self,
    min_size: usize,
  ) -> Option<NonNull<Block>> {
    self.nodes().find(|block| unsafe {
      let header = block.as_ptr();
      (*header).is_free && (*header).size >= min_size
    })
  }

  /// Tracked block whose payload begins exactly at `payload`.
  pub fn find_by_payload(
    &self,
    payload: NonNull<u8>,
  ) -> Option<NonNull<Block>> {
    let header = Block::from_payload(payload);
    self.nodes().find(|block| block.as_ptr() == header)
  }

  /// Appends a freshly grown block as the new tail.
  ///
  /// # Safety
  ///
  /// `block` must be an unlinked header written by [`Block::write`], placed
  /// above every tracked block, and must stay valid while it is tracked.
  pub unsafe fn push_back(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe {
      let header = block.as_ptr();
      (*header).prev = self.tail;
      (*header).next = None;

      match self.tail {
        Some(tail) => (*tail.as_ptr()).next = Some(block),
        None => self.head = Some(block),
      }
    }

    self.tail = Some(block);
    self.len += 1;

    trace!("pushed block {:?} as tail ({} blocks)", block, self.len);
  }

  /// Splices `new_block` in right after `anchor`.
  ///
  /// # Safety
  ///
  /// `anchor` must be tracked. `new_block` must be an unlinked header that
  /// lies strictly between the end of `anchor` and `anchor.next`, and must
  /// stay valid while it is tracked.
  pub unsafe fn insert_after(
    &mut self,
    anchor: NonNull<Block>,
    new_block: NonNull<Block>,
  ) {
    unsafe {
      let next = (*anchor.as_ptr()).next;

      let header = new_block.as_ptr();
      (*header).prev = Some(anchor);
      (*header).next = next;

      (*anchor.as_ptr()).next = Some(new_block);

      match next {
        Some(next) => (*next.as_ptr()).prev = Some(new_block),
        None => self.tail = Some(new_block),
      }
    }

    self.len += 1;

    trace!("inserted block {:?} after {:?}", new_block, anchor);
  }

  /// Cuts `block` down to `size` bytes and tracks the rest as a new free
  /// block right behind it. Returns the new block.
  ///
  /// # Safety
  ///
  /// `block` must be tracked, its payload must not be referenced by anyone,
  /// `size` must be 4-aligned, and `block` must hold at least
  /// `size + HEADER_SIZE + MIN_QUANTUM` bytes.
  pub unsafe fn split_off(
    &mut self,
    block: NonNull<Block>,
    size: usize,
  ) -> NonNull<Block> {
    unsafe {
      let header = block.as_ptr();
      let total = (*header).size;

      debug_assert!(size % ALIGNMENT == 0);
      debug_assert!(total >= size + HEADER_SIZE + MIN_QUANTUM);

      let remainder = total - size - HEADER_SIZE;
      let at = Block::payload(block).add(size);
      let rest = Block::write(at, remainder, true);

      (*header).size = size;
      self.insert_after(block, rest);

      trace!(
        "split block {:?}: {} -> {} + header + {}",
        block, total, size, remainder
      );

      rest
    }
  }

  /// Merges the successor of `block` into it when that successor is free and
  /// physically adjacent. Otherwise leaves everything untouched.
  ///
  /// Forward only: merging backwards is `coalesce(prev)`.
  pub fn coalesce(
    &mut self,
    block: NonNull<Block>,
  ) -> NonNull<Block> {
    unsafe {
      let header = block.as_ptr();

      let Some(next) = (*header).next else {
        return block;
      };

      if !(*next.as_ptr()).is_free || !Block::abuts(block, next) {
        return block;
      }

      let merged = (*header).size + HEADER_SIZE + (*next.as_ptr()).size;
      self.unlink(next);

      (*header).size = merged;
      (*header).is_free = true;

      trace!("merged {:?} into {:?}, size = {}", next, block, merged);
    }

    block
  }

  /// Detaches the tail block from the list.
  pub fn pop_back(&mut self) -> Option<NonNull<Block>> {
    let tail = self.tail?;
    self.unlink(tail);

    trace!("popped tail block {:?} ({} blocks left)", tail, self.len);

    Some(tail)
  }

  fn unlink(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe {
      let header = block.as_ptr();
      let prev = (*header).prev;
      let next = (*header).next;

      match prev {
        Some(prev) => (*prev.as_ptr()).next = next,
        None => self.head = next,
      }

      match next {
        Some(next) => (*next.as_ptr()).prev = prev,
        None => self.tail = prev,
      }

      (*header).prev = None;
      (*header).next = None;
    }

    self.len -= 1;
  }

  pub fn nodes(&self) -> Nodes<'_> {
    Nodes {
      next: self.head,
      _list: PhantomData,
    }
  }

  /// Snapshots of every block, in address order.
  pub fn iter(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.nodes().map(|block| unsafe { Block::info(block) })
  }

  /// Walks the whole list and verifies its structural invariants.
  pub fn check(&self) -> Result<(), InvariantError> {
    let mut prev: Option<NonNull<Block>> = None;
    let mut counted = 0;

    for block in self.nodes() {
      counted += 1;
      if counted > self.len {
        return Err(InvariantError::LengthMismatch {
          counted,
          recorded: self.len,
        });
      }

      let addr = block.as_ptr() as usize;
      let (size, is_free, back) = unsafe {
        let header = block.as_ptr();
        ((*header).size, (*header).is_free, (*header).prev)
      };

      if back != prev {
        return Err(InvariantError::BrokenBackLink { addr });
      }

      if size % ALIGNMENT != 0 {
        return Err(InvariantError::Misaligned { addr, size });
      }

      if let Some(prev) = prev {
        let prev_end = unsafe { Block::end(prev) } as usize;
        if addr < prev_end {
          return Err(InvariantError::OutOfOrder { addr });
        }

        let prev_free = unsafe { (*prev.as_ptr()).is_free };
        if prev_free && is_free && addr == prev_end {
          return Err(InvariantError::Unmerged { addr });
        }
      }

      prev = Some(block);
    }

    if prev != self.tail {
      return Err(InvariantError::TailMismatch);
    }

    if counted != self.len {
      return Err(InvariantError::LengthMismatch {
        counted,
        recorded: self.len,
      });
    }

    Ok(())
  }
}

impl Default for BlockList {
  fn default() -> Self {
    Self::new()
  }
}

/// Forward walk over the raw headers of a [`BlockList`].
pub struct Nodes<'a> {
  next: Option<NonNull<Block>>,
  _list: PhantomData<&'a BlockList>,
}

impl Iterator for Nodes<'_> {
  type Item = NonNull<Block>;

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    self.next = unsafe { (*current.as_ptr()).next };
    Some(current)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{arena::Arena, region::HeapRegion};

  fn grow_block(
    arena: &mut Arena,
    list: &mut BlockList,
    size: usize,
    is_free: bool,
  ) -> NonNull<Block> {
    let at = arena.grow(HEADER_SIZE + size).unwrap();
    unsafe {
      let block = Block::write(at, size, is_free);
      list.push_back(block);
      block
    }
  }

  fn sizes(list: &BlockList) -> Vec<(usize, bool)> {
    list.iter().map(|b| (b.size, b.is_free)).collect()
  }

  #[test]
  fn test_push_back_keeps_address_order() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 8, false);
    let b = grow_block(&mut arena, &mut list, 16, false);

    assert_eq!(list.nodes().next(), Some(a));
    assert_eq!(list.tail(), Some(b));
    assert_eq!(list.nodes().count(), 2);
    assert!(unsafe { Block::abuts(a, b) });
    assert_eq!(list.check(), Ok(()));
  }

  #[test]
  fn test_find_free_is_first_fit() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    grow_block(&mut arena, &mut list, 8, true);
    grow_block(&mut arena, &mut list, 32, false);
    let big = grow_block(&mut arena, &mut list, 64, true);
    grow_block(&mut arena, &mut list, 8, false);
    grow_block(&mut arena, &mut list, 16, true);

    assert_eq!(list.find_free(12), Some(big));
    assert_eq!(list.find_free(4), list.nodes().next());
    assert_eq!(list.find_free(65), None);
  }

  #[test]
  fn test_split_off_inserts_trailing_free_block() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 100, true);
    let b = grow_block(&mut arena, &mut list, 8, false);

    let rest = unsafe { list.split_off(a, 20) };

    assert_eq!(sizes(&list), vec![(20, true), (100 - 20 - HEADER_SIZE, true), (8, false)]);
    unsafe {
      assert!(Block::abuts(a, rest));
      assert!(Block::abuts(rest, b));
    }
    assert_eq!(list.nodes().count(), 3);
  }

  #[test]
  fn test_coalesce_merges_free_successor() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 20, true);
    grow_block(&mut arena, &mut list, 32, true);
    grow_block(&mut arena, &mut list, 8, false);

    let merged = list.coalesce(a);

    assert_eq!(merged, a);
    assert_eq!(sizes(&list), vec![(20 + HEADER_SIZE + 32, true), (8, false)]);
    assert_eq!(list.check(), Ok(()));
  }

  #[test]
  fn test_coalesce_is_a_no_op_on_used_or_missing_neighbour() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 20, true);
    let b = grow_block(&mut arena, &mut list, 32, false);

    assert_eq!(list.coalesce(a), a);
    assert_eq!(list.coalesce(b), b);
    assert_eq!(sizes(&list), vec![(20, true), (32, false)]);
  }

  #[test]
  fn test_coalesce_never_crosses_a_seam() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 20, true);
    arena.skip(16).unwrap();
    grow_block(&mut arena, &mut list, 12, true);

    assert_eq!(list.coalesce(a), a);
    assert_eq!(sizes(&list), vec![(20, true), (12, true)]);
    assert_eq!(list.check(), Ok(()));
  }

  #[test]
  fn test_pop_back_empties_the_list() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 8, false);
    let b = grow_block(&mut arena, &mut list, 8, false);

    assert_eq!(list.pop_back(), Some(b));
    assert_eq!(list.tail(), Some(a));
    assert_eq!(list.pop_back(), Some(a));
    assert_eq!(list.nodes().next(), None);
    assert_eq!(list.tail(), None);
    assert_eq!(list.pop_back(), None);
    assert_eq!(list.check(), Ok(()));
  }

  #[test]
  fn test_find_by_payload_matches_exact_start_only() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    let a = grow_block(&mut arena, &mut list, 16, false);
    let payload = Block::payload(a);

    assert_eq!(list.find_by_payload(payload), Some(a));

    let interior = NonNull::new(payload.as_ptr().wrapping_add(4)).unwrap();
    assert_eq!(list.find_by_payload(interior), None);
  }

  #[test]
  fn test_check_reports_unmerged_neighbours() {
    let mut arena = Arena::with_capacity(1024);
    let mut list = BlockList::new();

    grow_block(&mut arena, &mut list, 8, true);
    let b = grow_block(&mut arena, &mut list, 8, true);

    assert_eq!(
      list.check(),
      Err(InvariantError::Unmerged {
        addr: b.as_ptr() as usize
      })
    );
  }
}
