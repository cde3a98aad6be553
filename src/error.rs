use thiserror::Error;

use crate::region::RegionError;

/// Errors surfaced by [`Allocator`](crate::Allocator) operations.
///
/// All of them are local and recoverable: a failed call leaves the heap
/// exactly as it found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The heap region refused to grow.
  #[error("out of memory: {0}")]
  OutOfMemory(#[from] RegionError),
  /// The requested byte count does not fit in a `usize` once rounded.
  #[error("requested size overflows usize")]
  SizeOverflow,
  /// The address is not the payload start of any tracked block.
  #[error("{addr:#x} was not handed out by this allocator")]
  InvalidPointer { addr: usize },
  /// The address belongs to a block that is already free.
  #[error("{addr:#x} is already free")]
  DoubleFree { addr: usize },
}

pub type Result<T> = std::result::Result<T, AllocError>;
