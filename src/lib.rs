//! # firstfit - A First-Fit Heap Allocator
//!
//! This crate provides a **first-fit free-list allocator** that manages a
//! contiguous, upward-growing heap region such as the one behind `sbrk(2)`.
//!
//! ## Overview
//!
//! Every allocation lives in a block: a small header followed by the caller's
//! payload. Blocks are threaded through the heap itself in a doubly linked
//! list kept in address order:
//!
//! ```text
//!   Heap Region:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                                                                      │
//!   │   ┌─────┬──────┬─────┬──────┬─────┬──────┬─────┬──────┐              │
//!   │   │ hdr │  A   │ hdr │ free │ hdr │  B   │ hdr │  C   │              │
//!   │   └─────┴──────┴─────┴──────┴─────┴──────┴─────┴──────┘              │
//!   │                                                       ▲              │
//!   │                                                       │              │
//!   │                                                 High-water mark      │
//!   │                                                (program break)       │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Allocation** scans the list from the lowest address and takes the
//!   first free block that is large enough. An oversized block is split when
//!   the leftover can hold a header plus one 4-byte quantum. If nothing fits,
//!   the region grows by exactly one header plus the rounded request.
//! - **Release** marks the block free, merges it with a free predecessor and
//!   a free successor, and if the result is the last block, hands its memory
//!   back to the region.
//!
//! ```text
//!   release(B) with free neighbours:
//!
//!   ┌─────┬──────┬─────┬──────┬─────┬──────┐      ┌─────┬──────────────────────────┐
//!   │ hdr │ free │ hdr │  B   │ hdr │ free │  ──▶ │ hdr │  free (a + hdr + b + hdr + c)
//!   └─────┴──────┴─────┴──────┴─────┴──────┘      └─────┴──────────────────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   firstfit
//!   ├── align       - Alignment macros and size rounding
//!   ├── block       - Block header layout (internal)
//!   ├── block_list  - Address-ordered block list (internal)
//!   ├── region      - HeapRegion trait
//!   ├── sbrk        - Region on the process break (unix)
//!   ├── arena       - Region on a fixed buffer
//!   ├── allocator   - Allocator implementation
//!   └── locked      - Allocator behind a spin lock
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use firstfit::{Allocator, Arena};
//!
//! let mut allocator = Allocator::new(Arena::with_capacity(4096));
//!
//! let ptr = allocator.allocate(20).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0x2A, 20) };
//!
//! let zeroed = allocator.zero_allocate(10, 4).unwrap();
//! assert_eq!(unsafe { *zeroed.as_ptr().add(39) }, 0);
//!
//! allocator.release(zeroed);
//! allocator.release(ptr);
//!
//! // Both blocks merged into the tail and went back to the region.
//! assert_eq!(allocator.blocks().count(), 0);
//! assert_eq!(allocator.region().used(), 0);
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded core**: use [`LockedAllocator`] to share an instance
//! - **4-byte alignment only**: payloads are rounded to multiples of 4
//! - **No resizing**: there is no `realloc`
//! - **O(n) operations**: search and release walk the whole list
//!
//! ## Logging
//!
//! Decisions are reported through the [`log`] facade: list mutations at
//! `trace`, heap growth and splits at `debug`, ignored releases at `warn`.

pub mod align;
mod allocator;
mod arena;
mod block;
mod block_list;
mod error;
mod locked;
mod region;
#[cfg(unix)]
mod sbrk;

pub use allocator::{Allocator, HeapStats};
pub use arena::Arena;
pub use block::{BlockInfo, HEADER_SIZE};
pub use block_list::InvariantError;
pub use error::{AllocError, Result};
pub use locked::LockedAllocator;
pub use region::{HeapRegion, RegionError};
#[cfg(unix)]
pub use sbrk::{Sbrk, print_alloc};
