//! # segallocator - A Segregated Free List Heap Allocator
//!
//! This crate provides a `malloc`-style allocator with boundary tags,
//! size-classed explicit free lists and immediate coalescing, managing one
//! contiguous address range that grows on demand (through `sbrk(2)` or a
//! simulated region).
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │  ┌────┬─────┬──────┬────────┬──────┬─────┬──────────────────┬────┐   │
//!   │  │pad │ pro │  A1  │  free  │  A2  │ A3  │       free       │epi │   │
//!   │  └────┴─────┴──────┴────────┴──────┴─────┴──────────────────┴────┘   │
//!   │                          ▲                        ▲              ▲   │
//!   │                          │                        │              │   │
//!   │                          └──── size-class lists ──┘           high   │
//!   │                                                            (break)   │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Freed blocks merge with free neighbours at once.
//!   Allocation: bounded best fit within a class, escalating to larger ones.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segallocator
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Boundary tags and neighbour arithmetic (internal)
//!   ├── class      - Size classes
//!   ├── free_list  - Segregated doubly linked free lists (internal)
//!   ├── fit        - Fit search and placement (internal)
//!   ├── coalesce   - Boundary-tag coalescing (internal)
//!   ├── heap       - Heap: allocate, deallocate, reallocate, zeroed_allocate
//!   ├── check      - Heap validator
//!   ├── space      - Address-space providers (MemRegion, Sbrk)
//!   ├── config     - HeapConfig
//!   ├── error      - Error types
//!   └── logging    - tracing setup
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segallocator::Heap;
//!
//! let mut heap = Heap::with_capacity(1 << 20).unwrap();
//!
//! let ptr = heap.allocate(64).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0x2A, 64);
//!
//!     let bigger = heap.reallocate(ptr.as_ptr(), 1000).unwrap();
//!     assert_eq!(*bigger.as_ptr(), 0x2A);
//!
//!     heap.deallocate(bigger.as_ptr());
//! }
//!
//! assert!(heap.validate(false).is_consistent());
//! ```
//!
//! ## How It Works
//!
//! Each block carries its size and allocated bit at both ends:
//!
//! ```text
//!   Allocated Block:                     Free Block:
//!   ┌────────┬──────────────┬────────┐   ┌────────┬──────┬──────┬─────┬────────┐
//!   │ size|1 │   payload    │ size|1 │   │ size|0 │ succ │ pred │ ... │ size|0 │
//!   └────────┴──────────────┴────────┘   └────────┴──────┴──────┴─────┴────────┘
//!            ▲                                    ▲
//!            └── pointer returned to user         └── links: u32 offsets from
//!                                                     the heap base
//! ```
//!
//! The footer lets a block find its physical predecessor, so freeing merges
//! with both neighbours in constant time. Free blocks are threaded onto one of
//! nine lists by size: `≤32, ≤128, ≤512, ≤1K, ≤2K, ≤4K, ≤8K, ≤16K, >16K`.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **Never shrinks**: memory is not returned to the address space
//! - **4 GiB heaps**: tags and links are 32 bits wide
//! - **Double-word alignment**: larger `Layout` alignments are refused
//!
//! ## Safety
//!
//! Freeing and resizing trust the caller's pointer, as `free(3)` does:
//! [`Heap::deallocate`], [`Heap::reallocate`] and [`Heap::usable_size`] are
//! `unsafe`. Debug builds assert that the pointer is aligned, inside the heap
//! and allocated; release builds do not check.

pub mod align;
mod block;
mod check;
mod class;
mod coalesce;
mod config;
mod error;
mod fit;
mod free_list;
mod heap;
pub mod logging;
mod space;

pub use block::{ALIGNMENT, MIN_BLOCK_SIZE};
pub use check::{Corruption, HeapCorrupted, HeapReport};
pub use class::{NUM_CLASSES, SizeClass};
pub use config::{DEFAULT_CHUNK_SIZE, DEFAULT_FIT_WINDOW, DEFAULT_REGION_CAPACITY, HeapConfig};
pub use error::{AllocError, SpaceError};
pub use heap::{BlockInfo, Heap, HeapStats, MAX_BLOCK_SIZE, adjust_size};
#[cfg(unix)]
pub use space::Sbrk;
pub use space::{AddressSpace, MemRegion};
