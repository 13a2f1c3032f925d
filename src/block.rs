//! Boundary-tag block layout.
//!
//! ```text
//!          header                                      footer
//!   ┌──────────────┬──────────────────────────────┬──────────────┐
//!   │ size | alloc │           payload            │ size | alloc │
//!   └──────────────┴──────────────────────────────┴──────────────┘
//!    4 bytes       ▲                               4 bytes
//!                  └── block pointer (payload), ALIGNMENT-aligned
//! ```
//!
//! Sizes always include both tags and are multiples of [`ALIGNMENT`], so the
//! three low bits of a tag are free; bit 0 carries the allocated flag.

use std::mem;

use crate::align;

/// Header/footer word size.
pub const WSIZE: usize = mem::size_of::<u32>();

/// Per-block tag overhead: one header word plus one footer word.
pub const DSIZE: usize = 2 * WSIZE;

/// Payload alignment: the platform double word.
pub const ALIGNMENT: usize = 2 * mem::size_of::<usize>();

/// A free-list link, stored as an offset from the heap base.
pub const LINK_SIZE: usize = mem::size_of::<u32>();

/// Smallest block able to hold its tags and both free-list links.
pub const MIN_BLOCK_SIZE: usize = align!(DSIZE + 2 * LINK_SIZE);

const ALLOCATED: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Packs a block size and allocated flag into a tag word.
#[inline]
pub fn pack(
  size: usize,
  allocated: bool,
) -> u32 {
  debug_assert!(size & 0x7 == 0, "block size {size} has tag bits set");
  debug_assert!(size <= SIZE_MASK as usize, "block size {size} overflows a tag");
  size as u32 | allocated as u32
}

/// Splits a tag word into `(size, allocated)`.
#[inline]
pub fn unpack(word: u32) -> (usize, bool) {
  ((word & SIZE_MASK) as usize, word & ALLOCATED != 0)
}

/// A block, addressed by its payload pointer.
///
/// Address arithmetic is safe; anything that reads or writes tags is
/// `unsafe` because the pointer must sit inside a heap with intact tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  bp: *mut u8,
}

impl Block {
  /// Wraps a payload pointer.
  #[inline]
  pub fn from_payload(bp: *mut u8) -> Self {
    debug_assert!(
      bp as usize % ALIGNMENT == 0,
      "payload {bp:?} is not {ALIGNMENT}-byte aligned"
    );
    Self { bp }
  }

  #[inline]
  pub fn payload(self) -> *mut u8 {
    self.bp
  }

  #[inline]
  pub fn header_address(self) -> *mut u8 {
    self.bp.wrapping_sub(WSIZE)
  }

  /// # Safety
  /// The header must be readable.
  #[inline]
  pub unsafe fn footer_address(self) -> *mut u8 {
    unsafe { self.bp.wrapping_add(self.size()).wrapping_sub(DSIZE) }
  }

  /// # Safety
  /// The header must be readable.
  #[inline]
  pub unsafe fn next_block_address(self) -> *mut u8 {
    unsafe { self.bp.wrapping_add(self.size()) }
  }

  /// Uses the previous block's footer, which sits just below our header.
  ///
  /// # Safety
  /// The previous block's footer must be readable.
  #[inline]
  pub unsafe fn prev_block_address(self) -> *mut u8 {
    let (prev_size, _) = unpack(unsafe { read_word(self.bp.wrapping_sub(DSIZE)) });
    self.bp.wrapping_sub(prev_size)
  }

  /// # Safety
  /// See [`Block::next_block_address`].
  #[inline]
  pub unsafe fn next(self) -> Block {
    Block::from_payload(unsafe { self.next_block_address() })
  }

  /// # Safety
  /// See [`Block::prev_block_address`].
  #[inline]
  pub unsafe fn prev(self) -> Block {
    Block::from_payload(unsafe { self.prev_block_address() })
  }

  /// # Safety
  /// The header must be readable.
  #[inline]
  pub unsafe fn header(self) -> u32 {
    unsafe { read_word(self.header_address()) }
  }

  /// # Safety
  /// Header and footer must be readable.
  #[inline]
  pub unsafe fn footer(self) -> u32 {
    unsafe { read_word(self.footer_address()) }
  }

  /// # Safety
  /// The header must be readable.
  #[inline]
  pub unsafe fn size(self) -> usize {
    unpack(unsafe { self.header() }).0
  }

  /// # Safety
  /// The header must be readable.
  #[inline]
  pub unsafe fn is_allocated(self) -> bool {
    unpack(unsafe { self.header() }).1
  }

  /// Reads the allocated bit of the physically previous block from its footer.
  ///
  /// # Safety
  /// The previous block's footer must be readable.
  #[inline]
  pub unsafe fn prev_is_allocated(self) -> bool {
    unpack(unsafe { read_word(self.bp.wrapping_sub(DSIZE)) }).1
  }

  /// Payload bytes available to the caller.
  ///
  /// # Safety
  /// The header must be readable.
  #[inline]
  pub unsafe fn usable_size(self) -> usize {
    unsafe { self.size() - DSIZE }
  }

  /// Writes matching header and footer tags.
  ///
  /// # Safety
  /// `[header, header + size)` must be writable heap memory.
  #[inline]
  pub unsafe fn write_tags(
    self,
    size: usize,
    allocated: bool,
  ) {
    let word = pack(size, allocated);
    unsafe {
      write_word(self.header_address(), word);
      write_word(self.bp.wrapping_add(size).wrapping_sub(DSIZE), word);
    }
  }

  /// Writes only the header. Used for the zero-size epilogue.
  ///
  /// # Safety
  /// The header word must be writable.
  #[inline]
  pub unsafe fn write_header(
    self,
    size: usize,
    allocated: bool,
  ) {
    unsafe { write_word(self.header_address(), pack(size, allocated)) }
  }
}

/// # Safety
/// `addr` must be readable and 4-byte aligned.
#[inline]
pub unsafe fn read_word(addr: *const u8) -> u32 {
  unsafe { (addr as *const u32).read() }
}

/// # Safety
/// `addr` must be writable and 4-byte aligned.
#[inline]
pub unsafe fn write_word(
  addr: *mut u8,
  word: u32,
) {
  unsafe { (addr as *mut u32).write(word) }
}
