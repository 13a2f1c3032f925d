//! Segregated explicit free lists, threaded through the free blocks' payloads.
//!
//! ```text
//!   heads[class] ──► ┌─────┬──────┬──────┬─────┬─────┐      ┌─────┬──────┬──────┬─────┐
//!                    │ hdr │ succ │ pred │ ... │ ftr │ ───► │ hdr │ succ │ pred │ ... │
//!                    └─────┴──────┴──────┴─────┴─────┘ ◄─── └─────┴──────┴──────┴─────┘
//! ```
//!
//! Links are `u32` offsets from the heap base rather than pointers. Offset `0`
//! means "no block": the prologue always occupies the start of the heap, so no
//! payload can live there.

use crate::{
  block::{Block, LINK_SIZE, read_word, write_word},
  class::{NUM_CLASSES, SizeClass},
};

/// Link value marking the end of a list.
pub const NIL: u32 = 0;

pub struct FreeLists {
  base: *mut u8,
  heads: [u32; NUM_CLASSES],
}

impl FreeLists {
  /// Empty lists whose links are relative to `base`.
  pub fn new(base: *mut u8) -> Self {
    Self {
      base,
      heads: [NIL; NUM_CLASSES],
    }
  }

  #[inline]
  fn offset_of(
    &self,
    block: Block,
  ) -> u32 {
    let offset = block.payload() as usize - self.base as usize;
    debug_assert!(offset != 0 && offset <= u32::MAX as usize);
    offset as u32
  }

  /// The address a link offset refers to.
  #[inline]
  pub fn address_of(
    &self,
    offset: u32,
  ) -> *mut u8 {
    self.base.wrapping_add(offset as usize)
  }

  #[inline]
  fn block_at(
    &self,
    offset: u32,
  ) -> Option<Block> {
    (offset != NIL).then(|| Block::from_payload(self.address_of(offset)))
  }

  /// Raw `(successor, predecessor)` offsets stored in a free block.
  ///
  /// # Safety
  /// The block's first two payload words must be readable.
  #[inline]
  pub unsafe fn raw_links(
    &self,
    block: Block,
  ) -> (u32, u32) {
    let bp = block.payload();
    unsafe { (read_word(bp), read_word(bp.wrapping_add(LINK_SIZE))) }
  }

  #[inline]
  unsafe fn write_links(
    &self,
    block: Block,
    successor: u32,
    predecessor: u32,
  ) {
    let bp = block.payload();
    unsafe {
      write_word(bp, successor);
      write_word(bp.wrapping_add(LINK_SIZE), predecessor);
    }
  }

  #[inline]
  unsafe fn set_successor(
    &self,
    block: Block,
    successor: u32,
  ) {
    unsafe { write_word(block.payload(), successor) }
  }

  #[inline]
  unsafe fn set_predecessor(
    &self,
    block: Block,
    predecessor: u32,
  ) {
    unsafe { write_word(block.payload().wrapping_add(LINK_SIZE), predecessor) }
  }

  /// # Safety
  /// `block` must be a listed free block.
  #[inline]
  pub unsafe fn successor(
    &self,
    block: Block,
  ) -> Option<Block> {
    self.block_at(unsafe { self.raw_links(block) }.0)
  }

  /// # Safety
  /// `block` must be a listed free block.
  #[cfg(test)]
  pub unsafe fn predecessor(
    &self,
    block: Block,
  ) -> Option<Block> {
    self.block_at(unsafe { self.raw_links(block) }.1)
  }

  #[inline]
  pub fn head(
    &self,
    class: SizeClass,
  ) -> Option<Block> {
    self.block_at(self.heads[class.index()])
  }

  #[inline]
  pub fn raw_head(
    &self,
    class: SizeClass,
  ) -> u32 {
    self.heads[class.index()]
  }

  /// Pushes a free block onto the front of the list for its current size.
  ///
  /// # Safety
  /// `block` must be a free block with valid tags, inside the heap, and not
  /// already listed.
  pub unsafe fn insert(
    &mut self,
    block: Block,
  ) {
    let class = SizeClass::bucket_for(unsafe { block.size() });
    let offset = self.offset_of(block);
    let old_head = self.heads[class.index()];

    unsafe {
      self.write_links(block, old_head, NIL);
      if let Some(head) = self.block_at(old_head) {
        self.set_predecessor(head, offset);
      }
    }

    self.heads[class.index()] = offset;
  }

  /// Splices a block out of its list and clears its links.
  ///
  /// # Safety
  /// `block` must currently be listed, and its size must still be the one it
  /// was inserted with.
  pub unsafe fn remove(
    &mut self,
    block: Block,
  ) {
    let (successor, predecessor) = unsafe { self.raw_links(block) };

    unsafe {
      match (self.block_at(predecessor), self.block_at(successor)) {
        (None, None) => {
          let class = SizeClass::bucket_for(block.size());
          debug_assert_eq!(self.heads[class.index()], self.offset_of(block));
          self.heads[class.index()] = NIL;
        }
        (None, Some(next)) => {
          let class = SizeClass::bucket_for(block.size());
          debug_assert_eq!(self.heads[class.index()], self.offset_of(block));
          self.heads[class.index()] = successor;
          self.set_predecessor(next, NIL);
        }
        (Some(prev), None) => {
          self.set_successor(prev, NIL);
        }
        (Some(prev), Some(next)) => {
          self.set_successor(prev, successor);
          self.set_predecessor(next, predecessor);
        }
      }

      self.write_links(block, NIL, NIL);
    }
  }

  /// Walks one class list from its head.
  ///
  /// # Safety
  /// The list must be well formed for as long as the iterator is used.
  pub unsafe fn iter(
    &self,
    class: SizeClass,
  ) -> ClassIter<'_> {
    ClassIter {
      lists: self,
      current: self.head(class),
    }
  }
}

pub struct ClassIter<'a> {
  lists: &'a FreeLists,
  current: Option<Block>,
}

impl Iterator for ClassIter<'_> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = self.current?;
    // Safety: upheld by the caller of `FreeLists::iter`.
    self.current = unsafe { self.lists.successor(block) };
    Some(block)
  }
}
