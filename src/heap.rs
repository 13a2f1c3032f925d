use std::{alloc::Layout, ptr, ptr::NonNull};

use tracing::{debug, warn};

use crate::{
  block::{ALIGNMENT, Block, DSIZE, MIN_BLOCK_SIZE, WSIZE},
  config::HeapConfig,
  error::{AllocError, Result},
  free_list::FreeLists,
  logging::{log_allocation, log_deallocation, log_reallocation},
  space::{AddressSpace, MemRegion},
};

/// Largest block a 32-bit tag can describe.
pub const MAX_BLOCK_SIZE: usize = u32::MAX as usize & !(ALIGNMENT - 1);

/// Largest heap the 32-bit free-list offsets can address.
pub const MAX_HEAP_SIZE: usize = u32::MAX as usize;

/// A segregated-free-list heap over one growable address range.
///
/// ```text
///   low                                                            high
///   ┌─────┬──────────┬─────────┬─────────┬─────────┬─────┬──────────┐
///   │ pad │ prologue │ block 1 │ block 2 │   ...   │ ... │ epilogue │
///   └─────┴──────────┴─────────┴─────────┴─────────┴─────┴──────────┘
///          allocated                                      size 0,
///          sentinel                                       allocated
/// ```
///
/// The heap is single threaded; wrap it in a lock to share it.
pub struct Heap<A: AddressSpace = MemRegion> {
  pub(crate) space: A,
  pub(crate) lists: FreeLists,
  pub(crate) prologue: Block,
  pub(crate) config: HeapConfig,
}

impl Heap<MemRegion> {
  /// A heap over a private simulated region of `capacity` bytes.
  pub fn with_capacity(capacity: usize) -> Result<Self> {
    Self::with_config(HeapConfig::default().with_region_capacity(capacity))
  }

  /// A heap over a private simulated region sized by `config.region_capacity`.
  pub fn with_config(config: HeapConfig) -> Result<Self> {
    let space = MemRegion::new(config.region_capacity)?;
    Heap::new(space, config)
  }
}

impl<A: AddressSpace> Heap<A> {
  /// Lays down the prologue and epilogue, then grows by one chunk.
  pub fn new(
    mut space: A,
    config: HeapConfig,
  ) -> Result<Self> {
    let start = space.extend_region(2 * ALIGNMENT)?.as_ptr();
    let base = space.region_low();
    debug_assert_eq!(start, base, "heap must start at the low end of its space");

    let prologue = Block::from_payload(start.wrapping_add(ALIGNMENT));

    unsafe {
      ptr::write_bytes(start, 0, ALIGNMENT - WSIZE);
      prologue.write_tags(ALIGNMENT, true);
      prologue.next().write_header(0, true);
    }

    let mut heap = Self {
      space,
      lists: FreeLists::new(base),
      prologue,
      config,
    };

    heap.extend(heap.config.chunk_size)?;
    debug!(
      target: "segallocator",
      base = ?base,
      size = heap.space.region_size(),
      "heap initialized"
    );

    Ok(heap)
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn space(&self) -> &A {
    &self.space
  }

  /// Returns a pointer to at least `size` bytes, or `None` for `size == 0`
  /// and when the address space cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }

    let result = self.allocate_block(size);
    self.after_op("allocate");

    match result {
      Ok(block) => NonNull::new(block.payload()),
      Err(err) => {
        warn!(target: "segallocator", size, %err, "allocation failed");
        None
      }
    }
  }

  /// Allocates for a `Layout`. Alignments above [`ALIGNMENT`] are refused.
  pub fn allocate_layout(
    &mut self,
    layout: Layout,
  ) -> Option<NonNull<u8>> {
    if layout.align() > ALIGNMENT {
      warn!(
        target: "segallocator",
        align = layout.align(),
        "alignment above the heap's double word is not supported"
      );
      return None;
    }
    self.allocate(layout.size())
  }

  /// Allocates `count * elem_size` zeroed bytes.
  ///
  /// A product that overflows `usize` fails like exhaustion.
  pub fn zeroed_allocate(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> Option<NonNull<u8>> {
    let Some(size) = count.checked_mul(elem_size) else {
      warn!(target: "segallocator", count, elem_size, "zeroed allocation size overflows");
      return None;
    };

    let ptr = self.allocate(size)?;
    unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
    Some(ptr)
  }

  /// Frees a block. A null pointer is ignored.
  ///
  /// # Safety
  /// `ptr` must be null or a live pointer returned by this heap. Debug builds
  /// assert alignment, bounds and the allocated bit; release builds trust it.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    let block = Block::from_payload(ptr);
    self.debug_check_live(block);

    let size = unsafe {
      let size = block.size();
      block.write_tags(size, false);
      self.coalesce(block);
      size
    };

    log_deallocation(size, ptr);
    self.after_op("deallocate");
  }

  /// Moves a block to one of `size` bytes, keeping the common prefix.
  ///
  /// `size == 0` frees `ptr` and returns `None`; a null `ptr` allocates. When
  /// the new block cannot be had, `ptr` is left untouched and `None` returned.
  ///
  /// # Safety
  /// Same contract as [`Heap::deallocate`].
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      unsafe { self.deallocate(ptr) };
      return None;
    }

    if ptr.is_null() {
      return self.allocate(size);
    }

    let old = Block::from_payload(ptr);
    self.debug_check_live(old);

    let new = self.allocate(size)?;

    unsafe {
      let count = size.min(old.usable_size());
      ptr::copy_nonoverlapping(ptr, new.as_ptr(), count);
      self.deallocate(ptr);
    }

    log_reallocation(ptr, new.as_ptr(), size);
    Some(new)
  }

  /// Payload bytes usable behind `ptr`; `0` for null.
  ///
  /// # Safety
  /// Same contract as [`Heap::deallocate`].
  pub unsafe fn usable_size(
    &self,
    ptr: *mut u8,
  ) -> usize {
    if ptr.is_null() {
      return 0;
    }

    let block = Block::from_payload(ptr);
    self.debug_check_live(block);
    unsafe { block.usable_size() }
  }

  /// Every block between prologue and epilogue, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    let mut current = unsafe { self.prologue.next() };

    std::iter::from_fn(move || {
      let block = current;
      let (size, allocated) = unsafe { (block.size(), block.is_allocated()) };
      if size == 0 {
        return None;
      }

      current = unsafe { block.next() };
      Some(BlockInfo {
        payload: block.payload(),
        size,
        allocated,
      })
    })
  }

  /// Usage summary from one pass over the heap.
  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.space.region_size(),
      ..HeapStats::default()
    };

    for block in self.blocks() {
      if block.allocated {
        stats.allocated_blocks += 1;
        stats.allocated_bytes += block.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      }
    }

    stats
  }

  fn allocate_block(
    &mut self,
    size: usize,
  ) -> Result<Block> {
    let asize = adjust_size(size)?;

    let block = match self.find_fit(asize) {
      Some(block) => block,
      None => self.extend(asize)?,
    };

    unsafe { self.place(block, asize) };
    log_allocation(size, asize, block.payload());

    Ok(block)
  }

  /// Grows the heap by at least `min_bytes` (and at least one chunk), turning
  /// the new span into a free block merged with a free tail, if any.
  pub(crate) fn extend(
    &mut self,
    min_bytes: usize,
  ) -> Result<Block> {
    let bytes = min_bytes
      .max(self.config.chunk_size)
      .max(MIN_BLOCK_SIZE)
      .checked_next_multiple_of(ALIGNMENT)
      .filter(|&bytes| bytes <= MAX_BLOCK_SIZE)
      .ok_or(AllocError::TooLarge { size: min_bytes })?;

    if self.space.region_size().saturating_add(bytes) > MAX_HEAP_SIZE {
      return Err(AllocError::Exhausted { requested: bytes });
    }

    let start = self.space.extend_region(bytes)?;

    // The old epilogue header becomes the new block's header.
    let block = Block::from_payload(start.as_ptr());
    let merged = unsafe {
      block.write_tags(bytes, false);
      block.next().write_header(0, true);
      self.coalesce(block)
    };

    debug!(
      target: "segallocator",
      bytes,
      heap_size = self.space.region_size(),
      "heap extended"
    );

    Ok(merged)
  }

  fn debug_check_live(
    &self,
    block: Block,
  ) {
    if cfg!(debug_assertions) {
      let bp = block.payload();
      assert!(
        bp > self.prologue.payload() && bp < self.space.region_high(),
        "pointer {bp:?} is outside the heap"
      );
      unsafe {
        assert!(block.is_allocated(), "pointer {bp:?} is not a live allocation");
        assert_eq!(block.header(), block.footer(), "tags of {bp:?} disagree");
      }
    }
  }

  fn after_op(
    &self,
    op: &str,
  ) {
    if self.config.check_each_op {
      let report = self.validate(false);
      if !report.is_consistent() {
        panic!("heap check failed after {op}: {report}");
      }
    }
  }
}

/// Block size for a `size`-byte request: tags added, rounded to the
/// alignment, never below the minimum block.
pub fn adjust_size(size: usize) -> Result<usize> {
  size
    .checked_add(DSIZE)
    .and_then(|total| total.checked_next_multiple_of(ALIGNMENT))
    .filter(|&total| total <= MAX_BLOCK_SIZE)
    .map(|total| total.max(MIN_BLOCK_SIZE))
    .ok_or(AllocError::TooLarge { size })
}

/// One block seen by an address-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: *mut u8,
  pub size: usize,
  pub allocated: bool,
}

impl BlockInfo {
  pub fn usable_size(&self) -> usize {
    self.size - DSIZE
  }
}

/// Heap usage, in bytes of whole blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub heap_size: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align;

  fn small_heap() -> Heap {
    Heap::with_config(
      HeapConfig::default()
        .with_chunk_size(256)
        .with_region_capacity(1024)
        .with_check_each_op(true),
    )
    .unwrap()
  }

  #[test]
  fn test_adjust_size() {
    assert_eq!(adjust_size(1).unwrap(), MIN_BLOCK_SIZE);
    assert_eq!(adjust_size(ALIGNMENT).unwrap(), align!(ALIGNMENT + DSIZE));
    assert_eq!(adjust_size(100).unwrap() % ALIGNMENT, 0);
    assert!(adjust_size(100).unwrap() >= 100 + DSIZE);
    assert!(matches!(adjust_size(usize::MAX), Err(AllocError::TooLarge { .. })));
    assert!(matches!(adjust_size(MAX_BLOCK_SIZE), Err(AllocError::TooLarge { .. })));
  }

  #[test]
  fn test_new_heap_is_one_free_chunk() {
    let heap = small_heap();
    let stats = heap.stats();

    assert_eq!(stats.heap_size, 2 * ALIGNMENT + 256);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 256);
    assert_eq!(stats.allocated_blocks, 0);
  }

  #[test]
  fn test_zero_size_has_no_effect() {
    let mut heap = small_heap();
    let before = heap.stats();

    assert!(heap.allocate(0).is_none());
    assert!(heap.zeroed_allocate(0, 8).is_none());
    unsafe { heap.deallocate(ptr::null_mut()) };

    assert_eq!(heap.stats(), before);
  }

  #[test]
  fn test_allocation_splits_chunk() {
    let mut heap = small_heap();

    let ptr = heap.allocate(24).unwrap();
    let asize = adjust_size(24).unwrap();
    let blocks: Vec<BlockInfo> = heap.blocks().collect();

    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].payload, ptr.as_ptr());
    assert_eq!(blocks[0].size, asize);
    assert!(blocks[0].allocated);
    assert_eq!(blocks[1].size, 256 - asize);
    assert!(!blocks[1].allocated);
    assert!(unsafe { heap.usable_size(ptr.as_ptr()) } >= 24);
  }

  #[test]
  fn test_exact_fit_takes_whole_block() {
    let mut heap = small_heap();

    let ptr = heap.allocate(256 - DSIZE).unwrap();
    let stats = heap.stats();

    assert_eq!(stats.free_blocks, 0);
    assert_eq!(stats.allocated_bytes, 256);
    assert_eq!(unsafe { heap.usable_size(ptr.as_ptr()) }, 256 - DSIZE);
  }

  #[test]
  fn test_miss_extends_heap() {
    let mut heap = small_heap();

    let ptr = heap.allocate(400).unwrap();
    let stats = heap.stats();

    assert!(stats.heap_size > 2 * ALIGNMENT + 256);
    assert_eq!(stats.allocated_blocks, 1);
    assert!(unsafe { heap.usable_size(ptr.as_ptr()) } >= 400);
    assert!(heap.validate(false).is_consistent());
  }

  #[test]
  fn test_exhaustion_leaves_heap_untouched() {
    let mut heap = small_heap();
    let live = heap.allocate(64).unwrap();
    let before = heap.stats();

    assert!(heap.allocate(4096).is_none());
    assert_eq!(heap.stats(), before);

    let moved = unsafe { heap.reallocate(live.as_ptr(), 4096) };
    assert!(moved.is_none());
    assert_eq!(heap.stats(), before);
    assert!(unsafe { heap.usable_size(live.as_ptr()) } >= 64);
  }

  #[test]
  fn test_reallocate_edges() {
    let mut heap = small_heap();

    let ptr = unsafe { heap.reallocate(ptr::null_mut(), 32) }.unwrap();
    assert_eq!(heap.stats().allocated_blocks, 1);

    assert!(unsafe { heap.reallocate(ptr.as_ptr(), 0) }.is_none());
    assert_eq!(heap.stats().allocated_blocks, 0);
    assert_eq!(heap.stats().free_blocks, 1);
  }

  #[test]
  fn test_reallocate_shrink_keeps_prefix() {
    let mut heap = small_heap();

    let ptr = heap.allocate(100).unwrap();
    unsafe {
      for i in 0..100 {
        ptr.as_ptr().add(i).write(i as u8);
      }

      let smaller = heap.reallocate(ptr.as_ptr(), 10).unwrap();
      for i in 0..10 {
        assert_eq!(smaller.as_ptr().add(i).read(), i as u8);
      }
    }
  }

  #[test]
  fn test_zeroed_allocate_clears_reused_memory() {
    let mut heap = small_heap();

    let dirty = heap.allocate(64).unwrap();
    unsafe {
      ptr::write_bytes(dirty.as_ptr(), 0xAB, 64);
      heap.deallocate(dirty.as_ptr());
    }

    let zeroed = heap.zeroed_allocate(8, 8).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(zeroed.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_zeroed_allocate_overflow() {
    let mut heap = small_heap();
    let before = heap.stats();

    assert!(heap.zeroed_allocate(usize::MAX, 2).is_none());
    assert_eq!(heap.stats(), before);
  }

  #[test]
  fn test_allocate_layout() {
    let mut heap = small_heap();

    let ptr = heap.allocate_layout(Layout::new::<u64>()).unwrap();
    assert_eq!(ptr.as_ptr() as usize % std::mem::align_of::<u64>(), 0);

    let over_aligned = Layout::from_size_align(8, ALIGNMENT * 2).unwrap();
    assert!(heap.allocate_layout(over_aligned).is_none());
  }

  #[test]
  fn test_heaps_are_independent() {
    let mut first = small_heap();
    let mut second = small_heap();

    let a = first.allocate(32).unwrap();
    let b = second.allocate(32).unwrap();

    assert_ne!(a, b);
    assert_eq!(first.stats().allocated_blocks, 1);
    assert_eq!(second.stats().allocated_blocks, 1);

    unsafe { first.deallocate(a.as_ptr()) };
    assert_eq!(first.stats().allocated_blocks, 0);
    assert_eq!(second.stats().allocated_blocks, 1);
  }
}
