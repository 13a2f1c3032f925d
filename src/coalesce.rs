//! Boundary-tag coalescing.

use tracing::trace;

use crate::{block::Block, heap::Heap, space::AddressSpace};

impl<A: AddressSpace> Heap<A> {
  /// Merges a free, unlisted block with its free physical neighbours and
  /// lists the result, which is returned.
  ///
  /// ```text
  ///   prev   block   next        merged at
  ///   alloc  free    alloc   ->  block
  ///   alloc  free    free    ->  block
  ///   free   free    alloc   ->  prev
  ///   free   free    free    ->  prev
  /// ```
  ///
  /// The prologue and epilogue are allocated, so every block has both
  /// neighbours.
  ///
  /// # Safety
  /// `block` must carry free tags and must not be listed.
  pub(crate) unsafe fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    unsafe {
      let prev_allocated = block.prev_is_allocated();
      let next = block.next();
      let next_allocated = next.is_allocated();
      let mut size = block.size();

      let merged = match (prev_allocated, next_allocated) {
        (true, true) => block,
        (true, false) => {
          self.lists.remove(next);
          size += next.size();
          block
        }
        (false, true) => {
          let prev = block.prev();
          self.lists.remove(prev);
          size += prev.size();
          prev
        }
        (false, false) => {
          let prev = block.prev();
          self.lists.remove(prev);
          self.lists.remove(next);
          size += prev.size() + next.size();
          prev
        }
      };

      trace!(
        target: "segallocator",
        prev_free = !prev_allocated,
        next_free = !next_allocated,
        size,
        "coalesced"
      );

      merged.write_tags(size, false);
      self.lists.insert(merged);
      merged
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{HeapConfig, heap::Heap};

  /// Four live neighbours `a b c d` followed by the free tail.
  fn four_blocks() -> (Heap, [*mut u8; 4]) {
    let mut heap = Heap::with_config(
      HeapConfig::default()
        .with_chunk_size(1024)
        .with_region_capacity(8 * 1024)
        .with_check_each_op(true),
    )
    .unwrap();

    let ptrs = [(); 4].map(|_| heap.allocate(40).unwrap().as_ptr());
    (heap, ptrs)
  }

  fn free_sizes(heap: &Heap) -> Vec<usize> {
    heap.blocks().filter(|b| !b.allocated).map(|b| b.size).collect()
  }

  #[test]
  fn test_neither_neighbour_free() {
    let (mut heap, [_, b, _, _]) = four_blocks();
    unsafe { heap.deallocate(b) };

    assert_eq!(heap.stats().free_blocks, 2);
    assert_eq!(free_sizes(&heap)[0], 48);
  }

  #[test]
  fn test_next_free() {
    let (mut heap, [_, b, c, _]) = four_blocks();
    unsafe {
      heap.deallocate(c);
      heap.deallocate(b);
    }

    let first = heap.blocks().find(|block| !block.allocated).unwrap();
    assert_eq!(first.payload, b);
    assert_eq!(first.size, 96);
  }

  #[test]
  fn test_prev_free() {
    let (mut heap, [_, b, c, _]) = four_blocks();
    unsafe {
      heap.deallocate(b);
      heap.deallocate(c);
    }

    let first = heap.blocks().find(|block| !block.allocated).unwrap();
    assert_eq!(first.payload, b);
    assert_eq!(first.size, 96);
  }

  #[test]
  fn test_both_free() {
    let (mut heap, [a, b, c, _]) = four_blocks();
    unsafe {
      heap.deallocate(a);
      heap.deallocate(c);
      heap.deallocate(b);
    }

    let first = heap.blocks().find(|block| !block.allocated).unwrap();
    assert_eq!(first.payload, a);
    assert_eq!(first.size, 144);
    assert_eq!(heap.stats().free_blocks, 2);
  }

  #[test]
  fn test_free_merges_into_tail() {
    let (mut heap, [a, b, c, d]) = four_blocks();
    unsafe {
      heap.deallocate(d);
      heap.deallocate(b);
      heap.deallocate(c);
      heap.deallocate(a);
    }

    assert_eq!(free_sizes(&heap), vec![1024]);
  }
}
