//! Bounded best-fit search and block placement.

use crate::{
  block::{Block, MIN_BLOCK_SIZE},
  class::SizeClass,
  heap::Heap,
  space::AddressSpace,
};

impl<A: AddressSpace> Heap<A> {
  /// Finds a listed free block of at least `asize` bytes.
  ///
  /// Classes are scanned from `asize`'s own upwards. Within a class the first
  /// `fit_window` adequate blocks are compared and the one leaving the least
  /// slack wins; an exact fit ends the scan at once.
  pub(crate) fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    for class in SizeClass::bucket_for(asize).and_larger() {
      let mut best: Option<(Block, usize)> = None;
      let mut candidates = 0;

      for block in unsafe { self.lists.iter(class) } {
        let size = unsafe { block.size() };
        if size < asize {
          continue;
        }

        let leftover = size - asize;
        if best.is_none_or(|(_, best_leftover)| leftover < best_leftover) {
          best = Some((block, leftover));
        }

        candidates += 1;
        if leftover == 0 || candidates >= self.config.fit_window {
          break;
        }
      }

      if let Some((block, _)) = best {
        return Some(block);
      }
    }

    None
  }

  /// Allocates `asize` bytes at the front of the listed free `block`.
  ///
  /// A remainder of at least [`MIN_BLOCK_SIZE`] is split off and listed under
  /// its own class; anything smaller stays inside the allocation.
  ///
  /// # Safety
  /// `block` must be a listed free block of at least `asize` bytes.
  pub(crate) unsafe fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    unsafe {
      let size = block.size();
      debug_assert!(size >= asize);

      self.lists.remove(block);

      if size - asize >= MIN_BLOCK_SIZE {
        block.write_tags(asize, true);
        let remainder = block.next();
        remainder.write_tags(size - asize, false);
        self.lists.insert(remainder);
      } else {
        block.write_tags(size, true);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::{HeapConfig, heap::Heap};

  fn heap_with_window(fit_window: usize) -> Heap {
    Heap::with_config(
      HeapConfig::default()
        .with_chunk_size(4096)
        .with_region_capacity(64 * 1024)
        .with_fit_window(fit_window),
    )
    .unwrap()
  }

  /// Leaves free holes of the given payload sizes, each fenced by live blocks,
  /// and returns their payload pointers in address order.
  fn punch_holes(
    heap: &mut Heap,
    sizes: &[usize],
  ) -> Vec<*mut u8> {
    let mut holes = Vec::new();
    for &size in sizes {
      holes.push(heap.allocate(size).unwrap().as_ptr());
      heap.allocate(8).unwrap();
    }
    for &hole in &holes {
      unsafe { heap.deallocate(hole) };
    }
    holes
  }

  #[test]
  fn test_bounded_best_fit_prefers_least_slack() {
    let mut heap = heap_with_window(3);
    // Same class (129..=512 block bytes); freed last is listed first.
    let holes = punch_holes(&mut heap, &[200, 136, 300]);

    let ptr = heap.allocate(130).unwrap();
    assert_eq!(ptr.as_ptr(), holes[1]);
  }

  #[test]
  fn test_window_of_one_is_first_fit() {
    let mut heap = heap_with_window(1);
    let holes = punch_holes(&mut heap, &[200, 136, 300]);

    let ptr = heap.allocate(130).unwrap();
    assert_eq!(ptr.as_ptr(), holes[2]);
  }

  #[test]
  fn test_candidates_past_the_window_are_not_examined() {
    // Freed in address order, so the list runs 300, 250, 200, 136 and the
    // exact fit for a 130-byte request comes fourth.
    let hole_sizes = [136, 200, 250, 300];

    let mut heap = heap_with_window(3);
    let holes = punch_holes(&mut heap, &hole_sizes);
    let ptr = heap.allocate(130).unwrap();
    assert_eq!(ptr.as_ptr(), holes[1]);
    assert_ne!(ptr.as_ptr(), holes[0]);

    let mut heap = heap_with_window(4);
    let holes = punch_holes(&mut heap, &hole_sizes);
    let ptr = heap.allocate(130).unwrap();
    assert_eq!(ptr.as_ptr(), holes[0]);
  }

  #[test]
  fn test_escalates_to_larger_class() {
    let mut heap = heap_with_window(3);
    let holes = punch_holes(&mut heap, &[1000]);
    let before = heap.stats().heap_size;

    let ptr = heap.allocate(40).unwrap();
    assert_eq!(ptr.as_ptr(), holes[0]);
    assert_eq!(heap.stats().heap_size, before);
  }
}
