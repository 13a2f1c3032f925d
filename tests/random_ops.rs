use std::slice;

use proptest::prelude::*;
use segallocator::{ALIGNMENT, Heap, HeapConfig};

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Zeroed(usize, usize),
  Free(usize),
  Reallocate(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  let size = prop_oneof![4 => 1usize..256, 2 => 256usize..4096, 1 => 4096usize..40_000];
  prop_oneof![
    4 => size.clone().prop_map(Op::Allocate),
    1 => (1usize..64, 1usize..64).prop_map(|(count, elem)| Op::Zeroed(count, elem)),
    3 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), size).prop_map(|(index, size)| Op::Reallocate(index, size)),
  ]
}

struct Live {
  ptr: *mut u8,
  len: usize,
  tag: u8,
}

fn fill(live: &Live) {
  unsafe { live.ptr.write_bytes(live.tag, live.len) };
}

fn intact(live: &Live) -> bool {
  unsafe { slice::from_raw_parts(live.ptr, live.len) }
    .iter()
    .all(|&b| b == live.tag)
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn random_sequences_keep_heap_sound(ops in prop::collection::vec(op(), 1..120)) {
    let mut heap = Heap::with_config(
      HeapConfig::default()
        .with_chunk_size(1024)
        .with_region_capacity(512 * 1024),
    )
    .unwrap();
    let mut live: Vec<Live> = Vec::new();
    let mut next_tag = 1u8;

    for op in ops {
      match op {
        Op::Allocate(size) => {
          if let Some(ptr) = heap.allocate(size) {
            let entry = Live { ptr: ptr.as_ptr(), len: size, tag: next_tag };
            fill(&entry);
            live.push(entry);
          }
        }
        Op::Zeroed(count, elem) => {
          if let Some(ptr) = heap.zeroed_allocate(count, elem) {
            let entry = Live { ptr: ptr.as_ptr(), len: count * elem, tag: 0 };
            prop_assert!(intact(&entry));
            live.push(entry);
          }
        }
        Op::Free(index) => {
          if !live.is_empty() {
            let entry = live.swap_remove(index % live.len());
            unsafe { heap.deallocate(entry.ptr) };
          }
        }
        Op::Reallocate(index, size) => {
          if !live.is_empty() {
            let index = index % live.len();
            let old = &live[index];
            if let Some(ptr) = unsafe { heap.reallocate(old.ptr, size) } {
              let kept = old.len.min(size);
              let prefix = Live { ptr: ptr.as_ptr(), len: kept, tag: old.tag };
              prop_assert!(intact(&prefix));

              let entry = Live { ptr: ptr.as_ptr(), len: size, tag: next_tag };
              fill(&entry);
              live[index] = entry;
            } else {
              prop_assert!(intact(old));
            }
          }
        }
      }
      next_tag = next_tag.wrapping_add(1).max(1);

      for entry in &live {
        prop_assert_eq!(entry.ptr as usize % ALIGNMENT, 0);
        prop_assert!(unsafe { heap.usable_size(entry.ptr) } >= entry.len, "usable_size < requested len");
        prop_assert!(intact(entry));
      }

      let mut ranges: Vec<(usize, usize)> = live
        .iter()
        .map(|entry| (entry.ptr as usize, entry.ptr as usize + entry.len))
        .collect();
      ranges.sort();
      for pair in ranges.windows(2) {
        prop_assert!(pair[0].1 <= pair[1].0);
      }

      let report = heap.validate(false);
      prop_assert!(report.is_consistent(), "{}", report);
    }

    for entry in live {
      unsafe { heap.deallocate(entry.ptr) };
    }
    let stats = heap.stats();
    prop_assert_eq!(stats.allocated_blocks, 0);
    prop_assert_eq!(stats.free_blocks, 1);
  }
}
