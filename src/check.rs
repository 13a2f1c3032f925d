//! Heap consistency checker.
//!
//! Two independent walks: one over every block in address order, one over
//! every size-class list. Their free-block counts must agree. Findings are
//! collected, logged and returned; nothing is repaired.

use std::fmt;

use tracing::{debug, error};

use crate::{
  block::{ALIGNMENT, Block, MIN_BLOCK_SIZE, pack, unpack},
  class::SizeClass,
  free_list::NIL,
  heap::Heap,
  space::AddressSpace,
};

/// One structural defect. Offsets are bytes from the heap's low end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Corruption {
  #[error("bad prologue: header {header:#x}, footer {footer:#x}")]
  BadPrologue { header: u32, footer: u32 },

  #[error("bad epilogue at offset {offset}: header {header:#x}")]
  BadEpilogue { offset: usize, header: u32 },

  #[error("block at offset {offset} has invalid size {size}")]
  BadSize { offset: usize, size: usize },

  #[error("block at offset {offset} of size {size} runs past the heap end")]
  OutOfBounds { offset: usize, size: usize },

  #[error("block at offset {offset}: header {header:#x} and footer {footer:#x} disagree")]
  TagMismatch { offset: usize, header: u32, footer: u32 },

  #[error("free blocks at offsets {first} and {second} are adjacent")]
  AdjacentFree { first: usize, second: usize },

  #[error("class {class} links to offset {offset}, outside the heap")]
  LinkOutOfBounds { class: usize, offset: usize },

  #[error("class {class} links to misaligned offset {offset}")]
  Misaligned { class: usize, offset: usize },

  #[error("allocated block at offset {offset} is listed in class {class}")]
  AllocatedInList { class: usize, offset: usize },

  #[error("block at offset {offset} of size {size} is listed in class {class}, belongs in {expected}")]
  WrongClass {
    class: usize,
    offset: usize,
    size: usize,
    expected: usize,
  },

  #[error("block at offset {offset} records predecessor {recorded}, reached from {expected}")]
  BrokenLink {
    offset: usize,
    recorded: usize,
    expected: usize,
  },

  #[error("class {class} list does not terminate")]
  Cycle { class: usize },

  #[error("heap walk found {walked} free blocks, lists hold {listed}")]
  FreeCountMismatch { walked: usize, listed: usize },
}

/// Outcome of [`Heap::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReport {
  /// Blocks between prologue and epilogue.
  pub blocks: usize,
  pub free_blocks_walked: usize,
  pub free_blocks_listed: usize,
  pub issues: Vec<Corruption>,
}

impl HeapReport {
  pub fn is_consistent(&self) -> bool {
    self.issues.is_empty()
  }

  pub fn into_result(self) -> Result<HeapReport, HeapCorrupted> {
    if self.is_consistent() {
      Ok(self)
    } else {
      Err(HeapCorrupted { issues: self.issues })
    }
  }
}

impl fmt::Display for HeapReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "{} blocks, {} free by walk, {} free by lists",
      self.blocks, self.free_blocks_walked, self.free_blocks_listed
    )?;
    for issue in &self.issues {
      write!(f, "\n  {issue}")?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("heap check found {} inconsistencies", issues.len())]
pub struct HeapCorrupted {
  pub issues: Vec<Corruption>,
}

impl<A: AddressSpace> Heap<A> {
  /// Checks every block and every free list. `verbose` logs each block at
  /// debug level.
  pub fn validate(
    &self,
    verbose: bool,
  ) -> HeapReport {
    let mut report = HeapReport::default();

    self.walk_blocks(verbose, &mut report);
    self.walk_lists(&mut report);

    if report.free_blocks_walked != report.free_blocks_listed {
      report.issues.push(Corruption::FreeCountMismatch {
        walked: report.free_blocks_walked,
        listed: report.free_blocks_listed,
      });
    }

    for issue in &report.issues {
      error!(target: "segallocator", %issue, "heap inconsistency");
    }

    report
  }

  fn walk_blocks(
    &self,
    verbose: bool,
    report: &mut HeapReport,
  ) {
    let low = self.space.region_low() as usize;
    let high = self.space.region_high() as usize;
    let offset_of = |block: Block| block.payload() as usize - low;

    unsafe {
      let (header, footer) = (self.prologue.header(), self.prologue.footer());
      if header != pack(ALIGNMENT, true) || footer != header {
        report.issues.push(Corruption::BadPrologue { header, footer });
        return;
      }

      let mut block = self.prologue.next();
      let mut previous_free: Option<usize> = None;

      loop {
        let bp = block.payload() as usize;
        let offset = offset_of(block);

        if bp > high {
          report.issues.push(Corruption::OutOfBounds { offset, size: 0 });
          return;
        }

        let header = block.header();
        let (size, allocated) = unpack(header);

        if size == 0 {
          if !allocated || bp != high {
            report.issues.push(Corruption::BadEpilogue { offset, header });
          } else if verbose {
            debug!(target: "segallocator", offset, "epilogue");
          }
          return;
        }

        if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
          report.issues.push(Corruption::BadSize { offset, size });
          return;
        }

        if bp + size > high {
          report.issues.push(Corruption::OutOfBounds { offset, size });
          return;
        }

        let footer = block.footer();
        if header != footer {
          report.issues.push(Corruption::TagMismatch { offset, header, footer });
        }

        if verbose {
          debug!(target: "segallocator", offset, size, allocated, "block");
        }

        report.blocks += 1;
        if allocated {
          previous_free = None;
        } else {
          report.free_blocks_walked += 1;
          if let Some(first) = previous_free {
            report.issues.push(Corruption::AdjacentFree { first, second: offset });
          }
          previous_free = Some(offset);
        }

        block = block.next();
      }
    }
  }

  fn walk_lists(
    &self,
    report: &mut HeapReport,
  ) {
    let low = self.space.region_low() as usize;
    let high = self.space.region_high() as usize;
    let first_payload = self.prologue.payload() as usize - low + ALIGNMENT;
    let max_steps = (high - low) / MIN_BLOCK_SIZE + 1;

    for class in SizeClass::all() {
      let class_id = class.index();
      let mut expected_predecessor = NIL;
      let mut current = self.lists.raw_head(class);
      let mut steps = 0;

      while current != NIL {
        steps += 1;
        if steps > max_steps {
          report.issues.push(Corruption::Cycle { class: class_id });
          break;
        }

        let offset = current as usize;
        if offset < first_payload || low + offset >= high {
          report.issues.push(Corruption::LinkOutOfBounds { class: class_id, offset });
          break;
        }
        if (low + offset) % ALIGNMENT != 0 {
          report.issues.push(Corruption::Misaligned { class: class_id, offset });
          break;
        }

        let block = Block::from_payload(self.lists.address_of(current));
        let (size, allocated) = unpack(unsafe { block.header() });

        if size % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE {
          report.issues.push(Corruption::BadSize { offset, size });
          break;
        }
        if low + offset + size > high {
          report.issues.push(Corruption::OutOfBounds { offset, size });
          break;
        }
        if allocated {
          report.issues.push(Corruption::AllocatedInList { class: class_id, offset });
        }

        let expected = SizeClass::bucket_for(size);
        if expected != class {
          report.issues.push(Corruption::WrongClass {
            class: class_id,
            offset,
            size,
            expected: expected.index(),
          });
        }

        let (successor, predecessor) = unsafe { self.lists.raw_links(block) };
        if predecessor != expected_predecessor {
          report.issues.push(Corruption::BrokenLink {
            offset,
            recorded: predecessor as usize,
            expected: expected_predecessor as usize,
          });
        }

        report.free_blocks_listed += 1;
        expected_predecessor = current;
        current = successor;
      }
    }
  }
}
