//! Address-space providers: where the heap's bytes come from.
//!
//! ```text
//!   low                                 high                    capacity
//!    ├───────────── heap in use ─────────┼──────── reserve ────────┤
//!                                        └── extend_region(n) moves this up by n
//! ```

use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use crate::{block::ALIGNMENT, error::SpaceError};

/// A contiguous byte range that only grows at its high end.
///
/// Every successful [`extend_region`](AddressSpace::extend_region) must return
/// the previous high watermark, so the heap stays one unbroken range.
pub trait AddressSpace {
  /// Grows the range by `bytes` and returns the start of the new span.
  fn extend_region(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, SpaceError>;

  /// First byte of the range.
  fn region_low(&self) -> *mut u8;

  /// One past the last byte of the range.
  fn region_high(&self) -> *mut u8;

  fn region_size(&self) -> usize {
    self.region_high() as usize - self.region_low() as usize
  }
}

/// A simulated heap: a fixed reservation handed out by moving a break offset.
pub struct MemRegion {
  start: NonNull<u8>,
  brk: usize,
  layout: Layout,
}

impl MemRegion {
  /// Reserves `capacity` bytes (rounded up to [`ALIGNMENT`]).
  pub fn new(capacity: usize) -> Result<Self, SpaceError> {
    let requested = capacity;
    let out_of_memory = || SpaceError::OutOfMemory {
      requested,
      available: 0,
    };

    let capacity = capacity
      .max(ALIGNMENT)
      .checked_next_multiple_of(ALIGNMENT)
      .ok_or_else(out_of_memory)?;
    let layout = Layout::from_size_align(capacity, ALIGNMENT).map_err(|_| out_of_memory())?;

    let start = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or_else(out_of_memory)?;

    Ok(Self { start, brk: 0, layout })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  pub fn remaining(&self) -> usize {
    self.capacity() - self.brk
  }
}

impl AddressSpace for MemRegion {
  fn extend_region(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, SpaceError> {
    if bytes > self.remaining() {
      return Err(SpaceError::OutOfMemory {
        requested: bytes,
        available: self.remaining(),
      });
    }

    let old_brk = unsafe { self.start.add(self.brk) };
    self.brk += bytes;
    Ok(old_brk)
  }

  fn region_low(&self) -> *mut u8 {
    self.start.as_ptr()
  }

  fn region_high(&self) -> *mut u8 {
    self.start.as_ptr().wrapping_add(self.brk)
  }
}

impl Drop for MemRegion {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) }
  }
}

#[cfg(unix)]
pub use self::sbrk::Sbrk;

#[cfg(unix)]
mod sbrk {
  use std::{io, ptr::NonNull};

  use libc::{c_void, intptr_t, sbrk};

  use super::AddressSpace;
  use crate::{align, error::SpaceError};

  const SBRK_FAILED: *mut c_void = usize::MAX as *mut c_void;

  /// The process data segment, grown with `sbrk(2)`.
  ///
  /// Anything else moving the break (the system allocator included) makes the
  /// range non-contiguous; growth then fails instead of handing out a gap.
  pub struct Sbrk {
    low: *mut u8,
    high: *mut u8,
  }

  impl Sbrk {
    /// Starts at the current program break, padded up to the heap alignment.
    pub fn new() -> Result<Self, SpaceError> {
      unsafe {
        let current = sbrk(0);
        if current == SBRK_FAILED {
          return Err(io::Error::last_os_error().into());
        }

        let pad = align!(current as usize) - current as usize;
        let pad_start = if pad > 0 { sbrk(pad as intptr_t) } else { current };
        if pad_start == SBRK_FAILED {
          return Err(io::Error::last_os_error().into());
        }

        let low = padded_base(current as *mut u8, pad_start as *mut u8, pad)?;
        Ok(Self { low, high: low })
      }
    }

    /// The current program break, as reported by `sbrk(0)`.
    pub fn program_break() -> *mut u8 {
      unsafe { sbrk(0) as *mut u8 }
    }
  }

  /// The aligned heap base, provided the alignment pad was carved exactly at
  /// the break observed before it.
  pub(super) fn padded_base(
    observed: *mut u8,
    pad_start: *mut u8,
    pad: usize,
  ) -> Result<*mut u8, SpaceError> {
    if pad_start != observed {
      return Err(SpaceError::NonContiguous);
    }
    Ok(observed.wrapping_add(pad))
  }

  impl AddressSpace for Sbrk {
    fn extend_region(
      &mut self,
      bytes: usize,
    ) -> Result<NonNull<u8>, SpaceError> {
      let increment = intptr_t::try_from(bytes).map_err(|_| SpaceError::OutOfMemory {
        requested: bytes,
        available: 0,
      })?;

      let address = unsafe { sbrk(increment) };
      if address == SBRK_FAILED {
        return Err(io::Error::last_os_error().into());
      }

      let start = address as *mut u8;
      if start != self.high {
        return Err(SpaceError::NonContiguous);
      }

      self.high = start.wrapping_add(bytes);
      NonNull::new(start).ok_or(SpaceError::NonContiguous)
    }

    fn region_low(&self) -> *mut u8 {
      self.low
    }

    fn region_high(&self) -> *mut u8 {
      self.high
    }
  }
}
