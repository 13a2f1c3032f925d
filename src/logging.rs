//! Structured logging for heap events.
//!
//! Every public heap operation emits a `tracing` event under the `segallocator`
//! target; nothing is printed unless a subscriber is installed, either by the
//! host program or by [`init`].

use tracing::trace;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
///
/// Defaults to `segallocator=info` (`debug` in debug builds). Calling it again,
/// or after another subscriber was installed, does nothing.
pub fn init() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if cfg!(debug_assertions) {
      EnvFilter::new("segallocator=debug")
    } else {
      EnvFilter::new("segallocator=info")
    }
  });

  fmt()
    .with_env_filter(filter)
    .compact()
    .try_init()
    .ok();
}

#[inline]
pub(crate) fn log_allocation(
  size: usize,
  block_size: usize,
  ptr: *const u8,
) {
  trace!(target: "segallocator", size, block_size, ptr = ?ptr, "allocated");
}

#[inline]
pub(crate) fn log_deallocation(
  block_size: usize,
  ptr: *const u8,
) {
  trace!(target: "segallocator", block_size, ptr = ?ptr, "freed");
}

#[inline]
pub(crate) fn log_reallocation(
  old: *const u8,
  new: *const u8,
  size: usize,
) {
  trace!(target: "segallocator", size, old = ?old, new = ?new, "reallocated");
}
