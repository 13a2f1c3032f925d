//! Error types for heap growth and allocation.

use std::io;

/// Result type for allocator-internal operations.
pub type Result<T> = std::result::Result<T, AllocError>;

/// Failures of the address-space provider.
#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
  #[error("address space exhausted: requested {requested} bytes, {available} available")]
  OutOfMemory { requested: usize, available: usize },

  #[error("address space grew non-contiguously")]
  NonContiguous,

  #[error("system break could not be moved: {0}")]
  Os(#[from] io::Error),
}

/// Why an allocation could not be satisfied.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
  #[error("heap exhausted while growing by {requested} bytes")]
  Exhausted { requested: usize },

  #[error("request of {size} bytes exceeds the largest representable block")]
  TooLarge { size: usize },

  #[error(transparent)]
  Space(#[from] SpaceError),
}
