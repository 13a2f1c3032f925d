//! Heap tuning knobs.

/// Default heap growth step (one page).
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

/// Default number of adequate candidates compared per size class.
pub const DEFAULT_FIT_WINDOW: usize = 3;

/// Default reservation for a simulated [`MemRegion`](crate::MemRegion) heap.
pub const DEFAULT_REGION_CAPACITY: usize = 20 * (1 << 20);

/// Heap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the address space per growth.
  pub chunk_size: usize,
  /// Adequate blocks examined in a class before settling on the best one.
  pub fit_window: usize,
  /// Bytes reserved by [`Heap::with_capacity`](crate::Heap::with_capacity)
  /// when no explicit capacity is given.
  pub region_capacity: usize,
  /// Run the validator after every public operation and panic on corruption.
  pub check_each_op: bool,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      fit_window: DEFAULT_FIT_WINDOW,
      region_capacity: DEFAULT_REGION_CAPACITY,
      check_each_op: false,
    }
  }
}

impl HeapConfig {
  /// Create config from environment variables
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Like [`HeapConfig::from_env`], reading variables through `lookup`.
  ///
  /// Unparsable values leave the default in place.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::default();
    let number = |key: &str| lookup(key).and_then(|value| value.trim().parse::<usize>().ok());

    // SEGALLOC_CHUNK_SIZE: bytes per heap growth
    if let Some(chunk_size) = number("SEGALLOC_CHUNK_SIZE") {
      config.chunk_size = chunk_size;
    }

    // SEGALLOC_FIT_WINDOW: candidates compared per class, at least 1
    if let Some(fit_window) = number("SEGALLOC_FIT_WINDOW") {
      config.fit_window = fit_window.max(1);
    }

    // SEGALLOC_REGION_CAPACITY: simulated heap reservation
    if let Some(capacity) = number("SEGALLOC_REGION_CAPACITY") {
      config.region_capacity = capacity;
    }

    // SEGALLOC_CHECK: validate after every operation
    if let Some(value) = lookup("SEGALLOC_CHECK") {
      config.check_each_op = value == "1" || value.eq_ignore_ascii_case("true");
    }

    config
  }

  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub fn with_fit_window(
    mut self,
    fit_window: usize,
  ) -> Self {
    self.fit_window = fit_window.max(1);
    self
  }

  pub fn with_region_capacity(
    mut self,
    region_capacity: usize,
  ) -> Self {
    self.region_capacity = region_capacity;
    self
  }

  pub fn with_check_each_op(
    mut self,
    check_each_op: bool,
  ) -> Self {
    self.check_each_op = check_each_op;
    self
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  #[test]
  fn test_from_lookup_overrides_defaults() {
    let vars: HashMap<&str, &str> = [
      ("SEGALLOC_CHUNK_SIZE", "312"),
      ("SEGALLOC_FIT_WINDOW", "0"),
      ("SEGALLOC_CHECK", "TRUE"),
    ]
    .into_iter()
    .collect();

    let config = HeapConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()));

    assert_eq!(config.chunk_size, 312);
    assert_eq!(config.fit_window, 1);
    assert_eq!(config.region_capacity, DEFAULT_REGION_CAPACITY);
    assert!(config.check_each_op);
  }

  #[test]
  fn test_garbage_keeps_defaults() {
    let config = HeapConfig::from_lookup(|key| (key != "SEGALLOC_CHECK").then(|| "lots".to_string()));
    assert_eq!(config, HeapConfig::default());
  }
}
