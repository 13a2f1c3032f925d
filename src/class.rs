//! Size classes of the segregated free lists.

/// Number of segregated lists.
pub const NUM_CLASSES: usize = 9;

/// Inclusive upper bound of every class but the last, which is unbounded.
const CLASS_LIMITS: [usize; NUM_CLASSES - 1] = [32, 128, 512, 1024, 2048, 4096, 8192, 16384];

/// Index of a segregated free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(usize);

impl SizeClass {
  /// The class holding blocks of `size` bytes.
  ///
  /// A zero size never names a real block and trips a debug assertion.
  #[inline]
  pub fn bucket_for(size: usize) -> Self {
    debug_assert!(size != 0, "no size class for a zero-size block");
    let index = CLASS_LIMITS
      .iter()
      .position(|&limit| size <= limit)
      .unwrap_or(NUM_CLASSES - 1);
    Self(index)
  }

  #[inline]
  pub fn index(self) -> usize {
    self.0
  }

  /// This class and every larger one, in ascending order.
  pub fn and_larger(self) -> impl Iterator<Item = SizeClass> {
    (self.0..NUM_CLASSES).map(SizeClass)
  }

  /// All classes, smallest first.
  pub fn all() -> impl Iterator<Item = SizeClass> {
    (0..NUM_CLASSES).map(SizeClass)
  }

  /// The inclusive size range served by this class.
  pub fn range(self) -> (usize, usize) {
    let low = match self.0 {
      0 => 1,
      i => CLASS_LIMITS[i - 1] + 1,
    };
    let high = CLASS_LIMITS.get(self.0).copied().unwrap_or(usize::MAX);
    (low, high)
  }
}
