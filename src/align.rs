/// Rounds `value` up to the heap's double-word alignment.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use segallocator::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 16), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::ALIGNMENT)
  };
}

/// Rounds `value` up to a multiple of `align`, which must be a power of two.
///
/// ```rust
/// use segallocator::align_to;
///
/// assert_eq!(align_to!(0, 8), 0);
/// assert_eq!(align_to!(9, 8), 16);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}
