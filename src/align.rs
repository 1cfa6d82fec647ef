/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use allockit::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to the next multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use allockit::align_to;
///
/// assert_eq!(align_to!(13, 4), 16);
/// assert_eq!(align_to!(16, 16), 16);
/// assert_eq!(align_to!(0, 8), 0);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Aligns a raw pointer up to `align` without touching its provenance.
///
/// Returns `None` when the aligned address would wrap around the address space.
pub fn align_ptr(
  ptr: *mut u8,
  align: usize,
) -> Option<*mut u8> {
  debug_assert!(align.is_power_of_two());

  let addr = ptr as usize;
  let aligned = addr.checked_add(align - 1)? & !(align - 1);

  Some(ptr.wrapping_add(aligned - addr))
}
