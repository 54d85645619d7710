//! Alignment and size arithmetic shared by every strategy

use crate::error::{AllocError, AllocResult};

/// Largest alignment any strategy guarantees for a block start
pub const MAX_ALIGN: usize = 16;

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use nebula_alloc::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Overflow-checked variant of [`align_up`]
#[inline]
pub const fn checked_align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(bumped) => Some(bumped & !(alignment - 1)),
        None => None,
    }
}

/// Alignment handed out for blocks of `element_size`-byte elements
///
/// This is the largest power of two dividing `element_size`, capped at
/// [`MAX_ALIGN`]. Since a type's alignment always divides its size, a block
/// sized for `T` elements is aligned for `T` whenever `align_of::<T>()` does
/// not exceed [`MAX_ALIGN`].
///
/// ```
/// use nebula_alloc::utils::element_align;
///
/// assert_eq!(element_align(1), 1);
/// assert_eq!(element_align(12), 4);
/// assert_eq!(element_align(24), 8);
/// assert_eq!(element_align(4096), 16);
/// ```
#[inline]
pub const fn element_align(element_size: usize) -> usize {
    if element_size == 0 {
        return 1;
    }
    let natural = 1usize << element_size.trailing_zeros();
    if natural > MAX_ALIGN {
        MAX_ALIGN
    } else {
        natural
    }
}

/// Validates an element count and size and returns their byte product
pub fn byte_size(count: usize, element_size: usize) -> AllocResult<usize> {
    if count == 0 {
        return Err(AllocError::invalid_argument("element count must be positive"));
    }
    if element_size == 0 {
        return Err(AllocError::invalid_argument("element size must be positive"));
    }
    match count.checked_mul(element_size) {
        Some(bytes) if bytes <= isize::MAX as usize => Ok(bytes),
        _ => Err(AllocError::size_overflow(count, element_size)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::error::ErrorKind;

    #[rstest]
    #[case(0, 8, 0)]
    #[case(1, 8, 8)]
    #[case(17, 16, 32)]
    #[case(32, 16, 32)]
    fn align_up_rounds_to_multiple(#[case] value: usize, #[case] align: usize, #[case] expected: usize) {
        assert_eq!(align_up(value, align), expected);
        assert_eq!(checked_align_up(value, align), Some(expected));
    }

    #[test]
    fn checked_align_up_detects_overflow() {
        assert_eq!(checked_align_up(usize::MAX, 16), None);
    }

    #[rstest]
    #[case(2, 2)]
    #[case(6, 2)]
    #[case(8, 8)]
    #[case(48, 16)]
    fn element_align_follows_size(#[case] size: usize, #[case] expected: usize) {
        assert_eq!(element_align(size), expected);
    }

    #[test]
    fn byte_size_rejects_zero_factors() {
        let err = byte_size(0, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = byte_size(4, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn byte_size_rejects_overflow() {
        let err = byte_size(usize::MAX / 2, 3).unwrap_err();
        assert!(matches!(err, AllocError::SizeOverflow { .. }));
        assert_eq!(byte_size(4, 4).unwrap(), 16);
    }
}
