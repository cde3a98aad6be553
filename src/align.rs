/// Payload rounding quantum. Every block size is a multiple of this.
pub const ALIGNMENT: usize = 4;

/// Smallest payload a split is allowed to leave behind.
pub const MIN_QUANTUM: usize = ALIGNMENT;

/// Rounds the given size up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use firstfit::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(20), 20);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Rounds the given value up to `boundary`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use firstfit::align_to;
///
/// assert_eq!(align_to!(17usize, 16), 32);
/// assert_eq!(align_to!(4096usize, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $boundary:expr) => {
    ($value + $boundary - 1) & !($boundary - 1)
  };
}

/// Overflow-checked [`align!`] for sizes that come from callers.
pub fn align_checked(value: usize) -> Option<usize> {
  value
    .checked_add(ALIGNMENT - 1)
    .map(|v| v & !(ALIGNMENT - 1))
}

/// Payload size actually reserved for a request of `size` bytes.
///
/// Zero is rounded up to one quantum so every block owns distinct memory.
pub fn request_size(size: usize) -> Option<usize> {
  align_checked(size.max(MIN_QUANTUM))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), align_checked(size));
      }
    }
  }

  #[test]
  fn test_align_to() {
    assert_eq!(align_to!(1usize, 8), 8);
    assert_eq!(align_to!(8usize, 8), 8);
    assert_eq!(align_to!(0x1001usize, 0x1000), 0x2000);
  }

  #[test]
  fn test_align_checked_overflow() {
    assert_eq!(align_checked(usize::MAX), None);
    assert_eq!(align_checked(usize::MAX - 2), None);
    assert_eq!(align_checked(usize::MAX - 3), Some(usize::MAX - 3));
  }

  #[test]
  fn test_request_size() {
    assert_eq!(request_size(0), Some(MIN_QUANTUM));
    assert_eq!(request_size(1), Some(4));
    assert_eq!(request_size(30), Some(32));
    assert_eq!(request_size(usize::MAX), None);
  }
}
