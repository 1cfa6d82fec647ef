//! Error types for allocation, buffer growth and template rendering.

use thiserror::Error;

/// Failures raised while constructing allocator-backed objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  /// The owning allocator returned an empty block.
  #[error("out of memory: requested {requested} bytes")]
  OutOfMemory {
    /// Number of bytes requested.
    requested: usize,
  },

  /// Configuration rejected before any memory was touched.
  #[error("invalid configuration: {0}")]
  InvalidConfig(&'static str),
}

/// Failures raised by [`StrBuf`](crate::StrBuf) growth and appends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrBufError {
  /// The backing allocator could not provide a larger buffer.
  #[error("buffer allocation failed: requested capacity {capacity}")]
  Alloc {
    /// Usable capacity that was requested.
    capacity: usize,
  },

  /// Capacity arithmetic overflowed `usize`.
  #[error("buffer capacity overflow")]
  CapacityOverflow,

  /// A range passed to `extend_from_within` fell outside the buffer.
  #[error("range {start}..{end} out of bounds for length {len}")]
  OutOfBounds {
    start: usize,
    end: usize,
    len: usize,
  },
}

/// Failures raised while rendering a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
  /// Template ended inside a placeholder or right after a `{`.
  #[error("incomplete format specifier at byte {position}")]
  IncompletePlaceholder { position: usize },

  /// A `}` that neither closes a placeholder nor is doubled.
  #[error("encountered unescaped '}}' at byte {position}")]
  UnescapedBrace { position: usize },

  /// Placeholder body is not a non-negative integer.
  #[error("failed to parse format specifier {body:?}")]
  InvalidIndex { body: String },

  /// Automatic and explicit placeholders in the same template.
  #[error("automatic and explicit format specifiers may not be used together")]
  MixedIndexing,

  /// Placeholder referenced an argument that does not exist.
  #[error("format specifier {index} outside of {count} argument(s)")]
  IndexOutOfRange { index: usize, count: usize },

  /// The destination buffer could not hold the output.
  #[error(transparent)]
  Append(#[from] StrBufError),
}

pub type Result<T, E = StrBufError> = std::result::Result<T, E>;
