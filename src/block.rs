use std::{panic::Location, ptr};

/// Call-site identity attached to allocation and release requests.
pub type Site = &'static Location<'static>;

/// A span of memory owned by whichever allocator produced it.
///
/// An empty block (null pointer, zero size) is how every allocator reports failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub ptr: *mut u8,
  pub size: usize,
}

impl Block {
  pub fn new(
    ptr: *mut u8,
    size: usize,
  ) -> Self {
    Self { ptr, size }
  }

  pub const fn empty() -> Self {
    Self {
      ptr: ptr::null_mut(),
      size: 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.ptr.is_null()
  }

  /// One past the last byte of the block.
  pub fn end(&self) -> *mut u8 {
    self.ptr.wrapping_add(self.size)
  }

  /// Whether `ptr` lies in `[start, end)`.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    let addr = ptr as usize;
    addr >= self.ptr as usize && addr < self.end() as usize
  }
}

impl Default for Block {
  fn default() -> Self {
    Self::empty()
  }
}

/// What the caller wants from [`Allocator::allocate`](crate::Allocator::allocate).
#[derive(Clone, Copy, Debug)]
pub struct AllocRequest {
  pub size: usize,
  pub align: usize,
  pub site: Option<Site>,
}

impl AllocRequest {
  /// Builds a request stamped with the caller's location.
  #[track_caller]
  pub fn new(
    size: usize,
    align: usize,
  ) -> Self {
    Self {
      size,
      align,
      site: Some(Location::caller()),
    }
  }

  /// Same request without provenance.
  pub fn anonymous(
    size: usize,
    align: usize,
  ) -> Self {
    Self {
      size,
      align,
      site: None,
    }
  }
}

/// Hands a block back to the allocator it came from.
#[derive(Clone, Copy, Debug)]
pub struct ReleaseRequest {
  pub block: Block,
  pub site: Option<Site>,
}

impl ReleaseRequest {
  #[track_caller]
  pub fn new(block: Block) -> Self {
    Self {
      block,
      site: Some(Location::caller()),
    }
  }
}
