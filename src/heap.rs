use std::mem;

use libc::{c_void, free, malloc, max_align_t};

use crate::{
  allocator::Allocator,
  block::{AllocRequest, Block, ReleaseRequest},
};

/// Alignment every `malloc` block starts on.
pub const MALLOC_ALIGN: usize = mem::align_of::<max_align_t>();

/// Pass-through to the C heap.
///
/// Alignment beyond [`MALLOC_ALIGN`] (16 bytes on mainstream 64 bit targets)
/// is not honored. Nothing in this crate asks for more.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl HeapAllocator {
  pub const fn new() -> Self {
    Self
  }
}

impl Allocator for HeapAllocator {
  fn allocate(
    &self,
    request: AllocRequest,
  ) -> Block {
    debug_assert!(request.size > 0, "zero-sized allocation");

    let ptr = unsafe { malloc(request.size) } as *mut u8;
    if ptr.is_null() {
      return Block::empty();
    }

    Block::new(ptr, request.size)
  }

  unsafe fn release(
    &self,
    request: ReleaseRequest,
  ) {
    unsafe { free(request.block.ptr as *mut c_void) }
  }
}
