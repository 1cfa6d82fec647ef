use std::{mem, panic::Location, ptr};

use crate::block::{AllocRequest, Block, ReleaseRequest};

/// Capability to hand out and take back raw memory.
///
/// Every method takes `&self` so that one allocator can be shared by several
/// owners at once (an [`Arena`](crate::Arena) and the strings living in it, for
/// instance). Implementations keep their state in `Cell`s and are therefore
/// neither `Sync` nor safe to use from more than one thread.
pub trait Allocator {
  /// Requests a block of at least `request.size` bytes.
  ///
  /// Never panics on exhaustion: failure is reported as [`Block::empty`].
  fn allocate(
    &self,
    request: AllocRequest,
  ) -> Block;

  /// Returns a block to this allocator.
  ///
  /// # Safety
  ///
  /// `request.block` must be exactly a block previously returned by
  /// `allocate` on this same instance, and nothing may touch its memory
  /// afterwards.
  unsafe fn release(
    &self,
    request: ReleaseRequest,
  );
}

impl<A: Allocator + ?Sized> Allocator for &A {
  fn allocate(
    &self,
    request: AllocRequest,
  ) -> Block {
    (**self).allocate(request)
  }

  unsafe fn release(
    &self,
    request: ReleaseRequest,
  ) {
    unsafe { (**self).release(request) }
  }
}

/// Typed helpers layered over any [`Allocator`].
///
/// All of them record the caller's location as provenance.
pub trait AllocatorExt: Allocator {
  #[track_caller]
  fn alloc_bytes(
    &self,
    size: usize,
    align: usize,
  ) -> Block {
    debug_assert!(size > 0, "zero-sized allocation");
    debug_assert!(align.is_power_of_two(), "alignment must be a power of two");

    self.allocate(AllocRequest {
      size,
      align,
      site: Some(Location::caller()),
    })
  }

  /// Room for `count` values of `T`; the returned block's size is in bytes.
  #[track_caller]
  fn alloc_array<T>(
    &self,
    count: usize,
  ) -> Block {
    match mem::size_of::<T>().checked_mul(count) {
      Some(size) => self.alloc_bytes(size, mem::align_of::<T>()),
      None => Block::empty(),
    }
  }

  /// Uninitialized storage for a single `T`, or null on failure.
  #[track_caller]
  fn create<T>(&self) -> *mut T {
    self.alloc_array::<T>(1).ptr as *mut T
  }

  /// # Safety
  ///
  /// `item` must come from [`AllocatorExt::create`] on this allocator.
  #[track_caller]
  unsafe fn destroy<T>(
    &self,
    item: *mut T,
  ) {
    debug_assert!(!item.is_null(), "destroying a null item");

    unsafe { self.free(Block::new(item as *mut u8, mem::size_of::<T>())) }
  }

  /// # Safety
  ///
  /// Same contract as [`Allocator::release`].
  #[track_caller]
  unsafe fn free(
    &self,
    block: Block,
  ) {
    debug_assert!(!block.is_empty(), "releasing an empty block");

    unsafe {
      self.release(ReleaseRequest {
        block,
        site: Some(Location::caller()),
      })
    }
  }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}

/// Copies `len` bytes between two blocks that may not overlap.
///
/// # Safety
///
/// Both pointers must be valid for `len` bytes.
pub(crate) unsafe fn copy_bytes(
  src: *const u8,
  dst: *mut u8,
  len: usize,
) {
  if len > 0 {
    unsafe { ptr::copy_nonoverlapping(src, dst, len) }
  }
}

/// Heap-backed allocator that remembers where each release came from.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ReleaseLog {
  heap: crate::heap::HeapAllocator,
  pub(crate) sites: std::cell::RefCell<Vec<Option<crate::block::Site>>>,
}

#[cfg(test)]
impl ReleaseLog {
  pub(crate) fn lines(&self) -> Vec<u32> {
    self.sites.borrow().iter().map(|site| site.map_or(0, |s| s.line())).collect()
  }
}

#[cfg(test)]
impl Allocator for ReleaseLog {
  fn allocate(
    &self,
    request: AllocRequest,
  ) -> Block {
    self.heap.allocate(request)
  }

  unsafe fn release(
    &self,
    request: ReleaseRequest,
  ) {
    self.sites.borrow_mut().push(request.site);
    unsafe { self.heap.release(request) }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};

  use super::*;

  /// Records every request and serves them from a fixed buffer.
  struct Recorder {
    storage: RefCell<Vec<u8>>,
    requests: RefCell<Vec<AllocRequest>>,
    releases: Cell<usize>,
  }

  impl Recorder {
    fn new() -> Self {
      Self {
        storage: RefCell::new(vec![0; 256]),
        requests: RefCell::new(Vec::new()),
        releases: Cell::new(0),
      }
    }
  }

  impl Allocator for Recorder {
    fn allocate(
      &self,
      request: AllocRequest,
    ) -> Block {
      self.requests.borrow_mut().push(request);
      if request.size > 256 {
        return Block::empty();
      }
      Block::new(self.storage.borrow_mut().as_mut_ptr(), request.size)
    }

    unsafe fn release(
      &self,
      _request: ReleaseRequest,
    ) {
      self.releases.set(self.releases.get() + 1);
    }
  }

  #[test]
  fn alloc_array_sizes_by_element() {
    let recorder = Recorder::new();
    let block = recorder.alloc_array::<u32>(8);

    assert_eq!(block.size, 32);
    let request = recorder.requests.borrow()[0];
    assert_eq!(request.align, mem::align_of::<u32>());
    assert_eq!(request.site.unwrap().file(), file!());
  }

  #[test]
  fn alloc_array_overflow_is_empty() {
    let recorder = Recorder::new();
    assert!(recorder.alloc_array::<u64>(usize::MAX).is_empty());
    assert!(recorder.requests.borrow().is_empty());
  }

  #[test]
  fn create_and_destroy_round_through_the_trait() {
    let recorder = Recorder::new();
    let dyn_alloc: &dyn Allocator = &recorder;

    let item = dyn_alloc.create::<u64>();
    assert!(!item.is_null());
    unsafe { dyn_alloc.destroy(item) };

    assert_eq!(recorder.releases.get(), 1);
  }

  #[test]
  fn failure_is_an_empty_block() {
    let recorder = Recorder::new();
    assert!(recorder.alloc_bytes(1024, 1).is_empty());
    assert!(recorder.create::<[u8; 512]>().is_null());
  }
}
