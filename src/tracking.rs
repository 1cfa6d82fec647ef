//! Leak-tracking allocator for tests and diagnostics.
//!
//! Every allocation is prefixed with a header and pushed onto an intrusive
//! singly-linked list. The list is the only record of what is live:
//!
//! ```text
//!   head ──► ┌────────────┬──────────────┐   ┌────────────┬──────────┐
//!            │ Header     │  user bytes  │ ┌►│ Header     │   ...    │
//!            │  size      │              │ │ │  size      │          │
//!            │  site      │              │ │ │  site      │          │
//!            │  next ─────┼──────────────┼─┘ │  next: nil │          │
//!            └────────────┴──────────────┘   └────────────┴──────────┘
//!                         ▲
//!                         └── pointer handed to the caller
//! ```
//!
//! Releasing a pointer that is not on the list is reported and otherwise
//! ignored, so a double free never reaches the heap.

use std::{cell::Cell, fmt, mem, ptr};

use crate::{
  align_to,
  allocator::Allocator,
  block::{AllocRequest, Block, ReleaseRequest, Site},
  heap::{HeapAllocator, MALLOC_ALIGN},
};

#[repr(C)]
struct Header {
  size: usize,
  site: Option<Site>,
  next: *mut Header,
}

// User memory starts `HEADER_SIZE` past a malloc block, so the header keeps
// malloc's alignment for it.
const HEADER_SIZE: usize = align_to!(mem::size_of::<Header>(), MALLOC_ALIGN);

/// An allocation still registered when the tracker was torn down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leak {
  pub address: usize,
  pub size: usize,
  pub site: Option<Site>,
}

impl fmt::Display for Leak {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self.site {
      Some(site) => write!(
        f,
        "{} bytes at {:#x} allocated at {}:{}",
        self.size,
        self.address,
        site.file(),
        site.line()
      ),
      None => write!(f, "{} bytes at {:#x}", self.size, self.address),
    }
  }
}

/// Everything [`TrackingAllocator::teardown`] found still allocated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeakReport {
  pub leaks: Vec<Leak>,
}

impl LeakReport {
  pub fn is_clean(&self) -> bool {
    self.leaks.is_empty()
  }

  pub fn len(&self) -> usize {
    self.leaks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.leaks.is_empty()
  }

  pub fn total_bytes(&self) -> usize {
    self.leaks.iter().map(|leak| leak.size).sum()
  }
}

/// Wraps the heap and remembers who allocated what.
pub struct TrackingAllocator {
  heap: HeapAllocator,
  head: Cell<*mut Header>,
  live_count: Cell<usize>,
  live_bytes: Cell<usize>,
  invalid_frees: Cell<usize>,
}

impl TrackingAllocator {
  pub fn new() -> Self {
    Self {
      heap: HeapAllocator::new(),
      head: Cell::new(ptr::null_mut()),
      live_count: Cell::new(0),
      live_bytes: Cell::new(0),
      invalid_frees: Cell::new(0),
    }
  }

  pub fn live_count(&self) -> usize {
    self.live_count.get()
  }

  pub fn live_bytes(&self) -> usize {
    self.live_bytes.get()
  }

  /// Releases of pointers this tracker did not own at the time.
  pub fn invalid_frees(&self) -> usize {
    self.invalid_frees.get()
  }

  /// Reports and frees every allocation still on the list.
  ///
  /// Talks to the heap directly, so nothing done here is tracked itself.
  pub fn teardown(&mut self) -> LeakReport {
    let mut report = LeakReport::default();
    let mut header = self.head.replace(ptr::null_mut());

    while !header.is_null() {
      // SAFETY: every node on the list was written by `allocate` and is
      // unlinked exactly once, here or in `release`.
      let Header { size, site, next } = unsafe { ptr::read(header) };
      let address = header as usize + HEADER_SIZE;

      tracing::error!(
        file = site.map(|s| s.file()).unwrap_or("<unknown>"),
        line = site.map(|s| s.line()).unwrap_or(0),
        address = format_args!("{address:#x}"),
        size,
        "memory leak detected"
      );

      report.leaks.push(Leak { address, size, site });

      unsafe {
        self.heap.release(ReleaseRequest {
          block: Block::new(header as *mut u8, size + HEADER_SIZE),
          site: None,
        })
      };

      header = next;
    }

    self.live_count.set(0);
    self.live_bytes.set(0);

    report
  }
}

impl Default for TrackingAllocator {
  fn default() -> Self {
    Self::new()
  }
}

impl Allocator for TrackingAllocator {
  fn allocate(
    &self,
    request: AllocRequest,
  ) -> Block {
    if request.align > MALLOC_ALIGN {
      tracing::warn!(
        align = request.align,
        supported = MALLOC_ALIGN,
        "tracked allocation needs more alignment than the heap gives"
      );
      return Block::empty();
    }

    let Some(total) = request.size.checked_add(HEADER_SIZE) else {
      return Block::empty();
    };

    let memory = self.heap.allocate(AllocRequest {
      size: total,
      align: request.align,
      site: None,
    });
    if memory.is_empty() {
      return memory;
    }

    let header = memory.ptr as *mut Header;
    unsafe {
      ptr::write(
        header,
        Header {
          size: request.size,
          site: request.site,
          next: self.head.get(),
        },
      );
    }
    self.head.set(header);

    self.live_count.set(self.live_count.get() + 1);
    self.live_bytes.set(self.live_bytes.get() + request.size);

    Block::new(unsafe { memory.ptr.add(HEADER_SIZE) }, request.size)
  }

  unsafe fn release(
    &self,
    request: ReleaseRequest,
  ) {
    let target = request.block.ptr.wrapping_sub(HEADER_SIZE) as *mut Header;

    let mut prev: *mut Header = ptr::null_mut();
    let mut node = self.head.get();

    while !node.is_null() {
      // SAFETY: only nodes reached through the list are dereferenced.
      let next = unsafe { (*node).next };

      if node == target {
        if prev.is_null() {
          self.head.set(next);
        } else {
          unsafe { (*prev).next = next };
        }

        let size = unsafe { (*node).size };
        self.live_count.set(self.live_count.get() - 1);
        self.live_bytes.set(self.live_bytes.get() - size);

        unsafe {
          self.heap.release(ReleaseRequest {
            block: Block::new(node as *mut u8, size + HEADER_SIZE),
            site: None,
          })
        };
        return;
      }

      prev = node;
      node = next;
    }

    self.invalid_frees.set(self.invalid_frees.get() + 1);

    let site = request.site;
    tracing::warn!(
      file = site.map(|s| s.file()).unwrap_or("<unknown>"),
      line = site.map(|s| s.line()).unwrap_or(0),
      address = ?request.block.ptr,
      "invalid or double free detected"
    );
  }
}

impl Drop for TrackingAllocator {
  fn drop(&mut self) {
    self.teardown();
  }
}
