//! Bump allocation over a single fixed pool.
//!
//! ```text
//!   pool.ptr                     pool.ptr + offset              pool.end()
//!   │                            │                              │
//!   ▼                            ▼                              ▼
//!   ┌──────┬──┬─────────┬───────┬──────────────────────────────┐
//!   │  A1  │▒▒│   A2    │  A3   │          free space          │
//!   └──────┴──┴─────────┴───────┴──────────────────────────────┘
//!           ▲
//!           └── alignment padding
//! ```
//!
//! Only the most recent allocation can be handed back (LIFO); every other
//! release is ignored until [`Arena::reset`].

use std::{cell::Cell, panic::Location};

use crate::{
  align::align_ptr,
  allocator::Allocator,
  block::{AllocRequest, Block, ReleaseRequest, Site},
  error::AllocError,
};

/// Sizing for an [`Arena`] pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Bytes borrowed from the owner for the arena's whole lifetime.
  pub pool_size: usize,

  /// Alignment requested for the pool itself.
  pub pool_align: usize,
}

impl ArenaConfig {
  pub const DEFAULT_POOL_SIZE: usize = 4096;

  pub const DEFAULT_POOL_ALIGN: usize = 16;

  pub fn new(pool_size: usize) -> Self {
    Self {
      pool_size,
      pool_align: Self::DEFAULT_POOL_ALIGN,
    }
  }

  pub fn validate(&self) -> Result<(), AllocError> {
    if self.pool_size == 0 {
      return Err(AllocError::InvalidConfig("pool size must be non-zero"));
    }
    if !self.pool_align.is_power_of_two() {
      return Err(AllocError::InvalidConfig("pool alignment must be a power of two"));
    }
    Ok(())
  }
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self::new(Self::DEFAULT_POOL_SIZE)
  }
}

/// Bump allocator over one pool obtained from `owner` at construction and
/// returned to it on drop.
pub struct Arena<'a> {
  owner: &'a dyn Allocator,
  pool: Block,
  offset: Cell<usize>,
  site: Site,
}

impl<'a> Arena<'a> {
  #[track_caller]
  pub fn new(
    owner: &'a dyn Allocator,
    pool_size: usize,
  ) -> Result<Self, AllocError> {
    Self::with_config(owner, ArenaConfig::new(pool_size))
  }

  #[track_caller]
  pub fn with_config(
    owner: &'a dyn Allocator,
    config: ArenaConfig,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    let site = Location::caller();
    let pool = owner.allocate(AllocRequest {
      size: config.pool_size,
      align: config.pool_align,
      site: Some(site),
    });

    if pool.is_empty() {
      tracing::warn!(requested = config.pool_size, "arena pool allocation failed");
      return Err(AllocError::OutOfMemory {
        requested: config.pool_size,
      });
    }

    tracing::debug!(address = ?pool.ptr, size = pool.size, "arena pool acquired");

    Ok(Self {
      owner,
      pool,
      offset: Cell::new(0),
      site,
    })
  }

  /// Forgets every allocation. Memory is not cleared.
  pub fn reset(&mut self) {
    self.offset.set(0);
  }

  /// High-water mark in bytes from the start of the pool.
  pub fn offset(&self) -> usize {
    self.offset.get()
  }

  pub fn capacity(&self) -> usize {
    self.pool.size
  }

  pub fn remaining(&self) -> usize {
    self.pool.size - self.offset.get()
  }

  pub fn pool(&self) -> Block {
    self.pool
  }

  fn cursor(&self) -> *mut u8 {
    self.pool.ptr.wrapping_add(self.offset.get())
  }
}

impl Allocator for Arena<'_> {
  fn allocate(
    &self,
    request: AllocRequest,
  ) -> Block {
    debug_assert!(request.align.is_power_of_two());

    let Some(start) = align_ptr(self.cursor(), request.align) else {
      return Block::empty();
    };

    let start_offset = start as usize - self.pool.ptr as usize;
    let end_offset = match start_offset.checked_add(request.size) {
      Some(end) if end <= self.pool.size => end,
      _ => return Block::empty(),
    };

    self.offset.set(end_offset);

    // SAFETY: start_offset <= end_offset <= pool.size.
    Block::new(unsafe { self.pool.ptr.add(start_offset) }, request.size)
  }

  unsafe fn release(
    &self,
    request: ReleaseRequest,
  ) {
    let block = request.block;

    if block.end() == self.cursor() {
      self.offset.set(block.ptr as usize - self.pool.ptr as usize);
    } else {
      tracing::trace!(address = ?block.ptr, "arena release ignored, not the last allocation");
    }
  }
}

impl Drop for Arena<'_> {
  // Reported against the construction site; drop glue has no caller.
  fn drop(&mut self) {
    unsafe {
      self.owner.release(ReleaseRequest {
        block: self.pool,
        site: Some(self.site),
      })
    }
  }
}
