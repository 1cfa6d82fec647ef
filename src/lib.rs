//! # allockit - Swappable Allocators and Allocator-Backed Text
//!
//! This crate provides a small runtime kit built around an explicit
//! [`Allocator`] capability. Three strategies implement it, and a growable
//! text buffer with a tiny template engine sits on top of any of them.
//!
//! ## Overview
//!
//! ```text
//!   strbuf_format!  ──►  StrBuf  ──►  &dyn Allocator
//!                                          │
//!                        ┌─────────────────┼──────────────────┐
//!                        ▼                 ▼                  ▼
//!                  HeapAllocator         Arena        TrackingAllocator
//!                  (malloc/free)     (bump, LIFO)     (leak registry)
//!                                          │                  │
//!                                          └── pool from ──┐  └── HeapAllocator
//!                                              any owner ◄─┘
//! ```
//!
//! Every allocator reports failure with an empty [`Block`] rather than a
//! panic. Every [`StrBuf`] mutation is all-or-nothing.
//!
//! ## Crate Structure
//!
//! ```text
//!   allockit
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block, AllocRequest, ReleaseRequest
//!   ├── allocator  - Allocator trait and typed helpers
//!   ├── heap       - HeapAllocator
//!   ├── arena      - Arena bump allocator
//!   ├── tracking   - TrackingAllocator leak detector
//!   ├── string     - StrBuf growable buffer
//!   ├── format     - Template rendering into StrBuf
//!   └── error      - Error types
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use allockit::{Arena, StrBuf, TrackingAllocator, strbuf_format};
//!
//! let mut tracker = TrackingAllocator::new();
//! {
//!     let arena = Arena::new(&tracker, 512).unwrap();
//!     let mut line = StrBuf::new(&arena).unwrap();
//!
//!     strbuf_format!(line, "{} = {}", "answer", 42u64).unwrap();
//!     assert_eq!(line.as_str(), "answer = 42");
//! }
//! assert!(tracker.teardown().is_clean());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: allocators keep their state in `Cell`s
//! - **Arena frees are LIFO**: only the latest allocation is reclaimed
//! - **Heap alignment**: nothing beyond [`MALLOC_ALIGN`]
//! - **Unix-only**: the heap allocator goes through `libc`
//!
//! ## Safety
//!
//! Releasing memory is `unsafe`: the caller promises the block came from the
//! same allocator. [`StrBuf`] wraps all of that behind a safe API.

pub mod align;
pub mod allocator;
pub mod arena;
pub mod block;
pub mod error;
pub mod format;
pub mod heap;
pub mod string;
pub mod tracking;

pub use allocator::{Allocator, AllocatorExt};
pub use arena::{Arena, ArenaConfig};
pub use block::{AllocRequest, Block, ReleaseRequest, Site};
pub use error::{AllocError, FormatError, StrBufError};
pub use format::FormatArg;
pub use heap::{HeapAllocator, MALLOC_ALIGN};
pub use string::{FLOAT_DECIMALS, MIN_CAPACITY, StrBuf};
pub use tracking::{Leak, LeakReport, TrackingAllocator};
