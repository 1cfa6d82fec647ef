//! Growable, allocator-backed text buffer.
//!
//! ```text
//!   ptr
//!   │
//!   ▼
//!   ┌───┬───┬───┬───┬────┬───┬───┬───┬───┐
//!   │ h │ e │ l │ l │ \0 │ ? │ ? │ ? │ ? │   capacity = 8, len = 4
//!   └───┴───┴───┴───┴────┴───┴───┴───┴───┘
//!                     ▲                  ▲
//!                     └─ terminator      └─ capacity + 1 bytes owned
//! ```
//!
//! Every mutation either completes or leaves the buffer exactly as it was.

use std::{fmt, ops::Range, panic::Location, ptr, slice, str};

use crate::{
  allocator::{Allocator, copy_bytes},
  block::{AllocRequest, Block, ReleaseRequest, Site},
  error::{Result, StrBufError},
};

/// Smallest usable capacity a buffer is ever given.
pub const MIN_CAPACITY: usize = 4;

/// Digits printed after the decimal point by [`StrBuf::append_f64`].
pub const FLOAT_DECIMALS: u32 = 4;

const TERMINATOR: u8 = 0;

/// Owned text whose storage comes from a caller-chosen [`Allocator`].
///
/// The buffer always holds `capacity + 1` bytes so a terminator can follow
/// the text, and it is always valid UTF-8.
pub struct StrBuf<'a> {
  owner: &'a dyn Allocator,
  ptr: *mut u8,
  capacity: usize,
  len: usize,
  site: Site,
}

impl<'a> StrBuf<'a> {
  #[track_caller]
  pub fn new(owner: &'a dyn Allocator) -> Result<Self> {
    Self::with_capacity(owner, 0)
  }

  #[track_caller]
  pub fn with_capacity(
    owner: &'a dyn Allocator,
    capacity: usize,
  ) -> Result<Self> {
    let mut buf = Self {
      owner,
      ptr: ptr::null_mut(),
      capacity: 0,
      len: 0,
      site: Location::caller(),
    };
    buf.resize(capacity)?;
    Ok(buf)
  }

  #[track_caller]
  pub fn from_text(
    owner: &'a dyn Allocator,
    text: &str,
  ) -> Result<Self> {
    let mut buf = Self::with_capacity(owner, text.len())?;
    buf.push_str(text)?;
    Ok(buf)
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn as_str(&self) -> &str {
    // SAFETY: only whole `&str`s, encoded `char`s and ASCII are ever written,
    // and failed appends are rolled back to a char boundary.
    unsafe { str::from_utf8_unchecked(self.as_bytes()) }
  }

  pub fn as_bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.ptr, self.len) }
  }

  /// Text followed by its terminator.
  pub fn as_bytes_with_nul(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.ptr, self.len + 1) }
  }

  pub fn clear(&mut self) {
    self.set_len(0);
  }

  /// Shortens the text to `new_len` bytes. Does nothing if it is already shorter.
  ///
  /// # Panics
  ///
  /// If `new_len` does not lie on a char boundary.
  pub fn truncate(
    &mut self,
    new_len: usize,
  ) {
    if new_len < self.len {
      assert!(self.as_str().is_char_boundary(new_len), "truncate inside a char");
      self.set_len(new_len);
    }
  }

  /// Moves the text into a fresh buffer of `capacity` usable bytes.
  ///
  /// Shrinking below the current length drops the tail. The old buffer is
  /// released under the caller's location.
  #[track_caller]
  pub fn resize(
    &mut self,
    capacity: usize,
  ) -> Result<()> {
    self.relocate(capacity, Location::caller())
  }

  /// Makes room for at least `min_size` bytes, doubling when it has to grow.
  #[track_caller]
  pub fn grow(
    &mut self,
    min_size: usize,
  ) -> Result<()> {
    self.reserve(min_size, Location::caller())
  }

  fn reserve(
    &mut self,
    min_size: usize,
    release_site: Site,
  ) -> Result<()> {
    if self.capacity >= min_size {
      return Ok(());
    }

    self.relocate(self.capacity.saturating_mul(2).max(min_size), release_site)
  }

  /// The only place the buffer address changes.
  fn relocate(
    &mut self,
    capacity: usize,
    release_site: Site,
  ) -> Result<()> {
    let capacity = capacity.max(MIN_CAPACITY);
    if capacity == self.capacity && !self.ptr.is_null() {
      return Ok(());
    }

    let bytes = capacity.checked_add(1).ok_or(StrBufError::CapacityOverflow)?;
    let buffer = self.owner.allocate(AllocRequest {
      size: bytes,
      align: 1,
      site: Some(self.site),
    });
    if buffer.is_empty() {
      tracing::debug!(capacity, "string buffer allocation failed");
      return Err(StrBufError::Alloc { capacity });
    }

    let mut len = self.len.min(capacity);
    if !self.ptr.is_null() {
      while !self.as_str().is_char_boundary(len) {
        len -= 1;
      }
      unsafe {
        copy_bytes(self.ptr, buffer.ptr, len);
        self.release_buffer(release_site);
      }
    }

    self.ptr = buffer.ptr;
    self.capacity = capacity;
    self.set_len(len);

    Ok(())
  }

  pub fn push(
    &mut self,
    ch: char,
  ) -> Result<()> {
    self.push_str(ch.encode_utf8(&mut [0; 4]))
  }

  pub fn push_str(
    &mut self,
    text: &str,
  ) -> Result<()> {
    unsafe { self.append_raw(text.as_ptr(), text.len()) }
  }

  /// Appends a copy of `range` of this buffer's own text.
  ///
  /// The source is re-read from the new buffer if growing moves it.
  pub fn extend_from_within(
    &mut self,
    range: Range<usize>,
  ) -> Result<()> {
    let Range { start, end } = range;
    let text = self.as_str();

    if start > end || end > self.len || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
      return Err(StrBufError::OutOfBounds {
        start,
        end,
        len: self.len,
      });
    }

    unsafe { self.append_raw(self.ptr.add(start), end - start) }
  }

  /// Appends `value` in decimal, or in hex with a `0x` prefix and at least two digits.
  pub fn append_u64(
    &mut self,
    mut value: u64,
    hex: bool,
  ) -> Result<()> {
    self.transaction(|buf| {
      let start = buf.len;

      // Digits go in least significant first, then the span is reversed.
      if hex {
        let mut mask = hex_mask(value);
        while mask > 0 {
          let nibble = (value & 0x0f) as u8;
          buf.push_byte(if nibble < 0x0a { b'0' + nibble } else { b'a' + nibble - 0x0a })?;
          value >>= 4;
          mask >>= 4;
        }
        buf.push_str("x0")?;
      } else {
        loop {
          buf.push_byte(b'0' + (value % 10) as u8)?;
          value /= 10;
          if value == 0 {
            break;
          }
        }
      }

      buf.bytes_mut()[start..].reverse();
      Ok(())
    })
  }

  /// Decimal with a leading `-`, or the two's complement bit pattern in hex.
  pub fn append_i64(
    &mut self,
    value: i64,
    hex: bool,
  ) -> Result<()> {
    if hex {
      return self.append_u64(value as u64, true);
    }

    self.transaction(|buf| {
      if value < 0 {
        buf.push_byte(b'-')?;
      }
      buf.append_u64(value.unsigned_abs(), false)
    })
  }

  /// Fixed four decimal places, truncated rather than rounded.
  pub fn append_f64(
    &mut self,
    mut value: f64,
  ) -> Result<()> {
    self.transaction(|buf| {
      if value < 0.0 {
        buf.push_byte(b'-')?;
        value = -value;
      }

      let whole = value as u64;
      buf.append_u64(whole, false)?;
      buf.push_byte(b'.')?;

      let mut fraction = value - whole as f64;
      for _ in 0..FLOAT_DECIMALS {
        fraction *= 10.0;
      }
      let fraction = fraction as u64;

      let width = fraction.checked_ilog10().map_or(1, |log| log + 1);
      for _ in width..FLOAT_DECIMALS {
        buf.push_byte(b'0')?;
      }
      buf.append_u64(fraction, false)
    })
  }

  pub fn append_bool(
    &mut self,
    value: bool,
  ) -> Result<()> {
    self.push_str(if value { "true" } else { "false" })
  }

  /// Runs `f`, restoring the original length if it fails.
  pub(crate) fn transaction<F>(
    &mut self,
    f: F,
  ) -> Result<()>
  where
    F: FnOnce(&mut Self) -> Result<()>,
  {
    let start = self.len;
    let result = f(self);
    if result.is_err() {
      self.set_len(start);
    }
    result
  }

  pub(crate) fn push_byte(
    &mut self,
    byte: u8,
  ) -> Result<()> {
    let new_len = self.len.checked_add(1).ok_or(StrBufError::CapacityOverflow)?;
    self.reserve(new_len, self.site)?;

    unsafe { *self.ptr.add(self.len) = byte };
    self.set_len(new_len);
    Ok(())
  }

  /// # Safety
  ///
  /// `src` must be valid for `len` bytes of UTF-8, either outside this buffer
  /// or inside its current text.
  unsafe fn append_raw(
    &mut self,
    src: *const u8,
    len: usize,
  ) -> Result<()> {
    let base = self.ptr as usize;
    let addr = src as usize;
    let local_offset = (addr >= base && addr <= base + self.len).then(|| addr - base);

    let new_len = self.len.checked_add(len).ok_or(StrBufError::CapacityOverflow)?;
    self.reserve(new_len, self.site)?;

    let src = match local_offset {
      Some(offset) => {
        debug_assert!(offset + len <= self.len);
        unsafe { self.ptr.add(offset) as *const u8 }
      }
      None => src,
    };

    unsafe { copy_bytes(src, self.ptr.add(self.len), len) };
    self.set_len(new_len);
    Ok(())
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
  }

  fn set_len(
    &mut self,
    len: usize,
  ) {
    debug_assert!(len <= self.capacity);
    self.len = len;
    unsafe { *self.ptr.add(len) = TERMINATOR };
  }

  /// Hands the current buffer back to the owner under `site`.
  ///
  /// `site` is the caller of [`resize`](Self::resize) or
  /// [`grow`](Self::grow). Appends and drop have no caller location to pass
  /// on, so they report the buffer's creation site instead.
  unsafe fn release_buffer(
    &mut self,
    site: Site,
  ) {
    unsafe {
      self.owner.release(ReleaseRequest {
        block: Block::new(self.ptr, self.capacity + 1),
        site: Some(site),
      })
    }
  }
}

/// Bounds how many nibbles a hex append emits: one per nibble of the
/// smallest power of two above `value`, never fewer than two.
fn hex_mask(value: u64) -> u64 {
  // Strictly above, so the output always matches `{:#04x}`.
  value
    .checked_add(1)
    .and_then(u64::checked_next_power_of_two)
    .map_or(u64::MAX, |pow| pow - 1)
    .max(0xff)
}

impl Drop for StrBuf<'_> {
  fn drop(&mut self) {
    if !self.ptr.is_null() {
      unsafe { self.release_buffer(self.site) }
    }
  }
}

impl fmt::Display for StrBuf<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Debug for StrBuf<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("StrBuf")
      .field("text", &self.as_str())
      .field("len", &self.len)
      .field("capacity", &self.capacity)
      .finish()
  }
}

impl PartialEq<str> for StrBuf<'_> {
  fn eq(
    &self,
    other: &str,
  ) -> bool {
    self.as_str() == other
  }
}

impl PartialEq<&str> for StrBuf<'_> {
  fn eq(
    &self,
    other: &&str,
  ) -> bool {
    self.as_str() == *other
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::{allocator::ReleaseLog, arena::Arena, heap::HeapAllocator, tracking::TrackingAllocator};

  fn assert_terminated(buf: &StrBuf<'_>) {
    assert!(buf.capacity() >= buf.len());
    assert_eq!(buf.as_bytes_with_nul()[buf.len()], 0);
  }

  #[test]
  fn new_buffer_is_empty_and_terminated() {
    let heap = HeapAllocator::new();
    let buf = StrBuf::new(&heap).unwrap();

    assert!(buf.is_empty());
    assert_eq!(buf.capacity(), MIN_CAPACITY);
    assert_eq!(buf.as_bytes_with_nul(), b"\0");
  }

  #[test]
  fn from_text_copies_and_terminates() {
    let heap = HeapAllocator::new();
    let buf = StrBuf::from_text(&heap, "abc").unwrap();

    assert_eq!(buf.len(), 3);
    assert!(buf.capacity() >= 3);
    assert_eq!(buf.as_bytes_with_nul(), b"abc\0");
  }

  #[test]
  fn grow_doubles_capacity() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::with_capacity(&heap, 8).unwrap();

    buf.grow(8).unwrap();
    assert_eq!(buf.capacity(), 8);

    buf.grow(9).unwrap();
    assert_eq!(buf.capacity(), 16);

    buf.grow(100).unwrap();
    assert_eq!(buf.capacity(), 100);
  }

  #[test]
  fn push_appends_utf8() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::new(&heap).unwrap();

    buf.push('a').unwrap();
    buf.push('é').unwrap();
    buf.push_str(" ok").unwrap();

    assert_eq!(buf, "aé ok");
    assert_terminated(&buf);
  }

  #[test]
  fn self_aliased_append_survives_reallocation() {
    let mut tracker = TrackingAllocator::new();
    {
      let mut buf = StrBuf::from_text(&tracker, "hello").unwrap();
      let old_capacity = buf.capacity();

      buf.extend_from_within(1..3).unwrap();

      assert_eq!(buf, "helloel");
      assert!(buf.capacity() > old_capacity);
      assert_terminated(&buf);
    }
    assert_eq!(tracker.invalid_frees(), 0);
    assert!(tracker.teardown().is_clean());
  }

  #[test]
  fn extend_from_within_checks_bounds() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::from_text(&heap, "hé").unwrap();

    assert!(matches!(buf.extend_from_within(0..4), Err(StrBufError::OutOfBounds { .. })));
    assert!(buf.extend_from_within(0..2).is_err());
    assert_eq!(buf, "hé");

    buf.extend_from_within(1..3).unwrap();
    assert_eq!(buf, "héé");
  }

  #[test]
  fn unsigned_decimal_and_hex() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::new(&heap).unwrap();

    buf.append_u64(12345, false).unwrap();
    assert_eq!(buf, "12345");

    buf.clear();
    buf.append_u64(255, true).unwrap();
    assert_eq!(buf, "0xff");

    buf.clear();
    buf.append_u64(0, false).unwrap();
    assert_eq!(buf, "0");
  }

  #[test]
  fn hex_digit_count_edges() {
    let heap = HeapAllocator::new();
    let cases = [
      (0u64, "0x00"),
      (0x0f, "0x0f"),
      (0x100, "0x100"),
      (0xfff, "0xfff"),
      (0x1000, "0x1000"),
      (u64::MAX, "0xffffffffffffffff"),
      (1 << 63, "0x8000000000000000"),
    ];

    for (value, expected) in cases {
      let mut buf = StrBuf::new(&heap).unwrap();
      buf.append_u64(value, true).unwrap();
      assert_eq!(buf, expected, "value {value:#x}");
    }
  }

  #[test]
  fn signed_decimal_and_hex() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::new(&heap).unwrap();

    buf.append_i64(-42, false).unwrap();
    assert_eq!(buf, "-42");

    buf.clear();
    buf.append_i64(i64::MIN, false).unwrap();
    assert_eq!(buf, "-9223372036854775808");

    buf.clear();
    buf.append_i64(-1, true).unwrap();
    assert_eq!(buf, "0xffffffffffffffff");
  }

  #[test]
  fn float_truncates_to_four_places() {
    let heap = HeapAllocator::new();
    let cases = [
      (-432.5, "-432.5000"),
      (2.0625, "2.0625"),
      (3.0078125, "3.0078"),
      (0.0, "0.0000"),
      (7.99999, "7.9999"),
    ];

    for (value, expected) in cases {
      let mut buf = StrBuf::new(&heap).unwrap();
      buf.append_f64(value).unwrap();
      assert_eq!(buf, expected);
    }
  }

  #[test]
  fn booleans() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::new(&heap).unwrap();

    buf.append_bool(true).unwrap();
    buf.push(' ').unwrap();
    buf.append_bool(false).unwrap();
    assert_eq!(buf, "true false");
  }

  #[test]
  fn failed_append_rolls_back() {
    let heap = HeapAllocator::new();
    let arena = Arena::new(&heap, 16).unwrap();
    let mut buf = StrBuf::from_text(&arena, "ab").unwrap();

    let err = buf.append_u64(123_456_789, false).unwrap_err();

    assert_eq!(err, StrBufError::Alloc { capacity: 16 });
    assert_eq!(buf, "ab");
    assert_eq!(buf.capacity(), 8);
    assert_terminated(&buf);
  }

  #[test]
  fn failed_growth_preserves_content() {
    let heap = HeapAllocator::new();
    let arena = Arena::new(&heap, 8).unwrap();
    let mut buf = StrBuf::from_text(&arena, "abc").unwrap();

    assert!(buf.push_str("defghijk").is_err());
    assert_eq!(buf, "abc");
    assert_eq!(buf.capacity(), MIN_CAPACITY);
  }

  #[test]
  fn resize_shrinks_and_truncates() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::from_text(&heap, "abcdefgh").unwrap();

    buf.resize(5).unwrap();
    assert_eq!(buf, "abcde");
    assert_terminated(&buf);

    buf.resize(0).unwrap();
    assert_eq!(buf.capacity(), MIN_CAPACITY);
    assert_eq!(buf, "abcd");
  }

  #[test]
  fn truncate_keeps_terminator() {
    let heap = HeapAllocator::new();
    let mut buf = StrBuf::from_text(&heap, "hello").unwrap();

    buf.truncate(2);
    assert_eq!(buf.as_bytes_with_nul(), b"he\0");

    buf.truncate(10);
    assert_eq!(buf, "he");
  }

  #[test]
  fn buffer_is_released_once() {
    let mut tracker = TrackingAllocator::new();
    {
      let mut buf = StrBuf::new(&tracker).unwrap();
      for _ in 0..10 {
        buf.push_str("grow ").unwrap();
      }
      assert_eq!(tracker.live_count(), 1);
    }
    assert_eq!(tracker.invalid_frees(), 0);
    assert!(tracker.teardown().is_clean());
  }

  #[test]
  fn releases_name_the_relocating_call() {
    let owner = ReleaseLog::default();

    let created = line!() + 1;
    let mut buf = StrBuf::from_text(&owner, "abc").unwrap();
    let resized = line!() + 1;
    buf.resize(64).unwrap();
    buf.grow(256).unwrap();
    let grown = line!() - 1;
    buf.push_str(&"x".repeat(300)).unwrap();
    drop(buf);

    assert_eq!(owner.lines(), [resized, grown, created, created]);
    assert!(owner.sites.borrow().iter().all(|site| site.unwrap().file() == file!()));
  }

  #[derive(Debug, Clone)]
  enum Op {
    Push(char),
    PushStr(String),
    Unsigned(u64, bool),
    Signed(i64),
    Within(usize, usize),
    Resize(usize),
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      any::<char>().prop_map(Op::Push),
      "[a-z]{0,12}".prop_map(Op::PushStr),
      (any::<u64>(), any::<bool>()).prop_map(|(v, hex)| Op::Unsigned(v, hex)),
      any::<i64>().prop_map(Op::Signed),
      (0usize..64, 0usize..64).prop_map(|(a, b)| Op::Within(a.min(b), a.max(b))),
      (0usize..96).prop_map(Op::Resize),
    ]
  }

  proptest! {
    #[test]
    fn matches_std_string(ops in prop::collection::vec(op(), 1..40)) {
      let heap = HeapAllocator::new();
      let mut buf = StrBuf::new(&heap).unwrap();
      let mut model = String::new();

      for op in ops {
        match op {
          Op::Push(ch) => {
            buf.push(ch).unwrap();
            model.push(ch);
          }
          Op::PushStr(text) => {
            buf.push_str(&text).unwrap();
            model.push_str(&text);
          }
          Op::Unsigned(value, true) => {
            buf.append_u64(value, true).unwrap();
            model.push_str(&format!("0x{value:02x}"));
          }
          Op::Unsigned(value, false) => {
            buf.append_u64(value, false).unwrap();
            model.push_str(&value.to_string());
          }
          Op::Signed(value) => {
            buf.append_i64(value, false).unwrap();
            model.push_str(&value.to_string());
          }
          Op::Within(start, end) => {
            let valid = end <= model.len() && model.is_char_boundary(start) && model.is_char_boundary(end);
            prop_assert_eq!(buf.extend_from_within(start..end).is_ok(), valid);
            if valid {
              let copy = model[start..end].to_owned();
              model.push_str(&copy);
            }
          }
          Op::Resize(capacity) => {
            buf.resize(capacity).unwrap();
            let mut keep = capacity.max(MIN_CAPACITY).min(model.len());
            while !model.is_char_boundary(keep) {
              keep -= 1;
            }
            model.truncate(keep);
          }
        }

        prop_assert!(buf.capacity() >= buf.len());
        prop_assert_eq!(buf.as_bytes_with_nul()[buf.len()], 0);
        prop_assert_eq!(buf.as_str(), model.as_str());
      }
    }
  }
}
