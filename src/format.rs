//! Placeholder templates rendered into a [`StrBuf`].
//!
//! `{}` takes the next argument, `{N}` takes argument `N`, `{{` and `}}` are
//! literal braces. A template uses either automatic or explicit placeholders,
//! never both.
//!
//! ```rust
//! use allockit::{HeapAllocator, StrBuf, strbuf_format};
//!
//! let heap = HeapAllocator::new();
//! let mut buf = StrBuf::new(&heap).unwrap();
//!
//! strbuf_format!(buf, "{1} and {0}", "a", "b").unwrap();
//! assert_eq!(buf.as_str(), "b and a");
//! ```

use crate::{error::FormatError, string::StrBuf};

/// A value that can fill a placeholder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FormatArg<'a> {
  Str(&'a str),
  Char(char),
  I64(i64),
  U64(u64),
  F64(f64),
  Bool(bool),
}

impl<'a> From<&'a str> for FormatArg<'a> {
  fn from(value: &'a str) -> Self {
    Self::Str(value)
  }
}

impl<'a> From<&'a StrBuf<'_>> for FormatArg<'a> {
  fn from(value: &'a StrBuf<'_>) -> Self {
    Self::Str(value.as_str())
  }
}

impl From<char> for FormatArg<'_> {
  fn from(value: char) -> Self {
    Self::Char(value)
  }
}

impl From<i64> for FormatArg<'_> {
  fn from(value: i64) -> Self {
    Self::I64(value)
  }
}

impl From<i32> for FormatArg<'_> {
  fn from(value: i32) -> Self {
    Self::I64(value.into())
  }
}

impl From<u64> for FormatArg<'_> {
  fn from(value: u64) -> Self {
    Self::U64(value)
  }
}

impl From<u32> for FormatArg<'_> {
  fn from(value: u32) -> Self {
    Self::U64(value.into())
  }
}

impl From<usize> for FormatArg<'_> {
  fn from(value: usize) -> Self {
    Self::U64(value as u64)
  }
}

impl From<f64> for FormatArg<'_> {
  fn from(value: f64) -> Self {
    Self::F64(value)
  }
}

impl From<bool> for FormatArg<'_> {
  fn from(value: bool) -> Self {
    Self::Bool(value)
  }
}

/// Renders a template into a [`StrBuf`], converting each argument with
/// [`FormatArg::from`].
#[macro_export]
macro_rules! strbuf_format {
  ($buf:expr, $template:expr $(, $arg:expr)* $(,)?) => {
    $buf.format($template, &[$($crate::FormatArg::from($arg)),*])
  };
}

#[derive(Clone, Copy, Debug)]
enum Scan {
  /// Copying template text that starts at `start`.
  Literal { start: usize },
  OpenBrace,
  CloseBrace,
  Placeholder { start: usize },
}

#[derive(Clone, Copy, Debug)]
enum Indexing {
  Unset,
  Auto { next: usize },
  Explicit,
}

impl Indexing {
  fn resolve(
    &mut self,
    body: &str,
  ) -> Result<usize, FormatError> {
    if body.is_empty() {
      let index = match *self {
        Indexing::Unset => 0,
        Indexing::Auto { next } => next,
        Indexing::Explicit => return Err(FormatError::MixedIndexing),
      };
      *self = Indexing::Auto { next: index + 1 };
      return Ok(index);
    }

    let index = parse_index(body).ok_or_else(|| FormatError::InvalidIndex { body: body.to_owned() })?;
    if let Indexing::Auto { .. } = self {
      return Err(FormatError::MixedIndexing);
    }
    *self = Indexing::Explicit;
    Ok(index)
  }
}

fn parse_index(body: &str) -> Option<usize> {
  if !body.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  body.parse().ok()
}

impl StrBuf<'_> {
  /// Replaces the contents with `template` rendered against `args`.
  ///
  /// On failure the buffer is left empty.
  #[track_caller]
  pub fn format(
    &mut self,
    template: &str,
    args: &[FormatArg<'_>],
  ) -> Result<(), FormatError> {
    self.clear();

    let result = self.render(template, args);
    if let Err(err) = &result {
      tracing::debug!(template, error = %err, "format failed");
      self.clear();
    }
    result
  }

  #[track_caller]
  fn render(
    &mut self,
    template: &str,
    args: &[FormatArg<'_>],
  ) -> Result<(), FormatError> {
    self.grow(template.len())?;

    let mut indexing = Indexing::Unset;
    let mut state = Scan::Literal { start: 0 };

    for (pos, byte) in template.bytes().enumerate() {
      state = match (state, byte) {
        (Scan::Literal { start }, b'{') => {
          self.push_str(&template[start..pos])?;
          Scan::OpenBrace
        }
        (Scan::Literal { start }, b'}') => {
          self.push_str(&template[start..pos])?;
          Scan::CloseBrace
        }
        (Scan::Literal { .. }, _) => state,

        // The second brace of a pair starts the next literal run.
        (Scan::OpenBrace, b'{') | (Scan::CloseBrace, b'}') => Scan::Literal { start: pos },
        (Scan::CloseBrace, _) => return Err(FormatError::UnescapedBrace { position: pos - 1 }),

        (Scan::OpenBrace, b'}') => {
          self.render_arg(indexing.resolve("")?, args)?;
          Scan::Literal { start: pos + 1 }
        }
        (Scan::OpenBrace, _) => Scan::Placeholder { start: pos },

        (Scan::Placeholder { start }, b'}') => {
          self.render_arg(indexing.resolve(&template[start..pos])?, args)?;
          Scan::Literal { start: pos + 1 }
        }
        (Scan::Placeholder { .. }, _) => state,
      };
    }

    match state {
      Scan::Literal { start } => Ok(self.push_str(&template[start..])?),
      Scan::CloseBrace => Err(FormatError::UnescapedBrace {
        position: template.len() - 1,
      }),
      Scan::OpenBrace | Scan::Placeholder { .. } => Err(FormatError::IncompletePlaceholder {
        position: template.len(),
      }),
    }
  }

  fn render_arg(
    &mut self,
    index: usize,
    args: &[FormatArg<'_>],
  ) -> Result<(), FormatError> {
    let arg = args.get(index).ok_or(FormatError::IndexOutOfRange {
      index,
      count: args.len(),
    })?;

    match *arg {
      FormatArg::Str(text) => self.push_str(text)?,
      FormatArg::Char(ch) => self.push(ch)?,
      FormatArg::I64(value) => self.append_i64(value, false)?,
      FormatArg::U64(value) => self.append_u64(value, false)?,
      FormatArg::F64(value) => self.append_f64(value)?,
      FormatArg::Bool(value) => self.append_bool(value)?,
    }
    Ok(())
  }
}
