//! Minimal lossless mmCIF reader and writer.
//!
//! Only what the scanner and fixer need is modelled: data blocks made of
//! categories, each a small table of named fields. Unmodified categories are
//! written back byte for byte, so comments, column alignment and quoting
//! style of the deposited file survive a repair.

mod document;
mod lexer;
mod writer;

pub use document::{Block, Category, Document, Layout};

use std::fmt;

/// A single CIF value.
///
/// A bare `?` (unknown) and a bare `.` (inapplicable) are nulls; the quoted
/// forms `'?'` and `'.'` are ordinary text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Text(String),
    Unknown,
    Inapplicable,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// The textual content, or `None` for `?` and `.`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        !matches!(self, Value::Text(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Unknown => write!(f, "?"),
            Value::Inapplicable => write!(f, "."),
        }
    }
}
