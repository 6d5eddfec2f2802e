// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use thiserror::Error;

/// The earliest problem detected while expanding a chunk.
///
/// Only the first error of a run is kept; later diagnostics are discarded so
/// a cascade cannot hide the real cause. Every variant carries the 1-based
/// source line on which the failing construct began.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// The input violates the statement/expression grammar: an unclosed
    /// construct, a hanging operator, a malformed numeral, an unterminated
    /// string, or too many expressions feeding a vector key.
    #[error("{msg}")]
    Syntax { msg: &'static str, line: u32 },
    /// A rewriting invariant was violated. Seeing this means a bug in the
    /// engine, not in the input.
    #[error("{msg}")]
    Runtime { msg: &'static str, line: u32 },
    /// A buffer size computation overflowed.
    #[error("buffer size arithmetic overflowed")]
    Memory { line: u32 },
    /// Statement or expression nesting exceeded the recursion limit.
    #[error("nesting exceeds {} levels", crate::MAX_LEVEL)]
    RecursionLimit { line: u32 },
    /// The input source could not be opened or read.
    #[error("{msg}")]
    File { msg: String, line: u32 },
}

/// Classification of an [`ExpandError`], for callers that dispatch on the
/// failure class rather than the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Runtime,
    Memory,
    File,
    RecursionLimit,
}

impl ExpandError {
    /// The 1-based line the error was detected on. Line 0 means the error
    /// happened before any input was scanned (an open failure).
    pub fn line(&self) -> u32 {
        match *self {
            ExpandError::Syntax { line, .. }
            | ExpandError::Runtime { line, .. }
            | ExpandError::Memory { line }
            | ExpandError::RecursionLimit { line }
            | ExpandError::File { line, .. } => line,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExpandError::Syntax { .. } => ErrorKind::Syntax,
            ExpandError::Runtime { .. } => ErrorKind::Runtime,
            ExpandError::Memory { .. } => ErrorKind::Memory,
            ExpandError::RecursionLimit { .. } => ErrorKind::RecursionLimit,
            ExpandError::File { .. } => ErrorKind::File,
        }
    }
}
