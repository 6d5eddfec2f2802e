// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::{
    fmt::{self, Debug, Formatter},
    ops::Range,
};

/// A range of bytes within the parse buffer.
///
/// Offsets are kept instead of slices so that ranges stay valid while the
/// buffer is grown and shifted; rewrites adjust a `Span` by a scalar instead
/// of re-borrowing.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

impl Span {
    /// An empty span positioned at `at`.
    #[inline(always)]
    pub(crate) fn at(at: usize) -> Self {
        Span { start: at, end: at }
    }

    #[inline(always)]
    pub(crate) fn slice<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[Range::from(*self)]
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        !(self.start < self.end)
    }

    /// Moves the whole span right by `amount`.
    #[inline(always)]
    pub(crate) fn shift(&mut self, amount: usize) {
        self.start += amount;
        self.end += amount;
    }
}

impl From<Range<usize>> for Span {
    #[inline(always)]
    fn from(range: Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
        }
    }
}

impl From<Span> for Range<usize> {
    #[inline(always)]
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
