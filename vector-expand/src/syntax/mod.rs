// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

//! The recursive-descent recognizer: one method per grammar production,
//! walking the token cursor forward and telling the rewriter where vector
//! duplication and field merging are valid.

mod exp;
mod stat;
mod table;

pub(crate) use exp::PendingExp;

use std::io::Read;

use crate::reader::ReaderState;

/// Outcome of a production that either advanced past a valid match or left
/// the cursor where it was so an alternative can be tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Fit {
    Fit,
    Unfit,
}

/// Marker that the run is over: malformed input or a fatal condition was
/// diagnosed, and the first diagnosis is already recorded in the reader
/// state. Propagated with `?` to the top-level driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Halt;

pub(crate) type Step = Result<Fit, Halt>;

/// Reserved words, rejected as names.
pub(crate) const KEYWORDS: [&[u8]; 22] = [
    b"and", b"break", b"do", b"else", b"elseif", b"end", b"false", b"for", b"function", b"goto",
    b"if", b"in", b"local", b"nil", b"not", b"or", b"repeat", b"return", b"then", b"true",
    b"until", b"while",
];

impl<R: Read> ReaderState<R> {
    /// Consumes exactly one byte at the cursor and advances to the next
    /// token. Only valid while `cur()` is not NUL.
    pub(crate) fn eat_char(&mut self) -> Result<(), Halt> {
        debug_assert!(self.cur() != 0, "eat_char at end of input");
        self.tok.end = self.tok.start + 1;
        self.next_token()
    }

    /// Requires the keyword `kw` at the cursor and advances past it.
    pub(crate) fn expect_keyword(
        &mut self,
        kw: &[u8],
        msg: &'static str,
        line: u32,
    ) -> Result<(), Halt> {
        self.extend_while(crate::reader::is_ident_char)?;
        if !self.equal_token(kw) {
            return Err(self.fail_syntax(msg, line));
        }
        self.next_token()
    }
}
