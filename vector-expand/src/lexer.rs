// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::{io::Read, ops::Range};

use memchr::{memchr, memchr3};

use crate::{reader::ReaderState, span::Span, syntax::Halt};

/// Token probing over the shared buffer. The lexer never allocates tokens:
/// it moves the `tok` span, pulling more input when a token runs into the
/// end of the buffer. Committed tokens are never revisited.
impl<R: Read> ReaderState<R> {
    /// The first byte of the current token; NUL at end of input.
    #[inline(always)]
    pub(crate) fn cur(&self) -> u8 {
        self.buf.byte(self.tok.start)
    }

    /// The byte after the current token's first byte. Only valid while
    /// `cur()` is not NUL.
    #[inline(always)]
    pub(crate) fn peek(&self) -> u8 {
        self.buf.byte(self.tok.start + 1)
    }

    pub(crate) fn token_bytes(&self) -> &[u8] {
        self.tok.slice(self.buf.as_slice())
    }

    pub(crate) fn equal_token(&self, cmp: &[u8]) -> bool {
        self.token_bytes() == cmp
    }

    /// Shrinks the current token back to a single byte (or none at end of
    /// input), undoing a speculative extension.
    pub(crate) fn reset_token(&mut self) {
        let size = usize::from(self.cur() != 0);
        self.tok.end = self.tok.start + size;
    }

    /// Advances past the current token, counting the newlines inside it.
    pub(crate) fn consume_token(&mut self) {
        for i in Range::from(self.tok) {
            if self.buf.byte(i) == b'\n' {
                self.line += 1;
            }
        }
        self.tok = Span::at(self.tok.end);
    }

    /// Advances over ` \t\n\f\r` from the token cursor, counting lines.
    fn skip_whitespace(&mut self) {
        let mut i = self.tok.start;
        loop {
            match self.buf.byte(i) {
                b'\n' => {
                    self.line += 1;
                    i += 1;
                }
                b' ' | b'\t' | b'\x0C' | b'\r' => i += 1,
                _ => break,
            }
        }
        self.tok = Span::at(i);
    }

    /// Consumes the current token and positions at the first byte of the
    /// next, skipping whitespace and reading more input as needed. When
    /// `record_skip` is set, `before_skip` is pinned to the offset right
    /// after the consumed token, ahead of the skipped filler.
    ///
    /// Leaves an empty token at the buffer end when the input is exhausted.
    pub(crate) fn next_token_raw(&mut self, record_skip: bool) -> Result<(), Halt> {
        self.consume_token();
        if record_skip {
            self.before_skip = self.tok.start;
        }
        self.skip_whitespace();
        while self.tok.start >= self.buf.len() {
            if self.read_more()? == 0 {
                return Ok(());
            }
            self.skip_whitespace();
        }
        self.tok.end = self.tok.start + 1;
        Ok(())
    }

    /// [`next_token_raw`](Self::next_token_raw) that also skips comments.
    pub(crate) fn next_token(&mut self) -> Result<(), Halt> {
        self.next_token_raw(true)?;
        if !self.tok.is_empty() {
            while self.skip_comment()? {}
            self.reset_token();
        }
        Ok(())
    }

    /// Grows the current token over the longest run of bytes satisfying
    /// `pred`, reading more input so the run is never cut by the buffer
    /// boundary. Returns the token length.
    pub(crate) fn extend_while(&mut self, pred: impl Fn(u8) -> bool) -> Result<usize, Halt> {
        let mut end = self.tok.start;
        loop {
            while end < self.buf.len() && pred(self.buf.byte(end)) {
                end += 1;
            }
            if end < self.buf.len() || self.read_more()? == 0 {
                break;
            }
        }
        self.tok.end = end;
        Ok(self.tok.len())
    }

    /// Grows the current token up to (not including) the next `delim`, or to
    /// the end of input.
    pub(crate) fn extend_until_byte(&mut self, delim: u8) -> Result<usize, Halt> {
        let mut end = self.tok.start;
        loop {
            match memchr(delim, &self.buf.as_slice()[end..]) {
                Some(i) => {
                    end += i;
                    break;
                }
                None => {
                    end = self.buf.len();
                    if self.read_more()? == 0 {
                        break;
                    }
                }
            }
        }
        self.tok.end = end;
        Ok(self.tok.len())
    }

    /// Grows the current token up to the next occurrence of any of the three
    /// delimiters, or to the end of input.
    pub(crate) fn extend_until3(&mut self, a: u8, b: u8, c: u8) -> Result<usize, Halt> {
        let mut end = self.tok.start;
        loop {
            match memchr3(a, b, c, &self.buf.as_slice()[end..]) {
                Some(i) => {
                    end += i;
                    break;
                }
                None => {
                    end = self.buf.len();
                    if self.read_more()? == 0 {
                        break;
                    }
                }
            }
        }
        self.tok.end = end;
        Ok(self.tok.len())
    }

    /// Tries to make the current token `size` bytes long, reading more input
    /// as needed. Returns the achieved length, short only at end of input.
    pub(crate) fn extend_token_size(&mut self, size: usize) -> Result<usize, Halt> {
        loop {
            let rem = self.buf.len() - self.tok.start;
            if rem >= size {
                self.tok.end = self.tok.start + size;
                return Ok(size);
            }
            self.tok.end = self.buf.len();
            if self.read_more()? == 0 {
                return Ok(rem);
            }
        }
    }

    /// Recognizes `[` `=`* `[` … `]` `=`* `]` with matching level, consuming
    /// through the close. Returns false, token left extended, when the
    /// cursor is not at a long-bracket opener. An opener without a matching
    /// close is an error.
    pub(crate) fn skip_long_bracket(&mut self) -> Result<bool, Halt> {
        let line = self.line;
        self.extend_while(|b| b == b'[' || b == b'=')?;
        let t = self.token_bytes();
        if t.first() != Some(&b'[') {
            return Ok(false);
        }
        let level = t[1..].iter().take_while(|&&b| b == b'=').count();
        if t.get(level + 1) != Some(&b'[') {
            return Ok(false);
        }
        self.tok.end = self.tok.start + level + 2;
        self.next_token_raw(false)?;

        loop {
            self.extend_until_byte(b']')?;
            self.next_token_raw(false)?;
            if self.cur() == 0 {
                return Err(self.fail_syntax("Unclosed long bracket", line));
            }
            self.extend_while(|b| b == b']' || b == b'=')?;
            let t = self.token_bytes();
            let close = t[1..].iter().take_while(|&&b| b == b'=').count();
            if close == level && t.get(close + 1) == Some(&b']') {
                self.tok.end = self.tok.start + close + 2;
                self.next_token_raw(false)?;
                return Ok(true);
            }
            // Not the close for our level; step past this ']' and rescan.
            self.tok.end = self.tok.start + 1;
            self.next_token_raw(false)?;
        }
    }

    /// Skips one comment at the cursor, short or long-bracket. Returns
    /// whether a comment was skipped.
    pub(crate) fn skip_comment(&mut self) -> Result<bool, Halt> {
        self.extend_while(|b| matches!(b, b'-' | b'[' | b'='))?;
        if !self.token_bytes().starts_with(b"--") {
            return Ok(false);
        }
        self.tok.start += 2;
        if self.tok.end < self.tok.start {
            self.tok.end = self.tok.start;
        }
        if !self.skip_long_bracket()? {
            self.extend_until_byte(b'\n')?;
            self.next_token_raw(false)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};

    use crate::reader::{is_ident_char, ReaderState};

    /// Yields one byte per read call, forcing every token extension to cross
    /// the buffer boundary.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.split_first() {
                Some((&b, rest)) if !buf.is_empty() => {
                    buf[0] = b;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    fn reader(src: &[u8]) -> ReaderState<Trickle<'_>> {
        ReaderState::from_stream(Trickle(src), "test", false, false, false, None)
    }

    #[test]
    fn tokens_extend_across_read_boundaries() {
        let mut s = reader(b"  identifier_one  next");
        s.next_token().unwrap();
        s.extend_while(is_ident_char).unwrap();
        assert_eq!(s.token_bytes(), b"identifier_one");
        s.next_token().unwrap();
        s.extend_while(is_ident_char).unwrap();
        assert_eq!(s.token_bytes(), b"next");
    }

    #[test]
    fn whitespace_and_comments_count_lines() {
        let mut s = reader(b"a -- one\n-- two\n  --[[three\nfour]] b");
        s.next_token().unwrap();
        assert_eq!(s.token_bytes(), b"a");
        s.next_token().unwrap();
        assert_eq!(s.token_bytes(), b"b");
        assert_eq!(s.line, 4);
    }

    #[test]
    fn long_bracket_levels_must_match() {
        let mut s = reader(b"[==[ skip ]] ]=] ]==] after");
        s.next_token().unwrap();
        assert!(s.skip_long_bracket().unwrap());
        s.extend_while(is_ident_char).unwrap();
        assert_eq!(s.token_bytes(), b"after");
    }

    #[test]
    fn unclosed_long_bracket_is_an_error() {
        let mut s = reader(b"[[ never closed");
        s.next_token().unwrap();
        assert!(s.skip_long_bracket().is_err());
        assert!(s.error().is_some());
    }

    #[test]
    fn dash_alone_is_not_a_comment() {
        let mut s = reader(b"- x");
        s.next_token().unwrap();
        assert_eq!(s.token_bytes(), b"-");
    }

    #[test]
    fn before_skip_excludes_trailing_filler() {
        let mut s = reader(b"name  -- tail\nmore");
        s.next_token().unwrap();
        s.extend_while(|b| b.is_ascii_alphabetic()).unwrap();
        assert_eq!(s.token_bytes(), b"name");
        s.next_token().unwrap();
        // Pinned right after `name`, before the whitespace and comment.
        assert_eq!(s.before_skip, 4);
        s.extend_while(is_ident_char).unwrap();
        assert_eq!(s.token_bytes(), b"more");
    }
}
