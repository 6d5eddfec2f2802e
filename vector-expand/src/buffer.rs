// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Read},
};

use bstr::ByteSlice;

/// How many bytes one source read may append.
pub(crate) const READ_SIZE: usize = 256;

/// A size computation overflowed. The caller converts this into
/// [`ExpandError::Memory`](crate::ExpandError::Memory) with the current line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Oversize;

/// The working window of the input: bytes read from the source but not yet
/// released to the consumer, plus the shared mark stack of offsets into it.
///
/// The byte at index `num` is always NUL, so the lexer can probe one byte
/// past the last without a bounds check and treat NUL as end-of-input.
pub(crate) struct ParseBuf {
    bytes: Vec<u8>,
    /// Count of live bytes, excluding the NUL terminator.
    num: usize,
    /// Offsets of vector prefixes and expression starts collected by the
    /// recognizer. Each recognizer that pushes records the height on entry
    /// and truncates back before returning.
    marks: Vec<usize>,
}

impl ParseBuf {
    pub(crate) fn new() -> Self {
        ParseBuf {
            bytes: vec![0],
            num: 0,
            marks: Vec::new(),
        }
    }

    pub(crate) fn from_bytes(chunk: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(chunk.len() + 1);
        bytes.extend_from_slice(chunk);
        bytes.push(0);
        ParseBuf {
            bytes,
            num: chunk.len(),
            marks: Vec::new(),
        }
    }

    /// Count of live bytes.
    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.num
    }

    /// The byte at `at`, where `at == len()` reads the NUL terminator.
    #[inline(always)]
    pub(crate) fn byte(&self, at: usize) -> u8 {
        self.bytes[at]
    }

    #[inline(always)]
    pub(crate) fn set_byte(&mut self, at: usize, b: u8) {
        debug_assert!(at < self.num, "write past live bytes");
        self.bytes[at] = b;
    }

    #[inline(always)]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.num]
    }

    /// Overwrites `start..end` with spaces.
    pub(crate) fn blank(&mut self, start: usize, end: usize) {
        self.bytes[start..end].fill(b' ');
    }

    /// Copies the live bytes `[src, src + len)` over `[dest, dest + len)`.
    pub(crate) fn copy_within(&mut self, src: usize, len: usize, dest: usize) {
        debug_assert!(dest + len <= self.num, "copy past live bytes");
        self.bytes.copy_within(src..src + len, dest);
    }

    /// Grows the allocation to hold `n` live bytes plus the terminator,
    /// rounding up to the next power of two.
    pub(crate) fn ensure_size(&mut self, n: usize) -> Result<(), Oversize> {
        let want = n.checked_add(1).ok_or(Oversize)?;
        if want > self.bytes.capacity() {
            let cap = want.checked_next_power_of_two().ok_or(Oversize)?;
            self.bytes.reserve(cap - self.bytes.len());
        }
        Ok(())
    }

    /// Appends up to [`READ_SIZE`] bytes from `src`. Returns the count
    /// appended; 0 means end of input.
    pub(crate) fn read_from(&mut self, src: &mut impl Read) -> io::Result<usize> {
        let start = self.num;
        self.bytes.resize(start + READ_SIZE + 1, 0);
        let read = src.read(&mut self.bytes[start..start + READ_SIZE]);
        if let Ok(n) = read {
            self.num += n;
        }
        self.bytes.truncate(self.num + 1);
        self.bytes[self.num] = 0;
        read
    }

    /// Moves the bytes `[start, len())` right by `amount`, leaving a gap of
    /// `amount` bytes at `start` for the caller to fill. Marks at or past
    /// `start` are adjusted when `update_marks` is set; the caller asserts
    /// that no mark past `start` is live otherwise.
    pub(crate) fn shift_right(
        &mut self,
        start: usize,
        amount: usize,
        update_marks: bool,
    ) -> Result<(), Oversize> {
        let new_num = self.num.checked_add(amount).ok_or(Oversize)?;
        self.ensure_size(new_num)?;
        self.bytes.resize(new_num + 1, 0);
        self.bytes.copy_within(start..self.num, start + amount);
        self.num = new_num;
        self.bytes[self.num] = 0;
        if update_marks {
            for m in &mut self.marks {
                if *m >= start {
                    *m += amount;
                }
            }
        } else {
            debug_assert!(
                self.marks.iter().all(|&m| m < start),
                "mark past an unadjusted shift",
            );
        }
        Ok(())
    }

    /// Drops the consumed prefix `[0, upto)`, moving the tail to offset 0.
    /// Done between streaming deliveries; no marks may be live.
    pub(crate) fn flush_consumed(&mut self, upto: usize) {
        debug_assert!(self.marks.is_empty(), "flush with live marks");
        self.bytes.copy_within(upto..self.num, 0);
        self.num -= upto;
        self.bytes.truncate(self.num + 1);
        self.bytes[self.num] = 0;
    }

    #[inline(always)]
    pub(crate) fn push_mark(&mut self, at: usize) {
        self.marks.push(at);
    }

    #[inline(always)]
    pub(crate) fn mark(&self, i: usize) -> usize {
        self.marks[i]
    }

    #[inline(always)]
    pub(crate) fn num_marks(&self) -> usize {
        self.marks.len()
    }

    #[inline(always)]
    pub(crate) fn truncate_marks(&mut self, height: usize) {
        self.marks.truncate(height);
    }

    /// Removes the marks `[from, to)`, keeping any pushed above them.
    pub(crate) fn drain_marks(&mut self, from: usize, to: usize) {
        self.marks.drain(from..to);
    }
}

impl Debug for ParseBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseBuf")
            .field("bytes", &self.as_slice().as_bstr())
            .field("marks", &self.marks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_right_leaves_gap_and_moves_marks() {
        let mut buf = ParseBuf::from_bytes(b"abcdef");
        buf.push_mark(1);
        buf.push_mark(4);
        buf.shift_right(3, 2, true).unwrap();
        assert_eq!(&buf.as_slice()[..3], b"abc");
        assert_eq!(&buf.as_slice()[5..], b"def");
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.byte(8), 0);
        assert_eq!(buf.mark(0), 1);
        assert_eq!(buf.mark(1), 6);
        buf.truncate_marks(0);
    }

    #[test]
    fn flush_consumed_keeps_tail() {
        let mut buf = ParseBuf::from_bytes(b"hello world");
        buf.flush_consumed(6);
        assert_eq!(buf.as_slice(), b"world");
        assert_eq!(buf.byte(buf.len()), 0);
    }

    #[test]
    fn read_from_appends_and_terminates() {
        let mut buf = ParseBuf::new();
        let mut src = &b"one two"[..];
        let n = buf.read_from(&mut src).unwrap();
        assert_eq!(n, 7);
        assert_eq!(buf.as_slice(), b"one two");
        assert_eq!(buf.byte(7), 0);
        assert_eq!(buf.read_from(&mut src).unwrap(), 0);
    }

    #[test]
    fn oversize_is_reported_not_wrapped() {
        let mut buf = ParseBuf::from_bytes(b"x");
        assert_eq!(buf.shift_right(0, usize::MAX, false), Err(Oversize));
        assert_eq!(buf.ensure_size(usize::MAX), Err(Oversize));
    }
}
