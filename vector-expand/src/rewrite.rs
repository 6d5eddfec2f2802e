// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

//! The vector rewriter. Two operations, both in-place right-shift rewrites
//! of the parse buffer: spreading an expression into per-component copies,
//! and folding a run of table fields behind a vector key into per-component
//! key/value fields.

use std::io::Read;

use crate::{
    reader::{is_ident_char, ReaderState},
    syntax::{Halt, PendingExp},
};

/// Component letters by index.
const COMPS: [u8; 4] = *b"xyzw";

/// What [`finish_exp`](ReaderState::finish_exp) leaves on the mark stack for
/// its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MarkCopies {
    /// Nothing: the stack is restored to the height on expression entry.
    None,
    /// One expression mark at the start of every copy.
    All,
    /// Expression marks for every copy but the first, which already sits
    /// behind a rewritten vector key.
    SkipFirst,
}

/// Bookkeeping for a pending table-field merge: a vector key has been seen
/// and bare fields are being collected, one expression per component.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Prep {
    /// Index of the key's mark; the collected value marks sit above it, so
    /// the prep owns the mark range `base..base + have`.
    pub(crate) base: usize,
    /// Components the key wants.
    pub(crate) want: u32,
    /// Component values supplied so far.
    pub(crate) have: u32,
    /// Offset just past the last mergeable expression, where nil padding
    /// goes.
    pub(crate) end: usize,
}

impl<R: Read> ReaderState<R> {
    /// Ends a recognized expression: computes its trimmed byte range,
    /// spreads it into per-component copies when it holds vector names (or
    /// when the caller forces a factor), rewrites the marked prefixes, and
    /// settles the mark stack. Returns the number of comma-separated copies
    /// now in the buffer.
    pub(crate) fn finish_exp(
        &mut self,
        p: PendingExp,
        force: u32,
        mark_copies: MarkCopies,
    ) -> Result<u32, Halt> {
        let line = self.line;
        let end = self.mergeable_end();
        let marks_len = self.buf.num_marks();

        let copies = if marks_len > p.marks_base {
            let mut min = u32::MAX;
            for i in p.marks_base..marks_len {
                let m = self.buf.mark(i);
                let comps = u32::from(self.buf.byte(m + 1).wrapping_sub(b'0'));
                if !(2..=4).contains(&comps) {
                    self.buf.truncate_marks(p.marks_base);
                    return Err(self.fail_runtime("Bad vector prefix decode", line));
                }
                min = min.min(comps);
            }
            min
        } else {
            force.max(1)
        };

        let len = end - p.start;
        if copies > 1 {
            self.duplicate(p.start, len, p.marks_base, marks_len, copies as usize)?;
        }

        self.buf.truncate_marks(p.marks_base);
        match mark_copies {
            MarkCopies::None => {}
            MarkCopies::All | MarkCopies::SkipFirst => {
                let first = usize::from(mark_copies == MarkCopies::SkipFirst);
                for i in first..copies as usize {
                    self.buf.push_mark(p.start + (len + 1) * i);
                }
            }
        }
        Ok(copies)
    }

    /// Offset just past the last consumed expression byte: `before_skip`
    /// with any whitespace the bracket scans let through trimmed back off.
    pub(crate) fn mergeable_end(&self) -> usize {
        let mut end = self.before_skip;
        while end > 0
            && matches!(
                self.buf.byte(end - 1),
                b' ' | b'\t' | b'\n' | b'\x0C' | b'\r'
            )
        {
            end -= 1;
        }
        end
    }

    /// Spreads `[start, start+len)` into `n` comma-separated copies and
    /// rewrites the marked vector prefixes in each copy to its component:
    /// the `v` becomes a space and the digit becomes `x`/`y`/`z`/`w` (a `q`
    /// is kept as the nominal prefix). Newlines and short comments are
    /// blanked in all but the last copy so the line count of the run is
    /// unchanged.
    fn duplicate(
        &mut self,
        start: usize,
        len: usize,
        marks_base: usize,
        marks_len: usize,
        n: usize,
    ) -> Result<(), Halt> {
        let add = match len.checked_add(1).and_then(|l| l.checked_mul(n - 1)) {
            Some(add) => add,
            None => return Err(self.fail_oversize(crate::buffer::Oversize)),
        };
        let end = start + len;
        if let Err(e) = self.buf.shift_right(end, add, false) {
            return Err(self.fail_oversize(e));
        }
        self.tok.shift(add);
        self.before_skip += add;

        for i in 1..n {
            let dup = start + (len + 1) * i;
            self.buf.set_byte(dup - 1, b',');
            self.buf.copy_within(start, len, dup);
        }

        for i in 0..n {
            let copy = start + (len + 1) * i;
            for v in marks_base..marks_len {
                let at = copy + (self.buf.mark(v) - start);
                if self.buf.byte(at) == b'v' {
                    self.buf.set_byte(at, b' ');
                }
                self.buf.set_byte(at + 1, COMPS[i]);
            }
        }

        for i in 0..n - 1 {
            let copy = start + (len + 1) * i;
            self.neutralize(copy, copy + len);
        }
        Ok(())
    }

    /// Blanks newlines (and carriage returns) and short-comment tails inside
    /// a non-last copy: its newlines migrate to the last copy, and a `--`
    /// must not swallow the copies after it.
    fn neutralize(&mut self, from: usize, to: usize) {
        let mut in_comment = false;
        let mut i = from;
        while i < to {
            let b = self.buf.byte(i);
            if b == b'\n' || b == b'\r' {
                self.buf.set_byte(i, b' ');
                in_comment = false;
            } else if in_comment {
                self.buf.set_byte(i, b' ');
            } else if b == b'-' && i + 1 < to && self.buf.byte(i + 1) == b'-' {
                in_comment = true;
                self.buf.set_byte(i, b' ');
            }
            i += 1;
        }
    }

    /// Folds the collected mergeable run into per-component fields: the key
    /// mark becomes the first component, each further marked expression gets
    /// a synthesized `comp=` key in front, and missing components are padded
    /// with `=nil` fields at the mergeable end.
    pub(crate) fn merge_fields(&mut self, prep: &Prep) -> Result<(), Halt> {
        let line = self.line;
        let k = prep.have as usize;
        let want = prep.want as usize;
        if !(2..=4).contains(&want) || k > want {
            self.buf.truncate_marks(prep.base);
            return Err(self.fail_runtime("Bad vector key component count", line));
        }
        let mut end = prep.end;
        let m0 = self.buf.mark(prep.base);
        if m0 >= end {
            self.buf.truncate_marks(prep.base);
            return Err(self.fail_runtime("Vector key mark past the mergeable end", line));
        }

        let keep_q = self.buf.byte(m0) == b'q';
        if !keep_q {
            self.buf.set_byte(m0, b' ');
        }
        self.buf.set_byte(m0 + 1, COMPS[0]);

        let mut body_end = m0 + 2;
        while is_ident_char(self.buf.byte(body_end)) {
            body_end += 1;
        }
        let body = self.buf.as_slice()[m0 + 2..body_end].to_vec();

        let mut text = Vec::with_capacity(body.len() + 8);
        for i in 1..k {
            let mi = self.buf.mark(prep.base + i);
            if mi > end {
                self.buf.truncate_marks(prep.base);
                return Err(self.fail_runtime("Field mark past the mergeable end", line));
            }
            text.clear();
            if keep_q {
                text.push(b'q');
            }
            text.push(COMPS[i]);
            text.extend_from_slice(&body);
            text.push(b'=');
            self.insert(mi, &text)?;
            end += text.len();
        }

        for i in k..want {
            text.clear();
            text.push(b',');
            if keep_q {
                text.push(b'q');
            }
            text.push(COMPS[i]);
            text.extend_from_slice(&body);
            text.extend_from_slice(b"=nil");
            self.insert(end, &text)?;
            end += text.len();
        }

        self.buf.drain_marks(prep.base, prep.base + k);
        Ok(())
    }

    /// Right-shift insertion of `text` at `at`, with cursor, skip, and mark
    /// fixup. Only valid while the cursor sits at or past `at`.
    fn insert(&mut self, at: usize, text: &[u8]) -> Result<(), Halt> {
        debug_assert!(self.tok.start >= at, "insert past the cursor");
        if let Err(e) = self.buf.shift_right(at, text.len(), true) {
            return Err(self.fail_oversize(e));
        }
        for (i, &b) in text.iter().enumerate() {
            self.buf.set_byte(at + i, b);
        }
        self.tok.shift(text.len());
        self.before_skip += text.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bstr::ByteSlice;

    use crate::expand_string;

    fn expand(src: &[u8]) -> Vec<u8> {
        let mut text = b"LFV_EXPAND_VECTORS()\n".to_vec();
        text.extend_from_slice(src);
        let out = expand_string(&text, false, None).unwrap();
        out[21..].to_vec()
    }

    #[test]
    fn duplication_factor_is_the_minimum_component_count() {
        let out = expand(b"x = v2a + q4b\n");
        assert_eq!(out.as_bstr(), b"x =  xa + qxb, ya + qyb\n".as_bstr());
    }

    #[test]
    fn newlines_migrate_to_the_last_copy() {
        let src = b"local v3a = (\n1)\n";
        let out = expand(src);
        let lines = out.iter().filter(|&&b| b == b'\n').count();
        assert_eq!(lines, src.iter().filter(|&&b| b == b'\n').count());
        assert_eq!(
            out.as_bstr(),
            b"local  xa, ya, za = ( 1),( 1),(\n1)\n".as_bstr(),
        );
    }

    #[test]
    fn short_comments_are_blanked_in_non_last_copies() {
        let out = expand(b"local v2a = v2b -- note\n+ 1\n");
        assert_eq!(
            out.as_bstr(),
            b"local  xa, ya =  xb         + 1, yb -- note\n+ 1\n".as_bstr(),
        );
    }

    #[test]
    fn long_strings_are_copied_verbatim() {
        let out = expand(b"local v2a = f([[x\ny]])\n");
        assert_eq!(
            out.as_bstr(),
            b"local  xa, ya = f([[x y]]),f([[x\ny]])\n".as_bstr(),
        );
    }

    #[test]
    fn q_prefix_is_kept_on_components() {
        let out = expand(b"q4r = q4s\n");
        assert_eq!(out.as_bstr(), b"qxr,qyr,qzr,qwr = qxs,qys,qzs,qws\n".as_bstr());
    }
}
