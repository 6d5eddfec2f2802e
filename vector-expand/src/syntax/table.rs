// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::io::Read;

use crate::{
    reader::ReaderState,
    rewrite::{MarkCopies, Prep},
    syntax::{Fit, Halt, Step},
};

/// What one table-constructor field turned out to be.
#[derive(Clone, Copy, Debug)]
enum Field {
    /// `[exp] = exp`, or `key = exp` with a non-vector key. Ends any merge
    /// in progress.
    Plain,
    /// `veckey = exp`: opens a merge wanting `want` components, of which the
    /// right-hand expression supplied `copies`.
    VecKey { want: u32, copies: u32 },
    /// A bare expression supplying `copies` component values.
    Item { copies: u32 },
}

impl<R: Read> ReaderState<R> {
    /// tableconstructor ::= '{' [fieldlist] '}'
    pub(crate) fn tableconstructor(&mut self) -> Step {
        let line = self.line;
        self.reset_token();
        if self.cur() != b'{' {
            return Ok(Fit::Unfit);
        }
        self.eat_char()?;
        self.fieldlist()?;
        if self.cur() != b'}' {
            return Err(self.fail_syntax("Unclosed tableconstructor", line));
        }
        self.eat_char()?;
        Ok(Fit::Fit)
    }

    /// fieldlist ::= field {fieldsep field} [fieldsep]
    ///
    /// Walks fields while tracking merge prep: a vector-keyed field opens a
    /// run that following bare fields feed, one expression per component.
    /// The run closes when the component count is reached, when a keyed or
    /// bracketed field interrupts, or when the list ends; closing rewrites
    /// the collected expressions into per-component key/value fields and
    /// pads what is missing with nil.
    fn fieldlist(&mut self) -> Step {
        let mut prep: Option<Prep> = None;
        loop {
            let field_line = self.line;
            let Some(field) = self.field(prep.is_some())? else {
                break;
            };
            match field {
                Field::Plain => {
                    if let Some(p) = prep.take() {
                        self.merge_fields(&p)?;
                    }
                }
                Field::VecKey { want, copies } => {
                    if let Some(p) = prep.take() {
                        self.merge_fields(&p)?;
                    }
                    let base = self.buf.num_marks() - copies as usize;
                    let p = Prep {
                        base,
                        want,
                        have: copies,
                        end: self.mergeable_end(),
                    };
                    prep = self.step_prep(p, field_line)?;
                }
                Field::Item { copies } => {
                    if let Some(mut p) = prep.take() {
                        p.have += copies;
                        p.end = self.mergeable_end();
                        prep = self.step_prep(p, field_line)?;
                    }
                }
            }
            if self.fieldsep()? != Fit::Fit {
                break;
            }
        }
        if let Some(p) = prep.take() {
            self.merge_fields(&p)?;
        }
        Ok(Fit::Fit)
    }

    /// Closes the prep when it has all its components, errors when it was
    /// fed too many, and keeps it open otherwise.
    fn step_prep(&mut self, p: Prep, line: u32) -> Result<Option<Prep>, Halt> {
        if p.have > p.want {
            return Err(self.fail_syntax("Too many expressions after a vector key", line));
        }
        if p.have == p.want {
            self.merge_fields(&p)?;
            return Ok(None);
        }
        Ok(Some(p))
    }

    /// field ::= '[' exp ']' '=' exp | exp '=' exp | exp
    ///
    /// The first expression of the last two shapes is parsed with its
    /// duplication postponed: only after peeking for `=` is it known to be
    /// a key (left alone, at most one vector mark) or a value (spread, and
    /// marked per copy when a merge is collecting).
    fn field(&mut self, merging: bool) -> Result<Option<Field>, Halt> {
        let line = self.line;
        self.reset_token();

        if self.cur() == b'[' {
            self.eat_char()?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("Expected exp after '[' in field", line));
            }
            if self.cur() != b']' {
                return Err(self.fail_syntax("Expected ']' after '[exp' in field", line));
            }
            self.eat_char()?;
            if self.cur() != b'=' {
                return Err(self.fail_syntax("Expected '=' after '[exp]' in field", line));
            }
            self.eat_char()?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("Expected exp after '[exp] =' in field", line));
            }
            return Ok(Some(Field::Plain));
        }

        let Some(p) = self.exp_pending()? else {
            return Ok(None);
        };

        if self.cur() == b'=' {
            // Assignment-shaped: the left expression is a key, not a value.
            let key_marks = self.buf.num_marks() - p.marks_base;
            if key_marks > 1 {
                self.buf.truncate_marks(p.marks_base);
                return Err(
                    self.fail_syntax("Table key holds more than one vector name", line)
                );
            }
            if key_marks == 1 {
                let m0 = self.buf.mark(p.marks_base);
                let want = u32::from(self.buf.byte(m0 + 1) - b'0');
                self.eat_char()?;
                let Some(value) = self.exp_pending()? else {
                    return Err(self.fail_syntax("Expected exp after 'Name =' in field", line));
                };
                let copies = self.finish_exp(value, 1, MarkCopies::SkipFirst)?;
                return Ok(Some(Field::VecKey { want, copies }));
            }
            self.buf.truncate_marks(p.marks_base);
            self.eat_char()?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("Expected exp after 'Name =' in field", line));
            }
            return Ok(Some(Field::Plain));
        }

        let copies = self.finish_exp(
            p,
            1,
            if merging { MarkCopies::All } else { MarkCopies::None },
        )?;
        Ok(Some(Field::Item { copies }))
    }

    /// fieldsep ::= ',' | ';'
    fn fieldsep(&mut self) -> Step {
        self.reset_token();
        if self.cur() == b',' || self.cur() == b';' {
            self.eat_char()?;
            return Ok(Fit::Fit);
        }
        Ok(Fit::Unfit)
    }
}
