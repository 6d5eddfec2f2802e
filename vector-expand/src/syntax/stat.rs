// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::io::Read;

use crate::{
    reader::{is_ident_char, ReaderState},
    rewrite::MarkCopies,
    syntax::{Fit, Step},
};

impl<R: Read> ReaderState<R> {
    /// block ::= {stat} [retstat]
    pub(crate) fn block(&mut self) -> Step {
        self.descend()?;
        let r = self.block_inner();
        self.ascend();
        r
    }

    fn block_inner(&mut self) -> Step {
        while self.stat()? == Fit::Fit {}
        self.retstat()?;
        Ok(Fit::Fit)
    }

    /// stat ::= ';' | label | break | goto Name | do block end | while | repeat
    ///        | if | for | function funcname funcbody | local … | varlist '=' explist
    ///        | functioncall
    ///
    /// The last two shapes are both handled as `explist ['=' explist]`; the
    /// engine recognizes, it does not validate l-values.
    pub(crate) fn stat(&mut self) -> Step {
        let line = self.line;
        self.reset_token();

        if self.cur() == b';' {
            self.eat_char()?;
            return Ok(Fit::Fit);
        }

        if self.cur() == b':' {
            if self.label()? != Fit::Fit {
                return Err(self.fail_syntax("Expected label at ':'", line));
            }
            return Ok(Fit::Fit);
        }

        self.extend_while(is_ident_char)?;

        if self.equal_token(b"break") {
            self.next_token()?;
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"goto") {
            self.next_token()?;
            if self.parse_name(false)? != Fit::Fit {
                return Err(self.fail_syntax("Expected Name after 'goto'", line));
            }
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"do") {
            self.next_token()?;
            self.block()?;
            self.expect_keyword(b"end", "Expected 'end' after 'do block'", line)?;
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"while") {
            self.next_token()?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("Expected exp after 'while'", line));
            }
            self.expect_keyword(b"do", "Expected 'do' after 'while exp'", line)?;
            self.block()?;
            self.expect_keyword(b"end", "Expected 'end' after 'while exp do block'", line)?;
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"repeat") {
            self.next_token()?;
            self.block()?;
            self.expect_keyword(b"until", "Expected 'until' after 'repeat block'", line)?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("Expected exp after 'repeat block until'", line));
            }
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"if") {
            self.next_token()?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("Expected exp after 'if'", line));
            }
            self.expect_keyword(b"then", "Expected 'then' after 'if exp'", line)?;
            self.block()?;
            self.extend_while(is_ident_char)?;
            while self.equal_token(b"elseif") {
                self.next_token()?;
                if self.exp()? != Fit::Fit {
                    return Err(self.fail_syntax("Expected exp after 'elseif'", line));
                }
                self.expect_keyword(b"then", "Expected 'then' after 'elseif exp'", line)?;
                self.block()?;
                self.extend_while(is_ident_char)?;
            }
            if self.equal_token(b"else") {
                self.next_token()?;
                self.block()?;
                self.extend_while(is_ident_char)?;
            }
            if !self.equal_token(b"end") {
                return Err(self.fail_syntax(
                    "Expected 'end' after 'if exp then block {elseif exp then block} \
                     [else block]'",
                    line,
                ));
            }
            self.next_token()?;
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"for") {
            self.next_token()?;
            if self.explist()? != Fit::Fit {
                return Err(self.fail_syntax("Expected explist after 'for'", line));
            }
            // The loop bounds (or iterator expressions) are a fixed-arity
            // list, not values matched to a spread target, so no
            // position-by-position propagation here.
            if self.cur() == b'=' {
                self.eat_char()?;
            } else {
                self.expect_keyword(b"in", "Expected '=' or 'in' after 'for explist'", line)?;
            }
            if self.explist()? != Fit::Fit {
                return Err(self.fail_syntax("Expected explist after 'for explist =|in'", line));
            }
            self.expect_keyword(b"do", "Expected 'do' after 'for explist =|in explist'", line)?;
            self.block()?;
            self.expect_keyword(
                b"end",
                "Expected 'end' after 'for explist =|in explist do block'",
                line,
            )?;
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"function") {
            self.next_token()?;
            if self.funcname()? != Fit::Fit {
                return Err(self.fail_syntax("Expected funcname after 'function'", line));
            }
            if self.funcbody()? != Fit::Fit {
                return Err(self.fail_syntax("Expected funcbody after 'function funcname'", line));
            }
            return Ok(Fit::Fit);
        }

        if self.equal_token(b"local") {
            self.next_token()?;
            self.extend_while(is_ident_char)?;
            if self.equal_token(b"function") {
                self.next_token()?;
                if self.parse_name(false)? != Fit::Fit {
                    return Err(self.fail_syntax("Expected Name after 'local function'", line));
                }
                if self.funcbody()? != Fit::Fit {
                    return Err(
                        self.fail_syntax("Expected funcbody after 'local function Name'", line)
                    );
                }
            } else {
                let mut counts = Vec::new();
                if self.attnamelist(&mut counts)? != Fit::Fit {
                    return Err(
                        self.fail_syntax("Expected 'function' or attnamelist after 'local'", line)
                    );
                }
                if self.cur() == b'=' {
                    self.eat_char()?;
                    if self.explist_forced(&counts)? != Fit::Fit {
                        return Err(
                            self.fail_syntax("Expected explist after 'local attnamelist ='", line)
                        );
                    }
                }
            }
            return Ok(Fit::Fit);
        }

        // varlist '=' explist and functioncall both start as an explist.
        let mut counts = Vec::new();
        match self.explist_counts(&mut counts)? {
            Fit::Fit => {
                if self.cur() == b'=' {
                    self.eat_char()?;
                    if self.explist_forced(&counts)? != Fit::Fit {
                        return Err(self.fail_syntax("Expected explist after 'explist ='", line));
                    }
                }
                Ok(Fit::Fit)
            }
            Fit::Unfit => Ok(Fit::Unfit),
        }
    }

    /// retstat ::= return [explist] [';']
    pub(crate) fn retstat(&mut self) -> Step {
        self.extend_while(is_ident_char)?;
        if !self.equal_token(b"return") {
            return Ok(Fit::Unfit);
        }
        self.next_token()?;
        self.explist()?;
        if self.cur() == b';' {
            self.eat_char()?;
        }
        Ok(Fit::Fit)
    }

    /// label ::= '::' Name '::'
    pub(crate) fn label(&mut self) -> Step {
        let line = self.line;
        self.extend_while(|b| b == b':')?;
        if self.tok.len() != 2 {
            return Ok(Fit::Unfit);
        }
        self.next_token()?;
        if self.parse_name(false)? != Fit::Fit {
            return Err(self.fail_syntax("label expected Name after '::'", line));
        }
        self.extend_while(|b| b == b':')?;
        if self.tok.len() != 2 {
            return Err(self.fail_syntax("label expected '::' after '::Name'", line));
        }
        self.next_token()?;
        Ok(Fit::Fit)
    }

    /// funcname ::= Name {'.' Name} [':' Name]
    pub(crate) fn funcname(&mut self) -> Step {
        let line = self.line;
        let r = self.parse_name(false)?;
        if r != Fit::Fit {
            return Ok(r);
        }
        while self.cur() == b'.' {
            self.eat_char()?;
            if self.parse_name(false)? != Fit::Fit {
                return Err(self.fail_syntax("funcname expected Name after 'Name.'", line));
            }
        }
        if self.cur() == b':' {
            self.eat_char()?;
            if self.parse_name(false)? != Fit::Fit {
                return Err(self.fail_syntax("funcname expected Name after ':'", line));
            }
        }
        Ok(Fit::Fit)
    }

    /// attnamelist ::= Name attrib {',' Name attrib}
    ///
    /// Each declared vector name is spread into its per-component names in
    /// place; `counts` receives one duplication factor per list position so
    /// the initializer list can be spread to match.
    pub(crate) fn attnamelist(&mut self, counts: &mut Vec<u32>) -> Step {
        let line = self.line;
        if self.attname(counts)? != Fit::Fit {
            return Ok(Fit::Unfit);
        }
        while self.cur() == b',' {
            self.eat_char()?;
            if self.attname(counts)? != Fit::Fit {
                return Err(self.fail_syntax("Expected Name after ',' in attnamelist", line));
            }
        }
        Ok(Fit::Fit)
    }

    /// attname ::= Name attrib
    fn attname(&mut self, counts: &mut Vec<u32>) -> Step {
        let start = self.tok.start;
        let marks_base = self.buf.num_marks();
        if self.parse_name(true)? != Fit::Fit {
            return Ok(Fit::Unfit);
        }
        self.attrib()?;
        let pending = super::PendingExp { start, marks_base };
        let copies = self.finish_exp(pending, 1, MarkCopies::None)?;
        counts.push(copies);
        Ok(Fit::Fit)
    }

    /// attrib ::= ['<' Name '>']
    fn attrib(&mut self) -> Step {
        let line = self.line;
        self.reset_token();
        if self.cur() != b'<' {
            return Ok(Fit::Unfit);
        }
        self.eat_char()?;
        if self.parse_name(false)? != Fit::Fit {
            return Err(self.fail_syntax("attrib expected Name after '<'", line));
        }
        if self.cur() != b'>' {
            return Err(self.fail_syntax("attrib expected '>' after '<Name'", line));
        }
        self.eat_char()?;
        Ok(Fit::Fit)
    }
}
