// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::io::Read;

use crate::{
    reader::{is_ident_char, ReaderState},
    rewrite::MarkCopies,
    syntax::{Fit, Halt, Step, KEYWORDS},
};

/// An expression the recognizer walked past but whose duplication the caller
/// postponed: the byte offset of its first token and the mark-stack height
/// on entry. Vector marks collected inside it sit above `marks_base` until
/// [`finish_exp`](ReaderState::finish_exp) consumes them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingExp {
    pub(crate) start: usize,
    pub(crate) marks_base: usize,
}

impl<R: Read> ReaderState<R> {
    /// exp, duplicated in place on exit. Returns Unfit when no expression
    /// starts at the cursor.
    pub(crate) fn exp(&mut self) -> Step {
        Ok(match self.exp_forced(1)? {
            Some(_) => Fit::Fit,
            None => Fit::Unfit,
        })
    }

    /// exp with a caller-imposed duplication factor for markless
    /// expressions. Returns the number of comma-separated copies produced
    /// (1 when nothing was spread).
    pub(crate) fn exp_forced(&mut self, force: u32) -> Result<Option<u32>, Halt> {
        match self.exp_pending()? {
            None => Ok(None),
            Some(p) => Ok(Some(self.finish_exp(p, force, MarkCopies::None)?)),
        }
    }

    /// exp with duplication postponed: the caller inspects what follows (a
    /// table field deciding key from value) and then calls
    /// [`finish_exp`](ReaderState::finish_exp), which also restores the mark
    /// stack.
    pub(crate) fn exp_pending(&mut self) -> Result<Option<PendingExp>, Halt> {
        self.descend()?;
        let marks_base = self.buf.num_marks();
        let r = self.exp_loop(marks_base);
        self.ascend();
        if r.is_err() {
            self.buf.truncate_marks(marks_base);
        }
        r
    }

    /// The operand/operator loop. Folds binop chains, parenthesis nesting,
    /// and prefix-expression tails (calls, method calls, indexing, field
    /// access), pushing a mark for every vector name seen.
    fn exp_loop(&mut self, marks_base: usize) -> Result<Option<PendingExp>, Halt> {
        let line = self.line;
        let start = self.tok.start;
        // Next token must be an operand (true on entry and after an operator).
        let mut hang = true;
        // Last token completed a callable/indexable reference.
        let mut reference = false;
        // Parenthesis level; a close below zero ends the expression.
        let mut par = 0i32;

        loop {
            if !hang && self.binop()? == Fit::Fit {
                hang = true;
                reference = false;
                continue;
            }

            if self.unop()? == Fit::Fit {
                hang = true;
                reference = false;
                continue;
            }

            if hang {
                self.extend_while(is_ident_char)?;
                if self.equal_token(b"nil")
                    || self.equal_token(b"false")
                    || self.equal_token(b"true")
                {
                    self.next_token()?;
                    hang = false;
                    reference = false;
                    continue;
                }

                if self.string()? == Fit::Fit {
                    hang = false;
                    reference = false;
                    continue;
                }

                if self.numeral()? == Fit::Fit {
                    hang = false;
                    reference = false;
                    continue;
                }

                self.extend_while(|b| b == b'.')?;
                if self.tok.len() == 3 {
                    // '...'
                    self.next_token()?;
                    hang = false;
                    reference = false;
                    continue;
                }

                if self.functiondef()? == Fit::Fit {
                    hang = false;
                    reference = true;
                    continue;
                }

                if self.tableconstructor()? == Fit::Fit {
                    hang = false;
                    // A fresh table cannot be called or indexed immediately.
                    reference = false;
                    continue;
                }

                self.reset_token();
                if self.cur() == b'(' {
                    self.eat_char()?;
                    par += 1;
                    hang = true;
                    reference = false;
                    continue;
                }

                if self.parse_name(true)? == Fit::Fit {
                    hang = false;
                    reference = true;
                    continue;
                }
            }

            if reference {
                self.extend_while(|b| b == b':')?;
                if self.tok.len() == 1 {
                    self.next_token()?;
                    if self.parse_name(false)? != Fit::Fit {
                        return Err(
                            self.fail_syntax("Expected Name after ':' in exp functioncall", line)
                        );
                    }
                    if self.args()? != Fit::Fit {
                        return Err(self.fail_syntax(
                            "Expected args after ':Name' in exp functioncall",
                            line,
                        ));
                    }
                    hang = false;
                    reference = true;
                    continue;
                }

                if self.args()? == Fit::Fit {
                    hang = false;
                    reference = true;
                    continue;
                }

                self.reset_token();
                if self.cur() == b'[' {
                    self.eat_char()?;
                    if self.exp()? != Fit::Fit {
                        return Err(self.fail_syntax("Expected exp after '[' in exp var", line));
                    }
                    if self.cur() != b']' {
                        return Err(self.fail_syntax("Expected ']' after '[exp' in exp var", line));
                    }
                    self.eat_char()?;
                    hang = false;
                    reference = true;
                    continue;
                }

                if self.cur() == b'.' {
                    self.eat_char()?;
                    if self.parse_name(true)? != Fit::Fit {
                        return Err(self.fail_syntax("Expected Name after '.' in exp var", line));
                    }
                    hang = false;
                    reference = true;
                    continue;
                }
            }

            self.reset_token();
            if self.cur() == b')' {
                par -= 1;
                if par < 0 {
                    break;
                }
                self.eat_char()?;
                continue;
            }

            // No recognizable unit, or went out of parenthesis scope.
            break;
        }

        if par > 0 {
            return Err(self.fail_syntax("exp has unclosed parenthesis", line));
        }
        if self.tok.start != start && hang {
            return Err(self.fail_syntax("exp has hanging operator", line));
        }
        if self.tok.start == start {
            return Ok(None);
        }
        Ok(Some(PendingExp { start, marks_base }))
    }

    /// explist ::= exp {',' exp}
    pub(crate) fn explist(&mut self) -> Step {
        let line = self.line;
        if self.exp()? != Fit::Fit {
            return Ok(Fit::Unfit);
        }
        while self.cur() == b',' {
            self.eat_char()?;
            if self.exp()? != Fit::Fit {
                return Err(self.fail_syntax("explist expected exp after ','", line));
            }
        }
        Ok(Fit::Fit)
    }

    /// explist recording each expression's duplication factor, so a
    /// following `= explist` can be spread to match position by position.
    pub(crate) fn explist_counts(&mut self, counts: &mut Vec<u32>) -> Step {
        let line = self.line;
        match self.exp_forced(1)? {
            None => return Ok(Fit::Unfit),
            Some(n) => counts.push(n),
        }
        while self.cur() == b',' {
            self.eat_char()?;
            match self.exp_forced(1)? {
                None => return Err(self.fail_syntax("explist expected exp after ','", line)),
                Some(n) => counts.push(n),
            }
        }
        Ok(Fit::Fit)
    }

    /// explist on the right of `=`: a markless expression at position `i`
    /// is duplicated `counts[i]` times so the value list lines up with the
    /// spread targets.
    pub(crate) fn explist_forced(&mut self, counts: &[u32]) -> Step {
        let line = self.line;
        let mut at = 0usize;
        let force = counts.first().copied().unwrap_or(1);
        if self.exp_forced(force)?.is_none() {
            return Ok(Fit::Unfit);
        }
        while self.cur() == b',' {
            self.eat_char()?;
            at += 1;
            let force = counts.get(at).copied().unwrap_or(1);
            if self.exp_forced(force)?.is_none() {
                return Err(self.fail_syntax("explist expected exp after ','", line));
            }
        }
        Ok(Fit::Fit)
    }

    /// args ::= '(' [explist] ')' | tableconstructor | LiteralString
    pub(crate) fn args(&mut self) -> Step {
        let line = self.line;
        self.reset_token();
        if self.cur() == b'(' {
            self.eat_char()?;
            self.explist()?;
            if self.cur() != b')' {
                return Err(self.fail_syntax("Expected ')' after '(explist' in args", line));
            }
            self.eat_char()?;
            return Ok(Fit::Fit);
        }
        if self.tableconstructor()? == Fit::Fit {
            return Ok(Fit::Fit);
        }
        if self.string()? == Fit::Fit {
            return Ok(Fit::Fit);
        }
        Ok(Fit::Unfit)
    }

    /// functiondef ::= function funcbody
    pub(crate) fn functiondef(&mut self) -> Step {
        let line = self.line;
        self.extend_while(is_ident_char)?;
        if !self.equal_token(b"function") {
            return Ok(Fit::Unfit);
        }
        self.next_token()?;
        if self.funcbody()? != Fit::Fit {
            return Err(self.fail_syntax("functiondef expected funcbody after 'function'", line));
        }
        Ok(Fit::Fit)
    }

    /// funcbody ::= '(' [parlist] ')' block end
    ///
    /// Parameters are parsed as an explist: a vector-named parameter spreads
    /// into its per-component names right there.
    pub(crate) fn funcbody(&mut self) -> Step {
        let line = self.line;
        self.reset_token();
        if self.cur() != b'(' {
            return Ok(Fit::Unfit);
        }
        self.eat_char()?;
        self.explist()?;
        self.reset_token();
        if self.cur() != b')' {
            return Err(self.fail_syntax("funcbody expected ')' after '(explist'", line));
        }
        self.eat_char()?;
        self.block()?;
        self.expect_keyword(b"end", "funcbody expected 'end' after '(explist) block'", line)?;
        Ok(Fit::Fit)
    }

    /// Name, reserved words rejected. With `check_vector`, a `v2`/`v3`/`q4`
    /// prefix followed by more identifier bytes pushes the prefix offset on
    /// the mark stack.
    pub(crate) fn parse_name(&mut self, check_vector: bool) -> Step {
        if self.cur().is_ascii_digit() {
            return Ok(Fit::Unfit);
        }
        self.extend_while(is_ident_char)?;
        if self.tok.is_empty() {
            return Ok(Fit::Unfit);
        }
        if KEYWORDS.contains(&self.token_bytes()) {
            return Ok(Fit::Unfit);
        }
        if check_vector && self.tok.len() >= 3 {
            let t = self.token_bytes();
            if matches!((t[0], t[1]), (b'v', b'2') | (b'v', b'3') | (b'q', b'4')) {
                self.buf.push_mark(self.tok.start);
            }
        }
        self.next_token()?;
        Ok(Fit::Fit)
    }

    /// Numeral: decimal or 0x/0X hex, optional fraction, optional signed
    /// exponent (`e`/`E` decimal, `p`/`P` hex). Validated lexically; the
    /// longest valid prefix is taken and a numeral glued to identifier
    /// bytes or a second dot is malformed.
    pub(crate) fn numeral(&mut self) -> Step {
        let line = self.line;
        self.reset_token();
        if self.tok.is_empty() || !self.cur().is_ascii_digit() {
            return Ok(Fit::Unfit);
        }
        self.extend_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))?;
        let valid = {
            let t = self.token_bytes();
            // A valid prefix glued to identifier bytes or a second dot is
            // still malformed.
            numeral_len(t)
                .filter(|&len| !matches!(t.get(len), Some(&b) if is_ident_char(b) || b == b'.'))
        };
        let Some(len) = valid else {
            return Err(self.fail_syntax("Bad Numeral", line));
        };
        self.tok.end = self.tok.start + len;
        self.next_token()?;
        Ok(Fit::Fit)
    }

    /// LiteralString: short strings with matching `'` or `"` (a backslash
    /// escapes the closer; a raw newline terminates with an error), or a
    /// long-bracket string copied through verbatim.
    pub(crate) fn string(&mut self) -> Step {
        let line = self.line;
        self.reset_token();
        let quote = self.cur();
        if quote == b'"' || quote == b'\'' {
            loop {
                self.consume_token();
                self.extend_until3(b'\'', b'"', b'\n')?;
                self.consume_token();
                self.reset_token();
                let c = self.cur();
                if c != b'\'' && c != b'"' {
                    // Newline or end of input before the closer.
                    return Err(self.fail_syntax("Unclosed short string literal", line));
                }
                if c != quote || self.buf.byte(self.tok.start - 1) == b'\\' {
                    continue;
                }
                self.next_token()?;
                return Ok(Fit::Fit);
            }
        }
        if self.skip_long_bracket()? {
            // The bracket scan stops just past the closer; restart the token
            // there so comment skipping sees a clean cursor.
            self.tok.end = self.tok.start;
            self.next_token()?;
            return Ok(Fit::Fit);
        }
        Ok(Fit::Unfit)
    }

    /// binop ::= + - * / // ^ % & ~ | >> << .. < <= > >= == ~= and or
    pub(crate) fn binop(&mut self) -> Step {
        self.reset_token();
        if self.tok.is_empty() {
            return Ok(Fit::Unfit);
        }
        match self.cur() {
            b'+' | b'-' | b'*' | b'^' | b'%' | b'&' | b'|' => {
                self.next_token()?;
                return Ok(Fit::Fit);
            }
            b'/' => {
                self.extend_while(|b| b == b'/')?;
                let size = if self.peek() == b'/' { 2 } else { 1 };
                self.tok.end = self.tok.start + size;
                self.next_token()?;
                return Ok(Fit::Fit);
            }
            b'>' => {
                self.extend_while(|b| b == b'>' || b == b'=')?;
                let nc = self.peek();
                let size = if nc == b'>' || nc == b'=' { 2 } else { 1 };
                self.tok.end = self.tok.start + size;
                self.next_token()?;
                return Ok(Fit::Fit);
            }
            b'<' => {
                self.extend_while(|b| b == b'<' || b == b'=')?;
                let nc = self.peek();
                let size = if nc == b'<' || nc == b'=' { 2 } else { 1 };
                self.tok.end = self.tok.start + size;
                self.next_token()?;
                return Ok(Fit::Fit);
            }
            b'.' => {
                self.extend_while(|b| b == b'.')?;
                if self.tok.len() != 2 {
                    // Isolated '.' is field access, '...' is an operand.
                    return Ok(Fit::Unfit);
                }
                self.next_token()?;
                return Ok(Fit::Fit);
            }
            b'~' => {
                self.extend_while(|b| b == b'~' || b == b'=')?;
                let size = if self.peek() == b'=' { 2 } else { 1 };
                self.tok.end = self.tok.start + size;
                self.next_token()?;
                return Ok(Fit::Fit);
            }
            b'=' => {
                self.extend_while(|b| b == b'=')?;
                if self.peek() == b'=' {
                    self.tok.end = self.tok.start + 2;
                    self.next_token()?;
                    return Ok(Fit::Fit);
                }
                return Ok(Fit::Unfit);
            }
            _ => {}
        }
        self.extend_while(is_ident_char)?;
        if self.equal_token(b"and") || self.equal_token(b"or") {
            self.next_token()?;
            return Ok(Fit::Fit);
        }
        Ok(Fit::Unfit)
    }

    /// unop ::= - # ~ not
    pub(crate) fn unop(&mut self) -> Step {
        let c = self.cur();
        self.reset_token();
        if self.tok.is_empty() {
            return Ok(Fit::Unfit);
        }
        if c == b'-' || c == b'#' || c == b'~' {
            self.next_token()?;
            return Ok(Fit::Fit);
        }
        self.extend_while(is_ident_char)?;
        if self.equal_token(b"not") {
            self.next_token()?;
            return Ok(Fit::Fit);
        }
        Ok(Fit::Unfit)
    }
}

/// Length of the longest valid numeral prefix of `t`, which starts with a
/// digit. None when no valid numeral is present (missing digits).
fn numeral_len(t: &[u8]) -> Option<usize> {
    let hex = t.starts_with(b"0x") || t.starts_with(b"0X");
    let digit = |b: u8| {
        if hex {
            b.is_ascii_hexdigit()
        } else {
            b.is_ascii_digit()
        }
    };
    let mut i = if hex { 2 } else { 0 };
    let mut digits = 0;
    while i < t.len() && digit(t[i]) {
        i += 1;
        digits += 1;
    }
    if i < t.len() && t[i] == b'.' {
        i += 1;
        while i < t.len() && digit(t[i]) {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }
    let marker = if hex { [b'p', b'P'] } else { [b'e', b'E'] };
    if i < t.len() && marker.contains(&t[i]) {
        let mut j = i + 1;
        if j < t.len() && (t[j] == b'+' || t[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < t.len() && t[j].is_ascii_digit() {
            j += 1;
        }
        // The exponent needs at least one digit to count as one.
        if j > exp_start {
            i = j;
        }
    }
    Some(i)
}

#[cfg(test)]
mod tests {
    use super::numeral_len;

    #[test]
    fn numeral_prefixes() {
        assert_eq!(numeral_len(b"123"), Some(3));
        assert_eq!(numeral_len(b"1."), Some(2));
        assert_eq!(numeral_len(b"1.5"), Some(3));
        assert_eq!(numeral_len(b"1e5"), Some(3));
        assert_eq!(numeral_len(b"1e+5"), Some(4));
        assert_eq!(numeral_len(b"1E-5"), Some(4));
        assert_eq!(numeral_len(b"1e"), Some(1));
        assert_eq!(numeral_len(b"1e+"), Some(1));
        assert_eq!(numeral_len(b"0x10"), Some(4));
        assert_eq!(numeral_len(b"0XaB"), Some(4));
        assert_eq!(numeral_len(b"0x.8p2"), Some(6));
        assert_eq!(numeral_len(b"0x1p-3"), Some(6));
        assert_eq!(numeral_len(b"0x1p"), Some(3));
        assert_eq!(numeral_len(b"0x"), None);
        assert_eq!(numeral_len(b"0x.p0"), None);
        assert_eq!(numeral_len(b"1e+5-3"), Some(4));
        assert_eq!(numeral_len(b"1.5.2"), Some(3));
    }
}
