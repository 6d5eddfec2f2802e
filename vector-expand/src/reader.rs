// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::{
    fmt::{self, Debug, Formatter},
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use bstr::ByteSlice;
use static_assertions::assert_impl_all;

use crate::{
    buffer::{Oversize, ParseBuf},
    span::Span,
    syntax::{Fit, Halt},
    ExpandError, MAX_LEVEL,
};

/// The token that opts a chunk into expansion when it is the first thing in
/// the file. It is compared byte-for-byte, parentheses included.
pub const SENTINEL: &[u8] = b"LFV_EXPAND_VECTORS()";

/// Whether vector expansion is running for this chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// First delivery not yet made; the sentinel has not been looked for.
    Pending { force: bool },
    Expanding,
    /// No sentinel and not forced: the chunk passes through unchanged.
    Off,
    Failed,
}

/// One expansion run: the input source, the working byte window, the token
/// cursor, and the mode and error bookkeeping shared by the lexer, the
/// recognizer, and the rewriter.
///
/// A reader is driven by repeated [`read_next`](ReaderState::read_next)
/// calls. In streaming mode each call yields the output for one top-level
/// statement; otherwise the first call yields the whole expanded chunk. An
/// empty delivery means end of input.
pub struct ReaderState<R> {
    /// Remaining input, if reading from a stream. `None` when the whole
    /// chunk was handed over up front.
    src: Option<R>,
    name: String,
    pub(crate) buf: ParseBuf,
    /// The current token. `tok.start == buf.len()` with an empty span means
    /// end of input.
    pub(crate) tok: Span,
    /// Offset just past the last consumed token, before any whitespace or
    /// comments were skipped. Trims trailing filler from expression ranges.
    pub(crate) before_skip: usize,
    /// Current 1-based source line.
    pub(crate) line: u32,
    /// Recursion depth of the recognizer, bounded by [`MAX_LEVEL`].
    pub(crate) level: u32,
    mode: Mode,
    /// The first error of the run; later diagnostics are discarded.
    pub(crate) err: Option<ExpandError>,
    streaming: bool,
    skip_header: bool,
    log: Log,
}

assert_impl_all!(ReaderState<File>: Send);

struct Log {
    path: Option<PathBuf>,
    file: Option<File>,
    trailed: bool,
}

impl ReaderState<io::Empty> {
    /// Creates a reader over an in-memory chunk. No BOM or shebang handling
    /// is done; the chunk is expanded as-is.
    pub fn from_bytes(
        chunk: &[u8],
        name: &str,
        force: bool,
        streaming: bool,
        log_path: Option<&Path>,
    ) -> Self {
        let mut state = ReaderState::init(None, name, force, streaming, false, log_path);
        state.buf = ParseBuf::from_bytes(chunk);
        state
    }
}

impl<R: Read> ReaderState<R> {
    /// Creates a reader pulling from `src`. When `skip_header` is set, a
    /// leading UTF-8 byte order mark and a first line starting with `#` are
    /// dropped from the output (the shebang's newline is kept so line
    /// numbers hold).
    pub fn from_stream(
        src: R,
        name: &str,
        force: bool,
        streaming: bool,
        skip_header: bool,
        log_path: Option<&Path>,
    ) -> Self {
        ReaderState::init(Some(src), name, force, streaming, skip_header, log_path)
    }

    fn init(
        src: Option<R>,
        name: &str,
        force: bool,
        streaming: bool,
        skip_header: bool,
        log_path: Option<&Path>,
    ) -> Self {
        ReaderState {
            src,
            name: name.to_owned(),
            buf: ParseBuf::new(),
            tok: Span::at(0),
            before_skip: 0,
            line: 1,
            level: 0,
            mode: Mode::Pending { force },
            err: None,
            streaming,
            skip_header,
            log: Log {
                path: log_path.map(Path::to_path_buf),
                file: None,
                trailed: false,
            },
        }
    }

    /// The human-readable source name for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The first error of the run, if one has been recorded.
    pub fn error(&self) -> Option<&ExpandError> {
        self.err.as_ref()
    }

    /// Whether this reader decided to expand (sentinel seen or forced).
    /// Meaningful after the first `read_next` call.
    pub fn expanding(&self) -> bool {
        matches!(self.mode, Mode::Expanding)
    }

    /// Produces the next delivery of output bytes. An empty slice means end
    /// of input. After an error, every call returns that same error and no
    /// further bytes are delivered.
    pub fn read_next(&mut self) -> Result<&[u8], ExpandError> {
        if self.mode == Mode::Failed {
            return Err(self.sticky());
        }
        self.flush();
        if let Mode::Pending { force } = self.mode {
            if self.first_entry(force).is_err() {
                return Err(self.halted());
            }
        }
        let run = match self.mode {
            Mode::Expanding => self.expand_some(),
            _ => self.pass_through(),
        };
        match run {
            Ok(n) => Ok(self.deliver(n)),
            Err(Halt) => Err(self.halted()),
        }
    }

    /// Releases the previously delivered prefix of the buffer.
    fn flush(&mut self) {
        let upto = self.tok.start;
        if upto == 0 {
            return;
        }
        self.buf.flush_consumed(upto);
        self.tok = Span::from(0..self.tok.end - upto);
        self.before_skip = self.before_skip.saturating_sub(upto);
    }

    /// Drops the header, decides the mode from the sentinel, and opens the
    /// log. Runs once, before the first delivery.
    fn first_entry(&mut self, force: bool) -> Result<(), Halt> {
        if self.skip_header {
            self.extend_token_size(3)?;
            if self.equal_token(b"\xEF\xBB\xBF") {
                self.consume_token();
                self.flush();
            }
            self.extend_token_size(1)?;
            if self.cur() == b'#' {
                self.extend_until_byte(b'\n')?;
                self.consume_token();
                self.flush();
            }
            self.tok = Span::at(self.tok.start);
        }

        self.next_token()?;
        self.extend_while(|b| is_ident_char(b) || b == b'(' || b == b')')?;

        if self.equal_token(SENTINEL) {
            // Blank the call so the fake function is never reached.
            self.buf.blank(self.tok.start, self.tok.end);
            self.mode = Mode::Expanding;
            self.next_token()?;
        } else {
            self.mode = if force { Mode::Expanding } else { Mode::Off };
        }
        self.open_log();
        Ok(())
    }

    /// Expands one top-level statement (streaming) or the whole chunk, and
    /// returns the count of deliverable bytes.
    fn expand_some(&mut self) -> Result<usize, Halt> {
        loop {
            let line = self.line;
            if self.stat()? == Fit::Unfit {
                if self.retstat()? == Fit::Unfit {
                    if self.cur() != 0 {
                        return Err(self.fail_syntax("Bad stat in main block", line));
                    }
                    let end = if self.streaming { self.tok.start } else { self.buf.len() };
                    return Ok(end);
                }
            }
            if self.streaming {
                return Ok(self.tok.start);
            }
        }
    }

    /// Off mode: hand the input through unchanged.
    fn pass_through(&mut self) -> Result<usize, Halt> {
        if self.streaming {
            if self.buf.len() == 0 {
                self.read_more()?;
            }
        } else {
            while self.read_more()? != 0 {}
        }
        self.tok = Span::at(self.buf.len());
        Ok(self.buf.len())
    }

    fn deliver(&mut self, n: usize) -> &[u8] {
        if let Some(f) = &mut self.log.file {
            let _ = f.write_all(&self.buf.as_slice()[..n]);
        }
        &self.buf.as_slice()[..n]
    }

    fn open_log(&mut self) {
        let Some(path) = &self.log.path else { return };
        let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let verb = match self.mode {
            Mode::Expanding => "vector expansion of",
            _ => "not expanding",
        };
        let _ = writeln!(f, "-- LFV: {verb} {}", self.name);
        self.log.file = Some(f);
    }

    /// Seals the run after an error and returns the recorded diagnosis.
    fn halted(&mut self) -> ExpandError {
        self.mode = Mode::Failed;
        let err = self.sticky();
        if let (Some(f), false) = (&mut self.log.file, self.log.trailed) {
            self.log.trailed = true;
            let _ = write!(
                f,
                "\n-- LFV: expansion error ('{}' ln {}): {}",
                self.name,
                err.line(),
                err,
            );
        }
        err
    }

    fn sticky(&self) -> ExpandError {
        match &self.err {
            Some(err) => err.clone(),
            // A recognizer halted without a diagnosis; report it as the
            // internal bug it is rather than panicking mid-delivery.
            None => ExpandError::Runtime {
                msg: "halt without a recorded error",
                line: self.line,
            },
        }
    }

    /// Appends more input from the source, growing the buffer. Returns the
    /// count appended; 0 at end of input.
    pub(crate) fn read_more(&mut self) -> Result<usize, Halt> {
        let Some(src) = &mut self.src else {
            return Ok(0);
        };
        match self.buf.read_from(src) {
            Ok(n) => Ok(n),
            Err(e) => {
                let line = self.line;
                Err(self.fail(ExpandError::File {
                    msg: e.to_string(),
                    line,
                }))
            }
        }
    }

    /// Records `err` if it is the first of the run and returns the halt
    /// marker for propagation.
    pub(crate) fn fail(&mut self, err: ExpandError) -> Halt {
        if self.err.is_none() {
            self.err = Some(err);
        }
        Halt
    }

    pub(crate) fn fail_syntax(&mut self, msg: &'static str, line: u32) -> Halt {
        self.fail(ExpandError::Syntax { msg, line })
    }

    pub(crate) fn fail_runtime(&mut self, msg: &'static str, line: u32) -> Halt {
        self.fail(ExpandError::Runtime { msg, line })
    }

    pub(crate) fn fail_oversize(&mut self, _: Oversize) -> Halt {
        let line = self.line;
        self.fail(ExpandError::Memory { line })
    }

    /// Bumps the recursion level, halting past [`MAX_LEVEL`].
    pub(crate) fn descend(&mut self) -> Result<(), Halt> {
        self.level += 1;
        if self.level > MAX_LEVEL {
            let line = self.line;
            return Err(self.fail(ExpandError::RecursionLimit { line }));
        }
        Ok(())
    }

    pub(crate) fn ascend(&mut self) {
        debug_assert!(self.level > 0, "unbalanced recursion bookkeeping");
        self.level -= 1;
    }
}

pub(crate) fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl<R> Drop for ReaderState<R> {
    fn drop(&mut self) {
        if let Some(f) = &mut self.log.file {
            let _ = f.write_all(b"\n");
        }
    }
}

impl<R> Debug for ReaderState<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderState")
            .field("name", &self.name)
            .field("buf", &self.buf)
            .field("tok", &self.tok)
            .field("tok_bytes", &self.tok.slice(self.buf.as_slice()).as_bstr())
            .field("before_skip", &self.before_skip)
            .field("line", &self.line)
            .field("level", &self.level)
            .field("mode", &self.mode)
            .field("err", &self.err)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(state: &mut ReaderState<&[u8]>) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let delivery = state.read_next().unwrap();
            if delivery.is_empty() {
                return out;
            }
            out.extend_from_slice(delivery);
        }
    }

    #[test]
    fn streaming_matches_whole_chunk() {
        let src = b"LFV_EXPAND_VECTORS()\nlocal v2a = v2b + v2c\nprint(v3d)\nreturn v2a\n";
        let mut streamed =
            ReaderState::from_stream(&src[..], "chunk", false, true, false, None);
        let streamed = drain(&mut streamed);
        let whole = crate::expand_string(src, false, None).unwrap();
        assert_eq!(streamed.as_bstr(), whole.as_bstr());
    }

    #[test]
    fn streaming_stops_at_statement_boundaries() {
        let src = b"LFV_EXPAND_VECTORS()\nlocal a = 1\nlocal b = 2\n";
        let mut state = ReaderState::from_stream(&src[..], "chunk", false, true, false, None);
        let first = state.read_next().unwrap().to_vec();
        assert!(first.ends_with(b"local a = 1\n"), "{:?}", first.as_bstr());
        let second = state.read_next().unwrap().to_vec();
        assert_eq!(second.as_bstr(), b"local b = 2\n".as_bstr());
        assert!(state.read_next().unwrap().is_empty());
    }

    #[test]
    fn pass_through_streams_unchanged() {
        let src = b"print('hi')\n-- no sentinel here\nx = 1\n";
        let mut state = ReaderState::from_stream(&src[..], "chunk", false, true, false, None);
        assert_eq!(drain(&mut state).as_bstr(), src.as_bstr());
        assert!(!state.expanding());
    }

    #[test]
    fn bom_only_input_is_dropped() {
        let src = b"\xEF\xBB\xBF";
        let mut state = ReaderState::from_stream(&src[..], "chunk", false, false, true, None);
        assert!(state.read_next().unwrap().is_empty());
        assert_eq!(state.line, 1);
    }

    #[test]
    fn shebang_text_is_dropped_but_newline_kept() {
        let src = b"#!/usr/bin/env host\nLFV_EXPAND_VECTORS() local v2a = 1\n";
        let mut state = ReaderState::from_stream(&src[..], "chunk", false, false, true, None);
        let out = drain(&mut state);
        assert!(out.starts_with(b"\n"), "{:?}", out.as_bstr());
        assert!(out.ends_with(b"local  xa, ya = 1,1\n"), "{:?}", out.as_bstr());
    }

    #[test]
    fn errors_are_sticky() {
        let src = b"LFV_EXPAND_VECTORS()\nlocal a = (1\n";
        let mut state = ReaderState::from_stream(&src[..], "chunk", false, true, false, None);
        let first = state.read_next().unwrap_err();
        let second = state.read_next().unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn forced_expansion_blanks_a_present_sentinel() {
        let out = crate::expand_string(b"LFV_EXPAND_VECTORS()\nx = 1\n", true, None).unwrap();
        assert_eq!(out.as_bstr(), b"                    \nx = 1\n".as_bstr());
    }

    #[test]
    fn log_file_gets_banner_output_and_final_newline() {
        let path = std::env::temp_dir().join(format!("lfv-log-{}.lua", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let src = &b"LFV_EXPAND_VECTORS()\nx = 1\n"[..];
            let mut state =
                ReaderState::from_stream(src, "chunk", false, false, false, Some(&path));
            while !state.read_next().unwrap().is_empty() {}
        }
        let log = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(
            log.starts_with(b"-- LFV: vector expansion of chunk\n"),
            "{:?}",
            log.as_bstr(),
        );
        assert!(log.ends_with(b"x = 1\n\n"), "{:?}", log.as_bstr());
    }
}
