// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

//! Streaming one-pass expansion of fake vector names into per-component
//! scalar code.
//!
//! A chunk opts in by starting with the sentinel call `LFV_EXPAND_VECTORS()`
//! (or the caller forces expansion). Identifiers carrying a `v2`, `v3`, or
//! `q4` prefix are treated as 2-, 3-, or 4-component vectors: an expression
//! containing them is spread into one comma-separated copy per component,
//! and a table field keyed by a vector name folds the following bare fields
//! into per-component key/value pairs. Everything else passes through
//! untouched, including the original line numbering, so the host
//! interpreter's error messages keep pointing at the user's source.
//!
//! Use [`expand_string`] or [`expand_file`] for whole-chunk expansion, or
//! drive a [`ReaderState`] directly to pull output a statement at a time.

mod buffer;
mod error;
mod lexer;
mod reader;
mod rewrite;
mod span;
mod syntax;

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

pub use error::{ErrorKind, ExpandError};
pub use reader::{ReaderState, SENTINEL};

/// Recognizer recursion limit: deeper nesting of expressions and blocks
/// aborts the run instead of overflowing the stack.
pub const MAX_LEVEL: u32 = 200;

/// Expands an in-memory chunk and returns the full output. The chunk is
/// taken as-is: no byte order mark or shebang handling.
pub fn expand_string(
    chunk: &[u8],
    force: bool,
    log_path: Option<&Path>,
) -> Result<Vec<u8>, ExpandError> {
    let mut state = ReaderState::from_bytes(chunk, "string", force, false, log_path);
    let out = state.read_next()?;
    Ok(out.to_vec())
}

/// Expands a file (or stdin when `path` is `None`) and returns the full
/// output. A leading UTF-8 byte order mark and a `#`-line are dropped.
pub fn expand_file(
    path: Option<&Path>,
    force: bool,
    log_path: Option<&Path>,
) -> Result<Vec<u8>, ExpandError> {
    let (src, name): (Box<dyn Read>, String) = match path {
        Some(path) => {
            let file = File::open(path).map_err(|e| ExpandError::File {
                msg: e.to_string(),
                line: 0,
            })?;
            (Box::new(file), path.display().to_string())
        }
        None => (Box::new(io::stdin()), "stdin".to_owned()),
    };
    let mut state = ReaderState::from_stream(src, &name, force, false, true, log_path);
    let out = state.read_next()?;
    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use bstr::ByteSlice;

    use crate::{expand_string, ErrorKind, ExpandError};

    fn expand(src: &[u8]) -> Vec<u8> {
        expand_string(src, false, None).unwrap()
    }

    fn expansion_error(src: &[u8]) -> ExpandError {
        expand_string(src, false, None).unwrap_err()
    }

    #[test]
    fn scalar_declaration_spreads_both_sides() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nlocal v3p = 1\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nlocal  xp, yp, zp = 1,1,1\n".as_bstr(),
        );
    }

    #[test]
    fn vector_arithmetic_spreads_per_component() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nlocal v2a = v2b + v2c\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nlocal  xa, ya =  xb +  xc, yb +  yc\n".as_bstr(),
        );
    }

    #[test]
    fn quaternion_table_fields_merge() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nlocal t = {q4p = 1, 2, 3, 4}\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nlocal t = {qxp = 1, qyp=2, qzp=3, qwp=4}\n".as_bstr(),
        );
    }

    #[test]
    fn missing_table_components_pad_with_nil() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nlocal t = {v3p = 1, 2}\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nlocal t = { xp = 1, yp=2,zp=nil}\n".as_bstr(),
        );
    }

    #[test]
    fn no_sentinel_passes_through_byte_identical() {
        let src = b"print(\"hi\")\nlocal v2a = v2b -- still not expanded\n";
        assert_eq!(expand(src).as_bstr(), src.as_bstr());
    }

    #[test]
    fn force_without_vectors_is_identity() {
        let src = b"local a = {1, 2}\nreturn a[1] .. 'x'\n";
        let out = expand_string(src, true, None).unwrap();
        assert_eq!(out.as_bstr(), src.as_bstr());
    }

    #[test]
    fn vector_key_with_vector_value_spreads_into_the_merge() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nt = {v3p = v2a, 5}\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nt = { xp =  xa,yp= ya, zp=5}\n".as_bstr(),
        );
    }

    #[test]
    fn keyed_field_interrupts_a_merge_and_pads() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nt = {v2p = 1, a = 2}\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nt = { xp = 1,yp=nil, a = 2}\n".as_bstr(),
        );
    }

    #[test]
    fn too_many_components_is_a_syntax_error() {
        // A v3 value spreads into three expressions, one too many for a v2 key.
        let err = expansion_error(b"LFV_EXPAND_VECTORS()\nt = {v2p = v3a}\n");
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn a_full_merge_frees_later_fields() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nt = {v2p = 1, 2, 3}\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nt = { xp = 1, yp=2, 3}\n".as_bstr(),
        );
    }

    #[test]
    fn statement_vectors_spread_inside_control_flow() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nif v2a == v2b then print('eq') end\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nif  xa ==  xb, ya ==  yb then print('eq') end\n".as_bstr(),
        );
    }

    #[test]
    fn numeric_for_round_trips() {
        let src = b"LFV_EXPAND_VECTORS()\nfor i = 1, 10 do print(i) end\n";
        let out = expand(src);
        assert_eq!(
            out.as_bstr(),
            b"                    \nfor i = 1, 10 do print(i) end\n".as_bstr(),
        );
    }

    #[test]
    fn generic_for_round_trips() {
        let src = b"LFV_EXPAND_VECTORS()\nfor k, v in pairs(t) do print(k, v) end\n";
        let out = expand(src);
        assert_eq!(
            out.as_bstr(),
            b"                    \nfor k, v in pairs(t) do print(k, v) end\n".as_bstr(),
        );
    }

    #[test]
    fn numeric_for_bounds_are_never_spread() {
        // The control name spreads by its own marks, but the bounds are a
        // fixed-arity list and must stay as written.
        let out = expand(b"LFV_EXPAND_VECTORS()\nfor v3i = 1, 10 do end\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nfor  xi, yi, zi = 1, 10 do end\n".as_bstr(),
        );
    }

    #[test]
    fn vectors_spread_inside_a_for_body() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nfor i = 1, 3 do v2a = v2b + v2c end\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nfor i = 1, 3 do  xa, ya =  xb +  xc, yb +  yc end\n"
                .as_bstr(),
        );
    }

    #[test]
    fn method_calls_and_indexing_stay_intact() {
        let src = b"LFV_EXPAND_VECTORS()\nobj:method(v2a).field[1] = obj2.v3b\n";
        let out = expand(src);
        assert_eq!(
            out.as_bstr(),
            b"                    \nobj:method( xa, ya).field[1] = obj2. xb,obj2. yb,obj2. zb\n"
                .as_bstr(),
        );
    }

    #[test]
    fn unterminated_string_reports_its_line() {
        let err = expansion_error(b"LFV_EXPAND_VECTORS()\nlocal s = 'oops\nprint(s)\n");
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn hanging_operator_is_an_error() {
        let err = expansion_error(b"LFV_EXPAND_VECTORS()\nx = 1 +\n");
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn unclosed_parenthesis_is_an_error() {
        let err = expansion_error(b"LFV_EXPAND_VECTORS()\nx = (1\n");
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn unrecognized_top_level_token_is_an_error() {
        let err = expansion_error(b"LFV_EXPAND_VECTORS()\nend\n");
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn nesting_past_the_limit_is_reported_not_overflowed() {
        let mut src = b"LFV_EXPAND_VECTORS()\nx = ".to_vec();
        src.extend(std::iter::repeat(b'{').take(250));
        src.push(b'1');
        src.extend(std::iter::repeat(b'}').take(250));
        src.push(b'\n');
        let err = expansion_error(&src);
        assert_eq!(err.kind(), ErrorKind::RecursionLimit);
    }

    #[test]
    fn local_attribs_are_carried_into_the_spread() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nlocal v2a <const> = 1\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nlocal  xa <const>, ya <const> = 1,1\n".as_bstr(),
        );
    }

    #[test]
    fn goto_labels_and_semicolons_parse() {
        let src = b"LFV_EXPAND_VECTORS()\n::top:: ; goto top\n";
        let out = expand(src);
        assert_eq!(out.as_bstr(), b"                    \n::top:: ; goto top\n".as_bstr());
    }

    #[test]
    fn trailing_comment_is_excluded_from_the_spread() {
        let out = expand(b"LFV_EXPAND_VECTORS()\nlocal v2a = v2b -- trailing\n");
        assert_eq!(
            out.as_bstr(),
            b"                    \nlocal  xa, ya =  xb, yb -- trailing\n".as_bstr(),
        );
    }

    #[test]
    fn missing_input_file_is_a_file_error() {
        let path = std::path::Path::new("/nonexistent/lfv-input.lua");
        let err = crate::expand_file(Some(path), false, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::File);
        assert_eq!(err.line(), 0);
    }

    #[test]
    fn later_errors_do_not_replace_the_first() {
        let err = expansion_error(b"LFV_EXPAND_VECTORS()\nx = 'open\ny = (1\n");
        assert_eq!(err.line(), 2);
        assert!(matches!(err, ExpandError::Syntax { .. }));
    }
}
