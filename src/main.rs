// This file is part of lua-vector-expand, distributed under the MIT
// license. For the full terms, see the included LICENSE file.

use std::{
    env,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{bail, Result};
use vector_expand::expand_file;

const USAGE: &str = "\
lfv [-h] [-i PATH] [-f]

Expands vector names in a script and writes the result to stdout. Reads
from stdin unless -i is given. Scripts opt in by starting with
LFV_EXPAND_VECTORS(); everything else passes through unchanged.

  -h, /?       print this usage and exit
  -i, /i PATH  read from PATH instead of stdin
  -f, /f       expand even without the sentinel
";

struct Options {
    input: Option<PathBuf>,
    force: bool,
}

/// Returns None when usage was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut opts = Options {
        input: None,
        force: false,
    };
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "/?" => return Ok(None),
            "-i" | "/i" => match it.next() {
                Some(path) => opts.input = Some(PathBuf::from(path)),
                None => bail!("expected PATH after '{arg}'"),
            },
            "-f" | "/f" => opts.force = true,
            _ => bail!("unknown option '{arg}'"),
        }
    }
    Ok(Some(opts))
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(opts) = parse_args(&args)? else {
        print!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    };
    match expand_file(opts.input.as_deref(), opts.force, None) {
        Ok(bytes) => {
            io::stdout().write_all(&bytes)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("Expansion error (ln {}): {}", err.line(), err);
            Ok(ExitCode::from(1))
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            println!("{err:#}");
            println!("{USAGE}");
            ExitCode::from(1)
        }
    }
}
