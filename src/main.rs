//! Thin CLI shell around the `occ` library.
//!
//! `occ <source>` where `<source>` is a single argument containing the
//! program text itself, not a filename. Assembly goes to stdout,
//! diagnostics to stderr; exit code 0 on success, 1 on any error.

#[macro_use]
extern crate clap;

use clap::Arg;
use std::io::{self, Write};

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("SOURCE")
                .help("Program text to compile")
                .required(true)
                .index(1),
        )
        .get_matches();

    let source = matches.value_of("SOURCE").unwrap();

    if let Err(err) = run(source) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(source: &str) -> Result<(), occ::diagnostics::CompileError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    occ::compile_to(source, &mut out)?;
    out.flush().ok();
    Ok(())
}
