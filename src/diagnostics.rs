//! Point-in-input error reporting.
//!
//! The original compiler's `error_at` writes directly to stderr and calls
//! `exit(1)`. Here every stage returns `Result<_, CompileError>` instead and
//! propagates with `?`; only the driver (`main.rs`) is responsible for
//! printing the error and exiting with status 1.

use std::error::Error;
use std::fmt;

/// A fatal compiler error, optionally anchored to a byte offset in the
/// source that was compiled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileError {
    rendered: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl Error for CompileError {}

/// An error with no useful source position (e.g. "too many arguments").
pub fn error(message: impl fmt::Display) -> CompileError {
    CompileError {
        rendered: message.to_string(),
    }
}

/// An error anchored at `pos`, a byte offset into `source`. Prints the
/// source line containing `pos` and a caret under the offending column,
/// matching the C original's `error_at`.
pub fn error_at(source: &str, pos: usize, message: impl fmt::Display) -> CompileError {
    let pos = pos.min(source.len());
    let line_start = source[..pos].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[pos..]
        .find('\n')
        .map_or(source.len(), |i| pos + i);
    let line = &source[line_start..line_end];
    let column = pos - line_start;

    CompileError {
        rendered: format!("{line}\n{pad:>width$}^ {message}", pad = "", width = column),
    }
}
