//! A small compiler for a strict C-family subset, targeting x86-64 System V
//! assembly (AT&T syntax, Linux/macOS).
//!
//! The pipeline is the usual one: [`lexer::tokenize`] turns a source buffer
//! into a token list, [`parser::parse`] turns that into an AST with
//! per-function local variables resolved, [`sema::propagate`] assigns a
//! type to every expression and rewrites pointer arithmetic, [`layout`]
//! assigns stack frame offsets, and [`codegen::emit`] writes out the
//! assembly text. [`compile`] / [`compile_to`] drive all five stages.
//!
//! # Supported language
//!
//! `int`-typed locals (including pointers-to-pointers and fixed-length
//! arrays), functions of up to six `int` parameters, the operators
//! `+ - * / = == != < <= > >= & *` (unary `&`/`*` included), and the
//! statements `return`, `if`/`else`, `while`, `for`, blocks, and expression
//! statements. No preprocessing, no floating point, no structs, no
//! typedefs, no string literals, one translation unit per compilation.
//!
//! # Example
//!
//! ```
//! let asm = occ::compile("int main() { return 2 + 2; }").unwrap();
//! assert!(asm.contains(".globl main"));
//! ```

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod types;

use diagnostics::CompileError;

/// Compiles `source` and returns the generated assembly text.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let mut out = Vec::new();
    compile_to(source, &mut out)?;
    String::from_utf8(out)
        .map_err(|err| diagnostics::error(format!("generated non-UTF-8 assembly: {err}")))
}

/// Compiles `source`, writing the generated assembly text to `sink`.
pub fn compile_to<W: std::io::Write>(source: &str, sink: &mut W) -> Result<(), CompileError> {
    let tokens = lexer::tokenize(source)?;
    let mut program = parser::parse(tokens, source)?;

    for func in &mut program {
        sema::propagate(func, source)?;
        layout::assign_offsets(func);
    }

    codegen::emit(&program, sink)
}
