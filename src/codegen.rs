//! x86-64 System V code generation.
//!
//! Treats the machine stack as the expression evaluation stack: after
//! `expr` emits code for a node, exactly one 8-byte value has been pushed.
//! Composing expressions is then just "emit lhs, emit rhs, pop both,
//! compute, push".

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::ast::{Function, Node, NodeKind, Program};
use crate::diagnostics::{self, CompileError};

const ARG_REGISTERS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Monotonically increasing counter for `if`/`while`/`for` label
/// uniqueness, encapsulated here rather than kept as a global.
struct Codegen<'a> {
    out: &'a mut String,
    label_count: u32,
}

pub fn emit<W: Write>(program: &Program, out: &mut W) -> Result<(), CompileError> {
    let mut buf = String::new();
    let mut gen = Codegen {
        out: &mut buf,
        label_count: 0,
    };
    writeln!(gen.out, ".text").unwrap();
    for func in program {
        gen.function(func)?;
    }
    out.write_all(buf.as_bytes())
        .map_err(|err: io::Error| diagnostics::error(format!("failed to write assembly: {err}")))
}

impl<'a> Codegen<'a> {
    fn next_label(&mut self) -> u32 {
        let id = self.label_count;
        self.label_count += 1;
        id
    }

    fn function(&mut self, func: &Function) -> Result<(), CompileError> {
        writeln!(self.out, ".globl {}", func.name).unwrap();
        writeln!(self.out, "{}:", func.name).unwrap();
        writeln!(self.out, "  push %rbp").unwrap();
        writeln!(self.out, "  mov %rsp, %rbp").unwrap();
        writeln!(self.out, "  sub ${}, %rsp", func.frame_size).unwrap();

        for (reg, &local_index) in ARG_REGISTERS.iter().zip(func.params.iter()) {
            let offset = func.locals[local_index].offset;
            writeln!(self.out, "  mov {reg}, -{offset}(%rbp)").unwrap();
        }

        for stmt in &func.body {
            self.stmt(stmt, func)?;
        }

        writeln!(self.out, ".L.return.{}:", func.name).unwrap();
        writeln!(self.out, "  mov %rbp, %rsp").unwrap();
        writeln!(self.out, "  pop %rbp").unwrap();
        writeln!(self.out, "  ret").unwrap();
        Ok(())
    }

    fn stmt(&mut self, node: &Node, func: &Function) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::Return(value) => {
                self.expr(value, func)?;
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  jmp .L.return.{}", func.name).unwrap();
            }

            NodeKind::If(cond, then, els) => {
                let id = self.next_label();
                self.expr(cond, func)?;
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  cmp $0, %rax").unwrap();
                writeln!(self.out, "  je .Lelse.{id}").unwrap();
                self.stmt(then, func)?;
                writeln!(self.out, "  jmp .Lend.{id}").unwrap();
                writeln!(self.out, ".Lelse.{id}:").unwrap();
                if let Some(els) = els {
                    self.stmt(els, func)?;
                }
                writeln!(self.out, ".Lend.{id}:").unwrap();
            }

            NodeKind::While(cond, then) => {
                let id = self.next_label();
                writeln!(self.out, ".Lbegin.{id}:").unwrap();
                self.expr(cond, func)?;
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  cmp $0, %rax").unwrap();
                writeln!(self.out, "  je .Lend.{id}").unwrap();
                self.stmt(then, func)?;
                writeln!(self.out, "  jmp .Lbegin.{id}").unwrap();
                writeln!(self.out, ".Lend.{id}:").unwrap();
            }

            NodeKind::For(init, cond, inc, then) => {
                let id = self.next_label();
                if let Some(init) = init {
                    self.expr(init, func)?;
                    writeln!(self.out, "  pop %rax").unwrap();
                }
                writeln!(self.out, ".Lbegin.{id}:").unwrap();
                if let Some(cond) = cond {
                    self.expr(cond, func)?;
                    writeln!(self.out, "  pop %rax").unwrap();
                    writeln!(self.out, "  cmp $0, %rax").unwrap();
                    writeln!(self.out, "  je .Lend.{id}").unwrap();
                }
                self.stmt(then, func)?;
                if let Some(inc) = inc {
                    self.expr(inc, func)?;
                    writeln!(self.out, "  pop %rax").unwrap();
                }
                writeln!(self.out, "  jmp .Lbegin.{id}").unwrap();
                writeln!(self.out, ".Lend.{id}:").unwrap();
            }

            NodeKind::Block(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt, func)?;
                }
            }

            NodeKind::Null => {}

            _ => {
                // An expression used as a statement: evaluate for effect
                // and discard the pushed value.
                self.expr(node, func)?;
                writeln!(self.out, "  pop %rax").unwrap();
            }
        }
        Ok(())
    }

    /// Computes the address of an lvalue (`LVar` or `Deref`) and pushes it,
    /// without loading through it.
    fn addr(&mut self, node: &Node, func: &Function) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::LVar(index) => {
                let offset = func.locals[*index].offset;
                writeln!(self.out, "  lea -{offset}(%rbp), %rax").unwrap();
                writeln!(self.out, "  push %rax").unwrap();
                Ok(())
            }
            NodeKind::Deref(operand) => self.expr(operand, func),
            _ => Err(diagnostics::error(
                "left side of assignment is not an lvalue (expected a variable or dereference)",
            )),
        }
    }

    /// Emits code for `node` that leaves exactly one 8-byte value pushed.
    fn expr(&mut self, node: &Node, func: &Function) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::Num(value) => {
                writeln!(self.out, "  push ${value}").unwrap();
            }

            NodeKind::LVar(index) => {
                self.addr(node, func)?;
                if !matches!(func.locals[*index].ty, crate::types::Type::Array(_, _)) {
                    writeln!(self.out, "  pop %rax").unwrap();
                    writeln!(self.out, "  mov (%rax), %rax").unwrap();
                    writeln!(self.out, "  push %rax").unwrap();
                }
            }

            NodeKind::Addr(operand) => {
                self.addr(operand, func)?;
            }

            NodeKind::Deref(operand) => {
                self.expr(operand, func)?;
                let is_array = matches!(
                    node.ty,
                    Some(crate::types::Type::Array(_, _))
                );
                if !is_array {
                    writeln!(self.out, "  pop %rax").unwrap();
                    writeln!(self.out, "  mov (%rax), %rax").unwrap();
                    writeln!(self.out, "  push %rax").unwrap();
                }
            }

            NodeKind::Assign(lhs, rhs) => {
                self.addr(lhs, func)?;
                self.expr(rhs, func)?;
                writeln!(self.out, "  pop %rdi").unwrap();
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  mov %rdi, (%rax)").unwrap();
                writeln!(self.out, "  push %rdi").unwrap();
            }

            NodeKind::Add(lhs, rhs) => self.binary(lhs, rhs, func, "add %rdi, %rax")?,
            NodeKind::Sub(lhs, rhs) => self.binary(lhs, rhs, func, "sub %rdi, %rax")?,
            NodeKind::Mul(lhs, rhs) => self.binary(lhs, rhs, func, "imul %rdi, %rax")?,
            NodeKind::Div(lhs, rhs) => {
                self.expr(lhs, func)?;
                self.expr(rhs, func)?;
                writeln!(self.out, "  pop %rdi").unwrap();
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  cqo").unwrap();
                writeln!(self.out, "  idiv %rdi").unwrap();
                writeln!(self.out, "  push %rax").unwrap();
            }

            NodeKind::Eq(lhs, rhs) => self.compare(lhs, rhs, func, "sete")?,
            NodeKind::Ne(lhs, rhs) => self.compare(lhs, rhs, func, "setne")?,
            NodeKind::Lt(lhs, rhs) => self.compare(lhs, rhs, func, "setl")?,
            NodeKind::Le(lhs, rhs) => self.compare(lhs, rhs, func, "setle")?,

            NodeKind::PtrAdd(lhs, rhs) => self.ptr_binary(lhs, rhs, func, "add %rdi, %rax")?,
            NodeKind::PtrSub(lhs, rhs) => self.ptr_binary(lhs, rhs, func, "sub %rdi, %rax")?,

            NodeKind::PtrDiff(lhs, rhs) => {
                let scale = lhs
                    .ty
                    .as_ref()
                    .and_then(crate::types::Type::base)
                    .map(crate::types::Type::size)
                    .unwrap_or(1);
                self.expr(lhs, func)?;
                self.expr(rhs, func)?;
                writeln!(self.out, "  pop %rdi").unwrap();
                writeln!(self.out, "  pop %rax").unwrap();
                writeln!(self.out, "  sub %rdi, %rax").unwrap();
                writeln!(self.out, "  cqo").unwrap();
                writeln!(self.out, "  mov ${scale}, %rdi").unwrap();
                writeln!(self.out, "  idiv %rdi").unwrap();
                writeln!(self.out, "  push %rax").unwrap();
            }

            NodeKind::FuncCall(name, args) => {
                debug_assert!(
                    args.len() <= ARG_REGISTERS.len(),
                    "sema should have rejected '{name}' before codegen"
                );
                for arg in args {
                    self.expr(arg, func)?;
                }
                for reg in ARG_REGISTERS.iter().take(args.len()).rev() {
                    writeln!(self.out, "  pop {reg}").unwrap();
                }

                // The call site doesn't statically know whether %rsp is
                // 16-byte aligned (it depends on how many values are still
                // live on our expression stack), so check at runtime and
                // pad if needed.
                let id = self.next_label();
                writeln!(self.out, "  mov %rsp, %rax").unwrap();
                writeln!(self.out, "  and $15, %rax").unwrap();
                writeln!(self.out, "  jnz .Lcall.{id}").unwrap();
                writeln!(self.out, "  mov $0, %rax").unwrap();
                writeln!(self.out, "  call {name}").unwrap();
                writeln!(self.out, "  jmp .Lcallend.{id}").unwrap();
                writeln!(self.out, ".Lcall.{id}:").unwrap();
                writeln!(self.out, "  sub $8, %rsp").unwrap();
                writeln!(self.out, "  mov $0, %rax").unwrap();
                writeln!(self.out, "  call {name}").unwrap();
                writeln!(self.out, "  add $8, %rsp").unwrap();
                writeln!(self.out, ".Lcallend.{id}:").unwrap();
                writeln!(self.out, "  push %rax").unwrap();
            }

            NodeKind::Ident(name) => {
                return Err(diagnostics::error(format!(
                    "internal error: unresolved identifier '{name}' reached codegen"
                )));
            }

            NodeKind::Return(_)
            | NodeKind::If(_, _, _)
            | NodeKind::While(_, _)
            | NodeKind::For(_, _, _, _)
            | NodeKind::Block(_)
            | NodeKind::Null => {
                return Err(diagnostics::error(
                    "internal error: statement node used in expression position",
                ));
            }
        }
        Ok(())
    }

    fn binary(
        &mut self,
        lhs: &Node,
        rhs: &Node,
        func: &Function,
        op: &str,
    ) -> Result<(), CompileError> {
        self.expr(lhs, func)?;
        self.expr(rhs, func)?;
        writeln!(self.out, "  pop %rdi").unwrap();
        writeln!(self.out, "  pop %rax").unwrap();
        writeln!(self.out, "  {op}").unwrap();
        writeln!(self.out, "  push %rax").unwrap();
        Ok(())
    }

    fn ptr_binary(
        &mut self,
        lhs: &Node,
        rhs: &Node,
        func: &Function,
        op: &str,
    ) -> Result<(), CompileError> {
        let scale = lhs
            .ty
            .as_ref()
            .and_then(crate::types::Type::base)
            .map(crate::types::Type::size)
            .unwrap_or(1);
        self.expr(lhs, func)?;
        self.expr(rhs, func)?;
        writeln!(self.out, "  pop %rdi").unwrap();
        writeln!(self.out, "  mov ${scale}, %rax").unwrap();
        writeln!(self.out, "  imul %rax, %rdi").unwrap();
        writeln!(self.out, "  pop %rax").unwrap();
        writeln!(self.out, "  {op}").unwrap();
        writeln!(self.out, "  push %rax").unwrap();
        Ok(())
    }

    fn compare(
        &mut self,
        lhs: &Node,
        rhs: &Node,
        func: &Function,
        set: &str,
    ) -> Result<(), CompileError> {
        self.expr(lhs, func)?;
        self.expr(rhs, func)?;
        writeln!(self.out, "  pop %rdi").unwrap();
        writeln!(self.out, "  pop %rax").unwrap();
        writeln!(self.out, "  cmp %rdi, %rax").unwrap();
        writeln!(self.out, "  {set} %al").unwrap();
        writeln!(self.out, "  movzb %al, %rax").unwrap();
        writeln!(self.out, "  push %rax").unwrap();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;
    use crate::layout::assign_offsets;
    use crate::parser::parse;
    use crate::sema::propagate;

    fn compile(src: &str) -> String {
        let tokens = tokenize(src).unwrap();
        let mut prog = parse(tokens, src).unwrap();
        for func in &mut prog {
            propagate(func, src).unwrap();
            assign_offsets(func);
        }
        let mut out = Vec::new();
        emit(&prog, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn one_label_and_globl_per_function() {
        let asm = compile(
            "int add(int x, int y) { return x + y; } int main() { return add(2, 3); }",
        );
        assert_eq!(asm.matches(".globl add").count(), 1);
        assert_eq!(asm.matches(".globl main").count(), 1);
        assert!(asm.contains("add:"));
        assert!(asm.contains("main:"));
    }

    #[test]
    fn labels_are_unique_within_one_compilation() {
        let asm = compile(
            "int main() { int i; int s; s = 0; for (i = 0; i <= 10; i = i + 1) { if (i == 5) s = s + 100; } return s; }",
        );
        let mut labels: Vec<&str> = asm
            .lines()
            .filter(|l| l.starts_with(".L") && l.ends_with(':'))
            .collect();
        let total = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), total, "duplicate label found in {asm}");
    }

    #[test]
    fn pointer_arithmetic_scales_by_pointee_size() {
        let asm = compile("int main() { int a[4]; int *p; p = a; return *(p + 2); }");
        assert!(asm.contains("mov $8, %rax"), "missing scale factor:\n{asm}");
    }

    #[test]
    fn frame_is_set_up_and_torn_down() {
        let asm = compile("int main() { int a; a = 1; return a; }");
        assert!(asm.contains("push %rbp"));
        assert!(asm.contains("mov %rsp, %rbp"));
        assert!(asm.contains("sub $16, %rsp"));
        assert!(asm.contains(".L.return.main:"));
        assert!(asm.contains("pop %rbp"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn call_site_spills_up_to_six_arguments_in_order() {
        let asm = compile(
            "int f(int a, int b, int c, int d, int e, int g) { return a; } int main() { return f(1, 2, 3, 4, 5, 6); }",
        );
        let call_idx = asm.find("call f").unwrap();
        let before = &asm[..call_idx];
        for reg in ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"] {
            assert!(before.contains(&format!("pop {reg}")));
        }
    }
}
