//! Type propagation.
//!
//! Walks each function body post-order, assigns `ty` to every expression
//! node, and rewrites `Add`/`Sub` nodes that involve a pointer or array
//! operand into `PtrAdd`/`PtrSub`/`PtrDiff`. Also resolves the parser's
//! deferred `Ident` placeholders (see `ast::NodeKind::Ident`) against the
//! function's now-complete locals list, erroring on names that never
//! resolve to a declared local.

use crate::ast::{Function, Node, NodeKind};
use crate::diagnostics::{self, CompileError};
use crate::types::Type;

/// System V passes the first six integer/pointer arguments in registers;
/// this design has no stack-spilled argument support.
const MAX_CALL_ARGS: usize = 6;

pub fn propagate(func: &mut Function, source: &str) -> Result<(), CompileError> {
    for stmt in &mut func.body {
        visit(stmt, func.locals.as_slice(), source)?;
    }
    Ok(())
}

fn visit(node: &mut Node, locals: &[crate::ast::LVar], source: &str) -> Result<(), CompileError> {
    match &mut node.kind {
        NodeKind::Num(_) => {
            node.ty = Some(Type::Int);
        }

        NodeKind::Ident(name) => {
            let index = locals
                .iter()
                .position(|lvar| &lvar.name == name)
                .ok_or_else(|| {
                    diagnostics::error_at(source, node.pos, format!("undeclared variable '{name}'"))
                })?;
            node.ty = Some(locals[index].ty.clone());
            node.kind = NodeKind::LVar(index);
        }

        NodeKind::LVar(index) => {
            node.ty = Some(locals[*index].ty.clone());
        }

        NodeKind::Add(lhs, rhs) | NodeKind::Sub(lhs, rhs) => {
            visit(lhs, locals, source)?;
            visit(rhs, locals, source)?;
            rewrite_additive(node, source)?;
        }

        NodeKind::Mul(lhs, rhs) | NodeKind::Div(lhs, rhs) => {
            visit(lhs, locals, source)?;
            visit(rhs, locals, source)?;
            require_integer(lhs, source)?;
            require_integer(rhs, source)?;
            node.ty = Some(Type::Int);
        }

        NodeKind::Eq(lhs, rhs)
        | NodeKind::Ne(lhs, rhs)
        | NodeKind::Lt(lhs, rhs)
        | NodeKind::Le(lhs, rhs) => {
            visit(lhs, locals, source)?;
            visit(rhs, locals, source)?;
            node.ty = Some(Type::Int);
        }

        NodeKind::PtrAdd(lhs, rhs) | NodeKind::PtrSub(lhs, rhs) => {
            visit(lhs, locals, source)?;
            visit(rhs, locals, source)?;
            node.ty = lhs.ty.clone();
        }

        NodeKind::PtrDiff(lhs, rhs) => {
            visit(lhs, locals, source)?;
            visit(rhs, locals, source)?;
            node.ty = Some(Type::Int);
        }

        NodeKind::Assign(lhs, rhs) => {
            visit(lhs, locals, source)?;
            visit(rhs, locals, source)?;
            node.ty = lhs.ty.clone();
        }

        NodeKind::Addr(operand) => {
            visit(operand, locals, source)?;
            if !matches!(operand.kind, NodeKind::LVar(_) | NodeKind::Deref(_)) {
                return Err(diagnostics::error_at(
                    source,
                    node.pos,
                    "cannot take the address of a non-lvalue",
                ));
            }
            let operand_ty = operand.ty.clone().expect("visited child has a type");
            node.ty = Some(match operand_ty {
                Type::Array(base, _) => Type::Ptr(base),
                other => Type::Ptr(Box::new(other)),
            });
        }

        NodeKind::Deref(operand) => {
            visit(operand, locals, source)?;
            let base = operand
                .ty
                .as_ref()
                .and_then(Type::base)
                .cloned()
                .ok_or_else(|| {
                    diagnostics::error_at(source, node.pos, "cannot dereference a non-pointer")
                })?;
            node.ty = Some(base);
        }

        NodeKind::Return(value) => {
            visit(value, locals, source)?;
            node.ty = value.ty.clone();
        }

        NodeKind::If(cond, then, els) => {
            visit(cond, locals, source)?;
            visit(then, locals, source)?;
            if let Some(els) = els {
                visit(els, locals, source)?;
            }
        }

        NodeKind::While(cond, then) => {
            visit(cond, locals, source)?;
            visit(then, locals, source)?;
        }

        NodeKind::For(init, cond, inc, then) => {
            if let Some(init) = init {
                visit(init, locals, source)?;
            }
            if let Some(cond) = cond {
                visit(cond, locals, source)?;
            }
            if let Some(inc) = inc {
                visit(inc, locals, source)?;
            }
            visit(then, locals, source)?;
        }

        NodeKind::Block(stmts) => {
            for stmt in stmts {
                visit(stmt, locals, source)?;
            }
        }

        NodeKind::FuncCall(name, args) => {
            for arg in args.iter_mut() {
                visit(arg, locals, source)?;
            }
            if args.len() > MAX_CALL_ARGS {
                return Err(diagnostics::error_at(
                    source,
                    node.pos,
                    format!(
                        "too many arguments to '{name}': at most {MAX_CALL_ARGS} are supported"
                    ),
                ));
            }
            node.ty = Some(Type::Int);
        }

        NodeKind::Null => {
            node.ty = Some(Type::Int);
        }
    }
    Ok(())
}

fn require_integer(node: &Node, source: &str) -> Result<(), CompileError> {
    if node.ty.as_ref().is_some_and(Type::is_integer) {
        Ok(())
    } else {
        Err(diagnostics::error_at(
            source,
            node.pos,
            "operand must have integer type",
        ))
    }
}

/// Rewrites an `Add`/`Sub` node in place once both operands carry a type,
/// applying this priority order:
///
/// 1. `int + int` / `int - int` — keep, type `int`.
/// 2. `ptr/array + int` — `PtrAdd`, type of the pointer/array side (array
///    decays to pointer).
/// 3. `int + ptr/array` — swap, then as (2). Only valid for `Add`.
/// 4. `ptr - int` — `PtrSub`, type of the pointer side.
/// 5. `ptr - ptr` — `PtrDiff`, type `int`.
/// 6. anything else — error.
fn rewrite_additive(node: &mut Node, source: &str) -> Result<(), CompileError> {
    let is_add = matches!(node.kind, NodeKind::Add(_, _));
    let pos = node.pos;

    let (lhs, rhs) = match std::mem::replace(&mut node.kind, NodeKind::Null) {
        NodeKind::Add(l, r) | NodeKind::Sub(l, r) => (l, r),
        _ => unreachable!("rewrite_additive called on a non-additive node"),
    };

    let lhs_is_int = lhs.ty.as_ref().is_some_and(Type::is_integer);
    let rhs_is_int = rhs.ty.as_ref().is_some_and(Type::is_integer);

    node.kind = if lhs_is_int && rhs_is_int {
        node.ty = Some(Type::Int);
        if is_add {
            NodeKind::Add(lhs, rhs)
        } else {
            NodeKind::Sub(lhs, rhs)
        }
    } else if !lhs_is_int && rhs_is_int {
        node.ty = lhs.ty.clone().map(decay);
        if is_add {
            NodeKind::PtrAdd(lhs, rhs)
        } else {
            NodeKind::PtrSub(lhs, rhs)
        }
    } else if is_add && lhs_is_int && !rhs_is_int {
        node.ty = rhs.ty.clone().map(decay);
        NodeKind::PtrAdd(rhs, lhs)
    } else if !lhs_is_int && !rhs_is_int {
        if is_add {
            return Err(diagnostics::error_at(
                source,
                pos,
                "invalid operands: cannot add two pointers",
            ));
        }
        node.ty = Some(Type::Int);
        NodeKind::PtrDiff(lhs, rhs)
    } else {
        return Err(diagnostics::error_at(
            source,
            pos,
            "invalid operands to arithmetic operator",
        ));
    };

    Ok(())
}

/// An array operand in pointer arithmetic decays to a pointer to its
/// element type, same as `Addr` does for `&array`.
fn decay(ty: Type) -> Type {
    match ty {
        Type::Array(base, _) => Type::Ptr(base),
        other => other,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn compile_sema(src: &str) -> crate::ast::Program {
        let tokens = tokenize(src).unwrap();
        let mut prog = parse(tokens, src).unwrap();
        for func in &mut prog {
            propagate(func, src).unwrap();
        }
        prog
    }

    #[test]
    fn int_plus_int_stays_add() {
        let prog = compile_sema("int main() { return 1 + 2; }");
        match &prog[0].body[0].kind {
            NodeKind::Return(e) => assert!(matches!(e.kind, NodeKind::Add(_, _))),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn pointer_plus_int_becomes_ptr_add_scaled_by_pointee() {
        let prog = compile_sema(
            "int main() { int x; int *p; p = &x; return *(p + 1); }",
        );
        let ret = &prog[0].body[3];
        match &ret.kind {
            NodeKind::Return(e) => match &e.kind {
                NodeKind::Deref(inner) => assert!(matches!(inner.kind, NodeKind::PtrAdd(_, _))),
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn int_plus_pointer_swaps_to_ptr_add() {
        let prog = compile_sema("int main() { int x; int *p; p = &x; return *(1 + p); }");
        let ret = &prog[0].body[3];
        match &ret.kind {
            NodeKind::Return(e) => match &e.kind {
                NodeKind::Deref(inner) => match &inner.kind {
                    NodeKind::PtrAdd(lhs, rhs) => {
                        assert!(matches!(lhs.kind, NodeKind::LVar(_)));
                        assert!(matches!(rhs.kind, NodeKind::Num(1)));
                    }
                    other => panic!("{other:?}"),
                },
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn pointer_minus_pointer_is_ptr_diff_with_int_type() {
        let prog = compile_sema(
            "int main() { int a[4]; int *p; int *q; p = &a[0]; q = &a[3]; return q - p; }",
        );
        let ret = &prog[0].body[5];
        match &ret.kind {
            NodeKind::Return(e) => {
                assert!(matches!(e.kind, NodeKind::PtrDiff(_, _)));
                assert_eq!(e.ty, Some(Type::Int));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn array_operand_decays_to_pointer_in_arithmetic() {
        let prog = compile_sema("int main() { int a[4]; return *(a + 1); }");
        let ret = &prog[0].body[1];
        match &ret.kind {
            NodeKind::Return(e) => match &e.kind {
                NodeKind::Deref(inner) => {
                    assert!(matches!(inner.kind, NodeKind::PtrAdd(_, _)));
                    assert_eq!(inner.ty, Some(Type::Ptr(Box::new(Type::Int))));
                }
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn two_pointers_cannot_be_added() {
        let src = "int main() { int *p; int *q; return p + q; }";
        let tokens = tokenize(src).unwrap();
        let mut prog = parse(tokens, src).unwrap();
        assert!(propagate(&mut prog[0], src).is_err());
    }

    #[test]
    fn every_expression_node_has_a_type_after_propagation() {
        let prog = compile_sema(
            "int main() { int a; int b; a = 3; b = 4; return a * b + 7; }",
        );
        fn assert_typed(node: &Node) {
            assert!(node.ty.is_some(), "{node:?} missing a type");
            match &node.kind {
                NodeKind::Add(l, r)
                | NodeKind::Sub(l, r)
                | NodeKind::Mul(l, r)
                | NodeKind::Div(l, r)
                | NodeKind::Eq(l, r)
                | NodeKind::Ne(l, r)
                | NodeKind::Lt(l, r)
                | NodeKind::Le(l, r)
                | NodeKind::PtrAdd(l, r)
                | NodeKind::PtrSub(l, r)
                | NodeKind::PtrDiff(l, r)
                | NodeKind::Assign(l, r) => {
                    assert_typed(l);
                    assert_typed(r);
                }
                NodeKind::Addr(e) | NodeKind::Deref(e) | NodeKind::Return(e) => assert_typed(e),
                _ => {}
            }
        }
        for stmt in &prog[0].body {
            assert_typed(stmt);
        }
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let tokens = tokenize("int main() { return z; }").unwrap();
        let mut prog = parse(tokens, "int main() { return z; }").unwrap();
        assert!(propagate(&mut prog[0], "int main() { return z; }").is_err());
    }
}
