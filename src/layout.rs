//! Stack layout: assign a byte offset to every local, including
//! parameters, and compute the 16-byte-aligned frame size.
//!
//! Done as its own pass after parsing, rather than incrementally while
//! declarations are parsed, so offsets only ever need to exist once a
//! function's full local list is known — declaring a local can't leak an
//! offset computed against a shorter, still-growing list.

use crate::ast::Function;

fn align_to(value: i32, align: i32) -> i32 {
    (value + align - 1) / align * align
}

pub fn assign_offsets(func: &mut Function) {
    let mut offset = 0;
    for local in &mut func.locals {
        offset += align_to(local.ty.size() as i32, 8);
        local.offset = offset;
    }
    func.frame_size = align_to(offset, 16);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::sema::propagate;

    fn layout_of(src: &str) -> Function {
        let tokens = tokenize(src).unwrap();
        let mut prog = parse(tokens, src).unwrap();
        let mut func = prog.remove(0);
        propagate(&mut func, src).unwrap();
        assign_offsets(&mut func);
        func
    }

    #[test]
    fn frame_size_is_always_a_multiple_of_16() {
        for src in [
            "int main() { int a; return 0; }",
            "int main() { int a; int b; int c; return 0; }",
            "int f(int a, int b, int c, int d, int e, int f) { return a; }",
        ] {
            let func = layout_of(src);
            assert_eq!(func.frame_size % 16, 0);
            assert!(func.frame_size > 0);
        }
    }

    #[test]
    fn offsets_are_unique_and_nonzero() {
        let func = layout_of("int main() { int a; int b; int c; return 0; }");
        let offsets: Vec<i32> = func.locals.iter().map(|l| l.offset).collect();
        assert!(offsets.iter().all(|&o| o > 0));
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), offsets.len());
    }

    #[test]
    fn array_locals_consume_their_full_size() {
        let func = layout_of("int main() { int a[4]; int b; return 0; }");
        assert_eq!(func.locals[0].offset, 32);
        assert_eq!(func.locals[1].offset, 40);
    }
}
