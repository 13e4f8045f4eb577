//! Tokens → AST, with symbol resolution for local variables.
//!
//! Left-recursive productions (`equality`, `relational`, `add`, `mul`) are
//! loops, giving left associativity for free. `>`/`>=` are desugared by
//! swapping operands into `<`/`<=`; the AST never stores a `Gt`/`Ge` node.

use std::collections::HashMap;

use crate::ast::{Function, LVar, Node, NodeKind, Program};
use crate::diagnostics::{self, CompileError};
use crate::lexer::{Token, TokenKind};
use crate::types::{self, Type};

pub struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    source: &'src str,
    locals: Vec<LVar>,
    local_index: HashMap<String, usize>,
}

pub fn parse<'src>(tokens: Vec<Token<'src>>, source: &'src str) -> Result<Program, CompileError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
        locals: Vec::new(),
        local_index: HashMap::new(),
    };
    parser.program()
}

impl<'src> Parser<'src> {
    fn cur(&self) -> &Token<'src> {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token<'src> {
        let tok = self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        self.cur().kind == TokenKind::Eof
    }

    fn consume_op(&mut self, op: &str) -> bool {
        if self.cur().is(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, kw: &str) -> bool {
        self.consume_op(kw)
    }

    fn expect_op(&mut self, op: &str) -> Result<(), CompileError> {
        if self.consume_op(op) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{op}'")))
        }
    }

    fn consume_ident(&mut self) -> Option<&'src str> {
        if self.cur().kind == TokenKind::Ident {
            Some(self.advance().text)
        } else {
            None
        }
    }

    fn expect_ident(&mut self) -> Result<&'src str, CompileError> {
        self.consume_ident()
            .ok_or_else(|| self.error_here("expected an identifier"))
    }

    fn expect_number(&mut self) -> Result<i64, CompileError> {
        match self.cur().kind {
            TokenKind::Num(v) => {
                self.advance();
                Ok(v)
            }
            _ => Err(self.error_here("expected a number")),
        }
    }

    fn error_here(&self, message: impl std::fmt::Display) -> CompileError {
        diagnostics::error_at(self.source, self.cur().pos, message)
    }

    fn pos_here(&self) -> usize {
        self.cur().pos
    }

    /// Always allocates a fresh local; re-declaring a name in the same
    /// function shadows the earlier one instead of being diagnosed.
    fn declare_local(&mut self, name: &str, ty: Type) -> usize {
        let index = self.locals.len();
        self.locals.push(LVar {
            name: name.to_owned(),
            ty,
            offset: 0,
        });
        self.local_index.insert(name.to_owned(), index);
        index
    }

    // program = function*
    fn program(&mut self) -> Result<Program, CompileError> {
        let mut functions = Vec::new();
        while !self.at_eof() {
            functions.push(self.function()?);
        }
        Ok(functions)
    }

    // basetype = "int" "*"*
    fn basetype(&mut self) -> Result<Type, CompileError> {
        self.expect_op("int")?;
        let mut ty = Type::Int;
        while self.consume_op("*") {
            ty = types::pointer_to(ty);
        }
        Ok(ty)
    }

    // type-suffix = "[" num "]" type-suffix | ε
    fn type_suffix(&mut self, base: Type) -> Result<Type, CompileError> {
        if !self.consume_op("[") {
            return Ok(base);
        }
        let len = self.expect_number()?;
        self.expect_op("]")?;
        let element = self.type_suffix(base)?;
        Ok(types::array_of(element, len as usize))
    }

    // param = basetype ident
    fn param(&mut self) -> Result<(String, Type), CompileError> {
        let ty = self.basetype()?;
        let name = self.expect_ident()?.to_owned();
        Ok((name, ty))
    }

    // function = basetype ident "(" params? ")" "{" stmt* "}"
    fn function(&mut self) -> Result<Function, CompileError> {
        self.locals.clear();
        self.local_index.clear();

        self.basetype()?;
        let name = self.expect_ident()?.to_owned();

        self.expect_op("(")?;
        let mut params = Vec::new();
        if !self.cur().is(")") {
            loop {
                let (pname, ty) = self.param()?;
                params.push(self.declare_local(&pname, ty));
                if !self.consume_op(",") {
                    break;
                }
            }
        }
        self.expect_op(")")?;

        self.expect_op("{")?;
        let mut body = Vec::new();
        while !self.consume_op("}") {
            body.push(self.stmt()?);
        }

        Ok(Function {
            name,
            params,
            locals: std::mem::take(&mut self.locals),
            body,
            frame_size: 0,
        })
    }

    // declaration = basetype ident type-suffix ("=" expr)? ";"
    fn declaration(&mut self) -> Result<Node, CompileError> {
        let pos = self.pos_here();
        let base = self.basetype()?;
        let name = self.expect_ident()?.to_owned();
        let ty = self.type_suffix(base)?;
        let index = self.declare_local(&name, ty);

        let node = if self.consume_op("=") {
            let lhs = Node::new(NodeKind::LVar(index), pos);
            let rhs = self.expr()?;
            Node::new(NodeKind::Assign(Box::new(lhs), Box::new(rhs)), pos)
        } else {
            Node::new(NodeKind::Null, pos)
        };
        self.expect_op(";")?;
        Ok(node)
    }

    // stmt = "return" expr ";"
    //      | "if" "(" expr ")" stmt ("else" stmt)?
    //      | "while" "(" expr ")" stmt
    //      | "for" "(" expr? ";" expr? ";" expr? ")" stmt
    //      | "{" stmt* "}"
    //      | declaration
    //      | expr ";"
    fn stmt(&mut self) -> Result<Node, CompileError> {
        let pos = self.pos_here();

        if self.consume_keyword("return") {
            let value = self.expr()?;
            self.expect_op(";")?;
            return Ok(Node::new(NodeKind::Return(Box::new(value)), pos));
        }

        if self.consume_keyword("if") {
            self.expect_op("(")?;
            let cond = self.expr()?;
            self.expect_op(")")?;
            let then = self.stmt()?;
            let els = if self.consume_keyword("else") {
                Some(Box::new(self.stmt()?))
            } else {
                None
            };
            return Ok(Node::new(
                NodeKind::If(Box::new(cond), Box::new(then), els),
                pos,
            ));
        }

        if self.consume_keyword("while") {
            self.expect_op("(")?;
            let cond = self.expr()?;
            self.expect_op(")")?;
            let then = self.stmt()?;
            return Ok(Node::new(
                NodeKind::While(Box::new(cond), Box::new(then)),
                pos,
            ));
        }

        if self.consume_keyword("for") {
            self.expect_op("(")?;
            let init = if self.cur().is(";") {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect_op(";")?;
            let cond = if self.cur().is(";") {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect_op(";")?;
            let inc = if self.cur().is(")") {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect_op(")")?;
            let then = self.stmt()?;
            return Ok(Node::new(NodeKind::For(init, cond, inc, Box::new(then)), pos));
        }

        if self.consume_op("{") {
            let mut stmts = Vec::new();
            while !self.consume_op("}") {
                stmts.push(self.stmt()?);
            }
            return Ok(Node::new(NodeKind::Block(stmts), pos));
        }

        if self.cur().is("int") {
            return self.declaration();
        }

        let node = self.expr()?;
        self.expect_op(";")?;
        Ok(node)
    }

    fn expr(&mut self) -> Result<Node, CompileError> {
        self.assign()
    }

    // assign = equality ("=" assign)?
    fn assign(&mut self) -> Result<Node, CompileError> {
        let pos = self.pos_here();
        let node = self.equality()?;
        if self.consume_op("=") {
            let rhs = self.assign()?;
            return Ok(Node::new(
                NodeKind::Assign(Box::new(node), Box::new(rhs)),
                pos,
            ));
        }
        Ok(node)
    }

    // equality = relational (("==" | "!=") relational)*
    fn equality(&mut self) -> Result<Node, CompileError> {
        let mut node = self.relational()?;
        loop {
            let pos = self.pos_here();
            if self.consume_op("==") {
                let rhs = self.relational()?;
                node = Node::new(NodeKind::Eq(Box::new(node), Box::new(rhs)), pos);
            } else if self.consume_op("!=") {
                let rhs = self.relational()?;
                node = Node::new(NodeKind::Ne(Box::new(node), Box::new(rhs)), pos);
            } else {
                return Ok(node);
            }
        }
    }

    // relational = add (("<" | "<=" | ">" | ">=") add)*
    // `>` and `>=` are desugared by swapping operands into `<`/`<=`.
    fn relational(&mut self) -> Result<Node, CompileError> {
        let mut node = self.add()?;
        loop {
            let pos = self.pos_here();
            if self.consume_op("<") {
                let rhs = self.add()?;
                node = Node::new(NodeKind::Lt(Box::new(node), Box::new(rhs)), pos);
            } else if self.consume_op("<=") {
                let rhs = self.add()?;
                node = Node::new(NodeKind::Le(Box::new(node), Box::new(rhs)), pos);
            } else if self.consume_op(">") {
                let rhs = self.add()?;
                node = Node::new(NodeKind::Lt(Box::new(rhs), Box::new(node)), pos);
            } else if self.consume_op(">=") {
                let rhs = self.add()?;
                node = Node::new(NodeKind::Le(Box::new(rhs), Box::new(node)), pos);
            } else {
                return Ok(node);
            }
        }
    }

    // add = mul (("+" | "-") mul)*
    fn add(&mut self) -> Result<Node, CompileError> {
        let mut node = self.mul()?;
        loop {
            let pos = self.pos_here();
            if self.consume_op("+") {
                let rhs = self.mul()?;
                node = Node::new(NodeKind::Add(Box::new(node), Box::new(rhs)), pos);
            } else if self.consume_op("-") {
                let rhs = self.mul()?;
                node = Node::new(NodeKind::Sub(Box::new(node), Box::new(rhs)), pos);
            } else {
                return Ok(node);
            }
        }
    }

    // mul = unary (("*" | "/") unary)*
    fn mul(&mut self) -> Result<Node, CompileError> {
        let mut node = self.unary()?;
        loop {
            let pos = self.pos_here();
            if self.consume_op("*") {
                let rhs = self.unary()?;
                node = Node::new(NodeKind::Mul(Box::new(node), Box::new(rhs)), pos);
            } else if self.consume_op("/") {
                let rhs = self.unary()?;
                node = Node::new(NodeKind::Div(Box::new(node), Box::new(rhs)), pos);
            } else {
                return Ok(node);
            }
        }
    }

    // unary = ("+" | "-" | "*" | "&") unary | postfix
    fn unary(&mut self) -> Result<Node, CompileError> {
        let pos = self.pos_here();
        if self.consume_op("+") {
            return self.unary();
        }
        if self.consume_op("-") {
            let operand = self.unary()?;
            let zero = Node::new(NodeKind::Num(0), pos);
            return Ok(Node::new(
                NodeKind::Sub(Box::new(zero), Box::new(operand)),
                pos,
            ));
        }
        if self.consume_op("*") {
            let operand = self.unary()?;
            return Ok(Node::new(NodeKind::Deref(Box::new(operand)), pos));
        }
        if self.consume_op("&") {
            let operand = self.unary()?;
            return Ok(Node::new(NodeKind::Addr(Box::new(operand)), pos));
        }
        self.postfix()
    }

    // postfix = primary ("[" expr "]")*
    // `a[i]` desugars to `*(a + i)` at parse time.
    fn postfix(&mut self) -> Result<Node, CompileError> {
        let mut node = self.primary()?;
        while self.cur().is("[") {
            let pos = self.pos_here();
            self.advance();
            let index = self.expr()?;
            self.expect_op("]")?;
            let sum = Node::new(NodeKind::Add(Box::new(node), Box::new(index)), pos);
            node = Node::new(NodeKind::Deref(Box::new(sum)), pos);
        }
        Ok(node)
    }

    // args = assign ("," assign)*
    fn args(&mut self) -> Result<Vec<Node>, CompileError> {
        let mut args = Vec::new();
        if self.cur().is(")") {
            return Ok(args);
        }
        args.push(self.assign()?);
        while self.consume_op(",") {
            args.push(self.assign()?);
        }
        Ok(args)
    }

    // primary = "(" expr ")" | ident ("(" args? ")")? | num
    fn primary(&mut self) -> Result<Node, CompileError> {
        let pos = self.pos_here();

        if self.consume_op("(") {
            let node = self.expr()?;
            self.expect_op(")")?;
            return Ok(node);
        }

        if let Some(name) = self.consume_ident() {
            if self.consume_op("(") {
                let args = self.args()?;
                self.expect_op(")")?;
                return Ok(Node::new(NodeKind::FuncCall(name.to_owned(), args), pos));
            }

            if let Some(&index) = self.local_index.get(name) {
                return Ok(Node::new(NodeKind::LVar(index), pos));
            }
            return Ok(Node::new(NodeKind::Ident(name.to_owned()), pos));
        }

        let value = self.expect_number()?;
        Ok(Node::new(NodeKind::Num(value), pos))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Program {
        let tokens = tokenize(src).unwrap();
        parse(tokens, src).unwrap()
    }

    #[test]
    fn sub_is_left_associative() {
        let prog = parse_src("int main() { return 10 - 3 - 2; }");
        let ret = &prog[0].body[0];
        match &ret.kind {
            NodeKind::Return(e) => match &e.kind {
                NodeKind::Sub(lhs, rhs) => {
                    assert!(matches!(rhs.kind, NodeKind::Num(2)));
                    assert!(matches!(lhs.kind, NodeKind::Sub(_, _)));
                }
                other => panic!("expected Sub, got {other:?}"),
            },
            other => panic!("expected Return, got {other:?}"),
        }
    }

    #[test]
    fn assign_is_right_associative() {
        let prog = parse_src("int main() { int a; int b; int c; a = b = c; return a; }");
        let stmt = &prog[0].body[3];
        match &stmt.kind {
            NodeKind::Assign(_, rhs) => {
                assert!(matches!(rhs.kind, NodeKind::Assign(_, _)));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn gt_desugars_same_as_lt() {
        let a = parse_src("int main() { int a; int b; return a > b; }");
        let b = parse_src("int main() { int a; int b; return b < a; }");
        let fmt = |prog: &Program| format!("{:?}", prog[0].body[2].kind);
        assert_eq!(fmt(&a), fmt(&b));
    }

    #[test]
    fn ge_desugars_same_as_le() {
        let a = parse_src("int main() { int a; int b; return a >= b; }");
        let b = parse_src("int main() { int a; int b; return b <= a; }");
        let fmt = |prog: &Program| format!("{:?}", prog[0].body[2].kind);
        assert_eq!(fmt(&a), fmt(&b));
    }

    #[test]
    fn array_index_desugars_to_deref_of_add() {
        let prog = parse_src("int main() { int a[3]; return a[1]; }");
        let ret = &prog[0].body[1];
        match &ret.kind {
            NodeKind::Return(e) => assert!(matches!(e.kind, NodeKind::Deref(_))),
            other => panic!("expected Return, got {other:?}"),
        }
    }

    #[test]
    fn missing_else_is_explicit_none() {
        let prog = parse_src("int main() { int a; if (a) a = 1; return a; }");
        match &prog[0].body[0].kind {
            NodeKind::If(_, _, els) => assert!(els.is_none()),
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn params_become_first_locals() {
        let prog = parse_src("int add(int x, int y) { return x + y; }");
        assert_eq!(prog[0].params, vec![0, 1]);
        assert_eq!(prog[0].locals[0].name, "x");
        assert_eq!(prog[0].locals[1].name, "y");
    }

    #[test]
    fn whitespace_does_not_change_ast_shape() {
        let a = parse_src("int main(){int a;a=1+2;return a;}");
        let b = parse_src("int main () { int a ; a = 1 + 2 ; return a ; }");
        assert_eq!(format!("{:?}", a[0].body), format!("{:?}", b[0].body));
    }

    #[test]
    fn missing_semicolon_is_an_error() {
        let tokens = tokenize("int main() { return 0 }").unwrap();
        assert!(parse(tokens, "int main() { return 0 }").is_err());
    }
}
