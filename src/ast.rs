//! Abstract syntax tree produced by the parser and mutated in place by the
//! type propagator and the stack layout pass.
//!
//! A local is owned once, by its function's `locals` vector; every AST
//! reference to it is a plain index, so there is exactly one owner and no
//! dangling reference is representable.

use crate::types::Type;

/// A local variable (including parameters, which occupy the first slots).
#[derive(Clone, Debug)]
pub struct LVar {
    pub name: String,
    pub ty: Type,
    /// Byte offset from the frame base pointer, filled in by the layout
    /// pass. Zero until then.
    pub offset: i32,
}

#[derive(Debug)]
pub enum NodeKind {
    Num(i64),
    /// Index into the owning function's `locals`.
    LVar(usize),
    /// An identifier reference the parser could not yet resolve against
    /// the locals declared so far. Resolved to `LVar` (or reported as an
    /// unknown-identifier error) by the type propagation pass; none
    /// survive past `sema::propagate`.
    Ident(String),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Eq(Box<Node>, Box<Node>),
    Ne(Box<Node>, Box<Node>),
    Lt(Box<Node>, Box<Node>),
    Le(Box<Node>, Box<Node>),
    /// Pointer/array + integer, scaled by the pointee size. Introduced by
    /// the type propagator, never by the parser.
    PtrAdd(Box<Node>, Box<Node>),
    PtrSub(Box<Node>, Box<Node>),
    PtrDiff(Box<Node>, Box<Node>),
    Assign(Box<Node>, Box<Node>),
    Addr(Box<Node>),
    Deref(Box<Node>),
    Return(Box<Node>),
    If(Box<Node>, Box<Node>, Option<Box<Node>>),
    While(Box<Node>, Box<Node>),
    For(
        Option<Box<Node>>,
        Option<Box<Node>>,
        Option<Box<Node>>,
        Box<Node>,
    ),
    Block(Vec<Node>),
    FuncCall(String, Vec<Node>),
    /// Empty placeholder, e.g. a declaration without an initializer.
    Null,
}

/// One AST node. `ty` is `None` until the type propagation pass has run;
/// every expression node is guaranteed a `Some` afterward. `pos` anchors
/// type errors to a source location.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Option<Type>,
    pub pos: usize,
}

impl Node {
    pub fn new(kind: NodeKind, pos: usize) -> Node {
        Node { kind, ty: None, pos }
    }
}

pub struct Function {
    pub name: String,
    /// Indices into `locals`, in declaration order, for the first (at most
    /// six) register-spilled parameters.
    pub params: Vec<usize>,
    pub locals: Vec<LVar>,
    pub body: Vec<Node>,
    /// Filled in by the layout pass; always a positive multiple of 16
    /// afterward.
    pub frame_size: i32,
}

pub type Program = Vec<Function>;
