//! Syntax tree of the rule language.

use std::collections::HashMap;

use super::value::Value;

pub type Block = Vec<Stmt>;

/// A parsed rule program: top-level statements plus hoisted functions.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub body: Block,
    pub functions: HashMap<String, Function>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let { name: String, init: Option<Expr> },
    Assign { target: Place, op: AssignOp, value: Expr },
    Expr(Expr),
    Block(Block),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While { cond: Expr, body: Block },
    Return(Option<Expr>),
    Throw(Expr),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

/// An assignable location: a variable followed by member/index accesses.
#[derive(Debug, Clone)]
pub struct Place {
    pub root: String,
    pub path: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
pub enum PathSegment {
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call { callee: Callee, args: Vec<Expr> },
    /// Boundary of a chain containing `?.`; a null link short-circuits here.
    OptionalChain(Box<Expr>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

#[derive(Debug, Clone)]
pub enum Callee {
    Function(String),
    Method {
        receiver: Box<Expr>,
        name: String,
        optional: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}
