//! Abstract syntax consumed by the bytecode compiler. Every node carries
//! the 1-based source line it started on; the compiler folds those into
//! the program's line map for tracebacks and fork extraction.

use crate::values::{Error, Var};

#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    If {
        arms: Vec<CondArm>,
        otherwise: Vec<Stmt>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
    },
    ForList {
        value: String,
        index: Option<String>,
        expr: Expr,
        body: Vec<Stmt>,
    },
    ForRange {
        var: String,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
    },
    Fork {
        var: Option<String>,
        delay: Expr,
        body: Vec<Stmt>,
    },
    TryExcept {
        body: Vec<Stmt>,
        arms: Vec<ExceptArm>,
    },
    TryFinally {
        body: Vec<Stmt>,
        handler: Vec<Stmt>,
    },
    /// `break;`, `break label;` or `break expr;`. Which one the argument
    /// is gets decided against the enclosing loops at compile time.
    Break {
        arg: Option<Expr>,
    },
    Continue {
        arg: Option<Expr>,
    },
    Return(Option<Expr>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct CondArm {
    pub line: usize,
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ExceptArm {
    pub line: usize,
    pub var: Option<String>,
    pub codes: ExceptCodes,
    pub body: Vec<Stmt>,
}

/// `except` / catch-expression code sets: catch-any, or a literal list of
/// error codes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExceptCodes {
    Any,
    Codes(Vec<Error>),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub line: usize,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Var),
    Id(String),
    /// `$name`, shorthand for a property on the system object.
    SysProp(String),
    Prop {
        base: Box<Expr>,
        name: PropName,
    },
    Verb {
        base: Box<Expr>,
        name: PropName,
        args: Vec<Arg>,
    },
    /// Builtin function call.
    Call {
        func: String,
        args: Vec<Arg>,
    },
    Pass {
        args: Vec<Arg>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    RangeIndex {
        base: Box<Expr>,
        from: Box<Expr>,
        to: Box<Expr>,
    },
    /// `^` inside an index context.
    FirstMarker,
    /// `$` inside an index context.
    LastMarker,
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Scatter {
        items: Vec<ScatterItem>,
        value: Box<Expr>,
    },
    Cond {
        cond: Box<Expr>,
        yes: Box<Expr>,
        no: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Catch {
        expr: Box<Expr>,
        codes: ExceptCodes,
        default: Option<Box<Expr>>,
    },
    List(Vec<Arg>),
    /// `{from..to}`, an inclusive integer range list.
    RangeList {
        from: Box<Expr>,
        to: Box<Expr>,
    },
    Map(Vec<(Expr, Expr)>),
}

/// Property / verb name position: a static identifier or `.(expr)`.
#[derive(Debug, Clone)]
pub enum PropName {
    Static(String),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum Arg {
    Normal(Expr),
    Splice(Expr),
}

#[derive(Debug, Clone)]
pub struct ScatterItem {
    pub name: String,
    pub kind: ScatterKind,
}

#[derive(Debug, Clone)]
pub enum ScatterKind {
    Required,
    Optional(Option<Expr>),
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    BitOr,
    BitAnd,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}
