//! Tagged syntax tree for index-notation expressions.
//!
//! Compiler passes are total recursive rewrites keyed on node kind. The
//! same node type is used for source expressions and for compiled programs
//! (where statements are calls to the kernel primitives), so `compile` maps
//! trees to trees.

/// Assignment flavor of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignKind {
    /// `=`: overwrite an existing destination.
    Assign,
    /// `:=`: define a fresh destination.
    Define,
    /// `+=`: accumulate.
    AddAssign,
    /// `-=`: subtract-accumulate.
    SubAssign,
}

/// A syntax-tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// An identifier.
    Sym(String),
    /// An integer literal (also used as a positional index label).
    Int(i64),
    /// A floating-point literal.
    Num(f64),
    /// A string payload, used by emitted error constructs.
    Str(String),
    /// A postfix prime mark, `x'`.
    Prime(Box<Expr>),
    /// A call; arithmetic uses the operator name as head (`*`, `+`, ...).
    Call { head: String, args: Vec<Expr> },
    /// A subscripted form `obj[left...]` or `obj[left...; right...]`.
    Ref {
        object: Box<Expr>,
        left: Vec<Expr>,
        right: Vec<Expr>,
    },
    /// A tuple literal in an emitted program.
    Tuple(Vec<Expr>),
    /// A sequence of statements.
    Block(Vec<Expr>),
    /// A source-position annotation.
    Line(String),
    /// A marker the compiler passes must not descend into.
    Opaque(Box<Expr>),
    /// An assignment or definition statement.
    Assign {
        kind: AssignKind,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn sym(name: impl Into<String>) -> Expr {
        Expr::Sym(name.into())
    }

    pub fn call(head: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            head: head.into(),
            args,
        }
    }

    /// The multiplicative identity used for default scalar factors.
    pub fn one() -> Expr {
        Expr::Int(1)
    }

    /// Whether this is the literal `1`.
    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Int(1))
    }

    /// Statement list of a block, or the expression itself as a single
    /// statement.
    pub fn statements(&self) -> &[Expr] {
        match self {
            Expr::Block(stmts) => stmts,
            _ => std::slice::from_ref(self),
        }
    }
}
