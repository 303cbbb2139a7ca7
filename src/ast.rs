//! The AST contract produced by the (out-of-scope) lexer/parser.
//!
//! This crate does not parse AWK source. It only defines the node shapes the
//! parser is assumed to hand us, arena-allocated the way the teacher's
//! `analyzer::typed_expr::Expr` tree is: child nodes are `&'a Expr<'a>`
//! references into a shared [`bumpalo::Bump`], which gives every node a
//! stable identity for the lifetime of compilation (see [`NodeId`]).

use bumpalo::Bump;

/// Stable identity for an AST node, used as the key for [`crate::types::TypeInfo`].
///
/// Assigned by [`AstArena::alloc_expr`]/[`AstArena::alloc_stmt`] at
/// allocation time rather than derived from the node's address: two
/// optimizer or type-inference passes over the same tree must agree on a
/// node's identity even if nothing about pointer layout is guaranteed
/// (the spec's design note explicitly warns against assuming pointer
/// identity is free).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Owns the arena and the monotonic id counter shared by an entire program's AST.
pub struct AstArena<'a> {
    pub bump: &'a Bump,
    next_id: core::cell::Cell<u32>,
}

impl<'a> AstArena<'a> {
    pub fn new(bump: &'a Bump) -> Self {
        Self {
            bump,
            next_id: core::cell::Cell::new(0),
        }
    }

    fn next_id(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    pub fn alloc_expr(&self, inner: ExprKind<'a>) -> &'a Expr<'a> {
        self.bump.alloc(Expr {
            id: self.next_id(),
            kind: inner,
        })
    }

    pub fn alloc_stmt(&self, inner: StmtKind<'a>) -> &'a Stmt<'a> {
        self.bump.alloc(Stmt {
            id: self.next_id(),
            kind: inner,
        })
    }

    pub fn alloc_slice<T: Copy>(&self, items: &[T]) -> &'a [T] {
        self.bump.alloc_slice_copy(items)
    }
}

#[derive(Debug)]
pub struct Expr<'a> {
    pub id: NodeId,
    pub kind: ExprKind<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
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
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    PreIncr,
    PreDecr,
    PostIncr,
    PostDecr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    PowAssign,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOp {
    Match,
    NotMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinId {
    Atan2,
    Cos,
    Exp,
    Int,
    Log,
    Rand,
    Sin,
    Sqrt,
    Srand,
    Index,
    Length,
    Match,
    Split,
    Sub,
    Gsub,
    System,
    Sprintf,
    Substr,
    Tolower,
    Toupper,
}

impl BuiltinId {
    /// Static return-type classification consulted by type inference (spec §4.3).
    pub fn is_numeric_result(self) -> bool {
        matches!(
            self,
            BuiltinId::Atan2
                | BuiltinId::Cos
                | BuiltinId::Exp
                | BuiltinId::Int
                | BuiltinId::Log
                | BuiltinId::Rand
                | BuiltinId::Sin
                | BuiltinId::Sqrt
                | BuiltinId::Srand
                | BuiltinId::Index
                | BuiltinId::Length
                | BuiltinId::Match
                | BuiltinId::Split
                | BuiltinId::Sub
                | BuiltinId::Gsub
                | BuiltinId::System
        )
    }

    pub fn is_string_result(self) -> bool {
        matches!(
            self,
            BuiltinId::Sprintf | BuiltinId::Substr | BuiltinId::Tolower | BuiltinId::Toupper
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    None,
    Write,
    Append,
    Pipe,
    Input,
}

#[derive(Debug)]
pub enum ExprKind<'a> {
    NumLit(f64),
    StrLit(&'a [u8]),
    RegexLit(&'a [u8]),
    Ident(&'a str),
    FieldExpr(&'a Expr<'a>),
    IndexExpr(&'a str, &'a [&'a Expr<'a>]),
    BinaryExpr(BinaryOp, &'a Expr<'a>, &'a Expr<'a>),
    LogicalAnd(&'a Expr<'a>, &'a Expr<'a>),
    LogicalOr(&'a Expr<'a>, &'a Expr<'a>),
    UnaryExpr(UnaryOp, &'a Expr<'a>),
    AssignExpr(AssignOp, &'a Expr<'a>, &'a Expr<'a>),
    TernaryExpr(&'a Expr<'a>, &'a Expr<'a>, &'a Expr<'a>),
    ConcatExpr(&'a [&'a Expr<'a>]),
    GroupExpr(&'a Expr<'a>),
    CallExpr(&'a str, &'a [&'a Expr<'a>]),
    BuiltinExpr(BuiltinId, &'a [&'a Expr<'a>]),
    GetlineExpr {
        target: Option<&'a Expr<'a>>,
        command: Option<&'a Expr<'a>>,
        file: Option<&'a Expr<'a>>,
    },
    InExpr(&'a [&'a Expr<'a>], &'a str),
    MatchExpr(MatchOp, &'a Expr<'a>, &'a Expr<'a>),
    CommaExpr(&'a Expr<'a>, &'a Expr<'a>),
}

#[derive(Debug)]
pub struct Stmt<'a> {
    pub id: NodeId,
    pub kind: StmtKind<'a>,
}

#[derive(Debug)]
pub struct PrintArgs<'a> {
    pub is_printf: bool,
    pub args: &'a [&'a Expr<'a>],
    pub redirect: RedirectKind,
    pub dest: Option<&'a Expr<'a>>,
}

#[derive(Debug)]
pub enum StmtKind<'a> {
    ExprStmt(&'a Expr<'a>),
    PrintStmt(PrintArgs<'a>),
    BlockStmt(&'a [&'a Stmt<'a>]),
    IfStmt {
        cond: &'a Expr<'a>,
        then_branch: &'a Stmt<'a>,
        else_branch: Option<&'a Stmt<'a>>,
    },
    WhileStmt {
        cond: &'a Expr<'a>,
        body: &'a Stmt<'a>,
    },
    DoWhileStmt {
        body: &'a Stmt<'a>,
        cond: &'a Expr<'a>,
    },
    ForStmt {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        post: Option<&'a Stmt<'a>>,
        body: &'a Stmt<'a>,
    },
    ForInStmt {
        var: &'a str,
        array: &'a str,
        body: &'a Stmt<'a>,
    },
    BreakStmt,
    ContinueStmt,
    NextStmt,
    NextFileStmt,
    ReturnStmt(Option<&'a Expr<'a>>),
    ExitStmt(Option<&'a Expr<'a>>),
    DeleteStmt {
        array: &'a str,
        indices: &'a [&'a Expr<'a>],
    },
}

/// One `pattern { action }` rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule<'a> {
    pub pattern: RulePattern<'a>,
    pub body: Option<&'a Stmt<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub enum RulePattern<'a> {
    Always,
    Expr(&'a Expr<'a>),
    Range(&'a Expr<'a>, &'a Expr<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDecl<'a> {
    pub name: &'a str,
    pub params: &'a [&'a str],
    pub body: &'a Stmt<'a>,
}

/// Whole-program AST as handed off by the parser. Named distinctly from
/// [`crate::program::Program`] (the compiled bytecode artifact) since both
/// live in scope together inside the compiler.
#[derive(Debug)]
pub struct AstProgram<'a> {
    pub functions: &'a [FunctionDecl<'a>],
    pub begin_blocks: &'a [&'a Stmt<'a>],
    pub end_blocks: &'a [&'a Stmt<'a>],
    pub rules: &'a [Rule<'a>],
}
