//! Compile-time error kinds (spec §7), grounded on the teacher's
//! `compiler::error::CompileError`: a plain enum with a hand-written
//! `Display`, no `thiserror` derive — errors here are internal-invariant
//! failures or user source errors, never something we need `source()`
//! chaining for.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    UndefinedVariable(String),
    UndefinedFunction(String),
    ExpectedScalarGotArray(String),
    ExpectedArrayGotScalar(String),
    BreakOutsideLoop,
    ContinueOutsideLoop,
    ForInRequiresArrayIdentifier(String),
    UnsupportedLvalue,
    UnknownOperator(String),
    ValueOverflowsI32(String),
    UnexpectedNode(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UndefinedVariable(name) => {
                write!(f, "undefined variable `{name}`")
            }
            CompileError::UndefinedFunction(name) => {
                write!(f, "undefined function `{name}`")
            }
            CompileError::ExpectedScalarGotArray(name) => {
                write!(f, "expected scalar, got array: `{name}`")
            }
            CompileError::ExpectedArrayGotScalar(name) => {
                write!(f, "expected array, got scalar: `{name}`")
            }
            CompileError::BreakOutsideLoop => write!(f, "break outside loop"),
            CompileError::ContinueOutsideLoop => write!(f, "continue outside loop"),
            CompileError::ForInRequiresArrayIdentifier(name) => {
                write!(f, "for-in requires array identifier, got `{name}`")
            }
            CompileError::UnsupportedLvalue => write!(f, "unsupported lvalue"),
            CompileError::UnknownOperator(what) => {
                write!(f, "unknown operator: {what} (stale AST)")
            }
            CompileError::ValueOverflowsI32(what) => {
                write!(f, "value overflows i32: {what}")
            }
            CompileError::UnexpectedNode(what) => {
                write!(f, "unexpected statement/expression type: {what}")
            }
        }
    }
}

impl std::error::Error for CompileError {}
