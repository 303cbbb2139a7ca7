//! A bytecode compiler, static type inferencer, peephole optimizer, and
//! regex runtime for an AWK implementation.
//!
//! This crate turns a parsed AWK program into the `Program` artifact an
//! external VM interpreter executes: constant pools, per-rule bytecode,
//! and a function table. It does not parse source text or execute
//! bytecode itself — those are the caller's concern.

pub mod ast;
pub mod compiler;
pub mod diagnostics;
pub mod disasm;
pub mod opcode;
pub mod optimize;
pub mod program;
pub mod regex;
pub mod resolve;
pub mod types;
pub mod value;

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize tracing subscriber for tests with DEBUG level.
    ///
    /// ```ignore
    /// #[test]
    /// fn test_something() {
    ///     test_utils::init_test_logging();
    /// }
    /// ```
    pub fn init_test_logging() {
        use tracing_subscriber::{fmt, EnvFilter};

        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
