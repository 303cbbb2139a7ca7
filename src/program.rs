//! The compiled artifact (spec §3 "Program"): constant pools, per-rule
//! code, and the function table. Mirrors the shape of the teacher's
//! `vm::instruction_set::BytecodeProgram` (pools + functions + a
//! `SourceMap`-equivalent), adapted to the three-pool model (`nums`,
//! `strs`, `regexes`) and rule/action layout this spec names.
//!
//! Each section is a `Vec<Instruction>` of a typed enum rather than a flat
//! word stream; jump offsets are measured in logical-instruction-index
//! units (`target = jump_index + 1 + offset`), not byte/word offsets.

use crate::opcode::Instruction;

/// One compiled pattern/action rule.
#[derive(Debug, Clone)]
pub enum ActionPattern {
    Always,
    /// Code that leaves a boolean on the stack, ending in a conditional jump
    /// the caller interprets (the interpreter loop owns control flow).
    Expr(Vec<Instruction>),
    /// `pat1, pat2 { action }` range patterns need a bit of persistent state
    /// (are we "inside" the range?) that lives outside this crate; we only
    /// emit the two boundary-test code bodies.
    Range {
        start: Vec<Instruction>,
        end: Vec<Instruction>,
    },
}

#[derive(Debug, Clone)]
pub struct Action {
    pub pattern: ActionPattern,
    /// `None` = body absent (default `print $0`); `Some(vec![Nop])` = an
    /// explicit empty `{}` block; `Some(code)` = a real body (spec §8
    /// property 3, "empty-block discipline").
    pub body: Option<Vec<Instruction>>,
}

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub num_params: u32,
    /// Per-parameter flag: does this parameter get used as an array anywhere
    /// in the body (spec: AWK functions don't declare this explicitly).
    pub param_is_array: Vec<bool>,
    pub num_locals: u32,
    pub body: Vec<Instruction>,
}

/// Fully compiled program: everything the (external) VM interpreter loop
/// needs to run it, plus the names the (external) I/O manager/CLI consult
/// for special-variable initialization.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub nums: Vec<f64>,
    pub strs: Vec<Vec<u8>>,
    pub regexes: Vec<Vec<u8>>,

    pub begin_code: Vec<Instruction>,
    pub end_code: Vec<Instruction>,
    pub actions: Vec<Action>,
    pub functions: Vec<CompiledFunction>,

    pub global_scalar_names: Vec<String>,
    pub global_array_names: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global_scalar_count(&self) -> u32 {
        self.global_scalar_names.len() as u32
    }

    pub fn global_array_count(&self) -> u32 {
        self.global_array_names.len() as u32
    }

    /// Human-readable dump of every constant pool and instruction stream
    /// (spec §6.1): symbolic opcode names, resolved constants inline, jump
    /// targets annotated `±off -> abs_pos`.
    pub fn disassemble(&self) -> String {
        crate::disasm::disassemble(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_has_no_globals() {
        let p = Program::new();
        assert_eq!(p.global_scalar_count(), 0);
        assert_eq!(p.global_array_count(), 0);
    }
}
