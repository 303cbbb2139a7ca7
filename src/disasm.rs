//! Human-readable disassembly of a compiled `Program` (spec §6.1), grounded
//! on the teacher's `vm::code::Code`'s `Debug` impl: collect jump targets in
//! a first pass, then print each instruction with its resolved constants and
//! an annotated jump target on a second pass.

use hashbrown::HashSet;
use std::fmt::Write as _;

use crate::opcode::Instruction;
use crate::program::{Action, ActionPattern, Program};

/// Renders every section of `program` as one disassembly string: constant
/// pools, BEGIN/END code, per-rule actions, and function bodies.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    write_pools(&mut out, program);

    if !program.begin_code.is_empty() {
        let _ = writeln!(out, "BEGIN:");
        write_stream(&mut out, &program.begin_code);
    }

    for (i, action) in program.actions.iter().enumerate() {
        let _ = writeln!(out, "rule[{i}]:");
        write_action(&mut out, action);
    }

    if !program.end_code.is_empty() {
        let _ = writeln!(out, "END:");
        write_stream(&mut out, &program.end_code);
    }

    for f in &program.functions {
        let _ = writeln!(out, "function {}({} params, {} locals):", f.name, f.num_params, f.num_locals);
        write_stream(&mut out, &f.body);
    }

    out
}

fn write_pools(out: &mut String, program: &Program) {
    if !program.nums.is_empty() {
        let _ = writeln!(out, "nums:");
        for (i, n) in program.nums.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] = {n}");
        }
    }
    if !program.strs.is_empty() {
        let _ = writeln!(out, "strs:");
        for (i, s) in program.strs.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] = {:?}", String::from_utf8_lossy(s));
        }
    }
    if !program.regexes.is_empty() {
        let _ = writeln!(out, "regexes:");
        for (i, r) in program.regexes.iter().enumerate() {
            let _ = writeln!(out, "  [{i}] = /{}/", String::from_utf8_lossy(r));
        }
    }
}

fn write_action(out: &mut String, action: &Action) {
    match &action.pattern {
        ActionPattern::Always => {
            let _ = writeln!(out, "  pattern: always");
        }
        ActionPattern::Expr(code) => {
            let _ = writeln!(out, "  pattern:");
            write_stream_indented(out, code, "    ");
        }
        ActionPattern::Range { start, end } => {
            let _ = writeln!(out, "  range start:");
            write_stream_indented(out, start, "    ");
            let _ = writeln!(out, "  range end:");
            write_stream_indented(out, end, "    ");
        }
    }
    match &action.body {
        None => {
            let _ = writeln!(out, "  body: (default print $0)");
        }
        Some(code) => {
            let _ = writeln!(out, "  body:");
            write_stream_indented(out, code, "    ");
        }
    }
}

fn write_stream(out: &mut String, code: &[Instruction]) {
    write_stream_indented(out, code, "  ");
}

/// Two-pass annotated dump of one instruction stream: jump targets are
/// collected first so every jump (forward or backward) can print both its
/// raw offset and the absolute position it resolves to.
fn write_stream_indented(out: &mut String, code: &[Instruction], indent: &str) {
    let mut targets: HashSet<usize> = HashSet::new();
    for (i, instr) in code.iter().enumerate() {
        if let Some(offset) = instr.jump_offset() {
            if let Some(target) = jump_target(i, offset) {
                targets.insert(target);
            }
        }
    }

    for (i, instr) in code.iter().enumerate() {
        let label = if targets.contains(&i) { format!("L{i}: ") } else { String::new() };
        match instr.jump_offset() {
            Some(offset) => {
                let target = jump_target(i, offset);
                let target_str = match target {
                    Some(t) => format!("{offset:+} -> {t}"),
                    None => format!("{offset:+} -> <out of range>"),
                };
                let _ = writeln!(out, "{indent}{i:4} {label}{:?}  ({target_str})", instr);
            }
            None => {
                let _ = writeln!(out, "{indent}{i:4} {label}{:?}", instr);
            }
        }
    }
}

/// Jump targets are relative to the instruction *after* the jump (spec §4.4):
/// `target = jump_index + 1 + offset`.
fn jump_target(jump_index: usize, offset: i32) -> Option<usize> {
    let base = (jump_index + 1) as i64;
    let target = base + offset as i64;
    if target < 0 {
        None
    } else {
        Some(target as usize)
    }
}

/// Per-opcode-family instruction counts and total instruction words per
/// section — a small size report, not a benchmark (SPEC §C).
#[derive(Debug, Default, Clone)]
pub struct OpcodeHistogram {
    pub counts: hashbrown::HashMap<&'static str, usize>,
    pub total_instructions: usize,
}

impl OpcodeHistogram {
    pub fn collect(program: &Program) -> Self {
        let mut hist = OpcodeHistogram::default();
        hist.count_stream(&program.begin_code);
        hist.count_stream(&program.end_code);
        for action in &program.actions {
            match &action.pattern {
                ActionPattern::Always => {}
                ActionPattern::Expr(code) => hist.count_stream(code),
                ActionPattern::Range { start, end } => {
                    hist.count_stream(start);
                    hist.count_stream(end);
                }
            }
            if let Some(body) = &action.body {
                hist.count_stream(body);
            }
        }
        for f in &program.functions {
            hist.count_stream(&f.body);
        }
        hist
    }

    fn count_stream(&mut self, code: &[Instruction]) {
        self.total_instructions += code.len();
        for instr in code {
            *self.counts.entry(instr.mnemonic()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Instruction;

    #[test]
    fn disassembly_includes_pool_entries_and_jump_annotation() {
        let mut program = Program::new();
        program.nums.push(1.0);
        program.begin_code = vec![
            Instruction::Num(0),
            Instruction::JumpFalse(2),
            Instruction::Nop,
            Instruction::Nop,
        ];
        let text = disassemble(&program);
        assert!(text.contains("nums:"));
        assert!(text.contains("[0] = 1"));
        assert!(text.contains("+2 -> 4"));
    }

    #[test]
    fn histogram_counts_every_instruction_once() {
        let mut program = Program::new();
        program.begin_code = vec![Instruction::Nop, Instruction::Nop, Instruction::Add];
        let hist = OpcodeHistogram::collect(&program);
        assert_eq!(hist.total_instructions, 3);
        assert_eq!(hist.counts.get("Nop"), Some(&2));
        assert_eq!(hist.counts.get("Add"), Some(&1));
    }
}
