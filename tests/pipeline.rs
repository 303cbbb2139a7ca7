//! End-to-end pipeline coverage (spec §8): compile → optimize → disassemble,
//! exercising the fused-opcode scenarios no single module's inline tests
//! drive through the real compiler.

use awk_bc::ast::{
    AssignOp, AstArena, AstProgram, BinaryOp, ExprKind, Rule, RulePattern, StmtKind,
};
use awk_bc::diagnostics::CompilerOptions;
use awk_bc::disasm::{disassemble, OpcodeHistogram};
use awk_bc::opcode::Instruction;
use awk_bc::optimize::optimize;
use awk_bc::resolve::ResolveResult;
use bumpalo::Bump;

fn resolver_with_globals(names: &[&'static str]) -> ResolveResult<'static> {
    let mut r = ResolveResult::new();
    for n in names {
        r.define_global_scalar(n);
    }
    r
}

/// `BEGIN { if (x < 5) y = 1 }`: the compiler emits a generic `LoadGlobal;
/// Num; JumpGrEq` triple (x's type is unresolved, so the comparison lowers
/// to the un-typed jump), which the optimizer must fuse into
/// `JumpGlobalGrEqNum` and re-point its jump target past the fused triple.
#[test]
fn compile_then_optimize_fuses_global_compare_jump() {
    let bump = Bump::new();
    let arena = AstArena::new(&bump);
    let x = arena.alloc_expr(ExprKind::Ident("x"));
    let five = arena.alloc_expr(ExprKind::NumLit(5.0));
    let cond = arena.alloc_expr(ExprKind::BinaryExpr(BinaryOp::Lt, x, five));
    let y = arena.alloc_expr(ExprKind::Ident("y"));
    let one = arena.alloc_expr(ExprKind::NumLit(1.0));
    let assign = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, y, one));
    let then_branch = arena.alloc_stmt(StmtKind::ExprStmt(assign));
    let if_stmt = arena.alloc_stmt(StmtKind::IfStmt {
        cond,
        then_branch,
        else_branch: None,
    });
    let begin_blocks = arena.alloc_slice(&[if_stmt]);
    let ast = AstProgram {
        functions: &[],
        begin_blocks,
        end_blocks: &[],
        rules: &[],
    };
    let resolve = resolver_with_globals(&["x", "y"]);
    let mut program = awk_bc::compiler::compile(&ast, &resolve, &CompilerOptions::default()).unwrap();

    assert!(program
        .begin_code
        .iter()
        .any(|i| matches!(i, Instruction::LoadGlobal(_))));
    assert!(program
        .begin_code
        .iter()
        .any(|i| matches!(i, Instruction::JumpGrEq(_))));

    optimize(&mut program).unwrap();

    assert_eq!(program.begin_code.len(), 3, "fused triple collapses to one instruction");
    match &program.begin_code[0] {
        Instruction::JumpGlobalGrEqNum(_, _, offset) => {
            assert_eq!(*offset, 2, "jump must still land past the end of the fused stream");
        }
        other => panic!("expected a fused JumpGlobalGrEqNum, got {other:?}"),
    }

    let text = disassemble(&program);
    assert!(text.contains("JumpGlobalGrEqNum"));
    assert!(text.contains("+2 -> 3"));
}

/// `$1 > 5` as a bare pattern rule: the comparison is compiled as a plain
/// value-producing expression (not a conditional jump), so the optimizer
/// sees `FieldInt; Num; Gt` and must fuse it to `FieldIntGreaterNum`.
#[test]
fn field_pattern_comparison_fuses_to_field_int_greater_num() {
    let bump = Bump::new();
    let arena = AstArena::new(&bump);
    let field_idx = arena.alloc_expr(ExprKind::NumLit(1.0));
    let field = arena.alloc_expr(ExprKind::FieldExpr(field_idx));
    let five = arena.alloc_expr(ExprKind::NumLit(5.0));
    let cond = arena.alloc_expr(ExprKind::BinaryExpr(BinaryOp::Gt, field, five));
    let rule = Rule {
        pattern: RulePattern::Expr(cond),
        body: None,
    };
    let rules = arena.alloc_slice(&[rule]);
    let ast = AstProgram {
        functions: &[],
        begin_blocks: &[],
        end_blocks: &[],
        rules,
    };
    let resolve = ResolveResult::new();
    let mut program = awk_bc::compiler::compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
    optimize(&mut program).unwrap();

    let pattern_code = match &program.actions[0].pattern {
        awk_bc::program::ActionPattern::Expr(code) => code,
        other => panic!("expected an Expr pattern, got {other:?}"),
    };
    assert!(pattern_code
        .iter()
        .any(|i| matches!(i, Instruction::FieldIntGreaterNum(1, _))));
    assert!(!pattern_code.iter().any(|i| matches!(i, Instruction::Gt)));
}

#[test]
fn opcode_histogram_counts_match_stream_lengths() {
    let bump = Bump::new();
    let arena = AstArena::new(&bump);
    let one = arena.alloc_expr(ExprKind::NumLit(1.0));
    let x = arena.alloc_expr(ExprKind::Ident("x"));
    let assign = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, x, one));
    let stmt = arena.alloc_stmt(StmtKind::ExprStmt(assign));
    let begin_blocks = arena.alloc_slice(&[stmt]);
    let ast = AstProgram {
        functions: &[],
        begin_blocks,
        end_blocks: &[],
        rules: &[],
    };
    let resolve = resolver_with_globals(&["x"]);
    let program = awk_bc::compiler::compile(&ast, &resolve, &CompilerOptions::default()).unwrap();

    let hist = OpcodeHistogram::collect(&program);
    assert_eq!(hist.total_instructions, program.begin_code.len());
    assert_eq!(hist.counts.get("StoreGlobal"), Some(&1));
}
