//! AST → bytecode lowering (spec §4.2). Grounded on the teacher's
//! `compiler::bytecode::BytecodeCompiler`: one emitter walks a
//! `TreeTransformer`-shaped AST, interns constants into shared pools via a
//! `HashMap` lookaside, and patches jump placeholders after the fact rather
//! than pre-computing offsets. We keep that shape; the opcode set, type
//! specialization, and section layout are this spec's own.

pub mod error;

use hashbrown::HashMap;
use tracing::{debug, instrument, trace};

use crate::ast::{
    AssignOp, AstProgram, BinaryOp, BuiltinId, Expr, ExprKind, FunctionDecl, MatchOp, PrintArgs,
    RedirectKind, Rule, RulePattern, Stmt, StmtKind, UnaryOp,
};
use crate::diagnostics::CompilerOptions;
use crate::opcode::{ArrayArg, AugOp, Instruction, Redirect};
use crate::program::{Action, ActionPattern, CompiledFunction, Program};
use crate::resolve::{ResolveResult, Scope, Symbol, SymbolKind};
use crate::types::{self, Ty, TypeInfo};

pub use error::CompileError;

/// Shared constant-pool interner: numeric constants dedup by exact bit
/// pattern, strings and regex sources by byte content (spec §4.2).
#[derive(Default)]
struct ConstPool {
    nums: Vec<f64>,
    num_index: HashMap<u64, u32>,
    strs: Vec<Vec<u8>>,
    str_index: HashMap<Vec<u8>, u32>,
    regexes: Vec<Vec<u8>>,
    regex_index: HashMap<Vec<u8>, u32>,
}

impl ConstPool {
    fn intern_num(&mut self, n: f64) -> u32 {
        let bits = n.to_bits();
        if let Some(&idx) = self.num_index.get(&bits) {
            return idx;
        }
        let idx = self.nums.len() as u32;
        self.nums.push(n);
        self.num_index.insert(bits, idx);
        idx
    }

    fn intern_str(&mut self, s: &[u8]) -> u32 {
        if let Some(&idx) = self.str_index.get(s) {
            return idx;
        }
        let idx = self.strs.len() as u32;
        self.strs.push(s.to_vec());
        self.str_index.insert(s.to_vec(), idx);
        idx
    }

    fn intern_regex(&mut self, pattern: &[u8]) -> u32 {
        if let Some(&idx) = self.regex_index.get(pattern) {
            return idx;
        }
        let idx = self.regexes.len() as u32;
        self.regexes.push(pattern.to_vec());
        self.regex_index.insert(pattern.to_vec(), idx);
        idx
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Generic,
    ForIn,
}

struct LoopCtx {
    kind: LoopKind,
    /// Known immediately (while/for-in headers); `None` means `continue`
    /// must be patched later (for/do-while, whose continue target is
    /// compiled after the loop body).
    continue_target: Option<usize>,
    continue_patches: Vec<usize>,
    break_patches: Vec<usize>,
}

/// One compiler instance serves the whole program: constant pools are
/// shared across every section, but `code`/`func_scope`/`loop_stack` reset
/// per section (spec §4.2 step 3, "a fresh per-section emitter").
pub struct Compiler<'a, 'r> {
    resolve: &'r ResolveResult<'a>,
    options: &'r CompilerOptions,
    types: TypeInfo,
    pool: ConstPool,
    code: Vec<Instruction>,
    func_scope: &'a str,
    loop_stack: Vec<LoopCtx>,
}

#[instrument(skip_all)]
pub fn compile<'a>(
    ast: &AstProgram<'a>,
    resolve: &ResolveResult<'a>,
    options: &CompilerOptions,
) -> Result<Program, CompileError> {
    let types = types::infer(ast);
    let mut compiler = Compiler {
        resolve,
        options,
        types,
        pool: ConstPool::default(),
        code: Vec::new(),
        func_scope: crate::resolve::GLOBAL_SCOPE,
        loop_stack: Vec::new(),
    };

    let mut functions: Vec<Option<CompiledFunction>> = Vec::new();
    for decl in ast.functions {
        let compiled = compiler.compile_function(decl)?;
        let info = compiler
            .resolve
            .get_function(decl.name)
            .ok_or_else(|| CompileError::UndefinedFunction(decl.name.to_string()))?;
        let idx = info.index as usize;
        if functions.len() <= idx {
            functions.resize_with(idx + 1, || None);
        }
        functions[idx] = Some(compiled);
    }
    let functions = functions
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            f.ok_or_else(|| {
                CompileError::UnexpectedNode(format!("function table has a hole at index {i}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!("compiling BEGIN section");
    let begin_code = compiler.compile_section(crate::resolve::GLOBAL_SCOPE, ast.begin_blocks)?;
    let mut actions = Vec::with_capacity(ast.rules.len());
    for rule in ast.rules {
        debug!("compiling rule");
        actions.push(compiler.compile_rule(rule)?);
    }
    debug!("compiling END section");
    let end_code = compiler.compile_section(crate::resolve::GLOBAL_SCOPE, ast.end_blocks)?;

    Ok(Program {
        nums: compiler.pool.nums,
        strs: compiler.pool.strs,
        regexes: compiler.pool.regexes,
        begin_code,
        end_code,
        actions,
        functions,
        global_scalar_names: compiler
            .resolve
            .global_scalar_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        global_array_names: compiler
            .resolve
            .global_array_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    })
}

impl<'a, 'r> Compiler<'a, 'r> {
    /// Compiles a fresh list of statements into its own instruction stream,
    /// applying the empty-block discipline (spec §4.2, §8 property 3).
    fn compile_section(
        &mut self,
        func_scope: &'a str,
        stmts: &[&Stmt<'a>],
    ) -> Result<Vec<Instruction>, CompileError> {
        self.func_scope = func_scope;
        self.code = Vec::new();
        self.loop_stack = Vec::new();
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        if self.code.is_empty() {
            self.code.push(Instruction::Nop);
        }
        Ok(core::mem::take(&mut self.code))
    }

    fn compile_function(
        &mut self,
        decl: &FunctionDecl<'a>,
    ) -> Result<CompiledFunction, CompileError> {
        let info = self
            .resolve
            .get_function(decl.name)
            .ok_or_else(|| CompileError::UndefinedFunction(decl.name.to_string()))?;
        let param_is_array = info.param_is_array.to_vec();
        let num_params = decl.params.len() as u32;
        debug!(name = decl.name, "compiling function body");
        let body = self.compile_section(decl.name, core::slice::from_ref(&decl.body))?;
        Ok(CompiledFunction {
            name: decl.name.to_string(),
            num_params,
            num_locals: num_params,
            param_is_array,
            body,
        })
    }

    fn compile_rule(&mut self, rule: &Rule<'a>) -> Result<Action, CompileError> {
        let pattern = match &rule.pattern {
            RulePattern::Always => ActionPattern::Always,
            RulePattern::Expr(e) => {
                self.func_scope = crate::resolve::GLOBAL_SCOPE;
                self.code = Vec::new();
                self.loop_stack = Vec::new();
                self.compile_expr(e)?;
                ActionPattern::Expr(core::mem::take(&mut self.code))
            }
            RulePattern::Range(start, end) => {
                self.func_scope = crate::resolve::GLOBAL_SCOPE;
                self.code = Vec::new();
                self.compile_expr(start)?;
                let start_code = core::mem::take(&mut self.code);
                self.compile_expr(end)?;
                let end_code = core::mem::take(&mut self.code);
                ActionPattern::Range {
                    start: start_code,
                    end: end_code,
                }
            }
        };
        let body = match rule.body {
            None => None,
            Some(stmt) => Some(self.compile_section(crate::resolve::GLOBAL_SCOPE, core::slice::from_ref(&stmt))?),
        };
        Ok(Action { pattern, body })
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    fn patch_jump(&mut self, idx: usize, target: usize) -> Result<(), CompileError> {
        let offset = i64::try_from(target).unwrap() - (idx as i64 + 1);
        let offset = i32::try_from(offset)
            .map_err(|_| CompileError::ValueOverflowsI32(format!("jump offset {offset}")))?;
        self.code[idx] = self.code[idx].with_jump_offset(offset);
        Ok(())
    }

    fn emit_backward_jump(&mut self, target: usize) -> Result<(), CompileError> {
        let idx = self.emit(Instruction::Jump(0));
        self.patch_jump(idx, target)
    }

    fn const_num(&mut self, n: f64) -> Instruction {
        Instruction::Num(self.pool.intern_num(n))
    }

    fn const_str(&mut self, s: &[u8]) -> Instruction {
        Instruction::Str(self.pool.intern_str(s))
    }

    fn lookup_scalar(&self, name: &str) -> Result<Symbol, CompileError> {
        let sym = self
            .resolve
            .lookup_var(self.func_scope, name)
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))?;
        if sym.kind != SymbolKind::Scalar {
            return Err(CompileError::ExpectedScalarGotArray(name.to_string()));
        }
        Ok(sym)
    }

    fn is_array_ident(&self, name: &str) -> bool {
        self.resolve
            .lookup_var(self.func_scope, name)
            .map(|s| s.kind == SymbolKind::Array)
            .unwrap_or(false)
    }

    fn lookup_array(&self, name: &str) -> Result<Symbol, CompileError> {
        let sym = self
            .resolve
            .lookup_var(self.func_scope, name)
            .ok_or_else(|| CompileError::UndefinedVariable(name.to_string()))?;
        if sym.kind != SymbolKind::Array {
            return Err(CompileError::ExpectedArrayGotScalar(name.to_string()));
        }
        Ok(sym)
    }

    fn emit_load_var(&mut self, name: &str) -> Result<(), CompileError> {
        let sym = self.lookup_scalar(name)?;
        let instr = match sym.scope {
            Scope::Global => Instruction::LoadGlobal(sym.index),
            Scope::Local => Instruction::LoadLocal(sym.index),
            Scope::Special => Instruction::LoadSpecial(sym.index),
        };
        self.emit(instr);
        Ok(())
    }

    fn emit_store_var(&mut self, name: &str) -> Result<(), CompileError> {
        let sym = self.lookup_scalar(name)?;
        let instr = match sym.scope {
            Scope::Global => Instruction::StoreGlobal(sym.index),
            Scope::Local => Instruction::StoreLocal(sym.index),
            Scope::Special => Instruction::StoreSpecial(sym.index),
        };
        self.emit(instr);
        Ok(())
    }

    fn emit_incr_var(&mut self, name: &str, amount: i32) -> Result<(), CompileError> {
        let sym = self.lookup_scalar(name)?;
        let instr = match sym.scope {
            Scope::Global => Instruction::IncrGlobal(amount, sym.index),
            Scope::Local => Instruction::IncrLocal(amount, sym.index),
            Scope::Special => Instruction::IncrSpecial(amount, sym.index),
        };
        self.emit(instr);
        Ok(())
    }

    fn emit_aug_var(&mut self, name: &str, op: AugOp) -> Result<(), CompileError> {
        let sym = self.lookup_scalar(name)?;
        let instr = match sym.scope {
            Scope::Global => Instruction::AugGlobal(op, sym.index),
            Scope::Local => Instruction::AugLocal(op, sym.index),
            Scope::Special => Instruction::AugSpecial(op, sym.index),
        };
        self.emit(instr);
        Ok(())
    }

    fn compile_subscripts(&mut self, idxs: &[&Expr<'a>]) -> Result<(), CompileError> {
        for idx in idxs {
            self.compile_expr(idx)?;
        }
        if idxs.len() > 1 {
            self.emit(Instruction::IndexMulti(idxs.len() as u32));
        }
        Ok(())
    }

    /// Pattern-position argument to `~`/`!~`/`match`/`sub`/`gsub`: a literal
    /// regex is pushed by source, never evaluated as the boolean-valued
    /// expression it would be anywhere else (spec §4.2).
    fn compile_pattern_arg(&mut self, expr: &Expr<'a>) -> Result<(), CompileError> {
        if let ExprKind::RegexLit(bytes) = &expr.kind {
            let instr = self.const_str(bytes);
            self.emit(instr);
            Ok(())
        } else {
            self.compile_expr(expr)
        }
    }

    fn compile_expr(&mut self, expr: &Expr<'a>) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::NumLit(n) => {
                let instr = self.const_num(*n);
                self.emit(instr);
            }
            ExprKind::StrLit(s) => {
                let instr = self.const_str(s);
                self.emit(instr);
            }
            ExprKind::RegexLit(pattern) => {
                let idx = self.pool.intern_regex(pattern);
                if let Ok(text) = std::str::from_utf8(pattern) {
                    let kind = crate::regex::classify_accelerator(text);
                    trace!(pattern = text, ?kind, "classified regex fast path");
                }
                self.emit(Instruction::Regex(idx));
            }
            ExprKind::Ident(name) => self.emit_load_var(name)?,
            ExprKind::FieldExpr(idx) => self.compile_field_read(idx)?,
            ExprKind::IndexExpr(name, idxs) => {
                self.compile_subscripts(idxs)?;
                let sym = self.lookup_array(name)?;
                match sym.scope {
                    Scope::Global => self.emit(Instruction::ArrayGetGlobal(sym.index)),
                    _ => self.emit(Instruction::ArrayGet(sym.scope, sym.index)),
                };
            }
            ExprKind::BinaryExpr(op, l, r) => self.compile_binary(*op, l, r)?,
            ExprKind::LogicalAnd(l, r) => self.compile_logical(true, l, r)?,
            ExprKind::LogicalOr(l, r) => self.compile_logical(false, l, r)?,
            ExprKind::UnaryExpr(
                op @ (UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr),
                inner,
            ) => self.compile_incr_expr(*op, inner)?,
            ExprKind::UnaryExpr(op, inner) => {
                self.compile_expr(inner)?;
                let numeric = self.types.is_numeric(inner);
                match op {
                    UnaryOp::Neg => self.emit(if numeric { Instruction::NegNum } else { Instruction::UnaryMinus }),
                    UnaryOp::Pos => self.emit(Instruction::UnaryPlus),
                    UnaryOp::Not => self.emit(Instruction::Not),
                    UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr => {
                        unreachable!("handled above")
                    }
                };
            }
            ExprKind::AssignExpr(op, lhs, rhs) => self.compile_assign_expr(*op, lhs, rhs)?,
            ExprKind::TernaryExpr(c, t, e) => self.compile_ternary(c, t, e)?,
            ExprKind::ConcatExpr(parts) => {
                for p in *parts {
                    self.compile_expr(p)?;
                }
                if parts.len() == 2 {
                    self.emit(Instruction::Concat);
                } else {
                    self.emit(Instruction::ConcatMulti(parts.len() as u32));
                }
            }
            ExprKind::GroupExpr(inner) => self.compile_expr(inner)?,
            ExprKind::CallExpr(name, args) => self.compile_call(name, args)?,
            ExprKind::BuiltinExpr(id, args) => self.compile_builtin(*id, args)?,
            ExprKind::GetlineExpr {
                target,
                command,
                file,
            } => self.compile_getline(*target, *command, *file)?,
            ExprKind::InExpr(idxs, name) => {
                self.compile_subscripts(idxs)?;
                let sym = self.lookup_array(name)?;
                match sym.scope {
                    Scope::Global => self.emit(Instruction::ArrayInGlobal(sym.index)),
                    _ => self.emit(Instruction::ArrayIn(sym.scope, sym.index)),
                };
            }
            ExprKind::MatchExpr(op, l, r) => {
                self.compile_expr(l)?;
                self.compile_pattern_arg(r)?;
                self.emit(match op {
                    MatchOp::Match => Instruction::Match,
                    MatchOp::NotMatch => Instruction::NotMatch,
                });
            }
            ExprKind::CommaExpr(l, r) => {
                // Only meaningful inside a range pattern, which compiles its
                // two halves as independent streams (see `compile_rule`);
                // anywhere else this is a plain left-to-right evaluation.
                self.compile_expr(l)?;
                self.emit(Instruction::Drop);
                self.compile_expr(r)?;
            }
        }
        Ok(())
    }

    fn compile_field_read(&mut self, idx: &Expr<'a>) -> Result<(), CompileError> {
        if let ExprKind::NumLit(n) = &idx.kind {
            if *n >= 0.0 && n.fract() == 0.0 {
                self.emit(Instruction::FieldInt(*n as u32));
                return Ok(());
            }
        }
        self.compile_expr(idx)?;
        self.emit(Instruction::Field);
        Ok(())
    }

    fn compile_binary(&mut self, op: BinaryOp, l: &Expr<'a>, r: &Expr<'a>) -> Result<(), CompileError> {
        self.compile_expr(l)?;
        self.compile_expr(r)?;
        let numeric = self.types.both_numeric(l, r);
        let instr = match (op, numeric) {
            (BinaryOp::Add, false) => Instruction::Add,
            (BinaryOp::Add, true) => Instruction::AddNum,
            (BinaryOp::Sub, false) => Instruction::Sub,
            (BinaryOp::Sub, true) => Instruction::SubNum,
            (BinaryOp::Mul, false) => Instruction::Mul,
            (BinaryOp::Mul, true) => Instruction::MulNum,
            (BinaryOp::Div, false) => Instruction::Div,
            (BinaryOp::Div, true) => Instruction::DivNum,
            (BinaryOp::Mod, false) => Instruction::Mod,
            (BinaryOp::Mod, true) => Instruction::ModNum,
            (BinaryOp::Pow, false) => Instruction::Pow,
            (BinaryOp::Pow, true) => Instruction::PowNum,
            (BinaryOp::Eq, false) => Instruction::Eq,
            (BinaryOp::Eq, true) => Instruction::EqualNum,
            (BinaryOp::Ne, false) => Instruction::Ne,
            (BinaryOp::Ne, true) => Instruction::NotEqualNum,
            (BinaryOp::Lt, false) => Instruction::Lt,
            (BinaryOp::Lt, true) => Instruction::LessNum,
            (BinaryOp::Le, false) => Instruction::Le,
            (BinaryOp::Le, true) => Instruction::LessEqNum,
            (BinaryOp::Gt, false) => Instruction::Gt,
            (BinaryOp::Gt, true) => Instruction::GreaterNum,
            (BinaryOp::Ge, false) => Instruction::Ge,
            (BinaryOp::Ge, true) => Instruction::GreaterEqNum,
        };
        self.emit(instr);
        Ok(())
    }

    /// `&&`/`||`: evaluate left, dup, conditional-jump-and-test, drop the
    /// leftover copy on fallthrough, evaluate right, converge, coerce to a
    /// proper boolean (spec §4.2).
    fn compile_logical(&mut self, is_and: bool, l: &Expr<'a>, r: &Expr<'a>) -> Result<(), CompileError> {
        self.compile_expr(l)?;
        self.emit(Instruction::Dupe);
        let short_circuit_idx = self.emit(if is_and {
            Instruction::JumpFalse(0)
        } else {
            Instruction::JumpTrue(0)
        });
        self.emit(Instruction::Drop);
        self.compile_expr(r)?;
        let land = self.code.len();
        self.patch_jump(short_circuit_idx, land)?;
        self.emit(Instruction::Boolean);
        Ok(())
    }

    /// Compiles a boolean condition, returning the index of a conditional
    /// jump placeholder (offset not yet patched). `invert = true` means the
    /// jump is taken when the condition is false (the common "skip the
    /// body" shape for `if`/`while`/`for`).
    fn compile_condition(&mut self, expr: &Expr<'a>, invert: bool) -> Result<usize, CompileError> {
        if let ExprKind::BinaryExpr(op, l, r) = &expr.kind {
            if matches!(
                op,
                BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
            ) {
                self.compile_expr(l)?;
                self.compile_expr(r)?;
                let numeric = self.types.both_numeric(l, r);
                let instr = compare_jump_opcode(*op, invert, numeric);
                return Ok(self.emit(instr));
            }
        }
        self.compile_expr(expr)?;
        Ok(self.emit(if invert {
            Instruction::JumpFalse(0)
        } else {
            Instruction::JumpTrue(0)
        }))
    }

    fn compile_ternary(&mut self, c: &Expr<'a>, t: &Expr<'a>, e: &Expr<'a>) -> Result<(), CompileError> {
        let to_else = self.compile_condition(c, true)?;
        self.compile_expr(t)?;
        let over_else = self.emit(Instruction::Jump(0));
        let else_start = self.code.len();
        self.patch_jump(to_else, else_start)?;
        self.compile_expr(e)?;
        let end = self.code.len();
        self.patch_jump(over_else, end)?;
        Ok(())
    }

    /// Pre/post `++`/`--` used as a sub-expression (value needed): keeps the
    /// lvalue's index alive across load/compute/store with `Dupe`+`Rote`
    /// (spec §4.2, §9 "DupeIndexLValue").
    fn compile_incr_expr(&mut self, op: UnaryOp, inner: &Expr<'a>) -> Result<(), CompileError> {
        let is_pre = matches!(op, UnaryOp::PreIncr | UnaryOp::PreDecr);
        let amount: f64 = if matches!(op, UnaryOp::PreIncr | UnaryOp::PostIncr) {
            1.0
        } else {
            -1.0
        };
        match &inner.kind {
            ExprKind::Ident(name) => {
                self.emit_load_var(name)?;
                if is_pre {
                    let c = self.const_num(amount);
                    self.emit(c);
                    self.emit(Instruction::Add);
                    self.emit(Instruction::Dupe);
                    self.emit_store_var(name)?;
                } else {
                    self.emit(Instruction::Dupe);
                    let c = self.const_num(amount);
                    self.emit(c);
                    self.emit(Instruction::Add);
                    self.emit_store_var(name)?;
                }
            }
            ExprKind::FieldExpr(idx_expr) => {
                self.compile_expr(idx_expr)?;
                self.emit(Instruction::Dupe);
                self.emit(Instruction::Field);
                if is_pre {
                    let c = self.const_num(amount);
                    self.emit(c);
                    self.emit(Instruction::Add);
                    self.emit(Instruction::Dupe);
                    self.emit(Instruction::Rote);
                    self.emit(Instruction::StoreField);
                } else {
                    self.emit(Instruction::Dupe);
                    self.emit(Instruction::Rote);
                    let c = self.const_num(amount);
                    self.emit(c);
                    self.emit(Instruction::Add);
                    self.emit(Instruction::StoreField);
                }
            }
            ExprKind::IndexExpr(name, idxs) => {
                self.compile_subscripts(idxs)?;
                let sym = self.lookup_array(name)?;
                self.emit(Instruction::Dupe);
                self.emit(array_get_instr(sym));
                if is_pre {
                    let c = self.const_num(amount);
                    self.emit(c);
                    self.emit(Instruction::Add);
                    self.emit(Instruction::Dupe);
                    self.emit(Instruction::Rote);
                    self.emit(array_set_instr(sym));
                } else {
                    self.emit(Instruction::Dupe);
                    self.emit(Instruction::Rote);
                    let c = self.const_num(amount);
                    self.emit(c);
                    self.emit(Instruction::Add);
                    self.emit(array_set_instr(sym));
                }
            }
            _ => return Err(CompileError::UnsupportedLvalue),
        }
        Ok(())
    }

    fn compile_assign_expr(&mut self, op: AssignOp, lhs: &Expr<'a>, rhs: &Expr<'a>) -> Result<(), CompileError> {
        if op == AssignOp::Assign {
            match &lhs.kind {
                ExprKind::Ident(name) => {
                    self.compile_expr(rhs)?;
                    self.emit(Instruction::Dupe);
                    self.emit_store_var(name)?;
                }
                ExprKind::FieldExpr(idx) => {
                    self.compile_expr(idx)?;
                    self.compile_expr(rhs)?;
                    self.emit(Instruction::Dupe);
                    self.emit(Instruction::Rote);
                    self.emit(Instruction::StoreField);
                }
                ExprKind::IndexExpr(name, idxs) => {
                    self.compile_subscripts(idxs)?;
                    self.compile_expr(rhs)?;
                    self.emit(Instruction::Dupe);
                    self.emit(Instruction::Rote);
                    let sym = self.lookup_array(name)?;
                    self.emit(array_set_instr(sym));
                }
                _ => return Err(CompileError::UnsupportedLvalue),
            }
            return Ok(());
        }

        let aug_op = assign_op_to_aug(op)?;
        match &lhs.kind {
            ExprKind::Ident(name) => {
                self.emit_load_var(name)?;
                self.compile_expr(rhs)?;
                // `Field`/`IndexExpr` reads never carry a static type (see
                // `types::Annotator`), so only a plain `Ident` can ever take
                // the typed fast path here.
                let numeric =
                    self.types.var_ty(self.func_scope, name) == Ty::Num && self.types.is_numeric(rhs);
                self.emit(apply_aug_op(aug_op, numeric));
                self.emit(Instruction::Dupe);
                self.emit_store_var(name)?;
            }
            ExprKind::FieldExpr(idx) => {
                self.compile_expr(idx)?;
                self.emit(Instruction::Dupe);
                self.emit(Instruction::Field);
                self.compile_expr(rhs)?;
                self.emit(apply_aug_op(aug_op, false));
                self.emit(Instruction::Dupe);
                self.emit(Instruction::Rote);
                self.emit(Instruction::StoreField);
            }
            ExprKind::IndexExpr(name, idxs) => {
                self.compile_subscripts(idxs)?;
                let sym = self.lookup_array(name)?;
                self.emit(Instruction::Dupe);
                self.emit(array_get_instr(sym));
                self.compile_expr(rhs)?;
                self.emit(apply_aug_op(aug_op, false));
                self.emit(Instruction::Dupe);
                self.emit(Instruction::Rote);
                self.emit(array_set_instr(sym));
            }
            _ => return Err(CompileError::UnsupportedLvalue),
        }
        Ok(())
    }

    fn compile_call(&mut self, name: &str, args: &[&Expr<'a>]) -> Result<(), CompileError> {
        let info = self
            .resolve
            .get_function(name)
            .ok_or_else(|| CompileError::UndefinedFunction(name.to_string()))?;
        let func_id = info.index;
        let param_is_array = info.param_is_array.to_vec();

        let mut array_args = Vec::new();
        let mut missing_scalars: u32 = 0;
        for (i, is_array) in param_is_array.iter().enumerate() {
            match (args.get(i), is_array) {
                (Some(arg), true) => {
                    let ExprKind::Ident(arg_name) = &arg.kind else {
                        return Err(CompileError::UnsupportedLvalue);
                    };
                    let sym = self.lookup_array(arg_name)?;
                    array_args.push(ArrayArg {
                        scope: sym.scope,
                        index: sym.index,
                    });
                }
                (Some(arg), false) => {
                    self.compile_expr(arg)?;
                }
                (None, true) => {
                    // Missing array arg: nothing sensible to pass by reference;
                    // left to the VM/embedder (not exercised by AWK programs
                    // that type-check).
                }
                (None, false) => missing_scalars += 1,
            }
        }
        if missing_scalars > 0 {
            self.emit(Instruction::Nulls(missing_scalars));
        }
        self.emit(Instruction::CallUser {
            func_id,
            array_args,
        });
        Ok(())
    }

    fn compile_builtin(&mut self, id: BuiltinId, args: &[&Expr<'a>]) -> Result<(), CompileError> {
        match id {
            BuiltinId::Split => {
                self.compile_expr(args[0])?;
                let ExprKind::Ident(arr_name) = &args[1].kind else {
                    return Err(CompileError::UnsupportedLvalue);
                };
                let sym = self.lookup_array(arr_name)?;
                if let Some(fs) = args.get(2) {
                    self.compile_pattern_arg(fs)?;
                    self.emit(Instruction::CallSplitSep(sym.scope, sym.index));
                } else {
                    self.emit(Instruction::CallSplit(sym.scope, sym.index));
                }
            }
            BuiltinId::Length => match args.first().map(|a| &a.kind) {
                Some(ExprKind::Ident(name)) if self.is_array_ident(name) => {
                    let sym = self.lookup_array(name)?;
                    self.emit(Instruction::CallLength(sym.scope, sym.index));
                }
                Some(_) => {
                    self.compile_expr(args[0])?;
                    self.emit(Instruction::CallBuiltin(BuiltinId::Length));
                }
                None => {
                    self.emit(Instruction::FieldInt(0));
                    self.emit(Instruction::CallBuiltin(BuiltinId::Length));
                }
            },
            BuiltinId::Sprintf => {
                for a in args {
                    self.compile_expr(a)?;
                }
                self.emit(Instruction::CallSprintf(args.len() as u32));
            }
            BuiltinId::Match => {
                self.compile_expr(args[0])?;
                self.compile_pattern_arg(args[1])?;
                self.emit(Instruction::CallBuiltin(BuiltinId::Match));
            }
            BuiltinId::Sub | BuiltinId::Gsub => {
                self.compile_pattern_arg(args[0])?;
                self.compile_expr(args[1])?;
                if let Some(target) = args.get(2) {
                    self.compile_expr(target)?;
                } else {
                    self.emit(Instruction::FieldInt(0));
                }
                self.emit(Instruction::CallBuiltin(id));
            }
            _ => {
                for a in args {
                    self.compile_expr(a)?;
                }
                self.emit(Instruction::CallBuiltin(id));
            }
        }
        Ok(())
    }

    fn compile_getline(
        &mut self,
        target: Option<&Expr<'a>>,
        command: Option<&Expr<'a>>,
        file: Option<&Expr<'a>>,
    ) -> Result<(), CompileError> {
        let redirect = if file.is_some() {
            Redirect::Input
        } else if command.is_some() {
            Redirect::Pipe
        } else {
            Redirect::None
        };
        if let Some(f) = file {
            self.compile_expr(f)?;
        }
        if let Some(c) = command {
            self.compile_expr(c)?;
        }
        match target {
            None => {
                self.emit(Instruction::Getline(redirect));
            }
            Some(t) => match &t.kind {
                ExprKind::Ident(name) => {
                    let sym = self.lookup_scalar(name)?;
                    self.emit(Instruction::GetlineVar(redirect, sym.scope, sym.index));
                }
                ExprKind::FieldExpr(idx) => {
                    self.compile_expr(idx)?;
                    self.emit(Instruction::GetlineField(redirect));
                }
                ExprKind::IndexExpr(name, idxs) => {
                    self.compile_subscripts(idxs)?;
                    let sym = self.lookup_array(name)?;
                    self.emit(Instruction::GetlineArray(redirect, sym.scope, sym.index));
                }
                _ => return Err(CompileError::UnsupportedLvalue),
            },
        }
        Ok(())
    }

    fn current_loop_mut(&mut self) -> Result<&mut LoopCtx, CompileError> {
        self.loop_stack
            .last_mut()
            .ok_or(CompileError::BreakOutsideLoop)
    }

    fn compile_stmt(&mut self, stmt: &Stmt<'a>) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::ExprStmt(e) => self.compile_expr_stmt(e)?,
            StmtKind::PrintStmt(args) => self.compile_print(args)?,
            StmtKind::BlockStmt(stmts) => {
                for s in *stmts {
                    self.compile_stmt(s)?;
                }
            }
            StmtKind::IfStmt {
                cond,
                then_branch,
                else_branch,
            } => {
                let to_else = self.compile_condition(cond, true)?;
                self.compile_stmt(then_branch)?;
                match else_branch {
                    None => {
                        let end = self.code.len();
                        self.patch_jump(to_else, end)?;
                    }
                    Some(else_stmt) => {
                        let over_else = self.emit(Instruction::Jump(0));
                        let else_start = self.code.len();
                        self.patch_jump(to_else, else_start)?;
                        self.compile_stmt(else_stmt)?;
                        let end = self.code.len();
                        self.patch_jump(over_else, end)?;
                    }
                }
            }
            StmtKind::WhileStmt { cond, body } => {
                let cond_pos = self.code.len();
                let exit_idx = self.compile_condition(cond, true)?;
                self.loop_stack.push(LoopCtx {
                    kind: LoopKind::Generic,
                    continue_target: Some(cond_pos),
                    continue_patches: Vec::new(),
                    break_patches: Vec::new(),
                });
                self.compile_stmt(body)?;
                self.emit_backward_jump(cond_pos)?;
                let end = self.code.len();
                self.patch_jump(exit_idx, end)?;
                self.close_loop(end)?;
            }
            StmtKind::DoWhileStmt { body, cond } => {
                let body_start = self.code.len();
                self.loop_stack.push(LoopCtx {
                    kind: LoopKind::Generic,
                    continue_target: None,
                    continue_patches: Vec::new(),
                    break_patches: Vec::new(),
                });
                self.compile_stmt(body)?;
                let cond_pos = self.code.len();
                let ctx = self.loop_stack.last().unwrap();
                let continue_patches = ctx.continue_patches.clone();
                for idx in continue_patches {
                    self.patch_jump(idx, cond_pos)?;
                }
                let loop_back_idx = self.compile_condition(cond, false)?;
                self.patch_jump(loop_back_idx, body_start)?;
                let end = self.code.len();
                self.close_loop(end)?;
            }
            StmtKind::ForStmt {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_stmt(init)?;
                }
                let cond_pos = self.code.len();
                let exit_idx = match cond {
                    Some(c) => Some(self.compile_condition(c, true)?),
                    None => None,
                };
                self.loop_stack.push(LoopCtx {
                    kind: LoopKind::Generic,
                    continue_target: None,
                    continue_patches: Vec::new(),
                    break_patches: Vec::new(),
                });
                self.compile_stmt(body)?;
                let post_pos = self.code.len();
                let ctx = self.loop_stack.last().unwrap();
                let continue_patches = ctx.continue_patches.clone();
                for idx in continue_patches {
                    self.patch_jump(idx, post_pos)?;
                }
                if let Some(post) = post {
                    self.compile_stmt(post)?;
                }
                self.emit_backward_jump(cond_pos)?;
                let end = self.code.len();
                if let Some(exit_idx) = exit_idx {
                    self.patch_jump(exit_idx, end)?;
                }
                self.close_loop(end)?;
            }
            StmtKind::ForInStmt { var, array, body } => {
                let var_sym = self.lookup_scalar(var)?;
                let arr_sym = self.lookup_array(array)?;
                let header_pos = self.code.len();
                let header_idx = self.emit(Instruction::ForIn {
                    var_scope: var_sym.scope,
                    var_index: var_sym.index,
                    array_scope: arr_sym.scope,
                    array_index: arr_sym.index,
                    end_offset: 0,
                });
                self.loop_stack.push(LoopCtx {
                    kind: LoopKind::ForIn,
                    continue_target: Some(header_pos),
                    continue_patches: Vec::new(),
                    break_patches: Vec::new(),
                });
                self.compile_stmt(body)?;
                self.emit_backward_jump(header_pos)?;
                let end = self.code.len();
                self.patch_jump(header_idx, end)?;
                self.close_loop(end)?;
            }
            StmtKind::BreakStmt => {
                let ctx = self.current_loop_mut()?;
                match ctx.kind {
                    LoopKind::ForIn => {
                        self.emit(Instruction::BreakForIn);
                    }
                    LoopKind::Generic => {
                        let idx = self.emit(Instruction::Jump(0));
                        self.loop_stack.last_mut().unwrap().break_patches.push(idx);
                    }
                }
            }
            StmtKind::ContinueStmt => {
                let ctx = self
                    .loop_stack
                    .last()
                    .ok_or(CompileError::ContinueOutsideLoop)?;
                match ctx.continue_target {
                    Some(target) => self.emit_backward_jump(target)?,
                    None => {
                        let idx = self.emit(Instruction::Jump(0));
                        self.loop_stack
                            .last_mut()
                            .unwrap()
                            .continue_patches
                            .push(idx);
                    }
                }
            }
            StmtKind::NextStmt => {
                self.emit(Instruction::Next);
            }
            StmtKind::NextFileStmt => {
                self.emit(Instruction::Nextfile);
            }
            StmtKind::ReturnStmt(None) => {
                self.emit(Instruction::ReturnNull);
            }
            StmtKind::ReturnStmt(Some(e)) => {
                self.compile_expr(e)?;
                self.emit(Instruction::Return);
            }
            StmtKind::ExitStmt(None) => {
                self.emit(Instruction::Exit);
            }
            StmtKind::ExitStmt(Some(e)) => {
                self.compile_expr(e)?;
                self.emit(Instruction::ExitCode);
            }
            StmtKind::DeleteStmt { array, indices } => {
                let sym = self.lookup_array(array)?;
                if indices.is_empty() {
                    self.emit(Instruction::ArrayClear(sym.scope, sym.index));
                } else {
                    self.compile_subscripts(indices)?;
                    match sym.scope {
                        Scope::Global => {
                            self.emit(Instruction::ArrayDeleteGlobal(sym.index));
                        }
                        _ => {
                            self.emit(Instruction::ArrayDelete(sym.scope, sym.index));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn close_loop(&mut self, end: usize) -> Result<(), CompileError> {
        let ctx = self.loop_stack.pop().expect("loop context pushed above");
        for idx in ctx.break_patches {
            self.patch_jump(idx, end)?;
        }
        Ok(())
    }

    /// Statement-position expressions skip the Dupe/Rote dance expression
    /// position needs, emitting dedicated no-residual opcodes instead
    /// (spec §4.2, "avoid the Dupe/Drop overhead").
    fn compile_expr_stmt(&mut self, e: &Expr<'a>) -> Result<(), CompileError> {
        match &e.kind {
            ExprKind::AssignExpr(AssignOp::Assign, lhs, rhs) => self.compile_assign_stmt(lhs, rhs)?,
            ExprKind::AssignExpr(op, lhs, rhs) => self.compile_compound_assign_stmt(*op, lhs, rhs)?,
            ExprKind::UnaryExpr(
                op @ (UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr),
                inner,
            ) => self.compile_incr_stmt(*op, inner)?,
            _ => {
                self.compile_expr(e)?;
                self.emit(Instruction::Drop);
            }
        }
        Ok(())
    }

    fn compile_assign_stmt(&mut self, lhs: &Expr<'a>, rhs: &Expr<'a>) -> Result<(), CompileError> {
        match &lhs.kind {
            ExprKind::Ident(name) => {
                self.compile_expr(rhs)?;
                self.emit_store_var(name)?;
            }
            ExprKind::FieldExpr(idx) => {
                self.compile_expr(idx)?;
                self.compile_expr(rhs)?;
                self.emit(Instruction::StoreField);
            }
            ExprKind::IndexExpr(name, idxs) => {
                self.compile_subscripts(idxs)?;
                self.compile_expr(rhs)?;
                let sym = self.lookup_array(name)?;
                self.emit(array_set_instr(sym));
            }
            _ => return Err(CompileError::UnsupportedLvalue),
        }
        Ok(())
    }

    fn compile_compound_assign_stmt(
        &mut self,
        op: AssignOp,
        lhs: &Expr<'a>,
        rhs: &Expr<'a>,
    ) -> Result<(), CompileError> {
        let aug_op = assign_op_to_aug(op)?;
        match &lhs.kind {
            ExprKind::Ident(name) => {
                self.compile_expr(rhs)?;
                self.emit_aug_var(name, aug_op)?;
            }
            ExprKind::FieldExpr(idx) => {
                self.compile_expr(idx)?;
                self.compile_expr(rhs)?;
                self.emit(Instruction::AugField(aug_op));
            }
            ExprKind::IndexExpr(name, idxs) => {
                self.compile_subscripts(idxs)?;
                self.compile_expr(rhs)?;
                let sym = self.lookup_array(name)?;
                let instr = match sym.scope {
                    Scope::Global => Instruction::AugArrayGlobal(aug_op, sym.index),
                    _ => Instruction::AugArray(aug_op, sym.scope, sym.index),
                };
                self.emit(instr);
            }
            _ => return Err(CompileError::UnsupportedLvalue),
        }
        Ok(())
    }

    fn compile_incr_stmt(&mut self, op: UnaryOp, inner: &Expr<'a>) -> Result<(), CompileError> {
        let amount: i32 = if matches!(op, UnaryOp::PreIncr | UnaryOp::PostIncr) {
            1
        } else {
            -1
        };
        match &inner.kind {
            ExprKind::Ident(name) => self.emit_incr_var(name, amount)?,
            ExprKind::FieldExpr(idx) => {
                self.compile_expr(idx)?;
                self.emit(Instruction::IncrField(amount));
            }
            ExprKind::IndexExpr(name, idxs) => {
                self.compile_subscripts(idxs)?;
                let sym = self.lookup_array(name)?;
                let instr = match sym.scope {
                    Scope::Global => Instruction::IncrArrayGlobal(amount, sym.index),
                    _ => Instruction::IncrArray(amount, sym.scope, sym.index),
                };
                self.emit(instr);
            }
            _ => return Err(CompileError::UnsupportedLvalue),
        }
        Ok(())
    }

    fn compile_print(&mut self, args: &PrintArgs<'a>) -> Result<(), CompileError> {
        let redirect = redirect_kind_to_opcode(args.redirect);
        if let Some(dest) = args.dest {
            self.compile_expr(dest)?;
        }
        for a in args.args {
            self.compile_expr(a)?;
        }
        let n = args.args.len() as u32;
        self.emit(if args.is_printf {
            Instruction::Printf(n, redirect)
        } else {
            Instruction::Print(n, redirect)
        });
        Ok(())
    }
}

fn array_get_instr(sym: Symbol) -> Instruction {
    match sym.scope {
        Scope::Global => Instruction::ArrayGetGlobal(sym.index),
        _ => Instruction::ArrayGet(sym.scope, sym.index),
    }
}

fn array_set_instr(sym: Symbol) -> Instruction {
    match sym.scope {
        Scope::Global => Instruction::ArraySetGlobal(sym.index),
        _ => Instruction::ArraySet(sym.scope, sym.index),
    }
}

fn assign_op_to_aug(op: AssignOp) -> Result<AugOp, CompileError> {
    Ok(match op {
        AssignOp::AddAssign => AugOp::Add,
        AssignOp::SubAssign => AugOp::Sub,
        AssignOp::MulAssign => AugOp::Mul,
        AssignOp::DivAssign => AugOp::Div,
        AssignOp::ModAssign => AugOp::Mod,
        AssignOp::PowAssign => AugOp::Pow,
        AssignOp::Assign => {
            return Err(CompileError::UnknownOperator("plain assign in aug path".into()))
        }
    })
}

/// `Aug*` opcodes apply their tag to the top two stack values directly; in
/// expression position (where we need the result value before storing) we
/// instead apply the equivalent arithmetic op so the result stays on the
/// stack for the Dupe/Rote dance. `numeric` picks the typed fast path only
/// when both operands are statically proven `Num` (same discipline as
/// `compile_binary`) — the generic op still coerces correctly otherwise.
fn apply_aug_op(op: AugOp, numeric: bool) -> Instruction {
    match (op, numeric) {
        (AugOp::Add, true) => Instruction::AddNum,
        (AugOp::Add, false) => Instruction::Add,
        (AugOp::Sub, true) => Instruction::SubNum,
        (AugOp::Sub, false) => Instruction::Sub,
        (AugOp::Mul, true) => Instruction::MulNum,
        (AugOp::Mul, false) => Instruction::Mul,
        (AugOp::Div, true) => Instruction::DivNum,
        (AugOp::Div, false) => Instruction::Div,
        (AugOp::Pow, true) => Instruction::PowNum,
        (AugOp::Pow, false) => Instruction::Pow,
        (AugOp::Mod, true) => Instruction::ModNum,
        (AugOp::Mod, false) => Instruction::Mod,
    }
}

fn redirect_kind_to_opcode(k: RedirectKind) -> Redirect {
    match k {
        RedirectKind::None => Redirect::None,
        RedirectKind::Write => Redirect::Write,
        RedirectKind::Append => Redirect::Append,
        RedirectKind::Pipe => Redirect::Pipe,
        RedirectKind::Input => Redirect::Input,
    }
}

fn compare_jump_opcode(op: BinaryOp, invert: bool, numeric: bool) -> Instruction {
    use BinaryOp::*;
    // invert=false: jump when the comparison holds. invert=true: jump on
    // its logical complement (used by if/while to skip the body).
    let logical_op = if invert { complement(op) } else { op };
    match (logical_op, numeric) {
        (Eq, false) => Instruction::JumpEqual(0),
        (Eq, true) => Instruction::JumpEqualNum(0),
        (Ne, false) => Instruction::JumpNotEq(0),
        (Ne, true) => Instruction::JumpNotEqualNum(0),
        (Lt, false) => Instruction::JumpLess(0),
        (Lt, true) => Instruction::JumpLessNum(0),
        (Le, false) => Instruction::JumpLessEq(0),
        (Le, true) => Instruction::JumpLessEqNum(0),
        (Gt, false) => Instruction::JumpGreater(0),
        (Gt, true) => Instruction::JumpGreaterNum(0),
        (Ge, false) => Instruction::JumpGrEq(0),
        (Ge, true) => Instruction::JumpGreaterEqNum(0),
        _ => unreachable!("compare_jump_opcode only called for comparison ops"),
    }
}

fn complement(op: BinaryOp) -> BinaryOp {
    use BinaryOp::*;
    match op {
        Eq => Ne,
        Ne => Eq,
        Lt => Ge,
        Le => Gt,
        Gt => Le,
        Ge => Lt,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, AstArena, AstProgram, FunctionDecl, Rule, RulePattern};
    use crate::resolve::{Special, GLOBAL_SCOPE};
    use bumpalo::Bump;

    fn resolver_with_globals(names: &'static [&'static str]) -> ResolveResult<'static> {
        let mut r = ResolveResult::new();
        for n in names {
            r.define_global_scalar(n);
        }
        r
    }

    #[test]
    fn s1_duplicate_num_constants_dedup() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let lit = arena.alloc_expr(ExprKind::NumLit(42.0));
        let x = arena.alloc_expr(ExprKind::Ident("x"));
        let y = arena.alloc_expr(ExprKind::Ident("y"));
        let assign_x = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, x, lit));
        let assign_y = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, y, lit));
        let s1 = arena.alloc_stmt(StmtKind::ExprStmt(assign_x));
        let s2 = arena.alloc_stmt(StmtKind::ExprStmt(assign_y));
        let begin_blocks = arena.alloc_slice(&[s1, s2]);
        let ast = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let resolve = resolver_with_globals(&["x", "y"]);
        let program = compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
        assert_eq!(program.nums, vec![42.0]);
        let store_count = program
            .begin_code
            .iter()
            .filter(|i| matches!(i, Instruction::StoreGlobal(_)))
            .count();
        assert_eq!(store_count, 2);
    }

    #[test]
    fn s2_bare_pattern_rule_has_default_body() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let pattern_expr = arena.alloc_expr(ExprKind::RegexLit(b"test"));
        let rule = Rule {
            pattern: RulePattern::Expr(pattern_expr),
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
        let program = compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
        assert_eq!(program.actions.len(), 1);
        assert!(program.actions[0].body.is_none());
        assert!(matches!(program.actions[0].pattern, ActionPattern::Expr(_)));
    }

    #[test]
    fn s5_four_part_concat_uses_concat_multi() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let a = arena.alloc_expr(ExprKind::StrLit(b"a"));
        let b = arena.alloc_expr(ExprKind::StrLit(b"b"));
        let c = arena.alloc_expr(ExprKind::StrLit(b"c"));
        let d = arena.alloc_expr(ExprKind::StrLit(b"d"));
        let parts = arena.alloc_slice(&[a, b, c, d]);
        let concat = arena.alloc_expr(ExprKind::ConcatExpr(parts));
        let x = arena.alloc_expr(ExprKind::Ident("x"));
        let assign = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, x, concat));
        let stmt = arena.alloc_stmt(StmtKind::ExprStmt(assign));
        let begin_blocks = arena.alloc_slice(&[stmt]);
        let ast = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let resolve = resolver_with_globals(&["x"]);
        let program = compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
        assert!(program
            .begin_code
            .iter()
            .any(|i| matches!(i, Instruction::ConcatMulti(4))));
        assert!(!program.begin_code.iter().any(|i| matches!(i, Instruction::Concat)));
    }

    #[test]
    fn s6_missing_trailing_scalar_arg_pads_with_nulls() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let a = arena.alloc_expr(ExprKind::Ident("a"));
        let b_id = arena.alloc_expr(ExprKind::Ident("b"));
        let c_id = arena.alloc_expr(ExprKind::Ident("c"));
        let ab = arena.alloc_expr(ExprKind::BinaryExpr(BinaryOp::Add, a, b_id));
        let abc = arena.alloc_expr(ExprKind::BinaryExpr(BinaryOp::Add, ab, c_id));
        let ret = arena.alloc_stmt(StmtKind::ReturnStmt(Some(abc)));
        let params = arena.alloc_slice(&["a", "b", "c"]);
        let func = FunctionDecl {
            name: "f",
            params,
            body: ret,
        };
        let one = arena.alloc_expr(ExprKind::NumLit(1.0));
        let two = arena.alloc_expr(ExprKind::NumLit(2.0));
        let call_args = arena.alloc_slice(&[one, two]);
        let call = arena.alloc_expr(ExprKind::CallExpr("f", call_args));
        let print_args = arena.alloc_slice(&[call]);
        let print_stmt = arena.alloc_stmt(StmtKind::PrintStmt(PrintArgs {
            is_printf: false,
            args: print_args,
            redirect: RedirectKind::None,
            dest: None,
        }));
        let begin_blocks = arena.alloc_slice(&[print_stmt]);
        let functions = arena.alloc_slice(&[func]);
        let ast = AstProgram {
            functions,
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let mut resolve = ResolveResult::new();
        resolve.define_local("f", "a", 0, SymbolKind::Scalar);
        resolve.define_local("f", "b", 1, SymbolKind::Scalar);
        resolve.define_local("f", "c", 2, SymbolKind::Scalar);
        resolve.add_function(crate::resolve::FunctionInfo {
            index: 0,
            name: "f",
            params,
            param_is_array: arena.alloc_slice(&[false, false, false]),
        });
        let program = compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
        let nulls_before_call = program
            .begin_code
            .windows(2)
            .any(|w| matches!(w[0], Instruction::Nulls(1)) && matches!(w[1], Instruction::CallUser { .. }));
        assert!(nulls_before_call);
    }

    #[test]
    fn jump_validity_for_if_else() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let one = arena.alloc_expr(ExprKind::NumLit(1.0));
        let two = arena.alloc_expr(ExprKind::NumLit(2.0));
        let cond = arena.alloc_expr(ExprKind::BinaryExpr(BinaryOp::Lt, one, two));
        let then_body = arena.alloc_stmt(StmtKind::NextStmt);
        let else_body = arena.alloc_stmt(StmtKind::NextFileStmt);
        let if_stmt = arena.alloc_stmt(StmtKind::IfStmt {
            cond,
            then_branch: then_body,
            else_branch: Some(else_body),
        });
        let begin_blocks = arena.alloc_slice(&[if_stmt]);
        let ast = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let resolve = ResolveResult::new();
        let program = compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
        for (i, instr) in program.begin_code.iter().enumerate() {
            if let Some(off) = instr.jump_offset() {
                let target = i as i64 + 1 + off as i64;
                assert!(target >= 0 && target as usize <= program.begin_code.len());
            }
        }
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let ident = arena.alloc_expr(ExprKind::Ident("nope"));
        let stmt = arena.alloc_stmt(StmtKind::ExprStmt(ident));
        let begin_blocks = arena.alloc_slice(&[stmt]);
        let ast = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let resolve = ResolveResult::new();
        let err = compile(&ast, &resolve, &CompilerOptions::default()).unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable("nope".to_string()));
    }

    #[test]
    fn negative_zero_and_zero_intern_distinctly() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let neg_zero = arena.alloc_expr(ExprKind::NumLit(-0.0));
        let zero = arena.alloc_expr(ExprKind::NumLit(0.0));
        let x = arena.alloc_expr(ExprKind::Ident("x"));
        let y = arena.alloc_expr(ExprKind::Ident("y"));
        let assign_x = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, x, neg_zero));
        let assign_y = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, y, zero));
        let s1 = arena.alloc_stmt(StmtKind::ExprStmt(assign_x));
        let s2 = arena.alloc_stmt(StmtKind::ExprStmt(assign_y));
        let begin_blocks = arena.alloc_slice(&[s1, s2]);
        let ast = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let resolve = resolver_with_globals(&["x", "y"]);
        let program = compile(&ast, &resolve, &CompilerOptions::default()).unwrap();
        assert_eq!(program.nums.len(), 2);
    }

    #[test]
    fn special_scope_round_trips_through_load() {
        let mut r = ResolveResult::new();
        let sym = r.define_special("NR", Special::Nr);
        assert_eq!(sym.index, 0);
        assert_eq!(GLOBAL_SCOPE, "");
    }
}
