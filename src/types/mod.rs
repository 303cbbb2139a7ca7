//! Two-pass static type inference (spec §4.3).
//!
//! Pass one walks every function body plus `BEGIN`/`END`/rule code looking
//! for assignments, to build a conservative per-variable type by joining
//! over all assignment sites. Pass two walks the tree again assigning a type
//! to every expression node, consulting the variable map pass one built.
//! Mirrors the teacher's `analyzer` two-pass shape (collect facts, then
//! re-walk to annotate), without adopting its pointer-identity scheme — see
//! [`crate::ast::NodeId`] for why.

use hashbrown::{HashMap, HashSet};

use crate::ast::{
    AssignOp, AstProgram, BinaryOp, BuiltinId, Expr, ExprKind, MatchOp, Stmt, StmtKind, UnaryOp,
};
use crate::ast::NodeId;
use crate::resolve::GLOBAL_SCOPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Unknown,
    Num,
    Str,
}

impl Ty {
    /// Join used when folding multiple assignment sites into one variable type.
    fn join(self, other: Ty) -> Ty {
        match (self, other) {
            (Ty::Unknown, _) | (_, Ty::Unknown) => Ty::Unknown,
            (a, b) if a == b => a,
            _ => Ty::Unknown,
        }
    }
}

/// `":"+name` for globals, `funcName+":"+name` for locals (spec §3 TypeInfo).
pub type VarKey = String;

pub fn var_key(func_scope: &str, name: &str) -> VarKey {
    format!("{}:{}", func_scope, name)
}

#[derive(Debug, Default)]
pub struct TypeInfo {
    expr_type: HashMap<NodeId, Ty>,
    var_type: HashMap<VarKey, Ty>,
    numeric_loop_vars: HashSet<VarKey>,
}

impl TypeInfo {
    pub fn is_numeric(&self, expr: &Expr<'_>) -> bool {
        self.expr_type.get(&expr.id).copied() == Some(Ty::Num)
    }

    pub fn is_string(&self, expr: &Expr<'_>) -> bool {
        self.expr_type.get(&expr.id).copied() == Some(Ty::Str)
    }

    pub fn expr_ty(&self, expr: &Expr<'_>) -> Ty {
        self.expr_type.get(&expr.id).copied().unwrap_or(Ty::Unknown)
    }

    pub fn both_numeric(&self, left: &Expr<'_>, right: &Expr<'_>) -> bool {
        self.is_numeric(left) && self.is_numeric(right)
    }

    pub fn var_ty(&self, func_scope: &str, name: &str) -> Ty {
        self.var_type
            .get(&var_key(func_scope, name))
            .copied()
            .unwrap_or(Ty::Unknown)
    }

    pub fn is_numeric_loop_var(&self, func_scope: &str, name: &str) -> bool {
        self.numeric_loop_vars.contains(&var_key(func_scope, name))
    }
}

/// Per-function scan state for pass one.
struct VarTypeCollector<'a> {
    func_scope: &'a str,
    assignments: HashMap<VarKey, Ty>,
    numeric_loop_vars: HashSet<VarKey>,
    has_unknown_read: HashSet<VarKey>,
}

impl<'a> VarTypeCollector<'a> {
    fn new(func_scope: &'a str) -> Self {
        Self {
            func_scope,
            assignments: HashMap::new(),
            numeric_loop_vars: HashSet::new(),
            has_unknown_read: HashSet::new(),
        }
    }

    fn record_assign(&mut self, name: &str, ty: Ty) {
        let key = var_key(self.func_scope, name);
        let joined = match self.assignments.get(&key) {
            Some(existing) => existing.join(ty),
            None => ty,
        };
        self.assignments.insert(key, joined);
    }

    fn record_unknown(&mut self, name: &str) {
        let key = var_key(self.func_scope, name);
        self.has_unknown_read.insert(key.clone());
        self.assignments.insert(key, Ty::Unknown);
    }

    fn literal_ty(expr: &Expr<'_>) -> Ty {
        // Cheap static classification used only to seed assignment joins;
        // the full recursive classification happens in pass two.
        match &expr.kind {
            ExprKind::NumLit(_) => Ty::Num,
            ExprKind::StrLit(_) => Ty::Str,
            ExprKind::RegexLit(_) => Ty::Num,
            ExprKind::BinaryExpr(op, ..) => match op {
                BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::Pow
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge => Ty::Num,
            },
            ExprKind::LogicalAnd(..) | ExprKind::LogicalOr(..) => Ty::Num,
            ExprKind::UnaryExpr(UnaryOp::Not, _)
            | ExprKind::UnaryExpr(UnaryOp::Neg, _)
            | ExprKind::UnaryExpr(UnaryOp::Pos, _) => Ty::Num,
            ExprKind::MatchExpr(..) => Ty::Num,
            ExprKind::ConcatExpr(_) => Ty::Str,
            ExprKind::GetlineExpr { .. } => Ty::Num,
            ExprKind::BuiltinExpr(id, _) => {
                if id.is_numeric_result() {
                    Ty::Num
                } else if id.is_string_result() {
                    Ty::Str
                } else {
                    Ty::Unknown
                }
            }
            _ => Ty::Unknown,
        }
    }

    fn walk_expr_for_assignments(&mut self, expr: &Expr<'_>) {
        match &expr.kind {
            ExprKind::AssignExpr(op, lhs, rhs) => {
                self.walk_expr_for_assignments(rhs);
                if let ExprKind::Ident(name) = &lhs.kind {
                    let ty = if *op == AssignOp::Assign {
                        Self::literal_ty(rhs)
                    } else {
                        Ty::Num
                    };
                    self.record_assign(name, ty);
                } else {
                    self.walk_expr_for_assignments(lhs);
                }
            }
            ExprKind::UnaryExpr(
                UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr,
                inner,
            ) => {
                if let ExprKind::Ident(name) = &inner.kind {
                    self.record_assign(name, Ty::Num);
                } else {
                    self.walk_expr_for_assignments(inner);
                }
            }
            ExprKind::GetlineExpr {
                target,
                command,
                file,
            } => {
                if let Some(t) = target {
                    if let ExprKind::Ident(name) = &t.kind {
                        self.record_unknown(name);
                    } else {
                        self.walk_expr_for_assignments(t);
                    }
                }
                if let Some(c) = command {
                    self.walk_expr_for_assignments(c);
                }
                if let Some(f) = file {
                    self.walk_expr_for_assignments(f);
                }
            }
            ExprKind::BinaryExpr(_, l, r) | ExprKind::LogicalAnd(l, r) | ExprKind::LogicalOr(l, r) => {
                self.walk_expr_for_assignments(l);
                self.walk_expr_for_assignments(r);
            }
            ExprKind::UnaryExpr(_, inner) | ExprKind::FieldExpr(inner) | ExprKind::GroupExpr(inner) => {
                self.walk_expr_for_assignments(inner);
            }
            ExprKind::TernaryExpr(c, t, e) => {
                self.walk_expr_for_assignments(c);
                self.walk_expr_for_assignments(t);
                self.walk_expr_for_assignments(e);
            }
            ExprKind::ConcatExpr(parts) => {
                for p in *parts {
                    self.walk_expr_for_assignments(p);
                }
            }
            ExprKind::IndexExpr(_, idxs) | ExprKind::InExpr(idxs, _) => {
                for i in *idxs {
                    self.walk_expr_for_assignments(i);
                }
            }
            ExprKind::CallExpr(_, args) | ExprKind::BuiltinExpr(_, args) => {
                for a in *args {
                    self.walk_expr_for_assignments(a);
                }
            }
            ExprKind::MatchExpr(_, l, r) => {
                self.walk_expr_for_assignments(l);
                self.walk_expr_for_assignments(r);
            }
            ExprKind::CommaExpr(l, r) => {
                self.walk_expr_for_assignments(l);
                self.walk_expr_for_assignments(r);
            }
            ExprKind::NumLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::RegexLit(_)
            | ExprKind::Ident(_) => {}
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt<'_>) {
        match &stmt.kind {
            StmtKind::ExprStmt(e) => self.walk_expr_for_assignments(e),
            StmtKind::PrintStmt(args) => {
                for a in args.args {
                    self.walk_expr_for_assignments(a);
                }
                if let Some(d) = args.dest {
                    self.walk_expr_for_assignments(d);
                }
            }
            StmtKind::BlockStmt(stmts) => {
                for s in *stmts {
                    self.walk_stmt(s);
                }
            }
            StmtKind::IfStmt {
                cond,
                then_branch,
                else_branch,
            } => {
                self.walk_expr_for_assignments(cond);
                self.walk_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.walk_stmt(e);
                }
            }
            StmtKind::WhileStmt { cond, body } => {
                self.walk_expr_for_assignments(cond);
                self.walk_stmt(body);
            }
            StmtKind::DoWhileStmt { body, cond } => {
                self.walk_stmt(body);
                self.walk_expr_for_assignments(cond);
            }
            StmtKind::ForStmt {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(i) = init {
                    self.walk_stmt(i);
                }
                if let Some(c) = cond {
                    self.walk_expr_for_assignments(c);
                }
                if let Some(p) = post {
                    self.walk_stmt(p);
                }
                self.walk_stmt(body);
                self.detect_induction_var(init, cond, post);
            }
            StmtKind::ForInStmt { var, array: _, body } => {
                self.record_assign(var, Ty::Str);
                self.walk_stmt(body);
            }
            StmtKind::ReturnStmt(Some(e)) | StmtKind::ExitStmt(Some(e)) => {
                self.walk_expr_for_assignments(e)
            }
            StmtKind::DeleteStmt { indices, .. } => {
                for i in *indices {
                    self.walk_expr_for_assignments(i);
                }
            }
            StmtKind::ReturnStmt(None)
            | StmtKind::ExitStmt(None)
            | StmtKind::BreakStmt
            | StmtKind::ContinueStmt
            | StmtKind::NextStmt
            | StmtKind::NextFileStmt => {}
        }
    }

    /// `for (i=e0; cond; post)` with numeric `e0` and `post` one of
    /// `i++`/`--i`/`i+=…` marks `i` numeric (spec §4.3).
    fn detect_induction_var(
        &mut self,
        init: &Option<&Stmt<'_>>,
        _cond: &Option<&Expr<'_>>,
        post: &Option<&Stmt<'_>>,
    ) {
        let Some(init) = init else { return };
        let StmtKind::ExprStmt(init_expr) = &init.kind else {
            return;
        };
        let ExprKind::AssignExpr(AssignOp::Assign, lhs, rhs) = &init_expr.kind else {
            return;
        };
        let ExprKind::Ident(var_name) = &lhs.kind else {
            return;
        };
        if Self::literal_ty(rhs) != Ty::Num {
            return;
        }
        let Some(post) = post else { return };
        let StmtKind::ExprStmt(post_expr) = &post.kind else {
            return;
        };
        let is_induction = match &post_expr.kind {
            ExprKind::UnaryExpr(
                UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr,
                inner,
            ) => matches!(&inner.kind, ExprKind::Ident(n) if *n == *var_name),
            ExprKind::AssignExpr(op, lhs, _)
                if *op != AssignOp::Assign =>
            {
                matches!(&lhs.kind, ExprKind::Ident(n) if *n == *var_name)
            }
            _ => false,
        };
        if is_induction {
            self.numeric_loop_vars
                .insert(var_key(self.func_scope, var_name));
            self.record_assign(var_name, Ty::Num);
        }
    }
}

/// Pass two: annotate every expression node with its inferred type, using
/// the variable-type map pass one produced.
struct Annotator<'a> {
    func_scope: &'a str,
    var_type: &'a HashMap<VarKey, Ty>,
    expr_type: HashMap<NodeId, Ty>,
}

impl<'a> Annotator<'a> {
    fn var_ty(&self, name: &str) -> Ty {
        self.var_type
            .get(&var_key(self.func_scope, name))
            .copied()
            .unwrap_or(Ty::Unknown)
    }

    fn classify(&mut self, expr: &Expr<'_>) -> Ty {
        let ty = match &expr.kind {
            ExprKind::NumLit(_) => Ty::Num,
            ExprKind::StrLit(_) => Ty::Str,
            ExprKind::RegexLit(_) => Ty::Num,
            ExprKind::Ident(name) => self.var_ty(name),
            ExprKind::FieldExpr(idx) => {
                self.classify(idx);
                Ty::Unknown
            }
            ExprKind::IndexExpr(_, idxs) => {
                for i in *idxs {
                    self.classify(i);
                }
                Ty::Unknown
            }
            ExprKind::BinaryExpr(_, l, r) => {
                self.classify(l);
                self.classify(r);
                Ty::Num
            }
            ExprKind::LogicalAnd(l, r) | ExprKind::LogicalOr(l, r) => {
                self.classify(l);
                self.classify(r);
                Ty::Num
            }
            ExprKind::UnaryExpr(op, inner) => {
                self.classify(inner);
                match op {
                    UnaryOp::Not | UnaryOp::Neg | UnaryOp::Pos => Ty::Num,
                    UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr => {
                        Ty::Num
                    }
                }
            }
            ExprKind::AssignExpr(op, lhs, rhs) => {
                self.classify(lhs);
                let rhs_ty = self.classify(rhs);
                if *op == AssignOp::Assign {
                    rhs_ty
                } else {
                    Ty::Num
                }
            }
            ExprKind::TernaryExpr(c, t, e) => {
                self.classify(c);
                let tt = self.classify(t);
                let et = self.classify(e);
                if tt == et {
                    tt
                } else {
                    Ty::Unknown
                }
            }
            ExprKind::ConcatExpr(parts) => {
                for p in *parts {
                    self.classify(p);
                }
                Ty::Str
            }
            ExprKind::GroupExpr(inner) => self.classify(inner),
            ExprKind::CallExpr(_, args) => {
                for a in *args {
                    self.classify(a);
                }
                Ty::Unknown
            }
            ExprKind::BuiltinExpr(id, args) => {
                for a in *args {
                    self.classify(a);
                }
                classify_builtin(*id)
            }
            ExprKind::GetlineExpr {
                target,
                command,
                file,
            } => {
                if let Some(t) = target {
                    self.classify(t);
                }
                if let Some(c) = command {
                    self.classify(c);
                }
                if let Some(f) = file {
                    self.classify(f);
                }
                Ty::Num
            }
            ExprKind::InExpr(idxs, _) => {
                for i in *idxs {
                    self.classify(i);
                }
                Ty::Num
            }
            ExprKind::MatchExpr(MatchOp::Match | MatchOp::NotMatch, l, r) => {
                self.classify(l);
                self.classify(r);
                Ty::Num
            }
            ExprKind::CommaExpr(l, r) => {
                self.classify(l);
                self.classify(r)
            }
        };
        self.expr_type.insert(expr.id, ty);
        ty
    }

    fn walk_stmt(&mut self, stmt: &Stmt<'_>) {
        match &stmt.kind {
            StmtKind::ExprStmt(e) => {
                self.classify(e);
            }
            StmtKind::PrintStmt(args) => {
                for a in args.args {
                    self.classify(a);
                }
                if let Some(d) = args.dest {
                    self.classify(d);
                }
            }
            StmtKind::BlockStmt(stmts) => {
                for s in *stmts {
                    self.walk_stmt(s);
                }
            }
            StmtKind::IfStmt {
                cond,
                then_branch,
                else_branch,
            } => {
                self.classify(cond);
                self.walk_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.walk_stmt(e);
                }
            }
            StmtKind::WhileStmt { cond, body } => {
                self.classify(cond);
                self.walk_stmt(body);
            }
            StmtKind::DoWhileStmt { body, cond } => {
                self.walk_stmt(body);
                self.classify(cond);
            }
            StmtKind::ForStmt {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(i) = init {
                    self.walk_stmt(i);
                }
                if let Some(c) = cond {
                    self.classify(c);
                }
                if let Some(p) = post {
                    self.walk_stmt(p);
                }
                self.walk_stmt(body);
            }
            StmtKind::ForInStmt { body, .. } => self.walk_stmt(body),
            StmtKind::ReturnStmt(Some(e)) | StmtKind::ExitStmt(Some(e)) => {
                self.classify(e);
            }
            StmtKind::DeleteStmt { indices, .. } => {
                for i in *indices {
                    self.classify(i);
                }
            }
            StmtKind::ReturnStmt(None)
            | StmtKind::ExitStmt(None)
            | StmtKind::BreakStmt
            | StmtKind::ContinueStmt
            | StmtKind::NextStmt
            | StmtKind::NextFileStmt => {}
        }
    }
}

fn classify_builtin(id: BuiltinId) -> Ty {
    if id.is_numeric_result() {
        Ty::Num
    } else if id.is_string_result() {
        Ty::Str
    } else {
        Ty::Unknown
    }
}

/// Runs both passes over every function body and every BEGIN/END/rule body
/// in `program`, producing one [`TypeInfo`] for the whole compilation unit.
pub fn infer<'a>(program: &AstProgram<'a>) -> TypeInfo {
    let mut var_type: HashMap<VarKey, Ty> = HashMap::new();
    let mut numeric_loop_vars: HashSet<VarKey> = HashSet::new();

    let mut collect = |scope: &str, bodies: &[&Stmt<'a>]| {
        let mut collector = VarTypeCollector::new(scope);
        for body in bodies {
            collector.walk_stmt(body);
        }
        for (k, v) in collector.assignments {
            let joined = match var_type.get(&k) {
                Some(existing) => existing.join(v),
                None => v,
            };
            var_type.insert(k, joined);
        }
        numeric_loop_vars.extend(collector.numeric_loop_vars);
    };

    collect(GLOBAL_SCOPE, program.begin_blocks);
    collect(GLOBAL_SCOPE, program.end_blocks);
    let rule_bodies: Vec<&Stmt<'a>> = program.rules.iter().filter_map(|r| r.body).collect();
    collect(GLOBAL_SCOPE, &rule_bodies);

    for func in program.functions {
        collect(func.name, core::slice::from_ref(&func.body));
    }

    let mut expr_type = HashMap::new();
    let mut annotate = |scope: &str, bodies: &[&Stmt<'a>]| {
        let mut annotator = Annotator {
            func_scope: scope,
            var_type: &var_type,
            expr_type: HashMap::new(),
        };
        for body in bodies {
            annotator.walk_stmt(body);
        }
        expr_type.extend(annotator.expr_type);
    };

    annotate(GLOBAL_SCOPE, program.begin_blocks);
    annotate(GLOBAL_SCOPE, program.end_blocks);
    annotate(GLOBAL_SCOPE, &rule_bodies);
    for func in program.functions {
        annotate(func.name, core::slice::from_ref(&func.body));
    }

    TypeInfo {
        expr_type,
        var_type,
        numeric_loop_vars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use crate::ast::{AstArena, RulePattern};

    #[test]
    fn numeric_literal_assignment_infers_num() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let lit = arena.alloc_expr(ExprKind::NumLit(42.0));
        let ident = arena.alloc_expr(ExprKind::Ident("x"));
        let assign = arena.alloc_expr(ExprKind::AssignExpr(AssignOp::Assign, ident, lit));
        let stmt = arena.alloc_stmt(StmtKind::ExprStmt(assign));
        let begin_blocks = arena.alloc_slice(&[stmt]);
        let program = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let info = infer(&program);
        assert_eq!(info.var_ty(GLOBAL_SCOPE, "x"), Ty::Num);
        assert!(info.is_numeric(assign));
    }

    #[test]
    fn getline_target_forces_unknown() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let ident = arena.alloc_expr(ExprKind::Ident("line"));
        let getline = arena.alloc_expr(ExprKind::GetlineExpr {
            target: Some(ident),
            command: None,
            file: None,
        });
        let stmt = arena.alloc_stmt(StmtKind::ExprStmt(getline));
        let begin_blocks = arena.alloc_slice(&[stmt]);
        let program = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let info = infer(&program);
        assert_eq!(info.var_ty(GLOBAL_SCOPE, "line"), Ty::Unknown);
    }

    #[test]
    fn for_in_var_is_str() {
        let bump = Bump::new();
        let arena = AstArena::new(&bump);
        let body = arena.alloc_stmt(StmtKind::BlockStmt(&[]));
        let stmt = arena.alloc_stmt(StmtKind::ForInStmt {
            var: "k",
            array: "arr",
            body,
        });
        let begin_blocks = arena.alloc_slice(&[stmt]);
        let program = AstProgram {
            functions: &[],
            begin_blocks,
            end_blocks: &[],
            rules: &[],
        };
        let info = infer(&program);
        assert_eq!(info.var_ty(GLOBAL_SCOPE, "k"), Ty::Str);
    }

    #[test]
    fn unused_rule_pattern_is_not_a_dead_branch() {
        let _ = RulePattern::Always;
    }
}
