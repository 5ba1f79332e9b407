//! AST-level capability surface checks for `&`, `&mut`, and `&&`.
//!
//! These are the cheap syntactic rules; the precise per-symbol state machine
//! runs later over SIR. Here we require borrow/escape operands to be places,
//! forbid `&&(&x)` forms, and flag escapes of obvious temporaries.

use crate::{
    ast::{AstArena, BinaryOp, ExprId, ExprKind, StmtId, StmtKind},
    diag::{Bag, Code, Diagnostic},
};

/// Result summary of the surface pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityCheckResult {
    pub ok: bool,
    pub error_count: u32,
}

pub fn run_capability_check(arena: &AstArena, root: StmtId, bag: &mut Bag) -> CapabilityCheckResult {
    let before = bag.error_count();
    let mut checker = SurfaceChecker { arena, bag };
    checker.walk_stmt(root);
    let error_count = bag.error_count() - before;
    CapabilityCheckResult {
        ok: error_count == 0,
        error_count,
    }
}

struct SurfaceChecker<'a> {
    arena: &'a AstArena,
    bag: &'a mut Bag,
}

impl SurfaceChecker<'_> {
    fn is_place(&self, eid: ExprId) -> bool {
        let expr = self.arena.expr(eid);
        match expr.kind {
            ExprKind::Ident { .. } => true,
            ExprKind::Index { base, index } => {
                if matches!(
                    self.arena.expr(index).kind,
                    ExprKind::Binary {
                        op: BinaryOp::Range | BinaryOp::RangeInclusive,
                        ..
                    }
                ) {
                    return false;
                }
                self.is_place(base)
            }
            ExprKind::FieldAccess { base, .. } => self.is_place(base),
            _ => false,
        }
    }

    fn is_temporary(&self, eid: ExprId) -> bool {
        matches!(
            self.arena.expr(eid).kind,
            ExprKind::IntLit { .. }
                | ExprKind::FloatLit { .. }
                | ExprKind::StringLit { .. }
                | ExprKind::CharLit { .. }
                | ExprKind::BoolLit { .. }
                | ExprKind::NullLit
                | ExprKind::ArrayLit { .. }
                | ExprKind::Call { .. }
                | ExprKind::Binary { .. }
                | ExprKind::Ternary { .. }
        )
    }

    fn check_borrow(&mut self, operand: ExprId, span: crate::span::Span) {
        if !self.is_place(operand) {
            self.bag
                .add(Diagnostic::error(Code::BorrowOperandMustBePlace, span));
        }
    }

    fn check_escape(&mut self, operand: ExprId, span: crate::span::Span) {
        // `&&(&x)` forms are rejected before the generic place rule so the
        // diagnostic names the actual problem
        if matches!(self.arena.expr(operand).kind, ExprKind::Borrow { .. }) {
            self.bag
                .add(Diagnostic::error(Code::EscapeOperandMustNotBeBorrow, span));
            return;
        }
        if !self.is_place(operand) {
            let code = if self.is_temporary(operand) {
                Code::EscapeOfTemporary
            } else {
                Code::EscapeOperandMustBePlace
            };
            self.bag.add(Diagnostic::error(code, span));
        }
    }

    fn walk_stmt(&mut self, sid: StmtId) {
        let stmt = self.arena.stmt(sid);
        match stmt.kind {
            StmtKind::Error | StmtKind::Empty | StmtKind::Continue => {}
            StmtKind::Expr { expr } => self.walk_expr(expr),
            StmtKind::Block { children } => {
                for &child in self.arena.stmt_children(children) {
                    self.walk_stmt(child);
                }
            }
            StmtKind::Var(v) => {
                if let Some(init) = v.init {
                    self.walk_expr(init);
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.walk_expr(cond);
                self.walk_stmt(then_block);
                if let Some(e) = else_block {
                    self.walk_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond);
                self.walk_stmt(body);
            }
            StmtKind::DoScope { body } | StmtKind::Manual { body } => self.walk_stmt(body),
            StmtKind::DoWhile { body, cond } => {
                self.walk_stmt(body);
                self.walk_expr(cond);
            }
            StmtKind::Return { value } | StmtKind::Break { value } => {
                if let Some(v) = value {
                    self.walk_expr(v);
                }
            }
            StmtKind::Switch {
                scrutinee, cases, ..
            } => {
                self.walk_expr(scrutinee);
                for case in self.arena.switch_cases(cases) {
                    self.walk_stmt(case.body);
                }
            }
            StmtKind::FnDecl(f) => {
                for p in self.arena.params(f.params) {
                    if let Some(d) = p.default_expr {
                        self.walk_expr(d);
                    }
                }
                self.walk_stmt(f.body);
            }
            StmtKind::FieldDecl { .. } | StmtKind::Use(_) => {}
            StmtKind::ActsDecl { children, .. } => {
                for &child in self.arena.stmt_children(children) {
                    self.walk_stmt(child);
                }
            }
            StmtKind::Nest { body, .. } => {
                if let Some(b) = body {
                    self.walk_stmt(b);
                }
            }
        }
    }

    fn walk_expr(&mut self, eid: ExprId) {
        let expr = self.arena.expr(eid);
        match expr.kind {
            ExprKind::Error
            | ExprKind::IntLit { .. }
            | ExprKind::FloatLit { .. }
            | ExprKind::StringLit { .. }
            | ExprKind::CharLit { .. }
            | ExprKind::BoolLit { .. }
            | ExprKind::NullLit
            | ExprKind::Ident { .. }
            | ExprKind::Hole => {}
            ExprKind::Borrow { operand, .. } => {
                self.check_borrow(operand, expr.span);
                self.walk_expr(operand);
            }
            ExprKind::Escape { operand } => {
                self.check_escape(operand, expr.span);
                self.walk_expr(operand);
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::PostfixInc { operand }
            | ExprKind::OptionalUnwrap { operand }
            | ExprKind::Cast { operand, .. } => self.walk_expr(operand),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.walk_expr(cond);
                self.walk_expr(then_expr);
                self.walk_expr(else_expr);
            }
            ExprKind::ArrayLit { args } => {
                for a in self.arena.args(args) {
                    if let Some(e) = a.expr {
                        self.walk_expr(e);
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                self.walk_expr(callee);
                for a in self.arena.args(args) {
                    if let Some(e) = a.expr {
                        self.walk_expr(e);
                    }
                    for child in self.arena.args(a.children) {
                        if let Some(e) = child.expr {
                            self.walk_expr(e);
                        }
                    }
                }
            }
            ExprKind::Index { base, index } => {
                self.walk_expr(base);
                self.walk_expr(index);
            }
            ExprKind::FieldAccess { base, .. } => self.walk_expr(base),
            ExprKind::Loop { iter, body, .. } => {
                if let Some(e) = iter {
                    self.walk_expr(e);
                }
                self.walk_stmt(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::run_capability_check;
    use crate::{
        ast::AstArena,
        diag::{Bag, Code},
        intern::Interner,
        lex::Lexer,
        parse::{Parser, MAX_PARSE_ERRORS},
        types::TypePool,
    };

    fn run(src: &str) -> Bag {
        let mut bag = Bag::new();
        let tokens = Lexer::new(src, 0, &mut bag).lex_all();
        let mut arena = AstArena::new();
        let mut types = TypePool::new();
        let mut interner = Interner::new();
        let root = Parser::new(
            &tokens,
            src,
            &mut arena,
            &mut types,
            &mut interner,
            &mut bag,
            MAX_PARSE_ERRORS,
        )
        .parse_program();
        run_capability_check(&arena, root, &mut bag);
        bag
    }

    #[test]
    fn borrow_of_place_passes() {
        let bag = run("fn f() -> i32 { let x: i32 = 1; let b: &i32 = &x; return x; }");
        assert!(!bag.has_code(Code::BorrowOperandMustBePlace), "{:?}", bag.diags());
    }

    #[test]
    fn borrow_of_non_place_is_rejected() {
        let bag = run("fn f() -> i32 { let b: &i32 = &(1 + 2); return 0; }");
        assert!(bag.has_code(Code::BorrowOperandMustBePlace));
    }

    #[test]
    fn escape_of_temporary_is_flagged() {
        let bag = run("fn f() -> &&i32 { return &&g(); }");
        assert!(bag.has_code(Code::EscapeOfTemporary));
    }

    #[test]
    fn escape_of_index_place_is_allowed_here() {
        let bag = run("static let mut g: i32[3] = [1, 2, 3]; fn f() -> &&i32 { return &&g[0]; }");
        assert!(!bag.has_code(Code::EscapeOperandMustBePlace), "{:?}", bag.diags());
    }
}
