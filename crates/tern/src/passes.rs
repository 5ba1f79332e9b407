//! AST-level passes that run between parsing and type checking: the
//! top-level-decl-only rule and the pipe/hole argument rules.

use crate::{
    ast::{Arg, ArgKind, AstArena, BinaryOp, ExprId, ExprKind, StmtId, StmtKind},
    diag::{Bag, Code, Diagnostic},
    resolve::{
        resolve_program, NameResolveOptions, NameResolveResult, SymbolTable,
    },
    intern::Interner,
};

/// Options for the pass runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    pub name_resolve: NameResolveOptions,
}

/// Results of the pre-tyck pass pipeline.
pub struct PassResults {
    pub sym: SymbolTable,
    pub name_resolve: NameResolveResult,
}

/// Runs the program-level passes: top-level-decl-only, name resolution, and
/// the expression rules.
pub fn run_on_program(
    arena: &AstArena,
    root: StmtId,
    interner: &Interner,
    bag: &mut Bag,
    options: PassOptions,
) -> PassResults {
    check_top_level_decl_only(arena, root, bag);

    let (sym, name_resolve) = resolve_program(arena, root, interner, bag, options.name_resolve);

    let mut walker = ExprWalker { arena, bag };
    walker.on_stmt(root);

    PassResults { sym, name_resolve }
}

/// In program context only declarations and declaration-like statements are
/// allowed at the top level.
pub fn check_top_level_decl_only(arena: &AstArena, root: StmtId, bag: &mut Bag) {
    let StmtKind::Block { children } = arena.stmt(root).kind else {
        return;
    };
    for &sid in arena.stmt_children(children) {
        let stmt = arena.stmt(sid);
        let allowed = match stmt.kind {
            StmtKind::FnDecl(_)
            | StmtKind::FieldDecl { .. }
            | StmtKind::ActsDecl { .. }
            | StmtKind::Use(_)
            | StmtKind::Nest { .. }
            | StmtKind::Empty
            | StmtKind::Error => true,
            StmtKind::Var(v) => v.is_static,
            _ => false,
        };
        if !allowed {
            bag.add(Diagnostic::error(Code::TopLevelDeclOnly, stmt.span));
        }
    }
}

struct ExprWalker<'a> {
    arena: &'a AstArena,
    bag: &'a mut Bag,
}

impl ExprWalker<'_> {
    fn on_stmt(&mut self, sid: StmtId) {
        let stmt = self.arena.stmt(sid);
        match stmt.kind {
            StmtKind::Error | StmtKind::Empty | StmtKind::Continue => {}
            StmtKind::Expr { expr } => self.on_expr(expr),
            StmtKind::Block { children } => {
                for &child in self.arena.stmt_children(children) {
                    self.on_stmt(child);
                }
            }
            StmtKind::Var(v) => {
                if let Some(init) = v.init {
                    self.on_expr(init);
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.on_expr(cond);
                self.on_stmt(then_block);
                if let Some(e) = else_block {
                    self.on_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.on_expr(cond);
                self.on_stmt(body);
            }
            StmtKind::DoScope { body } | StmtKind::Manual { body } => self.on_stmt(body),
            StmtKind::DoWhile { body, cond } => {
                self.on_stmt(body);
                self.on_expr(cond);
            }
            StmtKind::Return { value } | StmtKind::Break { value } => {
                if let Some(v) = value {
                    self.on_expr(v);
                }
            }
            StmtKind::Switch {
                scrutinee, cases, ..
            } => {
                self.on_expr(scrutinee);
                for case in self.arena.switch_cases(cases) {
                    self.on_stmt(case.body);
                }
            }
            StmtKind::FnDecl(f) => {
                for p in self.arena.params(f.params) {
                    if let Some(d) = p.default_expr {
                        self.on_expr(d);
                    }
                }
                self.on_stmt(f.body);
            }
            StmtKind::FieldDecl { .. } | StmtKind::Use(_) => {}
            StmtKind::ActsDecl { children, .. } => {
                for &child in self.arena.stmt_children(children) {
                    self.on_stmt(child);
                }
            }
            StmtKind::Nest { body, .. } => {
                if let Some(b) = body {
                    self.on_stmt(b);
                }
            }
        }
    }

    fn on_expr(&mut self, eid: ExprId) {
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
            ExprKind::ArrayLit { args } => {
                for a in self.arena.args(args) {
                    if let Some(e) = a.expr {
                        self.on_expr(e);
                    }
                }
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Borrow { operand, .. }
            | ExprKind::Escape { operand }
            | ExprKind::PostfixInc { operand }
            | ExprKind::OptionalUnwrap { operand }
            | ExprKind::Cast { operand, .. } => self.on_expr(operand),
            ExprKind::Binary { op, lhs, rhs } => {
                if op == BinaryOp::Pipe {
                    self.check_pipe(lhs, rhs, eid);
                }
                self.on_expr(lhs);
                self.on_expr(rhs);
            }
            ExprKind::Assign { lhs, rhs, .. } => {
                self.on_expr(lhs);
                self.on_expr(rhs);
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                self.on_expr(cond);
                self.on_expr(then_expr);
                self.on_expr(else_expr);
            }
            ExprKind::Call { callee, args } => {
                self.on_expr(callee);
                self.walk_args(args);
            }
            ExprKind::Index { base, index } => {
                self.on_expr(base);
                self.on_expr(index);
            }
            ExprKind::FieldAccess { base, .. } => self.on_expr(base),
            ExprKind::Loop { iter, body, .. } => {
                if let Some(e) = iter {
                    self.on_expr(e);
                }
                self.on_stmt(body);
            }
        }
    }

    fn walk_args(&mut self, args: crate::ast::SliceRange) {
        for a in self.arena.args(args) {
            if let Some(e) = a.expr {
                self.on_expr(e);
            }
            for child in self.arena.args(a.children) {
                if let Some(e) = child.expr {
                    self.on_expr(e);
                }
            }
        }
    }

    /// Validates the right-hand side of `value << call(...)`:
    /// it must be a call carrying exactly one labeled hole, with no
    /// labeled/positional mixing and no positional holes.
    fn check_pipe(&mut self, _lhs: ExprId, rhs: ExprId, pipe: ExprId) {
        let pipe_span = self.arena.expr(pipe).span;
        let rhs_expr = self.arena.expr(rhs);
        let ExprKind::Call { args, .. } = rhs_expr.kind else {
            self.bag.add(Diagnostic::error(Code::PipeRhsMustBeCall, pipe_span));
            return;
        };

        let mut scan = PipeScan::default();
        self.scan_arg_list(self.arena.args(args), &mut scan);

        if scan.any_labeled && scan.any_positional {
            self.bag
                .add(Diagnostic::error(Code::CallArgMixNotAllowed, rhs_expr.span));
        }
        if scan.hole_count != 1 {
            self.bag.add(
                Diagnostic::error(Code::PipeHoleCountMismatch, rhs_expr.span)
                    .with_arg(scan.hole_count.to_string()),
            );
        }
    }

    fn scan_arg_list(&mut self, args: &[Arg], scan: &mut PipeScan) {
        for a in args {
            if a.kind == ArgKind::NamedGroup {
                // the group itself is a labeled construct
                scan.any_labeled = true;
                let children: Vec<Arg> = self.arena.args(a.children).to_vec();
                self.scan_arg_list(&children, scan);
                continue;
            }

            let labeled = a.kind == ArgKind::Labeled;
            scan.any_labeled |= labeled;
            scan.any_positional |= !labeled;

            if a.is_hole {
                scan.hole_count += 1;
                if !labeled {
                    self.bag
                        .add(Diagnostic::error(Code::PipeHoleMustBeLabeled, a.span));
                }
                continue;
            }

            // a bare `_` in expression position is a positional hole
            if let Some(e) = a.expr {
                if matches!(self.arena.expr(e).kind, ExprKind::Hole) {
                    self.bag.add(Diagnostic::error(
                        Code::PipeHolePositionalNotAllowed,
                        self.arena.expr(e).span,
                    ));
                }
            }
        }
    }
}

#[derive(Default)]
struct PipeScan {
    any_labeled: bool,
    any_positional: bool,
    hole_count: i64,
}

#[cfg(test)]
mod tests {
    use super::{run_on_program, PassOptions};
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
        run_on_program(&arena, root, &interner, &mut bag, PassOptions::default());
        bag
    }

    #[test]
    fn top_level_expression_statement_is_rejected() {
        let bag = run("fn f() -> i32 { return 0; } 1 + 2;");
        assert!(bag.has_code(Code::TopLevelDeclOnly));
    }

    #[test]
    fn static_var_is_allowed_at_top_level() {
        let bag = run("static let g: i32 = 1; fn f() -> i32 { return g; }");
        assert!(!bag.has_code(Code::TopLevelDeclOnly), "{:?}", bag.diags());
    }

    #[test]
    fn pipe_rhs_must_be_call() {
        let bag = run("fn f(x: i32) -> i32 { return x << 3; }");
        assert!(bag.has_code(Code::PipeRhsMustBeCall));
    }

    #[test]
    fn pipe_call_needs_exactly_one_labeled_hole() {
        let bag = run("fn g(a: i32, b: i32) -> i32 { return a; } fn f(x: i32) -> i32 { return x << g(a: 1, b: 2); }");
        assert!(bag.has_code(Code::PipeHoleCountMismatch));

        let bag = run("fn g(a: i32, b: i32) -> i32 { return a; } fn f(x: i32) -> i32 { return x << g(a: _, b: _); }");
        assert!(bag.has_code(Code::PipeHoleCountMismatch));

        let bag = run("fn g(a: i32, b: i32) -> i32 { return a; } fn f(x: i32) -> i32 { return x << g(a: _, b: 2); }");
        assert!(!bag.has_code(Code::PipeHoleCountMismatch), "{:?}", bag.diags());
    }

    #[test]
    fn positional_hole_in_pipe_call_is_rejected() {
        let bag = run("fn g(a: i32) -> i32 { return a; } fn f(x: i32) -> i32 { return x << g(_); }");
        assert!(bag.has_code(Code::PipeHolePositionalNotAllowed));
    }
}
