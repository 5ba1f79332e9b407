//! Bidirectional type checking with deferred integer inference.
//!
//! Every expression is checked in a Value or Discard slot and receives an
//! entry in `expr_types`. Unsuffixed integer literals start as the internal
//! `{integer}` pseudo-type carrying an arbitrary-precision value; the first
//! context that demands a concrete integer type backpatches them, with the
//! literal's value range-checked against the target. The `Error` type is an
//! annihilator: once an operand is `Error`, no further diagnostics are
//! produced for the same expression.

use ahash::AHashMap;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::{
    ast::{
        Arg, ArgKind, AssignOp, AstArena, BinaryOp, CasePattern, CastKind, ExprId, ExprKind,
        FnDecl, SliceRange, StmtId, StmtKind, UnaryOp, UseDecl, VarDecl,
    },
    diag::{Bag, Code, Diagnostic},
    intern::{Interner, StrId},
    resolve::{BindingKind, NameResolveResult, SymbolId, SymbolTable},
    span::Span,
    types::{Builtin, TypeId, TypeKind, TypePool},
};

/// Checker policy switches.
#[derive(Debug, Clone, Copy)]
pub struct TyckOptions {
    /// Allow `T -> T?` implicit promotion in assignability. Off by default.
    pub implicit_optional_promotion: bool,
}

impl Default for TyckOptions {
    fn default() -> Self {
        Self {
            implicit_optional_promotion: false,
        }
    }
}

/// A deferred integer literal: its exact value and, once context fixes one,
/// the resolved concrete type.
#[derive(Debug, Clone)]
pub struct PendingInt {
    pub value: BigInt,
    pub resolved: Option<TypeId>,
}

/// One function signature as seen by call checking.
#[derive(Debug, Clone)]
pub struct FnSig {
    pub params: Vec<FnSigParam>,
    pub positional_count: usize,
    pub ret: TypeId,
    pub sig_type: TypeId,
}

#[derive(Debug, Clone, Copy)]
pub struct FnSigParam {
    pub name: StrId,
    pub ty: TypeId,
    pub has_default: bool,
}

/// Output of the type checker.
#[derive(Debug, Clone, Default)]
pub struct TyckResult {
    pub ok: bool,
    /// Result type per `ExprId` index.
    pub expr_types: Vec<TypeId>,
    /// Deferred-integer entries by origin symbol.
    pub pending_int_sym: AHashMap<u32, PendingInt>,
    /// Deferred-integer entries by expression.
    pub pending_int_expr: AHashMap<u32, PendingInt>,
    /// Signatures by function symbol.
    pub fn_sigs: AHashMap<u32, FnSig>,
}

impl TyckResult {
    #[must_use]
    pub fn expr_type(&self, id: ExprId) -> TypeId {
        self.expr_types[id.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Value,
    Discard,
}

#[derive(Debug, Clone, Default)]
struct LoopCtx {
    has_value_break: bool,
    has_null_break: bool,
    may_natural_end: bool,
    joined_value: Option<TypeId>,
}

struct FnCtx {
    declared_ret: Option<TypeId>,
    collected_returns: Vec<(TypeId, Span)>,
    saw_bare_return: bool,
}

/// Checks a program root. The symbol table is updated in place (set
/// inference and deferred-integer confirmation write back declared types).
pub fn check_program(
    arena: &AstArena,
    root: StmtId,
    types: &mut TypePool,
    sym: &mut SymbolTable,
    nres: &NameResolveResult,
    interner: &Interner,
    bag: &mut Bag,
    options: TyckOptions,
) -> TyckResult {
    let error = types.error();
    let start_errors = bag.error_count();
    let mut checker = Checker {
        arena,
        types,
        sym,
        nres,
        interner,
        bag,
        options,
        result: TyckResult {
            ok: true,
            expr_types: vec![error; arena.expr_count()],
            ..TyckResult::default()
        },
        field_members: AHashMap::new(),
        pending_sym_init: AHashMap::new(),
        loop_stack: Vec::new(),
        stmt_loop_depth: 0,
        fn_ctx: None,
        start_error_count: start_errors,
    };
    checker.collect_top_level(root);
    checker.check_top_level(root);
    checker.result.ok = checker.bag.error_count() == checker.start_error_count;
    checker.result
}

struct Checker<'a> {
    arena: &'a AstArena,
    types: &'a mut TypePool,
    sym: &'a mut SymbolTable,
    nres: &'a NameResolveResult,
    interner: &'a Interner,
    bag: &'a mut Bag,
    options: TyckOptions,
    result: TyckResult,
    /// `field` member tables keyed by the declared type name.
    field_members: AHashMap<StrId, Vec<(StrId, TypeId)>>,
    /// Back-link from a literal-backed symbol to its initializer, so a
    /// symbol-level resolution retypes the stored literal too.
    pending_sym_init: AHashMap<u32, u32>,
    loop_stack: Vec<LoopCtx>,
    stmt_loop_depth: u32,
    fn_ctx: Option<FnCtx>,
    start_error_count: u32,
}

impl Checker<'_> {
    fn err(&self, code: Code, span: Span) -> Diagnostic {
        let _ = self;
        Diagnostic::error(code, span)
    }

    fn report(&mut self, d: Diagnostic) {
        if !self.bag.has_at(d.code(), d.span()) {
            self.bag.add(d);
        }
    }

    fn type_name(&self, t: TypeId) -> String {
        self.types.to_string(t, self.interner)
    }

    fn is_error(&self, t: TypeId) -> bool {
        self.types.is_error(t)
    }

    fn set_type(&mut self, eid: ExprId, t: TypeId) -> TypeId {
        self.result.expr_types[eid.index()] = t;
        t
    }

    // ---- pass 1: top-level signatures ----

    fn collect_top_level(&mut self, root: StmtId) {
        let StmtKind::Block { children } = self.arena.stmt(root).kind else {
            return;
        };
        for &sid in self.arena.stmt_children(children) {
            self.collect_top_item(sid);
        }
    }

    fn collect_top_item(&mut self, sid: StmtId) {
        let stmt = self.arena.stmt(sid);
        match stmt.kind {
            StmtKind::FnDecl(f) => self.collect_fn_sig(sid, &f),
            StmtKind::FieldDecl { name, members, .. } => {
                let table: Vec<(StrId, TypeId)> = self
                    .arena
                    .field_members(members)
                    .iter()
                    .map(|m| (m.name, m.ty))
                    .collect();
                for (_, ty) in &table {
                    self.validate_type(*ty, stmt.span);
                }
                self.field_members.insert(name, table);
            }
            StmtKind::ActsDecl { children, .. } => {
                for &child in self.arena.stmt_children(children) {
                    self.collect_top_item(child);
                }
            }
            StmtKind::Nest { body: Some(body), .. } => {
                if let StmtKind::Block { children } = self.arena.stmt(body).kind {
                    for &child in self.arena.stmt_children(children) {
                        self.collect_top_item(child);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_fn_sig(&mut self, sid: StmtId, f: &FnDecl) {
        let Some(binding) = self.nres.stmt_binding(sid) else {
            return;
        };
        let fn_sym = binding.sym;

        let params: Vec<FnSigParam> = self
            .arena
            .params(f.params)
            .iter()
            .map(|p| FnSigParam {
                name: p.name,
                ty: p.ty,
                has_default: p.default_expr.is_some(),
            })
            .collect();
        for p in self.arena.params(f.params) {
            self.validate_type(p.ty, p.span);
        }
        if let Some(ret) = f.ret {
            self.validate_type(ret, self.arena.stmt(sid).span);
        }

        let ret = f.ret.unwrap_or_else(|| self.types.builtin(Builtin::Unit));
        let param_types: Vec<TypeId> = params.iter().map(|p| p.ty).collect();
        let sig_type = self.types.make_fn(ret, &param_types);
        self.sym.update_declared_type(fn_sym, sig_type);

        self.result.fn_sigs.insert(
            fn_sym.index() as u32,
            FnSig {
                params,
                positional_count: f.positional_param_count as usize,
                ret,
                sig_type,
            },
        );
    }

    /// Rejects `T??` and `&&&&T` shapes at the checker boundary.
    fn validate_type(&mut self, ty: TypeId, span: Span) {
        match self.types.kind(ty) {
            TypeKind::Optional(elem) => {
                if self.types.optional_elem(elem).is_some() {
                    let d = self.err(Code::NestedOptionalNotAllowed, span);
                    self.report(d);
                }
                self.validate_type(elem, span);
            }
            TypeKind::Escape(elem) => {
                if matches!(self.types.kind(elem), TypeKind::Escape(_)) {
                    let d = self.err(Code::NestedEscapeNotAllowed, span);
                    self.report(d);
                }
                self.validate_type(elem, span);
            }
            TypeKind::Array { elem, .. } | TypeKind::Borrow { elem, .. } | TypeKind::Ptr { elem, .. } => {
                self.validate_type(elem, span);
            }
            _ => {}
        }
    }

    // ---- pass 2 ----

    fn check_top_level(&mut self, root: StmtId) {
        let StmtKind::Block { children } = self.arena.stmt(root).kind else {
            return;
        };
        for sid in self.arena.stmt_children(children).to_vec() {
            self.check_top_item(sid);
        }
    }

    fn check_top_item(&mut self, sid: StmtId) {
        let stmt = *self.arena.stmt(sid);
        match stmt.kind {
            StmtKind::FnDecl(f) => self.check_fn_body(sid, &f),
            StmtKind::Var(v) if v.is_static => self.check_var_stmt(sid, &v, stmt.span),
            StmtKind::ActsDecl { children, .. } => {
                for child in self.arena.stmt_children(children).to_vec() {
                    self.check_top_item(child);
                }
            }
            StmtKind::Nest { body: Some(body), .. } => {
                if let StmtKind::Block { children } = self.arena.stmt(body).kind {
                    for child in self.arena.stmt_children(children).to_vec() {
                        self.check_top_item(child);
                    }
                }
            }
            StmtKind::Use(UseDecl::TypeAlias { ty, .. }) => self.validate_type(ty, stmt.span),
            _ => {}
        }
    }

    fn check_fn_body(&mut self, sid: StmtId, f: &FnDecl) {
        self.fn_ctx = Some(FnCtx {
            declared_ret: f.ret,
            collected_returns: Vec::new(),
            saw_bare_return: false,
        });

        for p in self.arena.params(f.params).to_vec() {
            if let Some(default) = p.default_expr {
                let t = self.check_expr(default, Slot::Value);
                self.coerce(default, t, p.ty, self.arena.expr(default).span);
            }
        }

        self.check_stmt(f.body);

        let ctx = self.fn_ctx.take().expect("fn ctx");
        if ctx.declared_ret.is_none() && !ctx.collected_returns.is_empty() {
            // infer a single return type; mismatching paths are a unify error
            let mut acc = ctx.collected_returns[0].0;
            for &(t, span) in &ctx.collected_returns[1..] {
                acc = self.unify(acc, t, span);
            }
            if ctx.saw_bare_return && !self.is_error(acc) {
                let unit = self.types.builtin(Builtin::Unit);
                if acc != unit {
                    let span = self.arena.stmt(sid).span;
                    let d = self
                        .err(Code::ReturnTypeMismatch, span)
                        .with_arg(self.type_name(acc))
                        .with_arg("unit");
                    self.report(d);
                }
            }
        }

        self.flush_unresolved_integers();
    }

    /// Reports any integer literal that reached the end of its function
    /// without a concrete type.
    fn flush_unresolved_integers(&mut self) {
        let infer = self.types.builtin(Builtin::InferInteger);
        let mut spans: Vec<(Span, String)> = Vec::new();
        for (eid, pending) in &self.result.pending_int_expr {
            if pending.resolved.is_none() {
                let idx = *eid as usize;
                if self.result.expr_types[idx] == infer {
                    let span = self.arena.exprs()[idx].span;
                    spans.push((span, pending.value.to_string()));
                }
            }
        }
        spans.sort_by_key(|(s, _)| (s.lo, s.hi));
        for (span, value) in spans {
            let d = self.err(Code::UnresolvedInferInteger, span).with_arg(value);
            self.report(d);
        }
    }

    // ---- statements ----

    fn check_stmt(&mut self, sid: StmtId) {
        let stmt = *self.arena.stmt(sid);
        match stmt.kind {
            StmtKind::Error | StmtKind::Empty | StmtKind::Continue => {
                if matches!(stmt.kind, StmtKind::Continue)
                    && self.loop_stack.is_empty()
                    && self.stmt_loop_depth == 0
                {
                    let d = self.err(Code::ContinueOutsideLoop, stmt.span);
                    self.report(d);
                }
            }
            StmtKind::Expr { expr } => {
                self.check_expr(expr, Slot::Discard);
            }
            StmtKind::Block { children } => {
                for child in self.arena.stmt_children(children).to_vec() {
                    self.check_stmt(child);
                }
            }
            StmtKind::Var(v) => self.check_var_stmt(sid, &v, stmt.span),
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.check_cond(cond);
                self.check_stmt(then_block);
                if let Some(e) = else_block {
                    self.check_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_cond(cond);
                self.stmt_loop_depth += 1;
                self.check_stmt(body);
                self.stmt_loop_depth -= 1;
            }
            StmtKind::DoScope { body } | StmtKind::Manual { body } => self.check_stmt(body),
            StmtKind::DoWhile { body, cond } => {
                self.stmt_loop_depth += 1;
                self.check_stmt(body);
                self.stmt_loop_depth -= 1;
                self.check_cond(cond);
            }
            StmtKind::Return { value } => self.check_return(value, stmt.span),
            StmtKind::Break { value } => self.check_break(value, stmt.span),
            StmtKind::Switch {
                scrutinee, cases, ..
            } => {
                let scrut_t = self.check_expr(scrutinee, Slot::Value);
                for case in self.arena.switch_cases(cases).to_vec() {
                    self.check_case_pattern(&case.pattern, scrut_t, case.span);
                    self.check_stmt(case.body);
                }
            }
            StmtKind::FnDecl(f) => {
                // nested function declarations check like top-level ones
                self.collect_fn_sig(sid, &f);
                let saved_loops = std::mem::take(&mut self.loop_stack);
                let saved_depth = std::mem::replace(&mut self.stmt_loop_depth, 0);
                let saved_ctx = self.fn_ctx.take();
                self.check_fn_body(sid, &f);
                self.fn_ctx = saved_ctx;
                self.loop_stack = saved_loops;
                self.stmt_loop_depth = saved_depth;
            }
            StmtKind::FieldDecl { .. } | StmtKind::Use(_) | StmtKind::Nest { .. } => {}
            StmtKind::ActsDecl { children, .. } => {
                for child in self.arena.stmt_children(children).to_vec() {
                    self.check_stmt(child);
                }
            }
        }
    }

    fn check_var_stmt(&mut self, sid: StmtId, v: &VarDecl, span: Span) {
        if let Some(ty) = v.ty {
            self.validate_type(ty, span);
        }

        let init_t = v.init.map(|init| (init, self.check_expr(init, Slot::Value)));

        let declared = match (v.ty, init_t) {
            (Some(annot), Some((init, got))) => {
                self.coerce(init, got, annot, self.arena.expr(init).span);
                annot
            }
            (Some(annot), None) => annot,
            (None, Some((_, got))) => got,
            (None, None) => self.types.builtin(Builtin::Unit),
        };

        if let Some(binding) = self.nres.stmt_binding(sid) {
            let sym_id = binding.sym;
            self.sym.update_declared_type(sym_id, declared);

            // a literal-backed init keeps its value available for later
            // backpatching through the symbol
            if self.types.is_builtin(declared, Builtin::InferInteger) {
                if let Some((init, _)) = init_t {
                    if let Some(value) = self.literal_int_value(init) {
                        self.result.pending_int_sym.insert(
                            sym_id.index() as u32,
                            PendingInt {
                                value,
                                resolved: None,
                            },
                        );
                        self.pending_sym_init
                            .insert(sym_id.index() as u32, init.index() as u32);
                    }
                }
            }
        }
    }

    fn check_cond(&mut self, cond: ExprId) {
        let t = self.check_expr(cond, Slot::Value);
        let bool_t = self.types.builtin(Builtin::Bool);
        if !self.is_error(t) && t != bool_t {
            let d = self
                .err(Code::CondMustBeBool, self.arena.expr(cond).span)
                .with_arg(self.type_name(t));
            self.report(d);
        }
    }

    fn check_return(&mut self, value: Option<ExprId>, span: Span) {
        let unit = self.types.builtin(Builtin::Unit);
        let got = match value {
            Some(e) => {
                let t = self.check_expr(e, Slot::Value);
                (Some(e), t)
            }
            None => (None, unit),
        };

        let Some(ctx) = self.fn_ctx.as_mut() else {
            return;
        };
        if got.0.is_none() {
            ctx.saw_bare_return = true;
        }
        let declared = ctx.declared_ret;
        ctx.collected_returns.push((got.1, span));

        if let Some(want) = declared {
            match got.0 {
                Some(e) => {
                    if !self.coerce(e, got.1, want, span) {
                        let d = self
                            .err(Code::ReturnTypeMismatch, span)
                            .with_arg(self.type_name(got.1))
                            .with_arg(self.type_name(want));
                        self.report(d);
                    }
                }
                None => {
                    if want != unit && !self.is_error(want) {
                        let d = self
                            .err(Code::ReturnTypeMismatch, span)
                            .with_arg("unit")
                            .with_arg(self.type_name(want));
                        self.report(d);
                    }
                }
            }
        }
    }

    fn check_break(&mut self, value: Option<ExprId>, span: Span) {
        let t = value.map(|e| self.check_expr(e, Slot::Value));

        if self.loop_stack.is_empty() && self.stmt_loop_depth == 0 {
            let d = self.err(Code::BreakOutsideLoop, span);
            self.report(d);
            return;
        }

        match t {
            Some(ty) => {
                let prev = self.loop_stack.last().and_then(|c| c.joined_value);
                let joined = match prev {
                    None => ty,
                    Some(acc) => match self.unify_quiet(acc, ty) {
                        Some(j) => j,
                        None => {
                            let d = self
                                .err(Code::CannotUnify, span)
                                .with_arg(self.type_name(acc))
                                .with_arg(self.type_name(ty));
                            self.report(d);
                            self.types.error()
                        }
                    },
                };
                if let Some(ctx) = self.loop_stack.last_mut() {
                    ctx.has_value_break = true;
                    ctx.joined_value = Some(joined);
                }
            }
            None => {
                if let Some(ctx) = self.loop_stack.last_mut() {
                    ctx.has_null_break = true;
                }
            }
        }
    }

    fn check_case_pattern(&mut self, pattern: &CasePattern, scrut_t: TypeId, span: Span) {
        if self.is_error(scrut_t) {
            return;
        }
        let ok = match pattern {
            CasePattern::Error | CasePattern::Ident(_) => true,
            CasePattern::Int(text) => {
                let b = self.types.as_builtin(scrut_t);
                if let Some(b) = b {
                    if let Some((bits, signed)) = b.int_bits() {
                        let lex = self.interner.resolve(*text);
                        if let Some((value, _)) = parse_int_lexeme(lex) {
                            if !int_fits(&value, bits, signed) {
                                let d = self
                                    .err(Code::IntLiteralOutOfRange, span)
                                    .with_arg(value.to_string())
                                    .with_arg(b.name());
                                self.report(d);
                            }
                        }
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            CasePattern::Char(_) => self.types.is_builtin(scrut_t, Builtin::Char),
            CasePattern::Str(_) => self.types.is_builtin(scrut_t, Builtin::Text),
            CasePattern::Bool(_) => self.types.is_builtin(scrut_t, Builtin::Bool),
            CasePattern::Null => self.types.optional_elem(scrut_t).is_some(),
        };
        if !ok {
            let d = self
                .err(Code::TypeMismatch, span)
                .with_arg(self.type_name(scrut_t));
            self.report(d);
        }
    }

    // ---- expressions ----

    fn check_expr(&mut self, eid: ExprId, slot: Slot) -> TypeId {
        let expr = *self.arena.expr(eid);
        let t = match expr.kind {
            ExprKind::Error | ExprKind::Hole => self.types.error(),
            ExprKind::IntLit { text } => self.check_int_lit(eid, text, expr.span),
            ExprKind::FloatLit { text } => self.check_float_lit(text),
            ExprKind::StringLit { .. } => self.types.builtin(Builtin::Text),
            ExprKind::CharLit { .. } => self.types.builtin(Builtin::Char),
            ExprKind::BoolLit { .. } => self.types.builtin(Builtin::Bool),
            ExprKind::NullLit => self.types.builtin(Builtin::Null),
            ExprKind::ArrayLit { args } => self.check_array_lit(args, expr.span),
            ExprKind::Ident { .. } => self.check_ident(eid, expr.span),
            ExprKind::Unary { op, operand } => self.check_unary(op, operand, expr.span),
            ExprKind::Borrow { is_mut, operand } => self.check_borrow(is_mut, operand, expr.span),
            ExprKind::Escape { operand } => self.check_escape(operand, expr.span),
            ExprKind::PostfixInc { operand } => self.check_postfix_inc(operand, expr.span),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(op, lhs, rhs, expr.span),
            ExprKind::Assign { op, lhs, rhs } => self.check_assign(op, lhs, rhs, expr.span),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.check_ternary(cond, then_expr, else_expr, expr.span, slot),
            ExprKind::Call { callee, args } => self.check_call(callee, args, expr.span, None),
            ExprKind::Index { base, index } => self.check_index(base, index, expr.span),
            ExprKind::FieldAccess { base, name } => self.check_field_access(base, name, expr.span),
            ExprKind::OptionalUnwrap { operand } => self.check_unwrap(operand, expr.span),
            ExprKind::Loop { var, iter, body } => {
                self.check_loop(eid, var, iter, body, expr.span, slot)
            }
            ExprKind::Cast { operand, cast, ty } => self.check_cast(operand, cast, ty, expr.span),
        };
        self.set_type(eid, t)
    }

    fn check_int_lit(&mut self, eid: ExprId, text: StrId, span: Span) -> TypeId {
        let lexeme = self.interner.resolve(text);
        let Some((value, suffix)) = parse_int_lexeme(lexeme) else {
            let d = self.err(Code::TypeMismatch, span).with_arg(lexeme);
            self.report(d);
            return self.types.error();
        };

        if let Some(sfx) = suffix {
            if let Some(b) = Builtin::from_name(&sfx) {
                if let Some((bits, signed)) = b.int_bits() {
                    if !int_fits(&value, bits, signed) {
                        let d = self
                            .err(Code::IntLiteralOutOfRange, span)
                            .with_arg(value.to_string())
                            .with_arg(b.name());
                        self.report(d);
                        return self.types.error();
                    }
                    return self.types.builtin(b);
                }
                if b.is_float() {
                    return self.types.builtin(b);
                }
            }
            let d = self.err(Code::TypeMismatch, span).with_arg(sfx);
            self.report(d);
            return self.types.error();
        }

        self.result.pending_int_expr.insert(
            eid.index() as u32,
            PendingInt {
                value,
                resolved: None,
            },
        );
        self.types.builtin(Builtin::InferInteger)
    }

    fn check_float_lit(&mut self, text: StrId) -> TypeId {
        let lexeme = self.interner.resolve(text);
        let suffix: String = lexeme
            .chars()
            .skip_while(|c| !c.is_ascii_alphabetic())
            .collect();
        if let Some(b) = Builtin::from_name(&suffix) {
            if b.is_float() {
                return self.types.builtin(b);
            }
        }
        self.types.builtin(Builtin::F64)
    }

    fn check_array_lit(&mut self, args: SliceRange, span: Span) -> TypeId {
        let elems: Vec<ExprId> = self
            .arena
            .args(args)
            .iter()
            .filter_map(|a| a.expr)
            .collect();
        if elems.is_empty() {
            let err = self.types.error();
            return self.types.make_array(err, Some(0));
        }

        let mut elem_t = self.check_expr(elems[0], Slot::Value);
        for &e in &elems[1..] {
            let t = self.check_expr(e, Slot::Value);
            elem_t = self.unify(elem_t, t, self.arena.expr(e).span);
        }
        let _ = span;
        let len = u32::try_from(elems.len()).expect("array literal too long");
        self.types.make_array(elem_t, Some(len))
    }

    fn check_ident(&mut self, eid: ExprId, span: Span) -> TypeId {
        let Some(binding) = self.nres.expr_binding(eid) else {
            // unknown identifier was already reported by the resolver
            return self.types.error();
        };
        let _ = span;
        match binding.bind {
            BindingKind::LocalVar | BindingKind::Param => self
                .sym
                .symbol(binding.sym)
                .declared_type
                .unwrap_or_else(|| self.types.error()),
            BindingKind::Fn => self
                .sym
                .symbol(binding.sym)
                .declared_type
                .unwrap_or_else(|| self.types.error()),
            _ => self.types.error(),
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) -> TypeId {
        let t = self.check_expr(operand, Slot::Value);
        if self.is_error(t) {
            return t;
        }
        match op {
            UnaryOp::Plus | UnaryOp::Neg => {
                if self.is_numeric(t) {
                    t
                } else {
                    let d = self
                        .err(Code::TypeMismatch, span)
                        .with_arg(self.type_name(t));
                    self.report(d);
                    self.types.error()
                }
            }
            UnaryOp::Not => {
                let bool_t = self.types.builtin(Builtin::Bool);
                if t == bool_t {
                    bool_t
                } else {
                    let d = self
                        .err(Code::TypeMismatch, span)
                        .with_arg(self.type_name(t));
                    self.report(d);
                    self.types.error()
                }
            }
        }
    }

    fn check_borrow(&mut self, is_mut: bool, operand: ExprId, _span: Span) -> TypeId {
        // place discipline for borrow operands is the capability surface
        // pass's job; the checker only types the expression
        let t = self.check_expr(operand, Slot::Value);
        if self.is_error(t) {
            return t;
        }
        self.types.make_borrow(t, is_mut)
    }

    fn check_escape(&mut self, operand: ExprId, span: Span) -> TypeId {
        let t = self.check_expr(operand, Slot::Value);
        if self.is_error(t) {
            return t;
        }
        if matches!(self.types.kind(t), TypeKind::Escape(_)) {
            let d = self.err(Code::NestedEscapeNotAllowed, span);
            self.report(d);
            return self.types.error();
        }
        self.types.make_escape(t)
    }

    fn check_postfix_inc(&mut self, operand: ExprId, span: Span) -> TypeId {
        let t = self.check_expr(operand, Slot::Value);
        if !self.is_place_expr(operand) {
            let d = self.err(Code::NotAPlaceExpr, span);
            self.report(d);
            return self.types.error();
        }
        self.check_write_target(operand, span);
        if self.is_error(t) {
            return t;
        }
        if self.is_numeric(t) {
            // `x++` with a deferred-integer x pins it: increment demands a
            // concrete operand
            if self.types.is_builtin(t, Builtin::InferInteger) {
                let i32_t = self.types.builtin(Builtin::I32);
                self.resolve_infer_int(operand, i32_t);
                return i32_t;
            }
            t
        } else {
            let d = self
                .err(Code::TypeMismatch, span)
                .with_arg(self.type_name(t));
            self.report(d);
            self.types.error()
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: Span) -> TypeId {
        let lt = self.check_expr(lhs, Slot::Value);

        if op == BinaryOp::Pipe {
            return self.check_pipe(lt, rhs, span);
        }

        let rt = self.check_expr(rhs, Slot::Value);
        if self.is_error(lt) || self.is_error(rt) {
            return self.types.error();
        }

        let bool_t = self.types.builtin(Builtin::Bool);
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                self.join_numeric_operands(lhs, lt, rhs, rt, span)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                self.join_numeric_operands(lhs, lt, rhs, rt, span);
                bool_t
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if self.unify_quiet(lt, rt).is_none() {
                    let d = self
                        .err(Code::CannotUnify, span)
                        .with_arg(self.type_name(lt))
                        .with_arg(self.type_name(rt));
                    self.report(d);
                }
                self.pin_pair_against_each_other(lhs, lt, rhs, rt);
                bool_t
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                for (e, t) in [(lhs, lt), (rhs, rt)] {
                    if t != bool_t {
                        let d = self
                            .err(Code::TypeMismatch, self.arena.expr(e).span)
                            .with_arg(self.type_name(t));
                        self.report(d);
                    }
                }
                bool_t
            }
            BinaryOp::NullCoalesce => self.check_null_coalesce(lt, rt, rhs, span),
            BinaryOp::Range | BinaryOp::RangeInclusive => {
                // range payloads only appear as index subscripts
                for (e, t) in [(lhs, lt), (rhs, rt)] {
                    if !self.is_integer(t) {
                        let d = self
                            .err(Code::TypeMismatch, self.arena.expr(e).span)
                            .with_arg(self.type_name(t));
                        self.report(d);
                    } else if self.types.is_builtin(t, Builtin::InferInteger) {
                        let usize_t = self.types.builtin(Builtin::USize);
                        self.resolve_infer_int(e, usize_t);
                    }
                }
                self.types.builtin(Builtin::USize)
            }
            BinaryOp::Pipe => unreachable!("handled above"),
        }
    }

    /// Joins two numeric operands, backpatching deferred integers against a
    /// concrete partner.
    fn join_numeric_operands(
        &mut self,
        lhs: ExprId,
        lt: TypeId,
        rhs: ExprId,
        rt: TypeId,
        span: Span,
    ) -> TypeId {
        if !self.is_numeric(lt) || !self.is_numeric(rt) {
            let bad = if self.is_numeric(lt) { rt } else { lt };
            let d = self
                .err(Code::TypeMismatch, span)
                .with_arg(self.type_name(bad));
            self.report(d);
            return self.types.error();
        }

        self.pin_pair_against_each_other(lhs, lt, rhs, rt);
        let lt = self.result.expr_types[lhs.index()];
        let rt = self.result.expr_types[rhs.index()];

        if lt == rt {
            return lt;
        }
        let d = self
            .err(Code::CannotUnify, span)
            .with_arg(self.type_name(lt))
            .with_arg(self.type_name(rt));
        self.report(d);
        self.types.error()
    }

    /// When one side is `{integer}` and the other is concrete, resolve the
    /// deferred side in the concrete side's context.
    fn pin_pair_against_each_other(&mut self, lhs: ExprId, lt: TypeId, rhs: ExprId, rt: TypeId) {
        let infer = self.types.builtin(Builtin::InferInteger);
        if lt == infer && rt != infer && self.is_integer(rt) {
            self.resolve_infer_int(lhs, rt);
        } else if rt == infer && lt != infer && self.is_integer(lt) {
            self.resolve_infer_int(rhs, lt);
        }
    }

    fn check_null_coalesce(&mut self, lt: TypeId, rt: TypeId, rhs: ExprId, span: Span) -> TypeId {
        let Some(elem) = self.types.optional_elem(lt) else {
            let d = self
                .err(Code::TypeMismatch, span)
                .with_arg(self.type_name(lt));
            self.report(d);
            return self.types.error();
        };
        // `T? ?? T -> T`, `T? ?? T? -> T?`
        if rt == lt {
            return lt;
        }
        if self.coerce(rhs, rt, elem, span) {
            return elem;
        }
        let d = self
            .err(Code::CannotUnify, span)
            .with_arg(self.type_name(lt))
            .with_arg(self.type_name(rt));
        self.report(d);
        self.types.error()
    }

    fn check_pipe(&mut self, piped: TypeId, rhs: ExprId, span: Span) -> TypeId {
        let rhs_expr = *self.arena.expr(rhs);
        let ExprKind::Call { callee, args } = rhs_expr.kind else {
            let d = self.err(Code::PipeRhsMustBeCall, span);
            self.report(d);
            // still give the operand a type entry
            self.check_expr(rhs, Slot::Value);
            return self.types.error();
        };
        let t = self.check_call(callee, args, rhs_expr.span, Some(piped));
        self.set_type(rhs, t);
        t
    }

    fn check_assign(&mut self, op: AssignOp, lhs: ExprId, rhs: ExprId, span: Span) -> TypeId {
        let lt = self.check_expr(lhs, Slot::Value);
        let rt = self.check_expr(rhs, Slot::Value);

        if !self.is_place_expr(lhs) {
            let d = self.err(Code::NotAPlaceExpr, self.arena.expr(lhs).span);
            self.report(d);
            return self.types.error();
        }
        self.check_write_target(lhs, span);

        if self.is_error(lt) || self.is_error(rt) {
            return self.types.builtin(Builtin::Unit);
        }

        // write-through: assigning through `&mut T` targets the element
        let slot_t = match self.types.kind(lt) {
            TypeKind::Borrow { elem, is_mut: true } => elem,
            _ => lt,
        };

        match op {
            AssignOp::Assign => {
                if !self.coerce(rhs, rt, slot_t, span) {
                    let d = self
                        .err(Code::TypeMismatch, span)
                        .with_arg(self.type_name(rt))
                        .with_arg(self.type_name(slot_t));
                    self.report(d);
                }
            }
            AssignOp::NullCoalesce => {
                if self.types.optional_elem(slot_t).is_none() {
                    let d = self
                        .err(Code::TypeMismatch, span)
                        .with_arg(self.type_name(slot_t));
                    self.report(d);
                } else if !self.coerce(rhs, rt, slot_t, span) {
                    let elem = self.types.optional_elem(slot_t).expect("optional");
                    if !self.coerce(rhs, rt, elem, span) {
                        let d = self
                            .err(Code::TypeMismatch, span)
                            .with_arg(self.type_name(rt))
                            .with_arg(self.type_name(slot_t));
                        self.report(d);
                    }
                }
            }
            AssignOp::Add | AssignOp::Sub | AssignOp::Mul | AssignOp::Div | AssignOp::Rem => {
                if !self.is_numeric(slot_t) {
                    let d = self
                        .err(Code::TypeMismatch, span)
                        .with_arg(self.type_name(slot_t));
                    self.report(d);
                } else if !self.coerce(rhs, rt, slot_t, span) {
                    let d = self
                        .err(Code::TypeMismatch, span)
                        .with_arg(self.type_name(rt))
                        .with_arg(self.type_name(slot_t));
                    self.report(d);
                }
            }
        }

        self.types.builtin(Builtin::Unit)
    }

    /// Enforces the mutability rule for an assignment / `++` target.
    fn check_write_target(&mut self, lhs: ExprId, span: Span) {
        if self.write_through_mut_borrow(lhs) {
            return;
        }
        let Some(sym_id) = self.root_place_symbol(lhs) else {
            return;
        };
        if !self.sym.symbol(sym_id).is_mut {
            let name = self.interner.resolve(self.sym.symbol(sym_id).name).to_owned();
            let d = self.err(Code::WriteToImmutable, span).with_arg(name);
            self.report(d);
        }
    }

    /// True when the write target goes through a `&mut` borrow: either the
    /// target itself is a `&mut` local, or it is `base[i]` with `base` typed
    /// `&mut`.
    fn write_through_mut_borrow(&mut self, lhs: ExprId) -> bool {
        let expr = self.arena.expr(lhs);
        match expr.kind {
            ExprKind::Ident { .. } => {
                let t = self.result.expr_types[lhs.index()];
                self.types.is_mut_borrow(t)
            }
            ExprKind::Index { base, .. } => {
                let t = self.result.expr_types[base.index()];
                self.types.is_mut_borrow(t)
            }
            _ => false,
        }
    }

    fn check_ternary(
        &mut self,
        cond: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
        span: Span,
        _slot: Slot,
    ) -> TypeId {
        self.check_cond(cond);
        let tt = self.check_expr(then_expr, Slot::Value);
        let et = self.check_expr(else_expr, Slot::Value);
        self.pin_pair_against_each_other(then_expr, tt, else_expr, et);
        let tt = self.result.expr_types[then_expr.index()];
        let et = self.result.expr_types[else_expr.index()];
        self.unify(tt, et, span)
    }

    fn check_call(
        &mut self,
        callee: ExprId,
        args: SliceRange,
        span: Span,
        pipe_value: Option<TypeId>,
    ) -> TypeId {
        let callee_t = self.check_expr(callee, Slot::Value);

        // the common case: a direct call of a named function
        let sig = self
            .nres
            .expr_binding(callee)
            .filter(|b| b.bind == BindingKind::Fn)
            .and_then(|b| self.result.fn_sigs.get(&(b.sym.index() as u32)).cloned());

        let arg_list: Vec<Arg> = self.arena.args(args).to_vec();

        let Some(sig) = sig else {
            // indirect call through a fn-typed value
            if let TypeKind::Fn { ret, .. } = self.types.kind(callee_t) {
                let params = self.types.fn_params_of(callee_t).to_vec();
                self.check_positional_args(&arg_list, &params, span);
                return ret;
            }
            if !self.is_error(callee_t) {
                let d = self
                    .err(Code::NotCallable, span)
                    .with_arg(self.type_name(callee_t));
                self.report(d);
            } else {
                for a in &arg_list {
                    if let Some(e) = a.expr {
                        self.check_expr(e, Slot::Value);
                    }
                }
            }
            return self.types.error();
        };

        // flatten named-group children into the labeled view
        let mut flat: Vec<Arg> = Vec::with_capacity(arg_list.len());
        for a in &arg_list {
            if a.kind == ArgKind::NamedGroup {
                flat.extend(self.arena.args(a.children).iter().copied());
            } else {
                flat.push(*a);
            }
        }

        let any_labeled = flat.iter().any(|a| a.kind == ArgKind::Labeled);

        if any_labeled {
            let mut satisfied = vec![false; sig.params.len()];
            for a in &flat {
                let Some(label) = a.label else { continue };
                let Some(pos) = sig.params.iter().position(|p| p.name == label) else {
                    let d = self
                        .err(Code::CallUnknownLabel, a.span)
                        .with_arg(self.interner.resolve(label));
                    self.report(d);
                    if let Some(e) = a.expr {
                        self.check_expr(e, Slot::Value);
                    }
                    continue;
                };
                satisfied[pos] = true;
                let want = sig.params[pos].ty;
                if a.is_hole {
                    if let Some(piped) = pipe_value {
                        if !self.types_compatible(piped, want) {
                            let d = self
                                .err(Code::TypeMismatch, a.span)
                                .with_arg(self.type_name(piped))
                                .with_arg(self.type_name(want));
                            self.report(d);
                        }
                    }
                    continue;
                }
                if let Some(e) = a.expr {
                    let got = self.check_expr(e, Slot::Value);
                    if !self.coerce(e, got, want, a.span) {
                        let d = self
                            .err(Code::TypeMismatch, a.span)
                            .with_arg(self.type_name(got))
                            .with_arg(self.type_name(want));
                        self.report(d);
                    }
                }
            }
            for (i, p) in sig.params.iter().enumerate() {
                if !satisfied[i] && !p.has_default {
                    let d = self
                        .err(Code::CallArgCountMismatch, span)
                        .with_arg(self.interner.resolve(p.name));
                    self.report(d);
                }
            }
        } else {
            let params: Vec<TypeId> = sig
                .params
                .iter()
                .take(sig.positional_count)
                .map(|p| p.ty)
                .collect();
            self.check_positional_args(&flat, &params, span);
            // named-group params without defaults cannot be satisfied
            // positionally
            for p in sig.params.iter().skip(sig.positional_count) {
                if !p.has_default {
                    let d = self
                        .err(Code::CallArgCountMismatch, span)
                        .with_arg(self.interner.resolve(p.name));
                    self.report(d);
                }
            }
        }

        sig.ret
    }

    fn check_positional_args(&mut self, args: &[Arg], params: &[TypeId], span: Span) {
        if args.len() != params.len() {
            let d = self
                .err(Code::CallArgCountMismatch, span)
                .with_arg(args.len().to_string())
                .with_arg(params.len().to_string());
            self.report(d);
        }
        for (a, &want) in args.iter().zip(params.iter()) {
            if let Some(e) = a.expr {
                let got = self.check_expr(e, Slot::Value);
                if !self.coerce(e, got, want, a.span) {
                    let d = self
                        .err(Code::TypeMismatch, a.span)
                        .with_arg(self.type_name(got))
                        .with_arg(self.type_name(want));
                    self.report(d);
                }
            }
        }
        // type any surplus args so every expression has an entry
        for a in args.iter().skip(params.len()) {
            if let Some(e) = a.expr {
                self.check_expr(e, Slot::Value);
            }
        }
    }

    fn check_index(&mut self, base: ExprId, index: ExprId, span: Span) -> TypeId {
        let base_t = self.check_expr(base, Slot::Value);
        let index_t = self.check_expr(index, Slot::Value);

        // subscript must be an integer; deferred integers pin to usize
        if !self.is_error(index_t) {
            if self.types.is_builtin(index_t, Builtin::InferInteger) {
                let usize_t = self.types.builtin(Builtin::USize);
                self.resolve_infer_int(index, usize_t);
            } else if !self.is_integer(index_t) {
                let d = self
                    .err(Code::TypeMismatch, self.arena.expr(index).span)
                    .with_arg(self.type_name(index_t));
                self.report(d);
            }
        }

        if self.is_error(base_t) {
            return base_t;
        }

        // read through a borrow of an array
        let effective = match self.types.kind(base_t) {
            TypeKind::Borrow { elem, .. } => elem,
            _ => base_t,
        };

        let TypeKind::Array { elem, .. } = self.types.kind(effective) else {
            let d = self
                .err(Code::NotIndexable, span)
                .with_arg(self.type_name(base_t));
            self.report(d);
            return self.types.error();
        };

        // range subscripts produce unsized slices, not elements
        let idx_kind = self.arena.expr(index).kind;
        if matches!(
            idx_kind,
            ExprKind::Binary {
                op: BinaryOp::Range | BinaryOp::RangeInclusive,
                ..
            }
        ) {
            return self.types.make_array(elem, None);
        }

        elem
    }

    fn check_field_access(&mut self, base: ExprId, name: StrId, span: Span) -> TypeId {
        let base_t = self.check_expr(base, Slot::Value);
        if self.is_error(base_t) {
            return base_t;
        }

        let effective = match self.types.kind(base_t) {
            TypeKind::Borrow { elem, .. } => elem,
            _ => base_t,
        };

        if let TypeKind::NamedUser { .. } = self.types.kind(effective) {
            let path = self.types.path_of(effective);
            if path.len() == 1 {
                let type_name = path[0];
                if let Some(members) = self.field_members.get(&type_name) {
                    if let Some(&(_, ty)) = members.iter().find(|(n, _)| *n == name) {
                        return ty;
                    }
                }
            }
        }

        let d = self
            .err(Code::NoSuchMember, span)
            .with_arg(self.interner.resolve(name))
            .with_arg(self.type_name(base_t));
        self.report(d);
        self.types.error()
    }

    fn check_unwrap(&mut self, operand: ExprId, span: Span) -> TypeId {
        let t = self.check_expr(operand, Slot::Value);
        if self.is_error(t) {
            return t;
        }
        match self.types.optional_elem(t) {
            Some(elem) => elem,
            None => {
                let d = self
                    .err(Code::OptionalUnwrapOnNonOptional, span)
                    .with_arg(self.type_name(t));
                self.report(d);
                self.types.error()
            }
        }
    }

    fn check_loop(
        &mut self,
        eid: ExprId,
        var: Option<StrId>,
        iter: Option<ExprId>,
        body: StmtId,
        span: Span,
        slot: Slot,
    ) -> TypeId {
        let mut elem_t = None;
        if let Some(iter_e) = iter {
            let iter_t = self.check_expr(iter_e, Slot::Value);
            if !self.is_error(iter_t) {
                let effective = match self.types.kind(iter_t) {
                    TypeKind::Borrow { elem, .. } => elem,
                    _ => iter_t,
                };
                if let TypeKind::Array { elem, .. } = self.types.kind(effective) {
                    elem_t = Some(elem);
                } else {
                    let d = self
                        .err(Code::NotIndexable, self.arena.expr(iter_e).span)
                        .with_arg(self.type_name(iter_t));
                    self.report(d);
                }
            }
        }

        // type the loop variable through its binding on the loop expression
        if var.is_some() {
            if let Some(binding) = self.nres.expr_binding(eid) {
                let t = elem_t.unwrap_or_else(|| self.types.error());
                self.sym.update_declared_type(binding.sym, t);
            }
        }

        self.loop_stack.push(LoopCtx {
            may_natural_end: iter.is_some(),
            ..LoopCtx::default()
        });
        self.check_stmt(body);
        let ctx = self.loop_stack.pop().expect("loop ctx");

        let unit = self.types.builtin(Builtin::Unit);
        if slot == Slot::Discard && !ctx.has_value_break {
            return unit;
        }
        if !ctx.has_value_break {
            return unit;
        }

        let mut result = ctx.joined_value.unwrap_or(unit);
        // a natural iter end (or a bare `break`) injects null into the join
        if ctx.may_natural_end || ctx.has_null_break {
            let null_t = self.types.builtin(Builtin::Null);
            result = self.unify(result, null_t, span);
        }
        result
    }

    fn check_cast(&mut self, operand: ExprId, cast: CastKind, ty: TypeId, span: Span) -> TypeId {
        self.validate_type(ty, span);
        let src = self.check_expr(operand, Slot::Value);
        if self.is_error(src) || self.is_error(ty) {
            return self.types.error();
        }

        // integer literals take the cast target as their context
        if self.types.is_builtin(src, Builtin::InferInteger) && self.is_concrete_integer(ty) {
            self.resolve_infer_int(operand, ty);
        }
        let src = self.result.expr_types[operand.index()];

        if !self.cast_compatible(src, ty) {
            let d = self
                .err(Code::BadCast, span)
                .with_arg(self.type_name(src))
                .with_arg(self.type_name(ty));
            self.report(d);
            return self.types.error();
        }

        match cast {
            CastKind::As | CastKind::AsForce => ty,
            CastKind::AsOptional => {
                if self.types.optional_elem(ty).is_some() {
                    let d = self.err(Code::NestedOptionalNotAllowed, span);
                    self.report(d);
                    return self.types.error();
                }
                self.types.make_optional(ty)
            }
        }
    }

    // ---- helpers ----

    fn is_place_expr(&self, eid: ExprId) -> bool {
        let expr = self.arena.expr(eid);
        match expr.kind {
            ExprKind::Ident { .. } => self
                .nres
                .expr_binding(eid)
                .is_some_and(|b| matches!(b.bind, BindingKind::LocalVar | BindingKind::Param)),
            ExprKind::Index { base, index } => {
                // a range subscript is a slice, not a place
                if matches!(
                    self.arena.expr(index).kind,
                    ExprKind::Binary {
                        op: BinaryOp::Range | BinaryOp::RangeInclusive,
                        ..
                    }
                ) {
                    return false;
                }
                self.is_place_expr(base)
            }
            ExprKind::FieldAccess { base, .. } => self.is_place_expr(base),
            _ => false,
        }
    }

    fn root_place_symbol(&self, eid: ExprId) -> Option<SymbolId> {
        let expr = self.arena.expr(eid);
        match expr.kind {
            ExprKind::Ident { .. } => self.nres.expr_binding(eid).map(|b| b.sym),
            ExprKind::Index { base, .. } | ExprKind::FieldAccess { base, .. } => {
                self.root_place_symbol(base)
            }
            _ => None,
        }
    }

    fn is_numeric(&self, t: TypeId) -> bool {
        self.types
            .as_builtin(t)
            .is_some_and(|b| b.is_integer() || b.is_float())
    }

    fn is_integer(&self, t: TypeId) -> bool {
        self.types.as_builtin(t).is_some_and(Builtin::is_integer)
    }

    fn is_concrete_integer(&self, t: TypeId) -> bool {
        self.types
            .as_builtin(t)
            .is_some_and(|b| b.int_bits().is_some())
    }

    /// Assignability: exact match, `null -> T?`, optionally `T -> T?`, with
    /// `{integer}` literals resolved against concrete integer targets. Also
    /// drives the deferred-integer backpatch, hence the expression handle.
    fn coerce(&mut self, expr: ExprId, src: TypeId, dst: TypeId, span: Span) -> bool {
        let _ = span;
        if self.is_error(src) || self.is_error(dst) {
            return true;
        }
        if src == dst {
            return true;
        }

        let null_t = self.types.builtin(Builtin::Null);
        if src == null_t && self.types.optional_elem(dst).is_some() {
            return true;
        }

        if self.types.is_builtin(src, Builtin::InferInteger) && self.is_concrete_integer(dst) {
            return self.resolve_infer_int(expr, dst);
        }

        if let Some(elem) = self.types.optional_elem(dst) {
            if self.options.implicit_optional_promotion && src == elem {
                return true;
            }
            // a deferred integer may still match the optional's element
            if self.types.is_builtin(src, Builtin::InferInteger) && self.is_concrete_integer(elem) {
                return self.resolve_infer_int(expr, elem);
            }
        }

        // unsized arrays accept fixed-size arrays of the same element
        if let (
            TypeKind::Array { elem: de, size: None },
            TypeKind::Array { elem: se, size: Some(_) },
        ) = (self.types.kind(dst), self.types.kind(src))
        {
            if de == se {
                return true;
            }
        }

        false
    }

    /// `types_compatible` is `coerce` without a literal to backpatch.
    fn types_compatible(&mut self, src: TypeId, dst: TypeId) -> bool {
        if self.is_error(src) || self.is_error(dst) {
            return true;
        }
        if src == dst {
            return true;
        }
        let null_t = self.types.builtin(Builtin::Null);
        if src == null_t && self.types.optional_elem(dst).is_some() {
            return true;
        }
        if self.options.implicit_optional_promotion {
            if let Some(elem) = self.types.optional_elem(dst) {
                if src == elem {
                    return true;
                }
            }
        }
        false
    }

    /// Join for if-expr / ternary / break values.
    fn unify(&mut self, a: TypeId, b: TypeId, span: Span) -> TypeId {
        match self.unify_quiet(a, b) {
            Some(t) => t,
            None => {
                let d = self
                    .err(Code::CannotUnify, span)
                    .with_arg(self.type_name(a))
                    .with_arg(self.type_name(b));
                self.report(d);
                self.types.error()
            }
        }
    }

    fn unify_quiet(&mut self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if self.is_error(a) || self.is_error(b) {
            return Some(self.types.error());
        }
        if a == b {
            return Some(a);
        }

        let null_t = self.types.builtin(Builtin::Null);
        // null + T? -> T?
        if a == null_t && self.types.optional_elem(b).is_some() {
            return Some(b);
        }
        if b == null_t && self.types.optional_elem(a).is_some() {
            return Some(a);
        }
        // null + T -> T?
        if a == null_t {
            return Some(self.types.make_optional(b));
        }
        if b == null_t {
            return Some(self.types.make_optional(a));
        }

        let infer = self.types.builtin(Builtin::InferInteger);
        if a == infer && self.is_concrete_integer(b) {
            return Some(b);
        }
        if b == infer && self.is_concrete_integer(a) {
            return Some(a);
        }

        None
    }

    fn cast_compatible(&self, src: TypeId, dst: TypeId) -> bool {
        if src == dst {
            return true;
        }
        let numeric = |t: TypeId| {
            self.types
                .as_builtin(t)
                .is_some_and(|b| b.is_integer() || b.is_float() || b == Builtin::Char || b == Builtin::Bool)
        };
        if numeric(src) && numeric(dst) {
            return true;
        }
        // unwrap via cast: T? -> T forms
        if let Some(elem) = self.types.optional_elem(src) {
            return self.cast_compatible(elem, dst);
        }
        // wrap: T -> T? forms
        if let Some(elem) = self.types.optional_elem(dst) {
            return self.cast_compatible(src, elem);
        }
        // named conversions only between identical nominal types (handled by
        // the equality fast path); everything else is rejected
        false
    }

    /// Attempts to fix a `{integer}` expression to `expected`, checking the
    /// literal's arbitrary-precision value against the target range.
    fn resolve_infer_int(&mut self, eid: ExprId, expected: TypeId) -> bool {
        let Some(b) = self.types.as_builtin(expected) else {
            return false;
        };
        let Some((bits, signed)) = b.int_bits() else {
            return false;
        };

        let Some(value) = self.literal_int_value(eid) else {
            // not literal-backed: accept the context type without a range
            // check (e.g. a value computed from resolved parts)
            self.retype_infer_tree(eid, expected);
            return true;
        };

        if !int_fits(&value, bits, signed) {
            let span = self.arena.expr(eid).span;
            let d = self
                .err(Code::IntLiteralOutOfRange, span)
                .with_arg(value.to_string())
                .with_arg(b.name());
            self.report(d);
            self.retype_infer_tree(eid, self.types.error());
            return true; // reported here; not a coercion failure as well
        }

        self.mark_resolved(eid, expected);
        self.retype_infer_tree(eid, expected);
        true
    }

    fn mark_resolved(&mut self, eid: ExprId, expected: TypeId) {
        if let Some(p) = self.result.pending_int_expr.get_mut(&(eid.index() as u32)) {
            p.resolved = Some(expected);
        }
        // literal flowing through a symbol read resolves the symbol entry
        // and the initializer expression behind it
        if let ExprKind::Ident { .. } = self.arena.expr(eid).kind {
            if let Some(binding) = self.nres.expr_binding(eid) {
                let key = binding.sym.index() as u32;
                let sym_id = binding.sym;
                let mut backing_init = None;
                if let Some(p) = self.result.pending_int_sym.get_mut(&key) {
                    p.resolved = Some(expected);
                    self.sym.update_declared_type(sym_id, expected);
                    backing_init = self.pending_sym_init.get(&key).copied();
                }
                if let Some(init_idx) = backing_init {
                    self.retype_infer_tree(crate::ast::expr_id_from_index(init_idx as usize), expected);
                }
            }
        }
    }

    /// Rewrites the `{integer}` subtree under `eid` to `expected`.
    fn retype_infer_tree(&mut self, eid: ExprId, expected: TypeId) {
        let infer = self.types.builtin(Builtin::InferInteger);
        if self.result.expr_types[eid.index()] != infer {
            return;
        }
        self.result.expr_types[eid.index()] = expected;
        self.mark_resolved(eid, expected);
        let expr = self.arena.expr(eid);
        match expr.kind {
            ExprKind::Unary { operand, .. } => self.retype_infer_tree(operand, expected),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.retype_infer_tree(lhs, expected);
                self.retype_infer_tree(rhs, expected);
            }
            ExprKind::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                self.retype_infer_tree(then_expr, expected);
                self.retype_infer_tree(else_expr, expected);
            }
            _ => {}
        }
    }

    /// Evaluates the literal value of a deferred-integer expression tree:
    /// literals, sign prefixes, and symbol reads of literal-backed `let`s.
    fn literal_int_value(&self, eid: ExprId) -> Option<BigInt> {
        if let Some(p) = self.result.pending_int_expr.get(&(eid.index() as u32)) {
            return Some(p.value.clone());
        }
        let expr = self.arena.expr(eid);
        match expr.kind {
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => self.literal_int_value(operand).map(|v| -v),
            ExprKind::Unary {
                op: UnaryOp::Plus,
                operand,
            } => self.literal_int_value(operand),
            ExprKind::Ident { .. } => {
                let binding = self.nres.expr_binding(eid)?;
                self.result
                    .pending_int_sym
                    .get(&(binding.sym.index() as u32))
                    .map(|p| p.value.clone())
            }
            _ => None,
        }
    }
}

/// Splits an integer lexeme into `(value, suffix)`, ignoring underscores.
fn parse_int_lexeme(lexeme: &str) -> Option<(BigInt, Option<String>)> {
    let split = lexeme
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map_or(lexeme.len(), |(i, _)| i);
    let (digits, suffix) = lexeme.split_at(split);
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    let value = cleaned.parse::<BigInt>().ok()?;
    let suffix = if suffix.is_empty() {
        None
    } else {
        Some(suffix.to_owned())
    };
    Some((value, suffix))
}

/// Range check against `±2^(N-1)` (signed) or `2^N` (unsigned).
fn int_fits(value: &BigInt, bits: u32, signed: bool) -> bool {
    if signed {
        let bound = BigInt::from(1u8) << (bits - 1);
        value >= &-bound.clone() && value < &bound
    } else {
        if value < &BigInt::zero() {
            return false;
        }
        let bound = BigInt::from(1u8) << bits;
        value < &bound
    }
}

#[cfg(test)]
mod tests {
    use super::{check_program, int_fits, parse_int_lexeme, TyckOptions};
    use crate::{
        ast::AstArena,
        diag::{Bag, Code},
        intern::Interner,
        lex::Lexer,
        parse::{Parser, MAX_PARSE_ERRORS},
        resolve::{resolve_program, NameResolveOptions},
        types::{Builtin, TypePool},
    };
    use num_bigint::BigInt;

    struct Checked {
        bag: Bag,
        ok: bool,
    }

    fn check(src: &str) -> Checked {
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
        let (mut sym, nres) =
            resolve_program(&arena, root, &interner, &mut bag, NameResolveOptions::default());
        let res = check_program(
            &arena,
            root,
            &mut types,
            &mut sym,
            &nres,
            &interner,
            &mut bag,
            TyckOptions::default(),
        );
        Checked { bag, ok: res.ok }
    }

    #[test]
    fn literal_fits_at_exact_max() {
        let ok = check("fn f() -> i32 { return 2147483647i32; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());
    }

    #[test]
    fn literal_one_past_max_is_rejected_with_value_echo() {
        let bad = check("fn f() -> i32 { return 2147483648i32; }");
        assert!(!bad.ok);
        let d = bad
            .bag
            .diags()
            .iter()
            .find(|d| d.code() == Code::IntLiteralOutOfRange)
            .expect("range diagnostic");
        assert_eq!(d.args()[0], "2147483648");
        assert_eq!(d.args()[1], "i32");
    }

    #[test]
    fn deferred_literal_resolves_from_annotation() {
        let ok = check("fn f() -> i64 { let x: i64 = 3; return x; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());
    }

    #[test]
    fn deferred_literal_out_of_range_for_annotation() {
        let bad = check("fn f() -> u8 { let x: u8 = 300; return x; }");
        assert!(bad.bag.has_code(Code::IntLiteralOutOfRange));
    }

    #[test]
    fn negative_literal_rejected_for_unsigned() {
        let bad = check("fn f() -> u32 { let x: u32 = -1; return x; }");
        assert!(bad.bag.has_code(Code::IntLiteralOutOfRange));
    }

    #[test]
    fn assignment_to_immutable_is_rejected() {
        let bad = check("fn f() -> i32 { let x: i32 = 1; x = 2; return x; }");
        assert!(bad.bag.has_code(Code::WriteToImmutable));
        let ok = check("fn f() -> i32 { let mut x: i32 = 1; x = 2; return x; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());
    }

    #[test]
    fn assignment_target_must_be_place() {
        let bad = check("fn f() -> i32 { 1 + 2 = 3; return 0; }");
        assert!(bad.bag.has_code(Code::NotAPlaceExpr));
    }

    #[test]
    fn null_assigns_into_optional_only() {
        let ok = check("fn f() -> i32 { let x: i32? = null; return 0; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());
        let bad = check("fn f() -> i32 { let x: i32 = null; return 0; }");
        assert!(bad.bag.has_code(Code::TypeMismatch));
    }

    #[test]
    fn optional_promotion_is_off_by_default() {
        let bad = check("fn f() -> i32 { let x: i32? = 1i32; return 0; }");
        assert!(bad.bag.has_code(Code::TypeMismatch));
    }

    #[test]
    fn ternary_joins_null_into_optional() {
        let ok = check("fn f(c: bool) -> i32 { let x: i32? = c ? 1i32 : null; return 0; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());
    }

    #[test]
    fn labeled_call_arguments_check_against_params() {
        let ok = check(
            "fn add(a: i32, b: i32) -> i32 { return a + b; } \
             fn main() -> i32 { return add(a: 1i32, b: 2i32); }",
        );
        assert!(ok.ok, "{:?}", ok.bag.diags());

        let bad = check(
            "fn add(a: i32, b: i32) -> i32 { return a + b; } \
             fn main() -> i32 { return add(a: 1i32, c: 2i32); }",
        );
        assert!(bad.bag.has_code(Code::CallUnknownLabel));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let bad = check(
            "fn add(a: i32, b: i32) -> i32 { return a + b; } \
             fn main() -> i32 { return add(1i32); }",
        );
        assert!(bad.bag.has_code(Code::CallArgCountMismatch));
    }

    #[test]
    fn index_requires_array_and_integer_subscript() {
        let ok = check("fn f() -> i32 { let mut x: i32[3] = [1, 2, 3]; x[1] = 9; return x[1]; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());

        let bad = check("fn f() -> i32 { let x: i32 = 1; return x[0]; }");
        assert!(bad.bag.has_code(Code::NotIndexable));
    }

    #[test]
    fn nested_optional_type_is_rejected() {
        let bad = check("fn f() -> i32 { let x: i32?? = null; return 0; }");
        assert!(bad.bag.has_code(Code::NestedOptionalNotAllowed));
    }

    #[test]
    fn escape_of_escape_is_rejected() {
        let ok = check(
            "static let g: i32 = 1; fn f() -> i32 { let e: &&i32 = &&g; return 0; }",
        );
        assert!(!ok.bag.has_code(Code::NestedEscapeNotAllowed), "{:?}", ok.bag.diags());

        // `&&&&T` is rejected at the checker boundary
        let bad = check("fn f(x: &&&&i32) -> i32 { return 0; }");
        assert!(bad.bag.has_code(Code::NestedEscapeNotAllowed));
    }

    #[test]
    fn unwrap_requires_optional() {
        let ok = check("fn f(x: i32?) -> i32 { return x?; }");
        assert!(ok.ok, "{:?}", ok.bag.diags());
        let bad = check("fn f(x: i32) -> i32 { return x?; }");
        assert!(bad.bag.has_code(Code::OptionalUnwrapOnNonOptional));
    }

    #[test]
    fn pipe_types_hole_from_lhs() {
        let ok = check(
            "fn double(v: i32) -> i32 { return v + v; } \
             fn main() -> i32 { return 2i32 << double(v: _); }",
        );
        assert!(ok.ok, "{:?}", ok.bag.diags());
    }

    #[test]
    fn loop_break_values_join_with_null() {
        let ok = check(
            "fn f(xs: i32[]) -> i32 { let r: i32? = loop (x in xs) { break x; }; return 0; }",
        );
        assert!(ok.ok, "{:?}", ok.bag.diags());
    }

    #[test]
    fn int_fits_boundaries() {
        assert!(int_fits(&BigInt::from(127), 8, true));
        assert!(!int_fits(&BigInt::from(128), 8, true));
        assert!(int_fits(&BigInt::from(-128), 8, true));
        assert!(!int_fits(&BigInt::from(-129), 8, true));
        assert!(int_fits(&BigInt::from(255), 8, false));
        assert!(!int_fits(&BigInt::from(256), 8, false));
        assert!(!int_fits(&BigInt::from(-1), 8, false));
    }

    #[test]
    fn int_lexeme_parsing() {
        let (v, s) = parse_int_lexeme("1_000i64").expect("parse");
        assert_eq!(v, BigInt::from(1000));
        assert_eq!(s.as_deref(), Some("i64"));
        let (v, s) = parse_int_lexeme("42").expect("parse");
        assert_eq!(v, BigInt::from(42));
        assert!(s.is_none());
    }
}
