//! Symbol table and two-pass name resolution.
//!
//! Pass 1 collects top-level functions, types, and use/import symbols into
//! the global scope and reports duplicates. Pass 2 walks statement trees
//! with a scope stack, binding every identifier expression, declaration
//! statement, and parameter to a [`ResolvedSymbol`]. Downstream passes never
//! rebuild scope information; they read the result tables.

use indexmap::IndexMap;

use crate::{
    ast::{AstArena, ExprId, ExprKind, StmtId, StmtKind, UseDecl},
    diag::{Bag, Code, Diagnostic},
    intern::{Interner, StrId},
    span::Span,
    types::TypeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Fn,
    Type,
    Acts,
    Module,
}

/// One declared symbol.
#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: StrId,
    pub declared_type: Option<TypeId>,
    pub decl_span: Span,
    pub owner_scope: u32,
    pub is_mut: bool,
    pub is_static: bool,
    /// Declared as a function parameter.
    pub is_param: bool,
}

/// Record of a declaration shadowing an outer-scope binding.
#[derive(Debug, Clone, Copy)]
pub struct Shadowing {
    pub old_symbol: SymbolId,
    pub new_symbol: SymbolId,
    pub span: Span,
}

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<u32>,
    table: IndexMap<StrId, SymbolId>,
}

/// A forest of scopes plus the symbol store.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    scope_stack: Vec<u32>,
    symbols: Vec<Symbol>,
    shadowings: Vec<Shadowing>,
}

pub struct InsertOutcome {
    pub symbol_id: SymbolId,
    pub shadowed: Option<SymbolId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                table: IndexMap::new(),
            }],
            scope_stack: vec![0],
            symbols: Vec::new(),
            shadowings: Vec::new(),
        }
    }

    #[must_use]
    pub fn current_scope(&self) -> u32 {
        *self.scope_stack.last().expect("scope stack never empty")
    }

    pub fn push_scope(&mut self) -> u32 {
        let id = u32::try_from(self.scopes.len()).expect("scope overflow");
        self.scopes.push(Scope {
            parent: Some(self.current_scope()),
            table: IndexMap::new(),
        });
        self.scope_stack.push(id);
        id
    }

    /// Pops the current scope; the global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scope_stack.len() > 1 {
            self.scope_stack.pop();
        }
    }

    /// Scope-chain lookup from the current scope outwards.
    #[must_use]
    pub fn lookup(&self, name: StrId) -> Option<SymbolId> {
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            let sc = &self.scopes[s as usize];
            if let Some(&id) = sc.table.get(&name) {
                return Some(id);
            }
            scope = sc.parent;
        }
        None
    }

    /// Lookup restricted to the current scope (duplicate detection).
    #[must_use]
    pub fn lookup_in_current(&self, name: StrId) -> Option<SymbolId> {
        self.scopes[self.current_scope() as usize].table.get(&name).copied()
    }

    /// Inserts a symbol without a name-table entry: `_` bindings are never
    /// found by lookup and never collide.
    pub fn insert_anonymous(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(u32::try_from(self.symbols.len()).expect("symbol overflow"));
        let mut sym = sym;
        sym.owner_scope = self.current_scope();
        self.symbols.push(sym);
        id
    }

    /// Inserts a symbol into the current scope.
    ///
    /// `Err` carries the already-present same-scope symbol. An outer-scope
    /// hit is recorded as a shadowing and returned in the outcome.
    pub fn insert(&mut self, sym: Symbol) -> Result<InsertOutcome, SymbolId> {
        if let Some(existing) = self.lookup_in_current(sym.name) {
            return Err(existing);
        }
        let shadowed = self.lookup(sym.name);

        let id = SymbolId(u32::try_from(self.symbols.len()).expect("symbol overflow"));
        let mut sym = sym;
        sym.owner_scope = self.current_scope();
        let span = sym.decl_span;
        let name = sym.name;
        self.symbols.push(sym);
        let scope_idx = self.current_scope() as usize;
        self.scopes[scope_idx].table.insert(name, id);

        if let Some(old) = shadowed {
            self.shadowings.push(Shadowing {
                old_symbol: old,
                new_symbol: id,
                span,
            });
        }

        Ok(InsertOutcome {
            symbol_id: id,
            shadowed,
        })
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    /// Updates a symbol's declared type (set-inference, deferred integers).
    pub fn update_declared_type(&mut self, id: SymbolId, new_type: TypeId) {
        self.symbols[id.index()].declared_type = Some(new_type);
    }

    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[must_use]
    pub fn shadowings(&self) -> &[Shadowing] {
        &self.shadowings
    }

    /// True when `maybe_ancestor` is `scope` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_scope(&self, maybe_ancestor: u32, scope: u32) -> bool {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if s == maybe_ancestor {
                return true;
            }
            cur = self.scopes[s as usize].parent;
        }
        false
    }
}

/// How a resolved identifier is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    LocalVar,
    Param,
    Fn,
    Type,
    Module,
    UseAlias,
    OverloadSet,
    Builtin,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedSymbol {
    pub bind: BindingKind,
    pub sym: SymbolId,
    pub span: Span,
}

/// Index into [`NameResolveResult::resolved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedId(u32);

impl ResolvedId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-arena binding tables. Unresolved entries stay `None` — the error
/// binding.
#[derive(Debug, Clone, Default)]
pub struct NameResolveResult {
    pub resolved: Vec<ResolvedSymbol>,
    pub expr_to_resolved: Vec<Option<ResolvedId>>,
    pub stmt_to_resolved: Vec<Option<ResolvedId>>,
    pub param_to_resolved: Vec<Option<ResolvedId>>,
}

impl NameResolveResult {
    fn sized_to(arena: &AstArena) -> Self {
        Self {
            resolved: Vec::with_capacity(arena.expr_count() / 2),
            expr_to_resolved: vec![None; arena.expr_count()],
            stmt_to_resolved: vec![None; arena.stmt_count()],
            param_to_resolved: vec![None; arena.param_count()],
        }
    }

    fn add(&mut self, r: ResolvedSymbol) -> ResolvedId {
        let id = ResolvedId(u32::try_from(self.resolved.len()).expect("resolved overflow"));
        self.resolved.push(r);
        id
    }

    #[must_use]
    pub fn expr_binding(&self, id: ExprId) -> Option<&ResolvedSymbol> {
        self.expr_to_resolved[id.index()].map(|r| &self.resolved[r.index()])
    }

    #[must_use]
    pub fn stmt_binding(&self, id: StmtId) -> Option<&ResolvedSymbol> {
        self.stmt_to_resolved[id.index()].map(|r| &self.resolved[r.index()])
    }

    #[must_use]
    pub fn param_binding(&self, param_index: usize) -> Option<&ResolvedSymbol> {
        self.param_to_resolved[param_index].map(|r| &self.resolved[r.index()])
    }
}

/// Policy for declarations that shadow an outer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowingMode {
    #[default]
    Allow,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NameResolveOptions {
    pub shadowing: ShadowingMode,
}

/// Runs both resolution passes over a program root.
pub fn resolve_program(
    arena: &AstArena,
    root: StmtId,
    interner: &Interner,
    bag: &mut Bag,
    options: NameResolveOptions,
) -> (SymbolTable, NameResolveResult) {
    let mut r = Resolver {
        arena,
        interner,
        bag,
        options,
        sym: SymbolTable::new(),
        result: NameResolveResult::sized_to(arena),
    };
    r.collect_top_level(root);
    r.walk_stmt(root);
    (r.sym, r.result)
}

struct Resolver<'a> {
    arena: &'a AstArena,
    interner: &'a Interner,
    bag: &'a mut Bag,
    options: NameResolveOptions,
    sym: SymbolTable,
    result: NameResolveResult,
}

impl Resolver<'_> {
    fn declare(
        &mut self,
        kind: SymbolKind,
        bind: BindingKind,
        name: StrId,
        declared_type: Option<TypeId>,
        span: Span,
        is_mut: bool,
        is_static: bool,
    ) -> Option<ResolvedId> {
        let is_param = bind == BindingKind::Param;
        let sym = Symbol {
            kind,
            name,
            declared_type,
            decl_span: span,
            owner_scope: 0,
            is_mut,
            is_static,
            is_param,
        };

        // `_` binds anonymously: it never conflicts and is never found
        if self.interner.resolve(name) == "_" {
            let id = self.sym.insert_anonymous(sym);
            return Some(self.result.add(ResolvedSymbol { bind, sym: id, span }));
        }

        let inserted = self.sym.insert(sym);

        match inserted {
            Err(_existing) => {
                self.bag.add(
                    Diagnostic::error(Code::DuplicateInScope, span)
                        .with_arg(self.interner.resolve(name)),
                );
                None
            }
            Ok(outcome) => {
                if outcome.shadowed.is_some() {
                    match self.options.shadowing {
                        ShadowingMode::Allow => {}
                        ShadowingMode::Warn => self.bag.add(
                            Diagnostic::warning(Code::ShadowedBinding, span)
                                .with_arg(self.interner.resolve(name)),
                        ),
                        ShadowingMode::Error => self.bag.add(
                            Diagnostic::error(Code::ShadowedBinding, span)
                                .with_arg(self.interner.resolve(name)),
                        ),
                    }
                }
                Some(self.result.add(ResolvedSymbol {
                    bind,
                    sym: outcome.symbol_id,
                    span,
                }))
            }
        }
    }

    // ---- pass 1: top-level collection ----

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
            StmtKind::FnDecl(f) => {
                let rid = self.declare(
                    SymbolKind::Fn,
                    BindingKind::Fn,
                    f.name,
                    None,
                    stmt.span,
                    false,
                    false,
                );
                self.result.stmt_to_resolved[sid.index()] = rid;
            }
            StmtKind::FieldDecl { name, .. } => {
                let rid = self.declare(
                    SymbolKind::Type,
                    BindingKind::Type,
                    name,
                    None,
                    stmt.span,
                    false,
                    false,
                );
                self.result.stmt_to_resolved[sid.index()] = rid;
            }
            StmtKind::ActsDecl { name, children, .. } => {
                let rid = self.declare(
                    SymbolKind::Acts,
                    BindingKind::Type,
                    name,
                    None,
                    stmt.span,
                    false,
                    false,
                );
                self.result.stmt_to_resolved[sid.index()] = rid;
                // member functions are callable at top level
                for &child in self.arena.stmt_children(children) {
                    self.collect_top_item(child);
                }
            }
            StmtKind::Use(UseDecl::Import { name, alias }) => {
                let bound = alias.unwrap_or(name);
                let bind = if alias.is_some() {
                    BindingKind::UseAlias
                } else {
                    BindingKind::Module
                };
                let rid = self.declare(
                    SymbolKind::Module,
                    bind,
                    bound,
                    None,
                    stmt.span,
                    false,
                    false,
                );
                self.result.stmt_to_resolved[sid.index()] = rid;
            }
            StmtKind::Use(UseDecl::TypeAlias { name, ty }) => {
                let rid = self.declare(
                    SymbolKind::Type,
                    BindingKind::UseAlias,
                    name,
                    Some(ty),
                    stmt.span,
                    false,
                    false,
                );
                self.result.stmt_to_resolved[sid.index()] = rid;
            }
            StmtKind::Var(v) if v.is_static => {
                let rid = self.declare(
                    SymbolKind::Var,
                    BindingKind::LocalVar,
                    v.name,
                    v.ty,
                    stmt.span,
                    v.is_mut,
                    true,
                );
                self.result.stmt_to_resolved[sid.index()] = rid;
            }
            StmtKind::Nest { body: Some(body), .. } => {
                // inline nests contribute their items to the file scope
                if let StmtKind::Block { children } = self.arena.stmt(body).kind {
                    for &child in self.arena.stmt_children(children) {
                        self.collect_top_item(child);
                    }
                }
            }
            _ => {}
        }
    }

    // ---- pass 2: expression-level resolution ----

    fn walk_stmt(&mut self, sid: StmtId) {
        let stmt = *self.arena.stmt(sid);
        match stmt.kind {
            StmtKind::Error | StmtKind::Empty | StmtKind::Continue => {}
            StmtKind::Expr { expr } => self.walk_expr(expr),
            StmtKind::Block { children } => {
                self.sym.push_scope();
                for &child in self.arena.stmt_children(children).to_vec().iter() {
                    self.walk_stmt(child);
                }
                self.sym.pop_scope();
            }
            StmtKind::Var(v) => {
                if let Some(init) = v.init {
                    self.walk_expr(init);
                }
                // a top-level static was already declared in pass 1
                if self.result.stmt_to_resolved[sid.index()].is_none() {
                    let rid = self.declare(
                        SymbolKind::Var,
                        BindingKind::LocalVar,
                        v.name,
                        v.ty,
                        stmt.span,
                        v.is_mut,
                        v.is_static,
                    );
                    self.result.stmt_to_resolved[sid.index()] = rid;
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
            StmtKind::Switch { scrutinee, cases, .. } => {
                self.walk_expr(scrutinee);
                for case in self.arena.switch_cases(cases).to_vec() {
                    self.walk_stmt(case.body);
                }
            }
            StmtKind::FnDecl(f) => {
                // fn symbol itself was collected in pass 1 (top level) or is
                // declared here for nested contexts
                if self.result.stmt_to_resolved[sid.index()].is_none() {
                    let rid = self.declare(
                        SymbolKind::Fn,
                        BindingKind::Fn,
                        f.name,
                        None,
                        stmt.span,
                        false,
                        false,
                    );
                    self.result.stmt_to_resolved[sid.index()] = rid;
                }

                self.sym.push_scope();
                let params = self.arena.params(f.params).to_vec();
                for (offset, p) in params.iter().enumerate() {
                    if let Some(default) = p.default_expr {
                        self.walk_expr(default);
                    }
                    let rid = self.declare(
                        SymbolKind::Var,
                        BindingKind::Param,
                        p.name,
                        Some(p.ty),
                        p.span,
                        p.is_mut,
                        false,
                    );
                    let idx = self
                        .arena
                        .param_index(f.params, u32::try_from(offset).expect("param index"));
                    self.result.param_to_resolved[idx] = rid;
                }

                self.walk_stmt(f.body);
                self.sym.pop_scope();
            }
            StmtKind::FieldDecl { .. } | StmtKind::Use(_) => {}
            StmtKind::ActsDecl { children, .. } => {
                for &child in self.arena.stmt_children(children).to_vec().iter() {
                    self.walk_stmt(child);
                }
            }
            StmtKind::Nest { body, .. } => {
                if let Some(b) = body {
                    if let StmtKind::Block { children } = self.arena.stmt(b).kind {
                        for &child in self.arena.stmt_children(children).to_vec().iter() {
                            self.walk_stmt(child);
                        }
                    }
                }
            }
        }
    }

    fn walk_expr(&mut self, eid: ExprId) {
        let expr = *self.arena.expr(eid);
        match expr.kind {
            ExprKind::Error
            | ExprKind::IntLit { .. }
            | ExprKind::FloatLit { .. }
            | ExprKind::StringLit { .. }
            | ExprKind::CharLit { .. }
            | ExprKind::BoolLit { .. }
            | ExprKind::NullLit
            | ExprKind::Hole => {}
            ExprKind::Ident { name } => {
                if let Some(sym_id) = self.sym.lookup(name) {
                    let bind = match self.sym.symbol(sym_id).kind {
                        SymbolKind::Fn => BindingKind::Fn,
                        SymbolKind::Type => BindingKind::Type,
                        SymbolKind::Acts => BindingKind::Type,
                        SymbolKind::Module => BindingKind::Module,
                        SymbolKind::Var => {
                            if self.sym.symbol(sym_id).is_param {
                                BindingKind::Param
                            } else {
                                BindingKind::LocalVar
                            }
                        }
                    };
                    let rid = self.result.add(ResolvedSymbol {
                        bind,
                        sym: sym_id,
                        span: expr.span,
                    });
                    self.result.expr_to_resolved[eid.index()] = Some(rid);
                } else {
                    self.bag.add(
                        Diagnostic::error(Code::UnknownIdentifier, expr.span)
                            .with_arg(self.interner.resolve(name)),
                    );
                }
            }
            ExprKind::ArrayLit { args } => {
                for arg in self.arena.args(args).to_vec() {
                    if let Some(e) = arg.expr {
                        self.walk_expr(e);
                    }
                }
            }
            ExprKind::Unary { operand, .. }
            | ExprKind::Borrow { operand, .. }
            | ExprKind::Escape { operand }
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
            ExprKind::Call { callee, args } => {
                self.walk_expr(callee);
                for arg in self.arena.args(args).to_vec() {
                    if let Some(e) = arg.expr {
                        self.walk_expr(e);
                    }
                    for child in self.arena.args(arg.children).to_vec() {
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
            ExprKind::Loop { var, iter, body } => {
                if let Some(e) = iter {
                    self.walk_expr(e);
                }
                self.sym.push_scope();
                if let Some(name) = var {
                    // bind the loop variable; its binding is recorded on the
                    // loop expression itself for the SIR builder
                    let rid = self.declare(
                        SymbolKind::Var,
                        BindingKind::LocalVar,
                        name,
                        None,
                        expr.span,
                        false,
                        false,
                    );
                    self.result.expr_to_resolved[eid.index()] = rid;
                }
                self.walk_stmt(body);
                self.sym.pop_scope();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_program, BindingKind, NameResolveOptions, ShadowingMode};
    use crate::{
        ast::{AstArena, ExprKind, StmtId},
        diag::{Bag, Code},
        intern::Interner,
        lex::Lexer,
        parse::{Parser, MAX_PARSE_ERRORS},
        types::TypePool,
    };

    fn setup(src: &str) -> (AstArena, Interner, StmtId, Bag) {
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
        (arena, interner, root, bag)
    }

    #[test]
    fn resolves_params_and_locals() {
        let (arena, interner, root, mut bag) =
            setup("fn add(a: i32, b: i32) -> i32 { let c: i32 = a + b; return c; }");
        let (sym, res) = resolve_program(&arena, root, &interner, &mut bag, NameResolveOptions::default());
        assert!(!bag.has_error(), "{:?}", bag.diags());

        let mut param_binds = 0;
        let mut local_binds = 0;
        for (i, e) in arena.exprs().iter().enumerate() {
            if matches!(e.kind, ExprKind::Ident { .. }) {
                let binding = res.expr_to_resolved[i].expect("ident must resolve");
                match res.resolved[binding.index()].bind {
                    BindingKind::Param => param_binds += 1,
                    BindingKind::LocalVar => local_binds += 1,
                    other => panic!("unexpected binding {other:?}"),
                }
            }
        }
        assert_eq!(param_binds, 2);
        assert_eq!(local_binds, 1);
        assert!(!sym.symbols().is_empty());
    }

    #[test]
    fn unknown_identifier_reports_and_binds_nothing() {
        let (arena, interner, root, mut bag) = setup("fn f() -> i32 { return missing; }");
        let (_, res) = resolve_program(&arena, root, &interner, &mut bag, NameResolveOptions::default());
        assert!(bag.has_code(Code::UnknownIdentifier));
        let unresolved = arena
            .exprs()
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                matches!(e.kind, ExprKind::Ident { .. }) && res.expr_to_resolved[*i].is_none()
            })
            .count();
        assert_eq!(unresolved, 1);
    }

    #[test]
    fn same_scope_duplicate_is_error() {
        let (arena, interner, root, mut bag) =
            setup("fn f() -> i32 { let x: i32 = 1; let x: i32 = 2; return x; }");
        let _ = resolve_program(&arena, root, &interner, &mut bag, NameResolveOptions::default());
        assert!(bag.has_code(Code::DuplicateInScope));
    }

    #[test]
    fn outer_scope_shadowing_follows_policy() {
        let src = "fn f() -> i32 { let x: i32 = 1; { let x: i32 = 2; } return x; }";
        let (arena, interner, root, mut bag) = setup(src);
        let (sym, _) = resolve_program(&arena, root, &interner, &mut bag, NameResolveOptions::default());
        assert!(!bag.has_error());
        assert_eq!(sym.shadowings().len(), 1);

        let (arena, interner, root, mut bag) = setup(src);
        let _ = resolve_program(
            &arena,
            root,
            &interner,
            &mut bag,
            NameResolveOptions {
                shadowing: ShadowingMode::Error,
            },
        );
        assert!(bag.has_code(Code::ShadowedBinding));
    }

    #[test]
    fn decl_scope_is_ancestor_of_use_scope() {
        let (arena, interner, root, mut bag) =
            setup("fn f() -> i32 { let x: i32 = 1; { let y: i32 = x; } return x; }");
        let (sym, res) = resolve_program(&arena, root, &interner, &mut bag, NameResolveOptions::default());
        assert!(!bag.has_error());
        for r in &res.resolved {
            if r.bind == BindingKind::LocalVar {
                let owner = sym.symbol(r.sym).owner_scope;
                // every recorded use/decl site sits in the declaring scope or
                // one of its descendants
                assert!(sym.is_ancestor_scope(0, owner));
            }
        }
    }
}
