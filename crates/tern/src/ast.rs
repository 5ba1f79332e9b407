//! The AST arena: append-only parallel vectors keyed by typed 32-bit ids.
//!
//! All child relationships are stored as `(begin, count)` slices into the
//! arena's side tables. Entries never move once added, so ids are stable for
//! the lifetime of a snapshot — the incremental session relies on this to
//! reuse items across reparses.

use crate::{
    intern::StrId,
    span::Span,
    types::TypeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

impl StmtId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reconstructs an [`ExprId`] from a raw vector index.
#[must_use]
pub fn expr_id_from_index(idx: usize) -> ExprId {
    ExprId(u32::try_from(idx).expect("expr index overflow"))
}

/// `(begin, count)` range into one of the arena's side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceRange {
    pub begin: u32,
    pub count: u32,
}

impl SliceRange {
    pub const EMPTY: Self = Self { begin: 0, count: 0 };

    #[must_use]
    pub fn range(self) -> std::ops::Range<usize> {
        self.begin as usize..(self.begin + self.count) as usize
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Neg,
    /// `!x` / `not x`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Xor,
    NullCoalesce,
    /// `a..b` range subscript payload
    Range,
    /// `a..:b` inclusive range subscript payload
    RangeInclusive,
    /// `value << call(...)`
    Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    NullCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// `expr as T`
    As,
    /// `expr as? T` — produces `T?`
    AsOptional,
    /// `expr as! T` — runtime-checked, produces `T`
    AsForce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    Labeled,
    /// A call-site `{ ... }` group; children are adjacent `Arg` entries.
    NamedGroup,
}

/// One call or array-literal argument.
#[derive(Debug, Clone, Copy)]
pub struct Arg {
    pub kind: ArgKind,
    pub label: Option<StrId>,
    /// `label: _` hole payload (pipe injection point).
    pub is_hole: bool,
    pub expr: Option<ExprId>,
    /// For `NamedGroup`: children slice into the args table.
    pub children: SliceRange,
    pub span: Span,
}

impl Arg {
    #[must_use]
    pub fn positional(expr: ExprId, span: Span) -> Self {
        Self {
            kind: ArgKind::Positional,
            label: None,
            is_hole: false,
            expr: Some(expr),
            children: SliceRange::EMPTY,
            span,
        }
    }
}

/// `@name` attribute attached to a function declaration.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub name: StrId,
    pub span: Span,
}

/// One function parameter.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: StrId,
    pub ty: TypeId,
    pub is_mut: bool,
    pub default_expr: Option<ExprId>,
    /// Declared inside the trailing `{ ... }` named-group section.
    pub is_named_group: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePattern {
    Error,
    Int(StrId),
    Char(StrId),
    Str(StrId),
    Bool(bool),
    Null,
    Ident(StrId),
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchCase {
    pub is_default: bool,
    pub pattern: CasePattern,
    /// Always a block statement.
    pub body: StmtId,
    pub span: Span,
}

/// One member of a `field` declaration.
#[derive(Debug, Clone, Copy)]
pub struct FieldMember {
    pub name: StrId,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub enum ExprKind {
    Error,

    // literals / primary
    IntLit { text: StrId },
    FloatLit { text: StrId },
    StringLit { text: StrId },
    CharLit { text: StrId },
    BoolLit { value: bool },
    NullLit,
    ArrayLit { args: SliceRange },
    Ident { name: StrId },
    Hole,

    // operators
    Unary { op: UnaryOp, operand: ExprId },
    Borrow { is_mut: bool, operand: ExprId },
    Escape { operand: ExprId },
    PostfixInc { operand: ExprId },
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    Assign { op: AssignOp, lhs: ExprId, rhs: ExprId },
    Ternary { cond: ExprId, then_expr: ExprId, else_expr: ExprId },

    // postfix
    Call { callee: ExprId, args: SliceRange },
    Index { base: ExprId, index: ExprId },
    FieldAccess { base: ExprId, name: StrId },
    /// `a?` — unwraps one optional layer.
    OptionalUnwrap { operand: ExprId },

    // loop expression: `loop (x in e) { ... }`
    Loop { var: Option<StrId>, iter: Option<ExprId>, body: StmtId },

    Cast { operand: ExprId, cast: CastKind, ty: TypeId },
}

#[derive(Debug, Clone, Copy)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// `let` / `set` / `static` variable declaration payload.
#[derive(Debug, Clone, Copy)]
pub struct VarDecl {
    pub is_set: bool,
    pub is_mut: bool,
    pub is_static: bool,
    pub name: StrId,
    pub ty: Option<TypeId>,
    pub init: Option<ExprId>,
}

/// Function declaration payload.
#[derive(Debug, Clone, Copy)]
pub struct FnDecl {
    pub name: StrId,
    pub is_export: bool,
    pub ret: Option<TypeId>,
    pub attrs: SliceRange,
    pub params: SliceRange,
    /// Params `[0, positional_param_count)` are positional; the rest belong
    /// to the trailing named-group section.
    pub positional_param_count: u32,
    pub has_named_group: bool,
    pub body: StmtId,
}

#[derive(Debug, Clone, Copy)]
pub enum UseDecl {
    /// `import foo;` / `import foo as f;`
    Import { name: StrId, alias: Option<StrId> },
    /// `use Name = Type;`
    TypeAlias { name: StrId, ty: TypeId },
}

#[derive(Debug, Clone, Copy)]
pub enum StmtKind {
    Error,
    /// Bare `;`
    Empty,
    Expr { expr: ExprId },
    Block { children: SliceRange },

    Var(VarDecl),
    If { cond: ExprId, then_block: StmtId, else_block: Option<StmtId> },
    While { cond: ExprId, body: StmtId },
    DoScope { body: StmtId },
    DoWhile { body: StmtId, cond: ExprId },
    Manual { body: StmtId },
    Return { value: Option<ExprId> },
    Break { value: Option<ExprId> },
    Continue,
    Switch { scrutinee: ExprId, cases: SliceRange, has_default: bool },

    FnDecl(FnDecl),
    FieldDecl { name: StrId, is_export: bool, members: SliceRange },
    ActsDecl { name: StrId, is_export: bool, for_type: Option<TypeId>, children: SliceRange },
    Use(UseDecl),
    Nest { path: SliceRange, body: Option<StmtId>, is_file_directive: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// Append-only storage for one parse.
#[derive(Debug, Clone, Default)]
pub struct AstArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    args: Vec<Arg>,
    attrs: Vec<Attr>,
    params: Vec<Param>,
    switch_cases: Vec<SwitchCase>,
    field_members: Vec<FieldMember>,
    stmt_children: Vec<StmtId>,
    path_segs: Vec<StrId>,
}

impl AstArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = ExprId(u32::try_from(self.exprs.len()).expect("expr arena overflow"));
        self.exprs.push(Expr { kind, span });
        id
    }

    pub fn add_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId(u32::try_from(self.stmts.len()).expect("stmt arena overflow"));
        self.stmts.push(Stmt { kind, span });
        id
    }

    /// Appends a batch of args and returns their slice.
    pub fn add_args(&mut self, batch: Vec<Arg>) -> SliceRange {
        let begin = u32::try_from(self.args.len()).expect("arg arena overflow");
        let count = u32::try_from(batch.len()).expect("too many args");
        self.args.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_attrs(&mut self, batch: Vec<Attr>) -> SliceRange {
        let begin = u32::try_from(self.attrs.len()).expect("attr arena overflow");
        let count = u32::try_from(batch.len()).expect("too many attrs");
        self.attrs.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_params(&mut self, batch: Vec<Param>) -> SliceRange {
        let begin = u32::try_from(self.params.len()).expect("param arena overflow");
        let count = u32::try_from(batch.len()).expect("too many params");
        self.params.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_switch_cases(&mut self, batch: Vec<SwitchCase>) -> SliceRange {
        let begin = u32::try_from(self.switch_cases.len()).expect("case arena overflow");
        let count = u32::try_from(batch.len()).expect("too many cases");
        self.switch_cases.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_field_members(&mut self, batch: Vec<FieldMember>) -> SliceRange {
        let begin = u32::try_from(self.field_members.len()).expect("member arena overflow");
        let count = u32::try_from(batch.len()).expect("too many members");
        self.field_members.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_stmt_children(&mut self, batch: Vec<StmtId>) -> SliceRange {
        let begin = u32::try_from(self.stmt_children.len()).expect("child arena overflow");
        let count = u32::try_from(batch.len()).expect("too many children");
        self.stmt_children.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_path_segs(&mut self, batch: Vec<StrId>) -> SliceRange {
        let begin = u32::try_from(self.path_segs.len()).expect("path arena overflow");
        let count = u32::try_from(batch.len()).expect("too many segments");
        self.path_segs.extend(batch);
        SliceRange { begin, count }
    }

    // ---- accessors ----

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[must_use]
    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    #[must_use]
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    #[must_use]
    pub fn args(&self, slice: SliceRange) -> &[Arg] {
        &self.args[slice.range()]
    }

    #[must_use]
    pub fn all_args(&self) -> &[Arg] {
        &self.args
    }

    #[must_use]
    pub fn attrs(&self, slice: SliceRange) -> &[Attr] {
        &self.attrs[slice.range()]
    }

    #[must_use]
    pub fn params(&self, slice: SliceRange) -> &[Param] {
        &self.params[slice.range()]
    }

    #[must_use]
    pub fn all_params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn param_index(&self, slice: SliceRange, offset: u32) -> usize {
        (slice.begin + offset) as usize
    }

    #[must_use]
    pub fn switch_cases(&self, slice: SliceRange) -> &[SwitchCase] {
        &self.switch_cases[slice.range()]
    }

    #[must_use]
    pub fn field_members(&self, slice: SliceRange) -> &[FieldMember] {
        &self.field_members[slice.range()]
    }

    #[must_use]
    pub fn stmt_children(&self, slice: SliceRange) -> &[StmtId] {
        &self.stmt_children[slice.range()]
    }

    #[must_use]
    pub fn path_segs(&self, slice: SliceRange) -> &[StrId] {
        &self.path_segs[slice.range()]
    }

    #[must_use]
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    #[must_use]
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}
