//! SIR: the structured intermediate representation.
//!
//! Lowered from the resolved, typed AST. Control flow stays structured
//! (if/while/do/switch as statements over block ids); expressions become a
//! flat value arena with children by id. Every value carries its result
//! type, a place classification, an effect classification, and — for
//! place-like values — the root symbol it reaches.

pub mod build;
pub mod canon;
pub mod capability;
pub mod mutability;
pub mod verify;

pub use build::{build_sir_module, BuildOptions};
pub use canon::{canonicalize, CanonicalizeResult};
pub use capability::{analyze_capabilities, CapabilityAnalysisResult, CapabilitySymbolState};
pub use mutability::{analyze_mut, MutAnalysisResult, MutInfo};
pub use verify::{verify_escape_handles, verify_module, VerifyError};

use crate::{
    ast::{AssignOp, BinaryOp, CasePattern, CastKind, SliceRange, UnaryOp},
    intern::StrId,
    resolve::SymbolId,
    span::Span,
    types::TypeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
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

/// Whether a value denotes a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceClass {
    #[default]
    NotPlace,
    Local,
    Index,
    Field,
    Deref,
}

/// Conservative effect classification, joined upwards from children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EffectClass {
    #[default]
    Pure,
    MayWrite,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Error,

    // literals
    IntLit { text: StrId },
    FloatLit { text: StrId },
    StringLit { text: StrId },
    CharLit { text: StrId },
    BoolLit { value: bool },
    NullLit,
    ArrayLit { args: SliceRange },

    // names
    Local { sym: SymbolId },
    Global { sym: SymbolId },

    // ops
    Unary { op: UnaryOp, a: ValueId },
    Binary { op: BinaryOp, a: ValueId, b: ValueId },
    Assign { op: AssignOp, a: ValueId, b: ValueId },
    PostfixInc { a: ValueId },
    Borrow { is_mut: bool, a: ValueId },
    Escape { a: ValueId },
    Call { callee: ValueId, args: SliceRange },
    Index { a: ValueId, b: ValueId },
    Field { a: ValueId, name: StrId },

    // structured control kept as values
    IfExpr { cond: ValueId, then_value: ValueId, else_value: ValueId },
    LoopExpr { var: Option<SymbolId>, iter: Option<ValueId>, body: BlockId },

    Cast { cast: CastKind, a: ValueId, to: TypeId },
}

/// One SIR value node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub kind: ValueKind,
    pub span: Span,
    /// Result type from the checker.
    pub ty: TypeId,
    pub place: PlaceClass,
    pub effect: EffectClass,
    /// Root symbol reached through Borrow/Escape/Index/Field chains.
    pub origin_sym: Option<SymbolId>,
    /// Element type of the storage the place denotes, when it differs from
    /// the read type.
    pub place_elem_type: Option<TypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    Labeled,
    NamedGroup,
}

/// Call / array argument mirroring the AST shape; named-group children are
/// adjacent entries referenced by slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arg {
    pub kind: ArgKind,
    pub label: Option<StrId>,
    pub is_hole: bool,
    pub value: Option<ValueId>,
    pub children: SliceRange,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub name: StrId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: StrId,
    pub ty: TypeId,
    pub is_mut: bool,
    pub default_value: Option<ValueId>,
    pub is_named_group: bool,
    pub sym: Option<SymbolId>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    Error,
    Expr { value: ValueId },
    VarDecl {
        is_set: bool,
        is_mut: bool,
        is_static: bool,
        name: StrId,
        sym: Option<SymbolId>,
        declared_type: TypeId,
        init: Option<ValueId>,
    },
    If { cond: ValueId, then_block: BlockId, else_block: Option<BlockId> },
    While { cond: ValueId, body: BlockId },
    DoWhile { cond: ValueId, body: BlockId },
    /// `do { .. }` and `manual { .. }` scopes.
    Scope { body: BlockId, is_manual: bool },
    Return { value: Option<ValueId> },
    Break { value: Option<ValueId> },
    Continue,
    Switch { scrutinee: ValueId, cases: SliceRange, has_default: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// One switch arm; the pattern is a lowered constant value, `None` for
/// `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCase {
    pub is_default: bool,
    pub pattern: Option<ValueId>,
    pub pattern_ast: CasePattern,
    pub body: BlockId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub span: Span,
    /// Slice into [`Module::block_stmts`].
    pub stmts: SliceRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Func {
    pub span: Span,
    pub name: StrId,
    pub sym: Option<SymbolId>,
    /// `Fn` type of the whole signature.
    pub sig: TypeId,
    pub ret: TypeId,
    pub is_export: bool,
    pub attrs: SliceRange,
    pub params: SliceRange,
    pub positional_param_count: u32,
    pub has_named_group: bool,
    pub entry: Option<BlockId>,
    /// Hint: any statement or value in this function may write.
    pub has_any_write: bool,
    pub is_acts_member: bool,
    pub owner_acts: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMember {
    pub name: StrId,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl {
    pub span: Span,
    pub name: StrId,
    pub sym: Option<SymbolId>,
    pub is_export: bool,
    pub members: SliceRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActsDecl {
    pub span: Span,
    pub name: StrId,
    pub sym: Option<SymbolId>,
    pub is_export: bool,
    /// Slice of function ids in [`Module::funcs`].
    pub func_begin: u32,
    pub func_count: u32,
}

/// Module-level (static) variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    pub span: Span,
    pub name: StrId,
    pub sym: Option<SymbolId>,
    pub ty: TypeId,
    pub is_mut: bool,
    pub is_static: bool,
    pub init: Option<ValueId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeHandleKind {
    #[default]
    Trivial,
    StackSlot,
    CallerSlot,
    HeapBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeBoundaryKind {
    #[default]
    None,
    Return,
    CallArg,
    Abi,
    Ffi,
}

impl EscapeHandleKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::StackSlot => "stack_slot",
            Self::CallerSlot => "caller_slot",
            Self::HeapBox => "heap_box",
        }
    }
}

impl EscapeBoundaryKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Return => "return",
            Self::CallArg => "call_arg",
            Self::Abi => "abi",
            Self::Ffi => "ffi",
        }
    }
}

/// Escape-handle metadata: one per SIR `Escape` value, never a runtime
/// value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EscapeHandle {
    pub escape_value: Option<ValueId>,
    pub kind: EscapeHandleKind,
    pub boundary: EscapeBoundaryKind,
    pub from_static: bool,
    pub has_drop: bool,
    pub abi_pack_required: bool,
    pub ffi_pack_required: bool,
    /// Must be zero before OIR lowering.
    pub materialize_count: u32,
    pub origin_sym: Option<SymbolId>,
}

/// Reconstructs a [`ValueId`] from a raw vector index.
#[must_use]
pub fn value_id_from_index(idx: usize) -> ValueId {
    ValueId(u32::try_from(idx).expect("value index overflow"))
}

/// Reconstructs a [`StmtId`] from a raw vector index.
#[must_use]
pub fn stmt_id_from_index(idx: usize) -> StmtId {
    StmtId(u32::try_from(idx).expect("stmt index overflow"))
}

/// Reconstructs a [`BlockId`] from a raw vector index.
#[must_use]
pub fn block_id_from_index(idx: usize) -> BlockId {
    BlockId(u32::try_from(idx).expect("block index overflow"))
}

/// The SIR module: parallel arenas plus decl tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub values: Vec<Value>,
    pub args: Vec<Arg>,
    pub attrs: Vec<Attr>,
    pub params: Vec<Param>,
    pub stmts: Vec<Stmt>,
    pub blocks: Vec<Block>,
    pub block_stmts: Vec<StmtId>,
    pub switch_cases: Vec<SwitchCase>,
    pub funcs: Vec<Func>,
    pub field_members: Vec<FieldMember>,
    pub fields: Vec<FieldDecl>,
    pub acts: Vec<ActsDecl>,
    pub globals: Vec<Global>,
    pub escape_handles: Vec<EscapeHandle>,
}

impl Module {
    pub fn add_value(&mut self, v: Value) -> ValueId {
        self.values.push(v);
        ValueId(u32::try_from(self.values.len() - 1).expect("value arena overflow"))
    }

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

    pub fn add_stmt(&mut self, s: Stmt) -> StmtId {
        self.stmts.push(s);
        StmtId(u32::try_from(self.stmts.len() - 1).expect("stmt arena overflow"))
    }

    pub fn add_block(&mut self, span: Span, stmt_list: Vec<StmtId>) -> BlockId {
        let begin = u32::try_from(self.block_stmts.len()).expect("block stmt overflow");
        let count = u32::try_from(stmt_list.len()).expect("too many stmts");
        self.block_stmts.extend(stmt_list);
        self.blocks.push(Block {
            span,
            stmts: SliceRange { begin, count },
        });
        BlockId(u32::try_from(self.blocks.len() - 1).expect("block arena overflow"))
    }

    pub fn add_switch_cases(&mut self, batch: Vec<SwitchCase>) -> SliceRange {
        let begin = u32::try_from(self.switch_cases.len()).expect("case arena overflow");
        let count = u32::try_from(batch.len()).expect("too many cases");
        self.switch_cases.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_func(&mut self, f: Func) -> FuncId {
        self.funcs.push(f);
        FuncId(u32::try_from(self.funcs.len() - 1).expect("func arena overflow"))
    }

    pub fn add_field_members(&mut self, batch: Vec<FieldMember>) -> SliceRange {
        let begin = u32::try_from(self.field_members.len()).expect("member arena overflow");
        let count = u32::try_from(batch.len()).expect("too many members");
        self.field_members.extend(batch);
        SliceRange { begin, count }
    }

    pub fn add_escape_handle(&mut self, h: EscapeHandle) -> u32 {
        self.escape_handles.push(h);
        u32::try_from(self.escape_handles.len() - 1).expect("handle overflow")
    }

    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.index()]
    }

    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[must_use]
    pub fn block_stmt_ids(&self, b: BlockId) -> &[StmtId] {
        &self.block_stmts[self.blocks[b.index()].stmts.range()]
    }

    #[must_use]
    pub fn args_in(&self, slice: SliceRange) -> &[Arg] {
        &self.args[slice.range()]
    }

    #[must_use]
    pub fn params_in(&self, slice: SliceRange) -> &[Param] {
        &self.params[slice.range()]
    }

    #[must_use]
    pub fn cases_in(&self, slice: SliceRange) -> &[SwitchCase] {
        &self.switch_cases[slice.range()]
    }

    #[must_use]
    pub fn valid_value(&self, id: ValueId) -> bool {
        id.index() < self.values.len()
    }

    #[must_use]
    pub fn valid_block(&self, id: BlockId) -> bool {
        id.index() < self.blocks.len()
    }
}
