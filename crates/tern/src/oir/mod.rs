//! OIR: the optimization-oriented IR.
//!
//! Basic blocks with explicit terminators and block parameters in place of
//! phi nodes. Place expressions lower to address values (alloca slots,
//! `Index`/`Field` address math); reads and writes are explicit `Load` and
//! `Store` instructions.

pub mod builder;
pub mod cfg;
pub mod passes;
pub mod verify;

pub use builder::{build_oir, BuildResult};
pub use cfg::{Cfg, DomTree};
pub use passes::run_passes;
pub use verify::verify;

use smallvec::SmallVec;

use crate::types::TypeId;

use super::sir::{EscapeBoundaryKind, EscapeHandleKind};

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
pub struct InstId(u32);

impl InstId {
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

#[must_use]
pub fn value_id_from_index(idx: usize) -> ValueId {
    ValueId(u32::try_from(idx).expect("value index overflow"))
}

#[must_use]
pub fn inst_id_from_index(idx: usize) -> InstId {
    InstId(u32::try_from(idx).expect("inst index overflow"))
}

#[must_use]
pub fn block_id_from_index(idx: usize) -> BlockId {
    BlockId(u32::try_from(idx).expect("block index overflow"))
}

/// Effect model. Effectful instructions are never reordered across each
/// other; `Pure` instructions may be deleted or reordered freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Effect {
    Pure,
    MayReadMem,
    MayWriteMem,
    MayTrap,
    Call,
}

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefSite {
    /// Synthetic value (function reference, undef placeholder).
    #[default]
    None,
    Inst(InstId),
    BlockParam(BlockId, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub ty: TypeId,
    pub eff: Effect,
    pub def: DefSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
    NullCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// `as T`
    As,
    /// `as? T`
    AsQ,
    /// `as! T` — runtime-checked
    AsB,
}

/// Instruction payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstData {
    ConstInt { text: String },
    ConstBool { value: bool },
    ConstNull,
    ConstFloat { text: String },
    ConstText { text: String },

    Unary { op: UnOp, src: ValueId },
    BinOp { op: BinOp, lhs: ValueId, rhs: ValueId },
    Cast { kind: CastKind, to: TypeId, src: ValueId },
    Call { callee: ValueId, args: SmallVec<[ValueId; 4]> },
    Index { base: ValueId, index: ValueId },
    Field { base: ValueId, field: String },

    AllocaLocal { slot_ty: TypeId },
    Load { slot: ValueId },
    Store { slot: ValueId, value: ValueId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub data: InstData,
    pub eff: Effect,
    /// `None` for instructions without a result (`Store`).
    pub result: Option<ValueId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br {
        target: BlockId,
        args: SmallVec<[ValueId; 2]>,
    },
    CondBr {
        cond: ValueId,
        then_bb: BlockId,
        then_args: SmallVec<[ValueId; 2]>,
        else_bb: BlockId,
        else_args: SmallVec<[ValueId; 2]>,
    },
    Ret {
        value: Option<ValueId>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Block parameters (phi-like); values defined by this block.
    pub params: Vec<ValueId>,
    pub insts: Vec<InstId>,
    pub term: Option<Terminator>,
}

impl Block {
    #[must_use]
    pub fn has_term(&self) -> bool {
        self.term.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub ret_ty: TypeId,
    /// Synthetic function-reference value used as a call's callee.
    pub fn_value: ValueId,
    pub blocks: Vec<BlockId>,
    pub entry: Option<BlockId>,
    /// Alloca slots backed by module storage (statics); mem2reg must not
    /// promote them.
    pub pinned_slots: Vec<ValueId>,
}

/// Escape-handle optimization metadata carried into OIR (never a runtime
/// object).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeHandleHint {
    pub value: ValueId,
    pub pointee_type: TypeId,
    pub kind: EscapeHandleKind,
    pub boundary: EscapeBoundaryKind,
    pub from_static: bool,
    pub has_drop: bool,
    pub abi_pack_required: bool,
    pub ffi_pack_required: bool,
}

/// Counters accumulated by the pass manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptStats {
    pub critical_edges_split: u32,
    pub mem2reg_promoted_slots: u32,
    pub mem2reg_phi_params: u32,
    pub escape_pack_elided: u32,
    pub escape_boundary_rewrites: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub funcs: Vec<Function>,
    pub blocks: Vec<Block>,
    pub insts: Vec<Inst>,
    pub values: Vec<Value>,
    pub escape_hints: Vec<EscapeHandleHint>,
    pub opt_stats: OptStats,
}

impl Module {
    pub fn add_value(&mut self, v: Value) -> ValueId {
        self.values.push(v);
        ValueId(u32::try_from(self.values.len() - 1).expect("value overflow"))
    }

    pub fn add_inst(&mut self, i: Inst) -> InstId {
        self.insts.push(i);
        InstId(u32::try_from(self.insts.len() - 1).expect("inst overflow"))
    }

    pub fn add_block(&mut self, b: Block) -> BlockId {
        self.blocks.push(b);
        BlockId(u32::try_from(self.blocks.len() - 1).expect("block overflow"))
    }

    #[must_use]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    #[must_use]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    #[must_use]
    pub fn valid_value(&self, id: ValueId) -> bool {
        id.index() < self.values.len()
    }

    /// The instruction defining a value, if any.
    #[must_use]
    pub fn defining_inst(&self, id: ValueId) -> Option<&Inst> {
        match self.value(id).def {
            DefSite::Inst(i) => Some(self.inst(i)),
            _ => None,
        }
    }
}
