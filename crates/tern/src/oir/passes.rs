//! The OIR pass manager: critical-edge splitting, mem2reg promotion with
//! block-parameter phis, and constant folding + dead-code elimination.
//!
//! Ordering invariants: effectful instructions are never reordered across
//! each other (passes only delete or replace in place), and running the
//! pass pipeline twice yields the same module as running it once.

use ahash::{AHashMap, AHashSet};
use num_bigint::BigInt;
use num_traits::Zero;
use smallvec::smallvec;

use crate::types::TypePool;

use super::{
    cfg::{Cfg, DomTree},
    BinOp, Block, BlockId, DefSite, Effect, InstData, InstId, Module, Terminator, UnOp, ValueId,
};

/// Runs the standard pass order: critical-edge split, mem2reg, const-fold +
/// DCE.
pub fn run_passes(m: &mut Module, types: &TypePool) {
    split_critical_edges(m);
    mem2reg(m, types);
    const_fold(m, types);
    dce(m);
}

// ---------------------------------------------------------------------
// critical-edge splitting
// ---------------------------------------------------------------------

/// Splits every edge `u -> v` where `u` has multiple successors and `v` has
/// multiple predecessors, inserting a block whose sole terminator is `Br v`.
pub fn split_critical_edges(m: &mut Module) {
    for f_idx in 0..m.funcs.len() {
        let f = m.funcs[f_idx].clone();
        let cfg = Cfg::build(m, &f);

        let mut new_blocks = Vec::new();
        for &u in &f.blocks {
            let succs = cfg.succs_of(u).to_vec();
            if succs.len() < 2 {
                continue;
            }
            let Some(Terminator::CondBr {
                cond,
                then_bb,
                then_args,
                else_bb,
                else_args,
            }) = m.block(u).term.clone()
            else {
                continue;
            };

            let split_edge = |m: &mut Module,
                                  new_blocks: &mut Vec<BlockId>,
                                  v: BlockId,
                                  args: smallvec::SmallVec<[ValueId; 2]>|
             -> (BlockId, smallvec::SmallVec<[ValueId; 2]>) {
                if cfg.preds_of(v).len() < 2 {
                    return (v, args);
                }
                let mid = m.add_block(Block {
                    params: Vec::new(),
                    insts: Vec::new(),
                    term: Some(Terminator::Br { target: v, args }),
                });
                new_blocks.push(mid);
                m.opt_stats.critical_edges_split += 1;
                (mid, smallvec![])
            };

            let (new_then, new_then_args) = split_edge(m, &mut new_blocks, then_bb, then_args);
            let (new_else, new_else_args) = split_edge(m, &mut new_blocks, else_bb, else_args);

            m.block_mut(u).term = Some(Terminator::CondBr {
                cond,
                then_bb: new_then,
                then_args: new_then_args,
                else_bb: new_else,
                else_args: new_else_args,
            });
        }

        m.funcs[f_idx].blocks.extend(new_blocks);
    }
}

// ---------------------------------------------------------------------
// mem2reg
// ---------------------------------------------------------------------

/// Promotes alloca slots whose address never escapes (used only as the slot
/// of `Load`/`Store`) to SSA-like block parameters at join points computed
/// from the dominance frontier.
pub fn mem2reg(m: &mut Module, types: &TypePool) {
    let _ = types;
    for f_idx in 0..m.funcs.len() {
        promote_in_function(m, f_idx);
    }
}

fn promote_in_function(m: &mut Module, f_idx: usize) {
    let f = m.funcs[f_idx].clone();
    let Some(entry) = f.entry else { return };

    let cfg = Cfg::build(m, &f);
    let dom = DomTree::build(&cfg, entry);

    // collect address-escaped slot values: any use outside Load/Store-slot
    let mut escaped: AHashSet<ValueId> = AHashSet::new();
    let mut allocas: Vec<(ValueId, InstId, crate::types::TypeId)> = Vec::new();

    for &bid in &f.blocks {
        for &iid in &m.block(bid).insts.clone() {
            let inst = m.inst(iid);
            match &inst.data {
                InstData::AllocaLocal { slot_ty } => {
                    if let Some(r) = inst.result {
                        allocas.push((r, iid, *slot_ty));
                    }
                }
                InstData::Load { .. } => {}
                InstData::Store { slot: _, value } => {
                    // storing a slot's address elsewhere escapes it
                    escaped.insert(*value);
                }
                other => {
                    for v in inst_data_operands(other) {
                        escaped.insert(v);
                    }
                }
            }
        }
        for v in term_operands(m.block(bid).term.as_ref()) {
            escaped.insert(v);
        }
    }

    let promotable: Vec<(ValueId, InstId, crate::types::TypeId)> = allocas
        .into_iter()
        .filter(|(v, _, _)| !escaped.contains(v) && !f.pinned_slots.contains(v))
        .collect();

    let mut replace: AHashMap<ValueId, ValueId> = AHashMap::new();
    let mut dead: AHashSet<InstId> = AHashSet::new();

    for (slot, alloca_inst, slot_ty) in promotable {
        // definition blocks for this slot
        let mut def_blocks: Vec<BlockId> = Vec::new();
        for &bid in &f.blocks {
            for &iid in &m.block(bid).insts {
                if dead.contains(&iid) {
                    continue;
                }
                if let InstData::Store { slot: s, .. } = m.inst(iid).data {
                    if resolve(&replace, s) == slot && !def_blocks.contains(&bid) {
                        def_blocks.push(bid);
                    }
                }
            }
        }

        // iterated dominance frontier -> phi blocks, in deterministic order
        let mut phi_blocks: Vec<BlockId> = Vec::new();
        let mut work = def_blocks.clone();
        while let Some(b) = work.pop() {
            for &df in dom.frontier.get(&b).map_or(&Vec::new(), |v| v) {
                if !phi_blocks.contains(&df) {
                    phi_blocks.push(df);
                    work.push(df);
                }
            }
        }
        phi_blocks.sort_by_key(|b| BlockId::index(*b));

        let mut phi_param: AHashMap<BlockId, ValueId> = AHashMap::new();
        for &pb in &phi_blocks {
            let idx = u32::try_from(m.block(pb).params.len()).expect("param index");
            let param = m.add_value(super::Value {
                ty: slot_ty,
                eff: Effect::Pure,
                def: DefSite::BlockParam(pb, idx),
            });
            m.block_mut(pb).params.push(param);
            phi_param.insert(pb, param);
            m.opt_stats.mem2reg_phi_params += 1;
        }

        // rename along the dominator tree; edge args recorded per (pred,
        // succ) once the pred's end-of-block value is known
        let undef = m.add_value(super::Value {
            ty: slot_ty,
            eff: Effect::Pure,
            def: DefSite::None,
        });

        let mut stack: Vec<(BlockId, ValueId)> = vec![(entry, undef)];
        let mut edge_value: AHashMap<BlockId, ValueId> = AHashMap::new();
        while let Some((b, incoming)) = stack.pop() {
            let mut cur = phi_param.get(&b).copied().unwrap_or(incoming);

            for &iid in &m.block(b).insts.clone() {
                if dead.contains(&iid) {
                    continue;
                }
                match m.inst(iid).data.clone() {
                    InstData::Load { slot: s } if resolve(&replace, s) == slot => {
                        if let Some(r) = m.inst(iid).result {
                            replace.insert(r, cur);
                        }
                        dead.insert(iid);
                    }
                    InstData::Store { slot: s, value } if resolve(&replace, s) == slot => {
                        cur = resolve(&replace, value);
                        dead.insert(iid);
                    }
                    _ => {}
                }
            }

            edge_value.insert(b, cur);
            for &c in dom.children.get(&b).map_or(&Vec::new(), |v| v) {
                stack.push((c, cur));
            }
        }

        // append branch args for every edge into a phi block
        for &pb in &phi_blocks {
            for &pred in cfg.preds_of(pb) {
                let v = edge_value.get(&pred).copied().unwrap_or(undef);
                append_edge_arg(m, pred, pb, v);
            }
        }

        // unreachable blocks never ran the rename walk; their accesses to
        // the promoted slot are dead as well
        for &bid in &f.blocks {
            if edge_value.contains_key(&bid) {
                continue;
            }
            for &iid in &m.block(bid).insts.clone() {
                if dead.contains(&iid) {
                    continue;
                }
                match m.inst(iid).data.clone() {
                    InstData::Load { slot: s } if resolve(&replace, s) == slot => {
                        if let Some(r) = m.inst(iid).result {
                            replace.insert(r, undef);
                        }
                        dead.insert(iid);
                    }
                    InstData::Store { slot: s, .. } if resolve(&replace, s) == slot => {
                        dead.insert(iid);
                    }
                    _ => {}
                }
            }
        }

        dead.insert(alloca_inst);
        m.opt_stats.mem2reg_promoted_slots += 1;
    }

    // apply replacements everywhere in this function
    if !replace.is_empty() {
        for &bid in &f.blocks {
            for &iid in &m.block(bid).insts.clone() {
                let mut inst = m.inst(iid).clone();
                substitute_inst(&mut inst.data, &replace);
                *m.inst_mut(iid) = inst;
            }
            if let Some(mut term) = m.block(bid).term.clone() {
                substitute_term(&mut term, &replace);
                m.block_mut(bid).term = Some(term);
            }
        }
    }

    // drop rewritten loads/stores/allocas from the block lists
    if !dead.is_empty() {
        for &bid in &f.blocks {
            let kept: Vec<InstId> = m
                .block(bid)
                .insts
                .iter()
                .copied()
                .filter(|i| !dead.contains(i))
                .collect();
            m.block_mut(bid).insts = kept;
        }
    }
}

fn resolve(map: &AHashMap<ValueId, ValueId>, mut v: ValueId) -> ValueId {
    let mut hops = 0;
    while let Some(&next) = map.get(&v) {
        v = next;
        hops += 1;
        if hops > map.len() {
            break;
        }
    }
    v
}

fn append_edge_arg(m: &mut Module, pred: BlockId, succ: BlockId, v: ValueId) {
    let Some(term) = m.block(pred).term.clone() else {
        return;
    };
    let new_term = match term {
        Terminator::Br { target, mut args } => {
            if target == succ {
                args.push(v);
            }
            Terminator::Br { target, args }
        }
        Terminator::CondBr {
            cond,
            then_bb,
            mut then_args,
            else_bb,
            mut else_args,
        } => {
            if then_bb == succ {
                then_args.push(v);
            }
            if else_bb == succ {
                else_args.push(v);
            }
            Terminator::CondBr {
                cond,
                then_bb,
                then_args,
                else_bb,
                else_args,
            }
        }
        ret @ Terminator::Ret { .. } => ret,
    };
    m.block_mut(pred).term = Some(new_term);
}

fn inst_data_operands(data: &InstData) -> Vec<ValueId> {
    match data {
        InstData::ConstInt { .. }
        | InstData::ConstBool { .. }
        | InstData::ConstNull
        | InstData::ConstFloat { .. }
        | InstData::ConstText { .. }
        | InstData::AllocaLocal { .. } => Vec::new(),
        InstData::Unary { src, .. } | InstData::Cast { src, .. } => vec![*src],
        InstData::BinOp { lhs, rhs, .. } => vec![*lhs, *rhs],
        InstData::Call { callee, args } => {
            let mut out = vec![*callee];
            out.extend(args.iter().copied());
            out
        }
        InstData::Index { base, index } => vec![*base, *index],
        InstData::Field { base, .. } => vec![*base],
        InstData::Load { slot } => vec![*slot],
        InstData::Store { slot, value } => vec![*slot, *value],
    }
}

fn term_operands(term: Option<&Terminator>) -> Vec<ValueId> {
    match term {
        Some(Terminator::Br { args, .. }) => args.to_vec(),
        Some(Terminator::CondBr {
            cond,
            then_args,
            else_args,
            ..
        }) => {
            let mut out = vec![*cond];
            out.extend(then_args.iter().copied());
            out.extend(else_args.iter().copied());
            out
        }
        Some(Terminator::Ret { value }) => value.iter().copied().collect(),
        None => Vec::new(),
    }
}

fn substitute_inst(data: &mut InstData, map: &AHashMap<ValueId, ValueId>) {
    let fix = |v: &mut ValueId| *v = resolve(map, *v);
    match data {
        InstData::ConstInt { .. }
        | InstData::ConstBool { .. }
        | InstData::ConstNull
        | InstData::ConstFloat { .. }
        | InstData::ConstText { .. }
        | InstData::AllocaLocal { .. } => {}
        InstData::Unary { src, .. } | InstData::Cast { src, .. } => fix(src),
        InstData::BinOp { lhs, rhs, .. } => {
            fix(lhs);
            fix(rhs);
        }
        InstData::Call { callee, args } => {
            fix(callee);
            for a in args {
                fix(a);
            }
        }
        InstData::Index { base, index } => {
            fix(base);
            fix(index);
        }
        InstData::Field { base, .. } => fix(base),
        InstData::Load { slot } => fix(slot),
        InstData::Store { slot, value } => {
            fix(slot);
            fix(value);
        }
    }
}

fn substitute_term(term: &mut Terminator, map: &AHashMap<ValueId, ValueId>) {
    let fix = |v: &mut ValueId| *v = resolve(map, *v);
    match term {
        Terminator::Br { args, .. } => {
            for a in args {
                fix(a);
            }
        }
        Terminator::CondBr {
            cond,
            then_args,
            else_args,
            ..
        } => {
            fix(cond);
            for a in then_args {
                fix(a);
            }
            for a in else_args {
                fix(a);
            }
        }
        Terminator::Ret { value } => {
            if let Some(v) = value {
                fix(v);
            }
        }
    }
}

// ---------------------------------------------------------------------
// constant folding
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ConstVal {
    Int(BigInt),
    Bool(bool),
}

fn const_of(m: &Module, v: ValueId) -> Option<ConstVal> {
    match &m.defining_inst(v)?.data {
        InstData::ConstInt { text } => text.parse::<BigInt>().ok().map(ConstVal::Int),
        InstData::ConstBool { value } => Some(ConstVal::Bool(*value)),
        _ => None,
    }
}

/// Reduces `v` into the result type's range: modular for unsigned, centered
/// two's-complement wrap for signed.
fn wrap_to_type(v: BigInt, bits: u32, signed: bool) -> BigInt {
    let modulus = BigInt::from(1u8) << bits;
    let mut r = v % &modulus;
    if r < BigInt::zero() {
        r += &modulus;
    }
    if signed {
        let half = BigInt::from(1u8) << (bits - 1);
        if r >= half {
            r -= &modulus;
        }
    }
    r
}

/// Folds pure unary/binary ops over constants, in place. Results respect
/// the result type's modular semantics.
pub fn const_fold(m: &mut Module, types: &TypePool) {
    for f_idx in 0..m.funcs.len() {
        let blocks = m.funcs[f_idx].blocks.clone();
        for bid in blocks {
            for &iid in &m.block(bid).insts.clone() {
                fold_inst(m, types, iid);
            }
        }
    }
}

fn fold_inst(m: &mut Module, types: &TypePool, iid: InstId) {
    let inst = m.inst(iid).clone();
    if inst.eff != Effect::Pure {
        return;
    }
    let Some(result) = inst.result else { return };

    if let Some(data) = try_fold(m, types, &inst.data, result) {
        let slot = m.inst_mut(iid);
        slot.data = data;
        slot.eff = Effect::Pure;
    }
}

fn try_fold(
    m: &Module,
    types: &TypePool,
    data: &InstData,
    result: ValueId,
) -> Option<InstData> {
    match data {
        InstData::BinOp { op, lhs, rhs } => {
            let l = const_of(m, *lhs)?;
            let r = const_of(m, *rhs)?;
            fold_binop(*op, &l, &r, types, m.value(result).ty)
        }
        InstData::Unary { op, src } => {
            let s = const_of(m, *src)?;
            fold_unop(*op, &s, types, m.value(result).ty)
        }
        _ => None,
    }
}

fn fold_binop(
    op: BinOp,
    l: &ConstVal,
    r: &ConstVal,
    types: &TypePool,
    result_ty: crate::types::TypeId,
) -> Option<InstData> {
    match (l, r) {
        (ConstVal::Int(a), ConstVal::Int(b)) => match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                let (bits, signed) = types.as_builtin(result_ty)?.int_bits()?;
                let raw = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    _ => unreachable!(),
                };
                let wrapped = wrap_to_type(raw, bits, signed);
                Some(InstData::ConstInt {
                    text: wrapped.to_string(),
                })
            }
            BinOp::Lt => Some(InstData::ConstBool { value: a < b }),
            BinOp::Le => Some(InstData::ConstBool { value: a <= b }),
            BinOp::Gt => Some(InstData::ConstBool { value: a > b }),
            BinOp::Ge => Some(InstData::ConstBool { value: a >= b }),
            BinOp::Eq => Some(InstData::ConstBool { value: a == b }),
            BinOp::Ne => Some(InstData::ConstBool { value: a != b }),
            _ => None,
        },
        (ConstVal::Bool(a), ConstVal::Bool(b)) => match op {
            BinOp::Eq => Some(InstData::ConstBool { value: a == b }),
            BinOp::Ne => Some(InstData::ConstBool { value: a != b }),
            _ => None,
        },
        _ => None,
    }
}

fn fold_unop(
    op: UnOp,
    s: &ConstVal,
    types: &TypePool,
    result_ty: crate::types::TypeId,
) -> Option<InstData> {
    match (op, s) {
        (UnOp::Neg, ConstVal::Int(v)) => {
            let (bits, signed) = types.as_builtin(result_ty)?.int_bits()?;
            let wrapped = wrap_to_type(-v.clone(), bits, signed);
            Some(InstData::ConstInt {
                text: wrapped.to_string(),
            })
        }
        (UnOp::Plus, ConstVal::Int(v)) => Some(InstData::ConstInt { text: v.to_string() }),
        (UnOp::Not, ConstVal::Bool(b)) => Some(InstData::ConstBool { value: !b }),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// dead-code elimination
// ---------------------------------------------------------------------

/// Removes dead pure instructions. Live are: direct terminator inputs,
/// block-parameter arguments, instructions with non-`Pure` effect, and
/// everything transitively feeding a live instruction.
pub fn dce(m: &mut Module) {
    for f_idx in 0..m.funcs.len() {
        let blocks = m.funcs[f_idx].blocks.clone();

        let mut live_values: AHashSet<ValueId> = AHashSet::new();
        for &bid in &blocks {
            for v in term_operands(m.block(bid).term.as_ref()) {
                live_values.insert(v);
            }
            for &iid in &m.block(bid).insts {
                if m.inst(iid).eff != Effect::Pure {
                    for v in inst_data_operands(&m.inst(iid).data) {
                        live_values.insert(v);
                    }
                    if let Some(r) = m.inst(iid).result {
                        live_values.insert(r);
                    }
                }
            }
        }

        // propagate liveness backwards to a fixed point
        let mut changed = true;
        while changed {
            changed = false;
            for &bid in &blocks {
                for &iid in &m.block(bid).insts {
                    let inst = m.inst(iid);
                    let is_live = inst.eff != Effect::Pure
                        || inst.result.is_some_and(|r| live_values.contains(&r));
                    if is_live {
                        for v in inst_data_operands(&inst.data) {
                            if live_values.insert(v) {
                                changed = true;
                            }
                        }
                    }
                }
            }
        }

        for &bid in &blocks {
            let m_insts: Vec<InstId> = m.block(bid).insts.clone();
            let kept: Vec<InstId> = m_insts
                .into_iter()
                .filter(|&iid| {
                    let inst = m.inst(iid);
                    inst.eff != Effect::Pure
                        || inst.result.is_some_and(|r| live_values.contains(&r))
                })
                .collect();
            m.block_mut(bid).insts = kept;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::wrap_to_type;
    use num_bigint::BigInt;

    #[test]
    fn wrap_semantics_match_twos_complement() {
        // i32: 2147483648 wraps to -2147483648
        assert_eq!(
            wrap_to_type(BigInt::from(2_147_483_648i64), 32, true),
            BigInt::from(-2_147_483_648i64)
        );
        // u8: 256 wraps to 0, 257 to 1
        assert_eq!(wrap_to_type(BigInt::from(256), 8, false), BigInt::from(0));
        assert_eq!(wrap_to_type(BigInt::from(257), 8, false), BigInt::from(1));
        // negative into unsigned
        assert_eq!(wrap_to_type(BigInt::from(-1), 8, false), BigInt::from(255));
        // identity inside range
        assert_eq!(wrap_to_type(BigInt::from(5), 32, true), BigInt::from(5));
    }
}
