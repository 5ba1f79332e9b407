//! OIR structural verifier — the last gate before backend handoff.

use super::{InstData, Module, Terminator, ValueId};

/// One verifier finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub msg: String,
}

fn push(errs: &mut Vec<VerifyError>, msg: String) {
    errs.push(VerifyError { msg });
}

/// Checks:
/// - every function has a valid entry block;
/// - every block has a terminator;
/// - every branch's argument count equals the target's parameter count;
/// - every referenced value id is within range;
/// - every `Store`'s slot is an address value (`AllocaLocal`, `Index`, or
///   `Field` result).
#[must_use]
pub fn verify(m: &Module) -> Vec<VerifyError> {
    let mut errs = Vec::new();

    for (fid, f) in m.funcs.iter().enumerate() {
        match f.entry {
            Some(entry) if entry.index() < m.blocks.len() => {}
            _ => {
                push(&mut errs, format!("func #{fid} ({}) has no valid entry block", f.name));
                continue;
            }
        }

        for &bid in &f.blocks {
            let block = m.block(bid);

            let Some(term) = &block.term else {
                push(&mut errs, format!("block #{} has no terminator", bid.index()));
                continue;
            };

            // branch arity against target params
            let check_edge = |target: super::BlockId, argc: usize, errs: &mut Vec<VerifyError>| {
                if target.index() >= m.blocks.len() {
                    push(errs, format!("block #{} branches to invalid block", bid.index()));
                    return;
                }
                let want = m.block(target).params.len();
                if argc != want {
                    push(
                        errs,
                        format!(
                            "block #{} branch to #{} passes {argc} args but target has {want} params",
                            bid.index(),
                            target.index()
                        ),
                    );
                }
            };
            match term {
                Terminator::Br { target, args } => check_edge(*target, args.len(), &mut errs),
                Terminator::CondBr {
                    cond,
                    then_bb,
                    then_args,
                    else_bb,
                    else_args,
                } => {
                    check_value(m, *cond, bid.index(), &mut errs);
                    check_edge(*then_bb, then_args.len(), &mut errs);
                    check_edge(*else_bb, else_args.len(), &mut errs);
                }
                Terminator::Ret { value } => {
                    if let Some(v) = value {
                        check_value(m, *v, bid.index(), &mut errs);
                    }
                }
            }
            for &iid in &block.insts {
                if iid.index() >= m.insts.len() {
                    push(&mut errs, format!("block #{} lists invalid inst id", bid.index()));
                    continue;
                }
                let inst = m.inst(iid);
                for v in operands(&inst.data) {
                    check_value(m, v, bid.index(), &mut errs);
                }
                if let Some(r) = inst.result {
                    check_value(m, r, bid.index(), &mut errs);
                }

                if let InstData::Store { slot, .. } = inst.data {
                    if m.valid_value(slot) {
                        let ok = matches!(
                            m.defining_inst(slot).map(|i| &i.data),
                            Some(
                                InstData::AllocaLocal { .. }
                                    | InstData::Index { .. }
                                    | InstData::Field { .. }
                            )
                        );
                        if !ok {
                            push(
                                &mut errs,
                                format!(
                                    "block #{} stores through a non-address value #{}",
                                    bid.index(),
                                    slot.index()
                                ),
                            );
                        }
                    }
                }
            }
        }
    }

    errs
}

fn check_value(m: &Module, v: ValueId, block: usize, errs: &mut Vec<VerifyError>) {
    if !m.valid_value(v) {
        push(errs, format!("block #{block} references out-of-range value id {}", v.index()));
    }
}

fn operands(data: &InstData) -> Vec<ValueId> {
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
