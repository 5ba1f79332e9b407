//! SIR structural verification and escape-handle verification.
//!
//! Any reported error fails the OIR gate: the driver must not lower a
//! module that does not verify.

use std::collections::HashSet;

use crate::resolve::SymbolId;

use super::{
    stmt_id_from_index, value_id_from_index, BlockId, EscapeBoundaryKind, EscapeHandleKind,
    Module, StmtKind, ValueId, ValueKind,
};

/// One verifier finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub msg: String,
}

fn push(errs: &mut Vec<VerifyError>, msg: String) {
    errs.push(VerifyError { msg });
}

fn valid_block(m: &Module, id: BlockId) -> bool {
    m.valid_block(id)
}

/// Structural verification: slice bounds, id validity, ownership metadata.
#[must_use]
pub fn verify_module(m: &Module) -> Vec<VerifyError> {
    let mut errs = Vec::new();

    // 1) block stmt slices: bounds + unique ownership
    let mut stmt_owner: Vec<Option<u32>> = vec![None; m.stmts.len()];
    for (bid, b) in m.blocks.iter().enumerate() {
        let end = u64::from(b.stmts.begin) + u64::from(b.stmts.count);
        if end > m.block_stmts.len() as u64 {
            push(
                &mut errs,
                format!(
                    "block #{bid} has out-of-range stmt slice: begin={} count={} (len={})",
                    b.stmts.begin,
                    b.stmts.count,
                    m.block_stmts.len()
                ),
            );
            continue;
        }
        for &sid in &m.block_stmts[b.stmts.range()] {
            if sid.index() >= m.stmts.len() {
                push(&mut errs, format!("block #{bid} references invalid stmt #{}", sid.index()));
                continue;
            }
            match stmt_owner[sid.index()] {
                Some(prev) => push(
                    &mut errs,
                    format!("stmt #{} belongs to multiple blocks ({prev}, {bid})", sid.index()),
                ),
                None => stmt_owner[sid.index()] = Some(u32::try_from(bid).expect("block index")),
            }
        }
    }

    // 2) functions: entry block, attr/param slices, acts ownership
    for (fid, f) in m.funcs.iter().enumerate() {
        if let Some(entry) = f.entry {
            if !valid_block(m, entry) {
                push(&mut errs, format!("func #{fid} has invalid entry block id {}", entry.index()));
            }
        }
        let attr_end = u64::from(f.attrs.begin) + u64::from(f.attrs.count);
        if attr_end > m.attrs.len() as u64 {
            push(&mut errs, format!("func #{fid} has out-of-range attrs slice"));
        }
        let param_end = u64::from(f.params.begin) + u64::from(f.params.count);
        if param_end > m.params.len() as u64 {
            push(&mut errs, format!("func #{fid} has out-of-range params slice"));
        }
        if f.is_acts_member {
            match f.owner_acts {
                Some(a) if (a as usize) < m.acts.len() => {}
                _ => push(&mut errs, format!("func #{fid} is acts member but owner_acts is invalid")),
            }
        }
    }

    // 2.5) field/acts slices
    for (i, f) in m.fields.iter().enumerate() {
        let end = u64::from(f.members.begin) + u64::from(f.members.count);
        if end > m.field_members.len() as u64 {
            push(&mut errs, format!("field #{i} has out-of-range member slice"));
        }
    }
    for (i, a) in m.acts.iter().enumerate() {
        let end = u64::from(a.func_begin) + u64::from(a.func_count);
        if end > m.funcs.len() as u64 {
            push(&mut errs, format!("acts #{i} has out-of-range function slice"));
            continue;
        }
        for k in 0..a.func_count {
            let fid = (a.func_begin + k) as usize;
            let f = &m.funcs[fid];
            if !f.is_acts_member || f.owner_acts != Some(u32::try_from(i).expect("acts index")) {
                push(&mut errs, format!("acts #{i} function #{fid} ownership metadata mismatch"));
            }
        }
    }

    // 3) statement references
    for (idx, s) in m.stmts.iter().enumerate() {
        let sid = stmt_id_from_index(idx);
        let need_value = |v: ValueId, what: &str, errs: &mut Vec<VerifyError>| {
            if !m.valid_value(v) {
                push(errs, format!("stmt #{} has invalid {what} value id {}", sid.index(), v.index()));
            }
        };
        match s.kind {
            StmtKind::Expr { value } => need_value(value, "expr", &mut errs),
            StmtKind::VarDecl { init, .. } => {
                if let Some(init) = init {
                    need_value(init, "init", &mut errs);
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                need_value(cond, "cond", &mut errs);
                if !valid_block(m, then_block) {
                    push(&mut errs, format!("stmt #{idx} if-then has invalid block id"));
                }
                if let Some(e) = else_block {
                    if !valid_block(m, e) {
                        push(&mut errs, format!("stmt #{idx} if-else has invalid block id"));
                    }
                }
            }
            StmtKind::While { cond, body } | StmtKind::DoWhile { cond, body } => {
                need_value(cond, "cond", &mut errs);
                if !valid_block(m, body) {
                    push(&mut errs, format!("stmt #{idx} loop body has invalid block id"));
                }
            }
            StmtKind::Scope { body, .. } => {
                if !valid_block(m, body) {
                    push(&mut errs, format!("stmt #{idx} scope has invalid block id"));
                }
            }
            StmtKind::Return { value } | StmtKind::Break { value } => {
                if let Some(v) = value {
                    need_value(v, "optional expr", &mut errs);
                }
            }
            StmtKind::Switch {
                scrutinee, cases, ..
            } => {
                need_value(scrutinee, "scrutinee", &mut errs);
                let end = u64::from(cases.begin) + u64::from(cases.count);
                if end > m.switch_cases.len() as u64 {
                    push(&mut errs, format!("stmt #{idx} has out-of-range case slice"));
                } else {
                    for case in m.cases_in(cases) {
                        if let Some(p) = case.pattern {
                            need_value(p, "case pattern", &mut errs);
                        }
                        if !valid_block(m, case.body) {
                            push(&mut errs, format!("stmt #{idx} case body has invalid block id"));
                        }
                    }
                }
            }
            StmtKind::Error | StmtKind::Continue => {}
        }
    }

    // 4) value references
    for (idx, v) in m.values.iter().enumerate() {
        let vid = value_id_from_index(idx);
        let need_child = |c: ValueId, what: &str, errs: &mut Vec<VerifyError>| {
            if !m.valid_value(c) {
                push(
                    errs,
                    format!("value #{} has invalid {what} child value id {}", vid.index(), c.index()),
                );
            }
        };
        match v.kind {
            ValueKind::Unary { a, .. }
            | ValueKind::Borrow { a, .. }
            | ValueKind::Escape { a }
            | ValueKind::PostfixInc { a }
            | ValueKind::Cast { a, .. }
            | ValueKind::Field { a, .. } => need_child(a, "a", &mut errs),
            ValueKind::Binary { a, b, .. } | ValueKind::Assign { a, b, .. } | ValueKind::Index { a, b } => {
                need_child(a, "a", &mut errs);
                need_child(b, "b", &mut errs);
            }
            ValueKind::IfExpr {
                cond,
                then_value,
                else_value,
            } => {
                need_child(cond, "cond", &mut errs);
                need_child(then_value, "then", &mut errs);
                need_child(else_value, "else", &mut errs);
            }
            ValueKind::LoopExpr { iter, body, .. } => {
                if let Some(i) = iter {
                    need_child(i, "iter", &mut errs);
                }
                if !valid_block(m, body) {
                    push(&mut errs, format!("value #{idx} loop has invalid body block id"));
                }
            }
            ValueKind::Call { callee, args } => {
                need_child(callee, "callee", &mut errs);
                let end = u64::from(args.begin) + u64::from(args.count);
                if end > m.args.len() as u64 {
                    push(&mut errs, format!("value #{idx} call has out-of-range args slice"));
                } else {
                    for arg in m.args_in(args) {
                        if let Some(av) = arg.value {
                            need_child(av, "arg", &mut errs);
                        }
                        let cend = u64::from(arg.children.begin) + u64::from(arg.children.count);
                        if cend > m.args.len() as u64 {
                            push(&mut errs, format!("value #{idx} has out-of-range named-group slice"));
                        } else {
                            for child in m.args_in(arg.children) {
                                if let Some(cv) = child.value {
                                    need_child(cv, "named-group arg", &mut errs);
                                }
                            }
                        }
                    }
                }
            }
            ValueKind::ArrayLit { args } => {
                let end = u64::from(args.begin) + u64::from(args.count);
                if end > m.args.len() as u64 {
                    push(&mut errs, format!("value #{idx} array literal has out-of-range args slice"));
                } else {
                    for arg in m.args_in(args) {
                        if let Some(av) = arg.value {
                            need_child(av, "element", &mut errs);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // 5) globals
    for (i, g) in m.globals.iter().enumerate() {
        if let Some(init) = g.init {
            if !m.valid_value(init) {
                push(&mut errs, format!("global #{i} has invalid init value id"));
            }
        }
    }

    errs
}

fn build_static_symbols(m: &Module) -> HashSet<SymbolId> {
    let mut out = HashSet::new();
    for g in &m.globals {
        if g.is_static {
            if let Some(s) = g.sym {
                out.insert(s);
            }
        }
    }
    for s in &m.stmts {
        if let StmtKind::VarDecl {
            is_static: true,
            sym: Some(sym),
            ..
        } = s.kind
        {
            out.insert(sym);
        }
    }
    out
}

fn root_symbol(m: &Module, vid: ValueId) -> Option<SymbolId> {
    if !m.valid_value(vid) {
        return None;
    }
    let v = m.value(vid);
    if v.origin_sym.is_some() {
        return v.origin_sym;
    }
    match v.kind {
        ValueKind::Local { sym } | ValueKind::Global { sym } => Some(sym),
        ValueKind::Index { a, .. } | ValueKind::Field { a, .. } => root_symbol(m, a),
        _ => None,
    }
}

fn is_static_place(m: &Module, vid: ValueId, statics: &HashSet<SymbolId>) -> bool {
    root_symbol(m, vid).is_some_and(|s| statics.contains(&s))
}

/// Verifies escape-handle metadata: the static/boundary rules and the
/// non-materialization invariant, plus one-handle-per-escape coverage.
#[must_use]
pub fn verify_escape_handles(m: &Module) -> Vec<VerifyError> {
    let mut errs = Vec::new();
    let mut handle_count = vec![0u32; m.values.len()];
    let statics = build_static_symbols(m);

    for (i, h) in m.escape_handles.iter().enumerate() {
        let Some(vid) = h.escape_value.filter(|v| m.valid_value(*v)) else {
            push(&mut errs, format!("escape-handle #{i} has invalid value id"));
            continue;
        };

        if matches!(m.value(vid).kind, ValueKind::Escape { .. }) {
            handle_count[vid.index()] += 1;
        } else {
            push(
                &mut errs,
                format!("escape-handle #{i} points to non-escape value #{}", vid.index()),
            );
        }

        if h.materialize_count != 0 {
            push(
                &mut errs,
                format!(
                    "escape-handle #{i} materialize_count must be 0 before OIR lowering (got {})",
                    h.materialize_count
                ),
            );
        }

        if !h.from_static && h.boundary == EscapeBoundaryKind::None {
            push(
                &mut errs,
                format!("escape-handle #{i} violates static/boundary rule (non-static origin with boundary=none)"),
            );
        }

        if h.from_static {
            match h.origin_sym {
                Some(s) if statics.contains(&s) => {}
                _ => push(
                    &mut errs,
                    format!("escape-handle #{i} marked from_static=true but origin symbol is not static"),
                ),
            }
        }

        if matches!(h.boundary, EscapeBoundaryKind::Return | EscapeBoundaryKind::CallArg)
            && h.kind != EscapeHandleKind::CallerSlot
        {
            push(
                &mut errs,
                format!(
                    "escape-handle #{i} boundary={} requires kind=caller_slot (got {})",
                    h.boundary.name(),
                    h.kind.name()
                ),
            );
        }

        if h.kind == EscapeHandleKind::HeapBox {
            push(&mut errs, format!("escape-handle #{i} uses heap_box kind, which is forbidden"));
        }

        if h.abi_pack_required
            && !matches!(h.boundary, EscapeBoundaryKind::Abi | EscapeBoundaryKind::Ffi)
        {
            push(
                &mut errs,
                format!(
                    "escape-handle #{i} abi_pack_required=true but boundary is {}",
                    h.boundary.name()
                ),
            );
        }
        if h.ffi_pack_required && h.boundary != EscapeBoundaryKind::Ffi {
            push(
                &mut errs,
                format!(
                    "escape-handle #{i} ffi_pack_required=true but boundary is {}",
                    h.boundary.name()
                ),
            );
        }

        if h.boundary == EscapeBoundaryKind::None {
            if h.kind != EscapeHandleKind::Trivial {
                push(
                    &mut errs,
                    format!(
                        "escape-handle #{i} boundary=none must keep trivial non-materialized kind (got {})",
                        h.kind.name()
                    ),
                );
            }
            if h.abi_pack_required || h.ffi_pack_required {
                push(&mut errs, format!("escape-handle #{i} boundary=none cannot request ABI/FFI packing"));
            }
        }
    }

    // escape tokens may only materialize into static storage
    for (idx, s) in m.stmts.iter().enumerate() {
        let StmtKind::VarDecl {
            is_static,
            init: Some(init),
            ..
        } = s.kind
        else {
            continue;
        };
        if !m.valid_value(init) || !matches!(m.value(init).kind, ValueKind::Escape { .. }) {
            continue;
        }
        if !is_static {
            push(
                &mut errs,
                format!("stmt #{idx} materializes escape handle into non-static variable declaration"),
            );
        }
    }

    for (idx, v) in m.values.iter().enumerate() {
        let ValueKind::Assign { a, b, .. } = v.kind else {
            continue;
        };
        if !m.valid_value(b) || !matches!(m.value(b).kind, ValueKind::Escape { .. }) {
            continue;
        }
        if !is_static_place(m, a, &statics) {
            push(
                &mut errs,
                format!("value #{idx} materializes escape handle into non-static assignment target"),
            );
        }
    }

    for (idx, v) in m.values.iter().enumerate() {
        if !matches!(v.kind, ValueKind::Escape { .. }) {
            continue;
        }
        match handle_count[idx] {
            0 => push(&mut errs, format!("escape value #{idx} has no EscapeHandle metadata")),
            1 => {}
            n => push(&mut errs, format!("escape value #{idx} has {n} EscapeHandle records")),
        }
    }

    errs
}

#[cfg(test)]
mod tests {
    use super::{verify_escape_handles, verify_module};
    use crate::{
        pipeline::{self, PipelineOptions},
        sir::{EscapeBoundaryKind, EscapeHandle, EscapeHandleKind},
    };

    fn sir_for(src: &str) -> crate::sir::Module {
        pipeline::compile_to_sir(src, PipelineOptions::default())
            .expect("pipeline should pass")
            .sir
    }

    #[test]
    fn wellformed_module_verifies_clean() {
        let m = sir_for(
            "fn add(a: i32, b: i32) -> i32 { return a + b; } \
             fn main() -> i32 { return add(a: 1i32, b: 2i32); }",
        );
        assert_eq!(verify_module(&m), vec![]);
        assert_eq!(verify_escape_handles(&m), vec![]);
    }

    #[test]
    fn orphan_escape_handle_is_detected() {
        let mut m = sir_for("static let g: i32 = 1; fn f() -> &&i32 { return &&g; }");
        // duplicate the existing handle: the escape now has two records
        let dup = m.escape_handles[0];
        m.escape_handles.push(dup);
        let errs = verify_escape_handles(&m);
        assert!(errs.iter().any(|e| e.msg.contains("EscapeHandle records")));
    }

    #[test]
    fn materialize_count_must_be_zero() {
        let mut m = sir_for("static let g: i32 = 1; fn f() -> &&i32 { return &&g; }");
        m.escape_handles[0].materialize_count = 2;
        let errs = verify_escape_handles(&m);
        assert!(errs.iter().any(|e| e.msg.contains("materialize_count")));
    }

    #[test]
    fn heap_box_kind_is_forbidden() {
        let mut m = sir_for("static let g: i32 = 1; fn f() -> &&i32 { return &&g; }");
        m.escape_handles[0] = EscapeHandle {
            kind: EscapeHandleKind::HeapBox,
            boundary: EscapeBoundaryKind::Return,
            ..m.escape_handles[0]
        };
        let errs = verify_escape_handles(&m);
        assert!(errs.iter().any(|e| e.msg.contains("heap_box")));
        assert!(errs.iter().any(|e| e.msg.contains("caller_slot")));
    }
}
