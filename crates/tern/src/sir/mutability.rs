//! Mutability analysis over SIR.
//!
//! Every `Assign` and `PostfixInc` must target either a symbol declared
//! `mut` or a write-through of a `&mut` borrow. Violations report
//! `WriteToImmutable` once per position.

use ahash::AHashMap;

use crate::{
    diag::{Bag, Code, Diagnostic},
    resolve::SymbolId,
    types::TypePool,
};

use super::{Module, StmtKind, ValueId, ValueKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct MutInfo {
    pub declared_mut: bool,
    pub is_set: bool,
    pub ever_written: bool,
    pub illegal_write: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MutAnalysisResult {
    pub by_symbol: AHashMap<u32, MutInfo>,
}

fn is_mut_borrow_type(types: &TypePool, t: crate::types::TypeId) -> bool {
    types.is_mut_borrow(t)
}

/// True when the write target goes through a `&mut` borrow: the lhs itself
/// is a `&mut`-typed local, or it is `base[i]` with a `&mut`-typed base.
fn is_write_through_mut_borrow_lhs(m: &Module, types: &TypePool, lhs: ValueId) -> bool {
    if !m.valid_value(lhs) {
        return false;
    }
    let v = m.value(lhs);
    match v.kind {
        ValueKind::Local { .. } => is_mut_borrow_type(types, v.ty),
        ValueKind::Index { a, .. } => m.valid_value(a) && is_mut_borrow_type(types, m.value(a).ty),
        _ => false,
    }
}

fn root_written_symbol(m: &Module, lhs: ValueId) -> Option<SymbolId> {
    if !m.valid_value(lhs) {
        return None;
    }
    let v = m.value(lhs);
    match v.kind {
        ValueKind::Local { sym } | ValueKind::Global { sym } => Some(sym),
        ValueKind::Index { a, .. } | ValueKind::Field { a, .. } => root_written_symbol(m, a),
        _ => None,
    }
}

pub fn analyze_mut(m: &Module, types: &TypePool, bag: &mut Bag) -> MutAnalysisResult {
    let mut r = MutAnalysisResult::default();

    // 1) declared-mut info from var decls and globals
    for st in &m.stmts {
        if let StmtKind::VarDecl {
            is_set,
            is_mut,
            sym: Some(sym),
            ..
        } = st.kind
        {
            let info = r.by_symbol.entry(sym.index() as u32).or_default();
            info.declared_mut = is_mut;
            info.is_set = is_set;
        }
    }
    for g in &m.globals {
        if let Some(sym) = g.sym {
            let info = r.by_symbol.entry(sym.index() as u32).or_default();
            info.declared_mut = g.is_mut;
        }
    }
    for p in &m.params {
        if let Some(sym) = p.sym {
            let info = r.by_symbol.entry(sym.index() as u32).or_default();
            info.declared_mut = p.is_mut;
        }
    }

    // 2) walk values: assign / postfix++ are writes
    for v in &m.values {
        let lhs = match v.kind {
            ValueKind::Assign { a, .. } | ValueKind::PostfixInc { a } => a,
            _ => continue,
        };
        let Some(sym) = root_written_symbol(m, lhs) else {
            continue;
        };
        let write_through = is_write_through_mut_borrow_lhs(m, types, lhs);

        let info = r.by_symbol.entry(sym.index() as u32).or_default();
        info.ever_written = true;

        if !info.declared_mut && !write_through {
            info.illegal_write = true;
            // identical-position duplicates are suppressed
            if !bag.has_at(Code::WriteToImmutable, v.span) {
                let what = if matches!(v.kind, ValueKind::Assign { .. }) {
                    "assignment"
                } else {
                    "postfix++"
                };
                bag.add(Diagnostic::error(Code::WriteToImmutable, v.span).with_arg(what));
            }
        }
    }

    r
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{self, PipelineOptions};

    #[test]
    fn tyck_and_sir_agree_on_immutable_writes() {
        // the surface checker already rejects this; the SIR analysis must
        // not duplicate the diagnostic at the same position
        let err = pipeline::compile_to_oir(
            "fn f() -> i32 { let x: i32 = 1; x = 2; return x; }",
            PipelineOptions::default(),
        )
        .expect_err("write to immutable must fail");
        let count = err
            .bag
            .diags()
            .iter()
            .filter(|d| d.code() == crate::diag::Code::WriteToImmutable)
            .count();
        assert_eq!(count, 1);
    }
}
