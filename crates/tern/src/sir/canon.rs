//! SIR canonicalization, run before the capability analyses.
//!
//! Recomputes place classes from kinds (demoting range subscripts), origin
//! symbols through Borrow/Escape/Index/Field chains, and effect classes by
//! joining children; normalizes call-argument slices (nested named-groups
//! are downgraded to positional, empty groups are flattened away, slices are
//! rewritten into a fresh packed table). The pass is idempotent.

use crate::ast::{BinaryOp, SliceRange};
use crate::resolve::SymbolId;

use super::{Arg, ArgKind, EffectClass, Module, PlaceClass, ValueId, ValueKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalizeResult {
    pub rewritten_values: u32,
    pub rewritten_calls: u32,
}

/// Conservative join of effect classes.
#[must_use]
pub fn join_effect(a: EffectClass, b: EffectClass) -> EffectClass {
    a.max(b)
}

/// Base effect of a value kind before joining children.
#[must_use]
pub fn base_effect(kind: &ValueKind) -> EffectClass {
    match kind {
        ValueKind::Assign { .. } | ValueKind::PostfixInc { .. } | ValueKind::Escape { .. } => {
            EffectClass::MayWrite
        }
        ValueKind::Call { .. } => EffectClass::Unknown,
        _ => EffectClass::Pure,
    }
}

/// Root symbol reached by following `a`-children through
/// Borrow/Escape/Index/Field down to a Local or Global.
#[must_use]
pub fn root_symbol(m: &Module, vid: ValueId) -> Option<SymbolId> {
    if !m.valid_value(vid) {
        return None;
    }
    match m.value(vid).kind {
        ValueKind::Local { sym } | ValueKind::Global { sym } => Some(sym),
        ValueKind::Index { a, .. }
        | ValueKind::Field { a, .. }
        | ValueKind::Borrow { a, .. }
        | ValueKind::Escape { a } => root_symbol(m, a),
        _ => None,
    }
}

/// Effect of a value including its children's effects.
#[must_use]
pub fn computed_effect(m: &Module, vid: ValueId) -> EffectClass {
    let v = m.value(vid);
    let mut eff = base_effect(&v.kind);
    let join_child = |m: &Module, cid: ValueId, eff: &mut EffectClass| {
        if m.valid_value(cid) {
            *eff = join_effect(*eff, m.value(cid).effect);
        }
    };

    match v.kind {
        ValueKind::Unary { a, .. }
        | ValueKind::Borrow { a, .. }
        | ValueKind::Escape { a }
        | ValueKind::PostfixInc { a }
        | ValueKind::Cast { a, .. }
        | ValueKind::Field { a, .. } => join_child(m, a, &mut eff),
        ValueKind::Binary { a, b, .. } | ValueKind::Assign { a, b, .. } | ValueKind::Index { a, b } => {
            join_child(m, a, &mut eff);
            join_child(m, b, &mut eff);
        }
        ValueKind::IfExpr {
            cond,
            then_value,
            else_value,
        } => {
            join_child(m, cond, &mut eff);
            join_child(m, then_value, &mut eff);
            join_child(m, else_value, &mut eff);
        }
        ValueKind::Call { callee, args } => {
            join_child(m, callee, &mut eff);
            for arg in collect_arg_values(m, args) {
                join_child(m, arg, &mut eff);
            }
        }
        ValueKind::ArrayLit { args } => {
            for arg in collect_arg_values(m, args) {
                join_child(m, arg, &mut eff);
            }
        }
        ValueKind::LoopExpr { iter, .. } => {
            if let Some(i) = iter {
                join_child(m, i, &mut eff);
            }
        }
        _ => {}
    }
    eff
}

fn collect_arg_values(m: &Module, slice: SliceRange) -> Vec<ValueId> {
    let mut out = Vec::new();
    for arg in m.args_in(clamped(slice, m.args.len())) {
        if arg.kind == ArgKind::NamedGroup {
            for child in m.args_in(clamped(arg.children, m.args.len())) {
                if let Some(v) = child.value {
                    out.push(v);
                }
            }
        } else if let Some(v) = arg.value {
            out.push(v);
        }
    }
    out
}

fn clamped(slice: SliceRange, len: usize) -> SliceRange {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    let begin = slice.begin.min(len);
    let count = slice.count.min(len - begin);
    SliceRange { begin, count }
}

/// True when the value is `base[lo..hi]` or `base[lo..:hi]`.
#[must_use]
pub fn is_range_index(m: &Module, vid: ValueId) -> bool {
    let ValueKind::Index { b, .. } = m.value(vid).kind else {
        return false;
    };
    if !m.valid_value(b) {
        return false;
    }
    matches!(
        m.value(b).kind,
        ValueKind::Binary {
            op: BinaryOp::Range | BinaryOp::RangeInclusive,
            ..
        }
    )
}

pub fn canonicalize(m: &mut Module) -> CanonicalizeResult {
    let mut out = CanonicalizeResult::default();
    canonicalize_arg_slices(m, &mut out);

    for idx in 0..m.values.len() {
        let vid = value_id(idx);
        let v = *m.value(vid);

        // 1) place canonicalization
        let new_place = match v.kind {
            ValueKind::Local { .. } | ValueKind::Global { .. } => PlaceClass::Local,
            ValueKind::Index { .. } => {
                if is_range_index(m, vid) {
                    PlaceClass::NotPlace
                } else {
                    PlaceClass::Index
                }
            }
            ValueKind::Field { .. } => PlaceClass::Field,
            _ => PlaceClass::NotPlace,
        };

        // 2) origin symbol canonicalization
        let new_origin = match v.kind {
            ValueKind::Borrow { .. }
            | ValueKind::Escape { .. }
            | ValueKind::Index { .. }
            | ValueKind::Field { .. } => root_symbol(m, vid).or(v.origin_sym),
            _ => v.origin_sym,
        };

        // 3) effect canonicalization (children are already finalized:
        // values are appended bottom-up)
        let new_effect = computed_effect(m, vid);

        if new_place != v.place || new_effect != v.effect || new_origin != v.origin_sym {
            out.rewritten_values += 1;
        }
        let vm = m.value_mut(vid);
        vm.place = new_place;
        vm.origin_sym = new_origin;
        vm.effect = new_effect;
    }

    out
}

/// Rebuilds every call/array arg slice into a packed table with canonical
/// shapes: no nested named-groups, no empty groups, children adjacent to
/// their parent.
fn canonicalize_arg_slices(m: &mut Module, out: &mut CanonicalizeResult) {
    if m.args.is_empty() {
        return;
    }

    let old_args = m.args.clone();
    let mut new_args: Vec<Arg> = Vec::with_capacity(old_args.len());

    for idx in 0..m.values.len() {
        let vid = value_id(idx);
        let v = *m.value(vid);
        let (is_call, slice) = match v.kind {
            ValueKind::Call { args, .. } => (true, args),
            ValueKind::ArrayLit { args } => (false, args),
            _ => continue,
        };

        let slice = clamped(slice, old_args.len());
        let new_begin = u32::try_from(new_args.len()).expect("arg table overflow");
        let mut new_count = 0u32;

        for arg in &old_args[slice.range()] {
            if is_call && arg.kind == ArgKind::NamedGroup {
                let child_slice = clamped(arg.children, old_args.len());
                if child_slice.count == 0 {
                    // empty groups are flattened away
                    continue;
                }

                let parent_idx = new_args.len();
                let mut parent = *arg;
                parent.children = SliceRange::EMPTY;
                new_args.push(parent);
                new_count += 1;

                let packed_begin = u32::try_from(new_args.len()).expect("arg table overflow");
                let mut packed_count = 0u32;
                for child in &old_args[child_slice.range()] {
                    let mut child = *child;
                    if child.kind == ArgKind::NamedGroup {
                        // nested named-groups are not allowed; downgrade to
                        // positional so later passes see a stable shape
                        child.kind = ArgKind::Positional;
                        child.label = None;
                        child.children = SliceRange::EMPTY;
                    }
                    new_args.push(child);
                    new_count += 1;
                    packed_count += 1;
                }
                new_args[parent_idx].children = SliceRange {
                    begin: packed_begin,
                    count: packed_count,
                };
                continue;
            }

            let mut plain = *arg;
            plain.children = SliceRange::EMPTY;
            if !is_call && plain.kind == ArgKind::NamedGroup {
                plain.kind = ArgKind::Positional;
                plain.label = None;
            }
            new_args.push(plain);
            new_count += 1;
        }

        let new_slice = SliceRange {
            begin: new_begin,
            count: new_count,
        };
        let old_slice = match v.kind {
            ValueKind::Call { args, .. } | ValueKind::ArrayLit { args } => args,
            _ => unreachable!(),
        };
        if old_slice != new_slice {
            out.rewritten_calls += 1;
        }

        match &mut m.value_mut(vid).kind {
            ValueKind::Call { args, .. } | ValueKind::ArrayLit { args } => *args = new_slice,
            _ => {}
        }
    }

    m.args = new_args;
}

fn value_id(idx: usize) -> ValueId {
    // ValueId construction is module-internal; reuse add-order identity
    super::value_id_from_index(idx)
}

#[cfg(test)]
mod tests {
    use super::canonicalize;
    use crate::pipeline::{self, PipelineOptions};

    #[test]
    fn canonicalize_is_idempotent() {
        let out = pipeline::compile_to_sir(
            "fn add(a: i32, b: i32) -> i32 { return a + b; } \
             fn main() -> i32 { let mut x: i32[3] = [1, 2, 3]; x[1] = 9; return add(a: x[1], b: 2i32); }",
            PipelineOptions::default(),
        )
        .expect("pipeline should pass");

        let mut once = out.sir.clone();
        canonicalize(&mut once);
        let mut twice = once.clone();
        let second = canonicalize(&mut twice);
        assert_eq!(once, twice);
        assert_eq!(second.rewritten_values, 0);
    }

    #[test]
    fn range_subscript_is_not_a_place() {
        let out = pipeline::compile_to_sir(
            "fn f(xs: i32[]) -> i32 { let s: i32[] = xs[1..3]; return 0; }",
            PipelineOptions::default(),
        )
        .expect("pipeline should pass");
        use crate::sir::{PlaceClass, ValueKind};
        let mut saw_range_index = false;
        for (i, v) in out.sir.values.iter().enumerate() {
            if matches!(v.kind, ValueKind::Index { .. })
                && super::is_range_index(&out.sir, crate::sir::value_id_from_index(i))
            {
                saw_range_index = true;
                assert_eq!(v.place, PlaceClass::NotPlace);
            }
        }
        assert!(saw_range_index);
    }
}
