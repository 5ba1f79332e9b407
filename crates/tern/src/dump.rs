//! Deterministic debug dumps behind the driver's internal flags
//! (`token-dump`, `ast-dump`, `sir-dump`, `oir-dump`).
//!
//! Output is plain text for humans and golden tests; it is not a stable
//! interchange format.

use std::fmt::Write as _;

use crate::{
    ast::{AstArena, ExprId, ExprKind, StmtId, StmtKind},
    intern::Interner,
    oir,
    sir,
    token::Token,
    types::TypePool,
};

/// One line per token: kind, span, lexeme.
#[must_use]
pub fn dump_tokens(tokens: &[Token], source: &str) -> String {
    let mut out = String::new();
    for t in tokens {
        let name: &'static str = t.kind.into();
        let _ = writeln!(
            out,
            "{name:<22} [{}, {})\t{:?}",
            t.span.lo,
            t.span.hi,
            t.lexeme(source)
        );
    }
    out
}

/// Indented statement/expression tree.
#[must_use]
pub fn dump_ast(arena: &AstArena, root: StmtId, interner: &Interner, types: &TypePool) -> String {
    let mut out = String::new();
    dump_stmt(arena, root, interner, types, 0, &mut out);
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_stmt(
    arena: &AstArena,
    sid: StmtId,
    interner: &Interner,
    types: &TypePool,
    depth: usize,
    out: &mut String,
) {
    indent(out, depth);
    let stmt = arena.stmt(sid);
    match stmt.kind {
        StmtKind::Error => out.push_str("error\n"),
        StmtKind::Empty => out.push_str("empty\n"),
        StmtKind::Continue => out.push_str("continue\n"),
        StmtKind::Expr { expr } => {
            out.push_str("expr-stmt\n");
            dump_expr(arena, expr, interner, types, depth + 1, out);
        }
        StmtKind::Block { children } => {
            out.push_str("block\n");
            for &child in arena.stmt_children(children) {
                dump_stmt(arena, child, interner, types, depth + 1, out);
            }
        }
        StmtKind::Var(v) => {
            let _ = writeln!(
                out,
                "var {}{}{}",
                if v.is_static { "static " } else { "" },
                if v.is_mut { "mut " } else { "" },
                interner.resolve(v.name)
            );
            if let Some(init) = v.init {
                dump_expr(arena, init, interner, types, depth + 1, out);
            }
        }
        StmtKind::If {
            cond,
            then_block,
            else_block,
        } => {
            out.push_str("if\n");
            dump_expr(arena, cond, interner, types, depth + 1, out);
            dump_stmt(arena, then_block, interner, types, depth + 1, out);
            if let Some(e) = else_block {
                dump_stmt(arena, e, interner, types, depth + 1, out);
            }
        }
        StmtKind::While { cond, body } => {
            out.push_str("while\n");
            dump_expr(arena, cond, interner, types, depth + 1, out);
            dump_stmt(arena, body, interner, types, depth + 1, out);
        }
        StmtKind::DoScope { body } => {
            out.push_str("do\n");
            dump_stmt(arena, body, interner, types, depth + 1, out);
        }
        StmtKind::DoWhile { body, cond } => {
            out.push_str("do-while\n");
            dump_stmt(arena, body, interner, types, depth + 1, out);
            dump_expr(arena, cond, interner, types, depth + 1, out);
        }
        StmtKind::Manual { body } => {
            out.push_str("manual\n");
            dump_stmt(arena, body, interner, types, depth + 1, out);
        }
        StmtKind::Return { value } => {
            out.push_str("return\n");
            if let Some(v) = value {
                dump_expr(arena, v, interner, types, depth + 1, out);
            }
        }
        StmtKind::Break { value } => {
            out.push_str("break\n");
            if let Some(v) = value {
                dump_expr(arena, v, interner, types, depth + 1, out);
            }
        }
        StmtKind::Switch {
            scrutinee, cases, ..
        } => {
            out.push_str("switch\n");
            dump_expr(arena, scrutinee, interner, types, depth + 1, out);
            for case in arena.switch_cases(cases) {
                indent(out, depth + 1);
                if case.is_default {
                    out.push_str("default:\n");
                } else {
                    let _ = writeln!(out, "case {:?}:", case.pattern);
                }
                dump_stmt(arena, case.body, interner, types, depth + 2, out);
            }
        }
        StmtKind::FnDecl(f) => {
            let _ = writeln!(
                out,
                "fn {}({} params){}",
                interner.resolve(f.name),
                f.params.count,
                f.ret
                    .map(|r| format!(" -> {}", types.to_string(r, interner)))
                    .unwrap_or_default()
            );
            dump_stmt(arena, f.body, interner, types, depth + 1, out);
        }
        StmtKind::FieldDecl { name, members, .. } => {
            let _ = writeln!(out, "field {} ({} members)", interner.resolve(name), members.count);
        }
        StmtKind::ActsDecl { name, children, .. } => {
            let _ = writeln!(out, "acts {}", interner.resolve(name));
            for &child in arena.stmt_children(children) {
                dump_stmt(arena, child, interner, types, depth + 1, out);
            }
        }
        StmtKind::Use(u) => {
            let _ = writeln!(out, "use {u:?}");
        }
        StmtKind::Nest { path, .. } => {
            let segs: Vec<&str> = arena
                .path_segs(path)
                .iter()
                .map(|&s| interner.resolve(s))
                .collect();
            let _ = writeln!(out, "nest {}", segs.join("::"));
        }
    }
}

fn dump_expr(
    arena: &AstArena,
    eid: ExprId,
    interner: &Interner,
    types: &TypePool,
    depth: usize,
    out: &mut String,
) {
    indent(out, depth);
    let expr = arena.expr(eid);
    match expr.kind {
        ExprKind::Error => out.push_str("<error>\n"),
        ExprKind::Hole => out.push_str("_\n"),
        ExprKind::IntLit { text }
        | ExprKind::FloatLit { text }
        | ExprKind::CharLit { text }
        | ExprKind::StringLit { text } => {
            let _ = writeln!(out, "lit {}", interner.resolve(text));
        }
        ExprKind::BoolLit { value } => {
            let _ = writeln!(out, "lit {value}");
        }
        ExprKind::NullLit => out.push_str("lit null\n"),
        ExprKind::Ident { name } => {
            let _ = writeln!(out, "ident {}", interner.resolve(name));
        }
        ExprKind::ArrayLit { args } => {
            out.push_str("array\n");
            for a in arena.args(args) {
                if let Some(e) = a.expr {
                    dump_expr(arena, e, interner, types, depth + 1, out);
                }
            }
        }
        ExprKind::Unary { op, operand } => {
            let _ = writeln!(out, "unary {op:?}");
            dump_expr(arena, operand, interner, types, depth + 1, out);
        }
        ExprKind::Borrow { is_mut, operand } => {
            let _ = writeln!(out, "borrow{}", if is_mut { " mut" } else { "" });
            dump_expr(arena, operand, interner, types, depth + 1, out);
        }
        ExprKind::Escape { operand } => {
            out.push_str("escape\n");
            dump_expr(arena, operand, interner, types, depth + 1, out);
        }
        ExprKind::PostfixInc { operand } => {
            out.push_str("postfix ++\n");
            dump_expr(arena, operand, interner, types, depth + 1, out);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let _ = writeln!(out, "binary {op:?}");
            dump_expr(arena, lhs, interner, types, depth + 1, out);
            dump_expr(arena, rhs, interner, types, depth + 1, out);
        }
        ExprKind::Assign { op, lhs, rhs } => {
            let _ = writeln!(out, "assign {op:?}");
            dump_expr(arena, lhs, interner, types, depth + 1, out);
            dump_expr(arena, rhs, interner, types, depth + 1, out);
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            out.push_str("ternary\n");
            dump_expr(arena, cond, interner, types, depth + 1, out);
            dump_expr(arena, then_expr, interner, types, depth + 1, out);
            dump_expr(arena, else_expr, interner, types, depth + 1, out);
        }
        ExprKind::Call { callee, args } => {
            out.push_str("call\n");
            dump_expr(arena, callee, interner, types, depth + 1, out);
            for a in arena.args(args) {
                if let Some(label) = a.label {
                    indent(out, depth + 1);
                    let _ = writeln!(
                        out,
                        "{}: {}",
                        interner.resolve(label),
                        if a.is_hole { "_" } else { "" }
                    );
                }
                if let Some(e) = a.expr {
                    dump_expr(arena, e, interner, types, depth + 2, out);
                }
            }
        }
        ExprKind::Index { base, index } => {
            out.push_str("index\n");
            dump_expr(arena, base, interner, types, depth + 1, out);
            dump_expr(arena, index, interner, types, depth + 1, out);
        }
        ExprKind::FieldAccess { base, name } => {
            let _ = writeln!(out, "field .{}", interner.resolve(name));
            dump_expr(arena, base, interner, types, depth + 1, out);
        }
        ExprKind::OptionalUnwrap { operand } => {
            out.push_str("unwrap ?\n");
            dump_expr(arena, operand, interner, types, depth + 1, out);
        }
        ExprKind::Loop { iter, body, .. } => {
            out.push_str("loop\n");
            if let Some(i) = iter {
                dump_expr(arena, i, interner, types, depth + 1, out);
            }
            dump_stmt(arena, body, interner, types, depth + 1, out);
        }
        ExprKind::Cast { operand, cast, ty } => {
            let _ = writeln!(out, "cast {cast:?} -> {}", types.to_string(ty, interner));
            dump_expr(arena, operand, interner, types, depth + 1, out);
        }
    }
}

/// Flat listing of SIR functions, values, and escape handles.
#[must_use]
pub fn dump_sir(m: &sir::Module, interner: &Interner, types: &TypePool) -> String {
    let mut out = String::new();
    for (i, f) in m.funcs.iter().enumerate() {
        let _ = writeln!(
            out,
            "func #{i} {} -> {}",
            interner.resolve(f.name),
            types.to_string(f.ret, interner)
        );
    }
    for (i, v) in m.values.iter().enumerate() {
        let _ = writeln!(
            out,
            "  v{i}: {:?} ty={} place={:?} effect={:?}",
            v.kind,
            types.to_string(v.ty, interner),
            v.place,
            v.effect
        );
    }
    for (i, h) in m.escape_handles.iter().enumerate() {
        let _ = writeln!(
            out,
            "  handle #{i}: kind={} boundary={} from_static={}",
            h.kind.name(),
            h.boundary.name(),
            h.from_static
        );
    }
    out
}

/// Block-structured OIR listing.
#[must_use]
pub fn dump_oir(m: &oir::Module, interner: &Interner, types: &TypePool) -> String {
    let mut out = String::new();
    for f in &m.funcs {
        let _ = writeln!(out, "func {} -> {}", f.name, types.to_string(f.ret_ty, interner));
        for &bid in &f.blocks {
            let block = m.block(bid);
            let params: Vec<String> = block.params.iter().map(|p| format!("v{}", p.index())).collect();
            let _ = writeln!(out, "  b{}({}):", bid.index(), params.join(", "));
            for &iid in &block.insts {
                let inst = m.inst(iid);
                let result = inst
                    .result
                    .map(|r| format!("v{} = ", r.index()))
                    .unwrap_or_default();
                let _ = writeln!(out, "    {result}{:?} [{:?}]", inst.data, inst.eff);
            }
            if let Some(term) = &block.term {
                let _ = writeln!(out, "    {term:?}");
            }
        }
    }
    let stats = &m.opt_stats;
    let _ = writeln!(
        out,
        "stats: edges_split={} promoted={} phi_params={}",
        stats.critical_edges_split, stats.mem2reg_promoted_slots, stats.mem2reg_phi_params
    );
    out
}
