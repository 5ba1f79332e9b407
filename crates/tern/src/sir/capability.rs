//! The capability state machine over SIR.
//!
//! Per-symbol state `{moved_by_escape, active_shared_borrows,
//! active_mut_borrow}` advanced in program order within each function.
//! Shared borrows exclude the mutable borrow and vice versa; escaping a
//! non-static, non-caller-provided place is rejected; reads after an escape
//! move are use-after-move errors.
//!
//! Borrow lifetimes are scoped syntactically: a borrow bound by a `let`
//! lives to the end of the declaring block, a bare borrow expression to the
//! end of its statement.

use ahash::AHashMap;

use crate::{
    diag::{Bag, Code, Diagnostic},
    intern::Interner,
    resolve::{SymbolId, SymbolTable},
    types::TypePool,
};

use super::{BlockId, Module, StmtId, StmtKind, ValueId, ValueKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySymbolState {
    pub moved_by_escape: bool,
    pub active_shared_borrows: u32,
    pub active_mut_borrow: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityAnalysisResult {
    pub ok: bool,
    pub error_count: u32,
    pub state_by_symbol: AHashMap<u32, CapabilitySymbolState>,
}

/// A borrow created while walking; released when its scope ends.
#[derive(Debug, Clone, Copy)]
struct ActiveBorrow {
    target: SymbolId,
    is_mut: bool,
}

pub fn analyze_capabilities(
    m: &Module,
    types: &TypePool,
    sym: &SymbolTable,
    interner: &Interner,
    bag: &mut Bag,
) -> CapabilityAnalysisResult {
    let _ = types;
    let before = bag.error_count();
    let mut a = Analyzer {
        m,
        sym,
        interner,
        bag,
        states: AHashMap::new(),
    };

    for f in &m.funcs {
        if let Some(entry) = f.entry {
            a.walk_block(entry);
        }
    }

    let error_count = a.bag.error_count() - before;
    CapabilityAnalysisResult {
        ok: error_count == 0,
        error_count,
        state_by_symbol: a.states,
    }
}

struct Analyzer<'a> {
    m: &'a Module,
    sym: &'a SymbolTable,
    interner: &'a Interner,
    bag: &'a mut Bag,
    states: AHashMap<u32, CapabilitySymbolState>,
}

impl Analyzer<'_> {
    fn state(&mut self, sym: SymbolId) -> &mut CapabilitySymbolState {
        self.states.entry(sym.index() as u32).or_default()
    }

    fn report(&mut self, code: Code, span: crate::span::Span, arg: &str) {
        if !self.bag.has_at(code, span) {
            let mut d = Diagnostic::error(code, span);
            if !arg.is_empty() {
                d = d.with_arg(arg);
            }
            self.bag.add(d);
        }
    }

    fn release(&mut self, borrows: Vec<ActiveBorrow>) {
        for b in borrows {
            let st = self.state(b.target);
            if b.is_mut {
                st.active_mut_borrow = false;
            } else {
                st.active_shared_borrows = st.active_shared_borrows.saturating_sub(1);
            }
        }
    }

    fn walk_block(&mut self, bid: BlockId) {
        let mut block_borrows: Vec<ActiveBorrow> = Vec::new();

        for &sid in self.m.block_stmt_ids(bid) {
            let mut stmt_borrows = Vec::new();
            self.walk_stmt(sid, &mut stmt_borrows);

            // borrows bound by this `let` survive to the end of the block
            let binds_borrow = matches!(
                self.m.stmt(sid).kind,
                StmtKind::VarDecl { init: Some(init), .. }
                    if matches!(self.m.value(init).kind, ValueKind::Borrow { .. })
            );
            if binds_borrow {
                block_borrows.append(&mut stmt_borrows);
            } else {
                self.release(stmt_borrows);
            }
        }

        self.release(block_borrows);
    }

    fn walk_stmt(&mut self, sid: StmtId, borrows: &mut Vec<ActiveBorrow>) {
        let stmt = self.m.stmt(sid);
        match stmt.kind {
            StmtKind::Error | StmtKind::Continue => {}
            StmtKind::Expr { value } => self.walk_value(value, borrows),
            StmtKind::VarDecl { init, .. } => {
                if let Some(init) = init {
                    self.walk_value(init, borrows);
                }
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.walk_value(cond, borrows);
                self.walk_block(then_block);
                if let Some(e) = else_block {
                    self.walk_block(e);
                }
            }
            StmtKind::While { cond, body } => {
                self.walk_value(cond, borrows);
                self.walk_block(body);
            }
            StmtKind::DoWhile { cond, body } => {
                self.walk_block(body);
                self.walk_value(cond, borrows);
            }
            StmtKind::Scope { body, .. } => self.walk_block(body),
            StmtKind::Return { value } | StmtKind::Break { value } => {
                if let Some(v) = value {
                    self.walk_value(v, borrows);
                }
            }
            StmtKind::Switch {
                scrutinee, cases, ..
            } => {
                self.walk_value(scrutinee, borrows);
                for case in self.m.cases_in(cases) {
                    self.walk_block(case.body);
                }
            }
        }
    }

    /// Post-order walk: children are evaluated before their parent, which
    /// is the program order of effects.
    fn walk_value(&mut self, vid: ValueId, borrows: &mut Vec<ActiveBorrow>) {
        if !self.m.valid_value(vid) {
            return;
        }
        let v = *self.m.value(vid);

        match v.kind {
            ValueKind::Unary { a, .. }
            | ValueKind::PostfixInc { a }
            | ValueKind::Cast { a, .. }
            | ValueKind::Field { a, .. } => self.walk_value(a, borrows),
            ValueKind::Binary { a, b, .. } | ValueKind::Assign { a, b, .. } | ValueKind::Index { a, b } => {
                self.walk_value(a, borrows);
                self.walk_value(b, borrows);
            }
            ValueKind::IfExpr {
                cond,
                then_value,
                else_value,
            } => {
                self.walk_value(cond, borrows);
                self.walk_value(then_value, borrows);
                self.walk_value(else_value, borrows);
            }
            ValueKind::Call { callee, args } => {
                self.walk_value(callee, borrows);
                for arg in self.m.args_in(args) {
                    if let Some(val) = arg.value {
                        self.walk_value(val, borrows);
                    }
                    for child in self.m.args_in(arg.children) {
                        if let Some(val) = child.value {
                            self.walk_value(val, borrows);
                        }
                    }
                }
            }
            ValueKind::ArrayLit { args } => {
                for arg in self.m.args_in(args) {
                    if let Some(val) = arg.value {
                        self.walk_value(val, borrows);
                    }
                }
            }
            ValueKind::LoopExpr { iter, body, .. } => {
                if let Some(i) = iter {
                    self.walk_value(i, borrows);
                }
                self.walk_block(body);
            }
            ValueKind::Borrow { a, .. } | ValueKind::Escape { a } => {
                self.walk_value(a, borrows);
            }
            _ => {}
        }

        // transitions for this node
        match v.kind {
            ValueKind::Local { sym } => {
                if self.state(sym).moved_by_escape {
                    let name = self.symbol_name(sym);
                    self.report(Code::UseAfterMove, v.span, &name);
                }
            }
            ValueKind::Borrow { is_mut, .. } => {
                let Some(target) = v.origin_sym else { return };
                let st = *self.state(target);
                if st.moved_by_escape {
                    let name = self.symbol_name(target);
                    self.report(Code::UseAfterMove, v.span, &name);
                    return;
                }
                if is_mut {
                    if st.active_shared_borrows > 0 || st.active_mut_borrow {
                        let name = self.symbol_name(target);
                        self.report(Code::BorrowConflict, v.span, &name);
                        return;
                    }
                    self.state(target).active_mut_borrow = true;
                    borrows.push(ActiveBorrow { target, is_mut: true });
                } else {
                    if st.active_mut_borrow {
                        let name = self.symbol_name(target);
                        self.report(Code::BorrowConflict, v.span, &name);
                        return;
                    }
                    self.state(target).active_shared_borrows += 1;
                    borrows.push(ActiveBorrow {
                        target,
                        is_mut: false,
                    });
                }
            }
            ValueKind::Escape { .. } => {
                let Some(target) = v.origin_sym else { return };
                let symbol = self.sym.symbol(target);
                // escaping is allowed from static storage and from
                // caller-provided (parameter) places only
                if !symbol.is_static && !symbol.is_param {
                    let name = self.symbol_name(target);
                    self.report(Code::EscapeNonStatic, v.span, &name);
                }
                if !symbol.is_static {
                    self.state(target).moved_by_escape = true;
                }
            }
            _ => {}
        }
    }

    fn symbol_name(&self, sym: SymbolId) -> String {
        self.interner.resolve(self.sym.symbol(sym).name).to_owned()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        diag::Code,
        pipeline::{self, PipelineOptions},
    };

    #[test]
    fn escape_of_local_is_rejected() {
        let err = pipeline::compile_to_oir(
            "fn f() -> &&i32 { let x: i32 = 1; return &&x; }",
            PipelineOptions::default(),
        )
        .expect_err("non-static escape must fail");
        assert!(err.bag.has_code(Code::EscapeNonStatic));
    }

    #[test]
    fn escape_of_static_is_allowed() {
        let out = pipeline::compile_to_oir(
            "static let g: i32 = 1; fn f() -> &&i32 { return &&g; }",
            PipelineOptions::default(),
        );
        assert!(out.is_ok(), "{:?}", out.err().map(|e| e.bag.diags().to_vec()));
    }

    #[test]
    fn shared_then_mut_borrow_conflicts() {
        let err = pipeline::compile_to_oir(
            "fn f() -> i32 { let mut x: i32 = 1; let a: &i32 = &x; let b: &mut i32 = &mut x; return x; }",
            PipelineOptions::default(),
        )
        .expect_err("borrow conflict must fail");
        assert!(err.bag.has_code(Code::BorrowConflict));
    }

    #[test]
    fn sequential_statement_borrows_do_not_conflict() {
        let out = pipeline::compile_to_oir(
            "fn g(p: &i32) -> i32 { return 0; } \
             fn f() -> i32 { let mut x: i32 = 1; g(&x); g(&x); return x; }",
            PipelineOptions::default(),
        );
        assert!(out.is_ok(), "{:?}", out.err().map(|e| e.bag.diags().to_vec()));
    }

    #[test]
    fn use_after_escape_move_is_rejected() {
        let err = pipeline::compile_to_oir(
            "fn g(e: &&i32) -> i32 { return 0; } \
             fn f() -> i32 { let x: i32 = 1; g(&&x); return x; }",
            PipelineOptions::default(),
        )
        .expect_err("use after move must fail");
        assert!(err.bag.has_code(Code::UseAfterMove) || err.bag.has_code(Code::EscapeNonStatic));
    }
}
