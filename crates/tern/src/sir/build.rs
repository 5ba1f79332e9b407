//! AST → SIR lowering.
//!
//! Structured control is preserved; expressions become flat values. The
//! builder also attaches an [`EscapeHandle`] to every `Escape` value, with
//! kind and boundary derived from the syntactic consumer: call arguments and
//! return values use caller slots, static bindings use stack slots, anything
//! else stays a trivial non-materialized token.

use crate::{
    ast::{
        self, ArgKind as AstArgKind, AstArena, BinaryOp, CastKind, ExprId, ExprKind,
        StmtKind as AstStmtKind,
    },
    resolve::{NameResolveResult, SymbolTable},
    span::Span,
    tyck::TyckResult,
    types::{TypeId, TypeKind, TypePool},
};

use super::{
    canon, ActsDecl, Arg, ArgKind, Attr, BlockId, EscapeBoundaryKind, EscapeHandle,
    EscapeHandleKind, FieldDecl, FieldMember, Func, Global, Module, Param, PlaceClass, Stmt,
    StmtId, StmtKind, SwitchCase, Value, ValueId, ValueKind,
};

/// Options reserved for lowering policy switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {}

/// How the value currently being lowered is consumed. Drives escape-handle
/// classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Consume {
    None,
    Return,
    CallArg,
    StaticBind,
}

pub fn build_sir_module(
    arena: &AstArena,
    root: ast::StmtId,
    sym: &SymbolTable,
    nres: &NameResolveResult,
    tyck: &TyckResult,
    types: &TypePool,
    _options: BuildOptions,
) -> Module {
    let mut b = Builder {
        arena,
        sym,
        nres,
        tyck,
        types,
        module: Module::default(),
    };
    b.build_program(root);
    b.module
}

struct Builder<'a> {
    arena: &'a AstArena,
    sym: &'a SymbolTable,
    nres: &'a NameResolveResult,
    tyck: &'a TyckResult,
    types: &'a TypePool,
    module: Module,
}

impl Builder<'_> {
    fn build_program(&mut self, root: ast::StmtId) {
        let AstStmtKind::Block { children } = self.arena.stmt(root).kind else {
            return;
        };
        for &sid in self.arena.stmt_children(children) {
            self.build_top_item(sid, None);
        }
    }

    fn build_top_item(&mut self, sid: ast::StmtId, owner_acts: Option<u32>) {
        let stmt = *self.arena.stmt(sid);
        match stmt.kind {
            AstStmtKind::FnDecl(f) => {
                self.build_func(sid, &f, stmt.span, owner_acts);
            }
            AstStmtKind::FieldDecl { name, is_export, members } => {
                let lowered: Vec<FieldMember> = self
                    .arena
                    .field_members(members)
                    .iter()
                    .map(|m| FieldMember {
                        name: m.name,
                        ty: m.ty,
                        span: m.span,
                    })
                    .collect();
                let members = self.module.add_field_members(lowered);
                let sym = self.nres.stmt_binding(sid).map(|b| b.sym);
                self.module.fields.push(FieldDecl {
                    span: stmt.span,
                    name,
                    sym,
                    is_export,
                    members,
                });
            }
            AstStmtKind::ActsDecl { name, is_export, children, .. } => {
                let acts_id = u32::try_from(self.module.acts.len()).expect("acts overflow");
                let func_begin = u32::try_from(self.module.funcs.len()).expect("func overflow");
                self.module.acts.push(ActsDecl {
                    span: stmt.span,
                    name,
                    sym: self.nres.stmt_binding(sid).map(|b| b.sym),
                    is_export,
                    func_begin,
                    func_count: 0,
                });
                for &child in self.arena.stmt_children(children) {
                    self.build_top_item(child, Some(acts_id));
                }
                let func_end = u32::try_from(self.module.funcs.len()).expect("func overflow");
                self.module.acts[acts_id as usize].func_count = func_end - func_begin;
            }
            AstStmtKind::Var(v) if v.is_static => {
                let sym_id = self.nres.stmt_binding(sid).map(|b| b.sym);
                let ty = sym_id
                    .and_then(|s| self.sym.symbol(s).declared_type)
                    .or(v.ty)
                    .unwrap_or_else(|| self.types.error());
                let init = v.init.map(|e| self.lower_expr(e, Consume::StaticBind));
                self.module.globals.push(Global {
                    span: stmt.span,
                    name: v.name,
                    sym: sym_id,
                    ty,
                    is_mut: v.is_mut,
                    is_static: true,
                    init,
                });
            }
            AstStmtKind::Nest { body: Some(body), .. } => {
                if let AstStmtKind::Block { children } = self.arena.stmt(body).kind {
                    for &child in self.arena.stmt_children(children) {
                        self.build_top_item(child, owner_acts);
                    }
                }
            }
            _ => {}
        }
    }

    fn build_func(
        &mut self,
        sid: ast::StmtId,
        f: &ast::FnDecl,
        span: Span,
        owner_acts: Option<u32>,
    ) {
        let fn_sym = self.nres.stmt_binding(sid).map(|b| b.sym);
        let sig = fn_sym
            .and_then(|s| self.sym.symbol(s).declared_type)
            .unwrap_or_else(|| self.types.error());
        let ret = match self.types.kind(sig) {
            TypeKind::Fn { ret, .. } => ret,
            _ => f.ret.unwrap_or_else(|| self.types.error()),
        };

        let attrs: Vec<Attr> = self
            .arena
            .attrs(f.attrs)
            .iter()
            .map(|a| Attr {
                name: a.name,
                span: a.span,
            })
            .collect();
        let attrs = self.module.add_attrs(attrs);

        let mut params = Vec::new();
        for (offset, p) in self.arena.params(f.params).iter().enumerate() {
            let idx = self.arena.param_index(f.params, u32::try_from(offset).expect("param idx"));
            let p_sym = self.nres.param_binding(idx).map(|b| b.sym);
            let default_value = p.default_expr.map(|e| self.lower_expr(e, Consume::None));
            params.push(Param {
                name: p.name,
                ty: p.ty,
                is_mut: p.is_mut,
                default_value,
                is_named_group: p.is_named_group,
                sym: p_sym,
                span: p.span,
            });
        }
        let params = self.module.add_params(params);

        let value_watermark = self.module.values.len();
        let entry = Some(self.lower_block(f.body));
        let has_any_write = self.module.values[value_watermark..]
            .iter()
            .any(|v| v.effect >= super::EffectClass::MayWrite);

        self.module.add_func(Func {
            span,
            name: f.name,
            sym: fn_sym,
            sig,
            ret,
            is_export: f.is_export,
            attrs,
            params,
            positional_param_count: f.positional_param_count,
            has_named_group: f.has_named_group,
            entry,
            has_any_write,
            is_acts_member: owner_acts.is_some(),
            owner_acts,
        });
    }

    fn lower_block(&mut self, sid: ast::StmtId) -> BlockId {
        let stmt = *self.arena.stmt(sid);
        let AstStmtKind::Block { children } = stmt.kind else {
            // non-block bodies still become a one-statement block
            let lowered = self.lower_stmt(sid);
            return self.module.add_block(stmt.span, lowered.into_iter().collect());
        };

        let mut list = Vec::new();
        for &child in self.arena.stmt_children(children) {
            if let Some(s) = self.lower_stmt(child) {
                list.push(s);
            }
        }
        self.module.add_block(stmt.span, list)
    }

    /// Lowers one statement; declaration-only statements produce no SIR
    /// statement.
    fn lower_stmt(&mut self, sid: ast::StmtId) -> Option<StmtId> {
        let stmt = *self.arena.stmt(sid);
        let kind = match stmt.kind {
            AstStmtKind::Error => StmtKind::Error,
            AstStmtKind::FnDecl(f) => {
                // a nested function declaration produces a module function,
                // not a runtime statement
                self.build_func(sid, &f, stmt.span, None);
                return None;
            }
            AstStmtKind::Empty
            | AstStmtKind::FieldDecl { .. }
            | AstStmtKind::ActsDecl { .. }
            | AstStmtKind::Use(_)
            | AstStmtKind::Nest { .. } => return None,
            AstStmtKind::Expr { expr } => StmtKind::Expr {
                value: self.lower_expr(expr, Consume::None),
            },
            AstStmtKind::Var(v) => {
                let sym_id = self.nres.stmt_binding(sid).map(|b| b.sym);
                let declared_type = sym_id
                    .and_then(|s| self.sym.symbol(s).declared_type)
                    .or(v.ty)
                    .unwrap_or_else(|| self.types.error());
                let consume = if v.is_static { Consume::StaticBind } else { Consume::None };
                let init = v.init.map(|e| self.lower_expr(e, consume));
                StmtKind::VarDecl {
                    is_set: v.is_set,
                    is_mut: v.is_mut,
                    is_static: v.is_static,
                    name: v.name,
                    sym: sym_id,
                    declared_type,
                    init,
                }
            }
            AstStmtKind::If {
                cond,
                then_block,
                else_block,
            } => StmtKind::If {
                cond: self.lower_expr(cond, Consume::None),
                then_block: self.lower_block(then_block),
                else_block: else_block.map(|e| self.lower_block_or_stmt(e)),
            },
            AstStmtKind::While { cond, body } => StmtKind::While {
                cond: self.lower_expr(cond, Consume::None),
                body: self.lower_block(body),
            },
            AstStmtKind::DoWhile { body, cond } => StmtKind::DoWhile {
                cond: self.lower_expr(cond, Consume::None),
                body: self.lower_block(body),
            },
            AstStmtKind::DoScope { body } => StmtKind::Scope {
                body: self.lower_block(body),
                is_manual: false,
            },
            AstStmtKind::Manual { body } => StmtKind::Scope {
                body: self.lower_block(body),
                is_manual: true,
            },
            AstStmtKind::Return { value } => StmtKind::Return {
                value: value.map(|e| self.lower_expr(e, Consume::Return)),
            },
            AstStmtKind::Break { value } => StmtKind::Break {
                value: value.map(|e| self.lower_expr(e, Consume::None)),
            },
            AstStmtKind::Continue => StmtKind::Continue,
            AstStmtKind::Switch {
                scrutinee,
                cases,
                has_default,
            } => {
                let scrut = self.lower_expr(scrutinee, Consume::None);
                let scrut_ty = self.module.value(scrut).ty;
                let mut lowered = Vec::new();
                for case in self.arena.switch_cases(cases).to_vec() {
                    let pattern = if case.is_default {
                        None
                    } else {
                        Some(self.lower_case_pattern(case.pattern, scrut_ty, case.span))
                    };
                    lowered.push(SwitchCase {
                        is_default: case.is_default,
                        pattern,
                        pattern_ast: case.pattern,
                        body: self.lower_block(case.body),
                        span: case.span,
                    });
                }
                let cases = self.module.add_switch_cases(lowered);
                StmtKind::Switch {
                    scrutinee: scrut,
                    cases,
                    has_default,
                }
            }
            AstStmtKind::Block { .. } => {
                let body = self.lower_block(sid);
                StmtKind::Scope {
                    body,
                    is_manual: false,
                }
            }
        };

        Some(self.module.add_stmt(Stmt {
            kind,
            span: stmt.span,
        }))
    }

    /// `elif` chains hang an `If` statement in else position; wrap it into a
    /// block so else targets stay blocks.
    fn lower_block_or_stmt(&mut self, sid: ast::StmtId) -> BlockId {
        if matches!(self.arena.stmt(sid).kind, AstStmtKind::Block { .. }) {
            self.lower_block(sid)
        } else {
            let span = self.arena.stmt(sid).span;
            let lowered = self.lower_stmt(sid);
            self.module.add_block(span, lowered.into_iter().collect())
        }
    }

    fn lower_case_pattern(
        &mut self,
        pattern: ast::CasePattern,
        scrut_ty: TypeId,
        span: Span,
    ) -> ValueId {
        let kind = match pattern {
            ast::CasePattern::Int(text) => ValueKind::IntLit { text },
            ast::CasePattern::Char(text) => ValueKind::CharLit { text },
            ast::CasePattern::Str(text) => ValueKind::StringLit { text },
            ast::CasePattern::Bool(value) => ValueKind::BoolLit { value },
            ast::CasePattern::Null | ast::CasePattern::Error => ValueKind::NullLit,
            ast::CasePattern::Ident(text) => ValueKind::StringLit { text },
        };
        self.module.add_value(Value {
            kind,
            span,
            ty: scrut_ty,
            place: PlaceClass::NotPlace,
            effect: super::EffectClass::Pure,
            origin_sym: None,
            place_elem_type: None,
        })
    }

    fn expr_type(&self, eid: ExprId) -> TypeId {
        self.tyck.expr_type(eid)
    }

    fn lower_expr(&mut self, eid: ExprId, consume: Consume) -> ValueId {
        let expr = *self.arena.expr(eid);
        let ty = self.expr_type(eid);

        let kind = match expr.kind {
            ExprKind::Error | ExprKind::Hole => ValueKind::Error,
            ExprKind::IntLit { text } => ValueKind::IntLit { text },
            ExprKind::FloatLit { text } => ValueKind::FloatLit { text },
            ExprKind::StringLit { text } => ValueKind::StringLit { text },
            ExprKind::CharLit { text } => ValueKind::CharLit { text },
            ExprKind::BoolLit { value } => ValueKind::BoolLit { value },
            ExprKind::NullLit => ValueKind::NullLit,
            ExprKind::ArrayLit { args } => {
                let mut lowered = Vec::new();
                for arg in self.arena.args(args).to_vec() {
                    let value = arg.expr.map(|e| self.lower_expr(e, Consume::None));
                    lowered.push(Arg {
                        kind: ArgKind::Positional,
                        label: None,
                        is_hole: false,
                        value,
                        children: ast::SliceRange::EMPTY,
                        span: arg.span,
                    });
                }
                let args = self.module.add_args(lowered);
                ValueKind::ArrayLit { args }
            }
            ExprKind::Ident { .. } => {
                let binding = self.nres.expr_binding(eid);
                match binding {
                    Some(b) => {
                        if self.sym.symbol(b.sym).is_static {
                            ValueKind::Global { sym: b.sym }
                        } else {
                            ValueKind::Local { sym: b.sym }
                        }
                    }
                    None => ValueKind::Error,
                }
            }
            ExprKind::Unary { op, operand } => ValueKind::Unary {
                op,
                a: self.lower_expr(operand, Consume::None),
            },
            ExprKind::Borrow { is_mut, operand } => ValueKind::Borrow {
                is_mut,
                a: self.lower_expr(operand, Consume::None),
            },
            ExprKind::Escape { operand } => ValueKind::Escape {
                a: self.lower_expr(operand, Consume::None),
            },
            ExprKind::PostfixInc { operand } => ValueKind::PostfixInc {
                a: self.lower_expr(operand, Consume::None),
            },
            ExprKind::Binary {
                op: BinaryOp::Pipe,
                lhs,
                rhs,
            } => {
                // the pipe disappears: its value flows into the call's hole
                let piped = self.lower_expr(lhs, Consume::None);
                return self.lower_pipe_call(eid, rhs, piped);
            }
            ExprKind::Binary { op, lhs, rhs } => ValueKind::Binary {
                op,
                a: self.lower_expr(lhs, Consume::None),
                b: self.lower_expr(rhs, Consume::None),
            },
            ExprKind::Assign { op, lhs, rhs } => {
                let a = self.lower_expr(lhs, Consume::None);
                let rhs_consume = if self.is_static_place(a) {
                    Consume::StaticBind
                } else {
                    Consume::None
                };
                ValueKind::Assign {
                    op,
                    a,
                    b: self.lower_expr(rhs, rhs_consume),
                }
            }
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => ValueKind::IfExpr {
                cond: self.lower_expr(cond, Consume::None),
                then_value: self.lower_expr(then_expr, consume_through(consume)),
                else_value: self.lower_expr(else_expr, consume_through(consume)),
            },
            ExprKind::Call { callee, args } => {
                let callee_v = self.lower_expr(callee, Consume::None);
                let args = self.lower_call_args(args, None);
                ValueKind::Call {
                    callee: callee_v,
                    args,
                }
            }
            ExprKind::Index { base, index } => ValueKind::Index {
                a: self.lower_expr(base, Consume::None),
                b: self.lower_expr(index, Consume::None),
            },
            ExprKind::FieldAccess { base, name } => ValueKind::Field {
                a: self.lower_expr(base, Consume::None),
                name,
            },
            ExprKind::OptionalUnwrap { operand } => {
                // `a?` lowers as the runtime-checked unwrap cast
                ValueKind::Cast {
                    cast: CastKind::AsForce,
                    a: self.lower_expr(operand, Consume::None),
                    to: ty,
                }
            }
            ExprKind::Loop { iter, body, .. } => {
                let var = self.nres.expr_binding(eid).map(|b| b.sym);
                ValueKind::LoopExpr {
                    var,
                    iter: iter.map(|e| self.lower_expr(e, Consume::None)),
                    body: self.lower_block(body),
                }
            }
            ExprKind::Cast { operand, cast, ty: to } => ValueKind::Cast {
                cast,
                a: self.lower_expr(operand, Consume::None),
                to,
            },
        };

        self.finish_value(kind, expr.span, ty, consume)
    }

    fn lower_pipe_call(&mut self, pipe_eid: ExprId, call_eid: ExprId, piped: ValueId) -> ValueId {
        let call_expr = *self.arena.expr(call_eid);
        let ExprKind::Call { callee, args } = call_expr.kind else {
            // a broken pipe RHS was already diagnosed; keep an error value
            let ty = self.expr_type(pipe_eid);
            return self.finish_value(ValueKind::Error, call_expr.span, ty, Consume::None);
        };
        let callee_v = self.lower_expr(callee, Consume::None);
        let args = self.lower_call_args(args, Some(piped));
        let ty = self.expr_type(pipe_eid);
        self.finish_value(
            ValueKind::Call {
                callee: callee_v,
                args,
            },
            call_expr.span,
            ty,
            Consume::None,
        )
    }

    fn lower_call_args(
        &mut self,
        args: ast::SliceRange,
        pipe_value: Option<ValueId>,
    ) -> ast::SliceRange {
        let ast_args = self.arena.args(args).to_vec();
        let mut lowered = Vec::with_capacity(ast_args.len());

        for arg in &ast_args {
            if arg.kind == AstArgKind::NamedGroup {
                let children = self.arena.args(arg.children).to_vec();
                let mut lowered_children = Vec::with_capacity(children.len());
                for child in &children {
                    lowered_children.push(self.lower_one_arg(child, pipe_value));
                }
                let child_slice = self.module.add_args(lowered_children);
                lowered.push(Arg {
                    kind: ArgKind::NamedGroup,
                    label: None,
                    is_hole: false,
                    value: None,
                    children: child_slice,
                    span: arg.span,
                });
                continue;
            }
            lowered.push(self.lower_one_arg(arg, pipe_value));
        }

        self.module.add_args(lowered)
    }

    fn lower_one_arg(&mut self, arg: &ast::Arg, pipe_value: Option<ValueId>) -> Arg {
        let kind = match arg.kind {
            AstArgKind::Positional => ArgKind::Positional,
            AstArgKind::Labeled => ArgKind::Labeled,
            AstArgKind::NamedGroup => ArgKind::NamedGroup,
        };

        if arg.is_hole {
            // a labeled hole receives the piped value when present
            return Arg {
                kind,
                label: arg.label,
                is_hole: pipe_value.is_none(),
                value: pipe_value,
                children: ast::SliceRange::EMPTY,
                span: arg.span,
            };
        }

        let value = arg.expr.map(|e| self.lower_expr(e, Consume::CallArg));
        Arg {
            kind,
            label: arg.label,
            is_hole: false,
            value,
            children: ast::SliceRange::EMPTY,
            span: arg.span,
        }
    }

    fn is_static_place(&self, vid: ValueId) -> bool {
        let root = canon::root_symbol(&self.module, vid);
        root.is_some_and(|s| self.sym.symbol(s).is_static)
    }

    /// Adds the value node, computing place/effect/origin from its children
    /// and attaching escape-handle metadata when the value is an `Escape`.
    fn finish_value(
        &mut self,
        kind: ValueKind,
        span: Span,
        ty: TypeId,
        consume: Consume,
    ) -> ValueId {
        let place = match kind {
            ValueKind::Local { .. } | ValueKind::Global { .. } => PlaceClass::Local,
            ValueKind::Index { .. } => PlaceClass::Index,
            ValueKind::Field { .. } => PlaceClass::Field,
            _ => PlaceClass::NotPlace,
        };

        let place_elem_type = if place == PlaceClass::NotPlace { None } else { Some(ty) };

        let vid = self.module.add_value(Value {
            kind,
            span,
            ty,
            place,
            effect: super::EffectClass::Pure,
            origin_sym: None,
            place_elem_type,
        });

        let effect = canon::computed_effect(&self.module, vid);
        let origin = canon::root_symbol(&self.module, vid);
        {
            let v = self.module.value_mut(vid);
            v.effect = effect;
            v.origin_sym = origin;
        }

        if matches!(kind, ValueKind::Escape { .. }) {
            let from_static = origin.is_some_and(|s| self.sym.symbol(s).is_static);
            let (h_kind, boundary) = match consume {
                Consume::Return => (EscapeHandleKind::CallerSlot, EscapeBoundaryKind::Return),
                Consume::CallArg => (EscapeHandleKind::CallerSlot, EscapeBoundaryKind::CallArg),
                Consume::StaticBind => (EscapeHandleKind::StackSlot, EscapeBoundaryKind::Abi),
                Consume::None => (EscapeHandleKind::Trivial, EscapeBoundaryKind::None),
            };
            self.module.add_escape_handle(EscapeHandle {
                escape_value: Some(vid),
                kind: h_kind,
                boundary,
                from_static,
                has_drop: false,
                abi_pack_required: false,
                ffi_pack_required: false,
                materialize_count: 0,
                origin_sym: origin,
            });
        }

        vid
    }
}

/// An escape under a ternary branch keeps the outer consumer.
fn consume_through(c: Consume) -> Consume {
    c
}

#[cfg(test)]
mod tests {
    use crate::{
        pipeline::{self, PipelineOptions},
        sir::{EscapeBoundaryKind, EscapeHandleKind, ValueKind},
    };

    #[test]
    fn simple_function_lowers_to_one_func() {
        let out = pipeline::compile_to_sir("fn main() -> i32 { return 0; }", PipelineOptions::default())
            .expect("pipeline should pass");
        assert_eq!(out.sir.funcs.len(), 1);
        let f = &out.sir.funcs[0];
        assert!(f.entry.is_some());
        assert!(!f.has_any_write);
    }

    #[test]
    fn assignment_marks_function_as_writing() {
        let out = pipeline::compile_to_sir(
            "fn main() -> i32 { let mut x: i32 = 1; x = 2; return x; }",
            PipelineOptions::default(),
        )
        .expect("pipeline should pass");
        assert!(out.sir.funcs[0].has_any_write);
    }

    #[test]
    fn returned_escape_gets_caller_slot_handle() {
        let out = pipeline::compile_to_sir(
            "static let g: i32 = 1; fn f() -> &&i32 { return &&g; }",
            PipelineOptions::default(),
        )
        .expect("pipeline should pass");
        let escapes: Vec<_> = out
            .sir
            .values
            .iter()
            .filter(|v| matches!(v.kind, ValueKind::Escape { .. }))
            .collect();
        assert_eq!(escapes.len(), 1);
        assert_eq!(out.sir.escape_handles.len(), 1);
        let h = &out.sir.escape_handles[0];
        assert_eq!(h.kind, EscapeHandleKind::CallerSlot);
        assert_eq!(h.boundary, EscapeBoundaryKind::Return);
        assert!(h.from_static);
        assert_eq!(h.materialize_count, 0);
    }

    #[test]
    fn pipe_call_receives_lhs_in_hole_position() {
        let out = pipeline::compile_to_sir(
            "fn double(v: i32) -> i32 { return v + v; } \
             fn main() -> i32 { return 2i32 << double(v: _); }",
            PipelineOptions::default(),
        )
        .expect("pipeline should pass");
        // the lowered call's labeled arg carries a real value, not a hole
        let call_args: Vec<_> = out
            .sir
            .args
            .iter()
            .filter(|a| a.label.is_some())
            .collect();
        assert!(call_args.iter().all(|a| !a.is_hole && a.value.is_some()));
    }
}
