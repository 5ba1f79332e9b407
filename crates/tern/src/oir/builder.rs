//! SIR → OIR lowering.
//!
//! Structured statements become basic blocks with explicit terminators.
//! Value-producing control flow (ternary if-exprs, short-circuit and/or,
//! loop values) lowers to join blocks carrying block parameters. Places
//! lower to address values: locals are alloca slots, `a[i]` is an `Index`
//! address, `a.b` a `Field` address; reads and writes go through `Load` and
//! `Store`.
//!
//! The build is gated: if the SIR structural verifier or the escape-handle
//! verifier fails, no module is produced and the driver must stop.

use ahash::AHashMap;
use num_bigint::BigInt;
use smallvec::{smallvec, SmallVec};

use crate::{
    ast::{AssignOp, BinaryOp, CastKind as AstCastKind, UnaryOp},
    intern::Interner,
    resolve::{SymbolId, SymbolKind, SymbolTable},
    sir::{
        self, verify_escape_handles, verify_module, EscapeHandle, VerifyError,
    },
    types::{Builtin, TypeId, TypeKind, TypePool},
};

use super::{
    BinOp, Block, BlockId, CastKind, DefSite, Effect, EscapeHandleHint, Function, Inst, InstData,
    Module, Terminator, UnOp, Value, ValueId,
};

/// Result of the gated OIR build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub module: Module,
    pub gate_passed: bool,
    pub gate_errors: Vec<VerifyError>,
}

pub fn build_oir(
    sir: &sir::Module,
    types: &mut TypePool,
    sym: &SymbolTable,
    interner: &Interner,
) -> BuildResult {
    let mut gate_errors = verify_module(sir);
    gate_errors.extend(verify_escape_handles(sir));
    if !gate_errors.is_empty() {
        return BuildResult {
            module: Module::default(),
            gate_passed: false,
            gate_errors,
        };
    }

    let mut handle_by_value: AHashMap<usize, EscapeHandle> = AHashMap::new();
    for h in &sir.escape_handles {
        if let Some(v) = h.escape_value {
            handle_by_value.insert(v.index(), *h);
        }
    }

    let mut b = Builder {
        sir,
        types,
        sym,
        interner,
        handle_by_value,
        m: Module::default(),
        fn_value_by_sym: AHashMap::new(),
        cur: None,
        func_blocks: Vec::new(),
        slots: AHashMap::new(),
        pinned: Vec::new(),
        loop_stack: Vec::new(),
    };

    // declare all functions first so forward calls resolve
    for f in &sir.funcs {
        let fn_value = b.m.add_value(Value {
            ty: f.sig,
            eff: Effect::Pure,
            def: DefSite::None,
        });
        if let Some(s) = f.sym {
            b.fn_value_by_sym.insert(s.index() as u32, fn_value);
        }
        b.m.funcs.push(Function {
            name: b.interner.resolve(f.name).to_owned(),
            ret_ty: f.ret,
            fn_value,
            blocks: Vec::new(),
            entry: None,
            pinned_slots: Vec::new(),
        });
    }

    for (i, f) in sir.funcs.iter().enumerate() {
        b.build_func(i, f);
    }

    BuildResult {
        module: b.m,
        gate_passed: true,
        gate_errors: Vec::new(),
    }
}

struct LoopFrame {
    /// Target of `continue`.
    header: BlockId,
    /// Target of `break`.
    exit: BlockId,
    /// Slot receiving `break value;` payloads and the natural-end null.
    result_slot: Option<ValueId>,
}

struct Builder<'a> {
    sir: &'a sir::Module,
    types: &'a mut TypePool,
    sym: &'a SymbolTable,
    interner: &'a Interner,
    handle_by_value: AHashMap<usize, EscapeHandle>,
    m: Module,
    fn_value_by_sym: AHashMap<u32, ValueId>,
    cur: Option<BlockId>,
    func_blocks: Vec<BlockId>,
    slots: AHashMap<u32, (ValueId, TypeId)>,
    /// Slots backed by module storage (globals); never promoted.
    pinned: Vec<ValueId>,
    loop_stack: Vec<LoopFrame>,
}

impl Builder<'_> {
    fn new_block(&mut self) -> BlockId {
        let bid = self.m.add_block(Block::default());
        self.func_blocks.push(bid);
        bid
    }

    fn cur_block(&mut self) -> BlockId {
        if let Some(b) = self.cur {
            if !self.m.block(b).has_term() {
                return b;
            }
        }
        // code after a terminator lands in a fresh (unreachable) block
        let b = self.new_block();
        self.cur = Some(b);
        b
    }

    fn terminate(&mut self, term: Terminator) {
        let b = self.cur_block();
        if self.m.block(b).term.is_none() {
            self.m.block_mut(b).term = Some(term);
        }
    }

    fn emit(&mut self, data: InstData, eff: Effect, result_ty: Option<TypeId>) -> Option<ValueId> {
        let b = self.cur_block();
        let result = result_ty.map(|ty| {
            self.m.add_value(Value {
                ty,
                eff,
                def: DefSite::None, // fixed below once the inst id exists
            })
        });
        let iid = self.m.add_inst(Inst { data, eff, result });
        if let Some(r) = result {
            self.m.values[r.index()].def = DefSite::Inst(iid);
        }
        self.m.block_mut(b).insts.push(iid);
        result
    }

    fn undef(&mut self, ty: TypeId) -> ValueId {
        self.m.add_value(Value {
            ty,
            eff: Effect::Pure,
            def: DefSite::None,
        })
    }

    fn block_param(&mut self, bid: BlockId, ty: TypeId) -> ValueId {
        let idx = u32::try_from(self.m.block(bid).params.len()).expect("param index");
        let v = self.m.add_value(Value {
            ty,
            eff: Effect::Pure,
            def: DefSite::BlockParam(bid, idx),
        });
        self.m.block_mut(bid).params.push(v);
        v
    }

    fn slot_ptr_ty(&mut self, slot_ty: TypeId) -> TypeId {
        self.types.make_ptr(slot_ty, true)
    }

    fn alloca(&mut self, slot_ty: TypeId) -> ValueId {
        let ptr_ty = self.slot_ptr_ty(slot_ty);
        self.emit(InstData::AllocaLocal { slot_ty }, Effect::Pure, Some(ptr_ty))
            .expect("alloca has a result")
    }

    fn load(&mut self, slot: ValueId, ty: TypeId) -> ValueId {
        self.emit(InstData::Load { slot }, Effect::MayReadMem, Some(ty))
            .expect("load has a result")
    }

    fn store(&mut self, slot: ValueId, value: ValueId) {
        let _ = self.emit(InstData::Store { slot, value }, Effect::MayWriteMem, None);
    }

    fn const_int(&mut self, text: impl Into<String>, ty: TypeId) -> ValueId {
        self.emit(InstData::ConstInt { text: text.into() }, Effect::Pure, Some(ty))
            .expect("const has a result")
    }

    // ---- functions ----

    fn build_func(&mut self, index: usize, f: &sir::Func) {
        self.cur = None;
        self.func_blocks = Vec::new();
        self.slots = AHashMap::new();
        self.pinned = Vec::new();
        self.loop_stack = Vec::new();

        let entry = self.new_block();
        self.cur = Some(entry);

        // parameters enter as entry block params spilled into slots
        for p in self.sir.params_in(f.params).to_vec() {
            let pv = self.block_param(entry, p.ty);
            let slot = self.alloca(p.ty);
            self.store(slot, pv);
            if let Some(s) = p.sym {
                self.slots.insert(s.index() as u32, (slot, p.ty));
            }
        }

        if let Some(body) = f.entry {
            self.lower_block_stmts(body);
        }

        // fall-through and unreachable tails get a return terminator
        for &bid in &self.func_blocks.clone() {
            if self.m.block(bid).term.is_none() {
                self.m.block_mut(bid).term = Some(Terminator::Ret { value: None });
            }
        }

        let func = &mut self.m.funcs[index];
        func.blocks = std::mem::take(&mut self.func_blocks);
        func.entry = Some(entry);
        func.pinned_slots = std::mem::take(&mut self.pinned);
    }

    fn lower_block_stmts(&mut self, body: sir::BlockId) {
        for &sid in self.sir.block_stmt_ids(body).to_vec().iter() {
            self.lower_stmt(sid);
        }
    }

    fn lower_stmt(&mut self, sid: sir::StmtId) {
        let stmt = *self.sir.stmt(sid);
        match stmt.kind {
            sir::StmtKind::Error => {}
            sir::StmtKind::Expr { value } => {
                self.lower_value(value);
            }
            sir::StmtKind::VarDecl {
                sym,
                declared_type,
                init,
                ..
            } => {
                let slot = self.alloca(declared_type);
                if let Some(s) = sym {
                    self.slots.insert(s.index() as u32, (slot, declared_type));
                }
                if let Some(init) = init {
                    if let sir::ValueKind::ArrayLit { args } = self.sir.value(init).kind {
                        self.store_array_literal(slot, args, declared_type);
                    } else {
                        let v = self.lower_value(init);
                        self.store(slot, v);
                    }
                }
            }
            sir::StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond_v = self.lower_value(cond);
                let then_b = self.new_block();
                let join = self.new_block();
                let else_b = if else_block.is_some() { self.new_block() } else { join };
                self.terminate(Terminator::CondBr {
                    cond: cond_v,
                    then_bb: then_b,
                    then_args: smallvec![],
                    else_bb: else_b,
                    else_args: smallvec![],
                });

                self.cur = Some(then_b);
                self.lower_block_stmts(then_block);
                self.terminate(Terminator::Br {
                    target: join,
                    args: smallvec![],
                });

                if let Some(eb) = else_block {
                    self.cur = Some(else_b);
                    self.lower_block_stmts(eb);
                    self.terminate(Terminator::Br {
                        target: join,
                        args: smallvec![],
                    });
                }

                self.cur = Some(join);
            }
            sir::StmtKind::While { cond, body } => {
                let header = self.new_block();
                self.terminate(Terminator::Br {
                    target: header,
                    args: smallvec![],
                });
                self.cur = Some(header);
                let cond_v = self.lower_value(cond);
                let body_b = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::CondBr {
                    cond: cond_v,
                    then_bb: body_b,
                    then_args: smallvec![],
                    else_bb: exit,
                    else_args: smallvec![],
                });

                self.loop_stack.push(LoopFrame {
                    header,
                    exit,
                    result_slot: None,
                });
                self.cur = Some(body_b);
                self.lower_block_stmts(body);
                self.terminate(Terminator::Br {
                    target: header,
                    args: smallvec![],
                });
                self.loop_stack.pop();
                self.cur = Some(exit);
            }
            sir::StmtKind::DoWhile { cond, body } => {
                let body_b = self.new_block();
                let cond_b = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::Br {
                    target: body_b,
                    args: smallvec![],
                });

                self.loop_stack.push(LoopFrame {
                    header: cond_b,
                    exit,
                    result_slot: None,
                });
                self.cur = Some(body_b);
                self.lower_block_stmts(body);
                self.terminate(Terminator::Br {
                    target: cond_b,
                    args: smallvec![],
                });
                self.loop_stack.pop();

                self.cur = Some(cond_b);
                let cond_v = self.lower_value(cond);
                self.terminate(Terminator::CondBr {
                    cond: cond_v,
                    then_bb: body_b,
                    then_args: smallvec![],
                    else_bb: exit,
                    else_args: smallvec![],
                });
                self.cur = Some(exit);
            }
            sir::StmtKind::Scope { body, .. } => self.lower_block_stmts(body),
            sir::StmtKind::Return { value } => {
                let v = value.map(|v| self.lower_value(v));
                self.terminate(Terminator::Ret { value: v });
            }
            sir::StmtKind::Break { value } => {
                let payload = value.map(|v| self.lower_value(v));
                if let Some(frame) = self.loop_stack.last() {
                    let exit = frame.exit;
                    let result_slot = frame.result_slot;
                    if let (Some(slot), Some(v)) = (result_slot, payload) {
                        self.store(slot, v);
                    }
                    self.terminate(Terminator::Br {
                        target: exit,
                        args: smallvec![],
                    });
                }
            }
            sir::StmtKind::Continue => {
                if let Some(frame) = self.loop_stack.last() {
                    let header = frame.header;
                    self.terminate(Terminator::Br {
                        target: header,
                        args: smallvec![],
                    });
                }
            }
            sir::StmtKind::Switch {
                scrutinee, cases, ..
            } => {
                let scrut_v = self.lower_value(scrutinee);
                let exit = self.new_block();
                let bool_ty = self.types.builtin(Builtin::Bool);

                let case_list = self.sir.cases_in(cases).to_vec();
                for case in case_list.iter().filter(|c| !c.is_default) {
                    let Some(pattern) = case.pattern else { continue };
                    let pat_v = self.lower_value(pattern);
                    let cmp = self
                        .emit(
                            InstData::BinOp {
                                op: BinOp::Eq,
                                lhs: scrut_v,
                                rhs: pat_v,
                            },
                            Effect::Pure,
                            Some(bool_ty),
                        )
                        .expect("cmp result");
                    let body_b = self.new_block();
                    let next_b = self.new_block();
                    self.terminate(Terminator::CondBr {
                        cond: cmp,
                        then_bb: body_b,
                        then_args: smallvec![],
                        else_bb: next_b,
                        else_args: smallvec![],
                    });
                    self.cur = Some(body_b);
                    self.lower_block_stmts(case.body);
                    self.terminate(Terminator::Br {
                        target: exit,
                        args: smallvec![],
                    });
                    self.cur = Some(next_b);
                }

                if let Some(default) = case_list.iter().find(|c| c.is_default) {
                    self.lower_block_stmts(default.body);
                }
                self.terminate(Terminator::Br {
                    target: exit,
                    args: smallvec![],
                });
                self.cur = Some(exit);
            }
        }
    }

    fn store_array_literal(&mut self, slot: ValueId, args: crate::ast::SliceRange, arr_ty: TypeId) {
        let elem_ty = match self.types.kind(arr_ty) {
            TypeKind::Array { elem, .. } => elem,
            _ => self.types.error(),
        };
        let usize_ty = self.types.builtin(Builtin::USize);
        let elem_ptr_ty = self.slot_ptr_ty(elem_ty);
        for (i, arg) in self.sir.args_in(args).to_vec().iter().enumerate() {
            let Some(v) = arg.value else { continue };
            let ev = self.lower_value(v);
            let idx = self.const_int(i.to_string(), usize_ty);
            let addr = self
                .emit(
                    InstData::Index {
                        base: slot,
                        index: idx,
                    },
                    Effect::Pure,
                    Some(elem_ptr_ty),
                )
                .expect("index result");
            self.store(addr, ev);
        }
    }

    // ---- places ----

    /// Lowers a place expression to its address value and element type.
    fn lower_place(&mut self, vid: sir::ValueId) -> (ValueId, TypeId) {
        let v = *self.sir.value(vid);
        match v.kind {
            sir::ValueKind::Local { sym } | sir::ValueKind::Global { sym } => self.sym_slot(sym),
            sir::ValueKind::Index { a, b } => {
                let (base, _) = self.lower_place(a);
                let idx = self.lower_value(b);
                let ptr = self.slot_ptr_ty(v.ty);
                let addr = self
                    .emit(
                        InstData::Index { base, index: idx },
                        Effect::Pure,
                        Some(ptr),
                    )
                    .expect("index result");
                (addr, v.ty)
            }
            sir::ValueKind::Field { a, name } => {
                let (base, _) = self.lower_place(a);
                let ptr = self.slot_ptr_ty(v.ty);
                let addr = self
                    .emit(
                        InstData::Field {
                            base,
                            field: self.interner.resolve(name).to_owned(),
                        },
                        Effect::Pure,
                        Some(ptr),
                    )
                    .expect("field result");
                (addr, v.ty)
            }
            _ => {
                // non-place in place position: lower as a value into a
                // temporary slot so downstream stays well-formed
                let val = self.lower_value(vid);
                let slot = self.alloca(v.ty);
                self.store(slot, val);
                (slot, v.ty)
            }
        }
    }

    fn sym_slot(&mut self, s: SymbolId) -> (ValueId, TypeId) {
        if let Some(&slot) = self.slots.get(&(s.index() as u32)) {
            return slot;
        }
        // module storage (statics) materializes as a pinned per-function
        // slot; the object writer binds it by symbol later
        let symbol = self.sym.symbol(s);
        let ty = symbol.declared_type.unwrap_or_else(|| self.types.error());
        let slot = self.alloca(ty);
        self.pinned.push(slot);
        self.slots.insert(s.index() as u32, (slot, ty));
        (slot, ty)
    }

    // ---- values ----

    fn lower_value(&mut self, vid: sir::ValueId) -> ValueId {
        let v = *self.sir.value(vid);
        match v.kind {
            sir::ValueKind::Error => self.undef(v.ty),
            sir::ValueKind::IntLit { text } => {
                let lexeme = self.interner.resolve(text);
                let canonical = canonical_int_text(lexeme);
                self.const_int(canonical, v.ty)
            }
            sir::ValueKind::FloatLit { text } => {
                let text = self.interner.resolve(text).to_owned();
                self.emit(InstData::ConstFloat { text }, Effect::Pure, Some(v.ty))
                    .expect("const result")
            }
            sir::ValueKind::StringLit { text } => {
                let text = self.interner.resolve(text).to_owned();
                self.emit(InstData::ConstText { text }, Effect::Pure, Some(v.ty))
                    .expect("const result")
            }
            sir::ValueKind::CharLit { text } => {
                let lexeme = self.interner.resolve(text).to_owned();
                let code = crate::lex::decode_char_lexeme(&lexeme).map_or(0, u32::from);
                self.const_int(code.to_string(), v.ty)
            }
            sir::ValueKind::BoolLit { value } => self
                .emit(InstData::ConstBool { value }, Effect::Pure, Some(v.ty))
                .expect("const result"),
            sir::ValueKind::NullLit => self
                .emit(InstData::ConstNull, Effect::Pure, Some(v.ty))
                .expect("const result"),
            sir::ValueKind::ArrayLit { args } => {
                // array value outside a declaration: spill to a temporary
                let slot = self.alloca(v.ty);
                self.store_array_literal(slot, args, v.ty);
                slot
            }
            sir::ValueKind::Local { sym } | sir::ValueKind::Global { sym } => {
                if self.sym.symbol(sym).kind == SymbolKind::Fn {
                    if let Some(&fv) = self.fn_value_by_sym.get(&(sym.index() as u32)) {
                        return fv;
                    }
                }
                let (slot, ty) = self.sym_slot(sym);
                self.load(slot, ty)
            }
            sir::ValueKind::Unary { op, a } => {
                let src = self.lower_value(a);
                match op {
                    UnaryOp::Plus => src,
                    UnaryOp::Neg => self
                        .emit(
                            InstData::Unary {
                                op: UnOp::Neg,
                                src,
                            },
                            Effect::Pure,
                            Some(v.ty),
                        )
                        .expect("unary result"),
                    UnaryOp::Not => self
                        .emit(
                            InstData::Unary {
                                op: UnOp::Not,
                                src,
                            },
                            Effect::Pure,
                            Some(v.ty),
                        )
                        .expect("unary result"),
                }
            }
            sir::ValueKind::Binary { op, a, b } => self.lower_binary(v.ty, op, a, b),
            sir::ValueKind::Assign { op, a, b } => self.lower_assign(op, a, b, v.ty),
            sir::ValueKind::PostfixInc { a } => {
                let (slot, elem_ty) = self.lower_place(a);
                let old = self.load(slot, elem_ty);
                let one = self.const_int("1", elem_ty);
                let new = self
                    .emit(
                        InstData::BinOp {
                            op: BinOp::Add,
                            lhs: old,
                            rhs: one,
                        },
                        Effect::Pure,
                        Some(elem_ty),
                    )
                    .expect("binop result");
                self.store(slot, new);
                old
            }
            sir::ValueKind::Borrow { a, .. } => {
                let (addr, _) = self.lower_place(a);
                self.emit(
                    InstData::Cast {
                        kind: CastKind::As,
                        to: v.ty,
                        src: addr,
                    },
                    Effect::Pure,
                    Some(v.ty),
                )
                .expect("cast result")
            }
            sir::ValueKind::Escape { a } => {
                let (addr, pointee) = self.lower_place(a);
                let out = self
                    .emit(
                        InstData::Cast {
                            kind: CastKind::As,
                            to: v.ty,
                            src: addr,
                        },
                        Effect::Pure,
                        Some(v.ty),
                    )
                    .expect("cast result");
                if let Some(h) = self.handle_by_value.get(&vid.index()).copied() {
                    self.m.escape_hints.push(EscapeHandleHint {
                        value: out,
                        pointee_type: pointee,
                        kind: h.kind,
                        boundary: h.boundary,
                        from_static: h.from_static,
                        has_drop: h.has_drop,
                        abi_pack_required: h.abi_pack_required,
                        ffi_pack_required: h.ffi_pack_required,
                    });
                }
                out
            }
            sir::ValueKind::Call { callee, args } => {
                let callee_v = self.lower_value(callee);
                let arg_values = self.lower_call_args(callee, args);
                self.emit(
                    InstData::Call {
                        callee: callee_v,
                        args: arg_values,
                    },
                    Effect::Call,
                    Some(v.ty),
                )
                .expect("call result")
            }
            sir::ValueKind::Index { .. } | sir::ValueKind::Field { .. } => {
                let (addr, elem_ty) = self.lower_place(vid);
                // range subscripts denote slices; their address is the value
                if v.place == sir::PlaceClass::NotPlace {
                    addr
                } else {
                    self.load(addr, elem_ty)
                }
            }
            sir::ValueKind::IfExpr {
                cond,
                then_value,
                else_value,
            } => {
                let cond_v = self.lower_value(cond);
                let then_b = self.new_block();
                let else_b = self.new_block();
                let join = self.new_block();
                let param = self.block_param(join, v.ty);
                self.terminate(Terminator::CondBr {
                    cond: cond_v,
                    then_bb: then_b,
                    then_args: smallvec![],
                    else_bb: else_b,
                    else_args: smallvec![],
                });

                self.cur = Some(then_b);
                let tv = self.lower_value(then_value);
                self.terminate(Terminator::Br {
                    target: join,
                    args: smallvec![tv],
                });

                self.cur = Some(else_b);
                let ev = self.lower_value(else_value);
                self.terminate(Terminator::Br {
                    target: join,
                    args: smallvec![ev],
                });

                self.cur = Some(join);
                param
            }
            sir::ValueKind::LoopExpr { var, iter, body } => self.lower_loop(v.ty, var, iter, body),
            sir::ValueKind::Cast { cast, a, to } => {
                let src = self.lower_value(a);
                let (kind, eff) = match cast {
                    AstCastKind::As => (CastKind::As, Effect::Pure),
                    AstCastKind::AsOptional => (CastKind::AsQ, Effect::Pure),
                    AstCastKind::AsForce => (CastKind::AsB, Effect::MayTrap),
                };
                self.emit(
                    InstData::Cast { kind, to, src },
                    eff,
                    Some(v.ty),
                )
                .expect("cast result")
            }
        }
    }

    fn lower_binary(&mut self, ty: TypeId, op: BinaryOp, a: sir::ValueId, b: sir::ValueId) -> ValueId {
        // short-circuit forms become control flow with a join parameter
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = self.lower_value(a);
            let rhs_b = self.new_block();
            let join = self.new_block();
            let param = self.block_param(join, ty);
            let term = if op == BinaryOp::And {
                Terminator::CondBr {
                    cond: lhs,
                    then_bb: rhs_b,
                    then_args: smallvec![],
                    else_bb: join,
                    else_args: smallvec![lhs],
                }
            } else {
                Terminator::CondBr {
                    cond: lhs,
                    then_bb: join,
                    then_args: smallvec![lhs],
                    else_bb: rhs_b,
                    else_args: smallvec![],
                }
            };
            self.terminate(term);

            self.cur = Some(rhs_b);
            let rhs = self.lower_value(b);
            self.terminate(Terminator::Br {
                target: join,
                args: smallvec![rhs],
            });
            self.cur = Some(join);
            return param;
        }

        let lhs = self.lower_value(a);
        let rhs = self.lower_value(b);
        let (bin, eff) = match op {
            BinaryOp::Add => (BinOp::Add, Effect::Pure),
            BinaryOp::Sub => (BinOp::Sub, Effect::Pure),
            BinaryOp::Mul => (BinOp::Mul, Effect::Pure),
            BinaryOp::Div => (BinOp::Div, Effect::MayTrap),
            BinaryOp::Rem => (BinOp::Rem, Effect::MayTrap),
            BinaryOp::Lt => (BinOp::Lt, Effect::Pure),
            BinaryOp::Le => (BinOp::Le, Effect::Pure),
            BinaryOp::Gt => (BinOp::Gt, Effect::Pure),
            BinaryOp::Ge => (BinOp::Ge, Effect::Pure),
            BinaryOp::Eq => (BinOp::Eq, Effect::Pure),
            BinaryOp::Ne | BinaryOp::Xor => (BinOp::Ne, Effect::Pure),
            BinaryOp::NullCoalesce => (BinOp::NullCoalesce, Effect::Pure),
            BinaryOp::Range | BinaryOp::RangeInclusive => {
                // range payloads reach here only through slice subscripts;
                // keep the low bound as the representative value
                return lhs;
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Pipe => unreachable!("lowered earlier"),
        };
        self.emit(InstData::BinOp { op: bin, lhs, rhs }, eff, Some(ty))
            .expect("binop result")
    }

    fn lower_assign(&mut self, op: AssignOp, a: sir::ValueId, b: sir::ValueId, unit_ty: TypeId) -> ValueId {
        let (slot, elem_ty) = self.lower_place(a);
        let rhs = self.lower_value(b);

        let stored = match op {
            AssignOp::Assign => rhs,
            AssignOp::NullCoalesce => {
                let old = self.load(slot, elem_ty);
                self.emit(
                    InstData::BinOp {
                        op: BinOp::NullCoalesce,
                        lhs: old,
                        rhs,
                    },
                    Effect::Pure,
                    Some(elem_ty),
                )
                .expect("binop result")
            }
            AssignOp::Add | AssignOp::Sub | AssignOp::Mul | AssignOp::Div | AssignOp::Rem => {
                let old = self.load(slot, elem_ty);
                let (bin, eff) = match op {
                    AssignOp::Add => (BinOp::Add, Effect::Pure),
                    AssignOp::Sub => (BinOp::Sub, Effect::Pure),
                    AssignOp::Mul => (BinOp::Mul, Effect::Pure),
                    AssignOp::Div => (BinOp::Div, Effect::MayTrap),
                    AssignOp::Rem => (BinOp::Rem, Effect::MayTrap),
                    _ => unreachable!(),
                };
                self.emit(InstData::BinOp { op: bin, lhs: old, rhs }, eff, Some(elem_ty))
                    .expect("binop result")
            }
        };

        self.store(slot, stored);
        // assignments evaluate to unit; give the statement layer a value
        self.emit(InstData::ConstNull, Effect::Pure, Some(unit_ty))
            .expect("const result")
    }

    fn lower_call_args(
        &mut self,
        callee: sir::ValueId,
        args: crate::ast::SliceRange,
    ) -> SmallVec<[ValueId; 4]> {
        // flatten named groups, evaluating in source order
        let mut flat: Vec<sir::Arg> = Vec::new();
        for arg in self.sir.args_in(args).to_vec() {
            if arg.kind == sir::ArgKind::NamedGroup {
                flat.extend(self.sir.args_in(arg.children).to_vec());
            } else {
                flat.push(arg);
            }
        }

        let mut values: Vec<(Option<crate::intern::StrId>, ValueId)> = Vec::new();
        for arg in &flat {
            let v = match arg.value {
                Some(v) => self.lower_value(v),
                None => {
                    let err = self.types.error();
                    self.undef(err)
                }
            };
            values.push((arg.label, v));
        }

        // a direct call to a known function reorders labeled args into
        // declaration order
        let callee_sym = match self.sir.value(callee).kind {
            sir::ValueKind::Local { sym } | sir::ValueKind::Global { sym } => Some(sym),
            _ => None,
        };
        let target = callee_sym.and_then(|s| {
            self.sir
                .funcs
                .iter()
                .find(|f| f.sym == Some(s))
                .map(|f| self.sir.params_in(f.params).to_vec())
        });

        if let Some(params) = target {
            if values.iter().any(|(l, _)| l.is_some()) {
                let mut ordered: SmallVec<[ValueId; 4]> = SmallVec::new();
                for p in &params {
                    if let Some(&(_, v)) = values.iter().find(|(l, _)| *l == Some(p.name)) {
                        ordered.push(v);
                    }
                }
                if ordered.len() == values.len() {
                    return ordered;
                }
            }
        }

        values.into_iter().map(|(_, v)| v).collect()
    }

    fn lower_loop(
        &mut self,
        loop_ty: TypeId,
        var: Option<SymbolId>,
        iter: Option<sir::ValueId>,
        body: sir::BlockId,
    ) -> ValueId {
        let unit_ty = self.types.builtin(Builtin::Unit);
        let usize_ty = self.types.builtin(Builtin::USize);
        let bool_ty = self.types.builtin(Builtin::Bool);

        let result_slot = if loop_ty == unit_ty {
            None
        } else {
            Some(self.alloca(loop_ty))
        };

        let Some(iter) = iter else {
            // headerless loop: pure `loop { ... }` with breaks
            let header = self.new_block();
            let exit = self.new_block();
            self.terminate(Terminator::Br {
                target: header,
                args: smallvec![],
            });
            self.loop_stack.push(LoopFrame {
                header,
                exit,
                result_slot,
            });
            self.cur = Some(header);
            self.lower_block_stmts(body);
            self.terminate(Terminator::Br {
                target: header,
                args: smallvec![],
            });
            self.loop_stack.pop();
            self.cur = Some(exit);
            return match result_slot {
                Some(slot) => self.load(slot, loop_ty),
                None => self.undef(unit_ty),
            };
        };

        // iterator loop: index + sentinel bound, while-shaped
        let (iter_place, iter_ty) = self.lower_place(iter);
        let bound_ptr = self.slot_ptr_ty(usize_ty);
        let bound_addr = self
            .emit(
                InstData::Field {
                    base: iter_place,
                    field: "len".to_owned(),
                },
                Effect::Pure,
                Some(bound_ptr),
            )
            .expect("field result");
        let bound = self.load(bound_addr, usize_ty);

        let idx_slot = self.alloca(usize_ty);
        let zero = self.const_int("0", usize_ty);
        self.store(idx_slot, zero);

        let elem_ty = match self.types.kind(iter_ty) {
            TypeKind::Array { elem, .. } => elem,
            TypeKind::Borrow { elem, .. } => match self.types.kind(elem) {
                TypeKind::Array { elem, .. } => elem,
                _ => self.types.error(),
            },
            _ => self.types.error(),
        };
        let var_slot = var.map(|s| {
            let slot = self.alloca(elem_ty);
            self.slots.insert(s.index() as u32, (slot, elem_ty));
            slot
        });

        let header = self.new_block();
        let body_b = self.new_block();
        let latch = self.new_block();
        // the natural iterator end gets its own landing block so its null
        // store cannot clobber `break value;` payloads
        let natural_end = self.new_block();
        let exit = self.new_block();

        self.terminate(Terminator::Br {
            target: header,
            args: smallvec![],
        });

        self.cur = Some(header);
        let idx_v = self.load(idx_slot, usize_ty);
        let in_bounds = self
            .emit(
                InstData::BinOp {
                    op: BinOp::Lt,
                    lhs: idx_v,
                    rhs: bound,
                },
                Effect::Pure,
                Some(bool_ty),
            )
            .expect("cmp result");
        self.terminate(Terminator::CondBr {
            cond: in_bounds,
            then_bb: body_b,
            then_args: smallvec![],
            else_bb: natural_end,
            else_args: smallvec![],
        });

        self.loop_stack.push(LoopFrame {
            header: latch,
            exit,
            result_slot,
        });
        self.cur = Some(body_b);
        if let Some(vs) = var_slot {
            let elem_ptr = self.slot_ptr_ty(elem_ty);
            let idx_v = self.load(idx_slot, usize_ty);
            let addr = self
                .emit(
                    InstData::Index {
                        base: iter_place,
                        index: idx_v,
                    },
                    Effect::Pure,
                    Some(elem_ptr),
                )
                .expect("index result");
            let elem = self.load(addr, elem_ty);
            self.store(vs, elem);
        }
        self.lower_block_stmts(body);
        self.terminate(Terminator::Br {
            target: latch,
            args: smallvec![],
        });
        self.loop_stack.pop();

        self.cur = Some(latch);
        let idx_v = self.load(idx_slot, usize_ty);
        let one = self.const_int("1", usize_ty);
        let next = self
            .emit(
                InstData::BinOp {
                    op: BinOp::Add,
                    lhs: idx_v,
                    rhs: one,
                },
                Effect::Pure,
                Some(usize_ty),
            )
            .expect("binop result");
        self.store(idx_slot, next);
        self.terminate(Terminator::Br {
            target: header,
            args: smallvec![],
        });

        // natural iterator end yields null by convention
        self.cur = Some(natural_end);
        if let Some(slot) = result_slot {
            if self.types.optional_elem(loop_ty).is_some() {
                let null_v = self
                    .emit(InstData::ConstNull, Effect::Pure, Some(loop_ty))
                    .expect("const result");
                self.store(slot, null_v);
            }
        }
        self.terminate(Terminator::Br {
            target: exit,
            args: smallvec![],
        });

        self.cur = Some(exit);
        match result_slot {
            Some(slot) => self.load(slot, loop_ty),
            None => self.undef(unit_ty),
        }
    }
}

/// Canonical decimal text for an integer literal lexeme (suffix and
/// underscores stripped).
fn canonical_int_text(lexeme: &str) -> String {
    let split = lexeme
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map_or(lexeme.len(), |(i, _)| i);
    let digits: String = lexeme[..split].chars().filter(|c| *c != '_').collect();
    digits
        .parse::<BigInt>()
        .map_or(digits, |v| v.to_string())
}
