//! The parser: a recursive statement/decl parser over a Pratt expression
//! core, with panic-mode recovery to statement boundaries.
//!
//! The parser is total: it always produces a root block statement, reporting
//! through the diagnostic bag and synthesizing `Error` nodes where the input
//! is broken. Duplicate diagnostics at one `(code, position)` pair are
//! suppressed, and after `max_errors` errors a single terminal
//! `TooManyErrors` is emitted and parsing aborts.

use crate::{
    ast::{
        Arg, ArgKind, AssignOp, AstArena, Attr, BinaryOp, CasePattern, CastKind, ExprId, ExprKind,
        FieldMember, FnDecl, Param, SliceRange, StmtId, StmtKind, SwitchCase, UnaryOp, UseDecl,
        VarDecl,
    },
    diag::{Bag, Code, Diagnostic},
    intern::{Interner, StrId},
    lex,
    span::Span,
    token::{Token, TokenKind},
    types::{TypeId, TypePool},
};

/// Default parser error cap; guarantees termination on pathological input.
pub const MAX_PARSE_ERRORS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
enum InfixKind {
    Assign(AssignOp),
    Binary(BinaryOp),
}

fn infix_info(kind: TokenKind) -> Option<(u8, Assoc, InfixKind)> {
    use TokenKind as K;
    Some(match kind {
        K::Assign => (10, Assoc::Right, InfixKind::Assign(AssignOp::Assign)),
        K::PlusAssign => (10, Assoc::Right, InfixKind::Assign(AssignOp::Add)),
        K::MinusAssign => (10, Assoc::Right, InfixKind::Assign(AssignOp::Sub)),
        K::StarAssign => (10, Assoc::Right, InfixKind::Assign(AssignOp::Mul)),
        K::SlashAssign => (10, Assoc::Right, InfixKind::Assign(AssignOp::Div)),
        K::PercentAssign => (10, Assoc::Right, InfixKind::Assign(AssignOp::Rem)),
        K::QuestionQuestionAssign => (10, Assoc::Right, InfixKind::Assign(AssignOp::NullCoalesce)),

        K::LtLt => (20, Assoc::Left, InfixKind::Binary(BinaryOp::Pipe)),
        K::QuestionQuestion => (25, Assoc::Left, InfixKind::Binary(BinaryOp::NullCoalesce)),

        K::PipePipe | K::KwOr => (30, Assoc::Left, InfixKind::Binary(BinaryOp::Or)),
        K::Caret | K::KwXor => (40, Assoc::Left, InfixKind::Binary(BinaryOp::Xor)),
        K::AmpAmp | K::KwAnd => (50, Assoc::Left, InfixKind::Binary(BinaryOp::And)),

        K::EqEq => (60, Assoc::Left, InfixKind::Binary(BinaryOp::Eq)),
        K::BangEq => (60, Assoc::Left, InfixKind::Binary(BinaryOp::Ne)),

        K::Lt => (70, Assoc::Left, InfixKind::Binary(BinaryOp::Lt)),
        K::LtEq => (70, Assoc::Left, InfixKind::Binary(BinaryOp::Le)),
        K::Gt => (70, Assoc::Left, InfixKind::Binary(BinaryOp::Gt)),
        K::GtEq => (70, Assoc::Left, InfixKind::Binary(BinaryOp::Ge)),

        K::Plus => (80, Assoc::Left, InfixKind::Binary(BinaryOp::Add)),
        K::Minus => (80, Assoc::Left, InfixKind::Binary(BinaryOp::Sub)),

        K::Star => (90, Assoc::Left, InfixKind::Binary(BinaryOp::Mul)),
        K::Slash => (90, Assoc::Left, InfixKind::Binary(BinaryOp::Div)),
        K::Percent => (90, Assoc::Left, InfixKind::Binary(BinaryOp::Rem)),

        _ => return None,
    })
}

fn prefix_unary_op(kind: TokenKind) -> Option<UnaryOp> {
    match kind {
        TokenKind::Plus => Some(UnaryOp::Plus),
        TokenKind::Minus => Some(UnaryOp::Neg),
        TokenKind::Bang | TokenKind::KwNot => Some(UnaryOp::Not),
        _ => None,
    }
}

/// True when a token can begin an expression; used to tell postfix `a?`
/// apart from a ternary `a ? b : c`.
fn starts_expr(kind: TokenKind) -> bool {
    use TokenKind as K;
    matches!(
        kind,
        K::Ident
            | K::Hole
            | K::IntLit
            | K::FloatLit
            | K::StringLit
            | K::CharLit
            | K::KwTrue
            | K::KwFalse
            | K::KwNull
            | K::KwNot
            | K::KwLoop
            | K::LParen
            | K::LBracket
            | K::Plus
            | K::Minus
            | K::Bang
            | K::Amp
            | K::AmpAmp
    )
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
    arena: &'a mut AstArena,
    types: &'a mut TypePool,
    interner: &'a mut Interner,
    bag: &'a mut Bag,
    max_errors: u32,
    error_count: u32,
    aborted: bool,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Token],
        source: &'a str,
        arena: &'a mut AstArena,
        types: &'a mut TypePool,
        interner: &'a mut Interner,
        bag: &'a mut Bag,
        max_errors: u32,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            arena,
            types,
            interner,
            bag,
            max_errors: max_errors.max(1),
            error_count: 0,
            aborted: false,
        }
    }

    /// Parses the whole token stream into a root block statement.
    ///
    /// A sticky lex fatal (invalid UTF-8) aborts immediately with an empty
    /// root.
    pub fn parse_program(&mut self) -> StmtId {
        let mut children = Vec::new();
        let start_span = self.peek().span;

        if self.bag.has_fatal() {
            self.aborted = true;
        }

        while !self.aborted && !self.at(TokenKind::Eof) {
            let before = self.pos;
            children.push(self.parse_stmt());
            if self.pos == before {
                // ensure forward progress even on broken input
                self.bump();
            }
        }

        let end_span = self.prev_span();
        let slice = self.arena.add_stmt_children(children);
        self.arena.add_stmt(StmtKind::Block { children: slice }, start_span.join(end_span))
    }

    #[must_use]
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    // ---- cursor ----

    fn peek(&self) -> Token {
        self.peek_at(0)
    }

    fn peek_at(&self, k: usize) -> Token {
        let i = (self.pos + k).min(self.tokens.len().saturating_sub(1));
        self.tokens[i]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn bump(&mut self) -> Token {
        let t = self.peek();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            self.peek().span
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn lexeme(&self, tok: Token) -> &'a str {
        tok.lexeme(self.source)
    }

    fn intern_lexeme(&mut self, tok: Token) -> StrId {
        let text = tok.lexeme(self.source);
        self.interner.intern(text)
    }

    // ---- diagnostics / recovery ----

    fn report(&mut self, code: Code, span: Span, arg: Option<&str>) {
        if self.aborted {
            return;
        }
        if self.bag.has_at(code, span) {
            return;
        }
        if self.error_count >= self.max_errors {
            self.bag.add(
                Diagnostic::error(Code::TooManyErrors, span)
                    .with_arg(self.max_errors.to_string()),
            );
            self.aborted = true;
            return;
        }
        self.error_count += 1;
        let mut d = Diagnostic::error(code, span);
        if let Some(a) = arg {
            d = d.with_arg(a);
        }
        self.bag.add(d);
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.eat(kind) {
            return true;
        }
        let t = self.peek();
        self.report(Code::ExpectedToken, t.span, Some(kind.text_name()));
        false
    }

    /// Panic-mode recovery: skip to the nearest of a matching closer, a
    /// statement boundary `;`, or EOF, tracking bracket depth.
    fn recover_to_stmt_boundary(&mut self) {
        let mut paren = 0i32;
        let mut bracket = 0i32;
        let mut brace = 0i32;
        while !self.at(TokenKind::Eof) && !self.aborted {
            match self.peek().kind {
                TokenKind::LParen => paren += 1,
                TokenKind::RParen => {
                    if paren == 0 && bracket == 0 && brace == 0 {
                        return;
                    }
                    paren -= 1;
                }
                TokenKind::LBracket => bracket += 1,
                TokenKind::RBracket => {
                    if paren == 0 && bracket == 0 && brace == 0 {
                        return;
                    }
                    bracket -= 1;
                }
                TokenKind::LBrace => brace += 1,
                TokenKind::RBrace => {
                    if paren == 0 && bracket == 0 && brace == 0 {
                        return;
                    }
                    brace -= 1;
                }
                TokenKind::Semicolon => {
                    if paren == 0 && bracket == 0 && brace == 0 {
                        self.bump();
                        return;
                    }
                }
                _ => {}
            }
            self.bump();
        }
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> StmtId {
        let t = self.peek();
        match t.kind {
            TokenKind::Semicolon => {
                self.bump();
                self.arena.add_stmt(StmtKind::Empty, t.span)
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::KwLet | TokenKind::KwSet => self.parse_var(false),
            TokenKind::KwStatic => {
                self.bump();
                if self.at(TokenKind::KwLet) || self.at(TokenKind::KwSet) {
                    self.parse_var(true)
                } else {
                    self.report(Code::ExpectedToken, self.peek().span, Some("let"));
                    self.recover_to_stmt_boundary();
                    self.arena.add_stmt(StmtKind::Error, t.span)
                }
            }
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwDo => self.parse_do(),
            TokenKind::KwManual => self.parse_manual(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwBreak => self.parse_break(),
            TokenKind::KwContinue => {
                self.bump();
                self.expect(TokenKind::Semicolon);
                self.arena.add_stmt(StmtKind::Continue, t.span)
            }
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwLoop => {
                let expr = self.parse_expr();
                // a loop statement does not require a trailing `;`
                self.eat(TokenKind::Semicolon);
                let span = self.arena.expr(expr).span;
                self.arena.add_stmt(StmtKind::Expr { expr }, span)
            }
            TokenKind::At | TokenKind::KwExport | TokenKind::KwFn => self.parse_fn_decl(),
            TokenKind::KwField => self.parse_field_decl(),
            TokenKind::KwActs => self.parse_acts_decl(),
            TokenKind::KwUse => self.parse_use(),
            TokenKind::KwImport => self.parse_import(),
            TokenKind::KwNest => self.parse_nest(),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_block(&mut self) -> StmtId {
        let open = self.peek();
        self.expect(TokenKind::LBrace);

        let mut children = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.aborted {
            let before = self.pos;
            children.push(self.parse_stmt());
            if self.pos == before {
                self.bump();
            }
        }

        let close = self.peek();
        self.expect(TokenKind::RBrace);
        let slice = self.arena.add_stmt_children(children);
        self.arena
            .add_stmt(StmtKind::Block { children: slice }, open.span.join(close.span))
    }

    fn parse_var(&mut self, is_static: bool) -> StmtId {
        let start = self.peek();
        let is_set = start.kind == TokenKind::KwSet;
        self.bump(); // let / set

        let is_mut = self.eat(TokenKind::KwMut);

        let name_tok = self.peek();
        if !self.at(TokenKind::Ident) && !self.at(TokenKind::Hole) {
            self.report(Code::ExpectedToken, name_tok.span, Some("ident"));
            self.recover_to_stmt_boundary();
            return self.arena.add_stmt(StmtKind::Error, start.span);
        }
        self.bump();
        let name = self.intern_lexeme(name_tok);

        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type().0)
        } else {
            None
        };

        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr())
        } else {
            None
        };

        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }

        self.arena.add_stmt(
            StmtKind::Var(VarDecl {
                is_set,
                is_mut,
                is_static,
                name,
                ty,
                init,
            }),
            start.span.join(end),
        )
    }

    fn parse_paren_cond(&mut self) -> ExprId {
        self.expect(TokenKind::LParen);
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen);
        cond
    }

    fn parse_if(&mut self) -> StmtId {
        let start = self.bump(); // if / elif
        let cond = self.parse_paren_cond();
        let then_block = self.parse_block();

        let else_block = if self.at(TokenKind::KwElif) {
            Some(self.parse_if())
        } else if self.eat(TokenKind::KwElse) {
            Some(self.parse_block())
        } else {
            None
        };

        let end = self.prev_span();
        self.arena.add_stmt(
            StmtKind::If {
                cond,
                then_block,
                else_block,
            },
            start.span.join(end),
        )
    }

    fn parse_while(&mut self) -> StmtId {
        let start = self.bump();
        let cond = self.parse_paren_cond();
        let body = self.parse_block();
        let end = self.prev_span();
        self.arena.add_stmt(StmtKind::While { cond, body }, start.span.join(end))
    }

    fn parse_do(&mut self) -> StmtId {
        let start = self.bump();
        let body = self.parse_block();

        if self.eat(TokenKind::KwWhile) {
            let cond = self.parse_paren_cond();
            let end = self.peek().span;
            self.expect(TokenKind::Semicolon);
            return self
                .arena
                .add_stmt(StmtKind::DoWhile { body, cond }, start.span.join(end));
        }

        let end = self.prev_span();
        self.arena.add_stmt(StmtKind::DoScope { body }, start.span.join(end))
    }

    fn parse_manual(&mut self) -> StmtId {
        let start = self.bump();
        let body = self.parse_block();
        let end = self.prev_span();
        self.arena.add_stmt(StmtKind::Manual { body }, start.span.join(end))
    }

    fn parse_return(&mut self) -> StmtId {
        let start = self.bump();
        let value = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }
        self.arena.add_stmt(StmtKind::Return { value }, start.span.join(end))
    }

    fn parse_break(&mut self) -> StmtId {
        let start = self.bump();
        let value = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }
        self.arena.add_stmt(StmtKind::Break { value }, start.span.join(end))
    }

    fn parse_switch(&mut self) -> StmtId {
        let start = self.bump();
        self.expect(TokenKind::LParen);
        let scrutinee = self.parse_expr();
        self.expect(TokenKind::RParen);
        self.expect(TokenKind::LBrace);

        let mut cases = Vec::new();
        let mut has_default = false;

        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.aborted {
            if self.eat(TokenKind::KwDefault) {
                self.expect(TokenKind::Colon);
                let body = self.parse_block();
                has_default = true;
                cases.push(SwitchCase {
                    is_default: true,
                    pattern: CasePattern::Null,
                    body,
                    span: self.arena.stmt(body).span,
                });
                continue;
            }

            if !self.expect(TokenKind::KwCase) {
                self.recover_to_stmt_boundary();
                break;
            }

            let pat_tok = self.peek();
            let pattern = match pat_tok.kind {
                TokenKind::IntLit => CasePattern::Int(self.intern_lexeme(pat_tok)),
                TokenKind::CharLit => CasePattern::Char(self.intern_lexeme(pat_tok)),
                TokenKind::StringLit => CasePattern::Str(self.intern_lexeme(pat_tok)),
                TokenKind::KwTrue => CasePattern::Bool(true),
                TokenKind::KwFalse => CasePattern::Bool(false),
                TokenKind::KwNull => CasePattern::Null,
                TokenKind::Ident => CasePattern::Ident(self.intern_lexeme(pat_tok)),
                _ => {
                    self.report(Code::UnexpectedToken, pat_tok.span, Some(self.lexeme(pat_tok)));
                    CasePattern::Error
                }
            };
            if pattern != CasePattern::Error || !self.at(TokenKind::Eof) {
                self.bump();
            }

            self.expect(TokenKind::Colon);
            let body = self.parse_block();
            cases.push(SwitchCase {
                is_default: false,
                pattern,
                body,
                span: pat_tok.span.join(self.arena.stmt(body).span),
            });
        }

        let close = self.peek();
        self.expect(TokenKind::RBrace);

        let slice = self.arena.add_switch_cases(cases);
        self.arena.add_stmt(
            StmtKind::Switch {
                scrutinee,
                cases: slice,
                has_default,
            },
            start.span.join(close.span),
        )
    }

    fn parse_fn_decl(&mut self) -> StmtId {
        let start = self.peek();

        let mut attrs = Vec::new();
        while self.at(TokenKind::At) {
            self.bump();
            let name_tok = self.peek();
            if self.expect(TokenKind::Ident) {
                let name = self.intern_lexeme(name_tok);
                attrs.push(Attr { name, span: name_tok.span });
            }
        }

        let is_export = self.eat(TokenKind::KwExport);

        if !self.expect(TokenKind::KwFn) {
            self.recover_to_stmt_boundary();
            return self.arena.add_stmt(StmtKind::Error, start.span);
        }

        let name_tok = self.peek();
        if !self.expect(TokenKind::Ident) {
            self.recover_to_stmt_boundary();
            return self.arena.add_stmt(StmtKind::Error, start.span);
        }
        let name = self.intern_lexeme(name_tok);

        self.expect(TokenKind::LParen);
        let (params, positional_param_count, has_named_group) = self.parse_params();
        self.expect(TokenKind::RParen);

        let ret = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type().0)
        } else {
            None
        };

        let body = self.parse_block();
        let end = self.prev_span();

        let attrs = self.arena.add_attrs(attrs);
        let params = self.arena.add_params(params);
        self.arena.add_stmt(
            StmtKind::FnDecl(FnDecl {
                name,
                is_export,
                ret,
                attrs,
                params,
                positional_param_count,
                has_named_group,
                body,
            }),
            start.span.join(end),
        )
    }

    /// Parses a parameter list: positional params, then an optional trailing
    /// `{ ... }` named-group section.
    fn parse_params(&mut self) -> (Vec<Param>, u32, bool) {
        let mut params = Vec::new();
        let mut has_named_group = false;

        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) && !self.aborted {
            if self.at(TokenKind::LBrace) {
                self.bump();
                has_named_group = true;
                while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.aborted {
                    if let Some(p) = self.parse_param(true) {
                        params.push(p);
                    } else {
                        break;
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace);
                break;
            }

            if let Some(p) = self.parse_param(false) {
                params.push(p);
            } else {
                break;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let positional = params.iter().filter(|p| !p.is_named_group).count();
        (
            params,
            u32::try_from(positional).expect("too many params"),
            has_named_group,
        )
    }

    fn parse_param(&mut self, is_named_group: bool) -> Option<Param> {
        let is_mut = self.eat(TokenKind::KwMut);
        let name_tok = self.peek();
        if !self.at(TokenKind::Ident) {
            self.report(Code::ExpectedToken, name_tok.span, Some("ident"));
            return None;
        }
        self.bump();
        let name = self.intern_lexeme(name_tok);

        self.expect(TokenKind::Colon);
        let (ty, ty_span) = self.parse_type();

        let default_expr = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr())
        } else {
            None
        };

        Some(Param {
            name,
            ty,
            is_mut,
            default_expr,
            is_named_group,
            span: name_tok.span.join(ty_span),
        })
    }

    fn parse_field_decl(&mut self) -> StmtId {
        let start = self.bump(); // field
        let is_export = false;

        let name_tok = self.peek();
        if !self.expect(TokenKind::Ident) {
            self.recover_to_stmt_boundary();
            return self.arena.add_stmt(StmtKind::Error, start.span);
        }
        let name = self.intern_lexeme(name_tok);

        self.expect(TokenKind::LBrace);
        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.aborted {
            let m_tok = self.peek();
            if !self.expect(TokenKind::Ident) {
                break;
            }
            let m_name = self.intern_lexeme(m_tok);
            self.expect(TokenKind::Colon);
            let (ty, ty_span) = self.parse_type();
            members.push(FieldMember {
                name: m_name,
                ty,
                span: m_tok.span.join(ty_span),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.peek();
        self.expect(TokenKind::RBrace);

        let members = self.arena.add_field_members(members);
        self.arena.add_stmt(
            StmtKind::FieldDecl {
                name,
                is_export,
                members,
            },
            start.span.join(close.span),
        )
    }

    fn parse_acts_decl(&mut self) -> StmtId {
        let start = self.bump(); // acts

        // `acts Name { }` / `acts Name for T { }` / `acts for T { }`
        let mut name = None;
        if self.at(TokenKind::Ident) {
            let t = self.bump();
            name = Some(self.intern_lexeme(t));
        }

        let for_type = if self.eat(TokenKind::KwFor) {
            Some(self.parse_type().0)
        } else {
            None
        };

        let name = name.unwrap_or_else(|| self.interner.intern("<acts>"));

        self.expect(TokenKind::LBrace);
        let mut children = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.aborted {
            let before = self.pos;
            children.push(self.parse_stmt());
            if self.pos == before {
                self.bump();
            }
        }
        let close = self.peek();
        self.expect(TokenKind::RBrace);

        let children = self.arena.add_stmt_children(children);
        self.arena.add_stmt(
            StmtKind::ActsDecl {
                name,
                is_export: false,
                for_type,
                children,
            },
            start.span.join(close.span),
        )
    }

    fn parse_use(&mut self) -> StmtId {
        let start = self.bump(); // use

        let name_tok = self.peek();
        if !self.expect(TokenKind::Ident) {
            self.recover_to_stmt_boundary();
            return self.arena.add_stmt(StmtKind::Error, start.span);
        }
        let name = self.intern_lexeme(name_tok);

        self.expect(TokenKind::Assign);
        let (ty, _) = self.parse_type();
        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }

        self.arena.add_stmt(
            StmtKind::Use(UseDecl::TypeAlias { name, ty }),
            start.span.join(end),
        )
    }

    fn parse_import(&mut self) -> StmtId {
        let start = self.bump(); // import

        let name_tok = self.peek();
        if !self.expect(TokenKind::Ident) {
            self.recover_to_stmt_boundary();
            return self.arena.add_stmt(StmtKind::Error, start.span);
        }
        let name = self.intern_lexeme(name_tok);

        let alias = if self.eat(TokenKind::KwAs) {
            let a_tok = self.peek();
            if self.expect(TokenKind::Ident) {
                Some(self.intern_lexeme(a_tok))
            } else {
                None
            }
        } else {
            None
        };

        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }
        self.arena.add_stmt(
            StmtKind::Use(UseDecl::Import { name, alias }),
            start.span.join(end),
        )
    }

    fn parse_nest(&mut self) -> StmtId {
        let start = self.bump(); // nest

        let mut segs = Vec::new();
        loop {
            let t = self.peek();
            if !self.expect(TokenKind::Ident) {
                break;
            }
            segs.push(self.intern_lexeme(t));
            if !self.eat(TokenKind::ColonColon) {
                break;
            }
        }
        let path = self.arena.add_path_segs(segs);

        if self.at(TokenKind::LBrace) {
            let body = self.parse_block();
            let end = self.prev_span();
            return self.arena.add_stmt(
                StmtKind::Nest {
                    path,
                    body: Some(body),
                    is_file_directive: false,
                },
                start.span.join(end),
            );
        }

        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }
        self.arena.add_stmt(
            StmtKind::Nest {
                path,
                body: None,
                is_file_directive: true,
            },
            start.span.join(end),
        )
    }

    fn parse_expr_stmt(&mut self) -> StmtId {
        let start = self.peek().span;
        let expr = self.parse_expr();
        let end = self.peek().span;
        if !self.expect(TokenKind::Semicolon) {
            self.recover_to_stmt_boundary();
        }
        self.arena.add_stmt(StmtKind::Expr { expr }, start.join(end))
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> ExprId {
        self.parse_expr_pratt(0, 0)
    }

    fn parse_expr_pratt(&mut self, min_prec: u8, ternary_depth: u32) -> ExprId {
        let mut lhs = self.parse_prefix(ternary_depth);

        loop {
            let tok = self.peek();

            // ternary ?: binds loosest and is non-nestable
            if tok.kind == TokenKind::Question && min_prec == 0 && starts_expr(self.peek_at(1).kind)
            {
                if ternary_depth > 0 {
                    self.report(Code::NestedTernaryNotAllowed, tok.span, None);
                    self.bump();
                    continue;
                }
                self.bump(); // '?'
                let then_expr = self.parse_expr_pratt(0, ternary_depth + 1);
                self.expect(TokenKind::Colon);
                let else_expr = self.parse_expr_pratt(0, ternary_depth + 1);
                let span = self
                    .arena
                    .expr(lhs)
                    .span
                    .join(self.arena.expr(else_expr).span);
                lhs = self.arena.add_expr(
                    ExprKind::Ternary {
                        cond: lhs,
                        then_expr,
                        else_expr,
                    },
                    span,
                );
                continue;
            }

            let Some((prec, assoc, infix)) = infix_info(tok.kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }

            self.bump();
            let next_min = if assoc == Assoc::Left { prec + 1 } else { prec };
            let rhs = self.parse_expr_pratt(next_min, ternary_depth);

            let span = self.arena.expr(lhs).span.join(self.arena.expr(rhs).span);
            lhs = match infix {
                InfixKind::Assign(op) => {
                    self.arena.add_expr(ExprKind::Assign { op, lhs, rhs }, span)
                }
                InfixKind::Binary(op) => {
                    self.arena.add_expr(ExprKind::Binary { op, lhs, rhs }, span)
                }
            };
        }

        lhs
    }

    fn parse_prefix(&mut self, ternary_depth: u32) -> ExprId {
        let t = self.peek();

        if let Some(op) = prefix_unary_op(t.kind) {
            self.bump();
            let operand = self.parse_prefix(ternary_depth);
            let span = t.span.join(self.arena.expr(operand).span);
            return self.arena.add_expr(ExprKind::Unary { op, operand }, span);
        }

        if t.kind == TokenKind::Amp {
            self.bump();
            let is_mut = self.eat(TokenKind::KwMut);
            let operand = self.parse_prefix(ternary_depth);
            let span = t.span.join(self.arena.expr(operand).span);
            return self.arena.add_expr(ExprKind::Borrow { is_mut, operand }, span);
        }

        if t.kind == TokenKind::AmpAmp {
            self.bump();
            let operand = self.parse_prefix(ternary_depth);
            let span = t.span.join(self.arena.expr(operand).span);
            return self.arena.add_expr(ExprKind::Escape { operand }, span);
        }

        let primary = self.parse_primary(ternary_depth);
        self.parse_postfix(primary, ternary_depth)
    }

    fn parse_primary(&mut self, ternary_depth: u32) -> ExprId {
        let t = self.peek();

        match t.kind {
            TokenKind::IntLit => {
                self.bump();
                let text = self.intern_lexeme(t);
                self.arena.add_expr(ExprKind::IntLit { text }, t.span)
            }
            TokenKind::FloatLit => {
                self.bump();
                let text = self.intern_lexeme(t);
                self.arena.add_expr(ExprKind::FloatLit { text }, t.span)
            }
            TokenKind::StringLit => {
                self.bump();
                let decoded = lex::decode_string_lexeme(self.lexeme(t));
                let text = self.interner.intern(&decoded);
                self.arena.add_expr(ExprKind::StringLit { text }, t.span)
            }
            TokenKind::CharLit => {
                self.bump();
                let text = self.intern_lexeme(t);
                self.arena.add_expr(ExprKind::CharLit { text }, t.span)
            }
            TokenKind::KwTrue | TokenKind::KwFalse => {
                self.bump();
                self.arena.add_expr(
                    ExprKind::BoolLit {
                        value: t.kind == TokenKind::KwTrue,
                    },
                    t.span,
                )
            }
            TokenKind::KwNull => {
                self.bump();
                self.arena.add_expr(ExprKind::NullLit, t.span)
            }
            TokenKind::Ident => {
                self.bump();
                let name = self.intern_lexeme(t);
                self.arena.add_expr(ExprKind::Ident { name }, t.span)
            }
            TokenKind::Hole => {
                self.bump();
                self.arena.add_expr(ExprKind::Hole, t.span)
            }
            TokenKind::KwLoop => self.parse_loop_expr(),
            TokenKind::LBracket => self.parse_array_lit(ternary_depth),
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr_pratt(0, ternary_depth);
                self.expect(TokenKind::RParen);
                inner
            }
            _ => {
                self.report(Code::UnexpectedToken, t.span, Some(self.lexeme(t)));
                // leave statement boundaries and closers for the caller
                if !matches!(
                    t.kind,
                    TokenKind::Semicolon
                        | TokenKind::RParen
                        | TokenKind::RBrace
                        | TokenKind::RBracket
                        | TokenKind::Eof
                ) {
                    self.bump();
                }
                self.arena.add_expr(ExprKind::Error, t.span)
            }
        }
    }

    fn parse_loop_expr(&mut self) -> ExprId {
        let start = self.bump(); // loop

        let mut var = None;
        let mut iter = None;
        if self.eat(TokenKind::LParen) {
            let v_tok = self.peek();
            if self.expect(TokenKind::Ident) {
                var = Some(self.intern_lexeme(v_tok));
            }
            self.expect(TokenKind::KwIn);
            iter = Some(self.parse_expr());
            self.expect(TokenKind::RParen);
        }

        let body = self.parse_block();
        let span = start.span.join(self.prev_span());
        self.arena.add_expr(ExprKind::Loop { var, iter, body }, span)
    }

    fn parse_array_lit(&mut self, ternary_depth: u32) -> ExprId {
        let open = self.bump(); // '['
        let mut batch = Vec::new();
        if !self.at(TokenKind::RBracket) {
            loop {
                let e = self.parse_expr_pratt(0, ternary_depth);
                batch.push(Arg::positional(e, self.arena.expr(e).span));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.at(TokenKind::RBracket) {
                    break;
                }
            }
        }
        let close = self.peek();
        self.expect(TokenKind::RBracket);
        let args = self.arena.add_args(batch);
        self.arena
            .add_expr(ExprKind::ArrayLit { args }, open.span.join(close.span))
    }

    fn parse_postfix(&mut self, mut base: ExprId, ternary_depth: u32) -> ExprId {
        loop {
            let t = self.peek();
            match t.kind {
                TokenKind::LParen => {
                    self.bump();
                    base = self.parse_call(base, ternary_depth);
                }
                TokenKind::LBracket => {
                    self.bump();
                    base = self.parse_index(base, ternary_depth);
                }
                TokenKind::PlusPlus => {
                    self.bump();
                    let span = self.arena.expr(base).span.join(t.span);
                    base = self.arena.add_expr(ExprKind::PostfixInc { operand: base }, span);
                }
                TokenKind::Dot => {
                    self.bump();
                    let name_tok = self.peek();
                    if !self.expect(TokenKind::Ident) {
                        break;
                    }
                    let name = self.intern_lexeme(name_tok);
                    let span = self.arena.expr(base).span.join(name_tok.span);
                    base = self.arena.add_expr(ExprKind::FieldAccess { base, name }, span);
                }
                TokenKind::Question if !starts_expr(self.peek_at(1).kind) => {
                    // postfix unwrap: `a?` with nothing expression-like after
                    self.bump();
                    let span = self.arena.expr(base).span.join(t.span);
                    base = self.arena.add_expr(ExprKind::OptionalUnwrap { operand: base }, span);
                }
                TokenKind::KwAs => {
                    self.bump();
                    let cast = if self.eat(TokenKind::Question) {
                        CastKind::AsOptional
                    } else if self.eat(TokenKind::Bang) {
                        CastKind::AsForce
                    } else {
                        CastKind::As
                    };
                    let (ty, ty_span) = self.parse_type();
                    let span = self.arena.expr(base).span.join(ty_span);
                    base = self.arena.add_expr(
                        ExprKind::Cast {
                            operand: base,
                            cast,
                            ty,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        base
    }

    fn parse_call(&mut self, callee: ExprId, ternary_depth: u32) -> ExprId {
        let mut batch = Vec::new();

        if !self.at(TokenKind::RParen) {
            loop {
                let arg = self.parse_arg(ternary_depth, true);
                batch.push(arg);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.at(TokenKind::RParen) {
                    break;
                }
            }
        }

        let close = self.peek();
        self.expect(TokenKind::RParen);
        let span = self.arena.expr(callee).span.join(close.span);

        self.check_arg_mix(&batch, span);

        let args = self.arena.add_args(batch);
        self.arena.add_expr(ExprKind::Call { callee, args }, span)
    }

    /// Rejects mixing labeled and positional arguments in one call.
    /// Named-groups count as labeled; holes keep their arg's class.
    fn check_arg_mix(&mut self, batch: &[Arg], span: Span) {
        let any_labeled = batch
            .iter()
            .any(|a| a.kind == ArgKind::Labeled || a.kind == ArgKind::NamedGroup);
        let any_positional = batch.iter().any(|a| a.kind == ArgKind::Positional);
        if any_labeled && any_positional {
            self.report(Code::CallArgMixNotAllowed, span, None);
        }
    }

    fn parse_arg(&mut self, ternary_depth: u32, allow_named_group: bool) -> Arg {
        let first = self.peek();

        // named-group: `{ a: e, b: _ }`
        if first.kind == TokenKind::LBrace {
            self.bump();
            let mut children = Vec::new();
            if !self.at(TokenKind::RBrace) {
                loop {
                    let child = self.parse_arg(ternary_depth, false);
                    if child.kind == ArgKind::NamedGroup {
                        // nested named-groups are rejected and skipped
                        self.report(Code::NestedNamedGroupNotAllowed, child.span, None);
                    } else {
                        children.push(child);
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                    if self.at(TokenKind::RBrace) {
                        break;
                    }
                }
            }
            let close = self.peek();
            self.expect(TokenKind::RBrace);
            let span = first.span.join(close.span);

            if !allow_named_group {
                self.report(Code::NestedNamedGroupNotAllowed, span, None);
            }

            let children = self.arena.add_args(children);
            return Arg {
                kind: ArgKind::NamedGroup,
                label: None,
                is_hole: false,
                expr: None,
                children,
                span,
            };
        }

        // labeled arg: `ident ':' (expr | '_')`
        if first.kind == TokenKind::Ident && self.peek_at(1).kind == TokenKind::Colon {
            self.bump(); // label
            self.bump(); // ':'
            let label = self.intern_lexeme(first);

            let next = self.peek();
            if next.kind == TokenKind::Hole {
                self.bump();
                return Arg {
                    kind: ArgKind::Labeled,
                    label: Some(label),
                    is_hole: true,
                    expr: None,
                    children: SliceRange::EMPTY,
                    span: first.span.join(next.span),
                };
            }

            let expr = self.parse_expr_pratt(0, ternary_depth);
            let span = first.span.join(self.arena.expr(expr).span);
            return Arg {
                kind: ArgKind::Labeled,
                label: Some(label),
                is_hole: false,
                expr: Some(expr),
                children: SliceRange::EMPTY,
                span,
            };
        }

        // positional arg
        let expr = self.parse_expr_pratt(0, ternary_depth);
        Arg::positional(expr, self.arena.expr(expr).span)
    }

    fn parse_index(&mut self, base: ExprId, ternary_depth: u32) -> ExprId {
        let lo = self.parse_expr_pratt(0, ternary_depth);

        // range subscripts: `a[i..j]`, `a[i..:j]`
        let index = if self.at(TokenKind::DotDot) || self.at(TokenKind::DotDotColon) {
            let op_tok = self.bump();
            let op = if op_tok.kind == TokenKind::DotDot {
                BinaryOp::Range
            } else {
                BinaryOp::RangeInclusive
            };
            let hi = self.parse_expr_pratt(0, ternary_depth);
            let span = self.arena.expr(lo).span.join(self.arena.expr(hi).span);
            self.arena.add_expr(ExprKind::Binary { op, lhs: lo, rhs: hi }, span)
        } else {
            lo
        };

        let close = self.peek();
        self.expect(TokenKind::RBracket);
        let span = self.arena.expr(base).span.join(close.span);
        self.arena.add_expr(ExprKind::Index { base, index }, span)
    }

    // ---- types ----

    /// Parses a type reference.
    ///
    /// Grammar (tight to loose): primary, suffix `? []`, prefix `& &mut &&
    /// ptr`. Suffix binds tighter than prefix, so `&&T?` is `&&(T?)`.
    pub fn parse_type(&mut self) -> (TypeId, Span) {
        let start = self.peek().span;

        // collect the prefix chain, applied right-to-left afterwards
        enum Prefix {
            Borrow(bool),
            Escape,
            Ptr(bool),
        }
        let mut prefixes = Vec::new();
        loop {
            if self.at(TokenKind::Amp) {
                self.bump();
                let is_mut = self.eat(TokenKind::KwMut);
                prefixes.push(Prefix::Borrow(is_mut));
                continue;
            }
            if self.at(TokenKind::AmpAmp) {
                self.bump();
                prefixes.push(Prefix::Escape);
                continue;
            }
            if self.at(TokenKind::KwPtr) {
                self.bump();
                let is_mut = self.eat(TokenKind::KwMut);
                prefixes.push(Prefix::Ptr(is_mut));
                continue;
            }
            break;
        }

        let mut ty = self.parse_type_suffix();

        for p in prefixes.into_iter().rev() {
            ty = match p {
                Prefix::Borrow(is_mut) => self.types.make_borrow(ty, is_mut),
                Prefix::Escape => self.types.make_escape(ty),
                Prefix::Ptr(is_mut) => self.types.make_ptr(ty, is_mut),
            };
        }

        (ty, start.join(self.prev_span()))
    }

    fn parse_type_suffix(&mut self) -> TypeId {
        let mut ty = self.parse_type_primary();

        loop {
            if self.eat(TokenKind::Question) {
                ty = self.types.make_optional(ty);
                continue;
            }
            if self.at(TokenKind::LBracket) {
                self.bump();
                let size = if self.at(TokenKind::IntLit) {
                    let t = self.bump();
                    self.parse_array_size(t)
                } else {
                    None
                };
                self.expect(TokenKind::RBracket);
                ty = self.types.make_array(ty, size);
                continue;
            }
            break;
        }

        ty
    }

    fn parse_array_size(&mut self, tok: Token) -> Option<u32> {
        let text: String = self.lexeme(tok).chars().filter(|c| *c != '_').collect();
        match text.parse::<u32>() {
            Ok(n) => Some(n),
            Err(_) => {
                self.report(Code::UnexpectedToken, tok.span, Some(self.lexeme(tok)));
                None
            }
        }
    }

    fn parse_type_primary(&mut self) -> TypeId {
        let t = self.peek();

        // fn(T, ...) -> R
        if t.kind == TokenKind::KwFn {
            self.bump();
            self.expect(TokenKind::LParen);
            let mut params = Vec::new();
            if !self.at(TokenKind::RParen) {
                loop {
                    params.push(self.parse_type().0);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                    if self.at(TokenKind::RParen) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen);
            self.expect(TokenKind::Arrow);
            let ret = self.parse_type().0;
            return self.types.make_fn(ret, &params);
        }

        // ( Type )
        if t.kind == TokenKind::LParen {
            self.bump();
            let inner = self.parse_type().0;
            self.expect(TokenKind::RParen);
            return inner;
        }

        // Ident path
        if t.kind == TokenKind::Ident {
            self.bump();
            let first = self.intern_lexeme(t);
            if !self.at(TokenKind::ColonColon) {
                return self.types.intern_ident(first, self.interner);
            }
            let mut segs = vec![first];
            while self.eat(TokenKind::ColonColon) {
                let seg_tok = self.peek();
                if !self.expect(TokenKind::Ident) {
                    break;
                }
                segs.push(self.intern_lexeme(seg_tok));
            }
            return self.types.intern_path(&segs);
        }

        self.report(Code::ExpectedToken, t.span, Some("type"));
        if !self.at(TokenKind::Eof) {
            self.bump();
        }
        self.types.error()
    }
}

#[cfg(test)]
mod tests {
    use super::{Parser, MAX_PARSE_ERRORS};
    use crate::{
        ast::{AstArena, ExprKind, StmtId, StmtKind},
        diag::{Bag, Code},
        intern::Interner,
        lex::Lexer,
        types::{Builtin, TypeKind, TypePool},
    };

    struct Parsed {
        arena: AstArena,
        types: TypePool,
        interner: Interner,
        bag: Bag,
        root: StmtId,
    }

    fn parse(src: &str) -> Parsed {
        let mut bag = Bag::new();
        let tokens = Lexer::new(src, 0, &mut bag).lex_all();
        let mut arena = AstArena::new();
        let mut types = TypePool::new();
        let mut interner = Interner::new();
        let root = Parser::new(
            &tokens,
            src,
            &mut arena,
            &mut types,
            &mut interner,
            &mut bag,
            MAX_PARSE_ERRORS,
        )
        .parse_program();
        Parsed {
            arena,
            types,
            interner,
            bag,
            root,
        }
    }

    fn top_items(p: &Parsed) -> Vec<StmtId> {
        match p.arena.stmt(p.root).kind {
            StmtKind::Block { children } => p.arena.stmt_children(children).to_vec(),
            _ => panic!("root must be a block"),
        }
    }

    #[test]
    fn parses_simple_function() {
        let p = parse("fn main() -> i32 { return 0; }");
        assert!(!p.bag.has_error(), "{:?}", p.bag.diags());
        let items = top_items(&p);
        assert_eq!(items.len(), 1);
        let StmtKind::FnDecl(f) = p.arena.stmt(items[0]).kind else {
            panic!("expected fn decl");
        };
        assert_eq!(p.interner.resolve(f.name), "main");
        assert_eq!(f.ret, Some(p.types.builtin(Builtin::I32)));
    }

    #[test]
    fn type_prefix_applies_after_suffix() {
        let p = parse("fn f(a: &&i32?) -> i32 { return 0; }");
        assert!(!p.bag.has_error());
        let items = top_items(&p);
        let StmtKind::FnDecl(f) = p.arena.stmt(items[0]).kind else {
            panic!("expected fn decl");
        };
        let param = p.arena.params(f.params)[0];
        let TypeKind::Escape(inner) = p.types.kind(param.ty) else {
            panic!("expected escape type");
        };
        assert!(p.types.optional_elem(inner).is_some(), "&&i32? must be &&(i32?)");
    }

    #[test]
    fn nested_ternary_is_rejected() {
        let p = parse("fn f() -> i32 { let x: i32 = a ? b ? c : d : e; return 0; }");
        assert!(p.bag.has_code(Code::NestedTernaryNotAllowed));
    }

    #[test]
    fn labeled_and_positional_args_do_not_mix() {
        let p = parse("fn f() -> i32 { g(a: 1, 2); return 0; }");
        assert!(p.bag.has_code(Code::CallArgMixNotAllowed));
    }

    #[test]
    fn postfix_unwrap_vs_ternary() {
        let p = parse("fn f() -> i32 { let a: i32 = x?; let b: i32 = c ? d : e; return 0; }");
        assert!(!p.bag.has_code(Code::NestedTernaryNotAllowed));
        let unwraps = p
            .arena
            .exprs()
            .iter()
            .filter(|e| matches!(e.kind, ExprKind::OptionalUnwrap { .. }))
            .count();
        let ternaries = p
            .arena
            .exprs()
            .iter()
            .filter(|e| matches!(e.kind, ExprKind::Ternary { .. }))
            .count();
        assert_eq!(unwraps, 1);
        assert_eq!(ternaries, 1);
    }

    #[test]
    fn recovery_reaches_next_statement() {
        let p = parse("fn f() -> i32 { let x: i32 = ; return 0; }");
        assert!(p.bag.has_error());
        // the return statement is still parsed
        let has_return = p
            .arena
            .stmts()
            .iter()
            .any(|s| matches!(s.kind, StmtKind::Return { .. }));
        assert!(has_return);
    }

    #[test]
    fn error_cap_emits_terminal_diagnostic() {
        let mut src = String::from("fn f() -> i32 {\n");
        for _ in 0..40 {
            src.push_str("let = ;\n");
        }
        src.push_str("return 0; }\n");
        let mut bag = Bag::new();
        let tokens = Lexer::new(&src, 0, &mut bag).lex_all();
        let mut arena = AstArena::new();
        let mut types = TypePool::new();
        let mut interner = Interner::new();
        let mut parser = Parser::new(
            &tokens,
            &src,
            &mut arena,
            &mut types,
            &mut interner,
            &mut bag,
            8,
        );
        parser.parse_program();
        assert!(parser.aborted());
        assert!(bag.has_code(Code::TooManyErrors));
        let terminal_count = bag
            .diags()
            .iter()
            .filter(|d| d.code() == Code::TooManyErrors)
            .count();
        assert_eq!(terminal_count, 1);
    }

    #[test]
    fn loop_with_header_parses() {
        let p = parse("fn f() -> i32 { let s: i32 = loop (x in xs) { break x; }; return s; }");
        assert!(!p.bag.has_error(), "{:?}", p.bag.diags());
        let loops = p
            .arena
            .exprs()
            .iter()
            .filter(|e| matches!(e.kind, ExprKind::Loop { .. }))
            .count();
        assert_eq!(loops, 1);
    }
}
