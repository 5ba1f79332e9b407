//! Incremental reparse session.
//!
//! Keeps the last successful parse snapshot. On edit, only top-level items
//! at or after the earliest edited byte are re-parsed; untouched items are
//! carried over by id from the previous snapshot (arena ids are append-only
//! and stable). Prior source buffers are retained because preserved items'
//! spans still point into them; past a retention threshold the session
//! falls back to a full rebuild and compacts.

use std::sync::Arc;

use crate::{
    ast::{AstArena, StmtId, StmtKind},
    diag::Bag,
    intern::Interner,
    lex::Lexer,
    parse::{Parser, MAX_PARSE_ERRORS},
    token::{Token, TokenKind},
    types::TypePool,
};

/// Maximum retained source buffers before a compacting full rebuild.
const MAX_SOURCE_OWNERS: usize = 16;

/// One edited byte window in the new source.
#[derive(Debug, Clone, Copy)]
pub struct EditWindow {
    pub lo: u32,
    pub hi: u32,
}

/// Span metadata of one top-level item.
#[derive(Debug, Clone, Copy)]
pub struct TopItemMeta {
    pub sid: StmtId,
    pub lo: u32,
    pub hi: u32,
}

/// A complete parse state: arena, types, interner, tokens, and the
/// top-level item index.
#[derive(Debug, Clone)]
pub struct ParseSnapshot {
    pub arena: AstArena,
    pub types: TypePool,
    pub interner: Interner,
    pub root: StmtId,
    pub tokens: Vec<Token>,
    pub top_items: Vec<TopItemMeta>,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReparseMode {
    #[default]
    None,
    FullRebuild,
    IncrementalMerge,
    FallbackFullRebuild,
}

/// Long-lived session over one file's successive versions.
#[derive(Debug, Default)]
pub struct IncrementalSession {
    snapshot: Option<ParseSnapshot>,
    last_mode: ReparseMode,
    revision_seq: u64,
    source_owners: Vec<Arc<str>>,
    max_errors: u32,
}

impl IncrementalSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_errors: MAX_PARSE_ERRORS,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ready(&self) -> bool {
        self.snapshot.is_some()
    }

    #[must_use]
    pub fn last_mode(&self) -> ReparseMode {
        self.last_mode
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&ParseSnapshot> {
        self.snapshot.as_ref()
    }

    /// Retained source buffers (for tests and diagnostics over old items).
    #[must_use]
    pub fn source_owner_count(&self) -> usize {
        self.source_owners.len()
    }

    /// First parse of a file.
    pub fn initialize(&mut self, source: &str, file_id: u32, bag: &mut Bag) -> bool {
        self.full_rebuild(source, file_id, bag, ReparseMode::FullRebuild)
    }

    /// Re-parses after edits. Attempts an incremental merge; falls back to
    /// a full rebuild when a structural invariant is violated.
    pub fn reparse_with_edits(
        &mut self,
        source: &str,
        file_id: u32,
        edits: &[EditWindow],
        bag: &mut Bag,
    ) -> bool {
        if self.snapshot.is_none() {
            return self.initialize(source, file_id, bag);
        }
        if edits.is_empty() {
            return self.full_rebuild(source, file_id, bag, ReparseMode::FullRebuild);
        }

        if self.try_incremental_merge(source, file_id, edits, bag) {
            self.last_mode = ReparseMode::IncrementalMerge;
            return true;
        }

        self.full_rebuild(source, file_id, bag, ReparseMode::FallbackFullRebuild)
    }

    fn full_rebuild(
        &mut self,
        source: &str,
        file_id: u32,
        bag: &mut Bag,
        mode: ReparseMode,
    ) -> bool {
        let owner: Arc<str> = Arc::from(source);

        let tokens = Lexer::new(&owner, file_id, bag).lex_all();

        let mut arena = AstArena::new();
        let mut types = TypePool::new();
        let mut interner = Interner::new();
        let root = Parser::new(
            &tokens,
            &owner,
            &mut arena,
            &mut types,
            &mut interner,
            bag,
            self.max_errors,
        )
        .parse_program();

        let top_items = collect_top_items(&arena, root);
        self.revision_seq += 1;
        self.snapshot = Some(ParseSnapshot {
            arena,
            types,
            interner,
            root,
            tokens,
            top_items,
            revision: self.revision_seq,
        });
        self.source_owners.clear();
        self.source_owners.push(owner);
        self.last_mode = mode;
        true
    }

    fn try_incremental_merge(
        &mut self,
        source: &str,
        file_id: u32,
        edits: &[EditWindow],
        bag: &mut Bag,
    ) -> bool {
        let Some(prev) = self.snapshot.as_ref() else {
            return false;
        };
        if self.source_owners.len() > MAX_SOURCE_OWNERS {
            return false; // retention compact trigger
        }
        let old_items = prev.top_items.clone();
        if old_items.is_empty() {
            return false;
        }

        let earliest = edits.iter().map(|e| e.lo.min(e.hi)).min().unwrap_or(0);
        let mut first = old_items
            .iter()
            .position(|it| earliest <= it.hi)
            .unwrap_or(old_items.len());
        if first == 0 {
            return false; // the very first item is affected: full parse
        }
        if first >= old_items.len() {
            first = old_items.len() - 1;
        }

        let owner: Arc<str> = Arc::from(source);
        let mut local_bag = Bag::new();
        let new_tokens = Lexer::new(&owner, file_id, &mut local_bag).lex_all();
        if local_bag.has_fatal() {
            return false;
        }

        let parse_lo = old_items[first].lo.min(earliest);
        let tok_begin = new_tokens
            .iter()
            .position(|t| t.kind == TokenKind::Eof || t.span.lo >= parse_lo)
            .unwrap_or(new_tokens.len());
        if tok_begin >= new_tokens.len() {
            return false;
        }
        let partial_tokens: Vec<Token> = new_tokens[tok_begin..].to_vec();

        // clone the previous arenas: items before `first` keep stable ids
        let mut arena = prev.arena.clone();
        let mut types = prev.types.clone();
        let mut interner = prev.interner.clone();

        let partial_root = Parser::new(
            &partial_tokens,
            &owner,
            &mut arena,
            &mut types,
            &mut interner,
            &mut local_bag,
            self.max_errors,
        )
        .parse_program();

        let StmtKind::Block { children: new_children } = arena.stmt(partial_root).kind else {
            return false;
        };

        let mut merged: Vec<StmtId> = old_items[..first].iter().map(|it| it.sid).collect();
        merged.extend(arena.stmt_children(new_children).iter().copied());

        let span = {
            let first_span = merged
                .first()
                .map(|&s| arena.stmt(s).span)
                .unwrap_or_default();
            let last_span = merged
                .last()
                .map(|&s| arena.stmt(s).span)
                .unwrap_or_default();
            first_span.join(last_span)
        };
        let slice = arena.add_stmt_children(merged);
        let new_root = arena.add_stmt(StmtKind::Block { children: slice }, span);

        let top_items = collect_top_items(&arena, new_root);
        self.revision_seq += 1;
        self.snapshot = Some(ParseSnapshot {
            arena,
            types,
            interner,
            root: new_root,
            tokens: new_tokens,
            top_items,
            revision: self.revision_seq,
        });

        // retain old buffers: preserved items' spans still point into them
        if !self
            .source_owners
            .iter()
            .any(|o| Arc::ptr_eq(o, &owner))
        {
            self.source_owners.push(owner);
        }

        bag.absorb(local_bag);
        true
    }
}

fn collect_top_items(arena: &AstArena, root: StmtId) -> Vec<TopItemMeta> {
    let StmtKind::Block { children } = arena.stmt(root).kind else {
        return Vec::new();
    };
    arena
        .stmt_children(children)
        .iter()
        .map(|&sid| {
            let span = arena.stmt(sid).span;
            TopItemMeta {
                sid,
                lo: span.lo,
                hi: span.hi,
            }
        })
        .collect()
}
