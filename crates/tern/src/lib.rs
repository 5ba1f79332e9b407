#![doc = include_str!("../../../README.md")]

mod span;

mod archive;
mod ast;
mod cap;
mod diag;
mod dump;
mod intern;
mod lex;
mod oir;
mod parse;
mod passes;
mod pipeline;
mod resolve;
mod session;
mod sir;
mod source;
mod token;
mod tyck;
mod types;

pub use crate::{
    archive::{
        build_archive, inspect_archive, ArchiveError, BuildOptions as ArchiveBuildOptions,
        BuildOutput as ArchiveBuildOutput, ChunkKind, ChunkPayload, ChunkRecord, Compression,
        HeaderInfo, InspectOutput as ArchiveInspectOutput, Lane, Manifest,
    },
    ast::{AstArena, ExprId, ExprKind, StmtId, StmtKind},
    cap::{run_capability_check, CapabilityCheckResult},
    diag::{Bag, Code, Diagnostic, Severity},
    dump::{dump_ast, dump_oir, dump_sir, dump_tokens},
    intern::{Interner, StrId},
    lex::{validate_utf8, Lexer},
    parse::{Parser, MAX_PARSE_ERRORS},
    passes::{run_on_program, PassOptions, PassResults},
    pipeline::{
        compile_to_oir, compile_to_sir, OirOutput, PipelineError, PipelineOptions, SirOutput,
        Stage,
    },
    resolve::{
        resolve_program, BindingKind, NameResolveOptions, NameResolveResult, ResolvedSymbol,
        ShadowingMode, Symbol, SymbolId, SymbolKind, SymbolTable,
    },
    session::{EditWindow, IncrementalSession, ParseSnapshot, ReparseMode, TopItemMeta},
    source::{LineCol, Snippet, SnippetBlock, SourceManager},
    span::Span,
    token::{Token, TokenKind},
    tyck::{check_program, FnSig, PendingInt, TyckOptions, TyckResult},
    types::{Builtin, TypeId, TypeKind, TypePool},
};

pub mod ir {
    //! Re-exports of the SIR and OIR data models and passes for backend
    //! collaborators and tooling.

    pub use crate::oir::{
        build_oir, run_passes, verify as verify_oir, BinOp, Block as OirBlock,
        BlockId as OirBlockId, BuildResult as OirBuildResult, CastKind as OirCastKind, Cfg,
        DefSite, DomTree, Effect, EscapeHandleHint, Function as OirFunction, Inst, InstData,
        InstId, Module as OirModule, OptStats, Terminator, UnOp, Value as OirValue,
        ValueId as OirValueId,
    };
    pub use crate::oir::verify::VerifyError as OirVerifyError;
    pub use crate::sir::{
        analyze_capabilities, analyze_mut, build_sir_module, canonicalize, verify_escape_handles,
        verify_module as verify_sir, BuildOptions as SirBuildOptions,
        CanonicalizeResult, CapabilityAnalysisResult, CapabilitySymbolState, EffectClass,
        EscapeBoundaryKind, EscapeHandle, EscapeHandleKind, Module as SirModule,
        MutAnalysisResult, MutInfo, PlaceClass, Value as SirValue, ValueId as SirValueId,
        ValueKind as SirValueKind, VerifyError,
    };
}
