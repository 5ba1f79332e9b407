//! Stage orchestration: the library-side contract an external driver calls.
//!
//! Stages run in the fixed order lex → parse → AST passes → type check →
//! capability surface check → SIR build → canonicalize → SIR verify →
//! mutability/capability analyses → escape-handle verify → OIR build (gate)
//! → OIR passes → OIR verify. Each stage reads the diagnostic bag; a fatal
//! or failing verifier stops the run before later stages.

use crate::{
    ast::{AstArena, StmtId},
    cap,
    diag::Bag,
    intern::Interner,
    lex::Lexer,
    oir,
    parse::{Parser, MAX_PARSE_ERRORS},
    passes::{self, PassOptions},
    resolve::{NameResolveOptions, NameResolveResult, ShadowingMode, SymbolTable},
    sir,
    source::SourceManager,
    tyck::{self, TyckOptions, TyckResult},
    types::TypePool,
};

/// Options an external driver forwards into the core.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub max_errors: u32,
    pub shadowing: ShadowingMode,
    pub tyck: TyckOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_errors: MAX_PARSE_ERRORS,
            shadowing: ShadowingMode::Allow,
            tyck: TyckOptions::default(),
        }
    }
}

/// The stage a failed run stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Frontend,
    SirVerify,
    SirAnalysis,
    EscapeVerify,
    OirGate,
    OirVerify,
}

/// A failed pipeline run: the bag plus any verifier messages.
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub stage: Stage,
    pub bag: Bag,
    pub verify_errors: Vec<String>,
}

/// Output of a successful front-end + SIR run.
#[derive(Debug)]
pub struct SirOutput {
    pub sources: SourceManager,
    pub arena: AstArena,
    pub root: StmtId,
    pub types: TypePool,
    pub interner: Interner,
    pub sym: SymbolTable,
    pub nres: NameResolveResult,
    pub tyck: TyckResult,
    pub sir: sir::Module,
    pub bag: Bag,
}

/// Output of a full run down to verified OIR.
#[derive(Debug)]
pub struct OirOutput {
    pub sources: SourceManager,
    pub types: TypePool,
    pub interner: Interner,
    pub sir: sir::Module,
    pub oir: oir::Module,
    pub bag: Bag,
}

/// Runs the front end and SIR stages over one source buffer.
pub fn compile_to_sir(source: &str, options: PipelineOptions) -> Result<SirOutput, PipelineError> {
    let mut sources = SourceManager::new();
    let file_id = sources.add("main.tn", source);

    let mut bag = Bag::new();
    let tokens = Lexer::new(sources.content(file_id), file_id, &mut bag).lex_all();

    let mut arena = AstArena::new();
    let mut types = TypePool::new();
    let mut interner = Interner::new();
    let root = Parser::new(
        &tokens,
        sources.content(file_id),
        &mut arena,
        &mut types,
        &mut interner,
        &mut bag,
        options.max_errors,
    )
    .parse_program();

    let pres = passes::run_on_program(
        &arena,
        root,
        &interner,
        &mut bag,
        PassOptions {
            name_resolve: NameResolveOptions {
                shadowing: options.shadowing,
            },
        },
    );
    let mut sym = pres.sym;
    let nres = pres.name_resolve;

    let tyck_res = tyck::check_program(
        &arena,
        root,
        &mut types,
        &mut sym,
        &nres,
        &interner,
        &mut bag,
        options.tyck,
    );

    cap::run_capability_check(&arena, root, &mut bag);

    // front-end diagnostics stop the run before lowering
    if bag.has_error() {
        return Err(PipelineError {
            stage: Stage::Frontend,
            bag,
            verify_errors: Vec::new(),
        });
    }

    let mut sir_mod = sir::build_sir_module(
        &arena,
        root,
        &sym,
        &nres,
        &tyck_res,
        &types,
        sir::BuildOptions::default(),
    );

    sir::canonicalize(&mut sir_mod);

    let sir_verrs = sir::verify_module(&sir_mod);
    if !sir_verrs.is_empty() {
        return Err(PipelineError {
            stage: Stage::SirVerify,
            bag,
            verify_errors: sir_verrs.into_iter().map(|e| e.msg).collect(),
        });
    }

    sir::analyze_mut(&sir_mod, &types, &mut bag);
    let cap_res = sir::analyze_capabilities(&sir_mod, &types, &sym, &interner, &mut bag);
    if !cap_res.ok || bag.has_error() {
        return Err(PipelineError {
            stage: Stage::SirAnalysis,
            bag,
            verify_errors: Vec::new(),
        });
    }

    let handle_verrs = sir::verify_escape_handles(&sir_mod);
    if !handle_verrs.is_empty() {
        return Err(PipelineError {
            stage: Stage::EscapeVerify,
            bag,
            verify_errors: handle_verrs.into_iter().map(|e| e.msg).collect(),
        });
    }

    Ok(SirOutput {
        sources,
        arena,
        root,
        types,
        interner,
        sym,
        nres,
        tyck: tyck_res,
        sir: sir_mod,
        bag,
    })
}

/// Runs the whole pipeline: front end, SIR analyses, OIR build + passes +
/// verify. On success the returned module is ready for backend handoff.
pub fn compile_to_oir(source: &str, options: PipelineOptions) -> Result<OirOutput, PipelineError> {
    let out = compile_to_sir(source, options)?;
    let SirOutput {
        sources,
        mut types,
        interner,
        sym,
        sir: sir_mod,
        bag,
        ..
    } = out;

    let build = oir::build_oir(&sir_mod, &mut types, &sym, &interner);
    if !build.gate_passed {
        return Err(PipelineError {
            stage: Stage::OirGate,
            bag,
            verify_errors: build.gate_errors.into_iter().map(|e| e.msg).collect(),
        });
    }
    let mut oir_mod = build.module;

    oir::run_passes(&mut oir_mod, &types);

    let oir_verrs = oir::verify(&oir_mod);
    if !oir_verrs.is_empty() {
        return Err(PipelineError {
            stage: Stage::OirVerify,
            bag,
            verify_errors: oir_verrs.into_iter().map(|e| e.msg).collect(),
        });
    }

    Ok(OirOutput {
        sources,
        types,
        interner,
        sir: sir_mod,
        oir: oir_mod,
        bag,
    })
}
