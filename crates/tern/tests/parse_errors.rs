//! Error reporting and recovery behavior across the front end.

use tern::{compile_to_oir, compile_to_sir, Code, PipelineOptions, Severity, Stage};

#[test]
fn broken_statement_recovers_to_the_next_boundary() {
    let err = compile_to_sir(
        "fn f() -> i32 { let x: i32 = ; let y: i32 = 2i32; return y; }",
        PipelineOptions::default(),
    )
    .expect_err("broken init must fail");
    assert_eq!(err.stage, Stage::Frontend);
    assert!(err.bag.has_code(Code::UnexpectedToken));
    // recovery keeps going: no terminal error, only the local ones
    assert!(!err.bag.has_code(Code::TooManyErrors));
}

#[test]
fn error_cap_emits_one_terminal_diagnostic() {
    let mut src = String::from("fn f() -> i32 {\n");
    for _ in 0..64 {
        src.push_str("let = ;\n");
    }
    src.push_str("return 0; }\n");

    let err = compile_to_sir(
        &src,
        PipelineOptions {
            max_errors: 8,
            ..PipelineOptions::default()
        },
    )
    .expect_err("error cap must fail the run");
    let terminal = err
        .bag
        .diags()
        .iter()
        .filter(|d| d.code() == Code::TooManyErrors)
        .count();
    assert_eq!(terminal, 1);
    assert!(err.bag.error_count() <= 8 + 1);
}

#[test]
fn unknown_identifier_binds_error_and_continues() {
    let err = compile_to_sir(
        "fn f() -> i32 { let a: i32 = missing; let b: i32 = 2i32; return b; }",
        PipelineOptions::default(),
    )
    .expect_err("unknown identifier must fail");
    assert!(err.bag.has_code(Code::UnknownIdentifier));
    // the Error type annihilates: no cascade from `a`'s bad init
    assert!(!err.bag.has_code(Code::TypeMismatch), "{:?}", err.bag.diags());
}

#[test]
fn top_level_expression_statements_are_rejected() {
    let err = compile_to_sir("1 + 2;", PipelineOptions::default()).expect_err("must fail");
    assert!(err.bag.has_code(Code::TopLevelDeclOnly));
}

#[test]
fn invalid_utf8_is_a_sticky_fatal() {
    let mut bag = tern::Bag::new();
    let bytes = [b'f', b'n', b' ', 0xC3, 0x28];
    assert!(tern::validate_utf8(&bytes, 0, &mut bag).is_none());
    assert!(bag.has_fatal());
    assert_eq!(bag.diags()[0].severity(), Severity::Fatal);
    assert_eq!(bag.diags()[0].code(), Code::InvalidUtf8);
}

#[test]
fn borrow_conflict_marks_function_failed_but_reports_precisely() {
    let err = compile_to_oir(
        "fn f() -> i32 {\n\
           let mut x: i32 = 1;\n\
           let a: &mut i32 = &mut x;\n\
           let b: &mut i32 = &mut x;\n\
           return x;\n\
         }",
        PipelineOptions::default(),
    )
    .expect_err("double mutable borrow must fail");
    let conflicts = err
        .bag
        .diags()
        .iter()
        .filter(|d| d.code() == Code::BorrowConflict)
        .count();
    assert_eq!(conflicts, 1);
}

#[test]
fn shadowing_policy_escalates_to_error() {
    let src = "fn f() -> i32 { let x: i32 = 1; { let x: i32 = 2; } return x; }";
    assert!(compile_to_sir(src, PipelineOptions::default()).is_ok());

    let err = compile_to_sir(
        src,
        PipelineOptions {
            shadowing: tern::ShadowingMode::Error,
            ..PipelineOptions::default()
        },
    )
    .expect_err("shadowing must fail under the strict policy");
    assert!(err.bag.has_code(Code::ShadowedBinding));
}

#[test]
fn diagnostics_preserve_insertion_order() {
    let err = compile_to_sir(
        "fn f() -> i32 { let a: i32 = missing_one; let b: i32 = missing_two; return 0; }",
        PipelineOptions::default(),
    )
    .expect_err("must fail");
    let unknowns: Vec<u32> = err
        .bag
        .diags()
        .iter()
        .filter(|d| d.code() == Code::UnknownIdentifier)
        .map(|d| d.span().lo)
        .collect();
    let mut sorted = unknowns.clone();
    sorted.sort_unstable();
    assert_eq!(unknowns, sorted, "bag order must follow source order here");
    assert_eq!(unknowns.len(), 2);
}
