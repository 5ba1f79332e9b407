//! Diagnostics: stable codes, severities, and the per-run collection bag.
//!
//! The core never renders text for end users. A diagnostic is a
//! `(severity, code, span, args)` tuple; external renderers translate
//! `code + args` into localized messages. Args are capped at three per
//! diagnostic by the rendering contract.

use strum::IntoStaticStr;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum Severity {
    Warning,
    Error,
    /// Aborts the stage that reported it; later stages are skipped.
    Fatal,
}

/// Stable diagnostic codes.
///
/// The numeric order is not part of the contract; the variant name is (it is
/// what renderers key their message tables on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum Code {
    // lex
    InvalidUtf8,
    UnterminatedString,
    UnterminatedChar,
    UnterminatedBlockComment,

    // generic parse
    ExpectedToken,
    UnexpectedToken,
    NestedTernaryNotAllowed,
    TooManyErrors,
    TopLevelDeclOnly,

    // pipe + hole rules
    PipeRhsMustBeCall,
    PipeHoleMustBeLabeled,
    PipeHoleCountMismatch,
    PipeHolePositionalNotAllowed,

    // call rules
    CallArgMixNotAllowed,
    NestedNamedGroupNotAllowed,

    // name resolution
    UnknownIdentifier,
    DuplicateInScope,
    ShadowedBinding,

    // type checking
    TypeMismatch,
    CannotUnify,
    CondMustBeBool,
    NotAPlaceExpr,
    WriteToImmutable,
    NotCallable,
    NotIndexable,
    NoSuchMember,
    CallArgCountMismatch,
    CallUnknownLabel,
    OptionalUnwrapOnNonOptional,
    NestedOptionalNotAllowed,
    NestedEscapeNotAllowed,
    BadCast,
    IntLiteralOutOfRange,
    UnresolvedInferInteger,
    ReturnTypeMismatch,
    BreakOutsideLoop,
    ContinueOutsideLoop,

    // capability surface checks
    BorrowOperandMustBePlace,
    EscapeOperandMustBePlace,
    EscapeOperandMustNotBeBorrow,
    EscapeOfTemporary,

    // SIR capability analysis
    BorrowConflict,
    EscapeNonStatic,
    UseAfterMove,
}

impl Code {
    /// Stable name used by renderer message tables.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// One reported diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    code: Code,
    span: Span,
    args: Vec<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, code: Code, span: Span) -> Self {
        Self {
            severity,
            code,
            span,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(code: Code, span: Span) -> Self {
        Self::new(Severity::Error, code, span)
    }

    #[must_use]
    pub fn warning(code: Code, span: Span) -> Self {
        Self::new(Severity::Warning, code, span)
    }

    #[must_use]
    pub fn fatal(code: Code, span: Span) -> Self {
        Self::new(Severity::Fatal, code, span)
    }

    /// Appends a rendering argument. At most three are kept.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        if self.args.len() < 3 {
            self.args.push(arg.into());
        }
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn code(&self) -> Code {
        self.code
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Ordered collection of diagnostics for one pipeline run.
///
/// Order of insertion is preserved; stages append and the driver inspects
/// `has_error` / `has_fatal` between stages.
#[derive(Debug, Clone, Default)]
pub struct Bag {
    diags: Vec<Diagnostic>,
    error_count: u32,
    fatal_count: u32,
}

impl Bag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, d: Diagnostic) {
        match d.severity {
            Severity::Error => self.error_count += 1,
            Severity::Fatal => self.fatal_count += 1,
            Severity::Warning => {}
        }
        self.diags.push(d);
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error_count != 0 || self.fatal_count != 0
    }

    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.fatal_count != 0
    }

    #[must_use]
    pub fn has_code(&self, code: Code) -> bool {
        self.diags.iter().any(|d| d.code == code)
    }

    /// True when a diagnostic with this exact `(code, span)` pair was already
    /// reported. Analyses use this to suppress cascades at one position.
    #[must_use]
    pub fn has_at(&self, code: Code, span: Span) -> bool {
        self.diags.iter().any(|d| d.code == code && d.span == span)
    }

    #[must_use]
    pub fn diags(&self) -> &[Diagnostic] {
        &self.diags
    }

    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    #[must_use]
    pub fn fatal_count(&self) -> u32 {
        self.fatal_count
    }

    #[must_use]
    pub fn issue_count(&self) -> u32 {
        self.error_count + self.fatal_count
    }

    /// Moves all diagnostics out of `other`, preserving their order.
    pub fn absorb(&mut self, other: Self) {
        self.error_count += other.error_count;
        self.fatal_count += other.fatal_count;
        self.diags.extend(other.diags);
    }
}

#[cfg(test)]
mod tests {
    use super::{Bag, Code, Diagnostic, Severity};
    use crate::span::Span;

    #[test]
    fn bag_counts_errors_and_fatals() {
        let mut bag = Bag::new();
        assert!(!bag.has_error());
        bag.add(Diagnostic::warning(Code::ShadowedBinding, Span::default()));
        assert!(!bag.has_error());
        bag.add(Diagnostic::error(Code::TypeMismatch, Span::default()));
        bag.add(Diagnostic::fatal(Code::InvalidUtf8, Span::default()));
        assert!(bag.has_error());
        assert!(bag.has_fatal());
        assert_eq!(bag.issue_count(), 2);
    }

    #[test]
    fn args_are_capped_at_three() {
        let d = Diagnostic::error(Code::TypeMismatch, Span::default())
            .with_arg("a")
            .with_arg("b")
            .with_arg("c")
            .with_arg("dropped");
        assert_eq!(d.args().len(), 3);
    }

    #[test]
    fn position_dedup_lookup() {
        let mut bag = Bag::new();
        let sp = Span::new(0, 3, 7);
        bag.add(Diagnostic::error(Code::WriteToImmutable, sp));
        assert!(bag.has_at(Code::WriteToImmutable, sp));
        assert!(!bag.has_at(Code::WriteToImmutable, Span::new(0, 3, 8)));
        assert_eq!(d_severity(&bag), Severity::Error);
    }

    fn d_severity(bag: &Bag) -> Severity {
        bag.diags()[0].severity()
    }
}
