//! Token kinds, the punctuation table, and keyword lookup.

use std::str::FromStr;

use strum::{EnumString, IntoStaticStr};

use crate::span::Span;

/// Every kind of token the lexer can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum TokenKind {
    // special
    Eof,
    Error,
    /// Recovery token for punctuation outside the table.
    UnknownPunct,

    // identifiers / literals
    Ident,
    /// `_` alone.
    Hole,
    IntLit,
    FloatLit,
    StringLit,
    CharLit,

    // keywords
    KwTrue,
    KwFalse,
    KwNull,
    KwAnd,
    KwOr,
    KwNot,
    KwXor,
    KwMut,
    KwStatic,
    KwLet,
    KwSet,
    KwIf,
    KwElif,
    KwElse,
    KwWhile,
    KwDo,
    KwReturn,
    KwBreak,
    KwContinue,
    KwManual,
    KwExport,
    KwFn,
    KwField,
    KwActs,
    KwSwitch,
    KwCase,
    KwDefault,
    KwLoop,
    KwIn,
    KwUse,
    KwImport,
    KwAs,
    KwNest,
    KwPtr,
    KwFor,

    // punct / delimiters
    At,
    Arrow,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Question,
    QuestionQuestion,
    QuestionQuestionAssign,
    Dot,
    DotDot,
    DotDotColon,
    ColonColon,

    // operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    Bang,
    Caret,
    Amp,
    AmpAmp,
    PipePipe,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `<<`, the pipe operator.
    LtLt,
}

impl TokenKind {
    /// Human-oriented name: the literal spelling for keywords and
    /// punctuation, a short tag otherwise. Used in `ExpectedToken` args.
    #[must_use]
    pub fn text_name(self) -> &'static str {
        match self {
            Self::Eof => "eof",
            Self::Error => "error",
            Self::UnknownPunct => "unknown_punct",
            Self::Ident => "ident",
            Self::Hole => "_",
            Self::IntLit => "int_lit",
            Self::FloatLit => "float_lit",
            Self::StringLit => "string_lit",
            Self::CharLit => "char_lit",
            Self::KwTrue => "true",
            Self::KwFalse => "false",
            Self::KwNull => "null",
            Self::KwAnd => "and",
            Self::KwOr => "or",
            Self::KwNot => "not",
            Self::KwXor => "xor",
            Self::KwMut => "mut",
            Self::KwStatic => "static",
            Self::KwLet => "let",
            Self::KwSet => "set",
            Self::KwIf => "if",
            Self::KwElif => "elif",
            Self::KwElse => "else",
            Self::KwWhile => "while",
            Self::KwDo => "do",
            Self::KwReturn => "return",
            Self::KwBreak => "break",
            Self::KwContinue => "continue",
            Self::KwManual => "manual",
            Self::KwExport => "export",
            Self::KwFn => "fn",
            Self::KwField => "field",
            Self::KwActs => "acts",
            Self::KwSwitch => "switch",
            Self::KwCase => "case",
            Self::KwDefault => "default",
            Self::KwLoop => "loop",
            Self::KwIn => "in",
            Self::KwUse => "use",
            Self::KwImport => "import",
            Self::KwAs => "as",
            Self::KwNest => "nest",
            Self::KwPtr => "ptr",
            Self::KwFor => "for",
            Self::At => "@",
            Self::Arrow => "->",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Question => "?",
            Self::QuestionQuestion => "??",
            Self::QuestionQuestionAssign => "??=",
            Self::Dot => ".",
            Self::DotDot => "..",
            Self::DotDotColon => "..:",
            Self::ColonColon => "::",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::PercentAssign => "%=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::PlusPlus => "++",
            Self::Bang => "!",
            Self::Caret => "^",
            Self::Amp => "&",
            Self::AmpAmp => "&&",
            Self::PipePipe => "||",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::LtLt => "<<",
        }
    }
}

/// Reserved words, decided by exact lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Xor,
    Mut,
    Static,
    Let,
    Set,
    If,
    Elif,
    Else,
    While,
    Do,
    Return,
    Break,
    Continue,
    Manual,
    Export,
    Fn,
    Field,
    Acts,
    Switch,
    Case,
    Default,
    Loop,
    In,
    Use,
    Import,
    As,
    Nest,
    Ptr,
    For,
}

impl Keyword {
    #[must_use]
    pub fn token_kind(self) -> TokenKind {
        match self {
            Self::True => TokenKind::KwTrue,
            Self::False => TokenKind::KwFalse,
            Self::Null => TokenKind::KwNull,
            Self::And => TokenKind::KwAnd,
            Self::Or => TokenKind::KwOr,
            Self::Not => TokenKind::KwNot,
            Self::Xor => TokenKind::KwXor,
            Self::Mut => TokenKind::KwMut,
            Self::Static => TokenKind::KwStatic,
            Self::Let => TokenKind::KwLet,
            Self::Set => TokenKind::KwSet,
            Self::If => TokenKind::KwIf,
            Self::Elif => TokenKind::KwElif,
            Self::Else => TokenKind::KwElse,
            Self::While => TokenKind::KwWhile,
            Self::Do => TokenKind::KwDo,
            Self::Return => TokenKind::KwReturn,
            Self::Break => TokenKind::KwBreak,
            Self::Continue => TokenKind::KwContinue,
            Self::Manual => TokenKind::KwManual,
            Self::Export => TokenKind::KwExport,
            Self::Fn => TokenKind::KwFn,
            Self::Field => TokenKind::KwField,
            Self::Acts => TokenKind::KwActs,
            Self::Switch => TokenKind::KwSwitch,
            Self::Case => TokenKind::KwCase,
            Self::Default => TokenKind::KwDefault,
            Self::Loop => TokenKind::KwLoop,
            Self::In => TokenKind::KwIn,
            Self::Use => TokenKind::KwUse,
            Self::Import => TokenKind::KwImport,
            Self::As => TokenKind::KwAs,
            Self::Nest => TokenKind::KwNest,
            Self::Ptr => TokenKind::KwPtr,
            Self::For => TokenKind::KwFor,
        }
    }
}

/// Resolves an identifier lexeme to a keyword token kind, if reserved.
#[must_use]
pub fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    Keyword::from_str(lexeme).ok().map(Keyword::token_kind)
}

/// Punctuation table in longest-match-first order.
///
/// The lexer tries entries in order, so multi-byte entries must precede
/// every prefix of themselves.
pub const PUNCT_TABLE: &[(&str, TokenKind)] = &[
    ("??=", TokenKind::QuestionQuestionAssign),
    ("..:", TokenKind::DotDotColon),
    ("->", TokenKind::Arrow),
    ("??", TokenKind::QuestionQuestion),
    ("..", TokenKind::DotDot),
    ("::", TokenKind::ColonColon),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("++", TokenKind::PlusPlus),
    ("&&", TokenKind::AmpAmp),
    ("||", TokenKind::PipePipe),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::BangEq),
    ("<=", TokenKind::LtEq),
    (">=", TokenKind::GtEq),
    ("<<", TokenKind::LtLt),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    (";", TokenKind::Semicolon),
    ("?", TokenKind::Question),
    (".", TokenKind::Dot),
    ("=", TokenKind::Assign),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("!", TokenKind::Bang),
    ("^", TokenKind::Caret),
    ("&", TokenKind::Amp),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("@", TokenKind::At),
];

/// One lexed token. The lexeme is the `span` slice of the source buffer; it
/// is not stored here so tokens stay `Copy` and outlive reparses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The lexeme slice inside `source`.
    #[must_use]
    pub fn lexeme<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.lo as usize..self.span.hi as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::{keyword_kind, PUNCT_TABLE, TokenKind};

    #[test]
    fn keywords_resolve_by_exact_lexeme() {
        assert_eq!(keyword_kind("fn"), Some(TokenKind::KwFn));
        assert_eq!(keyword_kind("loop"), Some(TokenKind::KwLoop));
        assert_eq!(keyword_kind("Fn"), None);
        assert_eq!(keyword_kind("fnord"), None);
    }

    #[test]
    fn punct_table_is_longest_match_first() {
        for (i, (text, _)) in PUNCT_TABLE.iter().enumerate() {
            for (later, _) in &PUNCT_TABLE[i + 1..] {
                assert!(
                    !later.starts_with(text) || later.len() <= text.len(),
                    "{later:?} must come before its prefix {text:?}"
                );
            }
        }
    }
}
