//! The lexer: strict UTF-8 gate plus a byte-dispatch scanner.
//!
//! `lex_all` produces a finite token vector terminated by exactly one `Eof`
//! token. Lexemes are not copied: a token's text is the span slice of the
//! source buffer.

use crate::{
    diag::{Bag, Code, Diagnostic},
    span::Span,
    token::{keyword_kind, Token, TokenKind, PUNCT_TABLE},
};

/// Validates raw input bytes as strict UTF-8.
///
/// On failure a `Fatal` diagnostic is reported with a one-byte span at the
/// first invalid byte, and the caller must not run the parser (the fatal is
/// sticky via [`Bag::has_fatal`]).
pub fn validate_utf8<'a>(bytes: &'a [u8], file_id: u32, bag: &mut Bag) -> Option<&'a str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Some(s),
        Err(e) => {
            let at = u32::try_from(e.valid_up_to()).unwrap_or(u32::MAX);
            bag.add(
                Diagnostic::fatal(Code::InvalidUtf8, Span::new(file_id, at, at.saturating_add(1)))
                    .with_arg(format!("0x{:02x}", bytes.get(e.valid_up_to()).copied().unwrap_or(0))),
            );
            None
        }
    }
}

pub struct Lexer<'src, 'b> {
    source: &'src str,
    bytes: &'src [u8],
    file_id: u32,
    pos: usize,
    bag: &'b mut Bag,
}

impl<'src, 'b> Lexer<'src, 'b> {
    pub fn new(source: &'src str, file_id: u32, bag: &'b mut Bag) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            file_id,
            pos: 0,
            bag,
        }
    }

    /// Lexes the whole buffer into a token vector terminated by `Eof`.
    pub fn lex_all(mut self) -> Vec<Token> {
        let mut out = Vec::with_capacity(self.source.len() / 4 + 1);

        loop {
            self.skip_ws_and_comments();
            if self.eof() {
                break;
            }

            let c = self.peek(0);
            let tok = if c.is_ascii_digit() {
                self.lex_number()
            } else if c == b'"' {
                self.lex_string()
            } else if c == b'\'' {
                self.lex_char()
            } else if is_ident_start(c) {
                self.lex_ident_or_keyword()
            } else {
                self.lex_punct_or_unknown()
            };
            out.push(tok);
        }

        let end = u32::try_from(self.source.len()).expect("source too large");
        out.push(Token::new(TokenKind::Eof, Span::new(self.file_id, end, end)));
        out
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self, k: usize) -> u8 {
        self.bytes.get(self.pos + k).copied().unwrap_or(0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek(0);
        if !self.eof() {
            self.pos += 1;
        }
        c
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(
            self.file_id,
            u32::try_from(start).expect("offset overflow"),
            u32::try_from(self.pos).expect("offset overflow"),
        )
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while !self.eof() && self.peek(0).is_ascii_whitespace() {
                self.pos += 1;
            }

            // line comment
            if self.peek(0) == b'/' && self.peek(1) == b'/' {
                self.pos += 2;
                while !self.eof() && self.peek(0) != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            // block comment, non-nesting
            if self.peek(0) == b'/' && self.peek(1) == b'*' {
                let start = self.pos;
                self.pos += 2;
                let mut closed = false;
                while !self.eof() {
                    if self.peek(0) == b'*' && self.peek(1) == b'/' {
                        self.pos += 2;
                        closed = true;
                        break;
                    }
                    self.pos += 1;
                }
                if !closed {
                    self.bag.add(Diagnostic::error(
                        Code::UnterminatedBlockComment,
                        self.span_from(start),
                    ));
                }
                continue;
            }

            break;
        }
    }

    fn lex_number(&mut self) -> Token {
        let start = self.pos;
        self.scan_digits();

        let mut is_float = false;
        // float: digits '.' digit — a bare `1.` stays an int followed by `.`
        if self.peek(0) == b'.' && self.peek(1).is_ascii_digit() {
            is_float = true;
            self.pos += 1;
            self.scan_digits();
        }

        // type suffix: a letter followed by alphanumerics (`i32`, `u8`, `f64`)
        if self.peek(0).is_ascii_alphabetic() {
            while !self.eof() && (self.peek(0).is_ascii_alphanumeric() || self.peek(0) == b'_') {
                self.pos += 1;
            }
        }

        let kind = if is_float { TokenKind::FloatLit } else { TokenKind::IntLit };
        Token::new(kind, self.span_from(start))
    }

    fn scan_digits(&mut self) {
        while !self.eof() {
            let c = self.peek(0);
            if c.is_ascii_digit() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self) -> Token {
        let start = self.pos;
        self.bump(); // opening quote

        let mut closed = false;
        while !self.eof() {
            let c = self.bump();
            if c == b'\\' {
                if !self.eof() {
                    self.bump();
                }
                continue;
            }
            if c == b'"' {
                closed = true;
                break;
            }
        }

        let span = self.span_from(start);
        if !closed {
            self.bag.add(Diagnostic::error(Code::UnterminatedString, span));
        }
        Token::new(TokenKind::StringLit, span)
    }

    fn lex_char(&mut self) -> Token {
        let start = self.pos;
        self.bump(); // opening quote

        let mut closed = false;
        while !self.eof() {
            let c = self.bump();
            if c == b'\\' {
                if !self.eof() {
                    self.bump();
                }
                continue;
            }
            if c == b'\'' {
                closed = true;
                break;
            }
            if c == b'\n' {
                break;
            }
        }

        let span = self.span_from(start);
        if !closed {
            self.bag.add(Diagnostic::error(Code::UnterminatedChar, span));
        }
        Token::new(TokenKind::CharLit, span)
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        self.bump();
        while !self.eof() && is_ident_cont(self.peek(0)) {
            self.pos += 1;
        }

        let span = self.span_from(start);
        let lexeme = &self.source[start..self.pos];

        if lexeme == "_" {
            return Token::new(TokenKind::Hole, span);
        }
        if let Some(kw) = keyword_kind(lexeme) {
            return Token::new(kw, span);
        }
        Token::new(TokenKind::Ident, span)
    }

    fn lex_punct_or_unknown(&mut self) -> Token {
        let start = self.pos;

        // maximal munch over the ordered punctuation table
        for (text, kind) in PUNCT_TABLE {
            if self.bytes[self.pos..].starts_with(text.as_bytes()) {
                self.pos += text.len();
                return Token::new(*kind, self.span_from(start));
            }
        }

        // unknown punctuation: consume one whole character
        let ch_len = self.source[self.pos..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        self.pos += ch_len;
        Token::new(TokenKind::UnknownPunct, self.span_from(start))
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_cont(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Decodes the escapes of a string literal lexeme (with quotes) into its
/// runtime text. Unknown escapes keep the escaped character.
#[must_use]
pub fn decode_string_lexeme(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix('"')
        .unwrap_or(lexeme)
        .strip_suffix('"')
        .unwrap_or(lexeme);
    decode_escapes(inner)
}

/// Decodes a char literal lexeme (with quotes) into its character, if valid.
#[must_use]
pub fn decode_char_lexeme(lexeme: &str) -> Option<char> {
    let inner = lexeme.strip_prefix('\'')?.strip_suffix('\'')?;
    let decoded = decode_escapes(inner);
    let mut chars = decoded.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn decode_escapes(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{decode_char_lexeme, decode_string_lexeme, validate_utf8, Lexer};
    use crate::{
        diag::Bag,
        token::TokenKind::{self, *},
    };

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut bag = Bag::new();
        Lexer::new(src, 0, &mut bag)
            .lex_all()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_function_header() {
        assert_eq!(
            kinds("fn main() -> i32 { return 0; }"),
            vec![
                KwFn, Ident, LParen, RParen, Arrow, Ident, LBrace, KwReturn, IntLit, Semicolon,
                RBrace, Eof
            ]
        );
    }

    #[test]
    fn longest_match_punctuation() {
        assert_eq!(kinds("??= ?? ? ..: .. . << <= <"), vec![
            QuestionQuestionAssign,
            QuestionQuestion,
            Question,
            DotDotColon,
            DotDot,
            Dot,
            LtLt,
            LtEq,
            Lt,
            Eof
        ]);
    }

    #[test]
    fn underscore_alone_is_hole() {
        assert_eq!(kinds("_ _x x_"), vec![Hole, Ident, Ident, Eof]);
    }

    #[test]
    fn numeric_suffix_stays_in_one_token() {
        let mut bag = Bag::new();
        let src = "2147483648i32 1_000u64 3.25f64";
        let toks = Lexer::new(src, 0, &mut bag).lex_all();
        assert_eq!(toks[0].kind, IntLit);
        assert_eq!(toks[0].lexeme(src), "2147483648i32");
        assert_eq!(toks[1].lexeme(src), "1_000u64");
        assert_eq!(toks[2].kind, FloatLit);
        assert_eq!(toks[2].lexeme(src), "3.25f64");
    }

    #[test]
    fn comments_are_skipped_and_block_comments_do_not_nest() {
        assert_eq!(kinds("a // x\nb /* c /* still c */ d"), vec![Ident, Ident, Ident, Eof]);
    }

    #[test]
    fn unknown_punct_is_recoverable() {
        assert_eq!(kinds("a # b"), vec![Ident, UnknownPunct, Ident, Eof]);
    }

    #[test]
    fn invalid_utf8_is_fatal() {
        let mut bag = Bag::new();
        let bytes = [b'f', b'n', 0xFF, b'x'];
        assert!(validate_utf8(&bytes, 0, &mut bag).is_none());
        assert!(bag.has_fatal());
        assert_eq!(bag.diags()[0].span().lo, 2);
    }

    #[test]
    fn string_and_char_decoding() {
        assert_eq!(decode_string_lexeme("\"a\\nb\""), "a\nb");
        assert_eq!(decode_char_lexeme("'\\t'"), Some('\t'));
        assert_eq!(decode_char_lexeme("'한'"), Some('한'));
        assert_eq!(decode_char_lexeme("'ab'"), None);
    }
}
