//! Lexer for Sable source buffers.
//!
//! Byte-oriented and deliberately small. Lexing never fails: bad input
//! becomes diagnostics and the offending bytes are skipped, so the parser
//! always receives a well-formed token stream ending in `Eof`.

use crate::diagnostic::Diagnostic;
use crate::span::{FileId, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    Ident,
    Int,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Equal,
    Plus,

    // Keywords
    Fn,
    Let,
    Import,
    Ir,
    Label,
    Br,
    Const,
}

/// A single token. `text_start`/`text_end` are byte offsets into the
/// source so higher layers can retrieve the concrete text when needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text_start: u32,
    pub text_end: u32,
}

/// Result of lexing one buffer.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a source string into tokens.
///
/// With `skip_script_header` set, a leading `#!` line is excluded from
/// the token stream (used for executable main-mode files).
pub fn lex(file: FileId, source: &str, skip_script_header: bool) -> LexResult {
    let mut start = 0;
    if skip_script_header && source.starts_with("#!") {
        start = source.find('\n').map(|i| i + 1).unwrap_or(source.len());
    }
    let mut lexer = Lexer {
        file,
        bytes: source.as_bytes(),
        len: source.len(),
        index: start,
        diagnostics: Vec::new(),
    };
    lexer.run(source)
}

/// Whether `text` is a syntactically valid Sable identifier.
pub fn is_identifier(text: &str) -> bool {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(&b) if is_ident_start(b) => {}
        _ => return false,
    }
    bytes.iter().all(|&b| is_ident_continue(b))
}

struct Lexer<'src> {
    file: FileId,
    bytes: &'src [u8],
    len: usize,
    index: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self, source: &str) -> LexResult {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.bump();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                self.skip_line_comment();
                continue;
            }

            let start = self.index as u32;
            let token = match ch {
                b'(' => self.punct(TokenKind::LParen, start),
                b')' => self.punct(TokenKind::RParen, start),
                b'{' => self.punct(TokenKind::LBrace, start),
                b'}' => self.punct(TokenKind::RBrace, start),
                b',' => self.punct(TokenKind::Comma, start),
                b';' => self.punct(TokenKind::Semi, start),
                b'=' => self.punct(TokenKind::Equal, start),
                b'+' => self.punct(TokenKind::Plus, start),
                b'0'..=b'9' => Some(self.lex_int(start)),
                _ => {
                    if is_ident_start(ch) {
                        Some(self.lex_ident_or_keyword(start, source))
                    } else {
                        self.bump();
                        self.unexpected_char(start);
                        None
                    }
                }
            };

            if let Some(tok) = token {
                tokens.push(tok);
            }
        }

        let end = self.len as u32;
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::empty(self.file, end),
            text_start: end,
            text_end: end,
        });

        LexResult {
            tokens,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn punct(&mut self, kind: TokenKind, start: u32) -> Option<Token> {
        self.bump();
        let end = self.index as u32;
        Some(Token {
            kind,
            span: Span::new(self.file, start, end),
            text_start: start,
            text_end: end,
        })
    }

    fn unexpected_char(&mut self, start: u32) {
        let span = Span::new(self.file, start, self.index as u32);
        self.diagnostics
            .push(Diagnostic::error("unexpected character", span).with_code("E0001"));
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            self.bump();
            if ch == b'\n' {
                break;
            }
        }
    }

    fn lex_int(&mut self, start: u32) -> Token {
        while let Some(ch) = self.peek() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.index as u32;
        Token {
            kind: TokenKind::Int,
            span: Span::new(self.file, start, end),
            text_start: start,
            text_end: end,
        }
    }

    fn lex_ident_or_keyword(&mut self, start: u32, source: &str) -> Token {
        while let Some(ch) = self.peek() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.index as u32;
        let text = &source[start as usize..end as usize];
        let kind = match text {
            "fn" => TokenKind::Fn,
            "let" => TokenKind::Let,
            "import" => TokenKind::Import,
            "ir" => TokenKind::Ir,
            "label" => TokenKind::Label,
            "br" => TokenKind::Br,
            "const" => TokenKind::Const,
            _ => TokenKind::Ident,
        };
        Token {
            kind,
            span: Span::new(self.file, start, end),
            text_start: start,
            text_end: end,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn bump(&mut self) {
        if self.index < self.len {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(FileId(0), source, false)
            .tokens
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_a_function_header() {
        assert_eq!(
            kinds("fn add(a, b) { a + b }"),
            vec![
                TokenKind::Fn,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Ident,
                TokenKind::Plus,
                TokenKind::Ident,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_a_script_header_line_when_asked() {
        let src = "#!/usr/bin/env sable\nlet x = 1;";
        let with_skip = lex(FileId(0), src, true);
        assert_eq!(with_skip.tokens[0].kind, TokenKind::Let);

        // Without the marker the `#!` bytes are plain lex errors.
        let without = lex(FileId(0), src, false);
        assert!(!without.diagnostics.is_empty());
    }

    #[test]
    fn line_comments_are_invisible() {
        assert_eq!(
            kinds("// nothing here\nimport core;"),
            vec![
                TokenKind::Import,
                TokenKind::Ident,
                TokenKind::Semi,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn reports_unexpected_characters_and_continues() {
        let result = lex(FileId(0), "let @ x", false);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(
            result.tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Let, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn validates_identifiers() {
        assert!(is_identifier("main"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("has space"));
    }
}
