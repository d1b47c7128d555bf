//! Incremental parser for Sable buffers.
//!
//! The parser is pumped: each call to `parse_batch` produces a batch of
//! zero or more newly parsed top-level declarations plus a `done` flag,
//! resuming from state saved in `ParserState`. Library pumping parses a
//! buffer to the end in one call; main-style pumping returns early after
//! every run of top-level code so the checker can run before later
//! statements are even parsed.
//!
//! Under a delayed-parsing policy, function bodies are skipped during the
//! primary pass and recorded in the state; `parse_delayed_bodies` is the
//! mandatory second pass that restores full fidelity.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Decl, DeclKind, Expr, ExprKind, FnBody};
use crate::buffers::{BufferId, BufferRegistry};
use crate::context::SourceFile;
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::ir::IrCoordinator;
use crate::lexer::{self, Token, TokenKind};
use crate::span::{FileId, Span};

/// When function bodies are fully parsed versus deferred.
///
/// Chosen once before pumping begins, immutable thereafter. Deferring
/// body parsing cuts latency for interactive tooling at the cost of the
/// second pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayedParsingPolicy {
    None,
    AlwaysDelayBodies,
    UntilCompletionPoint { buffer: BufferId, offset: u32 },
}

/// How far one `parse_batch` call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStep {
    /// Parse the whole remaining buffer (library pumping).
    ToEnd,
    /// Return after any top-level code batch (main/IR pumping).
    Incremental,
}

/// Output of one pump iteration.
#[derive(Debug)]
pub struct ParsedBatch {
    pub decls: Vec<Decl>,
    pub done: bool,
}

/// A function body skipped by the primary pass.
#[derive(Debug, Clone)]
pub struct DelayedBody {
    pub buffer: BufferId,
    /// Absolute index of the owning declaration in its source file.
    pub decl_index: usize,
    tok_start: usize,
    tok_end: usize,
    /// Brace-to-brace span, used for completion-point containment.
    pub span: Span,
    pub fn_name: String,
}

/// A delayed body that contained the session's completion point.
#[derive(Debug, Clone)]
pub struct CompletionHit {
    pub fn_name: String,
    pub decl_index: usize,
    pub buffer: BufferId,
    pub offset: u32,
}

/// Resumption state carried across pump iterations and into the deferred
/// second pass.
#[derive(Debug, Default)]
pub struct ParserState {
    tokens: HashMap<BufferId, Rc<Vec<Token>>>,
    cursors: HashMap<BufferId, usize>,
    delayed: Vec<DelayedBody>,
}

impl ParserState {
    pub fn new() -> ParserState {
        ParserState::default()
    }

    pub fn has_delayed_bodies(&self) -> bool {
        !self.delayed.is_empty()
    }

    fn tokens_for(
        &mut self,
        registry: &BufferRegistry,
        buffer: BufferId,
        sink: &DiagnosticSink,
    ) -> Rc<Vec<Token>> {
        if let Some(tokens) = self.tokens.get(&buffer) {
            return Rc::clone(tokens);
        }
        let buf = registry.get(buffer);
        let result = lexer::lex(
            buffer.file_id(),
            &buf.text,
            registry.is_script_header(buffer),
        );
        sink.extend(result.diagnostics);
        let tokens = Rc::new(result.tokens);
        self.tokens.insert(buffer, Rc::clone(&tokens));
        tokens
    }
}

/// Incrementally parse the next batch from `buffer`.
///
/// `base_index` is the declaration count of the target source file before
/// this call; recorded delayed bodies use it to address their owning
/// declaration later. `ir` must be present exactly when the session
/// carries low-level-IR state.
pub fn parse_batch(
    state: &mut ParserState,
    registry: &BufferRegistry,
    buffer: BufferId,
    base_index: usize,
    policy: DelayedParsingPolicy,
    step: ParseStep,
    ir: Option<&mut IrCoordinator>,
    sink: &DiagnosticSink,
) -> ParsedBatch {
    let tokens = state.tokens_for(registry, buffer, sink);
    let start = state.cursors.get(&buffer).copied().unwrap_or(0);
    let src = &registry.get(buffer).text;

    let mut parser = Parser {
        tokens: &tokens,
        src,
        pos: start,
        buffer: Some(buffer),
        policy,
        sink,
        delayed: Vec::new(),
    };
    let (decls, done) = parser.parse_decls(base_index, step, ir);

    state.cursors.insert(buffer, parser.pos);
    state.delayed.extend(parser.delayed);
    ParsedBatch { decls, done }
}

/// Parse a complete standalone source (a sibling module located by a
/// loader). No delayed parsing, no IR, detached file id.
pub fn parse_standalone(src: &str) -> (Vec<Decl>, Vec<Diagnostic>) {
    let sink = DiagnosticSink::new();
    let lexed = lexer::lex(FileId::DETACHED, src, false);
    sink.extend(lexed.diagnostics);
    let mut parser = Parser {
        tokens: &lexed.tokens,
        src,
        pos: 0,
        buffer: None,
        policy: DelayedParsingPolicy::None,
        sink: &sink,
        delayed: Vec::new(),
    };
    let (decls, _) = parser.parse_decls(0, ParseStep::ToEnd, None);
    (decls, sink.take_all())
}

/// The deferred second pass: fully parse every body skipped by the
/// primary pass, patching the owning declarations in place. Returns the
/// bodies that contained the completion point, if one was set.
pub fn parse_delayed_bodies(
    state: &mut ParserState,
    registry: &BufferRegistry,
    file: &mut SourceFile,
    completion: Option<(BufferId, u32)>,
    sink: &DiagnosticSink,
) -> Vec<CompletionHit> {
    let mut hits = Vec::new();
    for db in std::mem::take(&mut state.delayed) {
        let tokens = state
            .tokens
            .get(&db.buffer)
            .cloned()
            .expect("delayed body recorded for an unlexed buffer");
        let src = &registry.get(db.buffer).text;

        let mut parser = Parser {
            tokens: &tokens,
            src,
            pos: db.tok_start,
            buffer: Some(db.buffer),
            policy: DelayedParsingPolicy::None,
            sink,
            delayed: Vec::new(),
        };
        if let Some(expr) = parser.parse_expr() {
            if parser.pos != db.tok_end {
                sink.emit(Diagnostic::error(
                    format!("unexpected tokens in body of '{}'", db.fn_name),
                    parser.peek().span,
                ));
            } else if let DeclKind::Function { body, .. } = &mut file.decls[db.decl_index].kind {
                *body = FnBody::Parsed(expr);
            }
        }

        if let Some((buffer, offset)) = completion {
            if buffer == db.buffer && db.span.contains(offset) {
                hits.push(CompletionHit {
                    fn_name: db.fn_name.clone(),
                    decl_index: db.decl_index,
                    buffer,
                    offset,
                });
            }
        }
    }
    hits
}

struct Parser<'a> {
    tokens: &'a [Token],
    src: &'a str,
    pos: usize,
    buffer: Option<BufferId>,
    policy: DelayedParsingPolicy,
    sink: &'a DiagnosticSink,
    delayed: Vec<DelayedBody>,
}

impl<'a> Parser<'a> {
    fn parse_decls(
        &mut self,
        base_index: usize,
        step: ParseStep,
        mut ir: Option<&mut IrCoordinator>,
    ) -> (Vec<Decl>, bool) {
        let mut decls = Vec::new();
        while !self.at_eof() {
            match self.parse_decl(base_index + decls.len(), ir.as_deref_mut()) {
                Some(decl) => {
                    let breaks = decl.is_top_level_code();
                    decls.push(decl);
                    if step == ParseStep::Incremental && breaks {
                        break;
                    }
                }
                None => self.recover(),
            }
        }
        let done = self.at_eof();
        (decls, done)
    }

    /// Parse one top-level declaration. `None` means a diagnostic was
    /// emitted and the caller should synchronize.
    fn parse_decl(&mut self, decl_index: usize, ir: Option<&mut IrCoordinator>) -> Option<Decl> {
        let first = self.peek().clone();
        match first.kind {
            TokenKind::Import => {
                self.bump();
                let name_tok = self.expect(TokenKind::Ident, "module name")?;
                let name = self.text(&name_tok).to_owned();
                let semi = self.expect(TokenKind::Semi, "';'")?;
                Some(Decl {
                    kind: DeclKind::Import { name },
                    span: first.span.join(semi.span).unwrap_or(first.span),
                })
            }
            TokenKind::Let => {
                self.bump();
                let name_tok = self.expect(TokenKind::Ident, "binding name")?;
                let name = self.text(&name_tok).to_owned();
                self.expect(TokenKind::Equal, "'='")?;
                let value = self.parse_expr()?;
                let semi = self.expect(TokenKind::Semi, "';'")?;
                Some(Decl {
                    kind: DeclKind::Let { name, value },
                    span: first.span.join(semi.span).unwrap_or(first.span),
                })
            }
            TokenKind::Fn => self.parse_function(first, decl_index),
            TokenKind::Ir => self.parse_ir_block(first, ir),
            _ => {
                let expr = self.parse_expr()?;
                let semi = self.expect(TokenKind::Semi, "';'")?;
                let span = expr.span.join(semi.span).unwrap_or(expr.span);
                Some(Decl {
                    kind: DeclKind::TopLevelCode { expr },
                    span,
                })
            }
        }
    }

    fn parse_function(&mut self, first: Token, decl_index: usize) -> Option<Decl> {
        self.bump(); // fn
        let name_tok = self.expect(TokenKind::Ident, "function name")?;
        let name = self.text(&name_tok).to_owned();

        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                let param = self.expect(TokenKind::Ident, "parameter name")?;
                params.push(self.text(&param).to_owned());
                if self.peek().kind == TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let lbrace_idx = self.pos;
        let lbrace = self.expect(TokenKind::LBrace, "'{'")?;

        if self.policy != DelayedParsingPolicy::None {
            let rbrace_idx = self.matching_rbrace(lbrace_idx)?;
            let body_span = lbrace.span.join(self.tokens[rbrace_idx].span).unwrap();
            let delay = match self.policy {
                DelayedParsingPolicy::None => false,
                DelayedParsingPolicy::AlwaysDelayBodies => true,
                DelayedParsingPolicy::UntilCompletionPoint { buffer, offset } => {
                    self.buffer == Some(buffer) && body_span.contains(offset)
                }
            };
            if delay {
                self.delayed.push(DelayedBody {
                    buffer: self.buffer.expect("delayed parsing without a buffer"),
                    decl_index,
                    tok_start: lbrace_idx + 1,
                    tok_end: rbrace_idx,
                    span: body_span,
                    fn_name: name.clone(),
                });
                self.pos = rbrace_idx + 1;
                let span = first.span.join(body_span).unwrap_or(first.span);
                return Some(Decl {
                    kind: DeclKind::Function {
                        name,
                        params,
                        body: FnBody::Delayed,
                    },
                    span,
                });
            }
        }

        let body = self.parse_expr()?;
        let rbrace = self.expect(TokenKind::RBrace, "'}'")?;
        Some(Decl {
            kind: DeclKind::Function {
                name,
                params,
                body: FnBody::Parsed(body),
            },
            span: first.span.join(rbrace.span).unwrap_or(first.span),
        })
    }

    fn parse_ir_block(&mut self, first: Token, ir: Option<&mut IrCoordinator>) -> Option<Decl> {
        self.bump(); // ir
        let name_tok = self.expect(TokenKind::Ident, "block name")?;
        let name = self.text(&name_tok).to_owned();
        self.expect(TokenKind::LBrace, "'{'")?;

        let Some(ir) = ir else {
            self.sink.emit(Diagnostic::error(
                "low-level IR blocks are only allowed in IR inputs",
                first.span,
            ));
            // Skip to the end of the block so parsing can continue.
            while !self.at_eof() && self.peek().kind != TokenKind::RBrace {
                self.bump();
            }
            if !self.at_eof() {
                self.bump();
            }
            return None;
        };

        let block = ir.begin_block(&name, first.span);
        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::RBrace => {
                    self.bump();
                    break;
                }
                TokenKind::Const => {
                    self.bump();
                    let value_tok = self.expect(TokenKind::Int, "integer value")?;
                    let value = self.int_value(&value_tok);
                    ir.emit_const(block, value);
                }
                TokenKind::Label => {
                    self.bump();
                    let label = self.expect(TokenKind::Ident, "label name")?;
                    let text = self.text(&label).to_owned();
                    ir.define_label(block, &text, label.span);
                }
                TokenKind::Br => {
                    self.bump();
                    let target = self.expect(TokenKind::Ident, "branch target")?;
                    let text = self.text(&target).to_owned();
                    ir.emit_branch(block, &text, target.span);
                }
                TokenKind::Eof => {
                    self.sink.emit(Diagnostic::error(
                        format!("unterminated IR block '{name}'"),
                        first.span,
                    ));
                    return None;
                }
                _ => {
                    self.sink.emit(Diagnostic::error(
                        "expected an IR instruction",
                        tok.span,
                    ));
                    self.bump();
                }
            }
        }

        let end = self.tokens[self.pos - 1].span;
        Some(Decl {
            kind: DeclKind::IrBlock { name, block },
            span: first.span.join(end).unwrap_or(first.span),
        })
    }

    fn parse_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_term()?;
        while self.peek().kind == TokenKind::Plus {
            self.bump();
            let rhs = self.parse_term()?;
            let span = lhs.span.join(rhs.span).unwrap_or(lhs.span);
            lhs = Expr {
                kind: ExprKind::Add {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Some(lhs)
    }

    fn parse_term(&mut self) -> Option<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Int => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Int(self.int_value(&tok)),
                    span: tok.span,
                })
            }
            TokenKind::Ident => {
                self.bump();
                let name = self.text(&tok).to_owned();
                if self.peek().kind == TokenKind::LParen {
                    self.bump();
                    let mut args = Vec::new();
                    if self.peek().kind != TokenKind::RParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.peek().kind == TokenKind::Comma {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                    }
                    let rparen = self.expect(TokenKind::RParen, "')'")?;
                    Some(Expr {
                        kind: ExprKind::Call { callee: name, args },
                        span: tok.span.join(rparen.span).unwrap_or(tok.span),
                    })
                } else {
                    Some(Expr {
                        kind: ExprKind::Name(name),
                        span: tok.span,
                    })
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(inner)
            }
            _ => {
                self.sink.emit(Diagnostic::error(
                    "expected an expression",
                    tok.span,
                ));
                None
            }
        }
    }

    /// Token index of the `}` matching the `{` at `lbrace_idx`.
    fn matching_rbrace(&mut self, lbrace_idx: usize) -> Option<usize> {
        let mut depth = 1usize;
        let mut idx = lbrace_idx + 1;
        while idx < self.tokens.len() {
            match self.tokens[idx].kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                TokenKind::Eof => break,
                _ => {}
            }
            idx += 1;
        }
        self.sink.emit(Diagnostic::error(
            "unterminated function body",
            self.tokens[lbrace_idx].span,
        ));
        None
    }

    /// Skip to a plausible declaration boundary after a parse error.
    fn recover(&mut self) {
        while !self.at_eof() {
            match self.peek().kind {
                TokenKind::Semi | TokenKind::RBrace => {
                    self.bump();
                    return;
                }
                TokenKind::Fn | TokenKind::Let | TokenKind::Import | TokenKind::Ir => return,
                _ => self.bump(),
            }
        }
    }

    fn int_value(&self, tok: &Token) -> i64 {
        let text: String = self.text(tok).chars().filter(|&c| c != '_').collect();
        match text.parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                self.sink.emit(Diagnostic::error(
                    "integer literal out of range",
                    tok.span,
                ));
                0
            }
        }
    }

    fn text(&self, tok: &Token) -> &str {
        &self.src[tok.text_start as usize..tok.text_end as usize]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        let tok = self.peek().clone();
        if tok.kind == kind {
            self.bump();
            Some(tok)
        } else {
            self.sink
                .emit(Diagnostic::error(format!("expected {what}"), tok.span));
            None
        }
    }
}
