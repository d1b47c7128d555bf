//! Abstract syntax produced by the parser.
//!
//! One `Decl` is one top-level parsed unit of a source file; the semantic
//! checker consumes them in order, tracked by the file's checked-cursor.

use crate::span::Span;

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    /// `import name;`
    Import { name: String },
    /// `fn name(params) { expr }`
    Function {
        name: String,
        params: Vec<String>,
        body: FnBody,
    },
    /// `let name = expr;`
    Let { name: String, value: Expr },
    /// A bare expression statement. Only meaningful in main files, where
    /// top-level code executes in file order.
    TopLevelCode { expr: Expr },
    /// `ir name { ... }` — the instructions live in the session's IR
    /// container, referenced here by block index.
    IrBlock { name: String, block: usize },
}

impl Decl {
    /// The name this declaration introduces, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Function { name, .. }
            | DeclKind::Let { name, .. }
            | DeclKind::IrBlock { name, .. } => Some(name),
            DeclKind::Import { .. } | DeclKind::TopLevelCode { .. } => None,
        }
    }

    /// Whether this declaration ends an incremental parse batch in
    /// main-style pumping.
    pub fn is_top_level_code(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::TopLevelCode { .. } | DeclKind::Let { .. } | DeclKind::IrBlock { .. }
        )
    }
}

/// Body of a function declaration.
///
/// `Delayed` means the primary parse skipped the body under the active
/// delayed-parsing policy; the deferred second pass replaces it with
/// `Parsed` using resumption state saved by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    Parsed(Expr),
    Delayed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Name(String),
    Call { callee: String, args: Vec<Expr> },
    Add { lhs: Box<Expr>, rhs: Box<Expr> },
}
