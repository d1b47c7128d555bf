//! Semantic checking of declaration batches.
//!
//! The checker is pumped alongside the parser: each call covers exactly
//! the `[checked, len)` suffix of a source file's declarations, so names
//! introduced by earlier batches stay visible through the session scope.
//! Problems become diagnostics, never control-flow errors; checking a bad
//! batch must not prevent later batches from being parsed and checked.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::ast::{DeclKind, Expr, ExprKind, FnBody};
use crate::context::{CompilationContext, ModuleId, SourceKind, Symbol};
use crate::diagnostic::{Diagnostic, DiagnosticSink};

/// Per-session checking state: the top-level scope and the modules made
/// visible by `import` declarations so far.
#[derive(Debug)]
pub struct Checker {
    sink: DiagnosticSink,
    scope: BTreeSet<Symbol>,
    imports: Vec<ModuleId>,
}

impl Checker {
    pub fn new(sink: DiagnosticSink) -> Checker {
        Checker {
            sink,
            scope: BTreeSet::new(),
            imports: Vec::new(),
        }
    }

    /// Check declarations `range` of the given file.
    ///
    /// Import resolution happens inline here: resolving a name queries the
    /// module registry and, on a miss, the loader chain (a re-entrant read
    /// against context state; the chain itself is never modified).
    pub fn check_range(
        &mut self,
        ctx: &mut CompilationContext,
        module: ModuleId,
        file_index: usize,
        range: Range<usize>,
    ) {
        for index in range {
            // Cloned so the context stays free for loader queries while
            // the declaration is examined.
            let decl = ctx.module(module).files[file_index].decls[index].clone();
            let file_kind = ctx.module(module).files[file_index].kind;
            match &decl.kind {
                DeclKind::Import { name } => match ctx.resolve_import(name) {
                    Ok(id) => self.imports.push(id),
                    Err(err) => self.sink.emit(Diagnostic::error(
                        format!("cannot load module '{name}': {err}"),
                        decl.span,
                    )),
                },
                DeclKind::Function { name, params, body } => {
                    let sym = ctx.intern(name);
                    // Visible to its own body, so recursion checks out.
                    self.scope.insert(sym);
                    if let FnBody::Parsed(expr) = body {
                        let params: BTreeSet<Symbol> =
                            params.iter().map(|p| ctx.intern(p)).collect();
                        self.check_expr(ctx, expr, &params);
                    }
                    // Delayed bodies are checked after the deferred parse
                    // pass restores them; nothing to do here.
                }
                DeclKind::Let { name, value } => {
                    self.check_expr(ctx, value, &BTreeSet::new());
                    let sym = ctx.intern(name);
                    self.scope.insert(sym);
                }
                DeclKind::TopLevelCode { expr } => {
                    if file_kind == SourceKind::Library {
                        self.sink.emit(Diagnostic::error(
                            "top-level code is only allowed in main files",
                            decl.span,
                        ));
                    }
                    self.check_expr(ctx, expr, &BTreeSet::new());
                }
                // Structure and branch targets were validated by the IR
                // coordinator during parsing.
                DeclKind::IrBlock { .. } => {}
            }
        }
    }

    fn check_expr(&mut self, ctx: &mut CompilationContext, expr: &Expr, params: &BTreeSet<Symbol>) {
        match &expr.kind {
            ExprKind::Int(_) => {}
            ExprKind::Name(name) => self.check_name(ctx, name, params, expr),
            ExprKind::Call { callee, args } => {
                self.check_name(ctx, callee, params, expr);
                for arg in args {
                    self.check_expr(ctx, arg, params);
                }
            }
            ExprKind::Add { lhs, rhs } => {
                self.check_expr(ctx, lhs, params);
                self.check_expr(ctx, rhs, params);
            }
        }
    }

    fn check_name(
        &mut self,
        ctx: &mut CompilationContext,
        name: &str,
        params: &BTreeSet<Symbol>,
        expr: &Expr,
    ) {
        let sym = ctx.intern(name);
        if params.contains(&sym) || self.scope.contains(&sym) {
            return;
        }
        let imported = self
            .imports
            .iter()
            .any(|&id| ctx.module(id).exports.contains(&sym));
        if !imported {
            self.sink.emit(Diagnostic::error(
                format!("unresolved name '{name}'"),
                expr.span,
            ));
        }
    }
}
