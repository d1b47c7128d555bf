//! Diagnostics produced by the frontend.
//!
//! The core never renders diagnostics; it only records them through a
//! `DiagnosticSink` handle. Parse and check errors are not control-flow
//! errors: they accumulate in the sink and the pipeline keeps going.

use std::cell::RefCell;
use std::rc::Rc;

use crate::span::Span;

/// Severity level of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A labeled span used inside diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub span: Span,
    pub message: Option<String>,
}

/// A single diagnostic message.
///
/// A diagnostic has a main message, a primary label for the main source
/// location, and zero or more secondary labels for related locations
/// ("defined here", "first set here").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub primary: Label,
    pub secondary: Vec<Label>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, primary_span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            primary: Label {
                span: primary_span,
                message: None,
            },
            secondary: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>, primary_span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message, primary_span)
        }
    }

    /// Attach an error code (for example, "E0003").
    pub fn with_code(mut self, code: &'static str) -> Diagnostic {
        self.code = Some(code);
        self
    }

    pub fn with_secondary_label(
        mut self,
        span: Span,
        message: impl Into<Option<String>>,
    ) -> Diagnostic {
        self.secondary.push(Label {
            span,
            message: message.into(),
        });
        self
    }
}

/// Shared, clonable handle to the diagnostic stream of one session.
///
/// The driver, the context, the checker and the IR coordinator all hold
/// clones of the same sink. Single-threaded by contract, hence `Rc`.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    inner: Rc<RefCell<Vec<Diagnostic>>>,
}

impl DiagnosticSink {
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        self.inner.borrow_mut().push(diagnostic);
    }

    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.inner.borrow_mut().extend(diagnostics);
    }

    pub fn error_count(&self) -> usize {
        self.inner
            .borrow()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Snapshot of everything emitted so far.
    pub fn collected(&self) -> Vec<Diagnostic> {
        self.inner.borrow().clone()
    }

    /// Drain the sink, leaving it empty.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.inner.borrow_mut())
    }
}
