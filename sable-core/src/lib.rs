//! Core frontend driver for the Sable language toolchain.
//!
//! This crate owns the front half of the compiler pipeline:
//!
//!   source .sbl / .sblir
//!     -> lexer       (tokens)
//!     -> parser      (declarations, pumped in batches)
//!     -> typecheck   (names + imports, over a checked-cursor)
//!
//! plus the session plumbing around it: input buffers, the module
//! loader chain, and the low-level IR coordinator. Higher-level tools
//! (CLI, language services) should drive everything through
//! `FrontendDriver` rather than wiring the stages by hand.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------

pub mod buffers;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: context, module loading, checking, low-level IR
// ---------------------------------------------------------------------

pub mod context;
pub mod loader;
pub mod typecheck;
pub mod ir;

// ---------------------------------------------------------------------
// Session orchestration
// ---------------------------------------------------------------------

pub mod driver;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use context::{RegistrationPolicy, SourceKind};
pub use diagnostic::{Diagnostic, Severity};
pub use driver::{CompletionRequest, FrontendConfig, FrontendDriver, InputBuffer, RunStats};
pub use error::FrontendError;
