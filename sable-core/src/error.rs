//! Driver-level error type.
//!
//! `FrontendError` covers configuration and input-acquisition failures,
//! which are terminal for the whole invocation: the first one wins and no
//! further setup work is attempted. Language-level problems (syntax and
//! semantic errors) are expressed as `Diagnostic` values instead and never
//! travel through this type.
//!
//! Caller-contract violations, such as a module name that is not an
//! identifier or more than one buffer handed to a single-buffer pipeline,
//! are bugs in the calling code. Those panic rather than appear here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    /// An SDK path was configured but this build carries no foreign-interop
    /// loader. Absence of the capability is a configuration outcome, not a
    /// crash.
    #[error("foreign module support is not available in this build")]
    ForeignSupportUnavailable,

    /// The foreign loader constructor rejected its configuration (bad SDK
    /// path, empty target triple, unusable search paths).
    #[error("failed to construct foreign module loader: {reason}")]
    LoaderConstruction { reason: String },

    /// An input file could not be opened or read. Setup aborts at the
    /// first such path; later paths are never attempted.
    #[error("failed to open input file {path}: {source}")]
    InputOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No loader in the chain could produce the named module.
    #[error("module '{name}' was not found by any registered loader")]
    ModuleNotFound { name: String },

    /// A module with this name is already registered and the session policy
    /// rejects redefinition.
    #[error("module '{name}' is already registered")]
    DuplicateModule { name: String },

    /// A completion point was already recorded for this session; there can
    /// be at most one.
    #[error("a code-completion point is already set for this session")]
    CompletionPointConflict,
}
