//! Module loaders and the ordered loader chain.
//!
//! Import resolution queries a fixed, ordered chain of loader
//! capabilities built once during setup. The chain is append-only until
//! it is sealed and read-only afterwards; resolution walks the entries in
//! registration order and the first one to produce a module wins.

use std::fs;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::context::{CompilationContext, Module, SourceFile, SourceKind};
use crate::diagnostic::Diagnostic;
use crate::error::FrontendError;
use crate::parser;
use crate::span::Span;

/// One import-resolution capability.
///
/// `attempt_load` returns `Ok(None)` for "not found" so the chain can
/// move on to the next entry; `Err` is reserved for real failures such as
/// an unreadable file that was located.
pub trait ModuleLoader {
    fn name(&self) -> &'static str;

    fn attempt_load(
        &self,
        ctx: &mut CompilationContext,
        name: &str,
    ) -> Result<Option<Module>, FrontendError>;
}

impl std::fmt::Debug for dyn ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModuleLoader({})", self.name())
    }
}

/// Ordered list of loaders, append-only during setup.
#[derive(Debug, Default)]
pub struct LoaderChain {
    entries: Vec<Box<dyn ModuleLoader>>,
    sealed: bool,
}

impl LoaderChain {
    pub fn new() -> LoaderChain {
        LoaderChain::default()
    }

    /// Append an entry. Panics once the chain has been sealed; adding
    /// loaders after setup is a programming error.
    pub fn push(&mut self, loader: Box<dyn ModuleLoader>) {
        assert!(!self.sealed, "loader chain is sealed");
        self.entries.push(loader);
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn entry_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Query entries strictly in registration order; short-circuits on the
    /// first success.
    pub fn resolve(
        &self,
        ctx: &mut CompilationContext,
        name: &str,
    ) -> Result<Module, FrontendError> {
        debug_assert!(self.sealed, "loader chain queried before sealing");
        for entry in &self.entries {
            if let Some(module) = entry.attempt_load(ctx, name)? {
                tracing::debug!(loader = entry.name(), module = name, "import resolved");
                return Ok(module);
            }
        }
        Err(FrontendError::ModuleNotFound {
            name: name.to_owned(),
        })
    }
}

/// Locate `file_name` somewhere under the given search roots, walking
/// each root recursively; the first hit wins.
fn find_on_paths(search_paths: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    for root in search_paths {
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if path.is_file() && path.file_name().is_some_and(|n| n == file_name) {
                return Some(path.to_path_buf());
            }
        }
    }
    None
}

/// Resolves imports by locating and parsing sibling `.sbl` source on the
/// import search path. Used for direct, unpackaged dependencies; setup
/// omits it entirely in immediate/interpreted mode.
pub struct SourceImportLoader;

impl ModuleLoader for SourceImportLoader {
    fn name(&self) -> &'static str {
        "source"
    }

    fn attempt_load(
        &self,
        ctx: &mut CompilationContext,
        name: &str,
    ) -> Result<Option<Module>, FrontendError> {
        let file_name = format!("{name}.sbl");
        let Some(path) = find_on_paths(&ctx.import_search_paths, &file_name) else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path).map_err(|source| FrontendError::InputOpen {
            path: path.clone(),
            source,
        })?;

        // Sibling sources are parsed in one shot with library rules. Their
        // spans carry a detached file id; syntax problems are still
        // reported, prefixed with the module name.
        let (decls, diagnostics) = parser::parse_standalone(&text);
        for diag in diagnostics {
            let mut diag = diag;
            diag.message = format!("in module '{name}': {}", diag.message);
            ctx.sink().emit(diag);
        }

        let name_sym = ctx.intern(name);
        let mut module = Module::new(name_sym);
        for decl in &decls {
            if let Some(export) = decl.name() {
                let sym = ctx.intern(export);
                module.exports.push(sym);
            }
        }
        let mut file = SourceFile::new(SourceKind::Library);
        file.decls = decls;
        module.files.push(file);
        Ok(Some(module))
    }
}

/// Resolves imports from precompiled module interfaces (`.sbli` files).
///
/// The interface format is line-oriented: a `module <name>` header
/// followed by `fn <ident>` / `let <ident>` export lines. Comments start
/// with `#`.
pub struct SerializedModuleLoader;

impl SerializedModuleLoader {
    fn parse_interface(
        ctx: &mut CompilationContext,
        name: &str,
        text: &str,
    ) -> Option<Module> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let header = lines.next()?;
        let declared = header.strip_prefix("module ")?.trim();
        if declared != name {
            ctx.sink().emit(Diagnostic::warning(
                format!("interface for '{declared}' found while resolving '{name}'"),
                Span::dummy(),
            ));
            return None;
        }

        let name_sym = ctx.intern(name);
        let mut module = Module::new(name_sym);
        for line in lines {
            let export = line
                .strip_prefix("fn ")
                .or_else(|| line.strip_prefix("let "))
                .map(str::trim);
            match export {
                Some(ident) if crate::lexer::is_identifier(ident) => {
                    let sym = ctx.intern(ident);
                    module.exports.push(sym);
                }
                _ => {
                    ctx.sink().emit(Diagnostic::error(
                        format!("malformed line in interface for '{name}': {line:?}"),
                        Span::dummy(),
                    ));
                    return None;
                }
            }
        }
        Some(module)
    }
}

impl ModuleLoader for SerializedModuleLoader {
    fn name(&self) -> &'static str {
        "serialized"
    }

    fn attempt_load(
        &self,
        ctx: &mut CompilationContext,
        name: &str,
    ) -> Result<Option<Module>, FrontendError> {
        let file_name = format!("{name}.sbli");
        let Some(path) = find_on_paths(&ctx.import_search_paths, &file_name) else {
            return Ok(None);
        };
        let text = fs::read_to_string(&path).map_err(|source| FrontendError::InputOpen {
            path: path.clone(),
            source,
        })?;
        // A malformed interface is diagnosed and treated as "not found" so
        // a later chain entry may still resolve the name.
        Ok(Self::parse_interface(ctx, name, &text))
    }
}

/// Everything the foreign-interop loader constructor needs.
#[derive(Debug, Clone)]
pub struct ForeignLoaderSpec {
    pub sdk_path: PathBuf,
    pub target_triple: String,
    pub import_search_paths: Vec<PathBuf>,
    pub framework_search_paths: Vec<PathBuf>,
    pub module_cache_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

pub type ForeignLoaderCtor =
    fn(&ForeignLoaderSpec) -> Result<Box<dyn ModuleLoader>, FrontendError>;

/// Foreign-interop support is a capability that may or may not be present
/// in a given build; absence is a normal configuration outcome.
pub mod foreign {
    use super::*;

    /// Capability lookup: the constructor for the foreign-interop loader,
    /// if this build carries one.
    pub fn constructor() -> Option<ForeignLoaderCtor> {
        #[cfg(feature = "foreign")]
        {
            Some(construct)
        }
        #[cfg(not(feature = "foreign"))]
        {
            None
        }
    }

    #[cfg(feature = "foreign")]
    fn construct(spec: &ForeignLoaderSpec) -> Result<Box<dyn ModuleLoader>, FrontendError> {
        if !spec.sdk_path.is_dir() {
            return Err(FrontendError::LoaderConstruction {
                reason: format!("SDK path {} is not a directory", spec.sdk_path.display()),
            });
        }
        if spec.target_triple.is_empty() {
            return Err(FrontendError::LoaderConstruction {
                reason: "target triple must not be empty".to_owned(),
            });
        }
        Ok(Box::new(ForeignModuleLoader {
            interface_root: spec.sdk_path.join("interfaces"),
        }))
    }

    /// Bridges foreign libraries by reading interface files shipped with
    /// the configured SDK.
    #[cfg(feature = "foreign")]
    pub struct ForeignModuleLoader {
        interface_root: PathBuf,
    }

    #[cfg(feature = "foreign")]
    impl ModuleLoader for ForeignModuleLoader {
        fn name(&self) -> &'static str {
            "foreign"
        }

        fn attempt_load(
            &self,
            ctx: &mut CompilationContext,
            name: &str,
        ) -> Result<Option<Module>, FrontendError> {
            let path = self.interface_root.join(format!("{name}.sbli"));
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(_) => return Ok(None),
            };
            Ok(SerializedModuleLoader::parse_interface(ctx, name, &text))
        }
    }
}
