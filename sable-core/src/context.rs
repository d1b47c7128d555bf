//! Shared compilation state for one frontend invocation.
//!
//! The `CompilationContext` aggregates identifier interning, the
//! diagnostic sink handle, the import/framework search paths, the sealed
//! module-loader chain and the registry of loaded modules. It lives for
//! the whole invocation and is torn down by ordinary scope exit.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::ast::Decl;
use crate::diagnostic::DiagnosticSink;
use crate::error::FrontendError;
use crate::loader::{LoaderChain, ModuleLoader};

/// Interned identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// Identifier table. Interning the same string twice yields the same
/// `Symbol`.
#[derive(Debug, Default)]
pub struct Interner {
    names: Vec<String>,
    index: HashMap<String, Symbol>,
}

impl Interner {
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.index.get(name) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), sym);
        sym
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.names[sym.0 as usize]
    }
}

/// Determines which pipeline strategy processes a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Library,
    Main,
    Repl,
    LowLevelIr,
}

/// One parsed input unit belonging to a module.
///
/// The checked-cursor counts how many leading declarations have been
/// submitted to semantic checking. It starts at zero, never decreases and
/// never exceeds the declaration count.
#[derive(Debug)]
pub struct SourceFile {
    pub kind: SourceKind,
    pub decls: Vec<Decl>,
    checked: usize,
}

impl SourceFile {
    pub fn new(kind: SourceKind) -> SourceFile {
        SourceFile {
            kind,
            decls: Vec::new(),
            checked: 0,
        }
    }

    pub fn checked(&self) -> usize {
        self.checked
    }

    /// Advance the checked-cursor to `to`. Moving it backwards or past the
    /// end of the declaration list is a bug in the caller.
    pub fn advance_checked(&mut self, to: usize) {
        assert!(
            to >= self.checked && to <= self.decls.len(),
            "checked-cursor must advance monotonically within bounds"
        );
        self.checked = to;
    }
}

/// A named translation unit: an ordered sequence of source files plus the
/// names it exports to importers.
#[derive(Debug)]
pub struct Module {
    pub name: Symbol,
    pub files: Vec<SourceFile>,
    pub exports: Vec<Symbol>,
}

impl Module {
    pub fn new(name: Symbol) -> Module {
        Module {
            name,
            files: Vec::new(),
            exports: Vec::new(),
        }
    }
}

/// Index into the context's module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleId(u32);

/// What happens when a module name is registered twice.
///
/// `Reject` is the default; `Overwrite` preserves last-writer-wins for
/// callers that depend on it (mainly tests and compatibility harnesses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    #[default]
    Reject,
    Overwrite,
}

#[derive(Debug)]
pub struct CompilationContext {
    interner: Interner,
    sink: DiagnosticSink,
    /// Append-only during setup, read-only afterwards.
    pub import_search_paths: Vec<PathBuf>,
    pub framework_search_paths: Vec<PathBuf>,
    loaders: LoaderChain,
    modules: Vec<Module>,
    names: BTreeMap<String, ModuleId>,
    policy: RegistrationPolicy,
}

impl CompilationContext {
    pub fn new(sink: DiagnosticSink, policy: RegistrationPolicy) -> CompilationContext {
        CompilationContext {
            interner: Interner::default(),
            sink,
            import_search_paths: Vec::new(),
            framework_search_paths: Vec::new(),
            loaders: LoaderChain::new(),
            modules: Vec::new(),
            names: BTreeMap::new(),
            policy,
        }
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.interner.intern(name)
    }

    pub fn symbol_text(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    /// Append a loader to the chain. Only legal before `seal_loaders`.
    pub fn add_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        self.loaders.push(loader);
    }

    /// Freeze the loader chain; after this no entries may be added or
    /// reordered, and `resolve_import` becomes usable.
    pub fn seal_loaders(&mut self) {
        self.loaders.seal();
    }

    /// Names of the chain entries, in query order.
    pub fn loader_names(&self) -> Vec<&'static str> {
        self.loaders.entry_names()
    }

    pub fn lookup_module(&self, name: &str) -> Option<ModuleId> {
        self.names.get(name).copied()
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.0 as usize]
    }

    /// Register `module` under `name`, applying the session's
    /// redefinition policy.
    pub fn register_module(
        &mut self,
        name: &str,
        module: Module,
    ) -> Result<ModuleId, FrontendError> {
        if let Some(&existing) = self.names.get(name) {
            match self.policy {
                RegistrationPolicy::Reject => {
                    return Err(FrontendError::DuplicateModule {
                        name: name.to_owned(),
                    });
                }
                RegistrationPolicy::Overwrite => {
                    self.modules[existing.0 as usize] = module;
                    return Ok(existing);
                }
            }
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(module);
        self.names.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Resolve a named import: registry hit first, then the loader chain
    /// in registration order, first match wins.
    ///
    /// Called re-entrantly by the checker while the main file is being
    /// checked; the chain itself is never mutated here.
    pub fn resolve_import(&mut self, name: &str) -> Result<ModuleId, FrontendError> {
        if let Some(id) = self.lookup_module(name) {
            return Ok(id);
        }
        // The chain is moved out for the duration of the query so loaders
        // can take `&mut self` without aliasing it.
        let chain = std::mem::take(&mut self.loaders);
        let outcome = chain.resolve(self, name);
        self.loaders = chain;
        let module = outcome?;
        self.register_module(name, module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(policy: RegistrationPolicy) -> CompilationContext {
        let mut ctx = CompilationContext::new(DiagnosticSink::new(), policy);
        ctx.seal_loaders();
        ctx
    }

    #[test]
    fn interner_deduplicates() {
        let mut interner = Interner::default();
        let a = interner.intern("main");
        let b = interner.intern("main");
        let c = interner.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "main");
    }

    #[test]
    fn rejects_duplicate_registration_by_default() {
        let mut ctx = context(RegistrationPolicy::Reject);
        let name = ctx.intern("core");
        ctx.register_module("core", Module::new(name)).expect("first");
        let err = ctx.register_module("core", Module::new(name)).unwrap_err();
        assert!(matches!(err, FrontendError::DuplicateModule { name } if name == "core"));
    }

    #[test]
    fn overwrite_policy_keeps_the_last_writer() {
        let mut ctx = context(RegistrationPolicy::Overwrite);
        let name = ctx.intern("core");
        let first = ctx.register_module("core", Module::new(name)).expect("first");
        let mut replacement = Module::new(name);
        let exported = ctx.intern("replacement_marker");
        replacement.exports.push(exported);
        let second = ctx.register_module("core", replacement).expect("second");
        assert_eq!(first, second);
        assert_eq!(ctx.module(second).exports, vec![exported]);
    }

    #[test]
    fn unresolvable_import_reports_module_not_found() {
        let mut ctx = context(RegistrationPolicy::Reject);
        let err = ctx.resolve_import("ghost").unwrap_err();
        assert!(matches!(err, FrontendError::ModuleNotFound { name } if name == "ghost"));
    }

    #[test]
    fn checked_cursor_is_monotone() {
        let mut file = SourceFile::new(SourceKind::Library);
        assert_eq!(file.checked(), 0);
        file.advance_checked(0);
        assert_eq!(file.checked(), 0);
    }

    #[test]
    #[should_panic(expected = "checked-cursor")]
    fn checked_cursor_cannot_pass_the_end() {
        let mut file = SourceFile::new(SourceKind::Main);
        file.advance_checked(1);
    }
}
