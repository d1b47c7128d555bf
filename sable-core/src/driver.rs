//! The frontend driver.
//!
//! `FrontendDriver::setup` turns a `FrontendConfig` into a live session:
//! a compilation context with its sealed loader chain, and a buffer
//! registry holding every input. `run` then dispatches to the pipeline
//! strategy matching the input kind and pumps the parser and checker
//! against a moving checked-cursor.
//!
//! Everything here is single-threaded and synchronous; a host that wants
//! to abandon a session mid-way discards the driver and builds a new one.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use crate::buffers::{BufferId, BufferRegistry};
use crate::context::{
    CompilationContext, Module, ModuleId, RegistrationPolicy, SourceFile, SourceKind,
};
use crate::diagnostic::{Diagnostic, DiagnosticSink};
use crate::error::FrontendError;
use crate::ir::{IrContainer, IrCoordinator};
use crate::lexer;
use crate::loader::{self, ForeignLoaderSpec, SerializedModuleLoader, SourceImportLoader};
use crate::parser::{
    self, DelayedParsingPolicy, ParseStep, ParserState,
};
use crate::typecheck::Checker;

/// An in-memory input buffer supplied by the caller. Ingestion copies the
/// text; the caller keeps ownership of its original.
#[derive(Debug, Clone)]
pub struct InputBuffer {
    pub text: String,
    pub display_name: String,
}

/// A code-completion request: a buffer plus the byte offset the tooling
/// wants results for.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub text: String,
    pub display_name: String,
    pub offset: u32,
}

/// Handed to the completion callback for each delayed body that contained
/// the completion point.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub fn_name: String,
    pub buffer: BufferId,
    pub offset: u32,
}

pub type CompletionCallback = Box<dyn FnMut(&CompletionResult)>;

/// Everything the driver recognizes about one invocation.
pub struct FrontendConfig {
    pub module_name: String,
    pub input_kind: SourceKind,
    /// Opened in order; `-` reads standard input.
    pub input_paths: Vec<PathBuf>,
    pub input_buffers: Vec<InputBuffer>,
    pub import_search_paths: Vec<PathBuf>,
    pub framework_search_paths: Vec<PathBuf>,
    pub sdk_path: Option<PathBuf>,
    pub target_triple: String,
    pub runtime_include_path: Option<PathBuf>,
    pub module_cache_path: Option<PathBuf>,
    pub extra_foreign_args: Vec<String>,
    pub parse_only: bool,
    pub delay_body_parsing: bool,
    /// Immediate/interpreted mode: imports never resolve from raw sibling
    /// sources, so the raw-source loader is omitted from the chain.
    pub immediate: bool,
    pub completion: Option<CompletionRequest>,
    pub completion_callback: Option<CompletionCallback>,
    pub registration_policy: RegistrationPolicy,
}

impl Default for FrontendConfig {
    fn default() -> FrontendConfig {
        FrontendConfig {
            module_name: "main".to_owned(),
            input_kind: SourceKind::Main,
            input_paths: Vec::new(),
            input_buffers: Vec::new(),
            import_search_paths: Vec::new(),
            framework_search_paths: Vec::new(),
            sdk_path: None,
            target_triple: String::new(),
            runtime_include_path: None,
            module_cache_path: None,
            extra_foreign_args: Vec::new(),
            parse_only: false,
            delay_body_parsing: false,
            immediate: false,
            completion: None,
            completion_callback: None,
            registration_policy: RegistrationPolicy::default(),
        }
    }
}

/// Counters reported by `run`, mainly for tests and logging.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    pub module: ModuleId,
    pub pump_iterations: usize,
    pub check_runs: usize,
}

/// Pipeline strategy selected from the input kind. Low-level-IR state
/// exists only for the MainOrIr case, never as ambient nullable state
/// shared across both.
enum PipelineStrategy {
    Library,
    MainOrIr { ir: Option<IrCoordinator> },
}

pub struct FrontendDriver {
    config: FrontendConfig,
    context: CompilationContext,
    buffers: BufferRegistry,
    ir: Option<IrCoordinator>,
    sink: DiagnosticSink,
    main_module: Option<ModuleId>,
}

impl std::fmt::Debug for FrontendDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendDriver")
            .field("context", &self.context)
            .field("buffers", &self.buffers)
            .field("ir", &self.ir)
            .field("sink", &self.sink)
            .field("main_module", &self.main_module)
            .finish_non_exhaustive()
    }
}

impl FrontendDriver {
    /// Build a session from `config`.
    ///
    /// Fails fast: the first configuration or input problem is terminal
    /// and nothing after it is attempted. A non-identifier module name is
    /// a caller bug and panics.
    #[tracing::instrument(skip_all, fields(module = %config.module_name))]
    pub fn setup(config: FrontendConfig) -> Result<FrontendDriver, FrontendError> {
        let sink = DiagnosticSink::new();
        let mut context = CompilationContext::new(sink.clone(), config.registration_policy);
        context.import_search_paths = config.import_search_paths.clone();
        context.framework_search_paths = config.framework_search_paths.clone();

        if !config.immediate {
            context.add_loader(Box::new(SourceImportLoader));
        }
        context.add_loader(Box::new(SerializedModuleLoader));

        if let Some(sdk_path) = &config.sdk_path {
            let Some(ctor) = loader::foreign::constructor() else {
                return Err(FrontendError::ForeignSupportUnavailable);
            };
            let spec = ForeignLoaderSpec {
                sdk_path: sdk_path.clone(),
                target_triple: config.target_triple.clone(),
                import_search_paths: context.import_search_paths.clone(),
                framework_search_paths: context.framework_search_paths.clone(),
                module_cache_path: config.module_cache_path.clone(),
                extra_args: config.extra_foreign_args.clone(),
            };
            context.add_loader(ctor(&spec)?);
            tracing::debug!(sdk = %sdk_path.display(), "foreign module loader attached");
        }

        // Appended after loader construction: the foreign loader captured
        // its search paths above and must not see the runtime include
        // path; lookups through the live list from here on do.
        if let Some(path) = &config.runtime_include_path {
            context.import_search_paths.push(path.clone());
        }
        context.seal_loaders();

        assert!(
            lexer::is_identifier(&config.module_name),
            "module name must be a valid identifier"
        );

        // The IR container exists for the whole session when the input
        // kind calls for it, before any parsing happens.
        let ir = (config.input_kind == SourceKind::LowLevelIr)
            .then(|| IrCoordinator::new(sink.clone()));

        let mut buffers = BufferRegistry::new();

        if let Some(request) = &config.completion {
            // The request does not own registry storage; copy it in.
            let id = buffers.add_buffer(&request.text, &request.display_name);
            buffers.set_completion_point(id, request.offset)?;
        }

        for path in &config.input_paths {
            let text = read_input(path).map_err(|source| FrontendError::InputOpen {
                path: path.clone(),
                source,
            })?;
            buffers.add_buffer(&text, &path.display().to_string());
        }

        for buffer in &config.input_buffers {
            buffers.add_buffer(&buffer.text, &buffer.display_name);
        }
        tracing::debug!(buffers = buffers.len(), "inputs acquired");

        Ok(FrontendDriver {
            config,
            context,
            buffers,
            ir,
            sink,
            main_module: None,
        })
    }

    /// Process the session's buffers into the main module.
    #[tracing::instrument(skip_all)]
    pub fn run(&mut self) -> Result<RunStats, FrontendError> {
        let kind = self.config.input_kind;
        let name = self.context.intern(&self.config.module_name);
        let module = self
            .context
            .register_module(&self.config.module_name, Module::new(name))?;
        self.context.module_mut(module).files.push(SourceFile::new(kind));
        self.main_module = Some(module);

        let mut stats = RunStats {
            module,
            pump_iterations: 0,
            check_runs: 0,
        };

        // REPL sessions are driven line-by-line by the host; nothing to
        // pump here.
        if kind == SourceKind::Repl {
            return Ok(stats);
        }

        let policy = if let Some((buffer, offset)) = self.buffers.completion_point() {
            DelayedParsingPolicy::UntilCompletionPoint { buffer, offset }
        } else if self.config.delay_body_parsing {
            DelayedParsingPolicy::AlwaysDelayBodies
        } else {
            DelayedParsingPolicy::None
        };

        let mut state = ParserState::new();
        let mut checker = Checker::new(self.sink.clone());

        let strategy = match kind {
            SourceKind::Library => PipelineStrategy::Library,
            SourceKind::Main | SourceKind::LowLevelIr => PipelineStrategy::MainOrIr {
                ir: self.ir.take(),
            },
            SourceKind::Repl => unreachable!(),
        };

        match strategy {
            PipelineStrategy::Library => {
                // Parse all buffers into the one shared source file, in
                // registration order, then check the whole thing once.
                for buffer in self.buffers.ids().collect::<Vec<_>>() {
                    let base = self.context.module(module).files[0].decls.len();
                    let batch = parser::parse_batch(
                        &mut state,
                        &self.buffers,
                        buffer,
                        base,
                        policy,
                        ParseStep::ToEnd,
                        None,
                        &self.sink,
                    );
                    debug_assert!(batch.done, "library parsing must finish in one step");
                    self.context.module_mut(module).files[0]
                        .decls
                        .extend(batch.decls);
                    stats.pump_iterations += 1;
                }
                if !self.config.parse_only {
                    let len = self.context.module(module).files[0].decls.len();
                    checker.check_range(&mut self.context, module, 0, 0..len);
                    self.context.module_mut(module).files[0].advance_checked(len);
                    stats.check_runs += 1;
                }
            }
            PipelineStrategy::MainOrIr { mut ir } => {
                assert_eq!(
                    self.buffers.len(),
                    1,
                    "this mode only allows one input buffer"
                );
                let buffer = self.buffers.ids().next().expect("one buffer");
                if kind == SourceKind::Main {
                    self.buffers.mark_script_header(buffer);
                }

                // Pump the parser until it reports the buffer done. Each
                // iteration checks only the newly parsed suffix, so
                // top-level code can be checked before later statements
                // are even parsed.
                loop {
                    let base = self.context.module(module).files[0].decls.len();
                    let batch = parser::parse_batch(
                        &mut state,
                        &self.buffers,
                        buffer,
                        base,
                        policy,
                        ParseStep::Incremental,
                        ir.as_mut(),
                        &self.sink,
                    );
                    self.context.module_mut(module).files[0]
                        .decls
                        .extend(batch.decls);
                    stats.pump_iterations += 1;

                    if !self.config.parse_only {
                        let file = &self.context.module(module).files[0];
                        let range = file.checked()..file.decls.len();
                        let end = range.end;
                        checker.check_range(&mut self.context, module, 0, range);
                        self.context.module_mut(module).files[0].advance_checked(end);
                        stats.check_runs += 1;
                    }

                    if batch.done {
                        break;
                    }
                }

                if let Some(ir) = ir.as_mut() {
                    ir.finish();
                }
                self.ir = ir;
            }
        }

        if policy != DelayedParsingPolicy::None {
            let completion = self.buffers.completion_point();
            let hits = parser::parse_delayed_bodies(
                &mut state,
                &self.buffers,
                &mut self.context.module_mut(module).files[0],
                completion,
                &self.sink,
            );
            for hit in hits {
                if let Some(callback) = self.config.completion_callback.as_mut() {
                    callback(&CompletionResult {
                        fn_name: hit.fn_name,
                        buffer: hit.buffer,
                        offset: hit.offset,
                    });
                }
            }
        }

        tracing::debug!(
            iterations = stats.pump_iterations,
            checks = stats.check_runs,
            errors = self.sink.error_count(),
            "pump finished"
        );
        Ok(stats)
    }

    pub fn context(&self) -> &CompilationContext {
        &self.context
    }

    pub fn buffers(&self) -> &BufferRegistry {
        &self.buffers
    }

    pub fn main_module(&self) -> Option<ModuleId> {
        self.main_module
    }

    pub fn ir_container(&self) -> Option<&IrContainer> {
        self.ir.as_ref().map(|ir| &ir.container)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.sink.collected()
    }

    pub fn error_count(&self) -> usize {
        self.sink.error_count()
    }
}

fn read_input(path: &PathBuf) -> Result<String, std::io::Error> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        fs::read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclKind, FnBody};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn buffer(text: &str, name: &str) -> InputBuffer {
        InputBuffer {
            text: text.to_owned(),
            display_name: name.to_owned(),
        }
    }

    fn library_config(sources: &[&str]) -> FrontendConfig {
        FrontendConfig {
            input_kind: SourceKind::Library,
            module_name: "lib".to_owned(),
            input_buffers: sources
                .iter()
                .enumerate()
                .map(|(i, s)| buffer(s, &format!("buf{i}.sbl")))
                .collect(),
            ..FrontendConfig::default()
        }
    }

    fn main_config(source: &str) -> FrontendConfig {
        FrontendConfig {
            input_kind: SourceKind::Main,
            input_buffers: vec![buffer(source, "main.sbl")],
            ..FrontendConfig::default()
        }
    }

    #[test]
    fn default_chain_is_source_then_serialized() {
        let driver = FrontendDriver::setup(FrontendConfig::default()).expect("setup");
        assert_eq!(driver.context().loader_names(), vec!["source", "serialized"]);
    }

    #[test]
    fn immediate_mode_drops_the_source_loader() {
        let config = FrontendConfig {
            immediate: true,
            ..FrontendConfig::default()
        };
        let driver = FrontendDriver::setup(config).expect("setup");
        assert_eq!(driver.context().loader_names(), vec!["serialized"]);
    }

    #[cfg(not(feature = "foreign"))]
    #[test]
    fn sdk_without_capability_halts_before_input_acquisition() {
        // The input path is unreadable, but setup must fail on the
        // missing capability first: inputs are never touched.
        let config = FrontendConfig {
            sdk_path: Some(PathBuf::from("/opt/some-sdk")),
            input_paths: vec![PathBuf::from("/definitely/not/here.sbl")],
            ..FrontendConfig::default()
        };
        let err = FrontendDriver::setup(config).unwrap_err();
        assert!(matches!(err, FrontendError::ForeignSupportUnavailable));
    }

    #[test]
    fn runtime_include_path_lands_on_the_import_search_path() {
        let config = FrontendConfig {
            runtime_include_path: Some(PathBuf::from("/rt/include")),
            ..FrontendConfig::default()
        };
        let driver = FrontendDriver::setup(config).expect("setup");
        assert_eq!(
            driver.context().import_search_paths.last(),
            Some(&PathBuf::from("/rt/include"))
        );
    }

    #[test]
    #[should_panic(expected = "valid identifier")]
    fn non_identifier_module_name_is_a_caller_bug() {
        let config = FrontendConfig {
            module_name: "not a name".to_owned(),
            ..FrontendConfig::default()
        };
        let _ = FrontendDriver::setup(config);
    }

    #[test]
    fn library_mode_merges_buffers_and_checks_once() {
        let sources = ["fn a() { 1 }", "fn b() { a() }", "fn c() { b() }"];
        let mut driver = FrontendDriver::setup(library_config(&sources)).expect("setup");
        let stats = driver.run().expect("run");

        let file = &driver.context().module(stats.module).files[0];
        let names: Vec<_> = file.decls.iter().filter_map(|d| d.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(stats.check_runs, 1);
        assert_eq!(file.checked(), 3);
        assert_eq!(driver.error_count(), 0);
    }

    #[test]
    fn main_mode_pumps_and_advances_the_checked_cursor() {
        let mut driver =
            FrontendDriver::setup(main_config("let a = 1; let b = a + 1; let c = b + 1;"))
                .expect("setup");
        let stats = driver.run().expect("run");

        let file = &driver.context().module(stats.module).files[0];
        assert_eq!(file.decls.len(), 3);
        assert_eq!(file.checked(), 3);
        assert!((1..=3).contains(&stats.pump_iterations));
        assert_eq!(driver.error_count(), 0);
    }

    #[test]
    fn parse_only_never_invokes_checking() {
        for config in [
            library_config(&["fn a() { 1 }", "undefined_name;"]),
            main_config("let a = undefined_name;"),
        ] {
            let mut driver = FrontendDriver::setup(FrontendConfig {
                parse_only: true,
                ..config
            })
            .expect("setup");
            let stats = driver.run().expect("run");
            assert_eq!(stats.check_runs, 0);
            let file = &driver.context().module(stats.module).files[0];
            assert_eq!(file.checked(), 0);
            // No semantic diagnostics either; parse-only means parse only.
            assert_eq!(driver.error_count(), 0);
        }
    }

    #[test]
    fn fail_fast_stops_at_the_first_unreadable_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = |name: &str| {
            let path = dir.path().join(name);
            fs::write(&path, "fn ok() { 1 }").expect("write");
            path
        };
        let missing = dir.path().join("third.sbl");
        let config = FrontendConfig {
            input_kind: SourceKind::Library,
            module_name: "lib".to_owned(),
            input_paths: vec![
                good("first.sbl"),
                good("second.sbl"),
                missing.clone(),
                dir.path().join("fourth.sbl"),
                dir.path().join("fifth.sbl"),
            ],
            ..FrontendConfig::default()
        };
        let err = FrontendDriver::setup(config).unwrap_err();
        match err {
            FrontendError::InputOpen { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn caller_buffers_are_copied_not_aliased() {
        let original = String::from("fn keep() { 1 }");
        let saved = original.clone();
        let config = FrontendConfig {
            input_kind: SourceKind::Library,
            module_name: "lib".to_owned(),
            input_buffers: vec![InputBuffer {
                text: original.clone(),
                display_name: "mem.sbl".to_owned(),
            }],
            ..FrontendConfig::default()
        };
        let _driver = FrontendDriver::setup(config).expect("setup");
        assert_eq!(original, saved);
    }

    #[test]
    fn repl_sessions_do_not_pump() {
        let config = FrontendConfig {
            input_kind: SourceKind::Repl,
            input_buffers: vec![buffer("let ignored = 1;", "repl")],
            ..FrontendConfig::default()
        };
        let mut driver = FrontendDriver::setup(config).expect("setup");
        let stats = driver.run().expect("run");
        assert_eq!(stats.pump_iterations, 0);
        assert!(driver.context().module(stats.module).files[0].decls.is_empty());
    }

    #[test]
    #[should_panic(expected = "one input buffer")]
    fn main_mode_rejects_multiple_buffers() {
        let config = FrontendConfig {
            input_buffers: vec![buffer("1;", "a"), buffer("2;", "b")],
            ..FrontendConfig::default()
        };
        let mut driver = FrontendDriver::setup(config).expect("setup");
        let _ = driver.run();
    }

    #[test]
    fn script_headers_are_skipped_in_main_mode() {
        let mut driver =
            FrontendDriver::setup(main_config("#!/usr/bin/env sable\nlet x = 1;")).expect("setup");
        let stats = driver.run().expect("run");
        assert_eq!(driver.error_count(), 0);
        assert_eq!(driver.context().module(stats.module).files[0].decls.len(), 1);
    }

    #[test]
    fn semantic_errors_do_not_stop_the_pump() {
        let mut driver = FrontendDriver::setup(main_config(
            "import ghost; let a = mystery; let b = a + 1;",
        ))
        .expect("setup");
        let stats = driver.run().expect("run");
        let file = &driver.context().module(stats.module).files[0];
        // Everything parsed and checked despite two errors along the way.
        assert_eq!(file.decls.len(), 3);
        assert_eq!(file.checked(), 3);
        assert_eq!(driver.error_count(), 2);
    }

    #[test]
    fn ir_sessions_thread_backpatch_state_across_iterations() {
        let source = "ir entry { const 1 br exit } fn helper() { 1 } ir tail { label exit }";
        let config = FrontendConfig {
            input_kind: SourceKind::LowLevelIr,
            input_buffers: vec![buffer(source, "main.sblir")],
            ..FrontendConfig::default()
        };
        let mut driver = FrontendDriver::setup(config).expect("setup");
        let stats = driver.run().expect("run");

        assert!(stats.pump_iterations >= 2, "IR blocks pump in batches");
        let container = driver.ir_container().expect("container");
        assert_eq!(container.blocks.len(), 2);
        assert_eq!(driver.error_count(), 0);
    }

    #[test]
    fn delayed_body_parsing_restores_full_fidelity() {
        let config = FrontendConfig {
            delay_body_parsing: true,
            ..main_config("fn f() { 1 + 2 } fn g() { f() } g();")
        };
        let mut driver = FrontendDriver::setup(config).expect("setup");
        let stats = driver.run().expect("run");

        let file = &driver.context().module(stats.module).files[0];
        for decl in &file.decls {
            if let DeclKind::Function { body, .. } = &decl.kind {
                assert!(matches!(body, FnBody::Parsed(_)), "body left delayed");
            }
        }
        assert_eq!(driver.error_count(), 0);
    }

    #[test]
    fn completion_requests_register_one_point_and_fire_the_callback() {
        let text = "fn target() { 40 + 2 }";
        let offset = text.find("40").unwrap() as u32;
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let config = FrontendConfig {
            completion: Some(CompletionRequest {
                text: text.to_owned(),
                display_name: "completion.sbl".to_owned(),
                offset,
            }),
            completion_callback: Some(Box::new(move |result: &CompletionResult| {
                sink.borrow_mut().push(result.fn_name.clone());
            })),
            ..FrontendConfig::default()
        };
        let mut driver = FrontendDriver::setup(config).expect("setup");
        assert_eq!(
            driver.buffers().completion_point(),
            Some((BufferId(0), offset))
        );
        driver.run().expect("run");
        assert_eq!(&*seen.borrow(), &["target".to_owned()]);
    }
}
