use std::path::PathBuf;

use anyhow::{Result, ensure};
use clap::{Parser, ValueEnum};
use sable_core::buffers::{BufferId, BufferRegistry};
use sable_core::diagnostic::Diagnostic;
use sable_core::span::{FileId, Span};
use sable_core::{
    FrontendConfig, FrontendDriver, RegistrationPolicy, Severity, SourceKind, lexer,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Sable compiler frontend", long_about = None)]
struct Cli {
    /// Input files; use `-` to read standard input.
    inputs: Vec<PathBuf>,

    #[arg(long, value_name = "NAME", default_value = "main")]
    module_name: String,

    #[arg(long, value_enum, default_value_t = Kind::Main)]
    kind: Kind,

    #[arg(long, help = "Parse inputs without checking them")]
    parse_only: bool,

    #[arg(short = 'I', long = "import-path", value_name = "DIR")]
    import_paths: Vec<PathBuf>,

    #[arg(short = 'F', long = "framework-path", value_name = "DIR")]
    framework_paths: Vec<PathBuf>,

    #[arg(long, value_name = "DIR", help = "SDK root for foreign module imports")]
    sdk: Option<PathBuf>,

    #[arg(long, value_name = "TRIPLE", default_value = "")]
    target: String,

    #[arg(long, value_name = "DIR", help = "Runtime include directory, searched last")]
    runtime_include: Option<PathBuf>,

    #[arg(long, help = "Delay parsing of function bodies")]
    delay_bodies: bool,

    #[arg(
        long,
        help = "Interpret instead of compiling; raw sibling sources are not importable"
    )]
    immediate: bool,

    #[arg(long, help = "Let a module registration replace an existing one")]
    allow_module_redefinition: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Kind {
    Library,
    Main,
    Repl,
    Ir,
}

impl From<Kind> for SourceKind {
    fn from(kind: Kind) -> SourceKind {
        match kind {
            Kind::Library => SourceKind::Library,
            Kind::Main => SourceKind::Main,
            Kind::Repl => SourceKind::Repl,
            Kind::Ir => SourceKind::LowLevelIr,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    ensure!(
        lexer::is_identifier(&cli.module_name),
        "invalid module name '{}'",
        cli.module_name
    );

    let policy = if cli.allow_module_redefinition {
        RegistrationPolicy::Overwrite
    } else {
        RegistrationPolicy::Reject
    };
    let config = FrontendConfig {
        module_name: cli.module_name.clone(),
        input_kind: cli.kind.into(),
        input_paths: cli.inputs,
        import_search_paths: cli.import_paths,
        framework_search_paths: cli.framework_paths,
        sdk_path: cli.sdk,
        target_triple: cli.target,
        runtime_include_path: cli.runtime_include,
        parse_only: cli.parse_only,
        delay_body_parsing: cli.delay_bodies,
        immediate: cli.immediate,
        registration_policy: policy,
        ..FrontendConfig::default()
    };

    let mut driver = FrontendDriver::setup(config)?;
    let stats = driver.run()?;

    for diagnostic in driver.diagnostics() {
        eprintln!("{}", render(&diagnostic, driver.buffers()));
    }

    let decls = driver.context().module(stats.module).files[0].decls.len();
    let errors = driver.error_count();
    println!(
        "{}: {decls} declarations, {} iterations, {errors} errors",
        cli.module_name, stats.pump_iterations
    );

    ensure!(errors == 0, "{errors} errors emitted");
    Ok(())
}

fn render(diagnostic: &Diagnostic, buffers: &BufferRegistry) -> String {
    let severity = match diagnostic.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    let mut out = match diagnostic.code {
        Some(code) => format!("{severity}[{code}]: {}", diagnostic.message),
        None => format!("{severity}: {}", diagnostic.message),
    };
    if let Some(location) = locate(diagnostic.primary.span, buffers) {
        out.push_str(&format!("\n  --> {location}"));
    }
    for label in &diagnostic.secondary {
        if let (Some(location), Some(message)) = (locate(label.span, buffers), &label.message) {
            out.push_str(&format!("\n  note: {message} ({location})"));
        }
    }
    out
}

/// `name:line:col` for spans that point into a registered buffer.
/// Detached spans (loader-parsed sibling sources, configuration errors)
/// have no buffer and render without a location.
fn locate(span: Span, buffers: &BufferRegistry) -> Option<String> {
    if span.file == FileId::DETACHED || span.file.0 as usize >= buffers.len() {
        return None;
    }
    let buffer = buffers.get(BufferId(span.file.0));
    let upto = &buffer.text[..(span.start as usize).min(buffer.text.len())];
    let line = upto.bytes().filter(|&b| b == b'\n').count() + 1;
    let col = upto.bytes().rev().take_while(|&b| b != b'\n').count() + 1;
    Some(format!("{}:{line}:{col}", buffer.display_name))
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    fn cli() -> Command {
        Command::cargo_bin("sable-cli").expect("binary exists")
    }

    #[test]
    fn checks_a_library_file() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("lib.sbl");
        fs::write(&input, "fn a() { 1 }\nfn b() { a() }\n").expect("write input");

        cli()
            .arg("--kind")
            .arg("library")
            .arg("--module-name")
            .arg("lib")
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains("2 declarations"))
            .stdout(predicate::str::contains("0 errors"));
    }

    #[test]
    fn reads_main_source_from_stdin() {
        cli()
            .arg("-")
            .write_stdin("let answer = 40 + 2;\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 declarations"));
    }

    #[test]
    fn reports_unresolved_names_with_location() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.sbl");
        fs::write(&input, "let x = 1;\nlet y = ghost;\n").expect("write input");

        cli()
            .arg(&input)
            .assert()
            .failure()
            .stderr(predicate::str::contains("unresolved name 'ghost'"))
            .stderr(predicate::str::contains("main.sbl:2:"));
    }

    #[test]
    fn parse_only_suppresses_checking() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.sbl");
        fs::write(&input, "let y = ghost;\n").expect("write input");

        cli()
            .arg("--parse-only")
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains("0 errors"));
    }

    #[test]
    fn resolves_imports_from_import_paths() {
        let dir = tempdir().expect("tempdir");
        let deps = dir.path().join("deps");
        fs::create_dir_all(&deps).expect("create deps");
        fs::write(deps.join("math.sbl"), "fn square(x) { x + x }\n").expect("write dep");
        let input = dir.path().join("main.sbl");
        fs::write(&input, "import math;\nlet four = square(2);\n").expect("write input");

        cli()
            .arg("-I")
            .arg(&deps)
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains("0 errors"));
    }

    #[test]
    fn rejects_invalid_module_names() {
        cli()
            .arg("--module-name")
            .arg("not a name")
            .arg("-")
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid module name"));
    }

    #[cfg(not(feature = "foreign"))]
    #[test]
    fn sdk_requires_foreign_support() {
        cli()
            .arg("--sdk")
            .arg("/opt/some-sdk")
            .arg("-")
            .write_stdin("")
            .assert()
            .failure()
            .stderr(predicate::str::contains("foreign module support"));
    }

    #[test]
    fn missing_inputs_fail_with_the_offending_path() {
        cli()
            .arg("/definitely/not/here.sbl")
            .assert()
            .failure()
            .stderr(predicate::str::contains("here.sbl"));
    }
}
