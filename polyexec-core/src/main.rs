//! Polyexec - run untrusted snippets of Go, JavaScript or Python under a
//! deadline and print the outcome as JSON.
//!
//! Exit status mirrors the outcome: 0 success, 1 tool error, 2 timeout,
//! 3 infrastructure error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyexec_core::{
    init, Engine, EngineConfig, EngineError, ExecutionOutcome, ExecutionRequest, Language,
    ModuleMode, OutcomeStatus,
};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "polyexec", about = "Polyglot transient-sandbox code execution", version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build (if needed) and run a program
    Run {
        /// go, javascript or python (aliases accepted)
        language: String,
        /// Source file; reads the program from stdin when omitted or `-`
        file: Option<PathBuf>,
        /// Text fed to the program's stdin
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,
        /// File fed to the program's stdin
        #[arg(long, value_name = "FILE")]
        input_file: Option<PathBuf>,
        /// JavaScript module mode: module or commonjs
        #[arg(long, default_value = "module")]
        module_mode: String,
    },
    /// List imports without running anything
    Deps {
        language: String,
        file: Option<PathBuf>,
    },
    /// Install a package with the language's package manager
    Add { language: String, package: String },
    /// Show toolchain version and installed modules
    Info { language: String },
    /// Format source (Go)
    Fmt {
        language: String,
        file: Option<PathBuf>,
    },
    /// Run a test file (Go, JavaScript)
    Test {
        language: String,
        file: Option<PathBuf>,
    },
    /// Lint source (Python)
    Lint {
        language: String,
        file: Option<PathBuf>,
    },
    /// List supported languages
    Languages,
}

fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read program from stdin")?;
            Ok(source)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_code(status: OutcomeStatus) -> u8 {
    match status {
        OutcomeStatus::Success => 0,
        OutcomeStatus::ToolError => 1,
        OutcomeStatus::Timeout => 2,
        OutcomeStatus::InfrastructureError => 3,
    }
}

/// Print an auxiliary-operation result; engine errors become exit code 3.
fn report<T: Serialize>(
    result: polyexec_core::error::Result<T>,
    success: impl Fn(&T) -> bool,
) -> Result<u8> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(if success(&value) { 0 } else { 1 })
        }
        Err(e) => {
            print_json(&serde_json::json!({ "error": e.to_string() }))?;
            Ok(status_code(OutcomeStatus::InfrastructureError))
        }
    }
}

fn parse_language(name: &str) -> std::result::Result<Language, EngineError> {
    name.parse()
}

async fn dispatch(engine: &Engine, command: Command) -> Result<u8> {
    match command {
        Command::Run {
            language,
            file,
            input,
            input_file,
            module_mode,
        } => {
            let source = read_source(file.as_deref())?;
            let stdin = match input_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => input,
            };

            let outcome = match parse_language(&language) {
                Ok(language) => {
                    let mode: ModuleMode = module_mode.parse()?;
                    let mut request =
                        ExecutionRequest::new(language, source).with_module_mode(mode);
                    request.stdin = stdin;
                    engine.execute(request).await
                }
                Err(e) => ExecutionOutcome::infrastructure(&e),
            };
            print_json(&outcome)?;
            Ok(status_code(outcome.status()))
        }
        Command::Deps { language, file } => {
            let language = parse_language(&language)?;
            let source = read_source(file.as_deref())?;
            print_json(&engine.analyze_dependencies(language, &source))?;
            Ok(0)
        }
        Command::Add { language, package } => {
            let language = parse_language(&language)?;
            report(engine.add_dependency(language, &package).await, |r| r.success)
        }
        Command::Info { language } => {
            let language = parse_language(&language)?;
            report(engine.toolchain_info(language).await, |_| true)
        }
        Command::Fmt { language, file } => {
            let language = parse_language(&language)?;
            let source = read_source(file.as_deref())?;
            report(engine.format_source(language, &source).await, |r| r.success)
        }
        Command::Test { language, file } => {
            let language = parse_language(&language)?;
            let source = read_source(file.as_deref())?;
            report(engine.run_tests(language, &source).await, |r| r.success)
        }
        Command::Lint { language, file } => {
            let language = parse_language(&language)?;
            let source = read_source(file.as_deref())?;
            report(engine.lint(language, &source).await, |r| r.issues.is_empty())
        }
        Command::Languages => {
            let languages: Vec<_> = engine
                .languages()
                .into_iter()
                .map(|l| {
                    serde_json::json!({
                        "name": l.name(),
                        "family": l.family().dir_name(),
                        "build_step": l.family().has_build_step(),
                    })
                })
                .collect();
            print_json(&languages)?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init(&cli.log_level) {
        eprintln!("warning: {e:#}");
    }

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(status_code(OutcomeStatus::InfrastructureError));
        }
    };
    debug!(?config, "Effective configuration");

    let engine = Engine::new(config);
    match dispatch(&engine, cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(status_code(OutcomeStatus::InfrastructureError))
        }
    }
}
