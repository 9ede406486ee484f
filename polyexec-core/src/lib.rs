//! Polyexec Core - Polyglot Transient-Sandbox Code Execution
//!
//! Accepts the source of a program in one of a closed set of languages,
//! materializes it in per-request scratch space, builds it if the language
//! needs a build step, runs it under a hard wall-clock deadline, and reports
//! exactly one structured outcome. Scratch space is removed on every exit
//! path.
//!
//! # Layout:
//! - [`engine`] - request orchestration, scratch workspace, bounded runner, reporting
//! - [`adapter`] - per-language toolchain strategies (Go, JavaScript, Python)
//! - [`deps`] - static import scanning
//! - [`config`] - budgets, tool paths, package-manager environment
//!
//! ```no_run
//! use polyexec_core::{Engine, EngineConfig, ExecutionRequest, Language};
//!
//! # async fn demo() {
//! let engine = Engine::new(EngineConfig::default());
//! let outcome = engine
//!     .execute(ExecutionRequest::new(Language::Python, "print('Hello World!')"))
//!     .await;
//! println!("{}: {}", outcome.status(), outcome.stdout());
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod language;

pub use adapter::{
    AdapterRegistry, FormatReport, LintIssue, LintReport, Severity, ToolReport, ToolchainAdapter,
    ToolchainInfo,
};
pub use config::{EngineConfig, TimeoutConfig, ToolPaths};
pub use deps::DependencySet;
pub use engine::{Engine, ExecutionOutcome, ExecutionRequest, OutcomeStatus};
pub use error::EngineError;
pub use language::{Language, LanguageFamily, ModuleMode};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Logs go to stderr so that stdout stays reserved for results. The level
/// comes from `RUST_LOG`, falling back to `default_level`.
pub fn init(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber already installed: {e}"))?;

    info!("Initializing Polyexec v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
