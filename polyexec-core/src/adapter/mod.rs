//! Toolchain Adapters - Per-Language Build/Run Strategies
//!
//! Each supported language implements [`ToolchainAdapter`]: how its source
//! becomes a running process (with or without a build step), how its imports
//! are scanned, and how its package manager and auxiliary tools are driven.
//!
//! # Contract:
//! - `execute()` receives an already-acquired scratch artifact and must not
//!   release it; the engine does that after reporting
//! - Every external tool runs through the bounded runner, never a shell
//! - Package-manager output is reported verbatim and never retried
//!
//! Adapters are stateless and shared as `Arc<dyn ToolchainAdapter>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::deps::{self, DependencySet};
use crate::engine::report::AdapterOutcome;
use crate::engine::runner::{self, ProcessSpec, RunOutcome};
use crate::engine::workspace::{ScratchArtifact, WorkspaceManager};
use crate::engine::ExecutionRequest;
use crate::error::{EngineError, Result};
use crate::language::Language;

pub mod go;
pub mod javascript;
pub mod python;

pub use go::GoAdapter;
pub use javascript::JavaScriptAdapter;
pub use python::PythonAdapter;

/// Raw result of a package-manager or test-runner invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReport {
    pub success: bool,
    /// stdout followed by stderr, exactly as the tool printed them
    pub raw_output: String,
}

/// Toolchain version and installed modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    pub version: String,
    pub modules: Vec<String>,
}

/// Result of running a source formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatReport {
    pub success: bool,
    /// Formatted text, or the original source when formatting failed
    pub formatted: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintReport {
    pub issues: Vec<LintIssue>,
}

/// Shared, read-only state handed to adapters.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub config: Arc<EngineConfig>,
    pub workspace: WorkspaceManager,
}

impl AdapterContext {
    pub fn new(config: EngineConfig) -> Self {
        let workspace = WorkspaceManager::new(config.scratch_root.clone());
        Self {
            config: Arc::new(config),
            workspace,
        }
    }

    /// Start a process spec with the configured output cap.
    pub fn process(&self, program: &str, timeout: Duration) -> ProcessSpec {
        ProcessSpec::new(program, timeout).output_limit(self.config.max_output_bytes)
    }

    /// Package-manager spec: generous budget plus `package_env`.
    pub fn package_process(&self, program: &str) -> ProcessSpec {
        self.config.package_env.iter().fold(
            self.process(program, self.config.timeouts.package_manager()),
            |spec, (key, value)| spec.env(key.as_str(), value.as_str()),
        )
    }
}

/// The per-language strategy that knows how to build and run one language.
#[async_trait]
pub trait ToolchainAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// File suffix for the request's source, e.g. `.go` or `.mjs`.
    fn source_suffix(&self, request: &ExecutionRequest) -> &'static str;

    /// Build (if needed) and run the source already written to `artifact`.
    async fn execute(
        &self,
        ctx: &AdapterContext,
        artifact: &mut ScratchArtifact,
        request: &ExecutionRequest,
    ) -> Result<AdapterOutcome>;

    /// Static import scan. Never executes code and never fails.
    fn analyze_dependencies(&self, source: &str) -> DependencySet {
        deps::scan(self.language(), source)
    }

    /// Install a package with the language's own package manager.
    async fn add_dependency(&self, ctx: &AdapterContext, package: &str) -> Result<ToolReport>;

    /// Toolchain version plus installed modules.
    async fn toolchain_info(&self, ctx: &AdapterContext) -> Result<ToolchainInfo>;

    async fn format_source(&self, _ctx: &AdapterContext, _source: &str) -> Result<FormatReport> {
        Err(EngineError::Unsupported {
            operation: "formatting",
            language: self.language(),
        })
    }

    async fn run_tests(&self, _ctx: &AdapterContext, _source: &str) -> Result<ToolReport> {
        Err(EngineError::Unsupported {
            operation: "running tests",
            language: self.language(),
        })
    }

    async fn lint(&self, _ctx: &AdapterContext, _source: &str) -> Result<LintReport> {
        Err(EngineError::Unsupported {
            operation: "linting",
            language: self.language(),
        })
    }
}

/// Language → adapter lookup, fixed once the engine is built.
pub struct AdapterRegistry {
    adapters: HashMap<Language, Arc<dyn ToolchainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with the Go, JavaScript and Python adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GoAdapter));
        registry.register(Arc::new(JavaScriptAdapter));
        registry.register(Arc::new(PythonAdapter));
        registry
    }

    /// Register an adapter under its own language, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ToolchainAdapter>) {
        debug!(language = %adapter.language(), "Registering toolchain adapter");
        self.adapters.insert(adapter.language(), adapter);
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn ToolchainAdapter>> {
        self.adapters.get(&language).cloned()
    }

    /// Registered languages in a stable order.
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<_> = self.adapters.keys().copied().collect();
        languages.sort();
        languages
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Reject specs that are empty or could be parsed as an option.
pub(crate) fn validate_package_spec(package: &str) -> Result<&str> {
    let package = package.trim();
    let malformed = package.is_empty()
        || package.starts_with('-')
        || package.chars().any(|c| c.is_whitespace() || c == '\0');
    if malformed {
        return Err(EngineError::InvalidPackageSpec(package.to_string()));
    }
    Ok(package)
}

/// Run a tool and report its output verbatim.
pub(crate) async fn run_tool(
    spec: ProcessSpec,
    artifact: Option<&ScratchArtifact>,
) -> Result<ToolReport> {
    let program = spec.program.clone();
    let report = match runner::run(spec).await? {
        RunOutcome::Exited(output) => ToolReport {
            success: output.success(),
            raw_output: output.combined(),
        },
        RunOutcome::TimedOut { budget, .. } => ToolReport {
            success: false,
            raw_output: format!("{program} timed out after {} ms", budget.as_millis()),
        },
    };
    info!(tool = %program, success = report.success, "Tool invocation finished");

    Ok(match artifact {
        Some(artifact) => ToolReport {
            success: report.success,
            raw_output: artifact.scrub(&report.raw_output),
        },
        None => report,
    })
}

/// First line of a successful version query like `go version`.
pub(crate) async fn query_version(ctx: &AdapterContext, program: &str, flag: &str) -> Result<String> {
    let spec = ctx.process(program, ctx.config.timeouts.auxiliary()).arg(flag);
    let report = run_tool(spec, None).await?;
    Ok(report
        .raw_output
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_every_language() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.languages(), Language::ALL.to_vec());
        for language in Language::ALL {
            assert_eq!(registry.get(language).unwrap().language(), language);
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = AdapterRegistry::new();
        assert!(registry.get(Language::Go).is_none());
        assert!(registry.languages().is_empty());
    }

    #[test]
    fn test_package_spec_validation() {
        assert_eq!(validate_package_spec(" left-pad ").unwrap(), "left-pad");
        assert!(validate_package_spec("github.com/gorilla/mux@v1.8.0").is_ok());
        assert!(validate_package_spec("").is_err());
        assert!(validate_package_spec("--index-url=http://evil").is_err());
        assert!(validate_package_spec("a b").is_err());
    }

    #[tokio::test]
    async fn test_run_tool_reports_failure_verbatim() {
        let ctx = AdapterContext::new(EngineConfig::default());
        let spec = ctx
            .process("sh", Duration::from_secs(5))
            .arg("-c")
            .arg("echo fetching; echo 'ECONNREFUSED 127.0.0.1:9' >&2; exit 1");
        let report = run_tool(spec, None).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.raw_output, "fetching\nECONNREFUSED 127.0.0.1:9\n");
    }

    #[tokio::test]
    async fn test_run_tool_timeout_is_a_failed_report() {
        let ctx = AdapterContext::new(EngineConfig::default());
        let spec = ctx
            .process("sleep", Duration::from_millis(100))
            .arg("10");
        let report = run_tool(spec, None).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.raw_output, "sleep timed out after 100 ms");
    }

    #[test]
    fn test_package_env_is_applied() {
        let mut config = EngineConfig::default();
        config
            .package_env
            .insert("npm_config_registry".into(), "http://127.0.0.1:9/".into());
        let ctx = AdapterContext::new(config);
        let spec = ctx.package_process("npm");
        assert_eq!(
            spec.env,
            vec![("npm_config_registry".to_string(), "http://127.0.0.1:9/".to_string())]
        );
        assert_eq!(spec.timeout, Duration::from_secs(60));
    }
}
