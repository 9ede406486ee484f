//! Engine module - Request Orchestration
//!
//! The [`Engine`] ties the pieces together for one request:
//!
//! 1. resolve the toolchain adapter for the language
//! 2. acquire a scratch artifact and write the source
//! 3. let the adapter build/run through the bounded runner
//! 4. render exactly one [`ExecutionOutcome`] and release the artifact
//!
//! The engine holds no per-request mutable state; any number of requests
//! may run concurrently against one `Engine`.

pub mod report;
pub mod runner;
pub mod workspace;

pub use report::{ExecutionOutcome, OutcomeStatus};
pub use workspace::{ScratchArtifact, WorkspaceManager};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterContext, AdapterRegistry, FormatReport, LintReport, ToolReport, ToolchainAdapter,
    ToolchainInfo,
};
use crate::config::EngineConfig;
use crate::deps::{self, DependencySet};
use crate::error::{EngineError, Result};
use crate::language::{Language, ModuleMode};

/// A single request: the source of one program plus optional stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: Language,
    pub source: String,
    #[serde(default)]
    pub stdin: Option<String>,
    /// Only meaningful for JavaScript
    #[serde(default)]
    pub module_mode: ModuleMode,
}

impl ExecutionRequest {
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            language,
            source: source.into(),
            stdin: None,
            module_mode: ModuleMode::default(),
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_module_mode(mut self, mode: ModuleMode) -> Self {
        self.module_mode = mode;
        self
    }
}

/// Polyglot execution engine.
pub struct Engine {
    ctx: AdapterContext,
    registry: AdapterRegistry,
}

impl Engine {
    /// Engine with the Go, JavaScript and Python adapters registered.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, AdapterRegistry::with_defaults())
    }

    pub fn with_registry(config: EngineConfig, registry: AdapterRegistry) -> Self {
        info!(
            scratch_root = %config.scratch_root.display(),
            languages = ?registry.languages(),
            "Polyexec engine initialized"
        );
        Self {
            ctx: AdapterContext::new(config),
            registry,
        }
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.ctx.config
    }

    pub fn workspace(&self) -> &WorkspaceManager {
        &self.ctx.workspace
    }

    /// Languages with a registered adapter.
    pub fn languages(&self) -> Vec<Language> {
        self.registry.languages()
    }

    fn adapter(&self, language: Language) -> Result<Arc<dyn ToolchainAdapter>> {
        self.registry
            .get(language)
            .ok_or(EngineError::AdapterMissing(language))
    }

    /// Run one program. Never fails: every failure is an outcome.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let adapter = match self.adapter(request.language) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(language = %request.language, "No adapter for request");
                return ExecutionOutcome::infrastructure(&e);
            }
        };

        let family = request.language.family();
        let suffix = adapter.source_suffix(&request);
        let mut artifact = match self.ctx.workspace.acquire(family, suffix, &request.source) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(language = %request.language, error = %e, "Scratch allocation failed");
                return ExecutionOutcome::infrastructure(&e);
            }
        };

        info!(
            language = %request.language,
            token = %artifact.token(),
            has_stdin = request.stdin.is_some(),
            "Executing request"
        );
        let result = adapter.execute(&self.ctx, &mut artifact, &request).await;
        if let Err(e) = &result {
            warn!(token = %artifact.token(), error = %e, "Toolchain failure");
        }

        let outcome = report::render(result, &artifact);
        artifact.release();

        info!(
            language = %request.language,
            status = %outcome.status(),
            "Request finished"
        );
        outcome
    }

    /// Like [`Engine::execute`], with the language given by name.
    ///
    /// Unknown names produce an `InfrastructureError` outcome before any
    /// filesystem activity.
    pub async fn execute_named(
        &self,
        language: &str,
        source: impl Into<String>,
        stdin: Option<String>,
    ) -> ExecutionOutcome {
        match language.parse::<Language>() {
            Ok(language) => {
                let mut request = ExecutionRequest::new(language, source);
                request.stdin = stdin;
                self.execute(request).await
            }
            Err(e) => {
                warn!(language, "Rejected unknown language");
                ExecutionOutcome::infrastructure(&e)
            }
        }
    }

    /// Static import scan; never executes anything.
    pub fn analyze_dependencies(&self, language: Language, source: &str) -> DependencySet {
        match self.registry.get(language) {
            Some(adapter) => adapter.analyze_dependencies(source),
            None => deps::scan(language, source),
        }
    }

    /// Install a package with the language's package manager. Not retried.
    pub async fn add_dependency(&self, language: Language, package: &str) -> Result<ToolReport> {
        debug!(%language, package, "Adding dependency");
        self.adapter(language)?
            .add_dependency(&self.ctx, package)
            .await
    }

    pub async fn toolchain_info(&self, language: Language) -> Result<ToolchainInfo> {
        self.adapter(language)?.toolchain_info(&self.ctx).await
    }

    pub async fn format_source(&self, language: Language, source: &str) -> Result<FormatReport> {
        self.adapter(language)?.format_source(&self.ctx, source).await
    }

    pub async fn run_tests(&self, language: Language, source: &str) -> Result<ToolReport> {
        self.adapter(language)?.run_tests(&self.ctx, source).await
    }

    pub async fn lint(&self, language: Language, source: &str) -> Result<LintReport> {
        self.adapter(language)?.lint(&self.ctx, source).await
    }
}
