//! Python 3. The interpreter runs the source file directly with bytecode
//! caching off, so nothing but the source lands in the scratch directory.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    query_version, run_tool, validate_package_spec, AdapterContext, LintIssue, LintReport,
    Severity, ToolReport, ToolchainAdapter, ToolchainInfo,
};
use crate::engine::report::AdapterOutcome;
use crate::engine::runner::{self, RunOutcome};
use crate::engine::workspace::ScratchArtifact;
use crate::engine::ExecutionRequest;
use crate::error::Result;
use crate::language::Language;

pub struct PythonAdapter;

/// One entry of `pylint --output-format=json`.
#[derive(Debug, Deserialize)]
struct PylintMessage {
    #[serde(rename = "type")]
    kind: String,
    line: u32,
    column: u32,
    message: String,
}

/// One entry of `pip list --format=json`.
#[derive(Debug, Deserialize)]
struct PipPackage {
    name: String,
    version: String,
}

fn lint_failure(message: impl Into<String>) -> LintReport {
    LintReport {
        issues: vec![LintIssue {
            line: 1,
            column: 0,
            message: message.into(),
            severity: Severity::Error,
        }],
    }
}

fn parse_pylint(stdout: &str, artifact: &ScratchArtifact) -> LintReport {
    if stdout.trim().is_empty() {
        return LintReport::default();
    }
    match serde_json::from_str::<Vec<PylintMessage>>(stdout) {
        Ok(messages) => LintReport {
            issues: messages
                .into_iter()
                .map(|m| LintIssue {
                    line: m.line,
                    column: m.column,
                    message: artifact.scrub(&m.message),
                    severity: match m.kind.as_str() {
                        "error" | "fatal" => Severity::Error,
                        _ => Severity::Warning,
                    },
                })
                .collect(),
        },
        Err(e) => {
            warn!(error = %e, "Unreadable pylint output");
            lint_failure("pylint produced unreadable output")
        }
    }
}

#[async_trait]
impl ToolchainAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn source_suffix(&self, _request: &ExecutionRequest) -> &'static str {
        ".py"
    }

    async fn execute(
        &self,
        ctx: &AdapterContext,
        artifact: &mut ScratchArtifact,
        request: &ExecutionRequest,
    ) -> Result<AdapterOutcome> {
        let run = ctx
            .process(
                &ctx.config.tools.python,
                ctx.config.timeouts.run_budget(self.language().family()),
            )
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONUNBUFFERED", "1")
            .stdin(request.stdin.clone());
        Ok(AdapterOutcome::Ran(runner::run(run).await?))
    }

    async fn add_dependency(&self, ctx: &AdapterContext, package: &str) -> Result<ToolReport> {
        let package = validate_package_spec(package)?;
        let install = ctx
            .package_process(&ctx.config.tools.pip)
            .args(["install", "--disable-pip-version-check"])
            .arg(package);
        run_tool(install, None).await
    }

    async fn toolchain_info(&self, ctx: &AdapterContext) -> Result<ToolchainInfo> {
        let version = query_version(ctx, &ctx.config.tools.python, "--version").await?;

        let list = ctx
            .process(&ctx.config.tools.pip, ctx.config.timeouts.auxiliary())
            .args(["list", "--format=json", "--disable-pip-version-check"]);
        let modules = match runner::run(list).await {
            Ok(RunOutcome::Exited(output)) if output.success() => {
                serde_json::from_str::<Vec<PipPackage>>(&output.stdout)
                    .map(|packages| {
                        packages
                            .into_iter()
                            .map(|p| format!("{}=={}", p.name, p.version))
                            .collect()
                    })
                    .unwrap_or_default()
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "pip unavailable; reporting no packages");
                Vec::new()
            }
        };

        Ok(ToolchainInfo { version, modules })
    }

    async fn lint(&self, ctx: &AdapterContext, source: &str) -> Result<LintReport> {
        let artifact = ctx
            .workspace
            .acquire(self.language().family(), ".py", source)?;
        let spec = ctx
            .process(&ctx.config.tools.pylint, ctx.config.timeouts.auxiliary())
            .arg("--output-format=json")
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir())
            .env("PYTHONDONTWRITEBYTECODE", "1");

        // pylint's exit status is a bitmask of message categories, so only
        // stdout decides the report.
        let report = runner::run(spec).await.map(|outcome| match outcome {
            RunOutcome::Exited(output) => parse_pylint(&output.stdout, &artifact),
            RunOutcome::TimedOut { budget, .. } => {
                lint_failure(format!("pylint timed out after {} ms", budget.as_millis()))
            }
        });
        artifact.release();
        report
    }
}
