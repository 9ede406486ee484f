//! Go: the only compiled-native language. Source is built into a binary
//! inside the scratch directory and the binary is then run on its own
//! budget. A failed or timed-out build short-circuits the run.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    query_version, run_tool, validate_package_spec, AdapterContext, FormatReport, ToolReport,
    ToolchainAdapter, ToolchainInfo,
};
use crate::engine::report::AdapterOutcome;
use crate::engine::runner::{self, RunOutcome};
use crate::engine::workspace::ScratchArtifact;
use crate::engine::ExecutionRequest;
use crate::error::Result;
use crate::language::Language;

/// Module path used by the throwaway module `add_dependency` creates.
const SCRATCH_MODULE: &str = "polyexec.local/scratch";

pub struct GoAdapter;

#[async_trait]
impl ToolchainAdapter for GoAdapter {
    fn language(&self) -> Language {
        Language::Go
    }

    fn source_suffix(&self, _request: &ExecutionRequest) -> &'static str {
        ".go"
    }

    async fn execute(
        &self,
        ctx: &AdapterContext,
        artifact: &mut ScratchArtifact,
        request: &ExecutionRequest,
    ) -> Result<AdapterOutcome> {
        let family = self.language().family();
        let timeouts = &ctx.config.timeouts;
        let binary = artifact.reserve_built_artifact();

        let build = ctx
            .process(&ctx.config.tools.go, timeouts.build_budget(family))
            .arg("build")
            .arg("-o")
            .arg(&binary)
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir());

        match runner::run(build).await? {
            RunOutcome::TimedOut { budget, .. } => {
                info!(token = %artifact.token(), "Go build exceeded its budget");
                return Ok(AdapterOutcome::BuildTimedOut { budget });
            }
            RunOutcome::Exited(output) if !output.success() => {
                debug!(token = %artifact.token(), exit_code = ?output.exit_code, "Go build failed");
                return Ok(AdapterOutcome::BuildFailed(output));
            }
            RunOutcome::Exited(output) => {
                debug!(elapsed_ms = output.elapsed.as_millis() as u64, "Go build finished");
            }
        }

        let program = binary.to_string_lossy().into_owned();
        let run = ctx
            .process(&program, timeouts.run_budget(family))
            .current_dir(artifact.root_dir())
            .stdin(request.stdin.clone());
        Ok(AdapterOutcome::Ran(runner::run(run).await?))
    }

    async fn add_dependency(&self, ctx: &AdapterContext, package: &str) -> Result<ToolReport> {
        let package = validate_package_spec(package)?;
        let go = &ctx.config.tools.go;

        // `go get` needs a module to record the requirement in.
        let artifact = ctx.workspace.acquire(
            self.language().family(),
            ".go",
            "package scratch\n",
        )?;
        let init = ctx
            .package_process(go)
            .args(["mod", "init", SCRATCH_MODULE])
            .current_dir(artifact.root_dir());
        let init_report = run_tool(init, Some(&artifact)).await?;
        if !init_report.success {
            artifact.release();
            return Ok(init_report);
        }

        let get = ctx
            .package_process(go)
            .arg("get")
            .arg(package)
            .current_dir(artifact.root_dir());
        let report = run_tool(get, Some(&artifact)).await;
        artifact.release();
        report
    }

    async fn toolchain_info(&self, ctx: &AdapterContext) -> Result<ToolchainInfo> {
        let go = &ctx.config.tools.go;
        let version = query_version(ctx, go, "version").await?;

        let list = ctx
            .process(go, ctx.config.timeouts.auxiliary())
            .args(["list", "-m", "all"]);
        let modules = match runner::run(list).await? {
            RunOutcome::Exited(output) if output.success() => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            // Outside a module there is nothing to list.
            _ => Vec::new(),
        };

        Ok(ToolchainInfo { version, modules })
    }

    async fn format_source(&self, ctx: &AdapterContext, source: &str) -> Result<FormatReport> {
        let artifact = ctx
            .workspace
            .acquire(self.language().family(), ".go", source)?;
        let spec = ctx
            .process(&ctx.config.tools.gofmt, ctx.config.timeouts.auxiliary())
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir());

        let result = runner::run(spec).await;
        let report = result.map(|outcome| match outcome {
            RunOutcome::Exited(output) if output.success() => FormatReport {
                success: true,
                formatted: output.stdout,
                error: None,
            },
            RunOutcome::Exited(output) => FormatReport {
                success: false,
                formatted: source.to_string(),
                error: Some(artifact.scrub(&output.stderr)),
            },
            RunOutcome::TimedOut { budget, .. } => FormatReport {
                success: false,
                formatted: source.to_string(),
                error: Some(format!("gofmt timed out after {} ms", budget.as_millis())),
            },
        });
        artifact.release();
        report
    }

    async fn run_tests(&self, ctx: &AdapterContext, source: &str) -> Result<ToolReport> {
        let artifact = ctx
            .workspace
            .acquire(self.language().family(), "_test.go", source)?;
        let spec = ctx
            .process(&ctx.config.tools.go, ctx.config.timeouts.tests())
            .args(["test", "-v"])
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir());
        let report = run_tool(spec, Some(&artifact)).await;
        artifact.release();
        report
    }
}
