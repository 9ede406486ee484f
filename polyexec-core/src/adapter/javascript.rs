//! JavaScript on Node.js. No build step; module-mode requests also get a
//! `package.json` declaring `"type": "module"` before the run starts.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use super::{
    query_version, run_tool, validate_package_spec, AdapterContext, ToolReport, ToolchainAdapter,
    ToolchainInfo,
};
use crate::engine::report::AdapterOutcome;
use crate::engine::runner::{self, RunOutcome};
use crate::engine::workspace::ScratchArtifact;
use crate::engine::ExecutionRequest;
use crate::error::{EngineError, Result};
use crate::language::{Language, ModuleMode};

pub struct JavaScriptAdapter;

/// Write `package.json` into `dir` under the setup budget.
async fn write_manifest(ctx: &AdapterContext, dir: &Path, manifest: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| EngineError::Setup(format!("could not encode package.json: {e}")))?;
    let budget = ctx.config.timeouts.setup();

    match tokio::time::timeout(budget, tokio::fs::write(dir.join("package.json"), bytes)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(EngineError::Setup(format!("could not write package.json: {e}"))),
        Err(_) => Err(EngineError::Setup(format!(
            "writing package.json exceeded {} ms",
            budget.as_millis()
        ))),
    }
}

/// `npm ls --json` output → `name@version` entries.
fn parse_npm_listing(stdout: &str) -> Vec<String> {
    let Ok(listing) = serde_json::from_str::<Value>(stdout) else {
        return Vec::new();
    };
    let Some(dependencies) = listing.get("dependencies").and_then(Value::as_object) else {
        return Vec::new();
    };
    dependencies
        .iter()
        .map(|(name, entry)| match entry.get("version").and_then(Value::as_str) {
            Some(version) => format!("{name}@{version}"),
            None => name.clone(),
        })
        .collect()
}

#[async_trait]
impl ToolchainAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn source_suffix(&self, request: &ExecutionRequest) -> &'static str {
        match request.module_mode {
            ModuleMode::Module => ".mjs",
            ModuleMode::CommonJs => ".js",
        }
    }

    async fn execute(
        &self,
        ctx: &AdapterContext,
        artifact: &mut ScratchArtifact,
        request: &ExecutionRequest,
    ) -> Result<AdapterOutcome> {
        if request.module_mode == ModuleMode::Module {
            write_manifest(ctx, artifact.root_dir(), &json!({ "type": "module" })).await?;
            debug!(token = %artifact.token(), "Wrote module-mode package.json");
        }

        let run = ctx
            .process(
                &ctx.config.tools.node,
                ctx.config.timeouts.run_budget(self.language().family()),
            )
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir())
            .stdin(request.stdin.clone());
        Ok(AdapterOutcome::Ran(runner::run(run).await?))
    }

    async fn add_dependency(&self, ctx: &AdapterContext, package: &str) -> Result<ToolReport> {
        let package = validate_package_spec(package)?;

        let artifact = ctx
            .workspace
            .acquire(self.language().family(), ".js", "")?;
        let manifest = json!({
            "name": "polyexec-scratch",
            "version": "1.0.0",
            "private": true,
        });
        write_manifest(ctx, artifact.root_dir(), &manifest).await?;

        let install = ctx
            .package_process(&ctx.config.tools.npm)
            .arg("install")
            .arg(package)
            .current_dir(artifact.root_dir());
        let report = run_tool(install, Some(&artifact)).await;
        artifact.release();
        report
    }

    async fn toolchain_info(&self, ctx: &AdapterContext) -> Result<ToolchainInfo> {
        let version = query_version(ctx, &ctx.config.tools.node, "--version").await?;

        let list = ctx
            .process(&ctx.config.tools.npm, ctx.config.timeouts.auxiliary())
            .args(["ls", "-g", "--depth=0", "--json"]);
        // npm exits non-zero on extraneous packages but still prints the tree.
        let modules = match runner::run(list).await {
            Ok(RunOutcome::Exited(output)) => parse_npm_listing(&output.stdout),
            Ok(RunOutcome::TimedOut { .. }) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "npm unavailable; reporting no global modules");
                Vec::new()
            }
        };

        Ok(ToolchainInfo { version, modules })
    }

    async fn run_tests(&self, ctx: &AdapterContext, source: &str) -> Result<ToolReport> {
        let artifact = ctx
            .workspace
            .acquire(self.language().family(), ".test.mjs", source)?;
        let spec = ctx
            .process(&ctx.config.tools.node, ctx.config.timeouts.tests())
            .arg("--test")
            .arg(artifact.source_path())
            .current_dir(artifact.root_dir());
        let report = run_tool(spec, Some(&artifact)).await;
        artifact.release();
        report
    }
}
