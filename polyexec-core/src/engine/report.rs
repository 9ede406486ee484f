//! Result Reporter
//!
//! Folds every way a request can end (process exit, build short-circuit,
//! deadline, infrastructure failure) into one [`ExecutionOutcome`].
//! `diagnostic` is present exactly when the status is not `Success`, and no
//! text leaves this module without passing through
//! [`ScratchArtifact::scrub`](super::workspace::ScratchArtifact::scrub).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::runner::{ProcessOutput, RunOutcome};
use super::workspace::ScratchArtifact;
use crate::error::EngineError;

/// Closed set of request outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    ToolError,
    Timeout,
    InfrastructureError,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::ToolError => "tool_error",
            Self::Timeout => "timeout",
            Self::InfrastructureError => "infrastructure_error",
        })
    }
}

/// The single, immutable result of one execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcome")]
pub struct ExecutionOutcome {
    status: OutcomeStatus,
    stdout: String,
    stderr: String,
    diagnostic: Option<String>,
}

#[derive(Deserialize)]
struct RawOutcome {
    status: OutcomeStatus,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    diagnostic: Option<String>,
}

impl TryFrom<RawOutcome> for ExecutionOutcome {
    type Error = String;

    fn try_from(raw: RawOutcome) -> Result<Self, Self::Error> {
        let has_diagnostic = raw
            .diagnostic
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        match (raw.status, has_diagnostic) {
            (OutcomeStatus::Success, true) => {
                Err("a success outcome cannot carry a diagnostic".to_string())
            }
            (status, false) if status != OutcomeStatus::Success => {
                Err(format!("a {status} outcome needs a diagnostic"))
            }
            _ => Ok(Self {
                status: raw.status,
                stdout: raw.stdout,
                stderr: raw.stderr,
                diagnostic: raw.diagnostic.filter(|_| has_diagnostic),
            }),
        }
    }
}

impl ExecutionOutcome {
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            status: OutcomeStatus::Success,
            stdout,
            stderr,
            diagnostic: None,
        }
    }

    pub fn tool_error(stdout: String, stderr: String, diagnostic: String) -> Self {
        Self {
            status: OutcomeStatus::ToolError,
            stdout,
            stderr,
            diagnostic: Some(non_empty(diagnostic, "tool reported an error")),
        }
    }

    pub fn timeout(diagnostic: String) -> Self {
        Self {
            status: OutcomeStatus::Timeout,
            stdout: String::new(),
            stderr: String::new(),
            diagnostic: Some(non_empty(diagnostic, "time limit exceeded")),
        }
    }

    pub fn infrastructure(err: &EngineError) -> Self {
        Self {
            status: OutcomeStatus::InfrastructureError,
            stdout: String::new(),
            stderr: String::new(),
            diagnostic: Some(err.to_string()),
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    fn scrubbed(self, artifact: &ScratchArtifact) -> Self {
        Self {
            status: self.status,
            stdout: artifact.scrub(&self.stdout),
            stderr: artifact.scrub(&self.stderr),
            diagnostic: self.diagnostic.map(|d| artifact.scrub(&d)),
        }
    }
}

fn non_empty(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

/// What an adapter hands back before reporting.
#[derive(Debug)]
pub enum AdapterOutcome {
    /// The program itself ran; this is the runner's verdict on it.
    Ran(RunOutcome),
    /// The build step failed; the program was never run.
    BuildFailed(ProcessOutput),
    /// The build step hit its own deadline.
    BuildTimedOut { budget: Duration },
}

/// Render the final outcome for one request.
pub fn render(
    result: Result<AdapterOutcome, EngineError>,
    artifact: &ScratchArtifact,
) -> ExecutionOutcome {
    let outcome = match result {
        Ok(AdapterOutcome::Ran(RunOutcome::Exited(output))) => from_exit(output),
        Ok(AdapterOutcome::Ran(RunOutcome::TimedOut { budget, .. })) => {
            ExecutionOutcome::timeout(format!(
                "execution exceeded the {} ms time limit",
                budget.as_millis()
            ))
        }
        Ok(AdapterOutcome::BuildFailed(output)) => {
            let diagnostic = if output.stderr.trim().is_empty() {
                output.stdout.clone()
            } else {
                output.stderr.clone()
            };
            ExecutionOutcome::tool_error(String::new(), output.stderr, diagnostic)
        }
        Ok(AdapterOutcome::BuildTimedOut { budget }) => ExecutionOutcome::timeout(format!(
            "compilation exceeded the {} ms time limit",
            budget.as_millis()
        )),
        Err(err) => ExecutionOutcome::infrastructure(&err),
    };
    outcome.scrubbed(artifact)
}

/// Success needs a zero exit code and a silent error stream.
fn from_exit(output: ProcessOutput) -> ExecutionOutcome {
    if output.success() && output.stderr.is_empty() {
        return ExecutionOutcome::success(output.stdout, output.stderr);
    }

    let diagnostic = if !output.stderr.trim().is_empty() {
        output.stderr.clone()
    } else {
        match output.exit_code {
            Some(code) => format!("process exited with status {code}"),
            None => "process terminated by a signal".to_string(),
        }
    };
    ExecutionOutcome::tool_error(output.stdout, output.stderr, diagnostic)
}
