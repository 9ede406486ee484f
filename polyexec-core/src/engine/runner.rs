//! Bounded Process Runner
//!
//! Spawns exactly one child per call and races two completion signals:
//!
//! 1. the child exits *and* both output pipes reach EOF;
//! 2. the wall-clock deadline elapses.
//!
//! The race is a single `tokio::time::timeout` around the completion future,
//! so exactly one side produces the [`RunOutcome`]. When the deadline wins,
//! the completion future (and everything it buffered) is dropped, and the
//! child's whole process group receives `SIGKILL` before it is reaped.
//! The group is killed again once `run` returns or is dropped, so nothing
//! the child backgrounded outlives the call.
//!
//! Children are never started through a shell; arguments go straight to
//! `execve`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

const TRUNCATION_MARKER: &str = "\n... [output truncated]\n";

/// Everything needed to start one bounded child process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, which is then closed
    pub stdin: Option<String>,
    pub timeout: Duration,
    /// Per-stream capture cap in bytes
    pub output_limit: usize,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            stdin: None,
            timeout,
            output_limit: 1024 * 1024,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: Option<String>) -> Self {
        self.stdin = input;
        self
    }

    pub fn output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }
}

/// Captured result of a child that exited on its own.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, as package managers report them.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Which completion signal won the race.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Exited(ProcessOutput),
    TimedOut { elapsed: Duration, budget: Duration },
}

impl RunOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Run `spec` to completion or until its deadline, whichever comes first.
pub async fn run(spec: ProcessSpec) -> Result<RunOutcome> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout can take down grandchildren too.
    #[cfg(unix)]
    cmd.process_group(0);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| EngineError::from_spawn(&spec.program, e))?;
    let pid = child.id();
    let _group = GroupGuard(pid);
    debug!(program = %spec.program, pid, timeout_ms = spec.timeout.as_millis() as u64, "Spawned child");

    if let (Some(input), Some(mut pipe)) = (spec.stdin, child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                // The child may exit without reading everything.
                debug!(error = %e, "stdin write ended early");
            }
            // Dropping the pipe closes it so blocking reads see EOF.
        });
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let limit = spec.output_limit;

    let completion = async {
        let (status, stdout, stderr) = tokio::try_join!(
            child.wait(),
            read_capped(stdout, limit),
            read_capped(stderr, limit)
        )?;
        Ok::<_, std::io::Error>((status, stdout, stderr))
    };

    let raced = tokio::time::timeout(spec.timeout, completion).await;
    match raced {
        Ok(Ok((status, stdout, stderr))) => {
            let elapsed = start.elapsed();
            debug!(
                program = %spec.program,
                exit_code = ?status.code(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Child exited"
            );
            Ok(RunOutcome::Exited(ProcessOutput {
                exit_code: status.code(),
                stdout,
                stderr,
                elapsed,
            }))
        }
        Ok(Err(source)) => {
            terminate_tree(&mut child, pid).await;
            Err(EngineError::ProcessIo {
                tool: spec.program,
                source,
            })
        }
        Err(_) => {
            terminate_tree(&mut child, pid).await;
            let elapsed = start.elapsed();
            info!(
                program = %spec.program,
                pid,
                budget_ms = spec.timeout.as_millis() as u64,
                "Deadline elapsed; child process group killed"
            );
            Ok(RunOutcome::TimedOut {
                elapsed,
                budget: spec.timeout,
            })
        }
    }
}

/// Kills whatever is left in the child's process group when dropped.
struct GroupGuard(Option<u32>);

impl Drop for GroupGuard {
    fn drop(&mut self) {
        kill_group(self.0);
    }
}

/// SIGKILL a process group; an already-empty group is fine.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => debug!(pid, "Killed leftover process group"),
            Err(Errno::ESRCH) => {}
            Err(e) => warn!(pid, error = %e, "killpg failed"),
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// SIGKILL the child's process group, then reap the child.
async fn terminate_tree(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill after group kill");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap killed child");
    }
}

/// Read a pipe to EOF, keeping at most `limit` bytes.
///
/// Bytes past the limit are drained and discarded so the child never blocks
/// on a full pipe.
async fn read_capped<R>(pipe: Option<R>, limit: usize) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(String::new());
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        if room > 0 {
            kept.extend_from_slice(&chunk[..n.min(room)]);
        }
        if n > room {
            truncated = true;
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout_ms: u64) -> ProcessSpec {
        ProcessSpec::new("sh", Duration::from_millis(timeout_ms))
            .arg("-c")
            .arg(script)
    }

    fn exited(outcome: RunOutcome) -> ProcessOutput {
        match outcome {
            RunOutcome::Exited(output) => output,
            other => panic!("expected natural exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let output = exited(run(sh("echo out; echo err >&2", 5_000)).await.unwrap());
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let output = exited(run(sh("exit 3", 5_000)).await.unwrap());
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_stdin_is_written_and_closed() {
        let spec = ProcessSpec::new("cat", Duration::from_secs(5)).stdin(Some("abc\n".into()));
        let output = exited(run(spec).await.unwrap());
        assert_eq!(output.stdout, "abc\n");
    }

    #[tokio::test]
    async fn test_absent_stdin_reads_eof() {
        let output = exited(run(ProcessSpec::new("cat", Duration::from_secs(5))).await.unwrap());
        assert_eq!(output.stdout, "");
        assert_eq!(output.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_deadline_wins_over_slow_child() {
        let start = Instant::now();
        let outcome = run(sh("echo partial; sleep 30", 300)).await.unwrap();
        assert!(outcome.timed_out());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    /// Read the pid a script saved and wait for that process to die.
    async fn background_pid_is_gone(pid_file: &std::path::Path) -> (u32, bool) {
        let pid: u32 = std::fs::read_to_string(pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        // Dead, or a zombie waiting for init to reap it.
        let stat = format!("/proc/{pid}/stat");
        for _ in 0..50 {
            match std::fs::read_to_string(&stat) {
                Err(_) => return (pid, true),
                Ok(s) if s.contains(") Z ") => return (pid, true),
                Ok(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        (pid, false)
    }

    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let outcome = run(sh(&script, 500)).await.unwrap();
        assert!(outcome.timed_out());

        let (pid, gone) = background_pid_is_gone(&pid_file).await;
        assert!(gone, "grandchild {pid} survived the timeout");
    }

    #[tokio::test]
    async fn test_detached_background_job_dies_with_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        let script = format!("sleep 30 >/dev/null 2>&1 & echo $! > {}", pid_file.display());

        let output = exited(run(sh(&script, 5_000)).await.unwrap());
        assert!(output.success());

        let (pid, gone) = background_pid_is_gone(&pid_file).await;
        assert!(gone, "background job {pid} outlived a clean exit");
    }

    #[tokio::test]
    async fn test_dropping_run_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("orphan.pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(500), run(sh(&script, 30_000))).await;
        assert!(abandoned.is_err());

        let (pid, gone) = background_pid_is_gone(&pid_file).await;
        assert!(gone, "grandchild {pid} survived the dropped call");
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = run(ProcessSpec::new(
            "polyexec-definitely-not-installed",
            Duration::from_secs(1),
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let spec = sh("head -c 100000 /dev/zero | tr '\\0' 'a'", 5_000).output_limit(1_000);
        let output = exited(run(spec).await.unwrap());
        assert!(output.stdout.starts_with(&"a".repeat(1_000)));
        assert!(output.stdout.ends_with(TRUNCATION_MARKER));
        assert_eq!(output.stdout.len(), 1_000 + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("echo \"$GREETING\"; pwd", 5_000)
            .env("GREETING", "hola")
            .current_dir(dir.path());
        let output = exited(run(spec).await.unwrap());
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("hola"));
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
    }
}
