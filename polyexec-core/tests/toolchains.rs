//! End-to-end runs against real toolchains.
//!
//! Each test checks for its tool first and returns early when it is not on
//! `PATH`, so the suite stays green on hosts with only some languages
//! installed.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use polyexec_core::{
    Engine, EngineConfig, ExecutionRequest, Language, LanguageFamily, ModuleMode, OutcomeStatus,
};

fn available(tool: &str, flag: &str) -> bool {
    let found = Command::new(tool)
        .arg(flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !found {
        eprintln!("skipping: {tool} not available");
    }
    found
}

fn engine_in(root: &Path) -> Engine {
    let mut config = EngineConfig::default();
    config.scratch_root = root.to_path_buf();
    Engine::new(config)
}

fn assert_scratch_empty(engine: &Engine, family: LanguageFamily) {
    let leftovers = fs::read_dir(engine.workspace().family_dir(family))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0, "scratch left behind for {family}");
}

// ---------------------------------------------------------------------------
// Python
// ---------------------------------------------------------------------------

#[tokio::test]
async fn python_hello_world() {
    if !available("python3", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let outcome = engine
        .execute_named("python", "print('Hello World!')", None)
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert_eq!(outcome.stdout(), "Hello World!\n");
    assert!(outcome.diagnostic().is_none());
    assert_scratch_empty(&engine, LanguageFamily::InterpretedScripting);
}

#[tokio::test]
async fn python_runtime_error_is_tool_error_with_scrubbed_traceback() {
    if !available("python3", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let outcome = engine
        .execute(ExecutionRequest::new(Language::Python, "print('before')\nundefined_name\n"))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::ToolError);
    assert_eq!(outcome.stdout(), "before\n");
    let diagnostic = outcome.diagnostic().unwrap();
    assert!(diagnostic.contains("NameError"));
    assert!(diagnostic.contains("main.py"));
    assert!(!diagnostic.contains(&dir.path().to_string_lossy().to_string()));
    assert_scratch_empty(&engine, LanguageFamily::InterpretedScripting);
}

#[tokio::test]
async fn python_reads_stdin() {
    if !available("python3", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let request = ExecutionRequest::new(
        Language::Python,
        "import sys\nprint(sum(int(x) for x in sys.stdin.read().split()))\n",
    )
    .with_stdin("1 2 3 4\n");
    let outcome = engine.execute(request).await;

    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert_eq!(outcome.stdout(), "10\n");
}

#[tokio::test]
async fn python_infinite_loop_times_out() {
    if !available("python3", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_root = dir.path().to_path_buf();
    config.timeouts.interpreted_scripting_run_ms = 1_000;
    let engine = Engine::new(config);

    let start = Instant::now();
    let outcome = engine
        .execute(ExecutionRequest::new(
            Language::Python,
            "print('spinning', flush=True)\nwhile True:\n    pass\n",
        ))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Timeout);
    assert!(outcome.stdout().is_empty());
    assert_eq!(
        outcome.diagnostic(),
        Some("execution exceeded the 1000 ms time limit")
    );
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_scratch_empty(&engine, LanguageFamily::InterpretedScripting);
}

#[tokio::test]
async fn identical_concurrent_requests_are_isolated() {
    if !available("python3", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let program = "import os\nprint(len(os.listdir('.')))\n";
    let (a, b) = tokio::join!(
        engine.execute(ExecutionRequest::new(Language::Python, program)),
        engine.execute(ExecutionRequest::new(Language::Python, program)),
    );

    // Each run sees only its own source file.
    for outcome in [a, b] {
        assert_eq!(outcome.status(), OutcomeStatus::Success);
        assert_eq!(outcome.stdout(), "1\n");
    }
    assert_scratch_empty(&engine, LanguageFamily::InterpretedScripting);
}

// ---------------------------------------------------------------------------
// JavaScript
// ---------------------------------------------------------------------------

#[tokio::test]
async fn javascript_module_mode() {
    if !available("node", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let source = "import { platform } from 'node:os';\nconsole.log(typeof platform());\n";
    let outcome = engine
        .execute(ExecutionRequest::new(Language::JavaScript, source))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert_eq!(outcome.stdout(), "string\n");
    assert_scratch_empty(&engine, LanguageFamily::InterpretedDynamic);
}

#[tokio::test]
async fn javascript_commonjs_mode() {
    if !available("node", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let request = ExecutionRequest::new(
        Language::JavaScript,
        "const path = require('path');\nconsole.log(path.extname(__filename));\n",
    )
    .with_module_mode(ModuleMode::CommonJs);
    let outcome = engine.execute(request).await;

    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert_eq!(outcome.stdout(), ".js\n");
}

#[tokio::test]
async fn javascript_uncaught_throw_is_tool_error() {
    if !available("node", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let outcome = engine
        .execute(ExecutionRequest::new(
            Language::JavaScript,
            "console.log('before');\nthrow new Error('boom');\n",
        ))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::ToolError);
    assert_eq!(outcome.stdout(), "before\n");
    let diagnostic = outcome.diagnostic().unwrap();
    assert!(diagnostic.contains("boom"));
    assert!(diagnostic.contains("main.mjs"));
    assert!(!diagnostic.contains(&dir.path().to_string_lossy().to_string()));
    assert_scratch_empty(&engine, LanguageFamily::InterpretedDynamic);
}

#[tokio::test]
async fn javascript_busy_loop_times_out() {
    if !available("node", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_root = dir.path().to_path_buf();
    config.timeouts.interpreted_dynamic_run_ms = 1_000;
    let engine = Engine::new(config);

    let start = Instant::now();
    let outcome = engine
        .execute(ExecutionRequest::new(Language::JavaScript, "while (true) {}\n"))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Timeout);
    assert!(outcome.stdout().is_empty());
    assert_eq!(
        outcome.diagnostic(),
        Some("execution exceeded the 1000 ms time limit")
    );
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_scratch_empty(&engine, LanguageFamily::InterpretedDynamic);
}

#[tokio::test]
async fn npm_install_against_unreachable_registry_fails_once() {
    if !available("npm", "--version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_root = dir.path().to_path_buf();
    config.timeouts.package_manager_ms = 30_000;
    for (key, value) in [
        ("npm_config_registry", "http://127.0.0.1:9/"),
        ("npm_config_fetch_retries", "0"),
        ("npm_config_audit", "false"),
        ("npm_config_fund", "false"),
    ] {
        config.package_env.insert(key.into(), value.into());
    }
    config.package_env.insert(
        "npm_config_cache".into(),
        cache.path().to_string_lossy().into_owned(),
    );
    let engine = Engine::new(config);

    let report = engine
        .add_dependency(Language::JavaScript, "left-pad")
        .await
        .unwrap();

    assert!(!report.success);
    assert!(!report.raw_output.is_empty());
    assert_scratch_empty(&engine, LanguageFamily::InterpretedDynamic);
}

// ---------------------------------------------------------------------------
// Go
// ---------------------------------------------------------------------------

#[tokio::test]
async fn go_hello_world() {
    if !available("go", "version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_root = dir.path().to_path_buf();
    // Cold build caches can be slow.
    config.timeouts.build_factor = 12;
    let engine = Engine::new(config);

    let source = "package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println(\"Hello World!\") }\n";
    let outcome = engine
        .execute(ExecutionRequest::new(Language::Go, source))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert_eq!(outcome.stdout(), "Hello World!\n");
    assert_scratch_empty(&engine, LanguageFamily::CompiledNative);
}

#[tokio::test]
async fn go_compile_error_never_runs() {
    if !available("go", "version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_root = dir.path().to_path_buf();
    config.timeouts.build_factor = 12;
    let engine = Engine::new(config);

    let source = "package main\n\nfunc main() { undefinedThing() }\n";
    let outcome = engine
        .execute(ExecutionRequest::new(Language::Go, source))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::ToolError);
    assert!(outcome.stdout().is_empty());
    let diagnostic = outcome.diagnostic().unwrap();
    assert!(diagnostic.contains("undefined"));
    assert!(!diagnostic.contains(&dir.path().to_string_lossy().to_string()));
    assert_scratch_empty(&engine, LanguageFamily::CompiledNative);
}

#[tokio::test]
async fn go_infinite_loop_hits_run_budget() {
    if !available("go", "version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.scratch_root = dir.path().to_path_buf();
    config.timeouts.compiled_native_run_ms = 2_000;
    config.timeouts.build_factor = 30;
    let engine = Engine::new(config);

    let source = "package main\n\nfunc main() {\n\tfor {\n\t}\n}\n";
    let outcome = engine
        .execute(ExecutionRequest::new(Language::Go, source))
        .await;

    assert_eq!(outcome.status(), OutcomeStatus::Timeout);
    assert_eq!(
        outcome.diagnostic(),
        Some("execution exceeded the 2000 ms time limit")
    );
    assert_scratch_empty(&engine, LanguageFamily::CompiledNative);
}

#[tokio::test]
async fn gofmt_formats_source() {
    if !available("go", "version") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let report = match engine
        .format_source(Language::Go, "package main\nfunc main(){}\n")
        .await
    {
        Ok(report) => report,
        // gofmt missing while go exists
        Err(_) => return,
    };
    assert!(report.success);
    assert_eq!(report.formatted, "package main\n\nfunc main() {}\n");
    assert!(report.error.is_none());
}
