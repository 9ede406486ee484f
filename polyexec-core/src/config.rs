//! Engine Configuration
//!
//! Execution budgets are configuration, never request parameters, so a
//! caller cannot ask for unbounded execution. Values are read from an
//! optional JSON file and then overridden from the environment.
//!
//! ```json
//! {
//!   "scratch_root": "/var/tmp/polyexec",
//!   "timeouts": { "interpreted_scripting_run_ms": 3000 },
//!   "package_env": { "npm_config_registry": "https://registry.example.com" }
//! }
//! ```

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::language::{Language, LanguageFamily};

/// Wall-clock budgets, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Run budget for the compiled binary (build budget is derived from it)
    pub compiled_native_run_ms: u64,
    /// Run budget for the server-side scripting runtime
    pub interpreted_dynamic_run_ms: u64,
    /// Run budget for the general-purpose scripting interpreter
    pub interpreted_scripting_run_ms: u64,
    /// Build budget = run budget × this factor
    pub build_factor: u32,
    /// Budget for environment setup that precedes a run
    pub setup_ms: u64,
    /// Package-manager invocations; network fetch dominates
    pub package_manager_ms: u64,
    /// Test runners
    pub test_ms: u64,
    /// Formatters, linters and version queries
    pub auxiliary_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            compiled_native_run_ms: 5_000,
            interpreted_dynamic_run_ms: 5_000,
            interpreted_scripting_run_ms: 5_000,
            build_factor: 2,
            setup_ms: 1_000,
            package_manager_ms: 60_000,
            test_ms: 15_000,
            auxiliary_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn run_budget(&self, family: LanguageFamily) -> Duration {
        let ms = match family {
            LanguageFamily::CompiledNative => self.compiled_native_run_ms,
            LanguageFamily::InterpretedDynamic => self.interpreted_dynamic_run_ms,
            LanguageFamily::InterpretedScripting => self.interpreted_scripting_run_ms,
        };
        Duration::from_millis(ms)
    }

    /// Run budget times `build_factor`, saturating instead of overflowing.
    pub fn build_budget(&self, family: LanguageFamily) -> Duration {
        self.run_budget(family)
            .checked_mul(self.build_factor)
            .unwrap_or(Duration::MAX)
    }

    pub fn setup(&self) -> Duration {
        Duration::from_millis(self.setup_ms)
    }

    pub fn package_manager(&self) -> Duration {
        Duration::from_millis(self.package_manager_ms)
    }

    pub fn tests(&self) -> Duration {
        Duration::from_millis(self.test_ms)
    }

    pub fn auxiliary(&self) -> Duration {
        Duration::from_millis(self.auxiliary_ms)
    }

    /// Apply the same run budget to every family.
    pub fn set_all_run_ms(&mut self, ms: u64) {
        self.compiled_native_run_ms = ms;
        self.interpreted_dynamic_run_ms = ms;
        self.interpreted_scripting_run_ms = ms;
    }
}

/// Executable names or absolute paths for every external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub go: String,
    pub gofmt: String,
    pub node: String,
    pub npm: String,
    pub python: String,
    pub pip: String,
    pub pylint: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            go: "go".into(),
            gofmt: "gofmt".into(),
            node: "node".into(),
            npm: "npm".into(),
            python: "python3".into(),
            pip: "pip".into(),
            pylint: "pylint".into(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of the scratch area; each family gets its own subdirectory
    pub scratch_root: PathBuf,
    pub timeouts: TimeoutConfig,
    pub tools: ToolPaths,
    /// Per-stream cap on captured output
    pub max_output_bytes: usize,
    /// Extra environment for package-manager processes
    pub package_env: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("polyexec"),
            timeouts: TimeoutConfig::default(),
            tools: ToolPaths::default(),
            max_output_bytes: 1024 * 1024,
            package_env: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Resolve the effective configuration: file (if any), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override values from `POLYEXEC_*` variables, looked up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("POLYEXEC_SCRATCH_DIR") {
            self.scratch_root = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("POLYEXEC_RUN_TIMEOUT_MS") {
            let ms = ms
                .trim()
                .parse()
                .with_context(|| format!("POLYEXEC_RUN_TIMEOUT_MS is not a number: {ms}"))?;
            self.timeouts.set_all_run_ms(ms);
        }
        if let Some(ms) = lookup("POLYEXEC_PACKAGE_TIMEOUT_MS") {
            self.timeouts.package_manager_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("POLYEXEC_PACKAGE_TIMEOUT_MS is not a number: {ms}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        for (name, ms) in [
            ("compiled_native_run_ms", t.compiled_native_run_ms),
            ("interpreted_dynamic_run_ms", t.interpreted_dynamic_run_ms),
            ("interpreted_scripting_run_ms", t.interpreted_scripting_run_ms),
            ("setup_ms", t.setup_ms),
            ("package_manager_ms", t.package_manager_ms),
            ("test_ms", t.test_ms),
            ("auxiliary_ms", t.auxiliary_ms),
        ] {
            ensure!(ms > 0, "timeouts.{name} must be greater than zero");
        }
        ensure!(t.build_factor >= 1, "timeouts.build_factor must be at least 1");
        for family in Language::ALL.map(Language::family) {
            let run_ms = t.run_budget(family).as_millis();
            ensure!(
                run_ms * u128::from(t.build_factor) <= u128::from(u64::MAX),
                "timeouts.build_factor overflows the {family} build budget"
            );
        }
        ensure!(self.max_output_bytes > 0, "max_output_bytes must be greater than zero");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_source_budgets() {
        let config = EngineConfig::default();
        let t = &config.timeouts;
        assert_eq!(t.run_budget(LanguageFamily::InterpretedScripting), Duration::from_secs(5));
        assert_eq!(t.build_budget(LanguageFamily::CompiledNative), Duration::from_secs(10));
        assert_eq!(t.package_manager(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"timeouts":{"interpreted_scripting_run_ms":1500}}"#)
                .unwrap();
        assert_eq!(config.timeouts.interpreted_scripting_run_ms, 1500);
        assert_eq!(config.timeouts.compiled_native_run_ms, 5_000);
        assert_eq!(config.tools.python, "python3");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("POLYEXEC_SCRATCH_DIR", "/srv/scratch"),
            ("POLYEXEC_RUN_TIMEOUT_MS", "2000"),
            ("POLYEXEC_PACKAGE_TIMEOUT_MS", "30000"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.scratch_root, PathBuf::from("/srv/scratch"));
        assert_eq!(config.timeouts.compiled_native_run_ms, 2000);
        assert_eq!(config.timeouts.interpreted_dynamic_run_ms, 2000);
        assert_eq!(config.timeouts.package_manager_ms, 30_000);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = EngineConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "POLYEXEC_RUN_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = EngineConfig::default();
        config.timeouts.setup_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.timeouts.build_factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overflowing_build_budget_rejected() {
        let mut config = EngineConfig::default();
        config.timeouts.compiled_native_run_ms = u64::MAX;
        assert!(config.validate().is_err());
        config.timeouts.build_factor = u32::MAX;
        assert_eq!(
            config.timeouts.build_budget(LanguageFamily::CompiledNative),
            Duration::MAX
        );

        let config: EngineConfig =
            serde_json::from_str(r#"{"timeouts":{"build_factor":4294967295}}"#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.timeouts.build_budget(LanguageFamily::CompiledNative),
            Duration::from_millis(5_000 * 4_294_967_295)
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polyexec.json");
        std::fs::write(&path, r#"{"max_output_bytes": 4096}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_output_bytes, 4096);

        assert!(EngineConfig::from_file(&dir.path().join("missing.json")).is_err());
    }
}
