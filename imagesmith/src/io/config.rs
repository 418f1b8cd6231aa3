//! Configuration stored under `.imagesmith/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Canonical config location relative to the project root.
pub const CONFIG_PATH: &str = ".imagesmith/config.toml";

/// How a run that is still going after `run_duration_secs` is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Treat the run as successful with an unknown exit status.
    Success,
    /// Record the timeout as the attempt's error and refine.
    Failure,
}

/// When the feedback critique is requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// At the start of every epoch, including before the first attempt.
    Always,
    /// Only once a failing attempt exists, right before refining it.
    AfterFailure,
}

/// imagesmith configuration (TOML).
///
/// Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SmithConfig {
    /// Upper bound on build attempts per task.
    pub max_epochs: u32,

    /// How long a container may run before the attempt is judged.
    pub run_duration_secs: u64,

    pub timeout_policy: TimeoutPolicy,

    pub feedback: FeedbackMode,

    /// Fail attempts whose container exits with a non-zero status.
    pub require_zero_exit: bool,

    /// Parent directory for per-attempt build contexts.
    pub work_dir: PathBuf,

    /// Location of the single live recipe.
    pub recipe_path: PathBuf,

    pub runtime: RuntimeConfig,

    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Container CLI invocation prefix (e.g. `["docker"]` or `["podman"]`).
    pub command: Vec<String>,
    /// Hard limit for build/run/stop/remove commands.
    pub command_timeout_secs: u64,
    /// Truncate captured runtime output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: vec!["docker".to_string()],
            command_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that reads a prompt on stdin and prints the response on stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for SmithConfig {
    fn default() -> Self {
        Self {
            max_epochs: 3,
            run_duration_secs: 5,
            timeout_policy: TimeoutPolicy::Success,
            feedback: FeedbackMode::Always,
            require_zero_exit: true,
            work_dir: PathBuf::from(".imagesmith/work"),
            recipe_path: PathBuf::from(".imagesmith/Dockerfile"),
            runtime: RuntimeConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl SmithConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_epochs == 0 {
            return Err(anyhow!("max_epochs must be > 0"));
        }
        if self.run_duration_secs == 0 {
            return Err(anyhow!("run_duration_secs must be > 0"));
        }
        if self.runtime.command_timeout_secs == 0 {
            return Err(anyhow!("runtime.command_timeout_secs must be > 0"));
        }
        if self.runtime.output_limit_bytes == 0 {
            return Err(anyhow!("runtime.output_limit_bytes must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        check_command("runtime.command", &self.runtime.command)?;
        check_command("generator.command", &self.generator.command)?;
        Ok(())
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_duration_secs)
    }

    /// Resolve relative paths against `root`.
    pub fn rooted(mut self, root: &Path) -> Self {
        if self.work_dir.is_relative() {
            self.work_dir = root.join(&self.work_dir);
        }
        if self.recipe_path.is_relative() {
            self.recipe_path = root.join(&self.recipe_path);
        }
        self
    }
}

fn check_command(label: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{label} must be a non-empty array")),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SmithConfig::default()`.
pub fn load_config(path: &Path) -> Result<SmithConfig> {
    if !path.exists() {
        let cfg = SmithConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SmithConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SmithConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SmithConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = SmithConfig {
            max_epochs: 5,
            timeout_policy: TimeoutPolicy::Failure,
            feedback: FeedbackMode::AfterFailure,
            ..SmithConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "max_epochs = 7\ntimeout_policy = \"failure\"\n\n[runtime]\ncommand = [\"podman\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_epochs, 7);
        assert_eq!(cfg.timeout_policy, TimeoutPolicy::Failure);
        assert_eq!(cfg.runtime.command, vec!["podman".to_string()]);
        assert_eq!(cfg.runtime.command_timeout_secs, 600);
        assert_eq!(cfg.run_duration_secs, 5);
    }

    #[test]
    fn zero_epochs_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_epochs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_epochs"));
    }

    #[test]
    fn empty_runtime_command_is_rejected() {
        let cfg = SmithConfig {
            runtime: RuntimeConfig {
                command: Vec::new(),
                ..RuntimeConfig::default()
            },
            ..SmithConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("runtime.command"));
    }

    #[test]
    fn rooted_resolves_relative_paths_only() {
        let cfg = SmithConfig {
            recipe_path: PathBuf::from("/abs/Dockerfile"),
            ..SmithConfig::default()
        }
        .rooted(Path::new("/project"));
        assert_eq!(cfg.work_dir, PathBuf::from("/project/.imagesmith/work"));
        assert_eq!(cfg.recipe_path, PathBuf::from("/abs/Dockerfile"));
    }
}
