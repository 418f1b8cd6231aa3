//! [`ContainerRuntime`] backed by the docker CLI (or a compatible one such as
//! podman, via `runtime.command`).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, instrument};

use crate::core::types::BuildLogEntry;
use crate::io::config::RuntimeConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};
use crate::io::runtime::{BuiltImage, ContainerRuntime, RuntimeError};

/// Build-context file the CLI writes the image id into.
const IID_FILE_NAME: &str = "image.id";

/// Messages printed by the CLI when the daemon cannot be reached.
const UNREACHABLE_MARKERS: &[&str] = &[
    "cannot connect to the docker daemon",
    "is the docker daemon running",
    "error during connect",
    "permission denied while trying to connect",
];

/// BuildKit bookkeeping lines that carry no build output.
static STATUS_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^#\d+ (?:DONE \d|CACHED$|sha256:|transferring |resolve |extracting |naming to |writing image |exporting layers)",
    )
    .expect("valid status regex")
});

pub struct DockerCli {
    command: Vec<String>,
    command_timeout: Duration,
    output_limit_bytes: usize,
}

impl DockerCli {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            command_timeout: Duration::from_secs(cfg.command_timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn program(&self) -> &str {
        self.command.first().map_or("docker", String::as_str)
    }

    /// Spawn `<command> <args>` and classify spawn failures and daemon
    /// unreachability. Exit status is left to the caller.
    fn invoke(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, RuntimeError> {
        let mut cmd = Command::new(self.program());
        cmd.args(self.command.iter().skip(1)).args(args);
        debug!(program = self.program(), ?args, "invoking container cli");

        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes)
            .map_err(|err| {
                let not_found = err
                    .chain()
                    .find_map(|cause| cause.downcast_ref::<std::io::Error>())
                    .is_some_and(|io| io.kind() == ErrorKind::NotFound);
                if not_found {
                    RuntimeError::Unavailable(format!("{} not found on PATH", self.program()))
                } else {
                    RuntimeError::Unavailable(format!("{err:#}"))
                }
            })?;

        let stderr = output.stderr_text();
        if !output.status.success() && is_daemon_unreachable(&stderr) {
            return Err(RuntimeError::Unavailable(stderr.trim().to_string()));
        }
        Ok(output)
    }

    /// Like [`DockerCli::invoke`] but a timeout or non-zero exit is a failure.
    fn invoke_checked(&self, verb: &str, args: &[&str]) -> Result<CommandOutput, RuntimeError> {
        let output = self.invoke(args, self.command_timeout)?;
        if output.timed_out {
            return Err(RuntimeError::Failed(format!(
                "{} {verb} timed out after {:?}",
                self.program(),
                self.command_timeout
            )));
        }
        if !output.status.success() {
            return Err(RuntimeError::Failed(format!(
                "{} {verb} failed with status {:?}: {}",
                self.program(),
                output.status.code(),
                output.stderr_text().trim()
            )));
        }
        Ok(output)
    }
}

impl ContainerRuntime for DockerCli {
    #[instrument(skip_all, fields(context_dir = %context_dir.display()))]
    fn build_image(&self, context_dir: &Path) -> Result<BuiltImage, RuntimeError> {
        let iid_path = context_dir.join(IID_FILE_NAME);
        let iid_arg = iid_path.to_string_lossy();
        let dir_arg = context_dir.to_string_lossy();
        let output = self.invoke(
            &[
                "build",
                "--progress=plain",
                "--iidfile",
                iid_arg.as_ref(),
                dir_arg.as_ref(),
            ],
            self.command_timeout,
        )?;
        let text = output.combined_text("build");

        if output.timed_out {
            return Err(RuntimeError::Failed(format!(
                "image build timed out after {:?}\n{}",
                self.command_timeout,
                text.trim()
            )));
        }
        if !output.status.success() {
            return Err(RuntimeError::Failed(format!(
                "image build failed with status {:?}\n{}",
                output.status.code(),
                text.trim()
            )));
        }

        let image_id = fs::read_to_string(&iid_path)
            .map(|id| id.trim().to_string())
            .unwrap_or_default();
        if image_id.is_empty() {
            return Err(RuntimeError::Failed(
                "image build reported success but wrote no image id".to_string(),
            ));
        }
        Ok(BuiltImage {
            image_id,
            log: parse_build_log(&text),
        })
    }

    fn run_detached(&self, image_id: &str) -> Result<String, RuntimeError> {
        let output = self.invoke_checked("run", &["run", "--detach", image_id])?;
        let id = output.stdout_text().trim().to_string();
        if id.is_empty() {
            return Err(RuntimeError::Failed(
                "run printed no container id".to_string(),
            ));
        }
        Ok(id)
    }

    fn wait(&self, container_id: &str, timeout: Duration) -> Result<Option<i64>, RuntimeError> {
        let output = self.invoke(&["wait", container_id], timeout)?;
        if output.timed_out {
            return Ok(None);
        }
        if !output.status.success() {
            return Err(RuntimeError::Failed(format!(
                "wait failed: {}",
                output.stderr_text().trim()
            )));
        }
        parse_exit_code(&output.stdout_text()).map(Some)
    }

    fn logs(&self, container_id: &str) -> Result<String, RuntimeError> {
        let output = self.invoke_checked("logs", &["logs", "--timestamps", container_id])?;
        Ok(output.combined_text("logs"))
    }

    fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.invoke_checked("stop", &["stop", container_id])
            .map(|_| ())
    }

    fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.invoke_checked("rm", &["rm", "--force", container_id])
            .map(|_| ())
    }
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    UNREACHABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Split build output into entries; blank and bookkeeping lines become
/// status-only entries.
fn parse_build_log(text: &str) -> Vec<BuildLogEntry> {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_end();
            if trimmed.trim().is_empty() || STATUS_LINE_RE.is_match(trimmed) {
                BuildLogEntry::status(trimmed)
            } else {
                BuildLogEntry::stream(trimmed)
            }
        })
        .collect()
}

fn parse_exit_code(stdout: &str) -> Result<i64, RuntimeError> {
    let last = stdout.lines().rev().find(|line| !line.trim().is_empty());
    last.and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| RuntimeError::Failed(format!("unexpected wait output {stdout:?}")))
}
