//! Runtime gateway: turn a recipe into a built image and a finished (or
//! timed-out) container, capturing the evidence along the way.
//!
//! The [`ContainerRuntime`] trait decouples the gateway from the actual
//! container engine (currently the docker CLI, see [`crate::io::docker`]).
//! Tests use scripted runtimes that fail at chosen steps.
//!
//! Every attempt builds in a fresh uuid-named directory under the work root.
//! Both the directory and the container are released by drop guards, so they
//! are cleaned up on every exit path.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::types::{BuildAttempt, BuildLogEntry, RunConfirmation};
use crate::errors::SmithError;
use crate::io::config::TimeoutPolicy;

/// File name of the recipe inside a build context.
pub const RECIPE_FILE_NAME: &str = "Dockerfile";

/// Failure of a single runtime primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The runtime could not be reached at all. Fatal for the run.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
    /// The runtime answered but the operation failed.
    #[error("{0}")]
    Failed(String),
}

/// Result of a successful image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub image_id: String,
    pub log: Vec<BuildLogEntry>,
}

/// Abstraction over container engines.
pub trait ContainerRuntime {
    /// Build an image from a directory holding a single recipe file.
    fn build_image(&self, context_dir: &Path) -> Result<BuiltImage, RuntimeError>;
    /// Start a container in detached mode and return its id.
    fn run_detached(&self, image_id: &str) -> Result<String, RuntimeError>;
    /// Wait for the container to stop. `Ok(None)` means it was still running
    /// when `timeout` elapsed.
    fn wait(&self, container_id: &str, timeout: Duration) -> Result<Option<i64>, RuntimeError>;
    /// Full timestamped container output.
    fn logs(&self, container_id: &str) -> Result<String, RuntimeError>;
    fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;
    fn remove(&self, container_id: &str) -> Result<(), RuntimeError>;
}

impl<R: ContainerRuntime + ?Sized> ContainerRuntime for &R {
    fn build_image(&self, context_dir: &Path) -> Result<BuiltImage, RuntimeError> {
        (**self).build_image(context_dir)
    }
    fn run_detached(&self, image_id: &str) -> Result<String, RuntimeError> {
        (**self).run_detached(image_id)
    }
    fn wait(&self, container_id: &str, timeout: Duration) -> Result<Option<i64>, RuntimeError> {
        (**self).wait(container_id, timeout)
    }
    fn logs(&self, container_id: &str) -> Result<String, RuntimeError> {
        (**self).logs(container_id)
    }
    fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        (**self).stop(container_id)
    }
    fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        (**self).remove(container_id)
    }
}

/// How the run phase is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    pub timeout: TimeoutPolicy,
    pub require_zero_exit: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            timeout: TimeoutPolicy::Success,
            require_zero_exit: true,
        }
    }
}

/// Wraps a [`ContainerRuntime`] with per-attempt isolation and cleanup.
pub struct RuntimeGateway<R> {
    runtime: R,
    work_root: PathBuf,
    policy: RunPolicy,
}

impl<R: ContainerRuntime> RuntimeGateway<R> {
    pub fn new(runtime: R, work_root: impl Into<PathBuf>, policy: RunPolicy) -> Self {
        Self {
            runtime,
            work_root: work_root.into(),
            policy,
        }
    }

    /// Build `recipe`, run the image for up to `run_duration`, and collect the
    /// evidence.
    ///
    /// Build and run failures are recorded on the returned attempt. Only an
    /// unreachable runtime ([`SmithError::RuntimeUnavailable`]) or a local
    /// filesystem failure is returned as an error.
    #[instrument(skip_all, fields(epoch = epoch, run_duration_secs = run_duration.as_secs()))]
    pub fn build_and_run(
        &self,
        epoch: u32,
        recipe: &str,
        run_duration: Duration,
    ) -> Result<BuildAttempt> {
        let mut attempt = BuildAttempt::new(epoch, recipe);
        let workdir = WorkDir::create(&self.work_root)?;
        workdir.write_recipe(recipe)?;

        debug!(dir = %workdir.path().display(), "building image");
        let built = match self.runtime.build_image(workdir.path()) {
            Ok(built) => built,
            Err(RuntimeError::Unavailable(msg)) => {
                return Err(SmithError::RuntimeUnavailable(msg).into());
            }
            Err(RuntimeError::Failed(msg)) => {
                info!(epoch, "image build failed");
                attempt.error = Some(non_blank(msg, "image build failed"));
                return Ok(attempt);
            }
        };
        attempt.build_logs = built
            .log
            .into_iter()
            .filter_map(|entry| entry.stream)
            .collect();
        attempt.image_id = Some(built.image_id.clone());
        info!(epoch, image_id = %built.image_id, "image built");

        match self.run_phase(&mut attempt, &built.image_id, run_duration) {
            Ok(()) => {}
            Err(RuntimeError::Unavailable(msg)) => {
                return Err(SmithError::RuntimeUnavailable(msg).into());
            }
            Err(RuntimeError::Failed(msg)) => {
                info!(epoch, "container run failed");
                attempt.error = Some(format!("container run failed: {msg}"));
            }
        }
        Ok(attempt)
    }

    fn run_phase(
        &self,
        attempt: &mut BuildAttempt,
        image_id: &str,
        run_duration: Duration,
    ) -> Result<(), RuntimeError> {
        let container = ContainerGuard::new(&self.runtime, self.runtime.run_detached(image_id)?);
        let exit = self.runtime.wait(container.id(), run_duration)?;
        attempt.confirmation = match exit {
            Some(code) => RunConfirmation::Exited { code },
            None => RunConfirmation::TimedOut,
        };
        attempt.run_logs = self.runtime.logs(container.id())?;

        match exit {
            None => {
                warn!(
                    run_duration_secs = run_duration.as_secs(),
                    "container did not exit within run duration"
                );
                if self.policy.timeout == TimeoutPolicy::Failure {
                    attempt.error = Some(format!(
                        "container still running after {}s",
                        run_duration.as_secs()
                    ));
                }
            }
            Some(code) if code != 0 && self.policy.require_zero_exit => {
                attempt.error = Some(format!("container exited with status {code}"));
            }
            Some(_) => {}
        }
        Ok(())
    }
}

fn non_blank(msg: String, fallback: &str) -> String {
    if msg.trim().is_empty() {
        fallback.to_string()
    } else {
        msg
    }
}

/// Uniquely named build context, removed recursively on drop.
struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    fn create(work_root: &Path) -> Result<Self> {
        let path = work_root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&path)
            .with_context(|| format!("create work dir {}", path.display()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write_recipe(&self, recipe: &str) -> Result<()> {
        let path = self.path.join(RECIPE_FILE_NAME);
        fs::write(&path, recipe).with_context(|| format!("write recipe {}", path.display()))
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            warn!(dir = %self.path.display(), err = %err, "failed to remove work dir");
        }
    }
}

/// Stops and removes a container on drop. Cleanup errors are logged only.
pub(crate) struct ContainerGuard<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    id: String,
}

impl<'a, R: ContainerRuntime + ?Sized> ContainerGuard<'a, R> {
    pub(crate) fn new(runtime: &'a R, id: String) -> Self {
        debug!(container_id = %id, "container started");
        Self { runtime, id }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }
}

impl<R: ContainerRuntime + ?Sized> Drop for ContainerGuard<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.runtime.stop(&self.id) {
            warn!(container_id = %self.id, err = %err, "failed to stop container");
        }
        if let Err(err) = self.runtime.remove(&self.id) {
            warn!(container_id = %self.id, err = %err, "failed to remove container");
        }
    }
}
