//! Scripted doubles for the container runtime and the generation service.
//!
//! Both record every call so tests can assert on what the controller sent.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::BuildLogEntry;
use crate::io::generation::{GenerationRequest, PromptKind, TextGenerator};
use crate::io::runtime::{BuiltImage, ContainerRuntime, RECIPE_FILE_NAME, RuntimeError};

/// Runtime step at which a [`ScriptedRun`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStep {
    Build,
    Run,
    Wait,
    Logs,
    Stop,
}

/// Scripted behaviour for one build-and-run cycle.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub build: Result<BuiltImage, RuntimeError>,
    pub run: Result<(), RuntimeError>,
    pub wait: Result<Option<i64>, RuntimeError>,
    pub logs: Result<String, RuntimeError>,
    pub stop: Result<(), RuntimeError>,
}

impl ScriptedRun {
    /// Builds `image_id`, exits 0 and prints `run_logs`.
    pub fn success(image_id: &str, run_logs: &str) -> Self {
        Self {
            build: Ok(BuiltImage {
                image_id: image_id.to_string(),
                log: vec![
                    BuildLogEntry::stream(format!("Successfully built {image_id}")),
                    BuildLogEntry::status("#1 DONE 0.0s"),
                ],
            }),
            run: Ok(()),
            wait: Ok(Some(0)),
            logs: Ok(run_logs.to_string()),
            stop: Ok(()),
        }
    }

    pub fn build_failure(message: &str) -> Self {
        Self::failing_at(
            RuntimeStep::Build,
            RuntimeError::Failed(message.to_string()),
        )
    }

    pub fn failing_at(step: RuntimeStep, error: RuntimeError) -> Self {
        let mut run = Self::success("sha256:scripted", "");
        match step {
            RuntimeStep::Build => run.build = Err(error),
            RuntimeStep::Run => run.run = Err(error),
            RuntimeStep::Wait => run.wait = Err(error),
            RuntimeStep::Logs => run.logs = Err(error),
            RuntimeStep::Stop => run.stop = Err(error),
        }
        run
    }

    pub fn with_build_log(mut self, log: Vec<BuildLogEntry>) -> Self {
        if let Ok(built) = &mut self.build {
            built.log = log;
        }
        self
    }

    /// `None` simulates a container still running at the deadline.
    pub fn with_exit(mut self, exit: Option<i64>) -> Self {
        self.wait = Ok(exit);
        self
    }

    pub fn with_cleanup_error(mut self, message: &str) -> Self {
        self.stop = Err(RuntimeError::Failed(message.to_string()));
        self
    }
}

/// A call observed by [`ScriptedRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Build {
        context_dir: PathBuf,
        /// Recipe file content at build time.
        recipe: Option<String>,
    },
    Run {
        image_id: String,
    },
    Wait {
        container_id: String,
        timeout: Duration,
    },
    Logs {
        container_id: String,
    },
    Stop {
        container_id: String,
    },
    Remove {
        container_id: String,
    },
}

/// Container runtime that plays back [`ScriptedRun`]s, one per build.
///
/// Once the script is used up the last run repeats. Containers started
/// without a build (endpoint invocations) follow the next scripted run.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    runs: RefCell<VecDeque<ScriptedRun>>,
    current: RefCell<Option<ScriptedRun>>,
    calls: RefCell<Vec<RuntimeCall>>,
    started: RefCell<Vec<String>>,
    removed: RefCell<Vec<String>>,
    next_container: Cell<u32>,
}

impl ScriptedRuntime {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.borrow().clone()
    }

    pub fn build_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, RuntimeCall::Build { .. }))
            .count()
    }

    pub fn started_containers(&self) -> Vec<String> {
        self.started.borrow().clone()
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.removed.borrow().clone()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.borrow_mut().push(call);
    }

    /// Run for the latest build; before any build, the next scripted run.
    fn current(&self) -> ScriptedRun {
        self.current
            .borrow()
            .clone()
            .or_else(|| self.runs.borrow().front().cloned())
            .unwrap_or_else(|| ScriptedRun::success("sha256:scripted", ""))
    }
}

impl ContainerRuntime for ScriptedRuntime {
    fn build_image(&self, context_dir: &Path) -> Result<BuiltImage, RuntimeError> {
        self.record(RuntimeCall::Build {
            context_dir: context_dir.to_path_buf(),
            recipe: fs::read_to_string(context_dir.join(RECIPE_FILE_NAME)).ok(),
        });
        let next = self.runs.borrow_mut().pop_front();
        if let Some(run) = next {
            *self.current.borrow_mut() = Some(run);
        }
        self.current().build
    }

    fn run_detached(&self, image_id: &str) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::Run {
            image_id: image_id.to_string(),
        });
        self.current().run?;
        let n = self.next_container.get() + 1;
        self.next_container.set(n);
        let id = format!("container-{n}");
        self.started.borrow_mut().push(id.clone());
        Ok(id)
    }

    fn wait(&self, container_id: &str, timeout: Duration) -> Result<Option<i64>, RuntimeError> {
        self.record(RuntimeCall::Wait {
            container_id: container_id.to_string(),
            timeout,
        });
        self.current().wait
    }

    fn logs(&self, container_id: &str) -> Result<String, RuntimeError> {
        self.record(RuntimeCall::Logs {
            container_id: container_id.to_string(),
        });
        self.current().logs
    }

    fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Stop {
            container_id: container_id.to_string(),
        });
        self.current().stop
    }

    fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.record(RuntimeCall::Remove {
            container_id: container_id.to_string(),
        });
        self.removed.borrow_mut().push(container_id.to_string());
        Ok(())
    }
}

/// Text generator with per-[`PromptKind`] scripted responses.
///
/// Each kind plays back its queue and then repeats its last entry; kinds
/// without a script get a fixed default.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: RefCell<HashMap<PromptKind, VecDeque<Result<String, String>>>>,
    last: RefCell<HashMap<PromptKind, Result<String, String>>>,
    requests: RefCell<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, kind: PromptKind, text: &str) -> Self {
        self.push(kind, Ok(text.to_string()))
    }

    pub fn fail(self, kind: PromptKind, message: &str) -> Self {
        self.push(kind, Err(message.to_string()))
    }

    fn push(self, kind: PromptKind, entry: Result<String, String>) -> Self {
        self.scripts
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push_back(entry);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_of(&self, kind: PromptKind) -> Vec<GenerationRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.kind == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: PromptKind) -> usize {
        self.requests_of(kind).len()
    }
}

fn default_response(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Recipe | PromptKind::Refine => "FROM alpine\nCMD [\"echo\", \"hello\"]\n",
        PromptKind::Feedback => "Check the base image and the command syntax.",
        PromptKind::Describe => "GET endpoint that runs the task and returns its output",
        PromptKind::Name => "task_endpoint",
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .scripts
            .borrow_mut()
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front);
        let entry = match next {
            Some(entry) => {
                self.last.borrow_mut().insert(request.kind, entry.clone());
                entry
            }
            None => self
                .last
                .borrow()
                .get(&request.kind)
                .cloned()
                .unwrap_or_else(|| Ok(default_response(request.kind).to_string())),
        };
        entry.map_err(|message| anyhow!(message))
    }
}
