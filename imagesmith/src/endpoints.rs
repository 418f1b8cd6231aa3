//! Endpoint dispatch table.
//!
//! Every documented result with an image becomes one named entry; a single
//! generic handler runs any entry's image and returns its output.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::types::ArtifactResult;
use crate::errors::SmithError;
use crate::io::runtime::{ContainerGuard, ContainerRuntime, RuntimeError};

/// Output of one endpoint invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub endpoint: String,
    pub image_id: String,
    pub output: String,
    /// `None` if the container was still running at the deadline.
    pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointTable {
    entries: BTreeMap<String, String>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `result` under its endpoint name and return the name used.
    ///
    /// Results without an image are skipped. A taken name gets a numeric
    /// suffix (`name_2`, `name_3`, ...).
    pub fn register(&mut self, result: &ArtifactResult) -> Option<String> {
        let Some(image_id) = result.image_id.as_deref() else {
            warn!(task = %result.task, "no image, endpoint not registered");
            return None;
        };
        let name = self.free_name(&result.endpoint_name);
        info!(endpoint = %name, image_id, "endpoint registered");
        self.entries.insert(name.clone(), image_id.to_string());
        Some(name)
    }

    fn free_name(&self, base: &str) -> String {
        if !self.entries.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.entries.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, image)| (name.as_str(), image.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the image behind `name` for up to `run_duration` and return its output.
    pub fn invoke<R: ContainerRuntime + ?Sized>(
        &self,
        runtime: &R,
        name: &str,
        run_duration: Duration,
    ) -> Result<Invocation> {
        let Some(image_id) = self.get(name) else {
            bail!("unknown endpoint {name:?}");
        };
        let run = || -> Result<(Option<i64>, String), RuntimeError> {
            let container = ContainerGuard::new(runtime, runtime.run_detached(image_id)?);
            let exit_code = runtime.wait(container.id(), run_duration)?;
            let output = runtime.logs(container.id())?;
            Ok((exit_code, output))
        };
        let (exit_code, output) = match run() {
            Ok(done) => done,
            Err(RuntimeError::Unavailable(msg)) => {
                return Err(SmithError::RuntimeUnavailable(msg).into());
            }
            Err(RuntimeError::Failed(msg)) => bail!("endpoint {name:?} failed: {msg}"),
        };
        info!(endpoint = name, ?exit_code, "endpoint invoked");
        Ok(Invocation {
            endpoint: name.to_string(),
            image_id: image_id.to_string(),
            output,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Outcome, RunConfirmation, Task};
    use crate::test_support::{RuntimeCall, RuntimeStep, ScriptedRun, ScriptedRuntime};

    fn result(name: &str, image_id: Option<&str>) -> ArtifactResult {
        ArtifactResult {
            task: Task::new("print hex for blue"),
            epochs: 1,
            image_id: image_id.map(str::to_string),
            documentation: "GET returns the hex code of blue".to_string(),
            endpoint_name: name.to_string(),
            outcome: if image_id.is_some() {
                Outcome::Succeeded
            } else {
                Outcome::Exhausted
            },
            error: None,
            run_confirmation: RunConfirmation::Exited { code: 0 },
        }
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let mut table = EndpointTable::new();
        assert_eq!(table.register(&result("blue", Some("a"))).as_deref(), Some("blue"));
        assert_eq!(table.register(&result("blue", Some("b"))).as_deref(), Some("blue_2"));
        assert_eq!(table.register(&result("blue", Some("c"))).as_deref(), Some("blue_3"));
        assert_eq!(table.get("blue_2"), Some("b"));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["blue", "blue_2", "blue_3"]);
    }

    #[test]
    fn results_without_image_are_skipped() {
        let mut table = EndpointTable::new();
        assert_eq!(table.register(&result("pi", None)), None);
        assert!(table.is_empty());
    }

    #[test]
    fn invoke_runs_image_and_cleans_up() {
        let runtime = ScriptedRuntime::new(vec![ScriptedRun::success("unused", "#0000FF\n")]);
        let mut table = EndpointTable::new();
        table.register(&result("blue", Some("sha256:blue")));

        let invocation = table
            .invoke(&runtime, "blue", Duration::from_secs(5))
            .expect("invoke");
        assert_eq!(
            invocation,
            Invocation {
                endpoint: "blue".to_string(),
                image_id: "sha256:blue".to_string(),
                output: "#0000FF\n".to_string(),
                exit_code: Some(0),
            }
        );
        assert!(runtime.calls().contains(&RuntimeCall::Run {
            image_id: "sha256:blue".to_string()
        }));
        assert_eq!(runtime.started_containers(), runtime.removed_containers());
    }

    #[test]
    fn unknown_endpoint_is_an_error() {
        let runtime = ScriptedRuntime::new(Vec::new());
        let table = EndpointTable::new();
        let err = table
            .invoke(&runtime, "missing", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn unavailable_runtime_is_typed() {
        let runtime = ScriptedRuntime::new(vec![ScriptedRun::failing_at(
            RuntimeStep::Wait,
            RuntimeError::Unavailable("daemon gone".to_string()),
        )]);
        let mut table = EndpointTable::new();
        table.register(&result("blue", Some("img")));

        let err = table
            .invoke(&runtime, "blue", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SmithError>(),
            Some(SmithError::RuntimeUnavailable(_))
        ));
        assert_eq!(runtime.started_containers(), runtime.removed_containers());
    }
}
