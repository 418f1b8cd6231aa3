//! Shared data model for one controller run.
//!
//! Nothing here outlives a single run: a [`Task`] drives one or more
//! [`BuildAttempt`]s, and the terminal attempt is condensed into an
//! [`ArtifactResult`] that never carries raw logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Natural-language description of the program to build. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(String);

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the runtime's build output.
///
/// Only entries with `stream` content are kept on the attempt; `status`-only
/// entries are build bookkeeping and are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLogEntry {
    pub stream: Option<String>,
    pub status: Option<String>,
}

impl BuildLogEntry {
    pub fn stream(line: impl Into<String>) -> Self {
        Self {
            stream: Some(line.into()),
            status: None,
        }
    }

    pub fn status(line: impl Into<String>) -> Self {
        Self {
            stream: None,
            status: Some(line.into()),
        }
    }
}

/// How the run phase of an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunConfirmation {
    /// No container was started (build failed or run could not start).
    NotRun,
    /// The container reached a terminal state within the run duration.
    Exited { code: i64 },
    /// The container was still running when the run duration elapsed.
    TimedOut,
}

/// Evidence collected by one build-run-evaluate epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAttempt {
    /// 0-based epoch index.
    pub epoch: u32,
    /// Recipe text that was built.
    pub recipe: String,
    /// Build output lines, in order.
    pub build_logs: Vec<String>,
    /// Timestamped container output.
    pub run_logs: String,
    /// Failure description; `None` or blank means the attempt succeeded.
    pub error: Option<String>,
    /// Image identifier, present iff the build succeeded.
    pub image_id: Option<String>,
    pub confirmation: RunConfirmation,
}

impl BuildAttempt {
    pub fn new(epoch: u32, recipe: impl Into<String>) -> Self {
        Self {
            epoch,
            recipe: recipe.into(),
            build_logs: Vec::new(),
            run_logs: String::new(),
            error: None,
            image_id: None,
            confirmation: RunConfirmation::NotRun,
        }
    }

    /// Error text if the attempt failed. A blank error counts as no error.
    pub fn failure(&self) -> Option<&str> {
        self.error.as_deref().filter(|err| !err.trim().is_empty())
    }

    pub fn succeeded(&self) -> bool {
        self.failure().is_none()
    }

    /// Build logs joined into a single block for prompts.
    pub fn build_log_text(&self) -> String {
        self.build_logs.join("\n")
    }
}

/// Terminal classification of a controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Exhausted,
}

/// Documented result of one task. Raw logs are intentionally absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactResult {
    pub task: Task,
    /// Number of epochs consumed (attempts performed).
    pub epochs: u32,
    pub image_id: Option<String>,
    pub documentation: String,
    pub endpoint_name: String,
    pub outcome: Outcome,
    /// Error text of the final attempt when the run was exhausted.
    pub error: Option<String>,
    pub run_confirmation: RunConfirmation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_error_counts_as_success() {
        let mut attempt = BuildAttempt::new(0, "FROM alpine");
        assert!(attempt.succeeded());

        attempt.error = Some("  \n".to_string());
        assert!(attempt.succeeded());
        assert_eq!(attempt.failure(), None);

        attempt.error = Some("build failed".to_string());
        assert!(!attempt.succeeded());
        assert_eq!(attempt.failure(), Some("build failed"));
    }

    #[test]
    fn artifact_result_serializes_without_logs() {
        let result = ArtifactResult {
            task: Task::new("print hex for blue"),
            epochs: 1,
            image_id: Some("sha256:abc".to_string()),
            documentation: "GET returns the hex code for blue".to_string(),
            endpoint_name: "blue_hex".to_string(),
            outcome: Outcome::Succeeded,
            error: None,
            run_confirmation: RunConfirmation::Exited { code: 0 },
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["task"], "print hex for blue");
        assert_eq!(json["outcome"], "succeeded");
        assert_eq!(json["run_confirmation"]["state"], "exited");
        assert!(json.get("build_logs").is_none());
        assert!(json.get("run_logs").is_none());
    }
}
