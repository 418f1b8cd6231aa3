//! Fatal error taxonomy.
//!
//! These travel as the root cause of an [`anyhow::Error`]; callers recover them
//! with `downcast_ref::<SmithError>()` to pick an exit code. Build failures and
//! run timeouts are not errors: they are recorded on the attempt and drive the
//! next refinement.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error)]
pub enum SmithError {
    /// The generation service call failed. Not retried.
    #[error("generation service failed: {0}")]
    Generation(String),

    /// The container runtime (daemon or CLI) could not be reached.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A recipe was read before one was ever written.
    #[error("no recipe at {}", .0.display())]
    RecipeNotFound(PathBuf),

    /// The generated endpoint name was empty after sanitization.
    ///
    /// The image (if any) is still valid; it is carried so callers can keep it.
    #[error("endpoint name {raw:?} for task {task:?} is empty after sanitization")]
    EmptyIdentifier {
        task: String,
        raw: String,
        image_id: Option<String>,
    },
}

impl SmithError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SmithError::Generation(_) => exit_codes::GENERATION_FAILED,
            SmithError::RuntimeUnavailable(_) => exit_codes::RUNTIME_UNAVAILABLE,
            SmithError::RecipeNotFound(_) | SmithError::EmptyIdentifier { .. } => {
                exit_codes::INVALID
            }
        }
    }
}

/// Map an error chain to a CLI exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SmithError>())
        .map_or(exit_codes::INVALID, SmithError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_found_through_context() {
        let err = Err::<(), _>(SmithError::RuntimeUnavailable("no daemon".to_string()))
            .context("build attempt")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), exit_codes::RUNTIME_UNAVAILABLE);
    }

    #[test]
    fn unknown_errors_are_invalid() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), exit_codes::INVALID);
    }

    #[test]
    fn empty_identifier_message_names_the_task() {
        let err = SmithError::EmptyIdentifier {
            task: "print hex".to_string(),
            raw: "\"()\"".to_string(),
            image_id: Some("sha256:abc".to_string()),
        };
        assert!(err.to_string().contains("print hex"));
    }
}
