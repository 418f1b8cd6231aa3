//! Turns a terminal attempt into a named, described [`ArtifactResult`].

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::naming::sanitize_endpoint_name;
use crate::core::types::{ArtifactResult, BuildAttempt, Outcome, Task};
use crate::errors::SmithError;
use crate::io::generation::{GenerationGateway, TextGenerator};

pub struct ArtifactDocumenter<'a, G> {
    generation: &'a GenerationGateway<G>,
}

impl<'a, G: TextGenerator> ArtifactDocumenter<'a, G> {
    pub fn new(generation: &'a GenerationGateway<G>) -> Self {
        Self { generation }
    }

    /// Document the final attempt of a run.
    ///
    /// Description and name are requested from the task alone. The attempt is
    /// consumed so its raw logs go no further. The image id is only reported
    /// when the attempt succeeded.
    #[instrument(skip_all, fields(epochs = epoch_count))]
    pub fn document(
        &self,
        attempt: BuildAttempt,
        task: &Task,
        epoch_count: u32,
    ) -> Result<ArtifactResult> {
        let documentation = self.generation.describe(task)?.trim().to_string();
        let raw_name = self.generation.name(task)?;

        let succeeded = attempt.succeeded();
        let image_id = if succeeded { attempt.image_id } else { None };
        let error = attempt.error.filter(|err| !err.trim().is_empty());

        let Some(endpoint_name) = sanitize_endpoint_name(&raw_name) else {
            return Err(SmithError::EmptyIdentifier {
                task: task.as_str().to_string(),
                raw: raw_name,
                image_id,
            }
            .into());
        };

        let outcome = if succeeded {
            Outcome::Succeeded
        } else {
            Outcome::Exhausted
        };
        info!(endpoint = %endpoint_name, ?outcome, "documented artifact");
        Ok(ArtifactResult {
            task: task.clone(),
            epochs: epoch_count,
            image_id,
            documentation,
            endpoint_name,
            outcome,
            error,
            run_confirmation: attempt.confirmation,
        })
    }
}
