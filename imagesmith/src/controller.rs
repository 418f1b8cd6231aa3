//! Build-run-refine controller for a single task.
//!
//! Seeds a recipe, then for each epoch builds and runs the current recipe,
//! stops on the first successful attempt, and otherwise feeds the attempt's
//! evidence back into the generator. The terminal attempt (successful or not)
//! is documented into an [`ArtifactResult`].

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::recipe::clean_recipe_text;
use crate::core::state::{ControllerState, after_evaluation, after_refinement};
use crate::core::types::{ArtifactResult, BuildAttempt, Task};
use crate::documenter::ArtifactDocumenter;
use crate::io::config::{FeedbackMode, SmithConfig};
use crate::io::generation::{GenerationGateway, RefineRequest, TextGenerator};
use crate::io::recipe_store::RecipeStore;
use crate::io::runtime::{ContainerRuntime, RuntimeGateway};

/// Loop settings for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub max_epochs: u32,
    pub run_duration: Duration,
    pub feedback: FeedbackMode,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&SmithConfig::default())
    }
}

impl ControllerSettings {
    pub fn from_config(cfg: &SmithConfig) -> Self {
        Self {
            max_epochs: cfg.max_epochs,
            run_duration: cfg.run_duration(),
            feedback: cfg.feedback,
        }
    }
}

/// Where the loop stopped, before documentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// `DoneSuccess` or `DoneExhausted`.
    pub state: ControllerState,
    /// The terminal attempt.
    pub attempt: BuildAttempt,
    /// Epochs consumed.
    pub epochs: u32,
}

pub struct BuildAttemptController<R, G> {
    runtime: RuntimeGateway<R>,
    generation: GenerationGateway<G>,
    store: RecipeStore,
    settings: ControllerSettings,
}

impl<R: ContainerRuntime, G: TextGenerator> BuildAttemptController<R, G> {
    pub fn new(
        runtime: RuntimeGateway<R>,
        generation: GenerationGateway<G>,
        store: RecipeStore,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            runtime,
            generation,
            store,
            settings,
        }
    }

    /// Run the loop for `task` and document the terminal attempt.
    ///
    /// Exhausting the epochs is a normal outcome. Generation failures, an
    /// unreachable runtime and naming failures are returned as errors.
    pub fn run(&self, task: &Task) -> Result<ArtifactResult> {
        let finished = self.run_loop(task)?;
        ArtifactDocumenter::new(&self.generation).document(finished.attempt, task, finished.epochs)
    }

    /// The epoch loop without the documentation step.
    #[instrument(skip_all, fields(task = %task, max_epochs = self.settings.max_epochs))]
    pub fn run_loop(&self, task: &Task) -> Result<LoopOutcome> {
        debug!(state = %ControllerState::Init, "controller state");
        let seed = self.generation.generate_recipe(task)?;
        self.store
            .write(&clean_recipe_text(&seed))
            .context("write seed recipe")?;

        let mut epoch = 0;
        loop {
            debug!(state = %ControllerState::Building { epoch }, "controller state");
            let feedback = match self.settings.feedback {
                FeedbackMode::Always => Some(self.generation.generate_feedback_prompt(task)?),
                FeedbackMode::AfterFailure => None,
            };

            let recipe = self.store.read()?;
            let attempt = self
                .runtime
                .build_and_run(epoch, &recipe, self.settings.run_duration)
                .with_context(|| format!("epoch {epoch}"))?;

            debug!(state = %ControllerState::Evaluating { epoch }, "controller state");
            let state = after_evaluation(epoch, self.settings.max_epochs, attempt.succeeded());
            if state.is_terminal() {
                info!(%state, error = ?attempt.failure(), "controller finished");
                return Ok(LoopOutcome {
                    state,
                    attempt,
                    epochs: epoch + 1,
                });
            }

            info!(%state, error = ?attempt.failure(), "attempt failed, refining");
            let feedback = match feedback {
                Some(feedback) => feedback,
                None => self.generation.generate_feedback_prompt(task)?,
            };
            let build_logs = attempt.build_log_text();
            let refined = self.generation.refine_recipe(&RefineRequest {
                task,
                prior_recipe: &attempt.recipe,
                build_logs: &build_logs,
                run_logs: &attempt.run_logs,
                error: attempt.failure().unwrap_or_default(),
                user_feedback: &feedback,
            })?;
            self.store
                .write(&clean_recipe_text(&refined))
                .context("write refined recipe")?;

            let next = after_refinement(epoch);
            debug!(state = %next, "controller state");
            epoch += 1;
        }
    }
}
