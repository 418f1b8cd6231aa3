//! Generation gateway: single-call wrapper around the text-generation service.
//!
//! The [`TextGenerator`] trait is the service boundary (`prompt -> text`). The
//! production backend is a CLI command fed on stdin (by default `codex exec`).
//! Responses are passed through untouched; cleanup and validation happen in
//! the consuming layer.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::context;
use tracing::{debug, info, instrument, warn};

use crate::core::types::Task;
use crate::errors::SmithError;
use crate::io::config::GeneratorConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{self, PromptEngine};

/// What a generation request is for. Used for logging and by test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Recipe,
    Refine,
    Feedback,
    Describe,
    Name,
}

/// Role-tagged request sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub kind: PromptKind,
    /// Instruction text (system role).
    pub system: String,
    /// User text (user role).
    pub user: String,
}

impl GenerationRequest {
    /// Render both roles into a single prompt for text-only backends.
    pub fn render(&self) -> String {
        format!(
            "<system>\n{}\n</system>\n\n<user>\n{}\n</user>\n",
            self.system.trim(),
            self.user.trim()
        )
    }
}

/// Abstraction over text-generation backends.
pub trait TextGenerator {
    /// Send one blocking request and return the raw response text.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for &G {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request)
    }
}

/// Generator that spawns a command, writes the prompt to stdin and reads the
/// response from stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn from_config(cfg: &GeneratorConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }
}

impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(kind = ?request.kind, timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let prompt = request.render();
        debug!(prompt_bytes = prompt.len(), "invoking generator");
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run generator {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        if output.stdout_truncated > 0 {
            warn!(
                truncated = output.stdout_truncated,
                "generator response truncated"
            );
        }
        Ok(output.stdout_text())
    }
}

/// Evidence from a failing attempt, forwarded verbatim into a refinement.
#[derive(Debug, Clone, Copy)]
pub struct RefineRequest<'a> {
    pub task: &'a Task,
    pub prior_recipe: &'a str,
    pub build_logs: &'a str,
    pub run_logs: &'a str,
    pub error: &'a str,
    pub user_feedback: &'a str,
}

/// Typed operations on top of a [`TextGenerator`].
///
/// Every backend failure is surfaced as [`SmithError::Generation`]; nothing is
/// retried here.
pub struct GenerationGateway<G> {
    generator: G,
    prompts: PromptEngine,
}

impl<G: TextGenerator> GenerationGateway<G> {
    pub fn new(generator: G) -> Result<Self> {
        Ok(Self {
            generator,
            prompts: PromptEngine::new()?,
        })
    }

    /// Initial recipe for `task`.
    pub fn generate_recipe(&self, task: &Task) -> Result<String> {
        let system = self
            .prompts
            .render(prompt::RECIPE, context! { task => task.as_str() })?;
        self.call(PromptKind::Recipe, system, task.as_str().to_string())
    }

    /// Revised recipe given the full evidence of the previous attempt.
    pub fn refine_recipe(&self, request: &RefineRequest<'_>) -> Result<String> {
        let system = self.prompts.render(
            prompt::REFINE,
            context! {
                task => request.task.as_str(),
                prior_recipe => request.prior_recipe,
                build_logs => request.build_logs,
                run_logs => request.run_logs,
                error => request.error,
            },
        )?;
        self.call(PromptKind::Refine, system, request.user_feedback.to_string())
    }

    /// Short critique used as user text for the next refinement.
    pub fn generate_feedback_prompt(&self, task: &Task) -> Result<String> {
        let user = self
            .prompts
            .render(prompt::FEEDBACK, context! { task => task.as_str() })?;
        self.call(PromptKind::Feedback, self.assistant()?, user)
    }

    /// Short endpoint documentation string for `task`.
    pub fn describe(&self, task: &Task) -> Result<String> {
        let user = self
            .prompts
            .render(prompt::DESCRIBE, context! { task => task.as_str() })?;
        self.call(PromptKind::Describe, self.assistant()?, user)
    }

    /// Single-word identifier for `task` (unsanitized).
    pub fn name(&self, task: &Task) -> Result<String> {
        let user = self
            .prompts
            .render(prompt::NAME, context! { task => task.as_str() })?;
        self.call(PromptKind::Name, self.assistant()?, user)
    }

    fn assistant(&self) -> Result<String> {
        self.prompts.render(prompt::ASSISTANT, context! {})
    }

    fn call(&self, kind: PromptKind, system: String, user: String) -> Result<String> {
        let request = GenerationRequest { kind, system, user };
        info!(kind = ?kind, "requesting generation");
        self.generator.generate(&request).map_err(|err| {
            warn!(kind = ?kind, err = %format!("{err:#}"), "generation failed");
            SmithError::Generation(format!("{kind:?} request: {err:#}")).into()
        })
    }
}
