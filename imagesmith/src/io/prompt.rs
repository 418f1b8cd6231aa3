//! Prompt rendering for the generation gateway.

use anyhow::{Context, Result};
use minijinja::{Environment, Value};

const ASSISTANT_TEMPLATE: &str = include_str!("prompts/assistant.md");
const RECIPE_TEMPLATE: &str = include_str!("prompts/recipe.md");
const REFINE_TEMPLATE: &str = include_str!("prompts/refine.md");
const FEEDBACK_TEMPLATE: &str = include_str!("prompts/feedback.md");
const DESCRIBE_TEMPLATE: &str = include_str!("prompts/describe.md");
const NAME_TEMPLATE: &str = include_str!("prompts/name.md");

/// Template names known to the engine.
pub const ASSISTANT: &str = "assistant";
pub const RECIPE: &str = "recipe";
pub const REFINE: &str = "refine";
pub const FEEDBACK: &str = "feedback";
pub const DESCRIBE: &str = "describe";
pub const NAME: &str = "name";

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            (ASSISTANT, ASSISTANT_TEMPLATE),
            (RECIPE, RECIPE_TEMPLATE),
            (REFINE, REFINE_TEMPLATE),
            (FEEDBACK, FEEDBACK_TEMPLATE),
            (DESCRIBE, DESCRIBE_TEMPLATE),
            (NAME, NAME_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("compile {name} template"))?;
        }
        Ok(Self { env })
    }

    /// Render template `name` with `ctx` (build it with [`minijinja::context!`]).
    pub fn render(&self, name: &str, ctx: Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load {name} template"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} template"))?;
        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn all_templates_compile() {
        PromptEngine::new().expect("templates compile");
    }

    #[test]
    fn refine_substitutes_placeholders_for_missing_evidence() {
        let engine = PromptEngine::new().expect("engine");
        let rendered = engine
            .render(
                REFINE,
                context! {
                    task => "print pi",
                    prior_recipe => "FROM alpine",
                    build_logs => "",
                    run_logs => "",
                    error => "boom",
                },
            )
            .expect("render");
        assert!(rendered.contains("(no build logs)"));
        assert!(rendered.contains("(no run logs)"));
        assert!(rendered.contains("boom"));
    }

    #[test]
    fn markup_is_not_escaped() {
        let engine = PromptEngine::new().expect("engine");
        let rendered = engine
            .render(NAME, context! { task => "print <b>\"blue\"</b> & exit" })
            .expect("render");
        assert!(rendered.contains("print <b>\"blue\"</b> & exit"));
    }
}
