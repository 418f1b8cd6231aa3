//! imagesmith: turn task descriptions into runnable container images.
//!
//! Reads `.imagesmith/config.toml` from the current directory (defaults if
//! missing), drives the build-run-refine loop for each task and prints one
//! JSON document per line on stdout. Logs go to stderr (`RUST_LOG`).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

use imagesmith::controller::{BuildAttemptController, ControllerSettings};
use imagesmith::core::types::{ArtifactResult, Outcome, Task};
use imagesmith::endpoints::EndpointTable;
use imagesmith::errors::{SmithError, exit_code_for};
use imagesmith::exit_codes;
use imagesmith::io::config::{CONFIG_PATH, SmithConfig, load_config, write_config};
use imagesmith::io::docker::DockerCli;
use imagesmith::io::generation::{CommandGenerator, GenerationGateway};
use imagesmith::io::recipe_store::RecipeStore;
use imagesmith::io::runtime::{RunPolicy, RuntimeGateway};
use imagesmith::logging;

#[derive(Parser)]
#[command(
    name = "imagesmith",
    version,
    about = "Generate, build and refine container images from task descriptions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default `.imagesmith/config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Build an image per task and print one JSON result per line.
    Build(TaskArgs),
    /// Build the tasks, register them as endpoints and invoke each once.
    Run(TaskArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct TaskArgs {
    /// Task description (repeatable).
    #[arg(short, long = "task")]
    tasks: Vec<String>,
    /// File with one task per line. Blank lines and `#` comments are skipped.
    #[arg(long)]
    tasks_file: Option<PathBuf>,
    /// Override `max_epochs` from the config.
    #[arg(long)]
    max_epochs: Option<u32>,
    /// Override `run_duration_secs` from the config.
    #[arg(long)]
    run_duration_secs: Option<u64>,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Build(args) => cmd_build(&root, &args),
        Command::Run(args) => cmd_run(&root, &args),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let path = root.join(CONFIG_PATH);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &SmithConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_build(root: &Path, args: &TaskArgs) -> Result<i32> {
    let cfg = resolve_config(root, args)?;
    let batch = build_all(&cfg, args)?;
    Ok(batch.exit_code(0))
}

fn cmd_run(root: &Path, args: &TaskArgs) -> Result<i32> {
    let cfg = resolve_config(root, args)?;
    let batch = build_all(&cfg, args)?;

    let mut table = EndpointTable::new();
    for result in &batch.results {
        table.register(result);
    }
    if table.is_empty() {
        warn!("no endpoints to invoke");
    }
    let runtime = DockerCli::from_config(&cfg.runtime);
    let mut failed_invocations = 0;
    for name in table.names() {
        match table.invoke(&runtime, name, cfg.run_duration()) {
            Ok(invocation) => print_json_line(&invocation)?,
            Err(err) if is_runtime_unavailable(&err) => return Err(err),
            Err(err) => {
                warn!(endpoint = name, err = %format!("{err:#}"), "endpoint invocation failed");
                failed_invocations += 1;
                print_json_line(&InvocationFailure {
                    endpoint: name.to_string(),
                    error: format!("{err:#}"),
                })?;
            }
        }
    }
    Ok(batch.exit_code(failed_invocations))
}

/// A task whose image was built but could not be documented.
#[derive(Debug, Serialize)]
struct TaskFailure {
    task: Task,
    error: String,
    image_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvocationFailure {
    endpoint: String,
    error: String,
}

#[derive(Debug, Default)]
struct Batch {
    results: Vec<ArtifactResult>,
    failures: Vec<TaskFailure>,
}

impl Batch {
    /// Undocumented tasks or failed invocations outrank exhausted tasks.
    fn exit_code(&self, failed_invocations: usize) -> i32 {
        if !self.failures.is_empty() || failed_invocations > 0 {
            exit_codes::INVALID
        } else if self
            .results
            .iter()
            .any(|result| result.outcome == Outcome::Exhausted)
        {
            exit_codes::EXHAUSTED
        } else {
            exit_codes::OK
        }
    }
}

/// Run the controller for every task, printing each result as it lands.
///
/// A task whose endpoint name sanitizes to nothing is reported with its image
/// and the batch moves on. Any other error aborts the batch.
fn build_all(cfg: &SmithConfig, args: &TaskArgs) -> Result<Batch> {
    let tasks = collect_tasks(args)?;

    let runtime = RuntimeGateway::new(
        DockerCli::from_config(&cfg.runtime),
        cfg.work_dir.clone(),
        RunPolicy {
            timeout: cfg.timeout_policy,
            require_zero_exit: cfg.require_zero_exit,
        },
    );
    let generation = GenerationGateway::new(CommandGenerator::from_config(&cfg.generator))?;
    let controller = BuildAttemptController::new(
        runtime,
        generation,
        RecipeStore::new(cfg.recipe_path.clone()),
        ControllerSettings::from_config(cfg),
    );

    let mut batch = Batch::default();
    for task in &tasks {
        match controller.run(task) {
            Ok(result) => {
                print_json_line(&result)?;
                batch.results.push(result);
            }
            Err(err) => {
                let image_id = match err.downcast_ref::<SmithError>() {
                    Some(SmithError::EmptyIdentifier { image_id, .. }) => image_id.clone(),
                    _ => return Err(err.context(format!("task {task:?}"))),
                };
                warn!(task = %task, err = %err, "task built but not documented");
                let failure = TaskFailure {
                    task: task.clone(),
                    error: err.to_string(),
                    image_id,
                };
                print_json_line(&failure)?;
                batch.failures.push(failure);
            }
        }
    }
    Ok(batch)
}

fn is_runtime_unavailable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<SmithError>(),
            Some(SmithError::RuntimeUnavailable(_))
        )
    })
}

fn resolve_config(root: &Path, args: &TaskArgs) -> Result<SmithConfig> {
    let mut cfg = load_config(&root.join(CONFIG_PATH))?.rooted(root);
    if let Some(max_epochs) = args.max_epochs {
        cfg.max_epochs = max_epochs;
    }
    if let Some(secs) = args.run_duration_secs {
        cfg.run_duration_secs = secs;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn collect_tasks(args: &TaskArgs) -> Result<Vec<Task>> {
    let mut tasks: Vec<Task> = args
        .tasks
        .iter()
        .map(|task| task.trim())
        .filter(|task| !task.is_empty())
        .map(Task::new)
        .collect();
    if let Some(path) = &args.tasks_file {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        tasks.extend(parse_task_lines(&contents));
    }
    if tasks.is_empty() {
        bail!("no tasks given (use --task or --tasks-file)");
    }
    Ok(tasks)
}

fn parse_task_lines(contents: &str) -> impl Iterator<Item = Task> + '_ {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Task::new)
}

fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("serialize json")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").context("write stdout")?;
    stdout.flush().context("flush stdout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagesmith::core::types::RunConfirmation;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["imagesmith", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["imagesmith", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_build_with_overrides() {
        let cli = Cli::parse_from([
            "imagesmith",
            "build",
            "--task",
            "print hex for blue",
            "-t",
            "get time in italy",
            "--max-epochs",
            "5",
            "--run-duration-secs",
            "2",
        ]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.tasks, vec!["print hex for blue", "get time in italy"]);
        assert_eq!(args.max_epochs, Some(5));
        assert_eq!(args.run_duration_secs, Some(2));
        assert_eq!(args.tasks_file, None);
    }

    #[test]
    fn task_lines_skip_blanks_and_comments() {
        let tasks: Vec<Task> = parse_task_lines("# tasks\nprint hex for blue\n\n  get time in italy  \n")
            .collect();
        assert_eq!(
            tasks,
            vec![Task::new("print hex for blue"), Task::new("get time in italy")]
        );
    }

    #[test]
    fn no_tasks_is_an_error() {
        let err = collect_tasks(&TaskArgs {
            tasks: vec!["   ".to_string()],
            ..TaskArgs::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("no tasks"));
    }

    #[test]
    fn overrides_are_validated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_config(
            temp.path(),
            &TaskArgs {
                max_epochs: Some(0),
                ..TaskArgs::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_epochs"));

        let cfg = resolve_config(
            temp.path(),
            &TaskArgs {
                max_epochs: Some(7),
                ..TaskArgs::default()
            },
        )
        .expect("config");
        assert_eq!(cfg.max_epochs, 7);
        assert_eq!(cfg.work_dir, temp.path().join(".imagesmith/work"));
    }

    #[test]
    fn batch_exit_code_ranks_failures_over_exhaustion() {
        let result = |outcome| ArtifactResult {
            task: Task::new("x"),
            epochs: 1,
            image_id: None,
            documentation: String::new(),
            endpoint_name: "x".to_string(),
            outcome,
            error: None,
            run_confirmation: RunConfirmation::NotRun,
        };
        let mut batch = Batch {
            results: vec![result(Outcome::Succeeded)],
            failures: Vec::new(),
        };
        assert_eq!(batch.exit_code(0), exit_codes::OK);
        assert_eq!(batch.exit_code(1), exit_codes::INVALID);

        batch.results.push(result(Outcome::Exhausted));
        assert_eq!(batch.exit_code(0), exit_codes::EXHAUSTED);

        batch.failures.push(TaskFailure {
            task: Task::new("y"),
            error: "empty name".to_string(),
            image_id: Some("sha256:y".to_string()),
        });
        assert_eq!(batch.exit_code(0), exit_codes::INVALID);
    }
}
