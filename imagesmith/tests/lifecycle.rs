//! Multi-task lifecycle: build several tasks with one controller, register
//! the results as endpoints and invoke them.

use std::time::Duration;

use imagesmith::controller::{BuildAttemptController, ControllerSettings};
use imagesmith::core::types::{Outcome, RunConfirmation, Task};
use imagesmith::endpoints::EndpointTable;
use imagesmith::io::config::FeedbackMode;
use imagesmith::io::generation::{GenerationGateway, PromptKind};
use imagesmith::io::recipe_store::RecipeStore;
use imagesmith::io::runtime::{RunPolicy, RuntimeGateway};
use imagesmith::test_support::{ScriptedGenerator, ScriptedRun, ScriptedRuntime};

/// Tasks, in order:
/// 1. "print hex for blue": succeeds in epoch 0.
/// 2. "generate the first 16 numbers of pi": fails 3 times, exhausted.
/// 3. "print hex for blue again": succeeds, name collides with task 1.
#[test]
fn tasks_build_register_and_invoke() {
    let temp = tempfile::tempdir().expect("tempdir");
    let runtime = ScriptedRuntime::new(vec![
        ScriptedRun::success("sha256:blue", "#0000FF\n"),
        ScriptedRun::build_failure("pi: syntax error"),
        ScriptedRun::build_failure("pi: syntax error"),
        ScriptedRun::build_failure("pi: still a syntax error"),
        ScriptedRun::success("sha256:blue2", "#0000ff\n"),
    ]);
    let generator = ScriptedGenerator::new()
        .respond(PromptKind::Name, "blue_hex")
        .respond(PromptKind::Name, "pi_digits")
        .respond(PromptKind::Name, "`blue_hex`");
    let controller = BuildAttemptController::new(
        RuntimeGateway::new(&runtime, temp.path().join("work"), RunPolicy::default()),
        GenerationGateway::new(&generator).expect("gateway"),
        RecipeStore::new(temp.path().join("Dockerfile")),
        ControllerSettings {
            max_epochs: 3,
            run_duration: Duration::from_secs(5),
            feedback: FeedbackMode::Always,
        },
    );

    let tasks = [
        Task::new("print hex for blue"),
        Task::new("generate the first 16 numbers of pi"),
        Task::new("print hex for blue again"),
    ];
    let results: Vec<_> = tasks
        .iter()
        .map(|task| controller.run(task).expect("run"))
        .collect();

    assert_eq!(
        results.iter().map(|r| r.outcome).collect::<Vec<_>>(),
        vec![Outcome::Succeeded, Outcome::Exhausted, Outcome::Succeeded]
    );
    assert_eq!(
        results.iter().map(|r| r.epochs).collect::<Vec<_>>(),
        vec![1, 3, 1]
    );
    assert_eq!(results[1].image_id, None);
    assert_eq!(results[1].error.as_deref(), Some("pi: still a syntax error"));
    assert_eq!(results[1].run_confirmation, RunConfirmation::NotRun);
    assert_eq!(runtime.build_count(), 5);
    assert_eq!(generator.count(PromptKind::Refine), 2);

    let mut table = EndpointTable::new();
    let registered: Vec<_> = results.iter().map(|r| table.register(r)).collect();
    assert_eq!(
        registered,
        vec![
            Some("blue_hex".to_string()),
            None,
            Some("blue_hex_2".to_string()),
        ]
    );
    assert_eq!(table.get("blue_hex_2"), Some("sha256:blue2"));

    for (name, image_id) in table.iter() {
        let invocation = table
            .invoke(&runtime, name, Duration::from_secs(5))
            .expect("invoke");
        assert_eq!(invocation.image_id, image_id);
        assert_eq!(invocation.exit_code, Some(0));
    }
    assert_eq!(runtime.started_containers(), runtime.removed_containers());
}

#[test]
fn serialized_result_carries_no_logs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let runtime = ScriptedRuntime::new(vec![ScriptedRun::success(
        "sha256:time",
        "2024-05-01T10:00:00Z 12:00\n",
    )]);
    let generator = ScriptedGenerator::new().respond(PromptKind::Name, "italy_time");
    let controller = BuildAttemptController::new(
        RuntimeGateway::new(&runtime, temp.path().join("work"), RunPolicy::default()),
        GenerationGateway::new(&generator).expect("gateway"),
        RecipeStore::new(temp.path().join("Dockerfile")),
        ControllerSettings::default(),
    );

    let result = controller.run(&Task::new("get time in italy")).expect("run");
    let json = serde_json::to_string(&result).expect("json");
    assert!(json.contains("\"endpoint_name\":\"italy_time\""));
    assert!(!json.contains("12:00"));
    assert!(!json.contains("Successfully built"));
}
