use super::*;
use tempfile::tempdir;

fn sample_result() -> RunResult {
    let mut result = RunResult::new();
    result.actions.push(ActionResult {
        target: Target::new("s", "a"),
        status: ActionStatus::Successful,
        timing: Some(Timing {
            start_time_millis: 1_000,
            end_time_millis: Some(1_500),
        }),
        tasks: vec![TaskResult {
            status: TaskStatus::Successful,
            timing: None,
            error_message: None,
            metadata: Some(ExecutionMetadata {
                rows_affected: Some(10),
                ..Default::default()
            }),
        }],
    });
    result
        .actions
        .push(ActionResult::skipped(Target::new("s", "b"), 2));
    result.actions.push(ActionResult::terminal(
        Target::new("s", "c"),
        ActionStatus::CacheSkipped,
    ));
    result
}

#[test]
fn test_new_run_result() {
    let result = RunResult::new();
    assert_eq!(result.status, RunStatus::Running);
    assert_eq!(result.run_id.len(), 8);
    assert!(result.actions.is_empty());
}

#[test]
fn test_status_classification() {
    assert!(!ActionStatus::Running.is_terminal());
    assert!(ActionStatus::Skipped.is_terminal());
    assert!(ActionStatus::CacheSkipped.satisfies_dependents());
    assert!(ActionStatus::Disabled.satisfies_dependents());
    assert!(!ActionStatus::Failed.satisfies_dependents());
    assert!(!ActionStatus::Skipped.satisfies_dependents());
    assert!(!TaskStatus::Running.is_terminal());
}

#[test]
fn test_skipped_action_has_skipped_tasks() {
    let skipped = ActionResult::skipped(Target::new("s", "x"), 3);
    assert_eq!(skipped.status, ActionStatus::Skipped);
    assert_eq!(skipped.tasks.len(), 3);
    assert!(skipped
        .tasks
        .iter()
        .all(|t| t.status == TaskStatus::Skipped));
}

#[test]
fn test_timing_resume_keeps_start() {
    let original = Timing {
        start_time_millis: 42,
        end_time_millis: Some(100),
    };
    let resumed = Timing::resume(Some(&original));
    assert_eq!(resumed.start_time_millis, 42);
    assert!(resumed.end_time_millis.is_none());

    let ended = resumed.ended();
    assert!(ended.duration_millis().unwrap() >= 0);
}

#[test]
fn test_summary() {
    let summary = sample_result().summary();
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.cache_skipped, 1);
    assert_eq!(summary.failed, 0);
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("target").join("run_result.json");

    let result = sample_result();
    result.save(&path).unwrap();

    let loaded = RunResult::load(&path).unwrap().unwrap();
    assert_eq!(loaded, result);
}

#[test]
fn test_load_missing_file() {
    let dir = tempdir().unwrap();
    let loaded = RunResult::load(&dir.path().join("nope.json")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn test_status_serialization() {
    let json = serde_json::to_string(&ActionStatus::CacheSkipped).unwrap();
    assert_eq!(json, "\"cache_skipped\"");
    let json = serde_json::to_string(&RunStatus::TimedOut).unwrap();
    assert_eq!(json, "\"timed_out\"");
}
