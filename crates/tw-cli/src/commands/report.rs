//! Human-readable run report

use tw_core::{ActionStatus, ExecutionGraph, RunResult, RunStatus, TaskStatus};

/// Status marker for one action line
fn marker(status: ActionStatus) -> &'static str {
    match status {
        ActionStatus::Successful => "\u{2713}",
        ActionStatus::Failed => "\u{2717}",
        ActionStatus::CacheSkipped => "\u{25cb}",
        ActionStatus::Running => "\u{2026}",
        ActionStatus::Cancelled | ActionStatus::Disabled | ActionStatus::Skipped => "-",
    }
}

/// Render one line per action in graph order, failed task messages
/// indented below their action, then a summary line.
pub(crate) fn render(graph: &ExecutionGraph, result: &RunResult) -> String {
    let mut out = String::new();

    for action in &graph.actions {
        let Some(action_result) = result.action(&action.target) else {
            out.push_str(&format!("  ? {} (pending)\n", action.target));
            continue;
        };

        let duration = action_result
            .timing
            .and_then(|t| t.duration_millis())
            .map(|ms| format!(" [{}ms]", ms))
            .unwrap_or_default();
        out.push_str(&format!(
            "  {} {} ({}, {}){}\n",
            marker(action_result.status),
            action.target,
            action.action_type,
            action_result.status,
            duration
        ));

        for task in action_result
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
        {
            if let Some(message) = &task.error_message {
                out.push_str(&format!("      {}\n", message));
            }
        }
    }

    let summary = result.summary();
    out.push('\n');
    out.push_str(&format!(
        "Run {} {}: {} succeeded, {} failed, {} cached, {} skipped, {} disabled, {} cancelled\n",
        result.run_id,
        result.status,
        summary.successful,
        summary.failed,
        summary.cache_skipped,
        summary.skipped,
        summary.disabled,
        summary.cancelled
    ));
    if let Some(ms) = summary.duration_millis {
        out.push_str(&format!("Total time: {}ms\n", ms));
    }
    if result.status == RunStatus::Running {
        out.push_str("Run stopped before completion; resume with --resume\n");
    }

    out
}
