//! Run results and their persistence
//!
//! A `RunResult` is created empty (or loaded from a previous, partially
//! executed run) and filled in by the Runner. Saving it between runs is what
//! makes a stopped or interrupted run resumable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::target::Target;

/// Run-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Successful,
    Failed,
    Cancelled,
    TimedOut,
}

/// Per-action status. Pending actions have no result at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Running,
    Successful,
    Failed,
    Cancelled,
    Disabled,
    CacheSkipped,
    Skipped,
}

impl ActionStatus {
    /// Every status except `Running` is final
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Running)
    }

    /// Statuses that let dependents start
    pub fn satisfies_dependents(self) -> bool {
        matches!(
            self,
            ActionStatus::Successful | ActionStatus::Disabled | ActionStatus::CacheSkipped
        )
    }
}

/// Per-task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Successful,
    Failed,
    Cancelled,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// Wall-clock timing in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub start_time_millis: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time_millis: Option<i64>,
}

impl Timing {
    /// Start timing now
    pub fn start() -> Self {
        Self {
            start_time_millis: now_millis(),
            end_time_millis: None,
        }
    }

    /// Continue an existing timing (keeps its start), or start fresh
    pub fn resume(existing: Option<&Timing>) -> Self {
        match existing {
            Some(t) => Self {
                start_time_millis: t.start_time_millis,
                end_time_millis: None,
            },
            None => Self::start(),
        }
    }

    /// A copy of this timing ended now
    pub fn ended(&self) -> Self {
        Self {
            start_time_millis: self.start_time_millis,
            end_time_millis: Some(now_millis()),
        }
    }

    /// Elapsed milliseconds, if ended
    pub fn duration_millis(&self) -> Option<i64> {
        self.end_time_millis
            .map(|end| (end - self.start_time_millis).max(0))
    }
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Warehouse-reported statistics for one statement
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_processed: Option<u64>,
}

/// Outcome of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExecutionMetadata>,
}

impl TaskResult {
    /// A task that never ran
    pub fn skipped() -> Self {
        Self {
            status: TaskStatus::Skipped,
            timing: None,
            error_message: None,
            metadata: None,
        }
    }

    /// A task that has just started
    pub fn running() -> Self {
        Self {
            status: TaskStatus::Running,
            timing: Some(Timing::start()),
            error_message: None,
            metadata: None,
        }
    }
}

/// Outcome of one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub target: Target,

    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,

    /// One entry per task, in task order
    #[serde(default)]
    pub tasks: Vec<TaskResult>,
}

impl ActionResult {
    /// An action recorded with a final status and no task results
    pub fn terminal(target: Target, status: ActionStatus) -> Self {
        Self {
            target,
            status,
            timing: None,
            tasks: Vec::new(),
        }
    }

    /// An action whose every task was skipped
    pub fn skipped(target: Target, task_count: usize) -> Self {
        Self {
            target,
            status: ActionStatus::Skipped,
            timing: None,
            tasks: (0..task_count).map(|_| TaskResult::skipped()).collect(),
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Short identifier, kept across resumptions
    pub run_id: String,

    pub status: RunStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,

    #[serde(default)]
    pub actions: Vec<ActionResult>,
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}

impl RunResult {
    /// Create an empty run result
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string()[..8].to_string(),
            status: RunStatus::Running,
            timing: None,
            actions: Vec::new(),
        }
    }

    /// Load a run result from a file path
    pub fn load(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save the run result atomically
    ///
    /// Uses write-to-temp-then-rename pattern to prevent corruption
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        write_json_atomic(path, &serde_json::to_string_pretty(self)?)
    }

    /// Result recorded for `target`
    pub fn action(&self, target: &Target) -> Option<&ActionResult> {
        self.actions.iter().find(|a| &a.target == target)
    }

    /// Whether any action failed
    pub fn has_failures(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.status == ActionStatus::Failed)
    }

    /// Counts per action status
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for action in &self.actions {
            match action.status {
                ActionStatus::Running => summary.running += 1,
                ActionStatus::Successful => summary.successful += 1,
                ActionStatus::Failed => summary.failed += 1,
                ActionStatus::Cancelled => summary.cancelled += 1,
                ActionStatus::Disabled => summary.disabled += 1,
                ActionStatus::CacheSkipped => summary.cache_skipped += 1,
                ActionStatus::Skipped => summary.skipped += 1,
            }
        }
        summary.duration_millis = self.timing.and_then(|t| t.duration_millis());
        summary
    }
}

/// Summary statistics for a run result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub running: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub disabled: usize,
    pub cache_skipped: usize,
    pub skipped: usize,
    pub duration_millis: Option<i64>,
}

/// Write `contents` to `path` via a temp file and rename.
///
/// Temp file includes PID to avoid races from concurrent processes.
pub(crate) fn write_json_atomic(path: &Path, contents: &str) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CoreError::IoWithPath {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
    fs::write(&temp_path, contents).map_err(|e| CoreError::IoWithPath {
        path: temp_path.display().to_string(),
        source: e,
    })?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        }
    })?;
    Ok(())
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Successful => write!(f, "successful"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Running => "running",
            ActionStatus::Successful => "successful",
            ActionStatus::Failed => "failed",
            ActionStatus::Cancelled => "cancelled",
            ActionStatus::Disabled => "disabled",
            ActionStatus::CacheSkipped => "cache skipped",
            ActionStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[path = "result_test.rs"]
mod tests;
