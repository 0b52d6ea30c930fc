//! Runner: drives an execution graph to completion against a warehouse
//!
//! A single scheduler task owns the run result and the pending, executed
//! and succeeded sets. Each launched action runs as its own task on an
//! exclusively leased warehouse session, streams progress back over a
//! channel, and hands its final result to the scheduler when it ends.

use crate::error::{EngineError, EngineResult};
use crate::notifier::{Listener, Listeners, Notifier};
use crate::options::ExecutionOptions;
use crate::retry::RetryPolicy;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tw_core::result::now_millis;
use tw_core::{
    is_cache_hit, ActionResult, ActionStatus, ActionType, ExecutionAction, ExecutionGraph,
    ExecutionTask, RunResult, RunStatus, TaskKind, TaskResult, TaskStatus, Target, Timing,
};
use tw_db::{CancelSignal, CancelSource, DbClient, DbError, ExecuteOptions, Row, Warehouse};

/// Flags shared by the runner handle, the scheduler and every action task
struct Control {
    cancel: CancelSource,
    stopped: AtomicBool,
    timed_out: AtomicBool,
    wake: Notify,
}

impl Control {
    fn new() -> Self {
        Self {
            cancel: CancelSource::new(),
            stopped: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
        self.wake.notify_one();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Cloneable handle for cancelling or stopping a run from elsewhere
#[derive(Clone)]
pub struct RunHandle {
    control: Arc<Control>,
}

impl RunHandle {
    /// Cancel the run. In-flight statements are signalled and every action
    /// that has not started is recorded as skipped.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Stop scheduling and freeze the result for a later resume. Running
    /// actions halt before their next task; nothing is marked skipped.
    pub fn stop(&self) {
        self.control.stop();
    }
}

/// Executes an execution graph
///
/// ```ignore
/// let runner = Runner::new(warehouse, graph, options, None)
///     .on_change(|result| println!("{}", result.status))
///     .execute();
/// let result = runner.result().await?;
/// ```
pub struct Runner {
    control: Arc<Control>,
    listeners: Listeners,
    scheduler: Option<Scheduler>,
    handle: Option<JoinHandle<EngineResult<RunResult>>>,
    start_error: Option<EngineError>,
}

impl Runner {
    /// Create a runner. Passing a previous result resumes that run: its
    /// terminal actions are kept and only the remaining work is executed.
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        graph: ExecutionGraph,
        options: ExecutionOptions,
        resume_from: Option<RunResult>,
    ) -> Self {
        let control = Arc::new(Control::new());
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler::new(
            warehouse,
            Arc::new(graph),
            Arc::new(options),
            Arc::clone(&control),
            Arc::clone(&listeners),
            resume_from,
        );
        Self {
            control,
            listeners,
            scheduler: Some(scheduler),
            handle: None,
            start_error: None,
        }
    }

    /// Register a listener for run result snapshots
    pub fn on_change(self, listener: impl Fn(&RunResult) + Send + Sync + 'static) -> Self {
        let listener: Listener = Box::new(listener);
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
        self
    }

    /// Start the run on the current tokio runtime
    pub fn execute(mut self) -> Self {
        match self.scheduler.take() {
            Some(scheduler) => self.handle = Some(tokio::spawn(scheduler.run())),
            None => self.start_error = Some(EngineError::AlreadyStarted),
        }
        self
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// See [`RunHandle::cancel`]
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// See [`RunHandle::stop`]
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Wait for the run to finish.
    ///
    /// Warehouse failures are recorded in the returned result; an error
    /// means the engine itself could not complete the run.
    pub async fn result(self) -> EngineResult<RunResult> {
        if let Some(err) = self.start_error {
            return Err(err);
        }
        let Some(handle) = self.handle else {
            return Err(EngineError::NotStarted);
        };
        handle
            .await
            .map_err(|e| EngineError::ActionTask(e.to_string()))?
    }
}

/// Create a runner and start it immediately
pub fn run(
    warehouse: Arc<dyn Warehouse>,
    graph: ExecutionGraph,
    options: ExecutionOptions,
    resume_from: Option<RunResult>,
) -> Runner {
    Runner::new(warehouse, graph, options, resume_from).execute()
}

enum Readiness {
    Ready,
    Skip,
    Wait,
}

struct Scheduler {
    warehouse: Arc<dyn Warehouse>,
    graph: Arc<ExecutionGraph>,
    options: Arc<ExecutionOptions>,
    control: Arc<Control>,
    notifier: Notifier,
    result: RunResult,
    /// Indices into `graph.actions` not yet launched or recorded
    pending: Vec<usize>,
    all_targets: HashSet<Target>,
    executed: HashSet<Target>,
    succeeded: HashSet<Target>,
}

impl Scheduler {
    fn new(
        warehouse: Arc<dyn Warehouse>,
        graph: Arc<ExecutionGraph>,
        options: Arc<ExecutionOptions>,
        control: Arc<Control>,
        listeners: Listeners,
        resume_from: Option<RunResult>,
    ) -> Self {
        let result = resume_from.unwrap_or_default();
        let all_targets: HashSet<Target> =
            graph.actions.iter().map(|a| a.target.clone()).collect();

        let mut executed = HashSet::new();
        let mut succeeded = HashSet::new();
        for action in &result.actions {
            if action.status.is_terminal() {
                executed.insert(action.target.clone());
                if action.status.satisfies_dependents() {
                    succeeded.insert(action.target.clone());
                }
            }
        }

        let pending = graph
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| !executed.contains(&a.target))
            .map(|(i, _)| i)
            .collect();

        let notifier = Notifier::new(listeners, options.notification_period);
        Self {
            warehouse,
            graph,
            options,
            control,
            notifier,
            result,
            pending,
            all_targets,
            executed,
            succeeded,
        }
    }

    async fn run(mut self) -> EngineResult<RunResult> {
        self.result.status = RunStatus::Running;
        self.result.timing = Some(Timing::resume(self.result.timing.as_ref()));
        self.notifier.flush(&self.result);

        let deadline = self.graph.run_config.timeout_millis.map(|timeout| {
            let elapsed = self
                .result
                .timing
                .map(|t| (now_millis() - t.start_time_millis).max(0) as u64)
                .unwrap_or(0);
            Instant::now() + Duration::from_millis(timeout.saturating_sub(elapsed))
        });

        if self.result.actions.is_empty() && !self.control.cancel.is_cancelled() {
            self.prepare_schemas().await?;
        }

        let control = Arc::clone(&self.control);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ActionResult>();
        let mut jobs: JoinSet<ActionResult> = JoinSet::new();

        let sleep = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));
        tokio::pin!(sleep);
        let mut timer_armed = deadline.is_some();
        if deadline.is_some_and(|d| d <= Instant::now()) {
            timer_armed = false;
            self.time_out();
        }

        self.schedule(&mut jobs, &progress_tx);

        while !jobs.is_empty() {
            tokio::select! {
                Some(joined) = jobs.join_next() => {
                    let action_result = joined.map_err(|e| EngineError::ActionTask(e.to_string()))?;
                    while let Ok(update) = progress_rx.try_recv() {
                        self.apply_progress(update);
                    }
                    self.finish(action_result);
                    self.schedule(&mut jobs, &progress_tx);
                }
                Some(update) = progress_rx.recv() => {
                    self.apply_progress(update);
                }
                _ = control.wake.notified() => {
                    self.schedule(&mut jobs, &progress_tx);
                }
                _ = &mut sleep, if timer_armed => {
                    timer_armed = false;
                    self.time_out();
                    self.schedule(&mut jobs, &progress_tx);
                }
            }
        }

        if self.control.is_stopped() {
            log::info!(
                "Run {} stopped with {} action(s) not started",
                self.result.run_id,
                self.pending.len()
            );
            self.notifier.flush(&self.result);
            return Ok(self.result);
        }

        if !self.pending.is_empty() {
            let targets: Vec<String> = self
                .pending
                .iter()
                .map(|&i| self.graph.actions[i].target.to_string())
                .collect();
            return Err(EngineError::Stalled {
                count: targets.len(),
                targets: targets.join(", "),
            });
        }

        self.result.timing = self.result.timing.map(|t| t.ended());
        self.result.status = if self.result.has_failures() {
            RunStatus::Failed
        } else if self.control.timed_out.load(Ordering::SeqCst) {
            RunStatus::TimedOut
        } else if self.control.cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Successful
        };
        log::info!("Run {} finished: {}", self.result.run_id, self.result.status);
        self.notifier.flush(&self.result);
        Ok(self.result)
    }

    fn time_out(&mut self) {
        log::warn!(
            "Run {} timed out after {}ms, cancelling",
            self.result.run_id,
            self.graph.run_config.timeout_millis.unwrap_or(0)
        );
        self.control.timed_out.store(true, Ordering::SeqCst);
        self.control.cancel.cancel();
    }

    /// Create every schema the graph writes to that does not exist yet
    async fn prepare_schemas(&self) -> EngineResult<()> {
        let default_database = self
            .graph
            .project_config
            .default_database
            .clone()
            .unwrap_or_default();

        let mut by_database: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for action in &self.graph.actions {
            if action.target.schema.is_empty() {
                continue;
            }
            by_database
                .entry(action.target.database_or(&default_database).to_string())
                .or_default()
                .insert(action.target.schema.clone());
        }

        let warehouse = &self.warehouse;
        try_join_all(by_database.into_iter().map(|(database, schemas)| async move {
            let existing = warehouse
                .schemas(&database)
                .await
                .map_err(|source| EngineError::SchemaPreparation {
                    database: database.clone(),
                    source,
                })?;
            let missing: Vec<String> = schemas
                .into_iter()
                .filter(|s| !existing.contains(s))
                .collect();
            for schema in missing {
                log::info!("Creating schema {} in database '{}'", schema, database);
                warehouse
                    .create_schema(&database, &schema)
                    .await
                    .map_err(|source| EngineError::SchemaPreparation {
                        database: database.clone(),
                        source,
                    })?;
            }
            Ok::<_, EngineError>(())
        }))
        .await?;
        Ok(())
    }

    fn readiness(&self, action: &ExecutionAction) -> Readiness {
        let mut ready = true;
        for dep in action
            .dependency_targets
            .iter()
            .filter(|d| self.all_targets.contains(*d))
        {
            if !self.executed.contains(dep) {
                return Readiness::Wait;
            }
            if !self.succeeded.contains(dep) {
                ready = false;
            }
        }
        if ready {
            Readiness::Ready
        } else {
            Readiness::Skip
        }
    }

    /// Record decisions for every pending action that can be decided now
    /// and launch the ready ones
    fn schedule(
        &mut self,
        jobs: &mut JoinSet<ActionResult>,
        progress: &mpsc::UnboundedSender<ActionResult>,
    ) {
        if self.control.is_stopped() {
            return;
        }

        let graph = Arc::clone(&self.graph);

        if self.control.cancel.is_cancelled() {
            if !self.pending.is_empty() {
                log::info!(
                    "Run cancelled, skipping {} pending action(s)",
                    self.pending.len()
                );
                for index in std::mem::take(&mut self.pending) {
                    let action = &graph.actions[index];
                    self.record(ActionResult::skipped(
                        action.target.clone(),
                        action.tasks.len(),
                    ));
                }
                self.notifier.notify(&self.result);
            }
            return;
        }

        loop {
            let mut ready = Vec::new();
            let mut skippable = Vec::new();
            let mut waiting = Vec::new();
            for index in std::mem::take(&mut self.pending) {
                match self.readiness(&graph.actions[index]) {
                    Readiness::Ready => ready.push(index),
                    Readiness::Skip => skippable.push(index),
                    Readiness::Wait => waiting.push(index),
                }
            }
            self.pending = waiting;

            if ready.is_empty() && skippable.is_empty() {
                break;
            }

            for index in skippable {
                let action = &graph.actions[index];
                log::debug!("Skipping {}: a dependency did not succeed", action.target);
                self.record(ActionResult::skipped(
                    action.target.clone(),
                    action.tasks.len(),
                ));
            }
            for index in ready {
                self.start(index, jobs, progress);
            }
        }

        self.notifier.notify(&self.result);
    }

    fn start(
        &mut self,
        index: usize,
        jobs: &mut JoinSet<ActionResult>,
        progress: &mpsc::UnboundedSender<ActionResult>,
    ) {
        let graph = Arc::clone(&self.graph);
        let action = &graph.actions[index];

        if action.tasks.is_empty() {
            log::debug!("{} is disabled", action.target);
            self.record(ActionResult::terminal(
                action.target.clone(),
                ActionStatus::Disabled,
            ));
            return;
        }

        if graph.run_config.run_cache_enabled() && action.action_type != ActionType::Operation {
            let dependency_statuses = action
                .dependency_targets
                .iter()
                .filter(|d| self.all_targets.contains(*d))
                .map(|d| self.result.action(d).map(|r| r.status));
            if is_cache_hit(
                action,
                dependency_statuses,
                graph.warehouse_state.cached_state(&action.target),
                graph.warehouse_state.table(&action.target),
            ) {
                log::info!("{} is unchanged, skipping (run cache)", action.target);
                self.record(ActionResult::terminal(
                    action.target.clone(),
                    ActionStatus::CacheSkipped,
                ));
                return;
            }
        }

        let mut result = match self.result.action(&action.target) {
            Some(previous) => {
                let mut resumed = previous.clone();
                while resumed.tasks.last().is_some_and(|t| !t.status.is_terminal()) {
                    resumed.tasks.pop();
                }
                resumed.timing = Some(Timing::resume(resumed.timing.as_ref()));
                resumed
            }
            None => ActionResult {
                target: action.target.clone(),
                status: ActionStatus::Running,
                timing: Some(Timing::start()),
                tasks: Vec::new(),
            },
        };
        result.status = ActionStatus::Running;

        log::info!(
            "Starting {} ({} of {} task(s) remaining)",
            action.target,
            action.tasks.len().saturating_sub(result.tasks.len()),
            action.tasks.len()
        );
        self.record(result.clone());

        let job = ActionJob {
            warehouse: Arc::clone(&self.warehouse),
            graph,
            index,
            options: Arc::clone(&self.options),
            control: Arc::clone(&self.control),
            progress: progress.clone(),
            result,
        };
        jobs.spawn(job.run());
    }

    fn finish(&mut self, result: ActionResult) {
        match result.status {
            ActionStatus::Failed => log::warn!("{} failed", result.target),
            status => log::info!("{} finished: {}", result.target, status),
        }
        self.record(result);
        self.notifier.notify(&self.result);
    }

    fn apply_progress(&mut self, update: ActionResult) {
        if self.executed.contains(&update.target) {
            return;
        }
        self.upsert(update);
        self.notifier.notify(&self.result);
    }

    /// Store an action result and update the tracking sets
    fn record(&mut self, result: ActionResult) {
        if result.status.is_terminal() {
            self.executed.insert(result.target.clone());
            if result.status.satisfies_dependents() {
                self.succeeded.insert(result.target.clone());
            }
        }
        self.upsert(result);
    }

    fn upsert(&mut self, result: ActionResult) {
        match self
            .result
            .actions
            .iter_mut()
            .find(|a| a.target == result.target)
        {
            Some(existing) => *existing = result,
            None => self.result.actions.push(result),
        }
    }
}

/// One launched action, run on its own task
struct ActionJob {
    warehouse: Arc<dyn Warehouse>,
    graph: Arc<ExecutionGraph>,
    index: usize,
    options: Arc<ExecutionOptions>,
    control: Arc<Control>,
    progress: mpsc::UnboundedSender<ActionResult>,
    result: ActionResult,
}

impl ActionJob {
    async fn run(mut self) -> ActionResult {
        let graph = Arc::clone(&self.graph);
        let action = &graph.actions[self.index];
        let cancel = self.control.cancel.signal();

        let lease = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            lease = self.warehouse.lease() => Some(lease),
        };
        let mut client: Option<Box<dyn DbClient>> = match lease {
            Some(Ok(client)) => Some(client),
            Some(Err(e)) => {
                log::warn!("Could not lease a session for {}: {}", action.target, e);
                let message = self.warehouse_error(&e);
                self.result.tasks.push(TaskResult {
                    status: TaskStatus::Failed,
                    timing: None,
                    error_message: Some(message),
                    metadata: None,
                });
                self.result.status = ActionStatus::Failed;
                None
            }
            None => {
                self.result.status = ActionStatus::Cancelled;
                None
            }
        };

        for task in action.tasks.iter().skip(self.result.tasks.len()) {
            if self.control.is_stopped() && self.result.status == ActionStatus::Running {
                return self.result;
            }
            let runnable = self.result.status == ActionStatus::Running && !cancel.is_cancelled();
            let Some(client) = client.as_mut().filter(|_| runnable) else {
                if self.result.status == ActionStatus::Running {
                    self.result.status = ActionStatus::Cancelled;
                }
                self.result.tasks.push(TaskResult::skipped());
                continue;
            };
            self.execute_task(&mut **client, action, task, &cancel)
                .await;
        }
        drop(client);

        if self.control.is_stopped() && self.result.status == ActionStatus::Running {
            return self.result;
        }

        if self.result.status == ActionStatus::Running
            && action.action_type == ActionType::Table
            && action.action_descriptor.is_some()
            && !graph.run_config.disable_set_metadata
        {
            if let Err(e) = self.warehouse.set_metadata(action).await {
                log::warn!("Error setting metadata for {}: {}", action.target, e);
                if let Some(last) = self.result.tasks.last_mut() {
                    last.status = TaskStatus::Failed;
                    last.error_message = Some(format!("Error setting metadata: {}", e));
                }
                self.result.status = ActionStatus::Failed;
            }
        }

        if self.result.status == ActionStatus::Running {
            self.result.status = ActionStatus::Successful;
        }
        self.result.timing = self.result.timing.map(|t| t.ended());
        self.result
    }

    async fn execute_task(
        &mut self,
        client: &mut dyn DbClient,
        action: &ExecutionAction,
        task: &ExecutionTask,
        cancel: &CancelSignal,
    ) {
        let mut task_result = TaskResult::running();
        self.result.tasks.push(task_result.clone());
        self.report();

        let options = ExecuteOptions {
            cancel: cancel.clone(),
            row_limit: Some(1),
            byte_limit: None,
            labels: action
                .action_descriptor
                .as_ref()
                .map(|d| d.labels.clone())
                .unwrap_or_default(),
            job_prefix: self.options.job_prefix.clone(),
        };
        let policy = RetryPolicy::new(
            self.options.attempts_for(action.action_type),
            self.options.retry_backoff,
        );

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DbError::Cancelled),
                output = client.execute(&task.statement, &options) => output,
            };
            if let Err(e) = &outcome {
                if policy.should_retry(attempt, cancel).await {
                    log::warn!(
                        "{} attempt {}/{} failed, retrying: {}",
                        action.target,
                        attempt,
                        policy.attempts(),
                        e
                    );
                    continue;
                }
            }
            break outcome;
        };

        match outcome {
            Ok(output) => {
                match assertion_failure(task, &output.rows) {
                    Some(message) => {
                        task_result.status = TaskStatus::Failed;
                        task_result.error_message = Some(message);
                    }
                    None => task_result.status = TaskStatus::Successful,
                }
                task_result.metadata = Some(output.metadata);
            }
            Err(e) => {
                task_result.status = if cancel.is_cancelled() {
                    TaskStatus::Cancelled
                } else {
                    TaskStatus::Failed
                };
                task_result.error_message = Some(self.warehouse_error(&e));
            }
        }
        task_result.timing = task_result.timing.map(|t| t.ended());

        match task_result.status {
            TaskStatus::Failed => self.result.status = ActionStatus::Failed,
            TaskStatus::Cancelled => self.result.status = ActionStatus::Cancelled,
            _ => {}
        }
        if let Some(last) = self.result.tasks.last_mut() {
            *last = task_result;
        }
        self.report();
    }

    fn warehouse_error(&self, err: &DbError) -> String {
        format!("{} error: {}", self.graph.project_config.warehouse, err)
    }

    fn report(&self) {
        // The scheduler outlives every job; a closed channel only means it
        // already returned an error.
        let _ = self.progress.send(self.result.clone());
    }
}

/// Failure message for an assertion task whose count is above zero or
/// missing altogether
fn assertion_failure(task: &ExecutionTask, rows: &[Row]) -> Option<String> {
    if task.kind != TaskKind::Assertion {
        return None;
    }
    match rows.first().and_then(|row| row.first()).and_then(row_count) {
        Some(0) => None,
        Some(count) => Some(format!("Assertion failed: query returned {} row(s).", count)),
        None => Some("Assertion failed: query returned no row count".to_string()),
    }
}

fn row_count(value: &Value) -> Option<u64> {
    let ceil = |f: f64| if f > 0.0 { f.ceil() as u64 } else { 0 };
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(ceil)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(ceil),
        _ => None,
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
