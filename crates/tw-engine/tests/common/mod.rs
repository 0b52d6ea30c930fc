//! In-process warehouse with scripted behavior for Runner tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tw_core::{
    ActionType, ExecutionAction, ExecutionGraph, ExecutionMetadata, ExecutionTask, ProjectConfig,
    TableMetadata, Target,
};
use tw_db::{DbClient, DbError, DbResult, ExecuteOptions, ExecutionOutput, Row, Warehouse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
}

/// One `execute` invocation as the warehouse saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub statement: String,
    pub row_limit: Option<usize>,
    pub labels: BTreeMap<String, String>,
    pub job_prefix: Option<String>,
}

#[derive(Default)]
struct Script {
    failures: HashMap<String, usize>,
    blocking: HashSet<String>,
    delays: HashMap<String, Duration>,
    rows: HashMap<String, Vec<Row>>,
    schemas: HashMap<String, Vec<String>>,
    fail_schemas: bool,
    fail_set_metadata: bool,
    fail_lease: bool,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    events: Mutex<Vec<Event>>,
    created_schemas: Mutex<Vec<(String, String)>>,
    metadata_writes: Mutex<Vec<Target>>,
    started: Notify,
}

impl Shared {
    fn event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone, Default)]
pub struct FakeWarehouse {
    shared: Arc<Shared>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` executions of `statement`
    pub fn fail_times(self, statement: &str, times: usize) -> Self {
        self.shared
            .script
            .lock()
            .unwrap()
            .failures
            .insert(statement.to_string(), times);
        self
    }

    pub fn fail_always(self, statement: &str) -> Self {
        self.fail_times(statement, usize::MAX)
    }

    /// Make `statement` wait until the run is cancelled
    pub fn block(self, statement: &str) -> Self {
        self.shared
            .script
            .lock()
            .unwrap()
            .blocking
            .insert(statement.to_string());
        self
    }

    pub fn delay(self, statement: &str, delay: Duration) -> Self {
        self.shared
            .script
            .lock()
            .unwrap()
            .delays
            .insert(statement.to_string(), delay);
        self
    }

    pub fn rows(self, statement: &str, rows: Vec<Row>) -> Self {
        self.shared
            .script
            .lock()
            .unwrap()
            .rows
            .insert(statement.to_string(), rows);
        self
    }

    pub fn existing_schemas(self, database: &str, schemas: &[&str]) -> Self {
        self.shared.script.lock().unwrap().schemas.insert(
            database.to_string(),
            schemas.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn failing_schemas(self) -> Self {
        self.shared.script.lock().unwrap().fail_schemas = true;
        self
    }

    pub fn failing_set_metadata(self) -> Self {
        self.shared.script.lock().unwrap().fail_set_metadata = true;
        self
    }

    pub fn failing_lease(self) -> Self {
        self.shared.script.lock().unwrap().fail_lease = true;
        self
    }

    pub fn shared(&self) -> Arc<dyn Warehouse> {
        Arc::new(self.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.statement).collect()
    }

    pub fn call_count(&self, statement: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.statement == statement)
            .count()
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    pub fn created_schemas(&self) -> Vec<(String, String)> {
        self.shared.created_schemas.lock().unwrap().clone()
    }

    pub fn metadata_writes(&self) -> Vec<Target> {
        self.shared.metadata_writes.lock().unwrap().clone()
    }

    /// Wait until some statement has started executing
    pub async fn wait_for_start(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.shared.started.notified())
            .await
            .expect("no statement started");
    }
}

struct FakeClient {
    shared: Arc<Shared>,
}

#[async_trait]
impl DbClient for FakeClient {
    async fn execute(
        &mut self,
        statement: &str,
        options: &ExecuteOptions,
    ) -> DbResult<ExecutionOutput> {
        self.shared.calls.lock().unwrap().push(Call {
            statement: statement.to_string(),
            row_limit: options.row_limit,
            labels: options.labels.clone(),
            job_prefix: options.job_prefix.clone(),
        });
        self.shared.event(Event::Start(statement.to_string()));
        self.shared.started.notify_one();

        let (blocking, delay) = {
            let script = self.shared.script.lock().unwrap();
            (
                script.blocking.contains(statement),
                script.delays.get(statement).copied(),
            )
        };
        if blocking {
            options.cancel.cancelled().await;
            self.shared.event(Event::End(statement.to_string()));
            return Err(DbError::Cancelled);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (fail, rows) = {
            let mut script = self.shared.script.lock().unwrap();
            let fail = match script.failures.get_mut(statement) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            let rows = script
                .rows
                .get(statement)
                .cloned()
                .unwrap_or_else(|| vec![vec![serde_json::json!(0)]]);
            (fail, rows)
        };
        self.shared.event(Event::End(statement.to_string()));

        if fail {
            return Err(DbError::ExecutionError(format!("boom: {}", statement)));
        }
        Ok(ExecutionOutput {
            rows,
            metadata: ExecutionMetadata {
                job_id: Some(format!(
                    "{}job",
                    options.job_prefix.clone().unwrap_or_default()
                )),
                rows_affected: None,
                bytes_processed: None,
            },
        })
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    fn warehouse_type(&self) -> &'static str {
        "fake"
    }

    async fn schemas(&self, database: &str) -> DbResult<Vec<String>> {
        let script = self.shared.script.lock().unwrap();
        if script.fail_schemas {
            return Err(DbError::ConnectionError("schemas unavailable".to_string()));
        }
        Ok(script.schemas.get(database).cloned().unwrap_or_default())
    }

    async fn create_schema(&self, database: &str, schema: &str) -> DbResult<()> {
        self.shared
            .created_schemas
            .lock()
            .unwrap()
            .push((database.to_string(), schema.to_string()));
        Ok(())
    }

    async fn set_metadata(&self, action: &ExecutionAction) -> DbResult<()> {
        if self.shared.script.lock().unwrap().fail_set_metadata {
            return Err(DbError::ExecutionError("comment rejected".to_string()));
        }
        self.shared
            .metadata_writes
            .lock()
            .unwrap()
            .push(action.target.clone());
        Ok(())
    }

    async fn table(&self, _target: &Target) -> DbResult<Option<TableMetadata>> {
        Ok(None)
    }

    async fn lease(&self) -> DbResult<Box<dyn DbClient>> {
        if self.shared.script.lock().unwrap().fail_lease {
            return Err(DbError::PoolError("pool closed".to_string()));
        }
        Ok(Box::new(FakeClient {
            shared: Arc::clone(&self.shared),
        }))
    }
}

// ── Graph helpers ───────────────────────────────────────────────────────

pub fn t(name: &str) -> Target {
    Target::new("s", name)
}

/// A table action whose statements are `"<name>:<n>"`
pub fn table(name: &str, deps: &[&str], task_count: usize) -> ExecutionAction {
    ExecutionAction {
        target: t(name),
        action_type: ActionType::Table,
        table_type: None,
        dependency_targets: deps.iter().map(|d| t(d)).collect(),
        tasks: (0..task_count)
            .map(|i| ExecutionTask::statement(format!("{}:{}", name, i)))
            .collect(),
        disabled: task_count == 0,
        action_descriptor: None,
        file_name: None,
    }
}

pub fn operation(name: &str, deps: &[&str]) -> ExecutionAction {
    ExecutionAction {
        action_type: ActionType::Operation,
        ..table(name, deps, 1)
    }
}

pub fn assertion(name: &str, deps: &[&str]) -> ExecutionAction {
    ExecutionAction {
        action_type: ActionType::Assertion,
        tasks: vec![ExecutionTask::assertion(format!("{}:0", name))],
        disabled: false,
        ..table(name, deps, 0)
    }
}

pub fn graph(actions: Vec<ExecutionAction>) -> ExecutionGraph {
    ExecutionGraph {
        project_config: ProjectConfig {
            warehouse: "fake".to_string(),
            ..Default::default()
        },
        actions,
        ..Default::default()
    }
}
