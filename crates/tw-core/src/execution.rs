//! Execution graph: the Builder's output and the Runner's input.

use crate::graph::{ActionDescriptor, ProjectConfig, TableType};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of schedulable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Table,
    Operation,
    Assertion,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Table => write!(f, "table"),
            ActionType::Operation => write!(f, "operation"),
            ActionType::Assertion => write!(f, "assertion"),
        }
    }
}

/// Kind of statement within an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Ordinary statement; success means the warehouse accepted it
    Statement,
    /// Row-count query; a count above zero is a failure
    Assertion,
}

/// One SQL statement within an action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionTask {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub statement: String,
}

impl ExecutionTask {
    pub fn statement(sql: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Statement,
            statement: sql.into(),
        }
    }

    pub fn assertion(sql: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Assertion,
            statement: sql.into(),
        }
    }
}

/// A schedulable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAction {
    pub target: Target,

    #[serde(rename = "type")]
    pub action_type: ActionType,

    /// Materialization for table actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<TableType>,

    /// Dependencies on other in-graph actions
    #[serde(default)]
    pub dependency_targets: Vec<Target>,

    /// Ordered statements; empty for disabled actions
    #[serde(default)]
    pub tasks: Vec<ExecutionTask>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_descriptor: Option<ActionDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Options recognized for a single run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Rebuild incremental tables from scratch
    pub full_refresh: bool,

    /// Action name patterns (`*` wildcard); empty selects everything
    pub nodes: Vec<String>,

    /// Select actions carrying any of these tags
    pub tags: Vec<String>,

    /// Add every transitive dependency of the selection
    pub include_dependencies: bool,

    /// Add every transitive dependent of the selection
    pub include_dependents: bool,

    /// Wall-clock budget for the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,

    /// Skip actions whose definition and inputs are unchanged; `None`
    /// defers to the project configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_run_cache: Option<bool>,

    /// Do not write descriptions and labels after building tables
    pub disable_set_metadata: bool,
}

impl RunConfig {
    /// Whether run caching is on once project defaults are resolved
    pub fn run_cache_enabled(&self) -> bool {
        self.use_run_cache.unwrap_or(false)
    }

    /// Whether the run selects a subset of actions
    pub fn has_selectors(&self) -> bool {
        !self.nodes.is_empty() || !self.tags.is_empty()
    }
}

/// Physical kind of an existing relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Table,
    View,
}

/// Observed metadata of a relation that exists in the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub target: Target,

    #[serde(rename = "type")]
    pub table_type: RelationType,

    /// Last modification time reported by the warehouse
    #[serde(default)]
    pub last_updated_millis: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Cache entry written after an action last built successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedState {
    pub target: Target,

    /// Hash of the action definition at the time it was built
    pub definition_hash: String,

    /// Warehouse modification time observed right after the build
    pub last_updated_millis: i64,
}

/// Snapshot of the warehouse taken before the run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseState {
    pub tables: Vec<TableMetadata>,
    pub cached_states: Vec<CachedState>,
}

impl WarehouseState {
    /// Metadata for `target`, if the relation exists
    pub fn table(&self, target: &Target) -> Option<&TableMetadata> {
        self.tables.iter().find(|t| &t.target == target)
    }

    /// Cache entry for `target`, if one was recorded
    pub fn cached_state(&self, target: &Target) -> Option<&CachedState> {
        self.cached_states.iter().find(|c| &c.target == target)
    }
}

/// A concrete, filtered graph ready to run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionGraph {
    pub project_config: ProjectConfig,
    pub run_config: RunConfig,
    pub warehouse_state: WarehouseState,
    pub actions: Vec<ExecutionAction>,
}

impl ExecutionGraph {
    /// Find the action building `target`
    pub fn action(&self, target: &Target) -> Option<&ExecutionAction> {
        self.actions.iter().find(|a| &a.target == target)
    }
}
