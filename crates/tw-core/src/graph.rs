//! Compiled graph: the upstream artifact the Builder consumes.
//!
//! The compiler that produces it is external; Tidewater reads it as JSON.

use crate::error::{CoreError, CoreResult};
use crate::execution::{RunConfig, TableMetadata};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// How a dataset is materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    /// Fully rebuilt table
    #[default]
    Table,
    /// View over the query
    View,
    /// Table appended to (or merged into) on subsequent runs
    Incremental,
    /// Inlined into dependents, never materialized
    Inline,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableType::Table => write!(f, "table"),
            TableType::View => write!(f, "view"),
            TableType::Incremental => write!(f, "incremental"),
            TableType::Inline => write!(f, "inline"),
        }
    }
}

/// Project-wide settings carried through to the execution graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Warehouse type identifier (e.g. "duckdb")
    pub warehouse: String,

    /// Database used for targets that do not name one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_database: Option<String>,

    /// Schema used for targets that do not name one
    pub default_schema: String,

    /// Schema assertion views are written to
    pub assertion_schema: String,

    /// Project-level default for run caching
    pub use_run_cache: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            warehouse: "duckdb".to_string(),
            default_database: None,
            default_schema: "main".to_string(),
            assertion_schema: "assertions".to_string(),
            use_run_cache: false,
        }
    }
}

/// Documentation for a single column
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column path; nested fields have more than one element
    pub path: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Descriptive metadata written back to the warehouse after a successful build
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDescriptor>,

    /// Warehouse labels (kept sorted so hashing is stable)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A compiled dataset definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub target: Target,

    #[serde(default)]
    pub dependency_targets: Vec<Target>,

    #[serde(default, rename = "type")]
    pub table_type: TableType,

    /// SELECT statement producing the dataset
    pub query: String,

    /// SELECT statement used for incremental writes (defaults to `query`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_query: Option<String>,

    #[serde(default)]
    pub pre_ops: Vec<String>,

    #[serde(default)]
    pub post_ops: Vec<String>,

    #[serde(default)]
    pub incremental_pre_ops: Vec<String>,

    #[serde(default)]
    pub incremental_post_ops: Vec<String>,

    /// Merge key for incremental writes; empty means append
    #[serde(default)]
    pub unique_key: Vec<String>,

    #[serde(default)]
    pub disabled: bool,

    /// Protected tables may never be fully refreshed
    #[serde(default)]
    pub protected: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_descriptor: Option<ActionDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Table {
    /// Whether this build writes incrementally into an existing table.
    ///
    /// True only for incremental tables that already exist in the warehouse
    /// as a table, when no full refresh was requested.
    pub fn writes_incrementally(
        &self,
        run_config: &RunConfig,
        table_metadata: Option<&TableMetadata>,
    ) -> bool {
        self.table_type == TableType::Incremental
            && !run_config.full_refresh
            && table_metadata.is_some_and(|m| m.table_type == crate::execution::RelationType::Table)
    }
}

/// A compiled list of arbitrary statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub target: Target,

    #[serde(default)]
    pub dependency_targets: Vec<Target>,

    pub queries: Vec<String>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Whether the operation creates its target relation
    #[serde(default)]
    pub has_output: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_descriptor: Option<ActionDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A compiled data-quality check; the query selects violating rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub target: Target,

    #[serde(default)]
    pub dependency_targets: Vec<Target>,

    pub query: String,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A pre-existing relation the project reads but does not build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub target: Target,
}

/// A compile-time error reported by the upstream compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,

    pub message: String,
}

/// Errors attached to a compiled graph
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphErrors {
    pub compilation_errors: Vec<CompilationError>,
}

/// The complete compiled project
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompiledGraph {
    pub project_config: ProjectConfig,
    pub tables: Vec<Table>,
    pub operations: Vec<Operation>,
    pub assertions: Vec<Assertion>,
    pub declarations: Vec<Declaration>,
    pub graph_errors: GraphErrors,
}

/// Borrowed view over any schedulable compiled action
#[derive(Debug, Clone, Copy)]
pub enum CompiledAction<'a> {
    Table(&'a Table),
    Operation(&'a Operation),
    Assertion(&'a Assertion),
}

impl<'a> CompiledAction<'a> {
    pub fn target(&self) -> &'a Target {
        match self {
            CompiledAction::Table(t) => &t.target,
            CompiledAction::Operation(o) => &o.target,
            CompiledAction::Assertion(a) => &a.target,
        }
    }

    pub fn dependency_targets(&self) -> &'a [Target] {
        match self {
            CompiledAction::Table(t) => &t.dependency_targets,
            CompiledAction::Operation(o) => &o.dependency_targets,
            CompiledAction::Assertion(a) => &a.dependency_targets,
        }
    }

    pub fn tags(&self) -> &'a [String] {
        match self {
            CompiledAction::Table(t) => &t.tags,
            CompiledAction::Operation(o) => &o.tags,
            CompiledAction::Assertion(a) => &a.tags,
        }
    }
}

impl CompiledGraph {
    /// Load a compiled graph from a JSON file
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether the compiler reported unresolved errors
    pub fn has_errors(&self) -> bool {
        !self.graph_errors.compilation_errors.is_empty()
    }

    /// All schedulable actions: tables, then operations, then assertions.
    pub fn actions(&self) -> impl Iterator<Item = CompiledAction<'_>> {
        self.tables
            .iter()
            .map(CompiledAction::Table)
            .chain(self.operations.iter().map(CompiledAction::Operation))
            .chain(self.assertions.iter().map(CompiledAction::Assertion))
    }
}
