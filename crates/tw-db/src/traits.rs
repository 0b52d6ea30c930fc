//! Warehouse collaborator traits consumed by the Runner

use crate::cancel::CancelSignal;
use crate::error::DbResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tw_core::{ExecutionAction, ExecutionMetadata, TableMetadata, Target};

/// One result row, column values in select order
pub type Row = Vec<serde_json::Value>;

/// Per-statement execution options
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Fires when the run is cancelled; implementations should abort the
    /// remote job when it does
    pub cancel: CancelSignal,

    /// Maximum number of rows to return
    pub row_limit: Option<usize>,

    /// Maximum bytes the warehouse may bill or scan
    pub byte_limit: Option<u64>,

    /// Labels attached to the warehouse job
    pub labels: BTreeMap<String, String>,

    /// Prefix for the warehouse job identifier
    pub job_prefix: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            cancel: CancelSignal::never(),
            row_limit: None,
            byte_limit: None,
            labels: BTreeMap::new(),
            job_prefix: None,
        }
    }
}

/// Rows and statistics returned by a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutput {
    pub rows: Vec<Row>,
    pub metadata: ExecutionMetadata,
}

/// An exclusively leased warehouse session.
///
/// Statements sent through one client are never interleaved with another
/// action's statements. Dropping the client returns the session.
#[async_trait]
pub trait DbClient: Send {
    /// Execute one statement
    async fn execute(
        &mut self,
        statement: &str,
        options: &ExecuteOptions,
    ) -> DbResult<ExecutionOutput>;
}

/// Warehouse abstraction for Tidewater
///
/// Implementations must be Send + Sync; sizing and backpressure of the
/// session pool behind `lease` are the implementation's concern.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Warehouse type identifier for logging and error messages
    fn warehouse_type(&self) -> &'static str;

    /// Schema names that exist in `database`
    async fn schemas(&self, database: &str) -> DbResult<Vec<String>>;

    /// Create `schema` in `database` if it does not exist
    async fn create_schema(&self, database: &str, schema: &str) -> DbResult<()>;

    /// Write the action's descriptions and labels to the warehouse
    async fn set_metadata(&self, action: &ExecutionAction) -> DbResult<()>;

    /// Metadata for `target`, or `None` when it does not exist
    async fn table(&self, target: &Target) -> DbResult<Option<TableMetadata>>;

    /// Lease a session for the exclusive use of one action
    async fn lease(&self) -> DbResult<Box<dyn DbClient>>;
}
