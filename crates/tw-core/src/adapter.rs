//! SQL statement generation seam between the Builder and a warehouse dialect

use crate::execution::{ExecutionTask, RunConfig, TableMetadata};
use crate::graph::{Assertion, ProjectConfig, Table};

/// Generates warehouse-specific statements for compiled actions.
///
/// Implementations are pure: the same inputs always yield the same tasks.
pub trait SqlAdapter: Send + Sync {
    /// Statements that materialize `table`, excluding its pre and post
    /// operations. `table_metadata` describes the relation as it currently
    /// exists in the warehouse, if at all.
    fn publish_tasks(
        &self,
        table: &Table,
        run_config: &RunConfig,
        table_metadata: Option<&TableMetadata>,
    ) -> Vec<ExecutionTask>;

    /// Statements that evaluate `assertion`. The last one must be an
    /// assertion task whose first result column is the violating row count.
    fn assert_tasks(
        &self,
        assertion: &Assertion,
        project_config: &ProjectConfig,
    ) -> Vec<ExecutionTask>;
}
