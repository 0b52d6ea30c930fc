//! DuckDB statement generation

use tw_core::{
    Assertion, ExecutionTask, ProjectConfig, RelationType, RunConfig, SqlAdapter, Table,
    TableMetadata, TableType, Target,
};

/// Quote an identifier, doubling embedded quotes
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Fully qualified, quoted relation name for a target
pub(crate) fn quote_target(target: &Target) -> String {
    match target.database.as_deref() {
        Some(db) if !db.is_empty() => format!(
            "{}.{}.{}",
            quote_ident(db),
            quote_ident(&target.schema),
            quote_ident(&target.name)
        ),
        _ => format!("{}.{}", quote_ident(&target.schema), quote_ident(&target.name)),
    }
}

/// SQL adapter for DuckDB
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbSqlAdapter;

impl DuckDbSqlAdapter {
    pub fn new() -> Self {
        Self
    }

    fn create_or_replace(relation: &str, kind: RelationType, query: &str) -> String {
        let keyword = match kind {
            RelationType::Table => "TABLE",
            RelationType::View => "VIEW",
        };
        format!("CREATE OR REPLACE {} {} AS {}", keyword, relation, query)
    }

    fn drop_if_exists(relation: &str, kind: RelationType) -> String {
        let keyword = match kind {
            RelationType::Table => "TABLE",
            RelationType::View => "VIEW",
        };
        format!("DROP {} IF EXISTS {}", keyword, relation)
    }

    /// Statements writing new rows into an existing incremental table
    fn incremental_insert(table: &Table, relation: &str) -> Vec<ExecutionTask> {
        let query = table.incremental_query.as_deref().unwrap_or(&table.query);
        let insert = format!(
            "INSERT INTO {} SELECT * FROM ({}) AS insertions",
            relation, query
        );

        if table.unique_key.is_empty() {
            return vec![ExecutionTask::statement(insert)];
        }

        let keys = table
            .unique_key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let delete = format!(
            "DELETE FROM {} WHERE ({}) IN (SELECT {} FROM ({}) AS updates)",
            relation, keys, keys, query
        );
        vec![ExecutionTask::statement(delete), ExecutionTask::statement(insert)]
    }
}

impl SqlAdapter for DuckDbSqlAdapter {
    fn publish_tasks(
        &self,
        table: &Table,
        run_config: &RunConfig,
        table_metadata: Option<&TableMetadata>,
    ) -> Vec<ExecutionTask> {
        let relation = quote_target(&table.target);
        let base_type = match table.table_type {
            TableType::View => RelationType::View,
            TableType::Table | TableType::Incremental => RelationType::Table,
            TableType::Inline => return Vec::new(),
        };

        let mut tasks = Vec::new();

        if let Some(existing) = table_metadata {
            if existing.table_type != base_type {
                tasks.push(ExecutionTask::statement(Self::drop_if_exists(
                    &relation,
                    existing.table_type,
                )));
            }
        }

        if table.writes_incrementally(run_config, table_metadata) {
            tasks.extend(Self::incremental_insert(table, &relation));
        } else {
            tasks.push(ExecutionTask::statement(Self::create_or_replace(
                &relation,
                base_type,
                &table.query,
            )));
        }

        tasks
    }

    fn assert_tasks(
        &self,
        assertion: &Assertion,
        _project_config: &ProjectConfig,
    ) -> Vec<ExecutionTask> {
        let relation = quote_target(&assertion.target);
        vec![
            ExecutionTask::statement(Self::create_or_replace(
                &relation,
                RelationType::View,
                &assertion.query,
            )),
            ExecutionTask::assertion(format!("SELECT COUNT(*) AS row_count FROM {}", relation)),
        ]
    }
}

#[cfg(test)]
#[path = "sql_test.rs"]
mod tests;
