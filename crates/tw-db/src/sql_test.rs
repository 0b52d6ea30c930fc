use super::*;
use tw_core::TaskKind;

fn table(table_type: TableType) -> Table {
    Table {
        target: Target::new("analytics", "orders"),
        dependency_targets: vec![],
        table_type,
        query: "SELECT 1 AS id".to_string(),
        incremental_query: None,
        pre_ops: vec![],
        post_ops: vec![],
        incremental_pre_ops: vec![],
        incremental_post_ops: vec![],
        unique_key: vec![],
        disabled: false,
        protected: false,
        tags: vec![],
        action_descriptor: None,
        file_name: None,
    }
}

fn existing(kind: RelationType) -> TableMetadata {
    TableMetadata {
        target: Target::new("analytics", "orders"),
        table_type: kind,
        last_updated_millis: 0,
        description: None,
    }
}

fn statements(tasks: &[ExecutionTask]) -> Vec<&str> {
    tasks.iter().map(|t| t.statement.as_str()).collect()
}

#[test]
fn test_quote_target() {
    assert_eq!(
        quote_target(&Target::new("s", "t")),
        "\"s\".\"t\""
    );
    assert_eq!(
        quote_target(&Target::new("s", "t").with_database("db")),
        "\"db\".\"s\".\"t\""
    );
    assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    assert_eq!(quote_literal("it's"), "'it''s'");
}

#[test]
fn test_publish_table() {
    let tasks = DuckDbSqlAdapter.publish_tasks(&table(TableType::Table), &RunConfig::default(), None);
    assert_eq!(
        statements(&tasks),
        vec!["CREATE OR REPLACE TABLE \"analytics\".\"orders\" AS SELECT 1 AS id"]
    );
}

#[test]
fn test_publish_view_over_existing_table_drops_it() {
    let meta = existing(RelationType::Table);
    let tasks =
        DuckDbSqlAdapter.publish_tasks(&table(TableType::View), &RunConfig::default(), Some(&meta));
    assert_eq!(tasks.len(), 2);
    assert_eq!(
        tasks[0].statement,
        "DROP TABLE IF EXISTS \"analytics\".\"orders\""
    );
    assert!(tasks[1].statement.starts_with("CREATE OR REPLACE VIEW"));
}

#[test]
fn test_incremental_without_existing_table_creates_it() {
    let tasks =
        DuckDbSqlAdapter.publish_tasks(&table(TableType::Incremental), &RunConfig::default(), None);
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].statement.starts_with("CREATE OR REPLACE TABLE"));
}

#[test]
fn test_incremental_append() {
    let mut t = table(TableType::Incremental);
    t.incremental_query = Some("SELECT 2 AS id".to_string());
    let meta = existing(RelationType::Table);
    let tasks = DuckDbSqlAdapter.publish_tasks(&t, &RunConfig::default(), Some(&meta));
    assert_eq!(
        statements(&tasks),
        vec!["INSERT INTO \"analytics\".\"orders\" SELECT * FROM (SELECT 2 AS id) AS insertions"]
    );
}

#[test]
fn test_incremental_merge_on_unique_key() {
    let mut t = table(TableType::Incremental);
    t.unique_key = vec!["id".to_string()];
    let meta = existing(RelationType::Table);
    let tasks = DuckDbSqlAdapter.publish_tasks(&t, &RunConfig::default(), Some(&meta));
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].statement.starts_with("DELETE FROM"));
    assert!(tasks[0].statement.contains("(\"id\") IN (SELECT \"id\""));
    assert!(tasks[1].statement.starts_with("INSERT INTO"));
}

#[test]
fn test_incremental_full_refresh_rebuilds() {
    let meta = existing(RelationType::Table);
    let run_config = RunConfig {
        full_refresh: true,
        ..Default::default()
    };
    let tasks =
        DuckDbSqlAdapter.publish_tasks(&table(TableType::Incremental), &run_config, Some(&meta));
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].statement.starts_with("CREATE OR REPLACE TABLE"));
}

#[test]
fn test_assert_tasks() {
    let assertion = Assertion {
        target: Target::new("assertions", "orders_unique"),
        dependency_targets: vec![],
        query: "SELECT id FROM analytics.orders GROUP BY id HAVING COUNT(*) > 1".to_string(),
        disabled: false,
        tags: vec![],
        file_name: None,
    };
    let tasks = DuckDbSqlAdapter.assert_tasks(&assertion, &ProjectConfig::default());
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].kind, TaskKind::Statement);
    assert!(tasks[0].statement.starts_with("CREATE OR REPLACE VIEW \"assertions\""));
    assert_eq!(tasks[1].kind, TaskKind::Assertion);
    assert_eq!(
        tasks[1].statement,
        "SELECT COUNT(*) AS row_count FROM \"assertions\".\"orders_unique\""
    );
}
