use super::*;
use crate::execution::{RelationType, TaskKind};
use crate::result::ActionResult;
use tempfile::tempdir;

fn table_action(name: &str, sql: &str) -> ExecutionAction {
    ExecutionAction {
        target: Target::new("s", name),
        action_type: ActionType::Table,
        table_type: Some(TableType::Table),
        dependency_targets: vec![],
        tasks: vec![ExecutionTask::statement(sql)],
        disabled: false,
        action_descriptor: None,
        file_name: None,
    }
}

fn metadata(name: &str, last_updated_millis: i64) -> TableMetadata {
    TableMetadata {
        target: Target::new("s", name),
        table_type: RelationType::Table,
        last_updated_millis,
        description: None,
    }
}

fn cached(action: &ExecutionAction, last_updated_millis: i64) -> CachedState {
    CachedState {
        target: action.target.clone(),
        definition_hash: hash_action(action),
        last_updated_millis,
    }
}

#[test]
fn test_hash_is_deterministic() {
    let a = table_action("a", "create table s.a as select 1");
    assert_eq!(hash_action(&a), hash_action(&a.clone()));
    assert_eq!(hash_action(&a).len(), 64);
}

#[test]
fn test_hash_changes_with_sql() {
    let a = table_action("a", "create table s.a as select 1");
    let b = table_action("a", "create table s.a as select 2");
    assert_ne!(hash_action(&a), hash_action(&b));
}

#[test]
fn test_hash_ignores_dependency_edges() {
    let a = table_action("a", "select 1");
    let mut with_dep = a.clone();
    with_dep.dependency_targets.push(Target::new("s", "upstream"));
    assert_eq!(hash_action(&a), hash_action(&with_dep));
}

#[test]
fn test_hash_changes_with_task_kind() {
    let a = table_action("a", "select 1");
    let mut b = a.clone();
    b.tasks[0].kind = TaskKind::Assertion;
    assert_ne!(hash_action(&a), hash_action(&b));
}

#[test]
fn test_cache_hit_when_everything_unchanged() {
    let action = table_action("a", "select 1");
    let state = cached(&action, 100);
    let meta = metadata("a", 100);
    assert!(is_cache_hit(&action, [], Some(&state), Some(&meta)));
}

#[test]
fn test_newer_warehouse_copy_is_still_a_hit() {
    let action = table_action("a", "select 1");
    let state = cached(&action, 100);
    let meta = metadata("a", 150);
    assert!(is_cache_hit(&action, [], Some(&state), Some(&meta)));
}

#[test]
fn test_miss_when_warehouse_older_than_cache() {
    let action = table_action("a", "select 1");
    let state = cached(&action, 100);
    let meta = metadata("a", 99);
    assert!(!is_cache_hit(&action, [], Some(&state), Some(&meta)));
}

#[test]
fn test_miss_without_cache_entry_or_metadata() {
    let action = table_action("a", "select 1");
    let state = cached(&action, 100);
    let meta = metadata("a", 100);
    assert!(!is_cache_hit(&action, [], None, Some(&meta)));
    assert!(!is_cache_hit(&action, [], Some(&state), None));
}

#[test]
fn test_miss_when_definition_changed() {
    let old = table_action("a", "select 1");
    let new = table_action("a", "select 2");
    let state = cached(&old, 100);
    let meta = metadata("a", 100);
    assert!(!is_cache_hit(&new, [], Some(&state), Some(&meta)));
}

#[test]
fn test_dependencies_must_all_be_cache_hits() {
    let action = table_action("a", "select 1");
    let state = cached(&action, 100);
    let meta = metadata("a", 100);

    assert!(is_cache_hit(
        &action,
        [Some(ActionStatus::CacheSkipped), Some(ActionStatus::CacheSkipped)],
        Some(&state),
        Some(&meta)
    ));
    assert!(!is_cache_hit(
        &action,
        [Some(ActionStatus::CacheSkipped), Some(ActionStatus::Successful)],
        Some(&state),
        Some(&meta)
    ));
    assert!(!is_cache_hit(&action, [None], Some(&state), Some(&meta)));
}

#[test]
fn test_record_run_updates_entries() {
    let a = table_action("a", "select 1");
    let b = table_action("b", "select 2");
    let c = table_action("c", "select 3");
    let mut op = table_action("op", "delete from x");
    op.action_type = ActionType::Operation;

    let graph = ExecutionGraph {
        actions: vec![a.clone(), b.clone(), c.clone(), op.clone()],
        ..Default::default()
    };

    let mut file = CacheStateFile::new();
    file.upsert(cached(&b, 5));
    file.upsert(cached(&c, 5));

    let mut result = RunResult::new();
    result.actions = vec![
        ActionResult::terminal(a.target.clone(), ActionStatus::Successful),
        ActionResult::terminal(b.target.clone(), ActionStatus::CacheSkipped),
        ActionResult::terminal(c.target.clone(), ActionStatus::Failed),
        ActionResult::terminal(op.target.clone(), ActionStatus::Successful),
    ];

    file.record_run(&graph, &result, &[metadata("a", 77), metadata("op", 1)]);

    assert_eq!(file.get(&a.target).unwrap().last_updated_millis, 77);
    assert_eq!(file.get(&a.target).unwrap().definition_hash, hash_action(&a));
    assert_eq!(file.get(&b.target).unwrap().last_updated_millis, 5);
    assert!(file.get(&c.target).is_none());
    assert!(file.get(&op.target).is_none());
}

#[test]
fn test_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache_state.json");

    let mut file = CacheStateFile::new();
    file.upsert(cached(&table_action("a", "select 1"), 12));
    file.save(&path).unwrap();

    let loaded = CacheStateFile::load(&path).unwrap();
    assert_eq!(loaded.cached_states, file.cached_states);
}

#[test]
fn test_load_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let loaded = CacheStateFile::load(&dir.path().join("missing.json")).unwrap();
    assert!(loaded.cached_states.is_empty());
}
