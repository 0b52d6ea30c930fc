use super::*;
use tw_core::{Assertion, Declaration, Operation, Table};

fn t(name: &str) -> Target {
    Target::new("s", name)
}

fn table(name: &str, deps: &[&str]) -> Table {
    Table {
        target: t(name),
        dependency_targets: deps.iter().map(|d| t(d)).collect(),
        table_type: TableType::Table,
        query: format!("select * from {}", name),
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

fn chain() -> CompiledGraph {
    CompiledGraph {
        tables: vec![table("a", &[]), table("b", &["a"]), table("c", &["b"])],
        ..Default::default()
    }
}

fn names(graph: &CompiledGraph) -> Vec<String> {
    graph.actions().map(|a| a.target().name.clone()).collect()
}

#[test]
fn test_no_selectors_includes_everything() {
    let pruned = prune(&chain(), &RunConfig::default()).unwrap();
    assert_eq!(names(&pruned), vec!["a", "b", "c"]);
    assert_eq!(pruned.tables[2].dependency_targets, vec![t("b")]);
}

#[test]
fn test_select_with_dependencies() {
    let run_config = RunConfig {
        nodes: vec!["c".to_string()],
        include_dependencies: true,
        ..Default::default()
    };
    let pruned = prune(&chain(), &run_config).unwrap();
    assert_eq!(names(&pruned), vec!["a", "b", "c"]);
    assert_eq!(pruned.tables[1].dependency_targets, vec![t("a")]);
    assert_eq!(pruned.tables[2].dependency_targets, vec![t("b")]);
}

#[test]
fn test_select_without_dependencies_prunes_edges() {
    let run_config = RunConfig {
        nodes: vec!["c".to_string()],
        ..Default::default()
    };
    let pruned = prune(&chain(), &run_config).unwrap();
    assert_eq!(names(&pruned), vec!["c"]);
    assert!(pruned.tables[0].dependency_targets.is_empty());
}

#[test]
fn test_select_by_readable_name_glob() {
    let run_config = RunConfig {
        nodes: vec!["s.*".to_string()],
        ..Default::default()
    };
    let pruned = prune(&chain(), &run_config).unwrap();
    assert_eq!(names(&pruned).len(), 3);

    let run_config = RunConfig {
        nodes: vec!["other.*".to_string()],
        ..Default::default()
    };
    assert!(names(&prune(&chain(), &run_config).unwrap()).is_empty());
}

#[test]
fn test_select_by_tag() {
    let mut graph = chain();
    graph.tables[1].tags = vec!["daily".to_string()];
    let run_config = RunConfig {
        tags: vec!["daily".to_string()],
        ..Default::default()
    };
    assert_eq!(names(&prune(&graph, &run_config).unwrap()), vec!["b"]);
}

#[test]
fn test_tags_and_nodes_union() {
    let mut graph = chain();
    graph.tables[0].tags = vec!["daily".to_string()];
    let run_config = RunConfig {
        nodes: vec!["c".to_string()],
        tags: vec!["daily".to_string()],
        ..Default::default()
    };
    assert_eq!(names(&prune(&graph, &run_config).unwrap()), vec!["a", "c"]);
}

#[test]
fn test_include_dependents() {
    let mut graph = chain();
    graph.tables.push(table("x", &[]));
    let run_config = RunConfig {
        nodes: vec!["a".to_string()],
        include_dependents: true,
        ..Default::default()
    };
    assert_eq!(
        names(&prune(&graph, &run_config).unwrap()),
        vec!["a", "b", "c"]
    );
}

#[test]
fn test_dependency_expansion_crosses_action_kinds() {
    let graph = CompiledGraph {
        tables: vec![table("a", &[])],
        operations: vec![Operation {
            target: t("op"),
            dependency_targets: vec![t("a")],
            queries: vec!["select 1".to_string()],
            disabled: false,
            tags: vec![],
            has_output: false,
            action_descriptor: None,
            file_name: None,
        }],
        assertions: vec![Assertion {
            target: t("check"),
            dependency_targets: vec![t("op")],
            query: "select 1 where false".to_string(),
            disabled: false,
            tags: vec![],
            file_name: None,
        }],
        ..Default::default()
    };
    let run_config = RunConfig {
        nodes: vec!["check".to_string()],
        include_dependencies: true,
        ..Default::default()
    };
    assert_eq!(
        names(&prune(&graph, &run_config).unwrap()),
        vec!["a", "op", "check"]
    );
}

#[test]
fn test_inline_tables_are_removed() {
    let mut graph = chain();
    graph.tables[0].table_type = TableType::Inline;
    let pruned = prune(&graph, &RunConfig::default()).unwrap();
    assert_eq!(names(&pruned), vec!["b", "c"]);
    assert!(pruned.tables[0].dependency_targets.is_empty());
}

#[test]
fn test_external_dependencies_are_kept() {
    let mut graph = chain();
    graph.tables[0].dependency_targets = vec![Target::new("raw", "events")];
    graph.declarations = vec![Declaration {
        target: Target::new("raw", "events"),
    }];
    let run_config = RunConfig {
        nodes: vec!["a".to_string()],
        ..Default::default()
    };
    let pruned = prune(&graph, &run_config).unwrap();
    assert_eq!(
        pruned.tables[0].dependency_targets,
        vec![Target::new("raw", "events")]
    );
    assert_eq!(pruned.declarations.len(), 1);
}

#[test]
fn test_empty_pattern_is_an_error() {
    let run_config = RunConfig {
        nodes: vec!["  ".to_string()],
        ..Default::default()
    };
    assert!(prune(&chain(), &run_config).is_err());
}
