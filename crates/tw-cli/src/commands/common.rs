//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tw_core::{CacheStateFile, CompiledGraph, Config, ExecutionGraph, RunConfig, Target};
use tw_db::{fetch_warehouse_state, DuckDbSqlAdapter, DuckDbWarehouse};

use crate::cli::{GlobalArgs, SelectionArgs};

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main.rs exits with the code and prints nothing.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// A loaded project: its root, configuration and compiled graph
pub(crate) struct Project {
    pub(crate) root: PathBuf,
    pub(crate) config: Config,
    pub(crate) graph: CompiledGraph,
}

impl Project {
    pub(crate) fn target_dir(&self) -> PathBuf {
        self.config.target_path_absolute(&self.root)
    }

    pub(crate) fn run_result_path(&self) -> PathBuf {
        self.target_dir().join("run_result.json")
    }

    pub(crate) fn cache_state_path(&self) -> PathBuf {
        self.target_dir().join("cache_state.json")
    }

    /// Every target the compiled graph can build
    pub(crate) fn targets(&self) -> Vec<Target> {
        self.graph.actions().map(|a| a.target().clone()).collect()
    }
}

/// Load configuration and the compiled graph
pub(crate) fn load_project(global: &GlobalArgs, selection: &SelectionArgs) -> Result<Project> {
    let root = PathBuf::from(&global.project_dir);
    let config = match &global.config {
        Some(path) => Config::load(Path::new(path)),
        None => Config::load_from_dir(&root),
    }
    .context("Failed to load configuration")?;

    let graph_path = selection
        .graph
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join("compiled_graph.json"));
    let graph = CompiledGraph::load(&graph_path)
        .with_context(|| format!("Failed to load compiled graph {}", graph_path.display()))?;

    if global.verbose {
        eprintln!(
            "[verbose] Loaded {} with {} action(s) from {}",
            config.name,
            graph.actions().count(),
            graph_path.display()
        );
    }

    Ok(Project {
        root,
        config,
        graph,
    })
}

/// Print compilation errors and fail if the graph carries any
pub(crate) fn check_graph_errors(project: &Project) -> Result<()> {
    if !project.graph.has_errors() {
        return Ok(());
    }
    for error in &project.graph.graph_errors.compilation_errors {
        let source = error
            .file_name
            .as_deref()
            .or(error.action_name.as_deref())
            .unwrap_or("graph");
        eprintln!("  \u{2717} {}: {}", source, error.message);
    }
    eprintln!(
        "Compiled graph has {} error(s)",
        project.graph.graph_errors.compilation_errors.len()
    );
    Err(ExitCode(1).into())
}

/// Open the configured DuckDB warehouse
pub(crate) fn open_warehouse(project: &Project, global: &GlobalArgs) -> Result<Arc<DuckDbWarehouse>> {
    let path = project.config.database_path(&project.root);
    if global.verbose {
        eprintln!(
            "[verbose] Opening DuckDB at {} ({} session(s))",
            path, project.config.database.pool_size
        );
    }
    let warehouse = DuckDbWarehouse::new(&path, project.config.database.pool_size)
        .context("Failed to open database")?;
    Ok(Arc::new(warehouse))
}

/// Split a comma-separated flag value
pub(crate) fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Run options shared by `build` and `run`
pub(crate) fn run_config(selection: &SelectionArgs) -> RunConfig {
    RunConfig {
        full_refresh: selection.full_refresh,
        nodes: split_list(selection.nodes.as_deref()),
        tags: split_list(selection.tags.as_deref()),
        include_dependencies: selection.include_deps,
        include_dependents: selection.include_dependents,
        ..Default::default()
    }
}

/// Snapshot the warehouse and build the execution graph
pub(crate) async fn build_graph(
    project: &Project,
    warehouse: &DuckDbWarehouse,
    run_config: &RunConfig,
    cache: &CacheStateFile,
) -> Result<ExecutionGraph> {
    let state = fetch_warehouse_state(warehouse, &project.targets(), cache.cached_states.clone())
        .await
        .context("Failed to read warehouse state")?;
    let graph = tw_engine::build(&project.graph, run_config, &state, &DuckDbSqlAdapter::new())
        .context("Failed to build execution graph")?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert!(split_list(None).is_empty());
        assert_eq!(
            split_list(Some("a, b.c ,,d*")),
            vec!["a".to_string(), "b.c".to_string(), "d*".to_string()]
        );
    }

    #[test]
    fn test_run_config_from_selection() {
        let selection = SelectionArgs {
            graph: None,
            nodes: Some("orders".to_string()),
            tags: Some("daily,hourly".to_string()),
            include_deps: true,
            include_dependents: false,
            full_refresh: true,
        };
        let config = run_config(&selection);
        assert_eq!(config.nodes, vec!["orders"]);
        assert_eq!(config.tags, vec!["daily", "hourly"]);
        assert!(config.include_dependencies);
        assert!(config.full_refresh);
        assert_eq!(config.use_run_cache, None);
    }
}
