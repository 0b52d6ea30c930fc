//! Action selection and dependency pruning

use std::collections::{HashMap, HashSet};
use tw_core::{
    CompiledAction, CompiledGraph, CoreResult, NamePattern, RunConfig, TableType, Target,
};

/// Whether an action is schedulable at all; inline tables never are
fn is_schedulable(action: &CompiledAction<'_>) -> bool {
    !matches!(action, CompiledAction::Table(t) if t.table_type == TableType::Inline)
}

/// Compute the targets a run includes.
///
/// Without `nodes` or `tags` every schedulable action is included. Otherwise
/// the selection is expanded to a fixed point with transitive dependencies
/// and then transitive dependents when requested.
pub fn included_targets(graph: &CompiledGraph, run_config: &RunConfig) -> CoreResult<HashSet<Target>> {
    let actions: Vec<CompiledAction<'_>> = graph.actions().filter(is_schedulable).collect();

    if !run_config.has_selectors() {
        return Ok(actions.iter().map(|a| a.target().clone()).collect());
    }

    let patterns = NamePattern::parse_all(&run_config.nodes)?;
    let mut included: HashSet<Target> = actions
        .iter()
        .filter(|action| {
            patterns.iter().any(|p| p.matches_target(action.target()))
                || action.tags().iter().any(|tag| run_config.tags.contains(tag))
        })
        .map(|action| action.target().clone())
        .collect();

    if run_config.include_dependencies {
        let by_target: HashMap<&Target, &CompiledAction<'_>> =
            actions.iter().map(|a| (a.target(), a)).collect();
        let mut queue: Vec<Target> = included.iter().cloned().collect();
        while let Some(target) = queue.pop() {
            let Some(action) = by_target.get(&target) else {
                continue;
            };
            for dep in action.dependency_targets() {
                if by_target.contains_key(dep) && included.insert(dep.clone()) {
                    queue.push(dep.clone());
                }
            }
        }
    }

    if run_config.include_dependents {
        let mut dependents: HashMap<&Target, Vec<&Target>> = HashMap::new();
        for action in &actions {
            for dep in action.dependency_targets() {
                dependents.entry(dep).or_default().push(action.target());
            }
        }
        let mut queue: Vec<Target> = included.iter().cloned().collect();
        while let Some(target) = queue.pop() {
            for dependent in dependents.get(&target).into_iter().flatten() {
                if included.insert((*dependent).clone()) {
                    queue.push((*dependent).clone());
                }
            }
        }
    }

    log::debug!(
        "Selected {} of {} actions",
        included.len(),
        actions.len()
    );
    Ok(included)
}

/// Keep only included actions, dropping dependency edges to excluded ones.
///
/// Dependencies on targets that are not actions at all (declarations and
/// other external relations) are kept; the Runner treats them as satisfied.
pub fn prune(graph: &CompiledGraph, run_config: &RunConfig) -> CoreResult<CompiledGraph> {
    let included = included_targets(graph, run_config)?;
    let action_targets: HashSet<&Target> = graph.actions().map(|a| a.target()).collect();

    let keep_dep = |dep: &Target| included.contains(dep) || !action_targets.contains(dep);

    let tables = graph
        .tables
        .iter()
        .filter(|t| t.table_type != TableType::Inline && included.contains(&t.target))
        .map(|t| {
            let mut t = t.clone();
            t.dependency_targets.retain(|d| keep_dep(d));
            t
        })
        .collect();
    let operations = graph
        .operations
        .iter()
        .filter(|o| included.contains(&o.target))
        .map(|o| {
            let mut o = o.clone();
            o.dependency_targets.retain(|d| keep_dep(d));
            o
        })
        .collect();
    let assertions = graph
        .assertions
        .iter()
        .filter(|a| included.contains(&a.target))
        .map(|a| {
            let mut a = a.clone();
            a.dependency_targets.retain(|d| keep_dep(d));
            a
        })
        .collect();

    Ok(CompiledGraph {
        project_config: graph.project_config.clone(),
        tables,
        operations,
        assertions,
        declarations: graph.declarations.clone(),
        graph_errors: graph.graph_errors.clone(),
    })
}

#[cfg(test)]
#[path = "prune_test.rs"]
mod tests;
