//! Builder: compiled graph + run options + warehouse state -> execution graph

use crate::error::{EngineError, EngineResult};
use crate::prune::prune;
use std::collections::HashMap;
use tw_core::{
    ActionDag, ActionType, Assertion, CompiledGraph, ExecutionAction, ExecutionGraph,
    ExecutionTask, Operation, RunConfig, SqlAdapter, Table, TableMetadata, Target,
    WarehouseState,
};

/// Turns a compiled graph into a concrete, filtered execution graph
pub struct Builder<'a> {
    graph: &'a CompiledGraph,
    run_config: RunConfig,
    warehouse_state: &'a WarehouseState,
    adapter: &'a dyn SqlAdapter,
}

impl<'a> Builder<'a> {
    /// Create a builder. An unset `use_run_cache` takes the project default.
    pub fn new(
        graph: &'a CompiledGraph,
        run_config: &RunConfig,
        warehouse_state: &'a WarehouseState,
        adapter: &'a dyn SqlAdapter,
    ) -> Self {
        let mut run_config = run_config.clone();
        run_config.use_run_cache = Some(
            run_config
                .use_run_cache
                .unwrap_or(graph.project_config.use_run_cache),
        );
        Self {
            graph,
            run_config,
            warehouse_state,
            adapter,
        }
    }

    /// Build the execution graph.
    ///
    /// Pure: identical inputs produce identical graphs.
    pub fn build(&self) -> EngineResult<ExecutionGraph> {
        if self.graph.has_errors() {
            let errors = &self.graph.graph_errors.compilation_errors;
            return Err(EngineError::GraphErrors {
                count: errors.len(),
                first: errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_default(),
            });
        }

        let pruned = prune(self.graph, &self.run_config)?;

        let metadata: HashMap<&Target, &TableMetadata> = self
            .warehouse_state
            .tables
            .iter()
            .map(|t| (&t.target, t))
            .collect();

        let mut actions = Vec::with_capacity(
            pruned.tables.len() + pruned.operations.len() + pruned.assertions.len(),
        );
        for table in &pruned.tables {
            actions.push(self.build_table(table, metadata.get(&table.target).copied())?);
        }
        actions.extend(pruned.operations.iter().map(build_operation));
        actions.extend(pruned.assertions.iter().map(|a| self.build_assertion(a)));

        let dag = ActionDag::build(&actions)?;
        log::debug!("Built execution graph with {} actions", dag.len());

        Ok(ExecutionGraph {
            project_config: self.graph.project_config.clone(),
            run_config: self.run_config.clone(),
            warehouse_state: self.warehouse_state.clone(),
            actions,
        })
    }

    fn build_table(
        &self,
        table: &Table,
        table_metadata: Option<&TableMetadata>,
    ) -> EngineResult<ExecutionAction> {
        if table.protected && self.run_config.full_refresh {
            return Err(EngineError::ProtectedFullRefresh {
                target: table.target.to_string(),
            });
        }

        let tasks = if table.disabled {
            Vec::new()
        } else {
            let incremental = table.writes_incrementally(&self.run_config, table_metadata);
            let (pre_ops, post_ops) = if incremental {
                (&table.incremental_pre_ops, &table.incremental_post_ops)
            } else {
                (&table.pre_ops, &table.post_ops)
            };

            pre_ops
                .iter()
                .map(ExecutionTask::statement)
                .chain(
                    self.adapter
                        .publish_tasks(table, &self.run_config, table_metadata),
                )
                .chain(post_ops.iter().map(ExecutionTask::statement))
                .collect()
        };

        Ok(ExecutionAction {
            target: table.target.clone(),
            action_type: ActionType::Table,
            table_type: Some(table.table_type),
            dependency_targets: table.dependency_targets.clone(),
            tasks,
            disabled: table.disabled,
            action_descriptor: table.action_descriptor.clone(),
            file_name: table.file_name.clone(),
        })
    }

    fn build_assertion(&self, assertion: &Assertion) -> ExecutionAction {
        ExecutionAction {
            target: assertion.target.clone(),
            action_type: ActionType::Assertion,
            table_type: None,
            dependency_targets: assertion.dependency_targets.clone(),
            tasks: if assertion.disabled {
                Vec::new()
            } else {
                self.adapter
                    .assert_tasks(assertion, &self.graph.project_config)
            },
            disabled: assertion.disabled,
            action_descriptor: None,
            file_name: assertion.file_name.clone(),
        }
    }
}

fn build_operation(operation: &Operation) -> ExecutionAction {
    ExecutionAction {
        target: operation.target.clone(),
        action_type: ActionType::Operation,
        table_type: None,
        dependency_targets: operation.dependency_targets.clone(),
        tasks: if operation.disabled {
            Vec::new()
        } else {
            operation
                .queries
                .iter()
                .map(ExecutionTask::statement)
                .collect()
        },
        disabled: operation.disabled,
        action_descriptor: operation.action_descriptor.clone(),
        file_name: operation.file_name.clone(),
    }
}

/// Build an execution graph in one call
pub fn build(
    graph: &CompiledGraph,
    run_config: &RunConfig,
    warehouse_state: &WarehouseState,
    adapter: &dyn SqlAdapter,
) -> EngineResult<ExecutionGraph> {
    Builder::new(graph, run_config, warehouse_state, adapter).build()
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
