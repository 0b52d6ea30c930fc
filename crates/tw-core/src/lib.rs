//! tw-core - Core library for Tidewater
//!
//! This crate provides the shared value types (targets, the compiled graph,
//! the execution graph and run results), configuration parsing, action
//! name patterns, the action DAG, and the run cache used by the Builder and
//! the Runner.

pub mod adapter;
pub mod checksum;
pub mod config;
pub mod dag;
pub mod error;
pub mod execution;
pub mod graph;
pub mod pattern;
pub mod result;
pub mod run_cache;
pub mod target;

pub use adapter::SqlAdapter;
pub use config::Config;
pub use dag::ActionDag;
pub use error::{CoreError, CoreResult};
pub use execution::{
    ActionType, CachedState, ExecutionAction, ExecutionGraph, ExecutionTask, RelationType,
    RunConfig, TableMetadata, TaskKind, WarehouseState,
};
pub use graph::{
    ActionDescriptor, Assertion, ColumnDescriptor, CompilationError, CompiledAction,
    CompiledGraph, Declaration, GraphErrors, Operation, ProjectConfig, Table, TableType,
};
pub use pattern::NamePattern;
pub use result::{
    ActionResult, ActionStatus, ExecutionMetadata, RunResult, RunStatus, RunSummary, TaskResult,
    TaskStatus, Timing,
};
pub use run_cache::{hash_action, is_cache_hit, CacheStateFile};
pub use target::Target;
