//! Error types for tw-engine

use thiserror::Error;
use tw_core::CoreError;
use tw_db::DbError;

/// Builder and scheduler errors.
///
/// Warehouse failures during a run are recorded in the `RunResult`; only
/// failures of the engine itself surface here.
#[derive(Error, Debug)]
pub enum EngineError {
    /// B001: The compiled graph carries compilation errors
    #[error("[B001] Project has {count} unresolved compilation error(s): {first}")]
    GraphErrors { count: usize, first: String },

    /// B003: Full refresh requested for a protected dataset
    #[error("[B003] Protected dataset {target} cannot be fully refreshed")]
    ProtectedFullRefresh { target: String },

    /// R001: Schema preparation failed before any action ran
    #[error("[R001] Failed to prepare schemas in database '{database}': {source}")]
    SchemaPreparation {
        database: String,
        #[source]
        source: DbError,
    },

    /// R002: Pending actions can never become ready
    #[error("[R002] Scheduler stalled with {count} pending action(s): {targets}")]
    Stalled { count: usize, targets: String },

    /// R003: An action task panicked or was aborted
    #[error("[R003] Action task failed to complete: {0}")]
    ActionTask(String),

    /// R004: execute() called more than once
    #[error("[R004] Runner already started")]
    AlreadyStarted,

    /// R005: result() called on a runner that was never started
    #[error("[R005] Runner was never started")]
    NotStarted,

    /// Core error (patterns, cycles, duplicate targets)
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for EngineError
pub type EngineResult<T> = Result<T, EngineError>;
