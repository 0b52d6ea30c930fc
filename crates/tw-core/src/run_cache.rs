//! Run cache: definition hashing, the cache-hit predicate, and the cache
//! state file persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::checksum::compute_checksum_bytes;
use crate::error::{CoreError, CoreResult};
use crate::execution::{
    ActionType, CachedState, ExecutionAction, ExecutionGraph, ExecutionTask, TableMetadata,
};
use crate::graph::{ActionDescriptor, TableType};
use crate::result::{write_json_atomic, ActionStatus, RunResult};
use crate::target::Target;

/// The parts of an action that define what it writes.
///
/// Dependency edges are left out: they change with node selection, which
/// must not invalidate the cache.
#[derive(Serialize)]
struct DefinitionKey<'a> {
    target: &'a Target,
    action_type: ActionType,
    table_type: Option<TableType>,
    tasks: &'a [ExecutionTask],
    action_descriptor: Option<&'a ActionDescriptor>,
}

/// Deterministic SHA-256 hash of an action's effective definition.
pub fn hash_action(action: &ExecutionAction) -> String {
    let key = DefinitionKey {
        target: &action.target,
        action_type: action.action_type,
        table_type: action.table_type,
        tasks: &action.tasks,
        action_descriptor: action.action_descriptor.as_ref(),
    };
    // Serializing plain structs, Vecs and BTreeMaps cannot fail.
    let bytes = serde_json::to_vec(&key).unwrap_or_default();
    compute_checksum_bytes(&bytes)
}

/// Decide whether `action` can be skipped as a cache hit.
///
/// `dependency_statuses` holds the recorded status of every in-graph
/// dependency (`None` when a dependency has no result yet). All of these
/// must hold:
/// - every dependency was itself a cache hit in this run
/// - a cache entry and current warehouse metadata exist for the target
/// - the warehouse copy was not modified after the cache entry was written
/// - the definition hash is unchanged
pub fn is_cache_hit<I>(
    action: &ExecutionAction,
    dependency_statuses: I,
    cached_state: Option<&CachedState>,
    table_metadata: Option<&TableMetadata>,
) -> bool
where
    I: IntoIterator<Item = Option<ActionStatus>>,
{
    if !dependency_statuses
        .into_iter()
        .all(|status| status == Some(ActionStatus::CacheSkipped))
    {
        return false;
    }

    let (Some(cached), Some(metadata)) = (cached_state, table_metadata) else {
        return false;
    };

    if metadata.last_updated_millis < cached.last_updated_millis {
        return false;
    }

    hash_action(action) == cached.definition_hash
}

/// Cache entries persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStateFile {
    /// When this file was last updated
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub cached_states: Vec<CachedState>,
}

impl Default for CacheStateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStateFile {
    /// Create a new empty cache state file
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            cached_states: Vec::new(),
        }
    }

    /// Load cache state from a file path; a missing file is an empty cache
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save cache state atomically
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        write_json_atomic(path, &serde_json::to_string_pretty(self)?)
    }

    pub fn get(&self, target: &Target) -> Option<&CachedState> {
        self.cached_states.iter().find(|c| &c.target == target)
    }

    /// Insert or replace the entry for the state's target
    pub fn upsert(&mut self, state: CachedState) {
        self.remove(&state.target);
        self.cached_states.push(state);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, target: &Target) {
        self.cached_states.retain(|c| &c.target != target);
        self.updated_at = Utc::now();
    }

    /// Fold the outcome of a finished run into the cache.
    ///
    /// Successful non-operation actions get a fresh entry stamped with the
    /// warehouse time in `tables`; cache hits keep their entry; any other
    /// recorded outcome drops it. Actions without a result are untouched.
    pub fn record_run(
        &mut self,
        graph: &ExecutionGraph,
        result: &RunResult,
        tables: &[TableMetadata],
    ) {
        for action in &graph.actions {
            let Some(action_result) = result.action(&action.target) else {
                continue;
            };
            match action_result.status {
                ActionStatus::CacheSkipped => {}
                ActionStatus::Successful if action.action_type != ActionType::Operation => {
                    match tables.iter().find(|t| t.target == action.target) {
                        Some(metadata) => self.upsert(CachedState {
                            target: action.target.clone(),
                            definition_hash: hash_action(action),
                            last_updated_millis: metadata.last_updated_millis,
                        }),
                        None => {
                            log::debug!(
                                "No warehouse metadata for {}, not caching",
                                action.target
                            );
                            self.remove(&action.target);
                        }
                    }
                }
                _ => self.remove(&action.target),
            }
        }
    }
}

#[cfg(test)]
#[path = "run_cache_test.rs"]
mod tests;
