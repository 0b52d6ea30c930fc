//! Warehouse object identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `database.schema.name` identifier for a warehouse object.
///
/// Targets compare structurally and are used directly as map and set keys.
/// The database part is optional; when absent the project's default database
/// applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// Database (project / catalog) containing the schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Schema (dataset) containing the object
    pub schema: String,

    /// Object name
    pub name: String,
}

impl Target {
    /// Create a target without an explicit database.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Set the database of this target.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Human-readable action name: `[database.]schema.name`.
    ///
    /// Several targets may render to the same string, so this is only used
    /// for selection and display, never for indexing.
    pub fn readable_name(&self) -> String {
        match &self.database {
            Some(db) if !db.is_empty() => format!("{}.{}.{}", db, self.schema, self.name),
            _ => format!("{}.{}", self.schema, self.name),
        }
    }

    /// Resolve the database, falling back to `default` when unset.
    pub fn database_or<'a>(&'a self, default: &'a str) -> &'a str {
        match &self.database {
            Some(db) if !db.is_empty() => db,
            _ => default,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.readable_name())
    }
}

#[cfg(test)]
#[path = "target_test.rs"]
mod tests;
