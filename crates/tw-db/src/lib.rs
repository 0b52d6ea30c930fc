//! tw-db - Warehouse layer for Tidewater
//!
//! This crate provides the `Warehouse` and `DbClient` collaborator traits
//! the Runner drives, the cancellation signal handed to every statement,
//! a pooled DuckDB implementation, the DuckDB SQL adapter, and warehouse
//! state fetching.

pub mod cancel;
pub mod duckdb;
pub mod error;
pub mod sql;
pub mod state;
pub mod traits;

pub use cancel::{CancelSignal, CancelSource};
pub use duckdb::DuckDbWarehouse;
pub use error::{DbError, DbResult};
pub use sql::DuckDbSqlAdapter;
pub use state::fetch_warehouse_state;
pub use traits::{DbClient, ExecuteOptions, ExecutionOutput, Row, Warehouse};
