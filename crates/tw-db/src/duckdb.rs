//! DuckDB warehouse with a pool of exclusively leased sessions

use crate::error::{DbError, DbResult};
use crate::sql::{quote_ident, quote_literal, quote_target};
use crate::traits::{DbClient, ExecuteOptions, ExecutionOutput, Row, Warehouse};
use async_trait::async_trait;
use duckdb::types::Value;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tw_core::{
    ExecutionAction, ExecutionMetadata, RelationType, TableMetadata, TableType, Target,
};
use uuid::Uuid;

type SharedConnection = Arc<Mutex<Connection>>;

struct SessionPool {
    idle: Mutex<Vec<SharedConnection>>,
    permits: Arc<Semaphore>,
}

/// DuckDB warehouse
///
/// All sessions are clones of one database handle, so they see the same
/// catalog. DuckDB keeps no modification clock, so table metadata always
/// reports `last_updated_millis = 0`.
pub struct DuckDbWarehouse {
    admin: SharedConnection,
    pool: Arc<SessionPool>,
    pool_size: usize,
}

impl DuckDbWarehouse {
    /// Create a new in-memory DuckDB warehouse
    pub fn in_memory(pool_size: usize) -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::with_connection(conn, pool_size)
    }

    /// Open a DuckDB warehouse from a file path
    pub fn from_path(path: &Path, pool_size: usize) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::with_connection(conn, pool_size)
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str, pool_size: usize) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory(pool_size)
        } else {
            Self::from_path(Path::new(path), pool_size)
        }
    }

    fn with_connection(conn: Connection, pool_size: usize) -> DbResult<Self> {
        let pool_size = pool_size.max(1);
        let sessions = (0..pool_size)
            .map(|_| {
                conn.try_clone()
                    .map(|c| Arc::new(Mutex::new(c)))
                    .map_err(|e| DbError::ConnectionError(e.to_string()))
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Self {
            admin: Arc::new(Mutex::new(conn)),
            pool: Arc::new(SessionPool {
                idle: Mutex::new(sessions),
                permits: Arc::new(Semaphore::new(pool_size)),
            }),
            pool_size,
        })
    }

    /// Number of sessions that can be leased at once
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Execute one or more statements outside any lease
    pub async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        run_blocking(Arc::clone(&self.admin), move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| DbError::ExecutionError(e.to_string()))
        })
        .await
    }

    /// Count the rows returned by a query
    pub async fn query_count(&self, sql: &str) -> DbResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM ({})", sql);
        run_blocking(Arc::clone(&self.admin), move |conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

/// Run `f` against a locked connection on the blocking pool
async fn run_blocking<T, F>(conn: SharedConnection, f: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        f(&conn)
    })
    .await
    .map_err(|e| DbError::Internal(e.to_string()))?
}

/// Name of the catalog `database` refers to; empty means the current one
fn resolve_database(conn: &Connection, database: &str) -> DbResult<String> {
    if !database.is_empty() {
        return Ok(database.to_string());
    }
    Ok(conn.query_row("SELECT current_database()", [], |row| row.get(0))?)
}

fn query_rows(conn: &Connection, sql: &str, row_limit: Option<usize>) -> DbResult<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let column_count = rows.as_ref().map(|s| s.column_count()).unwrap_or(0);

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if row_limit.is_some_and(|limit| out.len() >= limit) {
            break;
        }
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: Value = row.get(i)?;
            values.push(to_json(value));
        }
        out.push(values);
    }
    Ok(out)
}

fn to_json(value: Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(b),
        Value::TinyInt(n) => n.into(),
        Value::SmallInt(n) => n.into(),
        Value::Int(n) => n.into(),
        Value::BigInt(n) => n.into(),
        Value::HugeInt(n) => i64::try_from(n)
            .map(Json::from)
            .unwrap_or_else(|_| Json::String(n.to_string())),
        Value::UTinyInt(n) => n.into(),
        Value::USmallInt(n) => n.into(),
        Value::UInt(n) => n.into(),
        Value::UBigInt(n) => n.into(),
        Value::Float(f) => Json::from(f64::from(f)),
        Value::Double(f) => Json::from(f),
        Value::Text(s) => Json::String(s),
        other => Json::String(format!("{:?}", other)),
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    fn warehouse_type(&self) -> &'static str {
        "duckdb"
    }

    async fn schemas(&self, database: &str) -> DbResult<Vec<String>> {
        let database = database.to_string();
        run_blocking(Arc::clone(&self.admin), move |conn| {
            let catalog = resolve_database(conn, &database)?;
            let mut stmt = conn.prepare(
                "SELECT schema_name FROM information_schema.schemata WHERE catalog_name = ?",
            )?;
            let names = stmt
                .query_map([catalog], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn create_schema(&self, database: &str, schema: &str) -> DbResult<()> {
        let sql = if database.is_empty() {
            format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
        } else {
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}.{}",
                quote_ident(database),
                quote_ident(schema)
            )
        };
        log::debug!("Creating schema: {}", sql);
        self.execute_batch(&sql).await
    }

    async fn set_metadata(&self, action: &ExecutionAction) -> DbResult<()> {
        let Some(descriptor) = &action.action_descriptor else {
            return Ok(());
        };

        let is_view = action.table_type == Some(TableType::View);
        let relation = quote_target(&action.target);
        let mut statements = Vec::new();

        if let Some(description) = &descriptor.description {
            statements.push(format!(
                "COMMENT ON {} {} IS {}",
                if is_view { "VIEW" } else { "TABLE" },
                relation,
                quote_literal(description)
            ));
        }

        for column in &descriptor.columns {
            match (column.path.as_slice(), &column.description) {
                ([name], Some(description)) if !is_view => statements.push(format!(
                    "COMMENT ON COLUMN {}.{} IS {}",
                    relation,
                    quote_ident(name),
                    quote_literal(description)
                )),
                (_, None) => {}
                (path, Some(_)) => log::debug!(
                    "Skipping description for column {} of {}",
                    path.join("."),
                    action.target
                ),
            }
        }

        if !descriptor.labels.is_empty() {
            log::debug!(
                "DuckDB has no relation labels, ignoring {} label(s) on {}",
                descriptor.labels.len(),
                action.target
            );
        }

        if statements.is_empty() {
            return Ok(());
        }
        self.execute_batch(&statements.join(";\n")).await
    }

    async fn table(&self, target: &Target) -> DbResult<Option<TableMetadata>> {
        let target = target.clone();
        run_blocking(Arc::clone(&self.admin), move |conn| {
            let catalog = resolve_database(conn, target.database.as_deref().unwrap_or(""))?;
            let mut stmt = conn.prepare(
                "SELECT 'table', comment FROM duckdb_tables() \
                 WHERE database_name = ? AND schema_name = ? AND table_name = ? \
                 UNION ALL \
                 SELECT 'view', comment FROM duckdb_views() \
                 WHERE database_name = ? AND schema_name = ? AND view_name = ?",
            )?;
            let found = stmt
                .query_map(
                    params![
                        catalog,
                        target.schema,
                        target.name,
                        catalog,
                        target.schema,
                        target.name
                    ],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(found.into_iter().next().map(|(kind, comment)| TableMetadata {
                table_type: if kind == "view" {
                    RelationType::View
                } else {
                    RelationType::Table
                },
                last_updated_millis: 0,
                description: comment.filter(|c| !c.is_empty()),
                target,
            }))
        })
        .await
    }

    async fn lease(&self) -> DbResult<Box<dyn DbClient>> {
        let permit = Arc::clone(&self.pool.permits)
            .acquire_owned()
            .await
            .map_err(|e| DbError::PoolError(e.to_string()))?;
        let conn = self
            .pool
            .idle
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?
            .pop()
            .ok_or_else(|| DbError::PoolError("no idle session".to_string()))?;

        Ok(Box::new(DuckDbSession {
            conn,
            pool: Arc::clone(&self.pool),
            _permit: permit,
        }))
    }
}

/// A leased DuckDB session; returned to the pool on drop
struct DuckDbSession {
    conn: SharedConnection,
    pool: Arc<SessionPool>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for DuckDbSession {
    fn drop(&mut self) {
        // The permit is released after this runs, so the session is idle first.
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.push(Arc::clone(&self.conn));
        }
    }
}

#[async_trait]
impl DbClient for DuckDbSession {
    async fn execute(
        &mut self,
        statement: &str,
        options: &ExecuteOptions,
    ) -> DbResult<ExecutionOutput> {
        if options.cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }

        let job_id = format!(
            "{}{}",
            options.job_prefix.as_deref().unwrap_or(""),
            Uuid::new_v4().simple()
        );
        log::debug!("DuckDB job {}: {}", job_id, statement);

        let sql = statement.to_string();
        let row_limit = options.row_limit;
        let work = run_blocking(Arc::clone(&self.conn), move |conn| {
            query_rows(conn, &sql, row_limit)
        });

        // DuckDB statements cannot be interrupted from here. On cancel the
        // session goes back to the pool at once, but the blocking statement
        // keeps its connection locked, so the next lease of it waits until
        // the statement finishes.
        let rows = tokio::select! {
            rows = work => rows?,
            _ = options.cancel.cancelled() => return Err(DbError::Cancelled),
        };

        Ok(ExecutionOutput {
            rows,
            metadata: ExecutionMetadata {
                job_id: Some(job_id),
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
