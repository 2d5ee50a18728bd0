//! Storage gateway: one owned connection plus scoped transactions.
//!
//! # Responsibility
//! - Own the connection lifetime for a unit-of-work caller.
//! - Hand out [`TransactionScope`]s that commit explicitly and roll back on
//!   every other exit path.
//! - Classify SQLite failures into connection, statement, commit and
//!   rollback errors.
//!
//! # Invariants
//! - At most one scope is live per gateway (the scope mutably borrows it).
//! - A scope dropped without `commit` rolls back.
//! - Transactions start `IMMEDIATE`, so writers serialize at `BEGIN`.

use super::open::{configure_connection, open_db_in_memory, open_db_with_timeout};
use super::{DbResult, DEFAULT_BUSY_TIMEOUT};
use log::{debug, error, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, DropBehavior, ErrorCode, Params, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{Duration, Instant};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure raised by the gateway, split by where it happened.
#[derive(Debug)]
pub enum GatewayError {
    /// Session unavailable, busy beyond timeout, or lost mid-statement.
    Connection(rusqlite::Error),
    /// Statement rejected: constraint violation, syntax, type mismatch.
    Query(rusqlite::Error),
    /// `COMMIT` failed; nothing from the scope is durable.
    Commit(rusqlite::Error),
    /// `ROLLBACK` failed. `cause` carries the failure that triggered it.
    Rollback {
        source: rusqlite::Error,
        cause: Option<String>,
    },
}

impl GatewayError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Query(_) => "query_error",
            Self::Commit(_) => "commit_error",
            Self::Rollback { .. } => "rollback_error",
        }
    }

    fn from_statement(err: rusqlite::Error) -> Self {
        if is_connection_failure(&err) {
            Self::Connection(err)
        } else {
            Self::Query(err)
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "storage connection failed: {err}"),
            Self::Query(err) => write!(f, "statement failed: {err}"),
            Self::Commit(err) => write!(f, "commit failed: {err}"),
            Self::Rollback {
                source,
                cause: Some(cause),
            } => write!(f, "rollback failed: {source} (after: {cause})"),
            Self::Rollback {
                source,
                cause: None,
            } => write!(f, "rollback failed: {source}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) | Self::Query(err) | Self::Commit(err) => Some(err),
            Self::Rollback { source, .. } => Some(source),
        }
    }
}

/// Rows produced by one statement.
///
/// Statements without result columns report only `affected`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    affected: usize,
}

impl ResultRows {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows inserted/updated/deleted by the statement.
    pub fn affected(&self) -> usize {
        self.affected
    }

    /// Collects one integer column across all rows.
    ///
    /// # Errors
    /// - `Query(InvalidColumnName)` when `column` is not in the result.
    /// - `Query(InvalidColumnType)` when any value is not an integer.
    pub fn i64_column(&self, column: &str) -> GatewayResult<Vec<i64>> {
        let index = self
            .columns
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| {
                GatewayError::Query(rusqlite::Error::InvalidColumnName(column.to_string()))
            })?;

        self.rows
            .iter()
            .map(|row| match &row[index] {
                Value::Integer(value) => Ok(*value),
                other => Err(GatewayError::Query(rusqlite::Error::InvalidColumnType(
                    index,
                    column.to_string(),
                    other.data_type(),
                ))),
            })
            .collect()
    }
}

/// Owned SQLite session with scoped transaction acquisition.
///
/// Constructed once by the caller and injected into whatever runs units of
/// work on it. The connection is released on `close` or drop.
pub struct StorageGateway {
    conn: Connection,
}

impl StorageGateway {
    /// Opens (and migrates) a file database.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Self> {
        Ok(Self {
            conn: open_db_with_timeout(path, busy_timeout)?,
        })
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    /// Wraps an existing connection without running migrations.
    ///
    /// Connection pragmas are still applied so foreign keys are enforced.
    pub fn from_connection(conn: Connection) -> DbResult<Self> {
        configure_connection(&conn, DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Read access for queries that run outside a transaction scope.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts an `IMMEDIATE` transaction.
    ///
    /// # Errors
    /// - `Connection` when the session cannot start a transaction, including
    ///   a competing writer holding the lock past the busy timeout.
    pub fn begin_transaction(&mut self) -> GatewayResult<TransactionScope<'_>> {
        let started_at = Instant::now();
        match self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
        {
            Ok(mut tx) => {
                tx.set_drop_behavior(DropBehavior::Rollback);
                debug!("event=tx_begin module=db status=ok");
                Ok(TransactionScope {
                    tx,
                    started_at,
                    statements: 0,
                })
            }
            Err(err) => {
                error!(
                    "event=tx_begin module=db status=error duration_ms={} error_code=connection_error error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(GatewayError::Connection(err))
            }
        }
    }

    /// Runs `body` inside one transaction.
    ///
    /// Commits when `body` returns `Ok`, rolls back when it returns `Err`.
    /// If the rollback itself fails, the caller receives
    /// [`GatewayError::Rollback`] carrying the body's error message.
    pub fn with_transaction<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut TransactionScope<'_>) -> Result<T, E>,
        E: From<GatewayError> + Display,
    {
        let mut scope = self.begin_transaction()?;
        match body(&mut scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => match scope.rollback() {
                Ok(()) => Err(err),
                Err(GatewayError::Rollback { source, .. }) => Err(GatewayError::Rollback {
                    source,
                    cause: Some(err.to_string()),
                }
                .into()),
                Err(other) => Err(other.into()),
            },
        }
    }

    /// Releases the connection, reporting close failures.
    pub fn close(self) -> GatewayResult<()> {
        self.conn.close().map_err(|(_, err)| {
            warn!("event=db_close module=db status=error error={err}");
            GatewayError::Connection(err)
        })
    }
}

/// One live transaction. Statements run through [`execute`](Self::execute).
pub struct TransactionScope<'g> {
    tx: Transaction<'g>,
    started_at: Instant,
    statements: usize,
}

impl TransactionScope<'_> {
    /// Runs one parameterized statement and collects its rows.
    pub fn execute(&mut self, sql: &str, params: impl Params) -> GatewayResult<ResultRows> {
        self.statements += 1;
        let mut stmt = self.tx.prepare(sql).map_err(GatewayError::from_statement)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();

        if columns.is_empty() {
            let affected = stmt.execute(params).map_err(GatewayError::from_statement)?;
            return Ok(ResultRows {
                columns,
                rows: Vec::new(),
                affected,
            });
        }

        let mut rows = stmt.query(params).map_err(GatewayError::from_statement)?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next().map_err(GatewayError::from_statement)? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                values.push(
                    row.get::<_, Value>(index)
                        .map_err(GatewayError::from_statement)?,
                );
            }
            collected.push(values);
        }

        // RETURNING yields one row per written row.
        let affected = collected.len();
        Ok(ResultRows {
            columns,
            rows: collected,
            affected,
        })
    }

    /// Number of statements executed so far in this scope.
    pub fn statement_count(&self) -> usize {
        self.statements
    }

    pub fn commit(self) -> GatewayResult<()> {
        let statements = self.statements;
        let started_at = self.started_at;
        match self.tx.commit() {
            Ok(()) => {
                debug!(
                    "event=tx_commit module=db status=ok statements={} duration_ms={}",
                    statements,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_commit module=db status=error statements={} duration_ms={} error_code=commit_error error={}",
                    statements,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(GatewayError::Commit(err))
            }
        }
    }

    pub fn rollback(self) -> GatewayResult<()> {
        let statements = self.statements;
        let started_at = self.started_at;
        match self.tx.rollback() {
            Ok(()) => {
                debug!(
                    "event=tx_rollback module=db status=ok statements={} duration_ms={}",
                    statements,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_rollback module=db status=error statements={} error_code=rollback_error error={}",
                    statements, err
                );
                Err(GatewayError::Rollback {
                    source: err,
                    cause: None,
                })
            }
        }
    }
}

fn is_connection_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => matches!(
            inner.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::FileLockingProtocolFailed
                | ErrorCode::OutOfMemory
                | ErrorCode::ReadOnly
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{GatewayError, ResultRows};
    use rusqlite::ffi;
    use rusqlite::types::Value;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_io_failures_classify_as_connection_errors() {
        for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED, ffi::SQLITE_IOERR] {
            let err = GatewayError::from_statement(sqlite_failure(code));
            assert_eq!(err.code(), "connection_error", "code {code}");
        }
    }

    #[test]
    fn constraint_and_misuse_failures_classify_as_query_errors() {
        let constraint = GatewayError::from_statement(sqlite_failure(ffi::SQLITE_CONSTRAINT));
        assert!(matches!(constraint, GatewayError::Query(_)));

        let bad_column =
            GatewayError::from_statement(rusqlite::Error::InvalidColumnName("x".to_string()));
        assert!(matches!(bad_column, GatewayError::Query(_)));
    }

    #[test]
    fn i64_column_reads_integers_and_rejects_other_types() {
        let rows = ResultRows {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![Value::Integer(3), Value::Text("a".to_string())],
                vec![Value::Integer(4), Value::Text("b".to_string())],
            ],
            affected: 2,
        };

        assert_eq!(rows.i64_column("id").unwrap(), vec![3, 4]);
        assert!(matches!(
            rows.i64_column("name").unwrap_err(),
            GatewayError::Query(rusqlite::Error::InvalidColumnType(1, _, _))
        ));
        assert!(matches!(
            rows.i64_column("missing").unwrap_err(),
            GatewayError::Query(rusqlite::Error::InvalidColumnName(_))
        ));
    }

    #[test]
    fn rollback_display_includes_triggering_cause() {
        let err = GatewayError::Rollback {
            source: sqlite_failure(ffi::SQLITE_IOERR),
            cause: Some("customer not found".to_string()),
        };
        assert!(err.to_string().contains("after: customer not found"));
    }
}
