//! SQLite storage bootstrap, schema migrations and the transactional gateway.
//!
//! # Responsibility
//! - Open and configure SQLite connections for sales core.
//! - Apply schema migrations in deterministic order.
//! - Hand out scoped transactions through [`StorageGateway`].
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write sales data before migrations succeed.
//! - Every connection handed out has `foreign_keys=ON`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod gateway;
pub mod migrations;
mod open;

pub use gateway::{
    GatewayError, GatewayResult, ResultRows, StorageGateway, TransactionScope,
};
pub use open::{open_db, open_db_in_memory, open_db_with_timeout, DEFAULT_BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
