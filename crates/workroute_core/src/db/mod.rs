//! SQLite storage bootstrap, schema migrations and connection scoping.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the routing core.
//! - Apply schema migrations in deterministic order.
//! - Own the single connection of an [`Engine`] and scope every execution to it.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - Every scoped execution releases its connection scope on all exit paths.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod session;

pub use open::{open_db, open_db_in_memory};
pub use session::{Clock, ConnectionScope, Engine, FixedClock, SystemClock};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// `commit`/`rollback` was requested while no explicit transaction is open.
    NoActiveTransaction,
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
            Self::NoActiveTransaction => write!(f, "no explicit transaction is active"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::NoActiveTransaction => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Runs `body` inside a named savepoint on `conn`.
///
/// Savepoints nest inside an already open transaction as well as on a bare
/// connection, so repositories can group multi-statement writes regardless of
/// the surrounding connection-management mode.
pub(crate) fn with_savepoint<T, E>(
    conn: &Connection,
    name: &'static str,
    body: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match body(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
            {
                log::warn!(
                    "event=savepoint_rollback module=db status=error savepoint={} error={}",
                    name,
                    rollback_err
                );
            }
            Err(err)
        }
    }
}
