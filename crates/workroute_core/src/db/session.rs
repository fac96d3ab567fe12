//! Engine: connection ownership and per-call connection scoping.
//!
//! # Responsibility
//! - Own the SQLite connection, configuration and clock used by services.
//! - Scope every execution with an acquire/release pair.
//! - Map the configured connection-management mode onto transactions.
//!
//! # Invariants
//! - A scope is released exactly once, either explicitly or on drop.
//! - Nested scopes join the outermost one; only the outermost scope begins
//!   or finishes a transaction.
//! - In autocommit mode the outermost scope commits on success and rolls back
//!   on failure or unwinding.
//! - In explicit mode transactions end only through `commit`/`rollback`.
//! - A release failure never replaces the error of the scoped operation.

use super::open::open_with;
use super::{DbError, DbResult};
use crate::config::{ConnectionManagementMode, EngineConfig};
use chrono::{Local, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use rusqlite::Connection;
use std::cell::Cell;
use std::path::Path;

/// Source of the current time for timestamps and date arithmetic.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Owner of the storage connection shared by all services.
///
/// `Engine` is intentionally `!Sync`: one engine serves one thread of
/// request/response calls.
pub struct Engine {
    conn: Connection,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    depth: Cell<u32>,
    owns_transaction: Cell<bool>,
}

impl Engine {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> DbResult<Self> {
        let conn = open_with("file", config.busy_timeout(), || Connection::open(path))?;
        Ok(Self::from_parts(conn, config))
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory(config: EngineConfig) -> DbResult<Self> {
        let conn = open_with(
            "memory",
            config.busy_timeout(),
            Connection::open_in_memory,
        )?;
        Ok(Self::from_parts(conn, config))
    }

    fn from_parts(conn: Connection, config: EngineConfig) -> Self {
        Self {
            conn,
            config,
            clock: Box::new(SystemClock),
            depth: Cell::new(0),
            owns_transaction: Cell::new(false),
        }
    }

    /// Replaces the clock, typically with a [`FixedClock`] in tests.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connection_mode(&self) -> ConnectionManagementMode {
        self.config.connection_mode
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Number of scopes currently held.
    pub fn active_scopes(&self) -> u32 {
        self.depth.get()
    }

    /// Whether a transaction is open on the underlying connection.
    pub fn is_transaction_active(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Acquires a connection scope for one operation.
    pub fn open_scope(&self, operation: &'static str) -> DbResult<ConnectionScope<'_>> {
        let outermost = self.depth.get() == 0;
        if outermost && self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN DEFERRED;")?;
            let owns = self.config.connection_mode == ConnectionManagementMode::Autocommit;
            self.owns_transaction.set(owns);
            debug!(
                "event=scope_begin module=db status=ok operation={} mode={:?}",
                operation, self.config.connection_mode
            );
        }
        self.depth.set(self.depth.get() + 1);
        Ok(ConnectionScope {
            engine: self,
            operation,
            outermost,
            released: false,
        })
    }

    /// Runs `body` inside a connection scope.
    ///
    /// The scope is released on every exit path. When both `body` and the
    /// release fail, the error of `body` is returned and the release failure
    /// is logged.
    pub fn run<T, E>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let scope = self.open_scope(operation)?;
        let result = body(scope.connection());
        let released = scope.release(result.is_ok());
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(
                    "event=scope_release_failed module=db status=error operation={} error={}",
                    operation, release_err
                );
                Err(err)
            }
        }
    }

    /// Commits the open transaction (explicit mode).
    pub fn commit(&self) -> DbResult<()> {
        self.finish_explicit("COMMIT;")
    }

    /// Rolls back the open transaction (explicit mode).
    pub fn rollback(&self) -> DbResult<()> {
        self.finish_explicit("ROLLBACK;")
    }

    fn finish_explicit(&self, statement: &str) -> DbResult<()> {
        if self.conn.is_autocommit() {
            return Err(DbError::NoActiveTransaction);
        }
        self.conn.execute_batch(statement)?;
        self.owns_transaction.set(false);
        Ok(())
    }

    fn release_scope(&self, outermost: bool, succeeded: bool) -> DbResult<()> {
        self.depth.set(self.depth.get().saturating_sub(1));
        if !outermost || !self.owns_transaction.replace(false) {
            return Ok(());
        }
        if self.conn.is_autocommit() {
            return Ok(());
        }
        if succeeded {
            if let Err(err) = self.conn.execute_batch("COMMIT;") {
                if !self.conn.is_autocommit() {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                }
                return Err(err.into());
            }
            Ok(())
        } else {
            self.conn.execute_batch("ROLLBACK;")?;
            Ok(())
        }
    }
}

/// Guard for one acquired connection scope.
pub struct ConnectionScope<'e> {
    engine: &'e Engine,
    operation: &'static str,
    outermost: bool,
    released: bool,
}

impl<'e> ConnectionScope<'e> {
    pub fn connection(&self) -> &'e Connection {
        &self.engine.conn
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Releases the scope, committing or rolling back as the mode requires.
    pub fn release(mut self, succeeded: bool) -> DbResult<()> {
        self.released = true;
        self.engine.release_scope(self.outermost, succeeded)
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.engine.release_scope(self.outermost, false) {
            warn!(
                "event=scope_release_failed module=db status=error operation={} error={}",
                self.operation, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::config::{ConnectionManagementMode, EngineConfig};
    use crate::db::DbError;

    fn engine(mode: ConnectionManagementMode) -> Engine {
        Engine::open_in_memory(EngineConfig::default().with_connection_mode(mode))
            .expect("in-memory engine should open")
    }

    fn count_rows(engine: &Engine) -> i64 {
        engine
            .run("count", |conn| {
                conn.query_row("SELECT COUNT(*) FROM scratch;", [], |row| row.get(0))
                    .map_err(DbError::from)
            })
            .expect("count should succeed")
    }

    fn create_scratch(engine: &Engine) {
        engine
            .run("ddl", |conn| {
                conn.execute_batch("CREATE TABLE scratch (value INTEGER NOT NULL);")
                    .map_err(DbError::from)
            })
            .expect("ddl should succeed");
    }

    #[test]
    fn autocommit_scope_commits_on_success_and_rolls_back_on_error() {
        let engine = engine(ConnectionManagementMode::Autocommit);
        create_scratch(&engine);

        engine
            .run("insert_ok", |conn| {
                conn.execute("INSERT INTO scratch (value) VALUES (1);", [])
                    .map_err(DbError::from)
            })
            .expect("insert should succeed");
        assert!(!engine.is_transaction_active());

        let result: Result<(), DbError> = engine.run("insert_then_fail", |conn| {
            conn.execute("INSERT INTO scratch (value) VALUES (2);", [])?;
            Err(DbError::NoActiveTransaction)
        });
        assert!(matches!(result, Err(DbError::NoActiveTransaction)));
        assert!(!engine.is_transaction_active());
        assert_eq!(engine.active_scopes(), 0);
        assert_eq!(count_rows(&engine), 1);
    }

    #[test]
    fn nested_scopes_join_the_outer_scope() {
        let engine = engine(ConnectionManagementMode::Autocommit);
        create_scratch(&engine);

        let result: Result<(), DbError> = engine.run("outer", |conn| {
            conn.execute("INSERT INTO scratch (value) VALUES (1);", [])?;
            engine.run("inner", |inner| {
                inner
                    .execute("INSERT INTO scratch (value) VALUES (2);", [])
                    .map_err(DbError::from)
            })?;
            assert_eq!(engine.active_scopes(), 1);
            assert!(engine.is_transaction_active());
            Err(DbError::NoActiveTransaction)
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&engine), 0);
    }

    #[test]
    fn explicit_mode_keeps_transaction_open_until_commit() {
        let engine = engine(ConnectionManagementMode::Explicit);
        engine.commit().expect_err("nothing to commit yet");

        create_scratch(&engine);
        assert!(engine.is_transaction_active());
        engine
            .run("insert", |conn| {
                conn.execute("INSERT INTO scratch (value) VALUES (7);", [])
                    .map_err(DbError::from)
            })
            .expect("insert should succeed");
        assert!(engine.is_transaction_active());
        engine.commit().expect("commit should succeed");
        assert!(!engine.is_transaction_active());

        engine
            .run("insert", |conn| {
                conn.execute("INSERT INTO scratch (value) VALUES (8);", [])
                    .map_err(DbError::from)
            })
            .expect("insert should succeed");
        engine.rollback().expect("rollback should succeed");
        assert_eq!(count_rows(&engine), 1);
    }

    #[test]
    fn dropped_scope_is_released() {
        let engine = engine(ConnectionManagementMode::Autocommit);
        {
            let scope = engine.open_scope("manual").expect("scope should open");
            assert_eq!(scope.operation(), "manual");
            assert_eq!(engine.active_scopes(), 1);
        }
        assert_eq!(engine.active_scopes(), 0);
        assert!(!engine.is_transaction_active());
    }
}
