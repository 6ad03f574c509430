//! Unit of work: one checked-out connection and the transaction on it
//!
//! A [`UnitOfWork`] begins its transaction lazily on the first statement and
//! must be resolved exactly once with [`UnitOfWork::commit`] or
//! [`UnitOfWork::rollback`]; both return the connection to the pool
//! immediately. Nested work is expressed with
//! [`TransactionScope`](super::TransactionScope), which maps to savepoints.
//!
//! Dropping an unresolved unit rolls it back and logs a warning. Dropping a
//! statement future mid-flight leaves the connection in an unknown state, so
//! the unit is poisoned: its next call rolls back, discards the connection
//! and fails with `DbError::InvalidState`.

use std::fmt;

use futures_util::future::BoxFuture;
use ks_core::errors::{BoxError, DbError, DbResult};
use sqlx::pool::PoolConnection;
use sqlx::query::{Query, QueryAs};
use sqlx::{Executor, FromRow, TransactionManager};
use tracing::{debug, warn};

use super::backend::{Db, DbArguments, DbQueryResult, DbRow, DbTransactionManager};
use super::error::{absorb, breaks_connection, classify};
use super::pool::ConnectionPool;
use super::transaction::TransactionScope;

/// Lifecycle of a [`UnitOfWork`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Active,
    Committed,
    RolledBack,
}

pub struct UnitOfWork {
    pool: ConnectionPool,
    conn: Option<PoolConnection<Db>>,
    /// 0 = no transaction, 1 = transaction, N > 1 = N - 1 savepoints
    depth: u32,
    state: UnitState,
    scopes_open: u32,
    /// Savepoint level whose rollback was deferred by a dropped scope
    pending_rollback_to: Option<u32>,
    /// Set while a statement future is being polled
    in_flight: bool,
    /// The connection must not go back to the pool
    broken: bool,
}

impl UnitOfWork {
    pub(crate) fn new(pool: ConnectionPool, conn: PoolConnection<Db>) -> Self {
        Self {
            pool,
            conn: Some(conn),
            depth: 0,
            state: UnitState::Active,
            scopes_open: 0,
            pending_rollback_to: None,
            in_flight: false,
            broken: false,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == UnitState::Active
    }

    /// Current nesting depth: 0 before the transaction begins
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Execute a statement, beginning the transaction if needed
    pub async fn execute<'q>(
        &mut self,
        query: Query<'q, Db, DbArguments<'q>>,
    ) -> DbResult<DbQueryResult> {
        self.ensure_transaction().await?;
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = query.execute(conn).await;
        self.in_flight = false;
        self.settle(result)
    }

    pub async fn fetch_all_as<'q, T>(
        &mut self,
        query: QueryAs<'q, Db, T, DbArguments<'q>>,
    ) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, DbRow> + Send + Unpin,
    {
        self.ensure_transaction().await?;
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = query.fetch_all(conn).await;
        self.in_flight = false;
        self.settle(result)
    }

    pub async fn fetch_optional_as<'q, T>(
        &mut self,
        query: QueryAs<'q, Db, T, DbArguments<'q>>,
    ) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, DbRow> + Send + Unpin,
    {
        self.ensure_transaction().await?;
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = query.fetch_optional(conn).await;
        self.in_flight = false;
        self.settle(result)
    }

    pub async fn fetch_one_as<'q, T>(
        &mut self,
        query: QueryAs<'q, Db, T, DbArguments<'q>>,
    ) -> DbResult<T>
    where
        T: for<'r> FromRow<'r, DbRow> + Send + Unpin,
    {
        self.ensure_transaction().await?;
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = query.fetch_one(conn).await;
        self.in_flight = false;
        self.settle(result)
    }

    /// Commit everything and return the connection to the pool
    ///
    /// # Errors
    /// * `DbError::InvalidState` if a scope is still open or the unit was
    ///   already resolved
    /// * `DbError::Database` if the commit failed; the unit is then rolled
    ///   back and released
    pub async fn commit(&mut self) -> DbResult<()> {
        self.ensure_resolvable()?;
        match self.commit_pending().await {
            Ok(()) => {
                self.finish(UnitState::Committed).await;
                debug!("Unit of work committed");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Commit failed; rolling back unit of work");
                self.abandon_transaction();
                self.finish(UnitState::RolledBack).await;
                Err(err)
            }
        }
    }

    async fn commit_pending(&mut self) -> DbResult<()> {
        self.flush_pending_rollback().await?;
        if self.depth > 0 {
            self.commit_transaction().await?;
        }
        Ok(())
    }

    /// Discard everything and return the connection to the pool
    ///
    /// The connection is released even when the rollback itself fails.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.ensure_resolvable()?;
        self.pending_rollback_to = None;
        let result = if self.depth > 0 {
            self.rollback_transaction().await
        } else {
            Ok(())
        };
        self.finish(UnitState::RolledBack).await;
        debug!("Unit of work rolled back");
        result
    }

    /// Release the unit, rolling back anything uncommitted
    pub async fn close(mut self) -> DbResult<()> {
        if !self.is_active() {
            return Ok(());
        }
        if self.in_flight {
            self.poison();
            return Ok(());
        }
        if self.depth > 0 {
            warn!(
                depth = self.depth,
                "Unit of work closed with uncommitted changes; rolling back"
            );
        }
        self.rollback().await
    }

    /// Run `f` inside a [`TransactionScope`]
    ///
    /// The scope commits when `f` succeeds and rolls back when it fails. At
    /// depth 0 this is the whole transaction; deeper it is a savepoint, so a
    /// failure only undoes the work done by `f`.
    pub async fn transactional<F, R, E>(&mut self, f: F) -> DbResult<R>
    where
        F: for<'c> FnOnce(&'c mut UnitOfWork) -> BoxFuture<'c, Result<R, E>>,
        E: Into<BoxError>,
    {
        let mut scope = TransactionScope::begin(self).await?;
        match f(&mut *scope).await {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let err = absorb(err.into(), "Transaction failed");
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(error = %rollback_err, "Rollback of failed transaction scope also failed");
                }
                Err(err)
            }
        }
    }

    /// Fail if the unit cannot run statements; flush deferred rollbacks
    pub(crate) async fn ensure_usable(&mut self) -> DbResult<()> {
        if self.in_flight {
            self.poison();
            return Err(DbError::invalid_state(
                "unit of work was interrupted by a cancelled statement and has been rolled back",
            ));
        }
        match self.state {
            UnitState::Active => {}
            UnitState::Committed => {
                return Err(DbError::invalid_state("unit of work has already been committed"))
            }
            UnitState::RolledBack => {
                return Err(DbError::invalid_state("unit of work has already been rolled back"))
            }
        }
        self.flush_pending_rollback().await
    }

    /// [`Self::ensure_usable`], then begin the transaction if none is open
    pub(crate) async fn ensure_transaction(&mut self) -> DbResult<()> {
        self.ensure_usable().await?;
        if self.depth == 0 {
            self.begin_transaction().await?;
        }
        Ok(())
    }

    fn ensure_resolvable(&mut self) -> DbResult<()> {
        if self.scopes_open > 0 {
            return Err(DbError::invalid_state(format!(
                "cannot resolve a unit of work while {} transaction scope(s) are open",
                self.scopes_open
            )));
        }
        if self.in_flight {
            self.poison();
            return Err(DbError::invalid_state(
                "unit of work was interrupted by a cancelled statement and has been rolled back",
            ));
        }
        match self.state {
            UnitState::Active => Ok(()),
            UnitState::Committed => {
                Err(DbError::invalid_state("unit of work has already been committed"))
            }
            UnitState::RolledBack => {
                Err(DbError::invalid_state("unit of work has already been rolled back"))
            }
        }
    }

    pub(crate) fn scope_opened(&mut self) {
        self.scopes_open += 1;
    }

    pub(crate) fn scope_closed(&mut self) {
        self.scopes_open = self.scopes_open.saturating_sub(1);
    }

    pub(crate) async fn begin_transaction(&mut self) -> DbResult<()> {
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = DbTransactionManager::begin(conn).await;
        self.in_flight = false;
        self.settle(result)?;
        self.depth = 1;
        debug!("Transaction started");
        Ok(())
    }

    pub(crate) async fn commit_transaction(&mut self) -> DbResult<()> {
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = DbTransactionManager::commit(conn).await;
        self.in_flight = false;
        match self.settle(result) {
            Ok(()) => {
                self.depth = 0;
                debug!("Transaction committed");
                Ok(())
            }
            Err(err) => {
                self.abandon_transaction();
                Err(err)
            }
        }
    }

    pub(crate) async fn rollback_transaction(&mut self) -> DbResult<()> {
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = DbTransactionManager::rollback(conn).await;
        self.in_flight = false;
        self.depth = 0;
        self.pending_rollback_to = None;
        if result.is_err() {
            self.broken = true;
        }
        self.settle(result)?;
        debug!("Transaction rolled back");
        Ok(())
    }

    /// Queue a rollback of the whole transaction without waiting for it
    pub(crate) fn abandon_transaction(&mut self) {
        if !self.in_flight {
            if let Some(conn) = self.conn.as_deref_mut() {
                DbTransactionManager::start_rollback(conn);
            }
        }
        self.depth = 0;
        self.pending_rollback_to = None;
    }

    pub(crate) async fn create_savepoint(&mut self) -> DbResult<()> {
        let level = self.depth + 1;
        self.run_raw(&format!("SAVEPOINT {}", savepoint_name(level)))
            .await?;
        self.depth = level;
        debug!(depth = level, "Savepoint created");
        Ok(())
    }

    pub(crate) async fn release_savepoint(&mut self, level: u32) -> DbResult<()> {
        let released = self
            .run_raw(&format!("RELEASE SAVEPOINT {}", savepoint_name(level)))
            .await;
        if let Err(err) = released {
            self.defer_savepoint_rollback(level);
            return Err(err);
        }
        self.depth = level - 1;
        Ok(())
    }

    pub(crate) async fn rollback_to_savepoint(&mut self, level: u32) -> DbResult<()> {
        let name = savepoint_name(level);
        let rolled_back = self
            .run_raw(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .await;
        if let Err(err) = rolled_back {
            self.defer_savepoint_rollback(level);
            return Err(err);
        }
        self.depth = level - 1;
        self.run_raw(&format!("RELEASE SAVEPOINT {}", name)).await?;
        debug!(depth = level, "Rolled back to savepoint");
        Ok(())
    }

    /// Record that savepoint `level` must be rolled back before the next
    /// statement; used where no await is possible
    pub(crate) fn defer_savepoint_rollback(&mut self, level: u32) {
        self.pending_rollback_to = Some(match self.pending_rollback_to {
            Some(pending) => pending.min(level),
            None => level,
        });
        self.depth = level - 1;
    }

    async fn flush_pending_rollback(&mut self) -> DbResult<()> {
        if let Some(level) = self.pending_rollback_to.take() {
            let name = savepoint_name(level);
            self.run_raw(&format!("ROLLBACK TO SAVEPOINT {}", name))
                .await?;
            self.run_raw(&format!("RELEASE SAVEPOINT {}", name)).await?;
            debug!(depth = level, "Deferred savepoint rollback applied");
        }
        Ok(())
    }

    async fn run_raw(&mut self, sql: &str) -> DbResult<()> {
        let conn = self.conn.as_deref_mut().ok_or_else(released)?;
        self.in_flight = true;
        let result = conn.execute(sql).await;
        self.in_flight = false;
        self.settle(result).map(|_| ())
    }

    fn settle<T>(&mut self, result: Result<T, sqlx::Error>) -> DbResult<T> {
        result.map_err(|e| {
            let err = classify(e);
            if breaks_connection(&err) {
                self.broken = true;
            }
            err
        })
    }

    /// Roll back by discarding the connection; used after a cancelled statement
    fn poison(&mut self) {
        warn!("Statement was cancelled before completing; rolling back unit of work");
        self.in_flight = false;
        self.state = UnitState::RolledBack;
        self.depth = 0;
        self.pending_rollback_to = None;
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }

    async fn finish(&mut self, state: UnitState) {
        self.state = state;
        self.depth = 0;
        self.pending_rollback_to = None;
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, !self.broken).await;
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if self.in_flight {
            warn!("Unit of work dropped during a statement; discarding its connection");
            drop(conn.detach());
            return;
        }
        if self.depth > 0 {
            warn!(
                depth = self.depth,
                "Unit of work dropped without commit or rollback; rolling back"
            );
            DbTransactionManager::start_rollback(&mut conn);
        }
        if self.broken {
            drop(conn.detach());
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state)
            .field("depth", &self.depth)
            .field("scopes_open", &self.scopes_open)
            .field("pending_rollback_to", &self.pending_rollback_to)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

fn savepoint_name(level: u32) -> String {
    format!("ks_sp_{}", level)
}

fn released() -> DbError {
    DbError::invalid_state("unit of work has already released its connection")
}
