//! Scoped transactions and savepoints on a [`UnitOfWork`]

use std::ops::{Deref, DerefMut};

use ks_core::errors::{DbError, DbResult};
use tracing::{debug, warn};

use super::unit_of_work::UnitOfWork;

/// What a [`TransactionScope`] opened when it began
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The unit had no transaction; the scope owns the real one
    Transaction,
    /// The unit was already in a transaction; the scope owns a savepoint
    Savepoint,
}

/// A nestable transaction boundary
///
/// Opened at depth 0 the scope begins the transaction itself; opened deeper
/// it creates a savepoint. Resolve it with [`TransactionScope::commit`] or
/// [`TransactionScope::rollback`]. A scope dropped unresolved rolls back its
/// own work and logs a warning; a savepoint rollback from `Drop` is applied
/// before the unit's next statement.
///
/// The scope borrows the unit mutably and derefs to it, so statements,
/// repositories and inner scopes all go through the scope. That borrow keeps
/// scopes strictly nested: an inner scope must be dropped before its parent
/// is used again.
///
/// # Example
/// ```no_run
/// use ks_infra::database::{ConnectionPool, TransactionScope};
/// use ks_core::errors::DbResult;
///
/// async fn transfer(pool: &ConnectionPool) -> DbResult<()> {
///     let mut uow = pool.unit_of_work().await?;
///     {
///         let mut outer = TransactionScope::begin(&mut uow).await?;
///         outer.execute(sqlx::query("UPDATE accounts SET balance = balance - 10 WHERE id = 1")).await?;
///         {
///             let mut audit = TransactionScope::begin(&mut outer).await?;
///             match audit.execute(sqlx::query("INSERT INTO audit (note) VALUES ('transfer')")).await {
///                 Ok(_) => audit.commit().await?,
///                 Err(_) => audit.rollback().await?,
///             }
///         }
///         outer.commit().await?;
///     }
///     uow.commit().await
/// }
/// ```
pub struct TransactionScope<'u> {
    uow: &'u mut UnitOfWork,
    kind: ScopeKind,
    depth: u32,
    closed: bool,
}

impl<'u> TransactionScope<'u> {
    /// Open a scope on `uow`
    ///
    /// # Errors
    /// `DbError::InvalidState` if the unit was already resolved.
    pub async fn begin(uow: &'u mut UnitOfWork) -> DbResult<TransactionScope<'u>> {
        uow.ensure_usable().await?;
        let kind = if uow.depth() == 0 {
            uow.begin_transaction().await?;
            ScopeKind::Transaction
        } else {
            uow.create_savepoint().await?;
            ScopeKind::Savepoint
        };
        uow.scope_opened();
        let depth = uow.depth();
        debug!(depth, ?kind, "Transaction scope opened");

        Ok(Self {
            uow,
            kind,
            depth,
            closed: false,
        })
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Depth of the unit while this scope is the innermost one
    pub fn level(&self) -> u32 {
        self.depth
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Keep the scope's work: commit the transaction or release the savepoint
    pub async fn commit(&mut self) -> DbResult<()> {
        self.close()?;
        self.uow.ensure_usable().await?;
        self.check_innermost()?;
        match self.kind {
            ScopeKind::Transaction => self.uow.commit_transaction().await,
            ScopeKind::Savepoint => self.uow.release_savepoint(self.depth).await,
        }
    }

    /// Undo the scope's work and nothing outside it
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.close()?;
        self.uow.ensure_usable().await?;
        self.check_innermost()?;
        match self.kind {
            ScopeKind::Transaction => self.uow.rollback_transaction().await,
            ScopeKind::Savepoint => self.uow.rollback_to_savepoint(self.depth).await,
        }
    }

    fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Err(DbError::invalid_state("transaction scope is already closed"));
        }
        self.closed = true;
        self.uow.scope_closed();
        Ok(())
    }

    fn check_innermost(&self) -> DbResult<()> {
        if self.uow.depth() != self.depth {
            return Err(DbError::invalid_state(format!(
                "transaction scope at depth {} closed out of order; unit of work is at depth {}",
                self.depth,
                self.uow.depth()
            )));
        }
        Ok(())
    }
}

impl Deref for TransactionScope<'_> {
    type Target = UnitOfWork;

    fn deref(&self) -> &UnitOfWork {
        &*self.uow
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut UnitOfWork {
        &mut *self.uow
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.uow.scope_closed();
        if !self.uow.is_active() {
            return;
        }
        match self.kind {
            ScopeKind::Transaction => {
                warn!("Transaction scope dropped without commit or rollback; rolling back");
                self.uow.abandon_transaction();
            }
            ScopeKind::Savepoint => {
                warn!(
                    depth = self.depth,
                    "Savepoint scope dropped without commit or rollback; rolling back to savepoint"
                );
                self.uow.defer_savepoint_rollback(self.depth);
            }
        }
    }
}

impl std::fmt::Debug for TransactionScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("kind", &self.kind)
            .field("depth", &self.depth)
            .field("closed", &self.closed)
            .finish()
    }
}
