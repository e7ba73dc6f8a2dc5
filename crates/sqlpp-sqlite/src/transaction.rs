//! Scoped transactions.
//!
//! A [`Transaction`] issues BEGIN when created and COMMIT or ROLLBACK when it
//! is resolved. Only one transaction may be open per connection; the
//! connection's mutex is held for the whole scope, and
//! [`Transaction::try_new`] reports a second attempt instead of waiting.

#![allow(clippy::result_large_err)]

use std::sync::{MutexGuard, PoisonError, TryLockError};

use sqlpp_core::{Error, TransactionError, TransactionErrorKind};

use crate::connection::Connection;
use crate::status::Status;

/// How BEGIN acquires locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionBehavior {
    /// Take locks lazily on first access.
    #[default]
    Deferred,
    /// Take the write lock immediately.
    Immediate,
    /// Take an exclusive lock immediately.
    Exclusive,
}

impl TransactionBehavior {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// What dropping an unresolved transaction does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropBehavior {
    #[default]
    Rollback,
    Commit,
}

/// An open transaction on a [`Connection`].
///
/// Dropping it without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) resolves it according to its
/// [`DropBehavior`]. If that fails the drop panics, unless the thread is
/// already unwinding, in which case the failure is only logged.
pub struct Transaction<'c> {
    conn: &'c Connection,
    drop_behavior: DropBehavior,
    guard: Option<MutexGuard<'c, ()>>,
}

impl<'c> Transaction<'c> {
    /// Begin a deferred transaction that rolls back on drop.
    ///
    /// A [`Connection`] is not `Sync`, so the only transaction that can
    /// already hold it is one opened earlier on this same thread. Calling
    /// `new` while that one is unresolved never returns: the thread waits on
    /// a lock it holds itself (`std::sync::Mutex` may deadlock or panic).
    /// Use [`try_new`](Self::try_new) when a transaction might already be
    /// open.
    pub fn new(conn: &'c Connection) -> Result<Self, Error> {
        Self::with_options(conn, TransactionBehavior::Deferred, DropBehavior::Rollback)
    }

    /// Begin a transaction with explicit lock and drop behavior.
    ///
    /// Waits on the connection's transaction lock like [`new`](Self::new).
    pub fn with_options(
        conn: &'c Connection,
        behavior: TransactionBehavior,
        drop_behavior: DropBehavior,
    ) -> Result<Self, Error> {
        let guard = conn
            .txn_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Self::begin(conn, guard, behavior, drop_behavior)
    }

    /// Begin a transaction, failing instead of blocking when another one is
    /// already active on the connection.
    pub fn try_new(
        conn: &'c Connection,
        behavior: TransactionBehavior,
        drop_behavior: DropBehavior,
    ) -> Result<Self, Error> {
        let guard = match conn.txn_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::AlreadyActive,
                    message: "a transaction is already active on this connection".to_string(),
                }));
            }
        };
        Self::begin(conn, guard, behavior, drop_behavior)
    }

    fn begin(
        conn: &'c Connection,
        guard: MutexGuard<'c, ()>,
        behavior: TransactionBehavior,
        drop_behavior: DropBehavior,
    ) -> Result<Self, Error> {
        let status = conn.execute(behavior.begin_sql());
        if !status.is_ok() {
            // the guard is released on return
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Begin,
                message: format!("{} failed: {}", behavior.begin_sql(), status.into_error(conn)),
            }));
        }
        tracing::debug!(?behavior, ?drop_behavior, "Transaction started");
        Ok(Self {
            conn,
            drop_behavior,
            guard: Some(guard),
        })
    }

    /// The connection the transaction runs on.
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    /// What dropping this transaction will do.
    pub fn drop_behavior(&self) -> DropBehavior {
        self.drop_behavior
    }

    /// Change what dropping this transaction will do.
    pub fn set_drop_behavior(&mut self, drop_behavior: DropBehavior) {
        self.drop_behavior = drop_behavior;
    }

    /// Commit and release the connection.
    pub fn commit(mut self) -> Status {
        self.resolve(DropBehavior::Commit)
    }

    /// Roll back and release the connection.
    pub fn rollback(mut self) -> Status {
        self.resolve(DropBehavior::Rollback)
    }

    fn resolve(&mut self, how: DropBehavior) -> Status {
        let Some(guard) = self.guard.take() else {
            return Status::OK;
        };
        let sql = match how {
            DropBehavior::Commit => "COMMIT",
            DropBehavior::Rollback => "ROLLBACK",
        };
        let status = self.conn.execute(sql);
        drop(guard);
        if status.is_ok() {
            tracing::debug!(resolution = sql, "Transaction finished");
        } else {
            tracing::debug!(resolution = sql, %status, "Transaction resolution failed");
        }
        status
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.guard.is_none() {
            return;
        }
        let status = self.resolve(self.drop_behavior);
        if status.is_ok() {
            return;
        }
        let err = TransactionError {
            kind: TransactionErrorKind::Resolve,
            message: format!(
                "{:?} on drop failed: {}",
                self.drop_behavior,
                status.into_error(self.conn)
            ),
        };
        if std::thread::panicking() {
            tracing::warn!(error = %err, "Transaction could not be resolved while unwinding");
        } else {
            panic!("{}", err);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("drop_behavior", &self.drop_behavior)
            .field("active", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}
