//! Transactional unit of work.
//!
//! # Responsibility
//! - Wrap one SQLite transaction and the cache that lives as long as it.
//! - Give repositories an explicit handle instead of ambient transaction state.
//!
//! # Invariants
//! - A scope dropped without [`Scope::complete`] rolls back every write.
//! - The cache is owned by exactly one scope and dies with it.

use crate::cache::MemberTypeCache;
use crate::config::RepositoryConfig;
use crate::db::DbResult;
use log::{debug, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Active unit of work over one connection.
pub struct Scope<'conn> {
    tx: Transaction<'conn>,
    cache: MemberTypeCache,
}

impl<'conn> Scope<'conn> {
    /// Starts an immediate transaction on `conn`.
    ///
    /// # Errors
    /// - Returns a database error when a transaction is already open on the
    ///   connection or the write lock cannot be taken.
    pub fn begin(conn: &'conn Connection, config: &RepositoryConfig) -> DbResult<Self> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        debug!("event=scope_begin module=scope status=ok");
        Ok(Self {
            tx,
            cache: MemberTypeCache::new(config.cache_capacity),
        })
    }

    /// Commits every write performed through this scope.
    pub fn complete(self) -> DbResult<()> {
        match self.tx.commit() {
            Ok(()) => {
                debug!("event=scope_complete module=scope status=ok");
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=scope_complete module=scope status=error error_code=commit_failed error={}",
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Connection bound to the active transaction.
    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    pub fn cache(&self) -> &MemberTypeCache {
        &self.cache
    }
}
