//! Transaction resource registry.
//!
//! A [`TransactionResources`] value pins at most one connection per
//! connection source for the duration of a transaction. It is an explicit
//! context value: the code running a transaction owns it and passes it to the
//! `*_in` template operations, which then run on the pinned connection instead
//! of acquiring a fresh one. A context is never shared between threads, so it
//! needs no locking.
//!
//! [`JdbcTemplate::execute_in_transaction`] is the transaction boundary built
//! on top of it.

use crate::db::driver::{Connection, DataSource, ResourceGuard};
use crate::db::executor::JdbcTemplate;
use crate::error::{DataAccessError, DataAccessResult, Operation};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of a connection source, used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey(usize);

impl ResourceKey {
    /// Key for the source behind `source`. Clones of the same `Arc` share a key.
    pub fn of<S>(source: &Arc<S>) -> Self {
        Self(Arc::as_ptr(source) as *const () as usize)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source@{:#x}", self.0)
    }
}

/// Connections bound to the current transaction, keyed by source.
pub struct TransactionResources<C> {
    resources: HashMap<ResourceKey, C>,
}

impl<C> TransactionResources<C> {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
        }
    }

    /// The connection bound for `key`, if any.
    pub fn get_resource(&self, key: ResourceKey) -> Option<&C> {
        self.resources.get(&key)
    }

    pub fn get_resource_mut(&mut self, key: ResourceKey) -> Option<&mut C> {
        self.resources.get_mut(&key)
    }

    /// Bind `connection` for `key`.
    ///
    /// An existing binding is replaced without error; the displaced
    /// connection is handed back so the caller can release it.
    pub fn bind_resource(&mut self, key: ResourceKey, connection: C) -> Option<C> {
        let previous = self.resources.insert(key, connection);
        if previous.is_some() {
            debug!(key = %key, "Replaced existing transaction resource");
        }
        previous
    }

    /// Remove and return the connection bound for `key`.
    pub fn unbind_resource(&mut self, key: ResourceKey) -> Option<C> {
        self.resources.remove(&key)
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.resources.contains_key(&key)
    }

    /// Number of bound connections.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<C> Default for TransactionResources<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for TransactionResources<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionResources")
            .field("keys", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: DataSource> JdbcTemplate<S> {
    /// Run `work` as one transaction on a single pinned connection.
    ///
    /// Inside `work`, the `*_in` operations called with the given `resources`
    /// all use that connection. When `resources` already holds a connection
    /// for this template's source, `work` joins the running transaction and
    /// commit/rollback are left to the outer boundary.
    ///
    /// Otherwise a fresh connection is acquired with auto-commit disabled,
    /// committed when `work` succeeds and rolled back when it fails. The
    /// connection is unbound and closed afterwards in both cases. Once the
    /// commit has gone through the result is `Ok`; a failure to close the
    /// connection after that is only logged.
    pub fn execute_in_transaction<T, F>(
        &self,
        resources: &mut TransactionResources<S::Connection>,
        work: F,
    ) -> DataAccessResult<T>
    where
        F: FnOnce(&mut TransactionResources<S::Connection>) -> DataAccessResult<T>,
    {
        let key = self.resource_key();
        if resources.contains(key) {
            debug!(key = %key, "Joining existing transaction");
            return work(resources);
        }

        let mut connection = ResourceGuard::new(
            self.data_source()
                .get_connection()
                .map_err(DataAccessError::at(Operation::GetConnection))?,
        );
        connection
            .get_mut()
            .set_auto_commit(false)
            .map_err(DataAccessError::at(Operation::BeginTransaction))?;
        info!(key = %key, "Transaction started");

        let displaced = resources.bind_resource(key, connection.into_inner());
        debug_assert!(displaced.is_none());

        let outcome = work(resources);

        let Some(bound) = resources.unbind_resource(key) else {
            // `work` unbound the connection itself; it now owns its release.
            warn!(key = %key, "Transaction connection was unbound by the unit of work");
            return outcome;
        };
        let mut connection = ResourceGuard::new(bound);

        match outcome {
            Ok(value) => match connection.get_mut().commit() {
                Ok(()) => {
                    info!(key = %key, "Transaction committed");
                    restore_auto_commit(connection.get_mut());
                    if let Err(e) = connection.release() {
                        warn!(key = %key, error = %e, "Failed to close connection after commit");
                    }
                    Ok(value)
                }
                Err(e) => {
                    rollback_quietly(connection.get_mut(), key);
                    restore_auto_commit(connection.get_mut());
                    Err(DataAccessError::new(Operation::Commit, e))
                }
            },
            Err(e) => {
                info!(key = %key, error = %e, "Rolling back transaction");
                rollback_quietly(connection.get_mut(), key);
                restore_auto_commit(connection.get_mut());
                Err(e)
            }
        }
    }
}

fn rollback_quietly<C: Connection>(connection: &mut C, key: ResourceKey) {
    if let Err(e) = connection.rollback() {
        warn!(key = %key, error = %e, "Rollback failed");
    }
}

fn restore_auto_commit<C: Connection>(connection: &mut C) {
    if let Err(e) = connection.set_auto_commit(true) {
        warn!(resource = C::KIND, error = %e, "Failed to restore auto-commit");
    }
}
