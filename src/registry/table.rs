//! The Client Registry
//!
//! Process-wide table of live sessions keyed by [`ClientKey`].
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  Registry                   │
//! │   Mutex<HashMap<ClientKey, Arc<Session>>>   │
//! │                                             │
//! │   lookup ──┐                                │
//! │   insert ──┼──> one short critical section  │
//! │   remove ──┘    (table manipulation only)   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The table itself is never handed out. Callers get `Arc<ClientSession>`
//! values and mutate social state through the session's own lock.

use crate::registry::session::{ClientKey, ClientSession};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum number of registered clients.
pub const DEFAULT_MAX_CLIENTS: usize = 1000;

/// Errors returned by registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No session is registered under the key
    #[error("no client registered under key {0}")]
    NotFound(ClientKey),

    /// A session with the same key is already registered
    #[error("client key {0} already in use")]
    DuplicateKey(ClientKey),

    /// The table is at capacity
    #[error("registry full: {capacity} clients registered")]
    Full { capacity: usize },
}

/// Thread-safe table mapping client keys to live sessions.
#[derive(Debug)]
pub struct Registry {
    sessions: Mutex<HashMap<ClientKey, Arc<ClientSession>>>,
    capacity: usize,
}

impl Registry {
    /// Creates an empty registry holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::with_capacity(capacity.min(DEFAULT_MAX_CLIENTS))),
            capacity,
        }
    }

    /// Returns the session registered under `key`.
    pub fn lookup(&self, key: ClientKey) -> Result<Arc<ClientSession>, RegistryError> {
        self.table()
            .get(&key)
            .cloned()
            .ok_or(RegistryError::NotFound(key))
    }

    /// Adds a session to the table.
    ///
    /// Fails with [`RegistryError::Full`] when the table is at capacity and
    /// with [`RegistryError::DuplicateKey`] when the key is taken. The table
    /// is unchanged on failure.
    pub fn insert(&self, session: ClientSession) -> Result<Arc<ClientSession>, RegistryError> {
        let mut table = self.table();

        if table.len() >= self.capacity {
            warn!(capacity = self.capacity, "Registry full, rejecting {}", session.name());
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }

        let key = session.key();
        if table.contains_key(&key) {
            warn!(key = %key, "Client key already in use by {}", session.name());
            return Err(RegistryError::DuplicateKey(key));
        }

        let session = Arc::new(session);
        table.insert(key, Arc::clone(&session));
        debug!(key = %key, registered = table.len(), "Client registered");
        Ok(session)
    }

    /// Removes and returns the session registered under `key`.
    pub fn remove(&self, key: ClientKey) -> Result<Arc<ClientSession>, RegistryError> {
        let mut table = self.table();
        let session = table.remove(&key).ok_or(RegistryError::NotFound(key))?;
        debug!(key = %key, registered = table.len(), "Client removed");
        Ok(session)
    }

    pub fn contains(&self, key: ClientKey) -> bool {
        self.table().contains_key(&key)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ClientKey, Arc<ClientSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLIENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHandle;
    use crate::registry::session::DEFAULT_TIMELINE_CAPACITY;
    use std::thread;

    fn session(name: &str) -> ClientSession {
        let (handle, _rx) = ConnectionHandle::channel(name);
        ClientSession::new(name, handle, DEFAULT_TIMELINE_CAPACITY)
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = Registry::default();
        let names = ["alice", "bob", "carol"];

        for name in names {
            registry.insert(session(name)).unwrap();
        }

        assert_eq!(registry.len(), 3);
        for name in names {
            let found = registry.lookup(ClientKey::from_name(name)).unwrap();
            assert_eq!(found.name(), name);
        }
    }

    #[test]
    fn test_lookup_missing() {
        let registry = Registry::default();
        let key = ClientKey::from_name("ghost");
        assert_eq!(registry.lookup(key).unwrap_err(), RegistryError::NotFound(key));
    }

    #[test]
    fn test_duplicate_key_leaves_table_unchanged() {
        let registry = Registry::default();
        let first = registry.insert(session("alice")).unwrap();

        let err = registry.insert(session("alice")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKey(ClientKey::from_name("alice")));
        assert_eq!(registry.len(), 1);

        let found = registry.lookup(first.key()).unwrap();
        assert!(Arc::ptr_eq(&first, &found));
    }

    #[test]
    fn test_full_registry_rejects_insert() {
        let registry = Registry::new(DEFAULT_MAX_CLIENTS);
        for i in 0..DEFAULT_MAX_CLIENTS {
            registry.insert(session(&format!("c{}", i))).unwrap();
        }

        let err = registry.insert(session("one-too-many")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Full {
                capacity: DEFAULT_MAX_CLIENTS
            }
        );
        assert_eq!(registry.len(), DEFAULT_MAX_CLIENTS);
        assert!(!registry.contains(ClientKey::from_name("one-too-many")));
    }

    #[test]
    fn test_remove() {
        let registry = Registry::default();
        registry.insert(session("alice")).unwrap();
        let key = ClientKey::from_name("alice");

        let removed = registry.remove(key).unwrap();
        assert_eq!(removed.name(), "alice");
        assert_eq!(registry.lookup(key).unwrap_err(), RegistryError::NotFound(key));
        assert_eq!(registry.remove(key).unwrap_err(), RegistryError::NotFound(key));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_inserts() {
        let registry = Arc::new(Registry::default());
        let mut handles = vec![];

        for t in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    registry.insert(session(&format!("t{}-{}", t, i))).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn test_concurrent_duplicate_logins_admit_one() {
        let registry = Arc::new(Registry::default());
        let mut handles = vec![];

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || registry.insert(session("alice")).is_ok()));
        }

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
