//! Connection storage.

use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use pairwise_core::Verkey;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct Connections {
    /// Insertion order.
    records: Vec<Connection>,
    by_verkey: HashMap<Verkey, usize>,
}

/// Connections keyed by their local verkey.
///
/// The lock is only ever held for in-memory work; callers do wallet and
/// network I/O on snapshots and apply the result with [`ConnectionStore::update`].
#[derive(Debug, Default)]
pub struct ConnectionStore {
    inner: RwLock<Connections>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new connection. Its verkey must be unused.
    pub fn insert(&self, connection: Connection) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_verkey.contains_key(&connection.verkey) {
            return Err(ProtocolError::DuplicateVerkey(connection.verkey.to_string()));
        }
        let index = inner.records.len();
        inner.by_verkey.insert(connection.verkey.clone(), index);
        inner.records.push(connection);
        Ok(())
    }

    /// Snapshot of the connection whose local verkey is `verkey`.
    pub fn find_by_verkey(&self, verkey: &Verkey) -> Option<Connection> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .by_verkey
            .get(verkey)
            .map(|&index| inner.records[index].clone())
    }

    /// Like [`find_by_verkey`](Self::find_by_verkey) but a missing connection is an error.
    pub fn get(&self, verkey: &Verkey) -> Result<Connection> {
        self.find_by_verkey(verkey)
            .ok_or_else(|| ProtocolError::ConnectionNotFound(verkey.to_string()))
    }

    /// Snapshot of the connection whose remote verkey is `their_key`.
    pub fn find_by_their_key(&self, their_key: &Verkey) -> Option<Connection> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .records
            .iter()
            .find(|c| c.their_key.as_ref() == Some(their_key))
            .cloned()
    }

    /// All connections in insertion order.
    pub fn all(&self) -> Vec<Connection> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to the connection for `verkey` atomically.
    ///
    /// `f` runs on a copy under the write lock; the copy replaces the stored
    /// record only if `f` succeeds. Returns the updated connection alongside
    /// the value produced by `f`.
    pub fn update<T, F>(&self, verkey: &Verkey, f: F) -> Result<(Connection, T)>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let index = *inner
            .by_verkey
            .get(verkey)
            .ok_or_else(|| ProtocolError::ConnectionNotFound(verkey.to_string()))?;

        let mut draft = inner.records[index].clone();
        let value = f(&mut draft)?;
        inner.records[index] = draft.clone();
        Ok((draft, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use pairwise_core::KeyPair;

    fn connection() -> Connection {
        let key = KeyPair::generate();
        Connection::new(key.did(), key.verkey(), None)
    }

    #[test]
    fn test_insert_and_find() {
        let store = ConnectionStore::new();
        let conn = connection();
        let verkey = conn.verkey.clone();
        store.insert(conn.clone()).unwrap();

        assert_eq!(store.find_by_verkey(&verkey), Some(conn));
        assert!(store.find_by_verkey(&KeyPair::generate().verkey()).is_none());
    }

    #[test]
    fn test_duplicate_verkey_rejected() {
        let store = ConnectionStore::new();
        let conn = connection();
        store.insert(conn.clone()).unwrap();

        assert!(matches!(store.insert(conn), Err(ProtocolError::DuplicateVerkey(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_all_keeps_insertion_order() {
        let store = ConnectionStore::new();
        let conns: Vec<_> = (0..5).map(|_| connection()).collect();
        for conn in &conns {
            store.insert(conn.clone()).unwrap();
        }

        let verkeys: Vec<_> = store.all().into_iter().map(|c| c.verkey).collect();
        let expected: Vec<_> = conns.into_iter().map(|c| c.verkey).collect();
        assert_eq!(verkeys, expected);
    }

    #[test]
    fn test_failed_update_leaves_record_untouched() {
        let store = ConnectionStore::new();
        let conn = connection();
        let verkey = conn.verkey.clone();
        store.insert(conn).unwrap();

        let result = store.update(&verkey, |c| {
            c.their_endpoint = Some("http://changed".into());
            c.advance(ConnectionState::Complete)
        });

        assert!(result.is_err());
        let stored = store.get(&verkey).unwrap();
        assert_eq!(stored.state, ConnectionState::Invited);
        assert!(stored.their_endpoint.is_none());
    }

    #[test]
    fn test_update_missing_connection() {
        let store = ConnectionStore::new();
        let result = store.update(&KeyPair::generate().verkey(), |_| Ok(()));
        assert!(matches!(result, Err(ProtocolError::ConnectionNotFound(_))));
    }

    #[test]
    fn test_find_by_their_key() {
        let store = ConnectionStore::new();
        let mut conn = connection();
        let them = KeyPair::generate();
        conn.their_key = Some(them.verkey());
        store.insert(conn.clone()).unwrap();

        assert_eq!(store.find_by_their_key(&them.verkey()).map(|c| c.id), Some(conn.id));
    }
}
