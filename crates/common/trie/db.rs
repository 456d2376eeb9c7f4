use crate::error::TrieError;
use crate::node_hash::NodeHash;
use std::{
    collections::HashMap,
    panic::RefUnwindSafe,
    sync::{Arc, Mutex},
};

/// Key-value persistence collaborator a [`crate::Trie`] is built on top of.
/// Keys are node hashes; values are the RLP encoding of the referenced node.
pub trait TrieDB: Send + Sync + RefUnwindSafe {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError>;
    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError>;
    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError>;
}

/// In-memory `TrieDB`, used by tests and by any caller that doesn't need the
/// nodes to outlive the process.
#[derive(Default)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<NodeHash, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new(map: Arc<Mutex<HashMap<NodeHash, Vec<u8>>>>) -> Self {
        Self { inner: map }
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .get(&key)
            .cloned())
    }

    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .insert(key, value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock().map_err(|_| TrieError::LockError)?;
        for (key, value) in key_values {
            db.insert(key, value);
        }
        Ok(())
    }
}
