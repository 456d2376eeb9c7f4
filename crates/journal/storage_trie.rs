use ethereum_types::{H256, U256};
use ethrex_rlp::encode::RLPEncode;
use ethrex_trie::{Trie, TrieDB, TrieError};
use sha3::{Digest, Keccak256};
use tracing::instrument;

/// Per-account content-addressed storage trie.
///
/// Thin wrapper over [`ethrex_trie::Trie`] that fixes the key/value encoding
/// to canonical Ethereum storage semantics: a slot's trie path is the
/// Keccak-256 digest of its big-endian 32-byte representation (a "secure"
/// trie, so that adversarial slot choices can't skew the trie's shape), and
/// a slot's value is stored as an RLP byte string.
pub struct StorageTrie {
    inner: Trie,
}

impl StorageTrie {
    /// Opens a trie rooted at `root` (the all-zero-slot root if the account
    /// has no storage yet) over `db`.
    pub fn open(db: Box<dyn TrieDB>, root: H256) -> Self {
        Self {
            inner: Trie::open(db, root),
        }
    }

    /// Value stored at `slot`, or the canonical empty byte string if absent.
    #[instrument(level = "trace", name = "storage trie read", skip(self))]
    pub fn get(&self, slot: U256) -> Result<Vec<u8>, TrieError> {
        let path = hashed_path(slot);
        match self.inner.get(&path)? {
            Some(encoded) => decode_value(&encoded),
            None => Ok(Vec::new()),
        }
    }

    /// Inserts or overwrites `slot`. An empty `value` removes the slot.
    #[instrument(level = "trace", name = "storage trie write", skip(self, value))]
    pub fn set(&mut self, slot: U256, value: Vec<u8>) -> Result<(), TrieError> {
        let path = hashed_path(slot);
        if value.is_empty() {
            self.inner.remove(path)?;
        } else {
            self.inner.insert(path, value.as_slice().encode_to_vec())?;
        }
        Ok(())
    }

    /// Keccak-256 commitment to the trie's current contents. Commits any
    /// pending node writes to the backing `TrieDB` as a side effect.
    #[instrument(level = "debug", name = "storage root", skip(self))]
    pub fn root_hash(&mut self) -> Result<H256, TrieError> {
        self.inner.hash()
    }

    /// Reads the current root without forcing a flush to the backing DB.
    /// Used by `storage_root` reads that don't want to pay a commit.
    pub fn root_hash_no_commit(&self) -> H256 {
        self.inner.hash_no_commit()
    }
}

fn hashed_path(slot: U256) -> Vec<u8> {
    let mut be = [0u8; 32];
    slot.to_big_endian(&mut be);
    Keccak256::new().chain_update(be).finalize().as_slice().to_vec()
}

fn decode_value(encoded: &[u8]) -> Result<Vec<u8>, TrieError> {
    use ethrex_rlp::decode::decode_bytes;
    let (value, rest) = decode_bytes(encoded).map_err(TrieError::RLPDecode)?;
    debug_assert!(rest.is_empty(), "trailing bytes after a single RLP value");
    Ok(value.to_vec())
}

#[cfg(test)]
mod test {
    use super::*;
    use ethrex_trie::InMemoryTrieDB;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn empty_trie() -> StorageTrie {
        let map = Arc::new(Mutex::new(HashMap::new()));
        StorageTrie::open(Box::new(InMemoryTrieDB::new(map)), *ethrex_trie::EMPTY_TRIE_HASH)
    }

    #[test]
    fn absent_slot_is_empty() {
        let trie = empty_trie();
        assert_eq!(trie.get(U256::from(7)).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut trie = empty_trie();
        trie.set(U256::from(7), vec![0x2a]).unwrap();
        assert_eq!(trie.get(U256::from(7)).unwrap(), vec![0x2a]);
    }

    #[test]
    fn zero_delete_restores_empty_root() {
        let mut trie = empty_trie();
        let empty_root = trie.root_hash().unwrap();
        trie.set(U256::from(3), vec![0xab]).unwrap();
        trie.set(U256::from(3), Vec::new()).unwrap();
        assert_eq!(trie.root_hash().unwrap(), empty_root);
        assert_eq!(trie.get(U256::from(3)).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn overwrite_replaces_value() {
        let mut trie = empty_trie();
        trie.set(U256::from(1), vec![0x01]).unwrap();
        trie.set(U256::from(1), vec![0x02]).unwrap();
        trie.set(U256::from(1), vec![0x03]).unwrap();
        assert_eq!(trie.get(U256::from(1)).unwrap(), vec![0x03]);
    }
}
