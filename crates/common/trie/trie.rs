pub mod db;
pub mod error;
mod nibbles;
mod node;
mod node_hash;
mod state;
use ethereum_types::H256;
use ethrex_rlp::constants::RLP_NULL;
use sha3::{Digest, Keccak256};

pub use self::db::{InMemoryTrieDB, TrieDB};
pub use self::nibbles::Nibbles;
pub use self::{node::Node, node_hash::NodeHash, state::TrieState};

pub use self::error::TrieError;
use self::node::LeafNode;

use lazy_static::lazy_static;

lazy_static! {
    // Hash value for an empty trie, equal to keccak(RLP_NULL)
    pub static ref EMPTY_TRIE_HASH: H256 = H256::from_slice(
        Keccak256::new()
            .chain_update([RLP_NULL])
            .finalize()
            .as_slice(),
    );
}

/// RLP-encoded trie path
pub type PathRLP = Vec<u8>;
/// RLP-encoded trie value
pub type ValueRLP = Vec<u8>;
/// RLP-encoded trie node
pub type NodeRLP = Vec<u8>;

/// Ethereum-compatible Merkle Patricia Trie.
///
/// Backed by a pluggable [`TrieDB`]; nodes are addressed by [`NodeHash`] and
/// cached in a [`TrieState`] until [`Trie::commit`] flushes them.
pub struct Trie {
    /// Hash of the current node
    root: Option<NodeHash>,
    /// Contains the trie's nodes
    pub(crate) state: TrieState,
}

impl Trie {
    /// Creates a new Trie from a clean DB
    pub fn new(db: Box<dyn TrieDB>) -> Self {
        Self {
            state: TrieState::new(db),
            root: None,
        }
    }

    /// Creates a trie from an already-initialized DB and sets root as the root node of the trie
    pub fn open(db: Box<dyn TrieDB>, root: H256) -> Self {
        let root = (root != *EMPTY_TRIE_HASH).then_some(root.into());
        Self {
            state: TrieState::new(db),
            root,
        }
    }

    /// Retrieve an RLP-encoded value from the trie given its RLP-encoded path.
    pub fn get(&self, path: &PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        if let Some(root) = &self.root {
            let root_node = self
                .state
                .get_node(*root)?
                .ok_or(TrieError::InconsistentTree)?;
            root_node.get(&self.state, Nibbles::from_bytes(path))
        } else {
            Ok(None)
        }
    }

    /// Insert an RLP-encoded value into the trie.
    pub fn insert(&mut self, path: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        let root = self.root.take();
        if let Some(root_node) = root
            .map(|root| self.state.get_node(root))
            .transpose()?
            .flatten()
        {
            // If the trie is not empty, call the root node's insertion logic
            let root_node = root_node.insert(&mut self.state, Nibbles::from_bytes(&path), value)?;
            self.root = Some(root_node.insert_self(&mut self.state)?)
        } else {
            // If the trie is empty, just add a leaf.
            let new_leaf = Node::from(LeafNode::new(Nibbles::from_bytes(&path), value));
            self.root = Some(new_leaf.insert_self(&mut self.state)?)
        }
        Ok(())
    }

    /// Remove a value from the trie given its RLP-encoded path.
    /// Returns the value if it was succesfully removed or None if it wasn't part of the trie
    pub fn remove(&mut self, path: PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        let root = self.root.take();
        if let Some(root) = root {
            let root_node = self
                .state
                .get_node(root)?
                .ok_or(TrieError::InconsistentTree)?;
            let (root_node, old_value) =
                root_node.remove(&mut self.state, Nibbles::from_bytes(&path))?;
            self.root = root_node
                .map(|root| root.insert_self(&mut self.state))
                .transpose()?;
            Ok(old_value)
        } else {
            Ok(None)
        }
    }

    /// Return the hash of the trie's root node.
    /// Returns keccak(RLP_NULL) if the trie is empty
    /// Also commits changes to the DB
    pub fn hash(&mut self) -> Result<H256, TrieError> {
        self.commit()?;
        Ok(self
            .root
            .as_ref()
            .map(|root| root.finalize())
            .unwrap_or(*EMPTY_TRIE_HASH))
    }

    /// Return the hash of the trie's root node.
    /// Returns keccak(RLP_NULL) if the trie is empty
    pub fn hash_no_commit(&self) -> H256 {
        self.root
            .as_ref()
            .map(|root| root.finalize())
            .unwrap_or(*EMPTY_TRIE_HASH)
    }

    pub fn commit(&mut self) -> Result<(), TrieError> {
        if let Some(ref root) = self.root {
            self.state.commit(root)?;
        }
        Ok(())
    }

    /// Returns a mutable reference to the trie's internal node state
    /// [WARNING] This will allow directly manipulating the trie's state and
    /// may lead to inconsistent trie structures if not used resposibly
    pub fn state_mut(&mut self) -> &mut TrieState {
        &mut self.state
    }

    /// Returns a reference to the trie's internal node state
    pub fn state(&mut self) -> &TrieState {
        &self.state
    }

    #[cfg(test)]
    /// Creates a new Trie based on a temporary InMemory DB
    fn new_temp() -> Self {
        use std::collections::HashMap;
        use std::sync::Arc;
        use std::sync::Mutex;

        let hmap: HashMap<NodeHash, Vec<u8>> = HashMap::new();
        let map = Arc::new(Mutex::new(hmap));
        let db = InMemoryTrieDB::new(map);
        Trie::new(Box::new(db))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::{collection::vec, prelude::*, proptest};

    #[test]
    fn get_insert_words() {
        let mut trie = Trie::new_temp();
        let first_path = b"first".to_vec();
        let first_value = b"value_a".to_vec();
        let second_path = b"second".to_vec();
        let second_value = b"value_b".to_vec();
        // Check that the values dont exist before inserting
        assert!(trie.get(&first_path).unwrap().is_none());
        assert!(trie.get(&second_path).unwrap().is_none());
        // Insert values
        trie.insert(first_path.clone(), first_value.clone())
            .unwrap();
        trie.insert(second_path.clone(), second_value.clone())
            .unwrap();
        // Check values
        assert_eq!(trie.get(&first_path).unwrap(), Some(first_value));
        assert_eq!(trie.get(&second_path).unwrap(), Some(second_value));
    }

    #[test]
    fn get_insert_zero() {
        let mut trie = Trie::new_temp();
        trie.insert(vec![0x0], b"value".to_vec()).unwrap();
        let first = trie.get(&[0x0][..].to_vec()).unwrap();
        assert_eq!(first, Some(b"value".to_vec()));
    }

    #[test]
    fn get_insert_a() {
        let mut trie = Trie::new_temp();
        trie.insert(vec![16], vec![0]).unwrap();
        trie.insert(vec![16, 0], vec![0]).unwrap();

        let item = trie.get(&vec![16]).unwrap();
        assert_eq!(item, Some(vec![0]));

        let item = trie.get(&vec![16, 0]).unwrap();
        assert_eq!(item, Some(vec![0]));
    }

    #[test]
    fn get_insert_b() {
        let mut trie = Trie::new_temp();
        trie.insert(vec![0, 0], vec![0, 0]).unwrap();
        trie.insert(vec![1, 0], vec![1, 0]).unwrap();

        let item = trie.get(&vec![1, 0]).unwrap();
        assert_eq!(item, Some(vec![1, 0]));

        let item = trie.get(&vec![0, 0]).unwrap();
        assert_eq!(item, Some(vec![0, 0]));
    }

    #[test]
    fn get_insert_c() {
        let mut trie = Trie::new_temp();
        let vecs = vec![
            vec![26, 192, 44, 251],
            vec![195, 132, 220, 124, 112, 201, 70, 128, 235],
            vec![126, 138, 25, 245, 146],
            vec![129, 176, 66, 2, 150, 151, 180, 60, 124],
            vec![138, 101, 157],
        ];
        for x in &vecs {
            trie.insert(x.clone(), x.clone()).unwrap();
        }
        for x in &vecs {
            let item = trie.get(x).unwrap();
            assert_eq!(item, Some(x.clone()));
        }
    }

    #[test]
    fn get_insert_d() {
        let mut trie = Trie::new_temp();
        let vecs = vec![
            vec![52, 53, 143, 52, 206, 112],
            vec![14, 183, 34, 39, 113],
            vec![55, 5],
            vec![134, 123, 19],
            vec![0, 59, 240, 89, 83, 167],
            vec![22, 41],
            vec![13, 166, 159, 101, 90, 234, 91],
            vec![31, 180, 161, 122, 115, 51, 37, 61, 101],
            vec![208, 192, 4, 12, 163, 254, 129, 206, 109],
        ];
        for x in &vecs {
            trie.insert(x.clone(), x.clone()).unwrap();
        }
        for x in &vecs {
            let item = trie.get(x).unwrap();
            assert_eq!(item, Some(x.clone()));
        }
    }

    #[test]
    fn get_insert_e() {
        let mut trie = Trie::new_temp();
        trie.insert(vec![0x00], vec![0x00]).unwrap();
        trie.insert(vec![0xC8], vec![0xC8]).unwrap();
        trie.insert(vec![0xC8, 0x00], vec![0xC8, 0x00]).unwrap();

        assert_eq!(trie.get(&vec![0x00]).unwrap(), Some(vec![0x00]));
        assert_eq!(trie.get(&vec![0xC8]).unwrap(), Some(vec![0xC8]));
        assert_eq!(trie.get(&vec![0xC8, 0x00]).unwrap(), Some(vec![0xC8, 0x00]));
    }

    #[test]
    fn get_insert_f() {
        let mut trie = Trie::new_temp();
        trie.insert(vec![0x00], vec![0x00]).unwrap();
        trie.insert(vec![0x01], vec![0x01]).unwrap();
        trie.insert(vec![0x10], vec![0x10]).unwrap();
        trie.insert(vec![0x19], vec![0x19]).unwrap();
        trie.insert(vec![0x19, 0x00], vec![0x19, 0x00]).unwrap();
        trie.insert(vec![0x1A], vec![0x1A]).unwrap();

        assert_eq!(trie.get(&vec![0x00]).unwrap(), Some(vec![0x00]));
        assert_eq!(trie.get(&vec![0x01]).unwrap(), Some(vec![0x01]));
        assert_eq!(trie.get(&vec![0x10]).unwrap(), Some(vec![0x10]));
        assert_eq!(trie.get(&vec![0x19]).unwrap(), Some(vec![0x19]));
        assert_eq!(trie.get(&vec![0x19, 0x00]).unwrap(), Some(vec![0x19, 0x00]));
        assert_eq!(trie.get(&vec![0x1A]).unwrap(), Some(vec![0x1A]));
    }

    #[test]
    fn get_insert_remove_a() {
        let mut trie = Trie::new_temp();
        trie.insert(b"do".to_vec(), b"verb".to_vec()).unwrap();
        trie.insert(b"horse".to_vec(), b"stallion".to_vec())
            .unwrap();
        trie.insert(b"doge".to_vec(), b"coin".to_vec()).unwrap();
        trie.remove(b"horse".to_vec()).unwrap();
        assert_eq!(trie.get(&b"do".to_vec()).unwrap(), Some(b"verb".to_vec()));
        assert_eq!(trie.get(&b"doge".to_vec()).unwrap(), Some(b"coin".to_vec()));
    }

    #[test]
    fn get_insert_remove_b() {
        let mut trie = Trie::new_temp();
        trie.insert(vec![185], vec![185]).unwrap();
        trie.insert(vec![185, 0], vec![185, 0]).unwrap();
        trie.insert(vec![185, 1], vec![185, 1]).unwrap();
        trie.remove(vec![185, 1]).unwrap();
        assert_eq!(trie.get(&vec![185, 0]).unwrap(), Some(vec![185, 0]));
        assert_eq!(trie.get(&vec![185]).unwrap(), Some(vec![185]));
        assert!(trie.get(&vec![185, 1]).unwrap().is_none());
    }

    #[test]
    fn empty_trie_hash_is_keccak_of_rlp_null() {
        let mut trie = Trie::new_temp();
        assert_eq!(trie.hash().unwrap(), *EMPTY_TRIE_HASH);
    }

    #[test]
    fn removing_everything_restores_the_empty_hash() {
        let mut trie = Trie::new_temp();
        trie.insert(b"do".to_vec(), b"verb".to_vec()).unwrap();
        trie.insert(b"horse".to_vec(), b"stallion".to_vec())
            .unwrap();
        trie.remove(b"do".to_vec()).unwrap();
        trie.remove(b"horse".to_vec()).unwrap();
        assert_eq!(trie.hash().unwrap(), *EMPTY_TRIE_HASH);
    }

    proptest! {
        #[test]
        fn proptest_get_insert(data in vec((vec(any::<u8>(), 1..100), vec(any::<u8>(), 1..100)), 1..100)) {
            let mut trie = Trie::new_temp();
            for (path, value) in data.iter() {
                trie.insert(path.clone(), value.clone()).unwrap();
            }
            for (path, value) in data.iter() {
                prop_assert_eq!(trie.get(path).unwrap(), Some(value.clone()));
            }
        }

        #[test]
        fn proptest_get_insert_with_removals(
            data in vec((vec(any::<u8>(), 1..100), vec(any::<u8>(), 1..100), any::<bool>()), 1..100)
        ) {
            let mut trie = Trie::new_temp();
            let mut expected = std::collections::HashMap::new();
            for (path, value, should_remove) in data.iter() {
                trie.insert(path.clone(), value.clone()).unwrap();
                expected.insert(path.clone(), value.clone());
                if *should_remove {
                    trie.remove(path.clone()).unwrap();
                    expected.remove(path);
                }
            }
            for (path, value) in expected.iter() {
                prop_assert_eq!(trie.get(path).unwrap(), Some(value.clone()));
            }
        }

        #[test]
        fn proptest_hash_is_order_independent(mut data in vec((vec(any::<u8>(), 1..32), vec(any::<u8>(), 1..32)), 1..30)) {
            data.sort_by(|a, b| a.0.cmp(&b.0));
            data.dedup_by(|a, b| a.0 == b.0);

            let mut trie_a = Trie::new_temp();
            for (path, value) in data.iter() {
                trie_a.insert(path.clone(), value.clone()).unwrap();
            }

            let mut shuffled = data.clone();
            shuffled.reverse();
            let mut trie_b = Trie::new_temp();
            for (path, value) in shuffled.iter() {
                trie_b.insert(path.clone(), value.clone()).unwrap();
            }

            prop_assert_eq!(trie_a.hash().unwrap(), trie_b.hash().unwrap());
        }
    }
}
