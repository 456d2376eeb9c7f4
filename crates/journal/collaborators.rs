use ethereum_types::{Address, H256};
use ethrex_trie::{TrieDB, TrieError};

/// Persistence collaborator: supplies a per-account key-value handle for
/// `StorageTrie` node storage. Implementations are expected to be idempotent
/// per address within a process lifetime; the [`crate::registry::TrieRegistry`]
/// is what actually enforces that by caching the constructed trie, not this
/// trait.
pub trait Database {
    fn open_storage_db(&self, address: Address) -> Result<Box<dyn TrieDB>, TrieError>;
}

/// Parent-state collaborator the journal talks to only at `commit` time (and
/// once, lazily, when a trie is first opened for an account).
///
/// The journal embeds no knowledge of how accounts or their storage roots are
/// actually stored; this trait is the entire surface of that coupling.
pub trait StateProvider {
    fn account_exists(&self, address: Address) -> Result<bool, TrieError>;
    fn storage_root_of(&self, address: Address) -> Result<H256, TrieError>;
    fn update_storage_root(&self, address: Address, root: H256) -> Result<(), TrieError>;
}
