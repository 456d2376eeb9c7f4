use std::collections::HashMap;

use ethereum_types::Address;
use ethrex_trie::TrieError;
use tracing::instrument;

use crate::collaborators::{Database, StateProvider};
use crate::storage_trie::StorageTrie;

/// Lazily-populated `Address -> StorageTrie` cache.
///
/// Opening a trie touches two collaborators (the `Database` for a node
/// handle, the `StateProvider` for the account's current root) so the
/// registry is the single point that makes repeated `trie_of(a)` calls for
/// the same account free after the first.
#[derive(Default)]
pub struct TrieRegistry {
    tries: HashMap<Address, StorageTrie>,
}

impl TrieRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the trie for `address`, opening it on first touch.
    #[instrument(level = "debug", name = "open storage trie", skip(self, db, state))]
    pub fn trie_of(
        &mut self,
        address: Address,
        db: &dyn Database,
        state: &dyn StateProvider,
    ) -> Result<&mut StorageTrie, TrieError> {
        if !self.tries.contains_key(&address) {
            let handle = db.open_storage_db(address)?;
            let root = state.storage_root_of(address)?;
            self.tries.insert(address, StorageTrie::open(handle, root));
        }
        // Present by construction: either already cached, or just inserted above.
        Ok(self.tries.get_mut(&address).expect("trie just opened"))
    }

    /// Drops every cached trie handle. Called only by `Journal::reset`.
    pub fn clear(&mut self) {
        self.tries.clear();
    }
}
