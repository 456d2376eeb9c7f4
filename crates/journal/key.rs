use ethereum_types::{Address, U256};

/// Identity of a single storage slot: which account, which 256-bit index
/// within that account's storage trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub address: Address,
    pub slot: U256,
}

impl StorageKey {
    pub fn new(address: Address, slot: U256) -> Self {
        Self { address, slot }
    }
}
