//! Transactional per-account storage journal.
//!
//! Buffers the `SSTORE`/`SLOAD` traffic a VM executor issues against a
//! block's account storage: reads are memoized, writes are recorded on a
//! single linear log, and snapshots are plain integers into that log so that
//! revert is a bounded reverse walk and commit is a single forward flush of
//! the newest write per key into each touched account's trie.

pub mod collaborators;
pub mod error;
pub mod key;
pub mod record;
pub mod registry;
pub mod storage_trie;

use std::collections::{HashMap, HashSet};

use ethereum_types::{Address, H256, U256};
use tracing::instrument;

pub use crate::collaborators::{Database, StateProvider};
pub use crate::error::{Corruption, JournalError};
pub use crate::key::StorageKey;
pub use crate::record::{ChangeRecord, Kind};
pub use crate::registry::TrieRegistry;
pub use crate::storage_trie::StorageTrie;

/// An opaque cursor into the journal's change log, returned by
/// [`Journal::snapshot`] and consumed by [`Journal::revert`].
pub type SnapshotId = i64;

/// Initial size of the changes buffer, in records. Doubles whenever the next
/// append would leave fewer than two addressable slots past `top`, per the
/// lookahead-guard requirement (see [`Journal::ensure_capacity`]).
const INITIAL_CAPACITY: usize = 1024;

/// Coarse lifecycle state of a [`Journal`]: whether it currently holds any
/// pending reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    /// `top == -1`: no pending changes.
    Empty,
    /// `top >= 0`: at least one record is pending commit or revert.
    Dirty,
}

/// The transactional overlay itself.
///
/// Owns a contiguous, append-only buffer of [`ChangeRecord`]s, a per-key
/// stack of indices into that buffer, and a lazily-populated registry of the
/// [`StorageTrie`]s it has touched. A `Journal` is created once per
/// transaction (or once per block, if the engine chooses to reuse it across
/// transactions via `reset`) and is not re-entrant: it assumes a single,
/// serial caller.
pub struct Journal {
    changes: Vec<Option<ChangeRecord>>,
    index: HashMap<StorageKey, Vec<usize>>,
    top: SnapshotId,
    registry: TrieRegistry,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        Self {
            changes: vec![None; INITIAL_CAPACITY],
            index: HashMap::new(),
            top: -1,
            registry: TrieRegistry::new(),
        }
    }

    /// Current coarse lifecycle state; see [`JournalState`].
    pub fn state(&self) -> JournalState {
        if self.top < 0 {
            JournalState::Empty
        } else {
            JournalState::Dirty
        }
    }

    /// Reads `(address, slot)`, satisfying from the cache if present and
    /// otherwise reading through the account's trie and memoizing the
    /// result as a [`Kind::Materialized`] record.
    pub fn get(
        &mut self,
        address: Address,
        slot: U256,
        db: &dyn Database,
        state: &dyn StateProvider,
    ) -> Result<Vec<u8>, JournalError> {
        let key = StorageKey::new(address, slot);
        if let Some(&top_idx) = self.index.get(&key).and_then(|stack| stack.last()) {
            let record = self.changes[top_idx]
                .as_ref()
                .ok_or(Corruption::MissingRecord { index: top_idx })?;
            return Ok(record.value.clone());
        }

        let trie = self.registry.trie_of(address, db, state)?;
        let value = trie.get(slot)?;
        self.append(ChangeRecord::materialized(key, value.clone()));
        Ok(value)
    }

    /// Records a guest write. Always appends a [`Kind::Updated`] record; does
    /// not consult or require a prior materialization.
    pub fn set(&mut self, address: Address, slot: U256, value: Vec<u8>) {
        let key = StorageKey::new(address, slot);
        self.append(ChangeRecord::updated(key, value));
    }

    /// Returns the current journal cursor. O(1); no I/O.
    pub fn snapshot(&self) -> SnapshotId {
        self.top
    }

    /// Rolls the journal back to `snap`, discarding every `Updated` record
    /// introduced since and re-numbering the sole surviving `Materialized`
    /// record of each key touched only by a read-through, so that later
    /// reads of those keys stay cache hits.
    pub fn revert(&mut self, snap: SnapshotId) -> Result<(), JournalError> {
        if snap > self.top || snap < -1 {
            return Err(JournalError::InvalidSnapshot {
                requested: snap,
                top: self.top,
            });
        }

        // Encountered newest-to-oldest; re-appended in this same order, per
        // spec.md's explicit choice (see DESIGN.md open question (a)).
        let mut preserved = Vec::new();

        let mut i = self.top;
        while i > snap {
            let idx = i as usize;
            let (key, is_materialized) = {
                let record = self.changes[idx]
                    .as_ref()
                    .ok_or(Corruption::MissingRecord { index: idx })?;
                (record.key, record.is_materialized())
            };

            let stack = self
                .index
                .get_mut(&key)
                .ok_or(Corruption::EmptyIndexStack { key })?;
            let peek = *stack.last().ok_or(Corruption::EmptyIndexStack { key })?;
            if peek != idx {
                return Err(Corruption::IndexMismatch {
                    key,
                    expected: idx,
                    actual: peek,
                }
                .into());
            }

            let preserve = stack.len() == 1 && is_materialized;
            stack.pop();
            if stack.is_empty() {
                self.index.remove(&key);
            }

            let record = self.changes[idx]
                .take()
                .expect("checked Some immediately above");
            if preserve {
                preserved.push(record);
            }

            i -= 1;
        }

        self.top = snap;
        for record in preserved {
            self.append(record);
        }
        Ok(())
    }

    /// Flushes the newest write per key into each touched account's trie,
    /// then publishes new storage roots to the [`StateProvider`] for every
    /// account that still exists. No-op if the journal is empty.
    #[instrument(level = "debug", name = "journal commit", skip_all)]
    pub fn commit(
        &mut self,
        db: &dyn Database,
        state: &dyn StateProvider,
    ) -> Result<(), JournalError> {
        if self.top == -1 {
            return Ok(());
        }
        let top_idx = self.top as usize;
        if self.changes[top_idx].is_none() {
            return Err(Corruption::NullRecordAtTop { top: top_idx }.into());
        }
        if let Some(Some(_)) = self.changes.get(top_idx + 1) {
            return Err(Corruption::LookaheadGuardViolated { index: top_idx + 1 }.into());
        }

        let mut seen = HashSet::new();
        let mut touched = HashSet::new();

        let mut i = self.top;
        while i >= 0 {
            let idx = i as usize;
            let record = self.changes[idx]
                .take()
                .ok_or(Corruption::MissingRecord { index: idx })?;

            if seen.contains(&record.key) {
                i -= 1;
                continue;
            }

            let stack = self
                .index
                .get_mut(&record.key)
                .ok_or(Corruption::EmptyIndexStack { key: record.key })?;
            let popped = stack
                .pop()
                .ok_or(Corruption::EmptyIndexStack { key: record.key })?;
            if popped != idx {
                return Err(Corruption::IndexMismatch {
                    key: record.key,
                    expected: idx,
                    actual: popped,
                }
                .into());
            }
            if stack.is_empty() {
                self.index.remove(&record.key);
            }

            seen.insert(record.key);
            touched.insert(record.key.address);

            if record.kind == Kind::Updated {
                let trie = self.registry.trie_of(record.key.address, db, state)?;
                trie.set(record.key.slot, record.value)?;
            }

            i -= 1;
        }

        for address in touched {
            if state.account_exists(address)? {
                let trie = self.registry.trie_of(address, db, state)?;
                let root = trie.root_hash()?;
                tracing::debug!(?address, ?root, "publishing storage root");
                state.update_storage_root(address, root)?;
            }
        }

        self.top = -1;
        self.index.clear();
        Ok(())
    }

    /// Clears every journal structure and drops all `StorageTrie` handles.
    /// Used between unrelated transactions.
    pub fn reset(&mut self) {
        if self.top >= 0 {
            for slot in &mut self.changes[..=(self.top as usize)] {
                *slot = None;
            }
        }
        self.top = -1;
        self.index.clear();
        self.registry.clear();
    }

    /// Pure read-through to the account's current storage root, without
    /// requiring a commit first. Used by the executor for receipts and
    /// debugging.
    pub fn storage_root(
        &mut self,
        address: Address,
        db: &dyn Database,
        state: &dyn StateProvider,
    ) -> Result<H256, JournalError> {
        let trie = self.registry.trie_of(address, db, state)?;
        Ok(trie.root_hash_no_commit())
    }

    /// Appends `record`, growing the backing buffer first if needed, and
    /// pushes its new index onto the per-key stack. Returns the index it was
    /// stored at.
    fn append(&mut self, record: ChangeRecord) -> usize {
        self.ensure_capacity();
        self.top += 1;
        let idx = self.top as usize;
        let key = record.key;
        self.changes[idx] = Some(record);
        self.index.entry(key).or_default().push(idx);
        idx
    }

    /// Doubles the backing buffer while fewer than two addressable slots
    /// remain past `top`, so that `changes[top+1]` is always a valid (and
    /// null) lookahead guard.
    fn ensure_capacity(&mut self) {
        while (self.top + 2) as usize > self.changes.len() {
            let new_capacity = self.changes.len() * 2;
            self.changes.resize(new_capacity, None);
        }
    }
}
