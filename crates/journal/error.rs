use ethrex_trie::TrieError;
use thiserror::Error;

use crate::key::StorageKey;

/// Faults raised by the journal. Every variant is fatal: the journal has no
/// recoverable error path of its own, it either serves the operation or
/// aborts the caller's transaction with enough context to reconstruct what
/// went wrong without a log line.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("revert requested snapshot {requested} but journal top is {top}")]
    InvalidSnapshot { requested: i64, top: i64 },

    #[error("journal corrupted: {0}")]
    JournalCorrupted(#[from] Corruption),

    #[error(transparent)]
    BackingStore(#[from] TrieError),
}

/// Specific internal-consistency violations that make up `JournalCorrupted`.
/// Kept as its own enum so a caller inspecting the fault can tell which
/// invariant broke without parsing a string.
#[derive(Debug, Error)]
pub enum Corruption {
    #[error("index stack for {key:?} pointed at {expected} but popped {actual}")]
    IndexMismatch {
        key: StorageKey,
        expected: usize,
        actual: usize,
    },
    #[error("lookahead guard at top+1 ({index}) was not null")]
    LookaheadGuardViolated { index: usize },
    #[error("commit found a null record at top ({top})")]
    NullRecordAtTop { top: usize },
    #[error("record at index {index} was unexpectedly null")]
    MissingRecord { index: usize },
    #[error("per-key index for {key:?} was empty where a stack entry was expected")]
    EmptyIndexStack { key: StorageKey },
}
