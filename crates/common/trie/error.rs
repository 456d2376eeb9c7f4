use ethrex_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("Verification error: {0}")]
    Verify(String),
    #[error("Inconsistent internal tree structure: referenced node not found")]
    InconsistentTree,
    #[error("Lock error: panicked while trying to acquire a lock")]
    LockError,
    #[error("Database error: {0}")]
    DbError(anyhow::Error),
}
