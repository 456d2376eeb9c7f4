use ethereum_types::H256;
use ethrex_rlp::constants::RLP_NULL;
use ethrex_rlp::encode::RLPEncode;
use sha3::{Digest, Keccak256};

/// A reference to a trie node, following the canonical Merkle-Patricia rule:
/// a node whose own RLP encoding is 32 bytes or longer is referenced by its
/// Keccak-256 digest, while a shorter encoding is inlined directly in place
/// of the hash.
#[derive(Debug, Clone, Copy)]
pub enum NodeHash {
    Hashed(H256),
    Inline(([u8; 32], u8)),
}

impl NodeHash {
    /// Hashes `encoded`, inlining it instead if it is shorter than a hash.
    pub fn from_encoded(encoded: &[u8]) -> Self {
        if encoded.len() >= 32 {
            let hash = Keccak256::new_with_prefix(encoded).finalize();
            Self::Hashed(H256::from_slice(&hash))
        } else {
            let mut data = [0u8; 32];
            data[..encoded.len()].copy_from_slice(encoded);
            Self::Inline((data, encoded.len() as u8))
        }
    }

    /// Builds a reference from raw bytes without hashing them: used when the
    /// bytes are already a digest (32 bytes) or an already-inlined encoding.
    pub fn from_slice(data: &[u8]) -> Self {
        if data.len() == 32 {
            Self::Hashed(H256::from_slice(data))
        } else {
            let mut buf = [0u8; 32];
            buf[..data.len()].copy_from_slice(data);
            Self::Inline((buf, data.len() as u8))
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Inline((_, 0)))
    }

    /// Forces the reference down to a full 32-byte digest, hashing an inline
    /// encoding if necessary. Used to report the root hash of a trie even
    /// when the root node itself is small enough to be inlined.
    pub fn finalize(&self) -> H256 {
        match self {
            Self::Hashed(hash) => *hash,
            Self::Inline((data, len)) => {
                H256::from_slice(&Keccak256::new_with_prefix(&data[..*len as usize]).finalize())
            }
        }
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Hashed(hash) => hash.as_bytes(),
            Self::Inline((data, len)) => &data[..*len as usize],
        }
    }
}

impl Default for NodeHash {
    fn default() -> Self {
        Self::Inline(([0; 32], 0))
    }
}

impl PartialEq for NodeHash {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for NodeHash {}

impl std::hash::Hash for NodeHash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_ref().hash(state)
    }
}

impl From<H256> for NodeHash {
    fn from(hash: H256) -> Self {
        Self::Hashed(hash)
    }
}

/// RLP-encodes a node reference the way a parent node embeds its children:
/// a hashed child is written as a 32-byte string, an inline child's own
/// encoding is spliced in directly (it is already valid RLP on its own).
impl RLPEncode for NodeHash {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            NodeHash::Hashed(hash) => hash.0.encode(buf),
            NodeHash::Inline((_, 0)) => buf.put_u8(RLP_NULL),
            NodeHash::Inline((data, len)) => buf.put_slice(&data[..*len as usize]),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_encodings_are_inlined() {
        let hash = NodeHash::from_encoded(&[0x01, 0x02, 0x03]);
        assert!(matches!(hash, NodeHash::Inline(_)));
        assert_eq!(hash.as_ref(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn long_encodings_are_hashed() {
        let encoded = [0xAAu8; 40];
        let hash = NodeHash::from_encoded(&encoded);
        assert!(matches!(hash, NodeHash::Hashed(_)));
    }

    #[test]
    fn default_is_invalid() {
        assert!(!NodeHash::default().is_valid());
    }

    #[test]
    fn finalize_hashes_inline_values() {
        let inline = NodeHash::from_encoded(&[0xFF]);
        let finalized = inline.finalize();
        let expected = Keccak256::new_with_prefix([0xFFu8]).finalize();
        assert_eq!(finalized.as_bytes(), expected.as_slice());
    }
}
