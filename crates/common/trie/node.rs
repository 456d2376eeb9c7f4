use ethrex_rlp::{
    decode::{RLPDecode, decode_bytes, decode_rlp_item},
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::{error::TrieError, nibbles::Nibbles, state::TrieState};

use super::{ValueRLP, node_hash::NodeHash};

/// A node in an Ethereum-compatible Merkle Patricia Trie.
///
/// Children and values are referenced by [`NodeHash`] rather than embedded
/// directly; the actual node bytes live in the [`TrieState`] cache / backing
/// [`crate::TrieDB`].
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl From<Box<BranchNode>> for Node {
    fn from(val: Box<BranchNode>) -> Self {
        Node::Branch(val)
    }
}

impl From<BranchNode> for Node {
    fn from(val: BranchNode) -> Self {
        Node::Branch(Box::new(val))
    }
}

impl From<ExtensionNode> for Node {
    fn from(val: ExtensionNode) -> Self {
        Node::Extension(val)
    }
}

impl From<LeafNode> for Node {
    fn from(val: LeafNode) -> Self {
        Node::Leaf(val)
    }
}

impl Node {
    /// Retrieves a value from the subtrie originating from this node given its path.
    pub fn get(&self, state: &TrieState, path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        match self {
            Node::Branch(n) => n.get(state, path),
            Node::Extension(n) => n.get(state, path),
            Node::Leaf(n) => n.get(path),
        }
    }

    /// Inserts a value into the subtrie originating from this node and returns the new root of the subtrie.
    pub fn insert(
        self,
        state: &mut TrieState,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        match self {
            Node::Branch(n) => n.insert(state, path, value),
            Node::Extension(n) => n.insert(state, path, value),
            Node::Leaf(n) => n.insert(state, path, value),
        }
    }

    /// Removes a value from the subtrie originating from this node given its path.
    /// Returns the new root of the subtrie (if any) and the removed value, if it existed.
    pub fn remove(
        self,
        state: &mut TrieState,
        path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        match self {
            Node::Branch(n) => n.remove(state, path),
            Node::Extension(n) => n.remove(state, path),
            Node::Leaf(n) => n.remove(path),
        }
    }

    /// Inserts the node into `state`'s node cache and returns the hash it is referenced by.
    pub fn insert_self(self, state: &mut TrieState) -> Result<NodeHash, TrieError> {
        let hash = self.compute_hash();
        state.insert_node(self, hash);
        Ok(hash)
    }

    /// Encodes the node following the canonical RLP node encoding.
    pub fn encode_raw(&self) -> Vec<u8> {
        match self {
            Node::Branch(n) => n.encode_raw(),
            Node::Extension(n) => n.encode_raw(),
            Node::Leaf(n) => n.encode_raw(),
        }
    }

    /// Decodes a node from its RLP node encoding.
    pub fn decode_raw(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let mut rlp_items = vec![];
        let mut decoder = Decoder::new(rlp)?;
        let mut item;
        loop {
            (item, decoder) = decoder.get_encoded_item()?;
            rlp_items.push(item);
            if decoder.is_done() || rlp_items.len() > 17 {
                break;
            }
        }
        Ok(match rlp_items.len() {
            2 => {
                let (path, _) = decode_bytes(&rlp_items[0])?;
                let path = Nibbles::decode_compact(path);
                if path.is_leaf() {
                    let (value, _) = decode_bytes(&rlp_items[1])?;
                    LeafNode {
                        partial: path,
                        value: value.to_vec(),
                    }
                    .into()
                } else {
                    ExtensionNode {
                        prefix: path,
                        child: decode_child(&rlp_items[1]),
                    }
                    .into()
                }
            }
            17 => {
                let mut choices = [NodeHash::default(); 16];
                for (i, choice) in choices.iter_mut().enumerate() {
                    *choice = decode_child(&rlp_items[i]);
                }
                let (value, _) = decode_bytes(&rlp_items[16])?;
                BranchNode {
                    choices,
                    value: value.to_vec(),
                }
                .into()
            }
            n => {
                return Err(RLPDecodeError::Custom(format!(
                    "Invalid arg count for Node, expected 2 or 17, got {n}"
                )));
            }
        })
    }

    /// Computes the node's hash, inlining it if its encoding is short enough.
    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_raw())
    }
}

impl RLPEncode for Node {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        buf.put_slice(&self.encode_raw());
    }

    fn length(&self) -> usize {
        self.encode_raw().len()
    }
}

impl RLPDecode for Node {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (_, _, remaining) = decode_rlp_item(rlp)?;
        let node = Self::decode_raw(rlp)?;
        Ok((node, remaining))
    }
}

/// Decodes a child reference the way a parent node embeds it: a hashed child
/// is a 32-byte string, an empty string means no child, anything else is an
/// already-inlined encoding.
fn decode_child(rlp: &[u8]) -> NodeHash {
    match decode_bytes(rlp) {
        Ok((hash, &[])) if hash.len() == 32 => NodeHash::from_slice(hash),
        Ok((&[], &[])) => NodeHash::default(),
        _ => NodeHash::from_slice(rlp),
    }
}

/// A branch node: 16 choices indexed by nibble, plus an optional value stored
/// at this node's own path (an empty `value` means no value is stored here).
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub choices: [NodeHash; 16],
    pub value: ValueRLP,
}

impl BranchNode {
    pub fn new(choices: [NodeHash; 16]) -> Self {
        Self {
            choices,
            value: Vec::new(),
        }
    }

    fn get(&self, state: &TrieState, mut path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        match path.next_choice() {
            Some(idx) => {
                let child_hash = self.choices[idx];
                if !child_hash.is_valid() {
                    return Ok(None);
                }
                let child = state
                    .get_node(child_hash)?
                    .ok_or(TrieError::InconsistentTree)?;
                child.get(state, path)
            }
            None => Ok((!self.value.is_empty()).then(|| self.value.clone())),
        }
    }

    fn insert(
        mut self: Box<Self>,
        state: &mut TrieState,
        mut path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        match path.next_choice() {
            Some(idx) => {
                let child_hash = self.choices[idx];
                let new_child = if child_hash.is_valid() {
                    let child = state
                        .get_node(child_hash)?
                        .ok_or(TrieError::InconsistentTree)?;
                    child.insert(state, path, value)?
                } else {
                    Node::from(LeafNode::new(path, value))
                };
                self.choices[idx] = new_child.insert_self(state)?;
                Ok(Node::Branch(self))
            }
            None => {
                self.value = value;
                Ok(Node::Branch(self))
            }
        }
    }

    fn remove(
        mut self: Box<Self>,
        state: &mut TrieState,
        mut path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        match path.next_choice() {
            Some(idx) => {
                let child_hash = self.choices[idx];
                if !child_hash.is_valid() {
                    return Ok((Some(Node::Branch(self)), None));
                }
                let child = state
                    .get_node(child_hash)?
                    .ok_or(TrieError::InconsistentTree)?;
                let (new_child, old_value) = child.remove(state, path)?;
                if old_value.is_none() {
                    return Ok((Some(Node::Branch(self)), None));
                }
                self.choices[idx] = match new_child {
                    Some(new_child) => new_child.insert_self(state)?,
                    None => NodeHash::default(),
                };
                Ok((self.try_collapse(state)?, old_value))
            }
            None => {
                if self.value.is_empty() {
                    return Ok((Some(Node::Branch(self)), None));
                }
                let old_value = std::mem::take(&mut self.value);
                Ok((self.try_collapse(state)?, Some(old_value)))
            }
        }
    }

    /// After a removal, collapses this branch down to a leaf/extension if it
    /// is left with at most one child and no value of its own.
    fn try_collapse(self: Box<Self>, state: &TrieState) -> Result<Option<Node>, TrieError> {
        let populated: Vec<usize> = (0..16).filter(|&i| self.choices[i].is_valid()).collect();
        match (populated.len(), self.value.is_empty()) {
            (0, true) => Ok(None),
            (0, false) => Ok(Some(Node::Leaf(LeafNode {
                partial: Nibbles::from_hex(vec![16]),
                value: self.value,
            }))),
            (1, true) => {
                let idx = populated[0];
                let child_hash = self.choices[idx];
                let child = state
                    .get_node(child_hash)?
                    .ok_or(TrieError::InconsistentTree)?;
                Ok(Some(match child {
                    Node::Leaf(mut leaf) => {
                        leaf.partial.prepend(idx as u8);
                        Node::Leaf(leaf)
                    }
                    Node::Extension(mut ext) => {
                        ext.prefix.prepend(idx as u8);
                        Node::Extension(ext)
                    }
                    Node::Branch(_) => Node::Extension(ExtensionNode {
                        prefix: Nibbles::from_hex(vec![idx as u8]),
                        child: child_hash,
                    }),
                }))
            }
            _ => Ok(Some(Node::Branch(self))),
        }
    }

    fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf);
        for choice in &self.choices {
            encoder = encoder.encode_field(choice);
        }
        encoder = encoder.encode_bytes(&self.value);
        encoder.finish();
        buf
    }

    fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_raw())
    }
}

/// An extension node: a shared nibble prefix pointing to a single child,
/// collapsing what would otherwise be a long chain of one-choice branches.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeHash,
}

impl ExtensionNode {
    pub fn new(prefix: Nibbles, child: NodeHash) -> Self {
        Self { prefix, child }
    }

    fn get(&self, state: &TrieState, mut path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        if path.skip_prefix(&self.prefix) {
            let child = state
                .get_node(self.child)?
                .ok_or(TrieError::InconsistentTree)?;
            child.get(state, path)
        } else {
            Ok(None)
        }
    }

    fn insert(
        self,
        state: &mut TrieState,
        mut path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        let ExtensionNode { prefix, child } = self;
        if path.skip_prefix(&prefix) {
            let child_node = state.get_node(child)?.ok_or(TrieError::InconsistentTree)?;
            let new_child = child_node.insert(state, path, value)?;
            let child = new_child.insert_self(state)?;
            return Ok(Node::Extension(ExtensionNode { prefix, child }));
        }

        // The new path diverges from the extension's prefix: split the
        // shared prefix into its own (possibly empty) extension above a
        // fresh branch holding both subtries.
        let match_len = path.count_prefix(&prefix);
        let ext_choice = prefix.at(match_len);
        let remaining_prefix = prefix.slice(match_len + 1, prefix.len());
        let ext_child = if remaining_prefix.is_empty() {
            child
        } else {
            Node::from(ExtensionNode::new(remaining_prefix, child)).insert_self(state)?
        };

        let path_choice = path.at(match_len);
        let remaining_path = path.slice(match_len + 1, path.len());
        let new_leaf_hash = Node::from(LeafNode::new(remaining_path, value)).insert_self(state)?;

        let mut choices = [NodeHash::default(); 16];
        choices[ext_choice] = ext_child;
        choices[path_choice] = new_leaf_hash;
        let branch = BranchNode::new(choices);

        if match_len == 0 {
            Ok(Node::Branch(Box::new(branch)))
        } else {
            let common_prefix = prefix.slice(0, match_len);
            let branch_hash = Node::from(branch).insert_self(state)?;
            Ok(Node::Extension(ExtensionNode::new(common_prefix, branch_hash)))
        }
    }

    fn remove(
        self,
        state: &mut TrieState,
        mut path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        let ExtensionNode { prefix, child } = self;
        if !path.skip_prefix(&prefix) {
            return Ok((Some(Node::Extension(ExtensionNode { prefix, child })), None));
        }
        let child_node = state.get_node(child)?.ok_or(TrieError::InconsistentTree)?;
        let (new_child, old_value) = child_node.remove(state, path)?;
        if old_value.is_none() {
            return Ok((Some(Node::Extension(ExtensionNode { prefix, child })), None));
        }
        let node = match new_child {
            None => None,
            Some(Node::Leaf(mut leaf)) => {
                let mut merged = prefix;
                merged.extend(&leaf.partial);
                leaf.partial = merged;
                Some(Node::Leaf(leaf))
            }
            Some(Node::Extension(mut ext)) => {
                let mut merged = prefix;
                merged.extend(&ext.prefix);
                ext.prefix = merged;
                Some(Node::Extension(ext))
            }
            Some(branch @ Node::Branch(_)) => {
                let child = branch.insert_self(state)?;
                Some(Node::Extension(ExtensionNode { prefix, child }))
            }
        };
        Ok((node, old_value))
    }

    fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_bytes(&self.prefix.encode_compact())
            .encode_field(&self.child)
            .finish();
        buf
    }

    fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_raw())
    }
}

/// A leaf node: the remaining path (including the trailing leaf flag) and
/// the value stored at it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: ValueRLP,
}

impl LeafNode {
    pub fn new(partial: Nibbles, value: ValueRLP) -> Self {
        Self { partial, value }
    }

    fn get(&self, path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        Ok((path == self.partial).then(|| self.value.clone()))
    }

    fn insert(
        self,
        state: &mut TrieState,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        let match_len = path.count_prefix(&self.partial);
        if match_len == self.partial.len() {
            return Ok(Node::Leaf(LeafNode { partial: path, value }));
        }

        let old_choice = self.partial.at(match_len);
        let remaining_old = self.partial.slice(match_len + 1, self.partial.len());
        let mut choices = [NodeHash::default(); 16];
        choices[old_choice] =
            Node::from(LeafNode::new(remaining_old, self.value)).insert_self(state)?;

        let new_choice = path.at(match_len);
        let remaining_new = path.slice(match_len + 1, path.len());
        choices[new_choice] =
            Node::from(LeafNode::new(remaining_new, value)).insert_self(state)?;

        let branch = BranchNode::new(choices);
        if match_len == 0 {
            Ok(Node::Branch(Box::new(branch)))
        } else {
            let common_prefix = self.partial.slice(0, match_len);
            let branch_hash = Node::from(branch).insert_self(state)?;
            Ok(Node::Extension(ExtensionNode::new(common_prefix, branch_hash)))
        }
    }

    fn remove(self, path: Nibbles) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        if path == self.partial {
            Ok((None, Some(self.value)))
        } else {
            Ok((Some(Node::Leaf(self)), None))
        }
    }

    fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_bytes(&self.partial.encode_compact())
            .encode_bytes(&self.value)
            .finish();
        buf
    }

    fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded(&self.encode_raw())
    }
}
