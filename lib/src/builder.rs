use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::mpt::verify_proof;
use crate::path::{common_prefix_len, index_key, to_nibbles};
use crate::rlp_encoding::{decode_node, encode_node, keccak256, node_ref};
use crate::types::{InclusionProof, NodeRef, TrieNode, EMPTY_ROOT, H256};

/// An immutable Merkle Patricia Trie over an ordered list of items.
///
/// Nodes live in an arena keyed by the keccak hash of their encoding, so equal
/// subtrees are stored once and references are hashes rather than pointers.
#[derive(Clone, Debug)]
pub struct Trie {
    // Store nodes by their hash
    nodes: HashMap<H256, Vec<u8>>,
    root: Option<H256>,
    len: usize,
}

impl Trie {
    /// Build the trie a block commits to for its transactions or receipts:
    /// item `i` is stored under `index_key(i)`.
    pub fn build<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[u8]>,
    {
        Self::from_entries(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (index_key(i), item)),
        )
    }

    /// Build a trie over arbitrary key/value pairs. Later duplicates overwrite
    /// earlier ones.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut builder = TrieBuilder::default();
        let mut keys = HashSet::new();
        for (key, value) in entries {
            builder.insert(key.as_ref(), value.as_ref());
            keys.insert(key.as_ref().to_vec());
        }
        let trie = builder.finish(keys.len());
        debug!(
            root = %hex::encode(trie.root()),
            entries = trie.len,
            nodes = trie.nodes.len(),
            "built trie"
        );
        trie
    }

    /// Get the root hash
    pub fn root(&self) -> H256 {
        self.root.unwrap_or(EMPTY_ROOT)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Generate a proof for a key (collect the hashed nodes along the path)
    pub fn prove(&self, key: &[u8]) -> Result<InclusionProof> {
        let mut proof = Vec::new();
        self.walk(key, |encoded| proof.push(encoded.to_vec()))?;
        Ok(InclusionProof::new(proof))
    }

    /// Check `proof` against `root` without a trie at hand, see [`verify_proof`]
    pub fn verify(root: &H256, key: &[u8], proof: &InclusionProof) -> Result<Vec<u8>> {
        verify_proof(root, key, proof)
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.walk(key, |_| {}).ok()
    }

    /// Follow `key` from the root, handing every hash-referenced node to `visit`,
    /// and return the value stored at the key.
    fn walk(&self, key: &[u8], mut visit: impl FnMut(&[u8])) -> Result<Vec<u8>> {
        let not_found = || BridgeError::KeyNotFound { key: key.to_vec() };
        let root = self.root.ok_or_else(not_found)?;

        let nibbles = to_nibbles(key);
        let mut remaining = &nibbles[..];
        let mut encoded = self.lookup(&root)?.to_vec();
        visit(&encoded);

        loop {
            let child = match decode_node(&encoded)? {
                TrieNode::Empty => return Err(not_found()),
                TrieNode::Leaf(path, value) => {
                    return if path == remaining {
                        Ok(value)
                    } else {
                        Err(not_found())
                    };
                }
                TrieNode::Extension(path, child) => {
                    if !remaining.starts_with(&path) {
                        return Err(not_found());
                    }
                    remaining = &remaining[path.len()..];
                    child
                }
                TrieNode::Branch(mut children, value) => {
                    let Some((&nibble, rest)) = remaining.split_first() else {
                        // Value is in the branch itself
                        return value.ok_or_else(not_found);
                    };
                    remaining = rest;
                    children[nibble as usize].take().ok_or_else(not_found)?
                }
            };

            encoded = match child {
                NodeRef::Hash(hash) => {
                    let node = self.lookup(&hash)?.to_vec();
                    visit(&node);
                    node
                }
                NodeRef::Inline(node) => node,
            };
        }
    }

    fn lookup(&self, hash: &H256) -> Result<&[u8]> {
        self.nodes.get(hash).map(Vec::as_slice).ok_or_else(|| {
            BridgeError::Malformed(format!("trie node 0x{} missing from arena", hex::encode(hash)))
        })
    }
}

/// Insertion state used while a [`Trie`] is being built
#[derive(Default)]
struct TrieBuilder {
    nodes: HashMap<H256, Vec<u8>>,
    // In-memory representation of nodes for easier manipulation
    node_cache: HashMap<H256, TrieNode>,
    root: Option<NodeRef>,
}

impl TrieBuilder {
    fn insert(&mut self, key: &[u8], value: &[u8]) {
        let nibbles = to_nibbles(key);
        let root = self.root.take();
        self.root = Some(self.insert_at(root, &nibbles, value.to_vec()));
    }

    /// Recursively insert into the trie
    fn insert_at(&mut self, node: Option<NodeRef>, path: &[u8], value: Vec<u8>) -> NodeRef {
        let Some(node) = node else {
            return self.store(TrieNode::Leaf(path.to_vec(), value));
        };

        match self.get_node(&node) {
            TrieNode::Empty => self.store(TrieNode::Leaf(path.to_vec(), value)),
            TrieNode::Leaf(leaf_path, leaf_value) => {
                let common_len = common_prefix_len(&leaf_path, path);

                if common_len == leaf_path.len() && common_len == path.len() {
                    // Exact match - update value
                    return self.store(TrieNode::Leaf(leaf_path, value));
                }

                let mut children: Box<[Option<NodeRef>; 16]> = Box::default();
                let mut branch_value = None;

                // Handle the existing leaf
                if common_len == leaf_path.len() {
                    branch_value = Some(leaf_value);
                } else {
                    let idx = leaf_path[common_len] as usize;
                    children[idx] = Some(
                        self.store(TrieNode::Leaf(leaf_path[common_len + 1..].to_vec(), leaf_value)),
                    );
                }

                // Handle the new value
                if common_len == path.len() {
                    branch_value = Some(value);
                } else {
                    let idx = path[common_len] as usize;
                    children[idx] =
                        Some(self.store(TrieNode::Leaf(path[common_len + 1..].to_vec(), value)));
                }

                let branch = self.store(TrieNode::Branch(children, branch_value));
                self.wrap_extension(&path[..common_len], branch)
            }
            TrieNode::Extension(ext_path, child) => {
                let common_len = common_prefix_len(&ext_path, path);

                if common_len == ext_path.len() {
                    // Continue down the extension
                    let new_child = self.insert_at(Some(child), &path[common_len..], value);
                    return self.store(TrieNode::Extension(ext_path, new_child));
                }

                // Extension needs to be split at the first diverging nibble
                let mut children: Box<[Option<NodeRef>; 16]> = Box::default();
                let old_idx = ext_path[common_len] as usize;
                children[old_idx] = Some(self.wrap_extension(&ext_path[common_len + 1..], child));

                let mut branch_value = None;
                if common_len == path.len() {
                    branch_value = Some(value);
                } else {
                    let new_idx = path[common_len] as usize;
                    children[new_idx] =
                        Some(self.store(TrieNode::Leaf(path[common_len + 1..].to_vec(), value)));
                }

                let branch = self.store(TrieNode::Branch(children, branch_value));
                self.wrap_extension(&path[..common_len], branch)
            }
            TrieNode::Branch(mut children, branch_value) => {
                let Some((&nibble, rest)) = path.split_first() else {
                    return self.store(TrieNode::Branch(children, Some(value)));
                };
                let idx = nibble as usize;
                let existing = children[idx].take();
                children[idx] = Some(self.insert_at(existing, rest, value));
                self.store(TrieNode::Branch(children, branch_value))
            }
        }
    }

    /// Put `child` behind an extension for `path`, or return it as is for an empty path
    fn wrap_extension(&mut self, path: &[u8], child: NodeRef) -> NodeRef {
        if path.is_empty() {
            child
        } else {
            self.store(TrieNode::Extension(path.to_vec(), child))
        }
    }

    /// Encode a node, record it in the arena and return the reference a parent keeps
    fn store(&mut self, node: TrieNode) -> NodeRef {
        let encoded = encode_node(&node);
        let reference = node_ref(&encoded);
        let hash = keccak256(&encoded);
        self.node_cache.insert(hash, node);
        self.nodes.insert(hash, encoded);
        reference
    }

    fn get_node(&self, reference: &NodeRef) -> TrieNode {
        let hash = match reference {
            NodeRef::Hash(hash) => *hash,
            NodeRef::Inline(encoded) => keccak256(encoded),
        };
        // Every reference handed out by `store` has a cache entry
        self.node_cache.get(&hash).cloned().unwrap_or(TrieNode::Empty)
    }

    /// Drop every node the final root cannot reach
    fn finish(self, len: usize) -> Trie {
        let Some(root_ref) = self.root else {
            return Trie {
                nodes: HashMap::new(),
                root: None,
                len: 0,
            };
        };

        let root = match &root_ref {
            NodeRef::Hash(hash) => *hash,
            NodeRef::Inline(encoded) => keccak256(encoded),
        };

        let mut nodes = HashMap::new();
        let mut pending = vec![root];
        while let Some(hash) = pending.pop() {
            if nodes.contains_key(&hash) {
                continue;
            }
            let Some(encoded) = self.nodes.get(&hash) else {
                continue;
            };
            match self.node_cache.get(&hash) {
                Some(TrieNode::Extension(_, child)) => collect_ref(child, &mut pending),
                Some(TrieNode::Branch(children, _)) => {
                    children.iter().flatten().for_each(|c| collect_ref(c, &mut pending))
                }
                _ => {}
            }
            nodes.insert(hash, encoded.clone());
        }

        Trie {
            nodes,
            root: Some(root),
            len,
        }
    }
}

// Inline children travel inside their parent's encoding and need no arena entry
fn collect_ref(reference: &NodeRef, pending: &mut Vec<H256>) {
    if let NodeRef::Hash(hash) = reference {
        pending.push(*hash);
    }
}
