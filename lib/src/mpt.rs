use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::path::to_nibbles;
use crate::rlp_encoding::{decode_node, keccak256};
use crate::types::{InclusionProof, NodeRef, TrieNode, H256};

/// Verify a Merkle Patricia Trie proof and return the value stored at `key`.
///
/// Works from the proof alone, never from the full trie:
/// * the first node must hash to `root` (`RootMismatch` otherwise),
/// * every later node must hash to the reference its parent holds at the
///   nibble `key` selects (`ProofMismatch` otherwise),
/// * an authentic proof whose path leaves the key is a `KeyNotFound`.
///
/// A node is hashed before it is decoded, so a modified byte anywhere in the
/// proof surfaces as one of the two mismatch errors.
pub fn verify_proof(root: &H256, key: &[u8], proof: &InclusionProof) -> Result<Vec<u8>> {
    let Some(first) = proof.nodes.first() else {
        return Err(BridgeError::ProofMismatch {
            depth: 0,
            expected: *root,
            actual: keccak256(&rlp::NULL_RLP),
        });
    };

    let actual = keccak256(first);
    if actual != *root {
        return Err(BridgeError::RootMismatch {
            expected: *root,
            actual,
        });
    }

    let not_found = || BridgeError::KeyNotFound { key: key.to_vec() };
    let nibbles = to_nibbles(key);
    let mut nibble_idx = 0;
    let mut next = 1;
    let mut encoded = first.clone();

    loop {
        let child = match decode_node(&encoded)? {
            TrieNode::Empty => return Err(not_found()),
            TrieNode::Leaf(path, value) => {
                if path != nibbles[nibble_idx..] {
                    return Err(not_found());
                }
                return finish(proof, next, value);
            }
            TrieNode::Extension(path, child) => {
                if !nibbles[nibble_idx..].starts_with(&path) {
                    return Err(not_found());
                }
                nibble_idx += path.len();
                child
            }
            TrieNode::Branch(mut children, value) => {
                let Some(&nibble) = nibbles.get(nibble_idx) else {
                    // Value is in branch node itself (index 16)
                    return finish(proof, next, value.ok_or_else(not_found)?);
                };
                nibble_idx += 1;
                children[nibble as usize].take().ok_or_else(not_found)?
            }
        };

        encoded = match child {
            NodeRef::Inline(node) => node,
            NodeRef::Hash(expected) => {
                let Some(node) = proof.nodes.get(next) else {
                    return Err(BridgeError::ProofMismatch {
                        depth: next,
                        expected,
                        actual: keccak256(&rlp::NULL_RLP),
                    });
                };
                let actual = keccak256(node);
                if actual != expected {
                    return Err(BridgeError::ProofMismatch {
                        depth: next,
                        expected,
                        actual,
                    });
                }
                next += 1;
                node.clone()
            }
        };
    }
}

// The value node must be the last one supplied
fn finish(proof: &InclusionProof, used: usize, value: Vec<u8>) -> Result<Vec<u8>> {
    if let Some(extra) = proof.nodes.get(used) {
        return Err(BridgeError::ProofMismatch {
            depth: used,
            expected: keccak256(&rlp::NULL_RLP),
            actual: keccak256(extra),
        });
    }
    debug!(nodes = used, "verified inclusion proof");
    Ok(value)
}
