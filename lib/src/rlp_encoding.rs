use rlp::{Rlp, RlpStream};
use sha3::{Digest, Keccak256};

use crate::error::{BridgeError, Result};
use crate::path::{decode_path, encode_path};
use crate::types::{NodeRef, TrieNode, H256};

/// Compute Keccak256 hash
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a node into its canonical RLP form
pub fn encode_node(node: &TrieNode) -> Vec<u8> {
    match node {
        TrieNode::Empty => rlp::NULL_RLP.to_vec(),
        TrieNode::Leaf(path, value) => {
            let mut stream = RlpStream::new_list(2);
            stream.append(&encode_path(path, true));
            stream.append(value);
            stream.out().to_vec()
        }
        TrieNode::Extension(path, child) => {
            let mut stream = RlpStream::new_list(2);
            stream.append(&encode_path(path, false));
            append_ref(&mut stream, child);
            stream.out().to_vec()
        }
        TrieNode::Branch(children, value) => {
            // 16 child slots plus the value slot, empty ones as 0x80
            let mut stream = RlpStream::new_list(17);
            for child in children.iter() {
                match child {
                    Some(child) => append_ref(&mut stream, child),
                    None => {
                        stream.append_empty_data();
                    }
                }
            }
            match value {
                Some(value) => {
                    stream.append(value);
                }
                None => {
                    stream.append_empty_data();
                }
            }
            stream.out().to_vec()
        }
    }
}

fn append_ref(stream: &mut RlpStream, child: &NodeRef) {
    match child {
        NodeRef::Hash(hash) => {
            stream.append(&hash.to_vec());
        }
        NodeRef::Inline(encoded) => {
            stream.append_raw(encoded, 1);
        }
    }
}

/// Reference a parent stores for a child with this encoding
pub fn node_ref(encoded: &[u8]) -> NodeRef {
    if encoded.len() < 32 {
        NodeRef::Inline(encoded.to_vec())
    } else {
        NodeRef::Hash(keccak256(encoded))
    }
}

/// Decode an RLP-encoded node
pub fn decode_node(data: &[u8]) -> Result<TrieNode> {
    let rlp = Rlp::new(data);
    if rlp.is_data() {
        return if rlp.is_empty() {
            Ok(TrieNode::Empty)
        } else {
            Err(BridgeError::Malformed("trie node is a byte string".into()))
        };
    }

    match rlp.item_count()? {
        2 => {
            let (path, is_leaf) = decode_path(rlp.at(0)?.data()?)?;
            if is_leaf {
                Ok(TrieNode::Leaf(path, rlp.at(1)?.data()?.to_vec()))
            } else {
                if path.is_empty() {
                    return Err(BridgeError::Malformed("extension with empty path".into()));
                }
                let child = decode_ref(&rlp.at(1)?)?
                    .ok_or_else(|| BridgeError::Malformed("extension without child".into()))?;
                Ok(TrieNode::Extension(path, child))
            }
        }
        17 => {
            let mut children: Box<[Option<NodeRef>; 16]> = Box::default();
            for (i, slot) in children.iter_mut().enumerate() {
                *slot = decode_ref(&rlp.at(i)?)?;
            }
            let value = rlp.at(16)?.data()?;
            let value = if value.is_empty() {
                None
            } else {
                Some(value.to_vec())
            };
            Ok(TrieNode::Branch(children, value))
        }
        n => Err(BridgeError::Malformed(format!(
            "trie node has {n} items, expected 2 or 17"
        ))),
    }
}

fn decode_ref(item: &Rlp) -> Result<Option<NodeRef>> {
    if item.is_list() {
        return Ok(Some(NodeRef::Inline(item.as_raw().to_vec())));
    }
    let data = item.data()?;
    match data.len() {
        0 => Ok(None),
        32 => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(data);
            Ok(Some(NodeRef::Hash(hash)))
        }
        n => Err(BridgeError::Malformed(format!(
            "child reference of {n} bytes"
        ))),
    }
}
