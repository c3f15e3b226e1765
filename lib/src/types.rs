use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::header::SIGNATURE_LEN;

/// 32-byte hash type
pub type H256 = [u8; 32];

/// 20-byte account identity (validators, emitters)
pub type Address = [u8; 20];

/// Identifier of a foreign chain as registered on this side of the bridge
pub type ChainId = H256;

/// Root of a trie with no entries: keccak256(rlp(""))
pub const EMPTY_ROOT: H256 = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

/// Reference from a parent node to a child.
///
/// Children whose encoding is shorter than 32 bytes are embedded in the parent,
/// everything else is referenced by the keccak hash of its encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    Hash(H256),
    Inline(Vec<u8>),
}

/// MPT Node types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// Empty node
    Empty,

    /// Leaf node: (nibble path, value)
    Leaf(Vec<u8>, Vec<u8>),

    /// Extension node: (nibble path, child)
    Extension(Vec<u8>, NodeRef),

    /// Branch node: 16 children + optional value
    Branch(Box<[Option<NodeRef>; 16]>, Option<Vec<u8>>),
}

/// Ordered node encodings from the root towards the leaf holding a key.
///
/// Only hash-referenced nodes appear; inline children travel inside their parent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub nodes: Vec<Vec<u8>>,
}

impl InclusionProof {
    pub fn new(nodes: Vec<Vec<u8>>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl From<Vec<Vec<u8>>> for InclusionProof {
    fn from(nodes: Vec<Vec<u8>>) -> Self {
        Self::new(nodes)
    }
}

/// Seal layout of a foreign chain's extra-data field: `vanity || ... || seal`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Leading bytes reserved for signer vanity
    pub vanity_len: usize,
    /// Trailing bytes holding the `r || s || v` signature
    pub seal_len: usize,
}

impl ConsensusParams {
    /// Clique proof-of-authority layout
    pub const CLIQUE: ConsensusParams = ConsensusParams {
        vanity_len: 32,
        seal_len: 65,
    };

    /// Minimum extra-data length a sealed header must carry, `None` on overflow
    pub fn min_extra_len(&self) -> Option<usize> {
        self.vanity_len.checked_add(self.seal_len)
    }

    /// The seal must hold exactly one `r || s || v` signature
    pub fn validate(&self) -> Result<()> {
        if self.seal_len != SIGNATURE_LEN || self.min_extra_len().is_none() {
            return Err(BridgeError::InvalidConsensusParams {
                vanity_len: self.vanity_len,
                seal_len: self.seal_len,
            });
        }
        Ok(())
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::CLIQUE
    }
}

/// A header accepted by the chain registry, with the roots it commits to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedHeader {
    /// keccak256 of the full sealed header, the hash the next block links to
    pub block_hash: H256,
    /// keccak256 of the seal-stripped header, the digest the validator signed
    pub canonical_hash: H256,
    pub parent_hash: H256,
    pub number: u64,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub signer: Address,
}

/// Input to the trigger verifier: a proven transaction/receipt pair for one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerProof {
    pub chain_id: ChainId,
    /// Block hash or canonical hash of an accepted header
    pub block_hash: H256,
    /// Trie key of the transaction and its receipt, usually `index_key(i)`
    pub event_key: Vec<u8>,
    pub tx_bytes: Vec<u8>,
    pub tx_proof: InclusionProof,
    pub receipt_bytes: Vec<u8>,
    pub receipt_proof: InclusionProof,
    pub expected_emitter: Address,
    /// Event signature hash the emitter's log must carry as its first topic
    pub expected_topic: H256,
    /// Exact log payload, e.g. the ABI encoded caller of the trigger
    pub expected_data: Vec<u8>,
}
