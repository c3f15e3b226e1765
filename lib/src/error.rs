use thiserror::Error;

use crate::types::{Address, ChainId, H256};

/// Coarse classification of a [`BridgeError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad encoding, wrong lengths
    MalformedInput,
    /// The referenced key, block, signer or chain does not exist
    NotFound,
    /// A hash, proof or signature did not check out
    IntegrityViolation,
    /// Submission out of order or duplicate registration
    OrderingViolation,
    /// The event was already consumed
    ReplayViolation,
}

/// Errors returned by the verification core.
///
/// Every variant names the chain, hash or key it failed on so callers can
/// diagnose a rejection without re-deriving the proof.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("extra-data holds {actual} bytes, a sealed header needs at least {required}")]
    MalformedExtraData { actual: usize, required: usize },

    #[error("seal layout of {vanity_len} vanity and {seal_len} seal bytes is unusable")]
    InvalidConsensusParams { vanity_len: usize, seal_len: usize },

    #[error("validator set is empty")]
    EmptyValidatorSet,

    #[error("validator 0x{} listed twice", hex::encode(.0))]
    DuplicateValidator(Address),

    #[error("key 0x{} not found in trie", hex::encode(.key))]
    KeyNotFound { key: Vec<u8> },

    #[error("chain 0x{} is not registered", hex::encode(.chain_id))]
    UnknownChain { chain_id: ChainId },

    #[error("block 0x{} is not an accepted header of chain 0x{}", hex::encode(.block_hash), hex::encode(.chain_id))]
    UnknownBlock { chain_id: ChainId, block_hash: H256 },

    #[error("signer 0x{} is not a validator of chain 0x{}", hex::encode(.signer), hex::encode(.chain_id))]
    UnknownSigner { chain_id: ChainId, signer: Address },

    #[error("proof node {depth} hashes to 0x{}, parent references 0x{}", hex::encode(.actual), hex::encode(.expected))]
    ProofMismatch {
        depth: usize,
        expected: H256,
        actual: H256,
    },

    #[error("proof root 0x{} does not match trusted root 0x{}", hex::encode(.actual), hex::encode(.expected))]
    RootMismatch { expected: H256, actual: H256 },

    #[error("transaction proof for key 0x{} rejected: {source}", hex::encode(.key))]
    TxProofInvalid {
        key: Vec<u8>,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("receipt proof for key 0x{} rejected: {source}", hex::encode(.key))]
    ReceiptProofInvalid {
        key: Vec<u8>,
        #[source]
        source: Box<BridgeError>,
    },

    #[error("expected emitter 0x{}, found {}", hex::encode(.expected), .actual.map(|a| format!("0x{}", hex::encode(a))).unwrap_or_else(|| "none".to_string()))]
    EmitterMismatch {
        expected: Address,
        actual: Option<Address>,
    },

    #[error("proven value 0x{} differs from the supplied bytes", hex::encode(.proven))]
    ValueMismatch { proven: Vec<u8> },

    #[error("invalid seal: {0}")]
    InvalidSeal(String),

    #[error("header parent 0x{} does not extend 0x{} on chain 0x{}", hex::encode(.parent_hash), hex::encode(.expected_parent), hex::encode(.chain_id))]
    StaleHeader {
        chain_id: ChainId,
        parent_hash: H256,
        expected_parent: H256,
    },

    #[error("chain 0x{} is already registered", hex::encode(.chain_id))]
    AlreadyRegistered { chain_id: ChainId },

    #[error("event 0x{} in block 0x{} of chain 0x{} was already executed", hex::encode(.event_key), hex::encode(.block_hash), hex::encode(.chain_id))]
    DuplicateExecution {
        chain_id: ChainId,
        block_hash: H256,
        event_key: Vec<u8>,
    },
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Malformed(_)
            | BridgeError::MalformedExtraData { .. }
            | BridgeError::InvalidConsensusParams { .. }
            | BridgeError::EmptyValidatorSet
            | BridgeError::DuplicateValidator(_) => ErrorKind::MalformedInput,
            BridgeError::KeyNotFound { .. }
            | BridgeError::UnknownChain { .. }
            | BridgeError::UnknownBlock { .. }
            | BridgeError::UnknownSigner { .. } => ErrorKind::NotFound,
            BridgeError::ProofMismatch { .. }
            | BridgeError::RootMismatch { .. }
            | BridgeError::TxProofInvalid { .. }
            | BridgeError::ReceiptProofInvalid { .. }
            | BridgeError::EmitterMismatch { .. }
            | BridgeError::ValueMismatch { .. }
            | BridgeError::InvalidSeal(_) => ErrorKind::IntegrityViolation,
            BridgeError::StaleHeader { .. } | BridgeError::AlreadyRegistered { .. } => {
                ErrorKind::OrderingViolation
            }
            BridgeError::DuplicateExecution { .. } => ErrorKind::ReplayViolation,
        }
    }
}

impl From<rlp::DecoderError> for BridgeError {
    fn from(err: rlp::DecoderError) -> Self {
        BridgeError::Malformed(err.to_string())
    }
}

pub type Result<T, E = BridgeError> = core::result::Result<T, E>;
