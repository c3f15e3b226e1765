//! Verification core of a cross-chain event bridge.
//!
//! Foreign block headers are checked against registered validator sets, and
//! transactions and receipts are tied to accepted headers through Merkle
//! Patricia Trie inclusion proofs. Each proven event authorizes exactly one
//! execution.

use alloy_sol_types::sol;

pub mod types;
pub mod error;
pub mod rlp_encoding;
pub mod path;
pub mod mpt;
pub mod header;
pub mod envelope;
pub mod registry;
pub mod trigger;
pub mod state;
pub mod builder;

#[cfg(test)]
mod testing;

pub use types::*;
pub use error::*;
pub use rlp_encoding::*;
pub use path::*;
pub use mpt::*;
pub use header::{
    canonical_hash, public_key_address, recover_signer, signed_hash, strip_seal, BlockHeader,
    CanonicalHeader, SIGNATURE_LEN,
};
pub use envelope::*;
pub use registry::*;
pub use trigger::*;
pub use state::*;
pub use builder::*;

sol! {
    /// Authorization handed to the execution layer, ABI encoded.
    struct TriggerAuthorization {
        bytes32 eventId;
        bytes32 chainId;
        bytes32 blockHash;
        bytes eventKey;
        address emitter;
        bytes32 txHash;
    }
}
