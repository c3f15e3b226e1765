use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use alloy_primitives::{Address as SolAddress, Bytes, FixedBytes};
use alloy_sol_types::SolValue;
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::envelope::{receipt_logs, transaction_destination};
use crate::error::{BridgeError, Result};
use crate::mpt::verify_proof;
use crate::registry::ChainRegistry;
use crate::rlp_encoding::keccak256;
use crate::types::{Address, ChainId, InclusionProof, TriggerProof, H256};
use crate::TriggerAuthorization;

/// Identifier of one event: `keccak256(rlp([chain_id, block_hash, event_key]))`
pub fn event_id(chain_id: &ChainId, block_hash: &H256, event_key: &[u8]) -> H256 {
    let mut stream = RlpStream::new_list(3);
    stream
        .append(&chain_id.to_vec())
        .append(&block_hash.to_vec())
        .append(&event_key.to_vec());
    keccak256(&stream.out())
}

/// Proof that an event happened and has not been consumed before
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationToken {
    pub event_id: H256,
    pub chain_id: ChainId,
    /// Block hash of the accepted header the proof was checked against
    pub block_hash: H256,
    pub event_key: Vec<u8>,
    pub emitter: Address,
    pub tx_hash: H256,
}

impl AuthorizationToken {
    /// Solidity ABI encoding of the token as a `TriggerAuthorization` struct
    pub fn abi_encode(&self) -> Vec<u8> {
        TriggerAuthorization {
            eventId: FixedBytes(self.event_id),
            chainId: FixedBytes(self.chain_id),
            blockHash: FixedBytes(self.block_hash),
            eventKey: Bytes::copy_from_slice(&self.event_key),
            emitter: SolAddress::from(self.emitter),
            txHash: FixedBytes(self.tx_hash),
        }
        .abi_encode()
    }
}

/// A consumed event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub chain_id: ChainId,
    pub block_hash: H256,
    pub event_key: Vec<u8>,
}

impl ExecutionRecord {
    pub fn event_id(&self) -> H256 {
        event_id(&self.chain_id, &self.block_hash, &self.event_key)
    }

    fn duplicate(&self) -> BridgeError {
        BridgeError::DuplicateExecution {
            chain_id: self.chain_id,
            block_hash: self.block_hash,
            event_key: self.event_key.clone(),
        }
    }
}

/// Gate between proven foreign events and their single downstream execution.
///
/// Holds the execution records; the chain registry is passed into every call.
#[derive(Default)]
pub struct TriggerVerifier {
    executed: Mutex<HashMap<H256, ExecutionRecord>>,
}

impl TriggerVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `proof` against the registry's accepted roots and consume its event.
    ///
    /// Every check runs before the record is written, so a rejected proof
    /// leaves no trace. An event that was already consumed is reported as
    /// `DuplicateExecution` whether or not this particular proof is valid.
    pub fn verify_and_authorize(
        &self,
        registry: &ChainRegistry,
        proof: &TriggerProof,
    ) -> Result<AuthorizationToken> {
        let header = registry.accepted_header(proof.chain_id, proof.block_hash)?;
        let record = ExecutionRecord {
            chain_id: proof.chain_id,
            block_hash: header.block_hash,
            event_key: proof.event_key.clone(),
        };
        let event_id = record.event_id();
        if self.is_executed(&event_id) {
            warn!(event = %hex::encode(event_id), "replayed event");
            return Err(record.duplicate());
        }

        check_inclusion(
            &header.transactions_root,
            &proof.event_key,
            &proof.tx_proof,
            &proof.tx_bytes,
        )
        .map_err(|source| BridgeError::TxProofInvalid {
            key: proof.event_key.clone(),
            source: Box::new(source),
        })?;
        check_inclusion(
            &header.receipts_root,
            &proof.event_key,
            &proof.receipt_proof,
            &proof.receipt_bytes,
        )
        .map_err(|source| BridgeError::ReceiptProofInvalid {
            key: proof.event_key.clone(),
            source: Box::new(source),
        })?;

        check_emitter(proof)?;

        let mut executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
        if executed.contains_key(&event_id) {
            warn!(event = %hex::encode(event_id), "event consumed concurrently");
            return Err(record.duplicate());
        }
        executed.insert(event_id, record);
        drop(executed);

        info!(
            chain_id = %hex::encode(proof.chain_id),
            block = %hex::encode(header.block_hash),
            event = %hex::encode(event_id),
            "authorized event"
        );
        Ok(AuthorizationToken {
            event_id,
            chain_id: proof.chain_id,
            block_hash: header.block_hash,
            event_key: proof.event_key.clone(),
            emitter: proof.expected_emitter,
            tx_hash: keccak256(&proof.tx_bytes),
        })
    }

    pub fn is_executed(&self, event_id: &H256) -> bool {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_id)
    }

    pub fn executed_count(&self) -> usize {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Execution records ordered by event id
    pub(crate) fn snapshot(&self) -> Vec<ExecutionRecord> {
        let executed = self.executed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<(H256, ExecutionRecord)> = executed
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        records.sort_unstable_by_key(|(id, _)| *id);
        records.into_iter().map(|(_, record)| record).collect()
    }

    pub(crate) fn from_records(records: Vec<ExecutionRecord>) -> Self {
        let executed = records
            .into_iter()
            .map(|record| (record.event_id(), record))
            .collect();
        Self {
            executed: Mutex::new(executed),
        }
    }
}

// Undecodable bytes cannot confirm the emitter either
fn check_emitter(proof: &TriggerProof) -> Result<()> {
    let mismatch = |actual| BridgeError::EmitterMismatch {
        expected: proof.expected_emitter,
        actual,
    };

    let destination = transaction_destination(&proof.tx_bytes).map_err(|_| mismatch(None))?;
    if destination != Some(proof.expected_emitter) {
        return Err(mismatch(destination));
    }

    let logs = receipt_logs(&proof.receipt_bytes).map_err(|_| mismatch(None))?;
    if !logs.iter().any(|log| {
        log.matches(&proof.expected_emitter, &proof.expected_topic, &proof.expected_data)
    }) {
        let from_emitter = logs.iter().find(|log| log.address == proof.expected_emitter);
        return Err(mismatch(from_emitter.or(logs.first()).map(|log| log.address)));
    }
    Ok(())
}

/// Log payload of a trigger event that records its caller: the ABI encoded address
pub fn caller_data(caller: &Address) -> Vec<u8> {
    SolAddress::from(*caller).abi_encode()
}

fn check_inclusion(root: &H256, key: &[u8], proof: &InclusionProof, expected: &[u8]) -> Result<()> {
    let proven = verify_proof(root, key, proof)?;
    if proven != expected {
        return Err(BridgeError::ValueMismatch { proven });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Trie;
    use crate::error::ErrorKind;
    use crate::path::index_key;
    use crate::registry::ValidatorSet;
    use crate::testing::{chain_id, legacy_tx, log, receipt, sealed_header, TestValidator};
    use crate::types::AcceptedHeader;

    const GENESIS: H256 = [0x99; 32];
    const EMITTER: Address = [0xee; 20];
    const CALLER: Address = [0xca; 20];
    const TRIGGERED: H256 = [0x27; 32];

    struct Fixture {
        registry: ChainRegistry,
        accepted: AcceptedHeader,
        txs: Trie,
        receipts: Trie,
    }

    fn fixture() -> Fixture {
        // index 5 holds bytes that are not a transaction
        let mut txs: Vec<Vec<u8>> = (0..5).map(|n| legacy_tx(n, &EMITTER)).collect();
        txs.push(b"opaque payload that is not a transaction".to_vec());
        let receipts: Vec<Vec<u8>> = (0..6)
            .map(|_| {
                receipt(&[
                    log([0x01; 20], TRIGGERED, caller_data(&CALLER)),
                    log(EMITTER, [0x44; 32], vec![]),
                    log(EMITTER, TRIGGERED, caller_data(&CALLER)),
                ])
            })
            .collect();
        let txs = Trie::build(&txs);
        let receipts = Trie::build(&receipts);

        let validator = TestValidator::new(2);
        let registry = ChainRegistry::new();
        let set = ValidatorSet::new(vec![TestValidator::new(1).address, validator.address]).unwrap();
        registry.register(chain_id(0xaa), set, GENESIS).unwrap();
        let header = sealed_header(&validator, GENESIS, 1, txs.root(), receipts.root());
        let accepted = registry.submit_header(chain_id(0xaa), &header).unwrap();
        Fixture {
            registry,
            accepted,
            txs,
            receipts,
        }
    }

    impl Fixture {
        fn proof(&self, index: usize) -> TriggerProof {
            let key = index_key(index);
            TriggerProof {
                chain_id: chain_id(0xaa),
                block_hash: self.accepted.block_hash,
                tx_bytes: self.txs.get(&key).unwrap(),
                tx_proof: self.txs.prove(&key).unwrap(),
                receipt_bytes: self.receipts.get(&key).unwrap(),
                receipt_proof: self.receipts.prove(&key).unwrap(),
                event_key: key,
                expected_emitter: EMITTER,
                expected_topic: TRIGGERED,
                expected_data: caller_data(&CALLER),
            }
        }
    }

    #[test]
    fn test_authorize_once() {
        let fixture = fixture();
        let verifier = TriggerVerifier::new();
        let proof = fixture.proof(3);

        let token = verifier.verify_and_authorize(&fixture.registry, &proof).unwrap();
        assert_eq!(token.event_id, event_id(&chain_id(0xaa), &fixture.accepted.block_hash, &index_key(3)));
        assert_eq!(token.tx_hash, keccak256(&proof.tx_bytes));
        assert!(verifier.is_executed(&token.event_id));

        assert_eq!(
            verifier.verify_and_authorize(&fixture.registry, &proof),
            Err(BridgeError::DuplicateExecution {
                chain_id: chain_id(0xaa),
                block_hash: fixture.accepted.block_hash,
                event_key: index_key(3),
            })
        );
        assert_eq!(verifier.executed_count(), 1);
    }

    #[test]
    fn test_replay_via_canonical_hash() {
        let fixture = fixture();
        let verifier = TriggerVerifier::new();
        verifier
            .verify_and_authorize(&fixture.registry, &fixture.proof(0))
            .unwrap();

        let mut replay = fixture.proof(0);
        replay.block_hash = fixture.accepted.canonical_hash;
        assert!(matches!(
            verifier.verify_and_authorize(&fixture.registry, &replay),
            Err(BridgeError::DuplicateExecution { .. })
        ));
    }

    #[test]
    fn test_duplicate_wins_over_invalid_proof() {
        let fixture = fixture();
        let verifier = TriggerVerifier::new();
        verifier
            .verify_and_authorize(&fixture.registry, &fixture.proof(1))
            .unwrap();

        let mut broken = fixture.proof(1);
        broken.tx_proof.nodes.clear();
        assert_eq!(
            verifier
                .verify_and_authorize(&fixture.registry, &broken)
                .unwrap_err()
                .kind(),
            ErrorKind::ReplayViolation
        );
    }

    #[test]
    fn test_unknown_block() {
        let fixture = fixture();
        let mut proof = fixture.proof(0);
        proof.block_hash = [0x42; 32];
        assert!(matches!(
            TriggerVerifier::new().verify_and_authorize(&fixture.registry, &proof),
            Err(BridgeError::UnknownBlock { .. })
        ));
    }

    #[test]
    fn test_invalid_tx_proof_leaves_no_record() {
        let fixture = fixture();
        let verifier = TriggerVerifier::new();
        let mut proof = fixture.proof(2);
        let last = proof.tx_proof.nodes.len() - 1;
        proof.tx_proof.nodes[last][3] ^= 0xff;

        let err = verifier
            .verify_and_authorize(&fixture.registry, &proof)
            .unwrap_err();
        assert!(matches!(err, BridgeError::TxProofInvalid { .. }));
        assert_eq!(verifier.executed_count(), 0);

        // the untouched proof still goes through afterwards
        verifier
            .verify_and_authorize(&fixture.registry, &fixture.proof(2))
            .unwrap();
    }

    #[test]
    fn test_substituted_tx_bytes() {
        let fixture = fixture();
        let mut proof = fixture.proof(2);
        proof.tx_bytes = legacy_tx(99, &EMITTER);
        let err = TriggerVerifier::new()
            .verify_and_authorize(&fixture.registry, &proof)
            .unwrap_err();
        match err {
            BridgeError::TxProofInvalid { source, .. } => {
                assert!(matches!(*source, BridgeError::ValueMismatch { .. }))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_receipt_proof_against_tx_root() {
        let fixture = fixture();
        let mut proof = fixture.proof(4);
        proof.receipt_proof = proof.tx_proof.clone();
        assert!(matches!(
            TriggerVerifier::new().verify_and_authorize(&fixture.registry, &proof),
            Err(BridgeError::ReceiptProofInvalid { .. })
        ));
    }

    #[test]
    fn test_wrong_emitter() {
        let fixture = fixture();
        // [0x01; 20] logs the expected event, but the transaction did not call it
        let mut proof = fixture.proof(0);
        proof.expected_emitter = [0x01; 20];
        assert_eq!(
            TriggerVerifier::new().verify_and_authorize(&fixture.registry, &proof),
            Err(BridgeError::EmitterMismatch {
                expected: [0x01; 20],
                actual: Some(EMITTER),
            })
        );
    }

    #[test]
    fn test_log_with_other_topic_is_not_enough() {
        let fixture = fixture();
        let verifier = TriggerVerifier::new();
        let mut proof = fixture.proof(1);
        proof.expected_topic = [0x55; 32];
        assert_eq!(
            verifier.verify_and_authorize(&fixture.registry, &proof),
            Err(BridgeError::EmitterMismatch {
                expected: EMITTER,
                actual: Some(EMITTER),
            })
        );
        assert_eq!(verifier.executed_count(), 0);
    }

    #[test]
    fn test_event_from_other_caller_is_rejected() {
        let fixture = fixture();
        let mut proof = fixture.proof(1);
        proof.expected_data = caller_data(&[0xcb; 20]);
        assert!(matches!(
            TriggerVerifier::new().verify_and_authorize(&fixture.registry, &proof),
            Err(BridgeError::EmitterMismatch { .. })
        ));
    }

    #[test]
    fn test_undecodable_transaction_cannot_confirm_emitter() {
        let fixture = fixture();
        assert_eq!(
            TriggerVerifier::new().verify_and_authorize(&fixture.registry, &fixture.proof(5)),
            Err(BridgeError::EmitterMismatch {
                expected: EMITTER,
                actual: None,
            })
        );
    }

    #[test]
    fn test_caller_data_is_one_abi_word() {
        let data = caller_data(&CALLER);
        assert_eq!(data.len(), 32);
        assert_eq!(&data[..12], &[0u8; 12]);
        assert_eq!(&data[12..], &CALLER);
    }

    #[test]
    fn test_abi_encoding_carries_event_id() {
        let fixture = fixture();
        let token = TriggerVerifier::new()
            .verify_and_authorize(&fixture.registry, &fixture.proof(0))
            .unwrap();
        let encoded = token.abi_encode();
        assert_eq!(encoded.len() % 32, 0);
        assert!(encoded.chunks(32).any(|word| word == token.event_id));
        assert!(encoded.chunks(32).any(|word| word == token.block_hash));
    }

    #[test]
    fn test_records_survive_snapshot() {
        let fixture = fixture();
        let verifier = TriggerVerifier::new();
        let token = verifier
            .verify_and_authorize(&fixture.registry, &fixture.proof(0))
            .unwrap();

        let restored = TriggerVerifier::from_records(verifier.snapshot());
        assert!(restored.is_executed(&token.event_id));
        assert!(matches!(
            restored.verify_and_authorize(&fixture.registry, &fixture.proof(0)),
            Err(BridgeError::DuplicateExecution { .. })
        ));
    }
}
