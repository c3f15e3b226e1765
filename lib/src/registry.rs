use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BridgeError, Result};
use crate::header::{recover_signer, signed_hash, strip_seal, BlockHeader};
use crate::types::{AcceptedHeader, Address, ChainId, ConsensusParams, H256};

/// Ordered, duplicate-free, non-empty list of validator addresses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet(Vec<Address>);

impl ValidatorSet {
    pub fn new(validators: Vec<Address>) -> Result<Self> {
        if validators.is_empty() {
            return Err(BridgeError::EmptyValidatorSet);
        }
        let mut seen = HashSet::with_capacity(validators.len());
        for validator in &validators {
            if !seen.insert(validator) {
                return Err(BridgeError::DuplicateValidator(*validator));
            }
        }
        Ok(Self(validators))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.contains(address)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }
}

/// Everything the registry knows about one foreign chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRegistration {
    pub chain_id: ChainId,
    pub validators: ValidatorSet,
    pub genesis_hash: H256,
    pub params: ConsensusParams,
    /// Accepted headers, oldest first
    pub accepted: Vec<AcceptedHeader>,
}

impl ChainRegistration {
    pub fn latest(&self) -> Option<&AcceptedHeader> {
        self.accepted.last()
    }

    /// Hash the next header must name as its parent
    pub fn head_hash(&self) -> H256 {
        self.latest()
            .map(|header| header.block_hash)
            .unwrap_or(self.genesis_hash)
    }
}

// Registration plus a lookup index over both hashes of every accepted header
struct ChainEntry {
    registration: ChainRegistration,
    by_hash: HashMap<H256, usize>,
}

impl ChainEntry {
    fn new(registration: ChainRegistration) -> Self {
        let mut entry = Self {
            by_hash: HashMap::with_capacity(registration.accepted.len() * 2),
            registration,
        };
        for position in 0..entry.registration.accepted.len() {
            entry.index(position);
        }
        entry
    }

    fn index(&mut self, position: usize) {
        let header = &self.registration.accepted[position];
        self.by_hash.insert(header.block_hash, position);
        self.by_hash.insert(header.canonical_hash, position);
    }

    fn push(&mut self, header: AcceptedHeader) {
        self.registration.accepted.push(header);
        self.index(self.registration.accepted.len() - 1);
    }

    fn find(&self, hash: &H256) -> Option<&AcceptedHeader> {
        self.by_hash
            .get(hash)
            .map(|&position| &self.registration.accepted[position])
    }
}

type SharedEntry = Arc<RwLock<ChainEntry>>;

/// Table of registered foreign chains.
///
/// The outer lock guards membership only; each chain has its own lock, so
/// submissions for one chain serialize without blocking the others, and
/// lookups only ever take read locks.
#[derive(Default)]
pub struct ChainRegistry {
    chains: RwLock<HashMap<ChainId, SharedEntry>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain using the Clique seal layout
    pub fn register(
        &self,
        chain_id: ChainId,
        validators: ValidatorSet,
        genesis_hash: H256,
    ) -> Result<()> {
        self.register_with_params(chain_id, validators, genesis_hash, ConsensusParams::default())
    }

    pub fn register_with_params(
        &self,
        chain_id: ChainId,
        validators: ValidatorSet,
        genesis_hash: H256,
        params: ConsensusParams,
    ) -> Result<()> {
        params.validate()?;
        let registration = ChainRegistration {
            chain_id,
            validators,
            genesis_hash,
            params,
            accepted: Vec::new(),
        };
        self.insert(registration)?;
        info!(
            chain_id = %hex::encode(chain_id),
            genesis = %hex::encode(genesis_hash),
            "registered chain"
        );
        Ok(())
    }

    fn insert(&self, registration: ChainRegistration) -> Result<()> {
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
        let chain_id = registration.chain_id;
        if chains.contains_key(&chain_id) {
            return Err(BridgeError::AlreadyRegistered { chain_id });
        }
        chains.insert(chain_id, Arc::new(RwLock::new(ChainEntry::new(registration))));
        Ok(())
    }

    fn entry(&self, chain_id: &ChainId) -> Option<SharedEntry> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(chain_id)
            .cloned()
    }

    /// Validate a sealed header and append it to the chain's accepted history.
    ///
    /// The header must be signed by a registered validator and name the
    /// current head (or the genesis hash) as its parent. Nothing changes
    /// unless every check passes.
    pub fn submit_header(&self, chain_id: ChainId, header: &BlockHeader) -> Result<AcceptedHeader> {
        let entry = self
            .entry(&chain_id)
            .ok_or(BridgeError::UnknownChain { chain_id })?;
        let params = entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .registration
            .params;

        let (canonical, seal) = strip_seal(header, &params)?;
        let canonical_hash = canonical.canonical_hash();
        let signer = recover_signer(&canonical_hash, &seal)?;
        let block_hash = signed_hash(header);

        let mut entry = entry.write().unwrap_or_else(PoisonError::into_inner);
        if !entry.registration.validators.contains(&signer) {
            warn!(
                chain_id = %hex::encode(chain_id),
                signer = %hex::encode(signer),
                "header signed by unknown validator"
            );
            return Err(BridgeError::UnknownSigner { chain_id, signer });
        }

        let expected_parent = entry.registration.head_hash();
        if header.parent_hash != expected_parent {
            warn!(
                chain_id = %hex::encode(chain_id),
                block = %hex::encode(block_hash),
                parent = %hex::encode(header.parent_hash),
                head = %hex::encode(expected_parent),
                "header does not extend the accepted head"
            );
            return Err(BridgeError::StaleHeader {
                chain_id,
                parent_hash: header.parent_hash,
                expected_parent,
            });
        }

        let accepted = AcceptedHeader {
            block_hash,
            canonical_hash,
            parent_hash: header.parent_hash,
            number: header.number,
            transactions_root: header.transactions_root,
            receipts_root: header.receipts_root,
            signer,
        };
        entry.push(accepted.clone());
        info!(
            chain_id = %hex::encode(chain_id),
            number = accepted.number,
            block = %hex::encode(block_hash),
            signer = %hex::encode(signer),
            "accepted header"
        );
        Ok(accepted)
    }

    /// Accepted header known under `block_hash` (its block or canonical hash)
    pub fn accepted_header(&self, chain_id: ChainId, block_hash: H256) -> Result<AcceptedHeader> {
        let unknown = BridgeError::UnknownBlock {
            chain_id,
            block_hash,
        };
        let entry = self.entry(&chain_id).ok_or_else(|| unknown.clone())?;
        let entry = entry.read().unwrap_or_else(PoisonError::into_inner);
        entry.find(&block_hash).cloned().ok_or(unknown)
    }

    /// Transaction and receipt roots committed by an accepted header
    pub fn roots_for(&self, chain_id: ChainId, block_hash: H256) -> Result<(H256, H256)> {
        let header = self.accepted_header(chain_id, block_hash)?;
        Ok((header.transactions_root, header.receipts_root))
    }

    pub fn registration(&self, chain_id: ChainId) -> Result<ChainRegistration> {
        let entry = self
            .entry(&chain_id)
            .ok_or(BridgeError::UnknownChain { chain_id })?;
        let entry = entry.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entry.registration.clone())
    }

    pub fn latest(&self, chain_id: ChainId) -> Result<Option<AcceptedHeader>> {
        Ok(self.registration(chain_id)?.latest().cloned())
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut ids: Vec<ChainId> = self
            .chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Registrations ordered by chain id
    pub(crate) fn snapshot(&self) -> Vec<ChainRegistration> {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        let mut registrations: Vec<ChainRegistration> = chains
            .values()
            .map(|entry| {
                entry
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .registration
                    .clone()
            })
            .collect();
        registrations.sort_unstable_by_key(|registration| registration.chain_id);
        registrations
    }

    pub(crate) fn from_registrations(registrations: Vec<ChainRegistration>) -> Result<Self> {
        let registry = Self::new();
        for registration in registrations {
            registration.params.validate()?;
            let validators = ValidatorSet::new(registration.validators.0.clone())?;
            registry.insert(ChainRegistration {
                validators,
                ..registration
            })?;
        }
        Ok(registry)
    }
}
