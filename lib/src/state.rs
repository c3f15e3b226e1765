//! Durable form of the bridge state: registered chains with their accepted
//! headers, and consumed events.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BridgeError, Result};
use crate::header::BlockHeader;
use crate::registry::{ChainRegistration, ChainRegistry, ValidatorSet};
use crate::trigger::{AuthorizationToken, ExecutionRecord, TriggerVerifier};
use crate::types::{AcceptedHeader, ChainId, ConsensusParams, TriggerProof, H256};

/// Format version written by [`StateSnapshot::to_bytes`]
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub chains: Vec<ChainRegistration>,
    pub executions: Vec<ExecutionRecord>,
}

impl StateSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BridgeError::Malformed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: StateSnapshot =
            bincode::deserialize(bytes).map_err(|e| BridgeError::Malformed(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(BridgeError::Malformed(format!(
                "snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

/// Chain registry and trigger verifier that are saved and restored together
#[derive(Default)]
pub struct BridgeState {
    pub registry: ChainRegistry,
    pub verifier: TriggerVerifier,
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export_state(&self) -> StateSnapshot {
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            chains: self.registry.snapshot(),
            executions: self.verifier.snapshot(),
        }
    }

    /// Rebuild state from a snapshot. Lookup indices are recomputed and the
    /// registrations revalidated.
    pub fn import_state(snapshot: StateSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(BridgeError::Malformed(format!(
                "snapshot version {}",
                snapshot.version
            )));
        }
        let chains = snapshot.chains.len();
        let executions = snapshot.executions.len();
        let state = Self {
            registry: ChainRegistry::from_registrations(snapshot.chains)?,
            verifier: TriggerVerifier::from_records(snapshot.executions),
        };
        info!(chains, executions, "imported bridge state");
        Ok(state)
    }

    pub fn register(&self, chain_id: ChainId, validators: ValidatorSet, genesis_hash: H256) -> Result<()> {
        self.registry.register(chain_id, validators, genesis_hash)
    }

    pub fn register_with_params(
        &self,
        chain_id: ChainId,
        validators: ValidatorSet,
        genesis_hash: H256,
        params: ConsensusParams,
    ) -> Result<()> {
        self.registry
            .register_with_params(chain_id, validators, genesis_hash, params)
    }

    pub fn submit_header(&self, chain_id: ChainId, header: &BlockHeader) -> Result<AcceptedHeader> {
        self.registry.submit_header(chain_id, header)
    }

    pub fn roots_for(&self, chain_id: ChainId, block_hash: H256) -> Result<(H256, H256)> {
        self.registry.roots_for(chain_id, block_hash)
    }

    pub fn verify_and_authorize(&self, proof: &TriggerProof) -> Result<AuthorizationToken> {
        self.verifier.verify_and_authorize(&self.registry, proof)
    }
}
