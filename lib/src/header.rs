//! Block header encoding and seal handling.
//!
//! A proof-of-authority header carries its validator's signature at the end of
//! `extra_data`. The validator signs the keccak hash of the header with that
//! signature removed (the *canonical hash*); the chain itself links blocks by
//! the hash of the full sealed header (the *signed hash*).

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::rlp_encoding::keccak256;
use crate::types::{Address, ConsensusParams, H256};

/// Length of an `r || s || v` secp256k1 signature
pub const SIGNATURE_LEN: usize = 65;

const LEGACY_FIELDS: usize = 15;
const MAX_FIELDS: usize = LEGACY_FIELDS + 6;

/// Header fields as the producing chain encodes them, in consensus order.
///
/// The optional fields were appended by later forks. They are encoded only
/// while present: the first `None` ends the list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub ommers_hash: H256,
    pub beneficiary: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Vec<u8>,
    pub difficulty: u64,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    pub mix_hash: H256,
    pub nonce: [u8; 8],
    pub base_fee_per_gas: Option<u64>,
    pub withdrawals_root: Option<H256>,
    pub blob_gas_used: Option<u64>,
    pub excess_blob_gas: Option<u64>,
    pub parent_beacon_block_root: Option<H256>,
    pub requests_hash: Option<H256>,
}

impl BlockHeader {
    /// Decode a header from the RLP a node returns
    pub fn from_rlp(bytes: &[u8]) -> Result<Self> {
        Ok(rlp::decode(bytes)?)
    }

    pub fn to_rlp(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    // Encoded optional fields up to the first absent one
    fn trailing_fields(&self) -> Vec<Vec<u8>> {
        [
            self.base_fee_per_gas.map(|v| rlp::encode(&v).to_vec()),
            self.withdrawals_root.map(|h| rlp::encode(&h.to_vec()).to_vec()),
            self.blob_gas_used.map(|v| rlp::encode(&v).to_vec()),
            self.excess_blob_gas.map(|v| rlp::encode(&v).to_vec()),
            self.parent_beacon_block_root
                .map(|h| rlp::encode(&h.to_vec()).to_vec()),
            self.requests_hash.map(|h| rlp::encode(&h.to_vec()).to_vec()),
        ]
        .into_iter()
        .map_while(|field| field)
        .collect()
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        let trailing = self.trailing_fields();
        s.begin_list(LEGACY_FIELDS + trailing.len());
        s.append(&self.parent_hash.to_vec());
        s.append(&self.ommers_hash.to_vec());
        s.append(&self.beneficiary.to_vec());
        s.append(&self.state_root.to_vec());
        s.append(&self.transactions_root.to_vec());
        s.append(&self.receipts_root.to_vec());
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data);
        s.append(&self.mix_hash.to_vec());
        s.append(&self.nonce.to_vec());
        for field in &trailing {
            s.append_raw(field, 1);
        }
    }
}

impl Decodable for BlockHeader {
    fn decode(rlp: &Rlp) -> core::result::Result<Self, DecoderError> {
        let count = rlp.item_count()?;
        if !(LEGACY_FIELDS..=MAX_FIELDS).contains(&count) {
            return Err(DecoderError::RlpIncorrectListLen);
        }

        let fixed = |i: usize| -> core::result::Result<Vec<u8>, DecoderError> { rlp.val_at(i) };
        let hash_at = |i: usize| -> core::result::Result<H256, DecoderError> {
            fixed(i)?
                .try_into()
                .map_err(|_| DecoderError::Custom("expected 32-byte hash"))
        };
        let u64_opt = |i: usize| -> core::result::Result<Option<u64>, DecoderError> {
            if i < count {
                rlp.val_at(i).map(Some)
            } else {
                Ok(None)
            }
        };
        let hash_opt = |i: usize| -> core::result::Result<Option<H256>, DecoderError> {
            if i < count {
                hash_at(i).map(Some)
            } else {
                Ok(None)
            }
        };

        Ok(BlockHeader {
            parent_hash: hash_at(0)?,
            ommers_hash: hash_at(1)?,
            beneficiary: fixed(2)?
                .try_into()
                .map_err(|_| DecoderError::Custom("expected 20-byte beneficiary"))?,
            state_root: hash_at(3)?,
            transactions_root: hash_at(4)?,
            receipts_root: hash_at(5)?,
            logs_bloom: fixed(6)?,
            difficulty: rlp.val_at(7)?,
            number: rlp.val_at(8)?,
            gas_limit: rlp.val_at(9)?,
            gas_used: rlp.val_at(10)?,
            timestamp: rlp.val_at(11)?,
            extra_data: fixed(12)?,
            mix_hash: hash_at(13)?,
            nonce: fixed(14)?
                .try_into()
                .map_err(|_| DecoderError::Custom("expected 8-byte nonce"))?,
            base_fee_per_gas: u64_opt(15)?,
            withdrawals_root: hash_opt(16)?,
            blob_gas_used: u64_opt(17)?,
            excess_blob_gas: u64_opt(18)?,
            parent_beacon_block_root: hash_opt(19)?,
            requests_hash: hash_opt(20)?,
        })
    }
}

/// A header whose seal has been removed from `extra_data`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalHeader(BlockHeader);

impl CanonicalHeader {
    pub fn header(&self) -> &BlockHeader {
        &self.0
    }

    pub fn canonical_hash(&self) -> H256 {
        keccak256(&self.0.to_rlp())
    }

    /// Already stripped: yields itself and an empty seal
    pub fn strip_seal(&self) -> (CanonicalHeader, Vec<u8>) {
        (self.clone(), Vec::new())
    }
}

/// Split a sealed header into its canonical form and the seal bytes.
pub fn strip_seal(
    header: &BlockHeader,
    params: &ConsensusParams,
) -> Result<(CanonicalHeader, Vec<u8>)> {
    params.validate()?;
    let required = params.min_extra_len().unwrap_or(usize::MAX);
    let extra = &header.extra_data;
    if extra.len() < required {
        return Err(BridgeError::MalformedExtraData {
            actual: extra.len(),
            required,
        });
    }

    let (unsealed, seal) = extra.split_at(extra.len() - params.seal_len);
    let mut canonical = header.clone();
    canonical.extra_data = unsealed.to_vec();
    Ok((CanonicalHeader(canonical), seal.to_vec()))
}

pub fn canonical_hash(header: &CanonicalHeader) -> H256 {
    header.canonical_hash()
}

/// Hash of the full sealed header, the identifier child blocks reference
pub fn signed_hash(header: &BlockHeader) -> H256 {
    keccak256(&header.to_rlp())
}

/// Recover the address that produced `seal` over `hash`.
///
/// The seal is `r || s || v` with `v` either `0/1` or `27/28`.
pub fn recover_signer(hash: &H256, seal: &[u8]) -> Result<Address> {
    if seal.len() != SIGNATURE_LEN {
        return Err(BridgeError::InvalidSeal(format!(
            "seal is {} bytes, expected {SIGNATURE_LEN}",
            seal.len()
        )));
    }

    let signature = Signature::from_slice(&seal[..64])
        .map_err(|err| BridgeError::InvalidSeal(err.to_string()))?;
    let v = match seal[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        v => return Err(BridgeError::InvalidSeal(format!("recovery byte {v}"))),
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| BridgeError::InvalidSeal(format!("recovery byte {v}")))?;

    let key = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
        .map_err(|err| BridgeError::InvalidSeal(err.to_string()))?;
    Ok(public_key_address(&key))
}

/// Address of a secp256k1 public key: last 20 bytes of keccak(x || y)
pub fn public_key_address(key: &VerifyingKey) -> Address {
    let point = key.as_affine().to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}
