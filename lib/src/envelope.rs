//! Just enough transaction and receipt decoding to learn who a transaction
//! called and which contracts logged events.
//!
//! Both come either as a bare RLP list (legacy) or as an EIP-2718 envelope,
//! `type || rlp(payload)`.

use rlp::Rlp;

use crate::error::{BridgeError, Result};
use crate::types::{Address, H256};

fn split_envelope(raw: &[u8]) -> Result<(Option<u8>, Rlp<'_>)> {
    match raw.first() {
        None => Err(BridgeError::Malformed("empty envelope".into())),
        Some(&first) if first >= 0xc0 => Ok((None, Rlp::new(raw))),
        Some(&ty) if ty <= 0x7f => Ok((Some(ty), Rlp::new(&raw[1..]))),
        Some(&other) => Err(BridgeError::Malformed(format!(
            "envelope starts with {other:#04x}"
        ))),
    }
}

fn address(bytes: &[u8]) -> Result<Address> {
    bytes.try_into().map_err(|_| {
        BridgeError::Malformed(format!("address of {} bytes", bytes.len()))
    })
}

/// Destination of a transaction, `None` for contract creation
pub fn transaction_destination(raw: &[u8]) -> Result<Option<Address>> {
    let (ty, payload) = split_envelope(raw)?;
    let to_index = match ty {
        None => 3,
        Some(1) => 4,
        Some(2..=4) => 5,
        Some(ty) => {
            return Err(BridgeError::Malformed(format!(
                "unsupported transaction type {ty}"
            )))
        }
    };

    let to = payload.at(to_index)?;
    let to = to.data()?;
    if to.is_empty() {
        Ok(None)
    } else {
        address(to).map(Some)
    }
}

/// One log entry of a receipt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

impl ReceiptLog {
    /// Emitted by `address` with `topic` as event signature and exactly `data` as payload
    pub fn matches(&self, address: &Address, topic: &H256, data: &[u8]) -> bool {
        self.address == *address && self.topics.first() == Some(topic) && self.data == data
    }
}

/// Every log of a receipt, in log order
pub fn receipt_logs(raw: &[u8]) -> Result<Vec<ReceiptLog>> {
    let (_, payload) = split_envelope(raw)?;
    let logs = payload.at(3)?;
    logs.iter()
        .map(|log| -> Result<ReceiptLog> {
            let topics = log
                .at(1)?
                .iter()
                .map(|topic| -> Result<H256> {
                    topic.data()?.try_into().map_err(|_| {
                        BridgeError::Malformed("log topic is not 32 bytes".into())
                    })
                })
                .collect::<Result<Vec<H256>>>()?;
            Ok(ReceiptLog {
                address: address(log.at(0)?.data()?)?,
                topics,
                data: log.at(2)?.data()?.to_vec(),
            })
        })
        .collect()
}
