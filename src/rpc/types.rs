//! Wire types decoded from ledger RPC responses. Only the fields the scanner
//! needs are modelled; everything else in a block payload is ignored.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// Block payload returned by `eth_getBlockByNumber(number, true)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcBlock {
    #[serde(default)]
    pub transactions: Vec<TxParticipants>,
}

/// The two participants of a transaction.
///
/// `from` is the sender and `to` the receiver. The scanner looks both up the
/// same way, so the labels only matter for logs and callers. Missing, `null`
/// or empty fields decode to `None` (`to` is `null` for contract creation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TxParticipants {
    #[serde(default, deserialize_with = "deserialize_optional_address")]
    pub from: Option<Address>,
    #[serde(default, deserialize_with = "deserialize_optional_address")]
    pub to: Option<Address>,
}

impl TxParticipants {
    pub fn new(from: Option<Address>, to: Option<Address>) -> Self {
        Self { from, to }
    }

    pub fn sender(&self) -> Option<Address> {
        self.from
    }

    pub fn receiver(&self) -> Option<Address> {
        self.to
    }
}

fn deserialize_optional_address<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("0x") => Ok(None),
        Some(value) => Address::from_str(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
