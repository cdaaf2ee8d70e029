//! Decoded blocks as delivered by the block source.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One decoded block of the source event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerBlock {
    pub height: u64,
    /// Block time, unix seconds.
    pub time: u64,
    /// Transaction hashes indexed by transaction index.
    #[serde(default)]
    pub tx_hashes: Vec<String>,
    #[serde(default)]
    pub events: Vec<IndexerEvent>,
}

/// One state-transition event inside a block.
///
/// `data` is the payload in the schema selected by `subtype` and `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerEvent {
    pub subtype: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub transaction_index: u32,
    pub event_index: u32,
    pub data: JsonValue,
}

fn default_version() -> u32 {
    1
}

impl IndexerEvent {
    /// Position of the event inside its block.
    pub fn order_key(&self) -> (u32, u32) {
        (self.transaction_index, self.event_index)
    }
}

/// Block metadata shared by every handler created for the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    pub time: u64,
    pub tx_hashes: Vec<String>,
}

impl From<&IndexerBlock> for BlockInfo {
    fn from(block: &IndexerBlock) -> Self {
        Self {
            height: block.height,
            time: block.time,
            tx_hashes: block.tx_hashes.clone(),
        }
    }
}

/// Where an event sits: block height, transaction and event index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCoordinates {
    pub height: u64,
    pub transaction_index: u32,
    pub event_index: u32,
    pub tx_hash: String,
}

impl std::fmt::Display for EventCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "block {} tx {} ({}) event {}",
            self.height, self.transaction_index, self.tx_hash, self.event_index
        )
    }
}
