//! Downstream publication of a committed block's output events.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Markets,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Markets => "to-websockets-markets",
        }
    }
}

/// One derived message for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEvent {
    pub topic: Topic,
    /// Partitioning key; messages with the same key stay ordered.
    pub key: String,
    pub payload: JsonValue,
}

/// Every output event of one committed block, in event order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputBatch {
    pub height: u64,
    pub events: Vec<OutputEvent>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Output channel closed")]
    ChannelClosed,

    #[error("Failed to encode output batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, batch: OutputBatch) -> Result<(), PublishError>;
}

/// Hands batches to an mpsc channel drained by a writer task.
pub struct ChannelPublisher {
    tx: Sender<OutputBatch>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<OutputBatch>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(&self, batch: OutputBatch) -> Result<(), PublishError> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| PublishError::ChannelClosed)
    }
}

/// Encode a batch as one JSON line per output event.
pub fn to_json_lines(batch: &OutputBatch) -> Result<String, PublishError> {
    let mut out = String::new();
    for event in &batch.events {
        let line = serde_json::json!({
            "height": batch.height,
            "topic": event.topic.as_str(),
            "key": event.key,
            "payload": event.payload,
        });
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    Ok(out)
}
