//! A handler bound to one event of one block.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use super::context::HandlerContext;
use super::error::HandlerError;
use super::strategy::{ExecutionStrategy, StrategyKind};
use super::traits::EventHandler;
use crate::db::TxId;
use crate::publish::OutputEvent;
use crate::types::block::{BlockInfo, EventCoordinates};

/// `Created -> Executing -> Committed | Failed`. There is no retry; a failed
/// handler fails its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Created,
    Executing,
    Committed,
    Failed,
}

pub struct HandlerInstance {
    subtype: String,
    handler: Box<dyn EventHandler>,
    strategy: Arc<dyn ExecutionStrategy>,
    block: Arc<BlockInfo>,
    coordinates: EventCoordinates,
    tx_id: TxId,
    state: HandlerState,
}

impl HandlerInstance {
    pub fn new(
        subtype: impl Into<String>,
        handler: Box<dyn EventHandler>,
        strategy: Arc<dyn ExecutionStrategy>,
        block: Arc<BlockInfo>,
        coordinates: EventCoordinates,
        tx_id: TxId,
    ) -> Self {
        Self {
            subtype: subtype.into(),
            handler,
            strategy,
            block,
            coordinates,
            tx_id,
            state: HandlerState::Created,
        }
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    pub fn event_type(&self) -> &'static str {
        self.handler.event_type()
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn block(&self) -> &BlockInfo {
        &self.block
    }

    pub fn coordinates(&self) -> &EventCoordinates {
        &self.coordinates
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn parallelization_ids(&self) -> HashSet<String> {
        self.handler.parallelization_ids()
    }

    /// This event's entry in an `ender_block_processor` call.
    pub fn block_processor_entry(&self) -> Result<JsonValue, HandlerError> {
        Ok(json!({
            "subtype": self.subtype,
            "data": self.handler.procedure_payload()?,
        }))
    }

    /// Apply the event and return its output events. Failures are logged with
    /// the event's coordinates before being returned.
    pub async fn internal_handle(
        &mut self,
        ctx: &HandlerContext,
        precomputed: Option<JsonValue>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        if self.state != HandlerState::Created {
            return Err(HandlerError::consistency(format!(
                "{} for {} invoked in state {:?}",
                self.name(),
                self.coordinates,
                self.state
            )));
        }
        self.state = HandlerState::Executing;

        match self
            .strategy
            .execute(self.handler.as_ref(), ctx, precomputed)
            .await
        {
            Ok(events) => {
                self.state = HandlerState::Committed;
                Ok(events)
            }
            Err(e) => {
                self.state = HandlerState::Failed;
                tracing::error!(
                    "{} failed to handle {} at {}: {}",
                    self.name(),
                    self.event_type(),
                    self.coordinates,
                    e
                );
                Err(e)
            }
        }
    }
}
