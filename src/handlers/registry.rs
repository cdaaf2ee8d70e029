//! Handler registration system.
//!
//! The registry maps an event subtype to the schema versions it accepts, the
//! constructor that decodes the payload into a handler, and the execution
//! strategy configured for that handler kind.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::HandlerError;
use super::instance::HandlerInstance;
use super::strategy::{ExecutionStrategy, StrategyKind};
use super::traits::EventHandler;
use crate::db::TxId;
use crate::types::block::{BlockInfo, EventCoordinates, IndexerEvent};
use crate::types::config::handlers::StrategyConfig;

/// Decodes an event's payload into its handler.
pub type HandlerConstructor = fn(&IndexerEvent) -> Result<Box<dyn EventHandler>, HandlerError>;

struct Registration {
    versions: &'static [u32],
    constructor: HandlerConstructor,
    strategy: Arc<dyn ExecutionStrategy>,
}

/// Registry of all event handlers, built at startup.
pub struct HandlerRegistry {
    registrations: HashMap<&'static str, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// Register the handler for `subtype`. A later registration for the same
    /// subtype replaces the earlier one.
    pub fn register(
        &mut self,
        subtype: &'static str,
        versions: &'static [u32],
        constructor: HandlerConstructor,
        strategy: StrategyKind,
    ) {
        self.registrations.insert(
            subtype,
            Registration {
                versions,
                constructor,
                strategy: strategy.build(),
            },
        );
    }

    /// Build the handler for one event of `block`.
    ///
    /// Returns `Ok(None)` for subtypes nobody handles. An unsupported version
    /// or a payload that does not decode is a validation error.
    pub fn create(
        &self,
        event: &IndexerEvent,
        block: &Arc<BlockInfo>,
        tx_id: TxId,
    ) -> Result<Option<HandlerInstance>, HandlerError> {
        let Some(registration) = self.registrations.get(event.subtype.as_str()) else {
            tracing::warn!(
                "No handler for {} event at block {} tx {} event {}, skipping",
                event.subtype,
                block.height,
                event.transaction_index,
                event.event_index
            );
            return Ok(None);
        };

        if !registration.versions.contains(&event.version) {
            return Err(HandlerError::validation(format!(
                "Unsupported version {} of {} event at block {} tx {} event {}",
                event.version, event.subtype, block.height, event.transaction_index, event.event_index
            )));
        }

        let tx_hash = block
            .tx_hashes
            .get(event.transaction_index as usize)
            .cloned()
            .ok_or_else(|| {
                HandlerError::validation(format!(
                    "No transaction hash for transaction index {} in block {}",
                    event.transaction_index, block.height
                ))
            })?;

        let handler = (registration.constructor)(event)?;

        Ok(Some(HandlerInstance::new(
            event.subtype.clone(),
            handler,
            registration.strategy.clone(),
            block.clone(),
            EventCoordinates {
                height: block.height,
                transaction_index: event.transaction_index,
                event_index: event.event_index,
                tx_hash,
            },
            tx_id,
        )))
    }

    pub fn strategy_kind(&self, subtype: &str) -> Option<StrategyKind> {
        self.registrations.get(subtype).map(|r| r.strategy.kind())
    }

    pub fn subtypes(&self) -> Vec<&'static str> {
        let mut subtypes: Vec<_> = self.registrations.keys().copied().collect();
        subtypes.sort_unstable();
        subtypes
    }

    pub fn handler_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry with every handler, each on its configured strategy.
pub fn build_registry(strategies: &StrategyConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    super::event::register_handlers(&mut registry, strategies);

    tracing::info!(
        "Built handler registry with {} handlers ({})",
        registry.handler_count(),
        registry.subtypes().join(", ")
    );

    registry
}
