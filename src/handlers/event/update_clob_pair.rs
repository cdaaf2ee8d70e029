use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::db::procedures::UPDATE_CLOB_PAIR;
use crate::handlers::context::HandlerContext;
use crate::handlers::error::HandlerError;
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::strategy::{StepTimer, StrategyKind};
use crate::handlers::traits::EventHandler;
use crate::handlers::util::db::perpetual_markets::{update_clob_pair_config, ClobPairConfig};
use crate::handlers::util::messages::trading_update;
use crate::handlers::util::{decode_payload, decode_row, encode_payload, procedure_row, single_row, to_i32, to_i64};
use crate::publish::OutputEvent;
use crate::types::block::IndexerEvent;
use crate::types::entities::PerpetualMarket;
use crate::types::events::UpdateClobPairEventV1;

/// Applies a new status and trading configuration to the perpetual market
/// of a clob pair.
pub struct UpdateClobPairHandler {
    event: UpdateClobPairEventV1,
    config: ClobPairConfig,
}

impl UpdateClobPairHandler {
    pub fn new(event: UpdateClobPairEventV1) -> Result<Self, HandlerError> {
        let status = event.status.to_market_status().ok_or_else(|| {
            HandlerError::validation(format!(
                "Unable to translate clob pair status {:?} of clob pair {}",
                event.status, event.clob_pair_id
            ))
        })?;

        let config = ClobPairConfig {
            status,
            quantum_conversion_exponent: event.quantum_conversion_exponent,
            subticks_per_tick: to_i32("subticks_per_tick", event.subticks_per_tick)?,
            step_base_quantums: to_i64("step_base_quantums", event.step_base_quantums)?,
        };

        Ok(Self { event, config })
    }

    fn finish(&self, ctx: &HandlerContext, market: PerpetualMarket) -> Result<Vec<OutputEvent>, HandlerError> {
        let output = trading_update(&market)?;
        ctx.caches.perpetual_markets.upsert(market);
        Ok(vec![output])
    }
}

fn create(event: &IndexerEvent) -> Result<Box<dyn EventHandler>, HandlerError> {
    let payload: UpdateClobPairEventV1 = decode_payload(event)?;
    Ok(Box::new(UpdateClobPairHandler::new(payload)?))
}

#[async_trait]
impl EventHandler for UpdateClobPairHandler {
    fn name(&self) -> &'static str {
        "UpdateClobPairHandler"
    }

    fn event_type(&self) -> &'static str {
        "UpdateClobPairEventV1"
    }

    fn parallelization_ids(&self) -> HashSet<String> {
        HashSet::from([format!("clob_pair_{}", self.event.clob_pair_id)])
    }

    fn procedure(&self) -> &'static str {
        UPDATE_CLOB_PAIR
    }

    fn procedure_payload(&self) -> Result<JsonValue, HandlerError> {
        encode_payload(&self.event)
    }

    fn apply_procedure_result(
        &self,
        ctx: &HandlerContext,
        result: JsonValue,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let market: PerpetualMarket = procedure_row(UPDATE_CLOB_PAIR, result, "perpetual_market")?;
        self.finish(ctx, market)
    }

    async fn handle_sequential(
        &self,
        ctx: &HandlerContext,
        steps: &StepTimer<'_>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let clob_pair_id = self.event.clob_pair_id;

        let market = steps
            .run("update_clob_pair", async {
                let existing = ctx
                    .caches
                    .perpetual_markets
                    .lookup_by_clob_pair_id(clob_pair_id as i64)
                    .ok_or_else(|| {
                        HandlerError::validation(format!(
                            "Could not find perpetual market with corresponding clob_pair_id {}",
                            clob_pair_id
                        ))
                    })?;

                let rows = ctx
                    .scope
                    .execute(update_clob_pair_config(existing.id, &self.config))
                    .await?;
                let row = single_row("perpetual_markets", rows)?;
                decode_row::<PerpetualMarket>("perpetual_markets", row)
            })
            .await?;

        self.finish(ctx, market)
    }
}

pub fn register_handlers(registry: &mut HandlerRegistry, use_atomic: bool) {
    registry.register("update_clob_pair", &[1], create, StrategyKind::from_flag(use_atomic));
}
