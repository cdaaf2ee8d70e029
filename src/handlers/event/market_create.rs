use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::db::procedures::MARKET_CREATE;
use crate::handlers::context::HandlerContext;
use crate::handlers::error::HandlerError;
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::strategy::{StepTimer, StrategyKind};
use crate::handlers::traits::EventHandler;
use crate::handlers::util::db::markets::insert_market;
use crate::handlers::util::{decode_payload, decode_row, encode_payload, procedure_row, single_row, to_i32};
use crate::publish::OutputEvent;
use crate::types::block::IndexerEvent;
use crate::types::entities::Market;
use crate::types::events::MarketCreateEventV1;

pub struct MarketCreateHandler {
    event: MarketCreateEventV1,
}

impl MarketCreateHandler {
    pub fn new(event: MarketCreateEventV1) -> Self {
        Self { event }
    }
}

fn create(event: &IndexerEvent) -> Result<Box<dyn EventHandler>, HandlerError> {
    let payload: MarketCreateEventV1 = decode_payload(event)?;
    Ok(Box::new(MarketCreateHandler::new(payload)))
}

#[async_trait]
impl EventHandler for MarketCreateHandler {
    fn name(&self) -> &'static str {
        "MarketCreateHandler"
    }

    fn event_type(&self) -> &'static str {
        "MarketCreateEvent"
    }

    fn parallelization_ids(&self) -> HashSet<String> {
        HashSet::from([format!("market_{}", self.event.id)])
    }

    fn procedure(&self) -> &'static str {
        MARKET_CREATE
    }

    fn procedure_payload(&self) -> Result<JsonValue, HandlerError> {
        encode_payload(&self.event)
    }

    fn apply_procedure_result(
        &self,
        ctx: &HandlerContext,
        result: JsonValue,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let market: Market = procedure_row(MARKET_CREATE, result, "market")?;
        ctx.caches.markets.upsert(market);
        Ok(Vec::new())
    }

    async fn handle_sequential(
        &self,
        ctx: &HandlerContext,
        steps: &StepTimer<'_>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let market = steps
            .run("create_market", async {
                let operation = insert_market(
                    to_i32("market id", self.event.id)?,
                    &self.event.pair,
                    self.event.exponent,
                    to_i32("min_price_change_ppm", self.event.min_price_change_ppm)?,
                );
                let rows = ctx.scope.execute(operation).await?;
                decode_row::<Market>("markets", single_row("markets", rows)?)
            })
            .await?;

        ctx.caches.markets.upsert(market);
        Ok(Vec::new())
    }
}

pub fn register_handlers(registry: &mut HandlerRegistry, use_atomic: bool) {
    registry.register("market", &[1], create, StrategyKind::from_flag(use_atomic));
}
