use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::db::procedures::LIQUIDITY_TIER_UPSERT;
use crate::handlers::context::HandlerContext;
use crate::handlers::error::HandlerError;
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::strategy::{StepTimer, StrategyKind};
use crate::handlers::traits::EventHandler;
use crate::handlers::util::db::liquidity_tiers::{upsert_liquidity_tier, LiquidityTierRow};
use crate::handlers::util::messages::liquidity_tier_update;
use crate::handlers::util::{decode_payload, decode_row, encode_payload, procedure_row, single_row, to_i32, to_i64};
use crate::publish::OutputEvent;
use crate::types::block::IndexerEvent;
use crate::types::entities::LiquidityTier;
use crate::types::events::{LiquidityTierUpsert, LiquidityTierUpsertEventV1, LiquidityTierUpsertEventV2};

/// Creates or overwrites a liquidity tier. Version 2 events carry open
/// interest caps; version 1 events leave the stored caps untouched.
pub struct LiquidityTierHandler {
    event: LiquidityTierUpsert,
}

impl LiquidityTierHandler {
    pub fn new(event: LiquidityTierUpsert) -> Self {
        Self { event }
    }

    fn finish(&self, ctx: &HandlerContext, tier: LiquidityTier) -> Result<Vec<OutputEvent>, HandlerError> {
        let output = liquidity_tier_update(&tier)?;
        ctx.caches.liquidity_tiers.upsert(tier);
        Ok(vec![output])
    }
}

fn create(event: &IndexerEvent) -> Result<Box<dyn EventHandler>, HandlerError> {
    let payload: LiquidityTierUpsert = match event.version {
        1 => decode_payload::<LiquidityTierUpsertEventV1>(event)?.into(),
        _ => decode_payload::<LiquidityTierUpsertEventV2>(event)?.into(),
    };
    Ok(Box::new(LiquidityTierHandler::new(payload)))
}

#[async_trait]
impl EventHandler for LiquidityTierHandler {
    fn name(&self) -> &'static str {
        "LiquidityTierHandler"
    }

    fn event_type(&self) -> &'static str {
        "LiquidityTierUpsertEvent"
    }

    fn parallelization_ids(&self) -> HashSet<String> {
        HashSet::from([format!("liquidity_tier_{}", self.event.id)])
    }

    fn procedure(&self) -> &'static str {
        LIQUIDITY_TIER_UPSERT
    }

    fn procedure_payload(&self) -> Result<JsonValue, HandlerError> {
        encode_payload(&self.event)
    }

    fn apply_procedure_result(
        &self,
        ctx: &HandlerContext,
        result: JsonValue,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let tier: LiquidityTier = procedure_row(LIQUIDITY_TIER_UPSERT, result, "liquidity_tier")?;
        self.finish(ctx, tier)
    }

    async fn handle_sequential(
        &self,
        ctx: &HandlerContext,
        steps: &StepTimer<'_>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let event = &self.event;

        let tier = steps
            .run("upsert_liquidity_tier", async {
                let row = LiquidityTierRow {
                    id: to_i32("liquidity tier id", event.id)?,
                    name: &event.name,
                    initial_margin_ppm: to_i32("initial_margin_ppm", event.initial_margin_ppm)?,
                    maintenance_fraction_ppm: to_i32(
                        "maintenance_fraction_ppm",
                        event.maintenance_fraction_ppm,
                    )?,
                    open_interest_lower_cap: event
                        .open_interest_lower_cap
                        .map(|cap| to_i64("open_interest_lower_cap", cap))
                        .transpose()?,
                    open_interest_upper_cap: event
                        .open_interest_upper_cap
                        .map(|cap| to_i64("open_interest_upper_cap", cap))
                        .transpose()?,
                };

                let rows = ctx.scope.execute(upsert_liquidity_tier(&row)).await?;
                decode_row::<LiquidityTier>("liquidity_tiers", single_row("liquidity_tiers", rows)?)
            })
            .await?;

        self.finish(ctx, tier)
    }
}

pub fn register_handlers(registry: &mut HandlerRegistry, use_atomic: bool) {
    registry.register("liquidity_tier", &[1, 2], create, StrategyKind::from_flag(use_atomic));
}
