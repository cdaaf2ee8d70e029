use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::db::procedures::ASSET_CREATE;
use crate::handlers::context::HandlerContext;
use crate::handlers::error::HandlerError;
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::strategy::{StepTimer, StrategyKind};
use crate::handlers::traits::EventHandler;
use crate::handlers::util::db::assets::insert_asset;
use crate::handlers::util::db::markets::market_by_id;
use crate::handlers::util::{decode_payload, decode_row, encode_payload, procedure_row, single_row, to_i32};
use crate::publish::OutputEvent;
use crate::types::block::IndexerEvent;
use crate::types::entities::{Asset, Market};
use crate::types::events::AssetCreateEventV1;

pub struct AssetCreationHandler {
    event: AssetCreateEventV1,
}

impl AssetCreationHandler {
    pub fn new(event: AssetCreateEventV1) -> Self {
        Self { event }
    }

    fn market_id(&self) -> Result<Option<i32>, HandlerError> {
        if self.event.has_market {
            Ok(Some(to_i32("market_id", self.event.market_id)?))
        } else {
            Ok(None)
        }
    }

    /// The market the asset prices against, from the cache or else the
    /// store. `None` when it is not indexed yet.
    async fn resolve_market(&self, ctx: &HandlerContext, market_id: i32) -> Result<Option<Market>, HandlerError> {
        if let Some(market) = ctx.caches.markets.lookup(&market_id) {
            return Ok(Some(market));
        }

        let rows = ctx.scope.select("markets", &market_by_id(market_id)).await?;
        rows.into_iter()
            .next()
            .map(|row| decode_row::<Market>("markets", row))
            .transpose()
    }
}

fn create(event: &IndexerEvent) -> Result<Box<dyn EventHandler>, HandlerError> {
    let payload: AssetCreateEventV1 = decode_payload(event)?;
    Ok(Box::new(AssetCreationHandler::new(payload)))
}

#[async_trait]
impl EventHandler for AssetCreationHandler {
    fn name(&self) -> &'static str {
        "AssetCreationHandler"
    }

    fn event_type(&self) -> &'static str {
        "AssetCreateEvent"
    }

    /// Creations never contend with each other.
    fn parallelization_ids(&self) -> HashSet<String> {
        HashSet::new()
    }

    fn procedure(&self) -> &'static str {
        ASSET_CREATE
    }

    fn procedure_payload(&self) -> Result<JsonValue, HandlerError> {
        encode_payload(&self.event)
    }

    fn apply_procedure_result(
        &self,
        ctx: &HandlerContext,
        result: JsonValue,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let asset: Asset = procedure_row(ASSET_CREATE, result, "asset")?;
        ctx.caches.assets.upsert(asset);
        Ok(Vec::new())
    }

    async fn handle_sequential(
        &self,
        ctx: &HandlerContext,
        steps: &StepTimer<'_>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let asset = steps
            .run("create_asset", async {
                let market_id = self.market_id()?;
                if let Some(market_id) = market_id {
                    if self.resolve_market(ctx, market_id).await?.is_none() {
                        tracing::debug!(
                            "Asset {} references market {} which is not indexed",
                            self.event.id,
                            market_id
                        );
                    }
                }

                let rows = ctx
                    .scope
                    .execute(insert_asset(
                        self.event.id as i64,
                        &self.event.symbol,
                        self.event.atomic_resolution,
                        self.event.has_market,
                        market_id,
                    ))
                    .await?;
                decode_row::<Asset>("assets", single_row("assets", rows)?)
            })
            .await?;

        ctx.caches.assets.upsert(asset);
        Ok(Vec::new())
    }
}

pub fn register_handlers(registry: &mut HandlerRegistry, use_atomic: bool) {
    registry.register("asset", &[1], create, StrategyKind::from_flag(use_atomic));
}
