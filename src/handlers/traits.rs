//! Core trait for event handlers.
//!
//! A handler is bound to one decoded event. It knows which entities it will
//! mutate, how to apply its effect through the server-side procedure, and how
//! to apply the same effect as a sequence of individual store operations. The
//! [`ExecutionStrategy`](super::strategy::ExecutionStrategy) chosen for its
//! kind decides which of the two paths runs.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::context::HandlerContext;
use super::error::HandlerError;
use super::strategy::StepTimer;
use crate::publish::OutputEvent;

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handler kind, used in logs and timing tags.
    fn name(&self) -> &'static str;

    /// Name of the event schema this handler consumes.
    fn event_type(&self) -> &'static str;

    /// Ids of every entity this handler read-modify-writes. Handlers with
    /// disjoint sets may run concurrently; an empty set never conflicts.
    fn parallelization_ids(&self) -> HashSet<String>;

    /// Server-side procedure applying this event atomically.
    fn procedure(&self) -> &'static str;

    /// JSON argument for [`procedure`](Self::procedure).
    fn procedure_payload(&self) -> Result<JsonValue, HandlerError>;

    /// Patch caches and derive output events from a procedure result.
    fn apply_procedure_result(
        &self,
        ctx: &HandlerContext,
        result: JsonValue,
    ) -> Result<Vec<OutputEvent>, HandlerError>;

    /// Apply the event through individual store operations. Every named step
    /// runs through `steps` so it is timed.
    async fn handle_sequential(
        &self,
        ctx: &HandlerContext,
        steps: &StepTimer<'_>,
    ) -> Result<Vec<OutputEvent>, HandlerError>;
}
