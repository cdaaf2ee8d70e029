//! The two interchangeable ways of applying a handler's effect.
//!
//! `AtomicProcedure` makes one server-side call that performs the whole
//! mutation and returns the affected row; `SequentialOperations` lets the
//! handler issue the equivalent reads and writes itself, timing each named
//! step. Both run inside the block's transaction scope and must leave the
//! same rows, the same cache entries and the same output events behind.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::context::HandlerContext;
use super::error::HandlerError;
use super::traits::EventHandler;
use crate::publish::OutputEvent;
use crate::stats::{Stats, TimingTags, STEP_TIMING_STAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Atomic,
    Sequential,
}

impl StrategyKind {
    pub fn from_flag(use_atomic: bool) -> Self {
        if use_atomic {
            StrategyKind::Atomic
        } else {
            StrategyKind::Sequential
        }
    }

    pub fn build(self) -> Arc<dyn ExecutionStrategy> {
        match self {
            StrategyKind::Atomic => Arc::new(AtomicProcedure),
            StrategyKind::Sequential => Arc::new(SequentialOperations),
        }
    }
}

#[async_trait]
pub trait ExecutionStrategy: Send + Sync + 'static {
    fn kind(&self) -> StrategyKind;

    /// Apply `handler`'s effect. A `precomputed` procedure result means the
    /// mutation already happened in this scope and only the cache patch and
    /// output derivation remain.
    async fn execute(
        &self,
        handler: &dyn EventHandler,
        ctx: &HandlerContext,
        precomputed: Option<JsonValue>,
    ) -> Result<Vec<OutputEvent>, HandlerError>;
}

pub struct AtomicProcedure;

#[async_trait]
impl ExecutionStrategy for AtomicProcedure {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Atomic
    }

    async fn execute(
        &self,
        handler: &dyn EventHandler,
        ctx: &HandlerContext,
        precomputed: Option<JsonValue>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        let result = match precomputed {
            Some(result) => result,
            None => {
                let payload = handler.procedure_payload()?;
                ctx.scope.call_procedure(handler.procedure(), payload).await?
            }
        };

        handler.apply_procedure_result(ctx, result)
    }
}

pub struct SequentialOperations;

#[async_trait]
impl ExecutionStrategy for SequentialOperations {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn execute(
        &self,
        handler: &dyn EventHandler,
        ctx: &HandlerContext,
        precomputed: Option<JsonValue>,
    ) -> Result<Vec<OutputEvent>, HandlerError> {
        if let Some(result) = precomputed {
            return handler.apply_procedure_result(ctx, result);
        }

        let steps = StepTimer::new(ctx.stats.as_ref(), handler.name(), handler.event_type());
        handler.handle_sequential(ctx, &steps).await
    }
}

/// Times the named steps of one sequential handler run.
pub struct StepTimer<'a> {
    stats: &'a dyn Stats,
    class_name: &'static str,
    event_type: &'static str,
}

impl<'a> StepTimer<'a> {
    pub fn new(stats: &'a dyn Stats, class_name: &'static str, event_type: &'static str) -> Self {
        Self {
            stats,
            class_name,
            event_type,
        }
    }

    /// Await `step`, recording its duration if it succeeds.
    pub async fn run<T, F>(&self, fn_name: &'static str, step: F) -> Result<T, HandlerError>
    where
        F: Future<Output = Result<T, HandlerError>> + Send,
        T: Send,
    {
        let start = Instant::now();
        let result = step.await;

        if result.is_ok() {
            self.stats.timing(
                STEP_TIMING_STAT,
                start.elapsed(),
                &TimingTags {
                    class_name: self.class_name,
                    event_type: self.event_type,
                    fn_name,
                },
            );
        }

        result
    }
}
