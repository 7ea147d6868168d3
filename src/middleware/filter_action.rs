//! Bridges a [`crate::filter::Filter`] into an [`Action`] so the Sender can
//! build a per-template [`Middleware`](super::Middleware) out of the
//! template's action list (spec §4.D/§4.F) instead of running the filter
//! chain as a separate, hard-wired step.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::filter::{Filter, FilterChain};
use crate::model::{ActionDescriptor, SmsContext, StrategyType};

use super::Action;

pub struct FilterAction {
    filter: Arc<dyn Filter>,
    name: String,
}

impl FilterAction {
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        let name = filter.which_type().to_string();
        FilterAction { filter, name }
    }
}

#[async_trait]
impl Action for FilterAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, ctx: &SmsContext) -> Result<bool> {
        self.filter.allow(ctx).await
    }
}

/// The canonical fixed order (spec §4.C) used when a template declares no
/// actions of its own.
const DEFAULT_CHAIN: [StrategyType; 3] = [StrategyType::Unsubscribe, StrategyType::Postpone, StrategyType::RateLimit];

fn kind_for(descriptor: &str) -> Option<StrategyType> {
    match descriptor {
        "unsubscribe" => Some(StrategyType::Unsubscribe),
        "postpone" => Some(StrategyType::Postpone),
        "rate_limit" => Some(StrategyType::RateLimit),
        other => {
            tracing::warn!(kind = other, "unrecognized action descriptor kind, skipping");
            None
        }
    }
}

/// Resolves a template's ordered `actions` into `Action` trait objects
/// backed by the filter chain's members. An empty action list falls back
/// to the full fixed Unsubscribe → Postpone → Rate-Limit order, so
/// templates that never declared an action list (the common case) still
/// get baseline policy enforcement.
pub fn resolve(actions: &[ActionDescriptor], filters: &FilterChain) -> Vec<Arc<dyn Action>> {
    let kinds: Vec<StrategyType> = if actions.is_empty() {
        DEFAULT_CHAIN.to_vec()
    } else {
        actions.iter().filter_map(|descriptor| kind_for(&descriptor.kind)).collect()
    };

    kinds
        .into_iter()
        .filter_map(|kind| filters.filter_for(kind))
        .map(|filter| Arc::new(FilterAction::new(filter)) as Arc<dyn Action>)
        .collect()
}
