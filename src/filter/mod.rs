//! Policy filter chain: Unsubscribe → Postpone → Rate-Limit, in that fixed
//! order (spec §4.C). Grounded on `original_source/filter/filter.go` (the
//! `Filter` interface) and its three implementations, with the REDESIGN
//! FLAGS-mandated change from a linked list to a `Vec<Arc<dyn Filter>>`
//! iterated in order, and strategy expressions resolved into the tagged
//! `Strategy` sum (`strategy.rs`) instead of handled ad hoc per filter.

mod postpone;
mod rate_limit;
mod strategy;
mod unsubscribe;
mod variables;

pub use postpone::PostponeFilter;
pub use rate_limit::RateLimitFilter;
pub use strategy::Strategy;
pub use unsubscribe::UnsubscribeFilter;
pub use variables::VariableCache;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{SmsContext, StrategyRecord, StrategyType};

#[async_trait]
pub trait Filter: Send + Sync {
    fn which_type(&self) -> StrategyType;

    /// `true` if `ctx` may proceed through this filter.
    async fn allow(&self, ctx: &SmsContext) -> Result<bool>;

    /// Replaces this filter's per-template strategy map wholesale with the
    /// subset of `records` matching [`Filter::which_type`]. Unresolvable
    /// expressions are logged and skipped rather than failing the reload.
    fn apply(&self, records: &[StrategyRecord]);
}

pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    /// Fixed order per spec §4.C: Unsubscribe, Postpone, Rate-Limit.
    pub fn new(unsubscribe: UnsubscribeFilter, postpone: PostponeFilter, rate_limit: RateLimitFilter) -> Self {
        FilterChain {
            filters: vec![Arc::new(unsubscribe), Arc::new(postpone), Arc::new(rate_limit)],
        }
    }

    pub fn apply_all(&self, records: &[StrategyRecord]) {
        for filter in &self.filters {
            filter.apply(records);
        }
    }

    /// Looks up the chain member handling `kind`, so the Sender's
    /// per-template [`crate::middleware::Middleware`] can be built from a
    /// template's action list (spec §4.D/§4.F) without duplicating filter
    /// logic outside the chain.
    pub fn filter_for(&self, kind: StrategyType) -> Option<Arc<dyn Filter>> {
        self.filters.iter().find(|f| f.which_type() == kind).cloned()
    }

    /// Runs `contexts` through every filter in order, preserving the
    /// relative order of whatever survives. A filter error is treated as a
    /// block for that context (fail-closed), logged at `warn`.
    pub async fn run(&self, contexts: Vec<SmsContext>) -> Vec<SmsContext> {
        let mut surviving = Vec::with_capacity(contexts.len());
        'next_context: for ctx in contexts {
            for filter in &self.filters {
                match filter.allow(&ctx).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        tracing::debug!(phone = %ctx.phone, filter = %filter.which_type(), "context blocked by filter");
                        continue 'next_context;
                    }
                    Err(error) => {
                        tracing::warn!(phone = %ctx.phone, filter = %filter.which_type(), %error, "filter error, blocking context");
                        continue 'next_context;
                    }
                }
            }
            surviving.push(ctx);
        }
        surviving
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TemplateName;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct AlwaysBlock;
    #[async_trait]
    impl Filter for AlwaysBlock {
        fn which_type(&self) -> StrategyType {
            StrategyType::Unsubscribe
        }
        async fn allow(&self, _ctx: &SmsContext) -> Result<bool> {
            Ok(false)
        }
        fn apply(&self, _records: &[StrategyRecord]) {}
    }

    struct AlwaysAllow;
    #[async_trait]
    impl Filter for AlwaysAllow {
        fn which_type(&self) -> StrategyType {
            StrategyType::RateLimit
        }
        async fn allow(&self, _ctx: &SmsContext) -> Result<bool> {
            Ok(true)
        }
        fn apply(&self, _records: &[StrategyRecord]) {}
    }

    #[tokio::test]
    async fn order_is_preserved_among_survivors() {
        let filters: Vec<Arc<dyn Filter>> = vec![Arc::new(AlwaysAllow)];
        let chain = FilterChain { filters };
        let contexts = vec![
            SmsContext::new("1", "+1", TemplateName::from("w"), HashMap::new()),
            SmsContext::new("2", "+2", TemplateName::from("w"), HashMap::new()),
            SmsContext::new("3", "+3", TemplateName::from("w"), HashMap::new()),
        ];
        let survivors = chain.run(contexts).await;
        let ids: Vec<&str> = survivors.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn a_blocking_filter_drops_the_context() {
        let filters: Vec<Arc<dyn Filter>> = vec![Arc::new(AlwaysBlock), Arc::new(AlwaysAllow)];
        let chain = FilterChain { filters };
        let contexts = vec![SmsContext::new("1", "+1", TemplateName::from("w"), HashMap::new())];
        assert!(chain.run(contexts).await.is_empty());
    }
}
