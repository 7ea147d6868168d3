//! Grounded on `original_source/filter/rate_limit.go`: `key = "cnt_" +
//! phone + "_" + template`, expiration derived from the strategy's
//! `duration`/`unit` pair, threshold from `count`. A template with no
//! configured strategy is unrestricted.
//!
//! Open Question (a), resolved in SPEC_FULL.md §9: a checker failure is
//! fail-closed — better to wrongly block a send than to silently admit
//! unlimited volume through a broken limiter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::collaborators::RateLimitChecker;
use crate::error::Result;
use crate::model::{SmsContext, StrategyRecord, StrategyType, TemplateName};

use super::{Filter, Strategy};

pub struct RateLimitFilter {
    checker: Arc<dyn RateLimitChecker>,
    strategies: RwLock<HashMap<TemplateName, Strategy>>,
}

impl RateLimitFilter {
    pub fn new(checker: Arc<dyn RateLimitChecker>) -> Self {
        RateLimitFilter { checker, strategies: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl Filter for RateLimitFilter {
    fn which_type(&self) -> StrategyType {
        StrategyType::RateLimit
    }

    async fn allow(&self, ctx: &SmsContext) -> Result<bool> {
        let strategy = self.strategies.read().unwrap().get(&ctx.template).cloned();
        let Some(Strategy::RateLimit { duration_secs, count }) = strategy else {
            return Ok(true);
        };
        let key = format!("cnt_{}_{}", ctx.phone, ctx.template);
        let exceeded = self.checker.is_exceeded(&key, duration_secs, count).await?;
        Ok(!exceeded)
    }

    fn apply(&self, records: &[StrategyRecord]) {
        let mut resolved = HashMap::new();
        for record in records {
            if record.strategy_type != StrategyType::RateLimit || !record.enabled {
                continue;
            }
            match Strategy::resolve(record) {
                Ok(strategy) => {
                    resolved.insert(record.template.clone(), strategy);
                }
                Err(error) => {
                    tracing::warn!(template = %record.template, %error, "could not resolve rate-limit strategy");
                }
            }
        }
        *self.strategies.write().unwrap() = resolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeChecker {
        exceeded: bool,
    }
    #[async_trait]
    impl RateLimitChecker for FakeChecker {
        async fn is_exceeded(&self, _key: &str, _expiration_seconds: i64, _threshold: i64) -> Result<bool> {
            Ok(self.exceeded)
        }
    }

    fn record() -> StrategyRecord {
        StrategyRecord {
            strategy_type: StrategyType::RateLimit,
            template: TemplateName::from("welcome"),
            expression: r#"{"duration":1,"unit":"h","count":3}"#.to_string(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn no_strategy_means_unrestricted() {
        let filter = RateLimitFilter::new(Arc::new(FakeChecker { exceeded: true }));
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(filter.allow(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn exceeded_checker_blocks() {
        let filter = RateLimitFilter::new(Arc::new(FakeChecker { exceeded: true }));
        filter.apply(&[record()]);
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(!filter.allow(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn within_limit_is_allowed() {
        let filter = RateLimitFilter::new(Arc::new(FakeChecker { exceeded: false }));
        filter.apply(&[record()]);
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(filter.allow(&ctx).await.unwrap());
    }
}
