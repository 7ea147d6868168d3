//! Grounded on `original_source/filter/unsubscribe.go`: no per-template
//! strategy at all — every context is checked against the same global
//! unsubscribe list.

use async_trait::async_trait;
use std::sync::Arc;

use crate::collaborators::UnsubscribeChecker;
use crate::error::Result;
use crate::model::{SmsContext, StrategyRecord, StrategyType};

use super::Filter;

pub struct UnsubscribeFilter {
    checker: Arc<dyn UnsubscribeChecker>,
}

impl UnsubscribeFilter {
    pub fn new(checker: Arc<dyn UnsubscribeChecker>) -> Self {
        UnsubscribeFilter { checker }
    }
}

#[async_trait]
impl Filter for UnsubscribeFilter {
    fn which_type(&self) -> StrategyType {
        StrategyType::Unsubscribe
    }

    async fn allow(&self, ctx: &SmsContext) -> Result<bool> {
        Ok(!self.checker.exists(&ctx.phone).await?)
    }

    /// No-op: this filter has no per-template configuration.
    fn apply(&self, _records: &[StrategyRecord]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeChecker(bool);
    #[async_trait]
    impl UnsubscribeChecker for FakeChecker {
        async fn exists(&self, _phone: &str) -> Result<bool> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn a_subscribed_phone_is_allowed() {
        let filter = UnsubscribeFilter::new(Arc::new(FakeChecker(false)));
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(filter.allow(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn an_unsubscribed_phone_is_blocked() {
        let filter = UnsubscribeFilter::new(Arc::new(FakeChecker(true)));
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(!filter.allow(&ctx).await.unwrap());
    }
}
