//! Grounded on `original_source/filter/postpone.go`: a per-template
//! "quiet hours" window (`begin`/`end`, local time-of-day). Outside the
//! window the context is blocked and, if the Sender previously stashed its
//! variables in the [`super::VariableCache`], a delayed resend is enqueued
//! for the next time the window opens. Missing variables means the Sender
//! never populated the cache for this phone/template pair — the original
//! silently drops the resend rather than guessing at variables, and this
//! crate keeps that behavior.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveTime};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::collaborators::{DelayedJobQueue, PostponedSend};
use crate::error::Result;
use crate::model::{SmsContext, StrategyRecord, StrategyType, TemplateName};

use super::variables::VariableCache;
use super::{Filter, Strategy};

pub struct PostponeFilter {
    queue: Arc<dyn DelayedJobQueue>,
    variables: Arc<VariableCache>,
    queue_name: String,
    strategies: RwLock<HashMap<TemplateName, Strategy>>,
}

impl PostponeFilter {
    pub fn new(queue: Arc<dyn DelayedJobQueue>, variables: Arc<VariableCache>, queue_name: impl Into<String>) -> Self {
        PostponeFilter {
            queue,
            variables,
            queue_name: queue_name.into(),
            strategies: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Filter for PostponeFilter {
    fn which_type(&self) -> StrategyType {
        StrategyType::Postpone
    }

    async fn allow(&self, ctx: &SmsContext) -> Result<bool> {
        let strategy = self.strategies.read().unwrap().get(&ctx.template).cloned();
        let Some(Strategy::Postpone { begin, end }) = strategy else {
            return Ok(true);
        };
        let Some((begin, end)) = parse_window(&begin, &end) else {
            tracing::warn!(template = %ctx.template, "malformed postpone window, allowing");
            return Ok(true);
        };

        let now = Local::now();
        let time_of_day = now.time();
        if time_of_day >= begin && time_of_day <= end {
            return Ok(true);
        }

        let Some(variables) = self.variables.lookup(&ctx.phone, &ctx.template.0) else {
            tracing::debug!(phone = %ctx.phone, template = %ctx.template, "no cached variables, dropping postponed send");
            return Ok(false);
        };

        let next_open = if time_of_day < begin {
            now.date_naive().and_time(begin)
        } else {
            (now.date_naive() + Duration::days(1)).and_time(begin)
        };
        let when = next_open.and_local_timezone(Local).single().unwrap_or(now).with_timezone(&chrono::Utc);

        let job = PostponedSend { phone: ctx.phone.clone(), template: ctx.template.0.clone(), variables };
        if let Err(error) = self.queue.enqueue_at(&self.queue_name, when, job).await {
            tracing::warn!(phone = %ctx.phone, %error, "failed to enqueue postponed send");
        }
        Ok(false)
    }

    fn apply(&self, records: &[StrategyRecord]) {
        let mut resolved = HashMap::new();
        for record in records {
            if record.strategy_type != StrategyType::Postpone || !record.enabled {
                continue;
            }
            match Strategy::resolve(record) {
                Ok(strategy) => {
                    resolved.insert(record.template.clone(), strategy);
                }
                Err(error) => {
                    tracing::warn!(template = %record.template, %error, "could not resolve postpone strategy");
                }
            }
        }
        *self.strategies.write().unwrap() = resolved;
    }
}

fn parse_window(begin: &str, end: &str) -> Option<(NaiveTime, NaiveTime)> {
    let begin = NaiveTime::parse_from_str(begin, "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
    Some((begin, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeQueue;
    #[async_trait]
    impl DelayedJobQueue for FakeQueue {
        async fn enqueue_at(&self, _queue_name: &str, _when: chrono::DateTime<chrono::Utc>, _job: PostponedSend) -> Result<()> {
            Ok(())
        }
    }

    fn record(begin: &str, end: &str) -> StrategyRecord {
        StrategyRecord {
            strategy_type: StrategyType::Postpone,
            template: TemplateName::from("welcome"),
            expression: format!(r#"{{"begin":"{begin}","end":"{end}"}}"#),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn no_strategy_means_always_allowed() {
        let filter = PostponeFilter::new(Arc::new(FakeQueue), Arc::new(VariableCache::new()), "delayed");
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(filter.allow(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn window_covering_all_day_always_allows() {
        let filter = PostponeFilter::new(Arc::new(FakeQueue), Arc::new(VariableCache::new()), "delayed");
        filter.apply(&[record("00:00", "23:59")]);
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(filter.allow(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn missing_variables_drops_without_enqueueing() {
        let filter = PostponeFilter::new(Arc::new(FakeQueue), Arc::new(VariableCache::new()), "delayed");
        // A window that can never contain "now" forces the blocked branch
        // regardless of wall-clock time the test happens to run at.
        filter.apply(&[record("00:00", "00:00")]);
        let ctx = SmsContext::new("1", "+1", "welcome".into(), HashMap::new());
        assert!(!filter.allow(&ctx).await.unwrap());
    }
}
