//! Hot-reloadable configuration store.
//!
//! Grounded on `original_source/config/loader.go`, which rebuilds three
//! plain `map[string]*Thing`s from a `Loader` and swaps them into package
//! globals under a mutex whenever a `Watcher` fires. This crate keeps the
//! same build-then-swap shape but swaps a single `Arc<Snapshot>` behind a
//! `RwLock` rather than three separate maps behind three separate locks, so
//! readers always see a internally-consistent template/category/strategy
//! set together. The background reload loop follows the same
//! spawn-a-task-that-owns-a-channel shape as `Subscriber::spawn` in
//! `pubsub/src/subscriber.rs`.

mod snapshot;

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collaborators::{Loader, Watcher};
use crate::error::Result;
use crate::filter::FilterChain;
use crate::model::{Channel, SmsCategory, SmsTemplate, StrategyRecord, TemplateName};

pub use snapshot::Snapshot;

/// Owns the live configuration snapshot and, once [`ConfigStore::watch`] is
/// called, a background task that keeps it fresh.
pub struct ConfigStore {
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    reloader: Option<JoinHandle<()>>,
}

impl ConfigStore {
    /// Performs the first load synchronously so callers never observe an
    /// empty store, matching the original's `Init` doing one blocking load
    /// before starting the watcher goroutine. `filters` receives the
    /// freshly loaded strategies immediately, so a template's rate-limit/
    /// postpone policy is live before the first send, not only after the
    /// first reload.
    pub async fn init(loader: &(dyn Loader), filters: &FilterChain) -> Result<Self> {
        let snapshot = Snapshot::build(loader).await?;
        filters.apply_all(&snapshot.all_strategies());
        Ok(ConfigStore {
            snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
            reloader: None,
        })
    }

    /// Starts the background reload loop: each time `watcher` emits a
    /// change signal, the store rebuilds from `loader`, swaps the snapshot
    /// in, and re-applies the fresh strategies to every filter in `filters`
    /// (spec §4.A: "After a strategy reload, the store must re-apply
    /// strategies to all filters"). A single-slot channel is intentional —
    /// if two change signals arrive before a reload finishes, they collapse
    /// into one reload rather than queuing up redundant rebuilds.
    pub fn watch(&mut self, loader: Arc<dyn Loader>, watcher: Arc<dyn Watcher>, filters: Arc<FilterChain>) {
        let (tx, mut rx) = mpsc::channel::<DateTime<Utc>>(1);
        let watch_tx = tx.clone();
        tokio::spawn(async move {
            watcher.watch(watch_tx).await;
        });

        let snapshot = self.snapshot.clone();
        self.reloader = Some(tokio::spawn(async move {
            while rx.recv().await.is_some() {
                match Snapshot::build(loader.as_ref()).await {
                    Ok(fresh) => {
                        filters.apply_all(&fresh.all_strategies());
                        *snapshot.write().unwrap() = Arc::new(fresh);
                        tracing::info!("configuration reloaded");
                    }
                    Err(error) => {
                        tracing::error!(%error, "configuration reload failed, keeping previous snapshot");
                    }
                }
            }
        }));
    }

    /// Stops the background reload task, if one is running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.reloader.take() {
            handle.abort();
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub fn which_template(&self, name: &TemplateName) -> Result<SmsTemplate> {
        self.current().which_template(name)
    }

    pub fn which_category(&self, name: &crate::model::CategoryName) -> Result<SmsCategory> {
        self.current().which_category(name)
    }

    pub fn which_channel(&self, category: &crate::model::CategoryName) -> Result<Channel> {
        self.current().which_channel(category)
    }

    pub fn strategies_for(&self, template: &TemplateName) -> Vec<StrategyRecord> {
        self.current().strategies_for(template)
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{RateLimitChecker, UnsubscribeChecker};
    use crate::filter::{Filter, PostponeFilter, RateLimitFilter, UnsubscribeFilter, VariableCache};
    use crate::model::{CategoryName, SmsContext, StrategyType};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    struct NeverSubscribed;
    #[async_trait]
    impl UnsubscribeChecker for NeverSubscribed {
        async fn exists(&self, _phone: &str) -> Result<bool> {
            Ok(false)
        }
    }

    /// Records the threshold it was last called with instead of actually
    /// rate-limiting, so the test can observe when a reloaded strategy
    /// reaches the filter without racing a real counter.
    struct ThresholdSpy {
        last_threshold: std::sync::atomic::AtomicI64,
    }

    #[async_trait]
    impl RateLimitChecker for ThresholdSpy {
        async fn is_exceeded(&self, _key: &str, _expiration_seconds: i64, threshold: i64) -> Result<bool> {
            self.last_threshold.store(threshold, Ordering::SeqCst);
            Ok(false)
        }
    }

    struct NoopQueue;
    #[async_trait]
    impl crate::collaborators::DelayedJobQueue for NoopQueue {
        async fn enqueue_at(&self, _queue_name: &str, _when: DateTime<Utc>, _job: crate::collaborators::PostponedSend) -> Result<()> {
            Ok(())
        }
    }

    struct StepLoader {
        strategy_call: AtomicU32,
    }

    #[async_trait]
    impl Loader for StepLoader {
        async fn load_template(&self) -> Result<Vec<SmsTemplate>> {
            Ok(vec![])
        }
        async fn load_category(&self) -> Result<Vec<SmsCategory>> {
            Ok(vec![])
        }
        async fn load_strategy(&self) -> Result<Vec<StrategyRecord>> {
            let call = self.strategy_call.fetch_add(1, Ordering::SeqCst);
            let count = if call == 0 { 1 } else { 10 };
            Ok(vec![StrategyRecord {
                strategy_type: StrategyType::RateLimit,
                template: TemplateName::from("welcome"),
                expression: format!(r#"{{"duration":1,"unit":"h","count":{count}}}"#),
                enabled: true,
            }])
        }
    }

    struct OneShotWatcher {
        fire: Notify,
    }

    #[async_trait]
    impl Watcher for OneShotWatcher {
        async fn watch(&self, on_change: mpsc::Sender<DateTime<Utc>>) {
            self.fire.notified().await;
            let _ = on_change.send(Utc::now()).await;
        }
    }

    #[tokio::test]
    async fn strategies_are_reapplied_to_filters_on_init_and_reload() {
        let checker = Arc::new(ThresholdSpy { last_threshold: std::sync::atomic::AtomicI64::new(-1) });
        let loader = Arc::new(StepLoader { strategy_call: AtomicU32::new(0) });
        let filters = Arc::new(FilterChain::new(
            UnsubscribeFilter::new(Arc::new(NeverSubscribed)),
            PostponeFilter::new(Arc::new(NoopQueue), Arc::new(VariableCache::new()), "delayed"),
            RateLimitFilter::new(checker.clone()),
        ));

        let mut store = ConfigStore::init(loader.as_ref(), &filters).await.unwrap();

        let ctx = SmsContext::new("1", "+1", TemplateName::from("welcome"), HashMap::new());
        let rate_limit = filters.filter_for(StrategyType::RateLimit).unwrap();
        rate_limit.allow(&ctx).await.unwrap();
        assert_eq!(checker.last_threshold.load(Ordering::SeqCst), 1, "init applies the first-loaded count=1 strategy");

        let watcher = Arc::new(OneShotWatcher { fire: Notify::new() });
        store.watch(loader.clone(), watcher.clone(), filters.clone());
        watcher.fire.notify_one();

        for _ in 0..50 {
            rate_limit.allow(&ctx).await.unwrap();
            if checker.last_threshold.load(Ordering::SeqCst) == 10 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("rate-limit strategy was never reapplied after reload");
    }

    #[tokio::test]
    async fn category_lookup_reflects_initial_load() {
        struct FixedLoader;
        #[async_trait]
        impl Loader for FixedLoader {
            async fn load_template(&self) -> Result<Vec<SmsTemplate>> {
                Ok(vec![])
            }
            async fn load_category(&self) -> Result<Vec<SmsCategory>> {
                Ok(vec![SmsCategory {
                    name: CategoryName::from("growth"),
                    channel: Channel::Production,
                    callback: String::new(),
                    timestamp: Utc::now(),
                    description: String::new(),
                }])
            }
            async fn load_strategy(&self) -> Result<Vec<StrategyRecord>> {
                Ok(vec![])
            }
        }

        let filters = FilterChain::new(
            UnsubscribeFilter::new(Arc::new(NeverSubscribed)),
            PostponeFilter::new(Arc::new(NoopQueue), Arc::new(VariableCache::new()), "delayed"),
            RateLimitFilter::new(Arc::new(ThresholdSpy { last_threshold: std::sync::atomic::AtomicI64::new(-1) })),
        );
        let store = ConfigStore::init(&FixedLoader, &filters).await.unwrap();
        assert_eq!(store.which_channel(&CategoryName::from("growth")).unwrap(), Channel::Production);
    }
}
