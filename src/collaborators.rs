//! External collaborator traits (spec §6) — interfaces only. Persistence,
//! the rate-limit counter, the unsubscribe existence check, and the
//! delayed-job queue are treated as injected dependencies; this crate ships
//! no concrete implementation of any of them.
//!
//! Grounded on the `async_trait`-based collaborator traits throughout
//! `google-cloud-auth` (e.g. `TokenSource`) and the config `Loader`/
//! `Watcher` pair in `original_source/config/loader.go`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Reply, SmsCategory, SmsTemplate, StrategyRecord, Unsubscriber};

/// Pull-side config source: the config store calls these once at `init`
/// and again on every reload tick.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load_template(&self) -> Result<Vec<SmsTemplate>>;
    async fn load_category(&self) -> Result<Vec<SmsCategory>>;
    async fn load_strategy(&self) -> Result<Vec<StrategyRecord>>;
}

/// Blocks forever, emitting a timestamp each time an external change is
/// observed. A single missed signal between ticks is harmless — the
/// reloader only cares that a tick arrived, not how many.
#[async_trait]
pub trait Watcher: Send + Sync {
    async fn watch(&self, on_change: tokio::sync::mpsc::Sender<DateTime<Utc>>);
}

#[async_trait]
pub trait UnsubscribeChecker: Send + Sync {
    async fn exists(&self, phone: &str) -> Result<bool>;
}

#[async_trait]
pub trait RateLimitChecker: Send + Sync {
    /// INCR-with-TTL semantics: increments the counter at `key`, setting it
    /// to expire in `expiration_seconds` on the first increment, and
    /// reports whether the post-increment count exceeds `threshold`.
    async fn is_exceeded(&self, key: &str, expiration_seconds: i64, threshold: i64) -> Result<bool>;
}

/// Persists a homogeneous batch of records to `destination` (a collection
/// name, table name, or topic — the implementor's choice).
#[async_trait]
pub trait Saver<T: Send + Sync>: Send + Sync {
    async fn save(&self, destination: &str, items: &[T]) -> Result<()>;
}

/// Persists a batch of replies together with whatever unsubscribe records
/// they triggered in a single transaction (spec §4.G: "the only
/// multi-collection transactional requirement in the system") — both
/// collections land, or neither does. Kept as its own trait rather than two
/// calls to [`Saver`] precisely because no ordering of two independent
/// `Saver::save` calls can give that guarantee.
#[async_trait]
pub trait ReplyBatchSaver: Send + Sync {
    async fn save(&self, replies: &[Reply], unsubscribers: &[Unsubscriber]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PostponedSend {
    pub phone: String,
    pub template: String,
    pub variables: std::collections::HashMap<String, String>,
}

#[async_trait]
pub trait DelayedJobQueue: Send + Sync {
    async fn enqueue_at(&self, queue_name: &str, when: DateTime<Utc>, job: PostponedSend) -> Result<()>;
}
