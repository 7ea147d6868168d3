//! Template-driven outbound SMS dispatch: policy middleware, multi-vendor
//! fan-out, and delivery reconciliation.
//!
//! See [`sender::Sender`] for the outbound pipeline and [`puller::Puller`]
//! for the status/reply reconciliation loop. Collaborator traits an
//! embedder must implement (persistence, rate-limit counters, unsubscribe
//! lookups, delayed-job scheduling) live in [`collaborators`].

pub mod callback;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod id;
pub mod middleware;
pub mod model;
pub mod pool;
pub mod puller;
pub mod sender;
pub mod template;
pub mod vendor;

pub use context::ServiceContext;

pub use error::{Result, SmsError};
