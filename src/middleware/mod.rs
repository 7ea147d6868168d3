//! Generalized `Action` pipeline used by the Sender (spec §4.D).
//!
//! Grounded on `original_source/middleware/middleware.go` (the ordered
//! chain, drop-on-`false`, order-preserving output) and
//! `middleware/error_report.go` (the outermost panic-isolating guard). Go's
//! `defer recover()` has no direct async equivalent once an action's body
//! may itself `.await` a collaborator call, so every action invocation runs
//! as a detached task here and a panic surfaces as `JoinError::is_panic()`
//! instead of unwinding into the Sender — the same "a panic in a spawned
//! task becomes a value, not an unwind" translation `tokio` itself
//! documents for `JoinHandle`. This folds the original's separate outermost
//! guard action into the chain runner itself, since isolating only actions
//! *after* the guard would leave the guard's own neighbors unprotected in
//! an async chain where any action can suspend before it can panic.

mod filter_action;

pub use filter_action::{resolve as resolve_actions, FilterAction};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::SmsContext;

#[async_trait]
pub trait Action: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// `true` to let `ctx` continue to the next action.
    async fn call(&self, ctx: &SmsContext) -> Result<bool>;
}

pub struct Middleware {
    actions: Vec<Arc<dyn Action>>,
}

impl Middleware {
    pub fn new(actions: Vec<Arc<dyn Action>>) -> Self {
        Middleware { actions }
    }

    /// Runs every context through the full action chain, preserving input
    /// order among survivors. An action returning `false` drops the
    /// context (logged with the action's name); a panicking action is
    /// treated as a no-op allow, matching the original's recovery action
    /// swallowing the panic rather than failing the whole batch; reaching
    /// the end of the chain keeps the context.
    pub async fn call(&self, contexts: Vec<SmsContext>) -> Vec<SmsContext> {
        let mut surviving = Vec::with_capacity(contexts.len());
        'next_context: for ctx in contexts {
            for action in &self.actions {
                let name = action.name().to_string();
                let task_action = action.clone();
                let task_ctx = ctx.clone();
                let outcome = tokio::spawn(async move { task_action.call(&task_ctx).await }).await;
                match outcome {
                    Ok(Ok(true)) => continue,
                    Ok(Ok(false)) => {
                        tracing::debug!(phone = %ctx.phone, action = %name, "context dropped by action");
                        continue 'next_context;
                    }
                    Ok(Err(error)) => {
                        tracing::warn!(phone = %ctx.phone, action = %name, %error, "action failed, dropping context");
                        continue 'next_context;
                    }
                    Err(join_error) if join_error.is_panic() => {
                        tracing::error!(phone = %ctx.phone, action = %name, "action panicked, treating as allow");
                        continue;
                    }
                    Err(join_error) => {
                        tracing::warn!(phone = %ctx.phone, action = %name, %join_error, "action task was cancelled, dropping context");
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
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingAllow(Arc<AtomicUsize>);
    #[async_trait]
    impl Action for CountingAllow {
        fn name(&self) -> &str {
            "counting_allow"
        }
        async fn call(&self, _ctx: &SmsContext) -> Result<bool> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct RejectEveryone;
    #[async_trait]
    impl Action for RejectEveryone {
        fn name(&self) -> &str {
            "reject_everyone"
        }
        async fn call(&self, _ctx: &SmsContext) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn surviving_order_matches_input_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let middleware = Middleware::new(vec![Arc::new(CountingAllow(counter.clone()))]);
        let contexts = vec![
            SmsContext::new("a", "+1", "welcome".into(), HashMap::new()),
            SmsContext::new("b", "+2", "welcome".into(), HashMap::new()),
        ];
        let survivors = middleware.call(contexts).await;
        assert_eq!(survivors.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_rejecting_action_drops_the_context() {
        let middleware = Middleware::new(vec![Arc::new(RejectEveryone)]);
        let contexts = vec![SmsContext::new("a", "+1", "welcome".into(), HashMap::new())];
        assert!(middleware.call(contexts).await.is_empty());
    }
}
