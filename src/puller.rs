//! Delivery-status/reply reconciliation loop (spec §4.G).
//!
//! Grounded on `original_source/service/puller.go`: for each vendor, drain
//! `Status()` then `Reply()` in a loop (stop on an empty page), classify
//! each status into Checked/Processed/Unprocessed/Failed, bulk-update per
//! target state at the end of a batch, and persist replies together with
//! any unsubscribe records they trigger atomically.

use std::collections::HashMap;
use std::sync::Arc;

use crate::callback::CallbackRegistry;
use crate::collaborators::{ReplyBatchSaver, Saver};
use crate::config::ConfigStore;
use crate::error::Result;
use crate::model::{CategoryName, DeliveryStatus, Reply, SmsHistory, SmsState, TemplateName, Unsubscriber};
use crate::vendor::VendorRegistry;

#[derive(Debug, Clone)]
pub struct PullerConfig {
    /// Keyword whose case-insensitive, trimmed match against a reply body
    /// marks the sender as unsubscribed, e.g. `"TD"`.
    pub unsubscribe_keyword: String,
}

impl Default for PullerConfig {
    fn default() -> Self {
        PullerConfig { unsubscribe_keyword: "TD".to_string() }
    }
}

/// Looks up history by msg_id; an external collaborator supplies the
/// lookup since history persistence is out of scope (spec §6).
#[async_trait::async_trait]
pub trait HistoryLookup: Send + Sync {
    async fn find_by_msg_id(&self, msg_id: i64) -> Result<Option<SmsHistory>>;
}

/// Outcome of resolving a history's callback name from its category or
/// template config record. Kept distinct from "a callback name that
/// resolved to the empty string" (no callback configured) — a failed
/// config lookup means the status can't be classified at all and must be
/// skipped, not silently treated as if it had no callback.
enum CallbackResolution {
    Found(String),
    LookupFailed,
}

pub struct Puller {
    config_store: Arc<ConfigStore>,
    vendors: Arc<VendorRegistry>,
    callbacks: Arc<CallbackRegistry>,
    history: Arc<dyn HistoryLookup>,
    history_saver: Arc<dyn Saver<SmsHistory>>,
    reply_saver: Arc<dyn ReplyBatchSaver>,
    config: PullerConfig,
}

impl Puller {
    pub fn new(
        config_store: Arc<ConfigStore>,
        vendors: Arc<VendorRegistry>,
        callbacks: Arc<CallbackRegistry>,
        history: Arc<dyn HistoryLookup>,
        history_saver: Arc<dyn Saver<SmsHistory>>,
        reply_saver: Arc<dyn ReplyBatchSaver>,
        config: PullerConfig,
    ) -> Self {
        Puller { config_store, vendors, callbacks, history, history_saver, reply_saver, config }
    }

    pub async fn pull_all(&self) -> Result<()> {
        for name in self.vendors.all_names() {
            self.pull(&name).await?;
        }
        Ok(())
    }

    pub async fn pull(&self, vendor_name: &str) -> Result<()> {
        let _span = tracing::debug_span!("sms_pull", vendor = %vendor_name).entered();
        for vendor in self.vendors.get_by_name(vendor_name) {
            loop {
                let statuses = vendor.status().await?;
                if statuses.is_empty() {
                    break;
                }
                self.process_statuses(statuses).await;
            }
            loop {
                let replies = vendor.reply().await?;
                if replies.is_empty() {
                    break;
                }
                self.process_replies(replies).await;
            }
        }
        Ok(())
    }

    async fn process_statuses(&self, statuses: Vec<DeliveryStatus>) {
        let mut by_state: HashMap<SmsState, Vec<SmsHistory>> = HashMap::new();

        for status in statuses {
            if !is_valid_msg_id(status.msg_id) {
                tracing::warn!(msg_id = status.msg_id, "malformed msg_id, discarding status");
                continue;
            }
            let history = match self.history.find_by_msg_id(status.msg_id).await {
                Ok(Some(history)) => history,
                Ok(None) => {
                    tracing::warn!(msg_id = status.msg_id, "no history for msg_id, discarding status");
                    continue;
                }
                Err(error) => {
                    tracing::error!(msg_id = status.msg_id, %error, "history lookup failed");
                    continue;
                }
            };

            let resolution = if history.template.is_blank() {
                self.category_callback(&history.category).await
            } else {
                self.template_callback(&history.template).await
            };
            let callback_name = match resolution {
                CallbackResolution::Found(name) => name,
                CallbackResolution::LookupFailed => {
                    tracing::warn!(msg_id = status.msg_id, "config lookup failed, skipping status");
                    continue;
                }
            };

            let state = self.classify(&status, &history, &callback_name).await;
            by_state.entry(state).or_default().push(SmsHistory { state, ..history });
        }

        for (state, histories) in by_state {
            tracing::info!(state = ?state, count = histories.len(), "bulk-updating history state");
            if let Err(error) = self.history_saver.save("sms_history", &histories).await {
                tracing::error!(%error, "failed to persist history state batch");
            }
        }
    }

    /// Returns `Unprocessed` for an unresolved (non-empty, unregistered)
    /// callback name without ever treating it as `Checked`/`Failed` — see
    /// SPEC_FULL.md §9 (Open Question c). A genuinely empty callback name
    /// (no callback configured for this category/template) is the only
    /// case classified by `status.status_code` alone; a config lookup
    /// failure never reaches here (see [`CallbackResolution`]).
    async fn classify(&self, status: &DeliveryStatus, history: &SmsHistory, callback_name: &str) -> SmsState {
        match self.callbacks.lookup(callback_name) {
            Ok(None) => {
                if status.status_code == 0 {
                    SmsState::Checked
                } else {
                    SmsState::Failed
                }
            }
            Ok(Some(callback)) => match callback(status, history) {
                Ok(()) => SmsState::Processed,
                Err(error) => {
                    tracing::error!(%error, msg_id = status.msg_id, "callback failed, leaving status for a later pull");
                    SmsState::Unprocessed
                }
            },
            Err(_) => SmsState::Unprocessed,
        }
    }

    async fn category_callback(&self, category: &CategoryName) -> CallbackResolution {
        match self.config_store.which_category(category) {
            Ok(record) => CallbackResolution::Found(record.callback),
            Err(error) => {
                tracing::warn!(category = %category.0, %error, "category lookup failed, skipping status");
                CallbackResolution::LookupFailed
            }
        }
    }

    async fn template_callback(&self, template: &TemplateName) -> CallbackResolution {
        match self.config_store.which_template(template) {
            Ok(record) => CallbackResolution::Found(record.callback),
            Err(error) => {
                tracing::warn!(template = %template, %error, "template lookup failed, skipping status");
                CallbackResolution::LookupFailed
            }
        }
    }

    async fn process_replies(&self, replies: Vec<Reply>) {
        let mut unsubscribers = Vec::new();
        for reply in &replies {
            let trimmed = reply.msg.trim();
            if trimmed.eq_ignore_ascii_case(&self.config.unsubscribe_keyword) {
                unsubscribers.push(Unsubscriber { timestamp: reply.timestamp, phone: reply.phone.clone() });
            }
        }

        if let Err(error) = self.reply_saver.save(&replies, &unsubscribers).await {
            tracing::error!(%error, "failed to persist replies and unsubscribers");
        }
    }
}

/// Open Question (b), resolved in SPEC_FULL.md §9: accept the more
/// permissive of the two historical digit-length branches (15, 18, 19)
/// rather than rejecting a valid id and silently dropping a status update.
fn is_valid_msg_id(msg_id: i64) -> bool {
    let digits = msg_id.unsigned_abs().to_string().len();
    matches!(digits, 15 | 18 | 19)
}
