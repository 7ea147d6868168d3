//! Outbound send pipeline (spec §4.F).
//!
//! Grounded on `original_source/service/sender.go`: resolve template →
//! middleware → resolve channel/vendor → render content → generate
//! msg_id(s) → attach history → call vendor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::callback::CallbackRegistry;
use crate::config::ConfigStore;
use crate::error::{Result, SmsError};
use crate::filter::{FilterChain, VariableCache};
use crate::id::{generate_msg_id, generate_msg_ids};
use crate::middleware::{resolve_actions, Middleware};
use crate::model::{ActionDescriptor, CategoryName, Channel, SmsContext, SmsHistory, SmsState, TemplateName};
use crate::template::render;
use crate::vendor::{SendItem, VendorRegistry};

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Logged at `tracing::debug_span!` per send batch for downstream
    /// correlation across the filter/render/dispatch steps.
    pub span_name: &'static str,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig { span_name: "sms_send" }
    }
}

pub struct Sender {
    config_store: Arc<ConfigStore>,
    filters: Arc<FilterChain>,
    variables: Arc<VariableCache>,
    vendors: Arc<VendorRegistry>,
    callbacks: Arc<CallbackRegistry>,
    config: SenderConfig,
}

impl Sender {
    pub fn new(
        config_store: Arc<ConfigStore>,
        filters: Arc<FilterChain>,
        variables: Arc<VariableCache>,
        vendors: Arc<VendorRegistry>,
        callbacks: Arc<CallbackRegistry>,
        config: SenderConfig,
    ) -> Self {
        Sender { config_store, filters, variables, vendors, callbacks, config }
    }

    /// Builds a fresh `Middleware` for one send call from `actions` (spec
    /// §4.F: "each call builds a fresh middleware instance from the
    /// template's action list"), rather than reusing one shared instance
    /// across every template.
    fn build_middleware(&self, actions: &[ActionDescriptor]) -> Middleware {
        Middleware::new(resolve_actions(actions, &self.filters))
    }

    /// Populates the variable cache the Postpone filter reads from, runs
    /// `middleware` over `contexts`, then clears the cache for every phone
    /// that went in — the store/clear bracket spec §4.C requires around
    /// chain execution.
    async fn run_with_variable_cache(&self, middleware: &Middleware, template: &str, contexts: Vec<SmsContext>) -> Vec<SmsContext> {
        let phones: Vec<String> = contexts.iter().map(|c| c.phone.clone()).collect();
        for ctx in &contexts {
            self.variables.store_variables(&ctx.phone, template, ctx.variables.clone());
        }
        let filtered = middleware.call(contexts).await;
        for phone in &phones {
            self.variables.clear_variables(phone, template);
        }
        filtered
    }

    /// Sends a templated batch. Preconditions: non-empty, every context
    /// shares the same template, every context id is unique and non-empty.
    pub async fn send(&self, template: &TemplateName, contexts: Vec<SmsContext>) -> Result<Vec<SmsContext>> {
        let _span = tracing::debug_span!("sms_send", span = self.config.span_name, template = %template).entered();
        validate_batch(&contexts, template)?;

        let smstemplate = self.config_store.which_template(template)?;
        let category = self.config_store.which_category(&smstemplate.category)?;

        let middleware = self.build_middleware(&smstemplate.actions);
        let filtered = self.run_with_variable_cache(&middleware, &template.0, contexts).await;
        if filtered.is_empty() {
            return Err(SmsError::NotAllowed);
        }

        let vendor = self
            .vendors
            .get_by_channel(category.channel)
            .ok_or(SmsError::VendorNotFound)?;

        let mut rendered = Vec::with_capacity(filtered.len());
        for ctx in filtered {
            let content = render(&smstemplate.content, &ctx.variables)?;
            rendered.push((ctx, content));
        }

        // A uniform `send` hands every recipient in the call the same
        // msg_id (spec §4.F step 5) — it is not a per-recipient sequence
        // number here, so `(msg_id, phone)` is what distinguishes recipients
        // of a partially-succeeded batch.
        let msg_id = generate_msg_id();
        let mut items = Vec::with_capacity(rendered.len());
        let mut contexts_out = Vec::with_capacity(rendered.len());
        for (mut ctx, content) in rendered {
            items.push(SendItem { msg_id, phone: ctx.phone.clone(), content: content.clone() });
            ctx.history = Some(SmsHistory {
                id: ctx.id.clone(),
                msg_id,
                timestamp: chrono::Utc::now(),
                phone: ctx.phone.clone(),
                content,
                template: template.clone(),
                category: smstemplate.category.clone(),
                channel: category.channel,
                vendor: vendor.name().to_string(),
                state: SmsState::Unchecked,
            });
            contexts_out.push(ctx);
        }

        let succeeded_keys = vendor.send(&items).await?;
        if succeeded_keys.is_empty() && !items.is_empty() {
            return Err(SmsError::Network);
        }

        let succeeded: std::collections::HashSet<(i64, String)> = succeeded_keys.into_iter().collect();
        Ok(contexts_out
            .into_iter()
            .filter(|ctx| ctx.history.as_ref().map(|h| succeeded.contains(&(h.msg_id, h.phone.clone()))).unwrap_or(false))
            .collect())
    }

    /// Category-only push: identical pipeline minus template resolution,
    /// using the category's channel and the blank template name.
    pub async fn push(&self, category_name: &CategoryName, phone_variables: Vec<(String, HashMap<String, String>)>) -> Result<Vec<SmsContext>> {
        let _span = tracing::debug_span!("sms_push", category = %category_name).entered();
        if phone_variables.is_empty() {
            return Err(SmsError::InvalidPhoneArray);
        }

        let category = self.config_store.which_category(category_name)?;
        let vendor = self
            .vendors
            .get_by_channel(category.channel)
            .ok_or(SmsError::VendorNotFound)?;

        let blank = TemplateName::blank();
        let contexts: Vec<SmsContext> = phone_variables
            .into_iter()
            .enumerate()
            .map(|(i, (phone, variables))| SmsContext::new(format!("push-{i}"), phone, blank.clone(), variables))
            .collect();

        // No template, so no action list of its own: falls back to the
        // full fixed Unsubscribe → Postpone → Rate-Limit chain.
        let middleware = self.build_middleware(&[]);
        let filtered = self.run_with_variable_cache(&middleware, &blank.0, contexts).await;
        if filtered.is_empty() {
            return Err(SmsError::NotAllowed);
        }

        let msg_id = generate_msg_id();
        let mut items = Vec::with_capacity(filtered.len());
        let mut contexts_out = Vec::with_capacity(filtered.len());
        for mut ctx in filtered {
            let content = ctx.variables.get("content").cloned().unwrap_or_default();
            items.push(SendItem { msg_id, phone: ctx.phone.clone(), content: content.clone() });
            ctx.history = Some(SmsHistory {
                id: ctx.id.clone(),
                msg_id,
                timestamp: chrono::Utc::now(),
                phone: ctx.phone.clone(),
                content,
                template: blank.clone(),
                category: category_name.clone(),
                channel: category.channel,
                vendor: vendor.name().to_string(),
                state: SmsState::Unchecked,
            });
            contexts_out.push(ctx);
        }

        let succeeded_keys = vendor.send(&items).await?;
        if succeeded_keys.is_empty() && !items.is_empty() {
            return Err(SmsError::Network);
        }
        let succeeded: std::collections::HashSet<(i64, String)> = succeeded_keys.into_iter().collect();
        Ok(contexts_out
            .into_iter()
            .filter(|ctx| ctx.history.as_ref().map(|h| succeeded.contains(&(h.msg_id, h.phone.clone()))).unwrap_or(false))
            .collect())
    }

    /// Content pre-encoded per recipient; partitioning/retry identical to
    /// `send`, spec §4.E.
    pub async fn multi_x_send(&self, template: &TemplateName, contexts: Vec<SmsContext>) -> Result<Vec<SmsContext>> {
        let _span = tracing::debug_span!("sms_multi_x_send", template = %template).entered();
        validate_batch(&contexts, template)?;

        let smstemplate = self.config_store.which_template(template)?;
        let category = self.config_store.which_category(&smstemplate.category)?;
        let vendor = self
            .vendors
            .get_by_channel(category.channel)
            .ok_or(SmsError::VendorNotFound)?;

        let middleware = self.build_middleware(&smstemplate.actions);
        let filtered = self.run_with_variable_cache(&middleware, &template.0, contexts).await;
        if filtered.is_empty() {
            return Err(SmsError::NotAllowed);
        }

        let mut rendered = Vec::with_capacity(filtered.len());
        for ctx in filtered {
            let content = render(&smstemplate.content, &ctx.variables)?;
            rendered.push((ctx, content));
        }

        let msg_ids = generate_msg_ids(rendered.len());
        let mut items = Vec::with_capacity(rendered.len());
        let mut contexts_out = Vec::with_capacity(rendered.len());
        for ((mut ctx, content), msg_id) in rendered.into_iter().zip(msg_ids) {
            items.push(SendItem { msg_id, phone: ctx.phone.clone(), content: content.clone() });
            ctx.history = Some(SmsHistory {
                id: ctx.id.clone(),
                msg_id,
                timestamp: chrono::Utc::now(),
                phone: ctx.phone.clone(),
                content,
                template: template.clone(),
                category: smstemplate.category.clone(),
                channel: category.channel,
                vendor: vendor.name().to_string(),
                state: SmsState::Unchecked,
            });
            contexts_out.push(ctx);
        }

        let succeeded_keys = vendor.multi_x_send(&items).await?;
        if succeeded_keys.is_empty() && !items.is_empty() {
            return Err(SmsError::Network);
        }
        let succeeded: std::collections::HashSet<(i64, String)> = succeeded_keys.into_iter().collect();
        Ok(contexts_out
            .into_iter()
            .filter(|ctx| ctx.history.as_ref().map(|h| succeeded.contains(&(h.msg_id, h.phone.clone()))).unwrap_or(false))
            .collect())
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }
}

fn validate_batch(contexts: &[SmsContext], template: &TemplateName) -> Result<()> {
    if contexts.is_empty() {
        return Err(SmsError::InvalidPhoneArray);
    }
    let mut seen_ids = std::collections::HashSet::with_capacity(contexts.len());
    for ctx in contexts {
        if ctx.id.is_empty() || !seen_ids.insert(ctx.id.as_str()) {
            return Err(SmsError::InvalidPhoneArray);
        }
        if &ctx.template != template {
            return Err(SmsError::InvalidPhoneArray);
        }
    }
    Ok(())
}
