//! Core data model: identifiers, templates, categories, strategies, the
//! per-recipient context and the history/status/reply records that flow
//! through the send and reconcile pipelines.
//!
//! Grounded on `original_source/model/model.go` and `template/template.go`,
//! with field naming kept close to the Go structs; serde derive style
//! follows `examples/morgverd-sms-types`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A business-facing routing class. `Unknown` is the zero value, matching
/// the original's `UnknownChannel Channel = iota`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Unknown,
    Marketing,
    Production,
    Internal,
    International,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Unknown => "unknown",
            Channel::Marketing => "marketing",
            Channel::Production => "production",
            Channel::Internal => "internal",
            Channel::International => "international",
        };
        f.write_str(s)
    }
}

impl Channel {
    /// Parses the lowercase wire form used by config loaders. Unrecognized
    /// strings map to `Unknown` rather than erroring, matching the
    /// original's `WhichChannel(str)`.
    pub fn from_str_lossy(s: &str) -> Channel {
        match s {
            "marketing" => Channel::Marketing,
            "production" => Channel::Production,
            "internal" => Channel::Internal,
            "international" => Channel::International,
            _ => Channel::Unknown,
        }
    }
}

/// Template name, with a reserved "blank" sentinel for push-through sends
/// that bypass template resolution entirely (see [`Sender::push`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateName(pub String);

impl TemplateName {
    pub fn blank() -> Self {
        TemplateName(String::new())
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateName {
    fn from(s: &str) -> Self {
        TemplateName(s.to_string())
    }
}

impl From<String> for TemplateName {
    fn from(s: String) -> Self {
        TemplateName(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryName(pub String);

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryName {
    fn from(s: &str) -> Self {
        CategoryName(s.to_string())
    }
}

impl From<String> for CategoryName {
    fn from(s: String) -> Self {
        CategoryName(s)
    }
}

/// An ordered policy action descriptor, resolved into an `Action` trait
/// object at middleware-construction time (see `crate::middleware`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsTemplate {
    pub name: TemplateName,
    pub category: CategoryName,
    pub content: String,
    pub enabled: bool,
    /// Empty means "no callback configured".
    pub callback: String,
    pub actions: Vec<ActionDescriptor>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl SmsTemplate {
    pub fn is_usable(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsCategory {
    pub name: CategoryName,
    pub channel: Channel,
    pub callback: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Policy type discriminant, matching `filter.Type` in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Unsubscribe,
    RateLimit,
    Postpone,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyType::Unsubscribe => "unsubscribe",
            StrategyType::RateLimit => "rate_limit",
            StrategyType::Postpone => "postpone",
        };
        f.write_str(s)
    }
}

/// A raw, as-loaded strategy record. `expression` is interpreted by the
/// filter matching `strategy_type` (see `crate::filter::Strategy` for the
/// resolved tagged-sum form the REDESIGN FLAGS call for).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecord {
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    pub template: TemplateName,
    pub expression: String,
    pub enabled: bool,
}

/// A single per-recipient work unit flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct SmsContext {
    pub id: String,
    pub phone: String,
    pub template: TemplateName,
    pub variables: HashMap<String, String>,
    pub history: Option<SmsHistory>,
}

impl SmsContext {
    pub fn new(id: impl Into<String>, phone: impl Into<String>, template: TemplateName, variables: HashMap<String, String>) -> Self {
        SmsContext {
            id: id.into(),
            phone: phone.into(),
            template,
            variables,
            history: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmsState {
    Unchecked,
    Checked,
    Processed,
    Unprocessed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsHistory {
    /// Equal to the originating context's `id`.
    pub id: String,
    pub msg_id: i64,
    pub timestamp: DateTime<Utc>,
    pub phone: String,
    pub content: String,
    pub template: TemplateName,
    pub category: CategoryName,
    pub channel: Channel,
    pub vendor: String,
    pub state: SmsState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub msg_id: i64,
    pub timestamp: DateTime<Utc>,
    pub phone: String,
    /// 0 = delivered.
    pub status_code: i32,
    pub error_msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub timestamp: DateTime<Utc>,
    pub phone: String,
    pub msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unsubscriber {
    pub timestamp: DateTime<Utc>,
    pub phone: String,
}
