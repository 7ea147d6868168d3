//! Crate-wide error type.
//!
//! One [`thiserror`](thiserror)-derived enum carries every error kind named
//! by the dispatch pipeline, mirroring how `google-cloud-auth` collects its
//! failure modes into a single `Error` rather than one type per module.

use crate::model::TemplateName;

pub type Result<T> = std::result::Result<T, SmsError>;

#[derive(thiserror::Error, Debug)]
pub enum SmsError {
    #[error("variables do not match the template's placeholder count: {0}")]
    InvalidVariables(String),

    #[error("phone/context array is empty or malformed")]
    InvalidPhoneArray,

    #[error("content could not be rendered for template {0:?}")]
    InvalidContent(TemplateName),

    #[error("template not found: {0:?}")]
    TemplateNotFound(TemplateName),

    #[error("template not available (disabled): {0:?}")]
    TemplateNotAvailable(TemplateName),

    #[error("category not found: {0}")]
    CategoryNotFound(String),

    #[error("channel not found for category {0}")]
    ChannelNotFound(String),

    #[error("strategy not found for type {0}")]
    StrategyNotFound(String),

    #[error("vendor not found")]
    VendorNotFound,

    #[error("callback already registered: {0}")]
    DuplicatedCallback(String),

    #[error("callback not found: {0}")]
    CallbackNotFound(String),

    #[error("failed to resolve strategy expression")]
    ResolveFailed,

    #[error("batch was entirely filtered out by policy")]
    NotAllowed,

    #[error("dry-run: no traffic was sent to the carrier")]
    NotInProduction,

    #[error("vendor rejected the send")]
    SendFailed,

    #[error("transport exhausted retries with no successful hand-off")]
    Network,

    #[error("failed to pull delivery status from vendor")]
    GetStatusFailed,

    #[error("failed to pull replies from vendor")]
    GetReplyFailed,

    #[error("failed to query vendor balance")]
    QueryBalanceFailed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
