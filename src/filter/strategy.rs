//! Resolved strategy values.
//!
//! The original keeps a strategy as an untyped JSON expression resolved at
//! use time by whichever filter owns it (`filter/unsubscribe.go`,
//! `filter/rate_limit.go`, `filter/postpone.go` each implement their own
//! `Resolve`). REDESIGN FLAGS calls for a single tagged sum instead of three
//! ad hoc `interface{}` shapes — `resolve` below is total over
//! `StrategyType` by construction, with a single `ResolveFailed` kind for
//! any JSON shape mismatch.

use serde::Deserialize;

use crate::error::{Result, SmsError};
use crate::model::{StrategyRecord, StrategyType};

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Unsubscribe,
    RateLimit { duration_secs: i64, count: i64 },
    /// Local time-of-day window, `"HH:MM"`.
    Postpone { begin: String, end: String },
}

#[derive(Deserialize)]
struct RateLimitExpression {
    duration: i64,
    unit: String,
    count: i64,
}

#[derive(Deserialize)]
struct PostponeExpression {
    begin: String,
    end: String,
}

impl Strategy {
    pub fn resolve(record: &StrategyRecord) -> Result<Strategy> {
        match record.strategy_type {
            StrategyType::Unsubscribe => Ok(Strategy::Unsubscribe),
            StrategyType::RateLimit => {
                let expr: RateLimitExpression =
                    serde_json::from_str(&record.expression).map_err(|_| SmsError::ResolveFailed)?;
                let duration_secs = unit_to_seconds(&expr.unit)
                    .ok_or(SmsError::ResolveFailed)?
                    .checked_mul(expr.duration)
                    .ok_or(SmsError::ResolveFailed)?;
                Ok(Strategy::RateLimit { duration_secs, count: expr.count })
            }
            StrategyType::Postpone => {
                let expr: PostponeExpression =
                    serde_json::from_str(&record.expression).map_err(|_| SmsError::ResolveFailed)?;
                Ok(Strategy::Postpone { begin: expr.begin, end: expr.end })
            }
        }
    }
}

fn unit_to_seconds(unit: &str) -> Option<i64> {
    match unit {
        "s" | "sec" | "second" | "seconds" => Some(1),
        "m" | "min" | "minute" | "minutes" => Some(60),
        "h" | "hour" | "hours" => Some(3600),
        "d" | "day" | "days" => Some(86_400),
        _ => None,
    }
}
