//! Usage and rate limiting for AI-assisted message generation.
//!
//! The durable store is the single source of truth for every allow/deny
//! decision. [`UsageHints`] is only an optimistic local mirror for display.

pub mod hints;
pub mod limiter;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::leads::OutreachMethod;

pub use hints::UsageHints;
pub use limiter::{CheckError, Reservation, UsageLimiter};

/// Why a generation request was turned away. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitReason {
    /// The lead already got a message on this channel today.
    MethodLimit,
    /// Too many generations in the trailing hour.
    HourlyLimit,
    /// Too many generations today.
    DailyLimit,
    /// The previous generation was issued too recently.
    Cooldown,
}

impl LimitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MethodLimit => "METHOD_LIMIT",
            Self::HourlyLimit => "HOURLY_LIMIT",
            Self::DailyLimit => "DAILY_LIMIT",
            Self::Cooldown => "COOLDOWN",
        }
    }
}

impl fmt::Display for LimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "METHOD_LIMIT" => Ok(Self::MethodLimit),
            "HOURLY_LIMIT" => Ok(Self::HourlyLimit),
            "DAILY_LIMIT" => Ok(Self::DailyLimit),
            "COOLDOWN" => Ok(Self::Cooldown),
            other => Err(format!("unknown limit reason: {other}")),
        }
    }
}

/// Global caps for one operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    pub hourly_limit: u32,
    pub daily_limit: u32,
    pub cooldown: Duration,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            hourly_limit: 15,
            daily_limit: 25,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Used vs allowed within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWindow {
    pub used: u32,
    pub limit: u32,
}

impl UsageWindow {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Snapshot of an operator's generation usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub hourly: UsageWindow,
    pub daily: UsageWindow,
}

/// One confirmed generation, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub operator_id: String,
    pub lead_id: Uuid,
    pub channel: OutreachMethod,
    pub created_at: DateTime<Utc>,
    /// Operator-local calendar day the generation counts against.
    pub local_day: NaiveDate,
}
