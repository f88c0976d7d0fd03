//! Snooze scheduling for follow-ups.

use chrono::{DateTime, Duration, Utc};

use crate::error::LeadError;

use super::model::CampaignLead;

/// Longest snooze an operator can set.
pub const MAX_SNOOZE_DAYS: u32 = 365;

/// Where a lead stands relative to its snooze marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozeState {
    /// No marker set.
    None,
    /// Suppressed until the given instant (strictly in the future).
    Snoozed { until: DateTime<Utc> },
    /// The marker has passed; the lead is due again.
    Unsnoozed { since: DateTime<Utc> },
}

/// Classify a lead's snooze marker at `now`.
pub fn snooze_state(lead: &CampaignLead, now: DateTime<Utc>) -> SnoozeState {
    match lead.next_follow_up_date {
        None => SnoozeState::None,
        Some(until) if until > now => SnoozeState::Snoozed { until },
        Some(since) => SnoozeState::Unsnoozed { since },
    }
}

/// The suppressed-until date for a snooze of `days` starting at `now`.
pub fn snooze_until(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, LeadError> {
    if days == 0 || days > MAX_SNOOZE_DAYS {
        return Err(LeadError::InvalidSnooze { days });
    }
    Ok(now + Duration::days(i64::from(days)))
}

impl CampaignLead {
    /// Strictly in the future means excluded from every follow-up bucket.
    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        matches!(snooze_state(self, now), SnoozeState::Snoozed { .. })
    }

    /// Marker present and reached.
    pub fn is_unsnoozed(&self, now: DateTime<Utc>) -> bool {
        matches!(snooze_state(self, now), SnoozeState::Unsnoozed { .. })
    }
}
