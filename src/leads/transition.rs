//! Lead status state machine.
//!
//! `pending → contacted → responded → qualified → signed`, with `rejected`
//! reachable from any contacted-or-later, non-terminal status. Validation is
//! pure: [`plan_transition`] decides what a transition would write and the
//! engine commits the plan through the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LeadError;

use super::model::{CampaignLead, LeadStatus, OutreachMethod};

impl LeadStatus {
    /// Statuses reachable from this one.
    pub fn allowed_next(&self) -> &'static [LeadStatus] {
        use LeadStatus::*;

        match self {
            Pending => &[Contacted],
            Contacted => &[Contacted, Responded, Rejected],
            Responded => &[Responded, Qualified, Rejected],
            Qualified => &[Qualified, Signed, Rejected],
            Signed | Rejected => &[],
        }
    }

    /// Check if this status allows transitioning to `target`.
    pub fn can_transition_to(&self, target: LeadStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Signed | Self::Rejected)
    }
}

/// What happens to a campaign lead once a rejection is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectPolicy {
    /// Keep the row as a terminal `rejected` record.
    #[default]
    Retain,
    /// Delete the row outright.
    HardDelete,
}

impl fmt::Display for RejectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::HardDelete => f.write_str("hard_delete"),
        }
    }
}

impl FromStr for RejectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retain" => Ok(Self::Retain),
            "hard_delete" => Ok(Self::HardDelete),
            other => Err(format!("unknown reject policy: {other}")),
        }
    }
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target: LeadStatus,
    /// Required when entering `contacted` from `pending`.
    #[serde(default)]
    pub channel: Option<OutreachMethod>,
    /// Operator confirmation for destructive transitions.
    #[serde(default)]
    pub confirmed: bool,
}

impl TransitionRequest {
    pub fn to(target: LeadStatus) -> Self {
        Self {
            target,
            channel: None,
            confirmed: false,
        }
    }

    /// Mark as contacted on `channel`.
    pub fn contacted(channel: OutreachMethod) -> Self {
        Self::to(LeadStatus::Contacted).with_channel(channel)
    }

    pub fn with_channel(mut self, channel: OutreachMethod) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

/// Fields a successful transition writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: LeadStatus,
    pub last_contacted_at: DateTime<Utc>,
    /// `Some` overwrites the outreach method, `None` leaves it untouched.
    pub outreach_method: Option<OutreachMethod>,
}

impl StatusUpdate {
    /// Apply to an in-memory copy. Acting on a lead also consumes its snooze.
    pub fn apply(&self, lead: &mut CampaignLead) {
        lead.status = self.status;
        lead.last_contacted_at = Some(self.last_contacted_at);
        if let Some(method) = self.outreach_method {
            lead.outreach_method = Some(method);
        }
        lead.next_follow_up_date = None;
    }
}

/// The validated effect of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Write these fields.
    Update(StatusUpdate),
    /// Remove the record (confirmed rejection under [`RejectPolicy::HardDelete`]).
    Delete,
}

/// Validate a transition and work out what it writes.
///
/// Fails without side effects on an illegal target, an unconfirmed rejection,
/// or a first contact with no channel.
pub fn plan_transition(
    lead: &CampaignLead,
    request: &TransitionRequest,
    policy: RejectPolicy,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, LeadError> {
    let from = lead.status;
    let to = request.target;

    if !from.can_transition_to(to) {
        return Err(LeadError::InvalidTransition {
            id: lead.id,
            from,
            to,
        });
    }

    if to == LeadStatus::Rejected {
        if !request.confirmed {
            return Err(LeadError::ConfirmationRequired { id: lead.id });
        }
        if policy == RejectPolicy::HardDelete {
            return Ok(TransitionPlan::Delete);
        }
    }

    // Only a fresh contacted episode records the channel; re-contacts keep it.
    let outreach_method = if to == LeadStatus::Contacted && from != LeadStatus::Contacted {
        Some(request.channel.ok_or(LeadError::ChannelRequired { id: lead.id })?)
    } else {
        None
    };

    Ok(TransitionPlan::Update(StatusUpdate {
        status: to,
        last_contacted_at: now,
        outreach_method,
    }))
}
