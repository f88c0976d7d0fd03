//! Bulk processing sessions.
//!
//! A session walks the operator through leads needing the same kind of
//! action. Initial outreach and follow-up share the outreach controller and
//! differ only by mode; smart responses and contracts have their own.

pub mod coordinator;
pub mod session;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use coordinator::QueueCoordinator;
pub use session::{BulkQueue, QueueSession, QueueState};

/// What kind of work a session walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// First-touch outreach to pending leads.
    InitialOutreach,
    /// Follow-ups to contacted leads.
    FollowUp,
    /// Replies to leads who responded.
    SmartResponse,
    /// Contract generation for qualified leads.
    Contract,
}

impl SessionKind {
    /// Which controller drives this kind.
    pub fn lane(&self) -> QueueLane {
        match self {
            Self::InitialOutreach | Self::FollowUp => QueueLane::Outreach,
            Self::SmartResponse => QueueLane::SmartResponse,
            Self::Contract => QueueLane::Contract,
        }
    }

    /// Whether messages generated in this session are follow-ups.
    pub fn is_follow_up(&self) -> bool {
        matches!(self, Self::FollowUp)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InitialOutreach => "initial_outreach",
            Self::FollowUp => "follow_up",
            Self::SmartResponse => "smart_response",
            Self::Contract => "contract",
        };
        write!(f, "{s}")
    }
}

/// Independent controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueLane {
    Outreach,
    SmartResponse,
    Contract,
}

/// Outcome of a controller operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A lead is now in focus.
    Selected {
        kind: SessionKind,
        lead_id: Uuid,
        position: usize,
        total: usize,
    },
    /// The walk reached its end (or ran out of leads).
    Completed { kind: SessionKind, processed: usize },
    /// The operator left the session early.
    Exited { kind: SessionKind },
    /// Nothing changed.
    Unchanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outreach_modes_share_a_lane() {
        assert_eq!(SessionKind::InitialOutreach.lane(), SessionKind::FollowUp.lane());
        assert_ne!(SessionKind::SmartResponse.lane(), SessionKind::Contract.lane());
    }

    #[test]
    fn queue_event_serde() {
        let event = QueueEvent::Completed {
            kind: SessionKind::FollowUp,
            processed: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"completed\""));
        assert!(json.contains("\"kind\":\"follow_up\""));
    }
}
