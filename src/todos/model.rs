//! Todo data model: derived work items and the commands they carry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::SessionKind;

/// How urgent a todo is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

impl TodoPriority {
    /// Display rank: higher sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// What area of the funnel a todo belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoCategory {
    /// Leads who replied.
    Responses,
    /// Qualified leads ready for a contract.
    HotLeads,
    /// Leads awaiting first contact.
    Outreach,
    /// Contacted leads due a follow-up.
    FollowUp,
    /// Contacted leads whose status is probably stale.
    StatusUpdate,
}

/// What the caller should do when the operator picks a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TodoCommand {
    /// Start a bulk session over these leads.
    EnterQueueSession { kind: SessionKind, lead_ids: Vec<Uuid> },
    /// Open the single-lead workflow.
    OpenSingleWorkflow { kind: SessionKind, lead_id: Uuid },
    /// Show the leads whose status needs a manual update.
    ReviewStatuses { lead_ids: Vec<Uuid> },
}

impl TodoCommand {
    /// Leads the command targets.
    pub fn lead_ids(&self) -> Vec<Uuid> {
        match self {
            Self::EnterQueueSession { lead_ids, .. } | Self::ReviewStatuses { lead_ids } => {
                lead_ids.clone()
            }
            Self::OpenSingleWorkflow { lead_id, .. } => vec![*lead_id],
        }
    }
}

/// A derived, prioritized work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Stable id: a bulk tag (`bulk_responded`) or a per-lead id (`responded_<uuid>`).
    pub id: String,
    pub category: TodoCategory,
    pub priority: TodoPriority,
    pub title: String,
    pub description: String,
    /// Number of leads covered.
    pub count: usize,
    pub action: TodoCommand,
}

impl Todo {
    /// Bulk todos cover a whole bucket rather than one lead.
    pub fn is_bulk(&self) -> bool {
        self.id.starts_with("bulk_")
    }
}

/// Todos split for display: still-open first, then ones marked done today.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoBoard {
    pub pending: Vec<Todo>,
    pub completed: Vec<Todo>,
}

impl TodoBoard {
    pub fn len(&self) -> usize {
        self.pending.len() + self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.completed.is_empty()
    }

    /// Look up a todo by id in either list.
    pub fn find(&self, id: &str) -> Option<&Todo> {
        self.pending
            .iter()
            .chain(self.completed.iter())
            .find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ranks() {
        assert!(TodoPriority::High.rank() > TodoPriority::Medium.rank());
        assert!(TodoPriority::Medium.rank() > TodoPriority::Low.rank());
        assert_eq!(TodoPriority::Low.rank(), 1);
    }

    #[test]
    fn category_serde_snake_case() {
        let json = serde_json::to_string(&TodoCategory::HotLeads).unwrap();
        assert_eq!(json, "\"hot_leads\"");
        let json = serde_json::to_string(&TodoCategory::FollowUp).unwrap();
        assert_eq!(json, "\"follow_up\"");
    }

    #[test]
    fn command_serde_tagged() {
        let lead_id = Uuid::new_v4();
        let cmd = TodoCommand::OpenSingleWorkflow {
            kind: SessionKind::SmartResponse,
            lead_id,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"command\":\"open_single_workflow\""));
        assert!(json.contains("\"kind\":\"smart_response\""));

        let parsed: TodoCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.lead_ids(), vec![lead_id]);
    }

    #[test]
    fn board_find_searches_both_lists() {
        let todo = Todo {
            id: "bulk_pending".into(),
            category: TodoCategory::Outreach,
            priority: TodoPriority::Medium,
            title: "2 leads waiting for first outreach".into(),
            description: String::new(),
            count: 2,
            action: TodoCommand::ReviewStatuses { lead_ids: vec![] },
        };
        let board = TodoBoard {
            pending: vec![],
            completed: vec![todo],
        };
        assert!(board.find("bulk_pending").unwrap().is_bulk());
        assert!(board.find("missing").is_none());
        assert_eq!(board.len(), 1);
    }
}
