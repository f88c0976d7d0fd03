//! Todo derivation: turns a lead snapshot into a prioritized work list.
//!
//! Derivation is pure and always runs from scratch over the whole snapshot.
//! Buckets are evaluated in a fixed order:
//!
//! 1. responded leads (high)
//! 2. qualified leads (high)
//! 3. pending leads (medium)
//! 4. contacted, going cold at 7+ days (medium)
//! 5. contacted, 5–6 days, bulk only (medium)
//! 6. contacted, snooze just ended (high)
//! 7. contacted 3+ days, status probably stale (low, aggregate)
//!
//! A bucket with several leads yields one bulk todo; a bucket with exactly one
//! lead yields one individual todo where that bucket has an individual form.
//! Snoozed leads are invisible to buckets 4–7, and unsnoozed leads only ever
//! show up in bucket 6.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::leads::{CampaignLead, LeadStatus};
use crate::queue::SessionKind;

use super::completed::CompletedTodos;
use super::model::{Todo, TodoBoard, TodoCategory, TodoCommand, TodoPriority};

/// Day thresholds for the elapsed-time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpThresholds {
    pub stale_status_days: i64,
    pub mid_aged_days: i64,
    pub going_cold_days: i64,
}

impl Default for FollowUpThresholds {
    fn default() -> Self {
        Self {
            stale_status_days: 3,
            mid_aged_days: 5,
            going_cold_days: 7,
        }
    }
}

/// The derivation buckets, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Responded,
    Qualified,
    Pending,
    GoingCold,
    MidAged,
    Unsnoozed,
    StaleStatus,
}

impl Bucket {
    fn tag(&self) -> &'static str {
        match self {
            Self::Responded => "responded",
            Self::Qualified => "qualified",
            Self::Pending => "pending",
            Self::GoingCold => "follow_up",
            Self::MidAged => "follow_up_due",
            Self::Unsnoozed => "unsnoozed",
            Self::StaleStatus => "status_update",
        }
    }

    fn priority(&self) -> TodoPriority {
        match self {
            Self::Responded | Self::Qualified | Self::Unsnoozed => TodoPriority::High,
            Self::Pending | Self::GoingCold | Self::MidAged => TodoPriority::Medium,
            Self::StaleStatus => TodoPriority::Low,
        }
    }

    fn category(&self) -> TodoCategory {
        match self {
            Self::Responded => TodoCategory::Responses,
            Self::Qualified => TodoCategory::HotLeads,
            Self::Pending => TodoCategory::Outreach,
            Self::GoingCold | Self::MidAged | Self::Unsnoozed => TodoCategory::FollowUp,
            Self::StaleStatus => TodoCategory::StatusUpdate,
        }
    }

    fn session(&self) -> Option<SessionKind> {
        match self {
            Self::Responded => Some(SessionKind::SmartResponse),
            Self::Qualified => Some(SessionKind::Contract),
            Self::Pending => Some(SessionKind::InitialOutreach),
            Self::GoingCold | Self::MidAged | Self::Unsnoozed => Some(SessionKind::FollowUp),
            Self::StaleStatus => None,
        }
    }

    /// Buckets 5 and 7 only ever produce an aggregate.
    fn has_individual_form(&self) -> bool {
        !matches!(self, Self::MidAged | Self::StaleStatus)
    }

    /// Smallest count that produces a bulk todo.
    fn bulk_threshold(&self) -> usize {
        match self {
            Self::StaleStatus => 1,
            _ => 2,
        }
    }

    fn bulk_text(&self, n: usize) -> (String, String) {
        match self {
            Self::Responded => (
                format!("{n} leads have responded"),
                "Review their replies and send smart responses".into(),
            ),
            Self::Qualified => (
                format!("{n} qualified leads ready for contracts"),
                "Generate and send contracts while they're hot".into(),
            ),
            Self::Pending => (
                format!("{n} leads waiting for first outreach"),
                "Work through initial outreach one lead at a time".into(),
            ),
            Self::GoingCold => (
                format!("{n} leads going cold"),
                "No reply in a week or more; send a follow-up".into(),
            ),
            Self::MidAged => (
                format!("{n} leads due for a follow-up"),
                "Contacted five or six days ago".into(),
            ),
            Self::Unsnoozed => (
                format!("{n} snoozed leads are due again"),
                "Their snooze has ended; follow up now".into(),
            ),
            Self::StaleStatus => (
                format!(
                    "Update status for {n} {}",
                    if n == 1 { "lead" } else { "leads" }
                ),
                "Contacted three or more days ago; record any replies".into(),
            ),
        }
    }

    fn single_text(&self, lead: &CampaignLead, now: DateTime<Utc>) -> (String, String) {
        let name = lead.business_name();
        let days = lead.days_since_contact(now).unwrap_or(0);
        match self {
            Self::Responded => (
                format!("Reply to {name}"),
                format!("{name} responded to your outreach"),
            ),
            Self::Qualified => (
                format!("Send contract to {name}"),
                format!("{name} is qualified and ready to sign"),
            ),
            Self::Pending => (
                format!("Reach out to {name}"),
                format!("{name} hasn't been contacted yet"),
            ),
            Self::GoingCold => (
                format!("Follow up with {name}"),
                format!("Last contacted {days} days ago"),
            ),
            Self::Unsnoozed => (
                format!("Snooze ended for {name}"),
                format!("Follow up with {name} now"),
            ),
            // No individual form.
            Self::MidAged | Self::StaleStatus => self.bulk_text(1),
        }
    }
}

/// Emit the todo for one bucket, if any.
fn bucket_todo(bucket: Bucket, leads: &[&CampaignLead], now: DateTime<Utc>) -> Option<Todo> {
    let count = leads.len();
    let lead_ids: Vec<Uuid> = leads.iter().map(|l| l.id).collect();

    if count >= bucket.bulk_threshold() {
        let (title, description) = bucket.bulk_text(count);
        let action = match bucket.session() {
            Some(kind) => TodoCommand::EnterQueueSession { kind, lead_ids },
            None => TodoCommand::ReviewStatuses { lead_ids },
        };
        return Some(Todo {
            id: format!("bulk_{}", bucket.tag()),
            category: bucket.category(),
            priority: bucket.priority(),
            title,
            description,
            count,
            action,
        });
    }

    if count == 1 && bucket.has_individual_form() {
        let lead = leads[0];
        let kind = bucket.session()?;
        let (title, description) = bucket.single_text(lead, now);
        return Some(Todo {
            id: format!("{}_{}", bucket.tag(), lead.id),
            category: bucket.category(),
            priority: bucket.priority(),
            title,
            description,
            count: 1,
            action: TodoCommand::OpenSingleWorkflow {
                kind,
                lead_id: lead.id,
            },
        });
    }

    None
}

/// Derive the todo list for a snapshot at `now`.
pub fn derive_todos(
    leads: &[CampaignLead],
    now: DateTime<Utc>,
    thresholds: &FollowUpThresholds,
) -> Vec<Todo> {
    let with_status =
        |status: LeadStatus| -> Vec<&CampaignLead> { leads.iter().filter(|l| l.status == status).collect() };

    let responded = with_status(LeadStatus::Responded);
    let qualified = with_status(LeadStatus::Qualified);
    let pending = with_status(LeadStatus::Pending);

    let contacted = with_status(LeadStatus::Contacted);

    let unsnoozed: Vec<&CampaignLead> = contacted
        .iter()
        .copied()
        .filter(|l| l.is_unsnoozed(now))
        .collect();
    let unsnoozed_ids: HashSet<Uuid> = unsnoozed.iter().map(|l| l.id).collect();

    // Elapsed-time view: never snoozed, never already counted as unsnoozed.
    let aged: Vec<(&CampaignLead, i64)> = contacted
        .iter()
        .copied()
        .filter(|l| l.next_follow_up_date.is_none() && !unsnoozed_ids.contains(&l.id))
        .filter_map(|l| l.days_since_contact(now).map(|d| (l, d)))
        .collect();

    let going_cold: Vec<&CampaignLead> = aged
        .iter()
        .filter(|(_, d)| *d >= thresholds.going_cold_days)
        .map(|(l, _)| *l)
        .collect();
    let going_cold_ids: HashSet<Uuid> = going_cold.iter().map(|l| l.id).collect();

    let mid_aged: Vec<&CampaignLead> = aged
        .iter()
        .filter(|(l, d)| {
            *d >= thresholds.mid_aged_days
                && *d < thresholds.going_cold_days
                && !going_cold_ids.contains(&l.id)
        })
        .map(|(l, _)| *l)
        .collect();

    let stale: Vec<&CampaignLead> = aged
        .iter()
        .filter(|(_, d)| *d >= thresholds.stale_status_days)
        .map(|(l, _)| *l)
        .collect();

    debug!(
        responded = responded.len(),
        qualified = qualified.len(),
        pending = pending.len(),
        going_cold = going_cold.len(),
        mid_aged = mid_aged.len(),
        unsnoozed = unsnoozed.len(),
        stale = stale.len(),
        "Derived todo buckets"
    );

    [
        (Bucket::Responded, responded),
        (Bucket::Qualified, qualified),
        (Bucket::Pending, pending),
        (Bucket::GoingCold, going_cold),
        (Bucket::MidAged, mid_aged),
        (Bucket::Unsnoozed, unsnoozed),
        (Bucket::StaleStatus, stale),
    ]
    .into_iter()
    .filter_map(|(bucket, members)| bucket_todo(bucket, &members, now))
    .collect()
}

/// Split todos into open and completed-today, each sorted by priority.
///
/// Completed todos are hidden from the open list but kept so the operator can
/// see what was already handled. Equal priorities keep derivation order.
pub fn arrange(todos: Vec<Todo>, completed: &CompletedTodos) -> TodoBoard {
    let (mut done, mut open): (Vec<Todo>, Vec<Todo>) =
        todos.into_iter().partition(|t| completed.contains(&t.id));

    open.sort_by_key(|t| std::cmp::Reverse(t.priority.rank()));
    done.sort_by_key(|t| std::cmp::Reverse(t.priority.rank()));

    TodoBoard {
        pending: open,
        completed: done,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::leads::{Lead, OutreachMethod};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-20T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn lead(name: &str, status: LeadStatus) -> CampaignLead {
        CampaignLead::new(Uuid::nil(), Lead::new(name), now() - Duration::days(30)).with_status(status)
    }

    fn contacted(name: &str, days_ago: i64) -> CampaignLead {
        CampaignLead::new(Uuid::nil(), Lead::new(name), now() - Duration::days(30))
            .contacted_at(now() - Duration::days(days_ago), OutreachMethod::Email)
    }

    fn derive(leads: &[CampaignLead]) -> Vec<Todo> {
        derive_todos(leads, now(), &FollowUpThresholds::default())
    }

    fn ids(todos: &[Todo]) -> Vec<&str> {
        todos.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn empty_snapshot_yields_nothing() {
        assert!(derive(&[]).is_empty());
    }

    #[test]
    fn single_going_cold_lead() {
        let cl = contacted("Harbor Bakery", 8);
        let todos = derive(&[cl.clone()]);

        // 8 days old also lands in the 3-day status reminder.
        let follow_up: Vec<_> = todos
            .iter()
            .filter(|t| t.category == TodoCategory::FollowUp)
            .collect();
        assert_eq!(follow_up.len(), 1);
        let todo = follow_up[0];
        assert_eq!(todo.priority, TodoPriority::Medium);
        assert_eq!(todo.count, 1);
        assert_eq!(todo.title, "Follow up with Harbor Bakery");
        assert_eq!(todo.id, format!("follow_up_{}", cl.id));
        assert_eq!(
            todo.action,
            TodoCommand::OpenSingleWorkflow {
                kind: SessionKind::FollowUp,
                lead_id: cl.id
            }
        );
    }

    #[test]
    fn two_qualified_leads_make_one_bulk_todo() {
        let leads = [lead("A", LeadStatus::Qualified), lead("B", LeadStatus::Qualified)];
        let todos = derive(&leads);
        assert_eq!(todos.len(), 1);
        let todo = &todos[0];
        assert_eq!(todo.id, "bulk_qualified");
        assert_eq!(todo.priority, TodoPriority::High);
        assert_eq!(todo.category, TodoCategory::HotLeads);
        assert_eq!(todo.count, 2);
        assert!(todos.iter().all(|t| !t.id.starts_with("qualified_")));
        assert!(matches!(
            &todo.action,
            TodoCommand::EnterQueueSession { kind: SessionKind::Contract, lead_ids } if lead_ids.len() == 2
        ));
    }

    #[test]
    fn bulk_and_individual_are_exclusive() {
        for status in [LeadStatus::Responded, LeadStatus::Qualified, LeadStatus::Pending] {
            let one = derive(&[lead("Solo", status)]);
            assert_eq!(one.len(), 1);
            assert!(!one[0].is_bulk(), "{status}: single lead should be individual");

            let three = derive(&[lead("A", status), lead("B", status), lead("C", status)]);
            assert_eq!(three.len(), 1);
            assert!(three[0].is_bulk(), "{status}: several leads should be bulk");
            assert_eq!(three[0].count, 3);
        }
    }

    #[test]
    fn bucket_priorities() {
        let todos = derive(&[
            lead("R", LeadStatus::Responded),
            lead("Q", LeadStatus::Qualified),
            lead("P", LeadStatus::Pending),
        ]);
        let priorities: Vec<_> = todos.iter().map(|t| t.priority).collect();
        assert_eq!(
            priorities,
            vec![TodoPriority::High, TodoPriority::High, TodoPriority::Medium]
        );
        assert_eq!(todos[0].category, TodoCategory::Responses);
        assert_eq!(todos[2].category, TodoCategory::Outreach);
    }

    #[test]
    fn snoozed_lead_hidden_from_elapsed_buckets() {
        let cl = contacted("Sleepy Co", 30).snoozed_until(now() + Duration::milliseconds(1));
        assert!(derive(&[cl]).is_empty());
    }

    #[test]
    fn unsnoozed_lead_appears_once() {
        let cl = contacted("Wakeful Co", 30).snoozed_until(now() - Duration::seconds(1));
        let todos = derive(&[cl.clone()]);
        assert_eq!(ids(&todos), vec![format!("unsnoozed_{}", cl.id).as_str()]);
        assert_eq!(todos[0].priority, TodoPriority::High);
        assert_eq!(todos[0].category, TodoCategory::FollowUp);
    }

    #[test]
    fn several_unsnoozed_make_bulk() {
        let past = now() - Duration::hours(1);
        let todos = derive(&[
            contacted("A", 10).snoozed_until(past),
            contacted("B", 1).snoozed_until(past),
        ]);
        assert_eq!(ids(&todos), vec!["bulk_unsnoozed"]);
        assert_eq!(todos[0].count, 2);
    }

    #[test]
    fn mid_aged_only_in_bulk() {
        let single = derive(&[contacted("Five", 5)]);
        // Only the low-priority status reminder.
        assert_eq!(ids(&single), vec!["bulk_status_update"]);

        let pair = derive(&[contacted("Five", 5), contacted("Six", 6)]);
        assert_eq!(ids(&pair), vec!["bulk_follow_up_due", "bulk_status_update"]);
        assert_eq!(pair[0].count, 2);
        assert_eq!(pair[0].priority, TodoPriority::Medium);
    }

    #[test]
    fn mid_aged_excludes_going_cold() {
        let todos = derive(&[
            contacted("Seven", 7),
            contacted("Nine", 9),
            contacted("Five", 5),
        ]);
        let bulk_cold = todos.iter().find(|t| t.id == "bulk_follow_up").unwrap();
        assert_eq!(bulk_cold.count, 2);
        // One mid-aged lead left over: no bucket-5 todo.
        assert!(todos.iter().all(|t| t.id != "bulk_follow_up_due"));
        let stale = todos.iter().find(|t| t.id == "bulk_status_update").unwrap();
        assert_eq!(stale.count, 3);
    }

    #[test]
    fn stale_status_threshold() {
        assert!(derive(&[contacted("Two", 2)]).is_empty());
        let todos = derive(&[contacted("Three", 3)]);
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].priority, TodoPriority::Low);
        assert_eq!(todos[0].title, "Update status for 1 lead");
        assert!(matches!(todos[0].action, TodoCommand::ReviewStatuses { .. }));
    }

    #[test]
    fn unsnoozed_excluded_from_stale_reminder() {
        let todos = derive(&[
            contacted("Woke", 12).snoozed_until(now() - Duration::days(1)),
            contacted("Plain", 4),
        ]);
        let stale = todos.iter().find(|t| t.id == "bulk_status_update").unwrap();
        assert_eq!(stale.count, 1);
    }

    #[test]
    fn contacted_without_timestamp_is_ignored() {
        let mut cl = contacted("Ghost", 10);
        cl.last_contacted_at = None;
        assert!(derive(&[cl]).is_empty());
    }

    #[test]
    fn terminal_leads_produce_nothing() {
        assert!(derive(&[lead("S", LeadStatus::Signed), lead("X", LeadStatus::Rejected)]).is_empty());
    }

    #[test]
    fn custom_thresholds() {
        let thresholds = FollowUpThresholds {
            stale_status_days: 10,
            mid_aged_days: 10,
            going_cold_days: 14,
        };
        assert!(derive_todos(&[contacted("Eight", 8)], now(), &thresholds).is_empty());
    }

    #[test]
    fn arrange_sorts_and_splits() {
        let todos = derive(&[
            contacted("Stale", 4),
            lead("P", LeadStatus::Pending),
            lead("R", LeadStatus::Responded),
        ]);
        let today = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
        let mut completed = CompletedTodos::new(today);
        let responded_id = todos
            .iter()
            .find(|t| t.category == TodoCategory::Responses)
            .unwrap()
            .id
            .clone();
        completed.mark(&responded_id);

        let board = arrange(todos, &completed);
        let open: Vec<_> = board.pending.iter().map(|t| t.priority).collect();
        assert_eq!(open, vec![TodoPriority::Medium, TodoPriority::Low]);
        assert_eq!(board.completed.len(), 1);
        assert_eq!(board.completed[0].id, responded_id);
    }
}
