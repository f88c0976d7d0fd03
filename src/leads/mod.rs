//! Leads: data model, quality scoring, status transitions and snoozing.

pub mod model;
pub mod score;
pub mod snooze;
pub mod transition;

pub use model::{Campaign, CampaignLead, Lead, LeadStatus, OutreachMethod};
pub use score::{LeadScore, ScoreBreakdown, ScoreTier, score};
pub use snooze::{SnoozeState, snooze_state, snooze_until};
pub use transition::{RejectPolicy, StatusUpdate, TransitionPlan, TransitionRequest, plan_transition};
