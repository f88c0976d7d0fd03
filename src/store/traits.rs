//! Unified `Database` trait: single async interface for all persistence.
//!
//! Covers campaigns and their leads, durable generation usage, and the
//! per-operator completed-todo set.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::{Campaign, CampaignLead, OutreachMethod, StatusUpdate};
use crate::todos::CompletedTodos;
use crate::usage::UsageRecord;

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Campaigns ───────────────────────────────────────────────────

    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), DatabaseError>;

    /// Campaigns owned by an operator, oldest first.
    async fn list_campaigns(&self, owner_id: &str) -> Result<Vec<Campaign>, DatabaseError>;

    // ── Campaign leads ──────────────────────────────────────────────

    /// Insert a lead into its campaign. The campaign must exist.
    async fn insert_campaign_lead(&self, lead: &CampaignLead) -> Result<(), DatabaseError>;

    async fn get_campaign_lead(&self, id: Uuid) -> Result<Option<CampaignLead>, DatabaseError>;

    /// Every lead across the operator's campaigns, in the order they were added.
    async fn list_campaign_leads(&self, owner_id: &str) -> Result<Vec<CampaignLead>, DatabaseError>;

    /// Write a status transition. Also clears the snooze marker.
    ///
    /// Fails with `NotFound` when the row no longer exists.
    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), DatabaseError>;

    /// Fails with `NotFound` when the row no longer exists.
    async fn delete_campaign_lead(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Set or clear the snooze marker. Fails with `NotFound` on a missing row.
    async fn update_snooze(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    // ── Usage ───────────────────────────────────────────────────────

    /// Durably record a confirmed generation.
    async fn record_generation(&self, record: &UsageRecord) -> Result<(), DatabaseError>;

    /// Generations strictly after `since`, oldest first.
    async fn generations_since(
        &self,
        operator_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, DatabaseError>;

    /// Generations counted against a local calendar day, oldest first.
    async fn generations_on_day(
        &self,
        operator_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<UsageRecord>, DatabaseError>;

    /// Whether the lead already had a message generated on `channel` that day.
    async fn lead_channel_used(
        &self,
        lead_id: Uuid,
        channel: OutreachMethod,
        day: NaiveDate,
    ) -> Result<bool, DatabaseError>;

    // ── Completed todos ─────────────────────────────────────────────

    async fn load_completed_todos(
        &self,
        operator_id: &str,
    ) -> Result<Option<CompletedTodos>, DatabaseError>;

    async fn save_completed_todos(
        &self,
        operator_id: &str,
        completed: &CompletedTodos,
    ) -> Result<(), DatabaseError>;
}
