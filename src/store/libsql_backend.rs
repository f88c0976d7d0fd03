//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases over libsql's native async API.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::{Campaign, CampaignLead, Lead, LeadStatus, OutreachMethod, StatusUpdate};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::todos::CompletedTodos;
use crate::usage::UsageRecord;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed-width so text comparison orders correctly.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_day(s: &str) -> Result<NaiveDate, DatabaseError> {
    s.parse()
        .map_err(|e| DatabaseError::Serialization(format!("bad local day {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s:?}: {e}")))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Primary result code, with extended bits masked off.
fn is_contention(code: i32) -> bool {
    matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)
}

/// Classify a libsql failure.
///
/// Transport failures and lock contention map to `Connection` so callers
/// retry them; constraint violations get their own variant.
fn query_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    match &e {
        libsql::Error::ConnectionFailed(_)
        | libsql::Error::Hrana(_)
        | libsql::Error::WriteDelegation(_)
        | libsql::Error::Replication(_)
        | libsql::Error::Sync(_) => DatabaseError::Connection(format!("{op}: {message}")),
        libsql::Error::SqliteFailure(code, _) | libsql::Error::RemoteSqliteFailure(code, _, _)
            if is_contention(*code) =>
        {
            DatabaseError::Connection(format!("{op}: {message}"))
        }
        _ if message.contains("constraint failed") => {
            DatabaseError::Constraint(format!("{op}: {message}"))
        }
        _ => DatabaseError::Query(format!("{op}: {message}")),
    }
}

fn not_found(id: Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "campaign_lead".into(),
        id: id.to_string(),
    }
}

const CAMPAIGN_COLUMNS: &str = "id, owner_id, name, created_at";

const LEAD_COLUMNS: &str = "cl.id, cl.campaign_id, cl.lead, cl.status, cl.last_contacted_at, cl.next_follow_up_date, cl.outreach_method, cl.added_at";

const USAGE_COLUMNS: &str = "id, operator_id, lead_id, channel, created_at, local_day";

fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("campaign row: {e}"));
    let id: String = row.get(0).map_err(get)?;
    let created_str: String = row.get(3).map_err(get)?;
    Ok(Campaign {
        id: parse_uuid(&id)?,
        owner_id: row.get(1).map_err(get)?,
        name: row.get(2).map_err(get)?,
        created_at: parse_datetime(&created_str),
    })
}

/// Map a row to a CampaignLead. Column order matches LEAD_COLUMNS.
fn row_to_campaign_lead(row: &libsql::Row) -> Result<CampaignLead, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("campaign_lead row: {e}"));
    let id: String = row.get(0).map_err(get)?;
    let campaign_id: String = row.get(1).map_err(get)?;
    let lead_json: String = row.get(2).map_err(get)?;
    let status_str: String = row.get(3).map_err(get)?;
    let last_contacted: Option<String> = row.get(4).ok();
    let follow_up: Option<String> = row.get(5).ok();
    let method: Option<String> = row.get(6).ok();
    let added_str: String = row.get(7).map_err(get)?;

    let lead: Lead = serde_json::from_str(&lead_json)
        .map_err(|e| DatabaseError::Serialization(format!("lead payload: {e}")))?;
    let status: LeadStatus = status_str
        .parse()
        .map_err(DatabaseError::Serialization)?;
    let outreach_method = method
        .map(|m| m.parse::<OutreachMethod>())
        .transpose()
        .map_err(DatabaseError::Serialization)?;

    Ok(CampaignLead {
        id: parse_uuid(&id)?,
        campaign_id: parse_uuid(&campaign_id)?,
        lead,
        status,
        last_contacted_at: parse_optional_datetime(&last_contacted),
        next_follow_up_date: parse_optional_datetime(&follow_up),
        outreach_method,
        added_at: parse_datetime(&added_str),
    })
}

fn row_to_usage(row: &libsql::Row) -> Result<UsageRecord, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("usage row: {e}"));
    let id: String = row.get(0).map_err(get)?;
    let lead_id: String = row.get(2).map_err(get)?;
    let channel: String = row.get(3).map_err(get)?;
    let created_str: String = row.get(4).map_err(get)?;
    let day_str: String = row.get(5).map_err(get)?;
    Ok(UsageRecord {
        id: parse_uuid(&id)?,
        operator_id: row.get(1).map_err(get)?,
        lead_id: parse_uuid(&lead_id)?,
        channel: channel.parse().map_err(DatabaseError::Serialization)?,
        created_at: parse_datetime(&created_str),
        local_day: parse_day(&day_str)?,
    })
}

impl LibSqlBackend {
    async fn query_usage(
        &self,
        op: &str,
        sql: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Vec<UsageRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| query_error(op, e))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| query_error(op, e))? {
            records.push(row_to_usage(&row)?);
        }
        Ok(records)
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::init_schema(self.conn()).await
    }

    // ── Campaigns ───────────────────────────────────────────────────

    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO campaigns (id, owner_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    campaign.id.to_string(),
                    campaign.owner_id.as_str(),
                    campaign.name.as_str(),
                    timestamp(&campaign.created_at),
                ],
            )
            .await
            .map_err(|e| query_error("create_campaign", e))?;

        debug!(campaign_id = %campaign.id, owner = %campaign.owner_id, "Campaign created");
        Ok(())
    }

    async fn list_campaigns(&self, owner_id: &str) -> Result<Vec<Campaign>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE owner_id = ?1 ORDER BY created_at ASC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| query_error("list_campaigns", e))?;

        let mut campaigns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| query_error("list_campaigns", e))?
        {
            campaigns.push(row_to_campaign(&row)?);
        }
        Ok(campaigns)
    }

    // ── Campaign leads ──────────────────────────────────────────────

    async fn insert_campaign_lead(&self, lead: &CampaignLead) -> Result<(), DatabaseError> {
        let lead_json = serde_json::to_string(&lead.lead)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO campaign_leads (id, campaign_id, lead, business_name, status, last_contacted_at, next_follow_up_date, outreach_method, added_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    lead.id.to_string(),
                    lead.campaign_id.to_string(),
                    lead_json,
                    lead.business_name(),
                    lead.status.as_str(),
                    opt_text(lead.last_contacted_at.as_ref().map(timestamp)),
                    opt_text(lead.next_follow_up_date.as_ref().map(timestamp)),
                    opt_text(lead.outreach_method.map(|m| m.as_str().to_string())),
                    timestamp(&lead.added_at),
                    timestamp(&Utc::now()),
                ],
            )
            .await
            .map_err(|e| query_error("insert_campaign_lead", e))?;

        debug!(lead_id = %lead.id, campaign_id = %lead.campaign_id, "Campaign lead inserted");
        Ok(())
    }

    async fn get_campaign_lead(&self, id: Uuid) -> Result<Option<CampaignLead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM campaign_leads cl WHERE cl.id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| query_error("get_campaign_lead", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_campaign_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(query_error("get_campaign_lead", e)),
        }
    }

    async fn list_campaign_leads(&self, owner_id: &str) -> Result<Vec<CampaignLead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM campaign_leads cl
                     JOIN campaigns c ON c.id = cl.campaign_id
                     WHERE c.owner_id = ?1
                     ORDER BY cl.added_at ASC, cl.rowid ASC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| query_error("list_campaign_leads", e))?;

        let mut leads = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| query_error("list_campaign_leads", e))?
        {
            match row_to_campaign_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!("Skipping campaign lead row: {e}"),
            }
        }
        Ok(leads)
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), DatabaseError> {
        // COALESCE keeps the existing channel when the update doesn't set one.
        let count = self
            .conn()
            .execute(
                "UPDATE campaign_leads
                 SET status = ?1, last_contacted_at = ?2,
                     outreach_method = COALESCE(?3, outreach_method),
                     next_follow_up_date = NULL, updated_at = ?4
                 WHERE id = ?5",
                params![
                    update.status.as_str(),
                    timestamp(&update.last_contacted_at),
                    opt_text(update.outreach_method.map(|m| m.as_str().to_string())),
                    timestamp(&Utc::now()),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| query_error("update_status", e))?;

        if count == 0 {
            return Err(not_found(id));
        }
        debug!(lead_id = %id, status = %update.status, "Campaign lead status updated");
        Ok(())
    }

    async fn delete_campaign_lead(&self, id: Uuid) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM campaign_leads WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| query_error("delete_campaign_lead", e))?;

        if count == 0 {
            return Err(not_found(id));
        }
        debug!(lead_id = %id, "Campaign lead deleted");
        Ok(())
    }

    async fn update_snooze(
        &self,
        id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE campaign_leads SET next_follow_up_date = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    opt_text(until.as_ref().map(timestamp)),
                    timestamp(&Utc::now()),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| query_error("update_snooze", e))?;

        if count == 0 {
            return Err(not_found(id));
        }
        debug!(lead_id = %id, until = ?until, "Campaign lead snooze updated");
        Ok(())
    }

    // ── Usage ───────────────────────────────────────────────────────

    async fn record_generation(&self, record: &UsageRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO usage_records ({USAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    record.id.to_string(),
                    record.operator_id.as_str(),
                    record.lead_id.to_string(),
                    record.channel.as_str(),
                    timestamp(&record.created_at),
                    record.local_day.to_string(),
                ],
            )
            .await
            .map_err(|e| query_error("record_generation", e))?;

        debug!(
            operator = %record.operator_id,
            lead_id = %record.lead_id,
            channel = %record.channel,
            "Generation recorded"
        );
        Ok(())
    }

    async fn generations_since(
        &self,
        operator_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, DatabaseError> {
        self.query_usage(
            "generations_since",
            &format!(
                "SELECT {USAGE_COLUMNS} FROM usage_records
                 WHERE operator_id = ?1 AND created_at > ?2
                 ORDER BY created_at ASC"
            ),
            params![operator_id, timestamp(&since)],
        )
        .await
    }

    async fn generations_on_day(
        &self,
        operator_id: &str,
        day: NaiveDate,
    ) -> Result<Vec<UsageRecord>, DatabaseError> {
        self.query_usage(
            "generations_on_day",
            &format!(
                "SELECT {USAGE_COLUMNS} FROM usage_records
                 WHERE operator_id = ?1 AND local_day = ?2
                 ORDER BY created_at ASC"
            ),
            params![operator_id, day.to_string()],
        )
        .await
    }

    async fn lead_channel_used(
        &self,
        lead_id: Uuid,
        channel: OutreachMethod,
        day: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM usage_records WHERE lead_id = ?1 AND channel = ?2 AND local_day = ?3",
                params![lead_id.to_string(), channel.as_str(), day.to_string()],
            )
            .await
            .map_err(|e| query_error("lead_channel_used", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(query_error("lead_channel_used", e)),
        }
    }

    // ── Completed todos ─────────────────────────────────────────────

    async fn load_completed_todos(
        &self,
        operator_id: &str,
    ) -> Result<Option<CompletedTodos>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT day, ids FROM completed_todos WHERE operator_id = ?1",
                params![operator_id],
            )
            .await
            .map_err(|e| query_error("load_completed_todos", e))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(query_error("load_completed_todos", e)),
        };

        let day_str: String = row
            .get(0)
            .map_err(|e| query_error("load_completed_todos", e))?;
        let ids_json: String = row
            .get(1)
            .map_err(|e| query_error("load_completed_todos", e))?;
        let ids: BTreeSet<String> = serde_json::from_str(&ids_json)
            .map_err(|e| DatabaseError::Serialization(format!("completed todo ids: {e}")))?;

        Ok(Some(CompletedTodos {
            day: parse_day(&day_str)?,
            ids,
        }))
    }

    async fn save_completed_todos(
        &self,
        operator_id: &str,
        completed: &CompletedTodos,
    ) -> Result<(), DatabaseError> {
        let ids_json = serde_json::to_string(&completed.ids)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO completed_todos (operator_id, day, ids, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (operator_id) DO UPDATE
                 SET day = excluded.day, ids = excluded.ids, updated_at = excluded.updated_at",
                params![
                    operator_id,
                    completed.day.to_string(),
                    ids_json,
                    timestamp(&Utc::now()),
                ],
            )
            .await
            .map_err(|e| query_error("save_completed_todos", e))?;

        debug!(operator = %operator_id, count = completed.len(), "Completed todos saved");
        Ok(())
    }
}
