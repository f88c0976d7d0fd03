//! Outreach engine: one operator's pipeline, wired together.
//!
//! Owns the lead snapshot, the queue coordinator and the completed-todo set,
//! and broadcasts every state change so UIs can follow along. Mutations go
//! through the store first; the snapshot and todos only change after a
//! write has committed.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{DatabaseError, GenerationError, LeadError, Result};
use crate::generation::{GeneratedMessage, MessageGenerator, RetryPolicy, with_retry};
use crate::leads::{
    Campaign, CampaignLead, LeadStatus, OutreachMethod, RejectPolicy, TransitionPlan,
    TransitionRequest, plan_transition, snooze_until,
};
use crate::leads::score::sort_by_score;
use crate::queue::{QueueCoordinator, QueueEvent, SessionKind};
use crate::snapshot::CampaignSnapshot;
use crate::store::Database;
use crate::todos::{
    CompletedTodos, FollowUpThresholds, TodoBoard, TodoCommand, arrange, derive_todos,
};
use crate::usage::{UsageLimiter, UsageSummary};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Something observers may want to re-render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The todo list was re-derived.
    TodosChanged { pending: usize, completed: usize },
    LeadUpdated { lead: CampaignLead },
    LeadRemoved { lead_id: Uuid },
    /// A queue session moved.
    Session { event: QueueEvent },
    /// A generation was confirmed and counted.
    UsageRecorded {
        lead_id: Uuid,
        channel: OutreachMethod,
    },
}

/// What a committed transition left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Updated(CampaignLead),
    Deleted(Uuid),
}

/// Collaborators the engine is built from.
pub struct EngineDeps {
    pub db: Arc<dyn Database>,
    pub clock: Arc<dyn Clock>,
    pub generator: Option<Arc<dyn MessageGenerator>>,
}

pub struct OutreachEngine {
    operator_id: String,
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    generator: Option<Arc<dyn MessageGenerator>>,
    limiter: UsageLimiter,
    reject_policy: RejectPolicy,
    retry: RetryPolicy,
    thresholds: FollowUpThresholds,
    snapshot: RwLock<Vec<CampaignLead>>,
    queues: RwLock<QueueCoordinator>,
    completed: RwLock<CompletedTodos>,
    tx: broadcast::Sender<EngineEvent>,
}

impl OutreachEngine {
    /// Build the engine and load the operator's leads and completed todos.
    pub async fn new(config: &EngineConfig, deps: EngineDeps) -> Result<Arc<Self>> {
        let EngineDeps {
            db,
            clock,
            generator,
        } = deps;

        let today = clock.today();
        let stored = with_retry(&config.retry, "load_completed_todos", || {
            db.load_completed_todos(&config.operator_id)
        })
        .await?;
        let mut completed = stored.unwrap_or_else(|| CompletedTodos::new(today));
        completed.roll_over(today);

        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        let engine = Arc::new(Self {
            operator_id: config.operator_id.clone(),
            limiter: UsageLimiter::new(db.clone(), clock.clone(), config.usage),
            db,
            clock,
            generator,
            reject_policy: config.reject_policy,
            retry: config.retry,
            thresholds: config.thresholds,
            snapshot: RwLock::new(Vec::new()),
            queues: RwLock::new(QueueCoordinator::new()),
            completed: RwLock::new(completed),
            tx,
        });

        engine.refresh().await?;
        info!(
            operator = %engine.operator_id,
            leads = engine.snapshot.read().await.len(),
            "Outreach engine ready"
        );
        Ok(engine)
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn operator_id(&self) -> &str {
        &self.operator_id
    }

    pub fn limiter(&self) -> &UsageLimiter {
        &self.limiter
    }

    fn emit(&self, event: EngineEvent) {
        // Ok if nobody is listening.
        let _ = self.tx.send(event);
    }

    fn emit_session(&self, event: QueueEvent) {
        if event != QueueEvent::Unchanged {
            self.emit(EngineEvent::Session { event });
        }
    }

    // ── Snapshot ────────────────────────────────────────────────────

    /// Reload the operator's leads from the store and re-derive todos.
    pub async fn refresh(&self) -> Result<()> {
        let leads = with_retry(&self.retry, "list_campaign_leads", || {
            self.db.list_campaign_leads(&self.operator_id)
        })
        .await?;
        debug!(operator = %self.operator_id, count = leads.len(), "Snapshot refreshed");
        *self.snapshot.write().await = leads;
        self.emit_todos().await;
        Ok(())
    }

    /// Current snapshot, best prospects first.
    pub async fn leads(&self) -> Vec<CampaignLead> {
        let mut leads = self.snapshot.read().await.clone();
        sort_by_score(&mut leads);
        leads
    }

    pub async fn lead(&self, lead_id: Uuid) -> Option<CampaignLead> {
        self.snapshot
            .read()
            .await
            .iter()
            .find(|l| l.id == lead_id)
            .cloned()
    }

    /// Create a campaign from a snapshot and load it.
    pub async fn import(&self, snapshot: CampaignSnapshot) -> Result<(Campaign, usize)> {
        let (campaign, leads) = snapshot.into_records(&self.operator_id, self.clock.now());
        self.db.create_campaign(&campaign).await?;
        for lead in &leads {
            self.db.insert_campaign_lead(lead).await?;
        }
        info!(campaign_id = %campaign.id, name = %campaign.name, leads = leads.len(), "Campaign imported");
        self.refresh().await?;
        Ok((campaign, leads.len()))
    }

    /// Resolve a lead, reloading from the store if the snapshot is stale.
    async fn resolve(&self, lead_id: Uuid) -> Result<CampaignLead> {
        if let Some(lead) = self.lead(lead_id).await {
            return Ok(lead);
        }
        let fetched = with_retry(&self.retry, "get_campaign_lead", || {
            self.db.get_campaign_lead(lead_id)
        })
        .await?;
        match fetched {
            Some(lead) => {
                self.snapshot.write().await.push(lead.clone());
                Ok(lead)
            }
            None => {
                self.forget(lead_id).await;
                Err(LeadError::NotFound { id: lead_id }.into())
            }
        }
    }

    /// Drop a lead that no longer exists from the snapshot and every queue.
    async fn forget(&self, lead_id: Uuid) {
        self.snapshot.write().await.retain(|l| l.id != lead_id);
        let event = self.queues.write().await.remove_lead(lead_id);
        self.emit_session(event);
        self.emit(EngineEvent::LeadRemoved { lead_id });
        self.emit_todos().await;
    }

    /// Map a store `NotFound` to a lead race; anything else passes through.
    async fn recover_missing(&self, lead_id: Uuid, err: DatabaseError) -> crate::error::Error {
        if matches!(err, DatabaseError::NotFound { .. }) {
            warn!(lead_id = %lead_id, "Lead vanished underneath the engine, dropping it");
            self.forget(lead_id).await;
            LeadError::NotFound { id: lead_id }.into()
        } else {
            err.into()
        }
    }

    async fn replace(&self, updated: &CampaignLead) {
        let mut snapshot = self.snapshot.write().await;
        match snapshot.iter_mut().find(|l| l.id == updated.id) {
            Some(slot) => *slot = updated.clone(),
            None => snapshot.push(updated.clone()),
        }
    }

    // ── Transitions and snooze ──────────────────────────────────────

    /// Move a lead to a new status.
    ///
    /// Nothing changes unless the transition is legal, confirmed where needed
    /// and committed to the store. A rejected lead also leaves every queue.
    pub async fn transition(
        &self,
        lead_id: Uuid,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome> {
        let lead = self.resolve(lead_id).await?;
        let now = self.clock.now();
        let plan = plan_transition(&lead, &request, self.reject_policy, now)?;

        let outcome = match plan {
            TransitionPlan::Update(update) => {
                if let Err(e) = with_retry(&self.retry, "update_status", || {
                    self.db.update_status(lead_id, &update)
                })
                .await
                {
                    return Err(self.recover_missing(lead_id, e).await);
                }
                let mut updated = lead.clone();
                update.apply(&mut updated);
                self.replace(&updated).await;
                info!(lead_id = %lead_id, from = %lead.status, to = %updated.status, "Lead transitioned");
                self.emit(EngineEvent::LeadUpdated {
                    lead: updated.clone(),
                });
                TransitionOutcome::Updated(updated)
            }
            TransitionPlan::Delete => {
                if let Err(e) = with_retry(&self.retry, "delete_campaign_lead", || {
                    self.db.delete_campaign_lead(lead_id)
                })
                .await
                {
                    return Err(self.recover_missing(lead_id, e).await);
                }
                self.snapshot.write().await.retain(|l| l.id != lead_id);
                info!(lead_id = %lead_id, from = %lead.status, "Rejected lead deleted");
                self.emit(EngineEvent::LeadRemoved { lead_id });
                TransitionOutcome::Deleted(lead_id)
            }
        };

        if request.target == LeadStatus::Rejected {
            let event = self.queues.write().await.remove_lead(lead_id);
            self.emit_session(event);
        }
        self.emit_todos().await;
        Ok(outcome)
    }

    /// Suppress follow-up reminders for `days`. Also drops the lead from any
    /// active session.
    pub async fn snooze(&self, lead_id: Uuid, days: u32) -> Result<CampaignLead> {
        let until = snooze_until(self.clock.now(), days)?;
        let mut lead = self.resolve(lead_id).await?;

        if let Err(e) = with_retry(&self.retry, "update_snooze", || {
            self.db.update_snooze(lead_id, Some(until))
        })
        .await
        {
            return Err(self.recover_missing(lead_id, e).await);
        }

        lead.next_follow_up_date = Some(until);
        self.replace(&lead).await;
        info!(lead_id = %lead_id, days, until = %until, "Lead snoozed");

        let event = self.queues.write().await.remove_lead(lead_id);
        self.emit_session(event);
        self.emit(EngineEvent::LeadUpdated { lead: lead.clone() });
        self.emit_todos().await;
        Ok(lead)
    }

    /// Remove the snooze marker.
    pub async fn clear_snooze(&self, lead_id: Uuid) -> Result<CampaignLead> {
        let mut lead = self.resolve(lead_id).await?;

        if let Err(e) = with_retry(&self.retry, "update_snooze", || {
            self.db.update_snooze(lead_id, None)
        })
        .await
        {
            return Err(self.recover_missing(lead_id, e).await);
        }

        lead.next_follow_up_date = None;
        self.replace(&lead).await;
        info!(lead_id = %lead_id, "Lead snooze cleared");
        self.emit(EngineEvent::LeadUpdated { lead: lead.clone() });
        self.emit_todos().await;
        Ok(lead)
    }

    // ── Todos ───────────────────────────────────────────────────────

    /// Derive todos from the current snapshot, split by completion.
    pub async fn todos(&self) -> TodoBoard {
        let now = self.clock.now();
        let today = self.clock.local_date(now);
        let completed = {
            let mut completed = self.completed.write().await;
            completed.roll_over(today);
            completed.clone()
        };
        let todos = {
            let snapshot = self.snapshot.read().await;
            derive_todos(&snapshot, now, &self.thresholds)
        };
        arrange(todos, &completed)
    }

    async fn emit_todos(&self) {
        let board = self.todos().await;
        self.emit(EngineEvent::TodosChanged {
            pending: board.pending.len(),
            completed: board.completed.len(),
        });
    }

    /// Mark a todo done for today. Returns false if it already was.
    pub async fn complete_todo(&self, todo_id: &str) -> Result<bool> {
        self.set_completed(todo_id, true).await
    }

    /// Put a completed todo back on the list. Returns false if it wasn't done.
    pub async fn reopen_todo(&self, todo_id: &str) -> Result<bool> {
        self.set_completed(todo_id, false).await
    }

    async fn set_completed(&self, todo_id: &str, done: bool) -> Result<bool> {
        let today = self.clock.today();
        let (changed, copy) = {
            let mut completed = self.completed.write().await;
            completed.roll_over(today);
            let changed = if done {
                completed.mark(todo_id)
            } else {
                completed.unmark(todo_id)
            };
            (changed, completed.clone())
        };
        if !changed {
            return Ok(false);
        }

        with_retry(&self.retry, "save_completed_todos", || {
            self.db.save_completed_todos(&self.operator_id, &copy)
        })
        .await?;
        debug!(todo_id, done, "Todo completion updated");
        self.emit_todos().await;
        Ok(true)
    }

    /// Carry out a todo's bound command.
    ///
    /// Queue commands start a session (a single-lead workflow is a one-lead
    /// session). Status reviews need no session and return `Unchanged`.
    pub async fn execute(&self, command: &TodoCommand) -> Result<QueueEvent> {
        match command {
            TodoCommand::EnterQueueSession { kind, lead_ids } => {
                self.start_session(*kind, lead_ids.clone()).await
            }
            TodoCommand::OpenSingleWorkflow { kind, lead_id } => {
                self.start_session(*kind, vec![*lead_id]).await
            }
            TodoCommand::ReviewStatuses { .. } => Ok(QueueEvent::Unchanged),
        }
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// Start a bulk session, ending whatever else was active.
    ///
    /// Ids no longer in the snapshot are skipped.
    pub async fn start_session(&self, kind: SessionKind, lead_ids: Vec<Uuid>) -> Result<QueueEvent> {
        let known: Vec<Uuid> = {
            let snapshot = self.snapshot.read().await;
            lead_ids
                .into_iter()
                .filter(|id| snapshot.iter().any(|l| l.id == *id))
                .collect()
        };
        let event = self.queues.write().await.start(kind, known)?;
        self.emit_session(event.clone());
        Ok(event)
    }

    pub async fn next(&self) -> Result<QueueEvent> {
        let event = self.queues.write().await.next()?;
        self.emit_session(event.clone());
        Ok(event)
    }

    pub async fn skip_to_next(&self) -> Result<QueueEvent> {
        let event = self.queues.write().await.skip_to_next()?;
        self.emit_session(event.clone());
        Ok(event)
    }

    pub async fn previous(&self) -> Result<QueueEvent> {
        let event = self.queues.write().await.previous()?;
        self.emit_session(event.clone());
        Ok(event)
    }

    pub async fn exit_session(&self) -> QueueEvent {
        let event = self.queues.write().await.exit();
        self.emit_session(event.clone());
        event
    }

    /// Kind of the active session, if any.
    pub async fn active_session(&self) -> Option<SessionKind> {
        self.queues.read().await.active_kind()
    }

    /// The lead in focus in the active session.
    pub async fn current_lead(&self) -> Option<CampaignLead> {
        let id = self.queues.read().await.current()?;
        self.lead(id).await
    }

    // ── Generation and usage ────────────────────────────────────────

    /// Generate outreach copy for a lead, within the usage limits.
    ///
    /// Reserves a slot, calls the generator (retrying transient failures) and
    /// confirms the slot only on success.
    pub async fn generate_message(
        &self,
        lead_id: Uuid,
        channel: OutreachMethod,
    ) -> Result<GeneratedMessage> {
        let generator = self.generator.clone().ok_or(GenerationError::Unavailable)?;
        let lead = self.resolve(lead_id).await?;
        // A lead in focus takes the session's mode; otherwise go by status.
        let in_focus = {
            let queues = self.queues.read().await;
            queues
                .active_kind()
                .filter(|_| queues.current() == Some(lead_id))
        };
        let is_follow_up = match in_focus {
            Some(kind) => kind.is_follow_up(),
            None => lead.status == LeadStatus::Contacted,
        };

        let reservation = self
            .limiter
            .check_and_reserve(&self.operator_id, lead_id, channel)
            .await?;

        let generated = with_retry(&self.retry, "generate", || {
            generator.generate(&lead, channel, is_follow_up)
        })
        .await;

        match generated {
            Ok(message) => {
                with_retry(&self.retry, "record_generation", || {
                    self.limiter.confirm(reservation.clone())
                })
                .await?;
                self.emit(EngineEvent::UsageRecorded { lead_id, channel });
                Ok(message)
            }
            Err(e) => {
                warn!(lead_id = %lead_id, channel = %channel, error = %e, "Message generation failed");
                self.limiter.release(reservation);
                Err(e.into())
            }
        }
    }

    pub async fn usage(&self) -> Result<UsageSummary> {
        let summary = with_retry(&self.retry, "usage", || self.limiter.usage(&self.operator_id)).await?;
        Ok(summary)
    }
}
