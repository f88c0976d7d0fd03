//! Bulk queue controller: one-at-a-time guided walk over a list of leads.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::QueueError;

use super::{QueueEvent, SessionKind};

/// An active walk: ordered lead ids plus the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSession {
    pub kind: SessionKind,
    pub lead_ids: Vec<Uuid>,
    pub index: usize,
    /// Leads stepped past with `next`/`skip` so far.
    pub advanced: usize,
}

impl QueueSession {
    pub fn current(&self) -> Option<Uuid> {
        self.lead_ids.get(self.index).copied()
    }

    fn selected(&self) -> QueueEvent {
        QueueEvent::Selected {
            kind: self.kind,
            lead_id: self.lead_ids[self.index],
            position: self.index,
            total: self.lead_ids.len(),
        }
    }
}

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueueState {
    #[default]
    Idle,
    Active(QueueSession),
}

/// A single bulk queue controller.
///
/// Controllers are plain values; any number can exist at once; the
/// [`super::QueueCoordinator`] enforces that only one is active.
#[derive(Debug, Clone, Default)]
pub struct BulkQueue {
    state: QueueState,
}

impl BulkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn session(&self) -> Option<&QueueSession> {
        match &self.state {
            QueueState::Active(session) => Some(session),
            QueueState::Idle => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, QueueState::Active(_))
    }

    /// The lead currently in focus.
    pub fn current(&self) -> Option<Uuid> {
        self.session().and_then(QueueSession::current)
    }

    /// Begin a session over `lead_ids`. Duplicates keep their first position.
    pub fn start(&mut self, kind: SessionKind, lead_ids: Vec<Uuid>) -> Result<QueueEvent, QueueError> {
        let mut unique = Vec::with_capacity(lead_ids.len());
        for id in lead_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        if unique.is_empty() {
            return Err(QueueError::EmptyQueue { kind });
        }

        info!(kind = %kind, count = unique.len(), "Queue session started");

        let session = QueueSession {
            kind,
            lead_ids: unique,
            index: 0,
            advanced: 0,
        };
        let event = session.selected();
        self.state = QueueState::Active(session);
        Ok(event)
    }

    /// Advance to the next lead, or finish the session at the end.
    pub fn next(&mut self) -> Result<QueueEvent, QueueError> {
        let session = self.active_mut()?;
        session.advanced += 1;

        if session.index + 1 < session.lead_ids.len() {
            session.index += 1;
            return Ok(session.selected());
        }

        let kind = session.kind;
        let processed = session.advanced;
        self.state = QueueState::Idle;
        info!(kind = %kind, processed, "Queue session completed");
        Ok(QueueEvent::Completed { kind, processed })
    }

    /// Move on without acting on the current lead.
    pub fn skip_to_next(&mut self) -> Result<QueueEvent, QueueError> {
        if let Some(lead_id) = self.current() {
            debug!(lead_id = %lead_id, "Skipping lead");
        }
        self.next()
    }

    /// Step back one lead; a no-op on the first.
    pub fn previous(&mut self) -> Result<QueueEvent, QueueError> {
        let session = self.active_mut()?;
        if session.index == 0 {
            return Ok(QueueEvent::Unchanged);
        }
        session.index -= 1;
        Ok(session.selected())
    }

    /// Drop a lead that was snoozed or removed mid-session.
    ///
    /// Unknown leads and idle controllers are tolerated: the lead is already
    /// gone from the walk.
    pub fn remove_and_advance(&mut self, lead_id: Uuid) -> QueueEvent {
        let QueueState::Active(session) = &mut self.state else {
            return QueueEvent::Unchanged;
        };
        let Some(pos) = session.lead_ids.iter().position(|id| *id == lead_id) else {
            return QueueEvent::Unchanged;
        };

        session.lead_ids.remove(pos);
        debug!(kind = %session.kind, lead_id = %lead_id, remaining = session.lead_ids.len(), "Lead removed from queue");

        if session.lead_ids.is_empty() {
            let kind = session.kind;
            let processed = session.advanced;
            self.state = QueueState::Idle;
            info!(kind = %kind, processed, "Queue session emptied");
            return QueueEvent::Completed { kind, processed };
        }

        if pos < session.index {
            session.index -= 1;
        }
        session.index = session.index.min(session.lead_ids.len() - 1);
        session.selected()
    }

    /// Abandon the session wherever it is.
    pub fn exit(&mut self) -> QueueEvent {
        match std::mem::take(&mut self.state) {
            QueueState::Active(session) => {
                info!(kind = %session.kind, position = session.index, "Queue session exited");
                QueueEvent::Exited { kind: session.kind }
            }
            QueueState::Idle => QueueEvent::Unchanged,
        }
    }

    fn active_mut(&mut self) -> Result<&mut QueueSession, QueueError> {
        match &mut self.state {
            QueueState::Active(session) => Ok(session),
            QueueState::Idle => Err(QueueError::NoActiveSession),
        }
    }
}
