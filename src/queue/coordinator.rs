//! Mutual exclusion across queue controllers.

use tracing::info;
use uuid::Uuid;

use crate::error::QueueError;

use super::{BulkQueue, QueueEvent, QueueLane, SessionKind};

/// Owns one controller per lane and keeps at most one of them active.
#[derive(Debug, Default)]
pub struct QueueCoordinator {
    outreach: BulkQueue,
    smart_response: BulkQueue,
    contract: BulkQueue,
}

impl QueueCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session, forcing any other active session to idle first.
    ///
    /// An empty lead list fails before anything is torn down.
    pub fn start(&mut self, kind: SessionKind, lead_ids: Vec<Uuid>) -> Result<QueueEvent, QueueError> {
        if lead_ids.is_empty() {
            return Err(QueueError::EmptyQueue { kind });
        }

        for lane in [QueueLane::Outreach, QueueLane::SmartResponse, QueueLane::Contract] {
            let queue = self.lane_mut(lane);
            if queue.is_active() {
                info!(lane = ?lane, "Stopping active session before starting {kind}");
                queue.exit();
            }
        }

        self.lane_mut(kind.lane()).start(kind, lead_ids)
    }

    /// The active controller, if any.
    pub fn active(&self) -> Option<&BulkQueue> {
        [&self.outreach, &self.smart_response, &self.contract]
            .into_iter()
            .find(|q| q.is_active())
    }

    /// Kind of the active session.
    pub fn active_kind(&self) -> Option<SessionKind> {
        self.active().and_then(|q| q.session()).map(|s| s.kind)
    }

    /// Lead in focus in the active session.
    pub fn current(&self) -> Option<Uuid> {
        self.active().and_then(BulkQueue::current)
    }

    pub fn next(&mut self) -> Result<QueueEvent, QueueError> {
        self.active_mut()?.next()
    }

    pub fn skip_to_next(&mut self) -> Result<QueueEvent, QueueError> {
        self.active_mut()?.skip_to_next()
    }

    pub fn previous(&mut self) -> Result<QueueEvent, QueueError> {
        self.active_mut()?.previous()
    }

    /// Exit whatever is active.
    pub fn exit(&mut self) -> QueueEvent {
        match self.active_mut() {
            Ok(queue) => queue.exit(),
            Err(_) => QueueEvent::Unchanged,
        }
    }

    /// Drop a lead from every controller that holds it.
    pub fn remove_lead(&mut self, lead_id: Uuid) -> QueueEvent {
        let mut outcome = QueueEvent::Unchanged;
        for lane in [QueueLane::Outreach, QueueLane::SmartResponse, QueueLane::Contract] {
            let event = self.lane_mut(lane).remove_and_advance(lead_id);
            if event != QueueEvent::Unchanged {
                outcome = event;
            }
        }
        outcome
    }

    fn active_mut(&mut self) -> Result<&mut BulkQueue, QueueError> {
        [&mut self.outreach, &mut self.smart_response, &mut self.contract]
            .into_iter()
            .find(|q| q.is_active())
            .ok_or(QueueError::NoActiveSession)
    }

    fn lane_mut(&mut self, lane: QueueLane) -> &mut BulkQueue {
        match lane {
            QueueLane::Outreach => &mut self.outreach,
            QueueLane::SmartResponse => &mut self.smart_response,
            QueueLane::Contract => &mut self.contract,
        }
    }
}
