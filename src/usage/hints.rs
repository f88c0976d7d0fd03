//! Optimistic local mirror of today's (lead, channel) generations.
//!
//! Marked as soon as a reservation is issued so the UI can grey out a channel
//! immediately. Never consulted for allow/deny; reconciled against the
//! durable records whenever usage is queried.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::leads::OutreachMethod;

#[derive(Debug, Default)]
struct HintState {
    day: Option<NaiveDate>,
    used: HashSet<(Uuid, OutreachMethod)>,
}

impl HintState {
    fn roll_to(&mut self, day: NaiveDate) {
        if self.day != Some(day) {
            self.day = Some(day);
            self.used.clear();
        }
    }
}

#[derive(Debug, Default)]
pub struct UsageHints {
    state: Mutex<HintState>,
}

impl UsageHints {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut HintState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn mark(&self, lead_id: Uuid, channel: OutreachMethod, day: NaiveDate) {
        self.with_state(|s| {
            s.roll_to(day);
            s.used.insert((lead_id, channel));
        });
    }

    pub fn forget(&self, lead_id: Uuid, channel: OutreachMethod) {
        self.with_state(|s| {
            s.used.remove(&(lead_id, channel));
        });
    }

    /// Whether the channel looks used for the lead on `day`.
    pub fn is_marked(&self, lead_id: Uuid, channel: OutreachMethod, day: NaiveDate) -> bool {
        self.with_state(|s| s.day == Some(day) && s.used.contains(&(lead_id, channel)))
    }

    /// Replace the local view with what the store says happened on `day`.
    pub fn reconcile(&self, day: NaiveDate, durable: impl IntoIterator<Item = (Uuid, OutreachMethod)>) {
        self.with_state(|s| {
            s.day = Some(day);
            s.used = durable.into_iter().collect();
        });
    }

    pub fn len(&self) -> usize {
        self.with_state(|s| s.used.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
