//! Per-operator set of todos marked done today.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Completed todo ids for one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTodos {
    pub day: NaiveDate,
    pub ids: BTreeSet<String>,
}

impl CompletedTodos {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            ids: BTreeSet::new(),
        }
    }

    /// Clear the set when the local date has moved on. Returns true if it reset.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.day == today {
            return false;
        }
        debug!(from = %self.day, to = %today, cleared = self.ids.len(), "Completed todos rolled over");
        self.day = today;
        self.ids.clear();
        true
    }

    /// Returns true if the id was newly added.
    pub fn mark(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn unmark(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn mark_and_unmark() {
        let mut done = CompletedTodos::new(day(1));
        assert!(done.mark("bulk_pending"));
        assert!(!done.mark("bulk_pending"));
        assert!(done.contains("bulk_pending"));
        assert!(done.unmark("bulk_pending"));
        assert!(done.is_empty());
    }

    #[test]
    fn same_day_keeps_ids() {
        let mut done = CompletedTodos::new(day(1));
        done.mark("bulk_responded");
        assert!(!done.roll_over(day(1)));
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn new_day_resets() {
        let mut done = CompletedTodos::new(day(1));
        done.mark("bulk_responded");
        assert!(done.roll_over(day(2)));
        assert!(done.is_empty());
        assert_eq!(done.day, day(2));
    }
}
