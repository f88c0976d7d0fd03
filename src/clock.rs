//! Injected wall clock and operator timezone.
//!
//! Every date-boundary decision (snooze expiry, follow-up age, completed-todo
//! reset, usage day and hour windows) goes through a [`Clock`] so tests can
//! simulate midnight rollovers deterministically. Days are computed in a named
//! IANA zone so they follow daylight saving changes.

use std::sync::Mutex;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of "now" plus the operator's timezone.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The operator's timezone.
    fn timezone(&self) -> Tz;

    /// Local calendar date of an instant.
    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.timezone()).date_naive()
    }

    /// Local calendar date right now.
    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// The first instant of the local day after the one containing `at`.
    fn next_local_midnight(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let tz = self.timezone();
        let tomorrow = self.local_date(at) + Duration::days(1);
        start_of_day(tz, tomorrow, at)
    }
}

/// First instant of `day` in `tz`.
///
/// An ambiguous midnight resolves to the earlier instant. A midnight skipped by
/// a forward shift resolves to the end of the gap, using the offset in force
/// at `before`.
fn start_of_day(tz: Tz, day: NaiveDate, before: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(local) => local.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let offset = tz.offset_from_utc_datetime(&before.naive_utc()).fix();
            midnight.and_utc() - Duration::seconds(i64::from(offset.local_minus_utc()))
        }
    }
}

/// Real system clock in the operator's zone.
#[derive(Debug, Clone)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    tz: Tz,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now: Mutex::new(now),
            tz,
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

#[cfg(test)]
mod tests {
    use chrono_tz::America::{New_York, Santiago};

    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn local_date_uses_zone() {
        // 03:00 UTC is still the previous evening in New York (EST).
        let clock = ManualClock::new(at("2026-03-06T03:00:00Z"), New_York);
        assert_eq!(clock.today(), day(2026, 3, 5));

        let utc = ManualClock::new(at("2026-03-06T03:00:00Z"), Tz::UTC);
        assert_eq!(utc.today(), day(2026, 3, 6));
    }

    #[test]
    fn local_date_follows_daylight_saving() {
        // 23:30 EDT on Jul 1, then 00:30 EDT on Jul 2.
        let clock = ManualClock::new(at("2026-07-02T03:30:00Z"), New_York);
        assert_eq!(clock.today(), day(2026, 7, 1));
        clock.set(at("2026-07-02T04:30:00Z"));
        assert_eq!(clock.today(), day(2026, 7, 2));

        // Same wall-clock times in January sit an hour later in UTC.
        clock.set(at("2026-01-02T04:30:00Z"));
        assert_eq!(clock.today(), day(2026, 1, 1));
        clock.set(at("2026-01-02T05:30:00Z"));
        assert_eq!(clock.today(), day(2026, 1, 2));
    }

    #[test]
    fn next_local_midnight_across_dst_changes() {
        // Winter: midnight EST is 05:00 UTC.
        let clock = ManualClock::new(at("2026-03-06T03:00:00Z"), New_York);
        assert_eq!(clock.next_local_midnight(clock.now()), at("2026-03-06T05:00:00Z"));

        // Evening before spring-forward (Mar 8, 2026): next midnight is still EST.
        let clock = ManualClock::new(at("2026-03-08T02:00:00Z"), New_York);
        assert_eq!(clock.next_local_midnight(clock.now()), at("2026-03-08T05:00:00Z"));

        // Day of spring-forward: the following midnight is EDT.
        let clock = ManualClock::new(at("2026-03-08T12:00:00Z"), New_York);
        assert_eq!(clock.next_local_midnight(clock.now()), at("2026-03-09T04:00:00Z"));
    }

    #[test]
    fn skipped_midnight_resolves_to_end_of_gap() {
        // Santiago springs forward at local midnight on 2026-09-06: 00:00 -04
        // jumps straight to 01:00 -03.
        let clock = ManualClock::new(at("2026-09-05T20:00:00Z"), Santiago);
        assert_eq!(clock.today(), day(2026, 9, 5));
        let midnight = clock.next_local_midnight(clock.now());
        assert_eq!(midnight, at("2026-09-06T04:00:00Z"));
        assert_eq!(clock.local_date(midnight), day(2026, 9, 6));
        assert_eq!(clock.local_date(midnight - Duration::seconds(1)), day(2026, 9, 5));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(at("2026-03-10T23:59:59Z"), Tz::UTC);
        let before = clock.today();
        clock.advance(Duration::seconds(2));
        assert_ne!(clock.today(), before);
        assert_eq!(clock.now(), at("2026-03-11T00:00:01Z"));
    }
}
