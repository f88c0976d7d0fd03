//! Reservation-based rate limiter over the durable usage records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{DatabaseError, RateLimitError};
use crate::leads::OutreachMethod;
use crate::store::Database;

use super::{LimitReason, UsageHints, UsageLimits, UsageRecord, UsageSummary, UsageWindow};

/// Permission to generate one message.
///
/// Only [`UsageLimiter::confirm`] turns it into a durable usage record;
/// dropping it consumes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a reservation records nothing until it is confirmed"]
pub struct Reservation {
    pub operator_id: String,
    pub lead_id: Uuid,
    pub channel: OutreachMethod,
    pub issued_at: DateTime<Utc>,
}

/// Outcome of a check that hit the database.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Denied(#[from] RateLimitError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<CheckError> for crate::error::Error {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::Denied(e) => e.into(),
            CheckError::Database(e) => e.into(),
        }
    }
}

pub struct UsageLimiter {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    limits: UsageLimits,
    /// Last reservation issued per operator, for the cooldown.
    last_issued: Mutex<HashMap<String, DateTime<Utc>>>,
    hints: UsageHints,
}

fn until(now: DateTime<Utc>, then: DateTime<Utc>) -> std::time::Duration {
    (then - now).to_std().unwrap_or_default()
}

fn deny(reason: LimitReason, retry_after: std::time::Duration) -> CheckError {
    CheckError::Denied(RateLimitError::Exceeded {
        reason,
        retry_after,
    })
}

impl UsageLimiter {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>, limits: UsageLimits) -> Self {
        Self {
            db,
            clock,
            limits,
            last_issued: Mutex::new(HashMap::new()),
            hints: UsageHints::new(),
        }
    }

    pub fn limits(&self) -> &UsageLimits {
        &self.limits
    }

    /// Optimistic local view of today's used (lead, channel) pairs.
    pub fn hints(&self) -> &UsageHints {
        &self.hints
    }

    fn last_issued(&self, operator_id: &str) -> Option<DateTime<Utc>> {
        self.last_issued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(operator_id)
            .copied()
    }

    /// Check every limit against the durable records and, if all pass, issue
    /// a reservation.
    ///
    /// Limits are checked in a fixed order: same lead and channel today,
    /// trailing hour, local day, then cooldown. The first one hit is reported.
    pub async fn check_and_reserve(
        &self,
        operator_id: &str,
        lead_id: Uuid,
        channel: OutreachMethod,
    ) -> Result<Reservation, CheckError> {
        let now = self.clock.now();
        let today = self.clock.local_date(now);
        let midnight = self.clock.next_local_midnight(now);

        if self.db.lead_channel_used(lead_id, channel, today).await? {
            debug!(lead_id = %lead_id, channel = %channel, "Channel already used today");
            return Err(deny(LimitReason::MethodLimit, until(now, midnight)));
        }

        let hour = Duration::hours(1);
        let recent = self.db.generations_since(operator_id, now - hour).await?;
        if recent.len() as u32 >= self.limits.hourly_limit {
            // Records are oldest first; a slot frees when the oldest ages out.
            let frees_at = recent
                .first()
                .map(|r| r.created_at + hour)
                .unwrap_or(now + hour);
            return Err(deny(LimitReason::HourlyLimit, until(now, frees_at)));
        }

        let daily = self.db.generations_on_day(operator_id, today).await?;
        if daily.len() as u32 >= self.limits.daily_limit {
            return Err(deny(LimitReason::DailyLimit, until(now, midnight)));
        }

        let last = [self.last_issued(operator_id), recent.last().map(|r| r.created_at)]
            .into_iter()
            .flatten()
            .max();
        if let Some(last) = last {
            let cooldown = Duration::from_std(self.limits.cooldown).unwrap_or_else(|_| Duration::zero());
            let ready_at = last + cooldown;
            if now < ready_at {
                return Err(deny(LimitReason::Cooldown, until(now, ready_at)));
            }
        }

        self.last_issued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operator_id.to_string(), now);
        self.hints.mark(lead_id, channel, today);

        debug!(operator = %operator_id, lead_id = %lead_id, channel = %channel, "Generation reserved");
        Ok(Reservation {
            operator_id: operator_id.to_string(),
            lead_id,
            channel,
            issued_at: now,
        })
    }

    /// Record a successful generation. Counts against the day it was reserved.
    pub async fn confirm(&self, reservation: Reservation) -> Result<UsageRecord, DatabaseError> {
        let record = UsageRecord {
            id: Uuid::new_v4(),
            operator_id: reservation.operator_id,
            lead_id: reservation.lead_id,
            channel: reservation.channel,
            created_at: reservation.issued_at,
            local_day: self.clock.local_date(reservation.issued_at),
        };
        self.db.record_generation(&record).await?;
        info!(
            operator = %record.operator_id,
            lead_id = %record.lead_id,
            channel = %record.channel,
            "Generation usage recorded"
        );
        Ok(record)
    }

    /// Give up a reservation after a failed generation.
    pub fn release(&self, reservation: Reservation) {
        self.hints.forget(reservation.lead_id, reservation.channel);
        debug!(lead_id = %reservation.lead_id, channel = %reservation.channel, "Reservation released");
    }

    /// Current usage for an operator. Also reconciles the local hints.
    pub async fn usage(&self, operator_id: &str) -> Result<UsageSummary, DatabaseError> {
        let now = self.clock.now();
        let today = self.clock.local_date(now);

        let hourly = self
            .db
            .generations_since(operator_id, now - Duration::hours(1))
            .await?;
        let daily = self.db.generations_on_day(operator_id, today).await?;

        self.hints
            .reconcile(today, daily.iter().map(|r| (r.lead_id, r.channel)));

        Ok(UsageSummary {
            hourly: UsageWindow {
                used: hourly.len() as u32,
                limit: self.limits.hourly_limit,
            },
            daily: UsageWindow {
                used: daily.len() as u32,
                limit: self.limits.daily_limit,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;
    use chrono_tz::America::{Chicago, New_York};

    use crate::clock::ManualClock;
    use crate::store::LibSqlBackend;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn setup(
        now: &str,
        tz: Tz,
        limits: UsageLimits,
    ) -> (UsageLimiter, Arc<ManualClock>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let clock = Arc::new(ManualClock::new(at(now), tz));
        let limiter = UsageLimiter::new(db, clock.clone(), limits);
        (limiter, clock)
    }

    fn no_cooldown() -> UsageLimits {
        UsageLimits {
            cooldown: std::time::Duration::ZERO,
            ..UsageLimits::default()
        }
    }

    fn reason(result: Result<Reservation, CheckError>) -> LimitReason {
        match result {
            Err(CheckError::Denied(e)) => e.reason(),
            other => panic!("expected a denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_lead_and_channel_twice_in_a_day() {
        let (limiter, clock) = setup("2026-06-01T15:00:00Z", Tz::UTC, no_cooldown()).await;
        let lead = Uuid::new_v4();

        let r = limiter
            .check_and_reserve("op", lead, OutreachMethod::Email)
            .await
            .unwrap();
        limiter.confirm(r).await.unwrap();

        clock.advance(Duration::hours(2));
        let denied = limiter.check_and_reserve("op", lead, OutreachMethod::Email).await;
        match denied {
            Err(CheckError::Denied(e)) => {
                assert_eq!(e.reason(), LimitReason::MethodLimit);
                // 17:00 UTC → midnight is 7 hours away.
                assert_eq!(e.retry_after(), std::time::Duration::from_secs(7 * 3600));
            }
            other => panic!("expected METHOD_LIMIT, got {other:?}"),
        }

        // Another channel for the same lead is fine.
        let other = limiter
            .check_and_reserve("op", lead, OutreachMethod::Phone)
            .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn local_midnight_splits_days() {
        // CDT: 04:59:59Z is 23:59:59 local, 05:00:01Z is 00:00:01 local.
        let (limiter, clock) = setup("2026-06-02T04:59:59Z", Chicago, no_cooldown()).await;
        let lead = Uuid::new_v4();

        let r = limiter
            .check_and_reserve("op", lead, OutreachMethod::Instagram)
            .await
            .unwrap();
        limiter.confirm(r).await.unwrap();

        clock.set(at("2026-06-02T05:00:01Z"));
        assert!(
            limiter
                .check_and_reserve("op", lead, OutreachMethod::Instagram)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn summer_midnight_uses_daylight_time() {
        // 23:30 EDT on Jul 1; an hour later is 00:30 EDT on Jul 2.
        let (limiter, clock) = setup("2026-07-02T03:30:00Z", New_York, no_cooldown()).await;
        let lead = Uuid::new_v4();

        let r = limiter
            .check_and_reserve("op", lead, OutreachMethod::Email)
            .await
            .unwrap();
        assert_eq!(limiter.confirm(r).await.unwrap().local_day.to_string(), "2026-07-01");

        // Denied until EDT midnight, not EST midnight.
        clock.set(at("2026-07-02T03:45:00Z"));
        match limiter.check_and_reserve("op", lead, OutreachMethod::Email).await {
            Err(CheckError::Denied(e)) => {
                assert_eq!(e.reason(), LimitReason::MethodLimit);
                assert_eq!(e.retry_after(), std::time::Duration::from_secs(15 * 60));
            }
            other => panic!("expected METHOD_LIMIT, got {other:?}"),
        }

        clock.set(at("2026-07-02T04:30:00Z"));
        let r = limiter
            .check_and_reserve("op", lead, OutreachMethod::Email)
            .await
            .unwrap();
        assert_eq!(limiter.confirm(r).await.unwrap().local_day.to_string(), "2026-07-02");
        assert_eq!(limiter.usage("op").await.unwrap().daily.used, 1);
    }

    #[tokio::test]
    async fn unconfirmed_reservation_consumes_nothing() {
        let (limiter, _clock) = setup("2026-06-01T15:00:00Z", Tz::UTC, no_cooldown()).await;
        let lead = Uuid::new_v4();

        let abandoned = limiter
            .check_and_reserve("op", lead, OutreachMethod::Email)
            .await
            .unwrap();
        drop(abandoned);

        assert!(
            limiter
                .check_and_reserve("op", lead, OutreachMethod::Email)
                .await
                .is_ok()
        );
        let usage = limiter.usage("op").await.unwrap();
        assert_eq!(usage.daily.used, 0);
        assert_eq!(usage.hourly.used, 0);
        assert!(limiter.hints().is_empty(), "reconcile drops unconfirmed hints");
    }

    #[tokio::test]
    async fn hourly_limit_frees_when_oldest_ages_out() {
        let limits = UsageLimits {
            hourly_limit: 2,
            daily_limit: 10,
            cooldown: std::time::Duration::ZERO,
        };
        let (limiter, clock) = setup("2026-06-01T10:00:00Z", Tz::UTC, limits).await;

        for _ in 0..2 {
            let r = limiter
                .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Email)
                .await
                .unwrap();
            limiter.confirm(r).await.unwrap();
            clock.advance(Duration::minutes(10));
        }

        // 10:20 now; oldest at 10:00 ages out at 11:00.
        match limiter
            .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Email)
            .await
        {
            Err(CheckError::Denied(e)) => {
                assert_eq!(e.reason(), LimitReason::HourlyLimit);
                assert_eq!(e.retry_after(), std::time::Duration::from_secs(40 * 60));
            }
            other => panic!("expected HOURLY_LIMIT, got {other:?}"),
        }

        clock.set(at("2026-06-01T11:00:01Z"));
        assert!(
            limiter
                .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Email)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn daily_limit() {
        let limits = UsageLimits {
            hourly_limit: 100,
            daily_limit: 2,
            cooldown: std::time::Duration::ZERO,
        };
        let (limiter, clock) = setup("2026-06-01T08:00:00Z", Tz::UTC, limits).await;
        for _ in 0..2 {
            let r = limiter
                .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Phone)
                .await
                .unwrap();
            limiter.confirm(r).await.unwrap();
            clock.advance(Duration::hours(2));
        }
        let denied = limiter
            .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Phone)
            .await;
        assert_eq!(reason(denied), LimitReason::DailyLimit);

        let usage = limiter.usage("op").await.unwrap();
        assert_eq!(usage.daily, UsageWindow { used: 2, limit: 2 });
        assert_eq!(usage.hourly.used, 0);
    }

    #[tokio::test]
    async fn method_limit_reported_before_hourly() {
        let limits = UsageLimits {
            hourly_limit: 1,
            daily_limit: 10,
            cooldown: std::time::Duration::ZERO,
        };
        let (limiter, _clock) = setup("2026-06-01T08:00:00Z", Tz::UTC, limits).await;
        let lead = Uuid::new_v4();
        let r = limiter
            .check_and_reserve("op", lead, OutreachMethod::Email)
            .await
            .unwrap();
        limiter.confirm(r).await.unwrap();

        let denied = limiter.check_and_reserve("op", lead, OutreachMethod::Email).await;
        assert_eq!(reason(denied), LimitReason::MethodLimit);
    }

    #[tokio::test]
    async fn cooldown_between_reservations() {
        let (limiter, clock) = setup("2026-06-01T08:00:00Z", Tz::UTC, UsageLimits::default()).await;
        let _first = limiter
            .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Email)
            .await
            .unwrap();

        clock.advance(Duration::seconds(4));
        match limiter
            .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Email)
            .await
        {
            Err(CheckError::Denied(e)) => {
                assert_eq!(e.reason(), LimitReason::Cooldown);
                assert_eq!(e.retry_after(), std::time::Duration::from_secs(6));
            }
            other => panic!("expected COOLDOWN, got {other:?}"),
        }

        clock.advance(Duration::seconds(6));
        assert!(
            limiter
                .check_and_reserve("op", Uuid::new_v4(), OutreachMethod::Email)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn hints_follow_reservations() {
        let (limiter, clock) = setup("2026-06-01T08:00:00Z", Tz::UTC, no_cooldown()).await;
        let lead = Uuid::new_v4();
        let r = limiter
            .check_and_reserve("op", lead, OutreachMethod::Facebook)
            .await
            .unwrap();
        assert!(limiter.hints().is_marked(lead, OutreachMethod::Facebook, clock.today()));

        limiter.release(r);
        assert!(!limiter.hints().is_marked(lead, OutreachMethod::Facebook, clock.today()));
    }
}
