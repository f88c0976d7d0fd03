//! Error types for the outreach pipeline.

use std::time::Duration;

use uuid::Uuid;

use crate::leads::model::LeadStatus;
use crate::queue::SessionKind;
use crate::usage::LimitReason;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lead error: {0}")]
    Lead(#[from] LeadError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Status transition and snooze errors.
#[derive(Debug, thiserror::Error)]
pub enum LeadError {
    #[error("Campaign lead {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: LeadStatus,
        to: LeadStatus,
    },

    #[error("Rejecting campaign lead {id} requires confirmation")]
    ConfirmationRequired { id: Uuid },

    #[error("Marking campaign lead {id} as contacted requires an outreach channel")]
    ChannelRequired { id: Uuid },

    #[error("Invalid snooze duration: {days} days")]
    InvalidSnooze { days: u32 },

    #[error("Campaign lead {id} not found")]
    NotFound { id: Uuid },
}

/// Bulk queue session errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Cannot start a {kind} session with no leads")]
    EmptyQueue { kind: SessionKind },

    #[error("No queue session is active")]
    NoActiveSession,
}

/// Message-generation rate limit rejections.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded ({reason}), retry after {retry_after:?}")]
    Exceeded {
        reason: LimitReason,
        retry_after: Duration,
    },
}

impl RateLimitError {
    /// The classified rejection reason.
    pub fn reason(&self) -> LimitReason {
        match self {
            Self::Exceeded { reason, .. } => *reason,
        }
    }

    /// How long the caller should wait before trying again.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::Exceeded { retry_after, .. } => *retry_after,
        }
    }
}

/// Message generation service errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation service rate limited ({reason}), retry after {retry_after:?}")]
    RateLimited {
        reason: LimitReason,
        retry_after: Option<Duration>,
    },

    #[error("Transient generation failure: {0}")]
    Transient(String),

    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("No message generator configured")]
    Unavailable,
}

/// Classifies failures that are worth retrying with backoff.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for DatabaseError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connection(_))
    }
}

impl Retryable for GenerationError {
    fn is_transient(&self) -> bool {
        // Rate limits are surfaced with their wait time, never retried here.
        matches!(self, Self::Transient(_))
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_database_errors() {
        assert!(DatabaseError::Connection("reset".into()).is_transient());
        assert!(DatabaseError::Pool("busy".into()).is_transient());
        assert!(!DatabaseError::Constraint("unique".into()).is_transient());
        assert!(
            !DatabaseError::NotFound {
                entity: "campaign_lead".into(),
                id: "x".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn rate_limited_generation_is_not_retryable() {
        let err = GenerationError::RateLimited {
            reason: LimitReason::HourlyLimit,
            retry_after: Some(Duration::from_secs(60)),
        };
        assert!(!err.is_transient());
        assert!(GenerationError::Transient("502".into()).is_transient());
        assert!(!GenerationError::Failed("bad request".into()).is_transient());
    }

    #[test]
    fn invalid_transition_message() {
        let id = Uuid::nil();
        let err = LeadError::InvalidTransition {
            id,
            from: LeadStatus::Pending,
            to: LeadStatus::Signed,
        };
        assert_eq!(
            err.to_string(),
            format!("Campaign lead {id} cannot transition from pending to signed")
        );
    }
}
