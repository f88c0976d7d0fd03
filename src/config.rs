//! Configuration types.
//!
//! Everything is read from `OUTREACH_*` environment variables with defaults
//! matching the production limits. `from_lookup` takes any key → value source
//! so tests don't have to touch the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::generation::RetryPolicy;
use crate::leads::RejectPolicy;
use crate::todos::FollowUpThresholds;
use crate::usage::UsageLimits;

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T, L>(lookup: &L, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

/// Engine configuration for one operator.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Operator whose campaigns, usage and completed todos the engine manages.
    pub operator_id: String,
    pub db_path: PathBuf,
    /// Operator's IANA timezone; all day boundaries use it.
    pub timezone: Tz,
    pub usage: UsageLimits,
    pub reject_policy: RejectPolicy,
    pub retry: RetryPolicy,
    pub thresholds: FollowUpThresholds,
    /// Message generation service, if configured.
    pub generator: Option<GeneratorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operator_id: "default".to_string(),
            db_path: PathBuf::from("./data/outreach.db"),
            timezone: Tz::UTC,
            usage: UsageLimits::default(),
            reject_policy: RejectPolicy::default(),
            retry: RetryPolicy::default(),
            thresholds: FollowUpThresholds::default(),
            generator: None,
        }
    }
}

impl EngineConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let operator_id = lookup("OUTREACH_OPERATOR_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.operator_id);

        let db_path = lookup("OUTREACH_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let timezone: Tz = parse_var(&lookup, "OUTREACH_TIMEZONE", defaults.timezone)?;

        let usage = UsageLimits {
            hourly_limit: parse_var(&lookup, "OUTREACH_HOURLY_LIMIT", defaults.usage.hourly_limit)?,
            daily_limit: parse_var(&lookup, "OUTREACH_DAILY_LIMIT", defaults.usage.daily_limit)?,
            cooldown: Duration::from_secs(parse_var(
                &lookup,
                "OUTREACH_COOLDOWN_SECS",
                defaults.usage.cooldown.as_secs(),
            )?),
        };

        let reject_policy = parse_var(&lookup, "OUTREACH_REJECT_POLICY", defaults.reject_policy)?;

        let retry = RetryPolicy {
            max_retries: parse_var(&lookup, "OUTREACH_MAX_RETRIES", defaults.retry.max_retries)?,
            base_delay: Duration::from_millis(parse_var(
                &lookup,
                "OUTREACH_RETRY_BASE_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            ..defaults.retry
        };

        let generator = GeneratorConfig::from_lookup(&lookup)?;

        Ok(Self {
            operator_id,
            db_path,
            timezone,
            usage,
            reject_policy,
            retry,
            thresholds: defaults.thresholds,
            generator,
        })
    }
}

/// Remote message generation service.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl GeneratorConfig {
    /// Returns `None` if `OUTREACH_GENERATOR_URL` is not set (generation disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    fn from_lookup<L>(lookup: &L) -> Result<Option<Self>, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let Some(base_url) = lookup("OUTREACH_GENERATOR_URL").filter(|s| !s.trim().is_empty())
        else {
            return Ok(None);
        };

        let api_key = lookup("OUTREACH_GENERATOR_API_KEY")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OUTREACH_GENERATOR_API_KEY".into()))?;

        let timeout_secs: u64 = parse_var(lookup, "OUTREACH_GENERATOR_TIMEOUT_SECS", 30)?;

        Ok(Some(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(timeout_secs),
        }))
    }
}
