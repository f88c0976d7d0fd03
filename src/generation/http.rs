//! HTTP client for the remote message generation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::leads::{CampaignLead, OutreachMethod};
use crate::usage::LimitReason;

use super::{GeneratedMessage, MessageGenerator};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    lead: &'a CampaignLead,
    channel: OutreachMethod,
    is_follow_up: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    retry_after_secs: Option<u64>,
}

/// `MessageGenerator` over `POST {base_url}/generate`.
pub struct HttpMessageGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpMessageGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Failed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/generate", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

/// Map a 429 body to a typed rate limit. An unrecognized reason counts as hourly.
fn rate_limited(body: &str) -> GenerationError {
    let parsed: RateLimitBody = serde_json::from_str(body).unwrap_or_default();
    let reason = parsed
        .reason
        .as_deref()
        .and_then(|r| r.parse::<LimitReason>().ok())
        .unwrap_or(LimitReason::HourlyLimit);
    GenerationError::RateLimited {
        reason,
        retry_after: parsed.retry_after_secs.map(Duration::from_secs),
    }
}

fn send_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GenerationError::Transient(e.to_string())
    } else {
        GenerationError::Failed(e.to_string())
    }
}

#[async_trait]
impl MessageGenerator for HttpMessageGenerator {
    async fn generate(
        &self,
        lead: &CampaignLead,
        channel: OutreachMethod,
        is_follow_up: bool,
    ) -> Result<GeneratedMessage, GenerationError> {
        let body = GenerateRequest {
            lead,
            channel,
            is_follow_up,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(send_error)?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let err = rate_limited(&text);
            warn!(lead_id = %lead.id, channel = %channel, error = %err, "Generation service rate limited");
            return Err(err);
        }
        if status.is_server_error() {
            return Err(GenerationError::Transient(format!("{status}: {text}")));
        }
        if !status.is_success() {
            return Err(GenerationError::Failed(format!("{status}: {text}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Failed(format!("Malformed generation response: {e}")))?;

        debug!(
            lead_id = %lead.id,
            channel = %channel,
            follow_up = is_follow_up,
            chars = parsed.text.len(),
            "Message generated"
        );
        Ok(GeneratedMessage {
            text: parsed.text,
            subject: parsed.subject.filter(|s| !s.trim().is_empty()),
        })
    }
}
