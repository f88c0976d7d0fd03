//! Message generation: the AI copywriting collaborator.
//!
//! The engine only depends on the [`MessageGenerator`] trait; text quality
//! and prompt format belong to the remote service.

pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::leads::{CampaignLead, OutreachMethod};

pub use http::HttpMessageGenerator;
pub use retry::{RetryPolicy, with_retry};

/// A generated outreach message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub text: String,
    /// Only email messages carry a subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Produces outreach copy for one lead on one channel.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(
        &self,
        lead: &CampaignLead,
        channel: OutreachMethod,
        is_follow_up: bool,
    ) -> Result<GeneratedMessage, GenerationError>;
}
