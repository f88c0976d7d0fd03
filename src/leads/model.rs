//! Lead data model: prospects, campaign membership, statuses and channels.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a campaign lead sits in the outreach funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Added to a campaign, not yet contacted.
    Pending,
    /// First outreach sent.
    Contacted,
    /// The prospect replied.
    Responded,
    /// Qualified as a likely client.
    Qualified,
    /// Contract signed.
    Signed,
    /// Dropped from the funnel.
    Rejected,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 6] = [
        Self::Pending,
        Self::Contacted,
        Self::Responded,
        Self::Qualified,
        Self::Signed,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Contacted => "contacted",
            Self::Responded => "responded",
            Self::Qualified => "qualified",
            Self::Signed => "signed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown lead status: {s}"))
    }
}

/// Channel an outreach message goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachMethod {
    Email,
    Phone,
    Instagram,
    Facebook,
    Linkedin,
    Twitter,
}

impl OutreachMethod {
    pub const ALL: [OutreachMethod; 6] = [
        Self::Email,
        Self::Phone,
        Self::Instagram,
        Self::Facebook,
        Self::Linkedin,
        Self::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Linkedin => "linkedin",
            Self::Twitter => "twitter",
        }
    }
}

impl fmt::Display for OutreachMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutreachMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| format!("unknown outreach method: {s}"))
    }
}

/// A prospect business record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub business_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub niche: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Denormalized quality score, written by the score engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

impl Lead {
    /// A lead with only a business name.
    pub fn new(business_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_name: business_name.into(),
            owner_name: None,
            email: None,
            phone: None,
            website: None,
            instagram: None,
            facebook: None,
            linkedin: None,
            twitter: None,
            niche: None,
            city: None,
            state: None,
            score: None,
        }
    }

    /// Builder: set the owner name.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner_name = Some(owner.into());
        self
    }

    /// Builder: set email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder: set phone.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Builder: set city and state.
    pub fn with_location(mut self, city: impl Into<String>, state: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self.state = Some(state.into());
        self
    }

    /// The contact handle for a channel, if the lead has a usable one.
    pub fn handle_for(&self, method: OutreachMethod) -> Option<&str> {
        let handle = match method {
            OutreachMethod::Email => &self.email,
            OutreachMethod::Phone => &self.phone,
            OutreachMethod::Instagram => &self.instagram,
            OutreachMethod::Facebook => &self.facebook,
            OutreachMethod::Linkedin => &self.linkedin,
            OutreachMethod::Twitter => &self.twitter,
        };
        present(handle)
    }

    /// Channels this lead can be reached on.
    pub fn available_methods(&self) -> Vec<OutreachMethod> {
        OutreachMethod::ALL
            .into_iter()
            .filter(|m| self.handle_for(*m).is_some())
            .collect()
    }
}

/// Treat whitespace-only strings as absent.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// An outreach campaign owned by one operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            created_at,
        }
    }
}

/// A lead's membership and progress within one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignLead {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub lead: Lead,
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<DateTime<Utc>>,
    /// Snooze marker: suppressed from follow-up until this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_follow_up_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outreach_method: Option<OutreachMethod>,
    pub added_at: DateTime<Utc>,
}

impl CampaignLead {
    /// Add a lead to a campaign in `pending`.
    pub fn new(campaign_id: Uuid, lead: Lead, added_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            lead,
            status: LeadStatus::Pending,
            last_contacted_at: None,
            next_follow_up_date: None,
            outreach_method: None,
            added_at,
        }
    }

    pub fn business_name(&self) -> &str {
        &self.lead.business_name
    }

    /// Whole days since last contact, if the lead was ever contacted.
    pub fn days_since_contact(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_contacted_at
            .map(|at| now.signed_duration_since(at).num_days())
    }

    /// Builder: put the lead in `contacted` as of `at`.
    pub fn contacted_at(mut self, at: DateTime<Utc>, method: OutreachMethod) -> Self {
        self.status = LeadStatus::Contacted;
        self.last_contacted_at = Some(at);
        self.outreach_method = Some(method);
        self
    }

    /// Builder: force a status.
    pub fn with_status(mut self, status: LeadStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder: set the snooze marker.
    pub fn snoozed_until(mut self, until: DateTime<Utc>) -> Self {
        self.next_follow_up_date = Some(until);
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn status_serde_snake_case() {
        let json = serde_json::to_string(&LeadStatus::Qualified).unwrap();
        assert_eq!(json, "\"qualified\"");
        let parsed: LeadStatus = serde_json::from_str("\"responded\"").unwrap();
        assert_eq!(parsed, LeadStatus::Responded);
    }

    #[test]
    fn status_from_str_matches_display() {
        for status in LeadStatus::ALL {
            assert_eq!(status.to_string().parse::<LeadStatus>().unwrap(), status);
        }
        assert!("archived".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn method_from_str_matches_display() {
        for method in OutreachMethod::ALL {
            assert_eq!(method.to_string().parse::<OutreachMethod>().unwrap(), method);
        }
        assert!("fax".parse::<OutreachMethod>().is_err());
    }

    #[test]
    fn blank_handles_are_not_available() {
        let mut lead = Lead::new("Acme Plumbing").with_email("hi@acme.test");
        lead.phone = Some("   ".into());
        assert_eq!(lead.available_methods(), vec![OutreachMethod::Email]);
        assert_eq!(lead.handle_for(OutreachMethod::Phone), None);
    }

    #[test]
    fn days_since_contact_floors() {
        let now = Utc::now();
        let cl = CampaignLead::new(Uuid::new_v4(), Lead::new("A"), now)
            .contacted_at(now - Duration::hours(47), OutreachMethod::Email);
        assert_eq!(cl.days_since_contact(now), Some(1));

        let fresh = CampaignLead::new(Uuid::new_v4(), Lead::new("B"), now);
        assert_eq!(fresh.days_since_contact(now), None);
    }

    #[test]
    fn optional_fields_omitted() {
        let cl = CampaignLead::new(Uuid::new_v4(), Lead::new("A"), Utc::now());
        let json = serde_json::to_string(&cl).unwrap();
        assert!(!json.contains("\"last_contacted_at\""));
        assert!(!json.contains("\"outreach_method\""));
        assert!(!json.contains("\"email\""));
        assert!(json.contains("\"status\":\"pending\""));
    }
}
