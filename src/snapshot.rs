//! JSON campaign snapshots for bulk import.
//!
//! ```json
//! {
//!   "name": "Austin bakeries",
//!   "leads": [
//!     { "business_name": "Harbor Bakery", "email": "hi@harbor.example" },
//!     { "business_name": "Rye & Co", "status": "contacted",
//!       "outreach_method": "instagram", "last_contacted_at": "2026-05-01T15:00:00Z" }
//!   ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::leads::{Campaign, CampaignLead, Lead, LeadStatus, OutreachMethod};

/// One lead plus any funnel progress it already has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLead {
    #[serde(flatten)]
    pub lead: Lead,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_follow_up_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outreach_method: Option<OutreachMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub name: String,
    #[serde(default)]
    pub leads: Vec<SnapshotLead>,
}

impl CampaignSnapshot {
    /// Build the campaign and its scored leads for `owner_id`.
    pub fn into_records(self, owner_id: &str, now: DateTime<Utc>) -> (Campaign, Vec<CampaignLead>) {
        let campaign = Campaign::new(owner_id, self.name, now);
        let leads = self
            .leads
            .into_iter()
            .map(|entry| {
                let mut cl = CampaignLead::new(campaign.id, entry.lead.with_score(), now);
                cl.status = entry.status.unwrap_or(LeadStatus::Pending);
                cl.last_contacted_at = entry.last_contacted_at;
                cl.next_follow_up_date = entry.next_follow_up_date;
                // The channel only means something once the lead has been contacted.
                if cl.status != LeadStatus::Pending {
                    cl.outreach_method = entry.outreach_method;
                }
                cl
            })
            .collect();
        (campaign, leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_scores() {
        let json = r#"{
            "name": "Austin bakeries",
            "leads": [
                { "business_name": "Harbor Bakery", "email": "hi@harbor.example", "phone": "555" },
                { "business_name": "Rye & Co", "status": "contacted",
                  "outreach_method": "instagram", "last_contacted_at": "2026-05-01T15:00:00Z" },
                { "business_name": "Fresh Start", "outreach_method": "email" }
            ]
        }"#;
        let snapshot: CampaignSnapshot = serde_json::from_str(json).unwrap();
        let now = Utc::now();
        let (campaign, leads) = snapshot.into_records("op-1", now);

        assert_eq!(campaign.owner_id, "op-1");
        assert_eq!(campaign.name, "Austin bakeries");
        assert_eq!(leads.len(), 3);
        assert!(leads.iter().all(|l| l.campaign_id == campaign.id));

        assert_eq!(leads[0].status, LeadStatus::Pending);
        assert_eq!(leads[0].lead.score, Some(40));

        assert_eq!(leads[1].status, LeadStatus::Contacted);
        assert_eq!(leads[1].outreach_method, Some(OutreachMethod::Instagram));
        assert!(leads[1].last_contacted_at.is_some());

        // Pending leads never carry a channel.
        assert_eq!(leads[2].outreach_method, None);
    }
}
