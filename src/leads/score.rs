//! Lead quality scoring.
//!
//! Fixed weights per attribute, summed into four independent groups. The
//! score only feeds sort and filter keys; it never gates a transition.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use super::model::{CampaignLead, Lead, present};

const EMAIL: u8 = 18;
const PHONE: u8 = 17;
const WEBSITE: u8 = 10;

const INSTAGRAM: u8 = 10;
const FACEBOOK: u8 = 8;
const LINKEDIN: u8 = 9;
const TWITTER: u8 = 3;

const BUSINESS_NAME: u8 = 5;
const OWNER_NAME: u8 = 10;

const CITY: u8 = 3;
const STATE: u8 = 4;
const CITY_AND_STATE_BONUS: u8 = 3;

/// Per-group contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Email, phone, website (max 45).
    pub contact_info: u8,
    /// Instagram, Facebook, LinkedIn, Twitter (max 30).
    pub social: u8,
    /// Business and owner name (max 15).
    pub business_info: u8,
    /// City, state and the both-present bonus (max 10).
    pub geographic: u8,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        self.contact_info + self.social + self.business_info + self.geographic
    }
}

/// A computed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub total: u8,
    pub breakdown: ScoreBreakdown,
}

impl LeadScore {
    pub fn tier(&self) -> ScoreTier {
        ScoreTier::from_total(self.total)
    }
}

/// Coarse bucket for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Hot,
    Warm,
    Cold,
}

impl ScoreTier {
    pub fn from_total(total: u8) -> Self {
        match total {
            70.. => Self::Hot,
            40.. => Self::Warm,
            _ => Self::Cold,
        }
    }
}

fn weight(value: &Option<String>, points: u8) -> u8 {
    if present(value).is_some() { points } else { 0 }
}

/// Score a lead. Pure and deterministic.
pub fn score(lead: &Lead) -> LeadScore {
    let contact_info =
        weight(&lead.email, EMAIL) + weight(&lead.phone, PHONE) + weight(&lead.website, WEBSITE);

    let social = weight(&lead.instagram, INSTAGRAM)
        + weight(&lead.facebook, FACEBOOK)
        + weight(&lead.linkedin, LINKEDIN)
        + weight(&lead.twitter, TWITTER);

    let business_name = if lead.business_name.trim().is_empty() {
        0
    } else {
        BUSINESS_NAME
    };
    let business_info = business_name + weight(&lead.owner_name, OWNER_NAME);

    let city = weight(&lead.city, CITY);
    let state = weight(&lead.state, STATE);
    let bonus = if city > 0 && state > 0 {
        CITY_AND_STATE_BONUS
    } else {
        0
    };
    let geographic = city + state + bonus;

    let breakdown = ScoreBreakdown {
        contact_info,
        social,
        business_info,
        geographic,
    };

    LeadScore {
        total: breakdown.total(),
        breakdown,
    }
}

impl Lead {
    /// Builder: compute and store the denormalized score.
    pub fn with_score(mut self) -> Self {
        self.score = Some(score(&self).total);
        self
    }
}

/// Sort campaign leads best-first; ties keep their input order.
pub fn sort_by_score(leads: &mut [CampaignLead]) {
    leads.sort_by_key(|cl| Reverse(cl.lead.score.unwrap_or_else(|| score(&cl.lead).total)));
}
