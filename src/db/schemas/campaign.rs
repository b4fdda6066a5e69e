//! Campaign document schema
//!
//! The aggregate root. Team, victim and evidence documents hang off it by id.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::new_id;

/// Collection name for campaigns
pub const CAMPAIGN_COLLECTION: &str = "campaigns";

/// First creation step
pub const FIRST_STEP: u8 = 1;

/// Terminal creation step ("complete")
pub const FINAL_STEP: u8 = 5;

/// Publication status of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Archived,
    Rejected,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 5] = [
        CampaignStatus::Draft,
        CampaignStatus::Active,
        CampaignStatus::Completed,
        CampaignStatus::Archived,
        CampaignStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Archived => "archived",
            CampaignStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CampaignStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown campaign status '{}'", s))
    }
}

/// Engagement counters
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub supporters: i64,
    #[serde(default)]
    pub signature_count: i64,
}

/// Campaign document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDoc {
    #[serde(rename = "_id")]
    pub id: String,

    pub title: String,
    pub description: String,
    pub short_description: String,
    pub category: String,

    /// Ordered, de-duplicated
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub status: CampaignStatus,

    /// Creation wizard position, 1..=5
    pub creation_step: u8,

    #[serde(default)]
    pub creation_complete: bool,

    /// Set when step 4 completed without any evidence on file
    #[serde(default)]
    pub evidence_requirement_skipped: bool,

    /// Owning user id
    pub created_by: String,

    /// Team document id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    #[serde(default)]
    pub has_victims: bool,

    /// Victim document ids, submission order
    #[serde(default)]
    pub victims: Vec<String>,

    /// Evidence document ids, upload order
    #[serde(default)]
    pub evidence: Vec<String>,

    #[serde(default)]
    pub engagement_metrics: EngagementMetrics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    /// Free-form location object supplied by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignDoc {
    /// Create a draft campaign at step 1
    pub fn new(
        created_by: String,
        title: String,
        description: String,
        short_description: String,
        category: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            title,
            description,
            short_description,
            category,
            tags: Vec::new(),
            status: CampaignStatus::Draft,
            creation_step: FIRST_STEP,
            creation_complete: false,
            evidence_requirement_skipped: false,
            created_by,
            team: None,
            has_victims: false,
            victims: Vec::new(),
            evidence: Vec::new(),
            engagement_metrics: EngagementMetrics::default(),
            end_date: None,
            location: None,
            cover_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this campaign
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.created_by == user_id
    }
}

impl IntoIndexes for CampaignDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "createdBy": 1, "createdAt": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_by_recent".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in CampaignStatus::ALL {
            assert_eq!(status.as_str().parse::<CampaignStatus>().unwrap(), status);
        }
        assert!("paused".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_new_campaign_is_draft_at_first_step() {
        let campaign = CampaignDoc::new(
            "owner".into(),
            "T".into(),
            "D".into(),
            "S".into(),
            "education".into(),
            Utc::now(),
        );
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.creation_step, FIRST_STEP);
        assert!(!campaign.creation_complete);
        assert_eq!(campaign.id.len(), 24);
        assert!(campaign.is_owned_by("owner"));
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let campaign = CampaignDoc::new(
            "owner".into(),
            "T".into(),
            "D".into(),
            "S".into(),
            "education".into(),
            Utc::now(),
        );
        let value = serde_json::to_value(&campaign).unwrap();
        assert_eq!(value["creationStep"], 1);
        assert_eq!(value["shortDescription"], "S");
        assert_eq!(value["status"], "draft");
        assert!(value.get("_id").is_some());
    }
}
