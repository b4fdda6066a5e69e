//! Persistence boundary for the campaign aggregate
//!
//! `CampaignStore` owns reads and the small single-purpose writes (evidence
//! append, validation outcome). Anything that touches several documents at
//! once goes through a `StoreTransaction` obtained from [`CampaignStore::begin`]:
//! nothing is visible to other callers until `commit`, and dropping the
//! transaction without committing discards every write made through it.

pub mod memory;
pub mod mongo;

pub use memory::MemoryCampaignStore;
pub use mongo::MongoCampaignStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::db::schemas::{
    CampaignDoc, CampaignStatus, EvidenceDoc, EvidenceStatus, TeamDoc, ValidationReport,
    VictimDoc,
};
use crate::types::Result;

/// Minimum creation step of a campaign that has evidence on file
pub const EVIDENCE_STEP: u8 = 4;

/// Sortable campaign fields for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    Status,
    CreationStep,
    EndDate,
    Views,
}

impl SortField {
    /// Document path used by the MongoDB sort
    pub fn path(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
            SortField::Title => "title",
            SortField::Status => "status",
            SortField::CreationStep => "creationStep",
            SortField::EndDate => "endDate",
            SortField::Views => "engagementMetrics.views",
        }
    }

    /// Ascending comparison of two campaigns by this field
    pub fn compare(&self, a: &CampaignDoc, b: &CampaignDoc) -> Ordering {
        match self {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
            SortField::CreationStep => a.creation_step.cmp(&b.creation_step),
            SortField::EndDate => a.end_date.cmp(&b.end_date),
            SortField::Views => a
                .engagement_metrics
                .views
                .cmp(&b.engagement_metrics.views),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(SortField::CreatedAt),
            "updatedAt" => Ok(SortField::UpdatedAt),
            "title" => Ok(SortField::Title),
            "status" => Ok(SortField::Status),
            "creationStep" => Ok(SortField::CreationStep),
            "endDate" => Ok(SortField::EndDate),
            "views" | "engagementMetrics.views" => Ok(SortField::Views),
            other => Err(format!("cannot sort by '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter, sort and page for the owner's campaign listing
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignQuery {
    /// 1-based
    pub page: u64,
    pub limit: u64,
    /// Empty means every status
    pub statuses: Vec<CampaignStatus>,
    /// Case-insensitive match against title, descriptions and tags
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for CampaignQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            statuses: Vec::new(),
            search: None,
            sort: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

impl CampaignQuery {
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// In-process equivalent of the MongoDB filter
    pub fn matches(&self, campaign: &CampaignDoc) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&campaign.status) {
            return false;
        }
        match self.search.as_deref() {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                let hit = |s: &str| s.to_lowercase().contains(&term);
                hit(&campaign.title)
                    || hit(&campaign.description)
                    || hit(&campaign.short_description)
                    || campaign.tags.iter().any(|t| hit(t))
            }
        }
    }

    /// Full ordering used for listings; ties fall back to id
    pub fn compare(&self, a: &CampaignDoc, b: &CampaignDoc) -> Ordering {
        let ordering = self.sort.compare(a, b);
        let ordering = match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

/// Read side and single-document writes of the campaign aggregate
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    async fn campaign(&self, id: &str) -> Result<Option<CampaignDoc>>;

    async fn team(&self, id: &str) -> Result<Option<TeamDoc>>;

    /// Victims of `campaign_id` among `ids`, returned in `ids` order
    async fn victims(&self, campaign_id: &str, ids: &[String]) -> Result<Vec<VictimDoc>>;

    /// Evidence among `ids`, returned in `ids` order
    async fn evidence(&self, ids: &[String]) -> Result<Vec<EvidenceDoc>>;

    async fn evidence_by_id(&self, id: &str) -> Result<Option<EvidenceDoc>>;

    /// Persist a new evidence record, append it to its campaign and raise the
    /// campaign's step to at least [`EVIDENCE_STEP`], as one small transaction
    async fn record_evidence(&self, evidence: &EvidenceDoc) -> Result<()>;

    /// Store a validation outcome; `None` when the evidence does not exist
    async fn set_evidence_validation(
        &self,
        id: &str,
        status: EvidenceStatus,
        report: Option<ValidationReport>,
        now: DateTime<Utc>,
    ) -> Result<Option<EvidenceDoc>>;

    /// Every campaign created by `owner`
    async fn campaigns_by_owner(&self, owner: &str) -> Result<Vec<CampaignDoc>>;

    /// One page of `owner`'s campaigns plus the unpaged match count
    async fn list_owned(&self, owner: &str, query: &CampaignQuery)
        -> Result<(Vec<CampaignDoc>, u64)>;

    /// Teams with `user_id` in any named slot or additional member
    async fn teams_with_member(&self, user_id: &str) -> Result<Vec<TeamDoc>>;

    async fn campaigns_by_ids(&self, ids: &[String]) -> Result<Vec<CampaignDoc>>;

    /// Readiness probe
    async fn ping(&self) -> Result<()>;
}

/// Unit of work over campaign, team and victim documents
#[async_trait]
pub trait StoreTransaction: Send {
    async fn campaign(&mut self, id: &str) -> Result<Option<CampaignDoc>>;

    async fn team(&mut self, id: &str) -> Result<Option<TeamDoc>>;

    /// Victims of `campaign_id` among `ids`
    async fn victims(&mut self, campaign_id: &str, ids: &[String]) -> Result<Vec<VictimDoc>>;

    async fn count_evidence(&mut self, campaign_id: &str) -> Result<u64>;

    async fn insert_campaign(&mut self, campaign: &CampaignDoc) -> Result<()>;

    /// Replace an existing campaign; `NotFound` when it vanished
    async fn save_campaign(&mut self, campaign: &CampaignDoc) -> Result<()>;

    async fn insert_team(&mut self, team: &TeamDoc) -> Result<()>;

    async fn save_team(&mut self, team: &TeamDoc) -> Result<()>;

    async fn upsert_victim(&mut self, victim: &VictimDoc) -> Result<()>;

    async fn delete_victims(&mut self, ids: &[String]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Reorder `docs` to follow `ids`, dropping ids with no document
pub(crate) fn in_id_order<T, F>(ids: &[String], mut docs: Vec<T>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut ordered = Vec::with_capacity(docs.len());
    for id in ids {
        if let Some(pos) = docs.iter().position(|d| id_of(d) == id.as_str()) {
            ordered.push(docs.swap_remove(pos));
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(title: &str, tags: &[&str], status: CampaignStatus) -> CampaignDoc {
        let mut c = CampaignDoc::new(
            "owner".into(),
            title.into(),
            "Description".into(),
            "Short".into(),
            "education".into(),
            Utc::now(),
        );
        c.tags = tags.iter().map(|t| t.to_string()).collect();
        c.status = status;
        c
    }

    #[test]
    fn test_query_search_is_case_insensitive_over_tags() {
        let query = CampaignQuery {
            search: Some("WATER".into()),
            ..Default::default()
        };
        assert!(query.matches(&campaign("Clean rivers", &["water"], CampaignStatus::Draft)));
        assert!(!query.matches(&campaign("Schools", &["books"], CampaignStatus::Draft)));
    }

    #[test]
    fn test_query_status_filter() {
        let query = CampaignQuery {
            statuses: vec![CampaignStatus::Active],
            ..Default::default()
        };
        assert!(query.matches(&campaign("A", &[], CampaignStatus::Active)));
        assert!(!query.matches(&campaign("B", &[], CampaignStatus::Draft)));
    }

    #[test]
    fn test_query_skip() {
        let query = CampaignQuery {
            page: 3,
            limit: 10,
            ..Default::default()
        };
        assert_eq!(query.skip(), 20);
        assert_eq!(CampaignQuery { page: 0, ..Default::default() }.skip(), 0);
    }

    #[test]
    fn test_sort_field_parsing() {
        assert_eq!("title".parse::<SortField>().unwrap(), SortField::Title);
        assert_eq!("views".parse::<SortField>().unwrap(), SortField::Views);
        assert!("password".parse::<SortField>().is_err());
    }

    #[test]
    fn test_in_id_order_follows_ids() {
        let ids = vec!["b".to_string(), "a".to_string(), "zz".to_string()];
        let docs = vec!["a".to_string(), "b".to_string()];
        let ordered = in_id_order(&ids, docs, |d| d.as_str());
        assert_eq!(ordered, vec!["b".to_string(), "a".to_string()]);
    }
}
