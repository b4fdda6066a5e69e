//! Read side: single campaign, owner listings, team listings and stats

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::schemas::{
    CampaignDoc, CampaignStatus, EngagementMetrics, TeamDoc, TeamMember, TeamRole,
};
use crate::store::{CampaignQuery, CampaignStore};
use crate::types::{CampaignError, Result};
use crate::workflow::aggregate::{populate, CampaignAggregate};

/// Campaigns shown in popularity rankings
const POPULAR_LIMIT: usize = 5;

/// Invitations shown in the recent-team feed
const RECENT_MEMBERS_LIMIT: usize = 10;

/// Listing row for the owner's dashboard
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub short_description: String,
    pub status: CampaignStatus,
    pub creation_step: u8,
    pub creation_complete: bool,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl From<CampaignDoc> for CampaignSummary {
    fn from(c: CampaignDoc) -> Self {
        Self {
            id: c.id,
            title: c.title,
            short_description: c.short_description,
            status: c.status,
            creation_step: c.creation_step,
            creation_complete: c.creation_complete,
            category: c.category,
            cover_image: c.cover_image,
            updated_at: c.updated_at,
            end_date: c.end_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(total: u64, page: u64, limit: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            page,
            limit,
            pages,
            has_next_page: page < pages,
            has_prev_page: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusAnalytics {
    /// Count per status; statuses without campaigns are omitted
    pub status_counts: BTreeMap<String, u64>,
    pub total: u64,
}

/// One page of the owner's campaigns
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MyCampaigns {
    pub campaigns: Vec<CampaignSummary>,
    pub pagination: Pagination,
    pub analytics: StatusAnalytics,
}

/// Campaign where the caller sits on the team without owning it
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamCampaignSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub short_description: String,
    pub status: CampaignStatus,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    /// Caller's role on the team
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CampaignCounts {
    pub total: u64,
    pub active: u64,
    pub draft: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngagementTotals {
    pub total_views: i64,
    pub total_shares: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub total_supporters: i64,
    pub total_signatures: i64,
}

impl EngagementTotals {
    fn add(&mut self, m: &EngagementMetrics) {
        self.total_views += m.views;
        self.total_shares += m.shares;
        self.total_likes += m.likes;
        self.total_comments += m.comments;
        self.total_supporters += m.supporters;
        self.total_signatures += m.signature_count;
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopularCampaign {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub short_description: String,
    pub engagement_metrics: EngagementMetrics,
    pub status: CampaignStatus,
}

/// Invitation on a team led by the caller
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamInvitation {
    pub campaign: String,
    pub role: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub accepted_invite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStats {
    pub campaigns: CampaignCounts,
    pub engagement: EngagementTotals,
    pub popular_campaigns: Vec<PopularCampaign>,
    pub recent_team_members: Vec<TeamInvitation>,
}

/// Read-only views over the store
#[derive(Clone)]
pub struct CampaignQueries {
    store: Arc<dyn CampaignStore>,
}

impl CampaignQueries {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Populated campaign, public
    pub async fn get_campaign(&self, id: &str) -> Result<CampaignAggregate> {
        let campaign = self
            .store
            .campaign(id)
            .await?
            .ok_or_else(|| CampaignError::NotFound(format!("Campaign {}", id)))?;
        populate(self.store.as_ref(), campaign).await
    }

    pub async fn my_campaigns(&self, owner: &str, query: &CampaignQuery) -> Result<MyCampaigns> {
        let (page, matched) = self.store.list_owned(owner, query).await?;

        let owned = self.store.campaigns_by_owner(owner).await?;
        let mut status_counts = BTreeMap::new();
        for campaign in &owned {
            *status_counts
                .entry(campaign.status.as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(MyCampaigns {
            campaigns: page.into_iter().map(CampaignSummary::from).collect(),
            pagination: Pagination::new(matched, query.page, query.limit),
            analytics: StatusAnalytics {
                status_counts,
                total: matched,
            },
        })
    }

    pub async fn team_campaigns(&self, user_id: &str) -> Result<Vec<TeamCampaignSummary>> {
        let teams = self.store.teams_with_member(user_id).await?;
        let campaign_ids: Vec<String> = teams.iter().map(|t| t.campaign.clone()).collect();
        let campaigns = self.store.campaigns_by_ids(&campaign_ids).await?;

        Ok(campaigns
            .into_iter()
            .filter(|c| !c.is_owned_by(user_id))
            .filter_map(|c| {
                let team = teams.iter().find(|t| t.campaign == c.id)?;
                Some(TeamCampaignSummary {
                    role: member_role(team, user_id),
                    id: c.id,
                    title: c.title,
                    short_description: c.short_description,
                    status: c.status,
                    category: c.category,
                    cover_image: c.cover_image,
                    updated_at: c.updated_at,
                    created_by: c.created_by,
                })
            })
            .collect())
    }

    pub async fn campaign_stats(&self, user_id: &str) -> Result<CampaignStats> {
        let owned = self.store.campaigns_by_owner(user_id).await?;

        let mut counts = CampaignCounts::default();
        let mut engagement = EngagementTotals::default();
        for campaign in &owned {
            counts.total += 1;
            match campaign.status {
                CampaignStatus::Active => counts.active += 1,
                CampaignStatus::Draft => counts.draft += 1,
                CampaignStatus::Completed => counts.completed += 1,
                CampaignStatus::Archived | CampaignStatus::Rejected => {}
            }
            engagement.add(&campaign.engagement_metrics);
        }

        let mut popular: Vec<&CampaignDoc> = owned.iter().collect();
        popular.sort_by(|a, b| {
            b.engagement_metrics
                .views
                .cmp(&a.engagement_metrics.views)
                .then_with(|| a.id.cmp(&b.id))
        });
        let popular_campaigns = popular
            .into_iter()
            .take(POPULAR_LIMIT)
            .map(|c| PopularCampaign {
                id: c.id.clone(),
                title: c.title.clone(),
                short_description: c.short_description.clone(),
                engagement_metrics: c.engagement_metrics.clone(),
                status: c.status,
            })
            .collect();

        let led: Vec<TeamDoc> = self
            .store
            .teams_with_member(user_id)
            .await?
            .into_iter()
            .filter(|t| t.leader.is_user(user_id))
            .collect();

        Ok(CampaignStats {
            campaigns: counts,
            engagement,
            popular_campaigns,
            recent_team_members: recent_invitations(&led),
        })
    }
}

/// Label of the slot `user_id` holds on `team`
fn member_role(team: &TeamDoc, user_id: &str) -> String {
    if let Some(role) = team.role_of(user_id) {
        return role.key().to_string();
    }
    team.additional_members
        .iter()
        .find(|m| m.user_id.as_deref() == Some(user_id))
        .map(|m| m.display_role().to_string())
        .unwrap_or_else(|| "member".to_string())
}

fn invitation(campaign: &str, role: &str, member: &TeamMember) -> Option<TeamInvitation> {
    Some(TeamInvitation {
        campaign: campaign.to_string(),
        role: role.to_string(),
        user_id: member.user_id.clone()?,
        name: member.name.clone(),
        accepted_invite: member.accepted_invite,
        invited_at: member.invited_at,
    })
}

/// Most recent invitations across `teams`, leader slots excluded
fn recent_invitations(teams: &[TeamDoc]) -> Vec<TeamInvitation> {
    let mut invitations: Vec<TeamInvitation> = Vec::new();

    for team in teams {
        for role in TeamRole::NAMED.into_iter().skip(1) {
            if let Some(inv) = team
                .slot(role)
                .and_then(|m| invitation(&team.campaign, role.key(), m))
            {
                invitations.push(inv);
            }
        }
        for member in &team.additional_members {
            let Some(user_id) = member.user_id.clone() else {
                continue;
            };
            invitations.push(TeamInvitation {
                campaign: team.campaign.clone(),
                role: member.display_role().to_string(),
                user_id,
                name: member.name.clone(),
                accepted_invite: member.accepted_invite,
                invited_at: member.invited_at,
            });
        }
    }

    // Newest first, never-invited last
    invitations.sort_by(|a, b| b.invited_at.cmp(&a.invited_at));
    invitations.truncate(RECENT_MEMBERS_LIMIT);
    invitations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use crate::store::{MemoryCampaignStore, SortField, SortOrder};
    use crate::workflow::engine::StepEngine;
    use crate::workflow::payload::CreateCampaignInput;
    use chrono::Duration;
    use serde_json::json;

    fn user(id: &str) -> AuthUser {
        AuthUser {
            user_id: id.into(),
            role: "user".into(),
            name: None,
            email: None,
        }
    }

    fn input(title: &str) -> CreateCampaignInput {
        CreateCampaignInput {
            title: Some(title.into()),
            description: Some("D".into()),
            short_description: Some("S".into()),
            category: Some("education".into()),
            ..Default::default()
        }
    }

    async fn setup() -> (StepEngine, CampaignQueries) {
        let store: Arc<dyn CampaignStore> = Arc::new(MemoryCampaignStore::new());
        (StepEngine::new(store.clone()), CampaignQueries::new(store))
    }

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(21, 2, 10);
        assert_eq!(p.pages, 3);
        assert!(p.has_next_page);
        assert!(p.has_prev_page);

        let last = Pagination::new(21, 3, 10);
        assert!(!last.has_next_page);

        let empty = Pagination::new(0, 1, 10);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next_page);
        assert!(!empty.has_prev_page);
    }

    #[test]
    fn test_recent_invitations_sorted_and_capped() {
        let base = Utc::now();
        let mut teams = Vec::new();
        for i in 0..6 {
            let mut team = TeamDoc::with_leader(format!("c{i}"), "lead".into(), None, None, base);
            team.co_leader = Some(TeamMember {
                user_id: Some(format!("co{i}")),
                invited_at: Some(base + Duration::minutes(i)),
                ..Default::default()
            });
            team.finance_manager = Some(TeamMember {
                user_id: Some(format!("fm{i}")),
                invited_at: Some(base - Duration::minutes(i)),
                ..Default::default()
            });
            teams.push(team);
        }

        let recent = recent_invitations(&teams);
        assert_eq!(recent.len(), RECENT_MEMBERS_LIMIT);
        assert_eq!(recent[0].user_id, "co5");
        assert!(recent.iter().all(|inv| inv.user_id != "lead"));
    }

    #[tokio::test]
    async fn test_get_campaign_not_found() {
        let (_, queries) = setup().await;
        let err = queries.get_campaign("nope").await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_my_campaigns_pages_with_status_counts() {
        let (engine, queries) = setup().await;
        for title in ["Alpha", "Beta", "Gamma"] {
            engine.create_campaign(&user("owner"), input(title)).await.unwrap();
        }
        engine.create_campaign(&user("other"), input("Delta")).await.unwrap();

        let query = CampaignQuery {
            page: 1,
            limit: 2,
            sort: SortField::Title,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let mine = queries.my_campaigns("owner", &query).await.unwrap();
        assert_eq!(mine.campaigns.len(), 2);
        assert_eq!(mine.campaigns[0].title, "Alpha");
        assert_eq!(mine.pagination.total, 3);
        assert_eq!(mine.pagination.pages, 2);
        assert_eq!(mine.analytics.status_counts.get("draft"), Some(&3));
    }

    #[tokio::test]
    async fn test_team_campaigns_excludes_own() {
        let (engine, queries) = setup().await;
        let theirs = engine.create_campaign(&user("owner"), input("Theirs")).await.unwrap();
        engine.create_campaign(&user("u2"), input("Mine")).await.unwrap();

        engine.apply_step(&theirs.id, "owner", 1, json!({})).await.unwrap();
        engine
            .apply_step(&theirs.id, "owner", 2, json!({ "coLeader": { "userId": "u2" } }))
            .await
            .unwrap();

        let listed = queries.team_campaigns("u2").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, theirs.id);
        assert_eq!(listed[0].role, "coLeader");
    }

    #[tokio::test]
    async fn test_campaign_stats() {
        let (engine, queries) = setup().await;
        let first = engine.create_campaign(&user("owner"), input("First")).await.unwrap();
        engine.create_campaign(&user("owner"), input("Second")).await.unwrap();

        engine.apply_step(&first.id, "owner", 1, json!({})).await.unwrap();
        engine
            .apply_step(
                &first.id,
                "owner",
                2,
                json!({ "additionalMembers": [{ "userId": "helper", "role": "designer" }] }),
            )
            .await
            .unwrap();
        engine.apply_step(&first.id, "owner", 3, json!({})).await.unwrap();
        engine
            .apply_step(
                &first.id,
                "owner",
                4,
                json!({ "skipEvidenceRequirement": true, "publishNow": true }),
            )
            .await
            .unwrap();

        let stats = queries.campaign_stats("owner").await.unwrap();
        assert_eq!(stats.campaigns.total, 2);
        assert_eq!(stats.campaigns.active, 1);
        assert_eq!(stats.campaigns.draft, 1);
        assert_eq!(stats.popular_campaigns.len(), 2);
        assert_eq!(stats.recent_team_members.len(), 1);
        assert_eq!(stats.recent_team_members[0].role, "designer");
        assert!(!stats.recent_team_members[0].accepted_invite);
    }
}
