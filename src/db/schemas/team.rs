//! Team document schema
//!
//! One team per campaign: five fixed role slots plus an open-ended list of
//! additional members.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::new_id;

/// Collection name for teams
pub const TEAM_COLLECTION: &str = "campaignteams";

/// Fallback display name for a leader without a profile name
pub const DEFAULT_LEADER_NAME: &str = "Campaign Leader";

/// Occupant of a team slot
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_invite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl TeamMember {
    /// Whether this slot is held by `user_id`
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

/// Member outside the five named roles
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMember {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_role_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_invite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl AdditionalMember {
    /// Role label shown to users; the custom title wins over the generic role
    pub fn display_role(&self) -> &str {
        self.custom_role_title
            .as_deref()
            .or(self.role.as_deref())
            .unwrap_or("member")
    }
}

/// The five fixed team roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamRole {
    Leader,
    CoLeader,
    SocialMediaCoordinator,
    VolunteerCoordinator,
    FinanceManager,
}

impl TeamRole {
    /// Every named slot, leader first
    pub const NAMED: [TeamRole; 5] = [
        TeamRole::Leader,
        TeamRole::CoLeader,
        TeamRole::SocialMediaCoordinator,
        TeamRole::VolunteerCoordinator,
        TeamRole::FinanceManager,
    ];

    /// Document and payload key for this slot
    pub fn key(&self) -> &'static str {
        match self {
            TeamRole::Leader => "leader",
            TeamRole::CoLeader => "coLeader",
            TeamRole::SocialMediaCoordinator => "socialMediaCoordinator",
            TeamRole::VolunteerCoordinator => "volunteerCoordinator",
            TeamRole::FinanceManager => "financeManager",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Team document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Owning campaign id
    pub campaign: String,

    pub leader: TeamMember,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co_leader: Option<TeamMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_media_coordinator: Option<TeamMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_coordinator: Option<TeamMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finance_manager: Option<TeamMember>,

    #[serde(default)]
    pub additional_members: Vec<AdditionalMember>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_channels: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamDoc {
    /// New team whose leader is the campaign creator, already accepted
    pub fn with_leader(
        campaign: String,
        user_id: String,
        name: Option<String>,
        email: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEADER_NAME.to_string());

        Self {
            id: new_id(),
            campaign,
            leader: TeamMember {
                user_id: Some(user_id),
                name: Some(name),
                email,
                invited_at: None,
                accepted_invite: true,
                joined_at: Some(now),
            },
            co_leader: None,
            social_media_coordinator: None,
            volunteer_coordinator: None,
            finance_manager: None,
            additional_members: Vec::new(),
            communication_channels: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self, role: TeamRole) -> Option<&TeamMember> {
        match role {
            TeamRole::Leader => Some(&self.leader),
            TeamRole::CoLeader => self.co_leader.as_ref(),
            TeamRole::SocialMediaCoordinator => self.social_media_coordinator.as_ref(),
            TeamRole::VolunteerCoordinator => self.volunteer_coordinator.as_ref(),
            TeamRole::FinanceManager => self.finance_manager.as_ref(),
        }
    }

    pub fn set_slot(&mut self, role: TeamRole, member: TeamMember) {
        match role {
            TeamRole::Leader => self.leader = member,
            TeamRole::CoLeader => self.co_leader = Some(member),
            TeamRole::SocialMediaCoordinator => self.social_media_coordinator = Some(member),
            TeamRole::VolunteerCoordinator => self.volunteer_coordinator = Some(member),
            TeamRole::FinanceManager => self.finance_manager = Some(member),
        }
    }

    /// Named role held by `user_id`, if any
    pub fn role_of(&self, user_id: &str) -> Option<TeamRole> {
        TeamRole::NAMED
            .into_iter()
            .find(|role| self.slot(*role).is_some_and(|m| m.is_user(user_id)))
    }

    /// Whether `user_id` occupies any slot, named or additional
    pub fn has_member(&self, user_id: &str) -> bool {
        self.role_of(user_id).is_some()
            || self
                .additional_members
                .iter()
                .any(|m| m.user_id.as_deref() == Some(user_id))
    }
}

impl IntoIndexes for TeamDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        let mut indices = vec![(
            doc! { "campaign": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("campaign_unique".to_string())
                    .build(),
            ),
        )];

        // Membership lookups for team-campaigns
        for role in TeamRole::NAMED {
            let mut keys = Document::new();
            keys.insert(format!("{}.userId", role.key()), 1);
            indices.push((
                keys,
                Some(
                    IndexOptions::builder()
                        .name(format!("{}_user_index", role.key()))
                        .build(),
                ),
            ));
        }
        indices.push((
            doc! { "additionalMembers.userId": 1 },
            Some(
                IndexOptions::builder()
                    .name("additional_members_user_index".to_string())
                    .build(),
            ),
        ));

        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> TeamDoc {
        TeamDoc::with_leader("c1".into(), "u1".into(), None, None, Utc::now())
    }

    #[test]
    fn test_leader_is_auto_accepted_with_fallback_name() {
        let team = team();
        assert!(team.leader.accepted_invite);
        assert!(team.leader.joined_at.is_some());
        assert_eq!(team.leader.name.as_deref(), Some(DEFAULT_LEADER_NAME));
    }

    #[test]
    fn test_role_of_finds_named_slots() {
        let mut team = team();
        team.set_slot(
            TeamRole::FinanceManager,
            TeamMember {
                user_id: Some("u9".into()),
                ..Default::default()
            },
        );
        assert_eq!(team.role_of("u1"), Some(TeamRole::Leader));
        assert_eq!(team.role_of("u9"), Some(TeamRole::FinanceManager));
        assert_eq!(team.role_of("nobody"), None);
    }

    #[test]
    fn test_has_member_includes_additional_members() {
        let mut team = team();
        team.additional_members.push(AdditionalMember {
            id: new_id(),
            user_id: Some("u5".into()),
            ..Default::default()
        });
        assert!(team.has_member("u5"));
        assert!(!team.has_member("u6"));
    }

    #[test]
    fn test_display_role_prefers_custom_title() {
        let member = AdditionalMember {
            role: Some("designer".into()),
            custom_role_title: Some("Lead Illustrator".into()),
            ..Default::default()
        };
        assert_eq!(member.display_role(), "Lead Illustrator");
    }
}
