//! Team role permissions and membership checks

use serde::Serialize;

use crate::db::schemas::{TeamDoc, TeamRole};

/// Capabilities granted by a team slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPermissions {
    pub can_edit_campaign: bool,
    pub can_post_updates: bool,
    pub can_manage_team: bool,
    pub can_moderate_comments: bool,
    pub can_view_analytics: bool,
    pub can_manage_resources: bool,
}

/// Granted to accepted additional members
pub const ADDITIONAL_MEMBER_PERMISSIONS: TeamPermissions = TeamPermissions {
    can_edit_campaign: false,
    can_post_updates: false,
    can_manage_team: false,
    can_moderate_comments: false,
    can_view_analytics: true,
    can_manage_resources: false,
};

/// Fixed permission set of a named role
pub fn permissions_for(role: TeamRole) -> TeamPermissions {
    match role {
        TeamRole::Leader => TeamPermissions {
            can_edit_campaign: true,
            can_post_updates: true,
            can_manage_team: true,
            can_moderate_comments: true,
            can_view_analytics: true,
            can_manage_resources: true,
        },
        TeamRole::CoLeader => TeamPermissions {
            can_edit_campaign: true,
            can_post_updates: true,
            can_manage_team: false,
            can_moderate_comments: true,
            can_view_analytics: true,
            can_manage_resources: true,
        },
        TeamRole::SocialMediaCoordinator => TeamPermissions {
            can_edit_campaign: false,
            can_post_updates: true,
            can_manage_team: false,
            can_moderate_comments: true,
            can_view_analytics: true,
            can_manage_resources: false,
        },
        TeamRole::VolunteerCoordinator => TeamPermissions {
            can_edit_campaign: false,
            can_post_updates: true,
            can_manage_team: false,
            can_moderate_comments: false,
            can_view_analytics: true,
            can_manage_resources: true,
        },
        TeamRole::FinanceManager => TeamPermissions {
            can_edit_campaign: false,
            can_post_updates: false,
            can_manage_team: false,
            can_moderate_comments: false,
            can_view_analytics: true,
            can_manage_resources: true,
        },
    }
}

/// Permissions `user_id` holds on `team`, if any.
///
/// Named slots count regardless of invite acceptance; additional members only
/// once they accepted.
pub fn team_permissions(team: &TeamDoc, user_id: &str) -> Option<TeamPermissions> {
    if let Some(role) = team.role_of(user_id) {
        return Some(permissions_for(role));
    }

    team.additional_members
        .iter()
        .any(|m| m.accepted_invite && m.user_id.as_deref() == Some(user_id))
        .then_some(ADDITIONAL_MEMBER_PERMISSIONS)
}

/// Whether `user_id` may act as a member of `team`
pub fn is_authorized(team: &TeamDoc, user_id: &str) -> bool {
    team_permissions(team, user_id).is_some()
}
