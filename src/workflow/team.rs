//! Team roster reconciliation for step 2
//!
//! Named roles follow an invitation cycle: a slot whose `userId` changes is
//! re-invited, otherwise only contact details are merged. Additional members
//! are additive-only; omitting one from a submission never removes it.

use chrono::{DateTime, Utc};

use crate::db::schemas::{new_id, AdditionalMember, TeamDoc, TeamMember, TeamRole};
use crate::workflow::payload::{trimmed, AdditionalMemberInput, MemberInput, TeamInput};

/// Apply a step 2 submission to `existing`, returning the new roster
pub fn reconcile(existing: &TeamDoc, input: TeamInput, now: DateTime<Utc>) -> TeamDoc {
    let mut team = existing.clone();

    let TeamInput {
        leader,
        co_leader,
        social_media_coordinator,
        volunteer_coordinator,
        finance_manager,
        additional_members,
        communication_channels,
    } = input;

    let submitted = [
        (TeamRole::Leader, leader),
        (TeamRole::CoLeader, co_leader),
        (TeamRole::SocialMediaCoordinator, social_media_coordinator),
        (TeamRole::VolunteerCoordinator, volunteer_coordinator),
        (TeamRole::FinanceManager, finance_manager),
    ];
    for (role, slot) in submitted {
        if let Some(slot) = slot {
            let member = reconcile_slot(existing.slot(role), slot, now);
            team.set_slot(role, member);
        }
    }

    if let Some(members) = additional_members {
        team.additional_members = reconcile_additional(&existing.additional_members, members, now);
    }

    if let Some(channels) = communication_channels {
        team.communication_channels = Some(channels);
    }

    team.updated_at = now;
    team
}

fn reconcile_slot(current: Option<&TeamMember>, input: MemberInput, now: DateTime<Utc>) -> TeamMember {
    let submitted_user = trimmed(input.user_id.as_deref());
    let current_user = current.and_then(|m| m.user_id.clone());

    let mut member = match submitted_user {
        Some(user_id) if Some(&user_id) != current_user.as_ref() => TeamMember {
            user_id: Some(user_id),
            name: None,
            email: None,
            invited_at: Some(now),
            accepted_invite: false,
            joined_at: None,
        },
        _ => current.cloned().unwrap_or_default(),
    };

    if let Some(name) = trimmed(input.name.as_deref()) {
        member.name = Some(name);
    }
    if let Some(email) = trimmed(input.email.as_deref()) {
        member.email = Some(email);
    }
    member
}

fn matches_member(existing: &AdditionalMember, input: &AdditionalMemberInput) -> bool {
    if input.id.as_deref() == Some(existing.id.as_str()) {
        return true;
    }
    match (&existing.user_id, trimmed(input.user_id.as_deref())) {
        (Some(existing_user), Some(user_id)) => *existing_user == user_id,
        _ => false,
    }
}

fn merge_member(existing: &AdditionalMember, input: &AdditionalMemberInput) -> AdditionalMember {
    let mut member = existing.clone();
    if member.user_id.is_none() {
        member.user_id = trimmed(input.user_id.as_deref());
    }
    if let Some(name) = trimmed(input.name.as_deref()) {
        member.name = Some(name);
    }
    if let Some(email) = trimmed(input.email.as_deref()) {
        member.email = Some(email);
    }
    if let Some(role) = trimmed(input.role.as_deref()) {
        member.role = Some(role);
    }
    if let Some(title) = trimmed(input.custom_role_title.as_deref()) {
        member.custom_role_title = Some(title);
    }
    member
}

fn reconcile_additional(
    existing: &[AdditionalMember],
    submitted: Vec<AdditionalMemberInput>,
    now: DateTime<Utc>,
) -> Vec<AdditionalMember> {
    let mut members: Vec<AdditionalMember> = existing
        .iter()
        .map(|current| match submitted.iter().find(|m| matches_member(current, m)) {
            Some(update) => merge_member(current, update),
            None => current.clone(),
        })
        .collect();

    for input in submitted
        .iter()
        .filter(|m| !existing.iter().any(|current| matches_member(current, m)))
    {
        members.push(AdditionalMember {
            id: new_id(),
            user_id: trimmed(input.user_id.as_deref()),
            name: trimmed(input.name.as_deref()),
            email: trimmed(input.email.as_deref()),
            role: trimmed(input.role.as_deref()),
            custom_role_title: trimmed(input.custom_role_title.as_deref()),
            invited_at: Some(now),
            accepted_invite: false,
            joined_at: None,
        });
    }

    members
}
