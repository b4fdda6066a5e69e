//! Victim list reconciliation for step 3
//!
//! Full replacement: the submitted list is the complete desired set. Entries
//! carrying the `_id` of an existing victim update it, the rest are created,
//! and existing victims missing from the submission are deleted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::db::schemas::{new_id, VictimDoc};
use crate::types::{CampaignError, FieldError, Result};
use crate::workflow::payload::{parse_optional_date, trimmed, VictimInput};

/// What the step transaction has to write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VictimPlan {
    /// Every victim to write, kept-or-updated and created alike
    pub upserts: Vec<VictimDoc>,
    /// New campaign victim list, submission order
    pub ordered_ids: Vec<String>,
    pub kept_or_updated_ids: Vec<String>,
    pub created_ids: Vec<String>,
    pub deleted_ids: Vec<String>,
}

/// Plan the step 3 writes for `submitted` against the campaign's `existing`
/// victims. Pure; nothing is persisted here.
pub fn reconcile(
    existing: &[VictimDoc],
    submitted: Vec<VictimInput>,
    campaign_id: &str,
    submitter: &str,
    now: DateTime<Utc>,
) -> Result<VictimPlan> {
    let by_id: HashMap<&str, &VictimDoc> = existing.iter().map(|v| (v.id.as_str(), v)).collect();

    let mut plan = VictimPlan::default();
    let mut planned: HashMap<String, usize> = HashMap::new();
    let mut field_errors = Vec::new();

    for (index, input) in submitted.into_iter().enumerate() {
        let existing_id = input
            .id
            .as_deref()
            .and_then(|id| by_id.get(id))
            .map(|v| v.id.clone());

        match existing_id {
            Some(id) => {
                // A repeated `_id` merges into the entry already planned
                let pos = match planned.get(&id) {
                    Some(&pos) => pos,
                    None => {
                        let pos = plan.upserts.len();
                        plan.upserts.push(by_id[id.as_str()].clone());
                        plan.ordered_ids.push(id.clone());
                        plan.kept_or_updated_ids.push(id.clone());
                        planned.insert(id, pos);
                        pos
                    }
                };
                let victim = &mut plan.upserts[pos];
                if let Err(e) = merge(victim, input, index) {
                    field_errors.extend(field_detail(e));
                }
                victim.updated_at = now;
            }
            None => match create(input, campaign_id, submitter, now, index) {
                Ok(victim) => {
                    plan.ordered_ids.push(victim.id.clone());
                    plan.created_ids.push(victim.id.clone());
                    plan.upserts.push(victim);
                }
                Err(e) => field_errors.extend(field_detail(e)),
            },
        }
    }

    if !field_errors.is_empty() {
        return Err(CampaignError::Validation {
            message: "Invalid victim records".to_string(),
            fields: field_errors,
        });
    }

    plan.deleted_ids = existing
        .iter()
        .filter(|v| !planned.contains_key(&v.id))
        .map(|v| v.id.clone())
        .collect();

    Ok(plan)
}

fn field_detail(err: CampaignError) -> Vec<FieldError> {
    match err {
        CampaignError::Validation { fields, message } if fields.is_empty() => {
            vec![FieldError::new("victims", message)]
        }
        CampaignError::Validation { fields, .. } => fields,
        other => vec![FieldError::new("victims", other.to_string())],
    }
}

fn field(index: usize, name: &str) -> String {
    format!("victims[{}].{}", index, name)
}

fn merge(victim: &mut VictimDoc, input: VictimInput, index: usize) -> Result<()> {
    if let Some(name) = trimmed(input.name.as_deref()) {
        victim.name = name;
    }
    if input.age.is_some() {
        victim.age = input.age;
    }
    if let Some(gender) = trimmed(input.gender.as_deref()) {
        victim.gender = Some(gender);
    }
    if input.location.is_some() {
        victim.location = input.location;
    }
    if let Some(phone) = trimmed(input.contact_phone.as_deref()) {
        victim.contact_phone = Some(phone);
    }
    if let Some(email) = trimmed(input.contact_email.as_deref()) {
        victim.contact_email = Some(email);
    }
    if let Some(level) = input.privacy_level {
        victim.privacy_level = level;
    }
    if let Some(story) = trimmed(input.story.as_deref()) {
        victim.story = Some(story);
    }
    if let Some(date) = parse_optional_date(&field(index, "incidentDate"), input.incident_date.as_deref())? {
        victim.incident_date = Some(date);
    }
    if let Some(status) = trimmed(input.current_status.as_deref()) {
        victim.current_status = Some(status);
    }
    if let Some(needs) = input.needs {
        victim.needs = needs
            .iter()
            .filter_map(|n| trimmed(Some(n)))
            .collect();
    }
    Ok(())
}

fn create(
    input: VictimInput,
    campaign_id: &str,
    submitter: &str,
    now: DateTime<Utc>,
    index: usize,
) -> Result<VictimDoc> {
    let name = trimmed(input.name.as_deref())
        .ok_or_else(|| CampaignError::invalid_field(field(index, "name"), "is required"))?;

    let mut victim = VictimDoc {
        id: new_id(),
        campaign: campaign_id.to_string(),
        name,
        age: None,
        gender: None,
        location: None,
        contact_phone: None,
        contact_email: None,
        privacy_level: Default::default(),
        story: None,
        incident_date: None,
        current_status: None,
        needs: Vec::new(),
        added_by: submitter.to_string(),
        created_at: now,
        updated_at: now,
    };
    merge(&mut victim, input, index)?;
    Ok(victim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::PrivacyLevel;

    fn named(name: &str) -> VictimInput {
        VictimInput {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn with_id(id: &str, name: &str) -> VictimInput {
        VictimInput {
            id: Some(id.into()),
            ..named(name)
        }
    }

    fn apply(existing: &[VictimDoc], submitted: Vec<VictimInput>) -> VictimPlan {
        reconcile(existing, submitted, "c1", "owner", Utc::now()).unwrap()
    }

    #[test]
    fn test_creates_fresh_victims() {
        let plan = apply(&[], vec![named("A"), named("B")]);
        assert_eq!(plan.created_ids.len(), 2);
        assert!(plan.kept_or_updated_ids.is_empty());
        assert!(plan.deleted_ids.is_empty());
        assert_eq!(plan.upserts[0].campaign, "c1");
        assert_eq!(plan.upserts[0].added_by, "owner");
        assert_eq!(plan.ordered_ids, plan.created_ids);
    }

    #[test]
    fn test_replacement_updates_creates_and_deletes() {
        let first = apply(&[], vec![named("A"), named("B")]);
        let a = first.upserts[0].clone();
        let b = first.upserts[1].clone();

        let second = apply(
            &[a.clone(), b.clone()],
            vec![with_id(&b.id, "B renamed"), named("C")],
        );

        assert_eq!(second.kept_or_updated_ids, vec![b.id.clone()]);
        assert_eq!(second.created_ids.len(), 1);
        assert_eq!(second.deleted_ids, vec![a.id.clone()]);
        assert_eq!(second.ordered_ids[0], b.id);
        assert_eq!(second.upserts[0].name, "B renamed");
        assert_eq!(second.upserts[1].name, "C");
    }

    #[test]
    fn test_update_keeps_identity_and_unsent_fields() {
        let mut first = apply(&[], vec![named("A")]);
        let mut a = first.upserts.remove(0);
        a.story = Some("Original story".into());

        let plan = apply(
            &[a.clone()],
            vec![VictimInput {
                id: Some(a.id.clone()),
                privacy_level: Some(PrivacyLevel::Private),
                ..Default::default()
            }],
        );

        let updated = &plan.upserts[0];
        assert_eq!(updated.id, a.id);
        assert_eq!(updated.name, "A");
        assert_eq!(updated.story.as_deref(), Some("Original story"));
        assert_eq!(updated.privacy_level, PrivacyLevel::Private);
        assert_eq!(updated.created_at, a.created_at);
    }

    #[test]
    fn test_foreign_id_is_created_fresh() {
        let plan = apply(&[], vec![with_id("not-ours", "Stranger")]);
        assert_eq!(plan.created_ids.len(), 1);
        assert_ne!(plan.created_ids[0], "not-ours");
    }

    #[test]
    fn test_new_victim_requires_name() {
        let err = reconcile(&[], vec![named("A"), VictimInput::default()], "c1", "owner", Utc::now())
            .unwrap_err();
        match err {
            CampaignError::Validation { fields, .. } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "victims[1].name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_incident_date_is_field_error() {
        let err = reconcile(
            &[],
            vec![VictimInput {
                incident_date: Some("yesterday".into()),
                ..named("A")
            }],
            "c1",
            "owner",
            Utc::now(),
        )
        .unwrap_err();
        match err {
            CampaignError::Validation { fields, .. } => {
                assert_eq!(fields[0].field, "victims[0].incidentDate");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_is_written_once() {
        let a = apply(&[], vec![named("A")]).upserts.remove(0);
        let plan = apply(
            &[a.clone()],
            vec![with_id(&a.id, "First"), with_id(&a.id, "Second")],
        );
        assert_eq!(plan.upserts.len(), 1);
        assert_eq!(plan.ordered_ids, vec![a.id.clone()]);
        assert_eq!(plan.upserts[0].name, "Second");
    }
}
