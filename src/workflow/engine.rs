//! Step engine for the campaign creation workflow
//!
//! Steps run strictly in order. The only exception is step 1, which may be
//! revisited at any time for edits. Each applied step runs inside one store
//! transaction covering the campaign and the team or victim documents it
//! touches. A failure anywhere rolls the whole step back.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::db::schemas::{CampaignDoc, CampaignStatus, TeamDoc, FINAL_STEP};
use crate::store::{CampaignStore, StoreTransaction};
use crate::types::{CampaignError, Result};
use crate::workflow::aggregate::{populate, CampaignAggregate};
use crate::workflow::payload::{
    normalize_tags, parse_data, parse_optional_date, trimmed, BasicInfoInput, CompletionInput,
    CreateCampaignInput, TeamInput, VictimsInput,
};
use crate::workflow::{team, victims};

/// One of the four actionable creation steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStep {
    BasicInfo = 1,
    TeamSetup = 2,
    Victims = 3,
    Completion = 4,
}

impl CreationStep {
    fn from_number(step: i64) -> Option<Self> {
        match step {
            1 => Some(CreationStep::BasicInfo),
            2 => Some(CreationStep::TeamSetup),
            3 => Some(CreationStep::Victims),
            4 => Some(CreationStep::Completion),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// Step the campaign moves to once this one is applied
    pub fn successor(self) -> u8 {
        self.number() + 1
    }

    /// Resolve a requested step against the campaign's current one.
    ///
    /// Only the current step or step 1 may be applied; step 5 is terminal.
    pub fn admit(requested: i64, current: u8) -> Result<Self> {
        match Self::from_number(requested) {
            Some(step) if step == CreationStep::BasicInfo || step.number() == current => Ok(step),
            _ => Err(CampaignError::OutOfOrderStep { requested, current }),
        }
    }
}

/// Drives campaign creation through its steps
#[derive(Clone)]
pub struct StepEngine {
    store: Arc<dyn CampaignStore>,
}

impl StepEngine {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Create a draft campaign and its team, with `requester` as the
    /// auto-accepted leader.
    pub async fn create_campaign(
        &self,
        requester: &AuthUser,
        input: CreateCampaignInput,
    ) -> Result<CampaignDoc> {
        let title = trimmed(input.title.as_deref());
        let description = trimmed(input.description.as_deref());
        let short_description = trimmed(input.short_description.as_deref());
        let category = trimmed(input.category.as_deref());

        let (Some(title), Some(description), Some(short_description), Some(category)) =
            (title.clone(), description.clone(), short_description.clone(), category.clone())
        else {
            let missing: Vec<&str> = [
                ("title", title.is_none()),
                ("description", description.is_none()),
                ("shortDescription", short_description.is_none()),
                ("category", category.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect();
            return Err(CampaignError::missing_fields(&missing));
        };

        let now = Utc::now();
        let mut campaign = CampaignDoc::new(
            requester.user_id.clone(),
            title,
            description,
            short_description,
            category,
            now,
        );
        if let Some(tags) = &input.tags {
            campaign.tags = normalize_tags(tags);
        }
        campaign.end_date = parse_optional_date("endDate", input.end_date.as_deref())?;
        campaign.location = input.location;
        campaign.cover_image = trimmed(input.cover_image.as_deref());

        let team = TeamDoc::with_leader(
            campaign.id.clone(),
            requester.user_id.clone(),
            requester.name.clone(),
            requester.email.clone(),
            now,
        );
        campaign.team = Some(team.id.clone());

        let mut tx = self.store.begin().await?;
        let written = async {
            tx.insert_campaign(&campaign).await?;
            tx.insert_team(&team).await
        }
        .await;
        finish(tx, written).await?;

        info!(campaign_id = %campaign.id, user_id = %requester.user_id, "Campaign created");
        Ok(campaign)
    }

    /// Apply `step` with its `data` to a campaign owned by `requester_id`
    pub async fn apply_step(
        &self,
        campaign_id: &str,
        requester_id: &str,
        step: i64,
        data: Value,
    ) -> Result<CampaignAggregate> {
        let mut tx = self.store.begin().await?;
        let applied = apply_in(tx.as_mut(), campaign_id, requester_id, step, data).await;
        let campaign = finish(tx, applied).await?;

        info!(
            campaign_id = %campaign_id,
            user_id = %requester_id,
            step,
            next_step = campaign.creation_step,
            "Campaign step applied"
        );

        populate(self.store.as_ref(), campaign).await
    }
}

/// Commit on success, abort on failure
async fn finish<T>(tx: Box<dyn StoreTransaction>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = tx.abort().await {
                warn!(error = %abort_err, "Failed to abort transaction");
            }
            Err(err)
        }
    }
}

async fn apply_in(
    tx: &mut dyn StoreTransaction,
    campaign_id: &str,
    requester_id: &str,
    step: i64,
    data: Value,
) -> Result<CampaignDoc> {
    let mut campaign = tx
        .campaign(campaign_id)
        .await?
        .ok_or_else(|| CampaignError::NotFound(format!("Campaign {}", campaign_id)))?;

    if !campaign.is_owned_by(requester_id) {
        warn!(
            campaign_id = %campaign_id,
            user_id = %requester_id,
            owner = %campaign.created_by,
            "Step update attempted by non-owner"
        );
        return Err(CampaignError::Forbidden(
            "Not authorized to update this campaign".into(),
        ));
    }

    let step = CreationStep::admit(step, campaign.creation_step)?;
    let now = Utc::now();

    match step {
        CreationStep::BasicInfo => apply_basic_info(&mut campaign, parse_data(data)?)?,
        CreationStep::TeamSetup => apply_team(tx, &campaign, parse_data(data)?, now).await?,
        CreationStep::Victims => {
            apply_victims(tx, &mut campaign, requester_id, parse_data(data)?, now).await?
        }
        CreationStep::Completion => apply_completion(tx, &mut campaign, parse_data(data)?).await?,
    }

    campaign.creation_step = step.successor();
    if campaign.creation_step < FINAL_STEP {
        campaign.creation_complete = false;
    }
    campaign.updated_at = now;
    tx.save_campaign(&campaign).await?;

    Ok(campaign)
}

fn apply_basic_info(campaign: &mut CampaignDoc, input: BasicInfoInput) -> Result<()> {
    if let Some(title) = trimmed(input.title.as_deref()) {
        campaign.title = title;
    }
    if let Some(description) = trimmed(input.description.as_deref()) {
        campaign.description = description;
    }
    if let Some(short) = trimmed(input.short_description.as_deref()) {
        campaign.short_description = short;
    }
    if let Some(category) = trimmed(input.category.as_deref()) {
        campaign.category = category;
    }
    if let Some(tags) = &input.tags {
        campaign.tags = normalize_tags(tags);
    }
    if let Some(end_date) = parse_optional_date("endDate", input.end_date.as_deref())? {
        campaign.end_date = Some(end_date);
    }
    if let Some(location) = input.location.filter(|l| !l.is_null()) {
        campaign.location = Some(location);
    }
    Ok(())
}

async fn apply_team(
    tx: &mut dyn StoreTransaction,
    campaign: &CampaignDoc,
    input: TeamInput,
    now: DateTime<Utc>,
) -> Result<()> {
    let team_id = campaign.team.as_deref().ok_or_else(|| {
        CampaignError::validation("Campaign team not initialized. Cannot proceed to step 2.")
    })?;
    let existing = tx
        .team(team_id)
        .await?
        .ok_or_else(|| CampaignError::NotFound(format!("Campaign team {}", team_id)))?;

    let updated = team::reconcile(&existing, input, now);
    tx.save_team(&updated).await
}

async fn apply_victims(
    tx: &mut dyn StoreTransaction,
    campaign: &mut CampaignDoc,
    requester_id: &str,
    input: VictimsInput,
    now: DateTime<Utc>,
) -> Result<()> {
    campaign.has_victims = input.has_victims.unwrap_or(false);

    let existing = tx.victims(&campaign.id, &campaign.victims).await?;

    match input.declared_victims() {
        None => {
            let ids: Vec<String> = existing.into_iter().map(|v| v.id).collect();
            tx.delete_victims(&ids).await?;
            campaign.victims.clear();
        }
        Some(submitted) => {
            let plan = victims::reconcile(&existing, submitted, &campaign.id, requester_id, now)?;
            for victim in &plan.upserts {
                tx.upsert_victim(victim).await?;
            }
            tx.delete_victims(&plan.deleted_ids).await?;
            campaign.victims = plan.ordered_ids;
        }
    }
    Ok(())
}

async fn apply_completion(
    tx: &mut dyn StoreTransaction,
    campaign: &mut CampaignDoc,
    input: CompletionInput,
) -> Result<()> {
    let evidence_count = tx.count_evidence(&campaign.id).await?;

    if evidence_count == 0 && !input.skip_evidence_requirement {
        return Err(CampaignError::validation(
            "At least one piece of evidence is required to complete campaign creation",
        ));
    }

    campaign.creation_complete = true;
    campaign.evidence_requirement_skipped = evidence_count == 0;

    if input.publish_now {
        campaign.status = CampaignStatus::Active;
        campaign.engagement_metrics.views = 0;
        campaign.engagement_metrics.supporters = 0;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{
        new_id, EvidenceDoc, EvidencePermissions, EvidenceStatus, EvidenceType,
    };
    use crate::store::MemoryCampaignStore;
    use serde_json::json;

    fn owner() -> AuthUser {
        AuthUser {
            user_id: "owner".into(),
            role: "user".into(),
            name: Some("Olive Owner".into()),
            email: Some("olive@example.com".into()),
        }
    }

    fn basic_input() -> CreateCampaignInput {
        CreateCampaignInput {
            title: Some(" T ".into()),
            description: Some("D".into()),
            short_description: Some("S".into()),
            category: Some("education".into()),
            ..Default::default()
        }
    }

    async fn setup() -> (StepEngine, Arc<MemoryCampaignStore>, CampaignDoc) {
        let store = Arc::new(MemoryCampaignStore::new());
        let engine = StepEngine::new(store.clone());
        let campaign = engine.create_campaign(&owner(), basic_input()).await.unwrap();
        (engine, store, campaign)
    }

    async fn add_evidence(store: &MemoryCampaignStore, campaign_id: &str) {
        let now = Utc::now();
        store
            .record_evidence(&EvidenceDoc {
                id: new_id(),
                campaign: campaign_id.into(),
                title: "Statement".into(),
                description: "Witness".into(),
                evidence_type: EvidenceType::Testimonial,
                source: "witness".into(),
                date_collected: now,
                media_file: None,
                testimonial_content: Some("I saw it".into()),
                related_victims: Vec::new(),
                status: EvidenceStatus::Submitted,
                permissions: EvidencePermissions::default(),
                added_by: "owner".into(),
                validation: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_admit_rules() {
        assert_eq!(CreationStep::admit(1, 4).unwrap(), CreationStep::BasicInfo);
        assert_eq!(CreationStep::admit(3, 3).unwrap(), CreationStep::Victims);
        assert!(matches!(
            CreationStep::admit(3, 1),
            Err(CampaignError::OutOfOrderStep { requested: 3, current: 1 })
        ));
        assert!(CreationStep::admit(5, 5).is_err());
        assert!(CreationStep::admit(0, 1).is_err());
        assert!(CreationStep::admit(9, 1).is_err());
    }

    #[tokio::test]
    async fn test_create_campaign_with_team() {
        let (_, store, campaign) = setup().await;
        assert_eq!(campaign.title, "T");
        assert_eq!(campaign.creation_step, 1);
        assert_eq!(campaign.status, CampaignStatus::Draft);

        let team = store.team(campaign.team.as_deref().unwrap()).await.unwrap().unwrap();
        assert!(team.leader.is_user("owner"));
        assert!(team.leader.accepted_invite);
        assert_eq!(team.leader.name.as_deref(), Some("Olive Owner"));
    }

    #[tokio::test]
    async fn test_create_campaign_requires_fields() {
        let store = Arc::new(MemoryCampaignStore::new());
        let engine = StepEngine::new(store);
        let input = CreateCampaignInput {
            title: Some("   ".into()),
            ..basic_input()
        };
        let err = engine.create_campaign(&owner(), input).await.unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_step_one_updates_and_advances() {
        let (engine, _, campaign) = setup().await;
        let aggregate = engine
            .apply_step(
                &campaign.id,
                "owner",
                1,
                json!({ "title": "T2", "description": "   ", "tags": ["a", " a ", "b"] }),
            )
            .await
            .unwrap();

        assert_eq!(aggregate.campaign.title, "T2");
        assert_eq!(aggregate.campaign.description, "D");
        assert_eq!(aggregate.campaign.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(aggregate.campaign.creation_step, 2);
        assert!(aggregate.team.is_some());
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden() {
        let (engine, _, campaign) = setup().await;
        let err = engine
            .apply_step(&campaign.id, "intruder", 1, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_not_found() {
        let store = Arc::new(MemoryCampaignStore::new());
        let engine = StepEngine::new(store);
        let err = engine.apply_step("missing", "owner", 1, json!({})).await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_jumping_ahead_is_out_of_order() {
        let (engine, store, campaign) = setup().await;
        let err = engine
            .apply_step(&campaign.id, "owner", 3, json!({ "hasVictims": false }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampaignError::OutOfOrderStep { requested: 3, current: 1 }
        ));
        assert_eq!(store.campaign(&campaign.id).await.unwrap().unwrap().creation_step, 1);
    }

    #[tokio::test]
    async fn test_victims_step_replaces_then_clears() {
        let (engine, store, campaign) = setup().await;
        engine.apply_step(&campaign.id, "owner", 1, json!({})).await.unwrap();
        engine.apply_step(&campaign.id, "owner", 2, json!({})).await.unwrap();

        let aggregate = engine
            .apply_step(
                &campaign.id,
                "owner",
                3,
                json!({ "hasVictims": true, "victims": [{ "name": "A" }, { "name": "B" }, { "name": "C" }] }),
            )
            .await
            .unwrap();
        assert_eq!(aggregate.victims.len(), 3);
        assert_eq!(aggregate.campaign.creation_step, 4);
        let ids = aggregate.campaign.victims.clone();

        // Back to step 1 and forward again to resubmit victims
        engine.apply_step(&campaign.id, "owner", 1, json!({})).await.unwrap();
        engine.apply_step(&campaign.id, "owner", 2, json!({})).await.unwrap();
        let cleared = engine
            .apply_step(&campaign.id, "owner", 3, json!({}))
            .await
            .unwrap();

        assert!(cleared.victims.is_empty());
        assert!(cleared.campaign.victims.is_empty());
        assert!(!cleared.campaign.has_victims);
        assert!(store.victims(&campaign.id, &ids).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_victims_resubmission_updates_creates_and_deletes() {
        let (engine, store, campaign) = setup().await;
        engine.apply_step(&campaign.id, "owner", 1, json!({})).await.unwrap();
        engine.apply_step(&campaign.id, "owner", 2, json!({})).await.unwrap();

        let first = engine
            .apply_step(
                &campaign.id,
                "owner",
                3,
                json!({ "hasVictims": true, "victims": [{ "name": "A" }, { "name": "B" }] }),
            )
            .await
            .unwrap();
        let (a, b) = (
            first.campaign.victims[0].clone(),
            first.campaign.victims[1].clone(),
        );

        engine.apply_step(&campaign.id, "owner", 1, json!({})).await.unwrap();
        engine.apply_step(&campaign.id, "owner", 2, json!({})).await.unwrap();
        let second = engine
            .apply_step(
                &campaign.id,
                "owner",
                3,
                json!({
                    "hasVictims": true,
                    "victims": [{ "_id": b, "name": "B2", "age": 9 }, { "name": "C" }]
                }),
            )
            .await
            .unwrap();

        let ids = second.campaign.victims.clone();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], b);
        assert!(!ids.contains(&a));

        let stored_campaign = store.campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(stored_campaign.victims, ids);

        let lookup = vec![a.clone(), b.clone(), ids[1].clone()];
        let stored = store.victims(&campaign.id, &lookup).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, b);
        assert_eq!(stored[0].name, "B2");
        assert_eq!(stored[0].age, Some(9));
        assert_eq!(stored[1].id, ids[1]);
        assert_eq!(stored[1].name, "C");
        assert!(store.victims(&campaign.id, &[a]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_requires_evidence_unless_skipped() {
        let (engine, store, campaign) = setup().await;
        for step in 1..=3 {
            engine.apply_step(&campaign.id, "owner", step, json!({})).await.unwrap();
        }

        let err = engine
            .apply_step(&campaign.id, "owner", 4, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
        let stored = store.campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.creation_step, 4);
        assert!(!stored.creation_complete);

        let done = engine
            .apply_step(&campaign.id, "owner", 4, json!({ "skipEvidenceRequirement": true }))
            .await
            .unwrap();
        assert!(done.campaign.creation_complete);
        assert!(done.campaign.evidence_requirement_skipped);
        assert_eq!(done.campaign.creation_step, 5);
        assert_eq!(done.campaign.status, CampaignStatus::Draft);
    }

    #[tokio::test]
    async fn test_publish_now_activates() {
        let (engine, store, campaign) = setup().await;
        for step in 1..=3 {
            engine.apply_step(&campaign.id, "owner", step, json!({})).await.unwrap();
        }
        add_evidence(&store, &campaign.id).await;

        let done = engine
            .apply_step(&campaign.id, "owner", 4, json!({ "publishNow": true }))
            .await
            .unwrap();
        assert_eq!(done.campaign.status, CampaignStatus::Active);
        assert!(done.campaign.creation_complete);
        assert!(!done.campaign.evidence_requirement_skipped);
        assert_eq!(done.evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_step_rejected_but_step_one_allowed() {
        let (engine, _, campaign) = setup().await;
        for step in 1..=3 {
            engine.apply_step(&campaign.id, "owner", step, json!({})).await.unwrap();
        }
        engine
            .apply_step(&campaign.id, "owner", 4, json!({ "skipEvidenceRequirement": true, "publishNow": true }))
            .await
            .unwrap();

        let err = engine
            .apply_step(&campaign.id, "owner", 5, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "OUT_OF_ORDER_STEP");

        let reset = engine
            .apply_step(&campaign.id, "owner", 1, json!({ "title": "Edited" }))
            .await
            .unwrap();
        assert_eq!(reset.campaign.creation_step, 2);
        assert!(!reset.campaign.creation_complete);
        assert_eq!(reset.campaign.status, CampaignStatus::Active);
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back() {
        let store = Arc::new(MemoryCampaignStore::new());
        let engine = StepEngine::new(store.clone());

        // Campaign at step 2 whose team document is gone
        let mut campaign = CampaignDoc::new(
            "owner".into(),
            "T".into(),
            "D".into(),
            "S".into(),
            "education".into(),
            Utc::now(),
        );
        campaign.creation_step = 2;
        campaign.team = Some("missing-team".into());
        let mut tx = store.begin().await.unwrap();
        tx.insert_campaign(&campaign).await.unwrap();
        tx.commit().await.unwrap();

        let err = engine
            .apply_step(&campaign.id, "owner", 2, json!({ "coLeader": { "userId": "u2" } }))
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));
        assert_eq!(store.campaign(&campaign.id).await.unwrap().unwrap(), campaign);
    }

    #[tokio::test]
    async fn test_missing_team_reference_is_validation() {
        let store = Arc::new(MemoryCampaignStore::new());
        let engine = StepEngine::new(store.clone());
        let mut campaign = CampaignDoc::new(
            "owner".into(),
            "T".into(),
            "D".into(),
            "S".into(),
            "education".into(),
            Utc::now(),
        );
        campaign.creation_step = 2;
        let mut tx = store.begin().await.unwrap();
        tx.insert_campaign(&campaign).await.unwrap();
        tx.commit().await.unwrap();

        let err = engine
            .apply_step(&campaign.id, "owner", 2, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_invalid_victim_rolls_back_victims() {
        let (engine, store, campaign) = setup().await;
        engine.apply_step(&campaign.id, "owner", 1, json!({})).await.unwrap();
        engine.apply_step(&campaign.id, "owner", 2, json!({})).await.unwrap();

        let err = engine
            .apply_step(
                &campaign.id,
                "owner",
                3,
                json!({ "hasVictims": true, "victims": [{ "name": "A" }, { "age": 4 }] }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");

        let stored = store.campaign(&campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.creation_step, 3);
        assert!(stored.victims.is_empty());
    }
}
