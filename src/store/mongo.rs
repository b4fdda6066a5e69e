//! MongoDB campaign store
//!
//! Multi-document transactions need a replica set or sharded cluster; a
//! transient transaction error surfaces as `CampaignError::Conflict`.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::ClientSession;
use tracing::{debug, warn};

use super::{in_id_order, CampaignQuery, CampaignStore, SortOrder, StoreTransaction, EVIDENCE_STEP};
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    CampaignDoc, EvidenceDoc, EvidenceStatus, TeamDoc, TeamRole, ValidationReport, VictimDoc,
    CAMPAIGN_COLLECTION, EVIDENCE_COLLECTION, TEAM_COLLECTION, VICTIM_COLLECTION,
};
use crate::types::{CampaignError, Result};

#[derive(Clone)]
struct Collections {
    campaigns: MongoCollection<CampaignDoc>,
    teams: MongoCollection<TeamDoc>,
    victims: MongoCollection<VictimDoc>,
    evidence: MongoCollection<EvidenceDoc>,
}

/// Store backed by a MongoDB database
#[derive(Clone)]
pub struct MongoCampaignStore {
    client: MongoClient,
    collections: Collections,
}

impl MongoCampaignStore {
    /// Open the four collections, creating their indexes
    pub async fn new(client: MongoClient) -> Result<Self> {
        let collections = Collections {
            campaigns: client.collection(CAMPAIGN_COLLECTION).await?,
            teams: client.collection(TEAM_COLLECTION).await?,
            victims: client.collection(VICTIM_COLLECTION).await?,
            evidence: client.collection(EVIDENCE_COLLECTION).await?,
        };
        Ok(Self {
            client,
            collections,
        })
    }

    async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }
}

fn id_filter(ids: &[String]) -> Document {
    doc! { "_id": { "$in": ids } }
}

/// Escape regex metacharacters so search terms match literally
fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\^$.|?*+()[]{}-/".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn owned_filter(owner: &str, query: &CampaignQuery) -> Document {
    let mut filter = doc! { "createdBy": owner };

    if !query.statuses.is_empty() {
        let statuses: Vec<&str> = query.statuses.iter().map(|s| s.as_str()).collect();
        filter.insert("status", doc! { "$in": statuses });
    }

    if let Some(term) = query.search.as_deref() {
        let pattern = escape_regex(term);
        let regex = |field: &str| {
            let mut clause = Document::new();
            clause.insert(field, doc! { "$regex": pattern.as_str(), "$options": "i" });
            clause
        };
        filter.insert(
            "$or",
            vec![
                regex("title"),
                regex("description"),
                regex("shortDescription"),
                regex("tags"),
            ],
        );
    }

    filter
}

#[async_trait]
impl CampaignStore for MongoCampaignStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let session = self.start_transaction().await?;
        Ok(Box::new(MongoTransaction {
            session,
            collections: self.collections.clone(),
        }))
    }

    async fn campaign(&self, id: &str) -> Result<Option<CampaignDoc>> {
        self.collections.campaigns.find_one(doc! { "_id": id }).await
    }

    async fn team(&self, id: &str) -> Result<Option<TeamDoc>> {
        self.collections.teams.find_one(doc! { "_id": id }).await
    }

    async fn victims(&self, campaign_id: &str, ids: &[String]) -> Result<Vec<VictimDoc>> {
        let mut filter = id_filter(ids);
        filter.insert("campaign", campaign_id);
        let found = self.collections.victims.find_many(filter, None).await?;
        Ok(in_id_order(ids, found, |v: &VictimDoc| v.id.as_str()))
    }

    async fn evidence(&self, ids: &[String]) -> Result<Vec<EvidenceDoc>> {
        let found = self
            .collections
            .evidence
            .find_many(id_filter(ids), None)
            .await?;
        Ok(in_id_order(ids, found, |e: &EvidenceDoc| e.id.as_str()))
    }

    async fn evidence_by_id(&self, id: &str) -> Result<Option<EvidenceDoc>> {
        self.collections.evidence.find_one(doc! { "_id": id }).await
    }

    async fn record_evidence(&self, evidence: &EvidenceDoc) -> Result<()> {
        let mut session = self.start_transaction().await?;

        self.collections
            .evidence
            .insert_in(&mut session, evidence)
            .await?;

        let update = doc! {
            "$push": { "evidence": evidence.id.as_str() },
            "$set": { "updatedAt": bson::to_bson(&evidence.created_at)? },
            "$max": { "creationStep": EVIDENCE_STEP as i32 },
        };
        let result = self
            .collections
            .campaigns
            .inner()
            .update_one(doc! { "_id": evidence.campaign.as_str() }, update)
            .session(&mut session)
            .await?;

        if result.matched_count == 0 {
            if let Err(e) = session.abort_transaction().await {
                warn!(error = %e, "Failed to abort evidence transaction");
            }
            return Err(CampaignError::NotFound(format!(
                "Campaign {}",
                evidence.campaign
            )));
        }

        session.commit_transaction().await?;
        debug!(evidence_id = %evidence.id, campaign_id = %evidence.campaign, "Evidence recorded");
        Ok(())
    }

    async fn set_evidence_validation(
        &self,
        id: &str,
        status: EvidenceStatus,
        report: Option<ValidationReport>,
        now: DateTime<Utc>,
    ) -> Result<Option<EvidenceDoc>> {
        let mut set = doc! {
            "status": bson::to_bson(&status)?,
            "updatedAt": bson::to_bson(&now)?,
        };
        if let Some(report) = report {
            set.insert("validation", bson::to_bson(&report)?);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .collections
            .evidence
            .inner()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .with_options(options)
            .await?)
    }

    async fn campaigns_by_owner(&self, owner: &str) -> Result<Vec<CampaignDoc>> {
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": 1, "_id": 1 })
            .build();
        self.collections
            .campaigns
            .find_many(doc! { "createdBy": owner }, Some(options))
            .await
    }

    async fn list_owned(
        &self,
        owner: &str,
        query: &CampaignQuery,
    ) -> Result<(Vec<CampaignDoc>, u64)> {
        let filter = owned_filter(owner, query);
        let direction = match query.order {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        };

        let mut sort = Document::new();
        sort.insert(query.sort.path(), direction);
        sort.insert("_id", 1);

        let options = FindOptions::builder()
            .sort(sort)
            .skip(query.skip())
            .limit(query.limit as i64)
            .build();

        let total = self.collections.campaigns.count(filter.clone()).await?;
        let page = self
            .collections
            .campaigns
            .find_many(filter, Some(options))
            .await?;
        Ok((page, total))
    }

    async fn teams_with_member(&self, user_id: &str) -> Result<Vec<TeamDoc>> {
        let mut clauses: Vec<Bson> = TeamRole::NAMED
            .iter()
            .map(|role| {
                let mut clause = Document::new();
                clause.insert(format!("{}.userId", role.key()), user_id);
                Bson::Document(clause)
            })
            .collect();
        clauses.push(Bson::Document(doc! { "additionalMembers.userId": user_id }));

        self.collections
            .teams
            .find_many(doc! { "$or": clauses }, None)
            .await
    }

    async fn campaigns_by_ids(&self, ids: &[String]) -> Result<Vec<CampaignDoc>> {
        let found = self
            .collections
            .campaigns
            .find_many(id_filter(ids), None)
            .await?;
        Ok(in_id_order(ids, found, |c: &CampaignDoc| c.id.as_str()))
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }
}

/// Transaction bound to one client session; dropping the session aborts it
pub struct MongoTransaction {
    session: ClientSession,
    collections: Collections,
}

#[async_trait]
impl StoreTransaction for MongoTransaction {
    async fn campaign(&mut self, id: &str) -> Result<Option<CampaignDoc>> {
        self.collections
            .campaigns
            .find_one_in(&mut self.session, doc! { "_id": id })
            .await
    }

    async fn team(&mut self, id: &str) -> Result<Option<TeamDoc>> {
        self.collections
            .teams
            .find_one_in(&mut self.session, doc! { "_id": id })
            .await
    }

    async fn victims(&mut self, campaign_id: &str, ids: &[String]) -> Result<Vec<VictimDoc>> {
        let mut filter = id_filter(ids);
        filter.insert("campaign", campaign_id);
        let found = self
            .collections
            .victims
            .find_many_in(&mut self.session, filter)
            .await?;
        Ok(in_id_order(ids, found, |v: &VictimDoc| v.id.as_str()))
    }

    async fn count_evidence(&mut self, campaign_id: &str) -> Result<u64> {
        self.collections
            .evidence
            .count_in(&mut self.session, doc! { "campaign": campaign_id })
            .await
    }

    async fn insert_campaign(&mut self, campaign: &CampaignDoc) -> Result<()> {
        self.collections
            .campaigns
            .insert_in(&mut self.session, campaign)
            .await
    }

    async fn save_campaign(&mut self, campaign: &CampaignDoc) -> Result<()> {
        let matched = self
            .collections
            .campaigns
            .replace_in(&mut self.session, &campaign.id, campaign)
            .await?;
        if matched {
            Ok(())
        } else {
            Err(CampaignError::NotFound(format!("Campaign {}", campaign.id)))
        }
    }

    async fn insert_team(&mut self, team: &TeamDoc) -> Result<()> {
        self.collections.teams.insert_in(&mut self.session, team).await
    }

    async fn save_team(&mut self, team: &TeamDoc) -> Result<()> {
        let matched = self
            .collections
            .teams
            .replace_in(&mut self.session, &team.id, team)
            .await?;
        if matched {
            Ok(())
        } else {
            Err(CampaignError::NotFound(format!("Team {}", team.id)))
        }
    }

    async fn upsert_victim(&mut self, victim: &VictimDoc) -> Result<()> {
        self.collections
            .victims
            .upsert_in(&mut self.session, &victim.id, victim)
            .await
    }

    async fn delete_victims(&mut self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.collections
            .victims
            .delete_many_in(&mut self.session, id_filter(ids))
            .await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tx = *self;
        tx.session.commit_transaction().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        let mut tx = *self;
        tx.session.abort_transaction().await?;
        Ok(())
    }
}
