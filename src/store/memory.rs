//! In-memory campaign store
//!
//! Used in dev mode and by tests. A transaction takes the store lock for its
//! whole lifetime and works on a private copy, so concurrent units of work
//! are serialized and an uncommitted copy is simply dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{in_id_order, CampaignQuery, CampaignStore, StoreTransaction, EVIDENCE_STEP};
use crate::db::schemas::{
    CampaignDoc, EvidenceDoc, EvidenceStatus, TeamDoc, ValidationReport, VictimDoc,
};
use crate::types::{CampaignError, Result};

#[derive(Debug, Clone, Default)]
struct Collections {
    campaigns: HashMap<String, CampaignDoc>,
    teams: HashMap<String, TeamDoc>,
    victims: HashMap<String, VictimDoc>,
    evidence: HashMap<String, EvidenceDoc>,
}

impl Collections {
    fn victims_of(&self, campaign_id: &str, ids: &[String]) -> Vec<VictimDoc> {
        let found = ids
            .iter()
            .filter_map(|id| self.victims.get(id))
            .filter(|v| v.campaign == campaign_id)
            .cloned()
            .collect();
        in_id_order(ids, found, |v: &VictimDoc| v.id.as_str())
    }
}

/// Process-local store backed by a single async mutex
#[derive(Clone, Default)]
pub struct MemoryCampaignStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaignStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.inner.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn campaign(&self, id: &str) -> Result<Option<CampaignDoc>> {
        Ok(self.inner.lock().await.campaigns.get(id).cloned())
    }

    async fn team(&self, id: &str) -> Result<Option<TeamDoc>> {
        Ok(self.inner.lock().await.teams.get(id).cloned())
    }

    async fn victims(&self, campaign_id: &str, ids: &[String]) -> Result<Vec<VictimDoc>> {
        Ok(self.inner.lock().await.victims_of(campaign_id, ids))
    }

    async fn evidence(&self, ids: &[String]) -> Result<Vec<EvidenceDoc>> {
        let data = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.evidence.get(id))
            .cloned()
            .collect())
    }

    async fn evidence_by_id(&self, id: &str) -> Result<Option<EvidenceDoc>> {
        Ok(self.inner.lock().await.evidence.get(id).cloned())
    }

    async fn record_evidence(&self, evidence: &EvidenceDoc) -> Result<()> {
        let mut data = self.inner.lock().await;
        let campaign = data
            .campaigns
            .get_mut(&evidence.campaign)
            .ok_or_else(|| CampaignError::NotFound(format!("Campaign {}", evidence.campaign)))?;

        campaign.evidence.push(evidence.id.clone());
        campaign.creation_step = campaign.creation_step.max(EVIDENCE_STEP);
        campaign.updated_at = evidence.created_at;

        data.evidence.insert(evidence.id.clone(), evidence.clone());
        Ok(())
    }

    async fn set_evidence_validation(
        &self,
        id: &str,
        status: EvidenceStatus,
        report: Option<ValidationReport>,
        now: DateTime<Utc>,
    ) -> Result<Option<EvidenceDoc>> {
        let mut data = self.inner.lock().await;
        Ok(data.evidence.get_mut(id).map(|evidence| {
            evidence.status = status;
            if report.is_some() {
                evidence.validation = report;
            }
            evidence.updated_at = now;
            evidence.clone()
        }))
    }

    async fn campaigns_by_owner(&self, owner: &str) -> Result<Vec<CampaignDoc>> {
        let data = self.inner.lock().await;
        let mut campaigns: Vec<CampaignDoc> = data
            .campaigns
            .values()
            .filter(|c| c.is_owned_by(owner))
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(campaigns)
    }

    async fn list_owned(
        &self,
        owner: &str,
        query: &CampaignQuery,
    ) -> Result<(Vec<CampaignDoc>, u64)> {
        let data = self.inner.lock().await;
        let mut matching: Vec<&CampaignDoc> = data
            .campaigns
            .values()
            .filter(|c| c.is_owned_by(owner) && query.matches(c))
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(query.skip()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn teams_with_member(&self, user_id: &str) -> Result<Vec<TeamDoc>> {
        let data = self.inner.lock().await;
        Ok(data
            .teams
            .values()
            .filter(|t| t.has_member(user_id))
            .cloned()
            .collect())
    }

    async fn campaigns_by_ids(&self, ids: &[String]) -> Result<Vec<CampaignDoc>> {
        let data = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.campaigns.get(id))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Holds the store lock until commit or drop
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Collections>,
    working: Collections,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn campaign(&mut self, id: &str) -> Result<Option<CampaignDoc>> {
        Ok(self.working.campaigns.get(id).cloned())
    }

    async fn team(&mut self, id: &str) -> Result<Option<TeamDoc>> {
        Ok(self.working.teams.get(id).cloned())
    }

    async fn victims(&mut self, campaign_id: &str, ids: &[String]) -> Result<Vec<VictimDoc>> {
        Ok(self.working.victims_of(campaign_id, ids))
    }

    async fn count_evidence(&mut self, campaign_id: &str) -> Result<u64> {
        Ok(self
            .working
            .evidence
            .values()
            .filter(|e| e.campaign == campaign_id)
            .count() as u64)
    }

    async fn insert_campaign(&mut self, campaign: &CampaignDoc) -> Result<()> {
        if self.working.campaigns.contains_key(&campaign.id) {
            return Err(CampaignError::Conflict(format!(
                "Campaign {} already exists",
                campaign.id
            )));
        }
        self.working
            .campaigns
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn save_campaign(&mut self, campaign: &CampaignDoc) -> Result<()> {
        match self.working.campaigns.get_mut(&campaign.id) {
            Some(slot) => {
                *slot = campaign.clone();
                Ok(())
            }
            None => Err(CampaignError::NotFound(format!("Campaign {}", campaign.id))),
        }
    }

    async fn insert_team(&mut self, team: &TeamDoc) -> Result<()> {
        if self.working.teams.contains_key(&team.id) {
            return Err(CampaignError::Conflict(format!("Team {} already exists", team.id)));
        }
        self.working.teams.insert(team.id.clone(), team.clone());
        Ok(())
    }

    async fn save_team(&mut self, team: &TeamDoc) -> Result<()> {
        match self.working.teams.get_mut(&team.id) {
            Some(slot) => {
                *slot = team.clone();
                Ok(())
            }
            None => Err(CampaignError::NotFound(format!("Team {}", team.id))),
        }
    }

    async fn upsert_victim(&mut self, victim: &VictimDoc) -> Result<()> {
        self.working
            .victims
            .insert(victim.id.clone(), victim.clone());
        Ok(())
    }

    async fn delete_victims(&mut self, ids: &[String]) -> Result<u64> {
        let removed = ids
            .iter()
            .filter(|id| self.working.victims.remove(id.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
