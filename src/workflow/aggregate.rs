//! Populated campaign aggregate

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::db::schemas::{CampaignDoc, EvidenceDoc, TeamDoc, VictimDoc};
use crate::store::CampaignStore;
use crate::types::Result;

/// Campaign with its team, victims and evidence resolved.
///
/// Serializes as the campaign document with the `team`, `victims` and
/// `evidence` references replaced by the documents themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignAggregate {
    pub campaign: CampaignDoc,
    pub team: Option<TeamDoc>,
    pub victims: Vec<VictimDoc>,
    pub evidence: Vec<EvidenceDoc>,
}

impl Serialize for CampaignAggregate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut value = serde_json::to_value(&self.campaign).map_err(S::Error::custom)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "team".into(),
                serde_json::to_value(&self.team).map_err(S::Error::custom)?,
            );
            map.insert(
                "victims".into(),
                serde_json::to_value(&self.victims).map_err(S::Error::custom)?,
            );
            map.insert(
                "evidence".into(),
                serde_json::to_value(&self.evidence).map_err(S::Error::custom)?,
            );
        }
        value.serialize(serializer)
    }
}

/// Resolve the references of `campaign`
pub async fn populate(store: &dyn CampaignStore, campaign: CampaignDoc) -> Result<CampaignAggregate> {
    let team = match campaign.team.as_deref() {
        Some(id) => store.team(id).await?,
        None => None,
    };
    let victims = store.victims(&campaign.id, &campaign.victims).await?;
    let evidence = store.evidence(&campaign.evidence).await?;

    Ok(CampaignAggregate {
        campaign,
        team,
        victims,
        evidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_serializes_as_populated_campaign() {
        let campaign = CampaignDoc::new(
            "owner".into(),
            "T".into(),
            "D".into(),
            "S".into(),
            "education".into(),
            Utc::now(),
        );
        let team = TeamDoc::with_leader(campaign.id.clone(), "owner".into(), None, None, Utc::now());
        let aggregate = CampaignAggregate {
            campaign,
            team: Some(team.clone()),
            victims: Vec::new(),
            evidence: Vec::new(),
        };

        let value = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(value["title"], "T");
        assert_eq!(value["team"]["_id"], team.id.as_str());
        assert_eq!(value["team"]["leader"]["userId"], "owner");
        assert!(value["victims"].as_array().unwrap().is_empty());
    }
}
