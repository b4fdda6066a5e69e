//! Database schemas for Rally
//!
//! Defines MongoDB document structures for campaigns, teams, victims and evidence.

mod campaign;
mod evidence;
mod team;
mod victim;

pub use campaign::{
    CampaignDoc, CampaignStatus, EngagementMetrics, CAMPAIGN_COLLECTION, FINAL_STEP, FIRST_STEP,
};
pub use evidence::{
    Dimensions, EvidenceDoc, EvidencePermissions, EvidenceStatus, EvidenceType, MediaFile,
    ValidationReport, EVIDENCE_COLLECTION,
};
pub use team::{
    AdditionalMember, TeamDoc, TeamMember, TeamRole, DEFAULT_LEADER_NAME, TEAM_COLLECTION,
};
pub use victim::{PrivacyLevel, VictimDoc, VICTIM_COLLECTION};

/// Fresh document id, hex-encoded ObjectId
pub fn new_id() -> String {
    bson::oid::ObjectId::new().to_hex()
}
