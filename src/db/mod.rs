//! Database layer for Rally
//!
//! Provides MongoDB storage for campaigns and their team, victim and evidence
//! documents.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use schemas::{CampaignDoc, EvidenceDoc, TeamDoc, VictimDoc};
