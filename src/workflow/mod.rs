//! Campaign creation workflow
//!
//! - `engine`: the step state machine and campaign creation
//! - `team`, `victims`: reconciliation of repeated step submissions
//! - `queries`: read-side views
//! - `payload`: request payloads and input normalization

pub mod aggregate;
pub mod engine;
pub mod payload;
pub mod queries;
pub mod team;
pub mod victims;

pub use aggregate::{populate, CampaignAggregate};
pub use engine::{CreationStep, StepEngine};
pub use queries::{CampaignQueries, CampaignStats, MyCampaigns, TeamCampaignSummary};
pub use victims::VictimPlan;
