//! Rally - campaign creation service
//!
//! Campaigns are built through a gated sequence of steps: basic info, team,
//! affected people, then evidence and completion. Each step is applied
//! atomically against MongoDB (or an in-memory store in development).
//!
//! ## Components
//!
//! - **Workflow**: step engine, team and victim reconciliation, read views
//! - **Evidence**: uploads to object and image storage, validation requests
//! - **Store**: transactional persistence of the campaign aggregate
//! - **Server**: hyper HTTP API under `/api/campaigns`

pub mod auth;
pub mod config;
pub mod db;
pub mod evidence;
pub mod nats;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;
pub mod workflow;

pub use config::Args;
pub use server::{run, AppState, Backends};
pub use types::{CampaignError, Result};
