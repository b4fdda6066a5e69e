//! Shared types for Rally

pub mod error;

pub use error::{CampaignError, FieldError, Result};
