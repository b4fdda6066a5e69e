//! Authentication and authorization for Rally
//!
//! Provides:
//! - JWT bearer token verification behind the `AuthProvider` seam
//! - Team role permission table
//! - Team membership checks for evidence uploads

pub mod jwt;
pub mod permissions;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::Result;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};
pub use permissions::{is_authorized, permissions_for, team_permissions, TeamPermissions};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Turns a bearer token into a user
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser>;
}
