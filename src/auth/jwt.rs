//! JWT bearer token handling
//!
//! Tokens are issued elsewhere; this service only verifies them. HS256 with a
//! shared secret of at least 32 characters.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::{AuthProvider, AuthUser};
use crate::types::{CampaignError, Result};

/// Payload carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Platform role ("user", "admin", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role.unwrap_or_else(|| "user".to_string()),
            name: claims.name,
            email: claims.email,
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(CampaignError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(CampaignError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Validator with a fixed well-known secret, dev mode only
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    /// Sign a token for `user`; used by tooling and tests
    pub fn generate_token(&self, user: &AuthUser) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CampaignError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: user.user_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: Some(user.role.clone()),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::default();

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidToken => "Invalid token",
                ErrorKind::InvalidSignature => "Invalid signature",
                _ => "Token validation failed",
            };
            CampaignError::Unauthorized(message.to_string())
        })
    }
}

#[async_trait]
impl AuthProvider for JwtValidator {
    async fn verify(&self, token: &str) -> Result<AuthUser> {
        let claims = self.verify_token(token)?;
        if claims.sub.trim().is_empty() {
            return Err(CampaignError::Unauthorized("Token has no subject".into()));
        }
        Ok(claims.into())
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap()
    }

    fn user() -> AuthUser {
        AuthUser {
            user_id: "user-123".into(),
            role: "user".into(),
            name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
        }
    }

    #[tokio::test]
    async fn test_generate_and_verify_token() {
        let validator = test_validator();
        let token = validator.generate_token(&user()).unwrap();

        let verified = validator.verify(&token).await.unwrap();
        assert_eq!(verified, user());
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let err = test_validator().verify("invalid-token").await.unwrap_err();
        assert!(matches!(err, CampaignError::Unauthorized(_)));
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
        )
        .unwrap();

        let token = test_validator().generate_token(&user()).unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));

        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);

        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }

    #[test]
    fn test_missing_role_defaults_to_user() {
        let claims = Claims {
            sub: "u1".into(),
            email: None,
            name: None,
            role: None,
            iat: 0,
            exp: 0,
        };
        assert_eq!(AuthUser::from(claims).role, "user");
    }
}
