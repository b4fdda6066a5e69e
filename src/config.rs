//! Configuration for Rally
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::evidence::DEFAULT_VALIDATION_SUBJECT;

/// Minimum accepted JWT secret length
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Rally - campaign creation service
#[derive(Parser, Debug, Clone)]
#[command(name = "rally")]
#[command(about = "Multi-step campaign creation service for civic campaigns")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:4000")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallbacks, error detail in responses)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI (transactions need a replica set)
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "rally")]
    pub mongodb_db: String,

    /// JWT secret for token verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: pretty or json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Timeout for storage backend calls in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "52428800")]
    pub max_upload_bytes: usize,

    /// Directory for temporary image files (defaults to the system temp dir)
    #[arg(long, env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Object storage base URL for non-image evidence
    #[arg(long, env = "OBJECT_STORE_URL")]
    pub object_store_url: Option<String>,

    /// Bearer token for the object store
    #[arg(long, env = "OBJECT_STORE_TOKEN")]
    pub object_store_token: Option<String>,

    /// Image host base URL for photo evidence
    #[arg(long, env = "IMAGE_STORE_URL")]
    pub image_store_url: Option<String>,

    /// API key for the image host
    #[arg(long, env = "IMAGE_STORE_KEY")]
    pub image_store_key: Option<String>,

    /// Queue every new evidence record for asynchronous validation
    #[arg(long, env = "ENABLE_AI_VALIDATION", default_value = "false")]
    pub enable_ai_validation: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Subject validation requests are published on
    #[arg(long, env = "VALIDATION_SUBJECT", default_value = DEFAULT_VALIDATION_SUBJECT)]
    pub validation_subject: String,

    /// Shared secret expected in `X-Validation-Key` on validation callbacks
    #[arg(long, env = "VALIDATION_CALLBACK_KEY")]
    pub validation_callback_key: Option<String>,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone, Default)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match &self.jwt_secret {
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                return Err(format!(
                    "JWT_SECRET must be at least {} characters",
                    MIN_JWT_SECRET_LEN
                ));
            }
            None if !self.dev_mode => {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            _ => {}
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err("LOG_FORMAT must be 'pretty' or 'json'".to_string());
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.enable_ai_validation && self.nats.nats_url.is_none() {
            return Err("NATS_URL is required when ENABLE_AI_VALIDATION is set".to_string());
        }

        if !self.dev_mode {
            if self.object_store_url.is_none() {
                return Err("OBJECT_STORE_URL is required in production mode".to_string());
            }
            if self.image_store_url.is_none() {
                return Err("IMAGE_STORE_URL is required in production mode".to_string());
            }
            if self.validation_callback_key.is_none() && self.enable_ai_validation {
                return Err(
                    "VALIDATION_CALLBACK_KEY is required when ENABLE_AI_VALIDATION is set"
                        .to_string(),
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["rally"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_dev_mode_needs_no_backends() {
        let args = parse(&["--dev-mode"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.mongodb_db, "rally");
        assert_eq!(args.listen.port(), 4000);
    }

    #[test]
    fn test_production_requires_secret_and_backends() {
        let args = parse(&[]);
        assert!(args.validate().unwrap_err().contains("JWT_SECRET"));

        let args = parse(&["--jwt-secret", SECRET]);
        assert!(args.validate().unwrap_err().contains("OBJECT_STORE_URL"));

        let args = parse(&[
            "--jwt-secret",
            SECRET,
            "--object-store-url",
            "https://objects.example",
            "--image-store-url",
            "https://images.example",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let args = parse(&["--dev-mode", "--jwt-secret", "short"]);
        assert!(args.validate().unwrap_err().contains("at least"));
    }

    #[test]
    fn test_validation_needs_nats() {
        let args = parse(&["--dev-mode", "--enable-ai-validation"]);
        assert!(args.validate().unwrap_err().contains("NATS_URL"));
    }

    #[test]
    fn test_log_format_checked() {
        let args = parse(&["--dev-mode", "--log-format", "xml"]);
        assert!(args.validate().is_err());
    }
}
