//! Error types for Rally
//!
//! Every variant maps to an HTTP status and a stable machine-readable kind.

use hyper::StatusCode;
use serde::Serialize;

use crate::db::schemas::EvidenceDoc;

/// Field-level detail attached to validation failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for Rally operations
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot jump to step {requested}. Current step is {current}. Please complete steps sequentially.")]
    OutOfOrderStep { requested: i64, current: u8 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Validation queue error: {0}")]
    ValidationQueue(String),

    #[error("Evidence upload stopped after {} file(s): {source}", persisted.len())]
    PartialIngest {
        persisted: Vec<EvidenceDoc>,
        source: Box<CampaignError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CampaignError {
    /// Validation failure without field detail
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Validation failure pinned to one field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::Validation {
            message: format!("{}: {}", field, message),
            fields: vec![FieldError::new(field, message)],
        }
    }

    /// Validation failure listing every missing required field
    pub fn missing_fields(fields: &[&str]) -> Self {
        Self::Validation {
            message: "Missing required fields".to_string(),
            fields: fields
                .iter()
                .map(|f| FieldError::new(*f, "is required"))
                .collect(),
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::OutOfOrderStep { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationQueue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PartialIngest { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "AUTHORIZATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::OutOfOrderStep { .. } => "OUT_OF_ORDER_STEP",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::ValidationQueue(_) => "VALIDATION_QUEUE_ERROR",
            Self::PartialIngest { .. } => "PARTIAL_INGEST",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<std::io::Error> for CampaignError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for CampaignError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for CampaignError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for CampaignError {
    fn from(err: mongodb::error::Error) -> Self {
        if err.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
            Self::Conflict(format!("Transaction aborted by a concurrent write: {}", err))
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl From<bson::ser::Error> for CampaignError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON serialization failed: {}", err))
    }
}

impl From<reqwest::Error> for CampaignError {
    fn from(err: reqwest::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for CampaignError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

impl From<multer::Error> for CampaignError {
    fn from(err: multer::Error) -> Self {
        Self::validation(format!("Malformed multipart body: {}", err))
    }
}

/// Result type alias for Rally operations
pub type Result<T> = std::result::Result<T, CampaignError>;
