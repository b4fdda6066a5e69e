//! Evidence document schema
//!
//! Evidence identity is immutable once created; only `status` and the
//! validation report change afterwards.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::IntoIndexes;

/// Collection name for evidence
pub const EVIDENCE_COLLECTION: &str = "campaignevidences";

/// Kind of evidence material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    #[serde(alias = "image")]
    Photo,
    Video,
    Document,
    Audio,
    Testimonial,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Photo => "photo",
            EvidenceType::Video => "video",
            EvidenceType::Document => "document",
            EvidenceType::Audio => "audio",
            EvidenceType::Testimonial => "testimonial",
        }
    }

    /// Photos go to the image host, everything else binary to object storage
    pub fn is_image(&self) -> bool {
        matches!(self, EvidenceType::Photo)
    }

    pub fn requires_file(&self) -> bool {
        !matches!(self, EvidenceType::Testimonial)
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "photo" | "image" => Ok(EvidenceType::Photo),
            "video" => Ok(EvidenceType::Video),
            "document" => Ok(EvidenceType::Document),
            "audio" => Ok(EvidenceType::Audio),
            "testimonial" => Ok(EvidenceType::Testimonial),
            other => Err(format!("unknown evidence type '{}'", other)),
        }
    }
}

/// Review state of an evidence record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    #[default]
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    PendingVerification,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Reference to uploaded media
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub url: String,
    pub file_name: String,
    pub size: i64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Seconds, for audio and video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePermissions {
    pub is_public: bool,
}

impl Default for EvidencePermissions {
    fn default() -> Self {
        Self { is_public: true }
    }
}

/// Outcome reported by the validation service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub confidence: f64,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

/// Evidence document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Owning campaign id
    pub campaign: String,

    pub title: String,
    pub description: String,
    pub evidence_type: EvidenceType,
    pub source: String,
    pub date_collected: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_file: Option<MediaFile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testimonial_content: Option<String>,

    /// Victim ids of the same campaign
    #[serde(default)]
    pub related_victims: Vec<String>,

    #[serde(default)]
    pub status: EvidenceStatus,

    #[serde(default)]
    pub permissions: EvidencePermissions,

    pub added_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntoIndexes for EvidenceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "campaign": 1, "createdAt": 1 },
                Some(
                    IndexOptions::builder()
                        .name("campaign_created_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_is_an_alias_of_photo() {
        assert_eq!("image".parse::<EvidenceType>().unwrap(), EvidenceType::Photo);
        let parsed: EvidenceType = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(parsed, EvidenceType::Photo);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"photo\"");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!("hologram".parse::<EvidenceType>().is_err());
    }

    #[test]
    fn test_only_testimonial_skips_files() {
        assert!(!EvidenceType::Testimonial.requires_file());
        assert!(EvidenceType::Audio.requires_file());
        assert!(EvidenceType::Photo.is_image());
        assert!(!EvidenceType::Document.is_image());
    }

    #[test]
    fn test_status_uses_snake_case() {
        let json = serde_json::to_string(&EvidenceStatus::PendingVerification).unwrap();
        assert_eq!(json, "\"pending_verification\"");
    }

    #[test]
    fn test_evidence_is_public_by_default() {
        assert!(EvidencePermissions::default().is_public);
    }
}
