//! Typed request payloads and input normalization
//!
//! Payload structs are lenient: unknown keys are ignored and every field is
//! optional, so that each step decides what "present" means.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::db::schemas::PrivacyLevel;
use crate::types::{CampaignError, Result};

/// Body of `POST /api/campaigns`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Value>,
    pub end_date: Option<String>,
    pub location: Option<Value>,
    pub cover_image: Option<String>,
}

/// Step 1 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Value>,
    pub end_date: Option<String>,
    pub location: Option<Value>,
}

/// A named-role slot in step 2 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// An additional member in step 2 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMemberInput {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub custom_role_title: Option<String>,
}

/// Step 2 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInput {
    pub leader: Option<MemberInput>,
    pub co_leader: Option<MemberInput>,
    pub social_media_coordinator: Option<MemberInput>,
    pub volunteer_coordinator: Option<MemberInput>,
    pub finance_manager: Option<MemberInput>,
    pub additional_members: Option<Vec<AdditionalMemberInput>>,
    pub communication_channels: Option<Value>,
}

/// One submitted victim in step 3 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VictimInput {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub location: Option<Value>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub privacy_level: Option<PrivacyLevel>,
    pub story: Option<String>,
    pub incident_date: Option<String>,
    pub current_status: Option<String>,
    pub needs: Option<Vec<String>>,
}

/// Step 3 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VictimsInput {
    pub has_victims: Option<bool>,
    pub victims: Option<Vec<VictimInput>>,
}

impl VictimsInput {
    /// Victims to keep, or `None` when the submission declares there are none
    pub fn declared_victims(self) -> Option<Vec<VictimInput>> {
        match (self.has_victims, self.victims) {
            (Some(true), Some(victims)) if !victims.is_empty() => Some(victims),
            _ => None,
        }
    }
}

/// Step 4 data
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionInput {
    #[serde(default)]
    pub skip_evidence_requirement: bool,
    #[serde(default)]
    pub publish_now: bool,
}

/// Decode step data; `null` reads as an empty object
pub fn parse_data<T: DeserializeOwned + Default>(data: Value) -> Result<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data)
        .map_err(|e| CampaignError::validation(format!("Invalid step data: {}", e)))
}

/// Trimmed value, or `None` for missing and whitespace-only input
pub fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Trim entries, drop empties and keep the first of each duplicate.
/// A value that is not an array clears the tags.
pub fn normalize_tags(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    let mut tags: Vec<String> = Vec::with_capacity(items.len());
    for tag in items.iter().filter_map(Value::as_str).map(str::trim) {
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC)
pub fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CampaignError::invalid_field(field, "must be an RFC 3339 timestamp or YYYY-MM-DD date"))
}

/// Parse an optional date field, treating blank input as absent
pub fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    trimmed(value).map(|v| parse_date(field, &v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_tags_trims_and_dedupes() {
        let tags = normalize_tags(&json!([" water ", "", "schools", "water", 7, "  "]));
        assert_eq!(tags, vec!["water".to_string(), "schools".to_string()]);
    }

    #[test]
    fn test_non_array_tags_clear() {
        assert!(normalize_tags(&json!("water")).is_empty());
    }

    #[test]
    fn test_trimmed_treats_blank_as_absent() {
        assert_eq!(trimmed(Some("  T2  ")), Some("T2".to_string()));
        assert_eq!(trimmed(Some("   ")), None);
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn test_parse_date_accepts_both_forms() {
        let full = parse_date("endDate", "2026-12-01T10:00:00Z").unwrap();
        assert_eq!(full.to_rfc3339(), "2026-12-01T10:00:00+00:00");

        let plain = parse_date("endDate", "2026-12-01").unwrap();
        assert_eq!(plain.to_rfc3339(), "2026-12-01T00:00:00+00:00");

        let err = parse_date("endDate", "next tuesday").unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_parse_data_null_is_default() {
        let input: CompletionInput = parse_data(Value::Null).unwrap();
        assert!(!input.publish_now);
        assert!(!input.skip_evidence_requirement);
    }

    #[test]
    fn test_parse_data_rejects_wrong_shapes() {
        let err = parse_data::<VictimsInput>(json!({ "victims": "nobody" })).unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_declared_victims() {
        let none = VictimsInput {
            has_victims: Some(false),
            victims: Some(vec![VictimInput::default()]),
        };
        assert!(none.declared_victims().is_none());

        let empty = VictimsInput {
            has_victims: Some(true),
            victims: Some(Vec::new()),
        };
        assert!(empty.declared_victims().is_none());

        let some = VictimsInput {
            has_victims: Some(true),
            victims: Some(vec![VictimInput::default()]),
        };
        assert_eq!(some.declared_victims().map(|v| v.len()), Some(1));
    }
}
