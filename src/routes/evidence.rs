//! Evidence endpoints
//!
//! Uploads arrive as `multipart/form-data` with `files` parts plus text
//! metadata fields, or as a plain JSON body for testimonials.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::evidence::{EvidenceMeta, UploadedFile, ValidationOutcome};
use crate::routes::{authenticate, parse_json, read_body, success};
use crate::server::AppState;
use crate::types::{CampaignError, Result};

pub const VALIDATION_KEY_HEADER: &str = "X-Validation-Key";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

pub async fn upload_evidence(
    state: &AppState,
    campaign_id: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let user = authenticate(req.headers(), state.auth.as_ref()).await?;
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;

    let (meta, files) = if content_type.starts_with("multipart/form-data") {
        parse_multipart(&content_type, body).await?
    } else {
        let meta: Option<EvidenceMeta> = parse_json(&body)?;
        (meta.unwrap_or_default(), Vec::new())
    };
    debug!(campaign_id = %campaign_id, files = files.len(), "Evidence upload received");

    let records = state
        .ingestor
        .ingest(campaign_id, &user.user_id, meta, files)
        .await?;
    let message = format!("{} evidence item(s) uploaded successfully", records.len());
    Ok(success(StatusCode::CREATED, Some(&message), &records))
}

/// Split a multipart body into metadata fields and file parts
async fn parse_multipart(content_type: &str, body: Bytes) -> Result<(EvidenceMeta, Vec<UploadedFile>)> {
    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut meta = EvidenceMeta::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let mime_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
            let data = field.bytes().await?;
            if data.is_empty() {
                continue;
            }
            files.push(UploadedFile {
                file_name,
                mime_type,
                data,
            });
            continue;
        }

        let text = field.text().await?;
        match name.as_str() {
            "title" => meta.title = Some(text),
            "description" => meta.description = Some(text),
            "source" => meta.source = Some(text),
            "evidenceType" | "type" => meta.evidence_type = Some(text),
            "testimonialContent" => meta.testimonial_content = Some(text),
            "dateCollected" => meta.date_collected = Some(text),
            "relatedVictims" | "relatedVictims[]" => {
                meta.related_victims.extend(parse_id_list(&text)?)
            }
            "isPublic" => meta.is_public = Some(parse_flag("isPublic", &text)?),
            other => debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok((meta, files))
}

/// Accepts a JSON array, a comma-separated list or a single id
fn parse_id_list(text: &str) -> Result<Vec<String>> {
    let text = text.trim();
    if text.starts_with('[') {
        return serde_json::from_str(text)
            .map_err(|e| CampaignError::invalid_field("relatedVictims", e.to_string()));
    }
    Ok(text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_flag(field: &str, text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(CampaignError::invalid_field(field, "expected true or false")),
    }
}

/// Callback from the validation collaborator, authenticated by shared secret
pub async fn validation_callback(
    state: &AppState,
    campaign_id: &str,
    evidence_id: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let expected = state
        .args
        .validation_callback_key
        .as_deref()
        .ok_or_else(|| CampaignError::Forbidden("Validation callbacks are disabled".into()))?;
    let presented = req
        .headers()
        .get(VALIDATION_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if !presented.is_some_and(|key| constant_time_eq(key.as_bytes(), expected.as_bytes())) {
        warn!(evidence_id = %evidence_id, "Validation callback with bad key");
        return Err(CampaignError::Unauthorized("Invalid validation key".into()));
    }

    let body = read_body(req.into_body(), state.args.max_upload_bytes).await?;
    let outcome: ValidationOutcome = parse_json::<Option<ValidationOutcome>>(&body)?
        .ok_or_else(|| CampaignError::missing_fields(&["status"]))?;

    let belongs = state
        .store
        .evidence_by_id(evidence_id)
        .await?
        .is_some_and(|e| e.campaign == campaign_id);
    if !belongs {
        return Err(CampaignError::NotFound(format!("Evidence {}", evidence_id)));
    }

    let updated = state
        .ingestor
        .apply_validation_result(evidence_id, outcome)
        .await?;
    Ok(success(StatusCode::OK, Some("Validation recorded"), &updated))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-RALLY-BOUNDARY";

    fn multipart_body() -> Bytes {
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Well photos\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"evidenceType\"\r\n\r\n\
             photo\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"relatedVictims\"\r\n\r\n\
             [\"v1\",\"v2\"]\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"isPublic\"\r\n\r\n\
             false\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"well.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n\
             JPEGDATA\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        );
        Bytes::from(body)
    }

    #[tokio::test]
    async fn test_parse_multipart() {
        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        let (meta, files) = parse_multipart(&content_type, multipart_body()).await.unwrap();

        assert_eq!(meta.title.as_deref(), Some("Well photos"));
        assert_eq!(meta.evidence_type.as_deref(), Some("photo"));
        assert_eq!(meta.related_victims, vec!["v1".to_string(), "v2".to_string()]);
        assert_eq!(meta.is_public, Some(false));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "well.jpg");
        assert_eq!(files[0].mime_type, "image/jpeg");
        assert_eq!(&files[0].data[..], b"JPEGDATA");
    }

    #[tokio::test]
    async fn test_parse_multipart_without_boundary() {
        let err = parse_multipart("multipart/form-data", Bytes::new()).await;
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("a, b,,c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(parse_id_list("[\"x\"]").unwrap(), vec!["x"]);
        assert!(parse_id_list("[broken").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("isPublic", "TRUE").unwrap());
        assert!(!parse_flag("isPublic", "0").unwrap());
        assert!(parse_flag("isPublic", "maybe").is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
    }
}
