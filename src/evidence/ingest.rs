//! Evidence ingestion
//!
//! Validates the submission, routes each file to the image host or the
//! object store, and records one evidence document per file. Files are
//! handled one at a time and processing stops at the first failure; records
//! created before the failure stay persisted and are reported back through
//! `CampaignError::PartialIngest`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::auth::is_authorized;
use crate::db::schemas::{
    new_id, CampaignDoc, Dimensions, EvidenceDoc, EvidencePermissions, EvidenceStatus,
    EvidenceType, MediaFile, ValidationReport,
};
use crate::evidence::backends::{ImageStore, ObjectStore, UploadMeta};
use crate::evidence::queue::ValidationQueue;
use crate::store::CampaignStore;
use crate::types::{CampaignError, Result};
use crate::workflow::payload::{parse_optional_date, trimmed};

/// Metadata submitted alongside the files
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    #[serde(alias = "type")]
    pub evidence_type: Option<String>,
    pub testimonial_content: Option<String>,
    #[serde(default)]
    pub related_victims: Vec<String>,
    pub date_collected: Option<String>,
    pub is_public: Option<bool>,
}

/// A file part received from the client, buffered in memory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Verdict posted back by the validation collaborator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub status: EvidenceStatus,
    pub is_valid: Option<bool>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ValidationOutcome {
    fn report(&self, now: DateTime<Utc>) -> Result<Option<ValidationReport>> {
        let Some(is_valid) = self.is_valid else {
            return Ok(None);
        };
        let confidence = self.confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(CampaignError::invalid_field(
                "confidence",
                "must be between 0 and 1",
            ));
        }
        Ok(Some(ValidationReport {
            is_valid,
            confidence,
            concerns: self.concerns.clone(),
            recommendations: self.recommendations.clone(),
            validated_at: now,
        }))
    }
}

/// Fields shared by every record created from one submission
struct Submission {
    title: String,
    description: String,
    source: String,
    evidence_type: EvidenceType,
    testimonial_content: Option<String>,
    related_victims: Vec<String>,
    date_collected: DateTime<Utc>,
    is_public: bool,
}

impl Submission {
    fn record(
        &self,
        campaign_id: &str,
        added_by: &str,
        media_file: Option<MediaFile>,
        now: DateTime<Utc>,
    ) -> EvidenceDoc {
        EvidenceDoc {
            id: new_id(),
            campaign: campaign_id.to_string(),
            title: self.title.clone(),
            description: self.description.clone(),
            evidence_type: self.evidence_type,
            source: self.source.clone(),
            date_collected: self.date_collected,
            media_file,
            testimonial_content: self.testimonial_content.clone(),
            related_victims: self.related_victims.clone(),
            status: EvidenceStatus::Submitted,
            permissions: EvidencePermissions {
                is_public: self.is_public,
            },
            added_by: added_by.to_string(),
            validation: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_meta(meta: EvidenceMeta, file_count: usize, now: DateTime<Utc>) -> Result<Submission> {
    let title = trimmed(meta.title.as_deref());
    let description = trimmed(meta.description.as_deref());
    let source = trimmed(meta.source.as_deref());
    let evidence_type = trimmed(meta.evidence_type.as_deref());

    let missing: Vec<&str> = [
        ("title", title.is_none()),
        ("description", description.is_none()),
        ("source", source.is_none()),
        ("evidenceType", evidence_type.is_none()),
    ]
    .into_iter()
    .filter_map(|(field, absent)| absent.then_some(field))
    .collect();
    if !missing.is_empty() {
        return Err(CampaignError::missing_fields(&missing));
    }

    let evidence_type: EvidenceType = evidence_type
        .unwrap_or_default()
        .parse()
        .map_err(|e: String| CampaignError::invalid_field("evidenceType", e))?;

    let testimonial_content = trimmed(meta.testimonial_content.as_deref());
    if evidence_type.requires_file() {
        if file_count == 0 {
            return Err(CampaignError::invalid_field(
                "files",
                format!("at least one file is required for {} evidence", evidence_type),
            ));
        }
    } else {
        if testimonial_content.is_none() {
            return Err(CampaignError::missing_fields(&["testimonialContent"]));
        }
        if file_count > 0 {
            return Err(CampaignError::invalid_field(
                "files",
                "testimonial evidence does not take files",
            ));
        }
    }

    let mut seen = BTreeSet::new();
    let related_victims = meta
        .related_victims
        .iter()
        .filter_map(|id| trimmed(Some(id.as_str())))
        .filter(|id| seen.insert(id.clone()))
        .collect();

    Ok(Submission {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
        source: source.unwrap_or_default(),
        evidence_type,
        testimonial_content,
        related_victims,
        date_collected: parse_optional_date("dateCollected", meta.date_collected.as_deref())?
            .unwrap_or(now),
        is_public: meta.is_public.unwrap_or(true),
    })
}

pub struct EvidenceIngestor {
    store: Arc<dyn CampaignStore>,
    objects: Arc<dyn ObjectStore>,
    images: Arc<dyn ImageStore>,
    queue: Option<Arc<dyn ValidationQueue>>,
    temp_dir: PathBuf,
}

impl EvidenceIngestor {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        objects: Arc<dyn ObjectStore>,
        images: Arc<dyn ImageStore>,
        queue: Option<Arc<dyn ValidationQueue>>,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            objects,
            images,
            queue,
            temp_dir,
        }
    }

    /// Validate and persist a submission, one record per file (or a single
    /// record for a testimonial).
    pub async fn ingest(
        &self,
        campaign_id: &str,
        requester_id: &str,
        meta: EvidenceMeta,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<EvidenceDoc>> {
        let submission = validate_meta(meta, files.len(), Utc::now())?;

        let campaign = self
            .store
            .campaign(campaign_id)
            .await?
            .ok_or_else(|| CampaignError::NotFound(format!("Campaign {}", campaign_id)))?;
        self.authorize(&campaign, requester_id).await?;
        self.check_related_victims(&campaign, &submission.related_victims)
            .await?;

        if !submission.evidence_type.requires_file() {
            let record = submission.record(&campaign.id, requester_id, None, Utc::now());
            self.store.record_evidence(&record).await?;
            self.request_validation(&record);
            info!(campaign_id = %campaign.id, evidence_id = %record.id, "Testimonial recorded");
            return Ok(vec![record]);
        }

        let mut persisted = Vec::with_capacity(files.len());
        for file in files {
            match self.ingest_file(&campaign, requester_id, &submission, file).await {
                Ok(record) => {
                    self.request_validation(&record);
                    persisted.push(record);
                }
                Err(err) if persisted.is_empty() => return Err(err),
                Err(err) => {
                    warn!(
                        campaign_id = %campaign.id,
                        persisted = persisted.len(),
                        error = %err,
                        "Evidence upload stopped part way"
                    );
                    return Err(CampaignError::PartialIngest {
                        persisted,
                        source: Box::new(err),
                    });
                }
            }
        }

        info!(campaign_id = %campaign.id, count = persisted.len(), "Evidence recorded");
        Ok(persisted)
    }

    async fn authorize(&self, campaign: &CampaignDoc, requester_id: &str) -> Result<()> {
        if campaign.is_owned_by(requester_id) {
            return Ok(());
        }
        let team = match campaign.team.as_deref() {
            Some(id) => self.store.team(id).await?,
            None => None,
        };
        if team.is_some_and(|t| is_authorized(&t, requester_id)) {
            return Ok(());
        }
        warn!(campaign_id = %campaign.id, user_id = %requester_id, "Evidence upload denied");
        Err(CampaignError::Forbidden(
            "Only the campaign owner or team members can add evidence".into(),
        ))
    }

    async fn check_related_victims(&self, campaign: &CampaignDoc, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let found = self.store.victims(&campaign.id, ids).await?;
        if found.len() != ids.len() {
            return Err(CampaignError::invalid_field(
                "relatedVictims",
                "every related victim must belong to this campaign",
            ));
        }
        Ok(())
    }

    async fn ingest_file(
        &self,
        campaign: &CampaignDoc,
        requester_id: &str,
        submission: &Submission,
        file: UploadedFile,
    ) -> Result<EvidenceDoc> {
        let meta = UploadMeta {
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            size: file.data.len() as i64,
            directory: format!("campaign-evidence/{}", campaign.id),
        };

        let media = if submission.evidence_type.is_image() {
            self.upload_image(file.data, &meta).await?
        } else {
            let upload = self.objects.put(file.data, &meta).await.map_err(|e| {
                error!(file = %meta.file_name, error = %e, "Object upload failed");
                e
            })?;
            MediaFile {
                url: upload.url,
                file_name: meta.file_name.clone(),
                size: meta.size,
                mime_type: meta.mime_type.clone(),
                dimensions: None,
                duration: None,
                thumbnail_url: None,
            }
        };

        let record = submission.record(&campaign.id, requester_id, Some(media), Utc::now());
        self.store.record_evidence(&record).await?;
        Ok(record)
    }

    /// The image host takes a path, so the buffer is spilled to a temp file
    /// that is removed when `temp` drops, whatever the upload outcome.
    async fn upload_image(&self, data: Bytes, meta: &UploadMeta) -> Result<MediaFile> {
        let temp = tempfile::Builder::new()
            .prefix("evidence-")
            .tempfile_in(&self.temp_dir)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);

        let upload = self.images.put(temp.path(), meta).await.map_err(|e| {
            error!(file = %meta.file_name, error = %e, "Image upload failed");
            e
        })?;
        drop(temp);

        let dimensions = match (upload.width, upload.height) {
            (Some(width), Some(height)) => Some(Dimensions { width, height }),
            _ => None,
        };
        Ok(MediaFile {
            url: upload.url,
            file_name: meta.file_name.clone(),
            size: meta.size,
            mime_type: meta.mime_type.clone(),
            dimensions,
            duration: upload.duration,
            thumbnail_url: upload.thumbnail_url,
        })
    }

    fn request_validation(&self, record: &EvidenceDoc) {
        let Some(queue) = self.queue.clone() else {
            return;
        };
        let evidence_id = record.id.clone();
        let campaign_id = record.campaign.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.enqueue(&evidence_id, &campaign_id).await {
                warn!(
                    evidence_id = %evidence_id,
                    campaign_id = %campaign_id,
                    error = %e,
                    "Failed to queue evidence validation"
                );
            }
        });
    }

    /// Store the verdict of the validation collaborator
    pub async fn apply_validation_result(
        &self,
        evidence_id: &str,
        outcome: ValidationOutcome,
    ) -> Result<EvidenceDoc> {
        if outcome.status == EvidenceStatus::Submitted {
            return Err(CampaignError::invalid_field(
                "status",
                "must be accepted, rejected, under_review or pending_verification",
            ));
        }
        let now = Utc::now();
        let report = outcome.report(now)?;

        let updated = self
            .store
            .set_evidence_validation(evidence_id, outcome.status, report, now)
            .await?
            .ok_or_else(|| CampaignError::NotFound(format!("Evidence {}", evidence_id)))?;
        info!(evidence_id = %evidence_id, status = ?updated.status, "Evidence validation applied");
        Ok(updated)
    }
}
