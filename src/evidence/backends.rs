//! Storage backends for uploaded evidence
//!
//! Binary evidence goes to a general object store; photos go to an image
//! host that takes a local file path and reports dimensions back.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::types::{CampaignError, Result};

/// Describes one file being uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    /// Logical folder, `campaign-evidence/{campaignId}`
    pub directory: String,
}

impl UploadMeta {
    /// Unique object key under the upload directory
    pub fn object_key(&self) -> String {
        format!(
            "{}/{}-{}",
            self.directory,
            Uuid::new_v4(),
            sanitize_file_name(&self.file_name)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpload {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub thumbnail_url: Option<String>,
}

/// General-purpose blob storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, data: Bytes, meta: &UploadMeta) -> Result<ObjectUpload>;
}

/// Image hosting, uploads from a local file
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, path: &Path, meta: &UploadMeta) -> Result<ImageUpload>;
}

/// Keep names URL- and path-safe
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CampaignError::Config(format!("Failed to build HTTP client: {}", e)))
}

#[derive(Debug, Deserialize)]
struct ObjectPutResponse {
    url: Option<String>,
}

/// Object store speaking a simple `PUT {base}/{key}` protocol with a bearer
/// token; the response body may carry the public `url`.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, data: Bytes, meta: &UploadMeta) -> Result<ObjectUpload> {
        let put_url = format!("{}/{}", self.base_url, meta.object_key());
        debug!(url = %put_url, size = meta.size, "Uploading object");

        let mut request = self
            .client
            .put(&put_url)
            .header(CONTENT_TYPE, meta.mime_type.as_str())
            .body(data);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CampaignError::Storage(format!(
                "Object store rejected {} with status {}",
                meta.file_name, status
            )));
        }

        let url = response
            .json::<ObjectPutResponse>()
            .await
            .ok()
            .and_then(|r| r.url)
            .unwrap_or(put_url);
        Ok(ObjectUpload { url })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageUploadQuery<'a> {
    folder: &'a str,
    file_name: &'a str,
    resource_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageUploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<f64>,
    thumbnail_url: Option<String>,
}

/// Image host accepting `POST {base}/upload?folder=..&fileName=..` with the
/// raw image as body and an `X-Api-Key` header.
#[derive(Clone)]
pub struct HttpImageStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpImageStore {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn put(&self, path: &Path, meta: &UploadMeta) -> Result<ImageUpload> {
        let body = tokio::fs::read(path).await?;
        let file_name = sanitize_file_name(&meta.file_name);
        let query = serde_urlencoded::to_string(ImageUploadQuery {
            folder: &meta.directory,
            file_name: &file_name,
            resource_type: "image",
        })
        .map_err(|e| CampaignError::Internal(format!("Failed to encode query: {}", e)))?;
        let url = format!("{}/upload?{}", self.base_url, query);
        debug!(url = %url, size = body.len(), "Uploading image");

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, meta.mime_type.as_str())
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CampaignError::Storage(format!(
                "Image host rejected {} with status {}",
                meta.file_name, status
            )));
        }

        let uploaded: ImageUploadResponse = response.json().await?;
        let url = uploaded
            .secure_url
            .or(uploaded.url)
            .ok_or_else(|| CampaignError::Storage("Image host returned no URL".into()))?;

        Ok(ImageUpload {
            url,
            width: uploaded.width,
            height: uploaded.height,
            duration: uploaded.duration,
            thumbnail_url: uploaded.thumbnail_url,
        })
    }
}

/// In-memory object store for development and tests
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, data: Bytes, meta: &UploadMeta) -> Result<ObjectUpload> {
        let url = format!("memory://{}", meta.object_key());
        self.objects.write().await.insert(url.clone(), data);
        Ok(ObjectUpload { url })
    }
}

/// In-memory image host; reads the file it is given like a real upload would
#[derive(Clone, Default)]
pub struct MemoryImageStore {
    images: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn get(&self, url: &str) -> Option<Bytes> {
        self.images.read().await.get(url).cloned()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put(&self, path: &Path, meta: &UploadMeta) -> Result<ImageUpload> {
        let data = tokio::fs::read(path).await?;
        let url = format!("memory://{}", meta.object_key());
        self.images
            .write()
            .await
            .insert(url.clone(), Bytes::from(data));
        Ok(ImageUpload {
            url,
            width: None,
            height: None,
            duration: None,
            thumbnail_url: None,
        })
    }
}
