use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

use crate::session::UploadPackage;
use crate::settings::BackendSettings;

mod retry;
mod storage;
mod translate;
mod upload;

pub use storage::{DocumentSummary, filter_documents};

pub type UploadFuture = Pin<Box<dyn Future<Output = Result<UploadReceipt>> + Send>>;

/// Receives the packaged pages of a capture session.
pub trait Uploader: Send + Sync {
    fn upload(&self, package: UploadPackage) -> UploadFuture;
}

/// Backend acknowledgement of an upload. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadReceipt {
    pub success: bool,
    pub document_id: Option<String>,
    pub document_name: Option<String>,
    pub page_count: Option<usize>,
    pub pages: Vec<StoredPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredPage {
    pub id: String,
    pub page_number: usize,
    pub filename: String,
    pub original_filename: Option<String>,
    pub timestamp: Option<String>,
    pub source: Option<String>,
}

/// Client for the digitization backend: page upload, field translation,
/// storage lookup and the citizen's document list.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    settings: BackendSettings,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        if settings.base_url.trim().is_empty() {
            return Err(anyhow!("backend base_url is empty"));
        }
        let mut builder = reqwest::Client::builder();
        if !settings.timeout.is_zero() {
            builder = builder.timeout(settings.timeout);
        }
        let http = builder
            .build()
            .with_context(|| "failed to build HTTP client")?;
        Ok(Self {
            http,
            settings: settings.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with('/') {
            format!("{}{}", self.base_url(), path)
        } else {
            format!("{}/{}", self.base_url(), path)
        }
    }
}
