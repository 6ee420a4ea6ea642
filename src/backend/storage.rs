use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use reqwest::Url;
use serde_json::{Map, Value};

use super::BackendClient;
use super::retry::send_with_retry;
use crate::identity::IdentityContext;

/// One row of the citizen's document list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    pub status: String,
}

impl DocumentSummary {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentList {
    Bare(Vec<DocumentSummary>),
    Wrapped { documents: Vec<DocumentSummary> },
}

impl BackendClient {
    /// Looks up the extracted field map stored for a page or document.
    pub async fn fetch_extracted(&self, id: &str) -> Result<Map<String, Value>> {
        let url = self.storage_url(id)?;
        let text = send_with_retry("Storage lookup", || Ok(self.http.get(url.clone()))).await?;
        parse_extracted(&text)
    }

    /// The id becomes a single percent-encoded path segment.
    fn storage_url(&self, id: &str) -> Result<Url> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') {
            return Err(anyhow!("invalid storage id: '{}'", id));
        }
        let base = self.endpoint(&self.settings.storage_path);
        let mut url =
            Url::parse(&base).with_context(|| format!("invalid storage endpoint: {}", base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("storage endpoint cannot take a path: {}", base))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    pub async fn list_documents(
        &self,
        identity: &IdentityContext,
    ) -> Result<Vec<DocumentSummary>> {
        let citizen_id = identity.require()?;
        let url = self.endpoint(&self.settings.documents_path);
        let text = send_with_retry("Document list", || {
            Ok(self.http.get(&url).query(&[("aadhar", citizen_id)]))
        })
        .await?;
        let list: DocumentList =
            serde_json::from_str(&text).with_context(|| "failed to parse document list JSON")?;
        Ok(match list {
            DocumentList::Bare(documents) => documents,
            DocumentList::Wrapped { documents } => documents,
        })
    }
}

fn parse_extracted(text: &str) -> Result<Map<String, Value>> {
    let envelope: Value =
        serde_json::from_str(text).with_context(|| "failed to parse storage response JSON")?;
    match envelope.get("extracted") {
        Some(Value::Object(map)) => Ok(map.clone()),
        // Some stores keep the extraction as an embedded JSON document.
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).with_context(|| "failed to parse embedded extracted JSON")
        }
        Some(_) | None => Err(anyhow!("storage response has no extracted fields")),
    }
}

/// Case-insensitive match on name or type; an empty term keeps everything.
pub fn filter_documents<'a>(
    documents: &'a [DocumentSummary],
    term: &str,
) -> Vec<&'a DocumentSummary> {
    let term = term.trim().to_lowercase();
    documents
        .iter()
        .filter(|doc| {
            term.is_empty()
                || doc.name.to_lowercase().contains(&term)
                || doc.kind.to_lowercase().contains(&term)
        })
        .collect()
}
