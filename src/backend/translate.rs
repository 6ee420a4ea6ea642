use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::BackendClient;
use super::retry::send_with_retry;

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: Option<Map<String, Value>>,
}

impl BackendClient {
    /// Translates the values of an extracted field map into `lang`. Keys are
    /// left untouched by the backend.
    pub async fn translate_fields(
        &self,
        data: &Map<String, Value>,
        lang: &str,
    ) -> Result<Map<String, Value>> {
        let lang = lang.trim();
        if lang.is_empty() {
            return Err(anyhow!("translation language is empty"));
        }
        let url = self.endpoint(&self.settings.translate_path);
        let body = json!({ "data": data, "lang": lang });
        let text = send_with_retry("Translate", || Ok(self.http.post(&url).json(&body))).await?;
        let parsed: TranslateResponse = serde_json::from_str(&text)
            .with_context(|| "failed to parse translation response JSON")?;
        parsed
            .data
            .ok_or_else(|| anyhow!("translation response has no data"))
    }
}
