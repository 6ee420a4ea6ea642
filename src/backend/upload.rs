use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};

use super::retry::send_with_retry;
use super::{BackendClient, UploadFuture, UploadReceipt, Uploader};
use crate::session::UploadPackage;

impl BackendClient {
    pub async fn upload_document(&self, package: &UploadPackage) -> Result<UploadReceipt> {
        let url = self.endpoint(&self.settings.upload_path);
        let text = send_with_retry("Upload", || {
            Ok(self.http.post(&url).multipart(build_form(package)?))
        })
        .await?;
        serde_json::from_str(&text).with_context(|| "failed to parse upload response JSON")
    }
}

impl Uploader for BackendClient {
    fn upload(&self, package: UploadPackage) -> UploadFuture {
        let client = self.clone();
        Box::pin(async move { client.upload_document(&package).await })
    }
}

/// Document fields first, then a `pages` file part and a `pageMetadata`
/// JSON part for every page in order.
fn build_form(package: &UploadPackage) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in package.form_fields() {
        form = form.text(name, value);
    }
    for page in &package.pages {
        let part = Part::bytes(page.bytes.to_vec())
            .file_name(page.file_name.clone())
            .mime_str(&page.mime)
            .with_context(|| format!("invalid mime type for {}", page.file_name))?;
        form = form
            .part("pages", part)
            .text("pageMetadata", page.metadata.to_json()?);
    }
    Ok(form)
}
