use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{CaptureSession, Page, PageSource};

/// Snapshot of a session taken when a submit starts. Later mutations of the
/// session do not affect it.
#[derive(Debug, Clone)]
pub struct UploadPackage {
    pub document_id: String,
    pub document_name: String,
    pub page_count: usize,
    pub is_multi_page: bool,
    pub pages: Vec<PagePayload>,
}

#[derive(Debug, Clone)]
pub struct PagePayload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub page_id: String,
    pub page_number: usize,
    pub timestamp: String,
    pub source: PageSource,
}

impl PageMetadata {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).with_context(|| "failed to encode page metadata")
    }
}

impl UploadPackage {
    pub(crate) fn snapshot(session: &CaptureSession) -> Result<Self> {
        let document_name = if session.document_name().trim().is_empty() {
            default_document_name(OffsetDateTime::now_utc())?
        } else {
            session.document_name().to_string()
        };
        let pages = session
            .pages()
            .iter()
            .map(PagePayload::from_page)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            document_id: session.document_id().to_string(),
            document_name,
            page_count: pages.len(),
            is_multi_page: session.is_multi_page(),
            pages,
        })
    }

    /// Text fields in the order they are written to the multipart body,
    /// ahead of the per-page parts.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("documentId", self.document_id.clone()),
            ("documentName", self.document_name.clone()),
            ("pageCount", self.page_count.to_string()),
            ("isMultiPage", self.is_multi_page.to_string()),
        ]
    }

    pub fn page_ids(&self) -> Vec<String> {
        self.pages
            .iter()
            .map(|page| page.metadata.page_id.clone())
            .collect()
    }
}

impl PagePayload {
    fn from_page(page: &Page) -> Result<Self> {
        Ok(Self {
            file_name: page_file_name(page.page_number()),
            mime: page.mime().to_string(),
            bytes: page.bytes(),
            metadata: PageMetadata {
                page_id: page.id().to_string(),
                page_number: page.page_number(),
                timestamp: format_timestamp(page.timestamp())?,
                source: page.source(),
            },
        })
    }
}

pub fn page_file_name(page_number: usize) -> String {
    format!("page-{}.jpg", page_number)
}

pub fn default_document_name(now: OffsetDateTime) -> Result<String> {
    Ok(format!("Document-{}", format_timestamp(now)?))
}

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Result<String> {
    value
        .format(&Rfc3339)
        .with_context(|| "failed to format timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ImageInput;
    use crate::session::PreviewRegistry;
    use time::macros::datetime;

    fn image(tag: u8) -> ImageInput {
        ImageInput::new(vec![tag; 4], "image/png")
    }

    #[test]
    fn metadata_follows_page_order() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        let ids = session.add_pages(vec![image(1), image(2)]);
        let package = UploadPackage::snapshot(&session).unwrap();

        let numbers = package
            .pages
            .iter()
            .map(|page| page.metadata.page_number)
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(package.page_ids(), ids);
        assert_eq!(package.pages[0].file_name, "page-1.jpg");
        assert_eq!(package.pages[1].file_name, "page-2.jpg");
        assert_eq!(package.pages[1].mime, "image/png");
        assert_eq!(&*package.pages[1].bytes, &[2, 2, 2, 2]);
    }

    #[test]
    fn blank_name_gets_timestamp_default() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1)]);
        session.set_document_name("   ");
        let package = UploadPackage::snapshot(&session).unwrap();
        let suffix = package.document_name.strip_prefix("Document-").unwrap();
        assert!(OffsetDateTime::parse(suffix, &Rfc3339).is_ok());

        session.set_document_name("Birth certificate");
        let package = UploadPackage::snapshot(&session).unwrap();
        assert_eq!(package.document_name, "Birth certificate");
    }

    #[test]
    fn form_fields_are_string_encoded() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1), image(2), image(3)]);
        session.set_document_name("Scan");
        let package = UploadPackage::snapshot(&session).unwrap();
        let fields = package.form_fields();
        assert_eq!(fields[0], ("documentId", session.document_id().to_string()));
        assert_eq!(fields[1], ("documentName", "Scan".to_string()));
        assert_eq!(fields[2], ("pageCount", "3".to_string()));
        assert_eq!(fields[3], ("isMultiPage", "true".to_string()));
    }

    #[test]
    fn default_name_uses_rfc3339() {
        let name = default_document_name(datetime!(2025-03-01 10:20:30 UTC)).unwrap();
        insta::assert_snapshot!(name, @"Document-2025-03-01T10:20:30Z");
    }

    #[test]
    fn metadata_json_uses_camel_case() {
        let metadata = PageMetadata {
            page_id: "p-1".to_string(),
            page_number: 1,
            timestamp: "2025-03-01T10:20:30Z".to_string(),
            source: PageSource::Camera,
        };
        insta::assert_snapshot!(
            metadata.to_json().unwrap(),
            @r#"{"pageId":"p-1","pageNumber":1,"timestamp":"2025-03-01T10:20:30Z","source":"camera"}"#
        );
    }
}
