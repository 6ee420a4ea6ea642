use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::backend::UploadReceipt;
use crate::data::ImageInput;

mod manager;
mod package;
mod preview;

pub use manager::SessionManager;
pub use package::{
    PageMetadata, PagePayload, UploadPackage, default_document_name, page_file_name,
};
pub use preview::{PreviewHandle, PreviewRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Accumulating,
    Submitting,
    Complete,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Accumulating => "accumulating",
            SessionStatus::Submitting => "submitting",
            SessionStatus::Complete => "complete",
            SessionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    Upload,
    Camera,
}

#[derive(Debug)]
pub struct Page {
    id: String,
    document_id: String,
    bytes: Arc<[u8]>,
    mime: String,
    name: Option<String>,
    source: PageSource,
    preview: PreviewHandle,
    page_number: usize,
    timestamp: OffsetDateTime,
}

impl Page {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> PageSource {
        self.source
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

/// Result of one `submit` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing to upload.
    Skipped,
    /// Another submit is still waiting on the backend.
    InFlight,
    Completed {
        receipt: UploadReceipt,
        auto_reset: bool,
    },
    Failed {
        message: String,
    },
    /// The session was replaced while the upload was running.
    Discarded,
}

/// Read-only view of a session for display.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub document_id: String,
    pub document_name: String,
    pub is_multi_page: bool,
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub dirty: bool,
    pub pages: Vec<PageSummary>,
}

#[derive(Debug, Clone)]
pub struct PageSummary {
    pub id: String,
    pub page_number: usize,
    pub name: Option<String>,
    pub mime: String,
    pub source: PageSource,
    pub size: usize,
    pub preview_key: String,
    pub timestamp: OffsetDateTime,
}

/// An ordered set of scanned pages belonging to one document.
#[derive(Debug)]
pub struct CaptureSession {
    previews: PreviewRegistry,
    document_id: String,
    document_name: String,
    is_multi_page: bool,
    pages: Vec<Page>,
    status: SessionStatus,
    last_error: Option<String>,
    uploaded: Vec<String>,
}

impl CaptureSession {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self {
            previews,
            document_id: generate_id(),
            document_name: String::new(),
            is_multi_page: false,
            pages: Vec::new(),
            status: SessionStatus::Idle,
            last_error: None,
            uploaded: Vec::new(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    pub fn is_multi_page(&self) -> bool {
        self.is_multi_page
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Appends one page per input, in order. The first batch added to an
    /// empty session decides the multi-page flag.
    pub fn add_pages(&mut self, inputs: Vec<ImageInput>) -> Vec<String> {
        if inputs.is_empty() {
            return Vec::new();
        }
        let was_empty = self.pages.is_empty();
        let batch = inputs.len();
        let ids = inputs
            .into_iter()
            .map(|input| self.push_page(input, PageSource::Upload))
            .collect::<Vec<_>>();
        if was_empty {
            self.is_multi_page = batch > 1;
        }
        self.mark_accumulating();
        debug!(
            "document {}: added {} page(s), {} total",
            self.document_id,
            batch,
            self.pages.len()
        );
        ids
    }

    /// Appends a single page produced by a capture device.
    pub fn capture_page(&mut self, input: ImageInput) -> String {
        let was_empty = self.pages.is_empty();
        let id = self.push_page(input, PageSource::Camera);
        if was_empty {
            self.is_multi_page = false;
        }
        self.mark_accumulating();
        debug!(
            "document {}: captured page {}",
            self.document_id,
            self.pages.len()
        );
        id
    }

    /// Removes a page and renumbers the rest. Unknown ids are ignored.
    pub fn remove_page(&mut self, page_id: &str) -> bool {
        let Some(index) = self.pages.iter().position(|page| page.id == page_id) else {
            return false;
        };
        // Dropping the page releases its preview.
        self.pages.remove(index);
        self.renumber();
        // Complete and error sessions keep their status until reset.
        if self.pages.is_empty() && self.status == SessionStatus::Accumulating {
            self.status = SessionStatus::Idle;
        }
        debug!(
            "document {}: removed page {}, {} left",
            self.document_id,
            page_id,
            self.pages.len()
        );
        true
    }

    pub fn set_document_name(&mut self, name: impl Into<String>) {
        self.document_name = name.into();
    }

    pub fn set_multi_page(&mut self, flag: bool) {
        self.is_multi_page = flag;
    }

    /// Unsaved pages exist: the session has pages that were not part of a
    /// completed upload.
    pub fn is_dirty(&self) -> bool {
        if self.pages.is_empty() {
            return false;
        }
        if self.status != SessionStatus::Complete {
            return true;
        }
        self.pages
            .iter()
            .any(|page| !self.uploaded.iter().any(|id| id == &page.id))
    }

    /// Moves to `submitting` and snapshots the pages, or explains why no
    /// upload should start.
    pub fn begin_submit(&mut self) -> std::result::Result<UploadPackage, SubmitOutcome> {
        if self.pages.is_empty() {
            return Err(SubmitOutcome::Skipped);
        }
        if self.status == SessionStatus::Submitting {
            return Err(SubmitOutcome::InFlight);
        }
        self.status = SessionStatus::Submitting;
        self.last_error = None;
        match UploadPackage::snapshot(self) {
            Ok(package) => {
                info!(
                    "document {}: submitting {} page(s)",
                    package.document_id, package.page_count
                );
                Ok(package)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Applies the upload result for a package produced by `begin_submit`.
    pub fn finish_submit(
        &mut self,
        package: &UploadPackage,
        result: Result<UploadReceipt>,
    ) -> SubmitOutcome {
        if package.document_id != self.document_id {
            warn!(
                "discarding upload result for replaced document {}",
                package.document_id
            );
            return SubmitOutcome::Discarded;
        }
        match result {
            Ok(receipt) => {
                self.status = SessionStatus::Complete;
                self.uploaded = package.page_ids();
                info!(
                    "document {}: upload complete ({} page(s))",
                    self.document_id, package.page_count
                );
                SubmitOutcome::Completed {
                    receipt,
                    auto_reset: !package.is_multi_page,
                }
            }
            Err(err) => self.fail(err),
        }
    }

    /// Drops every page and starts a fresh document.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.document_id, generate_id());
        self.pages.clear();
        self.uploaded.clear();
        self.document_name.clear();
        self.is_multi_page = false;
        self.last_error = None;
        self.status = SessionStatus::Idle;
        debug!("document {} reset, now {}", previous, self.document_id);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document_id: self.document_id.clone(),
            document_name: self.document_name.clone(),
            is_multi_page: self.is_multi_page,
            status: self.status,
            last_error: self.last_error.clone(),
            dirty: self.is_dirty(),
            pages: self
                .pages
                .iter()
                .map(|page| PageSummary {
                    id: page.id.clone(),
                    page_number: page.page_number,
                    name: page.name.clone(),
                    mime: page.mime.clone(),
                    source: page.source,
                    size: page.bytes.len(),
                    preview_key: page.preview.key().to_string(),
                    timestamp: page.timestamp,
                })
                .collect(),
        }
    }

    fn push_page(&mut self, input: ImageInput, source: PageSource) -> String {
        let bytes: Arc<[u8]> = Arc::from(input.bytes);
        let preview = self.previews.allocate(bytes.clone(), &input.mime);
        let id = generate_id();
        self.pages.push(Page {
            id: id.clone(),
            document_id: self.document_id.clone(),
            bytes,
            mime: input.mime,
            name: input.name,
            source,
            preview,
            page_number: self.pages.len() + 1,
            timestamp: OffsetDateTime::now_utc(),
        });
        id
    }

    fn renumber(&mut self) {
        for (index, page) in self.pages.iter_mut().enumerate() {
            page.page_number = index + 1;
        }
    }

    fn mark_accumulating(&mut self) {
        if self.status != SessionStatus::Submitting {
            self.status = SessionStatus::Accumulating;
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> SubmitOutcome {
        let message = format!("Upload error: {:#}", err);
        warn!("document {}: {}", self.document_id, message);
        self.status = SessionStatus::Error;
        self.last_error = Some(message.clone());
        SubmitOutcome::Failed { message }
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use proptest::prelude::*;

    fn image(tag: u8) -> ImageInput {
        ImageInput::new(vec![tag; 8], "image/jpeg").with_name(format!("scan-{}.jpg", tag))
    }

    fn numbers(session: &CaptureSession) -> Vec<usize> {
        session.pages().iter().map(Page::page_number).collect()
    }

    fn receipt(package: &UploadPackage) -> UploadReceipt {
        UploadReceipt {
            success: true,
            document_id: Some(package.document_id.clone()),
            document_name: Some(package.document_name.clone()),
            page_count: Some(package.page_count),
            pages: Vec::new(),
        }
    }

    #[test]
    fn add_and_remove_keep_numbering_contiguous() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        assert_eq!(session.status(), SessionStatus::Idle);

        session.add_pages(vec![image(1)]);
        assert_eq!(numbers(&session), vec![1]);
        assert!(!session.is_multi_page());
        assert_eq!(session.status(), SessionStatus::Accumulating);

        let ids = session.add_pages(vec![image(2), image(3)]);
        assert_eq!(numbers(&session), vec![1, 2, 3]);
        // Only the first batch decides the flag.
        assert!(!session.is_multi_page());

        assert!(session.remove_page(&ids[0]));
        assert_eq!(numbers(&session), vec![1, 2]);
        assert_eq!(session.pages()[1].id(), ids[1]);
    }

    #[test]
    fn first_batch_of_several_files_is_multi_page() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1), image(2)]);
        assert!(session.is_multi_page());

        session.set_multi_page(false);
        assert!(!session.is_multi_page());
    }

    #[test]
    fn capture_page_marks_single_page_and_camera_source() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.set_multi_page(true);
        let id = session.capture_page(image(9));
        assert!(!session.is_multi_page());
        assert_eq!(session.pages()[0].id(), id);
        assert_eq!(session.pages()[0].source(), PageSource::Camera);
        assert_eq!(session.pages()[0].document_id(), session.document_id());
    }

    #[test]
    fn empty_batch_is_ignored() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        assert!(session.add_pages(Vec::new()).is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn removing_unknown_page_changes_nothing() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1), image(2)]);
        let before = numbers(&session);
        assert!(!session.remove_page("missing"));
        assert_eq!(numbers(&session), before);
        assert_eq!(session.status(), SessionStatus::Accumulating);
    }

    #[test]
    fn removing_last_page_returns_to_idle() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        let ids = session.add_pages(vec![image(1)]);
        session.remove_page(&ids[0]);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.pages().is_empty());
    }

    #[test]
    fn removing_every_page_after_upload_keeps_complete() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        let ids = session.add_pages(vec![image(1), image(2)]);
        let document_id = session.document_id().to_string();
        let package = session.begin_submit().unwrap();
        session.finish_submit(&package, Ok(receipt(&package)));

        for id in &ids {
            assert!(session.remove_page(id));
        }
        assert!(session.pages().is_empty());
        assert_eq!(session.status(), SessionStatus::Complete);
        assert_eq!(session.document_id(), document_id);
        assert!(!session.is_dirty());

        session.reset();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_ne!(session.document_id(), document_id);
    }

    #[test]
    fn removing_every_page_after_failure_keeps_error() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        let ids = session.add_pages(vec![image(1)]);
        let package = session.begin_submit().unwrap();
        session.finish_submit(&package, Err(anyhow!("timeout")));

        assert!(session.remove_page(&ids[0]));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.last_error(), Some("Upload error: timeout"));
    }

    #[test]
    fn submit_on_empty_session_is_skipped() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        assert_eq!(session.begin_submit().unwrap_err(), SubmitOutcome::Skipped);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn second_submit_while_in_flight_is_rejected() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1)]);
        let _package = session.begin_submit().unwrap();
        assert_eq!(session.status(), SessionStatus::Submitting);
        assert_eq!(session.begin_submit().unwrap_err(), SubmitOutcome::InFlight);
    }

    #[test]
    fn failure_keeps_pages_and_allows_retry() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1), image(2)]);
        let package = session.begin_submit().unwrap();
        let outcome = session.finish_submit(&package, Err(anyhow!("connection refused")));

        assert_eq!(
            outcome,
            SubmitOutcome::Failed {
                message: "Upload error: connection refused".to_string()
            }
        );
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.pages().len(), 2);
        assert_eq!(session.last_error(), Some("Upload error: connection refused"));
        assert!(session.is_dirty());

        let retry = session.begin_submit().unwrap();
        assert_eq!(retry.page_ids(), package.page_ids());
        assert_eq!(retry.document_id, package.document_id);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn success_completes_and_requests_auto_reset_for_single_page() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1)]);
        let package = session.begin_submit().unwrap();
        let outcome = session.finish_submit(&package, Ok(receipt(&package)));
        assert!(matches!(
            outcome,
            SubmitOutcome::Completed {
                auto_reset: true,
                ..
            }
        ));
        assert_eq!(session.status(), SessionStatus::Complete);
        assert!(!session.is_dirty());
    }

    #[test]
    fn pages_added_during_submit_are_not_in_the_package() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1), image(2)]);
        let package = session.begin_submit().unwrap();
        session.add_pages(vec![image(3)]);
        assert_eq!(session.status(), SessionStatus::Submitting);
        assert_eq!(package.page_count, 2);

        let outcome = session.finish_submit(&package, Ok(receipt(&package)));
        assert!(matches!(
            outcome,
            SubmitOutcome::Completed {
                auto_reset: false,
                ..
            }
        ));
        assert_eq!(session.status(), SessionStatus::Complete);
        // The late page has not been uploaded yet.
        assert!(session.is_dirty());
    }

    #[test]
    fn result_for_replaced_document_is_discarded() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        session.add_pages(vec![image(1)]);
        let package = session.begin_submit().unwrap();
        session.reset();
        let outcome = session.finish_submit(&package, Ok(receipt(&package)));
        assert_eq!(outcome, SubmitOutcome::Discarded);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn reset_starts_a_new_document_and_releases_previews() {
        let previews = PreviewRegistry::new();
        let mut session = CaptureSession::new(previews.clone());
        let first_id = session.document_id().to_string();
        session.add_pages(vec![image(1), image(2), image(3)]);
        session.set_document_name("Scan");
        assert_eq!(previews.live_count(), 3);

        session.reset();
        assert_ne!(session.document_id(), first_id);
        assert!(session.pages().is_empty());
        assert_eq!(session.document_name(), "");
        assert!(!session.is_multi_page());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(previews.live_count(), 0);
    }

    #[test]
    fn dirty_tracks_unsaved_pages() {
        let mut session = CaptureSession::new(PreviewRegistry::new());
        assert!(!session.is_dirty());
        session.add_pages(vec![image(1)]);
        assert!(session.is_dirty());
        assert!(session.snapshot().dirty);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..4).prop_map(Op::Add),
            (0usize..8).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn numbering_and_previews_hold_for_any_sequence(ops in prop::collection::vec(op(), 0..40)) {
            let previews = PreviewRegistry::new();
            let mut session = CaptureSession::new(previews.clone());
            let document_id = session.document_id().to_string();
            for op in ops {
                match op {
                    Op::Add(count) => {
                        session.add_pages((0..count).map(|tag| image(tag as u8)).collect());
                    }
                    Op::Remove(index) => {
                        let id = session
                            .pages()
                            .get(index)
                            .map(|page| page.id().to_string())
                            .unwrap_or_else(|| "missing".to_string());
                        session.remove_page(&id);
                    }
                }
                let expected = (1..=session.pages().len()).collect::<Vec<_>>();
                prop_assert_eq!(numbers(&session), expected);
                prop_assert_eq!(previews.live_count(), session.pages().len());
                prop_assert_eq!(session.document_id(), document_id.as_str());
            }
        }
    }
}
