use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{CaptureSession, PreviewRegistry, SessionSnapshot, SessionStatus, SubmitOutcome};
use crate::backend::Uploader;
use crate::data::ImageInput;

struct Inner {
    session: CaptureSession,
    pending_reset: Option<JoinHandle<()>>,
}

/// Drives a [`CaptureSession`] from UI events.
///
/// Mutations run to completion under a short lock. `submit` only holds the
/// lock while snapshotting and while applying the result, so pages can still
/// be added or removed while an upload is in flight.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
    uploader: Arc<dyn Uploader>,
    auto_reset_delay: Duration,
}

impl SessionManager {
    pub fn new(uploader: Arc<dyn Uploader>, auto_reset_delay: Duration) -> Self {
        Self::with_previews(uploader, auto_reset_delay, PreviewRegistry::new())
    }

    pub fn with_previews(
        uploader: Arc<dyn Uploader>,
        auto_reset_delay: Duration,
        previews: PreviewRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session: CaptureSession::new(previews),
                pending_reset: None,
            })),
            uploader,
            auto_reset_delay,
        }
    }

    pub fn add_pages(&self, inputs: Vec<ImageInput>) -> Vec<String> {
        self.inner.lock().session.add_pages(inputs)
    }

    pub fn capture_page(&self, input: ImageInput) -> String {
        self.inner.lock().session.capture_page(input)
    }

    pub fn remove_page(&self, page_id: &str) -> bool {
        self.inner.lock().session.remove_page(page_id)
    }

    pub fn set_document_name(&self, name: impl Into<String>) {
        self.inner.lock().session.set_document_name(name);
    }

    pub fn set_multi_page(&self, flag: bool) {
        self.inner.lock().session.set_multi_page(flag);
    }

    pub fn document_id(&self) -> String {
        self.inner.lock().session.document_id().to_string()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().session.status()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().session.is_dirty()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().session.snapshot()
    }

    /// Resolves the page id shown at `page_number` (1-based).
    pub fn page_id_at(&self, page_number: usize) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .session
            .pages()
            .iter()
            .find(|page| page.page_number() == page_number)
            .map(|page| page.id().to_string())
    }

    pub fn preview_data_url(&self, page_id: &str) -> Option<String> {
        let inner = self.inner.lock();
        let page = inner
            .session
            .pages()
            .iter()
            .find(|page| page.id() == page_id)?;
        inner.session.previews().data_url(page.preview())
    }

    /// Uploads the current pages. Never returns an error: failures leave the
    /// session in `error` with its pages intact.
    pub async fn submit(&self) -> SubmitOutcome {
        let package = match self.inner.lock().session.begin_submit() {
            Ok(package) => package,
            Err(outcome) => return outcome,
        };

        let result = self.uploader.upload(package.clone()).await;

        let mut inner = self.inner.lock();
        let outcome = inner.session.finish_submit(&package, result);
        if let SubmitOutcome::Completed {
            auto_reset: true, ..
        } = &outcome
        {
            let handle = self.schedule_reset(package.document_id.clone());
            if let Some(previous) = inner.pending_reset.replace(handle) {
                previous.abort();
            }
        }
        outcome
    }

    /// Clears the session unconditionally and cancels a pending auto-reset.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.pending_reset.take() {
            pending.abort();
            debug!("cancelled pending auto-reset");
        }
        inner.session.reset();
    }

    /// "New document": asks `confirm` before discarding unsaved pages.
    /// Returns whether the session was reset.
    pub fn start_new_document<F>(&self, confirm: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        if self.is_dirty() && !confirm() {
            return false;
        }
        self.reset();
        true
    }

    fn schedule_reset(&self, document_id: String) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let delay = self.auto_reset_delay;
        debug!(
            "document {}: auto-reset in {}ms",
            document_id,
            delay.as_millis()
        );
        tokio::spawn(async move {
            sleep(delay).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut inner = inner.lock();
            let session = &mut inner.session;
            if session.document_id() != document_id
                || session.status() != SessionStatus::Complete
                || session.is_dirty()
            {
                debug!("document {}: auto-reset skipped", document_id);
                return;
            }
            session.reset();
            inner.pending_reset = None;
            info!("document {}: cleared after upload", document_id);
        })
    }
}
