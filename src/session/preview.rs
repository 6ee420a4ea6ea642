use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

type Entries = Mutex<HashMap<String, PreviewEntry>>;

struct PreviewEntry {
    bytes: Arc<[u8]>,
    mime: String,
}

/// Tracks the renderable previews handed out for captured pages.
///
/// Every [`PreviewHandle`] owns exactly one entry and removes it when dropped,
/// so the registry never outlives the pages that reference it.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<Entries>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, bytes: Arc<[u8]>, mime: &str) -> PreviewHandle {
        let key = format!("preview:{}", uuid::Uuid::new_v4());
        self.entries.lock().insert(
            key.clone(),
            PreviewEntry {
                bytes,
                mime: mime.to_string(),
            },
        );
        trace!("allocated {}", key);
        PreviewHandle {
            key,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Number of previews that have been allocated and not yet released.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Renders the preview as a `data:` URL for display surfaces.
    pub fn data_url(&self, handle: &PreviewHandle) -> Option<String> {
        let entries = self.entries.lock();
        let entry = entries.get(&handle.key)?;
        Some(format!(
            "data:{};base64,{}",
            entry.mime,
            BASE64.encode(&entry.bytes)
        ))
    }
}

impl fmt::Debug for PreviewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

/// Display-only reference to a page preview. Not cloneable; the entry is
/// released when the handle is dropped.
pub struct PreviewHandle {
    key: String,
    entries: Weak<Entries>,
}

impl PreviewHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().remove(&self.key);
            trace!("released {}", self.key);
        }
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreviewHandle").field(&self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(value: &[u8]) -> Arc<[u8]> {
        Arc::from(value.to_vec())
    }

    #[test]
    fn dropping_a_handle_releases_its_entry() {
        let registry = PreviewRegistry::new();
        let first = registry.allocate(bytes(b"one"), "image/jpeg");
        let second = registry.allocate(bytes(b"two"), "image/png");
        assert_eq!(registry.live_count(), 2);
        assert_ne!(first.key(), second.key());

        drop(first);
        assert_eq!(registry.live_count(), 1);
        assert!(registry.data_url(&second).is_some());

        drop(second);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn data_url_encodes_bytes_with_mime() {
        let registry = PreviewRegistry::new();
        let handle = registry.allocate(bytes(b"hi"), "image/png");
        assert_eq!(
            registry.data_url(&handle).as_deref(),
            Some("data:image/png;base64,aGk=")
        );
    }

    #[test]
    fn handle_outliving_registry_drops_cleanly() {
        let registry = PreviewRegistry::new();
        let handle = registry.allocate(bytes(b"x"), "image/jpeg");
        drop(registry);
        drop(handle);
    }
}
