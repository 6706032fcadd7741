//! Transient display handles for previews.
//!
//! A [`DisplayHandle`] stands in for a browser object URL: it names some
//! encoded bytes in a [`HandleRegistry`] until it is revoked. Revocation
//! happens exactly once, either explicitly via [`DisplayHandle::revoke`]
//! or when the handle is dropped. The registry counts live handles so a
//! leak shows up as a number that never returns to zero.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Entries {
    next_id: u64,
    live: HashMap<u64, Entry>,
}

#[derive(Debug)]
struct Entry {
    bytes: Arc<[u8]>,
    mime: &'static str,
}

/// Owner of all live display handles.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl HandleRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return a handle naming them.
    #[must_use]
    pub fn create(&self, bytes: impl Into<Arc<[u8]>>, mime: &'static str) -> DisplayHandle {
        let mut entries = self.entries.lock();
        entries.next_id += 1;
        let id = entries.next_id;
        entries.live.insert(
            id,
            Entry {
                bytes: bytes.into(),
                mime,
            },
        );
        tracing::trace!(id, live = entries.live.len(), "display handle created");
        DisplayHandle {
            id,
            registry: self.clone(),
        }
    }

    /// Bytes and MIME type behind `url`, if it is still live.
    #[must_use]
    pub fn fetch(&self, url: &str) -> Option<(Arc<[u8]>, &'static str)> {
        let id = url.strip_prefix(URL_PREFIX)?.parse::<u64>().ok()?;
        self.entries
            .lock()
            .live
            .get(&id)
            .map(|e| (Arc::clone(&e.bytes), e.mime))
    }

    /// Number of handles not yet revoked.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.lock().live.len()
    }

    fn release(&self, id: u64) {
        let mut entries = self.entries.lock();
        if entries.live.remove(&id).is_some() {
            tracing::trace!(id, live = entries.live.len(), "display handle revoked");
        }
    }
}

const URL_PREFIX: &str = "blob:atelier/";

/// A revocable reference to registered bytes.
pub struct DisplayHandle {
    id: u64,
    registry: HandleRegistry,
}

impl DisplayHandle {
    /// URL-like name for this handle.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{URL_PREFIX}{}", self.id)
    }

    /// The bytes behind this handle.
    #[must_use]
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.registry.fetch(&self.url()).map(|(bytes, _)| bytes)
    }

    /// Release the handle now rather than on drop.
    pub fn revoke(self) {
        drop(self);
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DisplayHandle").field(&self.url()).finish()
    }
}

/// Holds at most one handle; replacing it releases the old one.
#[derive(Debug, Default)]
pub struct HandleSlot {
    current: Option<DisplayHandle>,
}

impl HandleSlot {
    /// An empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Install `handle`, then release the previous one.
    pub fn replace(&mut self, handle: DisplayHandle) {
        let previous = self.current.replace(handle);
        drop(previous);
    }

    /// Release the held handle, if any.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// The held handle.
    #[must_use]
    pub const fn get(&self) -> Option<&DisplayHandle> {
        self.current.as_ref()
    }

    /// URL of the held handle.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.current.as_ref().map(DisplayHandle::url)
    }
}
