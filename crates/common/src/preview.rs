//! Preview handles for uploaded images
//!
//! A preview is a lightweight local reference to an uploaded image (the
//! client-side counterpart of an object URL). Every handle issued by the
//! registry must be released exactly once, when its slot is replaced or
//! cleared. The registry tracks live handles so leaks and double releases
//! are observable.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::ImagePayload;

/// Reference to a locally held preview of an uploaded image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    id: u64,
    uri: String,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Issues and releases preview handles
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preview for a payload
    pub fn create(&self, payload: &ImagePayload) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.live.lock().insert(id);
        debug!(
            "Created preview {} for {} ({} bytes)",
            id,
            payload.file_name(),
            payload.len()
        );
        PreviewHandle {
            id,
            uri: format!("preview://{}/{}", id, payload.file_name()),
        }
    }

    /// Release a preview. Releasing the same handle twice is an error.
    pub fn release(&self, handle: &PreviewHandle) -> Result<()> {
        if self.live.lock().remove(&handle.id) {
            debug!("Released preview {}", handle.id);
            Ok(())
        } else {
            warn!("Preview {} released more than once", handle.id);
            Err(Error::PreviewReleased(handle.id))
        }
    }

    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.live.lock().contains(&handle.id)
    }

    /// Number of handles issued and not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
