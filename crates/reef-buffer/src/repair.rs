//! Repair strategies for corrupt blobs.
//!
//! A backend handing out a buffer decides at construction time whether
//! corruption of that blob can be repaired (typically by deleting or
//! re-fetching the stored copy). The callback is invoked at most once per
//! buffer lineage: the guard is shared with every clone derived from the
//! buffer, no matter which consumer trips the corruption first.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use reef_digest::Digest;
use tracing::{info, warn};

use crate::error::BufferError;

/// Future returned by a repair callback.
pub type RepairFuture = Pin<Box<dyn Future<Output = Result<(), BufferError>> + Send>>;

type RepairFn = Box<dyn FnOnce() -> RepairFuture + Send>;

/// Whether corruption of a buffer triggers a repair of the backing store.
#[derive(Clone)]
pub enum RepairStrategy {
    /// Corruption is surfaced as-is.
    Irreparable,
    /// Corruption invokes a one-shot callback before the error surfaces.
    Reparable(Arc<RepairShared>),
}

/// State shared across a reparable buffer's whole clone lineage.
pub struct RepairShared {
    digest: Digest,
    callback: Mutex<Option<RepairFn>>,
}

impl RepairStrategy {
    /// A strategy invoking `callback` on the first detected corruption.
    pub fn reparable<F>(digest: Digest, callback: F) -> RepairStrategy
    where
        F: FnOnce() -> RepairFuture + Send + 'static,
    {
        RepairStrategy::Reparable(Arc::new(RepairShared {
            digest,
            callback: Mutex::new(Some(Box::new(callback))),
        }))
    }

    /// React to a corruption verdict, returning the error to surface.
    ///
    /// The corruption error passes through unchanged unless the repair
    /// callback itself fails, in which case the repair failure replaces it.
    pub(crate) async fn on_corruption(&self, error: BufferError) -> BufferError {
        let shared = match self {
            RepairStrategy::Irreparable => return error,
            RepairStrategy::Reparable(shared) => shared,
        };
        let callback = shared.callback.lock().expect("repair lock poisoned").take();
        let Some(callback) = callback else {
            return error;
        };
        warn!(digest = %shared.digest, error = %error, "blob failed validation, repairing");
        match callback().await {
            Ok(()) => {
                info!(digest = %shared.digest, "blob repair completed");
                error
            }
            Err(repair_error) => BufferError::RepairFailed(Box::new(repair_error)),
        }
    }
}
