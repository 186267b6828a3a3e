//! In-memory blob storage backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use reef_buffer::{Buffer, BufferError, RepairStrategy};
use reef_digest::Digest;
use reef_proto::{
    ActionCacheUpdateCapabilities, CacheCapabilities, DigestFunction,
};
use tracing::{debug, info};

use crate::access::{BlobAccess, StorageKind};

/// Default ceiling for batched transfers, advertised through capabilities.
const DEFAULT_BATCH_SIZE_BYTES: i64 = 2 * 1024 * 1024;

/// In-memory blob store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for proxies configured to run in memory-only mode.
/// Content-addressed reads hand out reparable buffers whose repair callback
/// deletes the corrupted entry, so a blob that fails validation once is
/// re-fetched from upstream rather than served corrupt forever.
pub struct MemoryBlobAccess {
    kind: StorageKind,
    maximum_blob_size: usize,
    blobs: Arc<RwLock<HashMap<Digest, Bytes>>>,
}

impl MemoryBlobAccess {
    /// Create a store of the given kind, rejecting blobs larger than
    /// `maximum_blob_size` at `put` time.
    pub fn new(kind: StorageKind, maximum_blob_size: usize) -> MemoryBlobAccess {
        MemoryBlobAccess {
            kind,
            maximum_blob_size,
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Reference to the inner map (for testing purposes).
    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<RwLock<HashMap<Digest, Bytes>>> {
        &self.blobs
    }
}

#[async_trait]
impl BlobAccess for MemoryBlobAccess {
    async fn get(&self, digest: &Digest) -> Buffer {
        let data = self
            .blobs
            .read()
            .expect("lock poisoned")
            .get(digest)
            .cloned();
        let Some(data) = data else {
            return Buffer::from_error(BufferError::NotFound);
        };
        match self.kind {
            StorageKind::ActionCache => Buffer::from_validated_byte_slice(data),
            StorageKind::ContentAddressable => {
                let blobs = self.blobs.clone();
                let key = digest.clone();
                let repair = RepairStrategy::reparable(digest.clone(), move || {
                    Box::pin(async move {
                        blobs.write().expect("lock poisoned").remove(&key);
                        info!(digest = %key, "deleted corrupted blob");
                        Ok(())
                    })
                });
                Buffer::cas_from_byte_slice(digest.clone(), data, repair)
            }
        }
    }

    async fn put(&self, digest: &Digest, buffer: Buffer) -> Result<(), BufferError> {
        // Consuming the buffer end-to-end runs its validation, so nothing is
        // committed unless the payload checks out.
        let data = buffer.to_byte_slice(self.maximum_blob_size).await?;
        debug!(digest = %digest, size = data.len(), "storing blob in memory");
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(digest.clone(), data);
        Ok(())
    }

    async fn find_missing(
        &self,
        digests: BTreeSet<Digest>,
    ) -> Result<BTreeSet<Digest>, BufferError> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(digests
            .into_iter()
            .filter(|digest| !blobs.contains_key(digest))
            .collect())
    }

    async fn get_capabilities(&self, _instance: &str) -> Result<CacheCapabilities, BufferError> {
        Ok(CacheCapabilities {
            digest_functions: vec![
                DigestFunction::Md5 as i32,
                DigestFunction::Sha1 as i32,
                DigestFunction::Sha256 as i32,
                DigestFunction::Sha512 as i32,
            ],
            action_cache_update_capabilities: Some(ActionCacheUpdateCapabilities {
                update_enabled: self.kind == StorageKind::ActionCache,
            }),
            max_batch_total_size_bytes: DEFAULT_BATCH_SIZE_BYTES,
        })
    }
}
