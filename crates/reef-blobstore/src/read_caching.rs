//! Read-through caching between a slow and a fast backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reef_buffer::{Buffer, BufferError, Code};
use reef_digest::Digest;
use reef_proto::CacheCapabilities;
use tracing::warn;

use crate::access::BlobAccess;

/// Serves reads from `fast`, falling back to `slow` and promoting what it
/// finds.
///
/// A slow hit is split with `clone_copy`: one half is stored into the fast
/// backend, the other goes to the caller, so the source is read once and
/// validated once. Blobs larger than `maximum_replicate_size` are served
/// without promotion. Promotion failures are logged, not surfaced — the read
/// already has its data.
pub struct ReadCachingBlobAccess {
    slow: Arc<dyn BlobAccess>,
    fast: Arc<dyn BlobAccess>,
    maximum_replicate_size: usize,
}

impl ReadCachingBlobAccess {
    pub fn new(
        slow: Arc<dyn BlobAccess>,
        fast: Arc<dyn BlobAccess>,
        maximum_replicate_size: usize,
    ) -> ReadCachingBlobAccess {
        ReadCachingBlobAccess {
            slow,
            fast,
            maximum_replicate_size,
        }
    }
}

#[async_trait]
impl BlobAccess for ReadCachingBlobAccess {
    async fn get(&self, digest: &Digest) -> Buffer {
        let fast_buffer = self.fast.get(digest).await;
        match fast_buffer.get_size_bytes() {
            Ok(_) => return fast_buffer,
            Err(error) if error.code() == Code::NotFound => {}
            Err(_) => return fast_buffer,
        }

        let slow_buffer = self.slow.get(digest).await;
        let size = match slow_buffer.get_size_bytes() {
            Ok(size) => size,
            Err(_) => return slow_buffer,
        };
        if size > self.maximum_replicate_size as u64 {
            return slow_buffer;
        }

        let (for_fast, for_caller) = slow_buffer.clone_copy(self.maximum_replicate_size);
        if let Err(error) = self.fast.put(digest, for_fast).await {
            warn!(digest = %digest, error = %error, "failed to promote blob into fast backend");
        }
        for_caller
    }

    async fn put(&self, digest: &Digest, buffer: Buffer) -> Result<(), BufferError> {
        self.slow.put(digest, buffer).await
    }

    async fn find_missing(
        &self,
        digests: BTreeSet<Digest>,
    ) -> Result<BTreeSet<Digest>, BufferError> {
        self.slow.find_missing(digests).await
    }

    async fn get_capabilities(&self, instance: &str) -> Result<CacheCapabilities, BufferError> {
        self.slow.get_capabilities(instance).await
    }
}
