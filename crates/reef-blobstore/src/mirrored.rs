//! Synchronous replication across a pair of backends.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reef_buffer::{Buffer, BufferError, Code};
use reef_digest::Digest;
use reef_proto::CacheCapabilities;
use tracing::info;

use crate::access::BlobAccess;
use crate::capabilities;

/// Keeps two backends holding the same blobs.
///
/// Writes fan out with `clone_stream`, so both replicas are fed from one
/// traversal of the source and both must acknowledge. Reads fall back to the
/// other replica on absence. `find_missing` reports only blobs absent from
/// both replicas; a blob present in exactly one is re-replicated on the spot,
/// healing divergence as it is discovered.
pub struct MirroredBlobAccess {
    backend_a: Arc<dyn BlobAccess>,
    backend_b: Arc<dyn BlobAccess>,
}

impl MirroredBlobAccess {
    pub fn new(backend_a: Arc<dyn BlobAccess>, backend_b: Arc<dyn BlobAccess>) -> MirroredBlobAccess {
        MirroredBlobAccess {
            backend_a,
            backend_b,
        }
    }

    async fn replicate(
        &self,
        holder: &Arc<dyn BlobAccess>,
        target: &Arc<dyn BlobAccess>,
        digest: &Digest,
    ) -> Result<(), BufferError> {
        info!(digest = %digest, "re-replicating blob to diverged mirror");
        let buffer = holder.get(digest).await;
        target.put(digest, buffer).await
    }
}

#[async_trait]
impl BlobAccess for MirroredBlobAccess {
    async fn get(&self, digest: &Digest) -> Buffer {
        let buffer = self.backend_a.get(digest).await;
        match buffer.get_size_bytes() {
            Err(error) if error.code() == Code::NotFound => self.backend_b.get(digest).await,
            _ => buffer,
        }
    }

    async fn put(&self, digest: &Digest, buffer: Buffer) -> Result<(), BufferError> {
        let (for_a, for_b) = buffer.clone_stream();
        let (result_a, result_b) = tokio::join!(
            self.backend_a.put(digest, for_a),
            self.backend_b.put(digest, for_b),
        );
        result_a?;
        result_b
    }

    async fn find_missing(
        &self,
        digests: BTreeSet<Digest>,
    ) -> Result<BTreeSet<Digest>, BufferError> {
        let (missing_a, missing_b) = tokio::join!(
            self.backend_a.find_missing(digests.clone()),
            self.backend_b.find_missing(digests),
        );
        let missing_a = missing_a?;
        let missing_b = missing_b?;

        for digest in missing_a.difference(&missing_b) {
            self.replicate(&self.backend_b, &self.backend_a, digest)
                .await?;
        }
        for digest in missing_b.difference(&missing_a) {
            self.replicate(&self.backend_a, &self.backend_b, digest)
                .await?;
        }
        Ok(missing_a.intersection(&missing_b).cloned().collect())
    }

    async fn get_capabilities(&self, instance: &str) -> Result<CacheCapabilities, BufferError> {
        let (caps_a, caps_b) = tokio::join!(
            self.backend_a.get_capabilities(instance),
            self.backend_b.get_capabilities(instance),
        );
        Ok(capabilities::merge(&[caps_a?, caps_b?]))
    }
}
