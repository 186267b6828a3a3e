//! Digest-keyed sharding across a set of backends.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reef_buffer::{Buffer, BufferError};
use reef_digest::Digest;
use reef_proto::CacheCapabilities;

use crate::access::BlobAccess;
use crate::capabilities;

/// Routes each digest to one of a fixed set of backends.
///
/// The leading bytes of a content hash are uniformly distributed, so taking
/// them modulo the shard count spreads blobs evenly. The instance name does
/// not participate: the same blob lands on the same shard for every caller.
pub struct ShardingBlobAccess {
    backends: Vec<Arc<dyn BlobAccess>>,
}

impl ShardingBlobAccess {
    pub fn new(backends: Vec<Arc<dyn BlobAccess>>) -> ShardingBlobAccess {
        assert!(!backends.is_empty(), "sharding requires at least one backend");
        ShardingBlobAccess { backends }
    }

    fn shard_index(&self, digest: &Digest) -> usize {
        let mut key = [0u8; 8];
        key.copy_from_slice(&digest.hash_bytes()[..8]);
        (u64::from_be_bytes(key) % self.backends.len() as u64) as usize
    }

    fn backend_for(&self, digest: &Digest) -> &Arc<dyn BlobAccess> {
        &self.backends[self.shard_index(digest)]
    }
}

#[async_trait]
impl BlobAccess for ShardingBlobAccess {
    async fn get(&self, digest: &Digest) -> Buffer {
        self.backend_for(digest).get(digest).await
    }

    async fn put(&self, digest: &Digest, buffer: Buffer) -> Result<(), BufferError> {
        self.backend_for(digest).put(digest, buffer).await
    }

    async fn find_missing(
        &self,
        digests: BTreeSet<Digest>,
    ) -> Result<BTreeSet<Digest>, BufferError> {
        let mut per_shard: Vec<BTreeSet<Digest>> = vec![BTreeSet::new(); self.backends.len()];
        for digest in digests {
            let index = self.shard_index(&digest);
            per_shard[index].insert(digest);
        }

        let mut missing = BTreeSet::new();
        for (backend, subset) in self.backends.iter().zip(per_shard) {
            if subset.is_empty() {
                continue;
            }
            missing.append(&mut backend.find_missing(subset).await?);
        }
        Ok(missing)
    }

    async fn get_capabilities(&self, instance: &str) -> Result<CacheCapabilities, BufferError> {
        let mut all = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            all.push(backend.get_capabilities(instance).await?);
        }
        Ok(capabilities::merge(&all))
    }
}
