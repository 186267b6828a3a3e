//! Authorization wrapper over a blob access.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use reef_buffer::{Buffer, BufferError};
use reef_digest::Digest;
use reef_proto::CacheCapabilities;

use crate::access::BlobAccess;
use crate::authorizer::Authorizer;

/// Gates every method of a [`BlobAccess`] behind its own [`Authorizer`].
///
/// Capabilities are advertised when at least one method is authorized; a
/// denied `put` clears `update_enabled` from the advertised action cache
/// capabilities so clients do not attempt writes that would be rejected.
pub struct AuthorizingBlobAccess {
    backend: Arc<dyn BlobAccess>,
    get_authorizer: Arc<dyn Authorizer>,
    put_authorizer: Arc<dyn Authorizer>,
    find_missing_authorizer: Arc<dyn Authorizer>,
}

impl AuthorizingBlobAccess {
    pub fn new(
        backend: Arc<dyn BlobAccess>,
        get_authorizer: Arc<dyn Authorizer>,
        put_authorizer: Arc<dyn Authorizer>,
        find_missing_authorizer: Arc<dyn Authorizer>,
    ) -> AuthorizingBlobAccess {
        AuthorizingBlobAccess {
            backend,
            get_authorizer,
            put_authorizer,
            find_missing_authorizer,
        }
    }
}

#[async_trait]
impl BlobAccess for AuthorizingBlobAccess {
    async fn get(&self, digest: &Digest) -> Buffer {
        if let Err(error) = self.get_authorizer.authorize(digest.instance()).await {
            return Buffer::from_error(error);
        }
        self.backend.get(digest).await
    }

    async fn put(&self, digest: &Digest, buffer: Buffer) -> Result<(), BufferError> {
        if let Err(error) = self.put_authorizer.authorize(digest.instance()).await {
            buffer.discard();
            return Err(error);
        }
        self.backend.put(digest, buffer).await
    }

    async fn find_missing(
        &self,
        digests: BTreeSet<Digest>,
    ) -> Result<BTreeSet<Digest>, BufferError> {
        let instances: BTreeSet<&str> = digests.iter().map(|d| d.instance()).collect();
        for instance in instances {
            self.find_missing_authorizer.authorize(instance).await?;
        }
        self.backend.find_missing(digests).await
    }

    async fn get_capabilities(&self, instance: &str) -> Result<CacheCapabilities, BufferError> {
        let get_allowed = self.get_authorizer.authorize(instance).await.is_ok();
        let put_allowed = self.put_authorizer.authorize(instance).await.is_ok();
        let find_missing_allowed = self
            .find_missing_authorizer
            .authorize(instance)
            .await
            .is_ok();
        if !get_allowed && !put_allowed && !find_missing_allowed {
            return Err(BufferError::permission_denied("Permission denied"));
        }
        let mut capabilities = self.backend.get_capabilities(instance).await?;
        if !put_allowed {
            if let Some(update) = &mut capabilities.action_cache_update_capabilities {
                update.update_enabled = false;
            }
        }
        Ok(capabilities)
    }
}
