//! The blob access contract.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reef_buffer::{Buffer, BufferError};
use reef_digest::Digest;
use reef_proto::CacheCapabilities;

/// What a backend stores, deciding how buffers handed out by `get` behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Blobs keyed by the hash of their contents; reads validate.
    ContentAddressable,
    /// Serialized action results keyed by action digests; payloads are
    /// trusted, size-checked only.
    ActionCache,
}

/// The contract the network layer calls against storage.
///
/// All implementations must be `Send + Sync` so one stack serves every
/// request task. Cancellation follows the Tokio model: dropping a pending
/// call abandons it, and buffers returned earlier keep surfacing whatever
/// error their source observed.
#[async_trait]
pub trait BlobAccess: Send + Sync {
    /// Fetch a blob as a buffer whose declared digest equals `digest`.
    ///
    /// Absence and backend failure are reported through an error-state
    /// buffer, so they surface on the caller's consumption schedule. Whether
    /// corruption of the returned buffer is reparable is the backend's
    /// choice, made here.
    async fn get(&self, digest: &Digest) -> Buffer;

    /// Store a blob, consuming `buffer` end-to-end (and with it, running its
    /// validation) before committing.
    async fn put(&self, digest: &Digest, buffer: Buffer) -> Result<(), BufferError>;

    /// The subset of `digests` absent from this store.
    async fn find_missing(&self, digests: BTreeSet<Digest>) -> Result<BTreeSet<Digest>, BufferError>;

    /// Static capability advertisement for `instance`.
    async fn get_capabilities(&self, instance: &str) -> Result<CacheCapabilities, BufferError>;
}
