//! Blob access facade and storage composition for Reef.
//!
//! This crate provides:
//! - [`BlobAccess`] — the get/put/find-missing/capabilities contract the
//!   network layer calls, spoken entirely in [`reef_buffer::Buffer`]s.
//! - [`MemoryBlobAccess`] — the in-memory backend, with repair wired to
//!   delete corrupted entries.
//! - Wrapping policies composing through the same interface:
//!   [`AuthorizingBlobAccess`], [`ReadCachingBlobAccess`],
//!   [`MirroredBlobAccess`], and [`ShardingBlobAccess`].
//! - [`capabilities::merge`] — capability advertisement merging across
//!   backends.

mod access;
mod authorizer;
mod authorizing;
pub mod capabilities;
mod memory;
mod mirrored;
mod read_caching;
mod sharding;

pub use access::{BlobAccess, StorageKind};
pub use authorizer::{AllowAuthorizer, Authorizer, DenyAuthorizer, InstanceNameAuthorizer};
pub use authorizing::AuthorizingBlobAccess;
pub use memory::MemoryBlobAccess;
pub use mirrored::MirroredBlobAccess;
pub use read_caching::ReadCachingBlobAccess;
pub use sharding::ShardingBlobAccess;
