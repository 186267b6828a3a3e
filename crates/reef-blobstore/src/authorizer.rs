//! Per-method authorization of blob access.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reef_buffer::BufferError;

/// Decides whether a request against an instance name may proceed.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `Ok` to proceed, `PermissionDenied` otherwise.
    async fn authorize(&self, instance: &str) -> Result<(), BufferError>;
}

/// Authorizer permitting every request.
pub struct AllowAuthorizer;

#[async_trait]
impl Authorizer for AllowAuthorizer {
    async fn authorize(&self, _instance: &str) -> Result<(), BufferError> {
        Ok(())
    }
}

/// Authorizer denying every request.
pub struct DenyAuthorizer;

#[async_trait]
impl Authorizer for DenyAuthorizer {
    async fn authorize(&self, _instance: &str) -> Result<(), BufferError> {
        Err(BufferError::permission_denied("Permission denied"))
    }
}

/// Authorizer permitting an allow-listed set of instance names.
pub struct InstanceNameAuthorizer {
    allowed: BTreeSet<String>,
}

impl InstanceNameAuthorizer {
    pub fn new(allowed: impl IntoIterator<Item = String>) -> InstanceNameAuthorizer {
        InstanceNameAuthorizer {
            allowed: allowed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authorizer for InstanceNameAuthorizer {
    async fn authorize(&self, instance: &str) -> Result<(), BufferError> {
        if self.allowed.contains(instance) {
            Ok(())
        } else {
            Err(BufferError::permission_denied(format!(
                "Permission denied for instance name {instance:?}"
            )))
        }
    }
}
