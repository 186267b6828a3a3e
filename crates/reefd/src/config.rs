//! TOML configuration for the Reef daemon.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reef_blobstore::{
    AllowAuthorizer, Authorizer, BlobAccess, DenyAuthorizer, InstanceNameAuthorizer,
    MemoryBlobAccess, MirroredBlobAccess, ShardingBlobAccess, StorageKind,
};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Content-addressable storage backend.
    pub cas: StorageSection,
    /// Action cache backend.
    pub ac: StorageSection,
    /// Per-method authorization.
    pub authorization: AuthorizationSection,
    /// Transfer limits advertised to clients.
    pub limits: LimitsSection,
    /// Logging configuration.
    pub log: LogSection,
}

impl CliConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> Result<CliConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse configuration from {}", path.display()))
    }
}

/// `[cas]` / `[ac]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type. Only `"memory"` is built in; persistent backends attach
    /// through the same interface.
    pub backend: String,
    /// Largest blob accepted by `put`, in bytes.
    pub maximum_blob_size: usize,
    /// Number of digest-keyed shards. One means no sharding.
    pub shards: usize,
    /// Whether to run two replicas behind a mirror.
    pub mirrored: bool,
}

impl Default for StorageSection {
    fn default() -> StorageSection {
        StorageSection {
            backend: "memory".to_string(),
            maximum_blob_size: 64 * 1024 * 1024,
            shards: 1,
            mirrored: false,
        }
    }
}

impl StorageSection {
    /// Build the storage stack this section describes.
    pub fn build(&self, kind: StorageKind) -> Result<Arc<dyn BlobAccess>> {
        if self.mirrored {
            let mirrored = MirroredBlobAccess::new(self.build_plain(kind)?, self.build_plain(kind)?);
            return Ok(Arc::new(mirrored));
        }
        self.build_plain(kind)
    }

    fn build_plain(&self, kind: StorageKind) -> Result<Arc<dyn BlobAccess>> {
        if self.shards > 1 {
            let backends = (0..self.shards)
                .map(|_| self.build_backend(kind))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Arc::new(ShardingBlobAccess::new(backends)));
        }
        self.build_backend(kind)
    }

    fn build_backend(&self, kind: StorageKind) -> Result<Arc<dyn BlobAccess>> {
        match self.backend.as_str() {
            "memory" => Ok(Arc::new(MemoryBlobAccess::new(kind, self.maximum_blob_size))),
            other => bail!("unsupported storage backend {other:?}"),
        }
    }
}

/// `[authorization]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationSection {
    /// Policy for reads.
    pub get: AuthorizationPolicy,
    /// Policy for writes.
    pub put: AuthorizationPolicy,
    /// Policy for missing-blob queries.
    pub find_missing: AuthorizationPolicy,
}

/// A single method's authorization policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationPolicy {
    /// Permit every request.
    #[default]
    Allow,
    /// Deny every request.
    Deny,
    /// Permit an allow-listed set of instance names.
    Instances(Vec<String>),
}

impl AuthorizationPolicy {
    /// Build the authorizer this policy describes.
    pub fn build(&self) -> Arc<dyn Authorizer> {
        match self {
            AuthorizationPolicy::Allow => Arc::new(AllowAuthorizer),
            AuthorizationPolicy::Deny => Arc::new(DenyAuthorizer),
            AuthorizationPolicy::Instances(instances) => {
                Arc::new(InstanceNameAuthorizer::new(instances.iter().cloned()))
            }
        }
    }
}

/// `[limits]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Ceiling for inline message payloads; larger transfers stream.
    pub maximum_message_size_bytes: usize,
}

impl Default for LimitsSection {
    fn default() -> LimitsSection {
        LimitsSection {
            maximum_message_size_bytes: 2 * 1024 * 1024,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> LogSection {
        LogSection {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.cas.backend, "memory");
        assert_eq!(config.cas.shards, 1);
        assert!(!config.cas.mirrored);
        assert_eq!(config.limits.maximum_message_size_bytes, 2 * 1024 * 1024);
        assert_eq!(config.log.level, "info");
        assert!(matches!(config.authorization.get, AuthorizationPolicy::Allow));
    }

    #[test]
    fn test_full_configuration() {
        let config: CliConfig = toml::from_str(
            r#"
            [cas]
            backend = "memory"
            maximum_blob_size = 1048576
            shards = 4

            [ac]
            mirrored = true

            [authorization]
            get = "allow"
            put = { instances = ["foo", "bar"] }
            find_missing = "deny"

            [limits]
            maximum_message_size_bytes = 4194304

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.cas.shards, 4);
        assert_eq!(config.cas.maximum_blob_size, 1048576);
        assert!(config.ac.mirrored);
        assert!(matches!(config.authorization.put, AuthorizationPolicy::Instances(_)));
        assert!(matches!(config.authorization.find_missing, AuthorizationPolicy::Deny));
        assert_eq!(config.limits.maximum_message_size_bytes, 4194304);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_build_rejects_unknown_backend() {
        let section = StorageSection {
            backend: "tape".to_string(),
            ..Default::default()
        };
        assert!(section.build(StorageKind::ContentAddressable).is_err());
    }

    #[tokio::test]
    async fn test_built_stack_serves_capabilities() {
        let section = StorageSection {
            shards: 2,
            mirrored: true,
            ..Default::default()
        };
        let access = section.build(StorageKind::ActionCache).unwrap();
        let capabilities = access.get_capabilities("foo").await.unwrap();
        assert!(capabilities.update_enabled());
    }
}
