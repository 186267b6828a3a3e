//! REv2 message types consumed by the Reef storage layer.
//!
//! Only the messages the storage core actually decodes or advertises are
//! defined: [`ActionResult`] and its children for the Action Cache, and
//! [`CacheCapabilities`] for capability advertisement. Field numbers match
//! the Remote Execution API, so payloads interoperate with any REv2 client.
//! The derives are written out by hand instead of generated at build time,
//! which keeps protoc out of the build; the wire format is identical.

use bytes::Bytes;

/// A content digest as it appears inside REv2 messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Digest {
    /// Lowercase hexadecimal hash of the blob.
    #[prost(string, tag = "1")]
    pub hash: String,
    /// Size of the blob in bytes.
    #[prost(int64, tag = "2")]
    pub size_bytes: i64,
}

/// A single output file captured by an executed action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputFile {
    /// Path of the file, relative to the action's working directory.
    #[prost(string, tag = "1")]
    pub path: String,
    /// Digest of the file's contents in the CAS.
    #[prost(message, optional, tag = "2")]
    pub digest: Option<Digest>,
    /// Whether the file carries the executable bit.
    #[prost(bool, tag = "4")]
    pub is_executable: bool,
    /// Inlined contents for small files.
    #[prost(bytes = "bytes", tag = "5")]
    pub contents: Bytes,
}

/// A single output directory captured by an executed action.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputDirectory {
    /// Path of the directory, relative to the action's working directory.
    #[prost(string, tag = "1")]
    pub path: String,
    /// Digest of the serialized `Tree` message describing the directory.
    #[prost(message, optional, tag = "2")]
    pub tree_digest: Option<Digest>,
}

/// The result of an executed action, as stored in the Action Cache.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActionResult {
    /// Files produced by the action.
    #[prost(message, repeated, tag = "2")]
    pub output_files: Vec<OutputFile>,
    /// Directories produced by the action.
    #[prost(message, repeated, tag = "3")]
    pub output_directories: Vec<OutputDirectory>,
    /// Exit code of the action's command.
    #[prost(int32, tag = "4")]
    pub exit_code: i32,
    /// Inlined standard output for small captures.
    #[prost(bytes = "bytes", tag = "5")]
    pub stdout_raw: Bytes,
    /// Digest of the standard output in the CAS.
    #[prost(message, optional, tag = "6")]
    pub stdout_digest: Option<Digest>,
    /// Inlined standard error for small captures.
    #[prost(bytes = "bytes", tag = "7")]
    pub stderr_raw: Bytes,
    /// Digest of the standard error in the CAS.
    #[prost(message, optional, tag = "8")]
    pub stderr_digest: Option<Digest>,
}

/// Digest function advertised through `GetCapabilities`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DigestFunction {
    Unknown = 0,
    Sha256 = 1,
    Sha1 = 2,
    Md5 = 3,
    Vso = 4,
    Sha384 = 5,
    Sha512 = 6,
}

/// Capabilities of an action cache with respect to updates.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ActionCacheUpdateCapabilities {
    /// Whether `UpdateActionResult` calls are accepted.
    #[prost(bool, tag = "1")]
    pub update_enabled: bool,
}

/// Static cache capabilities advertised to clients.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CacheCapabilities {
    /// Digest functions the storage accepts, as raw enum values.
    #[prost(enumeration = "DigestFunction", repeated, tag = "1")]
    pub digest_functions: Vec<i32>,
    /// Action cache update capabilities.
    #[prost(message, optional, tag = "2")]
    pub action_cache_update_capabilities: Option<ActionCacheUpdateCapabilities>,
    /// Maximum total size of a batch request, in bytes. Zero means unlimited.
    #[prost(int64, tag = "4")]
    pub max_batch_total_size_bytes: i64,
}

impl CacheCapabilities {
    /// The advertised digest functions, skipping unrecognized values.
    pub fn functions(&self) -> impl Iterator<Item = DigestFunction> + '_ {
        self.digest_functions
            .iter()
            .filter_map(|v| DigestFunction::try_from(*v).ok())
    }

    /// Whether action cache updates are advertised as enabled.
    pub fn update_enabled(&self) -> bool {
        self.action_cache_update_capabilities
            .map(|c| c.update_enabled)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_action_result_roundtrip() {
        let result = ActionResult {
            output_files: vec![OutputFile {
                path: "bazel-out/foo.o".to_string(),
                digest: Some(Digest {
                    hash: "8b1a9953c4611296a827abf8c47804d7".to_string(),
                    size_bytes: 5,
                }),
                is_executable: false,
                contents: Bytes::new(),
            }],
            output_directories: Vec::new(),
            exit_code: 1,
            stdout_raw: Bytes::from_static(b"compiling"),
            stdout_digest: None,
            stderr_raw: Bytes::new(),
            stderr_digest: None,
        };
        let encoded = result.encode_to_vec();
        let decoded = ActionResult::decode(encoded.as_slice()).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn test_default_action_result_is_empty_on_the_wire() {
        assert!(ActionResult::default().encode_to_vec().is_empty());
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        // 0x6c carries wire type 4 (group end), which is invalid here.
        assert!(ActionResult::decode(&b"Hello"[..]).is_err());
    }

    #[test]
    fn test_capabilities_accessors() {
        let caps = CacheCapabilities {
            digest_functions: vec![DigestFunction::Md5 as i32, DigestFunction::Sha256 as i32],
            action_cache_update_capabilities: Some(ActionCacheUpdateCapabilities {
                update_enabled: true,
            }),
            max_batch_total_size_bytes: 2 * 1024 * 1024,
        };
        assert_eq!(
            caps.functions().collect::<Vec<_>>(),
            vec![DigestFunction::Md5, DigestFunction::Sha256]
        );
        assert!(caps.update_enabled());
        assert!(!CacheCapabilities::default().update_enabled());
    }
}
