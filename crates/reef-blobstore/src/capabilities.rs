//! Capability advertisement merging.
//!
//! A composed storage stack advertises the capabilities every participating
//! backend can honor: the digest functions all of them accept, action cache
//! updates only when all of them take updates, and the smallest advertised
//! batch ceiling.

use reef_proto::{ActionCacheUpdateCapabilities, CacheCapabilities};

/// Merge capability advertisements from a set of backends.
///
/// An empty slice yields the default (empty) advertisement.
pub fn merge(all: &[CacheCapabilities]) -> CacheCapabilities {
    let Some((first, rest)) = all.split_first() else {
        return CacheCapabilities::default();
    };

    let digest_functions = first
        .digest_functions
        .iter()
        .filter(|f| rest.iter().all(|c| c.digest_functions.contains(f)))
        .copied()
        .collect();

    let update_enabled = all.iter().all(|c| c.update_enabled());

    let max_batch_total_size_bytes = all
        .iter()
        .map(|c| c.max_batch_total_size_bytes)
        .filter(|&b| b > 0)
        .min()
        .unwrap_or(0);

    CacheCapabilities {
        digest_functions,
        action_cache_update_capabilities: Some(ActionCacheUpdateCapabilities { update_enabled }),
        max_batch_total_size_bytes,
    }
}

#[cfg(test)]
mod tests {
    use reef_proto::DigestFunction;

    use super::*;

    fn capabilities(
        functions: &[DigestFunction],
        update_enabled: bool,
        batch: i64,
    ) -> CacheCapabilities {
        CacheCapabilities {
            digest_functions: functions.iter().map(|f| *f as i32).collect(),
            action_cache_update_capabilities: Some(ActionCacheUpdateCapabilities {
                update_enabled,
            }),
            max_batch_total_size_bytes: batch,
        }
    }

    #[test]
    fn test_merge_intersects_digest_functions() {
        let merged = merge(&[
            capabilities(
                &[DigestFunction::Md5, DigestFunction::Sha256],
                true,
                1024,
            ),
            capabilities(
                &[DigestFunction::Sha256, DigestFunction::Sha512],
                true,
                1024,
            ),
        ]);
        assert_eq!(
            merged.functions().collect::<Vec<_>>(),
            vec![DigestFunction::Sha256]
        );
    }

    #[test]
    fn test_merge_requires_all_updates_enabled() {
        let merged = merge(&[
            capabilities(&[DigestFunction::Sha256], true, 0),
            capabilities(&[DigestFunction::Sha256], false, 0),
        ]);
        assert!(!merged.update_enabled());
    }

    #[test]
    fn test_merge_takes_smallest_nonzero_batch() {
        let merged = merge(&[
            capabilities(&[], true, 4096),
            capabilities(&[], true, 0),
            capabilities(&[], true, 1024),
        ]);
        assert_eq!(merged.max_batch_total_size_bytes, 1024);
    }

    #[test]
    fn test_merge_empty_is_default() {
        assert_eq!(merge(&[]), CacheCapabilities::default());
    }
}
