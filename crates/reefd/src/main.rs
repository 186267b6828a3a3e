//! `reefd` — the Reef storage daemon.
//!
//! Builds the configured CAS and Action Cache storage stacks and keeps them
//! alive until a shutdown signal arrives. The REv2 gRPC frontend
//! (ContentAddressableStorage, ByteStream, ActionCache, Capabilities)
//! attaches to the two [`BlobAccess`] stacks assembled here; it is deployment
//! glue and lives outside this repository.
//!
//! # Usage
//!
//! ```text
//! reefd reefd.toml
//! ```
//!
//! Exits zero only after a graceful shutdown via SIGINT; any startup failure
//! exits nonzero.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reef_blobstore::{capabilities, AuthorizingBlobAccess, BlobAccess, StorageKind};
use tracing::info;

use config::{AuthorizationSection, CliConfig, StorageSection};

#[derive(Parser)]
#[command(name = "reefd", version, about = "Reef CAS and action cache storage daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    config: PathBuf,
}

/// Wrap a configured storage stack with its authorization policy.
fn build_access(
    storage: &StorageSection,
    authorization: &AuthorizationSection,
    kind: StorageKind,
) -> Result<Arc<dyn BlobAccess>> {
    Ok(Arc::new(AuthorizingBlobAccess::new(
        storage.build(kind)?,
        authorization.get.build(),
        authorization.put.build(),
        authorization.find_missing.build(),
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(&cli.config)?;
    telemetry::init(&config.log.level);

    let cas = build_access(
        &config.cas,
        &config.authorization,
        StorageKind::ContentAddressable,
    )
    .context("failed to build the content addressable storage stack")?;
    let ac = build_access(&config.ac, &config.authorization, StorageKind::ActionCache)
        .context("failed to build the action cache stack")?;

    info!(
        cas_backend = %config.cas.backend,
        cas_shards = config.cas.shards,
        ac_backend = %config.ac.backend,
        maximum_message_size_bytes = config.limits.maximum_message_size_bytes,
        "storage stacks assembled"
    );

    // Probe the assembled stacks once so misconfigured authorization is
    // visible at startup rather than on the first request.
    match tokio::try_join!(cas.get_capabilities(""), ac.get_capabilities("")) {
        Ok((cas_capabilities, ac_capabilities)) => {
            let merged = capabilities::merge(&[cas_capabilities, ac_capabilities]);
            info!(
                digest_functions = merged.functions().count(),
                update_enabled = merged.update_enabled(),
                "ready"
            );
        }
        Err(error) => {
            info!(error = %error, "ready (capabilities restricted for the default instance)");
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for the shutdown signal")?;
    info!("shutdown signal received, exiting");
    Ok(())
}
