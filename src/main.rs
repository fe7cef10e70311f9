//! Example binary demonstrating the rhsm_provider library.
//!
//! Exports the manifest of one allocation and keeps it in a local state file.
//! A manifest already in the state file is reused unless the allocation
//! changed since it was exported.
//!
//! ## Usage
//!
//! 1. Create a `.env` file with `RHSM_REFRESH_TOKEN` and `RHSM_ALLOCATION_UUID`
//! 2. Run: `cargo run`
//!
//! Ctrl-C cancels a running export.

#![allow(clippy::print_stdout)] // Allow println! in the binary example

use rhsm_provider::rhsm_logging::try_init_logging;
use rhsm_provider::rhsm_manifest::{MANIFEST_RESOURCE, ManifestResource};
use rhsm_provider::rhsm_state::now_unix_ms;
use rhsm_provider::{
    JsonFileStateStore, Resource, ResourceState, RhsmConfig, RhsmError, RhsmProvider, StateFile,
    StateStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const ALLOCATION_ENV: &str = "RHSM_ALLOCATION_UUID";
const ADDRESS: &str = "rhsm_allocation_manifest.main";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment
    let cfg = RhsmConfig::from_env()?;
    try_init_logging();
    let allocation_uuid = std::env::var(ALLOCATION_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(RhsmError::MissingEnv(ALLOCATION_ENV))?;

    println!("Configuration loaded:");
    println!("  API: {}", cfg.api_url);
    println!("  Allocation: {allocation_uuid}");
    println!("  Export timeout: {:?}", cfg.export.max_duration);

    let provider = RhsmProvider::configure(cfg).await?;
    let manifests = provider
        .resource(MANIFEST_RESOURCE)
        .ok_or(RhsmError::NotFound {
            kind: "resource type",
            id: MANIFEST_RESOURCE.to_string(),
        })?;

    let store = JsonFileStateStore::new(JsonFileStateStore::default_path());
    let mut state = store.load()?.unwrap_or_else(StateFile::default);

    // Refresh what we already have
    if let Some(prior) = state.get(ADDRESS).cloned() {
        let refreshed = if prior.id() == Some(allocation_uuid.as_str()) {
            manifests.read(&prior).await?
        } else {
            None
        };
        if let Some(current) = refreshed {
            if !ManifestResource::is_stale(&current) {
                state.put(ADDRESS, Some(current), now_unix_ms());
                store.save(&state)?;
                println!("\nManifest is up to date, nothing to export.");
                return Ok(());
            }
            warn!(allocation_uuid = %allocation_uuid, "allocation changed since export; exporting again");
        }
        state.put(ADDRESS, None, now_unix_ms());
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling export");
            on_ctrl_c.cancel();
        }
    });

    println!("\nExporting manifest...");
    let planned = ResourceState::new().with("allocation_uuid", allocation_uuid.as_str());
    let created = match provider
        .create_resource(MANIFEST_RESOURCE, &planned, &cancel)
        .await
    {
        Ok(created) => created,
        Err(e) => {
            // Nothing was exported; persist the cleared record.
            store.save(&state)?;
            return Err(e.into());
        }
    };

    let manifest_len = created.get_str("manifest").map_or(0, str::len);
    let exported_at = created
        .get_str("manifest_last_modified")
        .unwrap_or_default()
        .to_string();
    state.put(ADDRESS, Some(created), now_unix_ms());
    store.save(&state)?;

    println!("\nManifest exported!");
    println!("  Allocation last modified: {exported_at}");
    println!("  Manifest size (base64): {manifest_len} bytes");
    println!("  State file: {}", store.path().display());

    Ok(())
}
