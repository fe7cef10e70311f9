//! RHSM provider - Red Hat Subscription Manager as declarative resources.
//!
//! A library exposing RHSM objects through typed resource handlers:
//! - **Allocations**: Create, read, import and delete Satellite allocations
//! - **Entitlements**: Attach pool capacity to an allocation and resize it
//! - **Pools**: Look up the pools an allocation can draw from
//! - **Cloud Access**: Enroll cloud accounts and request gold images
//! - **Manifests**: Export an allocation manifest with a bounded, cancellable poll loop
//!
//! ## Quick Start
//!
//! Configuration is loaded from environment variables. Create a `.env` file:
//!
//! ```text
//! RHSM_REFRESH_TOKEN=your_offline_token_here
//! RHSM_LOG=info,rhsm_provider=debug
//! ```
//!
//! Then configure the provider and drive a resource:
//!
//! ```ignore
//! use rhsm_provider::{RhsmConfig, RhsmProvider, ResourceState};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = RhsmProvider::configure(RhsmConfig::from_env()?).await?;
//!
//!     let planned = ResourceState::new()
//!         .with("allocation_uuid", "11111111-1111-1111-1111-111111111111");
//!     let manifest = provider
//!         .create_resource("rhsm_allocation_manifest", &planned, &CancellationToken::new())
//!         .await?;
//!     println!("exported at {:?}", manifest.get_str("manifest_last_modified"));
//!
//!     Ok(())
//! }
//! ```

// ============================================================================
// Linting
// ============================================================================

#![warn(missing_docs)]                // Public items should be documented
#![warn(unused_imports)]              // Unused imports
#![warn(unused_variables)]            // Unused variables
#![warn(unused_must_use)]             // Results and Options must be handled
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy for strict discipline
#![deny(clippy::unwrap_used)]         // unwrap() is forbidden
#![deny(clippy::expect_used)]         // expect() is forbidden
#![deny(clippy::panic)]               // panic!() is forbidden
#![deny(clippy::print_stdout)]        // println!() is forbidden in production
#![deny(clippy::todo)]                // TODO is forbidden
#![deny(clippy::unimplemented)]       // unimplemented!() is forbidden
#![deny(clippy::unwrap_in_result)]    // unwrap() in Result is forbidden
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Modules
// ============================================================================

/// Configuration loaded from environment variables.
pub mod rhsm_config;

/// Error taxonomy shared by every operation.
pub mod rhsm_error;

/// Wire types of the RHSM management API.
pub mod rhsm_models;

/// HTTP client and the `RhsmApi` seam.
///
/// Use this module for direct API calls, including the refresh-token exchange.
pub mod rhsm_client;

/// Attribute schemas and validators.
pub mod rhsm_schema;

/// Resource state and local state persistence.
pub mod rhsm_state;

/// Allocation resource and data source.
pub mod rhsm_allocation;

/// Entitlement resource and data source.
pub mod rhsm_entitlement;

/// Pools data source.
pub mod rhsm_pools;

/// Cloud access account resource and data source.
pub mod rhsm_cloud_access;

/// Manifest export workflow and manifest resource.
///
/// Use this module to export a manifest outside of a provisioning runtime.
pub mod rhsm_manifest;

/// Resource and data source traits, and the provider registry.
pub mod rhsm_provider;

/// Log subscriber setup.
pub mod rhsm_logging;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use rhsm_client::{RhsmApi, RhsmClient};
pub use rhsm_cloud_access::CloudAccessId;
pub use rhsm_config::RhsmConfig;
pub use rhsm_error::RhsmError;
pub use rhsm_manifest::{ExportPhase, ExportPolicy, ManifestExport, ManifestExporter};
pub use rhsm_provider::{DataSource, Resource, RhsmProvider};
pub use rhsm_schema::{Schema, SchemaOptions};
pub use rhsm_state::{JsonFileStateStore, ResourceState, StateFile, StateStore};
