//! Wire types of the RHSM management API.
//!
//! Every response is wrapped in `{"body": ...}`; fields the API may omit are
//! defaulted so a sparse response still decodes.

use serde::{Deserialize, Serialize};

/// Response envelope used by every RHSM endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Payload.
    pub body: T,
}

/// Allocation (subscription manifest container).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Allocation {
    /// Allocation UUID.
    pub uuid: String,
    /// Allocation name.
    pub name: String,
    /// Allocation type (e.g. "Satellite").
    #[serde(rename = "type")]
    pub allocation_type: String,
    /// Allocation version.
    pub version: String,
    /// Creation timestamp (ISO-8601).
    pub created_date: String,
    /// User that created the allocation.
    pub created_by: String,
    /// Last-modified timestamp (ISO-8601).
    pub last_modified: String,
    /// Total quantity of attached entitlements.
    pub entitlements_attached_quantity: i32,
    /// Attached entitlements (only populated with `include=entitlements`).
    pub entitlements_attached: Option<EntitlementsAttached>,
    /// Simple content access mode, when reported.
    pub simple_content_access: Option<String>,
}

impl Allocation {
    /// Attached entitlements, empty when the API did not include them.
    #[must_use]
    pub fn entitlements(&self) -> &[EntitlementSummary] {
        self.entitlements_attached
            .as_ref()
            .map_or(&[], |e| e.value.as_slice())
    }
}

/// Entitlement validity summary embedded in an allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitlementsAttached {
    /// Why the attached entitlements are (in)valid.
    pub reason: String,
    /// Whether the attached entitlements are valid.
    pub valid: bool,
    /// Attached entitlements.
    pub value: Vec<EntitlementSummary>,
}

/// One entitlement attached to an allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitlementSummary {
    /// Entitlement ID.
    pub id: String,
    /// Product SKU.
    pub sku: String,
    /// Contract number.
    pub contract_number: String,
    /// Attached quantity.
    pub entitlement_quantity: i32,
    /// Subscription name.
    pub subscription_name: Option<String>,
    /// Validity start (ISO-8601).
    pub start_date: Option<String>,
    /// Validity end (ISO-8601).
    pub end_date: Option<String>,
}

/// Subscription capacity available to an allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pool {
    /// Pool ID.
    pub id: String,
    /// Subscription name.
    pub subscription_name: String,
    /// Subscription number.
    pub subscription_number: String,
    /// Product SKU.
    pub sku: String,
    /// Contract number.
    pub contract_number: String,
    /// Quantity still available for attachment.
    pub entitlements_available: i32,
    /// Service level.
    pub service_level: String,
    /// Validity start (ISO-8601).
    pub start_date: String,
    /// Validity end (ISO-8601).
    pub end_date: String,
}

/// Export job created for an allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportJob {
    /// Export job ID.
    #[serde(rename = "exportJobID")]
    pub export_job_id: String,
    /// Status URL of the job.
    pub href: String,
}

/// Payload of a ready export job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportJobReady {
    /// Export ID.
    #[serde(rename = "exportID")]
    pub export_id: String,
    /// One-time download URL of the manifest.
    pub href: String,
}

/// Result of one export-job status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportJobStatus {
    /// Job still running.
    Pending,
    /// Job finished; the manifest can be downloaded from `href`.
    Ready {
        /// Download URL.
        href: String,
    },
}

/// Cloud provider enabled for Red Hat Cloud Access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudAccessProvider {
    /// Provider display name.
    pub name: String,
    /// Provider short name ("AWS", "GCE", "MSAZ", ...).
    pub short_name: String,
    /// Enrolled accounts.
    pub accounts: Vec<CloudAccessAccount>,
    /// Products enabled for the provider.
    pub products: Vec<CloudAccessProduct>,
}

/// Account enrolled in Red Hat Cloud Access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudAccessAccount {
    /// Cloud account ID.
    pub id: String,
    /// Account nickname.
    pub nickname: String,
    /// Date the account was added.
    pub date_added: String,
    /// Gold image access requests.
    pub gold_image_status: Vec<GoldImageStatus>,
    /// Source ID of a linked account.
    pub source_id: String,
    /// Whether the account is verified for auto registration.
    pub verified: bool,
}

/// Status of a gold image access request.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldImageStatus {
    /// Gold image name.
    pub name: String,
    /// Gold image description.
    pub description: String,
    /// Request status.
    pub status: String,
}

/// Product enabled for a cloud provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudAccessProduct {
    /// Product name.
    pub name: String,
    /// Product SKU.
    pub sku: String,
    /// Quantity enabled for cloud access.
    pub enabled_quantity: i32,
    /// Total quantity.
    pub total_quantity: i32,
    /// Gold image groups available.
    pub image_groups: Vec<String>,
    /// Next renewal date.
    pub next_renewal: String,
}

/// Account to enroll with [`crate::RhsmApi::add_provider_accounts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProviderAccount {
    /// Cloud account ID.
    pub id: String,
    /// Optional nickname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

/// Access token returned by the SSO refresh-token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    /// Bearer token.
    pub access_token: String,
    /// Token type (normally "Bearer").
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
}
