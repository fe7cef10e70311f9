//! Allocation manifest export.
//!
//! Unique responsibility: turn an allocation UUID into a downloaded,
//! base64-encoded manifest.
//!
//! Remote sequence:
//! 1. `GET /allocations/{uuid}` to capture `lastModified` before exporting
//! 2. `GET /allocations/{uuid}/export` to start an export job
//! 3. `GET /allocations/{uuid}/exportJob/{job}` until it answers 200 with a download URL
//! 4. `GET <href>` with the same bearer token
//!
//! Polling is bounded by an [`ExportPolicy`] (interval with backoff, overall
//! duration, optional attempt cap) and observes a [`CancellationToken`] both
//! while sleeping and while a request is in flight.
//!
//! Every creation starts a new export job; there is no reuse of a previous job.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rhsm_client::RhsmApi;
use crate::rhsm_error::RhsmError;
use crate::rhsm_models::ExportJobStatus;
use crate::rhsm_provider::Resource;
use crate::rhsm_schema::{Attribute, AttributeType, Schema, SchemaOptions, Validator, is_uuid};
use crate::rhsm_state::ResourceState;

/// Resource type name of the manifest resource.
pub const MANIFEST_RESOURCE: &str = "rhsm_allocation_manifest";

/// Bounds of the export-job poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportPolicy {
    /// Wait before the first poll.
    pub initial_interval: Duration,
    /// Upper bound for the wait between polls.
    pub max_interval: Duration,
    /// Multiplier applied to the wait after each pending poll (1.0 = fixed).
    pub backoff_factor: f64,
    /// Overall polling budget, measured from the first wait.
    pub max_duration: Duration,
    /// Optional cap on the number of polls.
    pub max_attempts: Option<u32>,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            backoff_factor: 1.5,
            max_duration: Duration::from_secs(600),
            max_attempts: None,
        }
    }
}

impl ExportPolicy {
    /// Fixed-interval policy.
    #[must_use]
    pub const fn fixed(interval: Duration, max_duration: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            backoff_factor: 1.0,
            max_duration,
            max_attempts: None,
        }
    }

    /// Wait to use after a pending poll that followed `current`.
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Step of the export workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    /// Nothing done yet.
    Idle,
    /// Reading the allocation and starting the export job.
    Exporting,
    /// Waiting for the export job.
    Polling,
    /// Fetching the manifest file.
    Downloading,
    /// Manifest downloaded.
    Complete,
    /// Gave up; the error says why.
    Failed,
}

impl fmt::Display for ExportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Exporting => "exporting",
            Self::Polling => "polling",
            Self::Downloading => "downloading",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestExport {
    /// Exported allocation.
    pub allocation_uuid: String,
    /// Export job that produced the manifest.
    pub export_job_id: String,
    /// Manifest archive, base64 (standard alphabet).
    pub manifest: String,
    /// Allocation `lastModified` captured before the export started.
    pub manifest_last_modified: String,
    /// Number of status polls performed.
    pub polls: u32,
}

/// Runs the export workflow against an [`RhsmApi`].
#[derive(Clone)]
pub struct ManifestExporter {
    api: Arc<dyn RhsmApi>,
    policy: ExportPolicy,
}

impl ManifestExporter {
    /// Create an exporter.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>, policy: ExportPolicy) -> Self {
        Self { api, policy }
    }

    /// Get the poll policy.
    #[must_use]
    pub const fn policy(&self) -> &ExportPolicy {
        &self.policy
    }

    /// Export the manifest of an allocation.
    ///
    /// # Errors
    ///
    /// - `Validation` if `allocation_uuid` is not a UUID (no remote call is made)
    /// - `NotFound` if the allocation does not exist
    /// - `Timeout` if the job is not ready within the policy bounds
    /// - `Canceled` if `cancel` fires
    /// - `DownloadFailed` if the manifest cannot be fetched
    /// - any API error from the intermediate calls
    pub async fn export(
        &self,
        allocation_uuid: &str,
        cancel: &CancellationToken,
    ) -> Result<ManifestExport, RhsmError> {
        if !is_uuid(allocation_uuid) {
            return Err(RhsmError::validation(
                "allocation_uuid",
                format!("expected a UUID, got {allocation_uuid:?}"),
            ));
        }

        let mut phase = ExportPhase::Idle;
        let result = self.run(allocation_uuid, cancel, &mut phase).await;
        match &result {
            Ok(export) => info!(
                allocation_uuid,
                job_id = %export.export_job_id,
                polls = export.polls,
                bytes = export.manifest.len(),
                "manifest export complete"
            ),
            Err(e) => warn!(allocation_uuid, %phase, error = %e, "manifest export failed"),
        }
        result
    }

    async fn run(
        &self,
        allocation_uuid: &str,
        cancel: &CancellationToken,
        phase: &mut ExportPhase,
    ) -> Result<ManifestExport, RhsmError> {
        enter(phase, ExportPhase::Exporting, allocation_uuid);
        let allocation = cancellable(
            cancel,
            "show allocation",
            self.api.show_allocation(allocation_uuid),
        )
        .await?
        .ok_or_else(|| RhsmError::NotFound {
            kind: "allocation",
            id: allocation_uuid.to_string(),
        })?;
        let manifest_last_modified = allocation.last_modified;

        let job = cancellable(
            cancel,
            "export allocation",
            self.api.export_allocation(allocation_uuid),
        )
        .await?;
        info!(allocation_uuid, job_id = %job.export_job_id, "export job created");

        enter(phase, ExportPhase::Polling, allocation_uuid);
        let (href, polls) = self
            .poll_until_ready(allocation_uuid, &job.export_job_id, cancel)
            .await?;

        enter(phase, ExportPhase::Downloading, allocation_uuid);
        let body = cancellable(cancel, "download manifest", self.api.download_manifest(&href))
            .await?;

        enter(phase, ExportPhase::Complete, allocation_uuid);
        Ok(ManifestExport {
            allocation_uuid: allocation_uuid.to_string(),
            export_job_id: job.export_job_id,
            manifest: STANDARD.encode(body),
            manifest_last_modified,
            polls,
        })
    }

    /// Poll the job until it is ready. Returns the download URL and poll count.
    async fn poll_until_ready(
        &self,
        allocation_uuid: &str,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, u32), RhsmError> {
        let started = Instant::now();
        let deadline = started + self.policy.max_duration;
        let mut interval = self.policy.initial_interval;
        let mut polls: u32 = 0;

        loop {
            let attempts_exhausted = self.policy.max_attempts.is_some_and(|max| polls >= max);
            let wake = Instant::now() + interval;
            if attempts_exhausted || wake > deadline {
                return Err(RhsmError::Timeout {
                    allocation_uuid: allocation_uuid.to_string(),
                    job_id: job_id.to_string(),
                    polls,
                    elapsed: started.elapsed(),
                });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RhsmError::Canceled { operation: "poll export job" });
                }
                () = sleep_until(wake) => {}
            }

            polls = polls.saturating_add(1);
            let status = cancellable(
                cancel,
                "poll export job",
                self.api.export_job_status(allocation_uuid, job_id),
            )
            .await?;

            match status {
                ExportJobStatus::Ready { href } => return Ok((href, polls)),
                ExportJobStatus::Pending => {
                    interval = self.policy.next_interval(interval);
                    debug!(allocation_uuid, job_id, polls, next = ?interval, "export job pending");
                }
            }
        }
    }
}

fn enter(phase: &mut ExportPhase, next: ExportPhase, allocation_uuid: &str) {
    debug!(allocation_uuid, from = %phase, to = %next, "manifest export phase");
    *phase = next;
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: F,
) -> Result<T, RhsmError>
where
    F: Future<Output = Result<T, RhsmError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RhsmError::Canceled { operation }),
        res = fut => res,
    }
}

/// `rhsm_allocation_manifest`: manifest of an allocation, held in state.
///
/// Create runs a full export; there is no update; delete only forgets the
/// local state.
pub struct ManifestResource {
    api: Arc<dyn RhsmApi>,
    exporter: ManifestExporter,
}

impl ManifestResource {
    /// Create the resource handler.
    #[must_use]
    pub fn new(api: Arc<dyn RhsmApi>, policy: ExportPolicy) -> Self {
        Self {
            exporter: ManifestExporter::new(Arc::clone(&api), policy),
            api,
        }
    }

    /// Whether the allocation changed since the manifest was exported.
    #[must_use]
    pub fn is_stale(state: &ResourceState) -> bool {
        match (
            state.get_str("last_modified"),
            state.get_str("manifest_last_modified"),
        ) {
            (Some(current), Some(exported)) => current != exported,
            _ => true,
        }
    }
}

#[async_trait]
impl Resource for ManifestResource {
    fn type_name(&self) -> &'static str {
        MANIFEST_RESOURCE
    }

    fn schema(&self, opts: &SchemaOptions) -> Schema {
        Schema::new(
            opts,
            "Manifest exported from a Red Hat Subscription Manager allocation.",
            vec![
                Attribute::required("allocation_uuid", AttributeType::String)
                    .force_new()
                    .describe("UUID of the allocation to export.")
                    .validate(Validator::IsUuid),
                Attribute::computed("last_modified", AttributeType::String)
                    .describe("Current last-modified time of the allocation."),
                Attribute::computed("manifest_last_modified", AttributeType::String)
                    .describe("Last-modified time of the allocation when the manifest was exported."),
                Attribute::computed("manifest", AttributeType::String)
                    .sensitive()
                    .describe("Base64 encoded manifest archive."),
            ],
        )
    }

    async fn create(
        &self,
        planned: &ResourceState,
        cancel: &CancellationToken,
    ) -> Result<ResourceState, RhsmError> {
        let uuid = planned.require_str("allocation_uuid")?;
        let export = self.exporter.export(uuid, cancel).await?;

        let state = ResourceState::with_id(uuid)
            .with("allocation_uuid", uuid)
            .with("manifest", export.manifest)
            .with("manifest_last_modified", export.manifest_last_modified);

        self.read(&state).await?.ok_or_else(|| RhsmError::NotFound {
            kind: "allocation",
            id: uuid.to_string(),
        })
    }

    async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, RhsmError> {
        let uuid = state.require_id()?;
        let Some(allocation) = self.api.show_allocation(uuid).await? else {
            debug!(allocation_uuid = uuid, "allocation gone; dropping manifest state");
            return Ok(None);
        };

        let mut next = state.clone();
        next.set("allocation_uuid", uuid);
        next.set("last_modified", allocation.last_modified);
        Ok(Some(next))
    }

    async fn delete(&self, state: &ResourceState) -> Result<(), RhsmError> {
        debug!(id = ?state.id(), "manifest removed from state only");
        Ok(())
    }
}
