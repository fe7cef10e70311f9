//! Error type shared by every RHSM operation.
//!
//! Remote failures carry the operation name and the identifiers involved so a
//! single message is enough to diagnose them. Only a 404 on a read path is
//! absorbed by callers (as "resource absent"); everything else propagates.

use std::time::Duration;

use thiserror::Error;

/// Error type for RHSM client, workflow and resource operations.
#[derive(Debug, Error)]
pub enum RhsmError {
    /// Missing required environment variable.
    #[error("missing required env var: {0}")]
    MissingEnv(&'static str),

    /// Invalid environment variable value.
    #[error("invalid env var {key}={value:?}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The offending value.
        value: String,
        /// The reason for invalidity.
        reason: &'static str,
    },

    /// Remote entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        kind: &'static str,
        /// Identifier used for the lookup.
        id: String,
    },

    /// Malformed input, rejected before any remote call.
    #[error("invalid value for {attribute}: {reason}")]
    Validation {
        /// Attribute (or argument) name.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Network or HTTP-layer failure.
    #[error("{operation}: http error: {source}")]
    Transport {
        /// Operation that was in flight.
        operation: &'static str,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("{operation}: rhsm api error: status={status}, body={body}")]
    Api {
        /// Operation that was in flight.
        operation: &'static str,
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Response body.
        body: String,
    },

    /// The API answered with a body that could not be decoded.
    #[error("{operation}: json decode error: {source}")]
    Json {
        /// Operation that was in flight.
        operation: &'static str,
        /// The JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// Export polling exceeded its bound.
    #[error(
        "export job {job_id} for allocation {allocation_uuid} not ready after {polls} polls ({elapsed:?})"
    )]
    Timeout {
        /// Allocation being exported.
        allocation_uuid: String,
        /// Export job that never became ready.
        job_id: String,
        /// Number of status polls performed.
        polls: u32,
        /// Time spent polling.
        elapsed: Duration,
    },

    /// Operation aborted by the caller.
    #[error("{operation} canceled")]
    Canceled {
        /// Operation that was aborted.
        operation: &'static str,
    },

    /// The access token is no longer accepted.
    #[error("{operation}: access token rejected (HTTP 401); reconfigure the provider with a valid refresh token")]
    AuthExpired {
        /// Operation that was rejected.
        operation: &'static str,
    },

    /// The remote state contradicts the request.
    #[error("allocation {allocation_uuid} does not have {subject} with id {id}")]
    RemoteConflict {
        /// Allocation the request was scoped to.
        allocation_uuid: String,
        /// What was expected on the allocation (pool, entitlement, account...).
        subject: &'static str,
        /// The offending identifier.
        id: String,
    },

    /// Fetching the exported manifest failed.
    #[error("manifest download from {url} failed: {reason}")]
    DownloadFailed {
        /// Download URL returned by the export job.
        url: String,
        /// Transport error or unexpected status.
        reason: String,
    },

    /// State file I/O error.
    #[error("state store io error: {0}")]
    Io(#[from] std::io::Error),

    /// State file content error.
    #[error("state store: {0}")]
    StateFile(String),

    /// Log subscriber could not be installed.
    #[error("logging init failed: {0}")]
    Logging(String),
}

impl RhsmError {
    /// Whether this error means the remote entity is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Build a [`RhsmError::Validation`] for the given attribute.
    #[must_use]
    pub fn validation(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }
}
