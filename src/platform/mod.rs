//! Remote platform API boundary.
//!
//! The platform exposes a two-step job lifecycle: create a draft job,
//! then submit it for execution. [`PlatformApi`] is the capability seam;
//! [`HttpPlatformClient`] talks to the real API and [`crate::mock::
//! MockPlatform`] stands in for tests and dry runs. [`SubmissionClient`]
//! drives the lifecycle with per-step retries.

mod http;
mod submission;

pub use http::HttpPlatformClient;
pub use submission::{SubmissionClient, SubmissionError, SubmissionReceipt};

use crate::payload::JobPayload;
use crate::retry::Retryable;

/// A job created on the platform (draft, not yet running).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedJob {
    pub id: String,
}

/// Capability interface for the platform's job API.
pub trait PlatformApi: Send + Sync {
    /// Create a draft job, returning its platform id.
    fn create_job(&self, payload: &JobPayload) -> Result<CreatedJob, PlatformError>;

    /// Submit (launch) a previously created job.
    fn submit_job(&self, job_id: &str) -> Result<(), PlatformError>;
}

/// Remote API failures, classified for retry.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Transport-level failure (connect, timeout, broken body).
    #[error("network error during {operation}: {detail}")]
    Network {
        operation: &'static str,
        detail: String,
    },

    /// The platform asked us to slow down.
    #[error("{operation} rate limited by platform (HTTP {status})")]
    RateLimited {
        operation: &'static str,
        status: u16,
    },

    /// Server-side error.
    #[error("{operation} failed with server error HTTP {status}: {body}")]
    Server {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Credential rejected.
    #[error("authentication rejected during {operation} (HTTP {status}): {body}")]
    Auth {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The platform rejected the request as invalid.
    #[error("{operation} rejected as invalid (HTTP {status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The platform answered with something we cannot interpret.
    #[error("{operation} returned an unexpected response: {detail}")]
    Protocol {
        operation: &'static str,
        detail: String,
    },
}

impl Retryable for PlatformError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Network { .. }
                | PlatformError::RateLimited { .. }
                | PlatformError::Server { .. }
        )
    }
}
