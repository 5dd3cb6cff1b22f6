//! Two-step create/submit lifecycle with per-step retries.
//!
//! Each call is wrapped individually: a transient failure on submit
//! retries only the submit, never the create (re-creating would
//! duplicate the job on the platform). When create succeeded but submit
//! did not, the job exists remotely without running; that outcome is
//! surfaced as [`SubmissionError::CreatedNotSubmitted`] so the ledger
//! and the operator can act on it.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{PlatformApi, PlatformError};
use crate::payload::JobPayload;
use crate::retry::{RetryController, RetryPolicy};

/// Successful submission: platform job id plus attempts consumed
/// across both steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub job_id: String,
    pub attempts: u32,
}

/// Terminal submission failures.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The create step failed (fatal error or retries exhausted); no
    /// job exists on the platform.
    #[error("job creation failed after {attempts} attempt(s): {cause}")]
    CreateFailed { attempts: u32, cause: PlatformError },

    /// The job was created but could not be submitted. Requires
    /// operator follow-up (manual submit or cleanup).
    #[error("job {job_id} created but not submitted after {attempts} attempt(s): {cause}")]
    CreatedNotSubmitted {
        job_id: String,
        attempts: u32,
        cause: PlatformError,
    },
}

impl SubmissionError {
    pub fn attempts(&self) -> u32 {
        match self {
            SubmissionError::CreateFailed { attempts, .. } => *attempts,
            SubmissionError::CreatedNotSubmitted { attempts, .. } => *attempts,
        }
    }
}

/// Drives the two-step lifecycle against a [`PlatformApi`].
#[derive(Clone)]
pub struct SubmissionClient {
    api: Arc<dyn PlatformApi>,
    retry: RetryController,
}

impl SubmissionClient {
    pub fn new(api: Arc<dyn PlatformApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
            retry: RetryController::new(policy),
        }
    }

    /// Create then submit one job. Total attempts across both steps are
    /// reported in the receipt or error for ledger accounting.
    pub fn submit(&self, payload: &JobPayload) -> Result<SubmissionReceipt, SubmissionError> {
        let (created, create_attempts) =
            match self.retry.run("create-job", || self.api.create_job(payload)) {
                Ok(ok) => ok,
                Err(err) => {
                    let attempts = err.attempts();
                    return Err(SubmissionError::CreateFailed {
                        attempts,
                        cause: err.into_inner(),
                    });
                }
            };
        debug!(job = %payload.name, job_id = %created.id, attempts = create_attempts, "create step done");

        match self
            .retry
            .run("submit-job", || self.api.submit_job(&created.id))
        {
            Ok(((), submit_attempts)) => Ok(SubmissionReceipt {
                job_id: created.id,
                attempts: create_attempts + submit_attempts,
            }),
            Err(err) => {
                let attempts = create_attempts + err.attempts();
                Err(SubmissionError::CreatedNotSubmitted {
                    job_id: created.id,
                    attempts,
                    cause: err.into_inner(),
                })
            }
        }
    }
}
