//! Per-job file uploads.
//!
//! The [`Uploader`] drives one job's file list through the upload tool:
//! each distinct path is uploaded exactly once (duplicates reuse the
//! first id), and each upload is individually retried under the run's
//! retry policy. A file that fails past the policy fails the whole job.

mod tool;

pub use tool::{CliUploadTool, UploadTool, UploadToolError};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::job::JobDefinition;
use crate::retry::{RetryController, RetryPolicy};

/// Platform file ids for one job, keyed by local path.
///
/// Owned by the job's flow; consumed once by the payload builder.
#[derive(Debug, Clone, Default)]
pub struct UploadResult {
    ids: HashMap<PathBuf, String>,
}

impl UploadResult {
    pub fn file_id(&self, path: &Path) -> Option<&str> {
        self.ids.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn insert(&mut self, path: PathBuf, id: String) {
        self.ids.insert(path, id);
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (PathBuf, String)>) -> Self {
        Self {
            ids: pairs.into_iter().collect(),
        }
    }
}

/// Job-level upload failure.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload failed for {} after {attempts} attempt(s): {cause}", .path.display())]
    Failed {
        path: PathBuf,
        attempts: u32,
        cause: UploadToolError,
    },
}

impl UploadError {
    /// Attempts consumed on the failing file, for ledger accounting.
    pub fn attempts(&self) -> u32 {
        match self {
            UploadError::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Uploads a job's files through the tool, with per-file retries.
#[derive(Clone)]
pub struct Uploader {
    tool: Arc<dyn UploadTool>,
    retry: RetryController,
}

impl Uploader {
    pub fn new(tool: Arc<dyn UploadTool>, policy: RetryPolicy) -> Self {
        Self {
            tool,
            retry: RetryController::new(policy),
        }
    }

    /// Upload every distinct file of `job`, in list order.
    pub fn upload_job_files(&self, job: &JobDefinition) -> Result<UploadResult, UploadError> {
        let mut result = UploadResult::default();

        for path in &job.input_files {
            if result.file_id(path).is_some() {
                // Duplicate path within the job; reuse the id.
                debug!(job = %job.name, file = %path.display(), "duplicate path, skipping upload");
                continue;
            }

            match self
                .retry
                .run("upload", || self.tool.upload(&job.name, path))
            {
                Ok((file_id, _attempts)) => {
                    result.insert(path.clone(), file_id);
                }
                Err(err) => {
                    let attempts = err.attempts();
                    return Err(UploadError::Failed {
                        path: path.clone(),
                        attempts,
                        cause: err.into_inner(),
                    });
                }
            }
        }

        Ok(result)
    }
}
