//! In-memory upload tool.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{FailureConfig, FailureInjector, MockOp};
use crate::upload::{UploadTool, UploadToolError};

/// One recorded upload invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub job_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct MockUploadState {
    next_id: u64,
    failures: FailureInjector,
    calls: Vec<UploadCall>,
}

/// Deterministic upload tool fake: sequential `FILE-n` ids, optional
/// failure injection. Does not touch the filesystem, so test jobs can
/// reference paths that do not exist.
#[derive(Debug, Default)]
pub struct MockUploadTool {
    state: Mutex<MockUploadState>,
}

impl MockUploadTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script upload failures.
    pub fn inject_failure(&self, config: FailureConfig) {
        let mut state = self.state.lock().unwrap();
        state.failures.inject(MockOp::Upload, config);
    }

    /// Stop failing uploads.
    pub fn clear_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.failures.clear(MockOp::Upload);
    }

    /// Total upload invocations, including failed ones.
    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// All recorded invocations in call order.
    pub fn uploads(&self) -> Vec<UploadCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl UploadTool for MockUploadTool {
    fn upload(&self, job_name: &str, path: &Path) -> Result<String, UploadToolError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(UploadCall {
            job_name: job_name.to_string(),
            path: path.to_path_buf(),
        });

        if let Some(failure) = state.failures.check(MockOp::Upload) {
            return Err(if failure.transient {
                UploadToolError::ToolFailed(failure.message)
            } else {
                UploadToolError::FileMissing(path.to_path_buf())
            });
        }

        state.next_id += 1;
        Ok(format!("FILE-{:05}", state.next_id))
    }
}
