//! In-memory fakes for the upload tool and platform API.
//!
//! Deterministic stand-ins used by the test suites and by `--dry-run`:
//! sequential identifiers, per-operation failure injection, and a
//! timestamped call log for pacing assertions.

mod platform;
mod upload;

pub use platform::{ApiCall, MockPlatform};
pub use upload::{MockUploadTool, UploadCall};

use std::collections::HashMap;

/// Operations the fakes can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Upload,
    Create,
    Submit,
}

/// Failure configuration for one operation.
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Whether the injected error classifies as transient
    pub transient: bool,
    /// Error detail returned to the caller
    pub message: String,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Fail with a transient (retryable) error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            message: message.into(),
            fail_count: None,
        }
    }

    /// Fail with a fatal (non-retryable) error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            transient: false,
            message: message.into(),
            fail_count: None,
        }
    }

    /// Limit the failure to the first `count` calls.
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Per-operation failure injector shared by the fakes.
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<MockOp, FailureConfig>,
    call_counts: HashMap<MockOp, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a failure for an operation.
    pub fn inject(&mut self, op: MockOp, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    /// Remove the failure script for an operation.
    pub fn clear(&mut self, op: MockOp) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Check whether this call should fail; counts the call.
    pub fn check(&mut self, op: MockOp) -> Option<FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;
        if let Some(limit) = config.fail_count {
            if *count > limit {
                return None; // exceeded the fail count, succeed now
            }
        }
        Some(config.clone())
    }
}
