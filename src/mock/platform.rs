//! In-memory platform API.

use std::sync::Mutex;
use std::time::Instant;

use super::{FailureConfig, FailureInjector, MockOp};
use crate::payload::JobPayload;
use crate::platform::{CreatedJob, PlatformApi, PlatformError};

/// One recorded API invocation, timestamped for pacing assertions.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub op: MockOp,
    /// Job name for create calls
    pub job_name: Option<String>,
    /// Platform job id for submit calls
    pub job_id: Option<String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MockPlatformState {
    next_job: u64,
    failures: FailureInjector,
    calls: Vec<ApiCall>,
    payloads: Vec<JobPayload>,
    created: Vec<String>,
    submitted: Vec<String>,
}

/// Deterministic platform fake: sequential `JOB-n` ids, scripted
/// failures, and a timestamped call log.
#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Mutex<MockPlatformState>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_create_failure(&self, config: FailureConfig) {
        let mut state = self.state.lock().unwrap();
        state.failures.inject(MockOp::Create, config);
    }

    pub fn inject_submit_failure(&self, config: FailureConfig) {
        let mut state = self.state.lock().unwrap();
        state.failures.inject(MockOp::Submit, config);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failures.clear(MockOp::Create);
        state.failures.clear(MockOp::Submit);
    }

    /// All API invocations in call order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Timestamps of create calls, in call order. The create call is
    /// the first request a submission flow issues after passing the
    /// pacing gate, so these mark gate admissions.
    pub fn create_call_times(&self) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.op == MockOp::Create)
            .map(|call| call.at)
            .collect()
    }

    pub fn create_call_count(&self) -> usize {
        self.count_calls(MockOp::Create)
    }

    pub fn submit_call_count(&self) -> usize {
        self.count_calls(MockOp::Submit)
    }

    /// Payloads accepted by successful create calls.
    pub fn created_payloads(&self) -> Vec<JobPayload> {
        self.state.lock().unwrap().payloads.clone()
    }

    /// Ids of jobs created so far.
    pub fn created_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    /// Ids of jobs submitted so far.
    pub fn submitted_jobs(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    fn count_calls(&self, op: MockOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .count()
    }
}

impl PlatformApi for MockPlatform {
    fn create_job(&self, payload: &JobPayload) -> Result<CreatedJob, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall {
            op: MockOp::Create,
            job_name: Some(payload.name.clone()),
            job_id: None,
            at: Instant::now(),
        });

        if let Some(failure) = state.failures.check(MockOp::Create) {
            return Err(if failure.transient {
                PlatformError::Server {
                    operation: "create",
                    status: 503,
                    body: failure.message,
                }
            } else {
                PlatformError::Rejected {
                    operation: "create",
                    status: 400,
                    body: failure.message,
                }
            });
        }

        state.next_job += 1;
        let id = format!("JOB-{:05}", state.next_job);
        state.created.push(id.clone());
        state.payloads.push(payload.clone());
        Ok(CreatedJob { id })
    }

    fn submit_job(&self, job_id: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall {
            op: MockOp::Submit,
            job_name: None,
            job_id: Some(job_id.to_string()),
            at: Instant::now(),
        });

        if let Some(failure) = state.failures.check(MockOp::Submit) {
            return Err(if failure.transient {
                PlatformError::Server {
                    operation: "submit",
                    status: 503,
                    body: failure.message,
                }
            } else {
                PlatformError::Rejected {
                    operation: "submit",
                    status: 409,
                    body: failure.message,
                }
            });
        }

        state.submitted.push(job_id.to_string());
        Ok(())
    }
}
