//! End-to-end submission flow tests over the in-memory fakes.
//!
//! Covers the ledger idempotency invariant (exactly one terminal record
//! per job name), resume semantics across runs, failure isolation, and
//! the created-not-submitted partial-success path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use batchlane::config::ThrottleConfig;
use batchlane::job::{AnalysisSpec, HardwareSpec, JobDefinition};
use batchlane::ledger::{Ledger, SubmissionStatus};
use batchlane::mock::{FailureConfig, MockPlatform, MockUploadTool};
use batchlane::platform::PlatformApi;
use batchlane::scheduler::SubmissionScheduler;
use batchlane::upload::UploadTool;
use tempfile::TempDir;

fn job(name: &str, files: &[&str]) -> JobDefinition {
    JobDefinition {
        name: name.to_string(),
        input_files: files.iter().map(PathBuf::from).collect(),
        hardware: HardwareSpec {
            core_type: "emerald".to_string(),
            cores_per_slot: 4,
            walltime_hours: 8,
        },
        analyses: vec![
            AnalysisSpec {
                code: "openfoam".to_string(),
                version: "10".to_string(),
                command: "./solve.sh".to_string(),
            },
            AnalysisSpec {
                code: "paraview".to_string(),
                version: "5.11".to_string(),
                command: "#none".to_string(),
            },
        ],
    }
}

fn throttle(max_retries: u32) -> ThrottleConfig {
    ThrottleConfig {
        burst_size: 50,
        gap_seconds: 0.0,
        max_upload_concurrency: 4,
        max_retries,
        backoff_base_seconds: 0.0,
    }
}

struct Harness {
    tool: Arc<MockUploadTool>,
    platform: Arc<MockPlatform>,
    ledger: Ledger,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            tool: Arc::new(MockUploadTool::new()),
            platform: Arc::new(MockPlatform::new()),
            ledger: Ledger::open(dir.path().join("ledger.jsonl")),
            _dir: dir,
        }
    }

    fn scheduler(&self, throttle: ThrottleConfig) -> SubmissionScheduler {
        SubmissionScheduler::new(
            Arc::clone(&self.tool) as Arc<dyn UploadTool>,
            Arc::clone(&self.platform) as Arc<dyn PlatformApi>,
            throttle,
        )
    }
}

#[test]
fn one_terminal_record_per_job() {
    let harness = Harness::new();
    let jobs: Vec<_> = (0..20)
        .map(|i| job(&format!("run-{i:03}"), &["mesh.inp", "params.dat"]))
        .collect();

    let summary = harness.scheduler(throttle(3)).run(jobs, &harness.ledger).unwrap();
    assert_eq!(summary.submitted, 20);

    // Raw ledger: every job has exactly one terminal record, no gaps.
    let raw = std::fs::read_to_string(harness.ledger.path()).unwrap();
    let mut terminal_per_job: HashMap<String, usize> = HashMap::new();
    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let record: batchlane::SubmissionRecord = serde_json::from_str(line).unwrap();
        if record.status.is_terminal() {
            *terminal_per_job.entry(record.job_name).or_insert(0) += 1;
        }
    }
    assert_eq!(terminal_per_job.len(), 20);
    assert!(terminal_per_job.values().all(|&count| count == 1));
}

#[test]
fn resume_skips_submitted_and_retries_failed() {
    let harness = Harness::new();

    // Run 1: submit job A alone.
    let summary = harness
        .scheduler(throttle(1))
        .run(vec![job("job-a", &["a.inp"])], &harness.ledger)
        .unwrap();
    assert_eq!(summary.submitted, 1);
    let uploads_after_first = harness.tool.upload_count();

    // Run 2: A again plus B, with B's create call failing fatally. A is
    // skipped before any upload, so the injected failure only hits B.
    harness
        .platform
        .inject_create_failure(FailureConfig::fatal("bad payload"));
    let summary = harness
        .scheduler(throttle(1))
        .run(
            vec![job("job-a", &["a.inp"]), job("job-b", &["b.inp"])],
            &harness.ledger,
        )
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);

    let index = harness.ledger.load_index().unwrap();
    assert!(index.is_submitted("job-a"));
    assert_eq!(
        index.prior_outcome("job-b").unwrap().status,
        SubmissionStatus::Failed
    );

    // Run 3: failure cleared. A still skipped, B re-attempted from
    // scratch, uploads included.
    harness.platform.clear_failures();
    let uploads_before_retry = harness.tool.upload_count();
    let summary = harness
        .scheduler(throttle(1))
        .run(
            vec![job("job-a", &["a.inp"]), job("job-b", &["b.inp"])],
            &harness.ledger,
        )
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.submitted, 1);
    assert!(harness.tool.upload_count() > uploads_before_retry);
    assert!(harness.ledger.load_index().unwrap().is_submitted("job-b"));

    // Job A's single upload happened in run 1 and never again.
    let a_uploads = harness
        .tool
        .uploads()
        .iter()
        .filter(|call| call.job_name == "job-a")
        .count();
    assert_eq!(a_uploads, uploads_after_first);
    assert_eq!(a_uploads, 1);
}

#[test]
fn failed_upload_never_reaches_the_platform() {
    let harness = Harness::new();
    harness.tool.inject_failure(FailureConfig::fatal("gone"));

    let summary = harness
        .scheduler(throttle(3))
        .run(vec![job("job-a", &["a.inp"])], &harness.ledger)
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(harness.platform.calls().len(), 0);

    let index = harness.ledger.load_index().unwrap();
    let record = index.prior_outcome("job-a").unwrap();
    assert_eq!(record.status, SubmissionStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("input file not found"));
    assert_eq!(record.attempts, 1);
}

#[test]
fn exhausted_transient_uploads_record_attempts() {
    let harness = Harness::new();
    harness
        .tool
        .inject_failure(FailureConfig::transient("connection reset"));

    let summary = harness
        .scheduler(throttle(3))
        .run(vec![job("job-a", &["a.inp"])], &harness.ledger)
        .unwrap();

    assert_eq!(summary.failed, 1);
    let index = harness.ledger.load_index().unwrap();
    assert_eq!(index.prior_outcome("job-a").unwrap().attempts, 3);
}

#[test]
fn created_not_submitted_carries_job_id() {
    let harness = Harness::new();
    harness
        .platform
        .inject_submit_failure(FailureConfig::transient("503"));

    let summary = harness
        .scheduler(throttle(3))
        .run(vec![job("job-a", &["a.inp"])], &harness.ledger)
        .unwrap();

    assert_eq!(summary.created_not_submitted, 1);

    let index = harness.ledger.load_index().unwrap();
    let record = index.prior_outcome("job-a").unwrap();
    assert_eq!(record.status, SubmissionStatus::CreatedNotSubmitted);
    assert_eq!(record.job_id.as_deref(), Some("JOB-00001"));
    // Create ran once; submit consumed the full retry budget.
    assert_eq!(harness.platform.create_call_count(), 1);
    assert_eq!(harness.platform.submit_call_count(), 3);
    assert_eq!(record.attempts, 4);
}

#[test]
fn payload_replicates_files_across_analyses() {
    let harness = Harness::new();
    let summary = harness
        .scheduler(throttle(1))
        .run(
            vec![job("job-a", &["mesh.inp", "mesh.inp", "params.dat"])],
            &harness.ledger,
        )
        .unwrap();
    assert_eq!(summary.submitted, 1);

    // Duplicate path uploaded once.
    assert_eq!(harness.tool.upload_count(), 2);

    let payloads = harness.platform.created_payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].jobanalyses.len(), 2);
    for entry in &payloads[0].jobanalyses {
        assert_eq!(entry.input_files.len(), 2);
    }
    // Both analyses reference identical file ids.
    assert_eq!(
        payloads[0].jobanalyses[0].input_files,
        payloads[0].jobanalyses[1].input_files
    );
}

#[test]
fn cancellation_drains_without_recording() {
    let harness = Harness::new();
    let scheduler = harness.scheduler(throttle(1));
    scheduler.cancellation_flag().store(true, Ordering::SeqCst);

    let jobs: Vec<_> = (0..6).map(|i| job(&format!("run-{i}"), &["a.inp"])).collect();
    let summary = scheduler.run(jobs, &harness.ledger).unwrap();

    assert_eq!(summary.not_attempted, 6);
    assert_eq!(summary.total(), 6);
    assert_eq!(harness.tool.upload_count(), 0);
    assert_eq!(harness.platform.calls().len(), 0);
    // Nothing recorded: a later run re-attempts everything.
    assert!(harness.ledger.load_index().unwrap().is_empty());
}

#[test]
fn batch_outcome_covers_every_job_exactly_once() {
    let harness = Harness::new();
    // Mixed batch: one prior success, one injected upload failure.
    let writer = harness.ledger.spawn_writer().unwrap();
    writer.handle().record_submitted("run-000", "JOB-PRIOR", 1).unwrap();
    writer.finish().unwrap();

    harness
        .tool
        .inject_failure(FailureConfig::transient("reset").with_fail_count(99));

    let jobs: Vec<_> = (0..5).map(|i| job(&format!("run-{i:03}"), &["a.inp"])).collect();
    let names: Vec<String> = jobs.iter().map(|j| j.name.clone()).collect();
    let summary = harness.scheduler(throttle(2)).run(jobs, &harness.ledger).unwrap();

    assert_eq!(summary.total(), 5);
    let mut seen: Vec<&str> = summary
        .outcomes
        .iter()
        .map(|outcome| outcome.job_name())
        .collect();
    seen.sort();
    let mut expected: Vec<&str> = names.iter().map(String::as_str).collect();
    expected.sort();
    assert_eq!(seen, expected);
}
