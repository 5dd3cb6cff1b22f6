//! Batch orchestration.
//!
//! The scheduler turns an ordered job batch into recorded outcomes:
//! jobs whose latest ledger record is `submitted` are skipped up front
//! (resume); the rest go through a fixed pool of worker threads, each
//! driving one job's full flow (uploads, payload build, the pacing
//! gate, the create/submit lifecycle, the terminal ledger record).
//! One job's failure never stops the others. Cancellation stops handing
//! out queued jobs while in-flight flows drain and record normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ThrottleConfig;
use crate::job::{JobDefinition, JobError, JobFlow, JobPhase};
use crate::ledger::{Ledger, LedgerError, LedgerHandle, SubmissionStatus};
use crate::pacing::PacingGate;
use crate::payload;
use crate::platform::{PlatformApi, SubmissionClient, SubmissionError};
use crate::upload::{UploadTool, Uploader};

/// Scheduler-level failures. Per-job failures never surface here; they
/// are recorded in the ledger and counted in the summary.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to spawn submission worker: {0}")]
    Spawn(std::io::Error),

    #[error("submission worker panicked")]
    WorkerPanicked,
}

/// Terminal outcome of one job within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Prior ledger record was `submitted`; nothing done this run
    Skipped {
        job_name: String,
        job_id: Option<String>,
    },
    Submitted {
        job_name: String,
        job_id: String,
    },
    Failed {
        job_name: String,
        error: String,
    },
    /// Created on the platform but never submitted
    CreatedNotSubmitted {
        job_name: String,
        job_id: String,
    },
    /// Cancellation stopped the job before it started
    NotAttempted { job_name: String },
}

impl JobOutcome {
    pub fn job_name(&self) -> &str {
        match self {
            JobOutcome::Skipped { job_name, .. }
            | JobOutcome::Submitted { job_name, .. }
            | JobOutcome::Failed { job_name, .. }
            | JobOutcome::CreatedNotSubmitted { job_name, .. }
            | JobOutcome::NotAttempted { job_name } => job_name,
        }
    }
}

/// Aggregated result of one run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub created_not_submitted: usize,
    pub not_attempted: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchSummary {
    fn absorb(&mut self, outcome: JobOutcome) {
        match &outcome {
            JobOutcome::Skipped { .. } => self.skipped += 1,
            JobOutcome::Submitted { .. } => self.submitted += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::CreatedNotSubmitted { .. } => self.created_not_submitted += 1,
            JobOutcome::NotAttempted { .. } => self.not_attempted += 1,
        }
        self.outcomes.push(outcome);
    }

    /// True when any job needs operator follow-up.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.created_not_submitted > 0
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Orchestrates one batch run.
pub struct SubmissionScheduler {
    uploader: Uploader,
    client: SubmissionClient,
    throttle: ThrottleConfig,
    cancel: Arc<AtomicBool>,
}

impl SubmissionScheduler {
    pub fn new(
        tool: Arc<dyn UploadTool>,
        api: Arc<dyn PlatformApi>,
        throttle: ThrottleConfig,
    ) -> Self {
        let policy = throttle.retry_policy();
        Self {
            uploader: Uploader::new(tool, policy),
            client: SubmissionClient::new(api, policy),
            throttle,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that stops admission of new jobs when set. In-flight
    /// jobs drain and record their outcome.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the batch to completion and return the summary.
    ///
    /// Every job ends in exactly one of: a terminal ledger record, a
    /// resume skip, or (under cancellation) no record at all, which a
    /// later run treats as not yet attempted.
    pub fn run(
        &self,
        jobs: Vec<JobDefinition>,
        ledger: &Ledger,
    ) -> Result<BatchSummary, SchedulerError> {
        let started = Instant::now();
        let index = ledger.load_index()?;

        let mut summary = BatchSummary::default();
        let mut to_run = Vec::with_capacity(jobs.len());
        for job in jobs {
            match index.prior_outcome(&job.name) {
                Some(record) if record.status == SubmissionStatus::Submitted => {
                    info!(job = %job.name, job_id = ?record.job_id, "already submitted, skipping");
                    summary.absorb(JobOutcome::Skipped {
                        job_name: job.name,
                        job_id: record.job_id.clone(),
                    });
                }
                Some(record) => {
                    info!(job = %job.name, status = ?record.status, "prior run did not submit, retrying from scratch");
                    to_run.push(job);
                }
                None => to_run.push(job),
            }
        }

        if to_run.is_empty() {
            summary.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(summary);
        }

        let writer = ledger.spawn_writer()?;
        let gate = Arc::new(PacingGate::from_config(&self.throttle));

        let (job_tx, job_rx) = mpsc::channel::<JobDefinition>();
        for job in to_run {
            // Unbounded send; the queue is the whole remaining batch.
            let _ = job_tx.send(job);
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (done_tx, done_rx) = mpsc::channel::<JobOutcome>();
        let worker_count = self.throttle.max_upload_concurrency;

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let gate = Arc::clone(&gate);
            let cancel = Arc::clone(&self.cancel);
            let uploader = self.uploader.clone();
            let client = self.client.clone();
            let ledger_handle = writer.handle();
            let done_tx = done_tx.clone();

            let worker = thread::Builder::new()
                .name(format!("submit-worker-{worker_id}"))
                .spawn(move || {
                    worker_loop(
                        &job_rx,
                        &gate,
                        &cancel,
                        &uploader,
                        &client,
                        &ledger_handle,
                        &done_tx,
                    );
                })
                .map_err(SchedulerError::Spawn)?;
            workers.push(worker);
        }
        drop(done_tx);

        for outcome in done_rx {
            summary.absorb(outcome);
        }

        for worker in workers {
            worker.join().map_err(|_| SchedulerError::WorkerPanicked)?;
        }

        // All handles are gone; this blocks until every record is on disk.
        writer.finish()?;

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            submitted = summary.submitted,
            skipped = summary.skipped,
            failed = summary.failed,
            created_not_submitted = summary.created_not_submitted,
            not_attempted = summary.not_attempted,
            duration_ms = summary.duration_ms,
            "batch run complete"
        );
        Ok(summary)
    }
}

/// Pull jobs off the queue until it drains.
fn worker_loop(
    job_rx: &Mutex<mpsc::Receiver<JobDefinition>>,
    gate: &PacingGate,
    cancel: &AtomicBool,
    uploader: &Uploader,
    client: &SubmissionClient,
    ledger: &LedgerHandle,
    done_tx: &mpsc::Sender<JobOutcome>,
) {
    loop {
        let job = {
            let rx = job_rx.lock().unwrap();
            rx.recv()
        };
        let Ok(job) = job else {
            break;
        };

        if cancel.load(Ordering::SeqCst) {
            // Not started: no ledger record, resume picks it up later.
            let _ = done_tx.send(JobOutcome::NotAttempted { job_name: job.name });
            continue;
        }

        let outcome = match process_job(&job, gate, uploader, client, ledger) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Phase-machine violation: a bug, not a remote failure.
                // Record it so the job does not end silently.
                error!(job = %job.name, error = %err, "job flow aborted");
                record_or_warn(ledger.record_failed(&job.name, &err.to_string(), 0), &job.name);
                JobOutcome::Failed {
                    job_name: job.name.clone(),
                    error: err.to_string(),
                }
            }
        };
        let _ = done_tx.send(outcome);
    }
}

/// Drive one job through its full flow, recording the terminal outcome.
fn process_job(
    job: &JobDefinition,
    gate: &PacingGate,
    uploader: &Uploader,
    client: &SubmissionClient,
    ledger: &LedgerHandle,
) -> Result<JobOutcome, JobError> {
    let mut flow = JobFlow::new(job.name.clone());
    record_or_warn(ledger.record_pending(&job.name), &job.name);

    flow.advance(JobPhase::Uploading)?;
    let uploads = match uploader.upload_job_files(job) {
        Ok(uploads) => uploads,
        Err(err) => {
            flow.advance(JobPhase::Failed)?;
            let message = err.to_string();
            warn!(job = %job.name, error = %message, "upload failed");
            record_or_warn(
                ledger.record_failed(&job.name, &message, err.attempts()),
                &job.name,
            );
            return Ok(JobOutcome::Failed {
                job_name: job.name.clone(),
                error: message,
            });
        }
    };

    let payload = match payload::build(job, &uploads) {
        Ok(payload) => payload,
        Err(err) => {
            flow.advance(JobPhase::Failed)?;
            let message = err.to_string();
            warn!(job = %job.name, error = %message, "payload build failed");
            record_or_warn(ledger.record_failed(&job.name, &message, 0), &job.name);
            return Ok(JobOutcome::Failed {
                job_name: job.name.clone(),
                error: message,
            });
        }
    };
    flow.advance(JobPhase::PayloadBuilt)?;

    gate.admit();
    flow.advance(JobPhase::Submitting)?;

    match client.submit(&payload) {
        Ok(receipt) => {
            flow.advance(JobPhase::Succeeded)?;
            info!(job = %job.name, job_id = %receipt.job_id, attempts = receipt.attempts, "job submitted");
            record_or_warn(
                ledger.record_submitted(&job.name, &receipt.job_id, receipt.attempts),
                &job.name,
            );
            Ok(JobOutcome::Submitted {
                job_name: job.name.clone(),
                job_id: receipt.job_id,
            })
        }
        Err(SubmissionError::CreatedNotSubmitted {
            job_id,
            attempts,
            cause,
        }) => {
            flow.advance(JobPhase::Failed)?;
            warn!(job = %job.name, job_id = %job_id, error = %cause, "created but not submitted, needs follow-up");
            record_or_warn(
                ledger.record_created_not_submitted(
                    &job.name,
                    &job_id,
                    &cause.to_string(),
                    attempts,
                ),
                &job.name,
            );
            Ok(JobOutcome::CreatedNotSubmitted {
                job_name: job.name.clone(),
                job_id,
            })
        }
        Err(err @ SubmissionError::CreateFailed { .. }) => {
            flow.advance(JobPhase::Failed)?;
            let attempts = err.attempts();
            let message = err.to_string();
            warn!(job = %job.name, error = %message, "job creation failed");
            record_or_warn(ledger.record_failed(&job.name, &message, attempts), &job.name);
            Ok(JobOutcome::Failed {
                job_name: job.name.clone(),
                error: message,
            })
        }
    }
}

/// Ledger appends only fail when the writer thread died; its own error
/// surfaces from `finish()`, so here we just log and keep the flow going.
fn record_or_warn(result: Result<(), LedgerError>, job_name: &str) {
    if let Err(err) = result {
        error!(job = job_name, error = %err, "could not append ledger record");
    }
}
