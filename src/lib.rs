//! batchlane: concurrent, rate-paced batch job submission.
//!
//! This crate submits large batches of compute jobs to a remote
//! job-execution platform. Each job needs its input files uploaded, a
//! JSON job document built, and a two-step create/submit API lifecycle
//! driven to completion. The engine bounds upload concurrency with a
//! worker pool, paces submissions through a global burst/gap gate,
//! retries transient remote failures with linear backoff, and records
//! every outcome in an append-only ledger that makes reruns idempotent.

pub mod config;
pub mod job;
pub mod ledger;
pub mod mock;
pub mod pacing;
pub mod payload;
pub mod platform;
pub mod retry;
pub mod scheduler;
pub mod upload;

pub use config::{ApiCredential, SubmitConfig, ThrottleConfig};
pub use job::{JobDefinition, JobPhase};
pub use ledger::{Ledger, SubmissionRecord, SubmissionStatus};
pub use platform::{HttpPlatformClient, PlatformApi, SubmissionClient};
pub use scheduler::{BatchSummary, JobOutcome, SubmissionScheduler};
pub use upload::{CliUploadTool, UploadTool, Uploader};
