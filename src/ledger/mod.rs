//! Durable append-only submission ledger.
//!
//! The ledger is the resume/idempotency authority: one JSON record per
//! line, append-only, never mutated. The most recent record for a job
//! name is authoritative. Concurrent job flows never touch the file
//! directly; they send completed records over a channel to a single
//! writer thread, which appends each record as one complete line and
//! flushes. A run interrupted mid-job leaves no terminal record for that
//! job, and resume treats it as not yet attempted.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Schema version stamped on every record.
pub const SCHEMA_VERSION: u32 = 1;

/// Outcome states recorded per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    /// Flow started; a terminal record follows unless the run crashed
    Pending,
    /// Job created and submitted on the platform
    Submitted,
    /// Terminal failure (upload, payload, or API)
    Failed,
    /// Job exists on the platform but was never submitted; needs
    /// operator follow-up
    CreatedNotSubmitted,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

/// One ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub schema_version: u32,

    pub job_name: String,

    /// Platform job id, absent until creation succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    pub status: SubmissionStatus,

    pub recorded_at: DateTime<Utc>,

    /// Remote-operation attempts consumed by the terminating phase
    pub attempts: u32,

    /// Summary of the last error, for failed outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmissionRecord {
    fn new(job_name: &str, status: SubmissionStatus) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            job_name: job_name.to_string(),
            job_id: None,
            status,
            recorded_at: Utc::now(),
            attempts: 0,
            error: None,
        }
    }

    pub fn pending(job_name: &str) -> Self {
        Self::new(job_name, SubmissionStatus::Pending)
    }

    pub fn submitted(job_name: &str, job_id: &str, attempts: u32) -> Self {
        let mut record = Self::new(job_name, SubmissionStatus::Submitted);
        record.job_id = Some(job_id.to_string());
        record.attempts = attempts;
        record
    }

    pub fn failed(job_name: &str, error: &str, attempts: u32) -> Self {
        let mut record = Self::new(job_name, SubmissionStatus::Failed);
        record.error = Some(error.to_string());
        record.attempts = attempts;
        record
    }

    pub fn created_not_submitted(
        job_name: &str,
        job_id: &str,
        error: &str,
        attempts: u32,
    ) -> Self {
        let mut record = Self::new(job_name, SubmissionStatus::CreatedNotSubmitted);
        record.job_id = Some(job_id.to_string());
        record.error = Some(error.to_string());
        record.attempts = attempts;
        record
    }
}

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("failed to read ledger {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("ledger {path} line {line}: invalid record: {source}")]
    Corrupt {
        path: String,
        line: usize,
        source: serde_json::Error,
    },

    #[error("failed to encode ledger record: {0}")]
    Encode(serde_json::Error),

    #[error("failed to append ledger record: {0}")]
    Append(io::Error),

    #[error("ledger writer is no longer running")]
    WriterGone,
}

/// Latest record per job name, loaded at startup for resume decisions.
#[derive(Debug, Default)]
pub struct LedgerIndex {
    latest: HashMap<String, SubmissionRecord>,
}

impl LedgerIndex {
    /// Most recent record for a job, if any.
    pub fn prior_outcome(&self, job_name: &str) -> Option<&SubmissionRecord> {
        self.latest.get(job_name)
    }

    /// True when the job's last record is `submitted` and the job must
    /// be skipped entirely on resume.
    pub fn is_submitted(&self, job_name: &str) -> bool {
        self.prior_outcome(job_name)
            .map(|record| record.status == SubmissionStatus::Submitted)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Records in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &SubmissionRecord> {
        self.latest.values()
    }

    fn absorb(&mut self, record: SubmissionRecord) {
        self.latest.insert(record.job_name.clone(), record);
    }
}

/// Handle to the ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the latest record per job from an existing ledger file.
    ///
    /// A missing file yields an empty index. An unreadable line is an
    /// error: a corrupt ledger must not be silently reinterpreted.
    pub fn load_index(&self) -> Result<LedgerIndex, LedgerError> {
        let mut index = LedgerIndex::default();
        if !self.path.exists() {
            return Ok(index);
        }

        let file = File::open(&self.path).map_err(|source| LedgerError::Open {
            path: self.path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| LedgerError::Read {
                path: self.path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: SubmissionRecord =
                serde_json::from_str(&line).map_err(|source| LedgerError::Corrupt {
                    path: self.path.display().to_string(),
                    line: line_no + 1,
                    source,
                })?;
            index.absorb(record);
        }
        debug!(path = %self.path.display(), jobs = index.len(), "ledger index loaded");
        Ok(index)
    }

    /// Open the file for append and start the single writer thread.
    pub fn spawn_writer(&self) -> Result<LedgerWriter, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Open {
                path: self.path.display().to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel::<SubmissionRecord>();
        let join = thread::Builder::new()
            .name("ledger-writer".to_string())
            .spawn(move || write_loop(file, rx))
            .map_err(LedgerError::Append)?;

        Ok(LedgerWriter { tx, join })
    }
}

/// Writer loop: one complete line per record, flushed before the next.
fn write_loop(
    mut file: File,
    rx: mpsc::Receiver<SubmissionRecord>,
) -> Result<(), LedgerError> {
    for record in rx {
        let mut line = serde_json::to_string(&record).map_err(LedgerError::Encode)?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(LedgerError::Append)?;
        file.flush().map_err(LedgerError::Append)?;
    }
    Ok(())
}

/// Owns the writer thread; all appends flow through [`LedgerHandle`]s.
#[derive(Debug)]
pub struct LedgerWriter {
    tx: Sender<SubmissionRecord>,
    join: JoinHandle<Result<(), LedgerError>>,
}

impl LedgerWriter {
    /// A cloneable handle for worker threads.
    pub fn handle(&self) -> LedgerHandle {
        LedgerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Drop the channel and wait for every queued record to hit disk.
    pub fn finish(self) -> Result<(), LedgerError> {
        let LedgerWriter { tx, join } = self;
        drop(tx);
        join.join().map_err(|_| LedgerError::WriterGone)?
    }
}

/// Cheap per-worker handle appending records through the writer.
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    tx: Sender<SubmissionRecord>,
}

impl LedgerHandle {
    pub fn record(&self, record: SubmissionRecord) -> Result<(), LedgerError> {
        self.tx.send(record).map_err(|_| LedgerError::WriterGone)
    }

    pub fn record_pending(&self, job_name: &str) -> Result<(), LedgerError> {
        self.record(SubmissionRecord::pending(job_name))
    }

    pub fn record_submitted(
        &self,
        job_name: &str,
        job_id: &str,
        attempts: u32,
    ) -> Result<(), LedgerError> {
        self.record(SubmissionRecord::submitted(job_name, job_id, attempts))
    }

    pub fn record_failed(
        &self,
        job_name: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), LedgerError> {
        self.record(SubmissionRecord::failed(job_name, error, attempts))
    }

    pub fn record_created_not_submitted(
        &self,
        job_name: &str,
        job_id: &str,
        error: &str,
        attempts: u32,
    ) -> Result<(), LedgerError> {
        self.record(SubmissionRecord::created_not_submitted(
            job_name, job_id, error, attempts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.jsonl"));
        (dir, ledger)
    }

    #[test]
    fn test_missing_file_yields_empty_index() {
        let (_dir, ledger) = temp_ledger();
        let index = ledger.load_index().unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_write_and_reload() {
        let (_dir, ledger) = temp_ledger();

        let writer = ledger.spawn_writer().unwrap();
        let handle = writer.handle();
        handle.record_pending("run-001").unwrap();
        handle.record_submitted("run-001", "JOB-1", 2).unwrap();
        handle.record_failed("run-002", "upload failed", 3).unwrap();
        writer.finish().unwrap();

        let index = ledger.load_index().unwrap();
        assert_eq!(index.len(), 2);

        let record = index.prior_outcome("run-001").unwrap();
        assert_eq!(record.status, SubmissionStatus::Submitted);
        assert_eq!(record.job_id.as_deref(), Some("JOB-1"));
        assert_eq!(record.attempts, 2);

        let record = index.prior_outcome("run-002").unwrap();
        assert_eq!(record.status, SubmissionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("upload failed"));
    }

    #[test]
    fn test_latest_record_wins() {
        let (_dir, ledger) = temp_ledger();

        let writer = ledger.spawn_writer().unwrap();
        let handle = writer.handle();
        handle.record_failed("run-001", "transient outage", 3).unwrap();
        handle.record_submitted("run-001", "JOB-9", 1).unwrap();
        writer.finish().unwrap();

        let index = ledger.load_index().unwrap();
        assert!(index.is_submitted("run-001"));
    }

    #[test]
    fn test_append_preserves_existing_records() {
        let (_dir, ledger) = temp_ledger();

        let writer = ledger.spawn_writer().unwrap();
        writer.handle().record_submitted("run-001", "JOB-1", 1).unwrap();
        writer.finish().unwrap();

        let writer = ledger.spawn_writer().unwrap();
        writer.handle().record_submitted("run-002", "JOB-2", 1).unwrap();
        writer.finish().unwrap();

        let index = ledger.load_index().unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.is_submitted("run-001"));
        assert!(index.is_submitted("run-002"));
    }

    #[test]
    fn test_corrupt_line_is_an_error() {
        let (_dir, ledger) = temp_ledger();
        std::fs::write(ledger.path(), "{not json}\n").unwrap();

        let err = ledger.load_index().unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let (_dir, ledger) = temp_ledger();
        let record = SubmissionRecord::submitted("run-001", "JOB-1", 1);
        let line = serde_json::to_string(&record).unwrap();
        std::fs::write(ledger.path(), format!("{line}\n\n")).unwrap();

        let index = ledger.load_index().unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_pending_is_not_terminal() {
        assert!(!SubmissionStatus::Pending.is_terminal());
        assert!(SubmissionStatus::Submitted.is_terminal());
        assert!(SubmissionStatus::Failed.is_terminal());
        assert!(SubmissionStatus::CreatedNotSubmitted.is_terminal());
    }

    #[test]
    fn test_pending_does_not_count_as_submitted() {
        let (_dir, ledger) = temp_ledger();

        let writer = ledger.spawn_writer().unwrap();
        writer.handle().record_pending("run-001").unwrap();
        writer.finish().unwrap();

        let index = ledger.load_index().unwrap();
        assert!(!index.is_submitted("run-001"));
        assert_eq!(
            index.prior_outcome("run-001").unwrap().status,
            SubmissionStatus::Pending
        );
    }

    #[test]
    fn test_status_wire_names() {
        let record = SubmissionRecord::created_not_submitted("run-001", "JOB-1", "submit 503", 4);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"created-not-submitted\""));

        let record = SubmissionRecord::pending("run-001");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"pending\""));
        // No job id yet, so the field is omitted entirely.
        assert!(!json.contains("job_id"));
    }

    #[test]
    fn test_handles_usable_from_threads() {
        let (_dir, ledger) = temp_ledger();

        let writer = ledger.spawn_writer().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let handle = writer.handle();
                std::thread::spawn(move || {
                    handle
                        .record_submitted(&format!("run-{i:03}"), &format!("JOB-{i}"), 1)
                        .unwrap();
                })
            })
            .collect();
        for join in handles {
            join.join().unwrap();
        }
        writer.finish().unwrap();

        let index = ledger.load_index().unwrap();
        assert_eq!(index.len(), 4);
    }
}
