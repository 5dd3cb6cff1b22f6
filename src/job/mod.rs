//! Job definitions and the per-job submission phase machine.
//!
//! A job definition is one record's worth of parsed input: name, input
//! files, hardware block, and one or more analyses. Definitions arrive as
//! a JSON array produced upstream; this module loads and validates them
//! (the tabular schema they were originally parsed from is out of scope).
//!
//! Phases: NOT_STARTED → UPLOADING → PAYLOAD_BUILT → SUBMITTING →
//! {SUCCEEDED | FAILED}

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hardware block shared by every analysis of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSpec {
    /// Platform core type identifier (e.g. "emerald")
    pub core_type: String,

    /// Cores per execution slot
    pub cores_per_slot: u32,

    /// Walltime limit in hours
    pub walltime_hours: u32,
}

/// One analysis to run within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    /// Analysis code identifier (e.g. "openfoam")
    pub code: String,

    /// Analysis version string
    pub version: String,

    /// Command executed by this analysis
    #[serde(default = "default_command")]
    pub command: String,
}

/// Placeholder command for analyses that only post-process.
fn default_command() -> String {
    "#none".to_string()
}

/// One job to submit: name, input files, hardware, analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique job name; the ledger is keyed by it
    pub name: String,

    /// Local input files, in submission order
    pub input_files: Vec<PathBuf>,

    /// Hardware block replicated into every analysis
    pub hardware: HardwareSpec,

    /// Analyses, in execution order
    pub analyses: Vec<AnalysisSpec>,
}

/// Errors for job batch loading, validation, and phase transitions.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to read job batch {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("invalid job batch JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("job at index {index}: name must not be empty")]
    EmptyName { index: usize },

    #[error("duplicate job name: {0}")]
    DuplicateName(String),

    #[error("job {name}: input file list must not be empty")]
    NoInputFiles { name: String },

    #[error("job {name}: analysis list must not be empty")]
    NoAnalyses { name: String },

    #[error("job {name}: cores_per_slot must be greater than zero")]
    ZeroCores { name: String },

    #[error("job {name}: walltime_hours must be greater than zero")]
    ZeroWalltime { name: String },

    #[error("invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobPhase, to: JobPhase },
}

impl JobDefinition {
    /// Validate a single definition.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.input_files.is_empty() {
            return Err(JobError::NoInputFiles {
                name: self.name.clone(),
            });
        }
        if self.analyses.is_empty() {
            return Err(JobError::NoAnalyses {
                name: self.name.clone(),
            });
        }
        if self.hardware.cores_per_slot == 0 {
            return Err(JobError::ZeroCores {
                name: self.name.clone(),
            });
        }
        if self.hardware.walltime_hours == 0 {
            return Err(JobError::ZeroWalltime {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Load a job batch from a JSON array file and validate it.
pub fn load_batch(path: &Path) -> Result<Vec<JobDefinition>, JobError> {
    let raw = fs::read_to_string(path).map_err(|source| JobError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let jobs: Vec<JobDefinition> = serde_json::from_str(&raw)?;
    validate_batch(&jobs)?;
    Ok(jobs)
}

/// Validate an in-memory batch: per-job checks plus unique, non-empty names.
///
/// Names must be unique because the ledger keys outcomes by job name.
pub fn validate_batch(jobs: &[JobDefinition]) -> Result<(), JobError> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        if job.name.trim().is_empty() {
            return Err(JobError::EmptyName { index });
        }
        if !seen.insert(job.name.as_str()) {
            return Err(JobError::DuplicateName(job.name.clone()));
        }
        job.validate()?;
    }
    Ok(())
}

/// Phase of one job's submission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Queued, not yet picked up by a worker
    NotStarted,
    /// Input files are being uploaded
    Uploading,
    /// Payload assembled, waiting on the pacing gate
    PayloadBuilt,
    /// Create/submit lifecycle in flight
    Submitting,
    /// Job submitted on the platform
    Succeeded,
    /// Terminal failure (upload, payload, or API)
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Succeeded | JobPhase::Failed)
    }

    /// Check if transition from this phase to `target` is valid.
    pub fn can_transition_to(&self, target: JobPhase) -> bool {
        match (self, target) {
            (JobPhase::NotStarted, JobPhase::Uploading) => true,

            (JobPhase::Uploading, JobPhase::PayloadBuilt) => true,
            (JobPhase::Uploading, JobPhase::Failed) => true,

            (JobPhase::PayloadBuilt, JobPhase::Submitting) => true,
            (JobPhase::PayloadBuilt, JobPhase::Failed) => true,

            (JobPhase::Submitting, JobPhase::Succeeded) => true,
            (JobPhase::Submitting, JobPhase::Failed) => true,

            // Terminal phases cannot transition
            _ => false,
        }
    }
}

/// Tracks one job's phase through the scheduler.
#[derive(Debug, Clone)]
pub struct JobFlow {
    name: String,
    phase: JobPhase,
}

impl JobFlow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: JobPhase::NotStarted,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Advance to a new phase, rejecting invalid transitions.
    pub fn advance(&mut self, to: JobPhase) -> Result<(), JobError> {
        if !self.phase.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(name: &str) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            input_files: vec![PathBuf::from("a.inp"), PathBuf::from("b.dat")],
            hardware: HardwareSpec {
                core_type: "emerald".to_string(),
                cores_per_slot: 4,
                walltime_hours: 12,
            },
            analyses: vec![AnalysisSpec {
                code: "openfoam".to_string(),
                version: "10".to_string(),
                command: "./run.sh".to_string(),
            }],
        }
    }

    #[test]
    fn test_valid_batch() {
        let jobs = vec![sample_job("run-001"), sample_job("run-002")];
        assert!(validate_batch(&jobs).is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let jobs = vec![sample_job("run-001"), sample_job("run-001")];
        let err = validate_batch(&jobs).unwrap_err();
        assert!(matches!(err, JobError::DuplicateName(name) if name == "run-001"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut job = sample_job("placeholder");
        job.name = "  ".to_string();
        let err = validate_batch(&[job]).unwrap_err();
        assert!(matches!(err, JobError::EmptyName { index: 0 }));
    }

    #[test]
    fn test_empty_file_list_rejected() {
        let mut job = sample_job("run-001");
        job.input_files.clear();
        let err = job.validate().unwrap_err();
        assert!(matches!(err, JobError::NoInputFiles { .. }));
    }

    #[test]
    fn test_empty_analyses_rejected() {
        let mut job = sample_job("run-001");
        job.analyses.clear();
        let err = job.validate().unwrap_err();
        assert!(matches!(err, JobError::NoAnalyses { .. }));
    }

    #[test]
    fn test_zero_hardware_rejected() {
        let mut job = sample_job("run-001");
        job.hardware.cores_per_slot = 0;
        assert!(matches!(job.validate(), Err(JobError::ZeroCores { .. })));

        let mut job = sample_job("run-002");
        job.hardware.walltime_hours = 0;
        assert!(matches!(job.validate(), Err(JobError::ZeroWalltime { .. })));
    }

    #[test]
    fn test_analysis_command_defaults() {
        let json = r#"[{
            "name": "run-001",
            "input_files": ["a.inp"],
            "hardware": {"core_type": "emerald", "cores_per_slot": 2, "walltime_hours": 1},
            "analyses": [{"code": "openfoam", "version": "10"}]
        }]"#;
        let jobs: Vec<JobDefinition> = serde_json::from_str(json).unwrap();
        assert_eq!(jobs[0].analyses[0].command, "#none");
    }

    #[test]
    fn test_load_batch_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let jobs = vec![sample_job("run-001")];
        fs::write(&path, serde_json::to_string_pretty(&jobs).unwrap()).unwrap();

        let loaded = load_batch(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "run-001");
    }

    #[test]
    fn test_load_batch_missing_file() {
        let err = load_batch(Path::new("/nonexistent/jobs.json")).unwrap_err();
        assert!(matches!(err, JobError::Read { .. }));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut flow = JobFlow::new("run-001");
        assert_eq!(flow.phase(), JobPhase::NotStarted);

        flow.advance(JobPhase::Uploading).unwrap();
        flow.advance(JobPhase::PayloadBuilt).unwrap();
        flow.advance(JobPhase::Submitting).unwrap();
        flow.advance(JobPhase::Succeeded).unwrap();
        assert!(flow.phase().is_terminal());
    }

    #[test]
    fn test_failure_transitions() {
        let mut flow = JobFlow::new("run-001");
        flow.advance(JobPhase::Uploading).unwrap();
        flow.advance(JobPhase::Failed).unwrap();
        assert!(flow.phase().is_terminal());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut flow = JobFlow::new("run-001");
        let err = flow.advance(JobPhase::Submitting).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobPhase::NotStarted,
                to: JobPhase::Submitting,
            }
        ));
        // Phase unchanged after a rejected transition.
        assert_eq!(flow.phase(), JobPhase::NotStarted);
    }

    #[test]
    fn test_terminal_phase_cannot_transition() {
        let mut flow = JobFlow::new("run-001");
        flow.advance(JobPhase::Uploading).unwrap();
        flow.advance(JobPhase::Failed).unwrap();
        assert!(flow.advance(JobPhase::Uploading).is_err());
    }
}
