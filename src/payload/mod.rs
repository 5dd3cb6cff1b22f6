//! Job payload assembly.
//!
//! [`build`] turns a job definition plus its upload result into the
//! JSON document the create-job call sends. Field names follow the
//! platform's wire format (`jobanalyses`, `inputFiles`, camel-cased
//! hardware keys). Every analysis entry carries its own copy of the
//! file-id list and hardware block; entries stay independently mutable.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{HardwareSpec, JobDefinition};
use crate::upload::UploadResult;

/// Reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
}

/// Hardware block in wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareBlock {
    #[serde(rename = "coreType")]
    pub core_type: String,

    #[serde(rename = "coresPerSlot")]
    pub cores_per_slot: u32,

    pub walltime: u32,
}

impl From<&HardwareSpec> for HardwareBlock {
    fn from(spec: &HardwareSpec) -> Self {
        Self {
            core_type: spec.core_type.clone(),
            cores_per_slot: spec.cores_per_slot,
            walltime: spec.walltime_hours,
        }
    }
}

/// Analysis identifier in wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRef {
    pub code: String,
    pub version: String,
}

/// One analysis entry of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub analysis: AnalysisRef,

    pub command: String,

    pub hardware: HardwareBlock,

    #[serde(rename = "inputFiles")]
    pub input_files: Vec<FileRef>,
}

/// The create-job document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub name: String,
    pub jobanalyses: Vec<AnalysisEntry>,
}

/// Payload construction failure: fatal for the job, never retried.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("job {job}: no uploaded file id for {}", .path.display())]
    MissingFileId { job: String, path: PathBuf },
}

/// Build the payload for one job from its upload result.
///
/// File order follows the definition; duplicate paths contribute one
/// entry. A path without an uploaded id means an upstream upload gap and
/// fails the build.
pub fn build(job: &JobDefinition, uploads: &UploadResult) -> Result<JobPayload, PayloadError> {
    let mut seen = HashSet::with_capacity(job.input_files.len());
    let mut file_refs = Vec::with_capacity(job.input_files.len());
    for path in &job.input_files {
        if !seen.insert(path.as_path()) {
            continue;
        }
        let id = uploads
            .file_id(path)
            .ok_or_else(|| PayloadError::MissingFileId {
                job: job.name.clone(),
                path: path.clone(),
            })?;
        file_refs.push(FileRef { id: id.to_string() });
    }

    let jobanalyses = job
        .analyses
        .iter()
        .map(|analysis| AnalysisEntry {
            analysis: AnalysisRef {
                code: analysis.code.clone(),
                version: analysis.version.clone(),
            },
            command: analysis.command.clone(),
            hardware: HardwareBlock::from(&job.hardware),
            input_files: file_refs.clone(),
        })
        .collect();

    Ok(JobPayload {
        name: job.name.clone(),
        jobanalyses,
    })
}
