//! Upload tool boundary.
//!
//! File transfer goes through the platform's external CLI, one process
//! per file. The [`UploadTool`] trait abstracts the invocation so tests
//! and dry runs can swap in the in-memory fake from [`crate::mock`].

use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use regex_lite::Regex;
use tracing::debug;

use crate::config::{ApiCredential, UploadToolConfig};
use crate::retry::Retryable;

/// Pattern the transfer CLI prints for an uploaded file.
const FILE_ID_PATTERN: &str = r"File ID (\w+)";

/// Capability interface for uploading one file.
pub trait UploadTool: Send + Sync {
    /// Upload `path` for `job_name`, returning the platform file id.
    fn upload(&self, job_name: &str, path: &Path) -> Result<String, UploadToolError>;
}

/// Errors from a single upload invocation.
#[derive(Debug, thiserror::Error)]
pub enum UploadToolError {
    /// The local file does not exist (fatal; retrying cannot help).
    #[error("input file not found: {}", .0.display())]
    FileMissing(PathBuf),

    /// The tool could not be started (fatal; usually a missing binary).
    #[error("failed to launch upload tool {program}: {detail}")]
    Launch { program: String, detail: String },

    /// The tool ran and failed (transient; network-bound).
    #[error("upload tool failed: {0}")]
    ToolFailed(String),

    /// The tool succeeded but printed no recognizable file id (fatal;
    /// the output contract is broken, not the network).
    #[error("no file id found in upload tool output")]
    MissingFileId,
}

impl Retryable for UploadToolError {
    fn is_transient(&self) -> bool {
        matches!(self, UploadToolError::ToolFailed(_))
    }
}

/// Real upload tool: spawns the configured transfer CLI per file.
pub struct CliUploadTool {
    program: String,
    extra_args: Vec<String>,
    credential: ApiCredential,
    id_pattern: Regex,
}

impl CliUploadTool {
    pub fn new(config: &UploadToolConfig, credential: ApiCredential) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
            credential,
            id_pattern: Regex::new(FILE_ID_PATTERN).unwrap(),
        }
    }
}

impl UploadTool for CliUploadTool {
    fn upload(&self, job_name: &str, path: &Path) -> Result<String, UploadToolError> {
        if !path.exists() {
            return Err(UploadToolError::FileMissing(path.to_path_buf()));
        }

        let output = Command::new(&self.program)
            .arg("upload")
            .args(&self.extra_args)
            .arg("-p")
            .arg(self.credential.token())
            .arg("-f")
            .arg(path)
            .output()
            .map_err(|e| UploadToolError::Launch {
                program: self.program.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UploadToolError::ToolFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        // The id can land on either stream depending on the tool version.
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let file_id = self
            .id_pattern
            .captures(&combined)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(UploadToolError::MissingFileId)?;

        debug!(job = job_name, file = %path.display(), file_id, "file uploaded");
        Ok(file_id)
    }
}
