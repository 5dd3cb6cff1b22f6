//! Blocking HTTP client for the platform's job API.
//!
//! Endpoints: `POST {base}/api/v2/jobs/` creates a draft (201 + JSON
//! body with `id`), `POST {base}/api/v2/jobs/{id}/submit/` launches it
//! (any 2xx). Authentication is a `Token` scheme header built from the
//! credential resolved at startup.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{CreatedJob, PlatformApi, PlatformError};
use crate::config::ApiCredential;
use crate::payload::JobPayload;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpPlatformClient {
    http: Client,
    base_url: String,
    credential: ApiCredential,
}

impl HttpPlatformClient {
    pub fn new(
        base_url: impl Into<String>,
        credential: ApiCredential,
    ) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PlatformError::Network {
                operation: "client-init",
                detail: e.to_string(),
            })?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            credential,
        })
    }

    fn jobs_url(&self) -> String {
        format!("{}/api/v2/jobs/", self.base_url)
    }

    fn submit_url(&self, job_id: &str) -> String {
        format!("{}/api/v2/jobs/{}/submit/", self.base_url, job_id)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.credential.token())
    }

    fn network_error(operation: &'static str, error: reqwest::Error) -> PlatformError {
        PlatformError::Network {
            operation,
            detail: error.to_string(),
        }
    }

    /// Map a non-success response to the retry taxonomy.
    fn classify(operation: &'static str, response: Response) -> PlatformError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        match status.as_u16() {
            429 => PlatformError::RateLimited {
                operation,
                status: status.as_u16(),
            },
            401 | 403 => PlatformError::Auth {
                operation,
                status: status.as_u16(),
                body,
            },
            code if code >= 500 => PlatformError::Server {
                operation,
                status: code,
                body,
            },
            code => PlatformError::Rejected {
                operation,
                status: code,
                body,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

impl PlatformApi for HttpPlatformClient {
    fn create_job(&self, payload: &JobPayload) -> Result<CreatedJob, PlatformError> {
        let response = self
            .http
            .post(self.jobs_url())
            .header(AUTHORIZATION, self.auth_header())
            .json(payload)
            .send()
            .map_err(|e| Self::network_error("create", e))?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::classify("create", response));
        }

        let created: CreateResponse =
            response.json().map_err(|e| PlatformError::Protocol {
                operation: "create",
                detail: format!("invalid response body: {e}"),
            })?;
        debug!(job = %payload.name, job_id = %created.id, "draft job created");
        Ok(CreatedJob { id: created.id })
    }

    fn submit_job(&self, job_id: &str) -> Result<(), PlatformError> {
        let response = self
            .http
            .post(self.submit_url(job_id))
            .header(AUTHORIZATION, self.auth_header())
            .json(&serde_json::json!({}))
            .send()
            .map_err(|e| Self::network_error("submit", e))?;

        if !response.status().is_success() {
            return Err(Self::classify("submit", response));
        }
        debug!(job_id, "job submitted");
        Ok(())
    }
}
