use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::config::BackendConfig;
use crate::common::{CaptureError, Result};
use crate::service::protocol::{
    EnrollRequest, EnrollmentReceipt, ErrorBody, VerifiedLogin, VerifyRequest,
};
use crate::service::{EnrollmentBackend, VerificationBackend};

/// HTTP client for the enrollment and face-login endpoints.
///
/// Requests are sent once. Retrying is left to the user.
pub struct BackendClient {
    http: Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl EnrollmentBackend for BackendClient {
    async fn enroll(&self, embedding: &[f32], credential: &str) -> Result<EnrollmentReceipt> {
        let url = self.url(&self.config.enroll_path);
        debug!("Submitting {}-d embedding to {}", embedding.len(), url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential)
            .json(&EnrollRequest { embedding })
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VerificationBackend for BackendClient {
    async fn verify(&self, identifier: &str, embedding: &[f32]) -> Result<VerifiedLogin> {
        let url = self.url(&self.config.verify_path);
        debug!("Verifying face login at {}", url);

        let response = self
            .http
            .post(&url)
            .json(&VerifyRequest {
                email: identifier,
                embedding,
            })
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("backend returned {}", status));
    warn!("Backend rejected request ({}): {}", status, message);
    Err(CaptureError::BackendRejected(message))
}
