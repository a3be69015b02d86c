use std::time::Duration;

use ekm_client::{api::IngestRequest, AckPayload, SignedAttestation};
use reqwest::Client;

use crate::{
    config::IngestConfig,
    pipeline::{error_chain, PipelineError, Sink},
};

/// Posts `{"hashed_data": <attestation>}` to the ingestion endpoint.
///
/// The attestation is sent as-is; whether it is acceptable is for the
/// endpoint to decide. No deduplication token is attached, so a timeout after
/// the endpoint accepted the body is reported as a failure.
pub struct CloudIngestSink {
    client: Client,
    url: String,
}

impl CloudIngestSink {
    pub fn new(cfg: &IngestConfig, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Ingestion(format!("failed to build HTTP client: {}", error_chain(&e))))?;

        Ok(Self {
            client,
            url: cfg.url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Sink for CloudIngestSink {
    async fn publish(&self, attestation: &SignedAttestation) -> Result<AckPayload, PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .json(&IngestRequest::from(attestation))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Ingestion(error_chain(&e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Ingestion(error_chain(&e)))?;

        serde_json::from_slice(&body)
            .map(AckPayload::new)
            .map_err(|e| PipelineError::Ingestion(format!("unparseable acknowledgment: {e}")))
    }
}
