use serde::Serialize;

use crate::domain::SignedAttestation;

/// Body of `POST {ingest_url}`.
#[derive(Debug, Serialize)]
pub struct IngestRequest<'a> {
    pub hashed_data: &'a str,
}

impl<'a> From<&'a SignedAttestation> for IngestRequest<'a> {
    fn from(attestation: &'a SignedAttestation) -> Self {
        Self {
            hashed_data: attestation.as_str(),
        }
    }
}
