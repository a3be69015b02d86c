use std::{convert::Infallible, error::Error as StdError, fmt, sync::Arc, time::Duration};

use ekm_client::{AckPayload, MeterSnapshot, SignedAttestation};

use crate::observability::{CycleEvent, EventSink};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch meter data: {0}")]
    Acquisition(String),
    #[error("failed to load private key: {0}")]
    KeyLoad(String),
    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),
    #[error("failed to sign meter data: {0}")]
    Signing(String),
    #[error("failed to ingest data to cloud: {0}")]
    Ingestion(String),
}

/// Renders an error and every `source()` below it as `outer: inner: ...`.
pub(crate) fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cause = e.source();
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Sign,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Sign => "sign",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self) -> Result<MeterSnapshot, PipelineError>;
}

pub trait Signer: Send + Sync {
    fn sign(&self, snapshot: &MeterSnapshot) -> Result<SignedAttestation, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn publish(&self, attestation: &SignedAttestation) -> Result<AckPayload, PipelineError>;
}

/// Result of one fetch → sign → publish pass.
#[derive(Debug)]
pub enum CycleOutcome {
    Published(AckPayload),
    Failed { stage: Stage, error: PipelineError },
}

impl CycleOutcome {
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Published(_) => None,
            Self::Failed { stage, .. } => Some(*stage),
        }
    }
}

/// Drives the fetch → sign → publish cycle forever, sleeping `interval`
/// after every cycle whatever its outcome.
///
/// A failing stage ends its cycle early; later stages are not invoked and
/// nothing is retried until the next cycle.
pub struct Pipeline<S, G, K> {
    pub source: S,
    pub signer: G,
    pub sink: K,
    pub interval: Duration,
    pub events: Arc<dyn EventSink>,
}

impl<S, G, K> Pipeline<S, G, K>
where
    S: Source,
    G: Signer,
    K: Sink,
{
    pub async fn run(&self) -> Infallible {
        let mut cycle: u64 = 0;
        loop {
            cycle = cycle.wrapping_add(1);
            self.run_cycle(cycle).await;

            self.emit(CycleEvent::Sleeping {
                interval: self.interval,
            });
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn run_cycle(&self, cycle: u64) -> CycleOutcome {
        self.emit(CycleEvent::CycleStarted { cycle });

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(error) => return self.fail(Stage::Fetch, error),
        };
        self.emit(CycleEvent::Fetched {
            meter_name: &snapshot.meter_name,
            reading_date: &snapshot.reading_date,
        });

        let attestation = match self.signer.sign(&snapshot) {
            Ok(attestation) => attestation,
            Err(error) => return self.fail(Stage::Sign, error),
        };
        drop(snapshot);
        self.emit(CycleEvent::Signed {
            signature_len: attestation.len(),
        });

        match self.sink.publish(&attestation).await {
            Ok(ack) => {
                self.emit(CycleEvent::Published { ack: &ack });
                CycleOutcome::Published(ack)
            }
            Err(error) => self.fail(Stage::Publish, error),
        }
    }

    fn fail(&self, stage: Stage, error: PipelineError) -> CycleOutcome {
        self.emit(CycleEvent::StageFailed {
            stage,
            error: &error,
        });
        CycleOutcome::Failed { stage, error }
    }

    // Sink errors are dropped: a broken log sink must not stop the cycle.
    fn emit(&self, event: CycleEvent<'_>) {
        let _ = self.events.emit(&event);
    }
}
