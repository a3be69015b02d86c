use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use ekm_client::AckPayload;
use once_cell::sync::Lazy;
use time::macros::format_description;
use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

use crate::pipeline::{PipelineError, Stage};

/// Install the global `tracing` subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("attestation_service=info,ekm_attestor=info"));
    let timer = UtcTime::new(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_target(false)
        .try_init();
}

/// Something that happened during a cycle, reported to an [`EventSink`].
#[derive(Debug)]
pub enum CycleEvent<'a> {
    CycleStarted { cycle: u64 },
    Fetched { meter_name: &'a str, reading_date: &'a str },
    Signed { signature_len: usize },
    Published { ack: &'a AckPayload },
    StageFailed { stage: Stage, error: &'a PipelineError },
    Sleeping { interval: Duration },
}

#[derive(thiserror::Error, Debug)]
#[error("event sink unavailable: {0}")]
pub struct EventSinkError(pub String);

/// Where the orchestrator reports cycle progress.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CycleEvent<'_>) -> Result<(), EventSinkError>;
}

/// Forwards cycle events to `tracing`, tagged with the sink's name.
#[derive(Debug)]
pub struct TracingEventSink {
    name: String,
}

impl TracingEventSink {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl EventSink for TracingEventSink {
    fn emit(&self, event: &CycleEvent<'_>) -> Result<(), EventSinkError> {
        let logger = self.name.as_str();
        match event {
            CycleEvent::CycleStarted { cycle } => {
                tracing::info!(logger, cycle, "starting extraction cycle");
            }
            CycleEvent::Fetched {
                meter_name,
                reading_date,
            } => {
                tracing::info!(logger, meter_name, reading_date, "fetched meter data");
            }
            CycleEvent::Signed { signature_len } => {
                tracing::info!(logger, signature_len, "signed meter data");
            }
            CycleEvent::Published { ack } => {
                tracing::info!(logger, ack = %ack, "ingested signed data to cloud");
            }
            CycleEvent::StageFailed { stage, error } => {
                tracing::error!(logger, stage = %stage, error = %error, "error during extraction cycle");
            }
            CycleEvent::Sleeping { interval } => {
                tracing::debug!(logger, interval_secs = interval.as_secs_f64(), "sleeping until next cycle");
            }
        }
        Ok(())
    }
}

static EVENT_SINKS: Lazy<Mutex<HashMap<String, Arc<TracingEventSink>>>> = Lazy::new(Default::default);

/// Return the sink registered under `name`, creating it on first use.
pub fn event_sink(name: &str) -> Arc<TracingEventSink> {
    let mut sinks = EVENT_SINKS.lock().unwrap_or_else(PoisonError::into_inner);
    sinks
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(TracingEventSink::new(name)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_returns_same_sink() {
        let a = event_sink("repeat_logger");
        let b = event_sink("repeat_logger");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "repeat_logger");
    }

    #[test]
    fn distinct_names_get_distinct_sinks() {
        let a = event_sink("controller");
        let b = event_sink("publisher");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unusual_names_are_accepted() {
        let long = "a".repeat(1000);
        for name in ["", long.as_str()] {
            let sink = event_sink(name);
            assert_eq!(sink.name(), name);
            assert!(sink.emit(&CycleEvent::CycleStarted { cycle: 1 }).is_ok());
        }
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        init_tracing();
        init_tracing();

        let sink = event_sink("all_events");
        let ack = AckPayload::new(serde_json::json!({ "result": "success" }));
        let err = PipelineError::Ingestion("timeout".to_string());
        let events = [
            CycleEvent::CycleStarted { cycle: 7 },
            CycleEvent::Fetched {
                meter_name: "M1",
                reading_date: "2024-06-09",
            },
            CycleEvent::Signed { signature_len: 512 },
            CycleEvent::Published { ack: &ack },
            CycleEvent::StageFailed {
                stage: Stage::Publish,
                error: &err,
            },
            CycleEvent::Sleeping {
                interval: Duration::from_secs(60),
            },
        ];
        for event in &events {
            assert!(sink.emit(event).is_ok());
        }
    }
}
