use anyhow::Result;
use attestation_service::{
    config::AppConfig,
    observability,
    pipeline::Pipeline,
    sinks::CloudIngestSink,
    sources::EkmHttpSource,
    transform::CanonicalSigner,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Any failure up to here is fatal; once the loop starts, failures are per cycle.
    let signer = CanonicalSigner::from_key_file(&cfg.signing.private_key_path)?;
    let source = EkmHttpSource::new(&cfg.ekm, cfg.http.timeout)?;
    let sink = CloudIngestSink::new(&cfg.ingest, cfg.http.timeout)?;

    tracing::info!(
        meter = %cfg.ekm.meter_number,
        url = source.url(),
        interval_secs = cfg.schedule.interval.as_secs(),
        "starting EKM attestor"
    );

    let pipeline = Pipeline {
        source,
        signer,
        sink,
        interval: cfg.schedule.interval,
        events: observability::event_sink("EKMController"),
    };

    match pipeline.run().await {}
}
