pub mod attestation;
pub mod meter_snapshot;

pub use attestation::{AckPayload, SignedAttestation};
pub use meter_snapshot::MeterSnapshot;
