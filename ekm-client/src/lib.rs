pub mod api;
pub mod domain;

pub use domain::{AckPayload, MeterSnapshot, SignedAttestation};
