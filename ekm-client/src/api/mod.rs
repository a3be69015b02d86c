//! Wire schemas of the two HTTP endpoints the attestor talks to.

pub mod ingest;
pub mod readings;

pub use ingest::IngestRequest;
pub use readings::{MeterReadingResponse, NumericReading, ReadingDecodeError};
