pub mod cloud_http;

pub use cloud_http::CloudIngestSink;
