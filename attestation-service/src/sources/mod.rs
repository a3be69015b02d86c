pub mod ekm_http;

pub use ekm_http::EkmHttpSource;
