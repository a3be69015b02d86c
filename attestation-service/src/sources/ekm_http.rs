use std::time::Duration;

use ekm_client::{api::MeterReadingResponse, MeterSnapshot};
use reqwest::Client;

use crate::{
    config::{EkmApiConfig, Secret},
    pipeline::{error_chain, PipelineError, Source},
};

/// Pulls one reading per call from `GET {base}/meters/{id}/`.
pub struct EkmHttpSource {
    client: Client,
    url: String,
    api_key: Secret,
}

impl EkmHttpSource {
    pub fn new(cfg: &EkmApiConfig, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Acquisition(format!("failed to build HTTP client: {}", error_chain(&e))))?;

        Ok(Self {
            client,
            url: cfg.meter_url(),
            api_key: cfg.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Source for EkmHttpSource {
    async fn fetch(&self) -> Result<MeterSnapshot, PipelineError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Acquisition(error_chain(&e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Acquisition(error_chain(&e)))?;

        let reading: MeterReadingResponse = serde_json::from_slice(&body)
            .map_err(|e| PipelineError::Acquisition(format!("malformed response body: {e}")))?;

        MeterSnapshot::try_from(reading).map_err(|e| PipelineError::Acquisition(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config(base_url: &str) -> EkmApiConfig {
        EkmApiConfig {
            base_url: base_url.to_string(),
            meter_number: "12345".to_string(),
            api_key: Secret::new("dummy-key"),
        }
    }

    fn reading_body() -> serde_json::Value {
        json!({
            "meter_name": "M1",
            "meter_data": { "kwh": 1234.5 },
            "meter_day_of_week": "Monday",
            "reading_date": "2024-06-09",
            "model": "Pulse v.4",
            "address": "123 Main St",
            "firmware": "1.0.0",
            "total_watt_hour": 1000.0,
            "voltage": 120.0,
            "amps": 10.0,
            "total_power_watts": 1200.0,
            "ct_ratio": 1.0,
            "frequency_hz": 60.0
        })
    }

    async fn source_for(server: &MockServer, timeout: Duration) -> EkmHttpSource {
        EkmHttpSource::new(&config(&server.uri()), timeout).unwrap()
    }

    #[tokio::test]
    async fn fetches_snapshot_with_bearer_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/meters/12345/"))
            .and(header("authorization", "Bearer dummy-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reading_body()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = source_for(&server, Duration::from_secs(10)).await.fetch().await.unwrap();

        assert_eq!(snapshot.meter_name, "M1");
        assert_eq!(snapshot.voltage, 120.0);
        assert_eq!(snapshot.meter_data.get("kwh"), Some(&json!(1234.5)));
    }

    #[tokio::test]
    async fn missing_measurements_default_to_zero() {
        let server = MockServer::start().await;
        let mut body = reading_body();
        for key in ["voltage", "amps", "frequency_hz"] {
            body.as_object_mut().unwrap().remove(key);
        }
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let snapshot = source_for(&server, Duration::from_secs(10)).await.fetch().await.unwrap();

        assert_eq!(snapshot.voltage, 0.0);
        assert_eq!(snapshot.amps, 0.0);
        assert_eq!(snapshot.frequency_hz, 0.0);
        assert_eq!(snapshot.total_watt_hour, 1000.0);
    }

    #[tokio::test]
    async fn error_status_is_acquisition_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = source_for(&server, Duration::from_secs(10)).await.fetch().await.unwrap_err();
        match err {
            PipelineError::Acquisition(msg) => assert!(msg.contains("500"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_acquisition_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server, Duration::from_secs(10)).await.fetch().await.unwrap_err();
        match err {
            PipelineError::Acquisition(msg) => assert!(msg.contains("malformed response body"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_is_acquisition_error() {
        let server = MockServer::start().await;
        let mut body = reading_body();
        body.as_object_mut().unwrap().remove("firmware");
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let err = source_for(&server, Duration::from_secs(10)).await.fetch().await.unwrap_err();
        match err {
            PipelineError::Acquisition(msg) => assert!(msg.contains("firmware"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reading_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = source_for(&server, Duration::from_millis(100)).await.fetch().await.unwrap_err();
        assert!(matches!(err, PipelineError::Acquisition(_)), "{err}");
    }

    #[tokio::test]
    async fn unreachable_device_is_acquisition_error() {
        let source = EkmHttpSource::new(&config("http://127.0.0.1:1"), Duration::from_secs(1)).unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, PipelineError::Acquisition(_)), "{err}");
    }
}
