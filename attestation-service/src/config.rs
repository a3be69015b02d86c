use serde::Deserialize;
use std::{fmt, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{bail, Context};

/// Env var naming the TOML settings file.
pub const CONFIG_PATH_VAR: &str = "EKM_ATTESTOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "ekm-attestor.toml";

const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// A credential whose `Debug` output is redacted.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct EkmApiConfig {
    pub base_url: String,
    pub meter_number: String,
    pub api_key: Secret,
}

impl EkmApiConfig {
    /// `{base}/meters/{id}/`, tolerating a trailing slash on the base.
    pub fn meter_url(&self) -> String {
        format!(
            "{}/meters/{}/",
            self.base_url.trim_end_matches('/'),
            self.meter_number
        )
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub private_key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ekm: EkmApiConfig,
    pub ingest: IngestConfig,
    pub signing: SigningConfig,
    pub schedule: ScheduleConfig,
    pub http: HttpConfig,
}

/// Settings as read from the TOML file, before env overrides and validation.
/// Keys are the lower-case forms of the environment variable names.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    ekm_api_url: Option<String>,
    ekm_meter_number: Option<String>,
    ekm_api_key: Option<Secret>,
    cloud_ingest_url: Option<String>,
    private_key_path: Option<String>,
    extraction_interval_seconds: Option<u64>,
    http_timeout_seconds: Option<u64>,
}

impl RawSettings {
    fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    fn overlay<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EKM_API_URL") {
            self.ekm_api_url = Some(v);
        }
        if let Some(v) = lookup("EKM_METER_NUMBER") {
            self.ekm_meter_number = Some(v);
        }
        if let Some(v) = lookup("EKM_API_KEY") {
            self.ekm_api_key = Some(Secret::new(v));
        }
        if let Some(v) = lookup("CLOUD_INGEST_URL") {
            self.cloud_ingest_url = Some(v);
        }
        if let Some(v) = lookup("PRIVATE_KEY_PATH") {
            self.private_key_path = Some(v);
        }
        if let Some(v) = lookup("EXTRACTION_INTERVAL_SECONDS") {
            self.extraction_interval_seconds = Some(parse_seconds("EXTRACTION_INTERVAL_SECONDS", &v)?);
        }
        if let Some(v) = lookup("HTTP_TIMEOUT_SECONDS") {
            self.http_timeout_seconds = Some(parse_seconds("HTTP_TIMEOUT_SECONDS", &v)?);
        }
        Ok(self)
    }

    fn validate(self) -> anyhow::Result<AppConfig> {
        fn present(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.trim().is_empty())
        }

        let ekm_api_url = present(self.ekm_api_url);
        let ekm_meter_number = present(self.ekm_meter_number);
        let ekm_api_key = present(self.ekm_api_key.map(|s| s.0));
        let cloud_ingest_url = present(self.cloud_ingest_url);
        let private_key_path = present(self.private_key_path);

        let missing: Vec<&str> = [
            ("EKM_API_URL", ekm_api_url.is_none()),
            ("EKM_METER_NUMBER", ekm_meter_number.is_none()),
            ("EKM_API_KEY", ekm_api_key.is_none()),
            ("CLOUD_INGEST_URL", cloud_ingest_url.is_none()),
            ("PRIVATE_KEY_PATH", private_key_path.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            bail!("missing required settings: {}", missing.join(", "));
        }

        let interval_secs = self.extraction_interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            bail!("EXTRACTION_INTERVAL_SECONDS must be at least 1");
        }
        let timeout_secs = self.http_timeout_seconds.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if timeout_secs == 0 {
            bail!("HTTP_TIMEOUT_SECONDS must be at least 1");
        }

        // All five are Some past the `missing` check.
        let (
            Some(base_url),
            Some(meter_number),
            Some(api_key),
            Some(ingest_url),
            Some(key_path),
        ) = (
            ekm_api_url,
            ekm_meter_number,
            ekm_api_key,
            cloud_ingest_url,
            private_key_path,
        )
        else {
            bail!("missing required settings");
        };

        Ok(AppConfig {
            ekm: EkmApiConfig {
                base_url,
                meter_number,
                api_key: Secret(api_key),
            },
            ingest: IngestConfig { url: ingest_url },
            signing: SigningConfig {
                private_key_path: PathBuf::from(key_path),
            },
            schedule: ScheduleConfig {
                interval: Duration::from_secs(interval_secs),
            },
            http: HttpConfig {
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse_seconds(key: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{key} must be a whole number of seconds, got {value:?}"))
}

impl AppConfig {
    /// Load settings from the TOML file, `.env` and the process environment,
    /// later sources overriding earlier ones.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        // A missing .env file is fine; variables may come from the real environment.
        let _ = dotenvy::dotenv();

        let raw = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => RawSettings::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                RawSettings::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => RawSettings::default(),
        };

        raw.overlay(|key| env::var(key).ok())?.validate()
    }

    /// Build from optional TOML text and a variable lookup, without touching
    /// the process environment.
    pub fn from_sources<F>(toml: Option<&str>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = match toml {
            Some(contents) => RawSettings::from_toml_str(contents)?,
            None => RawSettings::default(),
        };
        raw.overlay(lookup)?.validate()
    }
}
