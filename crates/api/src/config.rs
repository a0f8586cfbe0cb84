//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use saga::{DEFAULT_SESSION_TTL, DEFAULT_SIMILARITY_THRESHOLD, WorkflowSettings};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT` (default `0.0.0.0:3000`)
/// - `RUST_LOG` tracing filter (default `info`)
/// - `DATABASE_URL` PostgreSQL connection string; in-memory storage when unset
/// - `MEDIA_ROOT` directory for stored images (default `./media`)
/// - `SIMILARITY_THRESHOLD` minimum score for a similarity binding (default `80`)
/// - `SIMILARITY_SCAN_ON_INGEST` also scan during garment upload (default `false`)
/// - `SESSION_TTL_SECS` session lifetime (default one day)
/// - `REQUEST_TIMEOUT_SECS` deadline for external calls of one request (default `2`)
/// - `CUTTER_URL`, `CLASSIFIER_URL`, `SIMILARITY_URL` inference services;
///   in-process stand-ins are used for any that is unset
/// - `INFERENCE_TIMEOUT_SECS` HTTP timeout of inference calls (default `10`)
/// - `MAX_UPLOAD_BYTES` upload cap (default 20 MiB)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub media_root: PathBuf,
    pub similarity_threshold: i32,
    pub scan_on_ingest: bool,
    pub session_ttl: Duration,
    pub request_timeout: Duration,
    pub cutter_url: Option<String>,
    pub classifier_url: Option<String>,
    pub similarity_url: Option<String>,
    pub inference_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: optional("DATABASE_URL"),
            media_root: std::env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            similarity_threshold: parsed("SIMILARITY_THRESHOLD")
                .unwrap_or(defaults.similarity_threshold),
            scan_on_ingest: parsed("SIMILARITY_SCAN_ON_INGEST").unwrap_or(defaults.scan_on_ingest),
            session_ttl: parsed("SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            request_timeout: parsed("REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            cutter_url: optional("CUTTER_URL"),
            classifier_url: optional("CLASSIFIER_URL"),
            similarity_url: optional("SIMILARITY_URL"),
            inference_timeout: parsed("INFERENCE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.inference_timeout),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The tunables handed to the workflow layer.
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            similarity_threshold: self.similarity_threshold,
            scan_on_ingest: self.scan_on_ingest,
            session_ttl: self.session_ttl,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let settings = WorkflowSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            media_root: PathBuf::from("./media"),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            scan_on_ingest: false,
            session_ttl: DEFAULT_SESSION_TTL,
            request_timeout: Duration::from_secs(2),
            cutter_url: None,
            classifier_url: None,
            similarity_url: None,
            inference_timeout: Duration::from_secs(10),
            max_upload_bytes: settings.max_upload_bytes,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.similarity_threshold, 80);
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_workflow_settings_follow_config() {
        let config = Config {
            similarity_threshold: 70,
            scan_on_ingest: true,
            ..Config::default()
        };
        let settings = config.workflow_settings();
        assert_eq!(settings.similarity_threshold, 70);
        assert!(settings.scan_on_ingest);
        assert_eq!(settings.session_ttl, config.session_ttl);
    }
}
