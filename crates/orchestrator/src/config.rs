//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{RetryPolicy, SagaSettings};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `5000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `MS_CATALOGO_URL`, `MS_COMPRAS_URL`, `MS_PAGOS_URL`, `MS_INVENTARIO_URL`:
///   backend base URLs (default: `http://localhost:5001` to `:5004`);
///   `CATALOG_URL`, `PURCHASES_URL`, `PAYMENTS_URL` and `INVENTORY_URL` are
///   accepted as aliases when the primary name is unset
/// - `MAX_RETRIES`: attempts for retried steps (default: `3`)
/// - `RETRY_BASE_DELAY`: backoff base in seconds (default: `1`)
/// - `STEP_DELAY`: pause between steps in seconds (default: `2`)
/// - `CALL_TIMEOUT`: per-call timeout in seconds (default: `5`)
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub catalog_url: String,
    pub purchases_url: String,
    pub payments_url: String,
    pub inventory_url: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub step_delay: Duration,
    pub call_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let url = |key: &str, alias: &str, default: String| {
            lookup(key).or_else(|| lookup(alias)).unwrap_or(default)
        };

        Self {
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            max_retries: lookup("MAX_RETRIES")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: seconds(lookup("RETRY_BASE_DELAY"))
                .unwrap_or(defaults.retry_base_delay),
            step_delay: seconds(lookup("STEP_DELAY")).unwrap_or(defaults.step_delay),
            call_timeout: seconds(lookup("CALL_TIMEOUT")).unwrap_or(defaults.call_timeout),
            host: string("HOST", defaults.host),
            log_level: string("RUST_LOG", defaults.log_level),
            catalog_url: url("MS_CATALOGO_URL", "CATALOG_URL", defaults.catalog_url),
            purchases_url: url("MS_COMPRAS_URL", "PURCHASES_URL", defaults.purchases_url),
            payments_url: url("MS_PAGOS_URL", "PAYMENTS_URL", defaults.payments_url),
            inventory_url: url("MS_INVENTARIO_URL", "INVENTORY_URL", defaults.inventory_url),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retry and pacing settings for the saga orchestrator.
    pub fn saga_settings(&self) -> SagaSettings {
        SagaSettings {
            retry: RetryPolicy::new(self.max_retries, self.retry_base_delay),
            step_delay: self.step_delay,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
            catalog_url: "http://localhost:5001".to_string(),
            purchases_url: "http://localhost:5002".to_string(),
            payments_url: "http://localhost:5003".to_string(),
            inventory_url: "http://localhost:5004".to_string(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            step_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Parses a non-negative decimal number of seconds.
fn seconds(value: Option<String>) -> Option<Duration> {
    let secs: f64 = value?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
