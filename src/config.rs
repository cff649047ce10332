//! # config — read configuration from environment variables
//!
//! `.env` is loaded by `main` before [`AppConfig::from_env`] runs, so every
//! value below can come from either the real environment or the file.
//!
//! | Variable                          | Default                                   |
//! |-----------------------------------|-------------------------------------------|
//! | `CRYPTO_IDS`                      | `bitcoin,ethereum,cardano,solana,polkadot`|
//! | `MONITORING_INTERVAL_SECONDS`     | `30` (min 5)                              |
//! | `PRICE_CHANGE_THRESHOLD_PERCENT`  | `1.0` (min 0.1)                           |
//! | `STATISTICS_BUFFER_SIZE`          | `100` (min 10)                            |
//! | `SUBSCRIBER_TIMEOUT_MS`           | `2000` (min 1)                            |
//! | `COINGECKO_API_URL`               | `https://api.coingecko.com/api/v3`        |
//! | `API_PREFIX`                      | `/api`                                    |
//! | `BIND_ADDR`                       | `0.0.0.0:8000`                            |
//! | `LOG_FORMAT`                      | `pretty` (or `json`)                      |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MIN_THRESHOLD_PERCENT: f64 = 0.1;
pub const MIN_BUFFER_SIZE: usize = 10;

const DEFAULT_CRYPTO_IDS: &str = "bitcoin,ethereum,cardano,solana,polkadot";
const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} is not valid: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be at least {min}, got {value}")]
    BelowFloor { key: &'static str, min: String, value: String },

    #[error("no instruments configured")]
    NoInstruments,
}

// ─── Monitor Config ───────────────────────────────────────────────────────────

/// Options the Monitor Engine runs with. Every constructor enforces the
/// floors, so an engine can never be built with a sub-minimum interval,
/// threshold or buffer.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Tracked instrument ids, order preserved, duplicates removed.
    pub instrument_ids: Vec<String>,
    pub interval: Duration,
    pub threshold_percent: f64,
    pub buffer_size: usize,
    /// Upper bound on a single subscriber's delivery before it is abandoned.
    pub delivery_timeout: Duration,
}

impl MonitorConfig {
    pub fn new<I, S>(
        instrument_ids: I,
        interval: Duration,
        threshold_percent: f64,
        buffer_size: usize,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = Vec::new();
        for id in instrument_ids {
            let id = id.into().trim().to_string();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(ConfigError::NoInstruments);
        }

        if interval < Duration::from_secs(MIN_INTERVAL_SECS) {
            return Err(ConfigError::BelowFloor {
                key:   "MONITORING_INTERVAL_SECONDS",
                min:   MIN_INTERVAL_SECS.to_string(),
                value: interval.as_secs_f64().to_string(),
            });
        }
        if !threshold_percent.is_finite() || threshold_percent < MIN_THRESHOLD_PERCENT {
            return Err(ConfigError::BelowFloor {
                key:   "PRICE_CHANGE_THRESHOLD_PERCENT",
                min:   MIN_THRESHOLD_PERCENT.to_string(),
                value: threshold_percent.to_string(),
            });
        }
        if buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigError::BelowFloor {
                key:   "STATISTICS_BUFFER_SIZE",
                min:   MIN_BUFFER_SIZE.to_string(),
                value: buffer_size.to_string(),
            });
        }

        Ok(Self {
            instrument_ids: ids,
            interval,
            threshold_percent,
            buffer_size,
            delivery_timeout: Duration::from_millis(2_000),
        })
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}

// ─── App Config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub monitor:       MonitorConfig,
    pub coingecko_url: String,
    pub api_prefix:    String,
    pub bind_addr:     SocketAddr,
    pub json_logs:     bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ids = lookup("CRYPTO_IDS").unwrap_or_else(|| DEFAULT_CRYPTO_IDS.to_string());
        let interval_secs: u64 = parse_or(&lookup, "MONITORING_INTERVAL_SECONDS", 30)?;
        let threshold: f64 = parse_or(&lookup, "PRICE_CHANGE_THRESHOLD_PERCENT", 1.0)?;
        let buffer_size: usize = parse_or(&lookup, "STATISTICS_BUFFER_SIZE", 100)?;
        let timeout_ms: u64 = parse_or(&lookup, "SUBSCRIBER_TIMEOUT_MS", 2_000)?;
        if timeout_ms == 0 {
            return Err(ConfigError::BelowFloor {
                key:   "SUBSCRIBER_TIMEOUT_MS",
                min:   "1".into(),
                value: "0".into(),
            });
        }

        let monitor = MonitorConfig::new(
            ids.split(','),
            Duration::from_secs(interval_secs),
            threshold,
            buffer_size,
        )?
        .with_delivery_timeout(Duration::from_millis(timeout_ms));

        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let mut api_prefix = lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string());
        if !api_prefix.starts_with('/') {
            api_prefix.insert(0, '/');
        }
        let api_prefix = api_prefix.trim_end_matches('/').to_string();

        Ok(Self {
            monitor,
            coingecko_url: lookup("COINGECKO_API_URL")
                .unwrap_or_else(|| DEFAULT_COINGECKO_URL.to_string()),
            api_prefix,
            bind_addr,
            json_logs: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
