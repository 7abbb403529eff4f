//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use domain::Money;
use engine::{CheckoutSettings, ShippingFeeTable};
use thiserror::Error;

/// A variable was set to something that cannot be used.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `RESERVATION_TTL_SECS`: how long checkout holds stock (default 900)
/// - `ID_CACHE_TTL_SECS`: fingerprint index lifetime (default 300)
/// - `FREE_SHIPPING_THRESHOLD_CENTS`: subtotal that ships free
/// - `SHIPPING_FEES`: JSON object of location to fee in cents
/// - `PAYMENT_WEBHOOK_SECRET`: key for webhook signatures
/// - `REAPER_INTERVAL_SECS`: reaper period, `0` disables (default 60)
/// - `REAPER_BATCH_LIMIT`: orders per reaper pass (default 100)
/// - `CATALOG_SEED_PATH`: products loaded at start-up
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub reservation_ttl_secs: i64,
    pub id_cache_ttl: Duration,
    pub free_shipping_threshold: Option<Money>,
    pub shipping_fees: ShippingFeeTable,
    pub webhook_secret: String,
    pub reaper_interval: Duration,
    pub reaper_batch_limit: usize,
    pub catalog_seed_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`; unset or blank values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let log_format = match var("LOG_FORMAT") {
            None => defaults.log_format,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(v) => {
                return Err(ConfigError {
                    name: "LOG_FORMAT",
                    value: v,
                    reason: "expected pretty or json".to_string(),
                });
            }
        };

        let shipping_fees = match var("SHIPPING_FEES") {
            None => defaults.shipping_fees,
            Some(v) => serde_json::from_str(&v).map_err(|e| ConfigError {
                name: "SHIPPING_FEES",
                reason: e.to_string(),
                value: v,
            })?,
        };

        let reservation_ttl_secs = match parsed::<i64>(&var, "RESERVATION_TTL_SECS")? {
            None => defaults.reservation_ttl_secs,
            Some(secs) if secs > 0 => secs,
            Some(secs) => {
                return Err(ConfigError {
                    name: "RESERVATION_TTL_SECS",
                    value: secs.to_string(),
                    reason: "must be a positive number of seconds".to_string(),
                });
            }
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed(&var, "PORT")?.unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: var("DATABASE_URL"),
            reservation_ttl_secs,
            id_cache_ttl: parsed(&var, "ID_CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.id_cache_ttl),
            free_shipping_threshold: parsed(&var, "FREE_SHIPPING_THRESHOLD_CENTS")?
                .map(Money::from_cents),
            shipping_fees,
            webhook_secret: var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            reaper_interval: parsed(&var, "REAPER_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            reaper_batch_limit: parsed(&var, "REAPER_BATCH_LIMIT")?
                .unwrap_or(defaults.reaper_batch_limit),
            catalog_seed_path: var("CATALOG_SEED_PATH").map(PathBuf::from),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checkout settings derived from this configuration.
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            reservation_ttl: chrono::Duration::seconds(self.reservation_ttl_secs),
            free_shipping_threshold: self.free_shipping_threshold,
            shipping_fees: self.shipping_fees.clone(),
        }
    }
}

fn parsed<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|v| {
            v.trim().parse().map_err(|e: T::Err| ConfigError {
                name,
                reason: e.to_string(),
                value: v,
            })
        })
        .transpose()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            reservation_ttl_secs: engine::checkout::DEFAULT_RESERVATION_TTL_SECS,
            id_cache_ttl: engine::cache::DEFAULT_INDEX_TTL,
            free_shipping_threshold: None,
            shipping_fees: ShippingFeeTable::default(),
            webhook_secret: String::new(),
            reaper_interval: Duration::from_secs(60),
            reaper_batch_limit: 100,
            catalog_seed_path: None,
        }
    }
}
