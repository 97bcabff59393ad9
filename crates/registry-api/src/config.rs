//! Server configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use registry_core::correlation::DEFAULT_RESULT_CHANNEL_PREFIX;
use uuid::Uuid;

use crate::error::AppError;

/// Registry served when `REGISTRY_ID` is not set.
pub const DEFAULT_REGISTRY_ID: Uuid = Uuid::from_u128(0x5f0c_8a2e_4b1d_4c3a_9e6f_2d7b_1a0c_3e41);

/// Runtime configuration for the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Upper bound of the connection pool.
    pub database_max_connections: u32,
    /// The registry aggregate this server manages.
    pub registry_id: Uuid,
    /// How long a result stream waits in silence before completing.
    pub quiet_timeout: Duration,
    /// Redeliveries of a failed command before it is dead-lettered.
    pub max_redeliveries: u32,
    /// Prefix of every per-correlation result channel.
    pub result_channel_prefix: String,
    /// OTLP collector endpoint; trace export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a value
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DATABASE_URL environment variable must be set".to_owned())
            })?;
        let timeout_ms: u64 = parse_or(&lookup, "PRODUCT_REGISTRY_COMMAND_TIMEOUT_MS", 10_000)?;
        if timeout_ms == 0 {
            return Err(AppError::Config(
                "PRODUCT_REGISTRY_COMMAND_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000)?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            registry_id: parse_or(&lookup, "REGISTRY_ID", DEFAULT_REGISTRY_ID)?,
            quiet_timeout: Duration::from_millis(timeout_ms),
            max_redeliveries: parse_or(&lookup, "COMMAND_MAX_REDELIVERIES", 3)?,
            result_channel_prefix: lookup("RESULT_CHANNEL_PREFIX")
                .unwrap_or_else(|| DEFAULT_RESULT_CHANNEL_PREFIX.to_owned()),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|endpoint| !endpoint.trim().is_empty()),
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host:port` is not a socket address.
    pub fn bind_address(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}
