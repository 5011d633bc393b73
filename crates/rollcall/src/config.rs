//! Server configuration read from the environment.
//!
//! A `.env` file in the working directory is loaded first when present,
//! then these keys are read:
//!
//! | Key | Default |
//! |-----|---------|
//! | `ROLLCALL_BIND_ADDR` | `127.0.0.1:8080` |
//! | `ROLLCALL_JWT_SECRET` | required |
//! | `ROLLCALL_STORE_TIMEOUT_MS` | `5000` |
//! | `ROLLCALL_IDLE_TIMEOUT_SECS` | unset (no idle timeout) |
//! | `ROLLCALL_HANDSHAKE_TIMEOUT_MS` | `10000` |

use std::time::Duration;

use rollcall_hub::HubConfig;

pub const BIND_ADDR_KEY: &str = "ROLLCALL_BIND_ADDR";
pub const JWT_SECRET_KEY: &str = "ROLLCALL_JWT_SECRET";
pub const STORE_TIMEOUT_KEY: &str = "ROLLCALL_STORE_TIMEOUT_MS";
pub const IDLE_TIMEOUT_KEY: &str = "ROLLCALL_IDLE_TIMEOUT_SECS";
pub const HANDSHAKE_TIMEOUT_KEY: &str = "ROLLCALL_HANDSHAKE_TIMEOUT_MS";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
pub(crate) const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required configuration missing: {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Shared HS256 secret for access tokens.
    pub jwt_secret: String,
    pub store_timeout: Duration,
    /// Close connections that send nothing for this long.
    pub idle_timeout: Option<Duration>,
    /// Drop peers that have not finished the WebSocket upgrade by then.
    pub handshake_timeout: Duration,
}

impl ServerConfig {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    /// [`ConfigError::Missing`] without a JWT secret;
    /// [`ConfigError::Invalid`] for unparsable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = lookup(BIND_ADDR_KEY)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let jwt_secret = lookup(JWT_SECRET_KEY)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(JWT_SECRET_KEY))?;

        let store_timeout = match lookup(STORE_TIMEOUT_KEY) {
            Some(raw) => {
                let ms = parse_positive(STORE_TIMEOUT_KEY, &raw)?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        };

        let idle_timeout = lookup(IDLE_TIMEOUT_KEY)
            .map(|raw| parse_positive(IDLE_TIMEOUT_KEY, &raw))
            .transpose()?
            .map(Duration::from_secs);

        let handshake_timeout = lookup(HANDSHAKE_TIMEOUT_KEY)
            .map(|raw| parse_positive(HANDSHAKE_TIMEOUT_KEY, &raw))
            .transpose()?
            .map_or(DEFAULT_HANDSHAKE_TIMEOUT, Duration::from_millis);

        Ok(Self {
            bind_addr,
            jwt_secret,
            store_timeout,
            idle_timeout,
            handshake_timeout,
        })
    }

    /// Hub settings derived from this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            store_timeout: self.store_timeout,
            ..HubConfig::default()
        }
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(&e.to_string()))?;
    if value == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(value)
}
