//! Environment-driven server configuration.
//!
//! All knobs are read once at startup. `STORAGE_ROOT` and `JWT_SECRET`
//! are required; everything else has a default.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STORAGE_ROOT` | *(required)* | Root directory for bucket storage |
//! | `LISTEN_ADDR` | `0.0.0.0:8080` | Bind address |
//! | `JWT_SECRET` | *(required)* | HMAC secret for admin bearer tokens |
//! | `DEFAULT_ADMIN_USERNAME` | `admin` | Bootstrap admin user name |
//! | `DEFAULT_ADMIN_PASSWORD` | *(unset)* | Bootstrap admin password |
//! | `REGION` | `us-east-1` | Region reported and accepted in SigV4 scopes |
//! | `REQUEST_TIMEOUT_SECS` | `600` | Per-request wall-clock deadline |
//! | `LOG_LEVEL` | `info` | Log filter when `RUST_LOG` is unset |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default bind address.
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default region used in SigV4 credential scopes.
const DEFAULT_REGION: &str = "us-east-1";

/// Default per-request deadline in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root directory under which all bucket data lives.
    pub storage_root: PathBuf,
    /// `host:port` the server binds to.
    pub listen_addr: String,
    /// Secret used to sign and verify admin bearer tokens.
    pub jwt_secret: String,
    /// Username for the bootstrap admin account.
    pub default_admin_username: String,
    /// Password for the bootstrap admin account, if provided.
    pub default_admin_password: Option<String>,
    /// Region accepted in SigV4 credential scopes.
    pub region: String,
    /// Wall-clock deadline applied to each request, body transfer included.
    pub request_timeout: Duration,
    /// Log level filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if `STORAGE_ROOT` or
    /// `JWT_SECRET` is unset, or [`ConfigError::InvalidVar`] for
    /// unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_root = required("STORAGE_ROOT")?;
        let jwt_secret = required("JWT_SECRET")?;

        let timeout_secs = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidVar {
                    var: "REQUEST_TIMEOUT_SECS",
                    value: raw,
                })?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            storage_root: PathBuf::from(storage_root),
            listen_addr: optional("LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            jwt_secret,
            default_admin_username: optional("DEFAULT_ADMIN_USERNAME", "admin"),
            default_admin_password: std::env::var("DEFAULT_ADMIN_PASSWORD").ok(),
            region: optional("REGION", DEFAULT_REGION),
            request_timeout: Duration::from_secs(timeout_secs),
            log_level: optional("LOG_LEVEL", "info"),
        })
    }
}

/// Read a required environment variable.
fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Read an optional environment variable with a default.
fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}
