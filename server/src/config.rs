//! Environment-driven configuration.

use std::time::Duration;

/// Network settings for the HTTP listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full service configuration, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct GatherlyConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// How long handlers wait for a command outcome.
    pub command_timeout: Duration,
    /// Grace period for store shutdown.
    pub shutdown_timeout: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "Unparseable env var, using default");
            default
        }),
        Err(_) => default,
    }
}

impl GatherlyConfig {
    /// Read configuration from `GATHERLY_*` env vars, falling back to
    /// defaults suitable for local development.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("GATHERLY_HOST", String::from("0.0.0.0")),
                port: env_or("GATHERLY_PORT", 3000),
            },
            command_timeout: Duration::from_secs(env_or("GATHERLY_COMMAND_TIMEOUT_SECS", 10)),
            shutdown_timeout: Duration::from_secs(env_or("GATHERLY_SHUTDOWN_TIMEOUT_SECS", 30)),
        }
    }
}

impl Default for GatherlyConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
