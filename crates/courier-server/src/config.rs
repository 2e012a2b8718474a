//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use courier_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_OUTBOUND_BUFFER, DEFAULT_WS_PING_INTERVAL_SECS,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None`, meaning `courier.db` in the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Capacity of each live connection's outbound queue. A connection that
    /// falls this far behind is dropped.
    /// Env: `OUTBOUND_BUFFER`
    /// Default: `64`
    pub outbound_buffer: usize,

    /// Interval between WebSocket pings.
    /// Env: `WS_PING_INTERVAL_SECS`
    /// Default: `30`
    pub ws_ping_interval: Duration,

    /// Allowed CORS origins. Empty means any origin.
    /// Env: `CORS_ALLOW_ORIGINS` (comma separated, or `*`)
    /// Default: any
    pub cors_allow_origins: Vec<String>,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Courier"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            ws_ping_interval: Duration::from_secs(DEFAULT_WS_PING_INTERVAL_SECS),
            cors_allow_origins: Vec::new(),
            instance_name: "Courier".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values
    /// are logged and the default is kept.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.trim().is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("OUTBOUND_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.outbound_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid OUTBOUND_BUFFER, using default"),
            }
        }

        if let Some(val) = lookup("WS_PING_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.ws_ping_interval = Duration::from_secs(n),
                _ => tracing::warn!(value = %val, "Invalid WS_PING_INTERVAL_SECS, using default"),
            }
        }

        if let Some(val) = lookup("CORS_ALLOW_ORIGINS") {
            config.cors_allow_origins = parse_origins(&val);
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Split a comma-separated origin list. `*` anywhere means "any origin",
/// represented by an empty list.
fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|o| o == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.ws_ping_interval, Duration::from_secs(30));
        assert!(config.database_path.is_none());
        assert!(config.cors_allow_origins.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/chat.db"),
            ("OUTBOUND_BUFFER", "8"),
            ("WS_PING_INTERVAL_SECS", "5"),
            ("CORS_ALLOW_ORIGINS", "http://a.test, http://b.test"),
            ("INSTANCE_NAME", "staging"),
        ]);

        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/chat.db")));
        assert_eq!(config.outbound_buffer, 8);
        assert_eq!(config.ws_ping_interval, Duration::from_secs(5));
        assert_eq!(
            config.cors_allow_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(config.instance_name, "staging");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("HTTP_ADDR", "not an addr"),
            ("OUTBOUND_BUFFER", "0"),
            ("WS_PING_INTERVAL_SECS", "soon"),
        ]);

        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.ws_ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_wildcard_origin_means_any() {
        assert!(parse_origins("*").is_empty());
        assert!(parse_origins("http://a.test,*").is_empty());
        assert_eq!(parse_origins(" , http://a.test "), vec!["http://a.test"]);
    }
}
