//! Configuration types for the alerts-manager crate
//!
//! [`ManagerConfig`] describes where the remote alert service lives and which
//! transport reaches it. Adapters read it to build their endpoint; the manager
//! itself only uses the reconnect policy.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use alerts_common::{BackoffPolicy, DEFAULT_BACKOFF_BASE};

use crate::error::{AlertError, Result};

/// Transport used to reach the alert service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Request/response polling
    Rest,
    /// Persistent socket with server push
    #[default]
    Socket,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Rest => "rest",
            TransportMode::Socket => "socket",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = AlertError;

    /// `"rest"` selects REST; any other mode name selects the socket transport
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err(AlertError::Configuration("Empty transport mode".to_string())),
            "rest" => Ok(TransportMode::Rest),
            _ => Ok(TransportMode::Socket),
        }
    }
}

/// Configuration for the AlertManager and its adapter
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Host name of the alert service
    /// Default: "localhost"
    pub host: String,

    /// Port of the alert service
    /// Default: None (443 when secure, 80 otherwise)
    pub port: Option<u16>,

    /// Use TLS
    /// Default: true
    pub secure: bool,

    /// Transport the adapter should use
    /// Default: Socket
    pub mode: TransportMode,

    /// Retry policy for `connect_with_retry`
    /// Default: 1 second base, unlimited attempts
    pub reconnect: BackoffPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            secure: true,
            mode: TransportMode::default(),
            reconnect: BackoffPolicy::unlimited(DEFAULT_BACKOFF_BASE),
        }
    }
}

impl ManagerConfig {
    /// Create a new ManagerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain-text REST on a local development server
    pub fn local_rest(port: u16) -> Self {
        Self {
            port: Some(port),
            secure: false,
            mode: TransportMode::Rest,
            ..Default::default()
        }
    }

    /// Defaults overridden by `ALERTS_HOST`, `ALERTS_PORT`, `ALERTS_SECURE`
    /// and `ALERTS_MODE` when set
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = read_env("ALERTS_HOST") {
            config.host = host;
        }

        if let Some(port) = read_env("ALERTS_PORT") {
            let port = port.parse::<u16>().map_err(|e| {
                AlertError::Configuration(format!("Invalid ALERTS_PORT '{port}': {e}"))
            })?;
            config.port = Some(port);
        }

        if let Some(secure) = read_env("ALERTS_SECURE") {
            config.secure = parse_flag(&secure).ok_or_else(|| {
                AlertError::Configuration(format!("Invalid ALERTS_SECURE '{secure}'"))
            })?;
        }

        if let Some(mode) = read_env("ALERTS_MODE") {
            config.mode = mode.parse()?;
        }

        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AlertError::Configuration(
                "Host must not be empty".to_string(),
            ));
        }

        if self.port == Some(0) {
            return Err(AlertError::Configuration(
                "Port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured port, or the scheme default
    pub fn effective_port(&self) -> u16 {
        self.port
            .unwrap_or(if self.secure { 443 } else { 80 })
    }

    /// Endpoint for the configured transport
    pub fn base_url(&self) -> Result<Url> {
        self.validate()?;

        let scheme = match (self.mode, self.secure) {
            (TransportMode::Rest, true) => "https",
            (TransportMode::Rest, false) => "http",
            (TransportMode::Socket, true) => "wss",
            (TransportMode::Socket, false) => "ws",
        };

        let raw = format!("{}://{}:{}", scheme, self.host, self.effective_port());
        Url::parse(&raw)
            .map_err(|e| AlertError::Configuration(format!("Invalid endpoint '{raw}': {e}")))
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reconnect(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.reconnect = BackoffPolicy::new(base_delay, max_attempts);
        self
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
