//! Runtime configuration
//!
//! [`MockConfig`] is built either from CLI arguments (see
//! [`crate::cli::args::ServeArgs`]) or, for in-process use by a test
//! harness, from `MOCKGATE_*` environment variables via
//! [`MockConfig::from_env`].

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::ConfigError;

/// Environment variable gating the whole mock layer.
pub const ENV_TEST_ENV: &str = "MOCKGATE_TEST_ENV";
/// Environment variable for the listener address.
pub const ENV_BIND: &str = "MOCKGATE_BIND";
/// Environment variable for the unhandled-request policy.
pub const ENV_UNHANDLED: &str = "MOCKGATE_UNHANDLED";
/// Environment variable enabling strict scenario lookup.
pub const ENV_STRICT_SCENARIOS: &str = "MOCKGATE_STRICT_SCENARIOS";
/// Environment variable naming an extra fixture directory.
pub const ENV_FIXTURES: &str = "MOCKGATE_FIXTURES";
/// Environment variable for the Prometheus exporter port.
pub const ENV_METRICS_PORT: &str = "MOCKGATE_METRICS_PORT";

/// Default listener address.
pub const DEFAULT_BIND: &str = "127.0.0.1:5500";

/// What the mock server does with a request no rule matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledPolicy {
    /// Answer 500 with a diagnostic body and log at error level
    #[default]
    Error,
    /// Answer 404 and log at warn level
    Warn,
}

impl UnhandledPolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        <Self as ValueEnum>::from_str(value.trim(), true).map_err(|_| {
            let names: Vec<String> = Self::value_variants()
                .iter()
                .filter_map(ValueEnum::to_possible_value)
                .map(|v| format!("'{}'", v.get_name()))
                .collect();
            ConfigError::InvalidValue {
                field: ENV_UNHANDLED.to_string(),
                value: value.to_string(),
                expected: names.join(" or "),
            }
        })
    }
}

/// Mock layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConfig {
    /// Listener address (`host:port`)
    pub bind_addr: String,
    /// Environment gate; when false the server is inert
    pub test_env: bool,
    /// Unhandled-request policy
    pub unhandled: UnhandledPolicy,
    /// Fail dispatch for unknown scenario ids instead of falling back to
    /// defaults
    pub strict_scenarios: bool,
    /// Directory of fixtures layered over the embedded set
    pub fixtures_dir: Option<PathBuf>,
    /// Port for the Prometheus exporter, if any
    pub metrics_port: Option<u16>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            test_env: false,
            unhandled: UnhandledPolicy::Error,
            strict_scenarios: false,
            fixtures_dir: None,
            metrics_port: None,
        }
    }
}

impl MockConfig {
    /// Config for an in-process test server on an ephemeral loopback port.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            test_env: true,
            ..Self::default()
        }
    }

    /// Reads configuration from `MOCKGATE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bind) = lookup(ENV_BIND) {
            config.bind_addr = parse_bind_addr(&bind)?;
        }
        if let Some(v) = lookup(ENV_TEST_ENV) {
            config.test_env = parse_bool(ENV_TEST_ENV, &v)?;
        }
        if let Some(v) = lookup(ENV_UNHANDLED) {
            config.unhandled = UnhandledPolicy::parse(&v)?;
        }
        if let Some(v) = lookup(ENV_STRICT_SCENARIOS) {
            config.strict_scenarios = parse_bool(ENV_STRICT_SCENARIOS, &v)?;
        }
        config.fixtures_dir = lookup(ENV_FIXTURES)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        if let Some(v) = lookup(ENV_METRICS_PORT) {
            config.metrics_port =
                Some(v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: ENV_METRICS_PORT.to_string(),
                    value: v.clone(),
                    expected: "a port number".to_string(),
                })?);
        }

        Ok(config)
    }
}

/// Parses a boolean environment value.
///
/// Accepts `1/0`, `true/false`, `yes/no` and `on/off` (case-insensitive).
/// An empty value is false.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for anything else.
pub fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "a boolean (true/false, 1/0, yes/no, on/off)".to_string(),
        }),
    }
}

/// Normalizes a bind address.
///
/// Accepts `:port` and bare `port` (bound on all interfaces) as well as a
/// full `host:port`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBindAddr`] if the result is not a socket
/// address.
pub fn parse_bind_addr(input: &str) -> Result<String, ConfigError> {
    let addr = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else if input.parse::<u16>().is_ok() {
        format!("0.0.0.0:{input}")
    } else {
        input.to_string()
    };
    addr.parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidBindAddr {
            input: input.to_string(),
            message: e.to_string(),
        })?;
    Ok(addr)
}
