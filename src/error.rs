//! Error types for `mockgate`
//!
//! One enum per concern, aggregated into [`MockGateError`] which maps every
//! failure to a process exit code for the CLI.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `mockgate` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (bad bind address, bad environment value)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Mock server error (bind failure)
    pub const SERVER_ERROR: i32 = 4;

    /// Scenario registry error (duplicate scenario ids)
    pub const REGISTRY_ERROR: i32 = 5;

    /// Scenario dispatch error (unknown scenario in strict mode, factory failure)
    pub const DISPATCH_ERROR: i32 = 6;

    /// Fixture store error (missing or malformed fixture)
    pub const FIXTURE_ERROR: i32 = 7;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `mockgate` operations.
#[derive(Debug, Error)]
pub enum MockGateError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Mock server lifecycle error
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Scenario registry construction error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Scenario dispatch error
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Fixture store error
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MockGateError {
    /// Returns the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Server(_) => ExitCode::SERVER_ERROR,
            Self::Registry(_) => ExitCode::REGISTRY_ERROR,
            Self::Dispatch(_) => ExitCode::DISPATCH_ERROR,
            Self::Fixture(_) => ExitCode::FIXTURE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration errors raised while building a [`MockConfig`](crate::config::MockConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Bind address could not be parsed as a socket address
    #[error("invalid bind address \"{input}\": {message}")]
    InvalidBindAddr {
        /// The address as given by the user
        input: String,
        /// Parser message
        message: String,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field (or environment variable)
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Server Errors
// ============================================================================

/// Mock server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind; raised by `create`, never deferred
    #[error("failed to bind mock server on {addr}: {source}")]
    Bind {
        /// Address we tried to bind
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The bound listener could not report its local address
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors raised while merging scenario modules into a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The same scenario id is registered twice
    #[error("duplicate scenario id '{id}' registered by module '{first}' and module '{second}'")]
    DuplicateScenario {
        /// The colliding scenario id
        id: String,
        /// Module that registered it first
        first: String,
        /// Module that attempted to register it again
        second: String,
    },

    /// A module registered an empty scenario id
    #[error("module '{module}' registers an empty scenario id")]
    EmptyId {
        /// Offending module
        module: String,
    },
}

// ============================================================================
// Dispatch Errors
// ============================================================================

/// Errors raised by the scenario dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The navigation URL could not be parsed
    #[error("invalid navigation URL \"{url}\": {source}")]
    InvalidUrl {
        /// URL as received
        url: String,
        /// Parser error
        #[source]
        source: url::ParseError,
    },

    /// No factory is registered for the scenario (strict mode only)
    #[error("unknown scenario '{id}'{}", suggestion_hint(.suggestion.as_deref()))]
    UnknownScenario {
        /// Requested scenario id
        id: String,
        /// Closest registered id, if any is close enough
        suggestion: Option<String>,
    },

    /// The default rule set could not be built
    #[error("failed to install default rules: {0}")]
    Defaults(#[from] FixtureError),

    /// The scenario factory failed while building its rules
    #[error("scenario '{id}' failed to build its rules: {source}")]
    Factory {
        /// Scenario whose factory failed
        id: String,
        /// Factory error
        #[source]
        source: ScenarioError,
    },
}

fn suggestion_hint(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}

// ============================================================================
// Scenario Errors
// ============================================================================

/// Errors raised by handler factories while building intercept rules.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// A required scenario argument was not supplied
    #[error("missing scenario argument #{index} ({name})")]
    MissingArgument {
        /// 0-based position in the `args` list
        index: usize,
        /// What the argument means
        name: &'static str,
    },

    /// A scenario argument has an unusable value
    #[error("invalid scenario argument '{value}': {reason}")]
    InvalidArgument {
        /// The argument value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A fixture the scenario depends on is missing or malformed
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    /// A URL pattern could not be compiled
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

// ============================================================================
// Fixture Errors
// ============================================================================

/// Fixture store errors.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// No fixture with this name exists
    #[error("fixture not found: {name}{}", suggestion_hint(.suggestion.as_deref()))]
    NotFound {
        /// Requested fixture name
        name: String,
        /// Closest known fixture name
        suggestion: Option<String>,
    },

    /// Fixture file could not be read
    #[error("failed to read fixture {path}: {source}")]
    Read {
        /// Path of the fixture file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Fixture file is not valid JSON
    #[error("invalid JSON in fixture {path}: {source}")]
    Parse {
        /// Path of the fixture file (or embedded name)
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// Fixture directory glob was invalid
    #[error("invalid fixture directory pattern: {0}")]
    Glob(#[from] glob::PatternError),
}

// ============================================================================
// Pattern Errors
// ============================================================================

/// URL pattern compilation errors.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Invalid glob pattern
    #[error("invalid glob pattern \"{pattern}\": {source}")]
    Glob {
        /// Pattern text
        pattern: String,
        /// Glob error
        #[source]
        source: glob::PatternError,
    },

    /// Invalid regular expression
    #[error("invalid regex pattern \"{pattern}\": {source}")]
    Regex {
        /// Pattern text
        pattern: String,
        /// Regex error
        #[source]
        source: regex::Error,
    },
}

// ============================================================================
// Responder Errors
// ============================================================================

/// Errors raised by a responder while answering an intercepted request.
///
/// Every variant is answered with a 500 and recorded in the server's
/// failure journal.
#[derive(Debug, Error)]
pub enum RespondError {
    /// The request body did not match the endpoint's schema
    #[error("request body rejected: {message}")]
    InvalidBody {
        /// Deserializer message
        message: String,
    },

    /// A path parameter the responder depends on was not captured
    #[error("missing path parameter '{0}'")]
    MissingParam(String),

    /// Any other responder failure
    #[error("responder failed: {0}")]
    Failed(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `mockgate` operations.
pub type Result<T> = std::result::Result<T, MockGateError>;

// ============================================================================
// Tests
// ============================================================================
