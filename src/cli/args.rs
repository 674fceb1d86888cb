//! CLI argument definitions
//!
//! All Clap derive structs for `mockgate` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_BIND, MockConfig, UnhandledPolicy, parse_bind_addr};
use crate::error::ConfigError;
use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Scenario-routed HTTP mock server for browser-driven end-to-end tests.
#[derive(Parser, Debug)]
#[command(name = "mockgate", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "MOCKGATE_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(
        long,
        value_enum,
        default_value = "human",
        global = true,
        env = "MOCKGATE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the mock server and wait for scenario navigations.
    Serve(ServeArgs),

    /// Inspect the scenario catalogue.
    Scenarios(ScenariosCommand),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Serve Command
// ============================================================================

/// Arguments for `mockgate serve`.
///
/// Starting the binary is the opt-in, so `serve` always runs with the
/// test-environment gate on.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listener address (`host:port`, `:port` or a bare port).
    #[arg(long, default_value = DEFAULT_BIND, env = "MOCKGATE_BIND")]
    pub bind: String,

    /// Response to requests no rule matches.
    #[arg(long, value_enum, default_value = "error", env = "MOCKGATE_UNHANDLED")]
    pub unhandled: UnhandledPolicy,

    /// Reject unknown scenario ids instead of installing only the defaults.
    #[arg(long, env = "MOCKGATE_STRICT_SCENARIOS")]
    pub strict_scenarios: bool,

    /// Directory of fixtures layered over the embedded set.
    #[arg(long, value_name = "DIR", env = "MOCKGATE_FIXTURES")]
    pub fixtures: Option<PathBuf>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, value_name = "PORT", env = "MOCKGATE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Scenario to activate before the first navigation.
    #[arg(long, value_name = "ID")]
    pub scenario: Option<String>,

    /// Comma-separated arguments for `--scenario`.
    #[arg(long, value_name = "ARGS", requires = "scenario")]
    pub args: Option<String>,
}

impl ServeArgs {
    /// Builds the server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddr`] for a malformed `--bind`.
    pub fn to_config(&self) -> Result<MockConfig, ConfigError> {
        Ok(MockConfig {
            bind_addr: parse_bind_addr(&self.bind)?,
            test_env: true,
            unhandled: self.unhandled,
            strict_scenarios: self.strict_scenarios,
            fixtures_dir: self.fixtures.clone(),
            metrics_port: self.metrics_port,
        })
    }
}

// ============================================================================
// Scenarios Command
// ============================================================================

/// Scenario catalogue commands.
#[derive(Args, Debug)]
pub struct ScenariosCommand {
    /// Scenarios subcommand.
    #[command(subcommand)]
    pub subcommand: ScenariosSubcommand,
}

/// Scenarios subcommands.
#[derive(Subcommand, Debug)]
pub enum ScenariosSubcommand {
    /// List registered scenario ids.
    List(ScenariosListArgs),

    /// Build the registry and activate every scenario once.
    Check(ScenariosCheckArgs),
}

/// Arguments for `mockgate scenarios list`.
#[derive(Args, Debug)]
pub struct ScenariosListArgs {
    /// Only list scenarios from this module.
    #[arg(long, value_name = "NAME")]
    pub module: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `mockgate scenarios check`.
#[derive(Args, Debug)]
pub struct ScenariosCheckArgs {
    /// Directory of fixtures layered over the embedded set.
    #[arg(long, value_name = "DIR", env = "MOCKGATE_FIXTURES")]
    pub fixtures: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Version Command
// ============================================================================

/// Arguments for `mockgate version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(long, value_enum, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Shared Value Enums
// ============================================================================

/// Color output control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Color when stderr is a terminal and `NO_COLOR` is unset
    Auto,
    /// Always emit ANSI colors
    Always,
    /// Never emit ANSI colors
    Never,
}

/// Output format for commands that print data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON
    Json,
}
