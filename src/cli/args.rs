//! CLI argument definitions
//!
//! All Clap derive structs for `Memoria` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Terminal client for a physical light-pattern memory game.
#[derive(Parser, Debug)]
#[command(name = "memoria", author, version, about)]
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
    #[arg(long, default_value = "auto", global = true, env = "MEMORIA_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "MEMORIA_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an interactive game session.
    Play(PlayArgs),

    /// Print the device status as JSON.
    Status(DeviceArgs),

    /// Reset the device.
    Reset(DeviceArgs),

    /// Serve a simulated device for local play and testing.
    Simulate(SimulateArgs),

    /// Configuration utilities.
    Config(ConfigCommand),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Play
// ============================================================================

/// Arguments for `play`.
#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "MEMORIA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device base URL (overrides the configuration).
    #[arg(long, env = "MEMORIA_DEVICE_URL")]
    pub device: Option<String>,

    /// Predictor base URL (overrides the configuration).
    #[arg(long, env = "MEMORIA_PREDICTOR_URL", conflicts_with = "no_predictor")]
    pub predictor: Option<String>,

    /// Initial level (1-5).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub level: Option<u8>,

    /// Disable adaptive difficulty.
    #[arg(long)]
    pub no_predictor: bool,

    /// Write game events as JSON lines to this file (`-` for stderr).
    #[arg(long, env = "MEMORIA_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "MEMORIA_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Disable audio cues.
    #[arg(long)]
    pub mute: bool,
}

// ============================================================================
// Device one-shots
// ============================================================================

/// Arguments for `status` and `reset`.
#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Device base URL.
    #[arg(long, env = "MEMORIA_DEVICE_URL", default_value = "http://127.0.0.1:8000")]
    pub device: String,

    /// Request timeout.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: std::time::Duration,
}

// ============================================================================
// Simulate
// ============================================================================

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000", env = "MEMORIA_SIM_BIND")]
    pub bind: String,

    /// Pattern length at level 1.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub pattern_length: u8,

    /// Delay before the simulated device starts the next round.
    #[arg(long, default_value = "1500ms", value_parser = humantime::parse_duration)]
    pub advance_after: std::time::Duration,

    /// Seed for the pattern generator.
    #[arg(long)]
    pub seed: Option<u64>,
}

// ============================================================================
// Config
// ============================================================================

/// Configuration commands.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Config subcommand.
    #[command(subcommand)]
    pub subcommand: ConfigSubcommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Validate configuration files.
    Validate(ConfigValidateArgs),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
pub struct ConfigValidateArgs {
    /// Files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Version
// ============================================================================

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
