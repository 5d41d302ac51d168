//! CLI arguments and subcommands for herakles-sockstat-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Known-socket crediting mode as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KnownModeArg {
    Legacy,
    Unified,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-sockstat-exporter",
    about = "Prometheus exporter for per-user socket and open file statistics",
    long_about = "Prometheus exporter for per-user socket and open file statistics.\n\n\
                  Correlates process descriptor tables with the kernel's UNIX domain \
                  socket table and TCP/TCP6 connection tables to report, per user, the \
                  number of open files, known and unknown sockets, and TCP connections \
                  by state.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "More info: https://www.herakles.now - Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level [default: info, or log_level from the config file]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Minimum interval between two collection runs in seconds
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Root of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Lowest tracked uid (exclusive)
    #[arg(long)]
    pub min_uid: Option<u32>,

    /// Highest tracked uid (exclusive)
    #[arg(long)]
    pub max_uid: Option<u32>,

    /// Additionally tracked uids (comma-separated)
    #[arg(long)]
    pub extra_uids: Option<String>,

    /// How known sockets are credited
    #[arg(long, value_enum)]
    pub known_socket_mode: Option<KnownModeArg>,

    /// Parallel scanner threads (0 = auto)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Abort a collection run after N seconds
    #[arg(long)]
    pub collect_timeout: Option<u64>,

    /// Directory with captured snapshots (uses fixture data instead of /proc)
    #[arg(short = 't', long)]
    pub test_data_dir: Option<PathBuf>,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check /proc filesystem
        #[arg(long)]
        proc: bool,

        /// Check required external tools (ps, ls)
        #[arg(long)]
        tools: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run collections and print the per-user lines
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Show run summaries
        #[arg(long)]
        verbose: bool,
    },

    /// Check runtime requirements and permissions
    CheckRequirements,
}
