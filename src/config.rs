//! Configuration management for herakles-sockstat-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, KnownModeArg, LogLevel};
use clap::ValueEnum;
use herakles_sockstat_exporter::user_stats::{DEFAULT_EXTRA_UIDS, DEFAULT_MAX_UID, DEFAULT_MIN_UID};
use herakles_sockstat_exporter::{CollectorOptions, KnownSocketMode, TrackedUsers};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_CACHE_TTL: u64 = 30;
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_COLLECT_TIMEOUT_SECS: u64 = 20;

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Collection
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "min-uid")]
    pub min_uid: Option<u32>,
    #[serde(alias = "max-uid")]
    pub max_uid: Option<u32>,
    #[serde(alias = "extra-uids")]
    pub extra_uids: Option<Vec<u32>>,
    /// "legacy" | "unified"
    #[serde(alias = "known-socket-mode")]
    pub known_socket_mode: Option<KnownSocketMode>,
    pub parallelism: Option<usize>,
    #[serde(alias = "collect-timeout-secs")]
    pub collect_timeout_secs: Option<u64>,

    // Performance tuning
    pub cache_ttl: Option<u64>,

    // Feature flags
    pub enable_health: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    /// Directory with captured snapshots (uses fixture data instead of /proc)
    #[serde(alias = "test-data-dir")]
    pub test_data_dir: Option<PathBuf>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            min_uid: Some(DEFAULT_MIN_UID),
            max_uid: Some(DEFAULT_MAX_UID),
            extra_uids: Some(DEFAULT_EXTRA_UIDS.to_vec()),
            known_socket_mode: Some(KnownSocketMode::Legacy),
            parallelism: None,
            collect_timeout_secs: Some(DEFAULT_COLLECT_TIMEOUT_SECS),
            cache_ttl: Some(DEFAULT_CACHE_TTL),
            enable_health: Some(true),
            log_level: Some("info".into()),
            test_data_dir: None,
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    /// Tracked-user predicate and crediting mode for the collector.
    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            tracked: TrackedUsers {
                min_uid: self.min_uid.unwrap_or(DEFAULT_MIN_UID),
                max_uid: self.max_uid.unwrap_or(DEFAULT_MAX_UID),
                extra_uids: self
                    .extra_uids
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EXTRA_UIDS.to_vec()),
            },
            known_socket_mode: self.known_socket_mode.unwrap_or_default(),
        }
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    /// Effective log level; unset means `info`.
    pub fn log_level(&self) -> Result<LogLevel, Box<dyn std::error::Error>> {
        match self.log_level.as_deref() {
            None => Ok(LogLevel::Info),
            Some(name) => LogLevel::from_str(name, true)
                .map_err(|_| Box::<dyn std::error::Error>::from(format!("unknown log_level: {}", name))),
        }
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.collect_timeout_secs
                .unwrap_or(DEFAULT_COLLECT_TIMEOUT_SECS),
        )
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let min_uid = cfg.min_uid.unwrap_or(DEFAULT_MIN_UID);
    let max_uid = cfg.max_uid.unwrap_or(DEFAULT_MAX_UID);
    if min_uid >= max_uid {
        return Err(format!(
            "min_uid ({}) must be lower than max_uid ({})",
            min_uid, max_uid
        )
        .into());
    }

    cfg.log_level()?;

    if cfg.collect_timeout_secs == Some(0) {
        return Err("collect_timeout_secs must be greater than 0".into());
    }

    if let Some(dir) = &cfg.test_data_dir {
        if !dir.is_dir() {
            return Err(format!("test_data_dir is not a directory: {}", dir.display()).into());
        }
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file(cert, "certificate")?;
                check_pem_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", what, path).into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("TLS {} file not found: {}", what, path).into())
        }
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    // Collection settings
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if args.min_uid.is_some() {
        config.min_uid = args.min_uid;
    }
    if args.max_uid.is_some() {
        config.max_uid = args.max_uid;
    }
    if let Some(extra) = &args.extra_uids {
        config.extra_uids = Some(parse_uid_list(extra)?);
    }
    if let Some(mode) = args.known_socket_mode {
        config.known_socket_mode = Some(match mode {
            KnownModeArg::Legacy => KnownSocketMode::Legacy,
            KnownModeArg::Unified => KnownSocketMode::Unified,
        });
    }
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }
    if args.collect_timeout.is_some() {
        config.collect_timeout_secs = args.collect_timeout;
    }
    if let Some(cache_ttl) = args.cache_ttl {
        config.cache_ttl = Some(cache_ttl);
    }

    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }

    // Test data directory: CLI wins if provided
    if let Some(dir) = &args.test_data_dir {
        config.test_data_dir = Some(dir.clone());
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Parses a comma-separated uid list such as `33,65534`.
pub fn parse_uid_list(input: &str) -> Result<Vec<u32>, Box<dyn std::error::Error>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>().map_err(|e| {
                Box::<dyn std::error::Error>::from(format!("Invalid uid '{}': {}", s, e))
            })
        })
        .collect()
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/herakles/sockstat-exporter.yaml",
                "/etc/herakles/sockstat-exporter.yml",
                "/etc/herakles/sockstat-exporter.json",
                "./herakles-sockstat-exporter.yaml",
                "./herakles-sockstat-exporter.yml",
                "./herakles-sockstat-exporter.json",
            ];

            match defaults.iter().map(Path::new).find(|p| p.exists()) {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}
