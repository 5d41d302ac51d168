//! herakles-sockstat-exporter - version 0.1.0
//!
//! Per-user socket and open file statistics exporter with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cache;
mod cache_updater;
mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_test};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{health_handler, metrics_handler, root_handler};
use state::{build_collector, AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.log_level()?;
    let log_level = match level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", level);
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Configures the global rayon pool used by the descriptor scan.
fn configure_parallelism(config: &Config) {
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
            {
                Ok(()) => debug!("Rayon thread pool configured with {} threads", threads),
                Err(e) => error!("Failed to set rayon thread pool: {}", e),
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    if let Some(command) = &args.command {
        if let Commands::CheckRequirements = command {
            println!("🔍 Checking Runtime Requirements");
            println!("================================\n");

            let config = resolve_config(&args)?;
            match startup_checks::validate_requirements(&config.proc_root()) {
                Ok(_) => {
                    println!("\n✅ All requirements met - ready for production!");
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("\n❌ Requirements check failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        let config = load_validated_config(&args)?;

        return match command {
            Commands::Check { proc, tools, all } => command_check(*proc, *tools, *all, &config),

            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),

            Commands::Test {
                iterations,
                verbose,
            } => command_test(*iterations, *verbose, &config),

            Commands::CheckRequirements => Ok(()),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config)?;

    info!("Starting herakles-sockstat-exporter");

    if config.test_data_dir.is_none() {
        if let Err(e) = startup_checks::validate_requirements(&config.proc_root()) {
            error!("❌ Startup validation failed: {}", e);
            error!("   The exporter will start but collection runs may fail!");
        }
    }

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    configure_parallelism(&config);


    let collector = build_collector(&config);
    let options = config.collector_options();
    info!(
        "Tracking uids {} < uid < {} plus {:?}, {:?} known socket crediting",
        options.tracked.min_uid,
        options.tracked.max_uid,
        options.tracked.extra_uids,
        options.known_socket_mode
    );

    let state: SharedState = Arc::new(AppState::new(config.clone(), collector)?);
    debug!("Prometheus registry initialized, all metrics registered");

    // Perform initial cache population
    info!("Performing initial cache update");
    if let Err(e) = cache_updater::update_cache(&state).await {
        warn!("Initial cache update failed: {}", e);
    } else {
        info!("Initial cache update completed successfully");
    }

    info!("Note: No background refresh task - runs are triggered by /metrics requests");

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state.clone());

    if config.enable_tls.unwrap_or(false) {
        // Both paths are present, validate_effective_config() checked them
        let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path)
        else {
            return Err("TLS enabled without certificate and key paths".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!(
            "herakles-sockstat-exporter listening on https://{}:{}",
            bind_ip_str, port
        );

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!(
            "herakles-sockstat-exporter listening on http://{}:{}",
            bind_ip_str, port
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!("Server error: {}", e);
                e
            })?;
    }

    info!("herakles-sockstat-exporter stopped gracefully");
    Ok(())
}
