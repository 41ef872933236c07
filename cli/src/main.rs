// Copyright (c) 2026 Satox SDK Contributors. MIT License.
// See LICENSE for details.

//! # Satox CLI
//!
//! Entry point for the `satox` binary. Parses CLI arguments, initializes
//! logging and metrics, runs an SDK node and serves its HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`     start a node
//! - `init`    create a data directory, config file and node key
//! - `status`  query a running node's status endpoint
//! - `keygen`  print a fresh Ed25519 or post-quantum keypair
//! - `version` print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;

use satox_sdk::api::RestClient;
use satox_sdk::crypto::SatoxKeypair;
use satox_sdk::lifecycle::Manager;
use satox_sdk::quantum::{QuantumConfig, QuantumManager};
use satox_sdk::{Network, SatoxSdk, SdkConfig};

use cli::{Commands, SatoxCli};
use logging::LogFormat;
use metrics::{NodeMetrics, SharedMetrics};

const CONFIG_FILE: &str = "config.json";
const KEY_FILE: &str = "node.key";

/// How often gauges are re-read from the managers.
const METRICS_REFRESH: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SatoxCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Explicit `--config`, else `config.json` in the data directory, else
/// defaults.
fn load_config(args: &cli::RunArgs) -> Result<SdkConfig> {
    let mut config = match &args.config {
        Some(path) => SdkConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let data_dir = args
                .data_dir
                .clone()
                .unwrap_or_else(|| SdkConfig::default().data_dir);
            let candidate = data_dir.join(CONFIG_FILE);
            if candidate.is_file() {
                SdkConfig::load(&candidate)
                    .with_context(|| format!("failed to load config from {}", candidate.display()))?
            } else {
                SdkConfig::default()
            }
        }
    };

    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(port) = args.rpc_port {
        config.rpc_port = port;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Starts the SDK and serves the API and metrics until a shutdown signal.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = load_config(&args)?;
    logging::init_logging(&config.log_level, args.log_format);

    tracing::info!(
        network = %config.network,
        rpc_port = config.rpc_port,
        p2p_port = config.p2p_port,
        metrics_port = args.metrics_port,
        data_dir = %config.data_dir.display(),
        "starting satox node"
    );

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory: {}", config.data_dir.display())
    })?;

    // --- SDK ---
    let rpc_port = config.rpc_port;
    let sdk = Arc::new(SatoxSdk::with_config(config).context("invalid SDK configuration")?);
    sdk.initialize().context("failed to initialize SDK")?;
    sdk.start().await.context("failed to start SDK")?;

    // --- Metrics ---
    let node_metrics: SharedMetrics =
        Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let metrics_loop = tokio::spawn(track_metrics(Arc::clone(&sdk), Arc::clone(&node_metrics)));

    // --- API server ---
    let app_state = api::AppState {
        sdk: Arc::clone(&sdk),
        metrics: Arc::clone(&node_metrics),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{rpc_port}");
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {api_addr}"))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    metrics_loop.abort();
    sdk.shutdown().await.context("SDK shutdown failed")?;
    tracing::info!("satox node stopped");
    Ok(())
}

/// Count bus events as they happen and re-read gauges on a timer.
async fn track_metrics(sdk: Arc<SatoxSdk>, metrics: SharedMetrics) {
    let mut events = sdk.subscribe();
    let mut interval = tokio::time::interval(METRICS_REFRESH);
    loop {
        tokio::select! {
            _ = interval.tick() => metrics.refresh(&sdk),
            event = events.recv() => match event {
                Ok(event) => metrics.record_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "metrics missed events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Creates a data directory holding `config.json` and a node key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("info", LogFormat::Pretty);

    let network: Network = args
        .network
        .parse()
        .with_context(|| format!("unknown network {:?}", args.network))?;
    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), %network, "initializing data directory");

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            config_path.display()
        );
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config = SdkConfig {
        data_dir: data_dir.clone(),
        network,
        ..SdkConfig::default()
    };
    config
        .save(&config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let keypair = SatoxKeypair::generate();
    let key_path = data_dir.join(KEY_FILE);
    write_secret(&key_path, &keypair.secret_key_hex())?;

    tracing::info!(
        address = %keypair.address(),
        key_path = %key_path.display(),
        "node keypair generated"
    );

    println!("Data directory initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", network);
    println!("  Config         : {}", config_path.display());
    println!("  Node key       : {}", key_path.display());
    println!("  Address        : {}", keypair.address());

    Ok(())
}

/// Write a secret and restrict it to the owner on Unix.
fn write_secret(path: &Path, secret_hex: &str) -> Result<()> {
    std::fs::write(path, secret_hex)
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Queries a running node's `/status` endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let client = RestClient::new(&args.rpc_url)
        .with_context(|| format!("invalid RPC URL {}", args.rpc_url))?;
    let status: serde_json::Value = client
        .get("/status")
        .await
        .with_context(|| format!("failed to query {}", args.rpc_url))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    match args.quantum {
        None => {
            let keypair = SatoxKeypair::generate();
            println!("algorithm  : ed25519");
            println!("address    : {}", keypair.address());
            println!("public key : {}", keypair.public_key().to_hex());
            println!("secret key : {}", keypair.secret_key_hex());
        }
        Some(algorithm) => {
            let quantum = QuantumManager::new(QuantumConfig::default());
            quantum.initialize()?;
            let (public, secret) = quantum
                .generate_keypair(&algorithm)
                .with_context(|| format!("cannot generate {algorithm} keypair"))?;
            quantum.shutdown()?;
            println!("algorithm  : {}", algorithm);
            println!("public key : {}", hex::encode(public));
            println!("secret key : {}", hex::encode(secret));
        }
    }
    Ok(())
}

fn print_version() {
    println!("satox     {}", env!("CARGO_PKG_VERSION"));
    println!("sdk       {}", SatoxSdk::version());
    println!("built     {}", SatoxSdk::build_date());
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(extra: &[&str]) -> cli::RunArgs {
        let mut argv = vec!["satox", "run"];
        argv.extend_from_slice(extra);
        match SatoxCli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_file_in_data_dir_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let saved = SdkConfig {
            network: Network::Testnet,
            p2p_port: 61000,
            ..SdkConfig::default()
        };
        saved.save(dir.path().join(CONFIG_FILE)).unwrap();

        let dir_arg = dir.path().to_str().unwrap();
        let config = load_config(&run_args(&["--data-dir", dir_arg, "--rpc-port", "9000"])).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.p2p_port, 61000);
        assert_eq!(config.rpc_port, 9000);
        assert_eq!(config.data_dir, dir.path());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_config(&run_args(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }

    #[cfg(unix)]
    #[test]
    fn secrets_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(KEY_FILE);
        write_secret(&path, "abcd").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abcd");
    }
}
