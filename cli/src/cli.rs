//! # CLI Interface
//!
//! Argument structure for the `satox` binary, built with `clap` derive.
//! Every flag that matters at deploy time also reads a `SATOX_*`
//! environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Satox SDK node and tools.
///
/// Runs a local SDK node with an HTTP/WebSocket API and Prometheus
/// metrics, and offers a few offline helpers for setting one up.
#[derive(Parser, Debug)]
#[command(
    name = "satox",
    about = "Satox SDK node and tools",
    version,
    propagate_version = true
)]
pub struct SatoxCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an SDK node and serve its API.
    Run(RunArgs),
    /// Create a data directory with a default `config.json` and a node key.
    Init(InitArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Generate and print a keypair.
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a JSON configuration file.
    ///
    /// When omitted, `config.json` in the data directory is used if present.
    #[arg(long, short = 'c', env = "SATOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration.
    #[arg(long, short = 'd', env = "SATOX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overrides `rpc_port` from the configuration.
    #[arg(long, env = "SATOX_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SATOX_METRICS_PORT", default_value_t = 9778)]
    pub metrics_port: u16,

    /// `pretty` or `json`.
    #[arg(long, env = "SATOX_LOG_FORMAT", default_value = "pretty", value_parser = parse_log_format)]
    pub log_format: LogFormat,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "SATOX_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// mainnet, testnet or regtest.
    #[arg(long, default_value = "regtest")]
    pub network: String,

    /// Replace an existing `config.json`.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node.
    #[arg(long, env = "SATOX_RPC_URL", default_value = "http://127.0.0.1:7777")]
    pub rpc_url: String,
}

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Generate a post-quantum keypair with this algorithm instead of
    /// Ed25519 (e.g. `wots-sha256-w16`).
    #[arg(long, value_name = "ALG", num_args = 0..=1, default_missing_value = "wots-sha256-w16")]
    pub quantum: Option<String>,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format {other:?}, expected pretty or json")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        SatoxCli::command().debug_assert();
    }

    #[test]
    fn keygen_quantum_flag_has_a_default_algorithm() {
        let cli = SatoxCli::try_parse_from(["satox", "keygen", "--quantum"]).unwrap();
        match cli.command {
            Commands::Keygen(args) => assert_eq!(args.quantum.as_deref(), Some("wots-sha256-w16")),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = SatoxCli::try_parse_from(["satox", "keygen"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen(KeygenArgs { quantum: None })));
    }

    #[test]
    fn run_rejects_unknown_log_format() {
        assert!(SatoxCli::try_parse_from(["satox", "run", "--log-format", "xml"]).is_err());
        let cli = SatoxCli::try_parse_from(["satox", "run", "--log-format", "JSON"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.log_format, LogFormat::Json),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
