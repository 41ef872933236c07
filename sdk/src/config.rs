//! # SDK Configuration & Constants
//!
//! Every magic number the SDK relies on lives here, next to the top-level
//! [`SdkConfig`] that ties the per-manager configuration sections together.
//!
//! Configuration is plain JSON. Missing fields fall back to their defaults
//! and unknown fields are ignored, so a config file written by an older SDK
//! keeps loading after an upgrade.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::asset::AssetConfig;
use crate::blockchain::BlockchainConfig;
use crate::database::DatabaseConfig;
use crate::ipfs::IpfsConfig;
use crate::network::NetworkConfig;
use crate::nft::NftConfig;
use crate::quantum::QuantumConfig;
use crate::security::SecurityConfig;
use crate::transaction::TransactionConfig;
use crate::wallet::WalletConfig;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// SDK version reported by `SatoxSdk::version()` and the C ABI.
pub const SDK_VERSION: &str = "1.0.0";

/// Same version, NUL-terminated for handing straight across the C ABI.
pub const SDK_VERSION_C: &[u8] = b"1.0.0\0";

/// Build date baked in at compile time when the build script (or CI) sets
/// `SATOX_BUILD_DATE`. Falls back to "unknown" for local builds.
pub const BUILD_DATE: &str = match option_env!("SATOX_BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Decimal places of the native coin. One coin is 10^8 base units.
pub const COIN_DECIMALS: u8 = 8;

/// Base units per coin.
pub const COIN: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 secret key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve, always twelve.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Salt length for Argon2 key derivation.
pub const KDF_SALT_LENGTH: usize = 16;

/// Leading character of every Satox address.
pub const ADDRESS_PREFIX: char = 'S';

/// Hash-prefix length of an address payload (RIPEMD-free: truncated SHA-256).
pub const ADDRESS_PAYLOAD_LENGTH: usize = 20;

/// Checksum length appended to address payloads.
pub const ADDRESS_CHECKSUM_LENGTH: usize = 4;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Default JSON-RPC port.
pub const DEFAULT_RPC_PORT: u16 = 7777;

/// Default peer-to-peer port.
pub const DEFAULT_P2P_PORT: u16 = 60777;

/// Which Satox network the SDK talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" | "devnet" => Ok(Network::Regtest),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// SdkConfig
// ---------------------------------------------------------------------------

/// Top-level SDK configuration.
///
/// The flat fields describe the node as a whole. Each manager additionally
/// gets its own section so the file can tune, say, IPFS limits without
/// touching anything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SdkConfig {
    pub data_dir: PathBuf,
    pub network: Network,
    pub enable_mining: bool,
    pub enable_sync: bool,
    pub sync_interval_ms: u64,
    pub mining_threads: u32,
    pub max_connections: usize,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub enable_rpc: bool,
    pub enable_p2p: bool,
    pub log_level: String,
    pub log_file: PathBuf,

    pub assets: AssetConfig,
    pub nfts: NftConfig,
    pub wallets: WalletConfig,
    pub transactions: TransactionConfig,
    pub blockchain: BlockchainConfig,
    pub ipfs: IpfsConfig,
    pub network_manager: NetworkConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub quantum: QuantumConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            network: Network::Mainnet,
            enable_mining: false,
            enable_sync: true,
            sync_interval_ms: 1000,
            mining_threads: 1,
            max_connections: 10,
            rpc_port: DEFAULT_RPC_PORT,
            p2p_port: DEFAULT_P2P_PORT,
            enable_rpc: true,
            enable_p2p: true,
            log_level: "info".to_string(),
            log_file: PathBuf::from("./logs/satox-sdk.log"),
            assets: AssetConfig::default(),
            nfts: NftConfig::default(),
            wallets: WalletConfig::default(),
            transactions: TransactionConfig::default(),
            blockchain: BlockchainConfig::default(),
            ipfs: IpfsConfig::default(),
            network_manager: NetworkConfig::default(),
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            quantum: QuantumConfig::default(),
        }
    }
}

impl SdkConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SdkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sanity-check values that serde alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync_interval_ms must be greater than zero".into(),
            ));
        }
        self.security
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than zero".into(),
            ));
        }
        if self.enable_mining && self.mining_threads == 0 {
            return Err(ConfigError::Invalid(
                "mining_threads must be at least 1 when mining is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Derive the configuration the managers actually run with.
    ///
    /// The flat node-level fields win over the per-manager sections where
    /// they overlap (ports, network, connection limits, data directory).
    pub fn resolved(&self) -> SdkConfig {
        let mut cfg = self.clone();
        cfg.blockchain.network = self.network;
        cfg.blockchain.rpc_port = self.rpc_port;
        cfg.blockchain.p2p_port = self.p2p_port;
        cfg.network_manager.port = self.p2p_port;
        cfg.network_manager.max_connections = self.max_connections;
        if cfg.database.data_dir.is_none() {
            cfg.database.data_dir = Some(self.data_dir.clone());
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SdkConfig::default();
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.network, Network::Mainnet);
        assert!(!cfg.enable_mining);
        assert!(cfg.enable_sync);
        assert_eq!(cfg.sync_interval_ms, 1000);
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(cfg.rpc_port, 7777);
        assert_eq!(cfg.p2p_port, 60777);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn oversized_token_lifetime_is_rejected() {
        let err = SdkConfig::from_json(r#"{"security":{"token_ttl_secs":9223372036854775}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("token_ttl_secs"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = SdkConfig::from_json(r#"{"network":"testnet","rpc_port":1234}"#).unwrap();
        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.rpc_port, 1234);
        assert_eq!(cfg.p2p_port, DEFAULT_P2P_PORT);
        assert_eq!(cfg.assets.max_symbol_length, 5);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let cfg = SdkConfig::from_json(r#"{"totally_new_knob": 42}"#).unwrap();
        assert_eq!(cfg, SdkConfig::default());
    }

    #[test]
    fn zero_sync_interval_rejected() {
        let err = SdkConfig::from_json(r#"{"sync_interval_ms":0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_port_is_a_parse_error() {
        let err = SdkConfig::from_json(r#"{"p2p_port":67777}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn network_parsing_accepts_aliases() {
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("devnet".parse::<Network>().unwrap(), Network::Regtest);
        assert!("moonnet".parse::<Network>().is_err());
    }

    #[test]
    fn resolved_propagates_node_level_fields() {
        let cfg = SdkConfig {
            p2p_port: 4000,
            max_connections: 3,
            ..Default::default()
        };
        let resolved = cfg.resolved();
        assert_eq!(resolved.network_manager.port, 4000);
        assert_eq!(resolved.network_manager.max_connections, 3);
        assert_eq!(resolved.blockchain.p2p_port, 4000);
        assert_eq!(
            resolved.database.data_dir,
            Some(PathBuf::from("./data"))
        );
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = SdkConfig {
            network: Network::Regtest,
            ..Default::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(SdkConfig::load(&path).unwrap(), cfg);
    }
}
