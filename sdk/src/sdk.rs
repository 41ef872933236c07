//! The [`SatoxSdk`] facade: owns every manager, drives their lifecycles in
//! dependency order, and runs the background sync loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::asset::{AssetError, AssetManager};
use crate::blockchain::{BlockchainError, BlockchainManager};
use crate::config::{ConfigError, SdkConfig, BUILD_DATE, SDK_VERSION};
use crate::database::{DatabaseError, DatabaseManager};
use crate::events::{EventBus, SdkEvent};
use crate::ipfs::{IpfsError, IpfsManager};
use crate::lifecycle::{Manager, ManagerState};
use crate::network::{NetworkError, NetworkManager, PeerInfo};
use crate::nft::{NftError, NftManager};
use crate::quantum::{QuantumError, QuantumManager};
use crate::security::{SecurityError, SecurityManager};
use crate::transaction::{TransactionError, TransactionManager};
use crate::wallet::{WalletError, WalletManager};

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("SDK is already running")]
    AlreadyRunning,

    #[error("SDK not initialized")]
    NotInitialized,

    #[error("failed to initialize {manager} manager: {source}")]
    ManagerInit {
        manager: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Nft(#[from] NftError),

    #[error(transparent)]
    Ipfs(#[from] IpfsError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Quantum(#[from] QuantumError),
}

fn init<M: Manager>(manager: &M) -> Result<(), SdkError> {
    manager.initialize().map_err(|e| SdkError::ManagerInit {
        manager: manager.name(),
        source: Box::new(e),
    })
}

fn shut<M: Manager>(manager: &M) {
    if let Err(e) = manager.shutdown() {
        warn!(manager = manager.name(), error = %e, "manager shutdown failed");
    }
}

struct Running {
    token: CancellationToken,
    sync_task: Option<JoinHandle<()>>,
}

pub struct SatoxSdk {
    config: SdkConfig,
    events: EventBus,

    wallet: Arc<WalletManager>,
    security: Arc<SecurityManager>,
    asset: Arc<AssetManager>,
    nft: Arc<NftManager>,
    transaction: Arc<TransactionManager>,
    blockchain: Arc<BlockchainManager>,
    ipfs: Arc<IpfsManager>,
    network: Arc<NetworkManager>,
    database: Arc<DatabaseManager>,
    quantum: Arc<QuantumManager>,

    initialized: AtomicBool,
    running: Mutex<Option<Running>>,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for SatoxSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SatoxSdk")
            .field("network", &self.config.network)
            .field("initialized", &self.is_initialized())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Default for SatoxSdk {
    fn default() -> Self {
        Self::new(SdkConfig::default())
    }
}

impl SatoxSdk {
    pub fn new(config: SdkConfig) -> Self {
        let config = config.resolved();
        let events = EventBus::default();
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            wallet: Arc::new(WalletManager::new(config.wallets.clone()).with_event_bus(events.clone())),
            security: Arc::new(SecurityManager::new(config.security.clone())),
            asset: Arc::new(AssetManager::new(config.assets.clone()).with_event_bus(events.clone())),
            nft: Arc::new(NftManager::new(config.nfts.clone()).with_event_bus(events.clone())),
            transaction: Arc::new(
                TransactionManager::new(config.transactions.clone()).with_event_bus(events.clone()),
            ),
            blockchain: Arc::new(
                BlockchainManager::new(config.blockchain.clone()).with_event_bus(events.clone()),
            ),
            ipfs: Arc::new(IpfsManager::new(config.ipfs.clone())),
            network: Arc::new(
                NetworkManager::new(config.network_manager.clone()).with_event_bus(events.clone()),
            ),
            database: Arc::new(DatabaseManager::new(config.database.clone())),
            quantum: Arc::new(QuantumManager::new(config.quantum.clone())),
            config,
            events,
            initialized: AtomicBool::new(false),
            running: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Validate `config` before building.
    pub fn with_config(config: SdkConfig) -> Result<Self, SdkError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Initialize every manager. Calling it again while initialized is a
    /// no-op; a failure rolls back whatever was already initialized.
    pub fn initialize(&self) -> Result<(), SdkError> {
        if self.is_running() {
            return Err(SdkError::AlreadyRunning);
        }
        if self.is_initialized() {
            return Ok(());
        }

        let result = init(&*self.wallet)
            .and_then(|_| init(&*self.security))
            .and_then(|_| init(&*self.asset))
            .and_then(|_| init(&*self.nft))
            .and_then(|_| init(&*self.transaction))
            .and_then(|_| init(&*self.blockchain))
            .and_then(|_| init(&*self.ipfs))
            .and_then(|_| init(&*self.network))
            .and_then(|_| init(&*self.database))
            .and_then(|_| init(&*self.quantum));

        if let Err(e) = result {
            warn!(error = %e, "SDK initialization failed, rolling back");
            self.shutdown_managers();
            return Err(e);
        }

        self.initialized.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(false);
        self.events.publish(SdkEvent::Initialized);
        info!(version = SDK_VERSION, network = %self.config.network, "SDK initialized");
        Ok(())
    }

    /// Start networking and the sync loop as configured.
    pub async fn start(&self) -> Result<(), SdkError> {
        if !self.is_initialized() {
            return Err(SdkError::NotInitialized);
        }
        if self.is_running() {
            return Ok(());
        }

        if self.config.enable_p2p {
            self.network.start().await?;
        }

        let token = CancellationToken::new();
        let sync_task = self.config.enable_sync.then(|| {
            tokio::spawn(sync_loop(
                self.blockchain.clone(),
                Duration::from_millis(self.config.sync_interval_ms),
                token.clone(),
            ))
        });
        *self.running.lock() = Some(Running { token, sync_task });

        self.events.publish(SdkEvent::Started);
        info!(
            p2p = self.config.enable_p2p,
            sync = self.config.enable_sync,
            "SDK started"
        );
        Ok(())
    }

    /// Stop background work. Stopping a stopped SDK does nothing.
    pub async fn stop(&self) -> Result<(), SdkError> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        running.token.cancel();
        if let Some(task) = running.sync_task {
            if let Err(e) = task.await {
                warn!(error = %e, "sync task ended abnormally");
            }
        }
        if self.network.state() == ManagerState::Running {
            self.network.stop().await?;
        }
        self.events.publish(SdkEvent::Stopped);
        info!("SDK stopped");
        Ok(())
    }

    /// Stop, then shut every manager down in reverse initialization order.
    pub async fn shutdown(&self) -> Result<(), SdkError> {
        self.stop().await?;
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.shutdown_managers();
            self.events.publish(SdkEvent::Shutdown);
            info!("SDK shut down");
        }
        self.shutdown_tx.send_replace(true);
        Ok(())
    }

    fn shutdown_managers(&self) {
        shut(&*self.quantum);
        shut(&*self.database);
        shut(&*self.network);
        shut(&*self.ipfs);
        shut(&*self.blockchain);
        shut(&*self.transaction);
        shut(&*self.nft);
        shut(&*self.asset);
        shut(&*self.security);
        shut(&*self.wallet);
    }

    /// Resolves once [`shutdown`](Self::shutdown) completes.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    pub async fn wait_for_shutdown_with_timeout(&self, timeout: Duration) -> Result<(), SdkError> {
        tokio::time::timeout(timeout, self.wait_for_shutdown())
            .await
            .map_err(|_| SdkError::ShutdownTimeout)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn version() -> &'static str {
        SDK_VERSION
    }

    pub fn build_date() -> &'static str {
        BUILD_DATE
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }

    pub fn wallet_manager(&self) -> &Arc<WalletManager> {
        &self.wallet
    }

    pub fn security_manager(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    pub fn asset_manager(&self) -> &Arc<AssetManager> {
        &self.asset
    }

    pub fn nft_manager(&self) -> &Arc<NftManager> {
        &self.nft
    }

    pub fn transaction_manager(&self) -> &Arc<TransactionManager> {
        &self.transaction
    }

    pub fn blockchain_manager(&self) -> &Arc<BlockchainManager> {
        &self.blockchain
    }

    pub fn ipfs_manager(&self) -> &Arc<IpfsManager> {
        &self.ipfs
    }

    pub fn network_manager(&self) -> &Arc<NetworkManager> {
        &self.network
    }

    pub fn database_manager(&self) -> &Arc<DatabaseManager> {
        &self.database
    }

    pub fn quantum_manager(&self) -> &Arc<QuantumManager> {
        &self.quantum
    }

    // -----------------------------------------------------------------------
    // Convenience
    // -----------------------------------------------------------------------

    pub async fn connect(&self, address: &str, port: u16) -> Result<PeerInfo, SdkError> {
        Ok(self.network.connect(address, port).await?)
    }

    pub fn disconnect(&self, address: &str, port: u16) -> Result<(), SdkError> {
        Ok(self.network.disconnect(address, port)?)
    }

    /// Hand a signed transaction to the pending pool. It is marked as
    /// broadcast only once the pool has accepted it.
    pub fn submit_transaction(&self, txid: &str) -> Result<String, SdkError> {
        let tx = self.transaction.prepare_broadcast(txid)?;
        let accepted = self.blockchain.submit(tx)?;
        self.transaction.broadcast_transaction(txid)?;
        Ok(accepted)
    }
}

async fn sync_loop(blockchain: Arc<BlockchainManager>, every: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = blockchain.sync_with_network() {
                    warn!(error = %e, "sync failed");
                }
            }
        }
    }
    debug!("sync loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SatoxKeypair;
    use crate::database::DatabaseConfig;
    use crate::transaction::{TxInput, TxOutput, TxStatus};

    fn offline() -> SdkConfig {
        SdkConfig {
            enable_p2p: false,
            enable_sync: true,
            sync_interval_ms: 10,
            database: DatabaseConfig::in_memory(),
            ..SdkConfig::default()
        }
    }

    #[tokio::test]
    async fn lifecycle_round_trip() {
        let sdk = SatoxSdk::new(offline());
        let mut events = sdk.subscribe();
        assert!(matches!(sdk.start().await, Err(SdkError::NotInitialized)));

        sdk.initialize().unwrap();
        sdk.initialize().unwrap();
        assert!(sdk.is_initialized());
        assert!(matches!(events.recv().await.unwrap(), SdkEvent::Initialized));

        sdk.start().await.unwrap();
        assert!(sdk.is_running());
        assert!(matches!(sdk.initialize(), Err(SdkError::AlreadyRunning)));

        sdk.stop().await.unwrap();
        sdk.stop().await.unwrap();
        assert!(!sdk.is_running());

        sdk.shutdown().await.unwrap();
        assert!(!sdk.is_initialized());
        assert!(!sdk.wallet_manager().is_initialized());
        assert!(!sdk.quantum_manager().is_initialized());
    }

    #[tokio::test]
    async fn sync_loop_stamps_last_sync() {
        let sdk = SatoxSdk::new(offline());
        sdk.initialize().unwrap();
        sdk.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sdk
            .blockchain_manager()
            .get_last_sync_time()
            .unwrap()
            .is_some());
        sdk.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_shutdown() {
        let sdk = Arc::new(SatoxSdk::new(offline()));
        sdk.initialize().unwrap();

        assert!(matches!(
            sdk.wait_for_shutdown_with_timeout(Duration::from_millis(20))
                .await,
            Err(SdkError::ShutdownTimeout)
        ));
        assert_eq!(SdkError::ShutdownTimeout.to_string(), "shutdown timeout exceeded");

        let waiter = {
            let sdk = sdk.clone();
            tokio::spawn(async move { sdk.wait_for_shutdown().await })
        };
        sdk.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn submit_transaction_reaches_pending_pool() {
        let sdk = SatoxSdk::new(offline());
        sdk.initialize().unwrap();
        let kp = SatoxKeypair::generate();
        let recipient = SatoxKeypair::generate().address();

        let txm = sdk.transaction_manager();
        let tx = txm
            .create_transaction(
                vec![TxInput::new("00".repeat(32), 0, 50_000, kp.address())],
                vec![TxOutput::to_address(recipient, 40_000)],
                1_000,
            )
            .unwrap();
        txm.sign_transaction(&tx.txid, &kp).unwrap();

        let txid = sdk.submit_transaction(&tx.txid).unwrap();
        assert_eq!(txid, tx.txid);
        let pending = sdk.blockchain_manager().pending_transactions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            txm.get_transaction(&tx.txid).unwrap().status,
            TxStatus::Broadcast
        );
        sdk.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_submission_keeps_transaction_signed() {
        let sdk = SatoxSdk::new(offline());
        sdk.initialize().unwrap();
        let kp = SatoxKeypair::generate();
        let txm = sdk.transaction_manager();
        let tx = txm
            .create_transaction(
                vec![TxInput::new("11".repeat(32), 0, 50_000, kp.address())],
                vec![TxOutput::to_address(kp.address(), 40_000)],
                1_000,
            )
            .unwrap();
        let signed = txm.sign_transaction(&tx.txid, &kp).unwrap();

        // The pool already holds this txid, so the facade submission fails.
        sdk.blockchain_manager().submit(signed).unwrap();
        assert!(matches!(
            sdk.submit_transaction(&tx.txid),
            Err(SdkError::Blockchain(BlockchainError::DuplicateTransaction(_)))
        ));
        assert_eq!(
            txm.get_transaction(&tx.txid).unwrap().status,
            TxStatus::Signed
        );

        sdk.blockchain_manager().shutdown().unwrap();
        assert!(sdk.submit_transaction(&tx.txid).is_err());
        assert_eq!(
            txm.get_transaction(&tx.txid).unwrap().status,
            TxStatus::Signed
        );
        sdk.shutdown().await.unwrap();
    }

    #[test]
    fn failed_initialization_keeps_the_cause() {
        let mut config = offline();
        config.security.token_ttl_secs = 0;
        let sdk = SatoxSdk::new(config);

        let err = sdk.initialize().unwrap_err();
        let SdkError::ManagerInit { manager, source } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(*manager, "security");
        assert!(matches!(
            source.downcast_ref::<SecurityError>(),
            Some(SecurityError::InvalidInput(_))
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("failed to initialize security manager: "));
        assert!(!sdk.is_initialized());
        assert!(!sdk.wallet_manager().is_initialized());
    }

    #[test]
    fn module_errors_convert_with_question_mark() {
        fn wallet_lookup(sdk: &SatoxSdk) -> Result<(), SdkError> {
            sdk.wallet_manager().get_wallet("missing")?;
            Ok(())
        }
        fn asset_lookup(sdk: &SatoxSdk) -> Result<(), SdkError> {
            sdk.asset_manager().get_asset("missing")?;
            Ok(())
        }

        let sdk = SatoxSdk::new(offline());
        sdk.initialize().unwrap();
        assert!(matches!(wallet_lookup(&sdk), Err(SdkError::Wallet(_))));
        assert!(matches!(asset_lookup(&sdk), Err(SdkError::Asset(_))));

        let quantum: SdkError = QuantumError::InvalidInput("bad".into()).into();
        assert!(matches!(quantum, SdkError::Quantum(_)));
    }

    #[test]
    fn version_strings() {
        assert_eq!(SatoxSdk::version(), "1.0.0");
        assert!(!SatoxSdk::build_date().is_empty());
    }
}
