//! End-to-end tests through the public SDK surface.
//!
//! Each test builds its own [`SatoxSdk`] with p2p disabled and in-memory
//! databases, so nothing is shared between tests.

use std::time::Duration;

use satox_sdk::asset::CreateAssetRequest;
use satox_sdk::database::{DatabaseConfig, DatabaseManager};
use satox_sdk::events::SdkEvent;
use satox_sdk::lifecycle::Manager;
use satox_sdk::quantum::{KeyMetadata, WOTS_SHA256_W16};
use satox_sdk::transaction::{TxInput, TxOutput, TxStatus};
use satox_sdk::{SatoxSdk, SdkConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn offline_sdk() -> SatoxSdk {
    let config = SdkConfig {
        enable_p2p: false,
        enable_sync: false,
        database: DatabaseConfig::in_memory(),
        ..SdkConfig::default()
    };
    let sdk = SatoxSdk::with_config(config).expect("valid config");
    sdk.initialize().expect("initialize");
    sdk
}

/// Drain whatever is already queued on the receiver.
fn drain(rx: &mut tokio::sync::broadcast::Receiver<SdkEvent>) -> Vec<SdkEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

// ---------------------------------------------------------------------------
// Wallet → transaction → block
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wallet_funds_flow_into_a_block() {
    let sdk = offline_sdk();
    let wallets = sdk.wallet_manager();
    let txs = sdk.transaction_manager();
    let chain = sdk.blockchain_manager();

    let alice = wallets.create_wallet("alice", "correct horse").unwrap();
    let bob = wallets.create_wallet("bob", "").unwrap();
    let from = alice.addresses[0].address.clone();
    let to = bob.addresses[0].address.clone();

    let keypair = wallets.keypair_for(&alice.id, &from, "correct horse").unwrap();
    let tx = txs
        .create_transaction(
            vec![TxInput::new("ab".repeat(32), 0, 100_000, from.clone())],
            vec![
                TxOutput::to_address(to.clone(), 60_000),
                TxOutput::to_address(from.clone(), 39_000),
            ],
            1_000,
        )
        .unwrap();
    txs.sign_transaction(&tx.txid, &keypair).unwrap();
    assert!(txs.verify_signatures(&tx.txid).unwrap());

    sdk.submit_transaction(&tx.txid).unwrap();
    assert_eq!(txs.get_transaction(&tx.txid).unwrap().status, TxStatus::Broadcast);

    let pending = chain.get_transaction_info(&tx.txid).unwrap();
    assert_eq!(pending.confirmations, 0);
    assert!(pending.block_hash.is_none());

    let block = chain.produce_block(&from).unwrap();
    assert_eq!(block.height, 1);
    assert_eq!(block.transactions, vec![tx.txid.clone()]);

    let mined = chain.get_transaction_info(&tx.txid).unwrap();
    assert_eq!(mined.block_height, Some(1));
    assert_eq!(mined.block_hash.as_deref(), Some(block.hash.as_str()));
    assert_eq!(mined.confirmations, 1);

    chain.produce_block(&from).unwrap();
    assert_eq!(chain.get_transaction_info(&tx.txid).unwrap().confirmations, 2);

    sdk.shutdown().await.unwrap();
}

#[tokio::test]
async fn unsigned_transactions_are_not_submitted() {
    let sdk = offline_sdk();
    let txs = sdk.transaction_manager();
    let wallet = sdk.wallet_manager().create_wallet("solo", "").unwrap();
    let addr = wallet.addresses[0].address.clone();

    let tx = txs
        .create_transaction(
            vec![TxInput::new("cd".repeat(32), 1, 10_000, addr.clone())],
            vec![TxOutput::to_address(addr, 9_000)],
            1_000,
        )
        .unwrap();
    assert!(sdk.submit_transaction(&tx.txid).is_err());
    assert!(sdk.blockchain_manager().pending_transactions().unwrap().is_empty());
    sdk.shutdown().await.unwrap();
}

// ---------------------------------------------------------------------------
// Assets, NFTs and content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn asset_and_nft_activity_is_published() {
    let sdk = offline_sdk();
    let mut events = sdk.subscribe();

    let asset = sdk
        .asset_manager()
        .create_asset(CreateAssetRequest::new("Gallery", "GAL", "alice", 10))
        .unwrap();
    sdk.asset_manager()
        .transfer_asset(&asset.id, "alice", "bob", 4, 0)
        .unwrap();

    let image = sdk
        .ipfs_manager()
        .upload_file("sunrise.png", b"\x89PNG fake", "", Default::default())
        .unwrap();
    let metadata = format!(r#"{{"name":"Sunrise","ipfs_hash":"{}"}}"#, image.hash);
    let nft = sdk
        .nft_manager()
        .create_nft(&asset.id, &metadata, "alice")
        .unwrap();
    assert_eq!(nft.ipfs_hash.as_deref(), Some(image.hash.as_str()));
    sdk.nft_manager()
        .transfer_nft(&nft.token_id, "alice", "carol", 0)
        .unwrap();

    let topics: Vec<&str> = drain(&mut events).iter().map(SdkEvent::topic).collect();
    assert_eq!(topics, vec!["assets", "assets", "nfts", "nfts"]);

    assert_eq!(sdk.asset_manager().get_balance("bob", &asset.id).unwrap(), 4);
    assert_eq!(
        sdk.nft_manager().list_nfts_by_owner("carol").unwrap()[0].token_id,
        nft.token_id
    );
    sdk.shutdown().await.unwrap();
}

// ---------------------------------------------------------------------------
// Quantum keys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_time_keys_survive_storage_round_trip() {
    let sdk = offline_sdk();
    let quantum = sdk.quantum_manager();

    let (public, secret) = quantum.generate_keypair(WOTS_SHA256_W16).unwrap();
    let storage = quantum.key_storage();
    storage
        .store_key("signer", &secret, KeyMetadata::new(WOTS_SHA256_W16).tag("e2e"))
        .unwrap();

    let secret = storage.retrieve_key("signer").unwrap();
    let signature = quantum.sign(WOTS_SHA256_W16, &secret, b"block 1").unwrap();
    assert!(quantum
        .verify(WOTS_SHA256_W16, &public, b"block 1", &signature)
        .unwrap());
    assert!(quantum.sign(WOTS_SHA256_W16, &secret, b"block 2").is_err());

    sdk.shutdown().await.unwrap();
    assert!(!quantum.is_initialized());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sdk_can_be_reinitialized_after_shutdown() {
    let sdk = offline_sdk();
    sdk.start().await.unwrap();
    sdk.shutdown().await.unwrap();
    sdk.wait_for_shutdown_with_timeout(Duration::from_millis(100))
        .await
        .unwrap();

    sdk.initialize().unwrap();
    assert!(sdk.asset_manager().list_assets().unwrap().is_empty());
    sdk.shutdown().await.unwrap();
}

#[test]
fn databases_persist_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig::at(dir.path());

    let first = DatabaseManager::new(config.clone());
    first.initialize().unwrap();
    first.create_database("ledger").unwrap();
    first.connect("ledger").unwrap();
    first
        .put("balances", "alice", &serde_json::json!({"sat": 42}))
        .unwrap();
    first.disconnect().unwrap();
    first.shutdown().unwrap();
    drop(first);

    let second = DatabaseManager::new(config);
    second.initialize().unwrap();
    assert_eq!(second.list_databases().unwrap(), vec!["ledger".to_string()]);
    second.connect("ledger").unwrap();
    assert_eq!(
        second.get("balances", "alice").unwrap(),
        Some(serde_json::json!({"sat": 42}))
    );
    second.shutdown().unwrap();
}
