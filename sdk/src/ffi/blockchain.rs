use libc::{c_char, c_int, c_void};

use super::{arg, config_arg, destroy, into_handle, pointer, status, to_c_string, to_json};
use crate::blockchain::{BlockchainConfig, BlockchainManager};
use crate::lifecycle::Manager;

/// `config_json` is a [`BlockchainConfig`]; null means mainnet defaults.
///
/// # Safety
/// `config_json` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_create(config_json: *const c_char) -> *mut c_void {
    pointer(|| {
        let config: BlockchainConfig = config_arg(config_json)?;
        let manager = BlockchainManager::new(config);
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_blockchain_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_destroy(handle: *mut c_void) {
    destroy::<BlockchainManager>(handle);
}

/// # Safety
/// `handle` must be live; `height` must be writable.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_get_block_height(
    handle: *mut c_void,
    height: *mut u64,
) -> c_int {
    status(|| {
        if height.is_null() {
            return Err("height is null".into());
        }
        let manager = super::handle::<BlockchainManager>(handle)?;
        *height = manager.get_block_height().map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// Block summary as JSON. `block_id` is a hash or a decimal height.
///
/// # Safety
/// `handle` must be live; `block_id` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_get_block_info(
    handle: *mut c_void,
    block_id: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<BlockchainManager>(handle)?;
        let info = manager
            .get_block_info_by_id(arg(block_id, "block_id")?)
            .map_err(|e| e.to_string())?;
        to_json(&info)
    })
}

/// # Safety
/// `handle` must be live; `txid` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_get_transaction_info(
    handle: *mut c_void,
    txid: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<BlockchainManager>(handle)?;
        let info = manager
            .get_transaction_info(arg(txid, "txid")?)
            .map_err(|e| e.to_string())?;
        to_json(&info)
    })
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_get_best_block_hash(handle: *mut c_void) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<BlockchainManager>(handle)?;
        to_c_string(manager.get_best_block_hash().map_err(|e| e.to_string())?)
    })
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_blockchain_manager_get_block_hash(
    handle: *mut c_void,
    height: u64,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<BlockchainManager>(handle)?;
        to_c_string(manager.get_block_hash(height).map_err(|e| e.to_string())?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockInfo;
    use crate::ffi::tests::{c, last_error, take};

    #[test]
    fn reads_the_chain_tip() {
        let config = c(r#"{"network":"regtest"}"#);
        let h = unsafe { satox_blockchain_manager_create(config.as_ptr()) };
        assert!(!h.is_null());
        unsafe {
            let manager = super::super::handle::<BlockchainManager>(h).unwrap();
            manager.produce_block("miner").unwrap();

            let mut height = 0u64;
            assert_eq!(satox_blockchain_manager_get_block_height(h, &mut height), 0);
            assert_eq!(height, 1);

            let best = take(satox_blockchain_manager_get_best_block_hash(h));
            assert_eq!(take(satox_blockchain_manager_get_block_hash(h, 1)), best);

            let by_height = c("1");
            let info: BlockInfo =
                serde_json::from_str(&take(satox_blockchain_manager_get_block_info(h, by_height.as_ptr())))
                    .unwrap();
            assert_eq!(info.hash, best);
            assert_eq!(info.producer, "miner");

            assert!(satox_blockchain_manager_get_block_hash(h, 7).is_null());
            assert_eq!(last_error(), "block not found: height 7");

            let missing = c("deadbeef");
            assert!(satox_blockchain_manager_get_transaction_info(h, missing.as_ptr()).is_null());
            assert_eq!(last_error(), "transaction not found: deadbeef");

            satox_blockchain_manager_destroy(h);
        }
    }

    #[test]
    fn null_height_pointer_is_an_error() {
        let h = unsafe { satox_blockchain_manager_create(std::ptr::null()) };
        unsafe {
            assert_eq!(satox_blockchain_manager_get_block_height(h, std::ptr::null_mut()), -1);
            assert_eq!(last_error(), "height is null");
            satox_blockchain_manager_destroy(h);
        }
    }
}
