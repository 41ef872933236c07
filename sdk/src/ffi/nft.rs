use std::collections::HashMap;

use libc::{c_char, c_int, c_void};
use serde_json::Value;

use super::{arg, destroy, into_handle, pointer, status, to_c_string, to_json, FfiResult};
use crate::lifecycle::Manager;
use crate::nft::NftManager;

#[no_mangle]
pub extern "C" fn satox_nft_manager_create() -> *mut c_void {
    pointer(|| {
        let manager = NftManager::default();
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_nft_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_nft_manager_destroy(handle: *mut c_void) {
    destroy::<NftManager>(handle);
}

/// Mint into the asset's collection. Returns the token id.
///
/// # Safety
/// `handle` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn satox_nft_manager_create_nft(
    handle: *mut c_void,
    asset_id: *const c_char,
    metadata_json: *const c_char,
    owner: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<NftManager>(handle)?;
        let nft = manager
            .create_nft(
                arg(asset_id, "asset_id")?,
                arg(metadata_json, "metadata_json")?,
                arg(owner, "owner")?,
            )
            .map_err(|e| e.to_string())?;
        to_c_string(nft.token_id)
    })
}

/// # Safety
/// Same as `satox_nft_manager_create_nft`.
#[no_mangle]
pub unsafe extern "C" fn satox_nft_manager_get_nft_info(
    handle: *mut c_void,
    token_id: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<NftManager>(handle)?;
        let nft = manager
            .get_nft(arg(token_id, "token_id")?)
            .map_err(|e| e.to_string())?;
        to_json(&nft)
    })
}

/// # Safety
/// Same as `satox_nft_manager_create_nft`.
#[no_mangle]
pub unsafe extern "C" fn satox_nft_manager_transfer_nft(
    handle: *mut c_void,
    token_id: *const c_char,
    from: *const c_char,
    to: *const c_char,
) -> c_int {
    status(|| {
        let manager = super::handle::<NftManager>(handle)?;
        manager
            .transfer_nft(arg(token_id, "token_id")?, arg(from, "from")?, arg(to, "to")?, 0)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// JSON array of the owner's tokens.
///
/// # Safety
/// Same as `satox_nft_manager_create_nft`.
#[no_mangle]
pub unsafe extern "C" fn satox_nft_manager_get_nfts_by_owner(
    handle: *mut c_void,
    owner: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<NftManager>(handle)?;
        let nfts = manager
            .list_nfts_by_owner(arg(owner, "owner")?)
            .map_err(|e| e.to_string())?;
        to_json(&nfts)
    })
}

/// Merge a JSON object into the token's metadata. Non-string values are
/// stored as their JSON text.
///
/// # Safety
/// Same as `satox_nft_manager_create_nft`.
#[no_mangle]
pub unsafe extern "C" fn satox_nft_manager_update_metadata(
    handle: *mut c_void,
    token_id: *const c_char,
    owner: *const c_char,
    metadata_json: *const c_char,
) -> c_int {
    status(|| {
        let manager = super::handle::<NftManager>(handle)?;
        let metadata = metadata_map(arg(metadata_json, "metadata_json")?)?;
        manager
            .update_metadata(arg(token_id, "token_id")?, arg(owner, "owner")?, metadata)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

fn metadata_map(json: &str) -> FfiResult<HashMap<String, String>> {
    let doc: Value = serde_json::from_str(json).map_err(|e| format!("invalid metadata_json: {e}"))?;
    let Value::Object(map) = doc else {
        return Err("metadata_json must be a JSON object".into());
    };
    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}
