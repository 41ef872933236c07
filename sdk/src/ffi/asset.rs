use libc::{c_char, c_int, c_void};

use super::{arg, destroy, into_handle, pointer, status, to_c_string, to_json, FfiResult};
use crate::asset::{AssetManager, CreateAssetRequest};
use crate::lifecycle::Manager;

#[no_mangle]
pub extern "C" fn satox_asset_manager_create() -> *mut c_void {
    pointer(|| {
        let manager = AssetManager::default();
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_asset_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_destroy(handle: *mut c_void) {
    destroy::<AssetManager>(handle);
}

/// Create an asset from a JSON [`CreateAssetRequest`] owned by `owner`.
/// Returns the new asset id.
///
/// # Safety
/// `handle` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_create_asset(
    handle: *mut c_void,
    config_json: *const c_char,
    owner: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<AssetManager>(handle)?;
        let mut request: CreateAssetRequest = serde_json::from_str(arg(config_json, "config_json")?)
            .map_err(|e| format!("invalid config_json: {e}"))?;
        request.owner = arg(owner, "owner")?.to_string();
        let asset = manager.create_asset(request).map_err(|e| e.to_string())?;
        to_c_string(asset.id)
    })
}

/// The asset record as JSON.
///
/// # Safety
/// Same as `satox_asset_manager_create_asset`.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_get_asset_info(
    handle: *mut c_void,
    asset_id: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<AssetManager>(handle)?;
        let asset = manager
            .get_asset(arg(asset_id, "asset_id")?)
            .map_err(|e| e.to_string())?;
        to_json(&asset)
    })
}

/// Move `amount` base units, charging the configured transfer fee.
///
/// # Safety
/// Same as `satox_asset_manager_create_asset`.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_transfer_asset(
    handle: *mut c_void,
    asset_id: *const c_char,
    from: *const c_char,
    to: *const c_char,
    amount: u64,
) -> c_int {
    status(|| {
        let manager = super::handle::<AssetManager>(handle)?;
        let fee = manager.config().transfer_fee;
        manager
            .transfer_asset(
                arg(asset_id, "asset_id")?,
                arg(from, "from")?,
                arg(to, "to")?,
                amount,
                fee,
            )
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// Same as `satox_asset_manager_create_asset`; `balance` must be writable.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_get_asset_balance(
    handle: *mut c_void,
    asset_id: *const c_char,
    address: *const c_char,
    balance: *mut u64,
) -> c_int {
    status(|| {
        if balance.is_null() {
            return Err("balance is null".into());
        }
        let manager = super::handle::<AssetManager>(handle)?;
        *balance = manager
            .get_balance(arg(address, "address")?, arg(asset_id, "asset_id")?)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

unsafe fn supply_change(
    handle: *mut c_void,
    asset_id: *const c_char,
    owner: *const c_char,
    amount: u64,
    reissue: bool,
) -> FfiResult<c_int> {
    let manager = super::handle::<AssetManager>(handle)?;
    let asset_id = arg(asset_id, "asset_id")?;
    let owner = arg(owner, "owner")?;
    let result = if reissue {
        manager.reissue_asset(asset_id, owner, amount)
    } else {
        manager.burn_asset(asset_id, owner, amount)
    };
    result.map_err(|e| e.to_string())?;
    Ok(0)
}

/// # Safety
/// Same as `satox_asset_manager_create_asset`.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_reissue_asset(
    handle: *mut c_void,
    asset_id: *const c_char,
    owner: *const c_char,
    amount: u64,
) -> c_int {
    status(|| supply_change(handle, asset_id, owner, amount, true))
}

/// # Safety
/// Same as `satox_asset_manager_create_asset`.
#[no_mangle]
pub unsafe extern "C" fn satox_asset_manager_burn_asset(
    handle: *mut c_void,
    asset_id: *const c_char,
    owner: *const c_char,
    amount: u64,
) -> c_int {
    status(|| supply_change(handle, asset_id, owner, amount, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use crate::ffi::tests::{c, last_error, take};

    #[test]
    fn asset_round_trip_through_the_abi() {
        let h = satox_asset_manager_create();
        assert!(!h.is_null());
        unsafe {
            let request = c(r#"{"name":"Gold","symbol":"GLD","total_supply":1000,"reissuable":true}"#);
            let alice = c("alice");
            let bob = c("bob");
            let id = c(&take(satox_asset_manager_create_asset(
                h,
                request.as_ptr(),
                alice.as_ptr(),
            )));

            let info: Asset =
                serde_json::from_str(&take(satox_asset_manager_get_asset_info(h, id.as_ptr()))).unwrap();
            assert_eq!(info.symbol, "GLD");
            assert_eq!(info.owner, "alice");

            assert_eq!(
                satox_asset_manager_transfer_asset(h, id.as_ptr(), alice.as_ptr(), bob.as_ptr(), 250),
                0
            );
            let mut balance = 0u64;
            assert_eq!(
                satox_asset_manager_get_asset_balance(h, id.as_ptr(), bob.as_ptr(), &mut balance),
                0
            );
            assert_eq!(balance, 250);

            assert_eq!(satox_asset_manager_reissue_asset(h, id.as_ptr(), alice.as_ptr(), 100), 0);
            assert_eq!(satox_asset_manager_burn_asset(h, id.as_ptr(), alice.as_ptr(), 50), 0);
            assert_eq!(
                satox_asset_manager_get_asset_balance(h, id.as_ptr(), alice.as_ptr(), &mut balance),
                0
            );
            assert_eq!(balance, 800);

            assert_eq!(satox_asset_manager_burn_asset(h, id.as_ptr(), bob.as_ptr(), 1), -1);
            assert!(last_error().contains("not the owner"));

            satox_asset_manager_destroy(h);
        }
    }

    #[test]
    fn omitted_supply_uses_the_default() {
        let h = satox_asset_manager_create();
        unsafe {
            let request = c(r#"{"name":"Gold","symbol":"GLD"}"#);
            let alice = c("alice");
            let id = satox_asset_manager_create_asset(h, request.as_ptr(), alice.as_ptr());
            assert!(!id.is_null(), "{}", last_error());
            let id = c(&take(id));

            let info: Asset =
                serde_json::from_str(&take(satox_asset_manager_get_asset_info(h, id.as_ptr()))).unwrap();
            assert_eq!(info.total_supply, crate::asset::DEFAULT_TOTAL_SUPPLY);
            let mut balance = 0u64;
            assert_eq!(
                satox_asset_manager_get_asset_balance(h, id.as_ptr(), alice.as_ptr(), &mut balance),
                0
            );
            assert_eq!(balance, 1_000_000);
            satox_asset_manager_destroy(h);
        }
    }

    #[test]
    fn unknown_asset_reports_error() {
        let h = satox_asset_manager_create();
        unsafe {
            let missing = c("nope");
            assert!(satox_asset_manager_get_asset_info(h, missing.as_ptr()).is_null());
            assert_eq!(last_error(), "asset not found: nope");
            satox_asset_manager_destroy(h);
        }
    }
}
