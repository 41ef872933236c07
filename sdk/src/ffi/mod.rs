//! # C ABI
//!
//! Conventions shared by every export:
//!
//! - Handles are opaque pointers from `satox_*_create`, released with the
//!   matching `satox_*_destroy`. Managers come back already initialized.
//! - Returned strings are heap-allocated and must be released with
//!   [`satox_free_string`]. Structured results are JSON.
//! - Failure is `-1` or null; [`satox_last_error`] then describes it.
//! - Panics never cross the boundary.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use libc::{c_char, c_int, c_void};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::{SdkConfig, SDK_VERSION_C};
use crate::sdk::SatoxSdk;

pub mod asset;
pub mod blockchain;
pub mod database;
pub mod ipfs;
pub mod network;
pub mod nft;
pub mod security;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub(crate) type FfiResult<T> = Result<T, String>;

pub(crate) fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    debug!(error = %message, "C ABI call failed");
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

/// The last error raised on this thread, or null. Free with
/// [`satox_free_string`].
#[no_mangle]
pub extern "C" fn satox_last_error() -> *mut c_char {
    LAST_ERROR.with(|e| match e.borrow().as_deref() {
        Some(message) => CString::new(message.replace('\0', " "))
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    })
}

/// # Safety
/// `ptr` must come from this library and not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn satox_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ---------------------------------------------------------------------------
// Marshalling helpers
// ---------------------------------------------------------------------------

/// Borrow a required C string argument.
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated string that outlives
/// the call.
pub(crate) unsafe fn arg<'a>(ptr: *const c_char, name: &str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| format!("{name} is not valid UTF-8"))
}

/// Like [`arg`], but null reads as `None`.
///
/// # Safety
/// Same as [`arg`].
pub(crate) unsafe fn opt_arg<'a>(ptr: *const c_char, name: &str) -> FfiResult<Option<&'a str>> {
    if ptr.is_null() {
        Ok(None)
    } else {
        arg(ptr, name).map(Some)
    }
}

pub(crate) fn to_c_string(value: String) -> FfiResult<*mut c_char> {
    CString::new(value)
        .map(CString::into_raw)
        .map_err(|_| "result contains an interior NUL byte".to_string())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> FfiResult<*mut c_char> {
    let json = serde_json::to_string(value).map_err(|e| e.to_string())?;
    to_c_string(json)
}

/// Parse an optional JSON config; null or empty means the default.
///
/// # Safety
/// Same as [`arg`].
pub(crate) unsafe fn config_arg<T>(ptr: *const c_char) -> FfiResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match opt_arg(ptr, "config_json")? {
        Some(json) if !json.trim().is_empty() => {
            serde_json::from_str(json).map_err(|e| format!("invalid config_json: {e}"))
        }
        _ => Ok(T::default()),
    }
}

pub(crate) fn into_handle<T>(value: T) -> *mut c_void {
    Box::into_raw(Box::new(value)).cast()
}

/// # Safety
/// `handle` must be null or come from [`into_handle::<T>`] and still be live.
pub(crate) unsafe fn handle<'a, T>(handle: *mut c_void) -> FfiResult<&'a T> {
    handle
        .cast::<T>()
        .as_ref()
        .ok_or_else(|| "handle is null".to_string())
}

/// # Safety
/// `handle` must be null or come from [`into_handle::<T>`], and must not be
/// used afterwards.
pub(crate) unsafe fn destroy<T>(handle: *mut c_void) {
    if !handle.is_null() {
        drop(Box::from_raw(handle.cast::<T>()));
    }
}

fn guarded<R>(fail: R, f: impl FnOnce() -> FfiResult<R>) -> R {
    clear_last_error();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(message)) => {
            set_last_error(message);
            fail
        }
        Err(_) => {
            set_last_error("internal panic");
            fail
        }
    }
}

/// Run `f`, mapping `Err` and panics to `-1`.
pub(crate) fn status(f: impl FnOnce() -> FfiResult<c_int>) -> c_int {
    guarded(-1, f)
}

/// Run `f`, mapping `Err` and panics to null.
pub(crate) fn pointer<T>(f: impl FnOnce() -> FfiResult<*mut T>) -> *mut T {
    guarded(std::ptr::null_mut(), f)
}

// ---------------------------------------------------------------------------
// Runtime and global SDK
// ---------------------------------------------------------------------------

static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();
static SDK: OnceLock<Mutex<Option<Arc<SatoxSdk>>>> = OnceLock::new();

/// The multi-threaded runtime that drives async managers behind the ABI.
pub(crate) fn runtime() -> FfiResult<&'static Runtime> {
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .thread_name("satox-ffi")
                .enable_all()
                .build()
                .map_err(|e| format!("failed to start runtime: {e}"))
        })
        .as_ref()
        .map_err(Clone::clone)
}

fn sdk_slot() -> &'static Mutex<Option<Arc<SatoxSdk>>> {
    SDK.get_or_init(|| Mutex::new(None))
}

fn global_sdk() -> FfiResult<Arc<SatoxSdk>> {
    sdk_slot()
        .lock()
        .clone()
        .ok_or_else(|| "SDK not initialized".to_string())
}

fn initialize_with(config: SdkConfig) -> FfiResult<c_int> {
    let mut slot = sdk_slot().lock();
    if slot.is_some() {
        return Ok(0);
    }
    runtime()?;
    let sdk = SatoxSdk::with_config(config).map_err(|e| e.to_string())?;
    sdk.initialize().map_err(|e| e.to_string())?;
    *slot = Some(Arc::new(sdk));
    Ok(0)
}

/// Initialize the global SDK with default configuration. Idempotent.
#[no_mangle]
pub extern "C" fn satox_sdk_initialize() -> c_int {
    status(|| initialize_with(SdkConfig::default()))
}

/// Initialize the global SDK from a JSON [`SdkConfig`]. Idempotent.
///
/// # Safety
/// `config_json` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_sdk_initialize_with_config(config_json: *const c_char) -> c_int {
    status(|| {
        let config: SdkConfig = config_arg(config_json)?;
        config.validate().map_err(|e| e.to_string())?;
        initialize_with(config)
    })
}

#[no_mangle]
pub extern "C" fn satox_sdk_shutdown() {
    let taken = sdk_slot().lock().take();
    let Some(sdk) = taken else {
        return;
    };
    match runtime() {
        Ok(rt) => {
            if let Err(e) = rt.block_on(sdk.shutdown()) {
                warn!(error = %e, "SDK shutdown failed");
            }
        }
        Err(e) => warn!(error = %e, "no runtime for SDK shutdown"),
    }
}

/// Static string; do not free.
#[no_mangle]
pub extern "C" fn satox_sdk_get_version() -> *const c_char {
    SDK_VERSION_C.as_ptr().cast()
}

/// # Safety
/// `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_sdk_connect(address: *const c_char, port: u16) -> c_int {
    status(|| {
        let address = arg(address, "address")?;
        let sdk = global_sdk()?;
        runtime()?
            .block_on(sdk.connect(address, port))
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_sdk_disconnect(address: *const c_char, port: u16) -> c_int {
    status(|| {
        let address = arg(address, "address")?;
        global_sdk()?
            .disconnect(address, port)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Take ownership of a returned string.
    pub(crate) fn take(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null(), "call failed: {}", last_error());
        let value = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { satox_free_string(ptr) };
        value
    }

    pub(crate) fn last_error() -> String {
        let ptr = satox_last_error();
        if ptr.is_null() {
            return String::new();
        }
        let value = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
        unsafe { satox_free_string(ptr) };
        value
    }

    pub(crate) fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn version_is_static() {
        let v = unsafe { CStr::from_ptr(satox_sdk_get_version()) };
        assert_eq!(v.to_str().unwrap(), "1.0.0");
    }

    #[test]
    fn errors_are_thread_local() {
        let code = unsafe { satox_sdk_disconnect(std::ptr::null(), 1) };
        assert_eq!(code, -1);
        assert_eq!(last_error(), "address is null");
        let other = std::thread::spawn(last_error).join().unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn free_null_is_harmless() {
        unsafe { satox_free_string(std::ptr::null_mut()) };
    }

    #[test]
    fn sdk_global_lifecycle() {
        let config = c(r#"{"enable_p2p":false,"enable_sync":false,"database":{"temporary":true}}"#);
        assert_eq!(unsafe { satox_sdk_initialize_with_config(config.as_ptr()) }, 0);
        assert_eq!(unsafe { satox_sdk_initialize_with_config(config.as_ptr()) }, 0);

        let unknown = c("10.0.0.1");
        assert_eq!(unsafe { satox_sdk_disconnect(unknown.as_ptr(), 9) }, -1);
        assert!(!last_error().is_empty());

        satox_sdk_shutdown();
        satox_sdk_shutdown();
    }
}
