use libc::{c_char, c_int, c_void};

use super::{arg, destroy, into_handle, pointer, status, to_c_string};
use crate::lifecycle::Manager;
use crate::security::SecurityManager;

#[no_mangle]
pub extern "C" fn satox_security_manager_create() -> *mut c_void {
    pointer(|| {
        let manager = SecurityManager::default();
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_security_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_destroy(handle: *mut c_void) {
    destroy::<SecurityManager>(handle);
}

/// Writes hex Ed25519 keys to the out-parameters; free both.
///
/// # Safety
/// `handle` must be live; the out-pointers must be writable.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_generate_keypair(
    handle: *mut c_void,
    public_key: *mut *mut c_char,
    private_key: *mut *mut c_char,
) -> c_int {
    status(|| {
        if public_key.is_null() || private_key.is_null() {
            return Err("output pointer is null".into());
        }
        let manager = super::handle::<SecurityManager>(handle)?;
        let (public, secret) = manager.generate_keypair().map_err(|e| e.to_string())?;
        let public = to_c_string(public)?;
        let secret = match to_c_string(secret) {
            Ok(secret) => secret,
            Err(e) => {
                super::satox_free_string(public);
                return Err(e);
            }
        };
        *public_key = public;
        *private_key = secret;
        Ok(0)
    })
}

/// X25519 keys for `encrypt_data` / `decrypt_data`.
///
/// # Safety
/// Same as `satox_security_manager_generate_keypair`.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_generate_encryption_keypair(
    handle: *mut c_void,
    public_key: *mut *mut c_char,
    private_key: *mut *mut c_char,
) -> c_int {
    status(|| {
        if public_key.is_null() || private_key.is_null() {
            return Err("output pointer is null".into());
        }
        let manager = super::handle::<SecurityManager>(handle)?;
        let (public, secret) = manager
            .generate_encryption_keypair()
            .map_err(|e| e.to_string())?;
        *public_key = to_c_string(public)?;
        *private_key = to_c_string(secret)?;
        Ok(0)
    })
}

/// Hex signature over the UTF-8 bytes of `data`.
///
/// # Safety
/// `handle` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_sign_data(
    handle: *mut c_void,
    data: *const c_char,
    private_key: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<SecurityManager>(handle)?;
        let data = arg(data, "data")?;
        let key = arg(private_key, "private_key")?;
        let signature = manager
            .sign_data(data.as_bytes(), key)
            .map_err(|e| e.to_string())?;
        to_c_string(signature)
    })
}

/// `1` valid, `0` invalid, `-1` error.
///
/// # Safety
/// Same as `satox_security_manager_sign_data`.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_verify_signature(
    handle: *mut c_void,
    data: *const c_char,
    signature: *const c_char,
    public_key: *const c_char,
) -> c_int {
    status(|| {
        let manager = super::handle::<SecurityManager>(handle)?;
        let valid = manager
            .verify_signature(
                arg(data, "data")?.as_bytes(),
                arg(signature, "signature")?,
                arg(public_key, "public_key")?,
            )
            .map_err(|e| e.to_string())?;
        Ok(c_int::from(valid))
    })
}

/// Hex SHA-256 of the UTF-8 bytes of `data`.
///
/// # Safety
/// Same as `satox_security_manager_sign_data`.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_sha256(
    handle: *mut c_void,
    data: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<SecurityManager>(handle)?;
        to_c_string(manager.sha256(arg(data, "data")?.as_bytes()))
    })
}

/// Base64 sealed box for an X25519 public key (hex).
///
/// # Safety
/// Same as `satox_security_manager_sign_data`.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_encrypt_data(
    handle: *mut c_void,
    data: *const c_char,
    public_key: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<SecurityManager>(handle)?;
        let sealed = manager
            .encrypt_data(arg(data, "data")?.as_bytes(), arg(public_key, "public_key")?)
            .map_err(|e| e.to_string())?;
        to_c_string(sealed)
    })
}

/// # Safety
/// Same as `satox_security_manager_sign_data`.
#[no_mangle]
pub unsafe extern "C" fn satox_security_manager_decrypt_data(
    handle: *mut c_void,
    encrypted_data: *const c_char,
    private_key: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<SecurityManager>(handle)?;
        let plain = manager
            .decrypt_data(
                arg(encrypted_data, "encrypted_data")?,
                arg(private_key, "private_key")?,
            )
            .map_err(|e| e.to_string())?;
        let text = String::from_utf8(plain).map_err(|_| "plaintext is not UTF-8".to_string())?;
        to_c_string(text)
    })
}
