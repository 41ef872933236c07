use std::collections::HashMap;

use libc::{c_char, c_int, c_void};

use super::{arg, config_arg, destroy, into_handle, pointer, status, to_c_string, to_json};
use crate::ipfs::{IpfsConfig, IpfsManager};
use crate::lifecycle::Manager;

/// # Safety
/// `config_json` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_create(config_json: *const c_char) -> *mut c_void {
    pointer(|| {
        let config: IpfsConfig = config_arg(config_json)?;
        let manager = IpfsManager::new(config);
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_ipfs_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_destroy(handle: *mut c_void) {
    destroy::<IpfsManager>(handle);
}

/// Store a file from disk. Returns its content id.
///
/// # Safety
/// `handle` must be live; `file_path` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_upload_file(
    handle: *mut c_void,
    file_path: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        let file = manager
            .upload_path(arg(file_path, "file_path")?)
            .map_err(|e| e.to_string())?;
        to_c_string(file.hash)
    })
}

/// Store `size` bytes under `filename`. Returns the content id.
///
/// # Safety
/// `data` must point at `size` readable bytes; `filename` must be a valid
/// C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_upload_data(
    handle: *mut c_void,
    data: *const u8,
    size: u64,
    filename: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        if data.is_null() {
            return Err("data is null".into());
        }
        let len = usize::try_from(size).map_err(|_| "size does not fit in memory".to_string())?;
        let bytes = std::slice::from_raw_parts(data, len);
        let file = manager
            .upload_file(arg(filename, "filename")?, bytes, "", HashMap::new())
            .map_err(|e| e.to_string())?;
        to_c_string(file.hash)
    })
}

/// Write stored content to `output_path`.
///
/// # Safety
/// `handle` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_download_file(
    handle: *mut c_void,
    hash: *const c_char,
    output_path: *const c_char,
) -> c_int {
    status(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        manager
            .download_to(arg(hash, "hash")?, arg(output_path, "output_path")?)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// `handle` must be live; `hash` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_get_file_info(
    handle: *mut c_void,
    hash: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        let file = manager.get_file(arg(hash, "hash")?).map_err(|e| e.to_string())?;
        to_json(&file)
    })
}

/// # Safety
/// `handle` must be live; `hash` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_pin_file(handle: *mut c_void, hash: *const c_char) -> c_int {
    status(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        manager
            .pin_file(arg(hash, "hash")?, "")
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// `handle` must be live; `hash` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_unpin_file(handle: *mut c_void, hash: *const c_char) -> c_int {
    status(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        manager.unpin_file(arg(hash, "hash")?).map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// `handle` must be live; `hash` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_ipfs_manager_get_gateway_url(
    handle: *mut c_void,
    hash: *const c_char,
) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<IpfsManager>(handle)?;
        to_c_string(manager.gateway_url(arg(hash, "hash")?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::tests::{c, last_error, take};
    use crate::ipfs::IpfsFile;

    #[test]
    fn upload_pin_and_download() {
        let h = unsafe { satox_ipfs_manager_create(std::ptr::null()) };
        assert!(!h.is_null());
        let dir = tempfile::tempdir().unwrap();
        unsafe {
            let body = b"hello ipfs";
            let name = c("greeting.txt");
            let hash = c(&take(satox_ipfs_manager_upload_data(
                h,
                body.as_ptr(),
                body.len() as u64,
                name.as_ptr(),
            )));

            assert_eq!(satox_ipfs_manager_pin_file(h, hash.as_ptr()), 0);
            let info: IpfsFile =
                serde_json::from_str(&take(satox_ipfs_manager_get_file_info(h, hash.as_ptr()))).unwrap();
            assert!(info.pinned);
            assert_eq!(info.name, "greeting.txt");
            assert_eq!(info.size, body.len() as u64);

            let out = dir.path().join("copy.txt");
            let out_c = c(out.to_str().unwrap());
            assert_eq!(satox_ipfs_manager_download_file(h, hash.as_ptr(), out_c.as_ptr()), 0);
            assert_eq!(std::fs::read(&out).unwrap(), body);

            assert_eq!(satox_ipfs_manager_unpin_file(h, hash.as_ptr()), 0);
            assert_eq!(satox_ipfs_manager_unpin_file(h, hash.as_ptr()), -1);
            assert!(last_error().starts_with("content not found"));

            let url = take(satox_ipfs_manager_get_gateway_url(h, hash.as_ptr()));
            assert_eq!(url, format!("https://ipfs.io/ipfs/{}", hash.to_str().unwrap()));

            satox_ipfs_manager_destroy(h);
        }
    }

    #[test]
    fn upload_from_disk() {
        let h = unsafe { satox_ipfs_manager_create(std::ptr::null()) };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, br#"{"a":1}"#).unwrap();
        unsafe {
            let path_c = c(path.to_str().unwrap());
            let hash = c(&take(satox_ipfs_manager_upload_file(h, path_c.as_ptr())));
            let info: IpfsFile =
                serde_json::from_str(&take(satox_ipfs_manager_get_file_info(h, hash.as_ptr()))).unwrap();
            assert_eq!(info.content_type, "application/json");

            assert!(satox_ipfs_manager_upload_file(h, path_c.as_ptr()).is_null());
            assert!(last_error().starts_with("content already stored"));
            satox_ipfs_manager_destroy(h);
        }
    }
}
