use libc::{c_char, c_int, c_void};

use super::{arg, config_arg, destroy, into_handle, pointer, status, to_json};
use crate::database::{DatabaseConfig, DatabaseManager};
use crate::lifecycle::Manager;

/// `config_json` is a [`DatabaseConfig`]; null means in-memory.
///
/// # Safety
/// `config_json` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_database_manager_create(config_json: *const c_char) -> *mut c_void {
    pointer(|| {
        let config: DatabaseConfig = config_arg(config_json)?;
        let manager = DatabaseManager::new(config);
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_database_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_database_manager_destroy(handle: *mut c_void) {
    destroy::<DatabaseManager>(handle);
}

/// # Safety
/// `handle` must be live; `name` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_database_manager_create_database(
    handle: *mut c_void,
    name: *const c_char,
) -> c_int {
    status(|| {
        let manager = super::handle::<DatabaseManager>(handle)?;
        manager
            .create_database(arg(name, "name")?)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// JSON array of database names.
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_database_manager_list_databases(handle: *mut c_void) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<DatabaseManager>(handle)?;
        let names = manager.list_databases().map_err(|e| e.to_string())?;
        to_json(&names)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::tests::{c, last_error, take};

    #[test]
    fn create_and_list() {
        let h = unsafe { satox_database_manager_create(std::ptr::null()) };
        assert!(!h.is_null());
        unsafe {
            let name = c("ledger");
            assert_eq!(satox_database_manager_create_database(h, name.as_ptr()), 0);
            assert_eq!(satox_database_manager_create_database(h, name.as_ptr()), -1);
            assert!(last_error().contains("ledger"));

            let names: Vec<String> =
                serde_json::from_str(&take(satox_database_manager_list_databases(h))).unwrap();
            assert_eq!(names, vec!["ledger".to_string()]);
            satox_database_manager_destroy(h);
        }
    }

    #[test]
    fn bad_config_is_rejected() {
        let config = c("{not json");
        let h = unsafe { satox_database_manager_create(config.as_ptr()) };
        assert!(h.is_null());
        assert!(last_error().starts_with("invalid config_json"));
    }
}
