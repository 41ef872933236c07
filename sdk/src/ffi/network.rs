use libc::{c_char, c_int, c_void};
use serde_json::Value;

use super::{arg, config_arg, destroy, into_handle, pointer, runtime, status, to_json};
use crate::lifecycle::Manager;
use crate::network::{NetworkConfig, NetworkManager};

/// `config_json` is a [`NetworkConfig`]. The listener is not bound until
/// `satox_network_manager_start`.
///
/// # Safety
/// `config_json` must be null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_create(config_json: *const c_char) -> *mut c_void {
    pointer(|| {
        let config: NetworkConfig = config_arg(config_json)?;
        let manager = NetworkManager::new(config);
        manager.initialize().map_err(|e| e.to_string())?;
        Ok(into_handle(manager))
    })
}

/// # Safety
/// `handle` must come from `satox_network_manager_create`.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_destroy(handle: *mut c_void) {
    if let Ok(manager) = super::handle::<NetworkManager>(handle) {
        let _ = manager.shutdown();
    }
    destroy::<NetworkManager>(handle);
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_start(handle: *mut c_void) -> c_int {
    status(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        runtime()?
            .block_on(manager.start())
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_stop(handle: *mut c_void) -> c_int {
    status(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        runtime()?
            .block_on(manager.stop())
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// JSON array of known peers.
///
/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_get_peers(handle: *mut c_void) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        to_json(&manager.get_peers().map_err(|e| e.to_string())?)
    })
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_get_stats(handle: *mut c_void) -> *mut c_char {
    pointer(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        to_json(&manager.get_stats())
    })
}

/// # Safety
/// `handle` must be live; `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_add_peer(
    handle: *mut c_void,
    address: *const c_char,
    port: u16,
) -> c_int {
    status(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        manager
            .add_peer(arg(address, "address")?, port)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// # Safety
/// `handle` must be live; `address` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_remove_peer(
    handle: *mut c_void,
    address: *const c_char,
    port: u16,
) -> c_int {
    status(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        manager
            .remove_peer(arg(address, "address")?, port)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// Send one `message` frame. JSON input is sent as-is, anything else as a
/// JSON string.
///
/// # Safety
/// `handle` must be live; string arguments must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn satox_network_manager_send_message(
    handle: *mut c_void,
    address: *const c_char,
    port: u16,
    message: *const c_char,
) -> c_int {
    status(|| {
        let manager = super::handle::<NetworkManager>(handle)?;
        let address = arg(address, "address")?;
        let text = arg(message, "message")?;
        let payload =
            serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()));
        runtime()?
            .block_on(manager.send_message(address, port, "message", payload))
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::tests::{c, last_error, take};
    use crate::network::{NetworkStats, PeerInfo};

    fn ephemeral() -> *mut c_void {
        let config = c(r#"{"listen_address":"127.0.0.1","port":0}"#);
        unsafe { satox_network_manager_create(config.as_ptr()) }
    }

    #[test]
    fn peer_table() {
        let h = ephemeral();
        assert!(!h.is_null());
        unsafe {
            let host = c("10.0.0.5");
            assert_eq!(satox_network_manager_add_peer(h, host.as_ptr(), 60777), 0);
            assert_eq!(satox_network_manager_add_peer(h, host.as_ptr(), 60777), -1);
            assert_eq!(last_error(), "peer already known: 10.0.0.5:60777");

            let peers: Vec<PeerInfo> =
                serde_json::from_str(&take(satox_network_manager_get_peers(h))).unwrap();
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].port, 60777);

            assert_eq!(satox_network_manager_remove_peer(h, host.as_ptr(), 60777), 0);
            assert_eq!(satox_network_manager_remove_peer(h, host.as_ptr(), 60777), -1);
            satox_network_manager_destroy(h);
        }
    }

    #[test]
    fn send_between_two_listeners() {
        let a = ephemeral();
        let b = ephemeral();
        unsafe {
            assert_eq!(satox_network_manager_start(a), 0);
            assert_eq!(satox_network_manager_start(b), 0);
            let port = super::super::handle::<NetworkManager>(b)
                .unwrap()
                .local_addr()
                .unwrap()
                .port();

            let host = c("127.0.0.1");
            let json = c(r#"{"hello":1}"#);
            let plain = c("not json");
            assert_eq!(satox_network_manager_send_message(a, host.as_ptr(), port, json.as_ptr()), 0);
            assert_eq!(satox_network_manager_send_message(a, host.as_ptr(), port, plain.as_ptr()), 0);

            let stats: NetworkStats =
                serde_json::from_str(&take(satox_network_manager_get_stats(a))).unwrap();
            assert_eq!(stats.messages_sent, 2);

            assert_eq!(satox_network_manager_stop(a), 0);
            assert_eq!(satox_network_manager_stop(b), 0);
            satox_network_manager_destroy(a);
            satox_network_manager_destroy(b);
        }
    }
}
