use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::cid::{compute_cid, is_valid_cid};
use super::types::{
    IpfsConfig, IpfsError, IpfsFile, IpfsNodeInfo, IpfsPeer, PinInfo, StorageStats,
};
use crate::lifecycle::{Lifecycle, Manager};

const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
struct StoredObject {
    file: IpfsFile,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct IpfsState {
    node_id: String,
    objects: HashMap<String, StoredObject>,
    pins: HashMap<String, PinInfo>,
    peers: HashMap<String, IpfsPeer>,
}

/// In-process content-addressed object store.
#[derive(Debug)]
pub struct IpfsManager {
    lifecycle: Lifecycle,
    config: RwLock<IpfsConfig>,
    state: RwLock<IpfsState>,
}

impl Default for IpfsManager {
    fn default() -> Self {
        Self::new(IpfsConfig::default())
    }
}

impl IpfsManager {
    pub fn new(config: IpfsConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("ipfs"),
            config: RwLock::new(config),
            state: RwLock::new(IpfsState::default()),
        }
    }

    pub fn config(&self) -> IpfsConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: IpfsConfig) -> Result<(), IpfsError> {
        self.lifecycle.ensure_ready()?;
        if !config.node_id.is_empty() {
            self.state.write().node_id = config.node_id.clone();
        }
        *self.config.write() = config;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// Store `data` under its content id.
    pub fn upload_file(
        &self,
        name: &str,
        data: &[u8],
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IpfsFile, IpfsError> {
        self.lifecycle.ensure_ready()?;
        if name.trim().is_empty() {
            return Err(IpfsError::InvalidInput("file name is required".into()));
        }
        if data.is_empty() {
            return Err(IpfsError::InvalidInput("file is empty".into()));
        }
        let max = self.config.read().max_file_size;
        let size = data.len() as u64;
        if size > max {
            return Err(IpfsError::FileTooLarge { size, max });
        }

        let hash = compute_cid(data);
        let mut state = self.state.write();
        if state.objects.contains_key(&hash) {
            return Err(IpfsError::FileExists(hash));
        }
        let now = Utc::now();
        let file = IpfsFile {
            hash: hash.clone(),
            name: name.to_string(),
            size,
            content_type: if content_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                content_type.to_string()
            },
            metadata,
            pinned: false,
            created_at: now,
            last_accessed: now,
        };
        state.objects.insert(
            hash.clone(),
            StoredObject {
                file: file.clone(),
                data: data.to_vec(),
            },
        );
        drop(state);

        info!(%hash, name, size, "content stored");
        Ok(file)
    }

    /// Read a file from disk and store it under its file name.
    pub fn upload_path(&self, path: impl AsRef<Path>) -> Result<IpfsFile, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let path = path.as_ref();
        let io = |source| IpfsError::Io {
            path: path.to_path_buf(),
            source,
        };
        let max = self.config.read().max_file_size;
        let file = std::fs::File::open(path).map_err(io)?;
        let size = file.metadata().map_err(io)?.len();
        if size > max {
            return Err(IpfsError::FileTooLarge { size, max });
        }
        // The file may grow after the metadata check; never buffer past the limit.
        let mut data = Vec::with_capacity(size as usize);
        file.take(max.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(io)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IpfsError::InvalidInput(format!("no file name in {}", path.display())))?;
        self.upload_file(name, &data, guess_content_type(path), HashMap::new())
    }

    /// Metadata lookup. Counts as an access.
    pub fn get_file(&self, hash: &str) -> Result<IpfsFile, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        let object = state
            .objects
            .get_mut(hash)
            .ok_or_else(|| IpfsError::NotFound(hash.to_string()))?;
        object.file.last_accessed = Utc::now();
        Ok(object.file.clone())
    }

    /// Return the bytes after re-hashing them against `hash`.
    pub fn download_file(&self, hash: &str) -> Result<Vec<u8>, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        let object = state
            .objects
            .get_mut(hash)
            .ok_or_else(|| IpfsError::NotFound(hash.to_string()))?;
        if compute_cid(&object.data) != hash {
            warn!(%hash, "stored content does not match its id");
            return Err(IpfsError::Corrupted(hash.to_string()));
        }
        object.file.last_accessed = Utc::now();
        Ok(object.data.clone())
    }

    pub fn download_to(&self, hash: &str, path: impl AsRef<Path>) -> Result<u64, IpfsError> {
        let data = self.download_file(hash)?;
        let path = path.as_ref();
        std::fs::write(path, &data).map_err(|source| IpfsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(%hash, path = %path.display(), "content written to disk");
        Ok(data.len() as u64)
    }

    pub fn list_files(&self) -> Result<Vec<IpfsFile>, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut files: Vec<IpfsFile> = self
            .state
            .read()
            .objects
            .values()
            .map(|o| o.file.clone())
            .collect();
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.hash.cmp(&b.hash)));
        Ok(files)
    }

    /// Case-insensitive substring match on file names.
    pub fn search_files(&self, query: &str) -> Result<Vec<IpfsFile>, IpfsError> {
        let needle = query.to_lowercase();
        Ok(self
            .list_files()?
            .into_iter()
            .filter(|f| f.name.to_lowercase().contains(&needle))
            .collect())
    }

    pub fn remove_file(&self, hash: &str) -> Result<(), IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        state
            .objects
            .remove(hash)
            .ok_or_else(|| IpfsError::NotFound(hash.to_string()))?;
        state.pins.remove(hash);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pins
    // -----------------------------------------------------------------------

    /// Pin stored content so garbage collection keeps it. Re-pinning
    /// renames the pin.
    pub fn pin_file(&self, hash: &str, name: &str) -> Result<PinInfo, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        let object = state
            .objects
            .get_mut(hash)
            .ok_or_else(|| IpfsError::NotFound(hash.to_string()))?;
        object.file.pinned = true;
        let pin = PinInfo {
            hash: hash.to_string(),
            name: if name.is_empty() {
                object.file.name.clone()
            } else {
                name.to_string()
            },
            pinned_at: Utc::now(),
        };
        state.pins.insert(hash.to_string(), pin.clone());
        debug!(%hash, "content pinned");
        Ok(pin)
    }

    pub fn unpin_file(&self, hash: &str) -> Result<(), IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        if state.pins.remove(hash).is_none() {
            return Err(IpfsError::NotFound(hash.to_string()));
        }
        if let Some(object) = state.objects.get_mut(hash) {
            object.file.pinned = false;
        }
        Ok(())
    }

    pub fn list_pins(&self) -> Result<Vec<PinInfo>, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut pins: Vec<PinInfo> = self.state.read().pins.values().cloned().collect();
        pins.sort_by(|a, b| a.pinned_at.cmp(&b.pinned_at).then(a.hash.cmp(&b.hash)));
        Ok(pins)
    }

    /// Drop every unpinned object. Returns how many were removed.
    pub fn garbage_collect(&self) -> Result<usize, IpfsError> {
        self.lifecycle.ensure_ready()?;
        if !self.config.read().enable_gc {
            return Err(IpfsError::GcDisabled);
        }
        let mut state = self.state.write();
        let before = state.objects.len();
        state.objects.retain(|_, o| o.file.pinned);
        let removed = before - state.objects.len();
        info!(removed, "garbage collection finished");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Node and peers
    // -----------------------------------------------------------------------

    pub fn get_node_info(&self) -> Result<IpfsNodeInfo, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let gateway_url = self.config.read().gateway_url.clone();
        let state = self.state.read();
        Ok(IpfsNodeInfo {
            id: state.node_id.clone(),
            version: NODE_VERSION.to_string(),
            gateway_url,
            peer_count: state.peers.len(),
            file_count: state.objects.len(),
            pinned_count: state.pins.len(),
        })
    }

    pub fn add_peer(&self, peer_id: &str, addresses: Vec<String>) -> Result<IpfsPeer, IpfsError> {
        self.lifecycle.ensure_ready()?;
        if peer_id.trim().is_empty() {
            return Err(IpfsError::InvalidInput("peer id is required".into()));
        }
        let mut state = self.state.write();
        if state.peers.contains_key(peer_id) {
            return Err(IpfsError::PeerExists(peer_id.to_string()));
        }
        let peer = IpfsPeer {
            peer_id: peer_id.to_string(),
            addresses,
            added_at: Utc::now(),
        };
        state.peers.insert(peer_id.to_string(), peer.clone());
        Ok(peer)
    }

    pub fn remove_peer(&self, peer_id: &str) -> Result<(), IpfsError> {
        self.lifecycle.ensure_ready()?;
        self.state
            .write()
            .peers
            .remove(peer_id)
            .map(|_| ())
            .ok_or_else(|| IpfsError::PeerNotFound(peer_id.to_string()))
    }

    pub fn get_peers(&self) -> Result<Vec<IpfsPeer>, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let mut peers: Vec<IpfsPeer> = self.state.read().peers.values().cloned().collect();
        peers.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        Ok(peers)
    }

    // -----------------------------------------------------------------------
    // Stats and helpers
    // -----------------------------------------------------------------------

    pub fn get_storage_stats(&self) -> Result<StorageStats, IpfsError> {
        self.lifecycle.ensure_ready()?;
        let max_file_size = self.config.read().max_file_size;
        let state = self.state.read();
        let mut stats = StorageStats {
            max_file_size,
            ..Default::default()
        };
        for object in state.objects.values() {
            stats.total_files += 1;
            stats.total_size += object.file.size;
            if object.file.pinned {
                stats.pinned_files += 1;
                stats.pinned_size += object.file.size;
            }
        }
        Ok(stats)
    }

    /// True when `hash` is well-formed, stored, and its bytes still match.
    pub fn validate_file(&self, hash: &str) -> Result<bool, IpfsError> {
        self.lifecycle.ensure_ready()?;
        if !is_valid_cid(hash) {
            return Ok(false);
        }
        Ok(self
            .state
            .read()
            .objects
            .get(hash)
            .map(|o| compute_cid(&o.data) == hash)
            .unwrap_or(false))
    }

    pub fn gateway_url(&self, hash: &str) -> String {
        let base = self.config.read().gateway_url.clone();
        if base.ends_with('/') {
            format!("{base}{hash}")
        } else {
            format!("{base}/{hash}")
        }
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("txt") | Some("md") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

impl Manager for IpfsManager {
    type Error = IpfsError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), IpfsError> {
        self.lifecycle.initialize()?;
        let configured = self.config.read().node_id.clone();
        let node_id = if configured.is_empty() {
            format!("satox-{}", uuid::Uuid::new_v4().simple())
        } else {
            configured
        };
        self.state.write().node_id = node_id.clone();
        debug!(%node_id, "ipfs manager initialized");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), IpfsError> {
        *self.state.write() = IpfsState::default();
        self.lifecycle.reset();
        debug!("ipfs manager shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> IpfsManager {
        let m = IpfsManager::default();
        m.initialize().unwrap();
        m
    }

    fn upload(m: &IpfsManager, name: &str, data: &[u8]) -> IpfsFile {
        m.upload_file(name, data, "text/plain", HashMap::new()).unwrap()
    }

    #[test]
    fn upload_and_download() {
        let m = manager();
        let file = upload(&m, "hello.txt", b"hello");
        assert!(file.hash.starts_with("Qm"));
        assert_eq!(file.size, 5);
        assert_eq!(m.download_file(&file.hash).unwrap(), b"hello");
        assert!(m.validate_file(&file.hash).unwrap());
    }

    #[test]
    fn upload_rejections() {
        let m = IpfsManager::new(IpfsConfig {
            max_file_size: 4,
            ..Default::default()
        });
        m.initialize().unwrap();
        assert!(matches!(
            m.upload_file("", b"x", "", HashMap::new()),
            Err(IpfsError::InvalidInput(_))
        ));
        assert!(matches!(
            m.upload_file("a", b"", "", HashMap::new()),
            Err(IpfsError::InvalidInput(_))
        ));
        assert!(matches!(
            m.upload_file("a", b"12345", "", HashMap::new()),
            Err(IpfsError::FileTooLarge { size: 5, max: 4 })
        ));
        upload(&m, "a", b"1234");
        assert!(matches!(
            m.upload_file("b", b"1234", "", HashMap::new()),
            Err(IpfsError::FileExists(_))
        ));
    }

    #[test]
    fn default_content_type() {
        let m = manager();
        let file = m.upload_file("blob", b"\x00\x01", "", HashMap::new()).unwrap();
        assert_eq!(file.content_type, "application/octet-stream");
    }

    #[test]
    fn gc_keeps_pinned() {
        let m = manager();
        let keep = upload(&m, "keep", b"keep me");
        let drop_me = upload(&m, "drop", b"drop me");
        m.pin_file(&keep.hash, "").unwrap();
        assert_eq!(m.list_pins().unwrap()[0].name, "keep");

        assert_eq!(m.garbage_collect().unwrap(), 1);
        assert!(m.get_file(&keep.hash).unwrap().pinned);
        assert!(matches!(m.get_file(&drop_me.hash), Err(IpfsError::NotFound(_))));

        m.unpin_file(&keep.hash).unwrap();
        assert!(matches!(m.unpin_file(&keep.hash), Err(IpfsError::NotFound(_))));
        assert_eq!(m.garbage_collect().unwrap(), 1);
        assert_eq!(m.get_storage_stats().unwrap().total_files, 0);
    }

    #[test]
    fn gc_can_be_disabled() {
        let m = IpfsManager::new(IpfsConfig {
            enable_gc: false,
            ..Default::default()
        });
        m.initialize().unwrap();
        assert!(matches!(m.garbage_collect(), Err(IpfsError::GcDisabled)));
    }

    #[test]
    fn get_file_touches_last_accessed() {
        let m = manager();
        let file = upload(&m, "f", b"data");
        let again = m.get_file(&file.hash).unwrap();
        assert!(again.last_accessed >= file.last_accessed);
    }

    #[test]
    fn peers() {
        let m = manager();
        m.add_peer("peer-b", vec!["/ip4/10.0.0.2/tcp/4001".into()]).unwrap();
        m.add_peer("peer-a", vec![]).unwrap();
        assert!(matches!(m.add_peer("peer-a", vec![]), Err(IpfsError::PeerExists(_))));
        let ids: Vec<_> = m.get_peers().unwrap().into_iter().map(|p| p.peer_id).collect();
        assert_eq!(ids, vec!["peer-a", "peer-b"]);
        m.remove_peer("peer-a").unwrap();
        assert!(matches!(m.remove_peer("peer-a"), Err(IpfsError::PeerNotFound(_))));
        assert_eq!(m.get_node_info().unwrap().peer_count, 1);
    }

    #[test]
    fn node_id_generated_or_configured() {
        let m = manager();
        assert!(m.get_node_info().unwrap().id.starts_with("satox-"));

        let named = IpfsManager::new(IpfsConfig {
            node_id: "my-node".into(),
            ..Default::default()
        });
        named.initialize().unwrap();
        assert_eq!(named.get_node_info().unwrap().id, "my-node");
    }

    #[test]
    fn gateway_url_joins_cleanly() {
        let m = IpfsManager::new(IpfsConfig {
            gateway_url: "http://localhost:8080/ipfs".into(),
            ..Default::default()
        });
        assert_eq!(m.gateway_url("Qmabc"), "http://localhost:8080/ipfs/Qmabc");
        assert_eq!(
            IpfsManager::default().gateway_url("Qmabc"),
            "https://ipfs.io/ipfs/Qmabc"
        );
    }

    #[test]
    fn disk_round_trip() {
        let m = manager();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("note.json");
        std::fs::write(&src, br#"{"a":1}"#).unwrap();

        let file = m.upload_path(&src).unwrap();
        assert_eq!(file.name, "note.json");
        assert_eq!(file.content_type, "application/json");

        let out = dir.path().join("out.json");
        assert_eq!(m.download_to(&file.hash, &out).unwrap(), 7);
        assert_eq!(std::fs::read(&out).unwrap(), br#"{"a":1}"#);
        assert_eq!(m.search_files("NOTE").unwrap().len(), 1);
    }

    #[test]
    fn oversized_path_is_refused_before_reading() {
        let m = IpfsManager::new(IpfsConfig {
            max_file_size: 16,
            ..Default::default()
        });
        m.initialize().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        let file = std::fs::File::create(&big).unwrap();
        // Sparse, so the test never writes the bytes it claims.
        file.set_len(1 << 30).unwrap();

        assert!(matches!(
            m.upload_path(&big),
            Err(IpfsError::FileTooLarge { size, max: 16 }) if size == 1 << 30
        ));
        assert!(matches!(
            m.upload_path(dir.path().join("absent.bin")),
            Err(IpfsError::Io { .. })
        ));

        let small = dir.path().join("small.txt");
        std::fs::write(&small, b"fits").unwrap();
        assert_eq!(m.upload_path(&small).unwrap().size, 4);
    }
}
