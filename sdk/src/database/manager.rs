use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::query::Query;
use super::store::{DatabaseDump, Store};
use super::types::{
    DatabaseConfig, DatabaseError, DatabaseInfo, DbResult, QueryResult, QueryRow,
};
use crate::lifecycle::{Lifecycle, Manager};

#[derive(Debug, Clone)]
struct OpenDatabase {
    store: Store,
    last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    /// Open handles. For in-memory databases this is also the registry.
    open: HashMap<String, OpenDatabase>,
    current: Option<String>,
}

/// Named sled databases with a current-connection cursor.
#[derive(Debug)]
pub struct DatabaseManager {
    lifecycle: Lifecycle,
    config: RwLock<DatabaseConfig>,
    state: RwLock<DatabaseState>,
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new(DatabaseConfig::default())
    }
}

pub fn validate_database_name(name: &str) -> DbResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(DatabaseError::InvalidName(name.to_string()))
    }
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new("database"),
            config: RwLock::new(config),
            state: RwLock::new(DatabaseState::default()),
        }
    }

    pub fn config(&self) -> DatabaseConfig {
        self.config.read().clone()
    }

    /// Directory of `name` under the databases root. The name is validated
    /// here so no caller can resolve a path outside that root.
    fn path_for(&self, name: &str) -> DbResult<Option<PathBuf>> {
        validate_database_name(name)?;
        Ok(self.config.read().root().map(|root| root.join(name)))
    }

    fn exists(&self, state: &DatabaseState, name: &str) -> DbResult<bool> {
        Ok(state.open.contains_key(name) || self.path_for(name)?.is_some_and(|p| p.is_dir()))
    }

    /// Cached handle, opening the on-disk database on first use.
    fn handle(&self, state: &mut DatabaseState, name: &str) -> DbResult<Store> {
        validate_database_name(name)?;
        if let Some(db) = state.open.get(name) {
            return Ok(db.store.clone());
        }
        let path = self
            .path_for(name)?
            .filter(|p| p.is_dir())
            .ok_or_else(|| DatabaseError::NotFound(name.to_string()))?;
        let last_modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        let store = Store::open(&path)?;
        state.open.insert(
            name.to_string(),
            OpenDatabase {
                store: store.clone(),
                last_modified,
            },
        );
        Ok(store)
    }

    fn open_new(&self, state: &mut DatabaseState, name: &str) -> DbResult<Store> {
        if self.exists(state, name)? {
            return Err(DatabaseError::AlreadyExists(name.to_string()));
        }
        let store = match self.path_for(name)? {
            Some(path) => {
                fs::create_dir_all(&path).map_err(|source| DatabaseError::Io {
                    path: path.clone(),
                    source,
                })?;
                Store::open(&path)?
            }
            None => Store::open_temporary()?,
        };
        state.open.insert(
            name.to_string(),
            OpenDatabase {
                store: store.clone(),
                last_modified: Some(Utc::now()),
            },
        );
        Ok(store)
    }

    // -----------------------------------------------------------------------
    // Databases
    // -----------------------------------------------------------------------

    pub fn create_database(&self, name: &str) -> DbResult<()> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        self.open_new(&mut state, name)?;
        info!(database = name, "database created");
        Ok(())
    }

    /// Drop a database and its files, disconnecting first if it is current.
    pub fn delete_database(&self, name: &str) -> DbResult<()> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        if !self.exists(&state, name)? {
            return Err(DatabaseError::NotFound(name.to_string()));
        }
        if state.current.as_deref() == Some(name) {
            state.current = None;
        }
        state.open.remove(name);
        if let Some(path) = self.path_for(name)?.filter(|p| p.exists()) {
            fs::remove_dir_all(&path).map_err(|source| DatabaseError::Io { path, source })?;
        }
        info!(database = name, "database deleted");
        Ok(())
    }

    pub fn connect(&self, name: &str) -> DbResult<()> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        self.handle(&mut state, name)?;
        state.current = Some(name.to_string());
        debug!(database = name, "connected");
        Ok(())
    }

    /// Flush and clear the current database. Disconnecting twice is fine.
    pub fn disconnect(&self) -> DbResult<()> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        if let Some(name) = state.current.take() {
            if let Some(db) = state.open.get(&name) {
                db.store.flush()?;
            }
            debug!(database = %name, "disconnected");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().current.is_some()
    }

    pub fn current_database(&self) -> Option<String> {
        self.state.read().current.clone()
    }

    pub fn get_database_info(&self, name: &str) -> DbResult<DatabaseInfo> {
        self.lifecycle.ensure_ready()?;
        let mut state = self.state.write();
        let store = self.handle(&mut state, name)?;
        let last_modified = state.open.get(name).and_then(|db| db.last_modified);
        Ok(DatabaseInfo {
            name: name.to_string(),
            size_on_disk: store.size_on_disk(),
            tables: store.tables(),
            last_modified,
        })
    }

    /// Every database, open or on disk, sorted by name.
    pub fn list_databases(&self) -> DbResult<Vec<String>> {
        self.lifecycle.ensure_ready()?;
        let mut names: BTreeSet<String> = self.state.read().open.keys().cloned().collect();
        if let Some(root) = self.config.read().root() {
            if let Ok(entries) = fs::read_dir(&root) {
                for entry in entries.flatten() {
                    if entry.path().is_dir() {
                        if let Some(name) = entry.file_name().to_str() {
                            if validate_database_name(name).is_ok() {
                                names.insert(name.to_string());
                            }
                        }
                    }
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    // -----------------------------------------------------------------------
    // Key-value access on the current database
    // -----------------------------------------------------------------------

    fn current_store(&self) -> DbResult<Store> {
        self.lifecycle.ensure_ready()?;
        let state = self.state.read();
        let name = state.current.as_ref().ok_or(DatabaseError::NotConnected)?;
        state
            .open
            .get(name)
            .map(|db| db.store.clone())
            .ok_or(DatabaseError::NotConnected)
    }

    fn touch(&self) {
        let mut state = self.state.write();
        if let Some(name) = state.current.clone() {
            if let Some(db) = state.open.get_mut(&name) {
                db.last_modified = Some(Utc::now());
            }
        }
    }

    pub fn put(&self, table: &str, key: &str, value: &serde_json::Value) -> DbResult<()> {
        self.current_store()?.put(table, key, value)?;
        self.touch();
        Ok(())
    }

    pub fn get(&self, table: &str, key: &str) -> DbResult<Option<serde_json::Value>> {
        self.current_store()?.get(table, key)
    }

    pub fn delete(&self, table: &str, key: &str) -> DbResult<bool> {
        let removed = self.current_store()?.delete(table, key)?;
        if removed {
            self.touch();
        }
        Ok(removed)
    }

    pub fn scan(&self, table: &str, prefix: &str) -> DbResult<Vec<(String, serde_json::Value)>> {
        self.current_store()?.scan(table, prefix)
    }

    /// Run one command of the query language against the current database.
    pub fn execute_query(&self, query: &str) -> DbResult<QueryResult> {
        let parsed = Query::parse(query)?;
        let store = self.current_store()?;
        let result = match parsed {
            Query::Get { table, key } => QueryResult {
                rows: store
                    .get(&table, &key)?
                    .map(|value| QueryRow { table, key, value })
                    .into_iter()
                    .collect(),
                affected: 0,
            },
            Query::Put { table, key, value } => {
                store.put(&table, &key, &value)?;
                self.touch();
                QueryResult {
                    rows: Vec::new(),
                    affected: 1,
                }
            }
            Query::Delete { table, key } => {
                let removed = store.delete(&table, &key)?;
                if removed {
                    self.touch();
                }
                QueryResult {
                    rows: Vec::new(),
                    affected: usize::from(removed),
                }
            }
            Query::Scan { table, prefix } => QueryResult {
                rows: store
                    .scan(&table, &prefix)?
                    .into_iter()
                    .map(|(key, value)| QueryRow {
                        table: table.clone(),
                        key,
                        value,
                    })
                    .collect(),
                affected: 0,
            },
            Query::Tables => {
                let mut rows = Vec::new();
                for table in store.tables() {
                    let entries = store.table_len(&table)?;
                    rows.push(QueryRow {
                        table,
                        key: String::new(),
                        value: serde_json::json!({ "entries": entries }),
                    });
                }
                QueryResult { rows, affected: 0 }
            }
        };
        debug!(query, rows = result.rows.len(), affected = result.affected, "query executed");
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Backup and restore
    // -----------------------------------------------------------------------

    /// Write every table of `name` to a bincode file. Returns the number of
    /// entries written.
    pub fn backup_database(&self, name: &str, path: impl AsRef<Path>) -> DbResult<usize> {
        self.lifecycle.ensure_ready()?;
        let store = {
            let mut state = self.state.write();
            self.handle(&mut state, name)?
        };
        let dump = store.export()?;
        let bytes =
            bincode::serialize(&dump).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let path = path.as_ref();
        fs::write(path, bytes).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(database = name, path = %path.display(), entries = dump.entry_count(), "database backed up");
        Ok(dump.entry_count())
    }

    /// Create `name` fresh and load a backup file into it.
    pub fn restore_database(&self, name: &str, path: impl AsRef<Path>) -> DbResult<usize> {
        self.lifecycle.ensure_ready()?;
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dump: DatabaseDump =
            bincode::deserialize(&bytes).map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let store = {
            let mut state = self.state.write();
            self.open_new(&mut state, name)?
        };
        let outcome = store.import(&dump);
        drop(store);
        match outcome {
            Ok(restored) => {
                info!(database = name, entries = restored, "database restored");
                Ok(restored)
            }
            Err(e) => {
                self.discard(name);
                Err(e)
            }
        }
    }

    /// Forget a half-built database and remove its files.
    fn discard(&self, name: &str) {
        let mut state = self.state.write();
        if state.current.as_deref() == Some(name) {
            state.current = None;
        }
        state.open.remove(name);
        drop(state);
        if let Ok(Some(path)) = self.path_for(name) {
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!(database = name, error = %e, "failed to remove partial database");
            }
        }
    }
}

impl Manager for DatabaseManager {
    type Error = DatabaseError;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(&self) -> Result<(), DatabaseError> {
        self.lifecycle.initialize()?;
        if let Some(root) = self.config.read().root() {
            if let Err(source) = fs::create_dir_all(&root) {
                self.lifecycle.fail();
                return Err(DatabaseError::Io { path: root, source });
            }
            debug!(root = %root.display(), "database manager initialized");
        } else {
            debug!("database manager initialized in memory");
        }
        Ok(())
    }

    /// Flush every open database, then reset regardless. The first flush
    /// failure is returned after the reset.
    fn shutdown(&self) -> Result<(), DatabaseError> {
        let mut state = self.state.write();
        let mut first_error = None;
        for (name, db) in &state.open {
            if let Err(e) = db.store.flush() {
                warn!(database = %name, error = %e, "flush failed during shutdown");
                first_error.get_or_insert(e);
            }
        }
        *state = DatabaseState::default();
        drop(state);
        self.lifecycle.reset();
        debug!("database manager shut down");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
