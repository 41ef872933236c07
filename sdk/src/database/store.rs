//! # Store
//!
//! One named database: a sled `Db` whose trees are the tables. Keys are
//! UTF-8, values are JSON documents.
//!
//! | Tree            | Key          | Value               |
//! |-----------------|--------------|---------------------|
//! | user table `t`  | key (UTF-8)  | `serde_json` bytes  |
//!
//! sled's own default tree is never exposed as a table.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::{Batch, Db, Tree};

use super::types::{DatabaseError, DbResult};

/// Tree name sled reserves for itself.
const SLED_DEFAULT_TREE: &[u8] = b"__sled__default";

/// Format of a backup file: every table with its raw entries.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseDump {
    pub tables: Vec<TableDump>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TableDump {
    pub name: String,
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl DatabaseDump {
    pub fn entry_count(&self) -> usize {
        self.tables.iter().map(|t| t.entries.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    db: Db,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// In-memory database, gone when the last handle drops.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn table(&self, name: &str) -> DbResult<Tree> {
        if name.is_empty() || name.as_bytes() == SLED_DEFAULT_TREE {
            return Err(DatabaseError::InvalidQuery(format!(
                "invalid table name {name:?}"
            )));
        }
        Ok(self.db.open_tree(name)?)
    }

    /// Reads never create tables.
    fn existing_table(&self, name: &str) -> DbResult<Option<Tree>> {
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|n| &n[..] == name.as_bytes());
        if exists {
            self.table(name).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn put(&self, table: &str, key: &str, value: &serde_json::Value) -> DbResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.table(table)?.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get(&self, table: &str, key: &str) -> DbResult<Option<serde_json::Value>> {
        let Some(tree) = self.existing_table(table)? else {
            return Ok(None);
        };
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
            None => Ok(None),
        }
    }

    /// True if the key existed.
    pub fn delete(&self, table: &str, key: &str) -> DbResult<bool> {
        match self.existing_table(table)? {
            Some(tree) => Ok(tree.remove(key.as_bytes())?.is_some()),
            None => Ok(false),
        }
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn scan(&self, table: &str, prefix: &str) -> DbResult<Vec<(String, serde_json::Value)>> {
        let mut rows = Vec::new();
        let Some(tree) = self.existing_table(table)? else {
            return Ok(rows);
        };
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            rows.push((String::from_utf8_lossy(&key).into_owned(), decode_value(&value)?));
        }
        Ok(rows)
    }

    /// User tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter(|n| &n[..] != SLED_DEFAULT_TREE)
            .map(|n| String::from_utf8_lossy(&n).into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn table_len(&self, table: &str) -> DbResult<usize> {
        Ok(self.existing_table(table)?.map(|t| t.len()).unwrap_or(0))
    }

    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn export(&self) -> DbResult<DatabaseDump> {
        let mut dump = DatabaseDump::default();
        for name in self.tables() {
            let tree = self.table(&name)?;
            let mut entries = Vec::with_capacity(tree.len());
            for item in tree.iter() {
                let (k, v) = item?;
                entries.push((k.to_vec(), v.to_vec()));
            }
            dump.tables.push(TableDump { name, entries });
        }
        Ok(dump)
    }

    /// Load a dump, one atomic batch per table.
    pub fn import(&self, dump: &DatabaseDump) -> DbResult<usize> {
        for table in &dump.tables {
            let mut batch = Batch::default();
            for (k, v) in &table.entries {
                batch.insert(k.as_slice(), v.as_slice());
            }
            self.table(&table.name)?.apply_batch(batch)?;
        }
        self.db.flush()?;
        Ok(dump.entry_count())
    }
}

fn decode_value(bytes: &[u8]) -> DbResult<serde_json::Value> {
    serde_json::from_slice(bytes).map_err(|e| DatabaseError::Serialization(e.to_string()))
}
