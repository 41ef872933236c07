//! # Database
//!
//! Named embedded databases on sled. A database is a directory under
//! `{data_dir}/databases/`, its tables are sled trees, and values are
//! JSON. Without a data directory every database is an in-memory sled
//! instance that disappears on shutdown.

pub mod manager;
pub mod query;
pub mod store;
pub mod types;

pub use manager::{validate_database_name, DatabaseManager};
pub use query::Query;
pub use store::{DatabaseDump, Store};
pub use types::{
    DatabaseConfig, DatabaseError, DatabaseInfo, DbResult, QueryResult, QueryRow,
};
