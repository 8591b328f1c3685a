//! Shared SQLite persistence machinery.
//!
//! Every store in this crate owns one database file and describes its tables
//! with a versioned schema. `open_database` handles the create / validate /
//! migrate dance so the stores only define tables and migrations.

mod versioned_schema;

pub use versioned_schema::{
    open_database, Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};
