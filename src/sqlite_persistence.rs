//! Generic SQLite schema-versioning helpers shared by every store in the
//! crate: `flow_rows` here, plus whatever else grows a table in the future.

pub mod versioned_schema;

pub use versioned_schema::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
};
