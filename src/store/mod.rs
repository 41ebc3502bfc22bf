//! Persistence layer: libSQL-backed storage for departments and their messages.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{AddressRecord, ContentRecord};
pub use traits::Database;
