//! Database connection and schema definition helpers

pub mod init;
pub mod table_schema;

pub use init::*;
pub use table_schema::*;
