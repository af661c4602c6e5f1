// Database abstraction layer: driver seam plus the MySQL implementation
pub mod adapter;
pub mod metadata;
pub mod mysql;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Connector, DatabaseAdapter};
pub use mysql::{MySQLAdapter, MySqlConnector};
