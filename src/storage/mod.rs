pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::ExplorerError;
use crate::models::{ConnectionDescriptor, ExpansionState};

/// Keyed collection of saved connection descriptors (passwords are never stored)
#[async_trait::async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>, ExplorerError>;

    async fn save_connection(&self, descriptor: &ConnectionDescriptor) -> Result<(), ExplorerError>;

    /// Returns whether a descriptor with that id existed
    async fn delete_connection(&self, id: &str) -> Result<bool, ExplorerError>;
}

/// Durable node-identity -> expansion-state map, last write wins per key
#[async_trait::async_trait]
pub trait ExpansionStore: Send + Sync {
    async fn load_expansion_states(&self) -> Result<Vec<(String, ExpansionState)>, ExplorerError>;

    async fn save_expansion_state(&self, node_key: &str, state: ExpansionState) -> Result<(), ExplorerError>;

    async fn remove_expansion_state(&self, node_key: &str) -> Result<(), ExplorerError>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn remove_expansion_states_with_prefix(&self, prefix: &str) -> Result<usize, ExplorerError>;
}
