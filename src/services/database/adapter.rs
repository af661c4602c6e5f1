// Database adapter traits: the seam between the explorer core and a concrete driver
use std::sync::Arc;
use std::time::Duration;

use crate::error::ExplorerError;
use crate::models::{ConnectionDescriptor, QueryOutput};

/// A live session with one server.
///
/// Owned by the session manager; other components borrow it for a single call.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Execute one statement on this session.
    /// A server-side rejection leaves the session usable; transport failures and
    /// timeouts mark it broken.
    async fn execute_query(&self, sql: &str, timeout: Duration) -> Result<QueryOutput, ExplorerError>;

    /// False once the session has observed a transport failure or was closed
    fn is_healthy(&self) -> bool;

    /// Release the server session; later queries fail with a connection error
    async fn disconnect(&self);

    /// Get database type
    fn database_type(&self) -> &str;
}

/// Opens new sessions from connection descriptors
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn DatabaseAdapter>, ExplorerError>;
}
