pub mod database; // Driver seam, MySQL adapter and metadata queries
pub mod explorer;
pub mod query_executor;
pub mod session_manager;
pub mod tree_cache; // Children cache and persisted expansion state

pub use explorer::*;
pub use query_executor::*;
pub use session_manager::*;
pub use tree_cache::*;
