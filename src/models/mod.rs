pub mod connection;
pub mod identity;
pub mod node;
pub mod query;

pub use connection::*;
pub use identity::*;
pub use node::*;
pub use query::*;
