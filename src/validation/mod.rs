pub mod script;
pub mod sql_validator;

pub use script::ScriptSplitter;
pub use sql_validator::{SqlValidator, StatementKind};
