use thiserror::Error;

/// Explorer error types
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {message} (statement: {statement})")]
    Query { message: String, statement: String },

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),
}

impl ExplorerError {
    pub fn query(message: impl Into<String>, statement: impl Into<String>) -> Self {
        ExplorerError::Query {
            message: message.into(),
            statement: statement.into(),
        }
    }

    /// Stable code used when the error is shown as a user notification
    pub fn code(&self) -> &'static str {
        match self {
            ExplorerError::Connection(_) => "CONNECTION_ERROR",
            ExplorerError::Query { .. } => "QUERY_ERROR",
            ExplorerError::Parse { .. } => "PARSE_ERROR",
            ExplorerError::Storage(_) => "STORAGE_ERROR",
            ExplorerError::Io(_) => "IO_ERROR",
            ExplorerError::Validation(_) => "VALIDATION_ERROR",
            ExplorerError::NotSupported(_) => "NOT_SUPPORTED",
            ExplorerError::UnknownConnection(_) => "UNKNOWN_CONNECTION",
        }
    }

    /// Message shown to the user: the server's own text for query errors
    pub fn user_message(&self) -> String {
        match self {
            ExplorerError::Query { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Convert rusqlite::Error to ExplorerError
impl From<rusqlite::Error> for ExplorerError {
    fn from(err: rusqlite::Error) -> Self {
        ExplorerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::Storage(format!("Serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let error = ExplorerError::Connection("refused".to_string());
        assert_eq!(error.code(), "CONNECTION_ERROR");

        let error = ExplorerError::query("Table 'x' doesn't exist", "SELECT * FROM x");
        assert_eq!(error.code(), "QUERY_ERROR");
        assert_eq!(error.user_message(), "Table 'x' doesn't exist");
        assert!(error.to_string().contains("SELECT * FROM x"));
    }

    #[test]
    fn test_storage_error_from_rusqlite() {
        let error: ExplorerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(error.code(), "STORAGE_ERROR");
    }
}
