use serde::Deserialize;
use std::env;
use std::io::IsTerminal;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl LoggingConfig {
    /// Colored output for `style` values `always`, `never` or `auto` (color on a terminal)
    pub fn use_ansi(&self) -> bool {
        match self.style.to_ascii_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => std::io::stdout().is_terminal(),
        }
    }
}

/// Connection registered at startup, given as a `mysql://` URL
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    pub url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("storage.path", "./explorer_state.db")?
            .set_default("session.connect_timeout_secs", 10)?
            .set_default("session.query_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        // Load from environment variables
        if let Ok(path) = env::var("EXPLORER_STATE_PATH") {
            builder = builder.set_override("storage.path", path)?;
        }

        if let Ok(secs) = env::var("EXPLORER_CONNECT_TIMEOUT") {
            builder = builder.set_override("session.connect_timeout_secs", secs.parse::<u64>().unwrap_or(10))?;
        }

        if let Ok(secs) = env::var("EXPLORER_QUERY_TIMEOUT") {
            builder = builder.set_override("session.query_timeout_secs", secs.parse::<u64>().unwrap_or(30))?;
        }

        if let Ok(url) = env::var("MYSQL_URL") {
            builder = builder.set_override("connection.url", Some(url))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(log_style) = env::var("RUST_LOG_STYLE") {
            builder = builder.set_override("logging.style", log_style)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.session.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.session.query_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        if env::var("EXPLORER_QUERY_TIMEOUT").is_err() {
            assert_eq!(config.query_timeout(), Duration::from_secs(30));
        }
        if env::var("EXPLORER_CONNECT_TIMEOUT").is_err() {
            assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        }
        assert!(!config.storage.path.is_empty());
        assert!(!config.logging.level.is_empty());
    }

    #[test]
    fn test_log_style() {
        let logging = |style: &str| LoggingConfig {
            level: "debug".to_string(),
            style: style.to_string(),
        };
        assert!(logging("always").use_ansi());
        assert!(logging("ALWAYS").use_ansi());
        assert!(!logging("never").use_ansi());
    }
}
