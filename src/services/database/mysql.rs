// MySQL adapter: one dedicated server session per explorer session
use mysql_async::{prelude::*, Conn, OptsBuilder, Row, SslOpts, Value as MySqlValue};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::ExplorerError;
use crate::models::{ConnectionDescriptor, QueryOutput, Row as JsonRow};
use crate::services::database::adapter::{Connector, DatabaseAdapter};

/// Opens MySQL sessions with a bounded connect time
pub struct MySqlConnector {
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Build MySQL connection options from a descriptor
    fn build_opts(descriptor: &ConnectionDescriptor) -> OptsBuilder {
        let mut opts = OptsBuilder::default()
            .ip_or_hostname(descriptor.host.clone())
            .tcp_port(descriptor.port)
            .user(Some(descriptor.user.clone()))
            .pass(descriptor.password.clone())
            .db_name(descriptor.database.clone())
            .prefer_socket(false);

        if let Some(cert_path) = &descriptor.cert_path {
            let ssl = SslOpts::default().with_root_certs(vec![cert_path.clone().into()]);
            opts = opts.ssl_opts(ssl);
        }

        opts
    }
}

#[async_trait::async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn DatabaseAdapter>, ExplorerError> {
        let session = descriptor.session_identity().key();
        tracing::debug!(
            "Opening MySQL session {} (tls: {}, multiple statements: {})",
            session,
            descriptor.cert_path.is_some(),
            descriptor.multiple_statements
        );

        let conn = tokio::time::timeout(self.connect_timeout, Conn::new(Self::build_opts(descriptor)))
            .await
            .map_err(|_| {
                ExplorerError::Connection(format!(
                    "Timed out after {} seconds connecting to {}",
                    self.connect_timeout.as_secs(),
                    session
                ))
            })?
            .map_err(|e| ExplorerError::Connection(format!("Failed to connect to {}: {}", session, e)))?;

        Ok(Arc::new(MySQLAdapter::new(conn, session)))
    }
}

pub struct MySQLAdapter {
    conn: Mutex<Option<Conn>>,
    broken: AtomicBool,
    session: String,
}

impl MySQLAdapter {
    pub fn new(conn: Conn, session: String) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            broken: AtomicBool::new(false),
            session,
        }
    }

    async fn run(conn: &mut Conn, sql: &str) -> Result<QueryOutput, mysql_async::Error> {
        let result = conn.query_iter(sql).await?;
        let returns_rows = !result.columns_ref().is_empty();
        let affected_rows = result.affected_rows();
        let rows: Vec<Row> = result.collect_and_drop().await?;

        if returns_rows {
            Ok(QueryOutput::Rows(rows.into_iter().map(Self::row_to_json).collect()))
        } else {
            Ok(QueryOutput::RowsAffected(affected_rows))
        }
    }

    /// Transport-level failures leave the session unusable
    fn is_transport_error(err: &mysql_async::Error) -> bool {
        matches!(err, mysql_async::Error::Io(_) | mysql_async::Error::Driver(_))
    }

    /// The server's own message for rejections, the driver's description otherwise
    fn error_message(err: &mysql_async::Error) -> String {
        match err {
            mysql_async::Error::Server(server) => server.message.clone(),
            other => other.to_string(),
        }
    }

    fn row_to_json(row: Row) -> JsonRow {
        let mut row_obj = serde_json::Map::new();
        let columns = row.columns_ref();

        for (idx, column) in columns.iter().enumerate() {
            let column_name = column.name_str();
            let value: Value = match row.get_opt::<MySqlValue, usize>(idx) {
                Some(Ok(mysql_val)) => Self::mysql_value_to_json(mysql_val),
                Some(Err(_)) => Value::Null,
                None => Value::Null,
            };
            row_obj.insert(column_name.to_string(), value);
        }
        row_obj
    }

    /// Helper function to convert MySQL Value to JSON Value
    fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => json!(s),
                Err(_) => Value::Null,
            },
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    async fn execute_query(&self, sql: &str, timeout: Duration) -> Result<QueryOutput, ExplorerError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| ExplorerError::Connection(format!("Session {} is closed", self.session)))?;

        let start_time = Instant::now();
        match tokio::time::timeout(timeout, Self::run(conn, sql)).await {
            Err(_) => {
                // The protocol state is unknown once a query is abandoned mid-flight
                self.broken.store(true, Ordering::SeqCst);
                Err(ExplorerError::query(
                    format!("Query timeout after {} seconds", timeout.as_secs()),
                    sql,
                ))
            }
            Ok(Err(e)) => {
                if Self::is_transport_error(&e) {
                    tracing::warn!("Session {} is broken: {}", self.session, e);
                    self.broken.store(true, Ordering::SeqCst);
                }
                Err(ExplorerError::query(Self::error_message(&e), sql))
            }
            Ok(Ok(output)) => {
                tracing::debug!(
                    "Query on {} finished in {} ms",
                    self.session,
                    start_time.elapsed().as_millis()
                );
                Ok(output)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.broken.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.broken.store(true, Ordering::SeqCst);
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            if let Err(e) = conn.disconnect().await {
                tracing::debug!("Error while closing session {}: {}", self.session, e);
            }
        }
    }

    fn database_type(&self) -> &str {
        "mysql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_value_to_json() {
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::NULL), Value::Null);
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Bytes(b"app_db".to_vec())),
            json!("app_db")
        );
        assert_eq!(MySQLAdapter::mysql_value_to_json(MySqlValue::Int(-3)), json!(-3));
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Date(2024, 1, 2, 3, 4, 5, 0)),
            json!("2024-01-02 03:04:05")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(MySqlValue::Time(true, 1, 2, 3, 4, 0)),
            json!("-26:03:04")
        );
    }
}
