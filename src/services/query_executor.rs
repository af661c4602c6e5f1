use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::ExplorerError;
use crate::models::{BatchReport, QueryOutput, StatementOutcome};
use crate::services::database::DatabaseAdapter;
use crate::validation::ScriptSplitter;

/// Runs statements on a borrowed session
pub struct QueryExecutor {
    query_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Execute one statement; a rejection carries the server's message and the statement
    pub async fn execute(&self, conn: &dyn DatabaseAdapter, sql: &str) -> Result<QueryOutput, ExplorerError> {
        tracing::debug!("Executing: {}", sql);
        conn.execute_query(sql, self.query_timeout).await
    }

    /// Execute statements strictly in order on the same session.
    ///
    /// A failing statement is recorded and the batch moves on to the next one.
    pub async fn run_batch<I, S>(&self, conn: &dyn DatabaseAdapter, statements: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let start_time = Instant::now();
        let mut report = BatchReport::default();

        for statement in statements {
            let statement = statement.into();
            let result = self.execute(conn, &statement).await;
            if let Err(e) = &result {
                tracing::warn!("Statement failed, continuing batch: {} ({})", statement, e.user_message());
            }
            report.outcomes.push(StatementOutcome { statement, result });
        }

        report.execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::info!("{} in {} ms", report.summary(), report.execution_time_ms);
        report
    }

    /// Split a script and run it as a batch; a malformed script executes nothing
    pub async fn run_script(&self, conn: &dyn DatabaseAdapter, script: &str) -> Result<BatchReport, ExplorerError> {
        let statements = ScriptSplitter::split(script)?;
        Ok(self.run_batch(conn, statements).await)
    }

    /// Read a script file and run it as a batch
    pub async fn run_file(&self, conn: &dyn DatabaseAdapter, path: impl AsRef<Path>) -> Result<BatchReport, ExplorerError> {
        let path = path.as_ref();
        let script = tokio::fs::read_to_string(path).await?;
        tracing::info!("Running script file {}", path.display());
        self.run_script(conn, &script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionDescriptor;
    use crate::services::database::testing::{rows, FakeConnector, FakeServer};
    use crate::services::database::Connector;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn session(server: &Arc<FakeServer>) -> Arc<dyn DatabaseAdapter> {
        FakeConnector::new(server.clone())
            .connect(&ConnectionDescriptor::new("localhost", 3306, "root"))
            .await
            .unwrap()
    }

    fn executor() -> QueryExecutor {
        QueryExecutor::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_execute_returns_server_message() {
        let server = FakeServer::new();
        server.reject("SELECT * FROM missing", "Table 'app_db.missing' doesn't exist");
        let conn = session(&server).await;

        let err = executor().execute(conn.as_ref(), "SELECT * FROM missing").await.unwrap_err();
        match err {
            ExplorerError::Query { message, statement } => {
                assert_eq!(message, "Table 'app_db.missing' doesn't exist");
                assert_eq!(statement, "SELECT * FROM missing");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(conn.is_healthy());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure() {
        let server = FakeServer::new();
        server.respond("TRUNCATE TABLE `a`.`t1`", QueryOutput::RowsAffected(0));
        server.reject("TRUNCATE TABLE `a`.`t2`", "Cannot truncate a table referenced in a foreign key constraint");
        let conn = session(&server).await;

        let statements = ["TRUNCATE TABLE `a`.`t1`", "TRUNCATE TABLE `a`.`t2`", "TRUNCATE TABLE `a`.`t3`"];
        let report = executor().run_batch(conn.as_ref(), statements).await;

        let outcomes: Vec<bool> = report.outcomes.iter().map(|o| o.is_success()).collect();
        assert_eq!(outcomes, vec![true, false, true]);
        assert_eq!(server.executed(), statements.to_vec());
        assert_eq!(report.failures().count(), 1);
        assert!(report.summary().contains("`a`.`t2`"));
    }

    #[tokio::test]
    async fn test_script_runs_in_order() {
        let server = FakeServer::new();
        server.respond("SELECT 1", rows("1", &["1"]));
        let conn = session(&server).await;

        let report = executor()
            .run_script(conn.as_ref(), "USE app_db;\nSELECT 1;\n")
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(server.executed(), vec!["USE app_db", "SELECT 1"]);
        assert_eq!(report.outcomes[1].result.as_ref().unwrap().rows().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_script_executes_nothing() {
        let server = FakeServer::new();
        let conn = session(&server).await;

        let err = executor()
            .run_script(conn.as_ref(), "SELECT 1;\nSELECT 'unterminated;")
            .await
            .unwrap_err();

        assert!(matches!(err, ExplorerError::Parse { line: 2, .. }));
        assert!(server.executed().is_empty());
    }

    #[tokio::test]
    async fn test_run_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seed.sql");
        std::fs::write(&path, "CREATE TABLE t (id INT);\nINSERT INTO t VALUES (1);").unwrap();

        let server = FakeServer::new();
        let conn = session(&server).await;
        let report = executor().run_file(conn.as_ref(), &path).await.unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(server.executed()[0], "CREATE TABLE t (id INT)");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let server = FakeServer::new();
        let conn = session(&server).await;
        let err = executor().run_file(conn.as_ref(), "/nonexistent/seed.sql").await.unwrap_err();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
