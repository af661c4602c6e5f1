use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ExplorerError;
use crate::models::{ConnectionDescriptor, ExpansionState};
use crate::storage::{ConnectionStore, ExpansionStore};

/// SQLite storage for connection descriptors and tree expansion state
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            let mut cleaned = path_str.trim_start_matches("sqlite:");
            cleaned = cleaned.trim_start_matches("//");
            cleaned
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)?;
        Self::from_connection(conn).await
    }

    /// Storage that lives only as long as the process
    pub async fn in_memory() -> SqliteResult<Self> {
        Self::from_connection(Connection::open_in_memory()?).await
    }

    async fn from_connection(conn: Connection) -> SqliteResult<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id TEXT PRIMARY KEY,
                identity TEXT NOT NULL,
                descriptor_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS expansion_state (
                node_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_connections_created ON connections(created_at)",
            [],
        )?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ConnectionStore for SqliteStorage {
    async fn list_connections(&self) -> Result<Vec<ConnectionDescriptor>, ExplorerError> {
        let db_conn = self.conn.lock().await;
        let mut stmt = db_conn.prepare("SELECT descriptor_json FROM connections ORDER BY created_at, id")?;

        let rows: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<_>>()?;

        let mut descriptors = Vec::with_capacity(rows.len());
        for json in rows {
            descriptors.push(serde_json::from_str(&json)?);
        }
        Ok(descriptors)
    }

    async fn save_connection(&self, descriptor: &ConnectionDescriptor) -> Result<(), ExplorerError> {
        let descriptor_json = serde_json::to_string(descriptor)?;
        let db_conn = self.conn.lock().await;
        db_conn.execute(
            r#"
            INSERT INTO connections (id, identity, descriptor_json, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                identity = excluded.identity,
                descriptor_json = excluded.descriptor_json
            "#,
            rusqlite::params![
                descriptor.id,
                descriptor.identity().as_str(),
                descriptor_json,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn delete_connection(&self, id: &str) -> Result<bool, ExplorerError> {
        let db_conn = self.conn.lock().await;
        let rows_affected = db_conn.execute("DELETE FROM connections WHERE id = ?1", rusqlite::params![id])?;
        Ok(rows_affected > 0)
    }
}

#[async_trait::async_trait]
impl ExpansionStore for SqliteStorage {
    async fn load_expansion_states(&self) -> Result<Vec<(String, ExpansionState)>, ExplorerError> {
        let db_conn = self.conn.lock().await;
        let mut stmt = db_conn.prepare("SELECT node_id, state FROM expansion_state")?;

        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<SqliteResult<_>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(node_id, state)| {
                let parsed = ExpansionState::parse(&state);
                if parsed.is_none() {
                    tracing::warn!("Ignoring unknown expansion state '{}' for {}", state, node_id);
                }
                parsed.map(|state| (node_id, state))
            })
            .collect())
    }

    async fn save_expansion_state(&self, node_key: &str, state: ExpansionState) -> Result<(), ExplorerError> {
        if state == ExpansionState::Unset {
            return self.remove_expansion_state(node_key).await;
        }

        let db_conn = self.conn.lock().await;
        db_conn.execute(
            r#"
            INSERT INTO expansion_state (node_id, state, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(node_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![node_key, state.as_str(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn remove_expansion_state(&self, node_key: &str) -> Result<(), ExplorerError> {
        let db_conn = self.conn.lock().await;
        db_conn.execute("DELETE FROM expansion_state WHERE node_id = ?1", rusqlite::params![node_key])?;
        Ok(())
    }

    async fn remove_expansion_states_with_prefix(&self, prefix: &str) -> Result<usize, ExplorerError> {
        let db_conn = self.conn.lock().await;
        // substr instead of LIKE: keys may contain '%' and '_'
        let removed = db_conn.execute(
            "DELETE FROM expansion_state WHERE substr(node_id, 1, length(?1)) = ?1",
            rusqlite::params![prefix],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_storage_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = tokio_test::block_on(SqliteStorage::new(&db_path));
        assert!(storage.is_ok());
    }

    #[test]
    fn test_schema_initialization() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = tokio_test::block_on(SqliteStorage::new(&db_path)).unwrap();

        let conn = tokio_test::block_on(storage.conn.lock());
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name IN ('connections', 'expansion_state')")
            .unwrap();

        let tables: Vec<String> = stmt.query_map([], |row| row.get(0)).unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(tables.len(), 2);
        assert!(tables.contains(&"connections".to_string()));
        assert!(tables.contains(&"expansion_state".to_string()));
    }

    #[tokio::test]
    async fn test_connection_crud_never_stores_password() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut descriptor = ConnectionDescriptor::new("localhost", 3306, "root").with_password("hunter2");
        descriptor.database = Some("app_db".to_string());

        storage.save_connection(&descriptor).await.unwrap();
        // Saving twice updates in place
        storage.save_connection(&descriptor).await.unwrap();

        let listed = storage.list_connections().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, descriptor.id);
        assert_eq!(listed[0].database.as_deref(), Some("app_db"));
        assert!(listed[0].password.is_none());

        {
            let conn = storage.conn.lock().await;
            let json: String = conn
                .query_row("SELECT descriptor_json FROM connections", [], |row| row.get(0))
                .unwrap();
            assert!(!json.contains("hunter2"));
        }

        assert!(storage.delete_connection(&descriptor.id).await.unwrap());
        assert!(!storage.delete_connection(&descriptor.id).await.unwrap());
        assert!(storage.list_connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expansion_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("state.db");

        {
            let storage = SqliteStorage::new(&db_path).await.unwrap();
            storage.save_expansion_state("a", ExpansionState::Expanded).await.unwrap();
            storage.save_expansion_state("b", ExpansionState::Expanded).await.unwrap();
            storage.save_expansion_state("b", ExpansionState::Collapsed).await.unwrap();
            storage.save_expansion_state("c", ExpansionState::Expanded).await.unwrap();
            storage.save_expansion_state("c", ExpansionState::Unset).await.unwrap();
        }

        let storage = SqliteStorage::new(&db_path).await.unwrap();
        let mut states = storage.load_expansion_states().await.unwrap();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            states,
            vec![
                ("a".to_string(), ExpansionState::Expanded),
                ("b".to_string(), ExpansionState::Collapsed),
            ]
        );
    }

    #[tokio::test]
    async fn test_prefix_removal_keeps_other_keys() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        for key in ["root@a:3306/=db/table", "root@a:3306//connection", "root@ab:3306//connection", "x%y/"] {
            storage.save_expansion_state(key, ExpansionState::Expanded).await.unwrap();
        }

        assert_eq!(storage.remove_expansion_states_with_prefix("root@a:3306/").await.unwrap(), 2);
        assert_eq!(storage.remove_expansion_states_with_prefix("x_y/").await.unwrap(), 0);

        let mut keys: Vec<String> = storage
            .load_expansion_states()
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["root@ab:3306//connection".to_string(), "x%y/".to_string()]);
    }
}
