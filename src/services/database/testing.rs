// Scripted in-process driver used by unit tests
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::ExplorerError;
use crate::models::{ConnectionDescriptor, QueryOutput, Row};
use crate::services::database::adapter::{Connector, DatabaseAdapter};

enum Scripted {
    Output(QueryOutput),
    Reject(String),
    Transport(String),
}

/// Fake server: statements answer with scripted results, everything else affects 0 rows
#[derive(Default)]
pub struct FakeServer {
    scripted: Mutex<HashMap<String, Scripted>>,
    executed: Mutex<Vec<String>>,
    connects: AtomicUsize,
    refuse: Mutex<Option<String>>,
    slow_hosts: Mutex<HashMap<String, Duration>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, sql: &str, output: QueryOutput) {
        self.scripted.lock().unwrap().insert(sql.to_string(), Scripted::Output(output));
    }

    pub fn reject(&self, sql: &str, message: &str) {
        self.scripted.lock().unwrap().insert(sql.to_string(), Scripted::Reject(message.to_string()));
    }

    /// The statement fails and the session observing it becomes broken
    pub fn drop_link_on(&self, sql: &str) {
        self.scripted
            .lock()
            .unwrap()
            .insert(sql.to_string(), Scripted::Transport("Lost connection to MySQL server".to_string()));
    }

    pub fn refuse_connections(&self, message: Option<&str>) {
        *self.refuse.lock().unwrap() = message.map(str::to_string);
    }

    /// Connecting to `host` takes `delay` before it succeeds
    pub fn delay_connect(&self, host: &str, delay: Duration) {
        self.slow_hosts.lock().unwrap().insert(host.to_string(), delay);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// Single-column rows
pub fn rows(column: &str, values: &[&str]) -> QueryOutput {
    QueryOutput::Rows(
        values
            .iter()
            .map(|value| {
                let mut row = Row::new();
                row.insert(column.to_string(), json!(value));
                row
            })
            .collect(),
    )
}

/// Multi-column rows given as (column, value) pairs
pub fn records(records: &[&[(&str, &str)]]) -> QueryOutput {
    QueryOutput::Rows(
        records
            .iter()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(column, value)| (column.to_string(), json!(value)))
                    .collect()
            })
            .collect(),
    )
}

pub struct FakeConnector {
    server: Arc<FakeServer>,
}

impl FakeConnector {
    pub fn new(server: Arc<FakeServer>) -> Self {
        Self { server }
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Arc<dyn DatabaseAdapter>, ExplorerError> {
        let refused = self.server.refuse.lock().unwrap().clone();
        if let Some(message) = refused {
            return Err(ExplorerError::Connection(message));
        }
        let delay = self.server.slow_hosts.lock().unwrap().get(&descriptor.host).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeAdapter {
            server: self.server.clone(),
            broken: AtomicBool::new(false),
        }))
    }
}

pub struct FakeAdapter {
    server: Arc<FakeServer>,
    broken: AtomicBool,
}

#[async_trait::async_trait]
impl DatabaseAdapter for FakeAdapter {
    async fn execute_query(&self, sql: &str, _timeout: Duration) -> Result<QueryOutput, ExplorerError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ExplorerError::Connection("Session is closed".to_string()));
        }
        self.server.executed.lock().unwrap().push(sql.to_string());

        match self.server.scripted.lock().unwrap().get(sql) {
            Some(Scripted::Output(output)) => Ok(output.clone()),
            Some(Scripted::Reject(message)) => Err(ExplorerError::query(message.clone(), sql)),
            Some(Scripted::Transport(message)) => {
                self.broken.store(true, Ordering::SeqCst);
                Err(ExplorerError::query(message.clone(), sql))
            }
            None => Ok(QueryOutput::RowsAffected(0)),
        }
    }

    fn is_healthy(&self) -> bool {
        !self.broken.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    fn database_type(&self) -> &str {
        "fake"
    }
}
