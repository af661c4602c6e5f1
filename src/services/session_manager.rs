use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::error::ExplorerError;
use crate::models::{ConnectionDescriptor, ConnectionIdentity, NodeIdentity};
use crate::services::database::{Connector, DatabaseAdapter};

/// Most recently activated descriptors, overall and among those pinned to a database
#[derive(Debug, Default)]
struct LastUsed {
    any: Option<ConnectionDescriptor>,
    with_database: Option<ConnectionDescriptor>,
}

/// Session manager that owns every live server session.
///
/// Sessions are keyed by the descriptor's session identity: one for the connection
/// itself and one per default database opened through it. Callers borrow a session
/// for a single call and never close it themselves.
pub struct ConnectionSessionManager {
    connector: Arc<dyn Connector>,
    sessions: Arc<RwLock<HashMap<NodeIdentity, Arc<dyn DatabaseAdapter>>>>,
    // One gate per key; opening a session never holds the map lock
    opening: Mutex<HashMap<NodeIdentity, Arc<tokio::sync::Mutex<()>>>>,
    last_used: Mutex<LastUsed>,
}

impl ConnectionSessionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            opening: Mutex::new(HashMap::new()),
            last_used: Mutex::new(LastUsed::default()),
        }
    }

    /// Get the live session for `descriptor`, opening one when none exists, the cached
    /// one reports a broken state, or `force_fresh` is set.
    /// This method is safe to call concurrently from multiple tasks
    pub async fn get_connection(
        &self,
        descriptor: &ConnectionDescriptor,
        force_fresh: bool,
    ) -> Result<Arc<dyn DatabaseAdapter>, ExplorerError> {
        let key = descriptor.session_identity();

        // Fast path: healthy session already open (read lock)
        if !force_fresh {
            if let Some(session) = self.healthy_session(&key).await {
                tracing::debug!("Reusing session for: {}", key);
                self.mark_used(descriptor);
                return Ok(session);
            }
        }

        // Slow path: only callers opening the same key wait on each other
        let gate = self.opening_gate(&key);
        let _opening = gate.lock().await;

        // Double-check in case another task opened the session while we were waiting
        if !force_fresh {
            if let Some(session) = self.healthy_session(&key).await {
                tracing::debug!("Session opened by another task for: {}", key);
                self.mark_used(descriptor);
                return Ok(session);
            }
        }

        tracing::info!("Opening session for: {}", key);
        let session = self.connector.connect(descriptor).await.map_err(|e| {
            tracing::error!("Failed to open session for {}: {}", key, e);
            e
        })?;

        let stale = self.sessions.write().await.insert(key.clone(), session.clone());
        if let Some(stale) = stale {
            if stale.is_healthy() {
                tracing::info!("Replacing session for: {}", key);
            } else {
                tracing::warn!("Discarding broken session for: {}", key);
            }
            stale.disconnect().await;
        }

        tracing::info!("Session ready for: {} ({})", key, session.database_type());
        self.mark_used(descriptor);
        Ok(session)
    }

    /// Release the session opened for `descriptor`; a no-op when none exists
    pub async fn close_connection(&self, descriptor: &ConnectionDescriptor) -> bool {
        let key = descriptor.session_identity();
        let removed = self.sessions.write().await.remove(&key);

        {
            let mut last_used = self.lock_last_used();
            let opened_here = |d: &Option<ConnectionDescriptor>| d.as_ref().is_some_and(|d| d.session_identity() == key);
            if opened_here(&last_used.any) {
                last_used.any = None;
            }
            if opened_here(&last_used.with_database) {
                last_used.with_database = None;
            }
        }

        match removed {
            Some(session) => {
                session.disconnect().await;
                tracing::info!("Closed session for: {}", key);
                true
            }
            None => false,
        }
    }

    /// Close every session of one connection, database-level ones included
    pub async fn close_all(&self, connection: &ConnectionIdentity) -> usize {
        let removed: Vec<(NodeIdentity, Arc<dyn DatabaseAdapter>)> = {
            let mut sessions = self.sessions.write().await;
            let keys: Vec<NodeIdentity> = sessions.keys().filter(|key| key.is_under(connection)).cloned().collect();
            keys.into_iter()
                .filter_map(|key| sessions.remove(&key).map(|session| (key, session)))
                .collect()
        };

        for (key, session) in &removed {
            session.disconnect().await;
            tracing::info!("Closed session for: {}", key);
        }

        let mut last_used = self.lock_last_used();
        let belongs = |d: &Option<ConnectionDescriptor>| d.as_ref().is_some_and(|d| &d.identity() == connection);
        if belongs(&last_used.any) {
            last_used.any = None;
        }
        if belongs(&last_used.with_database) {
            last_used.with_database = None;
        }

        removed.len()
    }

    /// Close every open session
    pub async fn shutdown(&self) {
        let sessions: Vec<(NodeIdentity, Arc<dyn DatabaseAdapter>)> = self.sessions.write().await.drain().collect();
        for (key, session) in sessions {
            session.disconnect().await;
            tracing::debug!("Closed session for: {}", key);
        }
        self.opening.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.lock_last_used() = LastUsed::default();
    }

    /// Most recently activated descriptor; with `require_database`, the most recent
    /// one that had a default database
    pub fn last_used(&self, require_database: bool) -> Option<ConnectionDescriptor> {
        let last_used = self.lock_last_used();
        if require_database {
            last_used.with_database.clone()
        } else {
            last_used.any.clone()
        }
    }

    /// Get the number of open sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn healthy_session(&self, key: &NodeIdentity) -> Option<Arc<dyn DatabaseAdapter>> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(key).filter(|session| session.is_healthy()).cloned();
        session
    }

    fn opening_gate(&self, key: &NodeIdentity) -> Arc<tokio::sync::Mutex<()>> {
        self.opening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn mark_used(&self, descriptor: &ConnectionDescriptor) {
        let mut last_used = self.lock_last_used();
        if descriptor.database.is_some() {
            last_used.with_database = Some(descriptor.clone());
        }
        last_used.any = Some(descriptor.clone());
    }

    fn lock_last_used(&self) -> std::sync::MutexGuard<'_, LastUsed> {
        self.last_used.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
