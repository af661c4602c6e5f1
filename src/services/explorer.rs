// Explorer commands
//
// Entry point used by a tree provider: fetches children through the cache, runs the
// per-kind commands, and invalidates cached entries after structural changes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::ExplorerError;
use crate::models::{
    row_string, BatchReport, ConnectionDescriptor, ConnectionIdentity, ExpansionState, NodeIdentity, NodeKind,
    NodeOperation, QueryOutput, TreeNode,
};
use crate::services::database::{metadata, Connector};
use crate::services::query_executor::QueryExecutor;
use crate::services::session_manager::ConnectionSessionManager;
use crate::services::tree_cache::ObjectTreeCache;
use crate::storage::{ConnectionStore, ExpansionStore};
use crate::validation::SqlValidator;

/// Notification sent to the UI layer after any structural change or invalidation
pub trait TreeRefresh: Send + Sync {
    fn refresh(&self);
}

/// Refresh sink for headless use
pub struct NoopRefresh;

impl TreeRefresh for NoopRefresh {
    fn refresh(&self) {}
}

/// Result of a confirmation-gated command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome<T> {
    Done(T),
    Cancelled { reason: String },
}

impl<T> CommandOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandOutcome::Cancelled { .. })
    }
}

pub struct DatabaseExplorer {
    sessions: ConnectionSessionManager,
    cache: ObjectTreeCache,
    executor: QueryExecutor,
    store: Arc<dyn ConnectionStore>,
    refresher: Arc<dyn TreeRefresh>,
    descriptors: RwLock<BTreeMap<ConnectionIdentity, ConnectionDescriptor>>,
}

impl DatabaseExplorer {
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn ConnectionStore>,
        expansion_store: Arc<dyn ExpansionStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            sessions: ConnectionSessionManager::new(connector),
            cache: ObjectTreeCache::new(expansion_store),
            executor: QueryExecutor::new(query_timeout),
            store,
            refresher: Arc::new(NoopRefresh),
            descriptors: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TreeRefresh>) -> Self {
        self.refresher = refresher;
        self
    }

    /// Load saved connections and persisted expansion state
    pub async fn init(&self) -> Result<usize, ExplorerError> {
        self.cache.init().await?;
        let saved = self.store.list_connections().await?;
        let count = saved.len();
        {
            let mut descriptors = self.descriptors.write().unwrap_or_else(PoisonError::into_inner);
            for descriptor in saved {
                descriptors.entry(descriptor.identity()).or_insert(descriptor);
            }
        }
        tracing::info!("Loaded {} saved connections", count);
        Ok(count)
    }

    /// Persist and register a connection; re-adding the same login replaces its
    /// credentials and drops everything opened with the old ones
    pub async fn add_connection(&self, mut descriptor: ConnectionDescriptor) -> Result<TreeNode, ExplorerError> {
        let identity = descriptor.identity();
        let existing = self.descriptor(&identity).ok();
        if let Some(existing) = &existing {
            descriptor.id = existing.id.clone();
        }

        self.store.save_connection(&descriptor).await?;
        let node = TreeNode::connection(&descriptor);
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone(), descriptor);

        if existing.is_some() {
            self.sessions.close_all(&identity).await;
            self.cache.invalidate_connection(&identity);
        }

        tracing::info!("Registered connection {}", identity);
        self.refresher.refresh();
        Ok(node)
    }

    /// One connection node per registered descriptor, ordered by identity
    pub fn root_nodes(&self) -> Vec<TreeNode> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(TreeNode::connection)
            .collect()
    }

    /// Children of `node`, served from the cache when present.
    ///
    /// With `refresh` the cached entry is bypassed and replaced once the fetch succeeds.
    /// A failed fetch leaves the cache untouched and returns the error.
    pub async fn children(&self, node: &TreeNode, refresh: bool) -> Result<Arc<[TreeNode]>, ExplorerError> {
        if !refresh {
            if let Some(children) = self.cache.get_children(&node.identity) {
                return Ok(children);
            }
        }
        if let Some(children) = metadata::static_children(node) {
            return Ok(self.cache.set_children(&node.identity, children));
        }
        let Some(sql) = metadata::children_query(node) else {
            return Ok(self.cache.set_children(&node.identity, Vec::new()));
        };

        let descriptor = self.descriptor(node.connection_identity())?.without_database();
        let session = self.sessions.get_connection(&descriptor, false).await?;
        let output = self.executor.execute(session.as_ref(), &sql).await?;

        let active = self
            .sessions
            .last_used(true)
            .filter(|last| &last.identity() == node.connection_identity())
            .and_then(|last| last.database);
        let children = metadata::children_from_output(node, &output, active.as_deref());
        Ok(self.cache.set_children(&node.identity, children))
    }

    /// Children for display: a failed fetch becomes a single info node
    pub async fn children_or_placeholder(&self, node: &TreeNode) -> Vec<TreeNode> {
        match self.children(node, false).await {
            Ok(children) => children.to_vec(),
            Err(e) => {
                tracing::warn!("Failed to load children of {}: {}", node.identity, e);
                vec![TreeNode::info(node, e.user_message())]
            }
        }
    }

    pub async fn create_database(&self, node: &TreeNode, name: &str) -> Result<(), ExplorerError> {
        require(node, NodeOperation::CreateDatabase)?;
        let name = SqlValidator::validate_identifier(name)?;
        let sql = format!(
            "CREATE DATABASE {} DEFAULT CHARACTER SET = 'utf8'",
            SqlValidator::quote_identifier(name)
        );

        self.execute_on_connection(node, &sql).await?;
        tracing::info!("Created database {} on {}", name, node.connection_identity());
        self.cache.invalidate(&node.identity);
        self.refresher.refresh();
        Ok(())
    }

    /// Drop the database of `node` once `confirmation` repeats its name
    pub async fn drop_database(&self, node: &TreeNode, confirmation: &str) -> Result<CommandOutcome<()>, ExplorerError> {
        require(node, NodeOperation::DropDatabase)?;
        let name = scoped_database(node)?;
        if let Some(cancelled) = confirm(name, confirmation) {
            return Ok(cancelled);
        }

        let sql = format!("DROP DATABASE {}", SqlValidator::quote_identifier(name));
        self.execute_on_connection(node, &sql).await?;

        let descriptor = self.descriptor(node.connection_identity())?;
        self.sessions.close_connection(&descriptor.with_database(name)).await;
        self.cache.invalidate_connection(node.connection_identity());
        tracing::info!("Dropped database {} on {}", name, node.connection_identity());
        self.refresher.refresh();
        Ok(CommandOutcome::Done(()))
    }

    /// Truncate every base table of the database, continuing past failures.
    ///
    /// The report lists each statement's outcome so failed tables can be shown.
    pub async fn truncate_database(
        &self,
        node: &TreeNode,
        confirmation: &str,
    ) -> Result<CommandOutcome<BatchReport>, ExplorerError> {
        require(node, NodeOperation::TruncateDatabase)?;
        let name = scoped_database(node)?;
        if let Some(cancelled) = confirm(name, confirmation) {
            return Ok(cancelled);
        }

        let descriptor = self.descriptor(node.connection_identity())?.without_database();
        let session = self.sessions.get_connection(&descriptor, false).await?;
        let statements = self
            .executor
            .execute(session.as_ref(), &metadata::truncate_statements_query(name))
            .await?
            .column_strings("trun");

        let report = self.executor.run_batch(session.as_ref(), statements).await;
        if report.all_succeeded() {
            tracing::info!("Truncated {} tables of {}", report.len(), name);
        } else {
            tracing::warn!("Truncate of {} incomplete: {}", name, report.summary());
        }

        let tables = NodeIdentity::group(
            node.connection_identity().clone(),
            Some(name.to_string()),
            NodeKind::TableGroup,
        );
        self.cache.invalidate(&tables);
        self.refresher.refresh();
        Ok(CommandOutcome::Done(report))
    }

    pub async fn drop_table(&self, node: &TreeNode, confirmation: &str) -> Result<CommandOutcome<()>, ExplorerError> {
        require(node, NodeOperation::DropTable)?;
        let (database, table) = scoped_object(node)?;
        if let Some(cancelled) = confirm(table, confirmation) {
            return Ok(cancelled);
        }

        let sql = format!("DROP TABLE {}", SqlValidator::qualified_name(database, table));
        self.execute_on_connection(node, &sql).await?;
        self.invalidate_object(node);
        tracing::info!("Dropped table {}.{}", database, table);
        self.refresher.refresh();
        Ok(CommandOutcome::Done(()))
    }

    pub async fn truncate_table(&self, node: &TreeNode, confirmation: &str) -> Result<CommandOutcome<u64>, ExplorerError> {
        require(node, NodeOperation::TruncateTable)?;
        let (database, table) = scoped_object(node)?;
        if let Some(cancelled) = confirm(table, confirmation) {
            return Ok(cancelled);
        }

        let sql = format!("TRUNCATE TABLE {}", SqlValidator::qualified_name(database, table));
        let output = self.execute_on_connection(node, &sql).await?;
        self.invalidate_object(node);
        tracing::info!("Truncated table {}.{}", database, table);
        self.refresher.refresh();
        Ok(CommandOutcome::Done(match output {
            QueryOutput::RowsAffected(n) => n,
            QueryOutput::Rows(_) => 0,
        }))
    }

    pub async fn rename_table(&self, node: &TreeNode, new_name: &str) -> Result<(), ExplorerError> {
        require(node, NodeOperation::RenameTable)?;
        let (database, table) = scoped_object(node)?;
        let new_name = SqlValidator::validate_identifier(new_name)?;

        let sql = format!(
            "ALTER TABLE {} RENAME TO {}",
            SqlValidator::qualified_name(database, table),
            SqlValidator::qualified_name(database, new_name)
        );
        self.execute_on_connection(node, &sql).await?;
        self.invalidate_object(node);
        tracing::info!("Renamed table {}.{} to {}", database, table, new_name);
        self.refresher.refresh();
        Ok(())
    }

    /// Forget a connection: its saved descriptor, sessions, cached children, and the
    /// expansion state of every node under it
    pub async fn delete_connection(&self, node: &TreeNode) -> Result<bool, ExplorerError> {
        require(node, NodeOperation::DeleteConnection)?;
        let identity = node.connection_identity();
        let descriptor = self.descriptor(identity)?;

        let existed = self.store.delete_connection(&descriptor.id).await?;
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);
        let closed = self.sessions.close_all(identity).await;
        self.cache.invalidate_connection(identity);
        let forgotten = self.cache.forget_connection_expansion(identity).await?;

        tracing::info!(
            "Deleted connection {} ({} sessions closed, {} expansion states forgotten)",
            identity,
            closed,
            forgotten
        );
        self.refresher.refresh();
        Ok(existed)
    }

    /// Activate the session a query editor for `node` will use.
    ///
    /// Database nodes always get a fresh session pinned to that database, which then
    /// shows as the active database.
    pub async fn new_query(&self, node: &TreeNode) -> Result<ConnectionDescriptor, ExplorerError> {
        require(node, NodeOperation::NewQuery)?;
        let descriptor = self.scope_descriptor(node)?;
        let force_fresh = node.database().is_some();
        self.sessions.get_connection(&descriptor, force_fresh).await?;

        if force_fresh {
            self.cache.invalidate(&NodeIdentity::connection(node.connection_identity().clone()));
            self.refresher.refresh();
        }
        Ok(descriptor)
    }

    /// Run script text on the session of `node`
    pub async fn run_script(&self, node: &TreeNode, script: &str) -> Result<BatchReport, ExplorerError> {
        require(node, NodeOperation::RunScript)?;
        let descriptor = self.scope_descriptor(node)?;
        let session = self.sessions.get_connection(&descriptor, false).await?;
        let report = self.executor.run_script(session.as_ref(), script).await?;
        self.after_script(node, &report);
        Ok(report)
    }

    /// Run a script file on the session of a database node
    pub async fn import_file(&self, node: &TreeNode, path: impl AsRef<Path>) -> Result<BatchReport, ExplorerError> {
        require(node, NodeOperation::ImportScript)?;
        let descriptor = self.scope_descriptor(node)?;
        let session = self.sessions.get_connection(&descriptor, false).await?;
        let report = self.executor.run_file(session.as_ref(), path).await?;
        self.after_script(node, &report);
        Ok(report)
    }

    /// Definition text of a table, view, routine or trigger
    pub async fn show_source(&self, node: &TreeNode) -> Result<String, ExplorerError> {
        require(node, NodeOperation::ShowSource)?;
        let (sql, column) = metadata::source_query(node)
            .ok_or_else(|| ExplorerError::Validation(format!("{} has no database scope", node.identity)))?;

        let output = self.execute_on_connection(node, &sql).await?;
        output
            .rows()
            .first()
            .and_then(|row| row_string(row, column))
            .ok_or_else(|| ExplorerError::query("No definition returned", sql))
    }

    pub fn select_template(&self, node: &TreeNode) -> Result<String, ExplorerError> {
        require(node, NodeOperation::SelectTemplate)?;
        let (database, object) = scoped_object(node)?;
        Ok(format!(
            "SELECT * FROM {} LIMIT 100;",
            SqlValidator::qualified_name(database, object)
        ))
    }

    /// Drop the cached children of `node` so the next expansion refetches them
    pub fn refresh_node(&self, node: &TreeNode) -> Result<(), ExplorerError> {
        require(node, NodeOperation::Refresh)?;
        self.cache.invalidate(&node.identity);
        self.refresher.refresh();
        Ok(())
    }

    /// Called by the tree provider on every expand or collapse
    pub async fn record_expansion(&self, identity: &NodeIdentity, state: ExpansionState) -> Result<(), ExplorerError> {
        self.cache.set_expansion_state(identity, state).await
    }

    pub fn expansion_state(&self, identity: &NodeIdentity) -> ExpansionState {
        self.cache.expansion_state(identity)
    }

    pub fn sessions(&self) -> &ConnectionSessionManager {
        &self.sessions
    }

    pub fn cache(&self) -> &ObjectTreeCache {
        &self.cache
    }

    /// Close every session and drop cached children
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
        self.cache.clear();
        tracing::info!("Explorer shut down");
    }

    fn descriptor(&self, identity: &ConnectionIdentity) -> Result<ConnectionDescriptor, ExplorerError> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
            .ok_or_else(|| ExplorerError::UnknownConnection(identity.to_string()))
    }

    /// Descriptor for user statements: pinned to the node's database when it has one
    fn scope_descriptor(&self, node: &TreeNode) -> Result<ConnectionDescriptor, ExplorerError> {
        let descriptor = self.descriptor(node.connection_identity())?;
        Ok(match node.database() {
            Some(database) => descriptor.with_database(database),
            None => descriptor,
        })
    }

    async fn execute_on_connection(
        &self,
        node: &TreeNode,
        sql: &str,
    ) -> Result<QueryOutput, ExplorerError> {
        let descriptor = self.descriptor(node.connection_identity())?.without_database();
        let session = self.sessions.get_connection(&descriptor, false).await?;
        self.executor.execute(session.as_ref(), sql).await
    }

    /// Drop the group listing a table and the table's own columns
    fn invalidate_object(&self, node: &TreeNode) {
        if let Some(parent) = &node.parent {
            self.cache.invalidate(parent);
        }
        self.cache.invalidate(&node.identity);
    }

    fn after_script(&self, node: &TreeNode, report: &BatchReport) {
        let structural = report
            .outcomes
            .iter()
            .any(|o| o.is_success() && SqlValidator::is_structural(&o.statement));
        if structural {
            self.cache.invalidate_connection(node.connection_identity());
            self.refresher.refresh();
        }
    }
}

fn require(node: &TreeNode, operation: NodeOperation) -> Result<(), ExplorerError> {
    if node.supports(operation) {
        Ok(())
    } else {
        Err(ExplorerError::NotSupported(format!(
            "{:?} is not available on {} nodes",
            operation, node.kind
        )))
    }
}

/// `None` when the confirmation matches the target name, ignoring case
fn confirm<T>(target: &str, confirmation: &str) -> Option<CommandOutcome<T>> {
    if confirmation.to_lowercase() == target.to_lowercase() {
        return None;
    }
    tracing::info!("Confirmation mismatch for {}, nothing executed", target);
    Some(CommandOutcome::Cancelled {
        reason: format!("Confirmation did not match '{}'", target),
    })
}

fn scoped_database(node: &TreeNode) -> Result<&str, ExplorerError> {
    node.database()
        .ok_or_else(|| ExplorerError::Validation(format!("{} has no database scope", node.identity)))
}

fn scoped_object(node: &TreeNode) -> Result<(&str, &str), ExplorerError> {
    let database = scoped_database(node)?;
    let object = node
        .identity
        .object_name()
        .ok_or_else(|| ExplorerError::Validation(format!("{} names no object", node.identity)))?;
    Ok((database, object))
}
