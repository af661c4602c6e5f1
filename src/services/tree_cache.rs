// Object Tree Cache
//
// Holds two independent maps keyed by node identity: the children fetched for a
// node, and the expansion state the user last left it in. Children live in memory
// only; expansion state is written through to an `ExpansionStore`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ExplorerError;
use crate::models::{ConnectionIdentity, ExpansionState, NodeIdentity, TreeNode};
use crate::storage::ExpansionStore;

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that required a live fetch
    pub misses: u64,
    /// Entries dropped by invalidation
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct ObjectTreeCache {
    children: RwLock<HashMap<NodeIdentity, Arc<[TreeNode]>>>,
    expansion: RwLock<HashMap<String, ExpansionState>>,
    stats: RwLock<CacheStats>,
    store: Arc<dyn ExpansionStore>,
}

impl ObjectTreeCache {
    /// Empty cache backed by `store`; call `init` to load persisted expansion state
    pub fn new(store: Arc<dyn ExpansionStore>) -> Self {
        Self {
            children: RwLock::new(HashMap::new()),
            expansion: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            store,
        }
    }

    /// Load persisted expansion state, replacing whatever is held in memory
    pub async fn init(&self) -> Result<usize, ExplorerError> {
        let states = self.store.load_expansion_states().await?;
        let count = states.len();
        *write(&self.expansion) = states.into_iter().collect();
        tracing::info!("Loaded {} expansion state entries", count);
        Ok(count)
    }

    /// Cached children of `identity`; `None` is a miss that calls for a live fetch
    pub fn get_children(&self, identity: &NodeIdentity) -> Option<Arc<[TreeNode]>> {
        let found = read(&self.children).get(identity).cloned();
        let mut stats = write(&self.stats);
        match &found {
            Some(children) => {
                stats.hits += 1;
                tracing::debug!("Cache hit for {} ({} children)", identity, children.len());
            }
            None => {
                stats.misses += 1;
                tracing::debug!("Cache miss for {}", identity);
            }
        }
        found
    }

    /// Replace the children of `identity` in one step; the last call wins
    pub fn set_children(&self, identity: &NodeIdentity, children: Vec<TreeNode>) -> Arc<[TreeNode]> {
        let children: Arc<[TreeNode]> = children.into();
        write(&self.children).insert(identity.clone(), children.clone());
        tracing::debug!("Cached {} children for {}", children.len(), identity);
        children
    }

    /// Drop exactly this entry; descendants are left alone
    pub fn invalidate(&self, identity: &NodeIdentity) -> bool {
        let removed = write(&self.children).remove(identity).is_some();
        if removed {
            write(&self.stats).invalidations += 1;
            tracing::debug!("Invalidated children of {}", identity);
        }
        removed
    }

    /// Drop every children entry rooted under `connection`
    pub fn invalidate_connection(&self, connection: &ConnectionIdentity) -> usize {
        let removed = {
            let mut children = write(&self.children);
            let before = children.len();
            children.retain(|identity, _| !identity.is_under(connection));
            before - children.len()
        };
        write(&self.stats).invalidations += removed as u64;
        tracing::info!("Invalidated {} cached entries of {}", removed, connection);
        removed
    }

    pub fn expansion_state(&self, identity: &NodeIdentity) -> ExpansionState {
        read(&self.expansion)
            .get(&identity.key())
            .copied()
            .unwrap_or(ExpansionState::Unset)
    }

    /// Remember the expansion state of a node and write it through to the store.
    ///
    /// The in-memory value is updated before the write, so readers never wait on disk.
    pub async fn set_expansion_state(&self, identity: &NodeIdentity, state: ExpansionState) -> Result<(), ExplorerError> {
        let key = identity.key();
        {
            let mut expansion = write(&self.expansion);
            match state {
                ExpansionState::Unset => expansion.remove(&key),
                other => expansion.insert(key.clone(), other),
            };
        }
        self.store.save_expansion_state(&key, state).await
    }

    /// Forget the expansion state of a connection and everything below it
    pub async fn forget_connection_expansion(&self, connection: &ConnectionIdentity) -> Result<usize, ExplorerError> {
        let prefix = connection.key_prefix();
        write(&self.expansion).retain(|key, _| !key.starts_with(&prefix));
        let removed = self.store.remove_expansion_states_with_prefix(&prefix).await?;
        tracing::debug!("Forgot {} expansion states of {}", removed, connection);
        Ok(removed)
    }

    /// Drop all cached children; persisted expansion state is kept
    pub fn clear(&self) {
        let count = {
            let mut children = write(&self.children);
            let count = children.len();
            children.clear();
            count
        };
        tracing::debug!("Cleared {} cached entries", count);
    }

    pub fn len(&self) -> usize {
        read(&self.children).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        read(&self.stats).clone()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
