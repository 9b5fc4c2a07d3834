//! Lazy describe cache
//!
//! Each describe group of a node gets one `OnceCell`. The first accessor runs
//! the call; concurrent accessors wait for it; later accessors read the stored
//! value. A stored `None` (the call was denied) is final as well. A hard error
//! is not stored, so the entry stays unfetched.
//!
//! Child listings use the same cache keyed by child collection name, storing
//! the identities of the listed children.

use super::node::NodeRef;
use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Observable state of one cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeState {
    Unfetched,
    Fetched,
}

/// Named single-flight cells
#[derive(Debug)]
pub struct LazyCache<V> {
    entries: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
}

/// Describe responses per group; `None` when the call was denied
pub type DescribeCache = LazyCache<Option<Value>>;

/// Child identities per child collection
pub type ChildCache = LazyCache<Vec<NodeRef>>;

impl<V> Default for LazyCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> LazyCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, group: &str) -> Arc<OnceCell<V>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group.to_string())
            .or_default()
            .clone()
    }

    /// Return the cached value, running `fetch` only if nothing is stored yet
    pub async fn get_or_fetch<F, Fut>(&self, group: &str, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        // The map lock is released here; only the cell is held across the call
        let cell = self.entry(group);
        cell.get_or_try_init(fetch).await.cloned()
    }

    pub fn state(&self, group: &str) -> DescribeState {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(group) {
            Some(cell) if cell.initialized() => DescribeState::Fetched,
            _ => DescribeState::Unfetched,
        }
    }
}
