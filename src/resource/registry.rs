//! Node Registry - Session-scoped identity map
//!
//! Owns every node discovered in one session. Lookup and insertion happen
//! under a single lock so two region jobs producing the same identity end up
//! sharing one node. Constructors run inside the lock and must not perform I/O.
//!
//! Nodes built from caller-supplied values are provisional: they stand in for
//! an identity until a listing discovers it, and the discovered node replaces
//! them. Discovered nodes are never replaced.

use super::node::{Node, NodeRef};
use crate::error::{InventoryError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
struct Entry {
    node: Arc<Node>,
    provisional: bool,
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashMap<NodeRef, Entry>>,
}

fn check_constructed(kind: &str, identity: &str, node: &Node) -> Result<()> {
    if node.kind() != kind || node.id() != identity {
        return Err(InventoryError::InvalidInput(format!(
            "constructor for {}/{} built {}/{}",
            kind,
            identity,
            node.kind(),
            node.id()
        )));
    }
    Ok(())
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the discovered node registered under `(kind, identity)`, constructing it if absent
    ///
    /// A provisional node under the same identity is replaced.
    pub fn resolve_with<F>(&self, kind: &str, identity: &str, construct: F) -> Result<Arc<Node>>
    where
        F: FnOnce() -> Result<Node>,
    {
        let key = NodeRef::new(kind, identity);
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);

        let replacing = match nodes.get(&key) {
            Some(entry) if !entry.provisional => return Ok(entry.node.clone()),
            Some(_) => true,
            None => false,
        };

        let node = construct()?;
        check_constructed(kind, identity, &node)?;
        if replacing {
            tracing::debug!("{} {}: discovered node replaces provisional one", kind, identity);
        }

        let node = Arc::new(node);
        nodes.insert(
            key,
            Entry {
                node: node.clone(),
                provisional: false,
            },
        );
        Ok(node)
    }

    /// Return whatever is registered under `(kind, identity)`, else register a provisional node
    pub fn resolve_provisional<F>(&self, kind: &str, identity: &str, construct: F) -> Result<Arc<Node>>
    where
        F: FnOnce() -> Result<Node>,
    {
        let key = NodeRef::new(kind, identity);
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = nodes.get(&key) {
            return Ok(entry.node.clone());
        }

        let node = construct()?;
        check_constructed(kind, identity, &node)?;

        let node = Arc::new(node);
        nodes.insert(
            key,
            Entry {
                node: node.clone(),
                provisional: true,
            },
        );
        Ok(node)
    }

    pub fn get(&self, kind: &str, identity: &str) -> Option<Arc<Node>> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&NodeRef::new(kind, identity))
            .map(|entry| entry.node.clone())
    }

    /// Like [`get`](Self::get), ignoring provisional nodes
    pub fn get_discovered(&self, kind: &str, identity: &str) -> Option<Arc<Node>> {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&NodeRef::new(kind, identity))
            .filter(|entry| !entry.provisional)
            .map(|entry| entry.node.clone())
    }

    pub fn is_provisional(&self, kind: &str, identity: &str) -> bool {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&NodeRef::new(kind, identity))
            .is_some_and(|entry| entry.provisional)
    }

    /// Nodes of one kind, in identity order
    pub fn nodes_of_kind(&self, kind: &str) -> Vec<Arc<Node>> {
        let nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<Arc<Node>> = nodes
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, entry)| entry.node.clone())
            .collect();
        matching.sort_by(|a, b| a.id().cmp(b.id()));
        matching
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
