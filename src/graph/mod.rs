//! C3 — the node graph.
//!
//! A single-rooted tree of [`Node`]s addressed by dotted paths
//! (`"a.b.c"`), each carrying a scalar value with four lazily-computed
//! projections (raw/parsed/stringified/boolean), freeform metadata, and a
//! monotonic version counter. Every mutation that callers can observe is
//! also appended to the owning [`crate::signal::SignalStream`].

mod node;
mod value;

pub use node::{Node, NodeId};
pub use value::{MetaValue, NodeValue};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::FxdError;
use crate::signal::{SignalKind, SignalStream};

/// Split a dotted path into its component keys. An empty string denotes
/// the root itself and yields no components.
#[must_use]
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

#[must_use]
pub fn join_path(parts: &[&str]) -> String {
    parts.join(".")
}

struct Inner {
    nodes: HashMap<NodeId, Node>,
    root_id: NodeId,
    /// meta["id"] -> owning node, maintained alongside every mutation that
    /// touches that key so lookups never need a full scan.
    snippet_index: HashMap<String, NodeId>,
}

/// The in-memory node graph. Cheap to clone (an `Arc` around a lock); the
/// expected usage is one [`Graph`] per open [`crate::disk::Disk`].
#[derive(Clone)]
pub struct Graph {
    inner: Arc<RwLock<Inner>>,
    signals: Arc<SignalStream>,
}

impl Graph {
    #[must_use]
    pub fn new(signals: Arc<SignalStream>) -> Self {
        let root = Node::new_root();
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            inner: Arc::new(RwLock::new(Inner { nodes, root_id, snippet_index: HashMap::new() })),
            signals,
        }
    }

    #[must_use]
    pub fn root_id(&self) -> NodeId {
        self.inner.read().root_id
    }

    #[must_use]
    pub fn signals(&self) -> Arc<SignalStream> {
        self.signals.clone()
    }

    #[must_use]
    pub fn get_by_id(&self, id: NodeId) -> Option<Node> {
        self.inner.read().nodes.get(&id).cloned()
    }

    /// Resolve a dotted path from the root, returning a clone of the node
    /// found (or `None` if any component is missing).
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Node> {
        let guard = self.inner.read();
        let mut current = guard.root_id;
        for key in split_path(path) {
            current = *guard.nodes.get(&current)?.children.get(key)?;
        }
        guard.nodes.get(&current).cloned()
    }

    /// Resolve a path to its node id, creating intermediate container
    /// nodes (empty raw value, no type) as needed.
    fn resolve_or_create(guard: &mut Inner, path: &str) -> Result<NodeId, FxdError> {
        let mut current = guard.root_id;
        for key in split_path(path) {
            let existing = guard.nodes.get(&current).and_then(|n| n.children.get(key).copied());
            current = match existing {
                Some(id) => id,
                None => {
                    let child = Node::new_child(current, key);
                    let child_id = child.id;
                    guard.nodes.insert(child_id, child);
                    guard
                        .nodes
                        .get_mut(&current)
                        .ok_or_else(|| FxdError::NotFound(current.to_string()))?
                        .children
                        .insert(key.to_string(), child_id);
                    child_id
                }
            };
        }
        Ok(current)
    }

    /// Set the raw value at `path`, creating the node (and any missing
    /// ancestors) if it does not exist. Bumps `version` and emits a
    /// [`SignalKind::Value`] signal. Setting an identical raw value is
    /// still an observable mutation: the version still advances, since
    /// the write itself — not just the resulting content — is what a
    /// subscriber cares about.
    pub fn set_path(&self, path: &str, raw: impl Into<String>) -> Result<NodeId, FxdError> {
        let mut guard = self.inner.write();
        let id = Self::resolve_or_create(&mut guard, path)?;
        let raw = raw.into();
        let (base_version, new_version) = {
            let node = guard.nodes.get_mut(&id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
            let base = node.version;
            node.value = NodeValue::new(raw);
            node.version = base + 1;
            (base, node.version)
        };
        drop(guard);
        self.signals.append(SignalKind::Value, id, base_version, new_version, path);
        Ok(id)
    }

    pub fn set_type(&self, path: &str, node_type: impl Into<String>) -> Result<NodeId, FxdError> {
        let mut guard = self.inner.write();
        let id = Self::resolve_or_create(&mut guard, path)?;
        let (base_version, new_version) = {
            let node = guard.nodes.get_mut(&id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
            let base = node.version;
            node.node_type = Some(node_type.into());
            node.version = base + 1;
            (base, node.version)
        };
        drop(guard);
        self.signals.append(SignalKind::Value, id, base_version, new_version, path);
        Ok(id)
    }

    /// Set a metadata entry on the node at `path`. This always emits a
    /// [`SignalKind::Metadata`] signal, but only advances `version` when
    /// the key is `"id"`: a snippet id change requires the snippet index
    /// to be rebuilt downstream, which is the kind of structural
    /// consequence version bumps exist to announce. Ordinary metadata
    /// (labels, timestamps, flags) does not.
    pub fn set_meta(
        &self,
        path: &str,
        key: &str,
        value: MetaValue,
    ) -> Result<NodeId, FxdError> {
        let mut guard = self.inner.write();
        let id = Self::resolve_or_create(&mut guard, path)?;
        let base_version = guard.nodes.get(&id).ok_or_else(|| FxdError::NotFound(id.to_string()))?.version;
        let mut new_version = base_version;

        if key == "id" {
            let old_snippet_id = guard.nodes[&id].meta.get("id").and_then(MetaValue::as_str_opt).map(str::to_string);
            if let Some(old) = old_snippet_id {
                guard.snippet_index.remove(&old);
            }
            if let Some(new_id) = value.as_str_opt() {
                if guard.snippet_index.contains_key(new_id) {
                    return Err(FxdError::Conflict(format!("snippet id '{new_id}' already in use")));
                }
                guard.snippet_index.insert(new_id.to_string(), id);
            }
            new_version = base_version + 1;
        }

        let node = guard.nodes.get_mut(&id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
        node.meta.insert(key.to_string(), value);
        node.version = new_version;
        drop(guard);
        self.signals.append(SignalKind::Metadata, id, base_version, new_version, key);
        Ok(id)
    }

    /// Look up a node by its `meta["id"]` snippet id.
    #[must_use]
    pub fn by_snippet_id(&self, snippet_id: &str) -> Option<Node> {
        let guard = self.inner.read();
        let id = *guard.snippet_index.get(snippet_id)?;
        guard.nodes.get(&id).cloned()
    }

    /// Remove the node at `path` and all its descendants. Emits one
    /// [`SignalKind::Children`] signal on the parent; descendants are
    /// dropped silently along with their subtree, since they were never
    /// independently observable once their ancestor is gone.
    pub fn remove(&self, path: &str) -> Result<(), FxdError> {
        let mut guard = self.inner.write();
        let parts = split_path(path);
        if parts.is_empty() {
            return Err(FxdError::InvalidArgument("cannot remove the root node".into()));
        }
        let (parent_path, key) = (&parts[..parts.len() - 1], parts[parts.len() - 1]);

        let mut parent_id = guard.root_id;
        for k in parent_path {
            parent_id = *guard
                .nodes
                .get(&parent_id)
                .and_then(|n| n.children.get(*k))
                .ok_or_else(|| FxdError::NotFound(path.to_string()))?;
        }
        let removed_id = *guard
            .nodes
            .get(&parent_id)
            .and_then(|n| n.children.get(key))
            .ok_or_else(|| FxdError::NotFound(path.to_string()))?;

        let mut stack = vec![removed_id];
        while let Some(id) = stack.pop() {
            if let Some(node) = guard.nodes.remove(&id) {
                if let Some(snippet_id) = node.meta.get("id").and_then(MetaValue::as_str_opt) {
                    guard.snippet_index.remove(snippet_id);
                }
                stack.extend(node.children.values().copied());
            }
        }

        let base_version = guard.nodes.get(&parent_id).map_or(0, |n| n.version);
        if let Some(parent) = guard.nodes.get_mut(&parent_id) {
            parent.children.remove(key);
            parent.version = base_version + 1;
        }
        drop(guard);
        self.signals.append(SignalKind::Children, parent_id, base_version, base_version + 1, key);
        Ok(())
    }

    /// A full, path-ordered snapshot of every node, for persistence (C9)
    /// and for rendering (the marker codec, C7, walks this to wrap
    /// snippets in document order).
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Node)> {
        let guard = self.inner.read();
        let mut out = Vec::new();
        let mut stack = vec![(guard.root_id, String::new())];
        while let Some((id, path)) = stack.pop() {
            if let Some(node) = guard.nodes.get(&id) {
                if id != guard.root_id {
                    out.push((path.clone(), node.clone()));
                }
                let mut children: Vec<(&String, &NodeId)> = node.children.iter().collect();
                children.sort_by(|a, b| b.0.cmp(a.0));
                for (key, child_id) in children {
                    let child_path =
                        if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                    stack.push((*child_id, child_path));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Reconstruct the dotted path of a node by walking `parent_id`
    /// links back to the root. Returns `None` if the node does not
    /// exist (it may have been removed).
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let guard = self.inner.read();
        if id == guard.root_id {
            return Some(String::new());
        }
        let mut parts = Vec::new();
        let mut current = id;
        loop {
            let node = guard.nodes.get(&current)?;
            if current == guard.root_id {
                break;
            }
            parts.push(node.key.clone());
            current = node.parent_id?;
        }
        parts.reverse();
        Some(join_path(&parts.iter().map(String::as_str).collect::<Vec<_>>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalFilter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn graph() -> Graph {
        Graph::new(Arc::new(SignalStream::new()))
    }

    #[test]
    fn set_path_creates_intermediate_nodes() {
        let g = graph();
        g.set_path("a.b.c", "hello").unwrap();
        assert_eq!(g.get("a.b.c").unwrap().value.raw, "hello");
        assert!(g.get("a.b").is_some());
        assert!(g.get("a").is_some());
    }

    #[test]
    fn version_increments_on_each_set() {
        let g = graph();
        g.set_path("x", "1").unwrap();
        let v1 = g.get("x").unwrap().version;
        g.set_path("x", "1").unwrap();
        let v2 = g.get("x").unwrap().version;
        assert_eq!(v2, v1 + 1);
    }

    #[test]
    fn snippet_index_tracks_id_meta() {
        let g = graph();
        g.set_path("snip", "code").unwrap();
        g.set_meta("snip", "id", MetaValue::Str("abc123".into())).unwrap();
        assert!(g.by_snippet_id("abc123").is_some());
    }

    #[test]
    fn duplicate_snippet_id_is_conflict() {
        let g = graph();
        g.set_path("a", "1").unwrap();
        g.set_path("b", "2").unwrap();
        g.set_meta("a", "id", MetaValue::Str("dup".into())).unwrap();
        let err = g.set_meta("b", "id", MetaValue::Str("dup".into())).unwrap_err();
        assert!(matches!(err, FxdError::Conflict(_)));
    }

    #[test]
    fn remove_cascades_to_descendants() {
        let g = graph();
        g.set_path("a.b.c", "x").unwrap();
        g.remove("a").unwrap();
        assert!(g.get("a").is_none());
        assert!(g.get("a.b.c").is_none());
    }

    #[test]
    fn ordinary_metadata_does_not_bump_version() {
        let g = graph();
        g.set_path("a", "x").unwrap();
        let v1 = g.get("a").unwrap().version;
        g.set_meta("a", "label", MetaValue::Str("note".into())).unwrap();
        let v2 = g.get("a").unwrap().version;
        assert_eq!(v1, v2);
    }

    #[test]
    fn mutations_emit_signals() {
        let g = graph();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        g.signals().subscribe(0, SignalFilter::all(), move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        g.set_path("a.b", "x").unwrap();
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn snapshot_is_path_ordered() {
        let g = graph();
        g.set_path("b", "2").unwrap();
        g.set_path("a", "1").unwrap();
        let snap = g.snapshot();
        let paths: Vec<&str> = snap.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
    }
}
