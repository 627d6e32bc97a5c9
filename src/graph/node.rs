use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::value::{MetaValue, NodeValue};

/// A node identifier. Distinct from a snippet id (`meta["id"]`): every
/// node has one of these, but only nodes that represent a snippet carry
/// a snippet id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub key: String,
    pub node_type: Option<String>,
    pub value: NodeValue,
    pub meta: HashMap<String, MetaValue>,
    pub version: u64,
    pub children: HashMap<String, NodeId>,
}

impl Node {
    pub(super) fn new_root() -> Self {
        Self {
            id: NodeId::new(),
            parent_id: None,
            key: String::new(),
            node_type: None,
            value: NodeValue::empty(),
            meta: HashMap::new(),
            version: 0,
            children: HashMap::new(),
        }
    }

    pub(super) fn new_child(parent_id: NodeId, key: &str) -> Self {
        Self {
            id: NodeId::new(),
            parent_id: Some(parent_id),
            key: key.to_string(),
            node_type: None,
            value: NodeValue::empty(),
            meta: HashMap::new(),
            version: 0,
            children: HashMap::new(),
        }
    }

    #[must_use]
    pub fn snippet_id(&self) -> Option<&str> {
        self.meta.get("id").and_then(MetaValue::as_str_opt)
    }
}
