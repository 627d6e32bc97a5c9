//! C6 — groups (views): named, ordered subsets of the graph defined by
//! selector predicates, with optional reactive recomputation driven off
//! the signal stream (C4).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::SelectorsConfig;
use crate::errors::FxdError;
use crate::graph::{Graph, Node, NodeId};
use crate::selector::{self, SelectorList};
use crate::signal::SignalFilter;

struct Members {
    explicit_add: Vec<NodeId>,
    explicit_remove: HashSet<NodeId>,
    manual_order: Vec<NodeId>,
    computed: Vec<NodeId>,
}

pub struct GroupDiff {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// A named, possibly-reactive view over the graph.
pub struct Group {
    name: String,
    graph: Graph,
    config: SelectorsConfig,
    includes: RwLock<Vec<SelectorList>>,
    excludes: RwLock<Vec<SelectorList>>,
    members: RwLock<Members>,
    reactive: AtomicBool,
    debounce_ms: u64,
    tick_tx: RwLock<Option<mpsc::Sender<()>>>,
}

impl Group {
    #[must_use]
    pub fn new(name: impl Into<String>, graph: Graph, config: SelectorsConfig, reactive_default: bool, debounce_ms: u64) -> Arc<Self> {
        let group = Arc::new(Self {
            name: name.into(),
            graph,
            config,
            includes: RwLock::new(Vec::new()),
            excludes: RwLock::new(Vec::new()),
            members: RwLock::new(Members {
                explicit_add: Vec::new(),
                explicit_remove: HashSet::new(),
                manual_order: Vec::new(),
                computed: Vec::new(),
            }),
            reactive: AtomicBool::new(reactive_default),
            debounce_ms,
            tick_tx: RwLock::new(None),
        });
        if reactive_default {
            group.clone().start_reactive();
        }
        group
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn include(&self, selector_src: &str) -> Result<(), FxdError> {
        let list = selector::parse(selector_src).map_err(|e| FxdError::InvalidArgument(e.to_string()))?;
        self.includes.write().push(list);
        self.recompute();
        Ok(())
    }

    pub fn exclude(&self, selector_src: &str) -> Result<(), FxdError> {
        let list = selector::parse(selector_src).map_err(|e| FxdError::InvalidArgument(e.to_string()))?;
        self.excludes.write().push(list);
        self.recompute();
        Ok(())
    }

    pub fn add(&self, node_id: NodeId) {
        let mut m = self.members.write();
        m.explicit_remove.remove(&node_id);
        if !m.explicit_add.contains(&node_id) {
            m.explicit_add.push(node_id);
        }
        drop(m);
        self.recompute();
    }

    pub fn remove(&self, node_id: NodeId) {
        let mut m = self.members.write();
        m.explicit_add.retain(|id| *id != node_id);
        m.explicit_remove.insert(node_id);
        drop(m);
        self.recompute();
    }

    /// Set an explicit member ordering. Members not named here keep
    /// their default (graph path) order, appended after the named ones.
    pub fn reorder(&self, order: Vec<NodeId>) {
        self.members.write().manual_order = order;
        self.recompute();
    }

    /// Reorder members by a numeric metadata field, ascending, with
    /// members missing that field (or carrying a non-numeric value)
    /// sorted first. `f64` has no total order of its own (`NaN`), so the
    /// comparison goes through `ordered_float::OrderedFloat` the same
    /// way this crate's lineage ordered numeric BSON values for its own
    /// indexes.
    pub fn sort_by_meta(&self, key: &str) {
        let mut members = self.list();
        members.sort_by_key(|n| n.meta.get(key).and_then(crate::graph::MetaValue::as_f64).map(ordered_float::OrderedFloat));
        self.reorder(members.into_iter().map(|n| n.id).collect());
    }

    fn matches_predicates(&self, node_id: NodeId) -> bool {
        let includes = self.includes.read();
        let excludes = self.excludes.read();
        let included = includes.is_empty() || includes.iter().any(|l| selector::list_matches(&self.graph, node_id, l, &self.config));
        if !included {
            return false;
        }
        !excludes.iter().any(|l| selector::list_matches(&self.graph, node_id, l, &self.config))
    }

    /// Default ordering when no manual order is set: by `meta.order`
    /// ascending (members missing it sort after those that have it),
    /// ties (and members with no `order`) broken by node id so that
    /// the result is stable across recomputes.
    fn order_key(&self, id: NodeId) -> (bool, ordered_float::OrderedFloat<f64>, NodeId) {
        let order = self
            .graph
            .get_by_id(id)
            .and_then(|n| n.meta.get("order").and_then(crate::graph::MetaValue::as_f64));
        match order {
            Some(v) => (false, ordered_float::OrderedFloat(v), id),
            None => (true, ordered_float::OrderedFloat(0.0), id),
        }
    }

    fn recompute(&self) {
        let snapshot = self.graph.snapshot();
        let mut m = self.members.write();
        let mut seen = HashSet::new();

        if !m.manual_order.is_empty() {
            let mut ordered = Vec::new();
            for id in &m.manual_order {
                if !m.explicit_remove.contains(id) && seen.insert(*id) {
                    let matches_or_explicit = m.explicit_add.contains(id) || self.matches_predicates(*id);
                    if matches_or_explicit {
                        ordered.push(*id);
                    }
                }
            }
            for (_, node) in &snapshot {
                if m.explicit_remove.contains(&node.id) {
                    continue;
                }
                if seen.contains(&node.id) {
                    continue;
                }
                if self.matches_predicates(node.id) {
                    seen.insert(node.id);
                    ordered.push(node.id);
                }
            }
            for id in &m.explicit_add {
                if !m.explicit_remove.contains(id) && seen.insert(*id) {
                    ordered.push(*id);
                }
            }
            m.computed = ordered;
            return;
        }

        let mut ordered = Vec::new();
        for (_, node) in &snapshot {
            if m.explicit_remove.contains(&node.id) {
                continue;
            }
            if self.matches_predicates(node.id) && seen.insert(node.id) {
                ordered.push(node.id);
            }
        }
        for id in &m.explicit_add {
            if !m.explicit_remove.contains(id) && seen.insert(*id) {
                ordered.push(*id);
            }
        }
        ordered.sort_by_key(|id| self.order_key(*id));
        m.computed = ordered;
    }

    #[must_use]
    pub fn list(&self) -> Vec<Node> {
        self.members
            .read()
            .computed
            .iter()
            .filter_map(|id| self.graph.get_by_id(*id))
            .collect()
    }

    #[must_use]
    pub fn member_ids(&self) -> Vec<NodeId> {
        self.members.read().computed.clone()
    }

    #[must_use]
    pub fn by_file(&self) -> Vec<(String, Vec<Node>)> {
        self.group_by_meta("file")
    }

    #[must_use]
    pub fn by_lang(&self) -> Vec<(String, Vec<Node>)> {
        self.group_by_meta("lang")
    }

    fn group_by_meta(&self, key: &str) -> Vec<(String, Vec<Node>)> {
        let mut buckets: Vec<(String, Vec<Node>)> = Vec::new();
        for node in self.list() {
            let bucket_key = node.meta.get(key).map(crate::graph::MetaValue::display).unwrap_or_default();
            match buckets.iter_mut().find(|(k, _)| *k == bucket_key) {
                Some((_, nodes)) => nodes.push(node),
                None => buckets.push((bucket_key, vec![node])),
            }
        }
        buckets
    }

    #[must_use]
    pub fn diff(&self, previous: &[NodeId]) -> GroupDiff {
        let current = self.member_ids();
        let prev_set: HashSet<NodeId> = previous.iter().copied().collect();
        let cur_set: HashSet<NodeId> = current.iter().copied().collect();
        GroupDiff {
            added: current.iter().copied().filter(|id| !prev_set.contains(id)).collect(),
            removed: previous.iter().copied().filter(|id| !cur_set.contains(id)).collect(),
        }
    }

    #[must_use]
    pub fn is_reactive(&self) -> bool {
        self.reactive.load(Ordering::SeqCst)
    }

    pub fn set_reactive(self: &Arc<Self>, enabled: bool) {
        let was = self.reactive.swap(enabled, Ordering::SeqCst);
        if enabled && !was {
            self.clone().start_reactive();
        } else if !enabled && was {
            *self.tick_tx.write() = None;
        }
    }

    /// Spawn the debounce thread and subscribe it to the signal stream.
    /// Grounded in the same coalescing-timer shape as a TTL eviction
    /// sweep: every signal nudges a pending-recompute flag, and the
    /// thread only acts once `debounce_ms` has passed without another
    /// nudge.
    fn start_reactive(self: Arc<Self>) {
        let (tx, rx) = mpsc::channel::<()>();
        *self.tick_tx.write() = Some(tx.clone());
        let debounce = Duration::from_millis(self.debounce_ms.max(1));
        let weak = Arc::downgrade(&self);
        self.graph.signals().subscribe(self.graph.signals().last_seq(), SignalFilter::all(), move |_| {
            let _ = tx.send(());
        });

        std::thread::spawn(move || {
            loop {
                match rx.recv() {
                    Ok(()) => {}
                    Err(_) => return,
                }
                let mut deadline = Instant::now() + debounce;
                loop {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(()) => {
                            deadline = Instant::now() + debounce;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => break,
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    }
                }
                match weak.upgrade() {
                    Some(group) => {
                        if group.is_reactive() {
                            group.recompute();
                        }
                    }
                    None => return,
                }
            }
        });
    }
}
