//! FXD: a content-addressed code-composition engine.
//!
//! Source snippets live as nodes in a single graph ([`graph`]), addressed
//! by path and (optionally) by a stable snippet id. Named, ordered
//! subsets of that graph ([`view`]) are defined with a small CSS-like
//! selector grammar ([`selector`]) and rendered to text with in-band
//! markers ([`marker`]) that round-trip hand edits back into graph
//! mutations ([`patch`]). Every mutation is durable: appended to a
//! write-ahead log ([`wal`]) through the disk layer ([`disk`]),
//! coordinated by a transaction manager and an auto-save scheduler
//! ([`txn`], [`autosave`]) the way this crate's lineage ran its own
//! recovery and cache-eviction background work.
//!
//! This crate is an embeddable core: it has no CLI and no network
//! surface. Callers open an [`Fxd`] handle over a directory and drive
//! everything else through it.

pub mod autosave;
pub mod config;
pub mod disk;
pub mod errors;
pub mod graph;
pub mod logger;
pub mod marker;
pub mod patch;
pub mod selector;
pub mod signal;
pub mod txn;
pub mod uarr;
pub mod utils;
pub mod view;
pub mod wal;

pub use errors::FxdError;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use config::FxdConfig;
use disk::Disk;
use graph::{Graph, Node, NodeId};
use patch::{ApplyOptions, ApplyOutcome};
use signal::SignalStream;
use txn::TxnManager;
use view::Group;

/// The embedding surface: one open graph, its disk-backed persistence,
/// transaction manager, auto-save scheduler, and named groups.
pub struct Fxd {
    graph: Graph,
    disk: Arc<Disk>,
    txn: TxnManager,
    autosave: Arc<autosave::AutosaveScheduler>,
    config: FxdConfig,
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Fxd {
    /// Open (creating if absent) the FXD store rooted at `dir`, replaying
    /// its WAL and starting the auto-save scheduler if enabled.
    ///
    /// # Errors
    /// Returns an error if the directory or WAL cannot be opened, or a
    /// WAL record fails to decode.
    pub fn open(dir: impl AsRef<Path>, config: FxdConfig) -> Result<Self, FxdError> {
        let signals = Arc::new(SignalStream::new());
        let disk = Arc::new(Disk::open_with_config(dir, signals, config.wal.clone())?);
        let graph = disk.graph_handle();
        let txn = TxnManager::new(graph.clone(), Some(disk.clone()));
        let autosave = autosave::AutosaveScheduler::new(
            disk.clone(),
            config.autosave.interval_ms,
            config.autosave.batch_size,
            config.autosave.strategy,
            config.autosave.count_threshold,
        );
        if config.autosave.enabled {
            autosave.start();
        }
        Ok(Self { graph, disk, txn, autosave, config, groups: RwLock::new(HashMap::new()) })
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn txn(&self) -> &TxnManager {
        &self.txn
    }

    #[must_use]
    pub fn autosave(&self) -> &Arc<autosave::AutosaveScheduler> {
        &self.autosave
    }

    #[must_use]
    pub fn config(&self) -> &FxdConfig {
        &self.config
    }

    /// Write a snippet's raw body at `path`, persist it, and mark it
    /// dirty for the auto-save scheduler (a belt-and-braces write: the
    /// transaction already saves synchronously, the scheduler simply
    /// has nothing further to do for this path until it changes again).
    ///
    /// # Errors
    /// Returns an error if the graph mutation or the disk write fails.
    pub fn set_snippet(&self, path: &str, raw: impl Into<String>) -> Result<NodeId, FxdError> {
        let raw = raw.into();
        self.txn.execute(|g| {
            let id = g.set_path(path, raw)?;
            Ok((id, vec![path.to_string()]))
        })
    }

    /// Create (or get) a named group.
    pub fn group(&self, name: &str) -> Arc<Group> {
        if let Some(g) = self.groups.read().get(name) {
            return g.clone();
        }
        let group = Group::new(
            name,
            self.graph.clone(),
            self.config.selectors.clone(),
            self.config.groups.reactive_default,
            self.config.groups.debounce_ms,
        );
        self.groups.write().insert(name.to_string(), group.clone());
        group
    }

    #[must_use]
    pub fn node(&self, path: &str) -> Option<Node> {
        self.graph.get(path)
    }

    /// Render a group to text: each member's body wrapped in a
    /// language-appropriate marker, in the group's current order,
    /// separated by a blank line.
    #[must_use]
    pub fn render_group(&self, name: &str) -> String {
        let group = self.group(name);
        let mut out = String::new();
        for node in group.list() {
            let Some(snippet_id) = node.snippet_id() else { continue };
            let lang = node.node_type.clone().unwrap_or_else(|| "text".to_string());
            let meta: HashMap<String, String> =
                node.meta.iter().filter(|(k, _)| k.as_str() != "id").map(|(k, v)| (k.clone(), v.display())).collect();
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&marker::wrap(snippet_id, &node.value.raw, &lang, &meta));
        }
        out
    }

    /// Scan `text` for markers and apply the resulting patches as one
    /// transaction.
    ///
    /// # Errors
    /// Returns an error if conflict validation fails or a write fails.
    pub fn ingest_text(&self, text: &str, opts: ApplyOptions) -> Result<ApplyOutcome, FxdError> {
        let patches = marker::to_patches(text);
        self.txn.apply_patch_batch(&patches, opts)
    }

    /// Force an immediate checkpoint, compacting the WAL.
    ///
    /// # Errors
    /// Returns an error if the checkpoint write or WAL compaction fails.
    pub fn checkpoint(&self) -> Result<(), FxdError> {
        self.disk.checkpoint()
    }

    /// Stop the auto-save scheduler and flush every dirty path
    /// immediately, then drop the handle.
    pub fn close(self) {
        self.autosave.stop();
        self.autosave.force_save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_set_render_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        {
            let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
            fxd.set_snippet("pkg.greet", "fn greet() {}").unwrap();
            fxd.graph().set_type("pkg.greet", "function").unwrap();
            fxd.graph()
                .set_meta("pkg.greet", "id", graph::MetaValue::Str("greet1".into()))
                .unwrap();

            let group = fxd.group("functions");
            group.include(".function").unwrap();
            let rendered = fxd.render_group("functions");
            assert!(rendered.contains("FX:BEGIN id=greet1"));
            assert!(rendered.contains("fn greet() {}"));
        }

        let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
        assert!(fxd.node("pkg.greet").is_some());
    }

    #[test]
    fn ingest_text_applies_edits_back_into_graph() {
        let dir = tempdir().unwrap();
        let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
        fxd.set_snippet("a", "original").unwrap();
        fxd.graph().set_meta("a", "id", graph::MetaValue::Str("s1".into())).unwrap();

        let text = marker::wrap("s1", "edited", "rust", &HashMap::new());
        fxd.ingest_text(&text, ApplyOptions::default()).unwrap();
        assert_eq!(fxd.node("a").unwrap().value.raw, "edited");
    }
}
