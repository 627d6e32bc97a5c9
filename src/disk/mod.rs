//! C9 — the disk layer: WAL-backed persistence for a [`Graph`].
//!
//! Every observable mutation is appended to the WAL as a bincode-encoded
//! [`NodeRecord`] (grounded in the same `bincode::serde::encode_to_vec`
//! pattern this crate's ancestry used for its own write-ahead log
//! payloads) before the caller sees it succeed. `load` replays the log
//! from the most recent checkpoint to reconstruct the graph, rebuilding
//! the snippet index as a side effect of replaying each node's metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::WalConfig;
use crate::errors::FxdError;
use crate::graph::{Graph, MetaValue};
use crate::signal::SignalStream;
use crate::wal::{RecordType, Wal};

const GRAPH_FILE: &str = "graph.wal";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    path: String,
    raw: String,
    node_type: Option<String>,
    meta: HashMap<String, MetaValue>,
    /// SHA-256 of `raw`, checked on replay as a content-level integrity
    /// check layered above the WAL frame's own CRC-32 (which only
    /// covers framing, not a node's logical content across a
    /// checkpoint rewrite).
    #[serde(with = "serde_bytes")]
    content_hash: Vec<u8>,
}

fn hash_raw(raw: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hasher.finalize().to_vec()
}

fn node_record(path: String, raw: String, node_type: Option<String>, meta: HashMap<String, MetaValue>) -> NodeRecord {
    let content_hash = hash_raw(&raw);
    NodeRecord { path, raw, node_type, meta, content_hash }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStats {
    pub node_count: usize,
    pub wal_record_count: u64,
    pub wal_bytes: u64,
}

/// An open, persistent graph: a [`Graph`] paired with the WAL that backs
/// it. One [`Disk`] owns one WAL file; concurrent writers within a
/// process share it through `Arc`/`Mutex` rather than opening it twice.
pub struct Disk {
    dir: PathBuf,
    wal: Mutex<Wal>,
    graph: Graph,
}

impl Disk {
    /// Open (creating if absent) the graph stored under `dir` with the
    /// default WAL configuration. See [`Disk::open_with_config`] to
    /// configure the fsync policy.
    ///
    /// # Errors
    /// Returns an error if `dir` cannot be created, the WAL cannot be
    /// opened, or a record fails to decode (a record that fails the
    /// WAL's own checksum was already dropped at the WAL layer and is
    /// not an error here).
    pub fn open(dir: impl AsRef<Path>, signals: Arc<SignalStream>) -> Result<Self, FxdError> {
        Self::open_with_config(dir, signals, WalConfig::default())
    }

    /// Open (creating if absent) the graph stored under `dir`, replaying
    /// its WAL to reconstruct the in-memory graph.
    ///
    /// # Errors
    /// Returns an error if `dir` cannot be created, the WAL cannot be
    /// opened, or a record fails to decode (a record that fails the
    /// WAL's own checksum was already dropped at the WAL layer and is
    /// not an error here).
    pub fn open_with_config(
        dir: impl AsRef<Path>,
        signals: Arc<SignalStream>,
        wal_config: WalConfig,
    ) -> Result<Self, FxdError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut wal = Wal::open_with_config(dir.join(GRAPH_FILE), wal_config)?;
        let graph = Graph::new(signals);
        replay(&mut wal, &graph)?;
        Ok(Self { dir, wal: Mutex::new(wal), graph })
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// A cheap `Arc`-backed clone of the owned graph, for handing to
    /// sibling components (the transaction manager, groups) that need
    /// their own handle rather than a borrow tied to the `Disk`.
    #[must_use]
    pub fn graph_handle(&self) -> Graph {
        self.graph.clone()
    }

    /// Persist the node at `path`'s current state. Called by higher
    /// layers (the transaction manager, C10) after a graph mutation
    /// succeeds; the disk layer itself does not subscribe to the signal
    /// stream, so nothing is written unless the caller explicitly saves.
    ///
    /// # Errors
    /// Returns an error if the node does not exist or the WAL write
    /// fails.
    pub fn save_node(&self, path: &str) -> Result<(), FxdError> {
        let node = self.graph.get(path).ok_or_else(|| FxdError::NotFound(path.to_string()))?;
        let record = node_record(path.to_string(), node.value.raw, node.node_type, node.meta);
        let payload = encode_to_vec(&record, standard())?;
        self.wal.lock().append(RecordType::NodePatch, path, &payload)?;
        Ok(())
    }

    /// Persist the deletion of the node at `path`.
    ///
    /// # Errors
    /// Returns an error if the WAL write fails.
    pub fn delete_node(&self, path: &str) -> Result<(), FxdError> {
        self.wal.lock().append(RecordType::LinkRemove, path, &[])?;
        Ok(())
    }

    /// Write a full checkpoint of the current graph and compact the WAL
    /// down to it. After this call, `load`ing from the WAL alone is a
    /// single checkpoint record plus whatever has been appended since.
    ///
    /// # Errors
    /// Returns an error if encoding or the WAL compaction fails.
    pub fn checkpoint(&self) -> Result<(), FxdError> {
        let mut wal = self.wal.lock();
        let snapshot: Vec<NodeRecord> = self
            .graph
            .snapshot()
            .into_iter()
            .map(|(path, node)| node_record(path, node.value.raw, node.node_type, node.meta))
            .collect();
        let payload = encode_to_vec(&snapshot, standard())?;
        let seq = wal.append(RecordType::Checkpoint, "", &payload)?;
        wal.compact(seq)?;
        crate::logger::audit("disk.checkpoint", &format!("nodes={}", snapshot.len()));
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> DiskStats {
        let wal_stats = self.wal.lock().stats();
        DiskStats {
            node_count: self.graph.node_count(),
            wal_record_count: wal_stats.count,
            wal_bytes: wal_stats.bytes,
        }
    }

    /// Copy the WAL file to `dest` as a point-in-time backup. The source
    /// file is read while held open for writes elsewhere in the process;
    /// on platforms where that races with an in-flight `append`, callers
    /// needing a consistent backup should call this from within a
    /// transaction (C10) that holds the write lock.
    ///
    /// # Errors
    /// Returns an error if either path cannot be accessed.
    pub fn backup(&self, dest: impl AsRef<Path>) -> Result<(), FxdError> {
        let _guard = self.wal.lock();
        std::fs::copy(self.dir.join(GRAPH_FILE), dest)?;
        Ok(())
    }

    pub fn close(self) {
        drop(self);
    }
}

/// Apply one decoded [`NodeRecord`] to `graph`, verifying its content
/// hash first. A mismatch means the record survived the WAL's own CRC
/// check but its logical content disagrees with what was hashed at
/// write time (e.g. a hand-edited WAL file); it is dropped and logged
/// rather than failing the whole replay, matching the WAL layer's own
/// policy of never surfacing a single bad record as a hard error.
fn apply_record(graph: &Graph, record: NodeRecord) -> Result<(), FxdError> {
    let actual = hash_raw(&record.raw);
    if actual != record.content_hash {
        log::warn!(
            "fxd disk: content hash mismatch for '{}' (expected {}, got {}), dropping record",
            record.path,
            hex::encode(&record.content_hash),
            hex::encode(&actual)
        );
        return Ok(());
    }
    graph.set_path(&record.path, record.raw)?;
    if let Some(node_type) = record.node_type {
        graph.set_type(&record.path, node_type)?;
    }
    for (key, value) in record.meta {
        graph.set_meta(&record.path, &key, value)?;
    }
    Ok(())
}

fn replay(wal: &mut Wal, graph: &Graph) -> Result<(), FxdError> {
    let records = wal.read_from(0)?;
    for rec in records {
        match rec.rtype {
            RecordType::NodePatch | RecordType::NodeCreate => {
                let (record, _): (NodeRecord, usize) = decode_from_slice(&rec.payload, standard())?;
                apply_record(graph, record)?;
            }
            RecordType::LinkRemove => {
                // Already removed (e.g. re-removed after a later checkpoint); ignore.
                let _ = graph.remove(&rec.node_id);
            }
            RecordType::Checkpoint => {
                let (records, _): (Vec<NodeRecord>, usize) = decode_from_slice(&rec.payload, standard())?;
                for record in records {
                    apply_record(graph, record)?;
                }
            }
            RecordType::LinkAdd | RecordType::Signal => {}
        }
    }
    Ok(())
}
