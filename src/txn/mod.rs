//! C10 (part one) — the transaction manager.
//!
//! The graph has no native undo log of its own (each mutation applies
//! immediately), so a transaction here is implemented as snapshot,
//! attempt, and — on failure — diff-and-restore back to the snapshot.
//! This gives callers all-or-nothing semantics for a closure without
//! requiring the graph to support staged writes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::disk::Disk;
use crate::errors::FxdError;
use crate::graph::{Graph, Node};
use crate::marker::Patch;
use crate::patch::{self, ApplyOptions, ApplyOutcome};

fn restore(graph: &Graph, snapshot: &[(String, Node)]) {
    let desired: HashSet<&str> = snapshot.iter().map(|(p, _)| p.as_str()).collect();
    let current: Vec<String> = graph.snapshot().into_iter().map(|(p, _)| p).collect();
    for path in &current {
        if !desired.contains(path.as_str()) {
            let _ = graph.remove(path);
        }
    }
    for (path, node) in snapshot {
        let _ = graph.set_path(path, node.value.raw.clone());
        if let Some(t) = &node.node_type {
            let _ = graph.set_type(path, t.clone());
        }
        for (k, v) in &node.meta {
            let _ = graph.set_meta(path, k, v.clone());
        }
    }
}

/// Coordinates transactional execution over a [`Graph`], with an
/// optional [`Disk`] to persist each node touched by a successful
/// transaction.
pub struct TxnManager {
    graph: Graph,
    disk: Option<Arc<Disk>>,
}

impl TxnManager {
    #[must_use]
    pub fn new(graph: Graph, disk: Option<Arc<Disk>>) -> Self {
        Self { graph, disk }
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run `f` against the graph. If `f` returns `Err`, the graph is
    /// restored to its pre-call state before the error is propagated.
    /// On success, every path `f` reports as touched is persisted (if a
    /// [`Disk`] is attached).
    ///
    /// # Errors
    /// Returns whatever error `f` returns, after rollback.
    pub fn execute<T>(&self, f: impl FnOnce(&Graph) -> Result<(T, Vec<String>), FxdError>) -> Result<T, FxdError> {
        let savepoint = self.graph.snapshot();
        match f(&self.graph) {
            Ok((value, touched_paths)) => {
                if let Some(disk) = &self.disk {
                    for path in &touched_paths {
                        disk.save_node(path)?;
                    }
                }
                crate::logger::audit("txn.commit", &format!("touched={}", touched_paths.len()));
                Ok(value)
            }
            Err(e) => {
                restore(&self.graph, &savepoint);
                crate::logger::audit("txn.rollback", &e.to_string());
                Err(e)
            }
        }
    }

    /// Retry `f` up to `attempts` times while it returns a retryable
    /// error ([`FxdError::is_retryable`]). Sleeps briefly (doubling each
    /// attempt, capped at 200ms) between retries so transient contention
    /// has a chance to clear.
    ///
    /// # Errors
    /// Returns the last error seen once `attempts` is exhausted, or
    /// immediately for a non-retryable error.
    pub fn with_retry<T>(
        &self,
        attempts: u32,
        mut f: impl FnMut(&Graph) -> Result<(T, Vec<String>), FxdError>,
    ) -> Result<T, FxdError> {
        let mut backoff_ms = 5u64;
        for attempt in 0..attempts.max(1) {
            match self.execute(&mut f) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms = (backoff_ms * 2).min(200);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("attempts is clamped to at least 1")
    }

    /// Apply a batch of patches (C8) as a single transaction: validation
    /// happens before any write (`apply_batch`'s own contract), and any
    /// error still in-flight (e.g. a disk write failure after patches
    /// were applied) rolls the graph back to its pre-batch state.
    ///
    /// # Errors
    /// Returns an error if conflict validation fails or a save fails.
    pub fn apply_patch_batch(&self, patches: &[Patch], opts: ApplyOptions) -> Result<ApplyOutcome, FxdError> {
        self.execute(|graph| {
            let outcome = patch::apply_batch(graph, patches, opts)?;
            let touched: Vec<String> = outcome
                .applied
                .iter()
                .chain(outcome.created.iter())
                .filter_map(|id| graph.by_snippet_id(id).and_then(|n| graph.path_of(n.id)))
                .collect();
            Ok((outcome, touched))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FxdError;
    use crate::graph::MetaValue;
    use crate::signal::SignalStream;

    fn manager() -> TxnManager {
        TxnManager::new(Graph::new(Arc::new(SignalStream::new())), None)
    }

    #[test]
    fn successful_execute_keeps_changes() {
        let mgr = manager();
        mgr.execute(|g| {
            g.set_path("a", "1")?;
            Ok(((), vec!["a".to_string()]))
        })
        .unwrap();
        assert_eq!(mgr.graph().get("a").unwrap().value.raw, "1");
    }

    #[test]
    fn failed_execute_rolls_back() {
        let mgr = manager();
        mgr.execute(|g| {
            g.set_path("a", "1")?;
            Ok(((), vec!["a".to_string()]))
        })
        .unwrap();

        let result: Result<(), FxdError> = mgr.execute(|g| {
            g.set_path("a", "2")?;
            g.set_path("b", "new")?;
            Err(FxdError::InvalidArgument("deliberate failure".into()))
        });
        assert!(result.is_err());
        assert_eq!(mgr.graph().get("a").unwrap().value.raw, "1");
        assert!(mgr.graph().get("b").is_none());
    }

    #[test]
    fn with_retry_gives_up_after_attempts_on_conflict() {
        let mgr = manager();
        mgr.execute(|g| {
            g.set_path("a", "1")?;
            g.set_meta("a", "id", MetaValue::Str("dup".into()))?;
            Ok(((), vec!["a".to_string()]))
        })
        .unwrap();
        mgr.execute(|g| {
            g.set_path("b", "2")?;
            Ok(((), vec!["b".to_string()]))
        })
        .unwrap();

        let mut tries = 0;
        let result: Result<(), FxdError> = mgr.with_retry(3, |g| {
            tries += 1;
            g.set_meta("b", "id", MetaValue::Str("dup".into()))?;
            Ok(((), vec![]))
        });
        assert!(result.is_err());
        assert_eq!(tries, 3);
    }
}
