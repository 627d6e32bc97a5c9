//! C4 — the signal stream.
//!
//! Every observable mutation made through [`crate::graph::Graph`] is
//! appended here as a single [`Signal`] before it is visible to callers.
//! Groups (C6) and external subscribers replay from a cursor and then
//! continue to receive live signals through the same callback, so there is
//! no separate "catch up" API to get wrong.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Value,
    Children,
    Metadata,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub seq: u64,
    pub timestamp_ns: u64,
    pub kind: SignalKind,
    pub source_node_id: NodeId,
    pub base_version: u64,
    pub new_version: u64,
    /// Freeform payload, e.g. the child key added/removed or the meta key changed.
    pub delta: String,
}

#[derive(Debug, Clone)]
pub struct SignalFilter {
    pub kinds: Option<Vec<SignalKind>>,
    pub node_id: Option<NodeId>,
}

impl SignalFilter {
    #[must_use]
    pub fn all() -> Self {
        Self { kinds: None, node_id: None }
    }

    fn matches(&self, s: &Signal) -> bool {
        if let Some(kinds) = &self.kinds
            && !kinds.contains(&s.kind)
        {
            return false;
        }
        if let Some(id) = &self.node_id
            && *id != s.source_node_id
        {
            return false;
        }
        true
    }
}

type Subscriber = Box<dyn Fn(&Signal) + Send + Sync>;

struct Subscription {
    id: u64,
    cursor: u64,
    filter: SignalFilter,
    callback: Subscriber,
}

/// Append-only, in-memory log of every mutation signal.
///
/// Retention is bounded by the owning [`crate::graph::Graph`] via
/// [`SignalStream::truncate_before`] after a successful save (the disk
/// layer, C9, does not need replay older than its own checkpoint).
pub struct SignalStream {
    next_seq: AtomicU64,
    log: RwLock<VecDeque<Signal>>,
    subscribers: Mutex<Vec<Subscription>>,
    next_sub_id: AtomicU64,
    last_timestamp_ns: AtomicU64,
}

impl Default for SignalStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalStream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            log: RwLock::new(VecDeque::new()),
            subscribers: Mutex::new(Vec::new()),
            next_sub_id: AtomicU64::new(1),
            last_timestamp_ns: AtomicU64::new(0),
        }
    }

    fn strictly_monotonic_now(&self) -> u64 {
        let wall = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut prev = self.last_timestamp_ns.load(Ordering::SeqCst);
        loop {
            let candidate = if wall > prev { wall } else { prev + 1 };
            match self.last_timestamp_ns.compare_exchange_weak(
                prev,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Append a new signal, assigning it the next sequence number and a
    /// timestamp strictly greater than the previous signal's.
    pub fn append(
        &self,
        kind: SignalKind,
        source_node_id: NodeId,
        base_version: u64,
        new_version: u64,
        delta: impl Into<String>,
    ) -> Signal {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let timestamp_ns = self.strictly_monotonic_now();
        let signal = Signal {
            seq,
            timestamp_ns,
            kind,
            source_node_id,
            base_version,
            new_version,
            delta: delta.into(),
        };
        self.log.write().push_back(signal.clone());
        let subs = self.subscribers.lock();
        for sub in subs.iter() {
            if seq > sub.cursor && sub.filter.matches(&signal) {
                (sub.callback)(&signal);
            }
        }
        signal
    }

    /// Read all signals with `seq > cursor`, in order.
    #[must_use]
    pub fn read_range(&self, cursor: u64) -> Vec<Signal> {
        self.log.read().iter().filter(|s| s.seq > cursor).cloned().collect()
    }

    /// Read the most recent `n` signals.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<Signal> {
        let log = self.log.read();
        let len = log.len();
        let start = len.saturating_sub(n);
        log.iter().skip(start).cloned().collect()
    }

    /// Subscribe from `cursor`: the callback is first invoked, synchronously
    /// and in order, for every already-logged signal with `seq > cursor`
    /// that matches `filter`, then again for every future matching signal.
    /// Returns a subscription id usable with [`SignalStream::unsubscribe`].
    pub fn subscribe(
        &self,
        cursor: u64,
        filter: SignalFilter,
        callback: impl Fn(&Signal) + Send + Sync + 'static,
    ) -> u64 {
        let backlog = self.read_range(cursor);
        for s in &backlog {
            if filter.matches(s) {
                callback(s);
            }
        }
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let max_seq = backlog.last().map_or(cursor, |s| s.seq);
        self.subscribers.lock().push(Subscription {
            id,
            cursor: max_seq,
            filter,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    /// Drop logged signals with `seq <= checkpoint`. Subscribers already
    /// registered are unaffected since their cursor only moves forward.
    pub fn truncate_before(&self, checkpoint: u64) {
        self.log.write().retain(|s| s.seq > checkpoint);
    }

    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst) - 1
    }
}

#[must_use]
pub fn shared() -> Arc<SignalStream> {
    Arc::new(SignalStream::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn timestamps_are_strictly_monotonic() {
        let stream = SignalStream::new();
        let id = NodeId::new();
        let a = stream.append(SignalKind::Value, id, 1, 2, "x");
        let b = stream.append(SignalKind::Value, id, 2, 3, "y");
        assert!(b.timestamp_ns > a.timestamp_ns);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn subscribe_replays_backlog_then_live() {
        let stream = SignalStream::new();
        let id = NodeId::new();
        stream.append(SignalKind::Value, id, 0, 1, "a");
        stream.append(SignalKind::Value, id, 1, 2, "b");

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        stream.subscribe(0, SignalFilter::all(), move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        stream.append(SignalKind::Value, id, 2, 3, "c");
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn filter_by_kind_excludes_other_kinds() {
        let stream = SignalStream::new();
        let id = NodeId::new();
        stream.append(SignalKind::Value, id, 0, 1, "a");
        stream.append(SignalKind::Metadata, id, 1, 1, "b");

        let filter = SignalFilter { kinds: Some(vec![SignalKind::Metadata]), node_id: None };
        let matched = stream.read_range(0).into_iter().filter(|s| filter.matches(s)).count();
        assert_eq!(matched, 1);
    }

    #[test]
    fn truncate_before_drops_old_entries_only() {
        let stream = SignalStream::new();
        let id = NodeId::new();
        stream.append(SignalKind::Value, id, 0, 1, "a");
        stream.append(SignalKind::Value, id, 1, 2, "b");
        let last = stream.last_seq();
        stream.truncate_before(last - 1);
        assert_eq!(stream.read_range(0).len(), 1);
    }
}
