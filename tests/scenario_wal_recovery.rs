//! Closing and reopening a store replays the WAL; a truncated trailing
//! record (simulating a crash mid-write) is dropped rather than failing
//! the whole recovery.

use fxd_core::config::FxdConfig;
use fxd_core::disk::Disk;
use fxd_core::graph::MetaValue;
use fxd_core::signal::SignalStream;
use fxd_core::Fxd;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn reopening_replays_every_committed_write() {
    let dir = tempdir().unwrap();
    {
        let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
        fxd.set_snippet("a.b", "hello").unwrap();
        fxd.graph().set_meta("a.b", "id", MetaValue::Str("ab1".into())).unwrap();
        fxd.checkpoint().unwrap();
        fxd.set_snippet("a.c", "world").unwrap();
    }

    let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
    assert_eq!(fxd.node("a.b").unwrap().value.raw, "hello");
    assert_eq!(fxd.node("a.c").unwrap().value.raw, "world");
    assert!(fxd.graph().by_snippet_id("ab1").is_some());
}

#[test]
fn truncated_trailing_record_is_dropped_not_fatal() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("graph.wal");
    {
        let disk = Disk::open(dir.path(), Arc::new(SignalStream::new())).unwrap();
        disk.graph().set_path("a", "one").unwrap();
        disk.save_node("a").unwrap();
        disk.graph().set_path("b", "two").unwrap();
        disk.save_node("b").unwrap();
    }

    // Chop off the last few bytes to simulate a crash mid-append.
    let len = std::fs::metadata(&wal_path).unwrap().len();
    let mut file = OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(len.saturating_sub(5)).unwrap();
    file.seek(SeekFrom::End(0)).unwrap();
    file.flush().unwrap();
    drop(file);

    let disk = Disk::open(dir.path(), Arc::new(SignalStream::new())).unwrap();
    // The first record survives; the truncated trailing one is dropped.
    assert_eq!(disk.graph().get("a").unwrap().value.raw, "one");
}
