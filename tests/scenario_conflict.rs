//! A snippet changes underneath a previously-rendered marker; ingesting
//! the stale text must not silently clobber the newer value.

use fxd_core::config::FxdConfig;
use fxd_core::graph::MetaValue;
use fxd_core::marker;
use fxd_core::patch::{ApplyOptions, OnConflict, OnMissing};
use fxd_core::Fxd;
use std::collections::HashMap;
use tempfile::tempdir;

#[test]
fn stale_edit_is_rejected_by_default() {
    let dir = tempdir().unwrap();
    let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
    fxd.set_snippet("a", "version one\n").unwrap();
    fxd.graph().set_meta("a", "id", MetaValue::Str("s1".into())).unwrap();

    let stale_text = marker::wrap("s1", "version one", "rust", &HashMap::new());

    // The snippet moves on before the stale text is ingested.
    fxd.set_snippet("a", "version two\n").unwrap();

    let err = fxd.ingest_text(&stale_text, ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, fxd_core::FxdError::Conflict(_)));
    assert_eq!(fxd.node("a").unwrap().value.raw, "version two\n");
}

#[test]
fn conflict_skip_leaves_current_value_untouched() {
    let dir = tempdir().unwrap();
    let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
    fxd.set_snippet("a", "version one\n").unwrap();
    fxd.graph().set_meta("a", "id", MetaValue::Str("s1".into())).unwrap();

    let stale_text = marker::wrap("s1", "version one", "rust", &HashMap::new());
    fxd.set_snippet("a", "version two\n").unwrap();

    let opts = ApplyOptions { on_missing: OnMissing::Create, on_conflict: OnConflict::Skip };
    let outcome = fxd.ingest_text(&stale_text, opts).unwrap();
    assert_eq!(outcome.skipped, vec!["s1".to_string()]);
    assert_eq!(fxd.node("a").unwrap().value.raw, "version two\n");
}

#[test]
fn conflict_overwrite_applies_the_incoming_body_anyway() {
    let dir = tempdir().unwrap();
    let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
    fxd.set_snippet("a", "version one\n").unwrap();
    fxd.graph().set_meta("a", "id", MetaValue::Str("s1".into())).unwrap();

    let stale_text = marker::wrap("s1", "version one", "rust", &HashMap::new());
    fxd.set_snippet("a", "version two\n").unwrap();

    let opts = ApplyOptions { on_missing: OnMissing::Create, on_conflict: OnConflict::Overwrite };
    let outcome = fxd.ingest_text(&stale_text, opts).unwrap();
    assert_eq!(outcome.applied, vec!["s1".to_string()]);
    assert_eq!(fxd.node("a").unwrap().value.raw, "version one\n");
}
