//! A snippet is rendered into a group, hand-edited in the rendered text,
//! and the edit flows back into the graph through the patch engine.

use fxd_core::config::FxdConfig;
use fxd_core::patch::ApplyOptions;
use fxd_core::Fxd;
use tempfile::tempdir;

#[test]
fn edit_in_rendered_text_flows_back_to_graph() {
    let dir = tempdir().unwrap();
    let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();

    fxd.set_snippet("pkg.add", "fn add(a: i32, b: i32) -> i32 { a + b }\n").unwrap();
    fxd.graph().set_type("pkg.add", "function").unwrap();
    fxd.graph().set_meta("pkg.add", "id", fxd_core::graph::MetaValue::Str("add_fn".into())).unwrap();

    let group = fxd.group("functions");
    group.include(".function").unwrap();

    let rendered = fxd.render_group("functions");
    assert!(rendered.contains("add_fn"));

    // Simulate a hand edit: tighten the body.
    let edited = rendered.replace(
        "fn add(a: i32, b: i32) -> i32 { a + b }",
        "fn add(a: i32, b: i32) -> i32 { a.wrapping_add(b) }",
    );

    let outcome = fxd.ingest_text(&edited, ApplyOptions::default()).unwrap();
    assert_eq!(outcome.applied, vec!["add_fn".to_string()]);

    let node = fxd.node("pkg.add").unwrap();
    assert!(node.value.raw.contains("wrapping_add"));
}

#[test]
fn unrelated_text_around_markers_is_ignored() {
    let dir = tempdir().unwrap();
    let fxd = Fxd::open(dir.path(), FxdConfig::default()).unwrap();
    fxd.set_snippet("a", "one\n").unwrap();
    fxd.graph().set_meta("a", "id", fxd_core::graph::MetaValue::Str("s1".into())).unwrap();

    let rendered = fxd.render_group("all");
    // No includes set on "all" yet, so nothing renders.
    assert!(rendered.is_empty());

    fxd.group("all").include("[id]").unwrap();
    let rendered = fxd.render_group("all");
    let wrapped_with_noise = format!("// a file header\n\n{rendered}\n\n// trailing notes\n");
    let outcome = fxd.ingest_text(&wrapped_with_noise, ApplyOptions::default()).unwrap();
    assert_eq!(outcome.applied, vec!["s1".to_string()]);
}
