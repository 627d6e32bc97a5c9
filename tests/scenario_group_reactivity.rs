//! A reactive group recomputes its membership in the background as the
//! graph changes, without the caller calling anything beyond the initial
//! `include`.

use fxd_core::config::SelectorsConfig;
use fxd_core::graph::Graph;
use fxd_core::signal::SignalStream;
use fxd_core::view::Group;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn reactive_group_picks_up_new_matches_without_explicit_recompute() {
    let graph = Graph::new(Arc::new(SignalStream::new()));
    graph.set_path("a", "x").unwrap();
    graph.set_type("a", "widget").unwrap();

    let group = Group::new("widgets", graph.clone(), SelectorsConfig::default(), true, 10);
    group.include(".widget").unwrap();

    // Give the debounce thread a moment to pick up the initial include.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(group.list().len(), 1);

    graph.set_path("b", "y").unwrap();
    graph.set_type("b", "widget").unwrap();

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(group.list().len(), 2);
}

#[test]
fn disabling_reactive_stops_background_recompute() {
    let graph = Graph::new(Arc::new(SignalStream::new()));
    let group = Group::new("widgets", graph.clone(), SelectorsConfig::default(), true, 10);
    group.include(".widget").unwrap();
    group.set_reactive(false);

    graph.set_path("a", "x").unwrap();
    graph.set_type("a", "widget").unwrap();
    std::thread::sleep(Duration::from_millis(100));

    // No automatic recompute happened; membership is stale until an
    // explicit mutator (`include`/`exclude`/`add`/`remove`/`reorder`)
    // forces one.
    assert!(group.list().is_empty());
}
