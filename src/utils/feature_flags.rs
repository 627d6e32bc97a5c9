//! Runtime feature flags.
//!
//! A small global registry of toggles independent of Cargo compile-time
//! features, in the spirit of the flags the rest of this crate's ancestry
//! exposed through its admin surface. Core components consult these for
//! behavior not already covered by [`crate::config::FxdConfig`] (a boolean
//! escape hatch rather than a config reload).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Clone, Debug)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    pub description: String,
}

static FLAGS: LazyLock<RwLock<HashMap<String, FeatureFlag>>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "autosave-background-thread".to_string(),
        FeatureFlag {
            name: "autosave-background-thread".to_string(),
            enabled: true,
            description: "Run the auto-save scheduler's periodic flush on its own thread rather \
                than requiring callers to poll it manually."
                .to_string(),
        },
    );
    RwLock::new(map)
});

/// Enable or disable a feature flag. Returns true if the flag existed.
pub fn set(name: &str, enabled: bool) -> bool {
    let mut g = FLAGS.write();
    if let Some(f) = g.get_mut(name) {
        f.enabled = enabled;
        true
    } else {
        false
    }
}

#[must_use]
pub fn is_enabled(name: &str) -> bool {
    FLAGS.read().get(name).is_some_and(|f| f.enabled)
}

/// Ensure a feature exists (register if missing) with the provided default.
pub fn ensure(name: &str, default_enabled: bool, description: &str) {
    let mut g = FLAGS.write();
    g.entry(name.to_string()).or_insert_with(|| FeatureFlag {
        name: name.to_string(),
        enabled: default_enabled,
        description: description.to_string(),
    });
}

#[must_use]
pub fn list() -> Vec<FeatureFlag> {
    let mut v: Vec<FeatureFlag> = FLAGS.read().values().cloned().collect();
    v.sort_by(|a, b| a.name.cmp(&b.name));
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_present() {
        assert!(is_enabled("autosave-background-thread"));
    }

    #[test]
    fn set_unknown_flag_returns_false() {
        assert!(!set("does-not-exist", true));
    }

    #[test]
    fn ensure_is_idempotent() {
        ensure("custom-flag", true, "test flag");
        assert!(is_enabled("custom-flag"));
        ensure("custom-flag", false, "test flag changed");
        // ensure() does not override an existing flag's state
        assert!(is_enabled("custom-flag"));
    }
}
