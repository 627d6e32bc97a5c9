//! C8 — the patch engine: turning [`crate::marker::Patch`]es scanned out
//! of edited rendered text back into graph mutations.

use crate::errors::FxdError;
use crate::graph::{Graph, MetaValue};
use crate::marker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissing {
    /// Create a new node for a snippet id with no matching node, parented
    /// under a sanitized path beneath `_orphans` since the patch carries
    /// no information about where in the graph it belongs.
    Create,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Apply the incoming body anyway, discarding the divergent value.
    Overwrite,
    Skip,
    /// Abort the whole batch without applying anything.
    Fail,
}

#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub on_missing: OnMissing,
    pub on_conflict: OnConflict,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { on_missing: OnMissing::Create, on_conflict: OnConflict::Fail }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ApplyOutcome {
    pub applied: Vec<String>,
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub id: String,
    pub current_body: String,
    pub incoming_body: String,
}

/// Replace any character that cannot appear in a path component with
/// `_`, so an arbitrary snippet id can always be used as a single path
/// segment under `_orphans`.
fn sanitize_path_component(id: &str) -> String {
    id.chars().map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' }).collect()
}

/// Compare each patch whose id resolves to an existing node against
/// that node's current raw value. A conflict means the node's content
/// diverged from what was rendered (and thus checksummed) after the
/// text carrying this patch was produced, so applying it blindly would
/// silently discard someone else's edit.
#[must_use]
pub fn detect_conflicts(graph: &Graph, patches: &[marker::Patch]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for patch in patches {
        let Some(node) = graph.by_snippet_id(&patch.id) else { continue };
        let eol_normalized = marker::normalize_eol(&node.value.raw);
        let current_normalized = if eol_normalized.is_empty() || eol_normalized.ends_with('\n') {
            eol_normalized
        } else {
            format!("{eol_normalized}\n")
        };
        if marker::checksum(&current_normalized) != patch.declared_checksum {
            conflicts.push(Conflict {
                id: patch.id.clone(),
                current_body: node.value.raw.clone(),
                incoming_body: patch.body.clone(),
            });
        }
    }
    conflicts
}

fn apply_one(graph: &Graph, patch: &marker::Patch, opts: ApplyOptions, outcome: &mut ApplyOutcome) -> Result<(), FxdError> {
    match graph.by_snippet_id(&patch.id) {
        Some(node) => {
            let path = graph.path_of(node.id).ok_or_else(|| FxdError::NotFound(patch.id.clone()))?;
            graph.set_path(&path, patch.body.clone())?;
            outcome.applied.push(patch.id.clone());
        }
        None => match opts.on_missing {
            OnMissing::Skip => outcome.skipped.push(patch.id.clone()),
            OnMissing::Create => {
                let path = format!("_orphans.{}", sanitize_path_component(&patch.id));
                graph.set_path(&path, patch.body.clone())?;
                graph.set_meta(&path, "id", MetaValue::Str(patch.id.clone()))?;
                outcome.created.push(patch.id.clone());
            }
        },
    }
    Ok(())
}

/// Apply a single patch, unconditionally (no conflict checking — callers
/// that care about conflicts should call [`detect_conflicts`] first, or
/// use [`apply_batch`]).
pub fn apply(graph: &Graph, patch: &marker::Patch, opts: ApplyOptions) -> Result<ApplyOutcome, FxdError> {
    let mut outcome = ApplyOutcome::default();
    apply_one(graph, patch, opts, &mut outcome)?;
    Ok(outcome)
}

/// Apply a batch of patches as a single validated unit: conflicts are
/// computed across the whole batch before anything is written, so an
/// `OnConflict::Fail` batch either applies in full or not at all. This
/// is the validate-then-rollback contract the transaction manager (C10)
/// relies on when it wraps a batch in a savepoint: the patch engine
/// guarantees the batch either passes validation as a whole, or nothing
/// in it has been written yet.
pub fn apply_batch(graph: &Graph, patches: &[marker::Patch], opts: ApplyOptions) -> Result<ApplyOutcome, FxdError> {
    let conflicts = detect_conflicts(graph, patches);
    if !conflicts.is_empty() && opts.on_conflict == OnConflict::Fail {
        let ids: Vec<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
        return Err(FxdError::Conflict(format!("conflicting snippets: {}", ids.join(", "))));
    }
    let conflicted_ids: std::collections::HashSet<&str> = if opts.on_conflict == OnConflict::Skip {
        conflicts.iter().map(|c| c.id.as_str()).collect()
    } else {
        std::collections::HashSet::new()
    };

    let mut outcome = ApplyOutcome::default();
    for patch in patches {
        if conflicted_ids.contains(patch.id.as_str()) {
            outcome.skipped.push(patch.id.clone());
            continue;
        }
        apply_one(graph, patch, opts, &mut outcome)?;
    }
    Ok(outcome)
}
