//! Matching compiled selectors against graph nodes.

use crate::config::{AttrSource, SelectorsConfig};
use crate::graph::{Graph, Node, NodeId};

use super::ast::{AttrOp, AttrTest, Combinator, Compound, Selector, SelectorList};

struct AttrValue {
    text: String,
    num: Option<f64>,
    boolean: Option<bool>,
}

fn resolve_attr(graph: &Graph, node: &Node, key: &str, config: &SelectorsConfig) -> Option<AttrValue> {
    for source in &config.attr_resolution {
        let found = match source {
            AttrSource::Meta => node.meta.get(key).map(|m| AttrValue {
                text: m.display(),
                num: m.as_f64(),
                boolean: m.as_bool_opt(),
            }),
            AttrSource::Type => {
                if key == "type" {
                    node.node_type.as_ref().map(|t| AttrValue {
                        text: t.clone(),
                        num: t.parse().ok(),
                        boolean: None,
                    })
                } else {
                    None
                }
            }
            AttrSource::Raw => {
                if key == "value" || key == "raw" {
                    Some(AttrValue {
                        text: node.value.raw.clone(),
                        num: node.value.raw.parse().ok(),
                        boolean: Some(node.value.as_bool()),
                    })
                } else {
                    None
                }
            }
            AttrSource::Child => {
                node.children.get(key).and_then(|id| graph.get_by_id(*id)).map(|child| AttrValue {
                    text: child.value.raw.clone(),
                    num: child.value.raw.parse().ok(),
                    boolean: Some(child.value.as_bool()),
                })
            }
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn attr_matches(graph: &Graph, node: &Node, test: &AttrTest, config: &SelectorsConfig) -> bool {
    let resolved = resolve_attr(graph, node, &test.key, config);
    match &test.op {
        AttrOp::Exists => resolved.is_some(),
        AttrOp::NotEq(v) => resolved.map_or(true, |a| &a.text != v),
        AttrOp::Eq(v) => resolved.is_some_and(|a| &a.text == v),
        AttrOp::Prefix(v) => resolved.is_some_and(|a| a.text.starts_with(v.as_str())),
        AttrOp::Suffix(v) => resolved.is_some_and(|a| a.text.ends_with(v.as_str())),
        AttrOp::Contains(v) => resolved.is_some_and(|a| a.text.contains(v.as_str())),
        AttrOp::Gt(v) => resolved.and_then(|a| a.num).is_some_and(|n| n > *v),
        AttrOp::Gte(v) => resolved.and_then(|a| a.num).is_some_and(|n| n >= *v),
        AttrOp::Lt(v) => resolved.and_then(|a| a.num).is_some_and(|n| n < *v),
        AttrOp::Lte(v) => resolved.and_then(|a| a.num).is_some_and(|n| n <= *v),
    }
}

fn compound_matches(graph: &Graph, node: &Node, compound: &Compound, config: &SelectorsConfig) -> bool {
    if let Some(type_name) = &compound.type_name {
        let matches_type = node.node_type.as_deref() == Some(type_name.as_str());
        let matches_class =
            config.class_matches_type && node.meta.get("class").and_then(|m| m.as_str_opt()) == Some(type_name.as_str());
        if !(matches_type || matches_class) {
            return false;
        }
    }
    if let Some(id) = &compound.id
        && node.snippet_id() != Some(id.as_str())
    {
        return false;
    }
    compound.attrs.iter().all(|a| attr_matches(graph, node, a, config))
}

fn ancestors(graph: &Graph, node_id: NodeId) -> Vec<Node> {
    let mut out = Vec::new();
    let mut current = graph.get_by_id(node_id).and_then(|n| n.parent_id);
    while let Some(id) = current {
        match graph.get_by_id(id) {
            Some(n) => {
                current = n.parent_id;
                out.push(n);
            }
            None => break,
        }
    }
    out
}

fn selector_matches(graph: &Graph, node_id: NodeId, selector: &Selector, config: &SelectorsConfig) -> bool {
    let Some(node) = graph.get_by_id(node_id) else { return false };
    let mut steps = selector.steps.iter().rev();
    let Some((_, last)) = steps.next() else { return false };
    if !compound_matches(graph, &node, last, config) {
        return false;
    }

    let mut ancestry = ancestors(graph, node_id).into_iter();
    for (combinator, compound) in steps {
        match combinator {
            Some(Combinator::Child) => {
                let Some(parent) = ancestry.next() else { return false };
                if !compound_matches(graph, &parent, compound, config) {
                    return false;
                }
            }
            Some(Combinator::Descendant) | None => {
                let mut found = false;
                for ancestor in ancestry.by_ref() {
                    if compound_matches(graph, &ancestor, compound, config) {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return false;
                }
            }
        }
    }
    true
}

#[must_use]
pub fn list_matches(graph: &Graph, node_id: NodeId, list: &SelectorList, config: &SelectorsConfig) -> bool {
    list.selectors.iter().any(|s| selector_matches(graph, node_id, s, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MetaValue;
    use crate::selector::parser::parse;
    use crate::signal::SignalStream;
    use std::sync::Arc;

    fn setup() -> Graph {
        let g = Graph::new(Arc::new(SignalStream::new()));
        g.set_path("pkg.mod.func", "fn x() {}").unwrap();
        g.set_type("pkg.mod.func", "function").unwrap();
        g.set_meta("pkg.mod.func", "id", MetaValue::Str("fn1".into())).unwrap();
        g.set_meta("pkg.mod.func", "lang", MetaValue::Str("rust".into())).unwrap();
        g.set_type("pkg.mod", "module").unwrap();
        g
    }

    #[test]
    fn matches_by_type_and_attr() {
        let g = setup();
        let list = parse(".function[lang=rust]").unwrap();
        let node = g.get("pkg.mod.func").unwrap();
        assert!(list_matches(&g, node.id, &list, &SelectorsConfig::default()));
    }

    #[test]
    fn matches_by_id() {
        let g = setup();
        let list = parse("#fn1").unwrap();
        let node = g.get("pkg.mod.func").unwrap();
        assert!(list_matches(&g, node.id, &list, &SelectorsConfig::default()));
    }

    #[test]
    fn descendant_combinator_checks_ancestry() {
        let g = setup();
        let list = parse(".module .function").unwrap();
        let node = g.get("pkg.mod.func").unwrap();
        assert!(list_matches(&g, node.id, &list, &SelectorsConfig::default()));

        let miss = parse(".nonexistent .function").unwrap();
        assert!(!list_matches(&g, node.id, &miss, &SelectorsConfig::default()));
    }

    #[test]
    fn not_eq_matches_missing_attribute() {
        let g = setup();
        let list = parse("[framework!=django]").unwrap();
        let node = g.get("pkg.mod.func").unwrap();
        assert!(list_matches(&g, node.id, &list, &SelectorsConfig::default()));
    }
}
