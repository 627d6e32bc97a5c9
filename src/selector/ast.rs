//! Selector abstract syntax: compound selectors chained by combinators.

#[derive(Debug, Clone, PartialEq)]
pub enum AttrOp {
    Exists,
    Eq(String),
    NotEq(String),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrTest {
    pub key: String,
    pub op: AttrOp,
}

/// A single simple-selector term: `.type#id[attr=val][attr2]`, all of
/// which must match the same node (implicit AND by juxtaposition).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub attrs: Vec<AttrTest>,
}

impl Compound {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_name.is_none() && self.id.is_none() && self.attrs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace: the left compound must match some ancestor.
    Descendant,
    /// `>`: the left compound must match the direct parent.
    Child,
}

/// A chain of compounds read left to right, each preceded by the
/// combinator that relates it to the previous compound (the first has
/// none). The rightmost compound is matched against the candidate node;
/// earlier compounds constrain its ancestry.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub steps: Vec<(Option<Combinator>, Compound)>,
}

/// A comma-separated list of selectors; a node matches the list if it
/// matches any one of them.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    pub selectors: Vec<Selector>,
}
