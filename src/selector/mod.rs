//! C5 — the selector engine: a small CSS-like grammar for picking nodes
//! out of the graph (`.type[attr=value] > #id`), used by groups (C6) to
//! define their membership predicates.

pub mod ast;
mod eval;
pub mod parser;

pub use ast::{AttrOp, AttrTest, Combinator, Compound, Selector, SelectorList};
pub use eval::list_matches;
pub use parser::{parse, SelectorSyntaxError};
