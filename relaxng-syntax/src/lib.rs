//! The raw XML tree model that the RELAX NG simplification pipeline mutates
//! plus the lexical primitives and base-URI handling
//! that sit underneath it.
//!
//! This crate knows nothing about RELAX NG patterns or simplification; it
//! only knows how to parse a `.rng` document into a mutable, parent-pointer
//! preserving tree, and how to carry the handful of "plumbing" types
//! (`QName`, datatype-library literal/param syntax, NCName checks) that the
//! datatype library and the simplifier both need.

pub mod compact;
pub mod ncname;
pub mod tree;
pub mod types;
pub mod uri;
pub mod xmlsyntax;

pub use tree::{Attr, Node, Schema};
pub use types::{DatatypeName, Identifier, IdentifierOrKeyword, Literal, LiteralSegment, NamePrefix, Param, QName, Span};
