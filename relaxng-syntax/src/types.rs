//! Small plumbing types shared between the raw schema tree, the
//! simplifier, and the datatype library's parameter/value parsing.
//!
//! `Span` here is a plain byte range rather than a `codemap::Span`: these
//! types are constructed while walking a [`crate::tree::Schema`], before a
//! `codemap::File` is necessarily in scope, and are converted to a real
//! `codemap::Span` on demand (see `relaxng_model::Context::convert_span`).

use std::fmt;
use std::ops::Range;

pub type Span = Range<usize>;

/// A qualified name as it appears in schema-authored text: a namespace URI
/// already resolved by the name resolver, paired with the source span and
/// local name of the occurrence (kept for diagnostics).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QName(pub String, pub (Span, String));

impl QName {
    pub fn namespace_uri(&self) -> &str {
        &self.0
    }
    pub fn local_name(&self) -> &str {
        &(self.1).1
    }
    pub fn span(&self) -> &Span {
        &(self.1).0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier(pub Span, pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentifierOrKeyword {
    Identifier(Identifier),
    Keyword(Span, String),
}

impl IdentifierOrKeyword {
    pub fn as_str(&self) -> &str {
        match self {
            IdentifierOrKeyword::Identifier(Identifier(_, s)) => s,
            IdentifierOrKeyword::Keyword(_, s) => s,
        }
    }
}

impl fmt::Display for IdentifierOrKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of a schema-authored string literal. RELAX NG compact syntax
/// allows adjacent quoted literals to be concatenated with `~`; the XML
/// syntax this repo actually parses never produces more than one segment,
/// but `parse_params` (constructed directly by `relaxng-model` when reading
/// `<param>`/`<value>` element text) keeps the `Vec` shape for parity with
/// the datatype library's facet-parsing code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LiteralSegment {
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Literal(pub Span, pub Vec<LiteralSegment>);

impl Literal {
    pub fn single(span: Span, value: impl Into<String>) -> Literal {
        Literal(span, vec![LiteralSegment { body: value.into() }])
    }

    pub fn as_string_value(&self) -> String {
        self.1.iter().map(|seg| seg.body.as_str()).collect()
    }

    pub fn span(&self) -> &Span {
        &self.0
    }
}

/// A namespace-prefix annotation RELAX NG compact syntax allows on
/// identifiers (`foo:bar` as an identifier rather than a name). Unused by
/// the XML-syntax-only parser in this crate, kept so `Param`'s shape lines
/// up with the datatype library code that consumes it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamePrefix(pub Span, pub String);

/// A single `<param name="...">value</param>` occurrence, resolved to its
/// facet name and literal value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Param(pub Span, pub Option<NamePrefix>, pub IdentifierOrKeyword, pub Literal);

impl Param {
    pub fn name(&self) -> &str {
        self.2.as_str()
    }
    pub fn value(&self) -> &Literal {
        &self.3
    }
    pub fn span(&self) -> &Span {
        &self.0
    }
}

/// The name of a datatype as written in a `data`/`value` element: either a
/// `prefix:local` resolved against the active `datatypeLibrary`, or (not
/// produced by the XML-syntax parser, but kept for symmetry with
/// compact-syntax-shaped consumers) an explicit namespaced-name literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DatatypeName {
    CName(QName),
    /// A datatype name given as an explicit `(namespace_uri, local_name)`
    /// pair rather than resolved from a `prefix:local` token. Never
    /// produced by this crate's XML-syntax parser (kept so consumers
    /// written against compact-syntax-shaped `DatatypeName`s still match
    /// exhaustively).
    NamespacedName((String, String)),
}

impl DatatypeName {
    pub fn library_uri(&self) -> &str {
        match self {
            DatatypeName::CName(qn) => qn.namespace_uri(),
            DatatypeName::NamespacedName((uri, _)) => uri,
        }
    }
    pub fn local_name(&self) -> &str {
        match self {
            DatatypeName::CName(qn) => qn.local_name(),
            DatatypeName::NamespacedName((_, local)) => local,
        }
    }
}
