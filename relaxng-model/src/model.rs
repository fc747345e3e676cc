//! The simplified pattern model: the output of the
//! simplification pipeline in `simplify.rs`, and the input both
//! `restrictions.rs` (section 7 checks) and `relaxng-validator` compile
//! against.
//!
//! `Pattern` is a plain recursive tree, *not* the hash-consed arena the
//! validator builds internally for derivative computation -- that's a
//! validator-private optimization over this public shape. Cycles (a
//! `define` that refers to itself, directly or through other `define`s)
//! are expressed via `Ref`, a shared, mutable cell that starts `None` and
//! is filled in once the referenced `define`'s pattern has been built.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A name class: the set of (namespace, local-name)
/// pairs an `element`/`attribute` pattern's name test accepts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NameClass {
    Named { namespace_uri: String, name: String },
    NsName { namespace_uri: String, except: Option<Box<NameClass>> },
    AnyName { except: Option<Box<NameClass>> },
    Alt { a: Box<NameClass>, b: Box<NameClass> },
}

impl NameClass {
    pub fn contains(&self, namespace_uri: &str, name: &str) -> bool {
        match self {
            NameClass::Named { namespace_uri: ns, name: n } => ns == namespace_uri && n == name,
            NameClass::NsName { namespace_uri: ns, except } => {
                ns == namespace_uri
                    && !except
                        .as_ref()
                        .map(|e| e.contains(namespace_uri, name))
                        .unwrap_or(false)
            }
            NameClass::AnyName { except } => !except
                .as_ref()
                .map(|e| e.contains(namespace_uri, name))
                .unwrap_or(false),
            NameClass::Alt { a, b } => a.contains(namespace_uri, name) || b.contains(namespace_uri, name),
        }
    }
}

/// A shared, possibly-not-yet-resolved pointer to a `define`'s pattern,
/// used to represent recursive schemas without an infinite `Pattern` tree.
/// `None` while the `define` it refers to is still being built (the
/// compiler fills it in once the whole grammar's defines are compiled);
/// `restrictions.rs` and the validator both treat a still-`None` `Ref` they
/// encounter as a compiler bug, never a legitimately-missing definition
/// (`UndefinedReference` is caught and reported earlier, before `Pattern`
/// construction begins).
#[derive(Clone, Debug)]
pub struct Ref(pub Rc<RefCell<Option<DefineRule>>>);

impl Ref {
    pub fn new() -> Ref {
        Ref(Rc::new(RefCell::new(None)))
    }

    pub fn resolve(&self, rule: DefineRule) {
        *self.0.borrow_mut() = Some(rule);
    }
}

impl Default for Ref {
    fn default() -> Self {
        Ref::new()
    }
}

/// One `define`'s compiled body, after `combine`-merging every same-named
/// `define` in the grammar into a single pattern.
#[derive(Clone, Debug)]
pub struct DefineRule {
    name: String,
    pattern: Pattern,
    span: codemap::Span,
}

impl DefineRule {
    pub fn new(name: impl Into<String>, pattern: Pattern, span: codemap::Span) -> DefineRule {
        DefineRule { name: name.into(), pattern, span }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn span(&self) -> codemap::Span {
        self.span
    }
}

/// The fully simplified pattern tree: every `Pattern`
/// that survives simplification is one of these 17 forms, matching RELAX
/// NG's simplified syntax (the "simplified RELAX NG pattern" grammar).
#[derive(Clone, Debug)]
pub enum Pattern {
    Empty,
    NotAllowed,
    Text,
    Choice(Vec<Pattern>),
    Interleave(Vec<Pattern>),
    Group(Vec<Pattern>),
    OneOrMore(Box<Pattern>),
    ZeroOrMore(Box<Pattern>),
    Optional(Box<Pattern>),
    Mixed(Box<Pattern>),
    List(Box<Pattern>),
    Attribute(NameClass, Box<Pattern>),
    Element(NameClass, Box<Pattern>),
    DatatypeValue {
        datatype: crate::datatype::DatatypeValues,
    },
    DatatypeName {
        datatype: crate::datatype::Datatypes,
        except: Option<Box<Pattern>>,
    },
    Ref(codemap::Span, String, Ref),
}

impl Pattern {
    /// Whether this pattern matches the empty sequence -- used by
    /// `restrictions.rs`'s "dead"/"string sequence" analysis of a
    /// not-yet-fully-simplified tree, where `NotAllowed` branches of a
    /// `Choice` are not pruned away outright.
    pub fn is_dead(&self) -> bool {
        matches!(self, Pattern::NotAllowed)
    }
}

/// The grammar produced by simplification: a single start pattern, plus
/// the table of every named `define` it (transitively) refers to, kept
/// around so a `ref`'s `Ref` cell can be resolved exactly once regardless
/// of how many `Pattern::Ref` occurrences point at it.
#[derive(Default)]
pub struct Grammar {
    pub defines: HashMap<String, Ref>,
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar::default()
    }

    pub fn get_or_create(&mut self, name: &str) -> Ref {
        self.defines.entry(name.to_string()).or_insert_with(Ref::new).clone()
    }
}
