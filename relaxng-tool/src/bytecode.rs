//! The `convert` subcommand's "compiled schema" output. Compiled-schema
//! serialisation is optional and format-unspecified beyond needing
//! recognisable record tags for each pattern variant and a table of
//! defines, and preserving pattern structure, datatype library URIs,
//! parsed parameters, and name-pattern information. This is a
//! line-oriented text format rather than a binary one, so a `convert`ed
//! schema can be inspected with a plain text viewer while debugging.
//!
//! Each `define` that a `ref` ever points at is written once, to a
//! `DEFINE` record, the first time the encoder reaches it; later
//! occurrences (including the cycle that gave it the `Ref` indirection in
//! the first place) write a `REF` record pointing at that define's id.

use relaxng_model::model::{DefineRule, NameClass, Pattern};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

struct Encoder {
    /// `Rc::as_ptr` of a `define`'s shared cell -> the id it was first
    /// assigned, so every `ref` to the same `define` gets the same id
    /// regardless of how many `Pattern::Ref` occurrences point at it.
    define_ids: HashMap<usize, u32>,
    defines: Vec<String>,
}

/// Encodes `root` and every `define` it transitively refers to.
pub fn encode(root: &DefineRule) -> String {
    let mut enc = Encoder { define_ids: HashMap::new(), defines: Vec::new() };
    let mut start = String::new();
    enc.pattern(&mut start, root.pattern());

    let mut out = String::new();
    writeln!(out, "RNGBC1").unwrap();
    writeln!(out, "DEFINES {}", enc.defines.len()).unwrap();
    for (id, body) in enc.defines.iter().enumerate() {
        writeln!(out, "DEFINE {id}").unwrap();
        out.push_str(body);
    }
    writeln!(out, "START").unwrap();
    out.push_str(&start);
    out
}

impl Encoder {
    fn pattern(&mut self, out: &mut String, p: &Pattern) {
        match p {
            Pattern::Empty => writeln!(out, "EMPTY").unwrap(),
            Pattern::NotAllowed => writeln!(out, "NOT_ALLOWED").unwrap(),
            Pattern::Text => writeln!(out, "TEXT").unwrap(),
            Pattern::Choice(children) => self.seq(out, "CHOICE", children),
            Pattern::Interleave(children) => self.seq(out, "INTERLEAVE", children),
            Pattern::Group(children) => self.seq(out, "GROUP", children),
            Pattern::OneOrMore(inner) => self.wrap(out, "ONE_OR_MORE", inner),
            Pattern::ZeroOrMore(inner) => self.wrap(out, "ZERO_OR_MORE", inner),
            Pattern::Optional(inner) => self.wrap(out, "OPTIONAL", inner),
            Pattern::Mixed(inner) => self.wrap(out, "MIXED", inner),
            Pattern::List(inner) => self.wrap(out, "LIST", inner),
            Pattern::Attribute(nc, inner) => {
                writeln!(out, "ATTRIBUTE").unwrap();
                self.name_class(out, nc);
                self.pattern(out, inner);
            }
            Pattern::Element(nc, inner) => {
                writeln!(out, "ELEMENT").unwrap();
                self.name_class(out, nc);
                self.pattern(out, inner);
            }
            Pattern::DatatypeValue { datatype } => {
                writeln!(out, "DATATYPE_VALUE {:?}", datatype).unwrap();
            }
            Pattern::DatatypeName { datatype, except } => {
                writeln!(out, "DATATYPE_NAME {:?}", datatype).unwrap();
                match except {
                    Some(p) => {
                        writeln!(out, "EXCEPT").unwrap();
                        self.pattern(out, p);
                    }
                    None => writeln!(out, "NO_EXCEPT").unwrap(),
                }
            }
            Pattern::Ref(_span, name, r) => {
                let ptr = Rc::as_ptr(&r.0) as usize;
                let id = match self.define_ids.get(&ptr) {
                    Some(id) => *id,
                    None => {
                        // Reserve the id (and a placeholder body) before
                        // recursing, so a define that (transitively) refers
                        // to itself terminates on the second visit instead
                        // of recursing forever.
                        let id = self.defines.len() as u32;
                        self.define_ids.insert(ptr, id);
                        self.defines.push(String::new());

                        let rule = r.0.borrow();
                        let rule = rule.as_ref().expect("ref resolved before encoding");
                        let mut body = String::new();
                        self.pattern(&mut body, rule.pattern());
                        self.defines[id as usize] = body;
                        id
                    }
                };
                writeln!(out, "REF {id} {name}").unwrap();
            }
        }
    }

    fn seq(&mut self, out: &mut String, tag: &str, children: &[Pattern]) {
        writeln!(out, "{tag} {}", children.len()).unwrap();
        for c in children {
            self.pattern(out, c);
        }
    }

    fn wrap(&mut self, out: &mut String, tag: &str, inner: &Pattern) {
        writeln!(out, "{tag}").unwrap();
        self.pattern(out, inner);
    }

    fn name_class(&mut self, out: &mut String, nc: &NameClass) {
        match nc {
            NameClass::Named { namespace_uri, name } => {
                writeln!(out, "NAMED {namespace_uri:?} {name:?}").unwrap();
            }
            NameClass::NsName { namespace_uri, except } => {
                writeln!(out, "NS_NAME {namespace_uri:?}").unwrap();
                match except {
                    Some(e) => {
                        writeln!(out, "EXCEPT").unwrap();
                        self.name_class(out, e);
                    }
                    None => writeln!(out, "NO_EXCEPT").unwrap(),
                }
            }
            NameClass::AnyName { except } => {
                writeln!(out, "ANY_NAME").unwrap();
                match except {
                    Some(e) => {
                        writeln!(out, "EXCEPT").unwrap();
                        self.name_class(out, e);
                    }
                    None => writeln!(out, "NO_EXCEPT").unwrap(),
                }
            }
            NameClass::Alt { a, b } => {
                writeln!(out, "ALT").unwrap();
                self.name_class(out, a);
                self.name_class(out, b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaxng_model::model::{DefineRule, Pattern};

    fn dummy_span() -> codemap::Span {
        let mut map = codemap::CodeMap::new();
        let file = map.add_file("test".to_string(), "x".to_string());
        file.span
    }

    #[test]
    fn encodes_flat_pattern() {
        let rule = DefineRule::new("start", Pattern::Text, dummy_span());
        let out = encode(&rule);
        assert!(out.starts_with("RNGBC1\n"));
        assert!(out.contains("START\n"));
        assert!(out.contains("TEXT\n"));
    }

    #[test]
    fn encodes_choice_of_two() {
        let rule = DefineRule::new(
            "start",
            Pattern::Choice(vec![Pattern::Empty, Pattern::Text]),
            dummy_span(),
        );
        let out = encode(&rule);
        assert!(out.contains("CHOICE 2"));
        assert!(out.contains("EMPTY"));
        assert!(out.contains("TEXT"));
    }
}
