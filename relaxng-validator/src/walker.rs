//! The explicit, event-driven validation API: `Walker`. Unlike `Validator`,
//! which pulls its own `xmlparser::Token`s from a byte stream, a `Walker` is
//! fed one already-parsed event at a time and never touches XML syntax --
//! callers resolve qualified names, merge adjacent text nodes, and decide
//! what counts as one "event" themselves. This suits embedding into an
//! editor, a different parser, or a non-XML source of the same event shape.
//!
//! The derivative engine underneath (`Schema`, `Pat`, `PatId`, and the
//! `start_tag_open_deriv`/`att_deriv`/`start_tag_close_deriv`/`end_tag_deriv`
//! functions `Validator` already defines) is reused unchanged: `Walker` is a
//! sibling consumer of those private items, reachable because this module
//! is declared inside the crate root and so shares its privacy boundary.
//! `current_step` already carries the "what to resume with once this
//! element closes" information via the engine's own `Pat::After` nodes, so
//! `Walker` does not separately maintain a shadow stack of saved patterns --
//! only the open element names, kept so `end_tag` can check it closes what
//! it claims to.

use crate::{contains, Attr, Pat, PatId, QualifiedName, Schema, Validator};
use relaxng_model::datatype::Datatype;
use relaxng_model::model::{self, NameClass};
use relaxng_model::resolver::NameResolver;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use xmlparser::StrSpan;

use crate::errors::{AttributeNameError, AttributeValueError, ElementNameError, WalkerError};

/// One step of the explicit validation protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    EnterContext,
    DefinePrefix { prefix: String, uri: String },
    EnterStartTag { namespace_uri: String, local_name: String },
    AttributeName { namespace_uri: String, local_name: String },
    AttributeValue { value: String },
    LeaveStartTag,
    /// Callers should merge adjacent text nodes into a single event before
    /// firing it -- datatypes are validated over an element's full text
    /// content, not chunk by chunk.
    Text { value: String },
    EndTag { namespace_uri: String, local_name: String },
    LeaveContext,
}

/// One entry of what `Walker::possible` returns: either a concrete
/// structural event (`LeaveStartTag`, `Text`, ...) or a name-pattern an
/// `EnterStartTag`/`AttributeName` could satisfy, not a literal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PossibleEvent {
    EnterStartTag(NameClass),
    AttributeName(NameClass),
    AttributeValue,
    LeaveStartTag,
    Text,
    EndTag,
    LeaveContext,
}

#[derive(Debug, Clone)]
enum Mode {
    Content,
    OpenTag {
        namespace_uri: String,
        local_name: String,
        pending_attr: Option<(String, String)>,
        /// The content pattern as derived so far by the attributes applied
        /// up to this point; `start_tag_close_deriv` is applied to this at
        /// `leave_start_tag`.
        working_step: PatId,
    },
}

/// An explicit, clonable validation cursor over a compiled schema.
///
/// `clone()` is cheap and shares the same growing pattern arena (`Schema`'s
/// hash-consing only ever adds entries, so concurrent reads from several
/// clones are sound) while each clone keeps its own position -- exactly the
/// "independent walker sharing only the pattern graph" contract this API
/// is built around.
pub struct Walker {
    schema: Rc<Schema>,
    current_step: PatId,
    resolver: NameResolver,
    mode: Mode,
    /// `(namespace_uri, local_name)` of every currently open element,
    /// innermost last.
    open_elements: Vec<(String, String)>,
    /// Set while an `enter_start_tag` found no matching `Element` pattern;
    /// holds the open-element depth the mismatched element was entered at,
    /// so the matching `end_tag` (and nothing shallower) clears it.
    recovering_from_depth: Option<usize>,
}

impl Clone for Walker {
    fn clone(&self) -> Walker {
        Walker {
            schema: Rc::clone(&self.schema),
            current_step: self.current_step,
            resolver: self.resolver.clone(),
            mode: self.mode.clone(),
            open_elements: self.open_elements.clone(),
            recovering_from_depth: self.recovering_from_depth,
        }
    }
}

impl Walker {
    pub fn new(model: Rc<std::cell::RefCell<Option<model::DefineRule>>>) -> Walker {
        let schema = Schema::default();
        let start = {
            let borrowed = model.borrow();
            let rule = borrowed.as_ref().expect("compiled schema has a resolved start pattern");
            Validator::<'static>::compile(&schema, rule.pattern())
        };
        Walker {
            schema: Rc::new(schema),
            current_step: start,
            resolver: NameResolver::new(),
            mode: Mode::Content,
            open_elements: Vec::new(),
            recovering_from_depth: None,
        }
    }

    /// All events that could occur next without producing a validation
    /// error. This is an approximation for `AttributeValue`/`Text`/
    /// `LeaveStartTag`-after-missing-attributes edge cases: it reports
    /// them as possible whenever the content model *could* reach a nullable
    /// state, without fully re-deriving every remaining attribute.
    pub fn possible(&self) -> HashSet<PossibleEvent> {
        let mut out = HashSet::new();
        match &self.mode {
            Mode::Content => {
                if self.recovering_from_depth.is_some() {
                    // Anything goes while skipping an unrecognised subtree.
                    out.insert(PossibleEvent::Text);
                    out.insert(PossibleEvent::EndTag);
                    return out;
                }
                for pat in heads(&self.schema, self.current_step) {
                    match pat {
                        Pat::Element(nc, _) => {
                            out.insert(PossibleEvent::EnterStartTag((*nc).clone()));
                        }
                        Pat::Datatype(_) | Pat::DatatypeValue(_) | Pat::DatatypeExcept(_, _) => {
                            out.insert(PossibleEvent::Text);
                        }
                        _ => {}
                    }
                }
                if self.schema.nullable(self.current_step) {
                    out.insert(PossibleEvent::Text);
                    if self.open_elements.is_empty() {
                        out.insert(PossibleEvent::LeaveContext);
                    } else {
                        out.insert(PossibleEvent::EndTag);
                    }
                }
            }
            Mode::OpenTag { pending_attr, working_step, .. } => {
                if pending_attr.is_some() {
                    out.insert(PossibleEvent::AttributeValue);
                } else {
                    for pat in heads(&self.schema, *working_step) {
                        if let Pat::Attribute(nc, _) = pat {
                            out.insert(PossibleEvent::AttributeName((*nc).clone()));
                        }
                    }
                    out.insert(PossibleEvent::LeaveStartTag);
                }
            }
        }
        out
    }

    /// Advance the state by one event. `Ok` results advance normally; error
    /// results still advance to a best-effort interpretation so a caller can
    /// keep validating after the first mistake.
    pub fn fire_event(&mut self, event: Event) -> Option<Vec<WalkerError>> {
        let errors = match event {
            Event::EnterContext => {
                self.resolver.enter_context();
                Vec::new()
            }
            Event::LeaveContext => match self.resolver.leave_context() {
                Ok(()) => Vec::new(),
                Err(_) => vec![WalkerError::Sequencing(
                    "leave_context called with no enclosing context".to_string(),
                )],
            },
            Event::DefinePrefix { prefix, uri } => match self.resolver.define_prefix(&prefix, uri) {
                Ok(()) => Vec::new(),
                Err(e) => vec![WalkerError::Sequencing(format!("define_prefix rejected: {:?}", e))],
            },
            Event::EnterStartTag { namespace_uri, local_name } => {
                self.enter_start_tag(namespace_uri, local_name)
            }
            Event::AttributeName { namespace_uri, local_name } => {
                self.attribute_name(namespace_uri, local_name)
            }
            Event::AttributeValue { value } => self.attribute_value(value),
            Event::LeaveStartTag => self.leave_start_tag(),
            Event::Text { value } => self.text(value),
            Event::EndTag { namespace_uri, local_name } => self.end_tag(namespace_uri, local_name),
        };
        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }

    /// Reports failure if the grammar is not in an acceptable end state:
    /// some element is still open, or the root content isn't nullable.
    pub fn end(&self) -> Option<Vec<WalkerError>> {
        if !matches!(self.mode, Mode::Content) || !self.open_elements.is_empty() {
            return Some(vec![WalkerError::Sequencing(
                "end() called with an element still open".to_string(),
            )]);
        }
        if self.schema.nullable(self.current_step) {
            None
        } else {
            let expected = element_names(heads(&self.schema, self.current_step));
            Some(vec![WalkerError::ElementName(ElementNameError::new(expected, "", ""))])
        }
    }

    fn enter_start_tag(&mut self, namespace_uri: String, local_name: String) -> Vec<WalkerError> {
        if matches!(self.mode, Mode::OpenTag { .. }) {
            return vec![WalkerError::Sequencing(
                "enter_start_tag called while a start tag is still open".to_string(),
            )];
        }
        if self.recovering_from_depth.is_some() {
            self.open_elements.push((namespace_uri.clone(), local_name.clone()));
            self.mode = Mode::OpenTag {
                namespace_uri,
                local_name,
                pending_attr: None,
                working_step: self.current_step,
            };
            return Vec::new();
        }

        let pat = self.schema.patt(self.current_step);
        let name = QualifiedName {
            namespace_uri: if namespace_uri.is_empty() { None } else { Some(StrSpan::from(namespace_uri.as_str())) },
            local_name: StrSpan::from(local_name.as_str()),
        };
        let next = Validator::start_tag_open_deriv(pat, &self.schema, name);

        if self.schema.is_not_allowed(next) {
            let expected = element_names(heads(&self.schema, self.current_step));
            self.recovering_from_depth = Some(self.open_elements.len());
            self.open_elements.push((namespace_uri.clone(), local_name.clone()));
            self.mode = Mode::OpenTag {
                namespace_uri: namespace_uri.clone(),
                local_name: local_name.clone(),
                pending_attr: None,
                working_step: self.current_step,
            };
            return vec![WalkerError::ElementName(ElementNameError::new(
                expected,
                namespace_uri,
                local_name,
            ))];
        }

        self.open_elements.push((namespace_uri.clone(), local_name.clone()));
        self.mode = Mode::OpenTag { namespace_uri, local_name, pending_attr: None, working_step: next };
        Vec::new()
    }

    fn attribute_name(&mut self, namespace_uri: String, local_name: String) -> Vec<WalkerError> {
        let pending_attr = match &mut self.mode {
            Mode::OpenTag { pending_attr, .. } => pending_attr,
            Mode::Content => {
                return vec![WalkerError::Sequencing(
                    "attribute_name fired outside an open start tag".to_string(),
                )]
            }
        };
        let mut errors = Vec::new();
        if pending_attr.is_some() {
            errors.push(WalkerError::Sequencing(
                "attribute_name fired before the previous attribute's value".to_string(),
            ));
        }
        *pending_attr = Some((namespace_uri, local_name));
        errors
    }

    fn attribute_value(&mut self, value: String) -> Vec<WalkerError> {
        let (working_step, name) = match &mut self.mode {
            Mode::OpenTag { pending_attr, working_step, .. } => match pending_attr.take() {
                Some(name) => (working_step, name),
                None => {
                    return vec![WalkerError::Sequencing(
                        "attribute_value fired with no pending attribute_name".to_string(),
                    )]
                }
            },
            Mode::Content => {
                return vec![WalkerError::Sequencing(
                    "attribute_value fired outside an open start tag".to_string(),
                )]
            }
        };
        if self.recovering_from_depth.is_some() {
            return Vec::new();
        }

        let (namespace_uri, local_name) = name;
        let att = Attr {
            name: QualifiedName {
                namespace_uri: if namespace_uri.is_empty() {
                    None
                } else {
                    Some(StrSpan::from(namespace_uri.as_str()))
                },
                local_name: StrSpan::from(local_name.as_str()),
            },
            value: StrSpan::from(value.as_str()),
            span: StrSpan::from(value.as_str()),
        };
        let mut memo = HashMap::new();
        let next = Validator::<'static>::att_deriv(&mut memo, *working_step, &self.schema, att, &self.resolver);
        if self.schema.is_not_allowed(next) {
            let matching_attr_content = heads(&self.schema, *working_step).into_iter().find_map(|p| match p {
                Pat::Attribute(ref nc, content) if contains(nc, att.name) => Some(content),
                _ => None,
            });
            if let Some(content) = matching_attr_content {
                let reasons = datatype_reasons(&self.schema, content, &value, &self.resolver);
                let reason = if reasons.is_empty() {
                    "value rejected by the attribute's datatype".to_string()
                } else {
                    reasons.join("; ")
                };
                vec![WalkerError::AttributeValue(AttributeValueError::new(
                    Some(NameClass::Named { namespace_uri, name: local_name }),
                    value,
                    reason,
                ))]
            } else {
                let expected = attribute_names(heads(&self.schema, *working_step));
                vec![WalkerError::AttributeName(AttributeNameError::new(expected, namespace_uri, local_name))]
            }
        } else {
            *working_step = next;
            Vec::new()
        }
    }

    fn leave_start_tag(&mut self) -> Vec<WalkerError> {
        let (namespace_uri, local_name, pending_attr, working_step) = match std::mem::replace(&mut self.mode, Mode::Content) {
            Mode::OpenTag { namespace_uri, local_name, pending_attr, working_step } => {
                (namespace_uri, local_name, pending_attr, working_step)
            }
            Mode::Content => {
                return vec![WalkerError::Sequencing(
                    "leave_start_tag fired outside an open start tag".to_string(),
                )]
            }
        };
        let mut errors = Vec::new();
        if pending_attr.is_some() {
            errors.push(WalkerError::Sequencing(
                "leave_start_tag fired with an attribute_name pending its value".to_string(),
            ));
        }
        if self.recovering_from_depth.is_some() {
            return errors;
        }

        let closed = Validator::<'static>::start_tag_close_deriv(working_step, &self.schema);
        if self.schema.is_not_allowed(closed) {
            let expected = attribute_names(heads(&self.schema, working_step));
            errors.push(WalkerError::AttributeName(AttributeNameError::new(expected, "", "")));
            self.current_step = start_tag_close_recover(working_step, &self.schema);
        } else {
            self.current_step = closed;
        }
        let _ = (&namespace_uri, &local_name);
        errors
    }

    fn text(&mut self, value: String) -> Vec<WalkerError> {
        if matches!(self.mode, Mode::OpenTag { .. }) {
            return vec![WalkerError::Sequencing("text fired inside an open start tag".to_string())];
        }
        if self.recovering_from_depth.is_some() {
            return Vec::new();
        }
        let mut memo = HashMap::new();
        let next = Validator::<'static>::text_deriv_id(&mut memo, self.current_step, &self.schema, &value, &self.resolver);
        if self.schema.is_not_allowed(next) {
            let reasons = datatype_reasons(&self.schema, self.current_step, &value, &self.resolver);
            let reason = if reasons.is_empty() {
                "text content not permitted here".to_string()
            } else {
                reasons.join("; ")
            };
            vec![WalkerError::AttributeValue(AttributeValueError::new(None, value, reason))]
        } else {
            self.current_step = next;
            Vec::new()
        }
    }

    fn end_tag(&mut self, namespace_uri: String, local_name: String) -> Vec<WalkerError> {
        if matches!(self.mode, Mode::OpenTag { .. }) {
            return vec![WalkerError::Sequencing(
                "end_tag fired while a start tag is still open".to_string(),
            )];
        }
        let mut errors = Vec::new();
        match self.open_elements.pop() {
            Some((open_ns, open_local)) => {
                if open_ns != namespace_uri || open_local != local_name {
                    errors.push(WalkerError::Sequencing(format!(
                        "end_tag {{{}}}{} does not match the open element {{{}}}{}",
                        namespace_uri, local_name, open_ns, open_local
                    )));
                }
            }
            None => {
                errors.push(WalkerError::Sequencing(
                    "end_tag fired with no matching start tag".to_string(),
                ));
                return errors;
            }
        }

        let depth = self.open_elements.len();
        if let Some(recovering_depth) = self.recovering_from_depth {
            if recovering_depth == depth {
                self.recovering_from_depth = None;
            }
            return errors;
        }

        let mut memo = HashMap::new();
        let pre_end = Validator::<'static>::text_deriv_id(&mut memo, self.current_step, &self.schema, "", &self.resolver);
        let pat = self.schema.patt(pre_end);
        let next = Validator::<'static>::end_tag_deriv(pat, &self.schema);
        if self.schema.is_not_allowed(next) {
            let expected = element_names(heads(&self.schema, pre_end));
            errors.push(WalkerError::ElementName(ElementNameError::new(expected, namespace_uri, local_name)));
        } else {
            self.current_step = next;
        }
        errors
    }
}

fn element_names(heads: HashSet<Pat>) -> Vec<NameClass> {
    heads
        .into_iter()
        .filter_map(|p| if let Pat::Element(nc, _) = p { Some(*nc) } else { None })
        .collect()
}

fn attribute_names(heads: HashSet<Pat>) -> Vec<NameClass> {
    heads
        .into_iter()
        .filter_map(|p| if let Pat::Attribute(nc, _) = p { Some(*nc) } else { None })
        .collect()
}

/// Reimplements `Validator::heads`/`head` as free functions over a bare
/// `&Schema`, since `Walker` has no `Validator` instance to call the
/// `&self`-bound originals on -- the body only ever touches `self.schema`
/// there, so this is a direct copy rather than a behavioural change.
fn heads(schema: &Schema, id: PatId) -> HashSet<Pat> {
    let mut result = HashSet::new();
    head(schema, &mut result, id);
    result
}

/// Why a rejected value didn't match: walks the same pattern shape `head()`
/// does, collecting every facet/lexical violation any reachable datatype
/// leaf names, instead of just recording that a leaf exists. Diagnostic-only
/// -- unlike `head()` this never panics on a placeholder, since the worst a
/// wrong answer here can do is produce a less helpful error message.
fn datatype_reasons(schema: &Schema, p: PatId, value: &str, resolver: &NameResolver) -> Vec<String> {
    match schema.patt(p) {
        Pat::Choice(p1, p2, _) | Pat::Interleave(p1, p2, _) | Pat::Group(p1, p2, _) => {
            let mut out = datatype_reasons(schema, p1, value, resolver);
            out.extend(datatype_reasons(schema, p2, value, resolver));
            out
        }
        Pat::OneOrMore(p, _) | Pat::List(p) | Pat::After(p, _) => datatype_reasons(schema, p, value, resolver),
        Pat::Datatype(dt) => dt.disallows(value).into_iter().map(|e| e.0).collect(),
        Pat::DatatypeValue(dt) => dt.disallows_with_ns(value, resolver).into_iter().map(|e| e.0).collect(),
        Pat::DatatypeExcept(dt, _) => dt.disallows(value).into_iter().map(|e| e.0).collect(),
        _ => Vec::new(),
    }
}

fn head(schema: &Schema, result: &mut HashSet<Pat>, p: PatId) {
    let pat = schema.patt(p);
    match pat {
        Pat::Choice(p1, p2, _) => {
            head(schema, result, p1);
            head(schema, result, p2);
        }
        Pat::Interleave(p1, p2, _) => {
            head(schema, result, p1);
            head(schema, result, p2);
        }
        Pat::Group(p1, p2, _) => {
            if schema.patt(p1).is_nullable() {
                head(schema, result, p1);
            } else {
                head(schema, result, p1);
                head(schema, result, p2);
            }
        }
        Pat::OneOrMore(p, _) => head(schema, result, p),
        Pat::Empty | Pat::Text | Pat::NotAllowed => {}
        Pat::Attribute(_, _) => {
            result.insert(pat);
        }
        Pat::Element(_, _) => {
            result.insert(pat);
        }
        Pat::Datatype(_) => {
            result.insert(pat);
        }
        Pat::DatatypeValue(_) => {
            result.insert(pat);
        }
        Pat::DatatypeExcept(_, _) => {
            result.insert(pat);
        }
        Pat::List(p) => head(schema, result, p),
        Pat::Placeholder(_) => panic!("Unexpected placeholder pattern reached by head()"),
        Pat::After(p, _) => head(schema, result, p),
    }
}

/// Like `start_tag_close_deriv`, but treats every still-mandatory
/// `Attribute` leaf as satisfied instead of propagating `NotAllowed` --
/// the best-effort advance `leave_start_tag` commits to after it has
/// already reported the missing attribute(s).
fn start_tag_close_recover(pid: PatId, schema: &Schema) -> PatId {
    match schema.patt(pid) {
        Pat::After(p1, p2) => {
            let a1 = start_tag_close_recover(p1, schema);
            schema.after(a1, p2)
        }
        Pat::Choice(p1, p2, _) => {
            let c1 = start_tag_close_recover(p1, schema);
            let c2 = start_tag_close_recover(p2, schema);
            schema.choice(c1, c2)
        }
        Pat::Group(p1, p2, _) => {
            let c1 = start_tag_close_recover(p1, schema);
            let c2 = start_tag_close_recover(p2, schema);
            schema.group(c1, c2)
        }
        Pat::Interleave(p1, p2, _) => {
            let c1 = start_tag_close_recover(p1, schema);
            let c2 = start_tag_close_recover(p2, schema);
            schema.interleave(c1, c2)
        }
        Pat::OneOrMore(p, _) => {
            let _o = start_tag_close_recover(p, schema);
            schema.one_or_more(p)
        }
        Pat::Attribute(_, _) => schema.empty(),
        _ => pid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaxng_model::model::{DefineRule, Pattern};
    use std::cell::RefCell;

    fn dummy_span() -> codemap::Span {
        let mut map = codemap::CodeMap::new();
        let file = map.add_file("test".to_string(), "x".to_string());
        file.span
    }

    fn walker_for(pattern: Pattern) -> Walker {
        let rule = DefineRule::new("start", pattern, dummy_span());
        Walker::new(Rc::new(RefCell::new(Some(rule))))
    }

    fn elem(local: &str, inner: Pattern) -> Pattern {
        Pattern::Element(NameClass::Named { namespace_uri: String::new(), name: local.to_string() }, Box::new(inner))
    }

    #[test]
    fn empty_element_round_trips() {
        let mut w = walker_for(elem("root", Pattern::Empty));
        assert!(w.fire_event(Event::EnterStartTag { namespace_uri: String::new(), local_name: "root".into() }).is_none());
        assert!(w.fire_event(Event::LeaveStartTag).is_none());
        assert!(w.fire_event(Event::EndTag { namespace_uri: String::new(), local_name: "root".into() }).is_none());
        assert!(w.end().is_none());
    }

    #[test]
    fn unexpected_element_reports_and_recovers() {
        let mut w = walker_for(elem("root", Pattern::Empty));
        let errs = w.fire_event(Event::EnterStartTag { namespace_uri: String::new(), local_name: "bogus".into() });
        assert!(errs.is_some());
        assert!(w.fire_event(Event::LeaveStartTag).is_none());
        assert!(w.fire_event(Event::EndTag { namespace_uri: String::new(), local_name: "bogus".into() }).is_none());
        // The outer grammar never advanced, so it's still waiting for "root".
        assert!(w.end().is_some());
    }

    #[test]
    fn clone_shares_schema_but_not_position() {
        let mut w = walker_for(elem("root", Pattern::Empty));
        let clone = w.clone();
        w.fire_event(Event::EnterStartTag { namespace_uri: String::new(), local_name: "root".into() });
        assert!(clone.end().is_some());
    }

    #[test]
    fn missing_required_attribute_is_reported() {
        let pattern = elem(
            "root",
            Pattern::Attribute(
                NameClass::Named { namespace_uri: String::new(), name: "id".to_string() },
                Box::new(Pattern::Text),
            ),
        );
        let mut w = walker_for(pattern);
        w.fire_event(Event::EnterStartTag { namespace_uri: String::new(), local_name: "root".into() });
        let errs = w.fire_event(Event::LeaveStartTag);
        assert!(errs.is_some());
    }
}
