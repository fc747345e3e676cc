//! Validator-facing error types for `Walker` (the explicit event-driven
//! API in `walker.rs`). These distinguish *what kind of mismatch*
//! occurred -- an unexpected element name, an unexpected attribute name,
//! an attribute value that failed its datatype, or several candidate
//! branches of a `choice` all rejecting the same input -- so a caller can
//! build a targeted diagnostic ("expected one of: title, subtitle") rather
//! than a single opaque "not allowed" message. `ValidatorError` (the
//! token-driven `Validator`'s error type) stays a flat enum over raw XML
//! tokens; these are the richer counterpart the explicit `Walker` returns.

use relaxng_model::model::NameClass;
use std::fmt;

/// One of the four outcomes a failed validation event can produce.
#[derive(Debug, Clone)]
pub enum WalkerError {
    ElementName(ElementNameError),
    AttributeName(AttributeNameError),
    AttributeValue(AttributeValueError),
    Choice(ChoiceError),
    /// A client-use error: events fired out of
    /// sequence -- `attribute_value` with no pending `attribute_name`,
    /// `end_tag` with no matching `enter_start_tag`, `leave_context` on
    /// the root context, and so on.
    Sequencing(String),
}

impl fmt::Display for WalkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkerError::ElementName(e) => e.fmt(f),
            WalkerError::AttributeName(e) => e.fmt(f),
            WalkerError::AttributeValue(e) => e.fmt(f),
            WalkerError::Choice(e) => e.fmt(f),
            WalkerError::Sequencing(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for WalkerError {}

/// An element name the schema would not have accepted at this position.
#[derive(Debug, Clone)]
pub struct ElementNameError {
    expected: Vec<NameClass>,
    found_namespace_uri: String,
    found_local_name: String,
}

impl ElementNameError {
    pub fn new(
        expected: Vec<NameClass>,
        found_namespace_uri: impl Into<String>,
        found_local_name: impl Into<String>,
    ) -> ElementNameError {
        ElementNameError {
            expected,
            found_namespace_uri: found_namespace_uri.into(),
            found_local_name: found_local_name.into(),
        }
    }

    /// The name-classes that *would* have been accepted here.
    pub fn names(&self) -> &[NameClass] {
        &self.expected
    }
}

impl fmt::Display for ElementNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected element {{{}}}{}",
            self.found_namespace_uri, self.found_local_name
        )?;
        if !self.expected.is_empty() {
            write!(f, "; expected one of: ")?;
            describe_name_classes(&self.expected, f)?;
        }
        Ok(())
    }
}

/// An attribute name the schema would not have accepted inside the
/// currently open start tag.
#[derive(Debug, Clone)]
pub struct AttributeNameError {
    expected: Vec<NameClass>,
    found_namespace_uri: String,
    found_local_name: String,
}

impl AttributeNameError {
    pub fn new(
        expected: Vec<NameClass>,
        found_namespace_uri: impl Into<String>,
        found_local_name: impl Into<String>,
    ) -> AttributeNameError {
        AttributeNameError {
            expected,
            found_namespace_uri: found_namespace_uri.into(),
            found_local_name: found_local_name.into(),
        }
    }

    pub fn names(&self) -> &[NameClass] {
        &self.expected
    }
}

impl fmt::Display for AttributeNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected attribute {{{}}}{}",
            self.found_namespace_uri, self.found_local_name
        )?;
        if !self.expected.is_empty() {
            write!(f, "; expected one of: ")?;
            describe_name_classes(&self.expected, f)?;
        }
        Ok(())
    }
}

/// An attribute or element's text value was rejected by its datatype.
#[derive(Debug, Clone)]
pub struct AttributeValueError {
    name: Option<NameClass>,
    value: String,
    reason: String,
}

impl AttributeValueError {
    pub fn new(name: Option<NameClass>, value: impl Into<String>, reason: impl Into<String>) -> AttributeValueError {
        AttributeValueError { name, value: value.into(), reason: reason.into() }
    }

    pub fn names(&self) -> &[NameClass] {
        self.name.as_ref().map(std::slice::from_ref).unwrap_or(&[])
    }
}

impl fmt::Display for AttributeValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value {:?} rejected: {}", self.value, self.reason)
    }
}

/// Several candidate branches of a `choice` all rejected the same input;
/// aggregates the per-branch errors so a caller can inspect why each one
/// failed rather than just seeing "no branch matched".
#[derive(Debug, Clone)]
pub struct ChoiceError {
    branches: Vec<WalkerError>,
}

impl ChoiceError {
    pub fn new(branches: Vec<WalkerError>) -> ChoiceError {
        ChoiceError { branches }
    }

    pub fn branches(&self) -> &[WalkerError] {
        &self.branches
    }

    /// The union of every branch's expected names, for callers that just
    /// want "what would have worked" without caring which branch.
    pub fn names(&self) -> Vec<NameClass> {
        self.branches
            .iter()
            .flat_map(|b| match b {
                WalkerError::ElementName(e) => e.names().to_vec(),
                WalkerError::AttributeName(e) => e.names().to_vec(),
                WalkerError::AttributeValue(e) => e.names().to_vec(),
                WalkerError::Choice(e) => e.names(),
                WalkerError::Sequencing(_) => vec![],
            })
            .collect()
    }
}

impl fmt::Display for ChoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "none of {} alternatives matched:", self.branches.len())?;
        for b in &self.branches {
            write!(f, "\n  - {}", b)?;
        }
        Ok(())
    }
}

fn describe_name_classes(names: &[NameClass], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    const MAX: usize = 6;
    for (i, nc) in names.iter().take(MAX).enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        describe_name_class(nc, f)?;
    }
    if names.len() > MAX {
        write!(f, ", .. or {} more", names.len() - MAX)?;
    }
    Ok(())
}

fn describe_name_class(nc: &NameClass, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match nc {
        NameClass::Named { namespace_uri, name } => write!(f, "{{{}}}{}", namespace_uri, name),
        NameClass::NsName { namespace_uri, .. } => write!(f, "{{{}}}*", namespace_uri),
        NameClass::AnyName { .. } => write!(f, "*"),
        NameClass::Alt { a, b } => {
            describe_name_class(a, f)?;
            write!(f, " | ")?;
            describe_name_class(b, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(local: &str) -> NameClass {
        NameClass::Named { namespace_uri: String::new(), name: local.to_string() }
    }

    #[test]
    fn element_name_error_lists_candidates() {
        let err = ElementNameError::new(vec![named("title"), named("subtitle")], "", "bogus");
        let msg = err.to_string();
        assert!(msg.contains("bogus"));
        assert!(msg.contains("title"));
        assert!(msg.contains("subtitle"));
    }

    #[test]
    fn choice_error_aggregates_branch_names() {
        let a = WalkerError::ElementName(ElementNameError::new(vec![named("a")], "", "x"));
        let b = WalkerError::AttributeName(AttributeNameError::new(vec![named("b")], "", "y"));
        let choice = ChoiceError::new(vec![a, b]);
        let names: Vec<String> = choice
            .names()
            .iter()
            .map(|nc| match nc {
                NameClass::Named { name, .. } => name.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
