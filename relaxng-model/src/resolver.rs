//! Lexically-scoped prefix -> namespace-URI resolver.
//!
//! RELAX NG QName-valued schema content -- a `<value type="QName">` whose
//! text is itself a prefixed name, or the library/type URIs on `<data>`/
//! `<value>` -- has to be read against whatever `xmlns` bindings are in
//! scope at that point in the document, same as element and attribute
//! names. `simplify::Builder` keeps one `NameResolver` alive across the
//! whole pattern-construction walk and pushes/pops a scope each time it
//! descends into an element whose `xmlns`/`xmlns:*` bindings differ from
//! its parent's (sourced from `tree::Element::ns_bindings`, which the XML
//! parser populates from every declaration in scope at that element),
//! mirroring `relaxng-validator`'s runtime `ElementStack` but at
//! schema-compile time rather than instance-validation time.

use std::collections::HashMap;

pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE_URI: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Debug, PartialEq, Eq)]
pub enum ResolverError {
    /// `xmlns` can never be declared as a prefix itself.
    XmlnsPrefixForbidden,
    /// `xml` was rebound to something other than the fixed XML namespace URI.
    XmlPrefixMisbound(String),
    /// `leave_context` was called with no enclosing scope left to return to.
    LeavingRootContext,
}

#[derive(Clone, Debug, Default)]
struct Scope {
    bindings: HashMap<String, String>,
}

/// A stack of prefix -> namespace-URI bindings, innermost scope last.
#[derive(Clone, Debug)]
pub struct NameResolver {
    scopes: Vec<Scope>,
}

impl NameResolver {
    pub fn new() -> NameResolver {
        NameResolver { scopes: vec![Scope::default()] }
    }

    /// Bind `prefix` to `uri` in the current scope.
    pub fn define_prefix(&mut self, prefix: &str, uri: impl Into<String>) -> Result<(), ResolverError> {
        if prefix == "xmlns" {
            return Err(ResolverError::XmlnsPrefixForbidden);
        }
        let uri = uri.into();
        if prefix == "xml" && uri != XML_NAMESPACE_URI {
            return Err(ResolverError::XmlPrefixMisbound(uri));
        }
        self.scopes
            .last_mut()
            .expect("root scope always present")
            .bindings
            .insert(prefix.to_string(), uri);
        Ok(())
    }

    pub fn enter_context(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn leave_context(&mut self) -> Result<(), ResolverError> {
        if self.scopes.len() == 1 {
            return Err(ResolverError::LeavingRootContext);
        }
        self.scopes.pop();
        Ok(())
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE_URI);
        }
        if prefix == "xmlns" {
            return Some(XMLNS_NAMESPACE_URI);
        }
        self.scopes.iter().rev().find_map(|s| s.bindings.get(prefix).map(String::as_str))
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.lookup("")
    }

    /// Resolve `"prefix:local"` or `"local"` to `(namespace_uri, local)`.
    /// An unprefixed element name falls back to the default namespace; an
    /// unprefixed attribute name resolves to the empty namespace.
    pub fn resolve_name(&self, qname: &str, attribute: bool) -> Option<(String, String)> {
        match qname.split_once(':') {
            Some((prefix, local)) => self.lookup(prefix).map(|uri| (uri.to_string(), local.to_string())),
            None if attribute => Some((String::new(), qname.to_string())),
            None => Some((self.lookup("").unwrap_or("").to_string(), qname.to_string())),
        }
    }

    /// Inverse of `resolve_name`: find a prefix bound to `namespace_uri`,
    /// preferring the default prefix when it matches.
    pub fn unresolve_name(&self, namespace_uri: &str, local: &str) -> Option<String> {
        if self.lookup("") == Some(namespace_uri) {
            return Some(local.to_string());
        }
        self.prefix_from_uri(namespace_uri).map(|p| format!("{}:{}", p, local))
    }

    pub fn prefix_from_uri(&self, namespace_uri: &str) -> Option<String> {
        if self.lookup("") == Some(namespace_uri) {
            return Some(String::new());
        }
        for scope in self.scopes.iter().rev() {
            for (prefix, uri) in &scope.bindings {
                if uri == namespace_uri && prefix != "xmlns" {
                    return Some(prefix.clone());
                }
            }
        }
        if namespace_uri == XML_NAMESPACE_URI {
            return Some("xml".to_string());
        }
        None
    }

    /// A flattened `(prefix, namespace_uri)` snapshot of every binding
    /// currently in scope, innermost wins -- the shape
    /// `datatype::Compilers::datatype_value` wants for resolving
    /// QName-typed values.
    pub fn bindings(&self) -> Vec<(String, String)> {
        let mut merged = HashMap::new();
        for scope in &self.scopes {
            for (p, u) in &scope.bindings {
                merged.insert(p.clone(), u.clone());
            }
        }
        merged.into_iter().collect()
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        NameResolver::new()
    }
}

impl crate::datatype::Namespaces for NameResolver {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.lookup(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_prefixes() {
        let r = NameResolver::new();
        assert_eq!(r.resolve_name("xml:lang", true), Some((XML_NAMESPACE_URI.to_string(), "lang".to_string())));
    }

    #[test]
    fn unprefixed_element_name_uses_default_namespace() {
        let mut r = NameResolver::new();
        r.define_prefix("", "http://example.com/ns").unwrap();
        assert_eq!(
            r.resolve_name("foo", false),
            Some(("http://example.com/ns".to_string(), "foo".to_string()))
        );
    }

    #[test]
    fn unprefixed_attribute_name_has_no_namespace() {
        let r = NameResolver::new();
        assert_eq!(r.resolve_name("foo", true), Some((String::new(), "foo".to_string())));
    }

    #[test]
    fn nested_scope_shadows_and_unwinds() {
        let mut r = NameResolver::new();
        r.define_prefix("p", "outer").unwrap();
        r.enter_context();
        r.define_prefix("p", "inner").unwrap();
        assert_eq!(r.lookup("p"), Some("inner"));
        r.leave_context().unwrap();
        assert_eq!(r.lookup("p"), Some("outer"));
    }

    #[test]
    fn leaving_root_context_is_an_error() {
        let mut r = NameResolver::new();
        assert_eq!(r.leave_context(), Err(ResolverError::LeavingRootContext));
    }

    #[test]
    fn xmlns_cannot_be_redefined_as_a_prefix() {
        let mut r = NameResolver::new();
        assert_eq!(
            r.define_prefix("xmlns", "http://example.com"),
            Err(ResolverError::XmlnsPrefixForbidden)
        );
    }

    #[test]
    fn clone_is_independent_of_original() {
        let mut r = NameResolver::new();
        r.define_prefix("p", "original").unwrap();
        let mut cloned = r.clone();
        cloned.define_prefix("p", "changed").unwrap();
        assert_eq!(r.lookup("p"), Some("original"));
        assert_eq!(cloned.lookup("p"), Some("changed"));
    }

    #[test]
    fn default_prefix_wins_unresolve_over_others() {
        let mut r = NameResolver::new();
        r.define_prefix("", "http://example.com/ns").unwrap();
        r.define_prefix("ex", "http://example.com/ns").unwrap();
        assert_eq!(r.unresolve_name("http://example.com/ns", "foo"), Some("foo".to_string()));
    }
}
