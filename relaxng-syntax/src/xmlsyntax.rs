//! Parses RELAX NG XML syntax source text into a [`crate::tree::Schema`].
//!
//! Delegates actual XML well-formedness/namespace resolution to
//! `roxmltree`, then walks its read-only DOM once to build our mutable
//! `indextree` arena, resolving the handful of RELAX NG-specific inherited
//! attributes (`ns`, `datatypeLibrary`, `xml:base`) along the way.
//! Everything downstream (`relaxng-model`'s
//! simplifier) only ever sees the arena, never `roxmltree`'s tree.

use crate::tree::{Attr, Element, Node, Schema};
use crate::uri;
use codemap::{CodeMap, Span};
use indextree::Arena;
use std::fmt;
use std::sync::Arc;
use url::Url;

pub const RELAXNG_NS: &str = "http://relaxng.org/ns/structure/1.0";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Parse `source` (the text of `file_name`) into a `Schema`. `base_uri` is
/// the URI `include`/`externalRef` hrefs within this document resolve
/// relative to; it is usually `file_name`'s own location. Returns the
/// `codemap::File` the text was registered under, so callers can build a
/// `relaxng_model::Context` against the same spans without re-adding it.
pub fn parse(
    codemap: &mut CodeMap,
    file_name: &str,
    base_uri: Url,
    source: String,
) -> Result<(Schema, Arc<codemap::File>), SyntaxError> {
    let file = codemap.add_file(file_name.to_string(), source);
    let text = file.source().to_string();
    let doc = roxmltree::Document::parse(&text).map_err(|e| SyntaxError {
        message: format!("XML parse error: {}", e),
        span: file.span,
    })?;

    let root_el = doc.root_element();
    if root_el.tag_name().namespace() != Some(RELAXNG_NS) {
        return Err(SyntaxError {
            message: format!(
                "document element is not in the RELAX NG namespace ({})",
                RELAXNG_NS
            ),
            span: span_of(&file, root_el.range()),
        });
    }

    let mut arena = Arena::new();
    let root = build(
        &mut arena,
        &file,
        root_el,
        "",
        "",
        base_uri,
    )
    .map_err(|(msg, range)| SyntaxError {
        message: msg,
        span: span_of(&file, range),
    })?;

    Ok((Schema::new(arena, root), file))
}

fn span_of(file: &codemap::File, range: std::ops::Range<usize>) -> Span {
    file.span.subspan(range.start as u64, range.end as u64)
}

/// Recursively convert one `roxmltree::Node` (and its element children)
/// into our arena, threading the inherited `ns`/`datatypeLibrary`/base-URI
/// context downward.
fn build(
    arena: &mut Arena<Node>,
    file: &codemap::File,
    node: roxmltree::Node,
    inherited_ns: &str,
    inherited_dtlib: &str,
    inherited_base: Url,
) -> Result<crate::tree::ElementId, (String, std::ops::Range<usize>)> {
    if node.tag_name().namespace() != Some(RELAXNG_NS) {
        return Err((
            format!(
                "element <{}> is not in the RELAX NG namespace",
                node.tag_name().name()
            ),
            node.range(),
        ));
    }

    let mut effective_ns = inherited_ns.to_string();
    let mut effective_dtlib = inherited_dtlib.to_string();
    let mut base = inherited_base;

    // `ns` and `datatypeLibrary` are inherited down the tree, overridden by
    // a nearer declaration; this has to be resolved before recursing into
    // children so e.g. a `name` element's text inherits the right `ns`.
    if let Some(v) = node.attribute("ns") {
        effective_ns = v.to_string();
    }
    if let Some(v) = node.attribute("datatypeLibrary") {
        effective_dtlib = v.to_string();
    }
    if let Some(v) = node.attribute((XML_NS, "base")) {
        base = uri::resolve(&base, v).map_err(|e| (e, node.range()))?;
    }

    let mut attrs = Vec::new();
    for a in node.attributes() {
        if a.namespace() == Some(XML_NS) && a.name() == "base" {
            continue;
        }
        attrs.push(Attr {
            namespace_uri: a.namespace().unwrap_or("").to_string(),
            local_name: a.name().to_string(),
            value: a.value().to_string(),
            span: span_of(file, a.range()),
        });
    }

    // `node.namespaces()` already gives every `xmlns`/`xmlns:*` declaration
    // in scope at this node (roxmltree resolves inheritance from ancestors
    // itself), so there's no need to thread a separate accumulator down
    // alongside `effective_ns`/`effective_dtlib`.
    let ns_bindings: Vec<(String, String)> = node
        .namespaces()
        .map(|ns| (ns.name().unwrap_or("").to_string(), ns.uri().to_string()))
        .collect();

    let element = Element {
        local_name: node.tag_name().name().to_string(),
        attrs,
        effective_ns: effective_ns.clone(),
        effective_datatype_library: effective_dtlib.clone(),
        base_uri: Some(base.to_string()),
        span: span_of(file, node.range()),
        ns_bindings,
    };
    let id = arena.new_node(Node::Element(element));

    // `value`/`param`/`name` are the only elements whose text content is
    // semantically significant; everything else's text is formatting
    // whitespace the simplifier should never see.
    let keep_text = matches!(node.tag_name().name(), "value" | "param" | "name");

    for child in node.children() {
        if child.is_element() {
            let child_id = build(
                arena,
                file,
                child,
                &effective_ns,
                &effective_dtlib,
                base.clone(),
            )?;
            id.append(child_id, arena);
        } else if child.is_text() && keep_text {
            if let Some(t) = child.text() {
                let text_id = arena.new_node(Node::Text(t.to_string()));
                id.append(text_id, arena);
            }
        }
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(src: &str) -> Result<Schema, SyntaxError> {
        let mut codemap = CodeMap::new();
        let base = Url::parse("file:///test.rng").unwrap();
        parse(&mut codemap, "test.rng", base, src.to_string()).map(|(schema, _file)| schema)
    }

    #[test]
    fn parses_minimal_element() {
        let schema = parse_str(
            r#"<element name="foo" xmlns="http://relaxng.org/ns/structure/1.0">
                 <text/>
               </element>"#,
        )
        .unwrap();
        let root = schema.element(schema.root);
        assert_eq!(root.local_name, "element");
        let children = schema.element_children(schema.root);
        assert_eq!(children.len(), 1);
        assert_eq!(schema.element(children[0]).local_name, "text");
    }

    #[test]
    fn inherits_datatype_library() {
        let schema = parse_str(
            r#"<element name="foo"
                        datatypeLibrary="http://www.w3.org/2001/XMLSchema-datatypes"
                        xmlns="http://relaxng.org/ns/structure/1.0">
                 <data type="int"/>
               </element>"#,
        )
        .unwrap();
        let children = schema.element_children(schema.root);
        let data = schema.element(children[0]);
        assert_eq!(
            data.effective_datatype_library,
            "http://www.w3.org/2001/XMLSchema-datatypes"
        );
    }

    #[test]
    fn keeps_name_text() {
        let schema = parse_str(
            r#"<element xmlns="http://relaxng.org/ns/structure/1.0">
                 <name>foo</name>
                 <text/>
               </element>"#,
        )
        .unwrap();
        let children = schema.element_children(schema.root);
        let name_el = children[0];
        assert_eq!(schema.text_content(name_el), "foo");
    }

    #[test]
    fn rejects_foreign_namespace() {
        let err = parse_str(r#"<element xmlns="http://example.com/other"/>"#).unwrap_err();
        assert!(err.message.contains("RELAX NG namespace"));
    }
}
