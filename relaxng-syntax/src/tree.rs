//! The XML tree model the simplification pipeline mutates in place.
//!
//! Built on [`indextree`] rather than `Rc<RefCell<...>>` child lists: the
//! simplifier rewrites the tree structurally at every pass (splicing in
//! `include`d subtrees, flattening nested `choice`/`group`, promoting
//! `define`s to the outermost `grammar`) and indextree gives us O(1)
//! detach/reattach plus parent pointers that stay correct automatically
//! after any structural change.

use indextree::{Arena, NodeId};

pub type ElementId = NodeId;

/// One XML attribute as it appeared on an element, after its name has been
/// resolved against the active namespace bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attr {
    pub namespace_uri: String,
    pub local_name: String,
    pub value: String,
    pub span: codemap::Span,
}

/// One node of the schema tree: either an element (the overwhelming
/// majority of RELAX NG schema content) or a text node. Text nodes are
/// only preserved where semantically meaningful
/// (`value`, `param`, `name`); the XML-syntax parser in `xmlsyntax.rs`
/// drops insignificant whitespace-only text elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }
}

/// A RELAX NG XML syntax element (`element`, `attribute`, `define`, `ref`,
/// `grammar`, ...). `local_name` is the element's local name; elements
/// outside the RELAX NG namespace never survive parsing (the parser
/// rejects them, enforcing that every element belongs to the RELAX NG
/// namespace).
///
/// `effective_ns` and `effective_datatype_library` are resolved once, at
/// parse time, from the innermost ancestor carrying `ns`/`datatypeLibrary`
/// -- the simplifier never needs to re-walk ancestors
/// to answer "what's my namespace".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub local_name: String,
    pub attrs: Vec<Attr>,
    pub effective_ns: String,
    pub effective_datatype_library: String,
    pub base_uri: Option<String>,
    pub span: codemap::Span,
    /// Every `xmlns`/`xmlns:*` binding in scope at this element, as
    /// `(prefix, uri)` pairs with `""` standing for the default namespace.
    /// Independent of `effective_ns` (RELAX NG's own `ns` attribute, which
    /// only controls the namespace of names this element *creates*): this
    /// is the prefix table a `<value type="QName">`'s text resolves
    /// against.
    pub ns_bindings: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.local_name == local_name && a.namespace_uri.is_empty())
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, local_name: &str, value: impl Into<String>, span: codemap::Span) {
        if let Some(a) = self
            .attrs
            .iter_mut()
            .find(|a| a.local_name == local_name && a.namespace_uri.is_empty())
        {
            a.value = value.into();
        } else {
            self.attrs.push(Attr {
                namespace_uri: String::new(),
                local_name: local_name.to_string(),
                value: value.into(),
                span,
            });
        }
    }

    pub fn remove_attr(&mut self, local_name: &str) {
        self.attrs
            .retain(|a| !(a.local_name == local_name && a.namespace_uri.is_empty()));
    }
}

/// An arena-backed schema document, mutated in place by the simplification
/// pipeline. One `Schema` corresponds to one compilation: inclusions are
/// spliced into the same arena rather than kept as separate trees.
pub struct Schema {
    pub arena: Arena<Node>,
    pub root: ElementId,
}

impl Schema {
    pub fn new(arena: Arena<Node>, root: ElementId) -> Schema {
        Schema { arena, root }
    }

    pub fn element(&self, id: ElementId) -> &Element {
        self.arena[id]
            .get()
            .as_element()
            .expect("node id does not refer to an element")
    }

    pub fn element_mut(&mut self, id: ElementId) -> &mut Element {
        self.arena[id]
            .get_mut()
            .as_element_mut()
            .expect("node id does not refer to an element")
    }

    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        id.children(&self.arena).collect()
    }

    /// Children that are elements, in document order, skipping text nodes.
    pub fn element_children(&self, id: ElementId) -> Vec<ElementId> {
        id.children(&self.arena)
            .filter(|c| self.arena[*c].get().as_element().is_some())
            .collect()
    }

    /// Children whose local name matches, in document order.
    pub fn children_named(&self, id: ElementId, local_name: &str) -> Vec<ElementId> {
        self.element_children(id)
            .into_iter()
            .filter(|c| self.element(*c).local_name == local_name)
            .collect()
    }

    pub fn text_content(&self, id: ElementId) -> String {
        id.children(&self.arena)
            .filter_map(|c| self.arena[c].get().as_text())
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.arena[id].parent()
    }

    /// Replace `old` with `new` in the tree, preserving `old`'s position
    /// among its siblings. `old` is detached (but not removed from the
    /// arena, so existing `ElementId`s referencing it remain valid
    /// pointers to an now-orphaned node -- the simplifier never revisits
    /// a node after replacing it).
    pub fn replace(&mut self, old: ElementId, new: ElementId) {
        if let Some(next) = self.arena[old].next_sibling() {
            new.detach(&mut self.arena);
            next.insert_before(new, &mut self.arena);
        } else if let Some(parent) = self.arena[old].parent() {
            new.detach(&mut self.arena);
            parent.append(new, &mut self.arena);
        }
        old.detach(&mut self.arena);
    }

    /// Replace `old` with a freshly created node, returning its id.
    pub fn replace_with_node(&mut self, old: ElementId, node: Node) -> ElementId {
        let new = self.arena.new_node(node);
        self.replace(old, new);
        new
    }

    pub fn append_child(&mut self, parent: ElementId, node: Node) -> ElementId {
        let id = self.arena.new_node(node);
        parent.append(id, &mut self.arena);
        id
    }

    /// Detach every child of `id` and append the children of `from`
    /// (in order) in their place. Used when inlining `include`d content
    /// and when promoting an inner `grammar`'s `start` content upward.
    pub fn splice_children_from(&mut self, id: ElementId, from: ElementId) {
        let olds = self.children(id);
        for o in olds {
            o.detach(&mut self.arena);
        }
        let news = self.children(from);
        for n in news {
            n.detach(&mut self.arena);
            id.append(n, &mut self.arena);
        }
    }
}
