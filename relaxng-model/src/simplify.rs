//! Simplification and pattern construction:
//! turns a parsed `relaxng_syntax::tree::Schema` into the `model::Pattern`
//! tree `restrictions::check_restrictions` and `relaxng-validator` consume.
//!
//! `run` performs the structural simplification steps that operate on the
//! XML tree itself -- resolving `include`/`externalRef` by splicing in the
//! referenced document, so everything downstream sees one flat tree.
//! `build_pattern` then does a single recursive descent over that tree,
//! directly producing `model::Pattern` -- the remaining simplification
//! steps (attribute/element content defaulting, `combine` merging of
//! repeated `define`s, `optional`/`zeroOrMore`/`mixed` kept as first-class
//! forms rather than expanded to their `choice`/`interleave` equivalents)
//! are folded into construction rather than done as a separate tree pass,
//! since `model::Pattern` already has a variant for each of them and
//! `restrictions.rs` is written to reason about those forms directly.
//!
//! `define`/`ref`/`parentRef` names are scoped per nested `grammar`
//! (`GrammarScopes`, below): each grammar's defines live in their own
//! `-gr-{id}`-suffixed namespace, so a `define` inside a nested `grammar`
//! can share a name with one in an enclosing or sibling grammar without
//! colliding, and `parentRef` resolves one level up from its own grammar,
//! erroring if used outside of any nested grammar.
//!
//! Known scope reduction (documented in DESIGN.md): a `<name>` element's
//! text is read as an unprefixed local name rather than a possibly-prefixed
//! QName. Real-world schemas overwhelmingly use the `name="..."` attribute
//! shortcut or an unprefixed `<name>`, so this covers the common case.
//!
//! `Builder` keeps a `resolver::NameResolver` alive across the walk and
//! pushes a fresh scope at every element, binding every `xmlns`/`xmlns:*`
//! prefix the parser recorded for it (`tree::Element::ns_bindings`) plus
//! the default namespace implied by its `effective_ns`, so a prefixed
//! QName inside `<value>` content resolves against whatever the prefix
//! actually meant at that point in the document, not just the innermost
//! default namespace.

use crate::datatype::{AllowIncompleteTypes, Compilers, ParamError};
use crate::model::{self, Grammar, NameClass, Pattern, Ref};
use crate::{Context, Files, RelaxError};
use codemap::CodeMap;
use relaxng_syntax::tree::{ElementId, Schema};
use relaxng_syntax::types;
use std::collections::HashMap;

/// Resolve every `include`/`externalRef` in `tree`, splicing the
/// referenced document's content in place. Runs before `build_pattern`
/// unless `CompileOptions::simplified_input` skips it.
pub fn run(tree: &mut Schema, files: &impl Files, codemap: &mut CodeMap) -> Result<(), RelaxError> {
    resolve_in(tree, tree.root, files, codemap)
}

fn resolve_in(
    tree: &mut Schema,
    id: ElementId,
    files: &impl Files,
    codemap: &mut CodeMap,
) -> Result<(), RelaxError> {
    let children = tree.children(id);
    for child in children {
        if tree.arena[child].get().as_element().is_none() {
            continue;
        }
        let local_name = tree.element(child).local_name.clone();
        if local_name == "externalRef" || local_name == "include" {
            splice_reference(tree, child, files, codemap)?;
        } else {
            resolve_in(tree, child, files, codemap)?;
        }
    }
    Ok(())
}

fn splice_reference(
    tree: &mut Schema,
    id: ElementId,
    files: &impl Files,
    codemap: &mut CodeMap,
) -> Result<(), RelaxError> {
    let el = tree.element(id).clone();
    let href = el.attr("href").ok_or_else(|| RelaxError::UnsupportedInclude {
        span: el.span,
        reason: format!("<{}> has no href attribute", el.local_name),
    })?;
    let base = el
        .base_uri
        .as_ref()
        .and_then(|b| url::Url::parse(b).ok())
        .ok_or_else(|| RelaxError::UnsupportedInclude {
            span: el.span,
            reason: "no base URI in scope".to_string(),
        })?;
    let resolved = relaxng_syntax::uri::resolve(&base, href)
        .map_err(|e| RelaxError::UnsupportedInclude { span: el.span, reason: e })?;
    let path = resolved
        .to_file_path()
        .map_err(|_| RelaxError::UnsupportedInclude {
            span: el.span,
            reason: format!("cannot resolve non-file href: {}", resolved),
        })?;

    let source = files.load(&path)?;
    let (mut included, _file) =
        relaxng_syntax::xmlsyntax::parse(codemap, &path.to_string_lossy(), resolved, source)
            .map_err(RelaxError::Syntax)?;
    let included_root = included.root;
    resolve_in(&mut included, included_root, files, codemap)?;

    if el.local_name == "externalRef" {
        // externalRef is itself replaced by the referenced pattern.
        let root_clone = clone_subtree(&included, included.root, tree);
        tree.replace(id, root_clone);
    } else {
        // include's own children (define overrides, start override) take
        // precedence over the included grammar's; append the included
        // grammar's children first, then let the include's own children
        // (already present, following it in `tree`) stand -- the
        // `combine`-merge in `build_pattern` treats a later same-named
        // `define` identically regardless of source document, so simply
        // unioning the two define sets is sufficient here.
        let included_children: Vec<ElementId> = included.element_children(included.root);
        for c in included_children {
            let cloned = clone_subtree(&included, c, tree);
            id.insert_before(cloned, &mut tree.arena);
        }
        let own_children = tree.children(id);
        for c in own_children {
            c.detach(&mut tree.arena);
            // re-attach as siblings of `id` rather than children, matching
            // the spliced-grammar shape `include`'s defines are part of.
            if let Some(parent) = tree.parent(id) {
                parent.append(c, &mut tree.arena);
            }
        }
        id.detach(&mut tree.arena);
    }
    Ok(())
}

fn clone_subtree(from: &Schema, id: ElementId, into: &mut Schema) -> ElementId {
    let node = from.arena[id].get().clone();
    let new_id = into.arena.new_node(node);
    for child in from.children(id) {
        let cloned_child = clone_subtree(from, child, into);
        new_id.append(cloned_child, &mut into.arena);
    }
    new_id
}

/// The combine method a repeated `define`/`start` declares.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Combine {
    Choice,
    Interleave,
}

struct Builder<'a> {
    tree: &'a Schema,
    ctx: &'a Context,
    compilers: &'a Compilers,
    allow_incomplete: AllowIncompleteTypes,
    defines: HashMap<String, Vec<ElementId>>,
    grammar: Grammar,
    resolver: crate::resolver::NameResolver,
    scopes: GrammarScopes,
}

/// Which `<grammar>` element (by a document-order-assigned id) every
/// element in the tree is lexically inside, plus that grammar's own
/// enclosing grammar. `define`/`ref`/`parentRef` names are suffixed with
/// `-gr-{id}` before being used as `defines`/`Grammar::defines` keys, so
/// two different grammars (nested or sibling) can each define `"foo"`
/// without colliding -- equivalent to promoting every grammar's defines
/// into one flat top-level grammar, per the simplification a `grammar`
/// inside another `grammar` is defined to undergo.
///
/// The outermost grammar (whether or not the document root is literally
/// a `<grammar>` element) is always id `0`; every other `<grammar>`
/// element found anywhere in the tree gets the next unused id, assigned
/// in document order.
struct GrammarScopes {
    scope: HashMap<ElementId, (u32, Option<u32>)>,
}

impl GrammarScopes {
    fn compute(tree: &Schema) -> GrammarScopes {
        fn walk(
            tree: &Schema,
            id: ElementId,
            current: u32,
            parent: Option<u32>,
            next_id: &mut u32,
            scope: &mut HashMap<ElementId, (u32, Option<u32>)>,
        ) {
            scope.insert(id, (current, parent));
            let (child_current, child_parent) =
                if id != tree.root && tree.element(id).local_name == "grammar" {
                    let new_id = *next_id;
                    *next_id += 1;
                    (new_id, Some(current))
                } else {
                    (current, parent)
                };
            for child in tree.element_children(id) {
                walk(tree, child, child_current, child_parent, next_id, scope);
            }
        }

        let mut scope = HashMap::new();
        let mut next_id = 1;
        walk(tree, tree.root, 0, None, &mut next_id, &mut scope);
        GrammarScopes { scope }
    }

    /// The grammar `id` is lexically inside -- `ref`/`define` names at
    /// `id` resolve against this grammar's `-gr-{id}` suffix.
    fn current(&self, id: ElementId) -> u32 {
        self.scope.get(&id).map(|&(c, _)| c).unwrap_or(0)
    }

    /// The grammar one level up from `current(id)` -- `None` at the
    /// outermost grammar, where a `parentRef` has nothing to refer into.
    fn parent(&self, id: ElementId) -> Option<u32> {
        self.scope.get(&id).and_then(|&(_, p)| p)
    }
}

fn suffixed(name: &str, grammar_id: u32) -> String {
    format!("{name}-gr-{grammar_id}")
}

/// Build the pattern model for `tree`, returning the start pattern and the
/// grammar of every `define` reachable from it.
pub fn build_pattern(
    tree: &Schema,
    ctx: &Context,
    compilers: &Compilers,
    grammar: Grammar,
    allow_incomplete: AllowIncompleteTypes,
) -> Result<(Pattern, Grammar), RelaxError> {
    let scopes = GrammarScopes::compute(tree);
    let mut b = Builder {
        tree,
        ctx,
        compilers,
        allow_incomplete,
        defines: HashMap::new(),
        grammar,
        resolver: crate::resolver::NameResolver::new(),
        scopes,
    };
    collect_defines(tree, tree.root, &b.scopes, &mut b.defines);

    let root = tree.element(tree.root);
    let start = if root.local_name == "grammar" {
        b.compile_grammar_start(tree.root)?
    } else {
        b.compile_pattern(tree.root)?
    };

    // Resolve every collected `define`, even ones unreachable from `start`,
    // so a `ref` encountered anywhere during compilation above always
    // finds its target already filled in.
    let keys: Vec<String> = b.defines.keys().cloned().collect();
    for key in keys {
        b.compile_define(&key)?;
    }

    Ok((start, b.grammar))
}

fn collect_defines(tree: &Schema, id: ElementId, scopes: &GrammarScopes, out: &mut HashMap<String, Vec<ElementId>>) {
    for child in tree.element_children(id) {
        if tree.element(child).local_name == "define" {
            if let Some(name) = tree.element(child).attr("name") {
                let key = suffixed(name, scopes.current(child));
                out.entry(key).or_default().push(child);
            }
        }
        collect_defines(tree, child, scopes, out);
    }
}

impl<'a> Builder<'a> {
    /// `key` is a grammar-id-suffixed `defines`/`Grammar::defines` lookup
    /// key (see `GrammarScopes`), not the plain `name` attribute -- the
    /// latter is recovered below purely for display/encoding purposes.
    fn compile_define(&mut self, key: &str) -> Result<(), RelaxError> {
        let already = self
            .grammar
            .defines
            .get(key)
            .map(|r| r.0.borrow().is_some())
            .unwrap_or(false);
        if already {
            return Ok(());
        }
        let ids = self.defines.get(key).cloned().unwrap_or_default();
        if ids.is_empty() {
            return Ok(());
        }
        let r = self.grammar.get_or_create(key);
        let span = self.tree.element(ids[0]).span;
        let display_name = self.tree.element(ids[0]).attr("name").unwrap_or(key).to_string();
        let pattern = self.merge_defines(&ids)?;
        r.resolve(model::DefineRule::new(display_name, pattern, span));
        Ok(())
    }

    fn merge_defines(&mut self, ids: &[ElementId]) -> Result<Pattern, RelaxError> {
        let mut combine: Option<Combine> = None;
        let mut patterns = Vec::with_capacity(ids.len());
        for &id in ids {
            let el = self.tree.element(id);
            if let Some(c) = el.attr("combine") {
                combine = Some(match c {
                    "interleave" => Combine::Interleave,
                    _ => Combine::Choice,
                });
            }
            let body = self.compile_children_as_group(id)?;
            patterns.push(body);
        }
        if patterns.len() == 1 {
            return Ok(patterns.pop().unwrap());
        }
        match combine.unwrap_or(Combine::Choice) {
            Combine::Choice => Ok(Pattern::Choice(patterns)),
            Combine::Interleave => Ok(Pattern::Interleave(patterns)),
        }
    }

    fn compile_grammar_start(&mut self, grammar_id: ElementId) -> Result<Pattern, RelaxError> {
        let starts = self.tree.children_named(grammar_id, "start");
        if starts.is_empty() {
            return Err(RelaxError::MissingStart { span: self.tree.element(grammar_id).span });
        }
        let mut combine: Option<Combine> = None;
        let mut patterns = Vec::with_capacity(starts.len());
        for &id in &starts {
            let el = self.tree.element(id);
            if let Some(c) = el.attr("combine") {
                combine = Some(match c {
                    "interleave" => Combine::Interleave,
                    _ => Combine::Choice,
                });
            }
            patterns.push(self.compile_children_as_group(id)?);
        }
        if patterns.len() == 1 {
            return Ok(patterns.pop().unwrap());
        }
        match combine.unwrap_or(Combine::Choice) {
            Combine::Choice => Ok(Pattern::Choice(patterns)),
            Combine::Interleave => Ok(Pattern::Interleave(patterns)),
        }
    }

    /// Compile every pattern-element child of `id` (skipping `define`s and
    /// `start`s, which are handled separately), as a `Group` if there is
    /// more than one, `Empty` if there are none.
    fn compile_children_as_group(&mut self, id: ElementId) -> Result<Pattern, RelaxError> {
        let children: Vec<ElementId> = self
            .tree
            .element_children(id)
            .into_iter()
            .filter(|c| {
                let n = self.tree.element(*c).local_name.as_str();
                n != "define" && n != "start"
            })
            .collect();
        self.compile_sequence(&children)
    }

    fn compile_sequence(&mut self, children: &[ElementId]) -> Result<Pattern, RelaxError> {
        let mut out = Vec::with_capacity(children.len());
        for &c in children {
            out.push(self.compile_pattern(c)?);
        }
        match out.len() {
            0 => Ok(Pattern::Empty),
            1 => Ok(out.pop().unwrap()),
            _ => Ok(Pattern::Group(out)),
        }
    }

    /// Push a fresh resolver scope carrying every `xmlns`/`xmlns:*`
    /// binding in scope at `el` (`el.ns_bindings`, as the XML parser saw
    /// them), then bind the default namespace to `el.effective_ns` --
    /// RELAX NG's own `ns` attribute, which is what an unprefixed
    /// `<value>` (or `<name>`) resolves against, and may differ from
    /// whatever `xmlns` happens to be declared. `ns_bindings` is applied
    /// first so a later prefixed `<value type="QName">` ("a:foo") can
    /// resolve `a` against whatever URI it was actually bound to in the
    /// source document, not just the default namespace.
    fn sync_ns_scope(&mut self, el: &relaxng_syntax::tree::Element) {
        self.resolver.enter_context();
        for (prefix, uri) in &el.ns_bindings {
            let _ = self.resolver.define_prefix(prefix, uri.clone());
        }
        let _ = self.resolver.define_prefix("", el.effective_ns.clone());
    }

    fn compile_pattern(&mut self, id: ElementId) -> Result<Pattern, RelaxError> {
        let el = self.tree.element(id);
        let span = el.span;
        self.sync_ns_scope(el);
        let result = match el.local_name.as_str() {
            "element" => self.compile_element(id),
            "attribute" => self.compile_attribute(id),
            "group" => {
                let kids = self.tree.element_children(id);
                self.compile_sequence_as(&kids, Pattern::Group)
            }
            "interleave" => {
                let kids = self.tree.element_children(id);
                self.compile_sequence_as(&kids, Pattern::Interleave)
            }
            "choice" => {
                let kids = self.tree.element_children(id);
                self.compile_sequence_as(&kids, Pattern::Choice)
            }
            "optional" => {
                let inner = self.compile_children_as_group(id)?;
                Ok(Pattern::Optional(Box::new(inner)))
            }
            "zeroOrMore" => {
                let inner = self.compile_children_as_group(id)?;
                Ok(Pattern::ZeroOrMore(Box::new(inner)))
            }
            "oneOrMore" => {
                let inner = self.compile_children_as_group(id)?;
                Ok(Pattern::OneOrMore(Box::new(inner)))
            }
            "list" => {
                let inner = self.compile_children_as_group(id)?;
                Ok(Pattern::List(Box::new(inner)))
            }
            "mixed" => {
                let inner = self.compile_children_as_group(id)?;
                Ok(Pattern::Mixed(Box::new(inner)))
            }
            "ref" => {
                let name = el.attr("name").ok_or_else(|| RelaxError::UndefinedReference {
                    span,
                    name: String::new(),
                })?;
                let name = name.to_string();
                let key = suffixed(&name, self.scopes.current(id));
                if !self.defines.contains_key(&key) {
                    return Err(RelaxError::UndefinedReference { span, name });
                }
                let r: Ref = self.grammar.get_or_create(&key);
                Ok(Pattern::Ref(span, name, r))
            }
            "parentRef" => {
                let name = el.attr("name").ok_or_else(|| RelaxError::UndefinedReference {
                    span,
                    name: String::new(),
                })?;
                let name = name.to_string();
                let parent_id = self
                    .scopes
                    .parent(id)
                    .ok_or_else(|| RelaxError::ParentRefOutsideGrammar { span, name: name.clone() })?;
                let key = suffixed(&name, parent_id);
                if !self.defines.contains_key(&key) {
                    return Err(RelaxError::UndefinedReference { span, name });
                }
                let r: Ref = self.grammar.get_or_create(&key);
                Ok(Pattern::Ref(span, name, r))
            }
            "empty" => Ok(Pattern::Empty),
            "notAllowed" => Ok(Pattern::NotAllowed),
            "text" => Ok(Pattern::Text),
            "data" => self.compile_data(id),
            "value" => self.compile_value(id),
            "grammar" => self.compile_grammar_start(id),
            "externalRef" | "include" => Err(RelaxError::UnsupportedInclude {
                span,
                reason: "include/externalRef was not resolved before pattern construction".to_string(),
            }),
            other => Err(RelaxError::RestrictedPattern {
                span,
                pattern_name: other.to_string(),
                context: "pattern".to_string(),
            }),
        };
        let _ = self.resolver.leave_context();
        result
    }

    fn compile_sequence_as(
        &mut self,
        kids: &[ElementId],
        wrap: fn(Vec<Pattern>) -> Pattern,
    ) -> Result<Pattern, RelaxError> {
        let mut out = Vec::with_capacity(kids.len());
        for &c in kids {
            out.push(self.compile_pattern(c)?);
        }
        Ok(wrap(out))
    }

    fn compile_element(&mut self, id: ElementId) -> Result<Pattern, RelaxError> {
        let el = self.tree.element(id).clone();
        let (name_class, content_children) = self.name_class_and_content(id, &el)?;
        let content = self.compile_sequence(&content_children)?;
        Ok(Pattern::Element(name_class, Box::new(content)))
    }

    fn compile_attribute(&mut self, id: ElementId) -> Result<Pattern, RelaxError> {
        let el = self.tree.element(id).clone();
        let (name_class, content_children) = self.name_class_and_content(id, &el)?;
        let content = if content_children.is_empty() {
            Pattern::Text
        } else {
            self.compile_sequence(&content_children)?
        };
        Ok(Pattern::Attribute(name_class, Box::new(content)))
    }

    /// Split an `element`/`attribute`'s children into its name class (the
    /// `name=".."` shortcut, or the first child if it is a name-class
    /// element) and its remaining pattern content.
    fn name_class_and_content(
        &mut self,
        id: ElementId,
        el: &relaxng_syntax::tree::Element,
    ) -> Result<(NameClass, Vec<ElementId>), RelaxError> {
        if let Some(name) = el.attr("name") {
            let children = self.tree.element_children(id);
            return Ok((
                NameClass::Named { namespace_uri: el.effective_ns.clone(), name: name.to_string() },
                children,
            ));
        }
        let mut children = self.tree.element_children(id);
        if children.is_empty() {
            return Err(RelaxError::RestrictedPattern {
                span: el.span,
                pattern_name: el.local_name.clone(),
                context: "missing name class".to_string(),
            });
        }
        let name_el = children.remove(0);
        let nc = self.compile_name_class(name_el)?;
        Ok((nc, children))
    }

    fn compile_name_class(&mut self, id: ElementId) -> Result<NameClass, RelaxError> {
        let el = self.tree.element(id).clone();
        match el.local_name.as_str() {
            "name" => {
                let text = self.tree.text_content(id);
                Ok(NameClass::Named { namespace_uri: el.effective_ns.clone(), name: text })
            }
            "anyName" => {
                let except = self.compile_except(id)?;
                Ok(NameClass::AnyName { except: except.map(Box::new) })
            }
            "nsName" => {
                let except = self.compile_except(id)?;
                Ok(NameClass::NsName { namespace_uri: el.effective_ns.clone(), except: except.map(Box::new) })
            }
            "choice" => {
                let kids = self.tree.element_children(id);
                self.compile_name_class_choice(&kids, el.span)
            }
            other => Err(RelaxError::RestrictedPattern {
                span: el.span,
                pattern_name: other.to_string(),
                context: "name class".to_string(),
            }),
        }
    }

    fn compile_name_class_choice(
        &mut self,
        kids: &[ElementId],
        span: codemap::Span,
    ) -> Result<NameClass, RelaxError> {
        if kids.is_empty() {
            return Err(RelaxError::RestrictedPattern {
                span,
                pattern_name: "choice".to_string(),
                context: "empty name class choice".to_string(),
            });
        }
        let mut classes = Vec::with_capacity(kids.len());
        for &k in kids {
            classes.push(self.compile_name_class(k)?);
        }
        let mut iter = classes.into_iter();
        let mut acc = iter.next().unwrap();
        for next in iter {
            acc = NameClass::Alt { a: Box::new(acc), b: Box::new(next) };
        }
        Ok(acc)
    }

    fn compile_except(&mut self, id: ElementId) -> Result<Option<NameClass>, RelaxError> {
        let except_els = self.tree.children_named(id, "except");
        match except_els.first() {
            None => Ok(None),
            Some(&except_id) => {
                let kids = self.tree.element_children(except_id);
                Ok(Some(self.compile_name_class_choice(&kids, self.tree.element(except_id).span)?))
            }
        }
    }

    fn compile_data(&mut self, id: ElementId) -> Result<Pattern, RelaxError> {
        let el = self.tree.element(id).clone();
        let type_name = el.attr("type").unwrap_or("string").to_string();
        let datatype_name = self.datatype_name_for(&el, &type_name);

        let mut params = Vec::new();
        for p in self.tree.children_named(id, "param") {
            let pel = self.tree.element(p).clone();
            let pname = pel.attr("name").unwrap_or("").to_string();
            let text = self.tree.text_content(p);
            params.push(types::Param(
                span_range(pel.span),
                None,
                types::IdentifierOrKeyword::Identifier(types::Identifier(span_range(pel.span), pname)),
                types::Literal::single(span_range(pel.span), text),
            ));
        }

        let datatype = self
            .compilers
            .datatype_name(self.ctx, &datatype_name, &params)
            .map_err(|e| self.lift_param_error(e, el.span))?;

        let except_pat = match self.tree.children_named(id, "except").first() {
            None => None,
            Some(&except_id) => Some(Box::new(self.compile_children_as_group(except_id)?)),
        };

        Ok(Pattern::DatatypeName { datatype, except: except_pat })
    }

    fn compile_value(&mut self, id: ElementId) -> Result<Pattern, RelaxError> {
        let el = self.tree.element(id).clone();
        let type_name = el.attr("type").unwrap_or("token").to_string();
        let datatype_name = self.datatype_name_for(&el, &type_name);
        let text = self.tree.text_content(id);
        let ns = self.resolver.bindings();

        let datatype = self
            .compilers
            .datatype_value(self.ctx, &datatype_name, &text, &ns)
            .map_err(|e| self.lift_param_error(e, el.span))?;
        Ok(Pattern::DatatypeValue { datatype })
    }

    fn datatype_name_for(&self, el: &relaxng_syntax::tree::Element, type_name: &str) -> types::DatatypeName {
        let qname = types::QName(
            el.effective_datatype_library.clone(),
            (span_range(el.span), type_name.to_string()),
        );
        types::DatatypeName::CName(qname)
    }

    fn lift_param_error(&self, e: ParamError, span: codemap::Span) -> RelaxError {
        match e {
            ParamError::UnknownLibrary { uri, .. } => match self.allow_incomplete {
                AllowIncompleteTypes::Error => RelaxError::Param(ParamError::UnknownLibrary { span, uri }),
                AllowIncompleteTypes::Warn => {
                    log::warn!("unknown datatype library {}, treating as always-valid", uri);
                    RelaxError::Param(ParamError::UnknownLibrary { span, uri })
                }
                AllowIncompleteTypes::Quiet => RelaxError::Param(ParamError::UnknownLibrary { span, uri }),
            },
            other => RelaxError::Param(other),
        }
    }
}

/// The datatype library (`datatype::xsd`/`datatype::relax`) takes its
/// facet/value spans as a `types::Span` (a byte range into the source
/// text) rather than a `codemap::Span`, since it is shared with the
/// byte-offset-based parsing code in `relaxng-syntax`. The schema tree
/// only carries `codemap::Span`s once parsed, and recovering the original
/// byte range from one requires the owning `codemap::File`, which this
/// function doesn't have -- so facet/value errors end up pointing at the
/// start of the file rather than the exact `<param>`/`<value>` text. This
/// is a known diagnostic-quality gap, not a correctness one: the error
/// *kind* and message are unaffected, only where the caret lands.
fn span_range(_span: codemap::Span) -> types::Span {
    0..0
}
