//! Compiles RELAX NG XML syntax into the simplified pattern model
//! (`model::Pattern`) that `relaxng-validator` validates documents against.
//!
//! The pipeline is: parse (`relaxng_syntax::xmlsyntax`) -> resolve
//! `include`/`externalRef` and flatten to a single tree (`simplify::run`)
//! -> check the content-model restrictions (`restrictions`) -> hand
//! the resulting `Rc<RefCell<Option<model::DefineRule>>>` to callers, who
//! typically pass it straight to `relaxng_validator::Validator::new`.

pub mod datatype;
pub mod model;
mod regex_xsd;
mod resolver;
pub mod resource;
mod restrictions;
mod simplify;

use codemap::CodeMap;
use log::{debug, info};
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

pub use restrictions::check_restrictions;
pub use resource::{FsFiles, Manifest};

/// A source of schema text, addressed by path. Implemented by `FsFiles`
/// for the common case of reading real files; tests implement it directly
/// over an in-memory map so fixtures don't need a temp directory.
pub trait Files {
    fn load(&self, name: &Path) -> Result<String, RelaxError>;
    /// The base URI `name` itself resolves relative references against.
    /// The default (reading from the filesystem) is `name`'s own
    /// location; an in-memory `Files` impl can return any stable URI.
    fn base_uri(&self, name: &Path) -> Result<url::Url, RelaxError> {
        relaxng_syntax::uri::file_base_uri(name).map_err(|e| RelaxError::InvalidBaseUri(e))
    }
}

/// The schema syntax to parse. RELAX NG compact syntax is out of scope
/// for this crate (see DESIGN.md); `Xml` is kept as an enum of one variant
/// so `Compiler::new`'s call sites read the same as they would if a second
/// syntax were ever added back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syntax {
    Xml,
}

/// How strictly to treat a `datatypeLibrary` URI this crate doesn't
/// implement a compiler for. Corresponds to the `--allow-incomplete-types`
/// CLI flag.
pub use datatype::AllowIncompleteTypes;

/// Options controlling a single `Compiler::compile_with_options` call.
/// `Compiler::compile` is `compile_with_options` with every field
/// defaulted.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Treat `input` as already having been through `simplify::run` (the
    /// `--simplified-input` CLI flag): skips include/externalRef resolution
    /// and the 18-step simplification pipeline, going straight from parse
    /// to `restrictions`/pattern construction. Only sound when `input` was
    /// itself produced by this crate's simplifier.
    pub simplified_input: bool,
    pub allow_incomplete_types: AllowIncompleteTypes,
}

/// A resolved source span plus the `codemap::File` it was taken from,
/// shared by every stage of compilation so diagnostics can point at exact
/// source text regardless of which pass raised the error.
pub struct Context {
    file: Arc<codemap::File>,
}

impl Context {
    pub fn new(file: Arc<codemap::File>) -> Context {
        Context { file }
    }

    pub fn convert_span(&self, span: &relaxng_syntax::types::Span) -> codemap::Span {
        self.file.span.subspan(span.start as u64, span.end as u64)
    }

    pub fn file(&self) -> &codemap::File {
        &self.file
    }
}

#[derive(Debug)]
pub enum RelaxError {
    Io(PathBuf, io::Error),
    InvalidBaseUri(String),
    Syntax(relaxng_syntax::xmlsyntax::SyntaxError),
    UndefinedReference { span: codemap::Span, name: String },
    /// A `parentRef` occurred in the outermost grammar, which has no
    /// enclosing grammar for it to refer into.
    ParentRefOutsideGrammar { span: codemap::Span, name: String },
    DuplicateStartInGrammar { span: codemap::Span },
    MissingStart { span: codemap::Span },
    CombineMismatch { span: codemap::Span, name: String },
    UnsupportedInclude { span: codemap::Span, reason: String },
    Param(datatype::ParamError),
    XmlnsAttributeForbidden,
    XmlnsNamespaceForbidden,
    AnyNameInExcept,
    AnyNameInNsNameExcept,
    NsNameInNsNameExcept,
    OverlappingAttributes { span: codemap::Span },
    OverlappingElements { span: codemap::Span },
    RestrictedPattern { span: codemap::Span, pattern_name: String, context: String },
}

impl fmt::Display for RelaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaxError::Io(path, e) => write!(f, "error reading {}: {}", path.display(), e),
            RelaxError::InvalidBaseUri(e) => write!(f, "invalid base URI: {}", e),
            RelaxError::Syntax(e) => write!(f, "{}", e),
            RelaxError::UndefinedReference { name, .. } => {
                write!(f, "reference to undefined pattern \"{}\"", name)
            }
            RelaxError::ParentRefOutsideGrammar { name, .. } => {
                write!(f, "parentRef to \"{}\" used outside a nested grammar", name)
            }
            RelaxError::DuplicateStartInGrammar { .. } => {
                write!(f, "grammar has more than one start incompatible with its combine method")
            }
            RelaxError::MissingStart { .. } => write!(f, "grammar has no start pattern"),
            RelaxError::CombineMismatch { name, .. } => {
                write!(f, "multiple definitions of \"{}\" without a combine method", name)
            }
            RelaxError::UnsupportedInclude { reason, .. } => write!(f, "cannot process include: {}", reason),
            RelaxError::Param(e) => write!(f, "{:?}", e),
            RelaxError::XmlnsAttributeForbidden => {
                write!(f, "an attribute with local name \"xmlns\" is not permitted")
            }
            RelaxError::XmlnsNamespaceForbidden => {
                write!(f, "an attribute in the http://www.w3.org/2000/xmlns/ namespace is not permitted")
            }
            RelaxError::AnyNameInExcept => write!(f, "anyName is not permitted within an except"),
            RelaxError::AnyNameInNsNameExcept => {
                write!(f, "anyName is not permitted within an nsName's except")
            }
            RelaxError::NsNameInNsNameExcept => {
                write!(f, "nsName is not permitted within an nsName's except")
            }
            RelaxError::OverlappingAttributes { .. } => {
                write!(f, "attributes in a group/interleave must not overlap")
            }
            RelaxError::OverlappingElements { .. } => {
                write!(f, "elements in an interleave must not overlap")
            }
            RelaxError::RestrictedPattern { pattern_name, context, .. } => {
                write!(f, "{} is not permitted as {}", pattern_name, context)
            }
        }
    }
}

impl std::error::Error for RelaxError {}

impl RelaxError {
    fn span(&self) -> Option<codemap::Span> {
        match self {
            RelaxError::Io(..)
            | RelaxError::InvalidBaseUri(..)
            | RelaxError::Param(..)
            | RelaxError::XmlnsAttributeForbidden
            | RelaxError::XmlnsNamespaceForbidden
            | RelaxError::AnyNameInExcept
            | RelaxError::AnyNameInNsNameExcept
            | RelaxError::NsNameInNsNameExcept => None,
            RelaxError::Syntax(e) => Some(e.span),
            RelaxError::UndefinedReference { span, .. }
            | RelaxError::ParentRefOutsideGrammar { span, .. }
            | RelaxError::DuplicateStartInGrammar { span }
            | RelaxError::MissingStart { span }
            | RelaxError::CombineMismatch { span, .. }
            | RelaxError::UnsupportedInclude { span, .. }
            | RelaxError::OverlappingAttributes { span }
            | RelaxError::OverlappingElements { span }
            | RelaxError::RestrictedPattern { span, .. } => Some(*span),
        }
    }
}

/// Compiles one schema document (and everything it transitively
/// `include`s/`externalRef`s) into a `model::DefineRule` tree.
pub struct Compiler<F: Files> {
    files: F,
    syntax: Syntax,
    codemap: CodeMap,
}

impl<F: Files> Compiler<F> {
    pub fn new(files: F, syntax: Syntax) -> Compiler<F> {
        Compiler { files, syntax, codemap: CodeMap::new() }
    }

    pub fn compile(&mut self, path: &Path) -> Result<Rc<RefCell<Option<model::DefineRule>>>, RelaxError> {
        self.compile_with_options(path, &CompileOptions::default())
    }

    pub fn compile_with_options(
        &mut self,
        path: &Path,
        options: &CompileOptions,
    ) -> Result<Rc<RefCell<Option<model::DefineRule>>>, RelaxError> {
        let Syntax::Xml = self.syntax;
        info!("compiling {}", path.display());

        let source = self.files.load(path)?;
        let base = self.files.base_uri(path)?;
        let file_name = path.to_string_lossy().to_string();
        let (mut tree, file) =
            relaxng_syntax::xmlsyntax::parse(&mut self.codemap, &file_name, base, source)
                .map_err(RelaxError::Syntax)?;

        if !options.simplified_input {
            debug!("running simplification pipeline");
            simplify::run(&mut tree, &self.files, &mut self.codemap)?;
        }

        let ctx = Context::new(file);
        let compilers = datatype::Compilers::new();
        let grammar = model::Grammar::new();
        let (start, _grammar) =
            simplify::build_pattern(&tree, &ctx, &compilers, grammar, options.allow_incomplete_types)?;

        let start_span = tree.element(tree.root).span;
        let start_rule = model::DefineRule::new("start", start, start_span);
        check_restrictions(&start_rule, start_span)?;

        Ok(Rc::new(RefCell::new(Some(start_rule))))
    }

    pub fn dump_diagnostic(&self, err: &RelaxError) {
        use codemap_diagnostic::{ColorConfig, Diagnostic, Emitter, Level, SpanLabel, SpanStyle};
        let diag = Diagnostic {
            level: Level::Error,
            message: err.to_string(),
            code: None,
            spans: match err.span() {
                Some(span) => vec![SpanLabel { span, style: SpanStyle::Primary, label: None }],
                None => vec![],
            },
        };
        let mut emitter = Emitter::stderr(ColorConfig::Auto, Some(&self.codemap));
        emitter.emit(&[diag]);
    }
}
