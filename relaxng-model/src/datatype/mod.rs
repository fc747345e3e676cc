//! Datatype library abstraction: a `Datatype` is
//! anything that can judge whether a string is a valid lexical
//! representation, optionally informed by the in-scope namespace bindings
//! (needed for `QName`/`NOTATION`). `relax` implements the always-available
//! built-in library; `xsd` implements `http://www.w3.org/2001/XMLSchema-datatypes`,
//! the only other library this crate knows how to compile against.

pub mod relax;
pub mod xsd;

use crate::Context;
use relaxng_syntax::types;
use std::fmt;

/// Why a value failed `disallows`: the facet (or lexical rule) it violated,
/// in prose a caller can surface directly (`"value must be less than or
/// equal to 10"`) rather than a generic rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError(pub String);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compiled datatype (the result of resolving a `<data type="...">`'s
/// name and parameters). Implementors answer "is this string a member".
pub trait Datatype {
    fn is_valid(&self, value: &str) -> bool;

    /// Like `is_valid`, but on rejection names every facet the value
    /// violates instead of a single boolean. The default forwards to
    /// `is_valid` with a generic reason; library types with real facets
    /// (`xsd::XsdDatatypes`) override this with per-facet messages.
    fn disallows(&self, value: &str) -> Vec<ValueError> {
        if self.is_valid(value) {
            Vec::new()
        } else {
            vec![ValueError("value rejected by datatype".to_string())]
        }
    }
}

/// In-scope namespace bindings, as needed by datatypes whose lexical space
/// includes QNames (`xsd:QName`, `xsd:NOTATION`). Implemented by the
/// validator's element stack at validation time.
pub trait Namespaces {
    fn resolve(&self, prefix: &str) -> Option<&str>;
}

/// One datatype library's compiler: turns `<data>`/`<value>` syntax into a
/// library-specific compiled type/value. Implemented once per library
/// (`relax::Compiler`, `xsd::Compiler`); `Compilers` below dispatches to
/// whichever one a schema's `datatypeLibrary` URI names.
pub trait DatatypeCompiler {
    type DT;
    type DTValue;
    type Error;

    fn datatype_name(
        &self,
        ctx: &Context,
        datatype_name: &types::DatatypeName,
        params: &[types::Param],
    ) -> Result<Self::DT, Self::Error>;

    fn datatype_value(
        &self,
        ctx: &Context,
        datatype_name: &types::DatatypeName,
        value: &str,
        ns: &[(String, String)],
    ) -> Result<Self::DTValue, Self::Error>;
}

/// The unified compiled-datatype representation stored in `model::Pattern`,
/// wrapping whichever library actually produced it.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Datatypes {
    Relax(relax::RelaxDatatypes),
    Xsd(xsd::XsdDatatypes),
}

impl Datatype for Datatypes {
    fn is_valid(&self, value: &str) -> bool {
        match self {
            Datatypes::Relax(d) => d.is_valid(value),
            Datatypes::Xsd(d) => d.is_valid(value),
        }
    }

    fn disallows(&self, value: &str) -> Vec<ValueError> {
        match self {
            Datatypes::Relax(d) => d.disallows(value),
            Datatypes::Xsd(d) => d.disallows(value),
        }
    }
}

impl Datatypes {
    /// `data type="QName"` (without a `<value>`) only checks lexical QName
    /// syntax, so `ns` is unused here -- kept for symmetry with
    /// `DatatypeValues::is_valid_with_ns`, whose `<value type="QName">` form
    /// does need to resolve a prefix.
    pub fn is_valid_with_ns(&self, value: &str, _ns: &dyn Namespaces) -> bool {
        self.is_valid(value)
    }

    pub fn disallows_with_ns(&self, value: &str, _ns: &dyn Namespaces) -> Vec<ValueError> {
        self.disallows(value)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum DatatypeValues {
    Relax(relax::RelaxDatatypeValues),
    Xsd(xsd::XsdDatatypeValues),
}

impl Datatype for DatatypeValues {
    fn is_valid(&self, value: &str) -> bool {
        match self {
            DatatypeValues::Relax(d) => d.is_valid(value),
            DatatypeValues::Xsd(d) => d.is_valid(value),
        }
    }

    fn disallows(&self, value: &str) -> Vec<ValueError> {
        match self {
            DatatypeValues::Relax(d) => d.disallows(value),
            DatatypeValues::Xsd(d) => d.disallows(value),
        }
    }
}

impl DatatypeValues {
    pub fn is_valid_with_ns(&self, value: &str, ns: &dyn Namespaces) -> bool {
        match self {
            DatatypeValues::Relax(d) => d.is_valid(value),
            DatatypeValues::Xsd(d) => d.is_valid_with_ns(value, ns),
        }
    }

    pub fn disallows_with_ns(&self, value: &str, ns: &dyn Namespaces) -> Vec<ValueError> {
        match self {
            DatatypeValues::Relax(d) => d.disallows(value),
            DatatypeValues::Xsd(d) => d.disallows_with_ns(value, ns),
        }
    }
}

/// The `http://www.w3.org/2001/XMLSchema-datatypes` and "no library" (the
/// RELAX NG built-in) namespace URIs this crate knows how to compile; any
/// other `datatypeLibrary` value is an `UnknownLibrary` error, unless
/// `--allow-incomplete-types` permits a schema to reference a
/// `datatypeLibrary` this tool doesn't implement.
pub const BUILTIN_LIBRARY_URI: &str = "";

#[derive(Debug)]
pub enum ParamError {
    Relax(relax::RelaxDatatypeError),
    Xsd(xsd::XsdDatatypeError),
    UnknownLibrary { span: codemap::Span, uri: String },
}

/// How to react to a `datatypeLibrary` URI this crate does not implement.
/// Mirrors the `--allow-incomplete-types` CLI flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowIncompleteTypes {
    Quiet,
    Warn,
    Error,
}

impl Default for AllowIncompleteTypes {
    fn default() -> Self {
        AllowIncompleteTypes::Error
    }
}

/// Compiles `<data>`/`<value>` occurrences by dispatching on the active
/// `datatypeLibrary` URI to the matching per-library compiler.
#[derive(Default)]
pub struct Compilers {
    relax: relax::Compiler,
    xsd: xsd::Compiler,
}

impl Compilers {
    pub fn new() -> Compilers {
        Compilers::default()
    }

    pub fn datatype_name(
        &self,
        ctx: &Context,
        datatype_name: &types::DatatypeName,
        params: &[types::Param],
    ) -> Result<Datatypes, ParamError> {
        match datatype_name.library_uri() {
            BUILTIN_LIBRARY_URI => self
                .relax
                .datatype_name(ctx, datatype_name, params)
                .map(Datatypes::Relax)
                .map_err(ParamError::Relax),
            xsd::NAMESPACE_URI => self
                .xsd
                .datatype_name(ctx, datatype_name, params)
                .map(Datatypes::Xsd)
                .map_err(ParamError::Xsd),
            other => Err(ParamError::UnknownLibrary {
                span: ctx.convert_span(params.first().map(|p| p.span()).unwrap_or(&(0..0))),
                uri: other.to_string(),
            }),
        }
    }

    pub fn datatype_value(
        &self,
        ctx: &Context,
        datatype_name: &types::DatatypeName,
        value: &str,
        ns: &[(String, String)],
    ) -> Result<DatatypeValues, ParamError> {
        match datatype_name.library_uri() {
            BUILTIN_LIBRARY_URI => self
                .relax
                .datatype_value(ctx, datatype_name, value, ns)
                .map(DatatypeValues::Relax)
                .map_err(ParamError::Relax),
            xsd::NAMESPACE_URI => self
                .xsd
                .datatype_value(ctx, datatype_name, value, ns)
                .map(DatatypeValues::Xsd)
                .map_err(ParamError::Xsd),
            other => Err(ParamError::UnknownLibrary {
                span: ctx.convert_span(&(0..0)),
                uri: other.to_string(),
            }),
        }
    }
}
