//! The built-in RELAX NG datatype library (`http://relaxng.org/ns/structure/1.0`),
//! providing `string` and `token` -- the two datatypes available even when no
//! `datatypeLibrary` is declared.

use crate::Context;
use relaxng_syntax::types;

pub const NAMESPACE_URI: &str = "";

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum RelaxDatatypes {
    String,
    Token,
}

impl super::Datatype for RelaxDatatypes {
    fn is_valid(&self, _value: &str) -> bool {
        // `string`/`token` as *types* (used in `data type="string"`) accept any
        // value; `normalize_whitespace` only matters for equality against a
        // literal `value`, handled by `RelaxDatatypeValues`.
        true
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum RelaxDatatypeValues {
    String(String),
    Token(String),
}

impl super::Datatype for RelaxDatatypeValues {
    fn is_valid(&self, value: &str) -> bool {
        match self {
            RelaxDatatypeValues::String(s) => s == value,
            RelaxDatatypeValues::Token(s) => s == &normalize_whitespace(value),
        }
    }

    fn disallows(&self, value: &str) -> Vec<super::ValueError> {
        match self {
            RelaxDatatypeValues::String(s) if s != value => {
                vec![super::ValueError(format!("value must equal {:?}", s))]
            }
            RelaxDatatypeValues::Token(s) if s != &normalize_whitespace(value) => {
                vec![super::ValueError(format!("value must equal {:?} once whitespace is normalized", s))]
            }
            _ => Vec::new(),
        }
    }
}

/// XSD/RELAX NG `whiteSpace="collapse"`: strip leading/trailing whitespace and
/// collapse internal runs of whitespace to a single space.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug)]
pub enum RelaxDatatypeError {
    UnsupportedDatatype { span: codemap::Span, name: String },
    FacetsNotSupported { span: codemap::Span },
}

#[derive(Default)]
pub struct Compiler;

impl super::DatatypeCompiler for Compiler {
    type DT = RelaxDatatypes;
    type DTValue = RelaxDatatypeValues;
    type Error = RelaxDatatypeError;

    fn datatype_name(
        &self,
        ctx: &Context,
        datatype_name: &types::DatatypeName,
        params: &[types::Param],
    ) -> Result<Self::DT, Self::Error> {
        if !params.is_empty() {
            return Err(RelaxDatatypeError::FacetsNotSupported {
                span: ctx.convert_span(params[0].span()),
            });
        }
        match datatype_name.local_name() {
            "string" => Ok(RelaxDatatypes::String),
            "token" => Ok(RelaxDatatypes::Token),
            other => Err(RelaxDatatypeError::UnsupportedDatatype {
                span: ctx.convert_span(&(0..0)),
                name: other.to_string(),
            }),
        }
    }

    fn datatype_value(
        &self,
        ctx: &Context,
        datatype_name: &types::DatatypeName,
        value: &str,
        _ns: &[(String, String)],
    ) -> Result<Self::DTValue, Self::Error> {
        match datatype_name.local_name() {
            "string" => Ok(RelaxDatatypeValues::String(value.to_string())),
            "token" => Ok(RelaxDatatypeValues::Token(normalize_whitespace(value))),
            other => Err(RelaxDatatypeError::UnsupportedDatatype {
                span: ctx.convert_span(&(0..0)),
                name: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_collapses_whitespace() {
        assert_eq!(normalize_whitespace("  a   b\tc\n"), "a b c");
    }

    #[test]
    fn token_value_matches_normalized_input() {
        use super::super::Datatype;
        let v = RelaxDatatypeValues::Token("a b".to_string());
        assert!(v.is_valid("a   b"));
        assert!(!v.is_valid("a b c"));
    }
}
