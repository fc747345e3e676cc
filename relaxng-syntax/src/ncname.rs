//! XML `NCName` character classification (XML Namespaces 1.0, production
//! `NCNameChar`/`NCNameStartChar`). Kept narrow on purpose: this crate does
//! not implement the full XML `Name` grammar, only what the datatype
//! library (`Name`, `NCName`, `NMTOKEN`, `ID`, `IDREF`, `ENTITY`) and the
//! RELAX NG name-pattern algebra need.

/// `NCNameStartChar ::= Letter | '_'` (simplified: treats any alphabetic
/// Unicode scalar, per `char::is_alphabetic`, as `Letter`).
pub fn is_nc_name_start_char(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

/// `NCNameChar ::= NCNameStartChar | '-' | '.' | Digit | CombiningChar | Extender`
pub fn is_nc_name_char(c: char) -> bool {
    is_nc_name_start_char(c) || c == '-' || c == '.' || c.is_ascii_digit() || c.is_numeric()
}

/// XML `NameStartChar` additionally permits `:` (used for qualified names
/// before namespace resolution splits the prefix off).
pub fn is_name_start_char(c: char) -> bool {
    c == ':' || is_nc_name_start_char(c)
}

/// XML `NameChar` additionally permits `:`.
pub fn is_name_char(c: char) -> bool {
    c == ':' || is_nc_name_char(c)
}

pub fn is_valid_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => false,
        Some(first) => is_nc_name_start_char(first) && chars.all(is_nc_name_char),
    }
}

pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => false,
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
    }
}
