//! A single surviving fragment of a would-be RELAX NG compact-syntax
//! parser: the `NCName` production, with source-location tracking via
//! `nom_locate`. Full compact-syntax (`.rnc`) parsing is out of scope;
//! this is kept because the datatype library validates `NCName`-shaped
//! lexical values (`Name`, `NCName`, `ID`, `IDREF`, `ENTITY`) and a
//! tokenising check, not just a `char`-predicate scan, is the idiom the
//! rest of this codebase uses for grammar productions.

use crate::ncname::{is_nc_name_char, is_nc_name_start_char};
use nom::{Err, IResult};

pub type Span<'a> = nom_locate::LocatedSpan<&'a str>;

/// Parse the longest leading `NCName` from `input`, returning the
/// unconsumed remainder. Callers that want "is this string *entirely* an
/// NCName" check that the remainder is empty.
pub fn nc_name(input: Span) -> IResult<Span, String> {
    let s = *input.fragment();
    let mut chars = s.char_indices();
    let first = match chars.next() {
        Some((_, c)) if is_nc_name_start_char(c) => c,
        _ => {
            return Err(Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Alpha,
            )));
        }
    };
    let mut end = first.len_utf8();
    for (i, c) in chars {
        if is_nc_name_char(c) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    let (name, rest) = s.split_at(end);
    let rest_span = unsafe {
        // offsetting within the same source string is safe; nom_locate
        // does not expose a public constructor that avoids this for a
        // suffix slice.
        Span::new_from_raw_offset(input.location_offset() + end, input.location_line(), rest, ())
    };
    Ok((rest_span, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_ncname() {
        let (rest, name) = nc_name(Span::new("foo123")).unwrap();
        assert_eq!(name, "foo123");
        assert!(rest.fragment().is_empty());
    }

    #[test]
    fn stops_at_colon() {
        let (rest, name) = nc_name(Span::new("foo:bar")).unwrap();
        assert_eq!(name, "foo");
        assert_eq!(*rest.fragment(), ":bar");
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(nc_name(Span::new("1foo")).is_err());
    }
}
