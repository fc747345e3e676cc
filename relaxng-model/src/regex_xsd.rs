//! Translates an XSD regular expression (the grammar `xsd:pattern` facets
//! use, [XML Schema Part 2 §G]) into a pattern the `regex` crate accepts.
//!
//! The two differ in three places this module has to bridge:
//!   - XSD's multi-character escapes `\i \I \c \C` (NameStartChar/NameChar
//!     and their complements) have no `regex` crate equivalent and are
//!     expanded to explicit Unicode character classes.
//!   - XSD character classes support set subtraction (`[a-z-[aeiou]]`),
//!     which `regex` does not; subtraction is resolved here by expanding
//!     both sides to codepoint ranges and computing the difference.
//!   - XSD patterns always match the *entire* value (there's no partial
//!     match as in Perl-style regex use), so the translated pattern is
//!     anchored with `^(?:...)$`.
//!
//! [XML Schema Part 2 §G]: https://www.w3.org/TR/xmlschema-2/#regexs
//!
//! The tokenizer below is hand-rolled with `nom` rather than built on top
//! of `regex-syntax`: XSD regex syntax is a different (smaller, and in the
//! character-class-subtraction case stricter) grammar than either Perl or
//! `regex`'s own, so parsing it with a generic regex-syntax parser would
//! accept constructs XSD forbids and vice versa.

use nom::branch::alt;
use nom::character::complete::{char, digit1};
use nom::combinator::{map, opt};
use nom::multi::many0;
use nom::sequence::{delimited, pair, tuple};
use nom::IResult;

#[derive(Debug, PartialEq, Eq)]
pub struct RegexTranslateError(pub String);

/// Translate an XSD `pattern` facet value into an anchored `regex`-crate
/// pattern string equivalent to "the whole value matches `xsd_pattern`".
pub fn translate(xsd_pattern: &str) -> Result<String, RegexTranslateError> {
    let branches = parse_regexp(xsd_pattern)?;
    Ok(format!("^(?:{})$", branches))
}

fn parse_regexp(input: &str) -> Result<String, RegexTranslateError> {
    match regexp(input) {
        Ok(("", out)) => Ok(out),
        Ok((rest, _)) => Err(RegexTranslateError(format!("unconsumed input: {:?}", rest))),
        Err(e) => Err(RegexTranslateError(format!("{:?}", e))),
    }
}

// regExp ::= branch ('|' branch)*
fn regexp(input: &str) -> IResult<&str, String> {
    map(pair(branch, many0(pair(char('|'), branch))), |(first, rest)| {
        let mut out = first;
        for (_, b) in rest {
            out.push('|');
            out.push_str(&b);
        }
        out
    })(input)
}

// branch ::= piece*
fn branch(input: &str) -> IResult<&str, String> {
    map(many0(piece), |pieces| pieces.concat())(input)
}

// piece ::= atom quantifier?
fn piece(input: &str) -> IResult<&str, String> {
    map(pair(atom, opt(quantifier)), |(a, q)| match q {
        Some(q) => format!("{}{}", a, q),
        None => a,
    })(input)
}

fn quantifier(input: &str) -> IResult<&str, String> {
    alt((
        map(char('?'), |_| "?".to_string()),
        map(char('*'), |_| "*".to_string()),
        map(char('+'), |_| "+".to_string()),
        map(
            delimited(
                char('{'),
                tuple((digit1, opt(pair(char(','), opt(digit1))))),
                char('}'),
            ),
            |(min, rest): (&str, Option<(char, Option<&str>)>)| match rest {
                None => format!("{{{}}}", min),
                Some((_, None)) => format!("{{{},}}", min),
                Some((_, Some(max))) => format!("{{{},{}}}", min, max),
            },
        ),
    ))(input)
}

// atom ::= group | charClassExpr | singleCharEsc | '.' | normalChar
fn atom(input: &str) -> IResult<&str, String> {
    alt((group, char_class_expr, escape_atom, map(char('.'), |_| ".".to_string()), normal_char))(input)
}

fn group(input: &str) -> IResult<&str, String> {
    map(delimited(char('('), regexp, char(')')), |inner| format!("(?:{})", inner))(input)
}

fn normal_char(input: &str) -> IResult<&str, String> {
    map(
        nom::character::complete::satisfy(|c| !"(){}[]|.?*+\\".contains(c)),
        |c| regex::escape(&c.to_string()),
    )(input)
}

// A multi-char escape outside a class: \i \I \c \C expand to full classes;
// everything else (\d \w \s \. etc.) regex already understands the same way.
fn escape_atom(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('\\')(input)?;
    let (rest, c) = nom::character::complete::anychar(rest)?;
    Ok((rest, translate_escape(c)))
}

fn translate_escape(c: char) -> String {
    match c {
        'i' => format!("[{}]", NAME_START_CONTENT),
        'I' => format!("[^{}]", NAME_START_CONTENT),
        'c' => format!("[{}]", NAME_CHAR_CONTENT),
        'C' => format!("[^{}]", NAME_CHAR_CONTENT),
        other if "\\.?*+(){}|[]^$".contains(other) => format!("\\{}", other),
        other => format!("\\{}", other),
    }
}

const NAME_START_CONTENT: &str = "\\p{L}_:";
const NAME_CHAR_CONTENT: &str = "\\p{L}\\p{N}_:.\\-";

/// One codepoint range, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Range(u32, u32);

/// One member of a parsed `[...]` character class.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ClassAtom {
    Range(Range),
    /// Bracket-expression content (no enclosing `[]`) for a positive
    /// multi-char escape (`\d \s \w \i \c`) -- `regex` understands `\d \s
    /// \w` directly inside a class, and `\i \c` expand to the same
    /// Unicode-property content `escape_atom` uses outside one.
    Positive(String),
    /// The *positive* form of a negative multi-char escape (`\D \S \W \I
    /// \C`) -- e.g. `\D` is stored as `Negated("\\d")`, standing for
    /// "anything that is not a digit". Kept apart from `Positive` because
    /// its members aren't enumerable codepoint ranges, so it can't be
    /// unioned into the same bracket expression the way `Positive`/`Range`
    /// can; `render_class` gives it its own alternative or lookahead.
    Negated(String),
}

fn char_class_expr(input: &str) -> IResult<&str, String> {
    let (rest, (negated, atoms, subtraction)) = delimited(
        char('['),
        tuple((
            map(opt(char('^')), |o| o.is_some()),
            class_ranges,
            opt(pair(char('-'), delimited(char('['), class_ranges, char(']')))),
        )),
        char(']'),
    )(input)?;

    let (mut ranges, positive, negated_escapes) = split_atoms(atoms);
    if let Some((_, subtract_atoms)) = subtraction {
        // Subtraction is only well-defined over enumerable codepoint
        // ranges; an escape on the right-hand side (`[a-z-[\s]]`) is rare
        // enough in practice that it's left unsubtracted rather than
        // attempting set arithmetic against `\s`'s members.
        let (subtract, _, _) = split_atoms(subtract_atoms);
        ranges = subtract_ranges(&ranges, &subtract);
    }
    Ok((rest, render_class(negated, &ranges, &positive, &negated_escapes)))
}

fn split_atoms(atoms: Vec<ClassAtom>) -> (Vec<Range>, Vec<String>, Vec<String>) {
    let mut ranges = Vec::new();
    let mut positive = Vec::new();
    let mut negated = Vec::new();
    for a in atoms {
        match a {
            ClassAtom::Range(r) => ranges.push(r),
            ClassAtom::Positive(s) => positive.push(s),
            ClassAtom::Negated(s) => negated.push(s),
        }
    }
    (ranges, positive, negated)
}

fn class_ranges(input: &str) -> IResult<&str, Vec<ClassAtom>> {
    many0(class_item)(input)
}

fn class_item(input: &str) -> IResult<&str, ClassAtom> {
    alt((
        class_multi_escape,
        map(class_range, ClassAtom::Range),
        map(class_single, ClassAtom::Range),
    ))(input)
}

// Multi-char class escapes (`\s \S \d \D \w \W \i \I \c \C`) have to be
// recognised before falling back to `class_char`, which otherwise treats
// any `\x` as a literal escaped char `x` -- that's correct for `\n \t \- \]`
// etc. but would silently drop the backslash's meaning for these.
fn class_multi_escape(input: &str) -> IResult<&str, ClassAtom> {
    map(
        pair(char('\\'), nom::character::complete::one_of("sSdDwWiIcC")),
        |(_, c)| match c {
            's' => ClassAtom::Positive("\\s".to_string()),
            'S' => ClassAtom::Negated("\\s".to_string()),
            'd' => ClassAtom::Positive("\\d".to_string()),
            'D' => ClassAtom::Negated("\\d".to_string()),
            'w' => ClassAtom::Positive("\\w".to_string()),
            'W' => ClassAtom::Negated("\\w".to_string()),
            'i' => ClassAtom::Positive(NAME_START_CONTENT.to_string()),
            'I' => ClassAtom::Negated(NAME_START_CONTENT.to_string()),
            'c' => ClassAtom::Positive(NAME_CHAR_CONTENT.to_string()),
            'C' => ClassAtom::Negated(NAME_CHAR_CONTENT.to_string()),
            _ => unreachable!("one_of restricts c to the listed chars"),
        },
    )(input)
}

fn class_range(input: &str) -> IResult<&str, Range> {
    map(
        tuple((class_char, char('-'), class_char)),
        |(a, _, b)| Range(a as u32, b as u32),
    )(input)
}

fn class_single(input: &str) -> IResult<&str, Range> {
    map(class_char, |c| Range(c as u32, c as u32))(input)
}

// A single literal char for use directly or as one end of a range.
// `class_multi_escape` is tried first in `class_item`, so by the time this
// runs, a backslash here is a single-char escape: `\n \r \t` translate to
// the char they name, everything else (`\- \[ \] \^ \\ \.` ...) to the
// literal char following the backslash.
fn class_char(input: &str) -> IResult<&str, char> {
    alt((
        map(pair(char('\\'), nom::character::complete::anychar), |(_, c)| {
            translate_single_char_escape(c)
        }),
        nom::character::complete::satisfy(|c| c != ']' && c != '-'),
    ))(input)
}

fn translate_single_char_escape(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        other => other,
    }
}

fn subtract_ranges(base: &[Range], subtract: &[Range]) -> Vec<Range> {
    let mut out = Vec::new();
    for Range(mut start, end) in base.iter().copied() {
        let mut cuts: Vec<Range> = subtract
            .iter()
            .copied()
            .filter(|Range(s, e)| *s <= end && *e >= start)
            .collect();
        cuts.sort_by_key(|r| r.0);
        for Range(cs, ce) in cuts {
            if cs > start {
                out.push(Range(start, cs - 1));
            }
            start = start.max(ce + 1);
            if start > end {
                break;
            }
        }
        if start <= end {
            out.push(Range(start, end));
        }
    }
    out
}

/// Render a parsed character class. `negated_escapes` (the positive form
/// of each `\D \S \W \I \C` the class contained) can't be unioned
/// range-wise with `ranges`/`positive_escapes` -- their members aren't
/// enumerable codepoint ranges -- so each gets its own top-level
/// alternative (positive class) or required lookahead (negated class).
fn render_class(negated: bool, ranges: &[Range], positive_escapes: &[String], negated_escapes: &[String]) -> String {
    if negated_escapes.is_empty() {
        return render_bracket(negated, ranges, positive_escapes);
    }
    if !negated {
        // `[x\S]`: x, plus anything outside \S's positive complement.
        let mut alts = Vec::new();
        if !ranges.is_empty() || !positive_escapes.is_empty() {
            alts.push(render_bracket(false, ranges, positive_escapes));
        }
        for pos in negated_escapes {
            alts.push(format!("[^{}]", pos));
        }
        format!("(?:{})", alts.join("|"))
    } else {
        // `[^x\S]`: not x, and not (not whitespace) i.e. whitespace --
        // each negated escape becomes a required lookahead over its own
        // positive form, ANDed with the rest of the class's negation.
        let lookaheads: String = negated_escapes.iter().map(|p| format!("(?={})", p)).collect();
        let rest = if ranges.is_empty() && positive_escapes.is_empty() {
            "(?s:.)".to_string()
        } else {
            render_bracket(true, ranges, positive_escapes)
        };
        format!("(?:{}{})", lookaheads, rest)
    }
}

fn render_bracket(negated: bool, ranges: &[Range], positive_escapes: &[String]) -> String {
    let mut s = String::from("[");
    if negated {
        s.push('^');
    }
    for Range(a, b) in ranges {
        let a = char::from_u32(*a).unwrap_or('\u{FFFD}');
        let b = char::from_u32(*b).unwrap_or('\u{FFFD}');
        if a == b {
            s.push_str(&regex::escape(&a.to_string()));
        } else {
            s.push_str(&regex::escape(&a.to_string()));
            s.push('-');
            s.push_str(&regex::escape(&b.to_string()));
        }
    }
    for p in positive_escapes {
        s.push_str(p);
    }
    s.push(']');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_whole_pattern() {
        assert_eq!(translate("abc").unwrap(), "^(?:abc)$");
    }

    #[test]
    fn passes_through_quantifiers_and_alternation() {
        assert_eq!(translate("a|bc+").unwrap(), "^(?:a|bc+)$");
    }

    #[test]
    fn translates_name_escapes() {
        let out = translate(r"\i\c*").unwrap();
        assert!(out.contains("\\p{L}"));
    }

    #[test]
    fn subtracts_class_members() {
        // [a-z-[aeiou]] should match consonants only.
        let out = translate("[a-z-[aeiou]]").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match("b"));
        assert!(!re.is_match("a"));
    }

    #[test]
    fn simple_char_class_roundtrips() {
        let out = translate("[abc]+").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match("abcba"));
        assert!(!re.is_match("abcd"));
    }

    #[test]
    fn single_multi_char_escape_in_class_matches_whitespace() {
        let out = translate(r"[\s]+").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match(" \t\n"));
        assert!(!re.is_match("x"));
    }

    #[test]
    fn combines_digit_and_name_start_escapes_in_class() {
        let out = translate(r"[\d\i]+").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match("9"));
        assert!(re.is_match("a"));
        assert!(!re.is_match("!"));
    }

    #[test]
    fn single_char_escape_in_class_is_not_a_literal_letter() {
        let out = translate(r"[0-9\n]+").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match("5\n5"));
        assert!(!re.is_match("n"));
    }

    #[test]
    fn negated_multi_char_escape_lifts_out_of_positive_class() {
        let out = translate(r"[x\S]+").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match("x"));
        assert!(re.is_match("y"));
        assert!(!re.is_match(" "));
    }

    #[test]
    fn negated_multi_char_escape_in_negated_class_requires_its_positive_form() {
        // [^x\S] matches whitespace that isn't x.
        let out = translate(r"[^x\S]+").unwrap();
        let re = regex::Regex::new(&out).unwrap();
        assert!(re.is_match(" "));
        assert!(!re.is_match("x"));
        assert!(!re.is_match("y"));
    }
}
