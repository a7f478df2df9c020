// Numeric prefix parser for property values

use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, digit0, digit1, one_of},
    combinator::{opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};

/// `digits[.digits]` or `.digits`
fn mantissa(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(digit1, opt(pair(char('.'), digit0)))),
        recognize(pair(char('.'), digit1)),
    ))(input)
}

/// `e[+-]digits`; a dangling `e` is not part of the number
fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

/// Whitespace skipped before a number: Unicode spaces and line breaks plus
/// the byte order mark, but not NEL.
fn is_leading_space(c: char) -> bool {
    c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}')
}

/// Recognize the longest numeric prefix after leading whitespace.
pub fn float_prefix(input: &str) -> IResult<&str, &str> {
    preceded(
        take_while(is_leading_space),
        recognize(tuple((opt(one_of("+-")), mantissa, opt(exponent)))),
    )(input)
}

/// Lenient float parsing: "12.5 km" reads as 12.5, "abc" as nothing.
/// Only finite results are accepted.
pub fn parse_float(input: &str) -> Option<f64> {
    let (_, text) = float_prefix(input).ok()?;
    let value: f64 = text.parse().ok()?;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_float("42"), Some(42.0));
        assert_eq!(parse_float("-3.25"), Some(-3.25));
        assert_eq!(parse_float("+7"), Some(7.0));
        assert_eq!(parse_float(".5"), Some(0.5));
        assert_eq!(parse_float("5."), Some(5.0));
    }

    #[test]
    fn test_exponent() {
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float("2.5E-1"), Some(0.25));
        // dangling exponent marker is ignored
        assert_eq!(parse_float("1e"), Some(1.0));
        assert_eq!(parse_float("1e+"), Some(1.0));
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(parse_float("12abc"), Some(12.0));
        assert_eq!(parse_float("  8.5 ha"), Some(8.5));
        assert_eq!(parse_float("3,200"), Some(3.0));
    }

    #[test]
    fn test_unicode_leading_space() {
        assert_eq!(parse_float("\u{a0}5"), Some(5.0));
        assert_eq!(parse_float("\u{feff}\u{2003}7.5"), Some(7.5));
        assert_eq!(parse_float("\u{b}\u{c}\u{2028}-2"), Some(-2.0));
        assert_eq!(parse_float("\u{85}5"), None);
    }

    #[test]
    fn test_not_a_number() {
        assert_eq!(parse_float("abc"), None);
        assert_eq!(parse_float(""), None);
        assert_eq!(parse_float("   "), None);
        assert_eq!(parse_float("-"), None);
        assert_eq!(parse_float("."), None);
        assert_eq!(parse_float("N/A"), None);
    }

    #[test]
    fn test_infinite_rejected() {
        assert_eq!(parse_float("1e999"), None);
        assert_eq!(parse_float("Infinity"), None);
    }

    #[test]
    fn test_float_prefix_remaining() {
        let (rest, num) = float_prefix(" 10.5kg").unwrap();
        assert_eq!(num, "10.5");
        assert_eq!(rest, "kg");
    }
}
