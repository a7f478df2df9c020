// URL query string handling for the layer parameter

use nom::{
    bytes::complete::take_till,
    character::complete::char,
    combinator::opt,
    multi::separated_list0,
    sequence::{pair, preceded},
    IResult,
};

/// Query parameter carrying the active layer (dataset/file) identifier
pub const LAYER_PARAM: &str = "file_id";

fn query_pair(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(
        take_till(|c| c == '=' || c == '&'),
        opt(preceded(char('='), take_till(|c| c == '&'))),
    )(input)
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Parse `?a=1&b=2` (leading `?` optional) into decoded name/value pairs.
/// Pairs with an empty name are dropped.
pub fn parse_query(input: &str) -> Vec<(String, String)> {
    let input = input.strip_prefix('?').unwrap_or(input);
    let pairs = match separated_list0(char('&'), query_pair)(input) {
        Ok((_, pairs)) => pairs,
        Err(_) => return Vec::new(),
    };

    pairs
        .into_iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (decode(name), decode(value.unwrap_or(""))))
        .collect()
}

/// Value of the first `name` pair. An empty value counts as absent.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    parse_query(query)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

/// Relative URL selecting a layer: `?file_id=<id>`
pub fn layer_url(layer_id: &str) -> String {
    format!("?{}={}", LAYER_PARAM, urlencoding::encode(layer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let pairs = parse_query("?file_id=12&tab=map");
        assert_eq!(
            pairs,
            vec![
                ("file_id".to_string(), "12".to_string()),
                ("tab".to_string(), "map".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_query_empty() {
        assert!(parse_query("").is_empty());
        assert!(parse_query("?").is_empty());
    }

    #[test]
    fn test_decoding() {
        assert_eq!(
            query_param("q=land+use%2Fzoning", "q"),
            Some("land use/zoning".to_string())
        );
    }

    #[test]
    fn test_query_param_first_wins() {
        assert_eq!(query_param("file_id=1&file_id=2", "file_id"), Some("1".into()));
    }

    #[test]
    fn test_empty_value_is_absent() {
        assert_eq!(query_param("?file_id=", "file_id"), None);
        assert_eq!(query_param("?file_id", "file_id"), None);
        assert_eq!(query_param("?other=3", "file_id"), None);
    }

    #[test]
    fn test_layer_url_encodes() {
        assert_eq!(layer_url("7"), "?file_id=7");
        assert_eq!(layer_url("a b"), "?file_id=a%20b");
    }
}
