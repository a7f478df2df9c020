// Small text parsers used by the page: numeric prefixes and URL queries

pub mod number;
pub mod query;

pub use number::parse_float;
pub use query::{layer_url, parse_query, query_param, LAYER_PARAM};
