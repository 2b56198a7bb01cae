//! Parsing of single configuration-line tokens: the route specifier and the
//! upstream server URL.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

/// Route grammar: up to 20 dot-separated bits followed by a `*`.
static ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([01]\.){0,20}\*$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteParseError {
    #[error("invalid route specifier: {0}")]
    BadRoute(String),
    #[error("invalid server URL: {0}")]
    BadUrl(String),
    #[error("server URL scheme must be http: {0}")]
    BadScheme(String),
}

/// One route-to-server binding parsed from a configuration line.
///
/// The prefix is matched against the high-order bits of the sharding key;
/// the URL is stored normalized, ready to be joined with a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRoute {
    pub prefix: Vec<u8>,
    pub url: String,
}

impl ServerRoute {
    pub fn parse(route: &str, url: &str) -> Result<Self, RouteParseError> {
        Ok(ServerRoute {
            prefix: parse_prefix(route)?,
            url: parse_server_url(url)?,
        })
    }
}

/// Parses a route specifier such as `0.1.*` into its bit prefix.
pub fn parse_prefix(s: &str) -> Result<Vec<u8>, RouteParseError> {
    if !ROUTE_RE.is_match(s) {
        return Err(RouteParseError::BadRoute(s.to_string()));
    }
    Ok(s.bytes()
        .filter(|b| matches!(b, b'0' | b'1'))
        .map(|b| b - b'0')
        .collect())
}

/// Parses and normalizes an upstream server URL.
///
/// Only absolute `http://` URLs are accepted; upstream traffic is always
/// plain HTTP in this design.
pub fn parse_server_url(s: &str) -> Result<String, RouteParseError> {
    let url = Url::parse(s).map_err(|_| RouteParseError::BadUrl(s.to_string()))?;
    if url.scheme() != "http" {
        return Err(RouteParseError::BadScheme(s.to_string()));
    }
    Ok(url.to_string())
}

/// Renders a bit prefix back in its dotted configuration form.
pub fn dotted(prefix: &[u8]) -> String {
    let mut out = String::with_capacity(2 * prefix.len() + 1);
    for bit in prefix {
        out.push((b'0' + bit) as char);
        out.push('.');
    }
    out.push('*');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix() {
        assert_eq!(parse_prefix("*"), Ok(vec![]));
        assert_eq!(parse_prefix("0.*"), Ok(vec![0]));
        assert_eq!(parse_prefix("1.0.1.*"), Ok(vec![1, 0, 1]));

        let twenty = "1.".repeat(20) + "*";
        assert_eq!(parse_prefix(&twenty), Ok(vec![1; 20]));

        let twenty_one = "1.".repeat(21) + "*";
        assert!(parse_prefix(&twenty_one).is_err());

        assert!(parse_prefix("").is_err());
        assert!(parse_prefix("0*").is_err());
        assert!(parse_prefix("0.1").is_err());
        assert!(parse_prefix("2.*").is_err());
        assert!(parse_prefix("0..*").is_err());
    }

    #[test]
    fn test_parse_server_url() {
        assert_eq!(
            parse_server_url("http://a:8001/"),
            Ok("http://a:8001/".to_string())
        );
        // Normalization adds the root path.
        assert_eq!(
            parse_server_url("http://a:8001"),
            Ok("http://a:8001/".to_string())
        );
        assert_eq!(
            parse_server_url("https://a:8001/"),
            Err(RouteParseError::BadScheme("https://a:8001/".to_string()))
        );
        assert!(parse_server_url("not a url").is_err());
        assert!(parse_server_url("/relative/path").is_err());
    }

    #[test]
    fn test_dotted() {
        assert_eq!(dotted(&[]), "*");
        assert_eq!(dotted(&[0]), "0.*");
        assert_eq!(dotted(&[1, 0]), "1.0.*");
    }
}
