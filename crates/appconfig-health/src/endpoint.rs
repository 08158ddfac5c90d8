//! Configuration-service endpoint addresses.

use std::fmt;

use http::Uri;

use crate::error::ConstructionError;

/// A validated `http`/`https` address of a configuration-service instance.
///
/// Equality and hashing use the parsed URI, so the same address always maps
/// to the same cached client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    uri: Uri,
}

impl Endpoint {
    /// Parse and validate an endpoint address. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, ConstructionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConstructionError::invalid("endpoint", "must not be empty"));
        }

        let uri: Uri = trimmed
            .parse()
            .map_err(|e| ConstructionError::invalid("endpoint", format!("{trimmed}: {e}")))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => {
                return Err(ConstructionError::invalid(
                    "endpoint",
                    format!("unsupported scheme `{other}`"),
                ));
            }
            None => {
                return Err(ConstructionError::invalid(
                    "endpoint",
                    format!("{trimmed}: missing scheme"),
                ));
            }
        }

        if uri.host().is_none_or(str::is_empty) {
            return Err(ConstructionError::invalid(
                "endpoint",
                format!("{trimmed}: missing host"),
            ));
        }

        Ok(Self { uri })
    }

    /// Whether reads go over TLS.
    pub fn is_https(&self) -> bool {
        self.uri.scheme_str() == Some("https")
    }

    /// Host as written in the URI; IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        self.uri.host().unwrap_or_default()
    }

    /// Host for socket lookup and TLS server names, without IPv6 brackets.
    pub fn connect_host(&self) -> &str {
        let host = self.host();
        host.strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host)
    }

    /// Explicit port, or the scheme default.
    pub fn port(&self) -> u16 {
        self.uri
            .port_u16()
            .unwrap_or(if self.is_https() { 443 } else { 80 })
    }

    /// Value for the `Host` header; omits default ports.
    pub fn authority(&self) -> String {
        match self.uri.port_u16() {
            Some(port) => format!("{}:{port}", self.host()),
            None => self.host().to_string(),
        }
    }

    /// Path prefix without a trailing slash (`""` for a bare host).
    pub fn base_path(&self) -> &str {
        self.uri.path().trim_end_matches('/')
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_endpoint() {
        let ep = Endpoint::parse("https://demo.azconfig.io").unwrap();
        assert!(ep.is_https());
        assert_eq!(ep.host(), "demo.azconfig.io");
        assert_eq!(ep.port(), 443);
        assert_eq!(ep.authority(), "demo.azconfig.io");
        assert_eq!(ep.base_path(), "");
    }

    #[test]
    fn parses_http_endpoint_with_port_and_path() {
        let ep = Endpoint::parse(" http://localhost:8080/config/ ").unwrap();
        assert!(!ep.is_https());
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.authority(), "localhost:8080");
        assert_eq!(ep.base_path(), "/config");
    }

    #[test]
    fn ipv6_literal_strips_brackets_for_connect() {
        let ep = Endpoint::parse("http://[::1]:8080").unwrap();
        assert_eq!(ep.host(), "[::1]");
        assert_eq!(ep.connect_host(), "::1");
        assert_eq!(ep.authority(), "[::1]:8080");

        let tls = Endpoint::parse("https://[2001:db8::1]").unwrap();
        assert_eq!(tls.connect_host(), "2001:db8::1");
        assert_eq!(tls.port(), 443);
        assert_eq!(tls.authority(), "[2001:db8::1]");
    }

    #[test]
    fn rejects_empty_endpoint() {
        let err = Endpoint::parse("   ").unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::InvalidArgument { name: "endpoint", .. }
        ));
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(Endpoint::parse("ftp://demo.azconfig.io").is_err());
    }

    #[test]
    fn rejects_relative_reference() {
        assert!(Endpoint::parse("demo.azconfig.io/kv").is_err());
    }

    #[test]
    fn equal_addresses_are_equal_endpoints() {
        let a = Endpoint::parse("http://localhost").unwrap();
        let b = Endpoint::parse("http://localhost").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Endpoint::parse("http://localhost:81").unwrap());
    }
}
