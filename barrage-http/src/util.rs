pub(crate) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(crate) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Protocol string as reported on responses and in the `proto` tag.
pub fn proto_str(version: http::Version) -> &'static str {
    match version {
        http::Version::HTTP_09 => "HTTP/0.9",
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2.0",
        http::Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

pub(crate) fn parse_http_url(raw: &str) -> crate::Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|_| crate::Error::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(crate::Error::UnsupportedScheme(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_strings_match_wire_names() {
        assert_eq!(proto_str(http::Version::HTTP_11), "HTTP/1.1");
        assert_eq!(proto_str(http::Version::HTTP_2), "HTTP/2.0");
    }

    #[test]
    fn host_header_keeps_explicit_port() {
        let u = url::Url::parse("http://localhost:8000/x").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost:8000"));
        // Default ports are normalized away by the url crate.
        let u = url::Url::parse("http://localhost:80/x").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(host_header_value(&u).as_deref(), Some("localhost"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            parse_http_url("ftp://example.com/"),
            Err(crate::Error::UnsupportedScheme(_))
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(crate::Error::InvalidUrl(_))
        ));
        assert!(parse_http_url("https://example.com/").is_ok());
    }
}
