use super::util::{has_header, host_header_value, proto_str};

/// Estimate bytes sent for an HTTP request.
///
/// Counts HTTP/1.1 framing (request line, headers, CRLF, body) with Host and
/// Content-Length made explicit when missing. HTTP/2 header compression is not
/// modelled, so h2 traffic is overestimated.
pub(super) fn request_bytes(
    method: &http::Method,
    parsed: &url::Url,
    headers: &[(String, String)],
    body_len: u64,
) -> u64 {
    let mut path = parsed.path().to_string();
    if let Some(q) = parsed.query() {
        path.push('?');
        path.push_str(q);
    }

    // "METHOD SP path SP HTTP/1.1 CRLF"
    let mut bytes = (method.as_str().len() + 1 + path.len() + 1 + "HTTP/1.1".len() + 2) as u64;

    for (k, v) in headers {
        bytes = bytes.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()));
    }

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(parsed)
    {
        bytes = bytes.saturating_add(header_bytes(b"host", host.as_bytes()));
    }

    if body_len != 0 && !has_header(headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_bytes(b"content-length", v.as_bytes()));
    }

    bytes.saturating_add(2).saturating_add(body_len)
}

pub(super) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    // "HTTP/1.1 SP 200 CRLF", reason phrase ignored.
    let status_line = (proto_str(version).len() + 1 + status.as_str().len() + 2) as u64;

    headers
        .iter()
        .fold(status_line, |acc, (name, value)| {
            acc.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()))
        })
        .saturating_add(2)
}

fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() + 2 + value.len() + 2) as u64
}
