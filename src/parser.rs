//! HTTP request-line parsing.
//!
//! Only the first line of the read buffer is interpreted: header lines
//! and body bytes present in the same read are left in the buffer and
//! ignored. That is a scope cut, not an accident.

use thiserror::Error;

/// Bound on the request-line scan. A buffer whose first CRLF falls
/// beyond this many bytes is malformed.
pub const MAX_REQUEST_LINE: usize = 1024;

/// Why a read buffer failed to yield a request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no CRLF within the first {MAX_REQUEST_LINE} bytes")]
    MissingCrlf,
    #[error("request line missing method or path")]
    MissingToken,
    #[error("request path is not valid UTF-8")]
    PathEncoding,
}

/// Request method, pre-dispatched: GET routes to the path handler,
/// everything else to the unimplemented-method handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Other,
}

/// A parsed request line. Transient: borrows the read buffer and is
/// dropped once a response has been planned.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: Method,
    pub path: &'a str,
}

/// Extract method and path from the first line of `buf`.
///
/// Scans for CRLF within `min(buf.len(), MAX_REQUEST_LINE)` bytes, then
/// tokenizes on spaces: first token is the method (case-insensitive),
/// second is the path, anything after (protocol version) is ignored.
pub fn parse_request_line(buf: &[u8]) -> Result<RequestLine<'_>, ParseError> {
    // Zero-length reads close the connection one level up.
    debug_assert!(!buf.is_empty(), "empty buffer must not reach the parser");

    let window = &buf[..buf.len().min(MAX_REQUEST_LINE)];
    let end = window
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(ParseError::MissingCrlf)?;

    let mut tokens = window[..end].split(|&b| b == b' ').filter(|t| !t.is_empty());
    let method_token = tokens.next().ok_or(ParseError::MissingToken)?;
    let path_token = tokens.next().ok_or(ParseError::MissingToken)?;

    let method = if method_token.eq_ignore_ascii_case(b"GET") {
        Method::Get
    } else {
        Method::Other
    };
    let path = std::str::from_utf8(path_token).map_err(|_| ParseError::PathEncoding)?;

    Ok(RequestLine { method, path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_request_extracts_method_and_path() {
        let buf = b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n";
        let line = parse_request_line(buf).unwrap();
        assert_eq!(line.method, Method::Get);
        assert_eq!(line.path, "/index.html");
    }

    #[test]
    fn version_token_is_ignored() {
        let with = parse_request_line(b"GET /a HTTP/1.0\r\n").unwrap();
        let without = parse_request_line(b"GET /a\r\n").unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn method_is_case_insensitive() {
        for raw in [&b"GET /x\r\n"[..], b"get /x\r\n", b"GeT /x\r\n"] {
            assert_eq!(parse_request_line(raw).unwrap().method, Method::Get);
        }
    }

    #[test]
    fn unknown_methods_route_to_other() {
        for raw in [&b"POST /x HTTP/1.1\r\n"[..], b"DELETE /x\r\n", b"BREW /x\r\n"] {
            assert_eq!(parse_request_line(raw).unwrap().method, Method::Other);
        }
    }

    #[test]
    fn no_crlf_within_bound_is_malformed() {
        let buf = vec![b'a'; 4096];
        assert_eq!(parse_request_line(&buf), Err(ParseError::MissingCrlf));
    }

    #[test]
    fn crlf_just_past_bound_is_malformed() {
        // Line body fills the whole window; the CRLF lands at 1024..1026.
        let mut buf = vec![b'a'; MAX_REQUEST_LINE];
        buf.extend_from_slice(b"\r\n");
        assert_eq!(parse_request_line(&buf), Err(ParseError::MissingCrlf));
    }

    #[test]
    fn crlf_at_window_edge_parses() {
        // "GET " + path padding so that CRLF ends exactly at the bound.
        let mut buf = b"GET /".to_vec();
        buf.resize(MAX_REQUEST_LINE - 2, b'a');
        buf.extend_from_slice(b"\r\n");
        assert!(parse_request_line(&buf).is_ok());
    }

    #[test]
    fn short_buffer_without_crlf_is_malformed() {
        assert_eq!(parse_request_line(b"GET"), Err(ParseError::MissingCrlf));
        assert_eq!(parse_request_line(b"G"), Err(ParseError::MissingCrlf));
    }

    #[test]
    fn missing_path_is_malformed() {
        assert_eq!(parse_request_line(b"GET\r\n"), Err(ParseError::MissingToken));
        assert_eq!(parse_request_line(b"\r\n"), Err(ParseError::MissingToken));
    }

    #[test]
    fn repeated_spaces_between_tokens_are_collapsed() {
        let line = parse_request_line(b"GET   /x   HTTP/1.1\r\n").unwrap();
        assert_eq!(line.path, "/x");
    }

    #[test]
    fn non_utf8_path_is_malformed() {
        assert_eq!(
            parse_request_line(b"GET /\xff\xfe\r\n"),
            Err(ParseError::PathEncoding)
        );
    }
}
