//! Response construction against a configured resource set.

use std::collections::HashMap;
use std::io::Write;

use bytes::Bytes;

use crate::parser::{Method, RequestLine};

const NOT_FOUND_BODY: &[u8] = b"404 Not Found\n";
const NOT_IMPLEMENTED_BODY: &[u8] = b"501 Not Implemented\n";
const BAD_REQUEST_BODY: &[u8] = b"400 Bad Request\n";
const TEXT_PLAIN: &str = "text/plain";

#[derive(Debug, Clone)]
struct Resource {
    content_type: String,
    body: Bytes,
}

/// The resource set the GET handler resolves paths against.
///
/// Lookups are exact-match; anything else is a 404.
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    resources: HashMap<String, Resource>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource at an exact path.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<Bytes>,
    ) {
        self.resources.insert(
            path.into(),
            Resource {
                content_type: content_type.into(),
                body: body.into(),
            },
        );
    }

    /// Map a parsed request to a response.
    ///
    /// The plan owns everything it needs (bodies are cheaply cloned
    /// `Bytes`), so the borrow of the read buffer ends here and the
    /// buffer is free to be rendered into.
    pub(crate) fn plan(&self, request: &RequestLine<'_>) -> ResponsePlan {
        match request.method {
            Method::Get => match self.resources.get(request.path) {
                Some(resource) => ResponsePlan {
                    status: 200,
                    reason: "OK",
                    content_type: resource.content_type.clone(),
                    body: resource.body.clone(),
                },
                None => ResponsePlan::not_found(),
            },
            Method::Other => ResponsePlan::not_implemented(),
        }
    }
}

/// A fully decided response, ready to render as one contiguous byte
/// sequence for a single write intent.
#[derive(Debug)]
pub(crate) struct ResponsePlan {
    status: u16,
    reason: &'static str,
    content_type: String,
    body: Bytes,
}

impl ResponsePlan {
    pub fn not_found() -> Self {
        ResponsePlan {
            status: 404,
            reason: "Not Found",
            content_type: TEXT_PLAIN.to_string(),
            body: Bytes::from_static(NOT_FOUND_BODY),
        }
    }

    pub fn not_implemented() -> Self {
        ResponsePlan {
            status: 501,
            reason: "Not Implemented",
            content_type: TEXT_PLAIN.to_string(),
            body: Bytes::from_static(NOT_IMPLEMENTED_BODY),
        }
    }

    /// Fixed response for requests the parser rejected.
    pub fn bad_request() -> Self {
        ResponsePlan {
            status: 400,
            reason: "Bad Request",
            content_type: TEXT_PLAIN.to_string(),
            body: Bytes::from_static(BAD_REQUEST_BODY),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Render into `out`, replacing its contents. `Content-Length` is the
    /// exact byte length of the body; `Connection: close` states the
    /// close-after-response policy on the wire.
    pub fn render(&self, out: &mut Vec<u8>) {
        out.clear();
        // Writing to a Vec cannot fail.
        let _ = write!(
            out,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        out.extend_from_slice(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_request_line;

    fn sample_set() -> ResourceSet {
        let mut set = ResourceSet::new();
        set.insert("/index.html", "text/html", "<h1>hi</h1>");
        set
    }

    fn plan_for(set: &ResourceSet, raw: &[u8]) -> ResponsePlan {
        set.plan(&parse_request_line(raw).unwrap())
    }

    fn rendered(plan: &ResponsePlan) -> String {
        let mut out = Vec::new();
        plan.render(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn known_path_gets_200_with_exact_content_length() {
        let plan = plan_for(&sample_set(), b"GET /index.html HTTP/1.1\r\n");
        assert_eq!(plan.status(), 200);

        let text = rendered(&plan);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", "<h1>hi</h1>".len())));
        assert!(text.ends_with("<h1>hi</h1>"));
    }

    #[test]
    fn unknown_path_gets_404_fixed_body() {
        let plan = plan_for(&sample_set(), b"GET /missing HTTP/1.1\r\n");
        assert_eq!(plan.status(), 404);

        let text = rendered(&plan);
        assert!(text.contains(&format!("Content-Length: {}\r\n", NOT_FOUND_BODY.len())));
        assert!(text.ends_with("404 Not Found\n"));
    }

    #[test]
    fn non_get_gets_501() {
        let plan = plan_for(&sample_set(), b"POST /index.html HTTP/1.1\r\n");
        assert_eq!(plan.status(), 501);
        assert!(rendered(&plan).ends_with("501 Not Implemented\n"));
    }

    #[test]
    fn render_replaces_existing_buffer_contents() {
        let plan = ResponsePlan::bad_request();
        let mut buf = vec![0xAAu8; 8192];
        plan.render(&mut buf);

        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.ends_with("400 Bad Request\n"));
    }

    #[test]
    fn body_declared_length_matches_rendered_tail() {
        let mut set = ResourceSet::new();
        let body = vec![7u8; 3000];
        set.insert("/blob", "application/octet-stream", body.clone());

        let plan = plan_for(&set, b"GET /blob\r\n");
        let mut out = Vec::new();
        plan.render(&mut out);

        let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(&out[split..], &body[..]);
    }
}
