//! Request validation helpers.
//!
//! Each helper commits an error status on the writer when the request is
//! rejected and returns the matching [`Error::Http`].

use crate::error::{Error, Result};
use crate::writer::ResponseWriter;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, Request, StatusCode};

/// The media type accepted by [`require_json_body`].
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Returns the whitespace-trimmed JSON body of `req`.
///
/// Rejects with 415 when the Content-Type is not JSON and with 400 when the
/// body is too short to hold a JSON object or array.
pub fn require_json_body(w: &mut dyn ResponseWriter, req: &Request<Bytes>) -> Result<Bytes> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with(CONTENT_TYPE_JSON) {
        return Err(reject(
            w,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!(
                "unsupported content type {content_type}, only {CONTENT_TYPE_JSON} is supported"
            ),
        ));
    }

    let body = trim(req.body());
    if body.len() < 3 {
        return Err(reject(w, StatusCode::BAD_REQUEST, "request body is required"));
    }
    if body[0] != b'{' && body[0] != b'[' {
        return Err(reject(
            w,
            StatusCode::BAD_REQUEST,
            "request body should contain a JSON Object `{}` or `[]`",
        ));
    }
    Ok(body)
}

/// Rejects requests whose method is not in `methods` with 405 and an
/// `Allow` header.
pub fn allow_methods(
    methods: &[Method],
    w: &mut dyn ResponseWriter,
    req: &Request<Bytes>,
) -> Result<()> {
    if methods.contains(req.method()) {
        return Ok(());
    }

    let joined = methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(",");
    if let Ok(value) = HeaderValue::from_str(&joined) {
        w.headers_mut().append(header::ALLOW, value);
    }
    Err(reject(
        w,
        StatusCode::METHOD_NOT_ALLOWED,
        format!("invalid method {} only {joined} requests are allowed", req.method()),
    ))
}

fn reject(w: &mut dyn ResponseWriter, status: StatusCode, message: impl Into<String>) -> Error {
    w.write_header(status);
    Error::http(status, message)
}

fn trim(body: &Bytes) -> Bytes {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let end = body
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    body.slice(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ResponseRecorder;

    fn json_request(content_type: &str, body: &'static str) -> Request<Bytes> {
        Request::builder()
            .method(Method::POST)
            .header(header::CONTENT_TYPE, content_type)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    #[test]
    fn test_require_json_body() {
        let mut w = ResponseRecorder::new();
        let req = json_request("application/json; charset=utf-8", "  {\"a\": 1}\n");
        let body = require_json_body(&mut w, &req).unwrap();
        assert_eq!(body, "{\"a\": 1}");
        assert!(!w.is_committed());
    }

    #[test]
    fn test_require_json_body_wrong_content_type() {
        let mut w = ResponseRecorder::new();
        let err = require_json_body(&mut w, &json_request("text/plain", "{}")).unwrap_err();
        assert_eq!(w.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(err.is(StatusCode::UNSUPPORTED_MEDIA_TYPE));
    }

    #[test]
    fn test_require_json_body_too_short() {
        let mut w = ResponseRecorder::new();
        let err = require_json_body(&mut w, &json_request("application/json", " {} ")).unwrap_err();
        assert_eq!(w.status(), StatusCode::BAD_REQUEST);
        assert!(err.is_bad_request());
        assert_eq!(err.body(), Some("request body is required"));
    }

    #[test]
    fn test_require_json_body_not_object_or_array() {
        let mut w = ResponseRecorder::new();
        let err =
            require_json_body(&mut w, &json_request("application/json", "\"text\"")).unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_allow_methods() {
        let methods = [Method::GET, Method::HEAD];

        let mut w = ResponseRecorder::new();
        let req = Request::new(Bytes::new());
        allow_methods(&methods, &mut w, &req).unwrap();
        assert!(!w.is_committed());

        let mut w = ResponseRecorder::new();
        let req = json_request("application/json", "{}");
        let err = allow_methods(&methods, &mut w, &req).unwrap_err();
        assert_eq!(w.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(w.committed_headers().get(header::ALLOW).unwrap(), "GET,HEAD");
        assert_eq!(
            err.to_string(),
            "[405] invalid method POST only GET,HEAD requests are allowed"
        );
    }

    #[test]
    fn test_trim() {
        assert_eq!(trim(&Bytes::from_static(b" \t\r\n")), "");
        assert_eq!(trim(&Bytes::from_static(b" [1] ")), "[1]");
    }
}
