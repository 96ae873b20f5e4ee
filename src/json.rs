//! JSON response helpers.

use crate::writer::ResponseWriter;
use http::StatusCode;
use http::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use std::io::Write;

/// Content type of every JSON response written here.
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    code: u16,
}

fn set_json_headers(w: &mut dyn ResponseWriter) {
    let headers = w.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
}

/// Writes `data` as a JSON response with the given status.
///
/// Encoding or write failures happen after the status is committed, so they
/// are only logged.
pub fn json<T: Serialize + ?Sized>(w: &mut dyn ResponseWriter, data: &T, status: StatusCode) {
    set_json_headers(w);
    w.write_header(status);

    let result = serde_json::to_vec(data)
        .map_err(crate::Error::from)
        .and_then(|mut body| {
            body.push(b'\n');
            w.write_all(&body).map_err(crate::Error::from)
        });
    if let Err(err) = result {
        tracing::error!(error = %err, "write json body to response");
    }
}

/// Writes `{"message":..,"code":..}` as the response.
///
/// Every header of `extra_headers` is appended first. The status is `code`
/// when it is a valid status code and 500 otherwise; the body always carries
/// `code` as given.
pub fn json_error(
    w: &mut dyn ResponseWriter,
    message: &str,
    code: u16,
    extra_headers: &[HeaderMap],
) {
    let headers = w.headers_mut();
    for extra in extra_headers {
        for (name, value) in extra {
            headers.append(name, value.clone());
        }
    }
    set_json_headers(w);

    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json(w, &ErrorBody { message, code }, status);
}
