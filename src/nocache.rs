use crate::handler::Handler;
use crate::writer::ResponseWriter;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::Request;

/// Response headers that disable caching by browsers and proxies.
pub const NO_CACHE_HEADERS: [(&str, &str); 4] = [
    ("expires", "Thu, 01 Jan 1970 00:00:00 UTC"),
    (
        "cache-control",
        "no-cache, no-store, no-transform, must-revalidate, private, max-age=0",
    ),
    ("pragma", "no-cache"),
    ("x-accel-expires", "0"),
];

/// Request headers that could get a cached representation served.
const ETAG_HEADERS: [HeaderName; 6] = [
    header::ETAG,
    header::IF_MODIFIED_SINCE,
    header::IF_MATCH,
    header::IF_NONE_MATCH,
    header::IF_RANGE,
    header::IF_UNMODIFIED_SINCE,
];

/// Marks every response as uncacheable.
///
/// The inner handler sees the request without its ETag and conditional
/// headers, so it always renders a full response.
#[derive(Debug, Clone)]
pub struct NoCache<H> {
    inner: H,
}

impl<H> NoCache<H> {
    /// Wraps `inner`.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H: Handler> Handler for NoCache<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        let headers = w.headers_mut();
        for (name, value) in NO_CACHE_HEADERS {
            headers.insert(name, HeaderValue::from_static(value));
        }

        if !ETAG_HEADERS.iter().any(|name| req.headers().contains_key(name)) {
            return self.inner.serve(w, req);
        }

        let mut stripped = Request::new(req.body().clone());
        *stripped.method_mut() = req.method().clone();
        *stripped.uri_mut() = req.uri().clone();
        *stripped.version_mut() = req.version();
        *stripped.headers_mut() = req.headers().clone();
        *stripped.extensions_mut() = req.extensions().clone();
        for name in &ETAG_HEADERS {
            stripped.headers_mut().remove(name);
        }
        self.inner.serve(w, &stripped);
    }
}
