//! The response writer capability set handlers write through.

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use std::io;

/// Destination of a response.
///
/// Headers may be mutated until the response is committed, either by an
/// explicit [`write_header`](ResponseWriter::write_header) or implicitly with
/// `200 OK` by the first body write. Commits after the first are ignored.
pub trait ResponseWriter: io::Write {
    /// Response headers.
    fn headers(&self) -> &HeaderMap;

    /// Response headers, for mutation before commit.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line and headers.
    fn write_header(&mut self, status: StatusCode);

    /// Server push, when the underlying connection supports it.
    fn pusher(&mut self) -> Option<&mut dyn Push> {
        None
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        (**self).pusher()
    }
}

/// Optional server push capability.
pub trait Push {
    /// Initiates a push of `target` with the given options.
    fn push(&mut self, target: &str, opts: Option<PushOptions>) -> io::Result<()>;
}

/// Options of a pushed request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOptions {
    /// Method of the promised request, `GET` when unset.
    pub method: Option<Method>,
    /// Headers of the promised request.
    pub headers: Option<HeaderMap>,
}

impl PushOptions {
    /// Ensures the promised request asks for gzip.
    ///
    /// Missing options or a missing header map are created; an absent or
    /// empty Accept-Encoding gets exactly one `gzip` entry. A non-empty
    /// Accept-Encoding set by the caller is left untouched.
    pub fn prefer_gzip(opts: Option<PushOptions>) -> PushOptions {
        let mut opts = opts.unwrap_or_default();
        let headers = opts.headers.get_or_insert_with(HeaderMap::new);
        let has_value = headers
            .get(header::ACCEPT_ENCODING)
            .is_some_and(|v| !v.is_empty());
        if !has_value {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        }
        opts
    }
}

/// An in-memory [`ResponseWriter`].
///
/// Records the status, the headers as they were at commit time, every body
/// write, flushes and pushes. [`HandlerService`](crate::HandlerService) uses
/// it to buffer responses.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    headers: HeaderMap,
    status: Option<StatusCode>,
    committed_headers: Option<HeaderMap>,
    chunks: Vec<Bytes>,
    flushes: usize,
    pushes: Option<Vec<(String, PushOptions)>>,
    fail_writes: bool,
}

impl ResponseRecorder {
    /// Creates an empty recorder without push support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the push capability; pushes are recorded.
    pub fn with_push(mut self) -> Self {
        self.pushes = Some(Vec::new());
        self
    }

    /// Makes every body write fail as if the client went away.
    #[cfg(test)]
    pub(crate) fn failing(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Committed status, `200 OK` if nothing was committed.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Returns true once the response was committed.
    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    /// Headers as sent on commit, or the live headers if never committed.
    pub fn committed_headers(&self) -> &HeaderMap {
        self.committed_headers.as_ref().unwrap_or(&self.headers)
    }

    /// Every body write, in order.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// The whole body.
    pub fn body(&self) -> Bytes {
        let mut body = BytesMut::new();
        for chunk in &self.chunks {
            body.extend_from_slice(chunk);
        }
        body.freeze()
    }

    /// Number of flushes.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Recorded pushes, `None` when push is not supported.
    pub fn pushes(&self) -> Option<&[(String, PushOptions)]> {
        self.pushes.as_deref()
    }

    /// Converts the recording into an [`http::Response`].
    pub fn into_response(self) -> http::Response<Bytes> {
        let status = self.status();
        let body = self.body();
        let headers = self.committed_headers.unwrap_or(self.headers);

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client disconnected",
            ));
        }
        self.write_header(StatusCode::OK);
        if !buf.is_empty() {
            self.chunks.push(Bytes::copy_from_slice(buf));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_header(StatusCode::OK);
        self.flushes += 1;
        Ok(())
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
            self.committed_headers = Some(self.headers.clone());
        }
    }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        if self.pushes.is_some() {
            Some(self as &mut dyn Push)
        } else {
            None
        }
    }
}

impl Push for ResponseRecorder {
    fn push(&mut self, target: &str, opts: Option<PushOptions>) -> io::Result<()> {
        let pushes = self
            .pushes
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "push not supported"))?;
        pushes.push((target.to_owned(), opts.unwrap_or_default()));
        Ok(())
    }
}
