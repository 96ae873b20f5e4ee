use crate::handler::Handler;
use crate::json::json_error;
use crate::writer::{Push, ResponseWriter};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};

/// Renders the response for a recovered panic: writer, message, status code
/// and extra headers. [`json_error`] has this shape.
pub type PanicRenderer = fn(&mut dyn ResponseWriter, &str, u16, &[HeaderMap]);

/// Turns panics of the inner handler into 500 responses.
///
/// The panic is logged and rendered through the [`PanicRenderer`]. If the
/// handler already committed a status, that status stands and only the
/// rendered body is appended.
#[derive(Debug, Clone)]
pub struct Recover<H> {
    inner: H,
    render: PanicRenderer,
}

impl<H> Recover<H> {
    /// Wraps `inner`, rendering panics as JSON errors.
    pub fn new(inner: H) -> Self {
        Self::with_renderer(inner, json_error)
    }

    /// Wraps `inner`, rendering panics with `render`.
    pub fn with_renderer(inner: H, render: PanicRenderer) -> Self {
        Self { inner, render }
    }
}

impl<H: Handler> Handler for Recover<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        let mut w = CommitOnce::new(w);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.inner.serve(&mut w, req)));

        if let Err(payload) = result {
            tracing::error!(
                method = %req.method(),
                path = req.uri().path(),
                panic = panic_message(payload.as_ref()),
                "recovered from panic"
            );
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (self.render)(
                &mut w,
                status.canonical_reason().unwrap_or_default(),
                status.as_u16(),
                &[],
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

/// Forwards to the wrapped writer, committing the status at most once.
struct CommitOnce<'a> {
    inner: &'a mut dyn ResponseWriter,
    committed: bool,
}

impl<'a> CommitOnce<'a> {
    fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            committed: false,
        }
    }
}

impl io::Write for CommitOnce<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.committed = true;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.committed = true;
        self.inner.flush()
    }
}

impl ResponseWriter for CommitOnce<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if !self.committed {
            self.committed = true;
            self.inner.write_header(status);
        }
    }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        self.inner.pusher()
    }
}
