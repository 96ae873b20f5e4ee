use crate::config::AppInfo;
use crate::handler::Handler;
use crate::json::json;
use crate::writer::{Push, ResponseWriter};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use std::io;
use std::time::Instant;

/// Logs one line per request with its status, size and duration.
///
/// Each request runs inside an `info_span!` carrying the application name,
/// method and path. Requests for `{base_path}/audit/info` are answered with
/// the [`AppInfo`] itself. Content-Length is never consulted: compressed
/// and streaming responses do not carry one.
#[derive(Debug, Clone)]
pub struct Audit<H> {
    inner: H,
    app: AppInfo,
    info_path: String,
    dump_bodies: bool,
}

impl<H> Audit<H> {
    /// Wraps `inner`, tagging log lines with `app`.
    pub fn new(app: AppInfo, inner: H) -> Self {
        let info_path = format!("{}/audit/info", app.base_path.trim_end_matches('/'));
        Self {
            inner,
            app,
            info_path,
            dump_bodies: false,
        }
    }

    /// Also logs request and response bodies at debug level.
    pub fn dump_bodies(mut self, enabled: bool) -> Self {
        self.dump_bodies = enabled;
        self
    }
}

impl<H: Handler> Handler for Audit<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        let span = tracing::info_span!(
            "request",
            app = %self.app.name,
            method = %req.method(),
            path = req.uri().path(),
        );
        let _enter = span.enter();

        if req.uri().path().starts_with(&self.info_path) {
            return json(w, &self.app, StatusCode::OK);
        }

        if self.dump_bodies {
            tracing::debug!(
                headers = ?req.headers(),
                body = %String::from_utf8_lossy(req.body()),
                "request {} {}",
                req.method(),
                req.uri()
            );
        }

        let start = Instant::now();
        let mut observed = Observer::new(w, self.dump_bodies);
        self.inner.serve(&mut observed, req);
        let elapsed = start.elapsed();

        let status = observed.status.unwrap_or(StatusCode::OK);
        tracing::info!(
            status = status.as_u16(),
            bytes = observed.bytes,
            ?elapsed,
            "{} {}",
            req.method(),
            req.uri().path()
        );
        if let Some(body) = &observed.body {
            tracing::debug!(
                status = status.as_u16(),
                headers = ?observed.headers(),
                body = %String::from_utf8_lossy(body),
                "response [{}] {} {}",
                status.as_u16(),
                req.method(),
                req.uri()
            );
        }
    }
}

/// Records what goes through a writer.
struct Observer<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
    bytes: u64,
    body: Option<Vec<u8>>,
}

impl<'a> Observer<'a> {
    fn new(inner: &'a mut dyn ResponseWriter, capture_body: bool) -> Self {
        Self {
            inner,
            status: None,
            bytes: 0,
            body: capture_body.then(Vec::new),
        }
    }
}

impl io::Write for Observer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        if let Some(body) = self.body.as_mut() {
            body.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ResponseWriter for Observer<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
        self.inner.write_header(status);
    }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        self.inner.pusher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::writer::ResponseRecorder;
    use serde_json::Value;
    use std::io::Write;

    fn app() -> AppInfo {
        AppInfo {
            name: "api".into(),
            version: "1.2.3".into(),
            base_path: "/v1/".into(),
        }
    }

    #[test]
    fn test_observer_tracks_status_and_bytes() {
        let mut w = ResponseRecorder::new();
        let mut observed = Observer::new(&mut w, true);
        observed.write_header(StatusCode::NOT_FOUND);
        observed.write_header(StatusCode::OK);
        observed.write_all(b"missing").unwrap();

        assert_eq!(observed.status, Some(StatusCode::NOT_FOUND));
        assert_eq!(observed.bytes, 7);
        assert_eq!(observed.body.as_deref(), Some(&b"missing"[..]));
    }

    #[test]
    fn test_implicit_status() {
        let mut w = ResponseRecorder::new();
        let mut observed = Observer::new(&mut w, false);
        observed.write_all(b"ok").unwrap();
        assert_eq!(observed.status, Some(StatusCode::OK));
        assert!(observed.body.is_none());
    }

    #[test]
    fn test_delegates() {
        let handler = Audit::new(
            app(),
            handler_fn(|w, _req| {
                w.write_header(StatusCode::CREATED);
                w.write_all(b"made").unwrap();
            }),
        )
        .dump_bodies(true);

        let mut w = ResponseRecorder::new();
        handler.serve(&mut w, &Request::new(Bytes::new()));
        assert_eq!(w.status(), StatusCode::CREATED);
        assert_eq!(w.body(), "made");
    }

    #[test]
    fn test_info_endpoint() {
        let handler = Audit::new(app(), handler_fn(|_w, _req| panic!("not reached")));

        let req = Request::builder()
            .uri("/v1/audit/info")
            .body(Bytes::new())
            .unwrap();
        let mut w = ResponseRecorder::new();
        handler.serve(&mut w, &req);

        let body: Value = serde_json::from_slice(&w.body()).unwrap();
        assert_eq!(body["name"], "api");
        assert_eq!(body["version"], "1.2.3");
    }
}
