//! The compressing response writer.

use crate::encoding::{self, Encoding};
use crate::pool::PooledCodec;
use crate::sniff;
use crate::writer::{Push, PushOptions, ResponseWriter};
use http::StatusCode;
use http::header::{self, HeaderMap, HeaderValue};
use std::io;

/// Media type of server-sent events.
const EVENT_STREAM: &str = "text/event-stream";

/// What the writer does with body bytes, decided on the first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing written yet.
    Undecided,
    /// Bytes go through the codec.
    Compress,
    /// Bytes go straight to the original writer.
    Stream,
}

/// Returns true for responses that must reach the client unbuffered:
/// server-sent events and explicitly chunked transfers.
pub fn is_streaming_response(headers: &HeaderMap) -> bool {
    let event_stream = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains(EVENT_STREAM));
    let chunked = headers
        .get(header::TRANSFER_ENCODING)
        .is_some_and(|te| te == "chunked");
    event_stream || chunked
}

/// A [`ResponseWriter`] that compresses the body into the writer it wraps.
///
/// Creating one announces the encoding (Content-Encoding, Vary). The status
/// line is held back until the first byte reaches the wrapped writer, so the
/// streaming decision and sniffed Content-Type are in the committed headers.
/// Content-Length is always dropped before commit since the final size is
/// unknown.
///
/// The first non-empty write settles the [`Verdict`] for good. A streaming
/// verdict withdraws the announced encoding, parks the codec in discard mode
/// and forwards every byte unchanged.
pub struct CompressWriter<W> {
    inner: W,
    encoding: Encoding,
    codec: Option<PooledCodec>,
    vary_added: bool,
    verdict: Verdict,
    status: Option<StatusCode>,
    committed: bool,
}

impl<W: ResponseWriter> CompressWriter<W> {
    /// Wraps `inner`, announcing `encoding` and pointing `codec` at it.
    pub fn new(mut inner: W, encoding: Encoding, mut codec: PooledCodec) -> Self {
        let vary_added = encoding::announce(inner.headers_mut(), encoding);
        codec.reset();
        Self {
            inner,
            encoding,
            codec: Some(codec),
            vary_added,
            verdict: Verdict::Undecided,
            status: None,
            committed: false,
        }
    }

    /// The negotiated encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The current verdict.
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// Returns true once the response turned out to be streaming.
    pub fn is_streaming(&self) -> bool {
        self.verdict == Verdict::Stream
    }

    /// Returns true once the wrapped writer has been committed.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Returns a reference to the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Returns a mutable reference to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Commits the wrapped writer with the requested status, once.
    ///
    /// A status that forbids a body withdraws the announced encoding when
    /// nothing was written yet.
    pub fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        let status = self.status.unwrap_or(StatusCode::OK);
        if self.verdict == Verdict::Undecided && forbids_body(status) {
            encoding::revert(self.inner.headers_mut(), self.vary_added);
            self.codec = None;
        }
        self.inner.headers_mut().remove(header::CONTENT_LENGTH);
        self.inner.write_header(status);
    }

    /// Finishes the response.
    ///
    /// Commits if nothing did yet, writes the codec trailer unless the
    /// response is streaming, and returns the codec to its pool. Calling it
    /// again does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        self.commit();
        let Some(mut codec) = self.codec.take() else {
            return Ok(());
        };
        match self.verdict {
            Verdict::Stream => Ok(()),
            Verdict::Undecided | Verdict::Compress => codec.finish(&mut self.inner),
        }
    }

    fn decide(&mut self, first_chunk: &[u8]) {
        if self.verdict != Verdict::Undecided {
            return;
        }

        let headers = self.inner.headers_mut();
        if !headers.contains_key(header::CONTENT_TYPE) {
            let sniffed = sniff::detect_content_type(first_chunk);
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(sniffed));
        }

        if is_streaming_response(headers) {
            self.bypass();
        } else {
            self.verdict = Verdict::Compress;
        }
    }

    fn bypass(&mut self) {
        encoding::revert(self.inner.headers_mut(), self.vary_added);
        if let Some(codec) = self.codec.as_mut() {
            codec.discard();
        }
        self.verdict = Verdict::Stream;
        tracing::debug!(
            encoding = self.encoding.content_encoding(),
            "streaming response, compression bypassed"
        );
    }
}

/// Informational, 204 and 304 responses never carry a body.
fn forbids_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

impl<W: ResponseWriter> io::Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.decide(buf);
        self.inner.headers_mut().remove(header::CONTENT_LENGTH);
        self.commit();

        match self.verdict {
            Verdict::Stream => self.inner.write(buf),
            Verdict::Undecided | Verdict::Compress => match self.codec.as_mut() {
                Some(codec) => codec.write(buf, &mut self.inner),
                None => Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "write after response was closed",
                )),
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // Headers leave with the commit, so a response already marked as
        // streaming must drop the announced encoding first.
        if self.verdict == Verdict::Undecided && is_streaming_response(self.inner.headers()) {
            self.bypass();
        }
        self.commit();
        if self.verdict == Verdict::Compress {
            if let Some(codec) = self.codec.as_mut() {
                codec.flush(&mut self.inner)?;
            }
        }
        self.inner.flush()
    }
}

impl<W: ResponseWriter> ResponseWriter for CompressWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn pusher(&mut self) -> Option<&mut dyn Push> {
        match self.encoding {
            Encoding::Deflate => {
                if self.inner.pusher().is_none() {
                    return None;
                }
                Some(self as &mut dyn Push)
            }
            Encoding::Gzip => self.inner.pusher(),
        }
    }
}

impl<W: ResponseWriter> Push for CompressWriter<W> {
    fn push(&mut self, target: &str, opts: Option<PushOptions>) -> io::Result<()> {
        let opts = PushOptions::prefer_gzip(opts);
        match self.inner.pusher() {
            Some(pusher) => pusher.push(target, Some(opts)),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "push not supported",
            )),
        }
    }
}

impl<W> std::fmt::Debug for CompressWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressWriter")
            .field("encoding", &self.encoding)
            .field("verdict", &self.verdict)
            .field("status", &self.status)
            .field("committed", &self.committed)
            .finish()
    }
}
