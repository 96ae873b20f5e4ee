use crate::handler::BoxError;
use crate::interceptor::{CompressWriter, Verdict};
use crate::writer::ResponseWriter;
use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body that may be compressed.
    ///
    /// Compressed bodies run every data frame of the inner body through a
    /// [`CompressWriter`] and yield whatever it produced.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Body driven through the compressing writer.
        Compressed {
            inner: Pin<Box<B>>,
            state: Box<CompressedBody>,
        },
        /// Body forwarded unchanged.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// The in-memory writer a [`CompressWriter`] emits into on the Tower path.
///
/// Headers and status land here until the response head is built; body
/// bytes are buffered until the next frame is yielded.
#[derive(Debug, Default)]
pub(crate) struct FrameSink {
    headers: HeaderMap,
    status: Option<StatusCode>,
    buf: BytesMut,
}

impl FrameSink {
    pub(crate) fn new(headers: HeaderMap) -> Self {
        Self {
            headers,
            status: None,
            buf: BytesMut::new(),
        }
    }

    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub(crate) fn take_headers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.headers)
    }

    fn take_output(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }
}

impl Write for FrameSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for FrameSink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }
}

/// State and buffers for an actively compressed body.
pub struct CompressedBody {
    writer: CompressWriter<FrameSink>,
    always_flush: bool,
    state: CompressState,
    pending_trailers: Option<HeaderMap>,
    pending_error: Option<io::Error>,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Finishing compression after inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete.
    Done,
}

impl CompressedBody {
    pub(crate) fn new(writer: CompressWriter<FrameSink>, always_flush: bool) -> Self {
        Self {
            writer,
            always_flush,
            state: CompressState::Reading,
            pending_trailers: None,
            pending_error: None,
        }
    }

    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    pub(crate) fn verdict(&self) -> Verdict {
        self.writer.verdict()
    }

    pub(crate) fn writer_mut(&mut self) -> &mut CompressWriter<FrameSink> {
        &mut self.writer
    }

    /// Feeds one data frame to the writer.
    pub(crate) fn feed<D: Buf>(&mut self, mut data: D) -> io::Result<()> {
        while data.has_remaining() {
            let chunk = data.chunk();
            let len = chunk.len();
            self.writer.write_all(chunk)?;
            data.advance(len);
        }
        if self.always_flush {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Trailers end the data; the codec is finished before they are sent.
    pub(crate) fn end_with_trailers(&mut self, trailers: HeaderMap) {
        self.pending_trailers = Some(trailers);
        self.state = CompressState::Finishing;
    }

    pub(crate) fn end(&mut self) {
        self.state = CompressState::Finishing;
    }

    pub(crate) fn fail(&mut self, err: io::Error) {
        self.pending_error = Some(err);
    }

    fn finish(&mut self) -> io::Result<()> {
        self.state = if self.pending_trailers.is_some() {
            CompressState::Trailers
        } else {
            CompressState::Done
        };
        self.writer.close()
    }

    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if let Some(err) = self.pending_error.take() {
            self.state = CompressState::Done;
            return Poll::Ready(Some(Err(err)));
        }

        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                CompressState::Finishing => {
                    if let Err(err) = self.finish() {
                        self.state = CompressState::Done;
                        return Poll::Ready(Some(Err(err)));
                    }
                    if let Some(data) = self.writer.get_mut().take_output() {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }
                }

                CompressState::Reading => {
                    if let Some(data) = self.writer.get_mut().take_output() {
                        return Poll::Ready(Some(Ok(Frame::data(data))));
                    }

                    match inner.as_mut().poll_frame(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(None) => self.end(),
                        Poll::Ready(Some(Err(err))) => {
                            self.state = CompressState::Done;
                            return Poll::Ready(Some(Err(io::Error::other(err.into()))));
                        }
                        Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                            Ok(data) => {
                                if let Err(err) = self.feed(data) {
                                    self.state = CompressState::Done;
                                    return Poll::Ready(Some(Err(err)));
                                }
                            }
                            Err(frame) => {
                                if let Ok(trailers) = frame.into_trailers() {
                                    self.end_with_trailers(trailers);
                                }
                            }
                        },
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CompressedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedBody")
            .field("writer", &self.writer)
            .field("always_flush", &self.always_flush)
            .field("state", &self.state)
            .finish()
    }
}

impl<B> CompressionBody<B> {
    pub(crate) fn compressed(inner: Pin<Box<B>>, state: CompressedBody) -> Self {
        Self::Compressed {
            inner,
            state: Box::new(state),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Returns true if the body goes through the compressing writer.
    pub fn is_compressed(&self) -> bool {
        matches!(self, CompressionBody::Compressed { .. })
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(err))) => {
                    Poll::Ready(Some(Err(io::Error::other(err.into()))))
                }
            },
            CompressionBodyProj::Compressed { inner, state } => {
                state.poll_compressed(cx, inner.as_mut())
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            CompressionBody::Compressed { .. } => http_body::SizeHint::default(),
        }
    }
}
