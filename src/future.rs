use crate::body::{CompressedBody, CompressionBody, FrameSink};
use crate::codec::Level;
use crate::encoding::Encoding;
use crate::handler::BoxError;
use crate::interceptor::{CompressWriter, Verdict};
use crate::pool::CodecPools;
use crate::writer::ResponseWriter;
use http::{HeaderMap, Response, header};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Future for compression service responses.
    ///
    /// Once the inner service responds, the body is polled up to its first
    /// data frame so the streaming decision and a sniffed Content-Type are
    /// part of the returned headers.
    pub struct ResponseFuture<F, B> {
        #[pin]
        inner: F,
        encoding: Option<Encoding>,
        pools: Arc<CodecPools>,
        level: Level,
        peek: Option<Peek<B>>,
    }
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(
        inner: F,
        encoding: Option<Encoding>,
        pools: Arc<CodecPools>,
        level: Level,
    ) -> Self {
        Self {
            inner,
            encoding,
            pools,
            level,
            peek: None,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
    B::Error: Into<BoxError>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            if let Some(mut peek) = this.peek.take() {
                if peek.poll_first_frame(cx).is_pending() {
                    *this.peek = Some(peek);
                    return Poll::Pending;
                }
                return Poll::Ready(Ok(peek.into_response()));
            }

            let response = ready!(this.inner.as_mut().poll(cx))?;
            match start(response, *this.encoding, this.pools, *this.level) {
                Start::Passthrough(response) => return Poll::Ready(Ok(response)),
                Start::Compress(peek) => *this.peek = Some(peek),
            }
        }
    }
}

enum Start<B> {
    Passthrough(Response<CompressionBody<B>>),
    Compress(Peek<B>),
}

/// Decides whether the response is compressed and, if so, sets up the
/// writer over an in-memory sink.
fn start<B>(
    response: Response<B>,
    encoding: Option<Encoding>,
    pools: &Arc<CodecPools>,
    level: Level,
) -> Start<B> {
    let (mut parts, body) = response.into_parts();

    let Some(encoding) = encoding.filter(|_| !has_content_encoding(&parts.headers)) else {
        return Start::Passthrough(Response::from_parts(parts, CompressionBody::passthrough(body)));
    };

    let always_flush = is_unbuffered(&parts.headers);
    let codec = pools.acquire(encoding, level);
    let sink = FrameSink::new(std::mem::take(&mut parts.headers));
    let mut writer = CompressWriter::new(sink, encoding, codec);
    writer.write_header(parts.status);

    Start::Compress(Peek {
        parts,
        body: Box::pin(body),
        state: CompressedBody::new(writer, always_flush),
    })
}

/// A response whose head waits for the first data frame.
struct Peek<B> {
    parts: http::response::Parts,
    body: Pin<Box<B>>,
    state: CompressedBody,
}

impl<B> Peek<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    fn poll_first_frame(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        loop {
            match ready!(self.body.as_mut().poll_frame(cx)) {
                None => {
                    self.state.end();
                    return Poll::Ready(());
                }
                Some(Err(err)) => {
                    self.state.fail(io::Error::other(err.into()));
                    return Poll::Ready(());
                }
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) if !bytes::Buf::has_remaining(&data) => continue,
                    Ok(data) => {
                        if let Err(err) = self.state.feed(data) {
                            self.state.fail(err);
                        }
                        return Poll::Ready(());
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            self.state.end_with_trailers(trailers);
                        }
                        return Poll::Ready(());
                    }
                },
            }
        }
    }

    fn into_response(mut self) -> Response<CompressionBody<B>> {
        let writer = self.state.writer_mut();
        writer.commit();

        let sink = writer.get_mut();
        if let Some(status) = sink.status() {
            self.parts.status = status;
        }
        self.parts.headers = sink.take_headers();
        if self.state.verdict() != Verdict::Stream {
            // Byte ranges of the identity body are meaningless once encoded.
            self.parts.headers.remove(header::ACCEPT_RANGES);
        }

        Response::from_parts(self.parts, CompressionBody::compressed(self.body, self.state))
    }
}

/// Checks if Content-Encoding header is already present.
fn has_content_encoding(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Checks for `X-Accel-Buffering: no`, which asks for every frame to be
/// flushed through the codec.
fn is_unbuffered(headers: &HeaderMap) -> bool {
    headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
}
