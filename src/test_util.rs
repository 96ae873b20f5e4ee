//! Helpers for driving futures and bodies in unit tests.

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::pin::{Pin, pin};
use std::task::{Context, Poll, Waker};

/// Consecutive `Pending` results tolerated before a test is declared stuck.
const MAX_STALLS: usize = 64;

/// Polls `future` until it completes.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let mut cx = Context::from_waker(Waker::noop());
    for _ in 0..MAX_STALLS {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
    }
    panic!("future did not complete");
}

/// Everything a body produced.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub(crate) frames: Vec<Bytes>,
    pub(crate) trailers: Option<HeaderMap>,
}

impl Collected {
    pub(crate) fn data(&self) -> Bytes {
        let mut data = BytesMut::new();
        for frame in &self.frames {
            data.extend_from_slice(frame);
        }
        data.freeze()
    }
}

/// Polls `body` to completion, panicking on errors or stalls.
pub(crate) fn collect<B>(body: B) -> Collected
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Debug,
{
    let mut body = pin!(body);
    let mut cx = Context::from_waker(Waker::noop());
    let mut collected = Collected::default();
    let mut stalls = 0;
    loop {
        match Pin::as_mut(&mut body).poll_frame(&mut cx) {
            Poll::Ready(None) => return collected,
            Poll::Ready(Some(Ok(frame))) => {
                stalls = 0;
                match frame.into_data() {
                    Ok(data) => collected.frames.push(data),
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            collected.trailers = Some(trailers);
                        }
                    }
                }
            }
            Poll::Ready(Some(Err(err))) => panic!("body error: {err:?}"),
            Poll::Pending => {
                stalls += 1;
                assert!(stalls < MAX_STALLS, "body stalled");
            }
        }
    }
}

/// One step of a [`TestBody`].
#[derive(Debug)]
pub(crate) enum Step {
    Frame(Frame<Bytes>),
    Pending,
}

/// A body replaying a script of frames and `Pending` results.
#[derive(Debug)]
pub(crate) struct TestBody {
    steps: VecDeque<Step>,
}

impl TestBody {
    pub(crate) fn new(frames: Vec<Frame<Bytes>>) -> Self {
        Self::from_steps(frames.into_iter().map(Step::Frame).collect())
    }

    pub(crate) fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    pub(crate) fn data<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'static str>,
    {
        Self::new(
            chunks
                .into_iter()
                .map(|chunk| Frame::data(Bytes::from_static(chunk.as_bytes())))
                .collect(),
        )
    }
}

impl Body for TestBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.steps.pop_front() {
            Some(Step::Frame(frame)) => Poll::Ready(Some(Ok(frame))),
            Some(Step::Pending) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            None => Poll::Ready(None),
        }
    }
}
