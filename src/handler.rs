use crate::writer::{ResponseRecorder, ResponseWriter};
use bytes::Bytes;
use http::Request;
use http_body::Body;
use http_body_util::{BodyExt, Full};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Boxed error returned by [`HandlerService`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Something that produces a response by writing to a [`ResponseWriter`].
///
/// Middlewares in this crate are handlers wrapping other handlers.
pub trait Handler: Send + Sync {
    /// Writes the response for `req` into `w`.
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>);
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        (**self).serve(w, req)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        (**self).serve(w, req)
    }
}

/// Returns a [`Handler`] calling `f`.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    HandlerFn { f }
}

/// A [`Handler`] built from a closure, see [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        (self.f)(w, req)
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

/// Runs a [`Handler`] as a Tower service.
///
/// The request body is collected first; the handler writes into a
/// [`ResponseRecorder`] whose committed status and headers become the
/// response.
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H> HandlerService<H> {
    /// Creates a service running `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> fmt::Debug for HandlerService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerService").finish_non_exhaustive()
    }
}

impl<H, B> Service<Request<B>> for HandlerService<H>
where
    H: Handler + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(err) => {
                    let err: BoxError = err.into();
                    return Err(err);
                }
            };
            let req = Request::from_parts(parts, body);

            let mut recorder = ResponseRecorder::new();
            handler.serve(&mut recorder, &req);
            Ok::<_, BoxError>(recorder.into_response().map(Full::new))
        })
    }
}
