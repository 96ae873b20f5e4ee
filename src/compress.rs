use crate::codec::Level;
use crate::config::CompressionConfig;
use crate::encoding;
use crate::handler::Handler;
use crate::interceptor::CompressWriter;
use crate::pool::CodecPools;
use crate::writer::ResponseWriter;
use bytes::Bytes;
use http::Request;
use std::sync::Arc;

/// Compresses the responses of a [`Handler`] with gzip or deflate.
///
/// Requests without a usable Accept-Encoding reach the inner handler with
/// the original writer. Otherwise the handler writes through a
/// [`CompressWriter`] backed by a codec from the shared pools; the codec is
/// finished and returned once the handler is done.
///
/// Compressing TLS traffic may leak page contents to an attacker when the
/// page reflects user input (BREACH).
#[derive(Debug, Clone)]
pub struct Compress<H> {
    inner: H,
    pools: Arc<CodecPools>,
    level: Level,
}

impl<H> Compress<H> {
    /// Wraps `inner` using the default level and private pools.
    pub fn new(inner: H) -> Self {
        Self::with_pools(inner, CodecPools::new())
    }

    /// Wraps `inner`, drawing codecs from `pools`.
    pub fn with_pools(inner: H, pools: Arc<CodecPools>) -> Self {
        Self {
            inner,
            pools,
            level: Level::Default,
        }
    }

    /// Wraps `inner` as described by `config`.
    pub fn from_config(inner: H, config: &CompressionConfig) -> Self {
        Self::with_pools(inner, CodecPools::with_max_idle(config.max_idle)).level(config.level())
    }

    /// Sets the compression level; out-of-range levels use the default.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level.normalize();
        self
    }

    /// Returns a reference to the inner handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// The pools codecs are drawn from.
    pub fn pools(&self) -> &Arc<CodecPools> {
        &self.pools
    }
}

impl<H: Handler> Handler for Compress<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        let Some(encoding) = encoding::negotiate(req.headers()) else {
            return self.inner.serve(w, req);
        };

        let codec = self.pools.acquire(encoding, self.level);
        let mut writer = CompressWriter::new(w, encoding, codec);
        self.inner.serve(&mut writer, req);

        if let Err(err) = writer.close() {
            tracing::error!(
                encoding = encoding.content_encoding(),
                error = %err,
                "closing compressed response"
            );
        }
    }
}
