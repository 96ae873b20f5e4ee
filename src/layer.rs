use crate::codec::Level;
use crate::config::CompressionConfig;
use crate::pool::CodecPools;
use crate::service::CompressionService;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// This layer wraps services and compresses response bodies with gzip or
/// deflate based on the client's Accept-Encoding header. Every service built
/// by one layer draws codecs from the same pools.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    pools: Arc<CodecPools>,
    level: Level,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    pub fn new() -> Self {
        Self::with_pools(CodecPools::new())
    }

    /// Creates a layer drawing codecs from `pools`.
    pub fn with_pools(pools: Arc<CodecPools>) -> Self {
        Self {
            pools,
            level: Level::Default,
        }
    }

    /// Creates a layer as described by `config`.
    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::with_pools(CodecPools::with_max_idle(config.max_idle)).level(config.level())
    }

    /// Sets the compression level.
    ///
    /// Levels outside 1..=9 select the default level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level.normalize();
        self
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, Arc::clone(&self.pools), self.level)
    }
}
