//! Composable HTTP middlewares: response compression, panic recovery, audit
//! logging, no-cache headers, request validation and JSON helpers.
//!
//! The centerpiece is gzip/deflate response compression that is safe for
//! streaming responses and reuses its compressors through shared
//! [`CodecPools`]. It comes in two shapes sharing one [`CompressWriter`]:
//!
//! - [`Compress`], a [`Handler`] middleware for handlers that push bytes
//!   into a [`ResponseWriter`].
//! - [`CompressionLayer`], a Tower layer compressing `http_body::Body`
//!   responses.
//!
//! # Example
//!
//! ```ignore
//! use http_middlewares::{AppInfo, CodecPools, CompressionLayer, HandlerService, default_stack};
//! use tower::ServiceBuilder;
//!
//! let pools = CodecPools::new();
//!
//! // Handler style.
//! let service = HandlerService::new(default_stack(AppInfo::default(), my_handler, pools.clone()));
//!
//! // Tower style.
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::with_pools(pools))
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The middleware will **not** compress responses when:
//! - Neither `gzip` nor `deflate` is listed in `Accept-Encoding`
//! - `Content-Type` contains `text/event-stream`
//! - `Transfer-Encoding` is exactly `chunked`
//! - `Content-Encoding` is already set (Tower layer only)
//!
//! gzip wins whenever the client accepts both. The streaming decision is
//! taken on the first non-empty write and never revisited.
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the codec used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Vary` header includes `Accept-Encoding`
//! - `Content-Type` is sniffed from the first bytes when missing
//!
//! Compressing TLS responses that reflect user input exposes them to
//! BREACH-style attacks.

#![deny(missing_docs)]

mod audit;
mod body;
mod codec;
mod compress;
mod config;
mod encoding;
mod error;
mod future;
mod handler;
mod interceptor;
mod json;
mod layer;
mod nocache;
mod pool;
mod recover;
mod service;
pub mod sniff;
mod stack;
mod validate;
mod writer;

#[cfg(test)]
mod test_util;

pub use audit::Audit;
pub use body::{CompressedBody, CompressionBody};
pub use codec::{Codec, Level};
pub use compress::Compress;
pub use config::{AppInfo, CompressionConfig};
pub use encoding::Encoding;
pub use error::{Error, Result};
pub use future::ResponseFuture;
pub use handler::{BoxError, Handler, HandlerFn, HandlerService, handler_fn};
pub use interceptor::{CompressWriter, Verdict, is_streaming_response};
pub use json::{json, json_error};
pub use layer::CompressionLayer;
pub use nocache::{NO_CACHE_HEADERS, NoCache};
pub use pool::{CodecPools, DEFAULT_MAX_IDLE, PooledCodec, SLOTS, pool_index};
pub use recover::{PanicRenderer, Recover};
pub use service::CompressionService;
pub use stack::{DefaultStack, default_stack};
pub use validate::{allow_methods, require_json_body};
pub use writer::{Push, PushOptions, ResponseRecorder, ResponseWriter};
