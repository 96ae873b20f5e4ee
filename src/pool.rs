//! Reusable compressors, one free list per (encoding, level).

use crate::codec::{Codec, Level};
use crate::encoding::Encoding;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default number of idle codecs kept per slot.
pub const DEFAULT_MAX_IDLE: usize = 64;

/// Number of slots per encoding: every explicit level plus the default.
pub const SLOTS: usize = (Level::MAX - Level::MIN + 2) as usize;

/// Maps a level onto its slot.
///
/// Explicit levels occupy `0..=8` in order; the default level, and every
/// level that would normalize to it, takes the slot after the best level.
pub fn pool_index(level: Level) -> usize {
    match level.normalize() {
        Level::Precise(n) => (n - Level::MIN) as usize,
        _ => SLOTS - 1,
    }
}

/// Inverse of [`pool_index`] over valid slots.
pub fn slot_level(index: usize) -> Level {
    if index + 1 >= SLOTS {
        Level::Default
    } else {
        Level::Precise(Level::MIN + index as i32)
    }
}

struct Slot {
    idle: Mutex<Vec<Codec>>,
}

/// Pool of codecs for one encoding.
struct EncodingPool {
    encoding: Encoding,
    slots: Vec<Slot>,
}

impl EncodingPool {
    fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            slots: (0..SLOTS)
                .map(|_| Slot {
                    idle: Mutex::new(Vec::new()),
                })
                .collect(),
        }
    }
}

/// Shared pools of gzip and deflate codecs.
///
/// Construct once at startup and share the `Arc` between every middleware
/// instance that should reuse the same compressors.
pub struct CodecPools {
    gzip: EncodingPool,
    deflate: EncodingPool,
    max_idle: usize,
    created: AtomicUsize,
}

impl CodecPools {
    /// Creates empty pools keeping up to [`DEFAULT_MAX_IDLE`] codecs per slot.
    pub fn new() -> Arc<Self> {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Creates empty pools keeping up to `max_idle` codecs per slot.
    pub fn with_max_idle(max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            gzip: EncodingPool::new(Encoding::Gzip),
            deflate: EncodingPool::new(Encoding::Deflate),
            max_idle,
            created: AtomicUsize::new(0),
        })
    }

    fn pool(&self, encoding: Encoding) -> &EncodingPool {
        match encoding {
            Encoding::Gzip => &self.gzip,
            Encoding::Deflate => &self.deflate,
        }
    }

    /// Checks out a codec for exclusive use.
    ///
    /// The codec is discarding its output; call [`Codec::reset`] before
    /// writing a response through it. It goes back to the pool when the
    /// returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, encoding: Encoding, level: Level) -> PooledCodec {
        let index = pool_index(level);
        let pool = self.pool(encoding);
        let reused = pool.slots[index].idle.lock().pop();
        let codec = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            Codec::new(pool.encoding, slot_level(index))
        });

        PooledCodec {
            codec: Some(codec),
            pools: Arc::clone(self),
            index,
        }
    }

    fn release(&self, mut codec: Codec, index: usize) {
        codec.discard();
        let mut idle = self.pool(codec.encoding()).slots[index].idle.lock();
        if idle.len() < self.max_idle {
            idle.push(codec);
        }
    }

    /// Number of idle codecs waiting in the slot for `level`.
    pub fn idle(&self, encoding: Encoding, level: Level) -> usize {
        self.pool(encoding).slots[pool_index(level)].idle.lock().len()
    }

    /// Total number of codecs ever constructed by these pools.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CodecPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecPools")
            .field("max_idle", &self.max_idle)
            .field("created", &self.created())
            .finish()
    }
}

/// A codec checked out of [`CodecPools`].
///
/// Dereferences to the codec and returns it to its slot on drop, including
/// when a handler unwinds.
pub struct PooledCodec {
    codec: Option<Codec>,
    pools: Arc<CodecPools>,
    index: usize,
}

impl Deref for PooledCodec {
    type Target = Codec;

    fn deref(&self) -> &Codec {
        self.codec.as_ref().expect("codec is present until drop")
    }
}

impl DerefMut for PooledCodec {
    fn deref_mut(&mut self) -> &mut Codec {
        self.codec.as_mut().expect("codec is present until drop")
    }
}

impl Drop for PooledCodec {
    fn drop(&mut self) {
        if let Some(codec) = self.codec.take() {
            self.pools.release(codec, self.index);
        }
    }
}

impl std::fmt::Debug for PooledCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledCodec")
            .field("codec", &self.codec)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_pool_index_is_bijective() {
        let mut seen = [false; SLOTS];
        for n in Level::MIN..=Level::MAX {
            let index = pool_index(Level::Precise(n));
            assert!(!seen[index], "slot {index} used twice");
            seen[index] = true;
            assert_eq!(slot_level(index), Level::Precise(n));
        }

        let default = pool_index(Level::Default);
        assert!(!seen[default]);
        assert_eq!(default, SLOTS - 1);
        assert_eq!(slot_level(default), Level::Default);
    }

    #[test]
    fn test_invalid_levels_use_default_slot() {
        for level in [
            Level::Precise(0),
            Level::Precise(10),
            Level::Precise(-7),
            Level::Precise(i32::MAX),
        ] {
            assert_eq!(pool_index(level), pool_index(Level::Default));
        }
        assert_eq!(pool_index(Level::Fastest), 0);
        assert_eq!(pool_index(Level::Best), 8);
    }

    #[test]
    fn test_acquire_returns_discarding_codec() {
        let pools = CodecPools::new();
        let codec = pools.acquire(Encoding::Deflate, Level::Precise(3));
        assert!(codec.is_discarding());
        assert_eq!(codec.encoding(), Encoding::Deflate);
        assert_eq!(codec.level(), Level::Precise(3));
    }

    #[test]
    fn test_release_on_drop() {
        let pools = CodecPools::new();
        {
            let _codec = pools.acquire(Encoding::Gzip, Level::Default);
            assert_eq!(pools.idle(Encoding::Gzip, Level::Default), 0);
        }
        assert_eq!(pools.idle(Encoding::Gzip, Level::Default), 1);
        assert_eq!(pools.idle(Encoding::Deflate, Level::Default), 0);
    }

    #[test]
    fn test_sequential_reuse_is_bounded_and_clean() {
        let pools = CodecPools::new();

        for i in 0..100 {
            let mut codec = pools.acquire(Encoding::Gzip, Level::Best);
            codec.reset();

            let body = format!("response {i}");
            let mut out = Vec::new();
            codec.write(body.as_bytes(), &mut out).unwrap();
            // Every other response is abandoned without finishing.
            if i % 2 == 0 {
                codec.finish(&mut out).unwrap();
                let mut decoded = String::new();
                GzDecoder::new(&out[..]).read_to_string(&mut decoded).unwrap();
                assert_eq!(decoded, body);
            }
        }

        assert_eq!(pools.created(), 1);
        assert_eq!(pools.idle(Encoding::Gzip, Level::Best), 1);
    }

    #[test]
    fn test_concurrent_checkouts_are_exclusive() {
        let pools = CodecPools::new();
        let a = pools.acquire(Encoding::Gzip, Level::Default);
        let b = pools.acquire(Encoding::Gzip, Level::Default);
        assert_eq!(pools.created(), 2);
        drop(a);
        drop(b);
        assert_eq!(pools.idle(Encoding::Gzip, Level::Default), 2);
    }

    #[test]
    fn test_max_idle_caps_pool() {
        let pools = CodecPools::with_max_idle(1);
        let a = pools.acquire(Encoding::Deflate, Level::Fastest);
        let b = pools.acquire(Encoding::Deflate, Level::Fastest);
        drop(a);
        drop(b);
        assert_eq!(pools.idle(Encoding::Deflate, Level::Fastest), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let pools = CodecPools::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pools = Arc::clone(&pools);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let mut codec = pools.acquire(Encoding::Gzip, Level::Default);
                        codec.reset();
                        let mut out = Vec::new();
                        codec.write(b"abc", &mut out).unwrap();
                        codec.finish(&mut out).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pools.created() <= 4);
        assert_eq!(pools.idle(Encoding::Gzip, Level::Default), pools.created());
    }
}
