use crate::encoding::Encoding;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use std::io::{self, Write};

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Gzip member header (RFC 1952, section 2.3): magic, CM=deflate, no flags,
/// no mtime. XFL and OS follow. The member ends with CRC32 and ISIZE, both
/// little-endian.
const GZIP_HEADER_PREFIX: [u8; 8] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
const GZIP_OS_UNKNOWN: u8 = 0xff;

/// A compression level.
///
/// Levels are shared by gzip and deflate: `Precise(1)` is the fastest and
/// `Precise(9)` the best compression. Anything else is normalized to
/// [`Level::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// The library's default trade-off between speed and size.
    #[default]
    Default,
    /// Fastest compression.
    Fastest,
    /// Smallest output.
    Best,
    /// An explicit level.
    Precise(i32),
}

impl Level {
    /// Fastest valid explicit level.
    pub const MIN: i32 = 1;
    /// Best valid explicit level.
    pub const MAX: i32 = 9;
    /// Integer sentinel for the default level.
    pub const DEFAULT_SENTINEL: i32 = -1;

    /// Builds a level from its integer form, as found in configuration.
    ///
    /// `-1` is the default sentinel. Out-of-range values are kept as-is and
    /// fall back to the default when normalized.
    pub fn from_i32(level: i32) -> Level {
        if level == Self::DEFAULT_SENTINEL {
            Level::Default
        } else {
            Level::Precise(level)
        }
    }

    /// Maps the level onto `Default` or a `Precise` level within range.
    pub fn normalize(self) -> Level {
        match self {
            Level::Default => Level::Default,
            Level::Fastest => Level::Precise(Self::MIN),
            Level::Best => Level::Precise(Self::MAX),
            Level::Precise(n) if (Self::MIN..=Self::MAX).contains(&n) => Level::Precise(n),
            Level::Precise(_) => Level::Default,
        }
    }

    fn compression(self) -> Compression {
        match self.normalize() {
            Level::Precise(n) => Compression::new(n.unsigned_abs()),
            _ => Compression::default(),
        }
    }
}

/// Where a codec's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    /// Output is written to the writer passed to each call.
    Live,
    /// Input is swallowed and nothing is produced.
    Discard,
}

/// A reusable gzip or deflate compressor.
///
/// The codec does not own its sink: every call takes the destination writer.
/// After [`Codec::discard`] all input is dropped, which is how a codec is
/// parked in the pool and how a streaming response stops it from ever
/// emitting a trailer.
pub struct Codec {
    encoding: Encoding,
    level: Level,
    deflate: Compress,
    crc: Crc,
    header_written: bool,
    sink: Sink,
    buf: Vec<u8>,
}

impl Codec {
    /// Creates a codec in discard mode.
    pub fn new(encoding: Encoding, level: Level) -> Self {
        let level = level.normalize();
        Self {
            encoding,
            level,
            deflate: Compress::new(level.compression(), false),
            crc: Crc::new(),
            header_written: false,
            sink: Sink::Discard,
            buf: Vec::with_capacity(OUTPUT_BUFFER_SIZE),
        }
    }

    /// The encoding this codec produces.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The normalized level this codec compresses at.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns true while output is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.sink == Sink::Discard
    }

    /// Starts a fresh stream whose output goes to the caller's writer.
    pub fn reset(&mut self) {
        self.clear();
        self.sink = Sink::Live;
    }

    /// Starts a fresh stream whose output is dropped.
    pub fn discard(&mut self) {
        self.clear();
        self.sink = Sink::Discard;
    }

    fn clear(&mut self) {
        self.deflate.reset();
        self.crc.reset();
        self.header_written = false;
        self.buf.clear();
    }

    /// Compresses `input`, writing whatever output is ready into `out`.
    pub fn write<W: Write + ?Sized>(&mut self, input: &[u8], out: &mut W) -> io::Result<usize> {
        if self.is_discarding() {
            return Ok(input.len());
        }
        self.write_header(out)?;
        if self.encoding == Encoding::Gzip {
            self.crc.update(input);
        }

        let mut remaining = input;
        while !remaining.is_empty() {
            let before_in = self.deflate.total_in();
            let before_out = self.deflate.total_out();
            let status = self.run(remaining, FlushCompress::None)?;
            let consumed = (self.deflate.total_in() - before_in) as usize;
            let produced = self.deflate.total_out() != before_out;
            self.dump(out)?;
            // A full output buffer leaves input unconsumed; only a stalled
            // compressor is an error.
            if consumed == 0 && !produced && status == Status::BufError {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "compressor made no progress",
                ));
            }
            remaining = &remaining[consumed..];
        }
        Ok(input.len())
    }

    /// Emits everything compressed so far as a sync-flushed block.
    pub fn flush<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        if self.is_discarding() {
            return Ok(());
        }
        self.write_header(out)?;
        self.run(&[], FlushCompress::Sync)?;
        loop {
            self.dump(out)?;
            let before = self.deflate.total_out();
            self.run(&[], FlushCompress::None)?;
            if before == self.deflate.total_out() {
                return Ok(());
            }
        }
    }

    /// Terminates the stream: final deflate block plus the gzip trailer.
    ///
    /// The codec switches to discard mode afterwards, so closing twice writes
    /// nothing the second time.
    pub fn finish<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        if self.is_discarding() {
            return Ok(());
        }
        self.write_header(out)?;
        loop {
            self.dump(out)?;
            let before = self.deflate.total_out();
            self.run(&[], FlushCompress::Finish)?;
            if before == self.deflate.total_out() {
                break;
            }
        }
        if self.encoding == Encoding::Gzip {
            let mut trailer = [0u8; 8];
            trailer[..4].copy_from_slice(&self.crc.sum().to_le_bytes());
            trailer[4..].copy_from_slice(&self.crc.amount().to_le_bytes());
            out.write_all(&trailer)?;
        }
        self.discard();
        Ok(())
    }

    fn run(&mut self, input: &[u8], flush: FlushCompress) -> io::Result<Status> {
        self.buf.clear();
        self.deflate
            .compress_vec(input, &mut self.buf, flush)
            .map_err(io::Error::other)
    }

    fn dump<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.buf.is_empty() {
            out.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    fn write_header<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        if self.encoding != Encoding::Gzip {
            return Ok(());
        }

        let xfl = match self.level {
            Level::Precise(Level::MAX) => 2,
            Level::Precise(Level::MIN) => 4,
            _ => 0,
        };
        let mut header = [0u8; 10];
        header[..8].copy_from_slice(&GZIP_HEADER_PREFIX);
        header[8] = xfl;
        header[9] = GZIP_OS_UNKNOWN;
        out.write_all(&header)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("encoding", &self.encoding)
            .field("level", &self.level)
            .field("sink", &self.sink)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{DeflateDecoder, GzDecoder, MultiGzDecoder};
    use std::io::Read;

    /// Incompressible bytes from a xorshift generator.
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        DeflateDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Level::Default.normalize(), Level::Default);
        assert_eq!(Level::Fastest.normalize(), Level::Precise(1));
        assert_eq!(Level::Best.normalize(), Level::Precise(9));
        assert_eq!(Level::Precise(5).normalize(), Level::Precise(5));
        assert_eq!(Level::Precise(0).normalize(), Level::Default);
        assert_eq!(Level::Precise(10).normalize(), Level::Default);
        assert_eq!(Level::Precise(-2).normalize(), Level::Default);
    }

    #[test]
    fn test_from_i32() {
        assert_eq!(Level::from_i32(-1), Level::Default);
        assert_eq!(Level::from_i32(3), Level::Precise(3));
        assert_eq!(Level::from_i32(42).normalize(), Level::Default);
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut codec = Codec::new(Encoding::Gzip, Level::Best);
        codec.reset();

        let input = "Gorilla!\n".repeat(1024);
        let mut out = Vec::new();
        for chunk in input.as_bytes().chunks(100) {
            assert_eq!(codec.write(chunk, &mut out).unwrap(), chunk.len());
        }
        codec.finish(&mut out).unwrap();

        assert_eq!(&out[..2], &[0x1f, 0x8b]);
        assert!(out.len() < input.len());
        assert_eq!(gunzip(&out), input.as_bytes());
    }

    #[test]
    fn test_deflate_round_trip() {
        let mut codec = Codec::new(Encoding::Deflate, Level::Default);
        codec.reset();

        let mut out = Vec::new();
        codec.write(b"hello deflate", &mut out).unwrap();
        codec.finish(&mut out).unwrap();

        assert_eq!(inflate(&out), b"hello deflate");
    }

    #[test]
    fn test_empty_gzip_stream_is_valid() {
        let mut codec = Codec::new(Encoding::Gzip, Level::Default);
        codec.reset();

        let mut out = Vec::new();
        codec.finish(&mut out).unwrap();
        assert!(!out.is_empty());
        assert!(gunzip(&out).is_empty());
    }

    #[test]
    fn test_flush_makes_prefix_decodable() {
        let mut codec = Codec::new(Encoding::Deflate, Level::Default);
        codec.reset();

        let mut out = Vec::new();
        codec.write(b"first part", &mut out).unwrap();
        codec.flush(&mut out).unwrap();

        let mut decoded = Vec::new();
        let mut decoder = DeflateDecoder::new(&out[..]);
        let mut buf = [0u8; 64];
        let n = decoder.read(&mut buf).unwrap();
        decoded.extend_from_slice(&buf[..n]);
        assert_eq!(decoded, b"first part");
    }

    #[test]
    fn test_discard_writes_nothing() {
        let mut codec = Codec::new(Encoding::Gzip, Level::Default);
        assert!(codec.is_discarding());

        let mut out = Vec::new();
        assert_eq!(codec.write(b"ignored", &mut out).unwrap(), 7);
        codec.flush(&mut out).unwrap();
        codec.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_finish_twice_is_noop() {
        let mut codec = Codec::new(Encoding::Gzip, Level::Default);
        codec.reset();

        let mut out = Vec::new();
        codec.write(b"once", &mut out).unwrap();
        codec.finish(&mut out).unwrap();
        let len = out.len();
        codec.finish(&mut out).unwrap();
        assert_eq!(out.len(), len);
    }

    #[test]
    fn test_reset_starts_a_new_stream() {
        let mut codec = Codec::new(Encoding::Gzip, Level::Fastest);

        codec.reset();
        let mut first = Vec::new();
        codec.write(b"first response, never finished", &mut first).unwrap();

        codec.reset();
        let mut second = Vec::new();
        codec.write(b"second", &mut second).unwrap();
        codec.finish(&mut second).unwrap();

        assert_eq!(gunzip(&second), b"second");
    }

    #[test]
    fn test_incompressible_single_write() {
        let input = noise(1024 * 1024);
        let mut codec = Codec::new(Encoding::Gzip, Level::Default);
        codec.reset();

        let mut out = Vec::new();
        assert_eq!(codec.write(&input, &mut out).unwrap(), input.len());
        codec.finish(&mut out).unwrap();
        assert_eq!(gunzip(&out), input);
    }

    #[test]
    fn test_incompressible_small_writes() {
        let input = noise(1024 * 1024);
        let mut codec = Codec::new(Encoding::Deflate, Level::Best);
        codec.reset();

        let mut out = Vec::new();
        for chunk in input.chunks(4096) {
            assert_eq!(codec.write(chunk, &mut out).unwrap(), chunk.len());
        }
        codec.flush(&mut out).unwrap();
        codec.finish(&mut out).unwrap();
        assert_eq!(inflate(&out), input);
    }

    #[test]
    fn test_gzip_member_framing() {
        let mut codec = Codec::new(Encoding::Gzip, Level::Best);
        codec.reset();

        let mut out = Vec::new();
        codec.write(b"framed", &mut out).unwrap();
        codec.finish(&mut out).unwrap();

        assert_eq!(&out[..4], &[0x1f, 0x8b, 0x08, 0x00]);
        assert_eq!(out[8], 2);
        assert_eq!(out[9], GZIP_OS_UNKNOWN);
        let isize = u32::from_le_bytes(out[out.len() - 4..].try_into().unwrap());
        assert_eq!(isize, 6);

        let mut decoded = Vec::new();
        MultiGzDecoder::new(&out[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"framed");
    }
}
