//! [`Framer`] – pulls [`TlvFrame`]s out of a raw byte source.
//!
//! The framer alternates between two phases:
//!
//! ```text
//! FindMagic ──(8 magic bytes)──▶ ReadHeaderAndBody ──(frame)──▶ FindMagic
//!     ▲                                   │
//!     └────────(framing error)────────────┘
//! ```
//!
//! The source is read in chunks of [`FramerConfig::read_chunk`] bytes and
//! partial reads are chained until a phase has what it needs, so a frame may
//! be split across any number of reads.
//!
//! A source that keeps returning zero bytes is considered stalled. Once more
//! than [`FramerConfig::max_zero_reads`] consecutive empty reads have been
//! seen, [`Framer::next_frame`] returns [`LinkError::ResetRequired`]. The
//! framer never reopens the link itself; the owner of the link does that and
//! builds a fresh framer.

use std::io::{self, Read};

use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::{FrameError, FrameHeader, HEADER_LEN, MAGIC, TlvFrame};

/// Largest radar frame accepted.
pub const RADAR_MAX_FRAME_LEN: usize = 200 * 1024;

/// Largest sensor-board frame accepted.
pub const SENSOR_BOARD_MAX_FRAME_LEN: usize = 124;

/// Default number of consecutive empty reads tolerated before a reset.
pub const DEFAULT_MAX_ZERO_READS: u32 = 255;

/// Default size of a single read from the source.
pub const DEFAULT_READ_CHUNK: usize = 2048;

/// Errors that end the current link session.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The source stalled; the physical link must be reset and reopened.
    #[error("link stalled after {zero_reads} consecutive empty reads")]
    ResetRequired { zero_reads: u32 },

    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Tunables for a [`Framer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerConfig {
    /// Frames whose `total_len` exceeds this are discarded.
    pub max_frame_len: usize,
    /// A reset is signalled once this many consecutive empty reads have been
    /// exceeded.
    pub max_zero_reads: u32,
    /// Buffer size handed to each `read` call.
    pub read_chunk: usize,
}

impl FramerConfig {
    pub fn radar() -> Self {
        Self {
            max_frame_len: RADAR_MAX_FRAME_LEN,
            max_zero_reads: DEFAULT_MAX_ZERO_READS,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    pub fn sensor_board() -> Self {
        Self {
            max_frame_len: SENSOR_BOARD_MAX_FRAME_LEN,
            ..Self::radar()
        }
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self::radar()
    }
}

/// Running counters, useful for link health logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramerStats {
    pub frames: u64,
    pub framing_errors: u64,
    /// Bytes discarded while hunting for the magic word.
    pub skipped_bytes: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Framer
// ────────────────────────────────────────────────────────────────────────────

/// Stream decoder turning a [`Read`] source into [`TlvFrame`]s.
///
/// Also usable as an endless [`Iterator`]; a [`LinkError`] item does not end
/// the iteration, but callers are expected to stop and rebuild the framer
/// after [`LinkError::ResetRequired`].
///
/// # Example
///
/// ```
/// use scope_protocol::{Framer, FramerConfig, TlvRecord, encode_frame};
///
/// let bytes = encode_frame(7, 0, &[TlvRecord { record_type: 1, payload: &[0, 0, 0, 0] }]);
/// let mut framer = Framer::new(&bytes[..], FramerConfig::sensor_board());
/// let frame = framer.next_frame().unwrap();
/// assert_eq!(frame.frame_number(), 7);
/// ```
pub struct Framer<R> {
    source: R,
    config: FramerConfig,
    chunk: Vec<u8>,
    pos: usize,
    filled: usize,
    zero_reads: u32,
    stats: FramerStats,
}

impl<R: Read> Framer<R> {
    pub fn new(source: R, config: FramerConfig) -> Self {
        Self {
            source,
            chunk: vec![0; config.read_chunk.max(1)],
            config,
            pos: 0,
            filled: 0,
            zero_reads: 0,
            stats: FramerStats::default(),
        }
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Give the underlying source back, e.g. to close it before a reset.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Block until the next well-formed frame has been read.
    ///
    /// Framing errors are logged and skipped; only link-level failures are
    /// returned.
    pub fn next_frame(&mut self) -> Result<TlvFrame, LinkError> {
        loop {
            self.find_magic()?;
            match self.read_header_and_body()? {
                Ok(frame) => {
                    self.stats.frames += 1;
                    return Ok(frame);
                }
                Err(e) => {
                    self.stats.framing_errors += 1;
                    warn!(error = %e, "Discarding malformed frame; resynchronising");
                }
            }
        }
    }

    // ── FindMagic ────────────────────────────────────────────────────────────

    fn find_magic(&mut self) -> Result<(), LinkError> {
        let mut matched = 0usize;
        loop {
            let byte = self.next_byte()?;
            if byte == MAGIC[matched] {
                matched += 1;
                if matched == MAGIC.len() {
                    return Ok(());
                }
            } else {
                self.stats.skipped_bytes += matched as u64 + 1;
                // The magic word has no repeated prefix, so a broken partial
                // match can only restart at the byte that broke it.
                matched = usize::from(byte == MAGIC[0]);
                if matched == 1 {
                    self.stats.skipped_bytes -= 1;
                }
            }
        }
    }

    // ── ReadHeaderAndBody ────────────────────────────────────────────────────

    /// Outer `Result` is the link, inner is the frame itself.
    fn read_header_and_body(&mut self) -> Result<Result<TlvFrame, FrameError>, LinkError> {
        let mut header_bytes = Vec::with_capacity(HEADER_LEN);
        header_bytes.extend_from_slice(&MAGIC);
        self.read_into(&mut header_bytes, HEADER_LEN - MAGIC.len())?;

        let header = match FrameHeader::decode(&header_bytes) {
            Ok(header) => header,
            Err(e) => return Ok(Err(e)),
        };
        let body_len = match header.body_len(self.config.max_frame_len) {
            Ok(len) => len,
            Err(e) => return Ok(Err(e)),
        };

        debug!(
            frame_number = header.frame_number,
            body_len,
            num_tlvs = header.num_tlvs,
            "Reading frame body"
        );
        let mut body = Vec::with_capacity(body_len);
        self.read_into(&mut body, body_len)?;
        Ok(Ok(TlvFrame { header, body }))
    }

    // ── Byte source ──────────────────────────────────────────────────────────

    fn next_byte(&mut self) -> Result<u8, LinkError> {
        if self.pos == self.filled {
            self.refill()?;
        }
        let byte = self.chunk[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Append exactly `n` bytes to `out`, refilling as often as needed.
    fn read_into(&mut self, out: &mut Vec<u8>, mut n: usize) -> Result<(), LinkError> {
        while n > 0 {
            if self.pos == self.filled {
                self.refill()?;
            }
            let take = n.min(self.filled - self.pos);
            out.extend_from_slice(&self.chunk[self.pos..self.pos + take]);
            self.pos += take;
            n -= take;
        }
        Ok(())
    }

    /// Read the next non-empty chunk from the source.
    fn refill(&mut self) -> Result<(), LinkError> {
        loop {
            match self.source.read(&mut self.chunk) {
                Ok(0) => self.note_empty_read()?,
                Ok(n) => {
                    self.zero_reads = 0;
                    self.pos = 0;
                    self.filled = n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    self.note_empty_read()?
                }
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
    }

    fn note_empty_read(&mut self) -> Result<(), LinkError> {
        self.zero_reads += 1;
        if self.zero_reads > self.config.max_zero_reads {
            let zero_reads = self.zero_reads;
            self.zero_reads = 0;
            return Err(LinkError::ResetRequired { zero_reads });
        }
        Ok(())
    }
}

impl<R: Read> Iterator for Framer<R> {
    type Item = Result<TlvFrame, LinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{TlvRecord, encode_frame};
    use std::collections::VecDeque;

    /// Replays scripted reads; an empty chunk is a zero-length read. Runs dry
    /// as an endless stream of zero-length reads.
    struct ScriptedSource {
        reads: VecDeque<Vec<u8>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Vec<u8>>) -> Self {
            Self { reads: reads.into() }
        }
    }

    impl Read for ScriptedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.reads.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.reads.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    fn sample_frame(frame_number: u32) -> Vec<u8> {
        encode_frame(
            frame_number,
            1234,
            &[TlvRecord { record_type: 1, payload: &[4, 0, 0, 0] }],
        )
    }

    fn framer(reads: Vec<Vec<u8>>) -> Framer<ScriptedSource> {
        Framer::new(ScriptedSource::new(reads), FramerConfig::radar())
    }

    #[test]
    fn decodes_single_frame_in_one_read() {
        let mut f = framer(vec![sample_frame(1)]);
        let frame = f.next_frame().unwrap();
        assert_eq!(frame.frame_number(), 1);
        assert_eq!(frame.time_cpu_cycles(), 1234);
        assert_eq!(f.stats().frames, 1);
    }

    #[test]
    fn magic_split_across_reads() {
        let bytes = sample_frame(9);
        for split in 1..MAGIC.len() {
            let mut f = framer(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]);
            let frame = f.next_frame().unwrap();
            assert_eq!(frame.frame_number(), 9, "split at {split}");
        }
    }

    #[test]
    fn frame_dribbled_one_byte_per_read() {
        let reads = sample_frame(5).into_iter().map(|b| vec![b]).collect();
        let mut f = framer(reads);
        assert_eq!(f.next_frame().unwrap().frame_number(), 5);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut stream = vec![0xAA, 0x55, 0x00, 0x07];
        stream.extend(sample_frame(3));
        let mut f = framer(vec![stream]);
        assert_eq!(f.next_frame().unwrap().frame_number(), 3);
        assert_eq!(f.stats().skipped_bytes, 4);
    }

    #[test]
    fn broken_partial_magic_resumes_on_failing_byte() {
        // A partial match "2,1,4" immediately followed by a real frame.
        let mut stream = vec![2, 1, 4];
        stream.extend(sample_frame(11));
        let mut f = framer(vec![stream]);
        assert_eq!(f.next_frame().unwrap().frame_number(), 11);
    }

    #[test]
    fn oversized_frame_is_discarded_and_next_frame_read() {
        let mut bad = sample_frame(1);
        bad[12..16].copy_from_slice(&((RADAR_MAX_FRAME_LEN + 1) as u32).to_le_bytes());
        let mut stream = bad;
        stream.extend(sample_frame(2));

        let mut f = framer(vec![stream]);
        assert_eq!(f.next_frame().unwrap().frame_number(), 2);
        assert_eq!(f.stats().framing_errors, 1);
    }

    #[test]
    fn zero_reads_below_threshold_are_tolerated() {
        let mut reads = vec![Vec::new(); DEFAULT_MAX_ZERO_READS as usize];
        reads.push(sample_frame(4));
        let mut f = framer(reads);
        assert_eq!(f.next_frame().unwrap().frame_number(), 4);
    }

    #[test]
    fn sustained_zero_reads_request_reset() {
        let mut reads = vec![Vec::new(); 257];
        reads.push(sample_frame(4));
        let mut f = framer(reads);
        match f.next_frame() {
            Err(LinkError::ResetRequired { zero_reads }) => assert_eq!(zero_reads, 256),
            other => panic!("expected reset, got {other:?}"),
        }
    }

    #[test]
    fn data_resets_zero_read_counter() {
        let mut reads = vec![Vec::new(); 200];
        reads.push(vec![0xEE]);
        reads.extend(vec![Vec::new(); 200]);
        reads.push(sample_frame(6));
        let mut f = framer(reads);
        assert_eq!(f.next_frame().unwrap().frame_number(), 6);
    }

    #[test]
    fn iterator_yields_consecutive_frames() {
        let mut stream = sample_frame(1);
        stream.extend(sample_frame(2));
        stream.extend(sample_frame(3));
        let numbers: Vec<u32> = framer(vec![stream])
            .take(3)
            .map(|r| r.unwrap().frame_number())
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn sensor_board_limit_rejects_radar_sized_frames() {
        let big = encode_frame(1, 0, &[TlvRecord { record_type: 1000, payload: &[0; 256] }]);
        let mut stream = big;
        stream.extend(sample_frame(2));
        let mut f = Framer::new(ScriptedSource::new(vec![stream]), FramerConfig::sensor_board());
        assert_eq!(f.next_frame().unwrap().frame_number(), 2);
    }

    #[test]
    fn io_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("unplugged"))
            }
        }
        let mut f = Framer::new(Broken, FramerConfig::default());
        assert!(matches!(f.next_frame(), Err(LinkError::Io(_))));
    }
}
