//! Frame header and record decoding.
//!
//! # Layout
//!
//! ```text
//! ┌──────────┬─────────┬───────────┬──────────┬──────────┬──────────────┬─────────┬─────────┬───────────┐
//! │ magic[8] │ version │ total_len │ platform │ frame_no │ time_cycles  │ num_obj │ num_tlv │ subframe  │
//! └──────────┴─────────┴───────────┴──────────┴──────────┴──────────────┴─────────┴─────────┴───────────┘
//!   8 bytes    u32 LE ×8 (32 bytes)                                                           = 40 bytes
//! ```
//!
//! The header is followed by `num_tlv` records, each a `{type: u32, length:
//! u32}` prefix and `length` bytes of payload. `total_len` counts the header
//! as well; devices may pad the body past the last record. The sensor board
//! leaves `num_tlv` at zero, in which case records are walked until the body
//! is used up.

use thiserror::Error;

/// Start-of-frame marker: four little-endian `u16` words
/// `0x0102, 0x0304, 0x0506, 0x0708`.
pub const MAGIC: [u8; 8] = [2, 1, 4, 3, 6, 5, 8, 7];

/// Size of [`FrameHeader`] on the wire, magic included.
pub const HEADER_LEN: usize = 40;

/// Size of the `{type, length}` prefix of every record.
pub const RECORD_HEADER_LEN: usize = 8;

/// Errors raised while decoding a frame or its records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame does not start with the magic word")]
    BadMagic,

    #[error("need {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("total length {total_len} outside [40, {max}]")]
    LengthOutOfRange { total_len: u32, max: usize },

    #[error("record {index} truncated: needs {needed} bytes, {available} left")]
    TruncatedRecord {
        index: u32,
        needed: usize,
        available: usize,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Little-endian field access
// ────────────────────────────────────────────────────────────────────────────

/// Sequential little-endian reader over a byte slice. Every accessor checks
/// bounds first.
#[derive(Debug, Clone)]
pub(crate) struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let available = self.remaining();
        if n > available {
            return Err(FrameError::Truncated { needed: n, available });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, FrameError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i16(&mut self) -> Result<i16, FrameError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32, FrameError> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FrameHeader
// ────────────────────────────────────────────────────────────────────────────

/// Fixed 40-byte frame header (magic excluded from the fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub version: u32,
    /// Length of the whole frame, header included.
    pub total_len: u32,
    pub platform: u32,
    pub frame_number: u32,
    pub time_cpu_cycles: u32,
    pub num_detected_obj: u32,
    pub num_tlvs: u32,
    pub subframe_number: u32,
}

impl FrameHeader {
    /// Decode a header from the first [`HEADER_LEN`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut r = FieldReader::new(bytes);
        if r.take(MAGIC.len())? != MAGIC {
            return Err(FrameError::BadMagic);
        }
        Ok(Self {
            version: r.u32()?,
            total_len: r.u32()?,
            platform: r.u32()?,
            frame_number: r.u32()?,
            time_cpu_cycles: r.u32()?,
            num_detected_obj: r.u32()?,
            num_tlvs: r.u32()?,
            subframe_number: r.u32()?,
        })
    }

    /// Append the wire representation, magic included.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        for field in [
            self.version,
            self.total_len,
            self.platform,
            self.frame_number,
            self.time_cpu_cycles,
            self.num_detected_obj,
            self.num_tlvs,
            self.subframe_number,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }

    /// Number of bytes that follow the header, validated against
    /// `max_frame_len`.
    pub fn body_len(&self, max_frame_len: usize) -> Result<usize, FrameError> {
        let total = self.total_len as usize;
        if total < HEADER_LEN || total > max_frame_len {
            return Err(FrameError::LengthOutOfRange {
                total_len: self.total_len,
                max: max_frame_len,
            });
        }
        Ok(total - HEADER_LEN)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

/// One `{type, length, payload}` record borrowed from a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvRecord<'a> {
    pub record_type: u32,
    pub payload: &'a [u8],
}

impl TlvRecord<'_> {
    /// Payload length as carried in the record prefix.
    pub fn length(&self) -> u32 {
        self.payload.len() as u32
    }
}

/// Iterator over the records of a [`TlvFrame`]. Stops after the first
/// decoding error.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    reader: FieldReader<'a>,
    index: u32,
    /// `None` walks until the body is exhausted.
    count: Option<u32>,
    done: bool,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<TlvRecord<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let exhausted = match self.count {
            Some(count) => self.index >= count,
            None => self.reader.remaining() == 0,
        };
        if self.done || exhausted {
            return None;
        }
        let index = self.index;
        self.index += 1;
        let result = self.read_one(index);
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl<'a> Records<'a> {
    fn read_one(&mut self, index: u32) -> Result<TlvRecord<'a>, FrameError> {
        let truncated = |e: FrameError| match e {
            FrameError::Truncated { needed, available } => FrameError::TruncatedRecord {
                index,
                needed,
                available,
            },
            other => other,
        };
        let record_type = self.reader.u32().map_err(truncated)?;
        let length = self.reader.u32().map_err(truncated)?;
        let payload = self.reader.take(length as usize).map_err(truncated)?;
        Ok(TlvRecord { record_type, payload })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TlvFrame
// ────────────────────────────────────────────────────────────────────────────

/// A complete frame as delimited by the [`Framer`][crate::Framer].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvFrame {
    pub header: FrameHeader,
    /// Everything after the header, `total_len - HEADER_LEN` bytes.
    pub body: Vec<u8>,
}

impl TlvFrame {
    /// Decode a frame from a buffer that starts with the magic word.
    pub fn from_bytes(bytes: &[u8], max_frame_len: usize) -> Result<Self, FrameError> {
        let header = FrameHeader::decode(bytes)?;
        let body_len = header.body_len(max_frame_len)?;
        let mut r = FieldReader::new(&bytes[HEADER_LEN..]);
        let body = r.take(body_len)?.to_vec();
        Ok(Self { header, body })
    }

    pub fn frame_number(&self) -> u32 {
        self.header.frame_number
    }

    pub fn total_len(&self) -> u32 {
        self.header.total_len
    }

    pub fn time_cpu_cycles(&self) -> u32 {
        self.header.time_cpu_cycles
    }

    /// Walk the records in wire order.
    pub fn records(&self) -> Records<'_> {
        Records {
            reader: FieldReader::new(&self.body),
            index: 0,
            count: (self.header.num_tlvs != 0).then_some(self.header.num_tlvs),
            done: false,
        }
    }
}

/// Build the wire bytes for a frame carrying `records`.
///
/// `total_len` and `num_tlvs` are filled in from the records; the remaining
/// header fields are zero.
pub fn encode_frame(frame_number: u32, time_cpu_cycles: u32, records: &[TlvRecord<'_>]) -> Vec<u8> {
    let body_len: usize = records
        .iter()
        .map(|r| RECORD_HEADER_LEN + r.payload.len())
        .sum();
    let header = FrameHeader {
        total_len: (HEADER_LEN + body_len) as u32,
        frame_number,
        time_cpu_cycles,
        num_tlvs: records.len() as u32,
        ..FrameHeader::default()
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body_len);
    header.write_to(&mut out);
    for record in records {
        out.extend_from_slice(&record.record_type.to_le_bytes());
        out.extend_from_slice(&record.length().to_le_bytes());
        out.extend_from_slice(record.payload);
    }
    out
}
