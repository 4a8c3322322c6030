//! Calibration table and its on-disk form.
//!
//! # File layout
//!
//! All integers little-endian, no padding; 54 bytes in total.
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | CRC-32 (ISO-HDLC) of bytes 4..54       |
//! | 4      | 10   | `drop[5]` as i16                       |
//! | 14     | 40   | `lead[5][4]` as i16, distance-major    |
//!
//! A file whose checksum does not match is refused outright; the caller
//! decides whether to fall back to a blank table.

use std::fs;
use std::io;
use std::path::Path;

use crc::{CRC_32_ISO_HDLC, Crc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Distance grid points (10, 15, 20, 25, 30 m).
pub const DISTANCE_POINTS: usize = 5;
pub const DISTANCE_START_M: f64 = 10.0;
pub const DISTANCE_STEP_M: f64 = 5.0;
pub const DISTANCE_END_M: f64 = DISTANCE_START_M + DISTANCE_STEP_M * (DISTANCE_POINTS - 1) as f64;

/// Velocity grid points (0, 1, 2, 3 m/s).
pub const VELOCITY_POINTS: usize = 4;
pub const VELOCITY_START: f64 = 0.0;
pub const VELOCITY_STEP: f64 = 1.0;
pub const VELOCITY_END: f64 = VELOCITY_START + VELOCITY_STEP * (VELOCITY_POINTS - 1) as f64;

const CRC_LEN: usize = 4;
const PAYLOAD_LEN: usize = 2 * (DISTANCE_POINTS + DISTANCE_POINTS * VELOCITY_POINTS);

/// Size of a calibration file in bytes.
pub const FILE_LEN: usize = CRC_LEN + PAYLOAD_LEN;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// ────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from calibration storage and lookup.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("calibration file I/O: {0}")]
    Io(#[from] io::Error),
    #[error("calibration file is {found} bytes, expected {expected}")]
    BadLength { expected: usize, found: usize },
    #[error("calibration CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },
    #[error("no {kind:?} calibration point at distance index {distance}, velocity index {velocity}")]
    IndexOutOfRange {
        kind: CalibrationKind,
        distance: usize,
        velocity: usize,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// CalibrationTable
// ────────────────────────────────────────────────────────────────────────────

/// Which half of the table a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationKind {
    /// Vertical pixel offset per distance; the velocity index is ignored.
    Drop,
    /// Horizontal pixel offset per distance × angular velocity.
    Lead,
}

/// Pixel offsets measured at each grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalibrationTable {
    pub drop: [i16; DISTANCE_POINTS],
    pub lead: [[i16; VELOCITY_POINTS]; DISTANCE_POINTS],
}

impl CalibrationTable {
    /// Distance in metres of grid index `index`.
    pub fn distance_at(index: usize) -> f64 {
        DISTANCE_START_M + DISTANCE_STEP_M * index as f64
    }

    /// Angular velocity of grid index `index`.
    pub fn velocity_at(index: usize) -> f64 {
        VELOCITY_START + VELOCITY_STEP * index as f64
    }

    pub fn get(
        &self,
        kind: CalibrationKind,
        distance: usize,
        velocity: usize,
    ) -> Result<i16, CalibrationError> {
        let out_of_range = || CalibrationError::IndexOutOfRange { kind, distance, velocity };
        match kind {
            CalibrationKind::Drop => self.drop.get(distance).copied().ok_or_else(out_of_range),
            CalibrationKind::Lead => self
                .lead
                .get(distance)
                .and_then(|row| row.get(velocity))
                .copied()
                .ok_or_else(out_of_range),
        }
    }

    /// Overwrite one grid value. Interpolators built from this table are not
    /// touched; rebuild them explicitly.
    pub fn set(
        &mut self,
        kind: CalibrationKind,
        distance: usize,
        velocity: usize,
        value: i16,
    ) -> Result<(), CalibrationError> {
        let out_of_range = || CalibrationError::IndexOutOfRange { kind, distance, velocity };
        let slot = match kind {
            CalibrationKind::Drop => self.drop.get_mut(distance),
            CalibrationKind::Lead => self.lead.get_mut(distance).and_then(|row| row.get_mut(velocity)),
        };
        *slot.ok_or_else(out_of_range)? = value;
        Ok(())
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAYLOAD_LEN);
        for v in self.drop {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in self.lead.iter().flatten() {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Checksum over the serialised drop and lead values.
    pub fn crc32(&self) -> u32 {
        CRC32.checksum(&self.payload())
    }

    /// Serialise with a freshly computed CRC prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = Vec::with_capacity(FILE_LEN);
        out.extend_from_slice(&CRC32.checksum(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    /// Parse and verify a serialised table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CalibrationError> {
        if bytes.len() != FILE_LEN {
            return Err(CalibrationError::BadLength { expected: FILE_LEN, found: bytes.len() });
        }
        let (crc, payload) = bytes.split_at(CRC_LEN);
        let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let computed = CRC32.checksum(payload);
        if stored != computed {
            return Err(CalibrationError::CrcMismatch { stored, computed });
        }

        let mut values = payload
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]));
        let mut table = Self::default();
        for (slot, value) in table.drop.iter_mut().chain(table.lead.iter_mut().flatten()).zip(&mut values) {
            *slot = value;
        }
        Ok(table)
    }

    /// Read and verify the table stored at `path`.
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let bytes = fs::read(path)?;
        let table = Self::from_bytes(&bytes)?;
        info!(path = %path.display(), "Loaded calibration data");
        Ok(table)
    }

    /// Write the table to `path`, recomputing the CRC and creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes())?;
        debug!(path = %path.display(), crc = self.crc32(), "Saved calibration data");
        Ok(())
    }
}
