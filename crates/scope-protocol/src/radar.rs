//! Radar point-cloud records.
//!
//! A radar frame with detections starts with a spherical-points record
//! immediately followed by a side-info record carrying one SNR/noise pair per
//! point. Frames whose first record is anything else carry no detections and
//! are skipped.

use thiserror::Error;
use tracing::warn;

use scope_types::SphericalPoint;

use crate::frame::{FieldReader, FrameError, TlvFrame};

/// Record type carrying [`SphericalPoint`]s.
pub const SPHERICAL_POINTS: u32 = 1000;
/// Record type carrying per-point SNR and noise.
pub const SIDE_INFO: u32 = 7;

/// Bytes per spherical point: range, azimuth, elevation, doppler (f32 each).
pub const SPHERICAL_POINT_LEN: usize = 16;
/// Bytes per side-info entry: snr, noise (i16 each).
pub const SIDE_INFO_LEN: usize = 4;

/// Points beyond this many are dropped from a frame.
pub const MAX_CLOUD_POINTS: usize = 325;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RadarDecodeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("expected record type {expected}, found {found:?}")]
    UnexpectedRecord { expected: u32, found: Option<u32> },

    #[error("record type {record_type} length {length} is not a multiple of {stride}")]
    BadPayloadLength {
        record_type: u32,
        length: usize,
        stride: usize,
    },

    #[error("{points} points but {side_info} side-info entries")]
    PointCountMismatch { points: usize, side_info: usize },
}

/// One detection as it arrived on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarDetection {
    pub point: SphericalPoint,
    pub snr: i16,
    pub noise: i16,
}

/// Decoded detections of a single radar frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarFrame {
    pub frame_number: u32,
    pub time_cpu_cycles: u32,
    pub detections: Vec<RadarDetection>,
}

/// Decode the point-cloud records of `frame`.
///
/// Returns `Ok(None)` when the frame carries no point cloud.
pub fn decode_point_cloud(frame: &TlvFrame) -> Result<Option<RadarFrame>, RadarDecodeError> {
    let mut records = frame.records();

    let spherical = match records.next() {
        Some(record) => record?,
        None => return Ok(None),
    };
    if spherical.record_type != SPHERICAL_POINTS {
        return Ok(None);
    }
    let points = decode_spherical(spherical.payload)?;

    let side = match records.next() {
        Some(record) => record?,
        None => {
            return Err(RadarDecodeError::UnexpectedRecord {
                expected: SIDE_INFO,
                found: None,
            });
        }
    };
    if side.record_type != SIDE_INFO {
        return Err(RadarDecodeError::UnexpectedRecord {
            expected: SIDE_INFO,
            found: Some(side.record_type),
        });
    }
    let side_info = decode_side_info(side.payload)?;

    if points.len() != side_info.len() {
        return Err(RadarDecodeError::PointCountMismatch {
            points: points.len(),
            side_info: side_info.len(),
        });
    }

    let mut detections: Vec<RadarDetection> = points
        .into_iter()
        .zip(side_info)
        .map(|(point, (snr, noise))| RadarDetection { point, snr, noise })
        .collect();
    if detections.len() > MAX_CLOUD_POINTS {
        warn!(
            frame_number = frame.frame_number(),
            points = detections.len(),
            max = MAX_CLOUD_POINTS,
            "Point cloud exceeds capacity; clipping"
        );
        detections.truncate(MAX_CLOUD_POINTS);
    }

    Ok(Some(RadarFrame {
        frame_number: frame.frame_number(),
        time_cpu_cycles: frame.time_cpu_cycles(),
        detections,
    }))
}

fn check_stride(record_type: u32, payload: &[u8], stride: usize) -> Result<usize, RadarDecodeError> {
    if payload.len() % stride != 0 {
        return Err(RadarDecodeError::BadPayloadLength {
            record_type,
            length: payload.len(),
            stride,
        });
    }
    Ok(payload.len() / stride)
}

fn decode_spherical(payload: &[u8]) -> Result<Vec<SphericalPoint>, RadarDecodeError> {
    let count = check_stride(SPHERICAL_POINTS, payload, SPHERICAL_POINT_LEN)?;
    let mut r = FieldReader::new(payload);
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push(SphericalPoint {
            range: r.f32()?,
            azimuth: r.f32()?,
            elevation: r.f32()?,
            velocity: r.f32()?,
        });
    }
    Ok(points)
}

fn decode_side_info(payload: &[u8]) -> Result<Vec<(i16, i16)>, RadarDecodeError> {
    let count = check_stride(SIDE_INFO, payload, SIDE_INFO_LEN)?;
    let mut r = FieldReader::new(payload);
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push((r.i16()?, r.i16()?));
    }
    Ok(entries)
}

/// Serialise detections into a spherical-points payload and a side-info
/// payload, in that order.
pub fn encode_point_cloud(detections: &[RadarDetection]) -> (Vec<u8>, Vec<u8>) {
    let mut points = Vec::with_capacity(detections.len() * SPHERICAL_POINT_LEN);
    let mut side = Vec::with_capacity(detections.len() * SIDE_INFO_LEN);
    for d in detections {
        for v in [d.point.range, d.point.azimuth, d.point.elevation, d.point.velocity] {
            points.extend_from_slice(&v.to_le_bytes());
        }
        side.extend_from_slice(&d.snr.to_le_bytes());
        side.extend_from_slice(&d.noise.to_le_bytes());
    }
    (points, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{TlvRecord, encode_frame};

    fn detection(range: f32) -> RadarDetection {
        RadarDetection {
            point: SphericalPoint { range, azimuth: 0.1, elevation: -0.05, velocity: 0.5 },
            snr: 120,
            noise: -4,
        }
    }

    fn cloud_frame(detections: &[RadarDetection]) -> TlvFrame {
        let (points, side) = encode_point_cloud(detections);
        let bytes = encode_frame(
            77,
            500,
            &[
                TlvRecord { record_type: SPHERICAL_POINTS, payload: &points },
                TlvRecord { record_type: SIDE_INFO, payload: &side },
            ],
        );
        TlvFrame::from_bytes(&bytes, usize::MAX).unwrap()
    }

    #[test]
    fn decodes_points_with_side_info() {
        let input = [detection(10.0), detection(12.5)];
        let decoded = decode_point_cloud(&cloud_frame(&input)).unwrap().unwrap();
        assert_eq!(decoded.frame_number, 77);
        assert_eq!(decoded.time_cpu_cycles, 500);
        assert_eq!(decoded.detections, input);
    }

    #[test]
    fn frame_without_point_record_is_skipped() {
        let bytes = encode_frame(1, 0, &[TlvRecord { record_type: 9, payload: &[0; 8] }]);
        let frame = TlvFrame::from_bytes(&bytes, usize::MAX).unwrap();
        assert_eq!(decode_point_cloud(&frame), Ok(None));
    }

    #[test]
    fn missing_side_info_is_rejected() {
        let (points, _) = encode_point_cloud(&[detection(8.0)]);
        let bytes = encode_frame(
            1,
            0,
            &[
                TlvRecord { record_type: SPHERICAL_POINTS, payload: &points },
                TlvRecord { record_type: 8, payload: &[] },
            ],
        );
        let frame = TlvFrame::from_bytes(&bytes, usize::MAX).unwrap();
        assert_eq!(
            decode_point_cloud(&frame),
            Err(RadarDecodeError::UnexpectedRecord { expected: SIDE_INFO, found: Some(8) })
        );
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let (points, _) = encode_point_cloud(&[detection(8.0), detection(9.0)]);
        let (_, side) = encode_point_cloud(&[detection(8.0)]);
        let bytes = encode_frame(
            1,
            0,
            &[
                TlvRecord { record_type: SPHERICAL_POINTS, payload: &points },
                TlvRecord { record_type: SIDE_INFO, payload: &side },
            ],
        );
        let frame = TlvFrame::from_bytes(&bytes, usize::MAX).unwrap();
        assert_eq!(
            decode_point_cloud(&frame),
            Err(RadarDecodeError::PointCountMismatch { points: 2, side_info: 1 })
        );
    }

    #[test]
    fn ragged_point_payload_is_rejected() {
        let bytes = encode_frame(
            1,
            0,
            &[TlvRecord { record_type: SPHERICAL_POINTS, payload: &[0; 17] }],
        );
        let frame = TlvFrame::from_bytes(&bytes, usize::MAX).unwrap();
        assert!(matches!(
            decode_point_cloud(&frame),
            Err(RadarDecodeError::BadPayloadLength { length: 17, .. })
        ));
    }

    #[test]
    fn oversized_cloud_is_clipped() {
        let input: Vec<_> = (0..MAX_CLOUD_POINTS + 10).map(|i| detection(i as f32)).collect();
        let decoded = decode_point_cloud(&cloud_frame(&input)).unwrap().unwrap();
        assert_eq!(decoded.detections.len(), MAX_CLOUD_POINTS);
        assert_eq!(decoded.detections[0], input[0]);
    }
}
