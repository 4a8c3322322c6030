//! Sensor-board records: IMU samples and operator UI events.
//!
//! The sensor board sends exactly one record per frame.

use scope_types::{ImuSample, UiEvent};
use tracing::debug;

use crate::frame::{FieldReader, FrameError, TlvFrame, TlvRecord, encode_frame};

/// Record type carrying an [`ImuSample`].
pub const IMU_RECORD: u32 = 0;
/// Record type carrying a [`UiEvent`].
pub const UI_RECORD: u32 = 1;

/// Six `f32` channels plus a `u32` cycle counter.
pub const IMU_PAYLOAD_LEN: usize = 28;

/// A decoded sensor-board message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorMessage {
    Imu(ImuSample),
    Ui(UiEvent),
}

/// Decode the record of a sensor-board frame.
///
/// Returns `Ok(None)` for an empty frame, a record type this host does not
/// handle, or an unknown UI event code.
pub fn decode_sensor_frame(frame: &TlvFrame) -> Result<Option<SensorMessage>, FrameError> {
    let Some(record) = frame.records().next().transpose()? else {
        return Ok(None);
    };
    match record.record_type {
        IMU_RECORD => decode_imu(record.payload).map(|s| Some(SensorMessage::Imu(s))),
        UI_RECORD => {
            let raw = FieldReader::new(record.payload).u32()?;
            match UiEvent::try_from(raw) {
                Ok(event) => Ok(Some(SensorMessage::Ui(event))),
                Err(e) => {
                    debug!(error = %e, "Ignoring UI record");
                    Ok(None)
                }
            }
        }
        other => {
            debug!(record_type = other, "Unhandled sensor-board record");
            Ok(None)
        }
    }
}

fn decode_imu(payload: &[u8]) -> Result<ImuSample, FrameError> {
    let mut r = FieldReader::new(payload);
    Ok(ImuSample {
        a_x: r.f32()?,
        a_y: r.f32()?,
        a_z: r.f32()?,
        r_p: r.f32()?,
        r_r: r.f32()?,
        r_y: r.f32()?,
        cpu_cycles: r.u32()?,
    })
}

/// Produce a complete sensor-board frame for `message`, as the firmware
/// would.
pub fn encode_sensor_frame(frame_number: u32, time_cpu_cycles: u32, message: &SensorMessage) -> Vec<u8> {
    let mut payload = Vec::with_capacity(IMU_PAYLOAD_LEN);
    let record_type = match message {
        SensorMessage::Imu(s) => {
            for v in [s.a_x, s.a_y, s.a_z, s.r_p, s.r_r, s.r_y] {
                payload.extend_from_slice(&v.to_le_bytes());
            }
            payload.extend_from_slice(&s.cpu_cycles.to_le_bytes());
            IMU_RECORD
        }
        SensorMessage::Ui(event) => {
            payload.extend_from_slice(&(*event as u32).to_le_bytes());
            UI_RECORD
        }
    };
    encode_frame(
        frame_number,
        time_cpu_cycles,
        &[TlvRecord { record_type, payload: &payload }],
    )
}
