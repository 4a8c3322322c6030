use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Degrees per radian, as used throughout the sensor pipeline.
pub const DEGREES_IN_RAD: f32 = 57.2958;

/// Width of the video frame the detector reports pixel boxes in.
pub const SCREEN_WIDTH_PIXELS: i32 = 800;
/// Height of the video frame the detector reports pixel boxes in.
pub const SCREEN_HEIGHT_PIXELS: i32 = 600;

// ────────────────────────────────────────────────────────────────────────────
// Radar
// ────────────────────────────────────────────────────────────────────────────

/// One radar detection as reported on the wire, in the sensor's spherical
/// frame. Angles are radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphericalPoint {
    pub range: f32,
    pub azimuth: f32,
    pub elevation: f32,
    /// Doppler velocity (m/s).
    pub velocity: f32,
}

/// One radar detection in sensor-local Cartesian coordinates (metres).
///
/// `y` is the forward axis; `x` and `z` are inverted relative to the
/// spherical frame because the sensor is mounted upside down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub snr: i16,
    pub noise: i16,
}

/// A plain 3-D position, e.g. the centroid of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// All detections from a single radar frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<PointSample>,
    pub frame_number: u32,
    /// Sensor CPU cycle counter at frame capture.
    pub time_cpu_cycles: u32,
    /// Host wall-clock time the frame was decoded.
    pub timestamp: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// IMU
// ────────────────────────────────────────────────────────────────────────────

/// Raw sample from the sensor-board IMU.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    /// Linear acceleration (g).
    pub a_x: f32,
    pub a_y: f32,
    pub a_z: f32,
    /// Angular rate: pitch, roll and yaw (rad/s).
    pub r_p: f32,
    pub r_r: f32,
    pub r_y: f32,
    /// Sensor-board CPU cycles since boot.
    pub cpu_cycles: u32,
}

/// Smoothed attitude of the rig, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f32,
    pub roll: f32,
    pub rotation: f32,
}

/// Mean and population variance of the yaw rate (degrees/s) over the gyro
/// window. The mean is already corrected by the static calibration offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RotationAnalysis {
    pub mean_rotation: f32,
    pub variance_rotation: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Vision / aiming
// ────────────────────────────────────────────────────────────────────────────

/// A pixel coordinate on the video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Centre of the video frame.
    pub const fn screen_center() -> Self {
        Self::new(SCREEN_WIDTH_PIXELS / 2, SCREEN_HEIGHT_PIXELS / 2)
    }
}

/// Bounding box of a detected person, as produced by the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Detection {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Detection {
    /// Geometric centre of the box.
    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(self.left + self.width / 2, self.top + self.height / 2)
    }

    /// Preferred point of aim: horizontally centred, a quarter of the way
    /// down from the top of the box (upper torso).
    pub fn optimal_aim_location(&self) -> PixelPoint {
        PixelPoint::new(self.left + self.width / 2, self.top + self.height / 4)
    }
}

/// Raw and ballistics-corrected aim points published while firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AimOverlay {
    pub aim_target: PixelPoint,
    /// `aim_target` shifted by lead (x) and bullet drop (y).
    pub corrected: PixelPoint,
}

/// Lock-progress bar drawn while seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressBar {
    pub width: i32,
    pub height: i32,
    /// 0–100.
    pub percentage_complete: i32,
    pub top_left: PixelPoint,
}

/// State of the aim controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AimState {
    /// Waiting for the target to stay centred long enough.
    #[default]
    Lock,
    /// Target acquired; collecting evidence before deciding.
    Track,
    /// Firing solution available; crosshair is corrected.
    Fire,
    /// Tracking rejected; cooling down before seeking again.
    Fail,
}

bitflags! {
    /// Reasons a tracking attempt was rejected. More than one may be set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FailReasons: u8 {
        /// Too few centred detections during tracking.
        const CV = 0b001;
        /// Rig was rotating too erratically.
        const GYRO = 0b010;
        /// Radar stream went quiet.
        const RADAR = 0b100;
    }
}

/// Everything the renderer needs to draw the status overlay for one video
/// frame. Always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverlayInfo {
    pub state: AimState,
    pub status_text: String,
    pub text_x_offset: i32,
    pub progress: ProgressBar,
    pub angular_velocity: f32,
    pub distance: f32,
}

impl OverlayInfo {
    /// Lock progress is only meaningful while seeking.
    pub fn shows_progress_bar(&self) -> bool {
        self.state == AimState::Lock
    }

    pub fn shows_corrected_crosshair(&self) -> bool {
        self.state == AimState::Fire
    }

    pub fn shows_angular_velocity(&self) -> bool {
        self.state == AimState::Fire
    }

    pub fn shows_bounding_hashes(&self) -> bool {
        matches!(self.state, AimState::Lock | AimState::Track)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operator input
// ────────────────────────────────────────────────────────────────────────────

/// A discrete input from the rotary encoder or push buttons on the sensor
/// board. Discriminants match the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum UiEvent {
    RotaryButton = 0,
    RotaryLeft = 1,
    RotaryRight = 2,
    Button0 = 3,
    Button1 = 4,
}

impl TryFrom<u32> for UiEvent {
    type Error = ScopeError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(UiEvent::RotaryButton),
            1 => Ok(UiEvent::RotaryLeft),
            2 => Ok(UiEvent::RotaryRight),
            3 => Ok(UiEvent::Button0),
            4 => Ok(UiEvent::Button1),
            other => Err(ScopeError::Decode(format!("unknown UI event {other}"))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Event bus
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "scope-middleware::link::radar"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Operator pressed or turned something.
    Ui(UiEvent),
    /// A serial link stalled and is being reopened.
    LinkReset { link: String, zero_reads: u32 },
    /// Calibration data could not be trusted or persisted.
    CalibrationFault { message: String },
    /// The aim controller left the tracking phase.
    AimOutcome(AimOutcome),
}

/// Result of one tracking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AimOutcome {
    Fired { distance: f32, angular_velocity: f32 },
    Failed { reasons: FailReasons },
}

/// Global error type shared by the scope crates.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ScopeError {
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Link {link} requires a reset")]
    LinkReset { link: String },

    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Integrity Error: {0}")]
    Integrity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_center_and_aim_location() {
        let det = Detection { left: 100, top: 40, width: 60, height: 200 };
        assert_eq!(det.center(), PixelPoint::new(130, 140));
        assert_eq!(det.optimal_aim_location(), PixelPoint::new(130, 90));
    }

    #[test]
    fn screen_center_is_half_resolution() {
        assert_eq!(PixelPoint::screen_center(), PixelPoint::new(400, 300));
    }

    #[test]
    fn ui_event_from_wire_value() {
        assert_eq!(UiEvent::try_from(2).unwrap(), UiEvent::RotaryRight);
        assert_eq!(UiEvent::try_from(4).unwrap(), UiEvent::Button1);
        assert!(UiEvent::try_from(5).is_err());
    }

    #[test]
    fn overlay_render_hints_follow_state() {
        let mut info = OverlayInfo::default();
        assert!(info.shows_progress_bar());
        assert!(info.shows_bounding_hashes());
        assert!(!info.shows_corrected_crosshair());

        info.state = AimState::Fire;
        assert!(info.shows_corrected_crosshair());
        assert!(info.shows_angular_velocity());
        assert!(!info.shows_bounding_hashes());

        info.state = AimState::Fail;
        assert!(!info.shows_progress_bar());
        assert!(!info.shows_bounding_hashes());
    }

    #[test]
    fn fail_reasons_combine() {
        let reasons = FailReasons::CV | FailReasons::RADAR;
        assert!(reasons.contains(FailReasons::CV));
        assert!(!reasons.contains(FailReasons::GYRO));
        assert_eq!(reasons.bits(), 0b101);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "scope-runtime::aim",
            EventPayload::AimOutcome(AimOutcome::Failed {
                reasons: FailReasons::GYRO,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::AimOutcome(AimOutcome::Failed { reasons }) => {
                assert_eq!(reasons, FailReasons::GYRO);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn scope_error_display() {
        let err = ScopeError::LinkReset { link: "radar".to_string() };
        assert!(err.to_string().contains("radar"));

        let err2 = ScopeError::Integrity("crc mismatch".to_string());
        assert!(err2.to_string().contains("crc mismatch"));
    }
}
