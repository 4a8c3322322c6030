//! Status overlay layout.
//!
//! Text offsets are pixel columns tuned so each label sits roughly centred
//! over the crosshair on an 800×600 frame.

use scope_types::{AimState, FailReasons, OverlayInfo, PixelPoint, ProgressBar};

use crate::aim::SAMPLES_TO_LOCK;

pub const SEEKING_TEXT_X: i32 = 265;
pub const TRACKING_TEXT_X: i32 = 330;
pub const FAILED_TEXT_X: i32 = 330;
/// Each reported fail reason shifts the label this far left.
pub const FAILED_REASON_SHIFT: i32 = 20;
pub const BLANK_TEXT_X: i32 = 341;

pub const PROGRESS_BAR_WIDTH: i32 = 100;
pub const PROGRESS_BAR_HEIGHT: i32 = 20;
pub const PROGRESS_BAR_TOP_LEFT: PixelPoint = PixelPoint::new(420, 271);

/// Lock progress: centred frames in the window as a share of the frames
/// needed to lock, capped at 100.
pub fn lock_progress(recent_centered: usize) -> ProgressBar {
    let pct = (recent_centered * 100 / SAMPLES_TO_LOCK).min(100);
    ProgressBar {
        width: PROGRESS_BAR_WIDTH,
        height: PROGRESS_BAR_HEIGHT,
        percentage_complete: pct as i32,
        top_left: PROGRESS_BAR_TOP_LEFT,
    }
}

/// `FAILED [CV GY RD]`, listing only the reasons that are set.
pub fn failed_text(reasons: FailReasons) -> (String, i32) {
    let mut text = String::from("FAILED [");
    let mut x = FAILED_TEXT_X;
    for (flag, label) in [
        (FailReasons::CV, "CV"),
        (FailReasons::GYRO, " GY"),
        (FailReasons::RADAR, " RD"),
    ] {
        if reasons.contains(flag) {
            text.push_str(label);
            x -= FAILED_REASON_SHIFT;
        }
    }
    text.push(']');
    (text, x)
}

/// Full overlay for `state`. `recent_centered` only matters while locking
/// and `reasons` only while failed.
pub fn build(
    state: AimState,
    recent_centered: usize,
    reasons: FailReasons,
    angular_velocity: f32,
    distance: f32,
) -> OverlayInfo {
    let (status_text, text_x_offset, progress) = match state {
        AimState::Lock => ("SEEKING".to_string(), SEEKING_TEXT_X, lock_progress(recent_centered)),
        AimState::Track => ("TRACKING".to_string(), TRACKING_TEXT_X, ProgressBar::default()),
        AimState::Fail => {
            let (text, x) = failed_text(reasons);
            (text, x, ProgressBar::default())
        }
        AimState::Fire => (" ".to_string(), BLANK_TEXT_X, ProgressBar::default()),
    };
    OverlayInfo {
        state,
        status_text,
        text_x_offset,
        progress,
        angular_velocity,
        distance,
    }
}
