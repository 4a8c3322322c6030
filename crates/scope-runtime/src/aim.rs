//! [`AimController`] – the Lock → Track → Fire/Fail state machine.
//!
//! ```text
//!          >20 centred in 1.5 s            deadline, no fail reasons
//!   Lock ───────────────────────► Track ─────────────────────────────► Fire
//!    ▲                              │                                   │
//!    │                              │ deadline, any of CV / GY / RD     │
//!    │                              ▼                                   │
//!    └──────── after 1 s ──────── Fail           after 5 s ─────────────┘
//! ```
//!
//! The controller is a plain value driven by [`AimController::step`]; all
//! time comes in as milliseconds from the caller so the machine can be
//! exercised without a clock. Thresholds are wall-clock, not tick counts.
//!
//! # Inputs per tick
//!
//! | Input | Consumed in | Used for |
//! |---|---|---|
//! | fresh detection ([`DetectionFeed`]) | Lock, Track, Fire | centring, aim point |
//! | radar distance ([`AimSensors::distance`]) | Track → Fire | angular velocity, corrections |
//! | radar health ([`AimSensors::radar_healthy`]) | Track deadline | RD fail reason |
//! | gyro analysis ([`AimSensors::rotation`]) | Track deadline | GY fail reason, angular velocity |

use scope_calibration::Ballistics;
use scope_middleware::LatestReceiver;
use scope_types::{
    AimOutcome, AimOverlay, AimState, DEGREES_IN_RAD, Detection, FailReasons, OverlayInfo,
    PixelPoint, RotationAnalysis,
};
use tracing::{debug, info};

use crate::overlay;

/// Slots in the lock-phase history of centred timestamps.
pub const LOCK_HISTORY_LEN: usize = SAMPLES_TO_LOCK * 2;
/// More than this many centred frames inside the lock window acquires lock.
pub const SAMPLES_TO_LOCK: usize = 20;
pub const LOCK_WINDOW_MS: u64 = 1500;

pub const TRACK_DURATION_MS: u64 = 1500;
/// Fewer centred frames than this during tracking is a CV failure.
pub const SAMPLES_DURING_TRACK_MIN: u32 = 20;
/// Gyro variance (deg²/s²) above this is a GY failure.
pub const MAX_ROTATION_VARIANCE: f32 = 15.0;

pub const FAIL_COOLDOWN_MS: u64 = 1000;
pub const FIRE_COOLDOWN_MS: u64 = 5000;

/// A box whose centre is closer than this to the screen centre is centred.
pub const CENTERED_RADIUS_PX: f64 = 150.0;

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

/// Read access to the estimators owned by the other tasks.
pub trait AimSensors {
    /// Smoothed radar distance in metres.
    fn distance(&self) -> f32;
    /// Whether the radar has been delivering frames recently.
    fn radar_healthy(&self, now_ms: u64) -> bool;
    fn rotation(&self) -> RotationAnalysis;
}

/// Source of inference results. Each call yields a detection at most once.
pub trait DetectionFeed {
    fn next_detection(&mut self) -> Option<Detection>;
}

impl DetectionFeed for LatestReceiver<Detection> {
    fn next_detection(&mut self) -> Option<Detection> {
        self.take_fresh()
    }
}

impl DetectionFeed for Option<Detection> {
    fn next_detection(&mut self) -> Option<Detection> {
        self.take()
    }
}

/// `true` when the centre of `detection` lies within
/// [`CENTERED_RADIUS_PX`] of the screen centre.
pub fn is_centered(detection: &Detection) -> bool {
    let center = detection.center();
    let screen = PixelPoint::screen_center();
    let dx = f64::from(center.x - screen.x);
    let dy = f64::from(center.y - screen.y);
    (dx * dx + dy * dy).sqrt() < CENTERED_RADIUS_PX
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Everything one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// Overlay for the state the machine is in after this tick.
    pub overlay: OverlayInfo,
    /// Raw and corrected aim points; only while firing.
    pub aim: Option<AimOverlay>,
    /// Set on the tick that leaves tracking.
    pub outcome: Option<AimOutcome>,
}

// ────────────────────────────────────────────────────────────────────────────
// AimController
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AimController {
    state: AimState,

    lock_history: [Option<u64>; LOCK_HISTORY_LEN],
    lock_next: usize,
    recent_centered: usize,

    track_exit_ms: u64,
    track_centered: u32,

    fail_reasons: FailReasons,
    fail_exit_ms: u64,
    fire_exit_ms: u64,

    rotation: RotationAnalysis,
    last_center: Option<PixelPoint>,
    last_inference: Option<Detection>,
    angular_velocity: f32,
    target_distance: f32,
    last_aim_point: PixelPoint,
}

impl AimController {
    pub fn new() -> Self {
        Self {
            state: AimState::Lock,
            lock_history: [None; LOCK_HISTORY_LEN],
            lock_next: 0,
            recent_centered: 0,
            track_exit_ms: 0,
            track_centered: 0,
            fail_reasons: FailReasons::empty(),
            fail_exit_ms: 0,
            fire_exit_ms: 0,
            rotation: RotationAnalysis::default(),
            last_center: None,
            last_inference: None,
            angular_velocity: 0.0,
            target_distance: 0.0,
            last_aim_point: PixelPoint::screen_center(),
        }
    }

    /// Forget everything and start seeking again.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> AimState {
        self.state
    }

    pub fn fail_reasons(&self) -> FailReasons {
        self.fail_reasons
    }

    /// Gyro analysis taken at the end of the last tracking phase.
    pub fn rotation(&self) -> RotationAnalysis {
        self.rotation
    }

    /// Centre of the last centred box seen while tracking.
    pub fn last_center(&self) -> Option<PixelPoint> {
        self.last_center
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn target_distance(&self) -> f32 {
        self.target_distance
    }

    /// Advance the machine by one tick at `now_ms`.
    pub fn step(
        &mut self,
        now_ms: u64,
        detections: &mut impl DetectionFeed,
        sensors: &impl AimSensors,
        ballistics: &Ballistics,
    ) -> TickOutput {
        let mut aim = None;
        let mut outcome = None;

        match self.state {
            AimState::Lock => self.lock(now_ms, detections),
            AimState::Track => {
                outcome = self.track(now_ms, detections, sensors);
                if self.state == AimState::Fire {
                    aim = Some(self.aim_overlay(ballistics));
                }
            }
            AimState::Fire => {
                if let Some(detection) = detections.next_detection() {
                    self.last_aim_point = detection.optimal_aim_location();
                }
                aim = Some(self.aim_overlay(ballistics));
                if now_ms > self.fire_exit_ms {
                    self.enter_lock();
                }
            }
            AimState::Fail => {
                if now_ms > self.fail_exit_ms {
                    self.enter_lock();
                }
            }
        }

        TickOutput {
            overlay: self.overlay(),
            aim,
            outcome,
        }
    }

    fn lock(&mut self, now_ms: u64, detections: &mut impl DetectionFeed) {
        if detections.next_detection().is_some_and(|d| is_centered(&d)) {
            self.lock_history[self.lock_next] = Some(now_ms);
            self.lock_next = (self.lock_next + 1) % LOCK_HISTORY_LEN;
        }

        let cutoff = now_ms.saturating_sub(LOCK_WINDOW_MS);
        self.recent_centered = self
            .lock_history
            .iter()
            .flatten()
            .filter(|&&t| t >= cutoff)
            .count();

        if self.recent_centered > SAMPLES_TO_LOCK {
            self.state = AimState::Track;
            self.track_exit_ms = now_ms + TRACK_DURATION_MS;
            self.track_centered = 0;
            info!(recent_centered = self.recent_centered, "Target locked; tracking");
        }
    }

    fn track(
        &mut self,
        now_ms: u64,
        detections: &mut impl DetectionFeed,
        sensors: &impl AimSensors,
    ) -> Option<AimOutcome> {
        if let Some(detection) = detections.next_detection()
            && is_centered(&detection)
        {
            self.last_center = Some(detection.center());
            self.last_inference = Some(detection);
            self.track_centered += 1;
        }

        if now_ms <= self.track_exit_ms {
            return None;
        }

        let mut reasons = FailReasons::empty();
        if self.track_centered < SAMPLES_DURING_TRACK_MIN {
            reasons |= FailReasons::CV;
        }
        self.rotation = sensors.rotation();
        if self.rotation.variance_rotation > MAX_ROTATION_VARIANCE {
            reasons |= FailReasons::GYRO;
        }
        if !sensors.radar_healthy(now_ms) {
            reasons |= FailReasons::RADAR;
        }
        self.fail_reasons = reasons;

        if !reasons.is_empty() {
            self.state = AimState::Fail;
            self.fail_exit_ms = now_ms + FAIL_COOLDOWN_MS;
            info!(
                ?reasons,
                centered = self.track_centered,
                variance = self.rotation.variance_rotation,
                "Tracking failed"
            );
            return Some(AimOutcome::Failed { reasons });
        }

        let distance = sensors.distance();
        self.state = AimState::Fire;
        self.fire_exit_ms = now_ms + FIRE_COOLDOWN_MS;
        self.angular_velocity = self.rotation.mean_rotation / DEGREES_IN_RAD * distance;
        self.target_distance = distance;
        self.last_aim_point = self
            .last_inference
            .map_or_else(PixelPoint::screen_center, |d| d.optimal_aim_location());
        info!(
            distance,
            angular_velocity = self.angular_velocity,
            "Firing solution ready"
        );
        Some(AimOutcome::Fired {
            distance,
            angular_velocity: self.angular_velocity,
        })
    }

    fn enter_lock(&mut self) {
        debug!(from = ?self.state, "Cooldown over; seeking");
        self.state = AimState::Lock;
        self.recent_centered = 0;
    }

    /// Aim point shifted by the signed table lead, mirrored when the scope
    /// rotates left, and raised by bullet drop.
    fn aim_overlay(&self, ballistics: &Ballistics) -> AimOverlay {
        let distance = f64::from(self.target_distance);
        let velocity = f64::from(self.angular_velocity);
        let lead = ballistics.lead(distance, velocity);
        let lead = (if velocity < 0.0 { -lead } else { lead }) as i32;
        let drop = ballistics.drop(distance) as i32;
        AimOverlay {
            aim_target: self.last_aim_point,
            corrected: PixelPoint::new(self.last_aim_point.x + lead, self.last_aim_point.y - drop),
        }
    }

    fn overlay(&self) -> OverlayInfo {
        overlay::build(
            self.state,
            self.recent_centered,
            self.fail_reasons,
            self.angular_velocity,
            self.target_distance,
        )
    }
}

impl Default for AimController {
    fn default() -> Self {
        Self::new()
    }
}
