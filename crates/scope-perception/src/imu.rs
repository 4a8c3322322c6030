//! IMU orientation and rotation-stability estimation.
//!
//! Every accepted sample feeds two consumers:
//!
//! - a 5-sample [`RollingAverage`] per channel, from which pitch, roll and
//!   yaw rate are derived for display;
//! - the [`GyroWindow`], a 550-slot ring of raw yaw rates (degrees/s) from
//!   which the aim controller reads the mean and variance of rotation.
//!
//! The gyro window is shared between the IMU task (writer, ~800 Hz) and the
//! aim task (reader). The writer never waits for the lock: if a reader is
//! mid-computation the sample is simply dropped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

use scope_types::{DEGREES_IN_RAD, ImuSample, Orientation, RotationAnalysis};
use tracing::{debug, info, warn};

use crate::rolling::RollingAverage;

/// Number of yaw-rate samples kept for variance analysis.
pub const GYRO_WINDOW_LEN: usize = 550;

/// Samples averaged by [`GyroWindow::calibrate`].
pub const CALIBRATION_ROUNDS: usize = 5;

/// Pause between calibration rounds.
pub const CALIBRATION_INTERVAL: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// Config
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for [`ImuEstimator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuConfig {
    /// Samples with any |acceleration| above this are treated as glitches.
    pub max_acceleration: f32,
    /// Negate the yaw rate so clockwise spin reads positive.
    pub invert_yaw: bool,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            max_acceleration: 30.0,
            invert_yaw: true,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GyroWindow
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct GyroRing {
    slots: [f32; GYRO_WINDOW_LEN],
    next: usize,
}

/// Ring of recent yaw rates plus the static calibration offset.
#[derive(Debug)]
pub struct GyroWindow {
    ring: Mutex<GyroRing>,
    /// `f32` bits; written once at boot, read on every analysis.
    calibration_offset: AtomicU32,
}

impl GyroWindow {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(GyroRing {
                slots: [0.0; GYRO_WINDOW_LEN],
                next: 0,
            }),
            calibration_offset: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Store one yaw rate (degrees/s) unless the window is busy.
    ///
    /// Returns `false` when the sample was dropped because a reader held the
    /// lock.
    pub fn try_record(&self, yaw_deg: f32) -> bool {
        let mut ring = match self.ring.try_lock() {
            Ok(ring) => ring,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let slot = ring.next;
        ring.slots[slot] = yaw_deg;
        ring.next = (slot + 1) % GYRO_WINDOW_LEN;
        true
    }

    /// Mean and population variance over the whole window. The mean has the
    /// calibration offset subtracted.
    pub fn rotation_mean_and_variance(&self) -> RotationAnalysis {
        let (mean, variance) = {
            let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
            let n = GYRO_WINDOW_LEN as f32;
            let mean = ring.slots.iter().sum::<f32>() / n;
            let variance = ring
                .slots
                .iter()
                .map(|v| (v - mean) * (v - mean))
                .sum::<f32>()
                / n;
            (mean, variance)
        };
        RotationAnalysis {
            mean_rotation: mean - self.calibration_offset(),
            variance_rotation: variance,
        }
    }

    pub fn calibration_offset(&self) -> f32 {
        f32::from_bits(self.calibration_offset.load(Ordering::Acquire))
    }

    pub fn set_calibration_offset(&self, offset: f32) {
        self.calibration_offset.store(offset.to_bits(), Ordering::Release);
    }

    /// Estimate the gyro's resting bias and store it as the calibration
    /// offset. Blocks for roughly ten seconds; the rig must be still.
    pub fn calibrate(&self) -> f32 {
        self.calibrate_with_interval(CALIBRATION_INTERVAL)
    }

    /// [`calibrate`][Self::calibrate] with a custom pause between rounds.
    ///
    /// Each round reads the raw window mean (any previous offset is ignored)
    /// after sleeping for `interval`.
    pub fn calibrate_with_interval(&self, interval: Duration) -> f32 {
        let previous = self.calibration_offset();
        let mut total = 0.0f32;
        for round in 0..CALIBRATION_ROUNDS {
            thread::sleep(interval);
            let raw_mean = self.rotation_mean_and_variance().mean_rotation + previous;
            debug!(round, raw_mean, "Gyro calibration sample");
            total += raw_mean;
        }
        let offset = total / CALIBRATION_ROUNDS as f32;
        self.set_calibration_offset(offset);
        info!(offset, "IMU calibrated");
        offset
    }
}

impl Default for GyroWindow {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ImuEstimator
// ────────────────────────────────────────────────────────────────────────────

/// Per-sample IMU processing: glitch rejection, smoothing and gyro window
/// bookkeeping.
#[derive(Debug)]
pub struct ImuEstimator {
    config: ImuConfig,
    a_x: RollingAverage<5>,
    a_y: RollingAverage<5>,
    a_z: RollingAverage<5>,
    r_y: RollingAverage<5>,
    window: Arc<GyroWindow>,
    rejected: u64,
    dropped: u64,
}

impl ImuEstimator {
    pub fn new(config: ImuConfig, window: Arc<GyroWindow>) -> Self {
        Self {
            config,
            a_x: RollingAverage::new(),
            a_y: RollingAverage::new(),
            a_z: RollingAverage::new(),
            r_y: RollingAverage::new(),
            window,
            rejected: 0,
            dropped: 0,
        }
    }

    /// Shared handle to the gyro window this estimator writes into.
    pub fn window(&self) -> Arc<GyroWindow> {
        Arc::clone(&self.window)
    }

    /// Process one sample. Returns the updated orientation, or `None` when
    /// the sample was rejected as a glitch.
    pub fn ingest(&mut self, sample: ImuSample) -> Option<Orientation> {
        let limit = self.config.max_acceleration;
        if sample.a_x.abs() > limit || sample.a_y.abs() > limit || sample.a_z.abs() > limit {
            self.rejected += 1;
            warn!(
                a_x = sample.a_x,
                a_y = sample.a_y,
                a_z = sample.a_z,
                limit,
                "Unexpectedly high acceleration; dropping IMU sample"
            );
            return None;
        }

        let yaw_rate = if self.config.invert_yaw { -sample.r_y } else { sample.r_y };

        let a_x = self.a_x.push(sample.a_x);
        let a_y = self.a_y.push(sample.a_y);
        let a_z = self.a_z.push(sample.a_z);
        let r_y = self.r_y.push(yaw_rate);

        if !self.window.try_record(yaw_rate * DEGREES_IN_RAD) {
            self.dropped += 1;
        }

        Some(Orientation {
            roll: (a_x / a_z).atan() * DEGREES_IN_RAD,
            pitch: (a_y / a_z).atan() * DEGREES_IN_RAD,
            rotation: r_y * DEGREES_IN_RAD,
        })
    }

    /// Samples discarded as acceleration glitches.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Samples that did not make it into the gyro window due to contention.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
