//! Radar distance estimation.
//!
//! The sensor sits inside a metal housing and sees strong reflections off it,
//! so every cloud first goes through a rough filter that keeps only points
//! near the bore line and beyond a minimum range. The surviving points are
//! averaged into a centroid whose forward (`y`) component, smoothed over the
//! last few frames, is the published target distance.
//!
//! ```text
//! PointCloud ──▶ rough_filter ──▶ centroid ──▶ RollingAverage<5> ──▶ distance
//!                                    │
//!                                    └──▶ refine_around (optional second pass)
//! ```

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use scope_protocol::RadarFrame;
use scope_types::{Point3, PointCloud, PointSample, SphericalPoint};
use tracing::trace;

use crate::rolling::RollingAverage;

/// Points with |x| or |z| at or above this are housing reflections.
pub const ROUGH_REJECTION_OFFSET: f32 = 100.0;
/// Points at or closer than this (metres, forward) are housing reflections.
pub const MINIMUM_VIABLE_DISTANCE: f32 = 6.0;
/// Refinement keeps points strictly closer than this to the given mean.
pub const FINE_REJECTION_OFFSET: f32 = 5.0;

/// Frames remembered by [`RadarHealth`].
pub const HISTORY_LEN: usize = 60;
/// Window over which recent frames are counted (ms).
pub const RECENT_WINDOW_MS: u64 = 3500;
/// More than this many frames inside the window counts as healthy.
pub const MINIMUM_RECENT_FRAMES: usize = 5;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// Convert a spherical detection to sensor-local Cartesian coordinates.
///
/// The sensor is mounted upside down, hence the sign flips on `x` and `z`.
pub fn to_cartesian(point: &SphericalPoint, snr: i16, noise: i16) -> PointSample {
    let (sin_el, cos_el) = point.elevation.sin_cos();
    let (sin_az, cos_az) = point.azimuth.sin_cos();
    PointSample {
        x: -(point.range * cos_el * sin_az),
        y: point.range * cos_el * cos_az,
        z: -(point.range * sin_el),
        snr,
        noise,
    }
}

/// Build a Cartesian [`PointCloud`] from a decoded radar frame.
pub fn point_cloud(frame: &RadarFrame, timestamp: DateTime<Utc>) -> PointCloud {
    PointCloud {
        points: frame
            .detections
            .iter()
            .map(|d| to_cartesian(&d.point, d.snr, d.noise))
            .collect(),
        frame_number: frame.frame_number,
        time_cpu_cycles: frame.time_cpu_cycles,
        timestamp,
    }
}

/// Keep points near the bore line and beyond the housing.
pub fn rough_filter(points: &[PointSample]) -> Vec<PointSample> {
    points
        .iter()
        .filter(|p| {
            p.x.abs() < ROUGH_REJECTION_OFFSET
                && p.z.abs() < ROUGH_REJECTION_OFFSET
                && p.y > MINIMUM_VIABLE_DISTANCE
        })
        .copied()
        .collect()
}

/// Keep points within [`FINE_REJECTION_OFFSET`] of `mean`.
pub fn refine_around(points: &[PointSample], mean: Point3) -> Vec<PointSample> {
    points
        .iter()
        .filter(|p| {
            let (dx, dy, dz) = (p.x - mean.x, p.y - mean.y, p.z - mean.z);
            (dx * dx + dy * dy + dz * dz).sqrt() < FINE_REJECTION_OFFSET
        })
        .copied()
        .collect()
}

/// Arithmetic mean position, accumulated in `f64`. `None` for no points.
pub fn centroid(points: &[PointSample]) -> Option<Point3> {
    if points.is_empty() {
        return None;
    }
    let (sx, sy, sz) = points.iter().fold((0.0f64, 0.0f64, 0.0f64), |(x, y, z), p| {
        (x + f64::from(p.x), y + f64::from(p.y), z + f64::from(p.z))
    });
    let n = points.len() as f64;
    Some(Point3 {
        x: (sx / n) as f32,
        y: (sy / n) as f32,
        z: (sz / n) as f32,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// RadarEstimator
// ────────────────────────────────────────────────────────────────────────────

/// Smoothed target distance from successive point clouds.
#[derive(Debug, Default)]
pub struct RadarEstimator {
    average: RollingAverage<5>,
    last: Option<f32>,
}

impl RadarEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one cloud; returns the updated distance, or `None` when every
    /// point was rejected (the previous distance stays in effect).
    pub fn filter_and_average(&mut self, cloud: &PointCloud) -> Option<f32> {
        let kept = rough_filter(&cloud.points);
        let center = centroid(&kept)?;
        let distance = self.average.push(center.y);
        trace!(
            frame_number = cloud.frame_number,
            points = cloud.points.len(),
            kept = kept.len(),
            distance,
            "Radar distance updated"
        );
        self.last = Some(distance);
        Some(distance)
    }

    /// Most recent published distance.
    pub fn distance(&self) -> Option<f32> {
        self.last
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RadarHealth
// ────────────────────────────────────────────────────────────────────────────

/// Lifetime counters of received radar traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadarHistory {
    pub total_frames: u64,
    pub total_points: u64,
}

#[derive(Debug)]
struct HealthState {
    arrivals: [Option<u64>; HISTORY_LEN],
    next: usize,
    history: RadarHistory,
}

/// Records radar frame arrivals and answers whether the stream is alive.
///
/// Written by the radar task, read by the aim task; each call holds the lock
/// only for the duration of a copy or a 60-slot scan.
#[derive(Debug)]
pub struct RadarHealth {
    state: Mutex<HealthState>,
}

impl RadarHealth {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HealthState {
                arrivals: [None; HISTORY_LEN],
                next: 0,
                history: RadarHistory::default(),
            }),
        }
    }

    /// Note a frame with `points` detections arriving at `now_ms`.
    pub fn record_frame(&self, now_ms: u64, points: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state.next;
        state.arrivals[slot] = Some(now_ms);
        state.next = (slot + 1) % HISTORY_LEN;
        state.history.total_frames += 1;
        state.history.total_points += points as u64;
    }

    /// `true` when more than [`MINIMUM_RECENT_FRAMES`] frames arrived within
    /// the last [`RECENT_WINDOW_MS`]. Always `false` before the process has
    /// been up for that long.
    pub fn received_sufficient_frames_recently(&self, now_ms: u64) -> bool {
        if now_ms < RECENT_WINDOW_MS {
            return false;
        }
        let cutoff = now_ms - RECENT_WINDOW_MS;
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let recent = state
            .arrivals
            .iter()
            .flatten()
            .filter(|&&t| t >= cutoff)
            .count();
        recent > MINIMUM_RECENT_FRAMES
    }

    pub fn history(&self) -> RadarHistory {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).history
    }
}

impl Default for RadarHealth {
    fn default() -> Self {
        Self::new()
    }
}
