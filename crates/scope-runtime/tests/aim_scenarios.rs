//! Scripted runs of the aim controller with synthetic sensors.

use scope_calibration::{Ballistics, CalibrationTable};
use scope_runtime::aim::{FIRE_COOLDOWN_MS, FAIL_COOLDOWN_MS, LOCK_WINDOW_MS, TRACK_DURATION_MS};
use scope_runtime::{AimController, AimSensors, TickOutput};
use scope_types::{AimOutcome, AimState, Detection, FailReasons, PixelPoint, RotationAnalysis};

const CENTERED: Detection = Detection { left: 350, top: 200, width: 100, height: 200 };
const OFF_CENTER: Detection = Detection { left: 20, top: 20, width: 60, height: 120 };
const STEP_MS: u64 = 10;

struct Scripted {
    distance: f32,
    healthy: bool,
    rotation: RotationAnalysis,
}

impl Scripted {
    fn steady() -> Self {
        Self {
            distance: 20.0,
            healthy: true,
            rotation: RotationAnalysis { mean_rotation: 1.0, variance_rotation: 5.0 },
        }
    }
}

impl AimSensors for Scripted {
    fn distance(&self) -> f32 {
        self.distance
    }

    fn radar_healthy(&self, _now_ms: u64) -> bool {
        self.healthy
    }

    fn rotation(&self) -> RotationAnalysis {
        self.rotation
    }
}

struct Run {
    ctl: AimController,
    sensors: Scripted,
    ballistics: Ballistics,
    now_ms: u64,
}

impl Run {
    fn new(sensors: Scripted) -> Self {
        Self::with_lead(sensors, [[0, 10, 20, 30]; 5])
    }

    fn with_lead(sensors: Scripted, lead: [[i16; 4]; 5]) -> Self {
        let mut table = CalibrationTable::default();
        table.drop = [5, 8, 10, 14, 20];
        table.lead = lead;
        Self {
            ctl: AimController::new(),
            sensors,
            ballistics: Ballistics::from_table(&table),
            now_ms: 1_000,
        }
    }

    fn tick(&mut self, detection: Option<Detection>) -> TickOutput {
        self.now_ms += STEP_MS;
        let mut feed = detection;
        self.ctl.step(self.now_ms, &mut feed, &self.sensors, &self.ballistics)
    }

    fn tick_at(&mut self, now_ms: u64) -> TickOutput {
        self.now_ms = now_ms;
        let mut feed = None;
        self.ctl.step(now_ms, &mut feed, &self.sensors, &self.ballistics)
    }

    /// Feed centred boxes until the controller locks; returns the lock time.
    fn lock(&mut self) -> u64 {
        for _ in 0..21 {
            self.tick(Some(CENTERED));
        }
        assert_eq!(self.ctl.state(), AimState::Track);
        self.now_ms
    }

    /// Lock, see `centered` centred boxes while tracking, then pass the
    /// tracking deadline.
    fn track(&mut self, centered: usize) -> TickOutput {
        let locked_at = self.lock();
        for _ in 0..centered {
            self.tick(Some(CENTERED));
        }
        assert_eq!(self.ctl.state(), AimState::Track);
        self.tick_at(locked_at + TRACK_DURATION_MS + 1)
    }
}

#[test]
fn twenty_centred_frames_do_not_lock_but_twenty_one_do() {
    let mut run = Run::new(Scripted::steady());
    for _ in 0..20 {
        let out = run.tick(Some(CENTERED));
        assert_eq!(out.overlay.state, AimState::Lock);
    }
    assert_eq!(run.ctl.state(), AimState::Lock);
    let out = run.tick(None);
    assert_eq!(out.overlay.progress.percentage_complete, 100);

    let out = run.tick(Some(CENTERED));
    assert_eq!(run.ctl.state(), AimState::Track);
    assert_eq!(out.overlay.status_text, "TRACKING");
    assert!(out.outcome.is_none());
}

#[test]
fn off_centre_and_stale_frames_do_not_count() {
    let mut run = Run::new(Scripted::steady());
    for _ in 0..15 {
        run.tick(Some(CENTERED));
    }
    for _ in 0..30 {
        run.tick(Some(OFF_CENTER));
    }
    assert_eq!(run.ctl.state(), AimState::Lock);

    // The first fifteen age out of the window.
    run.tick_at(run.now_ms + LOCK_WINDOW_MS);
    for _ in 0..15 {
        run.tick(Some(CENTERED));
    }
    assert_eq!(run.ctl.state(), AimState::Lock);
    let out = run.tick(None);
    assert_eq!(out.overlay.progress.percentage_complete, 75);
}

#[test]
fn too_few_centred_frames_fail_on_vision_only() {
    let mut run = Run::new(Scripted::steady());
    let out = run.track(19);

    assert_eq!(run.ctl.state(), AimState::Fail);
    assert_eq!(run.ctl.fail_reasons(), FailReasons::CV);
    assert_eq!(out.outcome, Some(AimOutcome::Failed { reasons: FailReasons::CV }));
    assert_eq!(out.overlay.status_text, "FAILED [CV]");
    assert!(out.aim.is_none());
}

#[test]
fn erratic_rotation_fails_on_gyro_only() {
    let mut sensors = Scripted::steady();
    sensors.rotation.variance_rotation = 20.0;
    let mut run = Run::new(sensors);
    let out = run.track(20);

    assert_eq!(run.ctl.state(), AimState::Fail);
    assert_eq!(out.outcome, Some(AimOutcome::Failed { reasons: FailReasons::GYRO }));
    assert_eq!(out.overlay.status_text, "FAILED [ GY]");
}

#[test]
fn every_reason_is_reported_together() {
    let sensors = Scripted {
        distance: 20.0,
        healthy: false,
        rotation: RotationAnalysis { mean_rotation: 0.0, variance_rotation: 40.0 },
    };
    let mut run = Run::new(sensors);
    let out = run.track(3);

    assert_eq!(run.ctl.fail_reasons(), FailReasons::all());
    assert_eq!(out.overlay.status_text, "FAILED [CV GY RD]");
    assert_eq!(out.overlay.text_x_offset, 270);
}

#[test]
fn steady_track_fires_with_corrected_aim_point() {
    let mut run = Run::new(Scripted::steady());
    let out = run.track(25);

    assert_eq!(run.ctl.state(), AimState::Fire);
    let expected_velocity = 1.0 / 57.2958 * 20.0;
    match out.outcome {
        Some(AimOutcome::Fired { distance, angular_velocity }) => {
            assert_eq!(distance, 20.0);
            assert!((angular_velocity - expected_velocity).abs() < 1e-5);
        }
        other => panic!("expected a firing solution, got {other:?}"),
    }

    // Lead at 20 m for ~0.35 m/s is ~3.5 px right; drop at 20 m is 10 px.
    let aim = out.aim.expect("aim points while firing");
    assert_eq!(aim.aim_target, PixelPoint::new(400, 250));
    assert_eq!(aim.corrected, PixelPoint::new(403, 240));
    assert_eq!(out.overlay.status_text, " ");
    assert_eq!(out.overlay.distance, 20.0);
    assert!(out.overlay.shows_corrected_crosshair());
}

#[test]
fn negative_table_lead_keeps_its_sign() {
    let mut run = Run::with_lead(Scripted::steady(), [[-10; 4]; 5]);
    let out = run.track(25);

    let aim = out.aim.expect("aim points while firing");
    assert_eq!(aim.corrected, PixelPoint::new(aim.aim_target.x - 10, aim.aim_target.y - 10));
}

#[test]
fn leftward_rotation_mirrors_the_lead() {
    let mut sensors = Scripted::steady();
    sensors.rotation.mean_rotation = -1.0;

    let mut run = Run::with_lead(sensors, [[-10; 4]; 5]);
    let aim = run.track(25).aim.expect("aim points while firing");
    assert_eq!(aim.corrected.x, aim.aim_target.x + 10);

    let mut sensors = Scripted::steady();
    sensors.rotation.mean_rotation = -1.0;
    let mut run = Run::with_lead(sensors, [[12; 4]; 5]);
    let aim = run.track(25).aim.expect("aim points while firing");
    assert_eq!(aim.corrected.x, aim.aim_target.x - 12);
}

#[test]
fn firing_follows_the_target_and_cools_down() {
    let mut run = Run::new(Scripted::steady());
    run.track(25);
    let fired_at = run.now_ms;

    let moved = Detection { left: 300, top: 180, width: 100, height: 200 };
    let out = run.tick(Some(moved));
    assert_eq!(out.aim.map(|a| a.aim_target), Some(PixelPoint::new(350, 230)));

    let out = run.tick_at(fired_at + FIRE_COOLDOWN_MS);
    assert_eq!(out.overlay.state, AimState::Fire);
    let out = run.tick_at(fired_at + FIRE_COOLDOWN_MS + 1);
    assert_eq!(out.overlay.state, AimState::Lock);
    assert_eq!(out.overlay.status_text, "SEEKING");
    assert!(run.tick(Some(CENTERED)).aim.is_none());
}

#[test]
fn failure_cools_down_then_seeks_again() {
    let mut run = Run::new(Scripted::steady());
    run.track(0);
    let failed_at = run.now_ms;
    assert_eq!(run.ctl.state(), AimState::Fail);

    // Detections are ignored while failed.
    run.tick(Some(CENTERED));
    assert_eq!(run.tick_at(failed_at + FAIL_COOLDOWN_MS).overlay.state, AimState::Fail);
    assert_eq!(run.tick_at(failed_at + FAIL_COOLDOWN_MS + 1).overlay.state, AimState::Lock);

    // A fresh lock is possible afterwards.
    run.lock();
}
