//! Feeds a synthetic radar stream through the estimator and health tracker
//! the way the radar task does.

use chrono::Utc;
use scope_perception::radar::point_cloud;
use scope_perception::{RadarEstimator, RadarHealth};
use scope_protocol::{RadarDetection, RadarFrame};
use scope_types::SphericalPoint;

fn frame(frame_number: u32, range: f32) -> RadarFrame {
    let detections = (0..30)
        .map(|i| RadarDetection {
            point: SphericalPoint {
                range: range + (i % 3) as f32 - 1.0,
                azimuth: 0.01 * (i as f32 - 15.0),
                elevation: 0.0,
                velocity: 0.0,
            },
            snr: 20,
            noise: 3,
        })
        .collect();
    RadarFrame { frame_number, time_cpu_cycles: frame_number * 1000, detections }
}

#[test]
fn steady_stream_is_healthy_then_goes_stale() {
    let health = RadarHealth::new();
    let mut estimator = RadarEstimator::new();

    // Four seconds at ~30 Hz.
    let mut now_ms = 0u64;
    for n in 0..120u32 {
        let f = frame(n, 20.0);
        health.record_frame(now_ms, f.detections.len());
        estimator.filter_and_average(&point_cloud(&f, Utc::now()));
        now_ms += 33;
    }

    assert!(health.received_sufficient_frames_recently(now_ms));
    let distance = estimator.distance().expect("distance after a steady stream");
    assert!((distance - 20.0).abs() < 0.25, "distance was {distance}");
    assert_eq!(health.history().total_frames, 120);
    assert_eq!(health.history().total_points, 120 * 30);

    // Four silent seconds.
    now_ms += 4000;
    assert!(!health.received_sufficient_frames_recently(now_ms));
    assert_eq!(estimator.distance(), Some(distance));
}

#[test]
fn frames_with_only_housing_reflections_still_count_as_traffic() {
    let health = RadarHealth::new();
    let mut estimator = RadarEstimator::new();

    for n in 0..10u32 {
        let f = frame(n, 2.0);
        let now_ms = 4000 + u64::from(n) * 100;
        health.record_frame(now_ms, f.detections.len());
        assert!(estimator.filter_and_average(&point_cloud(&f, Utc::now())).is_none());
    }

    assert!(health.received_sufficient_frames_recently(5000));
    assert!(estimator.distance().is_none());
}
