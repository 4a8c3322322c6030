//! `scope-runtime` – the fire-control loop.
//!
//! Owns the aim state machine and the periodic tasks that keep its inputs
//! fresh. Everything here runs on one Tokio runtime, fed by the blocking link
//! threads from `scope-middleware`.
//!
//! # Modules
//!
//! - [`aim`] – [`AimController`][aim::AimController]: Lock → Track →
//!   Fire/Fail, driven one tick at a time with explicit timestamps. Sensor
//!   access goes through the [`AimSensors`][aim::AimSensors] and
//!   [`DetectionFeed`][aim::DetectionFeed] traits so scenarios can be
//!   scripted without threads.
//! - [`overlay`] – status text, offsets and the lock progress bar for each
//!   state.
//! - [`tasks`] – [`ScopeRuntime`][tasks::ScopeRuntime]: spawns the radar
//!   (~30 Hz), IMU (~800 Hz), aim (~300 Hz) and calibration tasks and hands
//!   back the ingest handlers for the link supervisors.
//! - [`dump`] – [`RadarDump`][dump::RadarDump]: optional CSV capture of every
//!   radar point.
//! - [`clock`] – millisecond time base shared by all tasks.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber, with OTLP export when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod aim;
pub mod clock;
pub mod dump;
pub mod overlay;
pub mod tasks;
pub mod telemetry;

pub use aim::{AimController, AimSensors, DetectionFeed, TickOutput};
pub use clock::Clock;
pub use dump::RadarDump;
pub use tasks::{
    EditorCommand, RadarIngest, ScopeHandles, ScopeRuntime, SensorIngest, Started, TaskPeriods,
};
pub use telemetry::{TracerProviderGuard, init_tracing};
