//! `scope-perception` – turns raw radar and IMU readings into the few
//! numbers the aim controller reasons about.
//!
//! # Modules
//!
//! - [`rolling`] – [`RollingAverage`][rolling::RollingAverage]: fixed-window
//!   moving average shared by both estimators.
//! - [`radar`] – [`RadarEstimator`][radar::RadarEstimator]: rejects housing
//!   reflections, finds the cloud centroid and smooths its forward distance;
//!   [`RadarHealth`][radar::RadarHealth] tracks whether frames are still
//!   arriving.
//! - [`imu`] – [`ImuEstimator`][imu::ImuEstimator]: smoothed pitch/roll/yaw
//!   rate, plus [`GyroWindow`][imu::GyroWindow], the 550-sample yaw history
//!   used to judge how steady the rig is.

pub mod imu;
pub mod radar;
pub mod rolling;

pub use imu::{GyroWindow, ImuConfig, ImuEstimator};
pub use radar::{RadarEstimator, RadarHealth, RadarHistory};
pub use rolling::RollingAverage;
