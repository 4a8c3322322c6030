//! `scope-middleware` – moves data between the link threads, the periodic
//! tasks and whoever is watching, without caring what the data means.
//!
//! # Modules
//!
//! - [`bus`] – topic-based broadcast [`EventBus`][bus::EventBus] for
//!   low-rate, must-see events: operator input, link resets, calibration
//!   faults and aim outcomes.
//! - [`latest`] – latest-value-wins channels for high-rate state (distance,
//!   detections, overlay) where a reader only ever wants the newest value and
//!   a writer must never block.
//! - [`link`] – [`LinkSupervisor`][link::LinkSupervisor]: owns one serial
//!   link on a dedicated thread, reopening it whenever the framer reports a
//!   stall.
//! - [`radar_config`] – uploads the radar's chirp profile over its control
//!   port before the data link is opened.

pub mod bus;
pub mod latest;
pub mod link;
pub mod radar_config;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use latest::{LatestReceiver, LatestSender, latest};
pub use link::{LinkConfig, LinkReport, LinkSupervisor};
pub use radar_config::{RadarConfigError, UploadReport, read_commands, upload_commands};
