//! `scope-protocol` – TLV wire format shared by the radar and sensor-board
//! serial links.
//!
//! Both devices emit frames that start with the same 8-byte magic word and a
//! 40-byte header, followed by `{type, length, payload}` records.
//!
//! # Modules
//!
//! - [`frame`] – [`FrameHeader`][frame::FrameHeader] and
//!   [`TlvFrame`][frame::TlvFrame]: bounds-checked header/record decoding and
//!   [`encode_frame`][frame::encode_frame] for producing wire bytes.
//! - [`framer`] – [`Framer`][framer::Framer]: pulls frames out of an
//!   arbitrary byte source, resynchronising on the magic word and signalling
//!   a link reset when the source stalls.
//! - [`radar`] – decodes spherical point-cloud and side-info records into a
//!   [`RadarFrame`][radar::RadarFrame].
//! - [`sensor_board`] – decodes IMU and UI-event records.

pub mod frame;
pub mod framer;
pub mod radar;
pub mod sensor_board;

pub use frame::{FrameError, FrameHeader, TlvFrame, TlvRecord, encode_frame};
pub use framer::{Framer, FramerConfig, FramerStats, LinkError};
pub use radar::{RadarDecodeError, RadarDetection, RadarFrame, decode_point_cloud};
pub use sensor_board::{SensorMessage, decode_sensor_frame, encode_sensor_frame};
