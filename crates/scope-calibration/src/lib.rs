//! `scope-calibration` – the ballistic calibration table and everything that
//! reads or edits it.
//!
//! # Modules
//!
//! - [`table`] – [`CalibrationTable`][table::CalibrationTable]: drop offsets
//!   per distance and lead offsets per distance × angular velocity, persisted
//!   as a CRC-prefixed flat file.
//! - [`ballistics`] – [`Ballistics`][ballistics::Ballistics]: linear (drop)
//!   and bilinear (lead) interpolation over a snapshot of the table.
//! - [`store`] – [`CalibrationStore`][store::CalibrationStore]: the table,
//!   its file path and the interpolators it was last rebuilt into.
//! - [`editor`] – [`CalibrationEditor`][editor::CalibrationEditor]: turns
//!   rotary/button events into committed table edits.
//!
//! # Grid
//!
//! | Axis     | Points | Values (inclusive)     |
//! |----------|--------|------------------------|
//! | distance | 5      | 10, 15, 20, 25, 30 m   |
//! | velocity | 4      | 0, 1, 2, 3 m/s         |

pub mod ballistics;
pub mod editor;
pub mod store;
pub mod table;

pub use ballistics::Ballistics;
pub use editor::{CalibrationCell, CalibrationEditor, EditorOutcome};
pub use store::CalibrationStore;
pub use table::{CalibrationError, CalibrationKind, CalibrationTable};
