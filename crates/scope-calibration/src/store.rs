//! The calibration table together with its backing file and interpolators.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::ballistics::Ballistics;
use crate::table::{CalibrationError, CalibrationKind, CalibrationTable};

/// Owned calibration state for one running scope.
///
/// The aim task reads [`ballistics`][Self::ballistics]; the calibration
/// editor mutates the table through [`set`][Self::set] and then calls
/// [`rebuild`][Self::rebuild]. Persisting is always an explicit
/// [`save`][Self::save].
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
    table: CalibrationTable,
    ballistics: Ballistics,
}

impl CalibrationStore {
    /// Load and verify the table at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CalibrationError> {
        let path = path.into();
        let table = CalibrationTable::load(&path)?;
        Ok(Self::with_table(path, table))
    }

    /// Start from `table` without touching the file system.
    pub fn with_table(path: impl Into<PathBuf>, table: CalibrationTable) -> Self {
        Self {
            path: path.into(),
            ballistics: Ballistics::from_table(&table),
            table,
        }
    }

    /// Like [`open`][Self::open], but falls back to an all-zero table when the
    /// file is missing or fails verification. The error is returned alongside
    /// so the caller can report it.
    pub fn open_or_default(path: impl Into<PathBuf>) -> (Self, Option<CalibrationError>) {
        let path = path.into();
        match CalibrationTable::load(&path) {
            Ok(table) => (Self::with_table(path, table), None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using blank calibration table");
                (Self::with_table(path, CalibrationTable::default()), Some(e))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Interpolators as of the last [`rebuild`][Self::rebuild].
    pub fn ballistics(&self) -> &Ballistics {
        &self.ballistics
    }

    pub fn get(
        &self,
        kind: CalibrationKind,
        distance: usize,
        velocity: usize,
    ) -> Result<i16, CalibrationError> {
        self.table.get(kind, distance, velocity)
    }

    /// Change one grid value. Interpolation keeps using the old value until
    /// [`rebuild`][Self::rebuild].
    pub fn set(
        &mut self,
        kind: CalibrationKind,
        distance: usize,
        velocity: usize,
        value: i16,
    ) -> Result<(), CalibrationError> {
        self.table.set(kind, distance, velocity, value)
    }

    /// Regenerate the interpolators from the current table.
    pub fn rebuild(&mut self) {
        self.ballistics = Ballistics::from_table(&self.table);
    }

    /// Write the table, with a fresh CRC, to the backing file.
    pub fn save(&self) -> Result<(), CalibrationError> {
        self.table.save(&self.path)?;
        info!(path = %self.path.display(), "Calibration saved");
        Ok(())
    }
}
