//! Interpolated bullet drop and lead.
//!
//! [`Ballistics`] is a frozen copy of a [`CalibrationTable`] converted to
//! `f64`. Edits to the table only take effect after
//! [`Ballistics::from_table`] is called again.

use crate::table::{
    CalibrationTable, DISTANCE_END_M, DISTANCE_POINTS, DISTANCE_START_M, DISTANCE_STEP_M,
    VELOCITY_END, VELOCITY_POINTS, VELOCITY_START, VELOCITY_STEP,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Ballistics {
    drop: [f64; DISTANCE_POINTS],
    lead: [[f64; VELOCITY_POINTS]; DISTANCE_POINTS],
}

/// Locate `x` on a uniform grid: the lower cell index and the fractional
/// position inside that cell. `x` must already be clamped to the grid.
fn cell(x: f64, start: f64, step: f64, points: usize) -> (usize, f64) {
    let pos = (x - start) / step;
    let i = (pos.floor() as usize).min(points - 2);
    (i, pos - i as f64)
}

impl Ballistics {
    pub fn from_table(table: &CalibrationTable) -> Self {
        let mut lead = [[0.0; VELOCITY_POINTS]; DISTANCE_POINTS];
        for (row, src) in lead.iter_mut().zip(&table.lead) {
            for (slot, &v) in row.iter_mut().zip(src) {
                *slot = f64::from(v);
            }
        }
        Self {
            drop: table.drop.map(f64::from),
            lead,
        }
    }

    /// Vertical correction in pixels at `distance` metres. Linear between
    /// grid points; distances outside 10..=30 m are clamped.
    pub fn drop(&self, distance: f64) -> f64 {
        let d = distance.clamp(DISTANCE_START_M, DISTANCE_END_M);
        let (i, t) = cell(d, DISTANCE_START_M, DISTANCE_STEP_M, DISTANCE_POINTS);
        self.drop[i] + t * (self.drop[i + 1] - self.drop[i])
    }

    /// Horizontal correction in pixels at `distance` metres and angular
    /// velocity `velocity` m/s, signed as stored in the table. Bilinear over
    /// the grid using `|velocity|`; both axes are clamped. The caller mirrors
    /// it for leftward rotation.
    pub fn lead(&self, distance: f64, velocity: f64) -> f64 {
        let d = distance.clamp(DISTANCE_START_M, DISTANCE_END_M);
        let v = velocity.abs().clamp(VELOCITY_START, VELOCITY_END);
        let (i, tx) = cell(d, DISTANCE_START_M, DISTANCE_STEP_M, DISTANCE_POINTS);
        let (j, ty) = cell(v, VELOCITY_START, VELOCITY_STEP, VELOCITY_POINTS);

        let z00 = self.lead[i][j];
        let z10 = self.lead[i + 1][j];
        let z01 = self.lead[i][j + 1];
        let z11 = self.lead[i + 1][j + 1];
        (1.0 - tx) * (1.0 - ty) * z00 + tx * (1.0 - ty) * z10 + (1.0 - tx) * ty * z01 + tx * ty * z11
    }
}

impl From<&CalibrationTable> for Ballistics {
    fn from(table: &CalibrationTable) -> Self {
        Self::from_table(table)
    }
}

impl Default for Ballistics {
    fn default() -> Self {
        Self::from_table(&CalibrationTable::default())
    }
}
