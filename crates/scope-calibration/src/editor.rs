//! Rotary-encoder calibration editing.
//!
//! The operator picks a grid cell (drop at a distance, or lead at a
//! distance × velocity), turns the wheel to adjust the value and clicks to
//! commit. Spinning the wheel quickly increases the step size:
//!
//! | wheel events in the last 1250 ms | step |
//! |----------------------------------|------|
//! | ≤ 10                             | 1    |
//! | 11 – 15                          | 5    |
//! | > 15                             | 15   |
//!
//! Only the last 15 wheel events are remembered.

use scope_types::UiEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::CalibrationStore;
use crate::table::{CalibrationError, CalibrationKind, DISTANCE_POINTS};

/// Wheel events remembered for acceleration.
pub const WHEEL_HISTORY_LEN: usize = 15;
/// Wheel events older than this no longer count towards acceleration.
pub const ACCELERATION_WINDOW_MS: u64 = 1250;

/// One editable grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationCell {
    pub kind: CalibrationKind,
    pub distance: usize,
    pub velocity: usize,
}

impl CalibrationCell {
    pub fn drop(distance: usize) -> Self {
        Self { kind: CalibrationKind::Drop, distance, velocity: 0 }
    }

    pub fn lead(distance: usize, velocity: usize) -> Self {
        Self { kind: CalibrationKind::Lead, distance, velocity }
    }
}

/// Result of feeding one UI event to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorOutcome {
    /// No cell selected, or the event has no meaning while editing.
    Ignored,
    /// The pending value changed by `step`.
    Adjusted { value: i16, step: i16 },
    /// The pending value was written and the interpolators rebuilt.
    Committed { cell: CalibrationCell, value: i16 },
}

#[derive(Debug, Default)]
pub struct CalibrationEditor {
    cell: Option<CalibrationCell>,
    value: i16,
    wheel: [Option<u64>; WHEEL_HISTORY_LEN],
    wheel_next: usize,
    force_all_distances: bool,
}

impl CalibrationEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `cell` for editing, seeding the pending value from the store.
    pub fn begin(
        &mut self,
        cell: CalibrationCell,
        store: &CalibrationStore,
    ) -> Result<i16, CalibrationError> {
        self.value = store.get(cell.kind, cell.distance, cell.velocity)?;
        self.cell = Some(cell);
        debug!(?cell, value = self.value, "Calibration edit started");
        Ok(self.value)
    }

    /// Abandon the current edit without writing anything.
    pub fn cancel(&mut self) {
        self.cell = None;
    }

    pub fn cell(&self) -> Option<CalibrationCell> {
        self.cell
    }

    /// Value that a commit would write.
    pub fn value(&self) -> i16 {
        self.value
    }

    pub fn force_all_distances(&self) -> bool {
        self.force_all_distances
    }

    /// When on, a commit writes the value at every distance for the selected
    /// velocity, so a single measurement calibrates the whole range.
    pub fn toggle_force_all_distances(&mut self) -> bool {
        self.force_all_distances = !self.force_all_distances;
        info!(enabled = self.force_all_distances, "Force single calibration distance");
        self.force_all_distances
    }

    /// Record a wheel event at `now_ms` and return the step to apply.
    fn wheel_step(&mut self, now_ms: u64) -> i16 {
        self.wheel[self.wheel_next] = Some(now_ms);
        self.wheel_next = (self.wheel_next + 1) % WHEEL_HISTORY_LEN;

        let cutoff = now_ms.saturating_sub(ACCELERATION_WINDOW_MS);
        let recent = self.wheel.iter().flatten().filter(|&&t| t >= cutoff).count();
        match recent {
            r if r > 15 => 15,
            r if r > 10 => 5,
            _ => 1,
        }
    }

    pub fn handle(
        &mut self,
        event: UiEvent,
        now_ms: u64,
        store: &mut CalibrationStore,
    ) -> Result<EditorOutcome, CalibrationError> {
        let Some(cell) = self.cell else {
            return Ok(EditorOutcome::Ignored);
        };

        match event {
            UiEvent::RotaryRight | UiEvent::RotaryLeft => {
                let step = self.wheel_step(now_ms);
                self.value = if event == UiEvent::RotaryRight {
                    self.value.saturating_add(step)
                } else {
                    self.value.saturating_sub(step)
                };
                Ok(EditorOutcome::Adjusted { value: self.value, step })
            }
            UiEvent::RotaryButton => {
                if self.force_all_distances {
                    for distance in 0..DISTANCE_POINTS {
                        store.set(cell.kind, distance, cell.velocity, self.value)?;
                    }
                } else {
                    store.set(cell.kind, cell.distance, cell.velocity, self.value)?;
                }
                store.rebuild();
                self.cell = None;
                info!(
                    kind = ?cell.kind,
                    distance = cell.distance,
                    velocity = cell.velocity,
                    value = self.value,
                    all_distances = self.force_all_distances,
                    "Calibration value committed"
                );
                Ok(EditorOutcome::Committed { cell, value: self.value })
            }
            UiEvent::Button0 | UiEvent::Button1 => Ok(EditorOutcome::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CalibrationTable;
    use std::error::Error;

    fn store() -> CalibrationStore {
        let mut table = CalibrationTable::default();
        table.drop[2] = 40;
        table.lead[1][2] = -3;
        CalibrationStore::with_table("unused.dat", table)
    }

    #[test]
    fn events_without_selection_are_ignored() -> Result<(), Box<dyn Error>> {
        let mut store = store();
        let mut editor = CalibrationEditor::new();
        assert_eq!(editor.handle(UiEvent::RotaryRight, 0, &mut store)?, EditorOutcome::Ignored);
        assert_eq!(editor.handle(UiEvent::RotaryButton, 0, &mut store)?, EditorOutcome::Ignored);
        Ok(())
    }

    #[test]
    fn slow_turns_step_by_one_and_commit_rebuilds() -> Result<(), Box<dyn Error>> {
        let mut store = store();
        let mut editor = CalibrationEditor::new();
        assert_eq!(editor.begin(CalibrationCell::drop(2), &store)?, 40);

        for i in 0..3 {
            editor.handle(UiEvent::RotaryRight, i * 2000, &mut store)?;
        }
        editor.handle(UiEvent::RotaryLeft, 10_000, &mut store)?;
        assert_eq!(editor.value(), 42);

        let outcome = editor.handle(UiEvent::RotaryButton, 10_100, &mut store)?;
        assert_eq!(outcome, EditorOutcome::Committed { cell: CalibrationCell::drop(2), value: 42 });
        assert_eq!(store.get(CalibrationKind::Drop, 2, 0)?, 42);
        assert_eq!(store.ballistics().drop(20.0), 42.0);
        assert!(editor.cell().is_none());
        Ok(())
    }

    #[test]
    fn fast_spinning_accelerates() -> Result<(), Box<dyn Error>> {
        let mut store = store();
        let mut editor = CalibrationEditor::new();
        editor.begin(CalibrationCell::lead(1, 2), &store)?;

        let mut steps = Vec::new();
        for i in 0..12 {
            if let EditorOutcome::Adjusted { step, .. } =
                editor.handle(UiEvent::RotaryRight, 5_000 + i * 50, &mut store)?
            {
                steps.push(step);
            }
        }
        // Events 11 and 12 see more than ten recent turns.
        assert_eq!(&steps[..10], &[1; 10]);
        assert_eq!(&steps[10..], &[5, 5]);
        assert_eq!(editor.value(), -3 + 10 + 10);

        // After a pause the step drops back to one.
        match editor.handle(UiEvent::RotaryLeft, 20_000, &mut store)? {
            EditorOutcome::Adjusted { step, .. } => assert_eq!(step, 1),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn force_all_distances_writes_every_row() -> Result<(), Box<dyn Error>> {
        let mut store = store();
        let mut editor = CalibrationEditor::new();
        assert!(editor.toggle_force_all_distances());
        editor.begin(CalibrationCell::lead(1, 2), &store)?;
        editor.handle(UiEvent::RotaryRight, 0, &mut store)?;
        editor.handle(UiEvent::RotaryButton, 10, &mut store)?;

        for d in 0..DISTANCE_POINTS {
            assert_eq!(store.get(CalibrationKind::Lead, d, 2)?, -2);
            assert_eq!(store.get(CalibrationKind::Lead, d, 1)?, 0);
        }
        Ok(())
    }

    #[test]
    fn buttons_do_not_touch_pending_value() -> Result<(), Box<dyn Error>> {
        let mut store = store();
        let mut editor = CalibrationEditor::new();
        editor.begin(CalibrationCell::drop(2), &store)?;
        assert_eq!(editor.handle(UiEvent::Button0, 0, &mut store)?, EditorOutcome::Ignored);
        editor.cancel();
        assert!(editor.cell().is_none());
        assert_eq!(store.get(CalibrationKind::Drop, 2, 0)?, 40);
        Ok(())
    }
}
