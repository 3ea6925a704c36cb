//! Step-grid editing: resizing the pattern and shifting steps left or right.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ValidationError;
use crate::model::{check_range, PartControls, RootConfig, SequencerConfig};
use crate::schema::{BEATS_PER_MEASURE_RANGE, DEFAULT_BEATS_PER_MEASURE, STEP_COUNT_RANGE};
use crate::value::{PartIndex, StepIndex};

impl SequencerConfig {
    /// Changes the pattern length and measure size. Enabled steps and overrides past
    /// the new length are dropped.
    pub fn resize(&mut self, step_count: i64, beats_per_measure: i64) -> Result<(), ValidationError> {
        let step_count = check_range("parts.step-count", step_count, STEP_COUNT_RANGE)?;
        let beats = check_range(
            "parts.beats-per-measure",
            beats_per_measure,
            BEATS_PER_MEASURE_RANGE,
        )?;

        self.step_count = step_count as u16;
        self.beats_per_measure = Some(beats as u8);
        let limit = step_count as u32;
        self.remap_steps(|step| (step <= limit).then_some(step));
        log::debug!("pattern resized to {} steps ({} per measure)", step_count, beats);
        Ok(())
    }

    /// Opens `count` empty steps after step `after` (0 inserts before the first step).
    /// Content pushed past the last step is dropped; the step count does not change.
    pub fn insert_steps(&mut self, after: u32, count: u32) {
        if count == 0 {
            return;
        }
        let limit = u32::from(self.step_count);
        self.remap_steps(|step| {
            if step <= after {
                Some(step)
            } else {
                step.checked_add(count).filter(|moved| *moved <= limit)
            }
        });
    }

    /// Removes `count` steps starting at `first` and closes the gap. The freed tail is
    /// empty; the step count does not change.
    pub fn delete_steps(&mut self, first: StepIndex, count: u32) {
        if count == 0 {
            return;
        }
        let first = first.number();
        let end = first.saturating_add(count);
        self.remap_steps(|step| {
            if step < first {
                Some(step)
            } else if step < end {
                None
            } else {
                Some(step - count)
            }
        });
    }

    /// Whether `step` falls on the first beat of a measure.
    pub fn is_strong_step(&self, step: StepIndex) -> bool {
        let beats = u32::from(self.beats_per_measure.unwrap_or(DEFAULT_BEATS_PER_MEASURE));
        (step.number() - 1) % beats == 0
    }

    fn remap_steps(&mut self, map: impl Fn(u32) -> Option<u32>) {
        let remap = |step: StepIndex| {
            map(step.number()).and_then(|n| StepIndex::new(i64::from(n)).ok())
        };

        let enabled = std::mem::take(&mut self.enabled_steps);
        for (part, steps) in enabled {
            let moved: BTreeSet<StepIndex> = steps.into_iter().filter_map(remap).collect();
            if !moved.is_empty() {
                self.enabled_steps.insert(part, moved);
            }
        }

        let overridden = std::mem::take(&mut self.overridden_controls);
        for (part, steps) in overridden {
            let moved: BTreeMap<_, _> = steps
                .into_iter()
                .filter_map(|(step, values)| remap(step).map(|step| (step, values)))
                .collect();
            if !moved.is_empty() {
                self.overridden_controls.insert(part, moved);
            }
        }
    }
}

impl RootConfig {
    /// The controls a part plays with at `step`: its global values with that step's
    /// override applied on top.
    pub fn effective_part(&self, part: PartIndex, step: StepIndex) -> PartControls {
        let global = self.controls.part(part);
        match self.parts.step_override(part, step) {
            Some(values) => global.with_override(values),
            None => *global,
        }
    }
}
