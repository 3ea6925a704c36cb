//! Leaf-level snapshots of a configuration and the ordered difference between two of them.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;

use crate::model::{RootConfig, SequencerConfig};
use crate::schema::{layer_parameters, LayerParameter, ResonatorParameter, RESONATOR_PARAMETERS};
use crate::tree::ControlPath;
use crate::value::{LayerId, PartIndex, StepIndex};

/// Sequencer leaves. Set membership is a leaf with value 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SequencerPath {
    StepCount,
    BeatsPerMeasure,
    Tempo,
    PartEnabled(PartIndex),
    StepEnabled(PartIndex, StepIndex),
}

/// Variant and field order give the canonical diff order: resonator, global parts
/// (part, then layer, then parameter), sequencer fields, overrides (part, then step).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeafPath {
    Resonator(ResonatorParameter),
    Global {
        part: PartIndex,
        layer: LayerId,
        parameter: LayerParameter,
    },
    Sequencer(SequencerPath),
    Override {
        part: PartIndex,
        step: StepIndex,
        layer: LayerId,
        parameter: LayerParameter,
    },
}

impl LeafPath {
    /// Whether the device has a parameter for this leaf.
    pub fn is_device_addressable(&self) -> bool {
        matches!(self, LeafPath::Resonator(_) | LeafPath::Global { .. })
    }

    pub fn control_path(&self) -> Option<ControlPath> {
        match *self {
            LeafPath::Resonator(parameter) => Some(ControlPath::Resonator(parameter)),
            LeafPath::Global {
                part,
                layer,
                parameter,
            } => Some(ControlPath::Global {
                part,
                layer,
                parameter,
            }),
            LeafPath::Override {
                part,
                step,
                layer,
                parameter,
            } => Some(ControlPath::Override {
                part,
                step,
                layer,
                parameter,
            }),
            LeafPath::Sequencer(_) => None,
        }
    }
}

impl From<ControlPath> for LeafPath {
    fn from(path: ControlPath) -> Self {
        match path {
            ControlPath::Resonator(parameter) => LeafPath::Resonator(parameter),
            ControlPath::Global {
                part,
                layer,
                parameter,
            } => LeafPath::Global {
                part,
                layer,
                parameter,
            },
            ControlPath::Override {
                part,
                step,
                layer,
                parameter,
            } => LeafPath::Override {
                part,
                step,
                layer,
                parameter,
            },
        }
    }
}

impl fmt::Display for LeafPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = self.control_path() {
            return fmt::Display::fmt(&path, f);
        }
        match self {
            LeafPath::Sequencer(SequencerPath::StepCount) => f.write_str("parts.step-count"),
            LeafPath::Sequencer(SequencerPath::BeatsPerMeasure) => {
                f.write_str("parts.beats-per-measure")
            }
            LeafPath::Sequencer(SequencerPath::Tempo) => f.write_str("parts.tempo"),
            LeafPath::Sequencer(SequencerPath::PartEnabled(part)) => {
                write!(f, "parts.enabled-parts.{}", part)
            }
            LeafPath::Sequencer(SequencerPath::StepEnabled(part, step)) => {
                write!(f, "parts.enabled-steps.{}.{}", part, step)
            }
            _ => Ok(()),
        }
    }
}

/// Immutable copy of every leaf value present in a configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    values: BTreeMap<LeafPath, u16>,
}

impl Snapshot {
    /// The baseline for a device whose state has never been observed.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RootConfig) -> Self {
        let mut values = BTreeMap::new();

        for parameter in RESONATOR_PARAMETERS {
            let value = config.controls.resonator.get(parameter);
            values.insert(LeafPath::Resonator(parameter), u16::from(value.get()));
        }

        for part in PartIndex::all() {
            let controls = config.controls.part(part);
            for layer in LayerId::ALL {
                for &parameter in layer_parameters(layer) {
                    if let Some(value) = controls.get(layer, parameter) {
                        let path = LeafPath::Global {
                            part,
                            layer,
                            parameter,
                        };
                        values.insert(path, u16::from(value.get()));
                    }
                }
            }
        }

        insert_sequencer(&mut values, &config.parts);

        for (part, step, overrides) in config.parts.overrides() {
            for (layer, parameter, value) in overrides.iter() {
                let path = LeafPath::Override {
                    part,
                    step,
                    layer,
                    parameter,
                };
                values.insert(path, u16::from(value.get()));
            }
        }

        Self { values }
    }

    pub fn get(&self, path: &LeafPath) -> Option<u16> {
        self.values.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LeafPath, u16)> + '_ {
        self.values.iter().map(|(path, value)| (*path, *value))
    }

    /// Records a value the device is known to hold, or forgets it with `None`.
    pub fn record(&mut self, path: LeafPath, value: Option<u16>) {
        match value {
            Some(value) => {
                self.values.insert(path, value);
            }
            None => {
                self.values.remove(&path);
            }
        }
    }
}

fn insert_sequencer(values: &mut BTreeMap<LeafPath, u16>, parts: &SequencerConfig) {
    values.insert(
        LeafPath::Sequencer(SequencerPath::StepCount),
        parts.step_count(),
    );
    if let Some(beats) = parts.beats_per_measure() {
        values.insert(
            LeafPath::Sequencer(SequencerPath::BeatsPerMeasure),
            u16::from(beats),
        );
    }
    if let Some(tempo) = parts.tempo() {
        values.insert(LeafPath::Sequencer(SequencerPath::Tempo), tempo);
    }
    for part in parts.enabled_parts().into_iter().flatten() {
        values.insert(LeafPath::Sequencer(SequencerPath::PartEnabled(*part)), 1);
    }
    for part in PartIndex::all() {
        for step in parts.enabled_steps(part) {
            values.insert(
                LeafPath::Sequencer(SequencerPath::StepEnabled(part, step)),
                1,
            );
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: LeafPath,
    pub old: Option<u16>,
    pub new: Option<u16>,
}

impl DiffEntry {
    pub fn is_removal(&self) -> bool {
        self.new.is_none()
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: Option<u16>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
        write!(f, "{}: {} -> {}", self.path, show(self.old), show(self.new))
    }
}

/// Every leaf whose value differs between `old` and `new`, in canonical path order.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut left = old.values.iter().peekable();
    let mut right = new.values.iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((l, _)), Some((r, _))) => l.cmp(r),
        };
        match order {
            Ordering::Less => {
                if let Some((path, value)) = left.next() {
                    entries.push(DiffEntry {
                        path: *path,
                        old: Some(*value),
                        new: None,
                    });
                }
            }
            Ordering::Greater => {
                if let Some((path, value)) = right.next() {
                    entries.push(DiffEntry {
                        path: *path,
                        old: None,
                        new: Some(*value),
                    });
                }
            }
            Ordering::Equal => push_change(&mut entries, &mut left, &mut right),
        }
    }
    entries
}

fn push_change<'a, I>(entries: &mut Vec<DiffEntry>, left: &mut Peekable<I>, right: &mut Peekable<I>)
where
    I: Iterator<Item = (&'a LeafPath, &'a u16)>,
{
    if let (Some((path, old)), Some((_, new))) = (left.next(), right.next()) {
        if old != new {
            entries.push(DiffEntry {
                path: *path,
                old: Some(*old),
                new: Some(*new),
            });
        }
    }
}
