use std::fmt;
use std::str::FromStr;

use crate::diff::Snapshot;
use crate::error::ValidationError;
use crate::model::{RootConfig, SequencerConfig};
use crate::schema::{ControlCategory, LayerParameter, ResonatorParameter};
use crate::validator::validate_value;
use crate::value::{ControlValue, LayerId, PartIndex, StepIndex};

/// Address of one editable control value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlPath {
    Resonator(ResonatorParameter),
    Global {
        part: PartIndex,
        layer: LayerId,
        parameter: LayerParameter,
    },
    Override {
        part: PartIndex,
        step: StepIndex,
        layer: LayerId,
        parameter: LayerParameter,
    },
}

impl ControlPath {
    pub fn category(&self) -> ControlCategory {
        match self {
            ControlPath::Resonator(_) => ControlCategory::Resonator,
            ControlPath::Global { layer, .. } | ControlPath::Override { layer, .. } => {
                ControlCategory::for_layer(*layer)
            }
        }
    }

    pub fn parameter_name(&self) -> &'static str {
        match self {
            ControlPath::Resonator(parameter) => parameter.name(),
            ControlPath::Global { parameter, .. } | ControlPath::Override { parameter, .. } => {
                parameter.name()
            }
        }
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPath::Resonator(parameter) => {
                write!(f, "controls.waveguide-resonator.{}", parameter.name())
            }
            ControlPath::Global {
                part,
                layer,
                parameter,
            } => write!(f, "controls.parts.{}.{}.{}", part, layer, parameter.name()),
            ControlPath::Override {
                part,
                step,
                layer,
                parameter,
            } => write!(
                f,
                "parts.overridden-controls.{}.{}.{}.{}",
                part,
                step,
                layer,
                parameter.name()
            ),
        }
    }
}

impl FromStr for ControlPath {
    type Err = ValidationError;

    /// Parses the document location form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |key: &str| ValidationError::InvalidKey {
            path: s.to_string(),
            key: key.to_string(),
        };
        let layer = |key: &str| LayerId::from_key(key).ok_or_else(|| invalid(key));
        let parameter = |layer: LayerId, name: &str| {
            LayerParameter::from_name(name)
                .filter(|p| p.is_legal_for(layer))
                .ok_or_else(|| ValidationError::UnknownParameter {
                    path: s.to_string(),
                    name: name.to_string(),
                })
        };
        let with_path = |e: ValidationError| e.with_path(s);

        let segments: Vec<&str> = s.split('.').collect();
        match segments.as_slice() {
            ["controls", "waveguide-resonator", name] => ResonatorParameter::from_name(*name)
                .map(ControlPath::Resonator)
                .ok_or_else(|| ValidationError::UnknownParameter {
                    path: s.to_string(),
                    name: (*name).to_string(),
                }),
            ["controls", "parts", part, layer_key, name] => {
                let layer = layer(*layer_key)?;
                Ok(ControlPath::Global {
                    part: PartIndex::from_key(*part).map_err(with_path)?,
                    layer,
                    parameter: parameter(layer, *name)?,
                })
            }
            ["parts", "overridden-controls", part, step, layer_key, name] => {
                let layer = layer(*layer_key)?;
                Ok(ControlPath::Override {
                    part: PartIndex::from_key(*part).map_err(with_path)?,
                    step: StepIndex::from_key(*step).map_err(with_path)?,
                    layer,
                    parameter: parameter(layer, *name)?,
                })
            }
            _ => Err(invalid(s)),
        }
    }
}

/// The live configuration. Every value it holds has passed validation for its path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlTree {
    config: RootConfig,
}

impl ControlTree {
    pub fn new(config: RootConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn into_config(self) -> RootConfig {
        self.config
    }

    pub fn port(&self) -> &str {
        &self.config.port
    }

    pub fn set_port(&mut self, port: impl Into<String>) {
        self.config.port = port.into();
    }

    pub fn sequencer(&self) -> &SequencerConfig {
        &self.config.parts
    }

    /// Sequencer edits check their own bounds, so handing out the section is safe.
    pub fn sequencer_mut(&mut self) -> &mut SequencerConfig {
        &mut self.config.parts
    }

    /// Override reads fall back to the global value when the step does not override it.
    pub fn get(&self, path: &ControlPath) -> Option<ControlValue> {
        match *path {
            ControlPath::Resonator(parameter) => Some(self.config.controls.resonator.get(parameter)),
            ControlPath::Global {
                part,
                layer,
                parameter,
            } => self.config.controls.part(part).get(layer, parameter),
            ControlPath::Override {
                part,
                step,
                layer,
                parameter,
            } => {
                if !parameter.is_legal_for(layer) {
                    return None;
                }
                self.config
                    .parts
                    .step_override(part, step)
                    .and_then(|values| values.get(layer, parameter))
                    .or_else(|| self.config.controls.part(part).get(layer, parameter))
            }
        }
    }

    /// Validates and stores one value, returning what was stored at that path before.
    /// For an override path the previous value is `None` when the step did not yet
    /// override that parameter. On error nothing is changed.
    pub fn set(
        &mut self,
        path: &ControlPath,
        value: i64,
    ) -> Result<Option<ControlValue>, ValidationError> {
        validate_value(path.category(), path.parameter_name(), value)
            .map_err(|e| e.with_path(path.to_string()))?;
        let value = ControlValue::from_raw(value, &path.to_string())?;

        let previous = match *path {
            ControlPath::Resonator(parameter) => {
                Some(self.config.controls.resonator.set(parameter, value))
            }
            ControlPath::Global {
                part,
                layer,
                parameter,
            } => self
                .config
                .controls
                .part_mut(part)
                .set(layer, parameter, value),
            ControlPath::Override {
                part,
                step,
                layer,
                parameter,
            } => self
                .config
                .parts
                .step_override_mut(part, step)
                .set(layer, parameter, value)
                .map_err(|e| e.with_path(path.to_string()))?,
        };
        Ok(previous)
    }

    /// Removes a step override. Returns whether anything was removed; a missing
    /// override is not an error.
    pub fn remove_override(&mut self, part: PartIndex, step: StepIndex) -> bool {
        self.config.parts.remove_override(part, step).is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_config(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlPath, ControlTree};
    use crate::error::ValidationError;
    use crate::schema::{LayerParameter, ResonatorParameter};
    use crate::value::{LayerId, PartIndex, StepIndex};

    fn global(part: i64, layer: LayerId, parameter: LayerParameter) -> ControlPath {
        ControlPath::Global {
            part: PartIndex::new(part).unwrap(),
            layer,
            parameter,
        }
    }

    fn overridden(part: i64, step: i64, layer: LayerId, parameter: LayerParameter) -> ControlPath {
        ControlPath::Override {
            part: PartIndex::new(part).unwrap(),
            step: StepIndex::new(step).unwrap(),
            layer,
            parameter,
        }
    }

    #[test]
    fn paths_render_as_document_locations() {
        assert_eq!(
            global(4, LayerId::Layer1, LayerParameter::SendAmount).to_string(),
            "controls.parts.part4.layer1.send-amount"
        );
        assert_eq!(
            overridden(2, 5, LayerId::Layer1, LayerParameter::Level).to_string(),
            "parts.overridden-controls.part2.5.layer1.level"
        );
        assert_eq!(
            ControlPath::Resonator(ResonatorParameter::PitchTuning).to_string(),
            "controls.waveguide-resonator.pitch-tuning"
        );
    }

    #[test]
    fn paths_parse_back_from_their_rendering() {
        let paths = [
            global(4, LayerId::Layer1, LayerParameter::SendAmount),
            overridden(2, 15, LayerId::Layer2, LayerParameter::Select),
            ControlPath::Resonator(ResonatorParameter::DecayTime),
        ];
        for path in paths {
            assert_eq!(path.to_string().parse::<ControlPath>().unwrap(), path);
        }

        for text in [
            "controls.parts.part7.layer1.level",
            "controls.parts.part1.layer3.level",
            "parts.overridden-controls.part1.01.layer1.level",
            "controls.tempo",
        ] {
            let err = text.parse::<ControlPath>().unwrap_err();
            assert_eq!(err.kind(), "invalid-key", "{}", text);
            assert_eq!(err.path(), text);
        }
        let err = "controls.parts.part1.layer2.send-amount"
            .parse::<ControlPath>()
            .unwrap_err();
        assert_eq!(err.kind(), "unknown-parameter");
    }

    #[test]
    fn set_returns_previous_value() {
        let mut tree = ControlTree::default();
        let path = global(1, LayerId::Layer2, LayerParameter::Pitch);
        assert_eq!(tree.set(&path, 100).unwrap().map(|v| v.get()), Some(32));
        assert_eq!(tree.get(&path).unwrap().get(), 100);

        let resonator = ControlPath::Resonator(ResonatorParameter::DecayTime);
        assert_eq!(tree.set(&resonator, 1).unwrap().map(|v| v.get()), Some(64));
    }

    #[test]
    fn out_of_range_set_leaves_tree_unchanged() {
        let mut tree = ControlTree::default();
        let before = tree.clone();

        let err = tree
            .set(&global(4, LayerId::Layer1, LayerParameter::SendAmount), 128)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::OutOfRange {
                path: "controls.parts.part4.layer1.send-amount".to_string(),
                value: 128,
                min: 0,
                max: 127,
            }
        );
        assert_eq!(tree, before);
    }

    #[test]
    fn layer1_only_parameter_is_rejected_on_layer2() {
        let mut tree = ControlTree::default();
        let before = tree.clone();

        let err = tree
            .set(&global(1, LayerId::Layer2, LayerParameter::OverdriveGain), 5)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownParameter { .. }));
        let err = tree
            .set(&overridden(1, 3, LayerId::Layer2, LayerParameter::OverdriveGain), 5)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownParameter { .. }));
        assert_eq!(tree, before);
        assert_eq!(
            tree.get(&global(1, LayerId::Layer2, LayerParameter::OverdriveGain)),
            None
        );
    }

    #[test]
    fn override_lifecycle_falls_back_to_global() {
        let mut tree = ControlTree::default();
        let path = overridden(2, 5, LayerId::Layer1, LayerParameter::Level);

        assert_eq!(tree.set(&path, 90).unwrap(), None);
        assert_eq!(tree.get(&path).unwrap().get(), 90);

        assert!(tree.remove_override(PartIndex::new(2).unwrap(), StepIndex::new(5).unwrap()));
        assert_eq!(tree.get(&path).unwrap().get(), 64);
        assert!(!tree.remove_override(PartIndex::new(2).unwrap(), StepIndex::new(5).unwrap()));
        assert_eq!(tree.sequencer().overrides().count(), 0);
    }

    #[test]
    fn override_reads_track_later_global_edits() {
        let mut tree = ControlTree::default();
        let path = overridden(3, 9, LayerId::Layer2, LayerParameter::Select);
        tree.set(&global(3, LayerId::Layer2, LayerParameter::Select), 40)
            .unwrap();
        assert_eq!(tree.get(&path).unwrap().get(), 40);
    }
}
