//! Structural and range validation of configuration documents.
//!
//! Every function is pure and total: it either returns the typed value it validated
//! or the first violation found. Traversal order is fixed (unknown keys of a section
//! first, then its fields in schema order; at the root `port` comes first and unknown
//! top-level keys last) so the same document always reports the same error.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::model::{
    check_range, GlobalControls, PartControls, PartOverride, ResonatorControls, RootConfig,
    SequencerConfig,
};
use crate::schema::{
    layer_parameters, ControlCategory, FieldKind, BEATS_PER_MEASURE_RANGE, RESONATOR_PARAMETERS,
    TEMPO_RANGE,
};
use crate::value::{ControlValue, LayerId, PartIndex, StepIndex};

/// Whether a part document must carry every parameter (the global baseline) or may
/// carry any subset (a step override).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Full,
    Partial,
}

const ROOT_KEYS: [&str; 3] = ["port", "controls", "parts"];
const CONTROLS_KEYS: [&str; 2] = ["parts", "waveguide-resonator"];

pub fn validate_value(
    category: ControlCategory,
    name: &str,
    value: i64,
) -> Result<(), ValidationError> {
    let field = category
        .field(name)
        .ok_or_else(|| ValidationError::UnknownParameter {
            path: category.name().to_string(),
            name: name.to_string(),
        })?;
    match field.kind {
        FieldKind::Scalar { min, max } => check_range(name, value, (min, max)).map(|_| ()),
        FieldKind::Collection => Err(ValidationError::InvalidType {
            path: name.to_string(),
            expected: "a collection, not a single value",
        }),
    }
}

pub fn validate_part(
    presence: Presence,
    data: &Value,
    path: &str,
) -> Result<PartOverride, ValidationError> {
    let map = as_object(data, path)?;
    for key in map.keys() {
        if LayerId::from_key(key).is_none() {
            return Err(ValidationError::InvalidKey {
                path: path.to_string(),
                key: key.clone(),
            });
        }
    }

    let mut values = PartOverride::default();
    for layer in LayerId::ALL {
        match map.get(layer.key()) {
            Some(layer_data) => validate_layer(
                presence,
                layer,
                layer_data,
                &join(path, layer.key()),
                &mut values,
            )?,
            None if presence == Presence::Full => {
                return Err(ValidationError::MissingRequired {
                    path: path.to_string(),
                    name: layer.key().to_string(),
                })
            }
            None => {}
        }
    }
    Ok(values)
}

fn validate_layer(
    presence: Presence,
    layer: LayerId,
    data: &Value,
    path: &str,
    into: &mut PartOverride,
) -> Result<(), ValidationError> {
    let map = as_object(data, path)?;
    let category = ControlCategory::for_layer(layer);
    reject_unknown(map, path, |key| category.field(key).is_some())?;

    for &parameter in layer_parameters(layer) {
        let field_path = join(path, parameter.name());
        let Some(raw) = map.get(parameter.name()) else {
            if presence == Presence::Full {
                return Err(ValidationError::MissingRequired {
                    path: path.to_string(),
                    name: parameter.name().to_string(),
                });
            }
            continue;
        };
        let value = as_integer(raw, &field_path)?;
        validate_value(category, parameter.name(), value).map_err(|e| e.with_path(&field_path))?;
        let value = ControlValue::from_raw(value, &field_path)?;
        into.set(layer, parameter, value)
            .map_err(|e| e.with_path(&field_path))?;
    }
    Ok(())
}

pub fn validate_resonator(data: &Value, path: &str) -> Result<ResonatorControls, ValidationError> {
    let map = as_object(data, path)?;
    reject_unknown(map, path, |key| {
        ControlCategory::Resonator.field(key).is_some()
    })?;

    let mut resonator = ResonatorControls::default();
    for parameter in RESONATOR_PARAMETERS {
        let field_path = join(path, parameter.name());
        let raw = map
            .get(parameter.name())
            .ok_or_else(|| ValidationError::MissingRequired {
                path: path.to_string(),
                name: parameter.name().to_string(),
            })?;
        let value = as_integer(raw, &field_path)?;
        validate_value(ControlCategory::Resonator, parameter.name(), value)
            .map_err(|e| e.with_path(&field_path))?;
        resonator.set(parameter, ControlValue::from_raw(value, &field_path)?);
    }
    Ok(resonator)
}

pub fn validate_controls(data: &Value, path: &str) -> Result<GlobalControls, ValidationError> {
    let map = as_object(data, path)?;
    reject_unknown(map, path, |key| CONTROLS_KEYS.contains(&key))?;

    let parts_path = join(path, "parts");
    let parts_data = required(map, path, "parts")?;
    let parts_map = as_object(parts_data, &parts_path)?;
    for key in parts_map.keys() {
        PartIndex::from_key(key).map_err(|e| e.with_path(&parts_path))?;
    }

    let mut controls = GlobalControls::default();
    for part in PartIndex::all() {
        let part_path = join(&parts_path, &part.key());
        let part_data = required(parts_map, &parts_path, &part.key())?;
        let values = validate_part(Presence::Full, part_data, &part_path)?;
        *controls.part_mut(part) = PartControls::from_values(&values, &part_path)?;
    }

    let resonator_path = join(path, "waveguide-resonator");
    let resonator_data = required(map, path, "waveguide-resonator")?;
    controls.resonator = validate_resonator(resonator_data, &resonator_path)?;
    Ok(controls)
}

pub fn validate_sequencer(data: &Value, path: &str) -> Result<SequencerConfig, ValidationError> {
    let map = as_object(data, path)?;
    reject_unknown(map, path, |key| {
        ControlCategory::SequencerTopLevel.field(key).is_some()
    })?;

    let step_count_path = join(path, "step-count");
    let step_count = as_integer(required(map, path, "step-count")?, &step_count_path)?;
    let mut config = SequencerConfig::with_step_count(step_count)
        .map_err(|e| e.with_path(&step_count_path))?;

    if let Some(raw) = map.get("beats-per-measure") {
        let field_path = join(path, "beats-per-measure");
        let beats = check_range(&field_path, as_integer(raw, &field_path)?, BEATS_PER_MEASURE_RANGE)?;
        config.beats_per_measure = Some(beats as u8);
    }

    if let Some(raw) = map.get("tempo") {
        let field_path = join(path, "tempo");
        let tempo = check_range(&field_path, as_integer(raw, &field_path)?, TEMPO_RANGE)?;
        config.tempo = Some(tempo as u16);
    }

    if let Some(raw) = map.get("enabled-parts") {
        let field_path = join(path, "enabled-parts");
        let mut parts = BTreeSet::new();
        for (position, item) in as_array(raw, &field_path)?.iter().enumerate() {
            let item_path = format!("{}[{}]", field_path, position);
            let number = as_integer(item, &item_path)?;
            let part = PartIndex::new(number).map_err(|e| e.with_path(&item_path))?;
            if !parts.insert(part) {
                return Err(ValidationError::Duplicate {
                    path: field_path,
                    value: number,
                });
            }
        }
        config.enabled_parts = Some(parts);
    }

    if let Some(raw) = map.get("enabled-steps") {
        let field_path = join(path, "enabled-steps");
        let by_part = as_object(raw, &field_path)?;
        for (key, steps_data) in by_part {
            let part = PartIndex::from_key(key).map_err(|e| e.with_path(&field_path))?;
            let part_path = join(&field_path, key);
            let mut steps = BTreeSet::new();
            for (position, item) in as_array(steps_data, &part_path)?.iter().enumerate() {
                let item_path = format!("{}[{}]", part_path, position);
                let number = as_integer(item, &item_path)?;
                let step = StepIndex::new(number).map_err(|e| e.with_path(&item_path))?;
                if !steps.insert(step) {
                    return Err(ValidationError::Duplicate {
                        path: part_path,
                        value: number,
                    });
                }
            }
            config.enabled_steps.insert(part, steps);
        }
    }

    if let Some(raw) = map.get("overridden-controls") {
        let field_path = join(path, "overridden-controls");
        let by_part = as_object(raw, &field_path)?;
        for (key, steps_data) in by_part {
            let part = PartIndex::from_key(key).map_err(|e| e.with_path(&field_path))?;
            let part_path = join(&field_path, key);
            let mut overrides = BTreeMap::new();
            for (step_key, values_data) in as_object(steps_data, &part_path)? {
                let step = StepIndex::from_key(step_key).map_err(|e| e.with_path(&part_path))?;
                let values =
                    validate_part(Presence::Partial, values_data, &join(&part_path, step_key))?;
                overrides.insert(step, values);
            }
            config.overridden_controls.insert(part, overrides);
        }
    }

    config.normalize();
    Ok(config)
}

/// Validates a whole document: `port`, then `controls.parts`, then
/// `controls.waveguide-resonator`, then the sequencer section, then unknown
/// top-level keys.
pub fn validate_root(doc: &Value) -> Result<RootConfig, ValidationError> {
    let map = as_object(doc, "$")?;

    let port = match required(map, "$", "port")? {
        Value::String(port) => port.clone(),
        _ => {
            return Err(ValidationError::InvalidType {
                path: "port".to_string(),
                expected: "string",
            })
        }
    };
    let controls = validate_controls(required(map, "$", "controls")?, "controls")?;
    let parts = validate_sequencer(required(map, "$", "parts")?, "parts")?;
    reject_unknown(map, "$", |key| ROOT_KEYS.contains(&key))?;

    Ok(RootConfig {
        port,
        controls,
        parts,
    })
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() || path == "$" {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn required<'a>(
    map: &'a Map<String, Value>,
    path: &str,
    name: &str,
) -> Result<&'a Value, ValidationError> {
    map.get(name).ok_or_else(|| ValidationError::MissingRequired {
        path: path.to_string(),
        name: name.to_string(),
    })
}

fn reject_unknown(
    map: &Map<String, Value>,
    path: &str,
    is_known: impl Fn(&str) -> bool,
) -> Result<(), ValidationError> {
    match map.keys().find(|key| !is_known(key)) {
        Some(key) => Err(ValidationError::UnknownParameter {
            path: path.to_string(),
            name: key.clone(),
        }),
        None => Ok(()),
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value.as_object().ok_or_else(|| ValidationError::InvalidType {
        path: path.to_string(),
        expected: "object",
    })
}

fn as_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ValidationError> {
    value.as_array().ok_or_else(|| ValidationError::InvalidType {
        path: path.to_string(),
        expected: "array",
    })
}

fn as_integer(value: &Value, path: &str) -> Result<i64, ValidationError> {
    let Value::Number(number) = value else {
        return Err(ValidationError::InvalidType {
            path: path.to_string(),
            expected: "integer",
        });
    };
    if let Some(v) = number.as_i64() {
        return Ok(v);
    }
    Err(ValidationError::InvalidType {
        path: path.to_string(),
        expected: if number.is_u64() {
            "integer within 64-bit signed range"
        } else {
            "integer"
        },
    })
}
