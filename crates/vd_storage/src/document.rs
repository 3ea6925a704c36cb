//! JSON form of a [`RootConfig`]. Keys are written in schema order, so saving an
//! unchanged configuration twice produces identical bytes.

use serde_json::{Map, Value};
use thiserror::Error;
use vd_core::model::{PartControls, PartOverride, ResonatorControls, SequencerConfig};
use vd_core::schema::{layer_parameters, RESONATOR_PARAMETERS};
use vd_core::validator::validate_root;
use vd_core::{LayerId, PartIndex, RootConfig, ValidationError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("configuration rejected: {0}")]
    Invalid(#[from] ValidationError),
}

pub fn to_document(config: &RootConfig) -> Value {
    let mut controls = Map::new();
    let mut parts = Map::new();
    for part in PartIndex::all() {
        parts.insert(part.key(), part_document(config.controls.part(part)));
    }
    controls.insert("parts".to_string(), Value::Object(parts));
    controls.insert(
        "waveguide-resonator".to_string(),
        resonator_document(&config.controls.resonator),
    );

    let mut root = Map::new();
    root.insert("port".to_string(), Value::String(config.port.clone()));
    root.insert("controls".to_string(), Value::Object(controls));
    root.insert("parts".to_string(), sequencer_document(&config.parts));
    Value::Object(root)
}

pub fn to_json(config: &RootConfig) -> Result<String, StorageError> {
    let mut text = serde_json::to_string_pretty(&to_document(config))?;
    text.push('\n');
    Ok(text)
}

/// Parses and validates a stored document.
pub fn from_json(text: &str) -> Result<RootConfig, StorageError> {
    let doc: Value = serde_json::from_str(text)?;
    let config = validate_root(&doc)?;
    for (part, step) in config.parts.steps_beyond_count() {
        log::warn!(
            "{} step {} is past step-count {} and will not play",
            part,
            step,
            config.parts.step_count()
        );
    }
    Ok(config)
}

fn part_document(part: &PartControls) -> Value {
    let mut layers = Map::new();
    for layer in LayerId::ALL {
        let mut values = Map::new();
        for &parameter in layer_parameters(layer) {
            if let Some(value) = part.get(layer, parameter) {
                values.insert(parameter.name().to_string(), Value::from(value.get()));
            }
        }
        layers.insert(layer.key().to_string(), Value::Object(values));
    }
    Value::Object(layers)
}

fn override_document(values: &PartOverride) -> Value {
    let mut layers = Map::new();
    for layer in LayerId::ALL {
        let mut layer_values = Map::new();
        for (parameter, value) in values.layer(layer) {
            layer_values.insert(parameter.name().to_string(), Value::from(value.get()));
        }
        if !layer_values.is_empty() {
            layers.insert(layer.key().to_string(), Value::Object(layer_values));
        }
    }
    Value::Object(layers)
}

fn resonator_document(resonator: &ResonatorControls) -> Value {
    let mut values = Map::new();
    for parameter in RESONATOR_PARAMETERS {
        values.insert(
            parameter.name().to_string(),
            Value::from(resonator.get(parameter).get()),
        );
    }
    Value::Object(values)
}

fn sequencer_document(parts: &SequencerConfig) -> Value {
    let mut doc = Map::new();
    doc.insert("step-count".to_string(), Value::from(parts.step_count()));
    if let Some(beats) = parts.beats_per_measure() {
        doc.insert("beats-per-measure".to_string(), Value::from(beats));
    }
    if let Some(tempo) = parts.tempo() {
        doc.insert("tempo".to_string(), Value::from(tempo));
    }
    if let Some(enabled) = parts.enabled_parts() {
        let numbers = enabled.iter().map(|part| Value::from(part.number())).collect();
        doc.insert("enabled-parts".to_string(), Value::Array(numbers));
    }

    let mut enabled_steps = Map::new();
    for part in PartIndex::all() {
        let steps: Vec<Value> = parts
            .enabled_steps(part)
            .map(|step| Value::from(step.number()))
            .collect();
        if !steps.is_empty() {
            enabled_steps.insert(part.key(), Value::Array(steps));
        }
    }
    if !enabled_steps.is_empty() {
        doc.insert("enabled-steps".to_string(), Value::Object(enabled_steps));
    }

    let mut overridden = Map::new();
    for (part, step, values) in parts.overrides() {
        let steps = overridden
            .entry(part.key())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(steps) = steps {
            steps.insert(step.key(), override_document(values));
        }
    }
    if !overridden.is_empty() {
        doc.insert("overridden-controls".to_string(), Value::Object(overridden));
    }

    Value::Object(doc)
}
