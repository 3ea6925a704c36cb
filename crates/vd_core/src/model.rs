use std::collections::{BTreeMap, BTreeSet};

use crate::error::ValidationError;
use crate::schema::{
    layer_parameters, LayerParameter, ResonatorParameter, BEATS_PER_MEASURE_RANGE,
    DEFAULT_BEATS_PER_MEASURE, DEFAULT_STEP_COUNT, DEFAULT_TEMPO, STEP_COUNT_RANGE, TEMPO_RANGE,
};
use crate::value::{ControlValue, LayerId, PartIndex, StepIndex, PART_COUNT};

/// The reduced parameter set shared by both layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layer2Controls {
    pub select: ControlValue,
    pub level: ControlValue,
    pub modulation_amount: ControlValue,
    pub modulation_rate: ControlValue,
    pub pitch: ControlValue,
    pub envelope_generator_attack: ControlValue,
    pub envelope_generator_release: ControlValue,
}

impl Default for Layer2Controls {
    fn default() -> Self {
        Self {
            select: LayerParameter::Select.default_value(),
            level: LayerParameter::Level.default_value(),
            modulation_amount: LayerParameter::ModulationAmount.default_value(),
            modulation_rate: LayerParameter::ModulationRate.default_value(),
            pitch: LayerParameter::Pitch.default_value(),
            envelope_generator_attack: LayerParameter::EnvelopeGeneratorAttack.default_value(),
            envelope_generator_release: LayerParameter::EnvelopeGeneratorRelease.default_value(),
        }
    }
}

impl Layer2Controls {
    fn slot_mut(&mut self, parameter: LayerParameter) -> Option<&mut ControlValue> {
        match parameter {
            LayerParameter::Select => Some(&mut self.select),
            LayerParameter::Level => Some(&mut self.level),
            LayerParameter::ModulationAmount => Some(&mut self.modulation_amount),
            LayerParameter::ModulationRate => Some(&mut self.modulation_rate),
            LayerParameter::Pitch => Some(&mut self.pitch),
            LayerParameter::EnvelopeGeneratorAttack => Some(&mut self.envelope_generator_attack),
            LayerParameter::EnvelopeGeneratorRelease => Some(&mut self.envelope_generator_release),
            _ => None,
        }
    }

    pub fn get(&self, parameter: LayerParameter) -> Option<ControlValue> {
        match parameter {
            LayerParameter::Select => Some(self.select),
            LayerParameter::Level => Some(self.level),
            LayerParameter::ModulationAmount => Some(self.modulation_amount),
            LayerParameter::ModulationRate => Some(self.modulation_rate),
            LayerParameter::Pitch => Some(self.pitch),
            LayerParameter::EnvelopeGeneratorAttack => Some(self.envelope_generator_attack),
            LayerParameter::EnvelopeGeneratorRelease => Some(self.envelope_generator_release),
            _ => None,
        }
    }

    /// Returns the previous value, or `None` when the parameter is not part of this layer.
    pub fn set(&mut self, parameter: LayerParameter, value: ControlValue) -> Option<ControlValue> {
        self.slot_mut(parameter)
            .map(|slot| std::mem::replace(slot, value))
    }
}

/// The full first-layer parameter set: the shared set plus the insert effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layer1Controls {
    pub shared: Layer2Controls,
    pub left_right_pan: ControlValue,
    pub send_amount: ControlValue,
    pub bit_reduction_amount: ControlValue,
    pub wave_folder_amount: ControlValue,
    pub overdrive_gain: ControlValue,
    pub pre_mix_gain_adjustment: ControlValue,
}

impl Default for Layer1Controls {
    fn default() -> Self {
        Self {
            shared: Layer2Controls::default(),
            left_right_pan: LayerParameter::LeftRightPan.default_value(),
            send_amount: LayerParameter::SendAmount.default_value(),
            bit_reduction_amount: LayerParameter::BitReductionAmount.default_value(),
            wave_folder_amount: LayerParameter::WaveFolderAmount.default_value(),
            overdrive_gain: LayerParameter::OverdriveGain.default_value(),
            pre_mix_gain_adjustment: LayerParameter::PreMixGainAdjustment.default_value(),
        }
    }
}

impl Layer1Controls {
    pub fn get(&self, parameter: LayerParameter) -> ControlValue {
        match parameter {
            LayerParameter::LeftRightPan => self.left_right_pan,
            LayerParameter::SendAmount => self.send_amount,
            LayerParameter::BitReductionAmount => self.bit_reduction_amount,
            LayerParameter::WaveFolderAmount => self.wave_folder_amount,
            LayerParameter::OverdriveGain => self.overdrive_gain,
            LayerParameter::PreMixGainAdjustment => self.pre_mix_gain_adjustment,
            shared => self.shared.get(shared).unwrap_or_default(),
        }
    }

    pub fn set(&mut self, parameter: LayerParameter, value: ControlValue) -> ControlValue {
        let slot = match parameter {
            LayerParameter::LeftRightPan => &mut self.left_right_pan,
            LayerParameter::SendAmount => &mut self.send_amount,
            LayerParameter::BitReductionAmount => &mut self.bit_reduction_amount,
            LayerParameter::WaveFolderAmount => &mut self.wave_folder_amount,
            LayerParameter::OverdriveGain => &mut self.overdrive_gain,
            LayerParameter::PreMixGainAdjustment => &mut self.pre_mix_gain_adjustment,
            shared => {
                return self.shared.set(shared, value).unwrap_or_default();
            }
        };
        std::mem::replace(slot, value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartControls {
    pub layer1: Layer1Controls,
    pub layer2: Layer2Controls,
}

impl PartControls {
    pub fn get(&self, layer: LayerId, parameter: LayerParameter) -> Option<ControlValue> {
        match layer {
            LayerId::Layer1 => Some(self.layer1.get(parameter)),
            LayerId::Layer2 => self.layer2.get(parameter),
        }
    }

    pub fn set(
        &mut self,
        layer: LayerId,
        parameter: LayerParameter,
        value: ControlValue,
    ) -> Option<ControlValue> {
        match layer {
            LayerId::Layer1 => Some(self.layer1.set(parameter, value)),
            LayerId::Layer2 => self.layer2.set(parameter, value),
        }
    }

    /// Builds a fully populated part; every parameter of both layers must be present.
    pub fn from_values(values: &PartOverride, path: &str) -> Result<Self, ValidationError> {
        let mut part = PartControls::default();
        for layer in LayerId::ALL {
            for &parameter in layer_parameters(layer) {
                let value = values.get(layer, parameter).ok_or_else(|| {
                    ValidationError::MissingRequired {
                        path: format!("{}.{}", path, layer.key()),
                        name: parameter.name().to_string(),
                    }
                })?;
                part.set(layer, parameter, value);
            }
        }
        Ok(part)
    }

    /// Applies the values of a step override on top of this part.
    pub fn with_override(&self, values: &PartOverride) -> PartControls {
        let mut part = *self;
        for (layer, parameter, value) in values.iter() {
            part.set(layer, parameter, value);
        }
        part
    }
}

/// A sparse set of per-layer values, used for per-step overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartOverride {
    layer1: BTreeMap<LayerParameter, ControlValue>,
    layer2: BTreeMap<LayerParameter, ControlValue>,
}

impl PartOverride {
    fn layer_map(&self, layer: LayerId) -> &BTreeMap<LayerParameter, ControlValue> {
        match layer {
            LayerId::Layer1 => &self.layer1,
            LayerId::Layer2 => &self.layer2,
        }
    }

    fn layer_map_mut(&mut self, layer: LayerId) -> &mut BTreeMap<LayerParameter, ControlValue> {
        match layer {
            LayerId::Layer1 => &mut self.layer1,
            LayerId::Layer2 => &mut self.layer2,
        }
    }

    pub fn get(&self, layer: LayerId, parameter: LayerParameter) -> Option<ControlValue> {
        self.layer_map(layer).get(&parameter).copied()
    }

    pub fn set(
        &mut self,
        layer: LayerId,
        parameter: LayerParameter,
        value: ControlValue,
    ) -> Result<Option<ControlValue>, ValidationError> {
        if !parameter.is_legal_for(layer) {
            return Err(ValidationError::UnknownParameter {
                path: layer.key().to_string(),
                name: parameter.name().to_string(),
            });
        }
        Ok(self.layer_map_mut(layer).insert(parameter, value))
    }

    pub fn remove(&mut self, layer: LayerId, parameter: LayerParameter) -> Option<ControlValue> {
        self.layer_map_mut(layer).remove(&parameter)
    }

    pub fn layer(&self, layer: LayerId) -> impl Iterator<Item = (LayerParameter, ControlValue)> + '_ {
        self.layer_map(layer).iter().map(|(p, v)| (*p, *v))
    }

    /// All values, layer1 first, each layer in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, LayerParameter, ControlValue)> + '_ {
        LayerId::ALL
            .into_iter()
            .flat_map(move |layer| self.layer(layer).map(move |(p, v)| (layer, p, v)))
    }

    pub fn len(&self) -> usize {
        self.layer1.len() + self.layer2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layer1.is_empty() && self.layer2.is_empty()
    }
}

impl From<&PartControls> for PartOverride {
    fn from(part: &PartControls) -> Self {
        let mut values = PartOverride::default();
        for layer in LayerId::ALL {
            for &parameter in layer_parameters(layer) {
                if let Some(value) = part.get(layer, parameter) {
                    values.layer_map_mut(layer).insert(parameter, value);
                }
            }
        }
        values
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResonatorControls {
    pub resonator_model: ControlValue,
    pub decay_time: ControlValue,
    pub timbral_character: ControlValue,
    pub pitch_tuning: ControlValue,
}

impl Default for ResonatorControls {
    fn default() -> Self {
        Self {
            resonator_model: ResonatorParameter::ResonatorModel.default_value(),
            decay_time: ResonatorParameter::DecayTime.default_value(),
            timbral_character: ResonatorParameter::TimbralCharacter.default_value(),
            pitch_tuning: ResonatorParameter::PitchTuning.default_value(),
        }
    }
}

impl ResonatorControls {
    pub fn get(&self, parameter: ResonatorParameter) -> ControlValue {
        match parameter {
            ResonatorParameter::ResonatorModel => self.resonator_model,
            ResonatorParameter::DecayTime => self.decay_time,
            ResonatorParameter::TimbralCharacter => self.timbral_character,
            ResonatorParameter::PitchTuning => self.pitch_tuning,
        }
    }

    pub fn set(&mut self, parameter: ResonatorParameter, value: ControlValue) -> ControlValue {
        let slot = match parameter {
            ResonatorParameter::ResonatorModel => &mut self.resonator_model,
            ResonatorParameter::DecayTime => &mut self.decay_time,
            ResonatorParameter::TimbralCharacter => &mut self.timbral_character,
            ResonatorParameter::PitchTuning => &mut self.pitch_tuning,
        };
        std::mem::replace(slot, value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalControls {
    pub parts: [PartControls; PART_COUNT],
    pub resonator: ResonatorControls,
}

impl GlobalControls {
    pub fn part(&self, part: PartIndex) -> &PartControls {
        &self.parts[part.slot()]
    }

    pub fn part_mut(&mut self, part: PartIndex) -> &mut PartControls {
        &mut self.parts[part.slot()]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencerConfig {
    pub(crate) step_count: u16,
    pub(crate) beats_per_measure: Option<u8>,
    pub(crate) tempo: Option<u16>,
    pub(crate) enabled_parts: Option<BTreeSet<PartIndex>>,
    pub(crate) enabled_steps: BTreeMap<PartIndex, BTreeSet<StepIndex>>,
    pub(crate) overridden_controls: BTreeMap<PartIndex, BTreeMap<StepIndex, PartOverride>>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            step_count: DEFAULT_STEP_COUNT,
            beats_per_measure: Some(DEFAULT_BEATS_PER_MEASURE),
            tempo: Some(DEFAULT_TEMPO),
            enabled_parts: Some(PartIndex::all().collect()),
            enabled_steps: BTreeMap::new(),
            overridden_controls: BTreeMap::new(),
        }
    }
}

pub(crate) fn check_range(
    path: &str,
    value: i64,
    (min, max): (i64, i64),
) -> Result<i64, ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            path: path.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}

impl SequencerConfig {
    /// A sequencer with only the required step count set.
    pub fn with_step_count(step_count: i64) -> Result<Self, ValidationError> {
        let step_count = check_range("parts.step-count", step_count, STEP_COUNT_RANGE)?;
        Ok(Self {
            step_count: step_count as u16,
            beats_per_measure: None,
            tempo: None,
            enabled_parts: None,
            enabled_steps: BTreeMap::new(),
            overridden_controls: BTreeMap::new(),
        })
    }

    pub fn step_count(&self) -> u16 {
        self.step_count
    }

    pub fn beats_per_measure(&self) -> Option<u8> {
        self.beats_per_measure
    }

    pub fn tempo(&self) -> Option<u16> {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: i64) -> Result<Option<u16>, ValidationError> {
        let tempo = check_range("parts.tempo", tempo, TEMPO_RANGE)? as u16;
        Ok(self.tempo.replace(tempo))
    }

    pub fn set_beats_per_measure(&mut self, beats: i64) -> Result<Option<u8>, ValidationError> {
        let beats = check_range("parts.beats-per-measure", beats, BEATS_PER_MEASURE_RANGE)? as u8;
        Ok(self.beats_per_measure.replace(beats))
    }

    /// The explicit enabled-parts set, `None` when the document leaves it out.
    pub fn enabled_parts(&self) -> Option<&BTreeSet<PartIndex>> {
        self.enabled_parts.as_ref()
    }

    /// Absent enabled-parts means every part plays.
    pub fn is_part_enabled(&self, part: PartIndex) -> bool {
        self.enabled_parts
            .as_ref()
            .map_or(true, |parts| parts.contains(&part))
    }

    /// Adds a part to the enabled set. Returns `false` if it was already enabled.
    pub fn enable_part(&mut self, part: i64) -> Result<bool, ValidationError> {
        let part = PartIndex::new(part).map_err(|e| e.with_path("parts.enabled-parts"))?;
        Ok(self
            .enabled_parts
            .get_or_insert_with(|| PartIndex::all().collect())
            .insert(part))
    }

    pub fn disable_part(&mut self, part: PartIndex) -> bool {
        self.enabled_parts
            .get_or_insert_with(|| PartIndex::all().collect())
            .remove(&part)
    }

    pub fn enabled_steps(&self, part: PartIndex) -> impl Iterator<Item = StepIndex> + '_ {
        self.enabled_steps
            .get(&part)
            .into_iter()
            .flat_map(|steps| steps.iter().copied())
    }

    pub fn is_step_enabled(&self, part: PartIndex, step: StepIndex) -> bool {
        self.enabled_steps
            .get(&part)
            .is_some_and(|steps| steps.contains(&step))
    }

    pub fn set_step_enabled(&mut self, part: PartIndex, step: StepIndex, enabled: bool) -> bool {
        let changed = if enabled {
            self.enabled_steps.entry(part).or_default().insert(step)
        } else {
            self.enabled_steps
                .get_mut(&part)
                .is_some_and(|steps| steps.remove(&step))
        };
        self.enabled_steps.retain(|_, steps| !steps.is_empty());
        changed
    }

    pub fn step_override(&self, part: PartIndex, step: StepIndex) -> Option<&PartOverride> {
        self.overridden_controls
            .get(&part)
            .and_then(|steps| steps.get(&step))
    }

    pub(crate) fn step_override_mut(&mut self, part: PartIndex, step: StepIndex) -> &mut PartOverride {
        self.overridden_controls
            .entry(part)
            .or_default()
            .entry(step)
            .or_default()
    }

    /// Deletes a step override. Returns the removed values, if any.
    pub fn remove_override(&mut self, part: PartIndex, step: StepIndex) -> Option<PartOverride> {
        let steps = self.overridden_controls.get_mut(&part)?;
        let removed = steps.remove(&step);
        if steps.is_empty() {
            self.overridden_controls.remove(&part);
        }
        removed
    }

    /// Overrides in part order, then ascending step order.
    pub fn overrides(&self) -> impl Iterator<Item = (PartIndex, StepIndex, &PartOverride)> + '_ {
        self.overridden_controls.iter().flat_map(|(part, steps)| {
            steps
                .iter()
                .map(move |(step, values)| (*part, *step, values))
        })
    }

    /// Enabled steps and overrides that reference steps past `step-count`.
    pub fn steps_beyond_count(&self) -> Vec<(PartIndex, StepIndex)> {
        let limit = u32::from(self.step_count);
        let enabled = self
            .enabled_steps
            .iter()
            .flat_map(|(part, steps)| steps.iter().map(move |step| (*part, *step)));
        let overridden = self.overrides().map(|(part, step, _)| (part, step));
        let mut beyond: Vec<_> = enabled
            .chain(overridden)
            .filter(|(_, step)| step.number() > limit)
            .collect();
        beyond.sort_unstable();
        beyond.dedup();
        beyond
    }

    pub(crate) fn normalize(&mut self) {
        self.enabled_steps.retain(|_, steps| !steps.is_empty());
        for steps in self.overridden_controls.values_mut() {
            steps.retain(|_, values| !values.is_empty());
        }
        self.overridden_controls.retain(|_, steps| !steps.is_empty());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootConfig {
    pub port: String,
    pub controls: GlobalControls,
    pub parts: SequencerConfig,
}
