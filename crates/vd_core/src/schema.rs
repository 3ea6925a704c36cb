//! Static description of every legal control: names, ordering and bounds.
//!
//! The declaration order of [`LayerParameter`] and [`ResonatorParameter`] is the
//! canonical field order used by the serializer and the diff engine.

use crate::value::{ControlValue, LayerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerParameter {
    Select,
    Level,
    ModulationAmount,
    ModulationRate,
    Pitch,
    EnvelopeGeneratorAttack,
    EnvelopeGeneratorRelease,
    LeftRightPan,
    SendAmount,
    BitReductionAmount,
    WaveFolderAmount,
    OverdriveGain,
    PreMixGainAdjustment,
}

pub const LAYER1_PARAMETERS: [LayerParameter; 13] = [
    LayerParameter::Select,
    LayerParameter::Level,
    LayerParameter::ModulationAmount,
    LayerParameter::ModulationRate,
    LayerParameter::Pitch,
    LayerParameter::EnvelopeGeneratorAttack,
    LayerParameter::EnvelopeGeneratorRelease,
    LayerParameter::LeftRightPan,
    LayerParameter::SendAmount,
    LayerParameter::BitReductionAmount,
    LayerParameter::WaveFolderAmount,
    LayerParameter::OverdriveGain,
    LayerParameter::PreMixGainAdjustment,
];

pub const LAYER2_PARAMETERS: [LayerParameter; 7] = [
    LayerParameter::Select,
    LayerParameter::Level,
    LayerParameter::ModulationAmount,
    LayerParameter::ModulationRate,
    LayerParameter::Pitch,
    LayerParameter::EnvelopeGeneratorAttack,
    LayerParameter::EnvelopeGeneratorRelease,
];

impl LayerParameter {
    pub fn name(self) -> &'static str {
        match self {
            LayerParameter::Select => "select",
            LayerParameter::Level => "level",
            LayerParameter::ModulationAmount => "modulation-amount",
            LayerParameter::ModulationRate => "modulation-rate",
            LayerParameter::Pitch => "pitch",
            LayerParameter::EnvelopeGeneratorAttack => "envelope-generator-attack",
            LayerParameter::EnvelopeGeneratorRelease => "envelope-generator-release",
            LayerParameter::LeftRightPan => "left-right-pan",
            LayerParameter::SendAmount => "send-amount",
            LayerParameter::BitReductionAmount => "bit-reduction-amount",
            LayerParameter::WaveFolderAmount => "wave-folder-amount",
            LayerParameter::OverdriveGain => "overdrive-gain",
            LayerParameter::PreMixGainAdjustment => "pre-mix-gain-adjustment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        LAYER1_PARAMETERS.iter().copied().find(|p| p.name() == name)
    }

    /// Whether the reduced second layer carries this parameter too.
    pub fn is_shared(self) -> bool {
        LAYER2_PARAMETERS.contains(&self)
    }

    pub fn is_legal_for(self, layer: LayerId) -> bool {
        match layer {
            LayerId::Layer1 => true,
            LayerId::Layer2 => self.is_shared(),
        }
    }

    pub fn default_value(self) -> ControlValue {
        let raw = match self {
            LayerParameter::Select => 0,
            LayerParameter::Level => 64,
            LayerParameter::ModulationAmount => 64,
            LayerParameter::ModulationRate => 64,
            LayerParameter::Pitch => 32,
            LayerParameter::EnvelopeGeneratorAttack => 64,
            LayerParameter::EnvelopeGeneratorRelease => 64,
            LayerParameter::LeftRightPan => 64,
            LayerParameter::SendAmount => 0,
            LayerParameter::BitReductionAmount => 0,
            LayerParameter::WaveFolderAmount => 0,
            LayerParameter::OverdriveGain => 0,
            LayerParameter::PreMixGainAdjustment => 127,
        };
        ControlValue::new(raw).unwrap_or_default()
    }
}

pub fn layer_parameters(layer: LayerId) -> &'static [LayerParameter] {
    match layer {
        LayerId::Layer1 => &LAYER1_PARAMETERS,
        LayerId::Layer2 => &LAYER2_PARAMETERS,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResonatorParameter {
    ResonatorModel,
    DecayTime,
    TimbralCharacter,
    PitchTuning,
}

pub const RESONATOR_PARAMETERS: [ResonatorParameter; 4] = [
    ResonatorParameter::ResonatorModel,
    ResonatorParameter::DecayTime,
    ResonatorParameter::TimbralCharacter,
    ResonatorParameter::PitchTuning,
];

impl ResonatorParameter {
    pub fn name(self) -> &'static str {
        match self {
            ResonatorParameter::ResonatorModel => "resonator-model",
            ResonatorParameter::DecayTime => "decay-time",
            ResonatorParameter::TimbralCharacter => "timbral-character",
            ResonatorParameter::PitchTuning => "pitch-tuning",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RESONATOR_PARAMETERS.iter().copied().find(|p| p.name() == name)
    }

    pub fn default_value(self) -> ControlValue {
        let raw = match self {
            ResonatorParameter::ResonatorModel => 0,
            _ => 64,
        };
        ControlValue::new(raw).unwrap_or_default()
    }
}

pub const STEP_COUNT_RANGE: (i64, i64) = (16, 1024);
pub const BEATS_PER_MEASURE_RANGE: (i64, i64) = (2, 16);
pub const TEMPO_RANGE: (i64, i64) = (60, 360);

pub const DEFAULT_STEP_COUNT: u16 = 16;
pub const DEFAULT_BEATS_PER_MEASURE: u8 = 4;
pub const DEFAULT_TEMPO: u16 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar { min: i64, max: i64 },
    Collection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const CONTROL_BOUNDS: FieldKind = FieldKind::Scalar { min: 0, max: 127 };

const fn control(name: &'static str) -> FieldSchema {
    FieldSchema {
        name,
        kind: CONTROL_BOUNDS,
        required: true,
    }
}

const GLOBAL_PART_LAYER1_FIELDS: [FieldSchema; 13] = [
    control("select"),
    control("level"),
    control("modulation-amount"),
    control("modulation-rate"),
    control("pitch"),
    control("envelope-generator-attack"),
    control("envelope-generator-release"),
    control("left-right-pan"),
    control("send-amount"),
    control("bit-reduction-amount"),
    control("wave-folder-amount"),
    control("overdrive-gain"),
    control("pre-mix-gain-adjustment"),
];

const GLOBAL_PART_LAYER2_FIELDS: [FieldSchema; 7] = [
    control("select"),
    control("level"),
    control("modulation-amount"),
    control("modulation-rate"),
    control("pitch"),
    control("envelope-generator-attack"),
    control("envelope-generator-release"),
];

const RESONATOR_FIELDS: [FieldSchema; 4] = [
    control("resonator-model"),
    control("decay-time"),
    control("timbral-character"),
    control("pitch-tuning"),
];

const SEQUENCER_FIELDS: [FieldSchema; 6] = [
    FieldSchema {
        name: "step-count",
        kind: FieldKind::Scalar {
            min: STEP_COUNT_RANGE.0,
            max: STEP_COUNT_RANGE.1,
        },
        required: true,
    },
    FieldSchema {
        name: "beats-per-measure",
        kind: FieldKind::Scalar {
            min: BEATS_PER_MEASURE_RANGE.0,
            max: BEATS_PER_MEASURE_RANGE.1,
        },
        required: false,
    },
    FieldSchema {
        name: "tempo",
        kind: FieldKind::Scalar {
            min: TEMPO_RANGE.0,
            max: TEMPO_RANGE.1,
        },
        required: false,
    },
    FieldSchema {
        name: "enabled-parts",
        kind: FieldKind::Collection,
        required: false,
    },
    FieldSchema {
        name: "enabled-steps",
        kind: FieldKind::Collection,
        required: false,
    },
    FieldSchema {
        name: "overridden-controls",
        kind: FieldKind::Collection,
        required: false,
    },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlCategory {
    GlobalPartLayer1,
    GlobalPartLayer2,
    Resonator,
    SequencerTopLevel,
}

impl ControlCategory {
    pub fn for_layer(layer: LayerId) -> Self {
        match layer {
            LayerId::Layer1 => ControlCategory::GlobalPartLayer1,
            LayerId::Layer2 => ControlCategory::GlobalPartLayer2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlCategory::GlobalPartLayer1 => "global-part-layer1",
            ControlCategory::GlobalPartLayer2 => "global-part-layer2",
            ControlCategory::Resonator => "resonator",
            ControlCategory::SequencerTopLevel => "sequencer-top-level",
        }
    }

    /// Legal fields in canonical order.
    pub fn fields(self) -> &'static [FieldSchema] {
        match self {
            ControlCategory::GlobalPartLayer1 => &GLOBAL_PART_LAYER1_FIELDS,
            ControlCategory::GlobalPartLayer2 => &GLOBAL_PART_LAYER2_FIELDS,
            ControlCategory::Resonator => &RESONATOR_FIELDS,
            ControlCategory::SequencerTopLevel => &SEQUENCER_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSchema> {
        self.fields().iter().find(|field| field.name == name)
    }
}
