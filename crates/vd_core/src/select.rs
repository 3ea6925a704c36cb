//! Decoding of the two enumerated controls: the per-layer `select` combination and the
//! global `resonator-model`.

use crate::value::ControlValue;

const SOURCE_COUNT: u8 = 5;
const MODULATOR_COUNT: u8 = 3;
const ENVELOPE_COUNT: u8 = 3;
const MAX_COMBINATION_INDEX: u32 = (SOURCE_COUNT * MODULATOR_COUNT * ENVELOPE_COUNT) as u32 - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundSource {
    SineWave,
    SawtoothWave,
    HighPassFilteredNoise,
    LowPassFilteredNoise,
    BandPassFilteredNoise,
}

impl SoundSource {
    const ALL: [SoundSource; SOURCE_COUNT as usize] = [
        SoundSource::SineWave,
        SoundSource::SawtoothWave,
        SoundSource::HighPassFilteredNoise,
        SoundSource::LowPassFilteredNoise,
        SoundSource::BandPassFilteredNoise,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SoundSource::SineWave => "Sine wave",
            SoundSource::SawtoothWave => "Sawtooth wave",
            SoundSource::HighPassFilteredNoise => "High pass filtered noise",
            SoundSource::LowPassFilteredNoise => "Low pass filtered noise",
            SoundSource::BandPassFilteredNoise => "Band pass filtered noise",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PitchModulator {
    RiseFall,
    Oscillate,
    Random,
}

impl PitchModulator {
    const ALL: [PitchModulator; MODULATOR_COUNT as usize] = [
        PitchModulator::RiseFall,
        PitchModulator::Oscillate,
        PitchModulator::Random,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PitchModulator::RiseFall => "Rise-fall",
            PitchModulator::Oscillate => "Oscillate",
            PitchModulator::Random => "Random",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeGenerator {
    LinearAttackRelease,
    ExponentialAttackRelease,
    MultiPeakAttackRelease,
}

impl EnvelopeGenerator {
    const ALL: [EnvelopeGenerator; ENVELOPE_COUNT as usize] = [
        EnvelopeGenerator::LinearAttackRelease,
        EnvelopeGenerator::ExponentialAttackRelease,
        EnvelopeGenerator::MultiPeakAttackRelease,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EnvelopeGenerator::LinearAttackRelease => "Linear attack-release",
            EnvelopeGenerator::ExponentialAttackRelease => "Exponential attack-release",
            EnvelopeGenerator::MultiPeakAttackRelease => "Multi-peak attack-release",
        }
    }
}

/// One of the 45 sound-source / pitch-modulator / envelope combinations a layer can select.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectCombination {
    pub source: SoundSource,
    pub modulator: PitchModulator,
    pub envelope: EnvelopeGenerator,
}

impl SelectCombination {
    pub fn index(self) -> u32 {
        self.source as u32 * 9 + self.modulator as u32 * 3 + self.envelope as u32
    }

    /// Spreads the combination index over the 0..=127 control range.
    pub fn to_control_value(self) -> ControlValue {
        let scaled = (127 * self.index() + MAX_COMBINATION_INDEX - 1) / MAX_COMBINATION_INDEX;
        ControlValue::new(scaled as u8).unwrap_or(ControlValue::MAX)
    }

    pub fn from_control_value(value: ControlValue) -> Self {
        let index = u32::from(value.get()) * MAX_COMBINATION_INDEX / 127;
        let envelope = (index % 3) as usize;
        let modulator = ((index / 3) % 3) as usize;
        let source = ((index / 9) % 5) as usize;
        Self {
            source: SoundSource::ALL[source],
            modulator: PitchModulator::ALL[modulator],
            envelope: EnvelopeGenerator::ALL[envelope],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResonatorModel {
    Tube,
    String,
}

impl ResonatorModel {
    pub fn to_control_value(self) -> ControlValue {
        match self {
            ResonatorModel::Tube => ControlValue::MIN,
            ResonatorModel::String => ControlValue::MAX,
        }
    }

    pub fn from_control_value(value: ControlValue) -> Self {
        if value.get() / 127 == 0 {
            ResonatorModel::Tube
        } else {
            ResonatorModel::String
        }
    }
}
