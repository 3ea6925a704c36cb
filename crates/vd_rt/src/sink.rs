//! Parameter updates and their delivery to the device in split-channel mode: part `n`
//! listens on channel `n - 1`, resonator controls go out on channel 0.

use std::fmt;

use vd_core::schema::{LayerParameter, ResonatorParameter};
use vd_core::{ControlPath, ControlValue, LayerId, LeafPath, PartIndex};

use crate::midi::{MidiMessage, MidiOutput, TransportError};

/// One device parameter write. `part` and `layer` are `None` for resonator controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParameterUpdate {
    pub part: Option<PartIndex>,
    pub layer: Option<LayerId>,
    pub parameter: &'static str,
    pub value: ControlValue,
}

impl ParameterUpdate {
    /// The update for a control path, or `None` for paths the device has no
    /// parameter for (step overrides).
    pub fn for_control(path: &ControlPath, value: ControlValue) -> Option<Self> {
        match *path {
            ControlPath::Resonator(parameter) => Some(Self {
                part: None,
                layer: None,
                parameter: parameter.name(),
                value,
            }),
            ControlPath::Global {
                part,
                layer,
                parameter,
            } => Some(Self {
                part: Some(part),
                layer: Some(layer),
                parameter: parameter.name(),
                value,
            }),
            ControlPath::Override { .. } => None,
        }
    }

    pub fn for_leaf(path: &LeafPath, value: u16) -> Option<Self> {
        if !path.is_device_addressable() {
            return None;
        }
        let value = u8::try_from(value).ok().and_then(ControlValue::new)?;
        Self::for_control(&path.control_path()?, value)
    }

    pub fn channel(&self) -> u8 {
        self.part.map_or(0, |part| part.number() - 1)
    }
}

impl fmt::Display for ParameterUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.part, self.layer) {
            (Some(part), Some(layer)) => {
                write!(f, "{}.{}.{}={}", part, layer, self.parameter, self.value)
            }
            _ => write!(f, "resonator.{}={}", self.parameter, self.value),
        }
    }
}

/// Control-change number for an update, `None` when the device has no such control.
pub fn control_number(update: &ParameterUpdate) -> Option<u8> {
    match (update.part, update.layer) {
        (None, None) => ResonatorParameter::from_name(update.parameter).map(resonator_control),
        (Some(_), Some(layer)) => LayerParameter::from_name(update.parameter)
            .and_then(|parameter| layer_control(parameter, layer)),
        _ => None,
    }
}

fn layer_control(parameter: LayerParameter, layer: LayerId) -> Option<u8> {
    let (layer1, layer2) = match parameter {
        LayerParameter::Select => (14, Some(15)),
        LayerParameter::Level => (17, Some(18)),
        LayerParameter::EnvelopeGeneratorAttack => (20, Some(21)),
        LayerParameter::EnvelopeGeneratorRelease => (23, Some(24)),
        LayerParameter::Pitch => (26, Some(27)),
        LayerParameter::ModulationAmount => (29, Some(30)),
        LayerParameter::ModulationRate => (46, Some(47)),
        LayerParameter::LeftRightPan => (10, None),
        LayerParameter::SendAmount => (103, None),
        LayerParameter::BitReductionAmount => (49, None),
        LayerParameter::WaveFolderAmount => (50, None),
        LayerParameter::OverdriveGain => (51, None),
        LayerParameter::PreMixGainAdjustment => (52, None),
    };
    match layer {
        LayerId::Layer1 => Some(layer1),
        LayerId::Layer2 => layer2,
    }
}

fn resonator_control(parameter: ResonatorParameter) -> u8 {
    match parameter {
        ResonatorParameter::ResonatorModel => 116,
        ResonatorParameter::DecayTime => 117,
        ResonatorParameter::TimbralCharacter => 118,
        ResonatorParameter::PitchTuning => 119,
    }
}

/// The messaging collaborator: accepts one update at a time.
pub trait ParameterSink {
    fn send_parameter_update(&mut self, update: &ParameterUpdate) -> Result<(), TransportError>;
}

pub struct SplitChannelSink<O: MidiOutput> {
    output: O,
}

impl<O: MidiOutput> SplitChannelSink<O> {
    pub fn new(output: O) -> Self {
        Self { output }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_inner(self) -> O {
        self.output
    }
}

impl<O: MidiOutput> ParameterSink for SplitChannelSink<O> {
    fn send_parameter_update(&mut self, update: &ParameterUpdate) -> Result<(), TransportError> {
        let control =
            control_number(update).ok_or_else(|| TransportError::Unaddressable(update.to_string()))?;
        self.output.send(MidiMessage::control_change(
            update.channel(),
            control,
            update.value.get(),
        ))
    }
}

/// Records updates instead of sending them, optionally failing after a number of
/// successful sends.
#[derive(Default)]
pub struct RecordingSink {
    updates: Vec<ParameterUpdate>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn failing_after(count: usize) -> Self {
        Self {
            updates: Vec::new(),
            fail_after: Some(count),
        }
    }

    pub fn updates(&self) -> &[ParameterUpdate] {
        &self.updates
    }

    pub fn clear(&mut self) {
        self.updates.clear();
    }

    /// Lets sends succeed again, keeping what was recorded.
    pub fn reconnect(&mut self) {
        self.fail_after = None;
    }
}

impl ParameterSink for RecordingSink {
    fn send_parameter_update(&mut self, update: &ParameterUpdate) -> Result<(), TransportError> {
        if self
            .fail_after
            .is_some_and(|limit| self.updates.len() >= limit)
        {
            return Err(TransportError::Send(format!("refused {}", update)));
        }
        self.updates.push(*update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{control_number, ParameterSink, ParameterUpdate, RecordingSink, SplitChannelSink};
    use crate::midi::{BufferedMidiOutput, TransportError};
    use vd_core::schema::{LayerParameter, ResonatorParameter, LAYER1_PARAMETERS};
    use vd_core::{ControlPath, ControlValue, LayerId, LeafPath, PartIndex, SequencerPath, StepIndex};

    fn global(part: i64, layer: LayerId, parameter: LayerParameter, value: u8) -> ParameterUpdate {
        ParameterUpdate::for_control(
            &ControlPath::Global {
                part: PartIndex::new(part).unwrap(),
                layer,
                parameter,
            },
            ControlValue::new(value).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn part_four_send_amount_goes_out_on_channel_three() {
        let mut sink = SplitChannelSink::new(BufferedMidiOutput::default());
        sink.send_parameter_update(&global(4, LayerId::Layer1, LayerParameter::SendAmount, 12))
            .unwrap();
        assert_eq!(sink.output().sent_messages()[0].to_bytes(), [0xB3, 103, 12]);
    }

    #[test]
    fn resonator_updates_use_channel_zero() {
        let update = ParameterUpdate::for_control(
            &ControlPath::Resonator(ResonatorParameter::PitchTuning),
            ControlValue::MAX,
        )
        .unwrap();
        assert_eq!(update.part, None);
        assert_eq!(update.channel(), 0);
        assert_eq!(control_number(&update), Some(119));

        let mut sink = SplitChannelSink::new(BufferedMidiOutput::default());
        sink.send_parameter_update(&update).unwrap();
        assert_eq!(sink.into_inner().take_all()[0].to_bytes(), [0xB0, 119, 127]);
    }

    #[test]
    fn every_layer_parameter_has_a_distinct_control() {
        let mut seen = Vec::new();
        for parameter in LAYER1_PARAMETERS {
            for layer in LayerId::ALL {
                let update = ParameterUpdate {
                    part: PartIndex::new(1).ok(),
                    layer: Some(layer),
                    parameter: parameter.name(),
                    value: ControlValue::MIN,
                };
                match control_number(&update) {
                    Some(control) => {
                        assert!(!seen.contains(&control), "{} reused", control);
                        seen.push(control);
                    }
                    None => assert!(layer == LayerId::Layer2 && !parameter.is_shared()),
                }
            }
        }
        assert_eq!(seen.len(), 13 + 7);
    }

    #[test]
    fn unaddressable_update_is_a_transport_error() {
        let bogus = ParameterUpdate {
            part: PartIndex::new(2).ok(),
            layer: Some(LayerId::Layer2),
            parameter: "send-amount",
            value: ControlValue::MIN,
        };
        let mut sink = SplitChannelSink::new(BufferedMidiOutput::default());
        assert!(matches!(
            sink.send_parameter_update(&bogus),
            Err(TransportError::Unaddressable(_))
        ));
        assert_eq!(sink.output().sent_count(), 0);
    }

    #[test]
    fn only_device_leaves_become_updates() {
        let tempo = LeafPath::Sequencer(SequencerPath::Tempo);
        assert_eq!(ParameterUpdate::for_leaf(&tempo, 120), None);

        let overridden = LeafPath::Override {
            part: PartIndex::new(1).unwrap(),
            step: StepIndex::new(1).unwrap(),
            layer: LayerId::Layer1,
            parameter: LayerParameter::Level,
        };
        assert_eq!(ParameterUpdate::for_leaf(&overridden, 5), None);

        let level = LeafPath::Global {
            part: PartIndex::new(6).unwrap(),
            layer: LayerId::Layer2,
            parameter: LayerParameter::Level,
        };
        let update = ParameterUpdate::for_leaf(&level, 5).unwrap();
        assert_eq!(update.channel(), 5);
        assert_eq!(update.to_string(), "part6.layer2.level=5");
    }

    #[test]
    fn recording_sink_fails_after_limit() {
        let mut sink = RecordingSink::failing_after(1);
        let update = global(1, LayerId::Layer1, LayerParameter::Level, 1);
        sink.send_parameter_update(&update).unwrap();
        assert!(sink.send_parameter_update(&update).is_err());
        assert_eq!(sink.updates().len(), 1);

        sink.reconnect();
        sink.send_parameter_update(&update).unwrap();
        assert_eq!(sink.updates().len(), 2);
    }
}
