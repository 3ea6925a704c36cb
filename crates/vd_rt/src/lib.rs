pub mod midi;
pub mod sink;

pub use midi::{MidiMessage, MidiOutput, TransportError};
pub use sink::{ParameterSink, ParameterUpdate, RecordingSink, SplitChannelSink};
