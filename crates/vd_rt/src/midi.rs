use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiMessage {
    pub fn control_change(channel: u8, control: u8, value: u8) -> Self {
        Self {
            status: 0xB0 | (channel & 0x0F),
            data1: control & 0x7F,
            data2: value & 0x7F,
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodedMidi {
    ControlChange { channel: u8, control: u8, value: u8 },
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("output `{0}` is closed")]
    Closed(String),
    #[error("device has no control for `{0}`")]
    Unaddressable(String),
    #[error("send failed: {0}")]
    Send(String),
}

pub trait MidiOutput {
    fn send(&mut self, msg: MidiMessage) -> Result<(), TransportError>;
}

/// Keeps every message it is given. With a send limit it starts failing once the
/// limit is reached, like a cable pulled mid-transfer.
#[derive(Default)]
pub struct BufferedMidiOutput {
    sent: Vec<MidiMessage>,
    send_limit: Option<usize>,
}

impl MidiOutput for BufferedMidiOutput {
    fn send(&mut self, msg: MidiMessage) -> Result<(), TransportError> {
        if self.send_limit.is_some_and(|limit| self.sent.len() >= limit) {
            return Err(TransportError::Send(format!(
                "link dropped after {} messages",
                self.sent.len()
            )));
        }
        self.sent.push(msg);
        Ok(())
    }
}

impl BufferedMidiOutput {
    pub fn failing_after(limit: usize) -> Self {
        Self {
            sent: Vec::new(),
            send_limit: Some(limit),
        }
    }

    pub fn sent_messages(&self) -> &[MidiMessage] {
        &self.sent
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn take_all(&mut self) -> Vec<MidiMessage> {
        std::mem::take(&mut self.sent)
    }
}

/// Stand-in for a hardware port: logs every message it would put on the wire.
pub struct LoggingMidiOutput {
    port: String,
    sent_count: usize,
}

impl LoggingMidiOutput {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            sent_count: 0,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn sent_count(&self) -> usize {
        self.sent_count
    }
}

impl MidiOutput for LoggingMidiOutput {
    fn send(&mut self, msg: MidiMessage) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::Closed("<no port>".to_string()));
        }
        match decode_message(msg) {
            DecodedMidi::ControlChange {
                channel,
                control,
                value,
            } => log::debug!(
                "{}: cc ch={} control={} value={}",
                self.port,
                channel,
                control,
                value
            ),
            DecodedMidi::Unknown => log::debug!("{}: raw {:02X?}", self.port, msg.to_bytes()),
        }
        self.sent_count = self.sent_count.saturating_add(1);
        Ok(())
    }
}

pub fn decode_message(msg: MidiMessage) -> DecodedMidi {
    let upper_status = msg.status & 0xF0;
    let channel = msg.status & 0x0F;

    match upper_status {
        0xB0 => DecodedMidi::ControlChange {
            channel,
            control: msg.data1,
            value: msg.data2,
        },
        _ => DecodedMidi::Unknown,
    }
}
