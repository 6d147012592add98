pub mod access;
pub mod monitor;

pub mod prelude {
    pub use crate::access::{
        AccessState, DeviceInfo, MidiAccess, MidiAccessError, MidiAccessPlugin, MidiAccessSettings,
    };
    pub use crate::monitor::{logging_handler, Handler, MidiMessageEvent, MidiMonitor};
    pub use crate::MidiMessage;
}

pub const KEY_RANGE: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

const NOTE_ON_STATUS: u8 = 0b1001_0000;
const NOTE_OFF_STATUS: u8 = 0b1000_0000;
const SYSTEM_STATUS: u8 = 0b1111_0000;

/// Raw payload of one MIDI message.
///
/// Channel-voice messages are three bytes or fewer; system-exclusive
/// messages have no upper bound, so the payload is kept as-is rather than
/// truncated to a fixed array. Accessors never panic on short payloads.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MidiMessage {
    pub data: Vec<u8>,
}

impl From<&[u8]> for MidiMessage {
    fn from(data: &[u8]) -> Self {
        MidiMessage {
            data: data.to_vec(),
        }
    }
}

impl From<Vec<u8>> for MidiMessage {
    fn from(data: Vec<u8>) -> Self {
        MidiMessage { data }
    }
}

impl MidiMessage {
    /// Status nibble of the message, or `None` for an empty payload.
    #[must_use]
    pub fn status(&self) -> Option<u8> {
        self.data.first().map(|byte| byte & 0b1111_0000)
    }

    #[must_use]
    pub fn is_note_on(&self) -> bool {
        self.status() == Some(NOTE_ON_STATUS)
    }

    #[must_use]
    pub fn is_note_off(&self) -> bool {
        self.status() == Some(NOTE_OFF_STATUS)
    }

    /// Get the channel of a message; `None` for system messages.
    #[must_use]
    pub fn channel(&self) -> Option<u8> {
        match self.status() {
            Some(SYSTEM_STATUS) | None => None,
            Some(_) => self.data.first().map(|byte| byte & 0b0000_1111),
        }
    }
}

impl std::fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let [_, pitch, vel] = *self.data.as_slice() {
            let key = KEY_RANGE[pitch as usize % 12];
            let octave = pitch / 12;
            if self.is_note_on() {
                return write!(f, "NoteOn: {key}{octave} Vel: {vel}");
            }
            if self.is_note_off() {
                return write!(f, "NoteOff: {key}{octave} Vel: {vel}");
            }
        }
        write!(f, "Other: {:02X?}", self.data)
    }
}
