mod stream;

pub use stream::*;

use midly::{live::LiveEvent, MidiMessage};

#[derive(Debug, Clone)]
pub struct MidiData {
    pub timestamp: u64,
    pub bytes: Vec<u8>,
}

/// A MIDI input endpoint as reported by the platform. The id is opaque
/// and only valid while the device stays connected; the name may be
/// empty on hosts that do not expose one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
}

impl NoteEvent {
    /// Decode a single channel-voice message. Only note-on and note-off
    /// produce an event; every other message, including malformed or
    /// truncated bytes, is silently dropped.
    ///
    /// A note-on with zero velocity is dropped rather than promoted to a
    /// note-off, so devices relying on that convention for key release
    /// will not produce a `NoteOff` here.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let Ok(event) = LiveEvent::parse(bytes) else {
            return None;
        };

        let LiveEvent::Midi { message, .. } = event else {
            return None;
        };

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() != 0 => Some(Self::NoteOn {
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, vel } => Some(Self::NoteOff {
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            _ => None,
        }
    }
}
