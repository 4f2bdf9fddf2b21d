//! Decodes raw 1-3 byte MIDI channel-voice messages into structured records.

use std::fmt;
use std::sync::Arc;

/// Pitch-class names for the 12 semitones, sharps written in "C#/Db" style.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

/// MIDI channel in 1..=16 (the wire carries 0..=15 in the status low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(u8);

impl Channel {
    fn from_status(status: u8) -> Self {
        Self((status & 0x0F) + 1)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message classification from the status high nibble. Anything outside
/// 0x8..=0xE (system messages, stray data bytes) is `Invalid`; that is a
/// terminal classification, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    NoteOff,
    NoteOn,
    PolyphonicKeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    Invalid,
}

impl MessageKind {
    fn from_status(status: u8) -> Self {
        match status >> 4 {
            0x8 => Self::NoteOff,
            0x9 => Self::NoteOn,
            0xA => Self::PolyphonicKeyPressure,
            0xB => Self::ControlChange,
            0xC => Self::ProgramChange,
            0xD => Self::ChannelPressure,
            0xE => Self::PitchBend,
            _ => Self::Invalid,
        }
    }

    pub fn is_note(self) -> bool {
        matches!(self, Self::NoteOn | Self::NoteOff)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoteOff => "note-off",
            Self::NoteOn => "note-on",
            Self::PolyphonicKeyPressure => "polyphonic-key-pressure",
            Self::ControlChange => "control-change",
            Self::ProgramChange => "program-change",
            Self::ChannelPressure => "channel-pressure",
            Self::PitchBend => "pitch-bend",
            Self::Invalid => "invalid",
        })
    }
}

/// Identity of the input device a message arrived on. The platform layer
/// owns the device; this is a cheap clonable name, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded channel-voice message. Built fresh per inbound event,
/// immutable afterwards.
///
/// `second_value` is `None` for the 2-byte kinds (ProgramChange,
/// ChannelPressure) and for truncated messages. A missing second byte
/// decodes as `first_value == 0`; classification stays status-driven either
/// way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub source: SourceId,
    pub channel: Channel,
    pub kind: MessageKind,
    pub first_value: u8,
    pub second_value: Option<u8>,
}

/// Note-bearing record built from NoteOn/NoteOff decodes only, carrying the
/// rendered note name ("C5", "C#/Db5", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteMessage {
    pub source: SourceId,
    pub channel: Channel,
    pub kind: MessageKind,
    pub key: u8,
    pub velocity: Option<u8>,
    pub note: String,
}

impl NoteMessage {
    pub fn from_decoded(msg: &DecodedMessage) -> Option<Self> {
        if !msg.kind.is_note() {
            return None;
        }
        Some(Self {
            source: msg.source.clone(),
            channel: msg.channel,
            kind: msg.kind,
            key: msg.first_value,
            velocity: msg.second_value,
            note: note_name(msg.first_value),
        })
    }
}

/// What the listener forwards downstream: note messages enriched with their
/// name, everything else (Invalid included) as the plain decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxEvent {
    Note(NoteMessage),
    Other(DecodedMessage),
}

// ─────────────────── decoding ────────────────────────────────────────────────

/// Decodes a raw MIDI message. Pure and total for non-empty input: an
/// unrecognized status byte yields `MessageKind::Invalid` rather than an
/// error. Only an empty buffer returns `None`.
pub fn decode(source: &SourceId, data: &[u8]) -> Option<DecodedMessage> {
    let status = *data.first()?;

    Some(DecodedMessage {
        source: source.clone(),
        channel: Channel::from_status(status),
        kind: MessageKind::from_status(status),
        first_value: data.get(1).copied().unwrap_or(0),
        second_value: data.get(2).copied(),
    })
}

/// Renders a key number as pitch class + octave, octave = key / 12. Any u8
/// computes through the same arithmetic; out-of-range keys are not rejected.
pub fn note_name(key: u8) -> String {
    format!("{}{}", NOTE_NAMES[(key % 12) as usize], key / 12)
}
