//! MIDI event handling and per-band note classification
//!
//! Incoming MIDI is not forwarded to hosted plugin instances (sends are
//! audio-only); it drives the band-level velocity tracking used for
//! velocity-dependent modulation by outer layers. Notes are assigned to a
//! frequency band by pitch, everything else applies to all bands.

use crate::types::BandId;

/// Highest note (exclusive) routed to the low band (below C3)
pub const LOW_BAND_NOTE_LIMIT: u8 = 48;

/// Highest note (exclusive) routed to the mid band (below F#5)
pub const MID_BAND_NOTE_LIMIT: u8 = 78;

/// A decoded MIDI message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note on with velocity (1-127; velocity 0 note-ons are normalized to NoteOff)
    NoteOn { note: u8, velocity: u8 },
    /// Note off
    NoteOff { note: u8 },
    /// Any other message, kept as raw status + data bytes
    Other([u8; 3]),
}

/// A MIDI event with its position inside the current block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Sample offset within the block
    pub sample_offset: usize,
    pub message: MidiMessage,
}

impl MidiEvent {
    pub fn new(sample_offset: usize, message: MidiMessage) -> Self {
        Self { sample_offset, message }
    }

    /// The band this event belongs to, or `None` for non-note messages
    /// (which apply to every band).
    pub fn band(&self) -> Option<BandId> {
        match self.message {
            MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note } => {
                Some(band_for_note(note))
            }
            MidiMessage::Other(_) => None,
        }
    }
}

/// Classify a note number into a frequency band
#[inline]
pub fn band_for_note(note: u8) -> BandId {
    if note < LOW_BAND_NOTE_LIMIT {
        BandId::Low
    } else if note < MID_BAND_NOTE_LIMIT {
        BandId::Mid
    } else {
        BandId::High
    }
}

/// An ordered collection of MIDI events for one audio block
///
/// Built by the encompassing host on the control side of the block callback;
/// the engine only iterates it.
#[derive(Debug, Clone, Default)]
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate space for `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Append an event. Note-ons with velocity 0 are stored as note-offs.
    pub fn push(&mut self, event: MidiEvent) {
        let event = match event.message {
            MidiMessage::NoteOn { note, velocity: 0 } => {
                MidiEvent::new(event.sample_offset, MidiMessage::NoteOff { note })
            }
            _ => event,
        };
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
