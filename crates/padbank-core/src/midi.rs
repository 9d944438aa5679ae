//! Raw MIDI events as delivered in the input sequence

use crate::types::PadId;

/// Parsed channel-voice message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiEvent {
    /// Parse raw MIDI bytes
    ///
    /// Returns `None` for anything other than note on/off and CC (pitch bend,
    /// aftertouch, sysex, running status).
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if rest.len() < 2 {
            return None;
        }
        let channel = status & 0x0F;
        let (d1, d2) = (rest[0] & 0x7F, rest[1] & 0x7F);

        match status & 0xF0 {
            0x80 => Some(Self::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            }),
            // Note On with velocity 0 is a Note Off
            0x90 if d2 == 0 => Some(Self::NoteOff {
                channel,
                note: d1,
                velocity: 0,
            }),
            0x90 => Some(Self::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            }),
            0xB0 => Some(Self::ControlChange {
                channel,
                cc: d1,
                value: d2,
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. } => *channel,
        }
    }

    /// Pad addressed by a note event, if the channel and note are in range
    pub fn pad(&self) -> Option<PadId> {
        match self {
            Self::NoteOn { channel, note, .. } | Self::NoteOff { channel, note, .. } => {
                PadId::from_midi(*channel, *note)
            }
            Self::ControlChange { .. } => None,
        }
    }

    /// Encode back to three raw bytes
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note, velocity],
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => [0x80 | (channel & 0x0F), note, velocity],
            Self::ControlChange { channel, cc, value } => [0xB0 | (channel & 0x0F), cc, value],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let event = MidiEvent::parse(&[0x92, 40, 100]).unwrap();
        assert_eq!(
            event,
            MidiEvent::NoteOn {
                channel: 2,
                note: 40,
                velocity: 100
            }
        );
        assert_eq!(event.pad(), PadId::new(2, 4));
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        assert!(matches!(
            MidiEvent::parse(&[0x90, 36, 0]),
            Some(MidiEvent::NoteOff { velocity: 0, .. })
        ));
    }

    #[test]
    fn test_ignored_messages() {
        assert_eq!(MidiEvent::parse(&[]), None);
        assert_eq!(MidiEvent::parse(&[0x90, 36]), None);
        assert_eq!(MidiEvent::parse(&[0xE0, 0, 64]), None);
        assert_eq!(MidiEvent::parse(&[0xF0, 1, 2, 0xF7]), None);
    }

    #[test]
    fn test_out_of_range_pads() {
        // Channel 4 and above never trigger pads
        assert_eq!(MidiEvent::parse(&[0x94, 40, 100]).unwrap().pad(), None);
        // Below the base note
        assert_eq!(MidiEvent::parse(&[0x90, 20, 100]).unwrap().pad(), None);
        assert_eq!(MidiEvent::parse(&[0xB0, 1, 2]).unwrap().pad(), None);
    }

    #[test]
    fn test_to_bytes() {
        let event = MidiEvent::NoteOff {
            channel: 1,
            note: 50,
            velocity: 0,
        };
        assert_eq!(event.to_bytes(), [0x81, 50, 0]);
        assert_eq!(MidiEvent::parse(&event.to_bytes()), Some(event));
    }
}
