//! Common types for Padbank
//!
//! Fundamental constants and value types shared by the engine, the message
//! protocol and the worker: pad addressing and stereo audio.

/// Number of pad banks (A-D)
pub const NUM_BANKS: usize = 4;

/// Number of pads in one bank
pub const PADS_PER_BANK: usize = 16;

/// Total pad slots, created once at instantiate and never destroyed
pub const NUM_PADS: usize = NUM_BANKS * PADS_PER_BANK;

/// Maximum velocity layers per pad
pub const MAX_LAYERS: usize = 4;

/// MIDI note that maps to pad 0 of a bank
pub const BASE_NOTE: u8 = 36;

/// Audio sample type (32-bit float throughout)
pub type Sample = f32;

/// Address of one pad slot
///
/// The MIDI channel selects the bank, the note (minus [`BASE_NOTE`]) selects
/// the pad within the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId {
    bank: u8,
    pad: u8,
}

impl PadId {
    /// Create a pad id, or `None` if bank or pad is out of range
    pub fn new(bank: usize, pad: usize) -> Option<Self> {
        if bank < NUM_BANKS && pad < PADS_PER_BANK {
            Some(Self {
                bank: bank as u8,
                pad: pad as u8,
            })
        } else {
            None
        }
    }

    /// Convert a wire (bank, pad) pair, rejecting negatives and out-of-range values
    pub fn from_wire(bank: i32, pad: i32) -> Option<Self> {
        if bank < 0 || pad < 0 {
            return None;
        }
        Self::new(bank as usize, pad as usize)
    }

    /// Resolve a MIDI (channel, note) pair to a pad
    ///
    /// Only channels 0-3 trigger pads; notes outside `BASE_NOTE..BASE_NOTE+16`
    /// are rejected.
    pub fn from_midi(channel: u8, note: u8) -> Option<Self> {
        let pad = note.checked_sub(BASE_NOTE)?;
        Self::new(channel as usize, pad as usize)
    }

    /// Inverse of [`PadId::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        if index < NUM_PADS {
            Self::new(index / PADS_PER_BANK, index % PADS_PER_BANK)
        } else {
            None
        }
    }

    /// Bank number (0-3)
    #[inline]
    pub fn bank(&self) -> usize {
        self.bank as usize
    }

    /// Pad number within the bank (0-15)
    #[inline]
    pub fn pad(&self) -> usize {
        self.pad as usize
    }

    /// Flat slot index (0-63)
    #[inline]
    pub fn index(&self) -> usize {
        self.bank as usize * PADS_PER_BANK + self.pad as usize
    }

    /// MIDI note that triggers this pad
    pub fn note(&self) -> u8 {
        BASE_NOTE + self.pad
    }
}

/// Bank letter and 1-based pad number, e.g. "B7". Writes without allocating.
impl std::fmt::Display for PadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", (b'A' + self.bank) as char, self.pad + 1)
    }
}

/// A single stereo sample (left and right channels)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Linear interpolation towards `other` by `t` in [0, 1]
    #[inline]
    pub fn lerp(&self, other: &Self, t: Sample) -> Self {
        Self {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

/// Owned stereo audio, frame by frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create an empty buffer with room for `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Build from interleaved `[L, R, L, R, ...]`; a trailing odd sample is dropped
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        Self {
            samples: interleaved
                .chunks_exact(2)
                .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
                .collect(),
        }
    }

    #[inline]
    pub fn push(&mut self, sample: StereoSample) {
        self.samples.push(sample);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<StereoSample> {
        self.samples.get(index).copied()
    }

    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_from_midi() {
        let pad = PadId::from_midi(0, 40).unwrap();
        assert_eq!(pad.bank(), 0);
        assert_eq!(pad.pad(), 4);

        let pad = PadId::from_midi(3, 51).unwrap();
        assert_eq!(pad.bank(), 3);
        assert_eq!(pad.pad(), 15);

        // Below base note, above last pad, channel out of range
        assert!(PadId::from_midi(0, 35).is_none());
        assert!(PadId::from_midi(0, 52).is_none());
        assert!(PadId::from_midi(4, 40).is_none());
    }

    #[test]
    fn test_pad_index_roundtrip() {
        for index in 0..NUM_PADS {
            let pad = PadId::from_index(index).unwrap();
            assert_eq!(pad.index(), index);
        }
        assert!(PadId::from_index(NUM_PADS).is_none());
    }

    #[test]
    fn test_pad_from_wire_rejects_negative() {
        assert!(PadId::from_wire(-1, 0).is_none());
        assert!(PadId::from_wire(0, -3).is_none());
        assert_eq!(PadId::from_wire(1, 2), PadId::new(1, 2));
    }

    #[test]
    fn test_pad_display() {
        assert_eq!(PadId::new(1, 6).unwrap().to_string(), "B7");
        assert_eq!(format!("{}", PadId::new(3, 15).unwrap()), "D16");
        assert_eq!(PadId::new(0, 4).unwrap().note(), 40);
    }

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let mid = a.lerp(&StereoSample::new(3.0, 4.0), 0.5);
        assert_eq!(mid, StereoSample::new(2.0, 3.0));
        assert_eq!(StereoSample::new(-0.75, 0.5).peak(), 0.75);
    }

    #[test]
    fn test_stereo_buffer_from_interleaved() {
        let buffer = StereoBuffer::from_interleaved(&[0.1, 0.2, -0.9, 0.4, 0.5]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.get(1), Some(StereoSample::new(-0.9, 0.4)));
        assert_eq!(buffer.get(2), None);
    }
}
