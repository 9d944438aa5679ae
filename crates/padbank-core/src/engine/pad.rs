//! Pad slots, velocity layers and their parameters

use basedrop::Shared;

use super::envelope::Adsr;
use crate::types::{PadId, Sample, StereoBuffer, StereoSample, MAX_LAYERS};
use crate::urid::{Keys, Urid};

/// Decoded sample audio, shared between pads and voices
///
/// Lives in a `basedrop::Shared` so the last reference can be dropped on the
/// audio thread without freeing memory there.
#[derive(Debug)]
pub struct SampleData {
    /// Display name (file name without directory)
    pub name: String,
    pub buffer: StereoBuffer,
    /// Native rate of the decoded audio
    pub sample_rate: u32,
    /// Waveform overview, one peak per point
    pub peaks: Vec<f32>,
}

impl SampleData {
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Linearly interpolated read; `None` past the last frame
    #[inline]
    pub fn read(&self, position: f64) -> Option<StereoSample> {
        if position < 0.0 {
            return None;
        }
        let index = position as usize;
        let a = self.buffer.get(index)?;
        let frac = (position - index as f64) as Sample;
        match self.buffer.get(index + 1) {
            Some(b) if frac > 0.0 => Some(a.lerp(&b, frac)),
            _ => Some(a),
        }
    }
}

/// Every property a pad exposes over the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadProperty {
    Sample,
    Gain,
    Pan,
    Pitch,
    StartPoint,
    MuteGroup,
    OneShot,
    Attack,
    Decay,
    Sustain,
    Release,
}

impl PadProperty {
    pub const ALL: [PadProperty; 11] = [
        PadProperty::Sample,
        PadProperty::Gain,
        PadProperty::Pan,
        PadProperty::Pitch,
        PadProperty::StartPoint,
        PadProperty::MuteGroup,
        PadProperty::OneShot,
        PadProperty::Attack,
        PadProperty::Decay,
        PadProperty::Sustain,
        PadProperty::Release,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn urid(self, keys: &Keys) -> Urid {
        match self {
            PadProperty::Sample => keys.sample,
            PadProperty::Gain => keys.gain,
            PadProperty::Pan => keys.pan,
            PadProperty::Pitch => keys.pitch,
            PadProperty::StartPoint => keys.start_point,
            PadProperty::MuteGroup => keys.mute_group,
            PadProperty::OneShot => keys.one_shot,
            PadProperty::Attack => keys.attack,
            PadProperty::Decay => keys.decay,
            PadProperty::Sustain => keys.sustain,
            PadProperty::Release => keys.release,
        }
    }

    pub fn from_urid(keys: &Keys, urid: Urid) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.urid(keys) == urid)
    }

    pub fn name(self) -> &'static str {
        match self {
            PadProperty::Sample => "sample",
            PadProperty::Gain => "gain",
            PadProperty::Pan => "pan",
            PadProperty::Pitch => "pitch",
            PadProperty::StartPoint => "startPoint",
            PadProperty::MuteGroup => "muteGroup",
            PadProperty::OneShot => "oneShot",
            PadProperty::Attack => "attack",
            PadProperty::Decay => "decay",
            PadProperty::Sustain => "sustain",
            PadProperty::Release => "release",
        }
    }

    /// Stored per velocity layer rather than per pad
    pub fn is_layer_param(self) -> bool {
        matches!(
            self,
            PadProperty::Sample
                | PadProperty::Gain
                | PadProperty::Pan
                | PadProperty::Pitch
                | PadProperty::StartPoint
        )
    }

    /// Validate and clamp a float value for this property
    ///
    /// Returns `None` for non-finite input and for `Sample`, which is never a
    /// float.
    pub fn clamp(self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }
        let clamped = match self {
            PadProperty::Sample => return None,
            PadProperty::Gain => value.clamp(0.0, 4.0),
            PadProperty::Pan => value.clamp(-1.0, 1.0),
            PadProperty::Pitch => value.clamp(0.125, 8.0),
            PadProperty::StartPoint => value.clamp(0.0, 1.0),
            PadProperty::MuteGroup => value.round().clamp(0.0, 16.0),
            PadProperty::OneShot => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            PadProperty::Attack | PadProperty::Decay | PadProperty::Release => {
                value.clamp(0.0, 10.0)
            }
            PadProperty::Sustain => value.clamp(0.0, 1.0),
        };
        Some(clamped)
    }
}

/// One velocity layer of a pad
#[derive(Clone)]
pub struct Layer {
    pub sample: Option<Shared<SampleData>>,
    /// Linear gain
    pub gain: f32,
    /// -1 (left) .. 1 (right)
    pub pan: f32,
    /// Playback speed ratio
    pub pitch: f32,
    /// Fraction of the sample where playback starts
    pub start_point: f32,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            sample: None,
            gain: 1.0,
            pan: 0.0,
            pitch: 1.0,
            start_point: 0.0,
        }
    }
}

/// One of the 64 pad slots
#[derive(Clone)]
pub struct Pad {
    id: PadId,
    pub layers: [Layer; MAX_LAYERS],
    /// 0 = no group
    pub mute_group: u8,
    /// Note-off is ignored and the sample plays to its end
    pub one_shot: bool,
    pub adsr: Adsr,
}

impl Pad {
    pub fn new(id: PadId, one_shot: bool, release_secs: f32) -> Self {
        Self {
            id,
            layers: Default::default(),
            mute_group: 0,
            one_shot,
            adsr: Adsr::with_release(release_secs),
        }
    }

    pub fn id(&self) -> PadId {
        self.id
    }

    pub fn has_sample(&self) -> bool {
        self.layers.iter().any(|l| l.sample.is_some())
    }

    /// Name of the first loaded layer's sample, or "" if none
    pub fn sample_name(&self) -> &str {
        self.layers
            .iter()
            .find_map(|l| l.sample.as_ref())
            .map(|s| s.name.as_str())
            .unwrap_or("")
    }

    /// Pick the layer for a velocity
    ///
    /// The 1..=127 range is split evenly across the loaded layers in index
    /// order, so layer 0 (if loaded) takes the softest hits.
    pub fn layer_for_velocity(&self, velocity: u8) -> Option<usize> {
        let loaded = self.layers.iter().filter(|l| l.sample.is_some()).count();
        if loaded == 0 {
            return None;
        }
        let velocity = velocity.clamp(1, 127) as usize;
        let rank = ((velocity - 1) * loaded / 127).min(loaded - 1);
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.sample.is_some())
            .nth(rank)
            .map(|(i, _)| i)
    }

    /// Install (or clear) a layer's sample, returning the previous one
    pub fn set_sample(
        &mut self,
        layer: usize,
        sample: Option<Shared<SampleData>>,
    ) -> Option<Shared<SampleData>> {
        let slot = self.layers.get_mut(layer)?;
        std::mem::replace(&mut slot.sample, sample)
    }

    /// Apply an already-clamped float parameter. O(1), no allocation.
    ///
    /// Returns false for `Sample` or an out-of-range layer.
    pub fn set_param(&mut self, layer: usize, property: PadProperty, value: f32) -> bool {
        if property.is_layer_param() {
            let Some(l) = self.layers.get_mut(layer) else {
                return false;
            };
            match property {
                PadProperty::Gain => l.gain = value,
                PadProperty::Pan => l.pan = value,
                PadProperty::Pitch => l.pitch = value,
                PadProperty::StartPoint => l.start_point = value,
                _ => return false,
            }
            return true;
        }
        match property {
            PadProperty::MuteGroup => self.mute_group = value as u8,
            PadProperty::OneShot => self.one_shot = value >= 0.5,
            PadProperty::Attack => self.adsr.attack = value,
            PadProperty::Decay => self.adsr.decay = value,
            PadProperty::Sustain => self.adsr.sustain = value,
            PadProperty::Release => self.adsr.release = value,
            _ => return false,
        }
        true
    }

    /// Current value of a float parameter (layer params read from `layer`)
    pub fn param(&self, layer: usize, property: PadProperty) -> Option<f32> {
        let l = self.layers.get(layer)?;
        Some(match property {
            PadProperty::Sample => return None,
            PadProperty::Gain => l.gain,
            PadProperty::Pan => l.pan,
            PadProperty::Pitch => l.pitch,
            PadProperty::StartPoint => l.start_point,
            PadProperty::MuteGroup => self.mute_group as f32,
            PadProperty::OneShot => {
                if self.one_shot {
                    1.0
                } else {
                    0.0
                }
            }
            PadProperty::Attack => self.adsr.attack,
            PadProperty::Decay => self.adsr.decay,
            PadProperty::Sustain => self.adsr.sustain,
            PadProperty::Release => self.adsr.release,
        })
    }
}
