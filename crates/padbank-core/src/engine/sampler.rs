//! Voice/pad engine
//!
//! Owns all 64 pads and a fixed pool of voices, both allocated once at
//! construction. Triggering, releasing and rendering never allocate.
//!
//! # Voice allocation
//!
//! 1. If the pad already has `voices_per_pad` sounding voices, its oldest
//!    `Playing` voice is reused (oldest of any state if none is playing).
//! 2. Otherwise a free voice is taken.
//! 3. If the pool is exhausted, the globally oldest `Releasing` voice is
//!    stolen, else the globally oldest voice.

use super::pad::Pad;
use super::voice::{Voice, VoiceState};
use crate::config::EngineConfig;
use crate::types::{PadId, Sample, NUM_PADS};

/// Result of an accepted note-on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub pad: PadId,
    pub layer: usize,
    pub velocity: u8,
}

pub struct Sampler {
    pads: Vec<Pad>,
    voices: Vec<Voice>,
    voices_per_pad: usize,
    sample_rate: f32,
    /// Trigger counter used to age voices
    clock: u64,
    master_pitch: f64,
    master_volume: Sample,
    last_played: Option<PadId>,
}

impl Sampler {
    pub fn new(sample_rate: f32, config: &EngineConfig) -> Self {
        let pads = (0..NUM_PADS)
            .filter_map(PadId::from_index)
            .map(|id| Pad::new(id, config.one_shot_by_default, config.default_release_secs))
            .collect();
        let voices = (0..config.max_voices.max(1)).map(|_| Voice::default()).collect();

        Self {
            pads,
            voices,
            voices_per_pad: config.voices_per_pad.max(1),
            sample_rate,
            clock: 0,
            master_pitch: 1.0,
            master_volume: 1.0,
            last_played: None,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn pad(&self, id: PadId) -> &Pad {
        &self.pads[id.index()]
    }

    pub fn pad_mut(&mut self, id: PadId) -> &mut Pad {
        &mut self.pads[id.index()]
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Number of voices currently producing sound
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Most recently triggered pad
    pub fn last_played(&self) -> Option<PadId> {
        self.last_played
    }

    /// Master pitch in semitones (-12..12), applied as a speed ratio to every voice
    pub fn set_master_pitch(&mut self, semitones: f32) {
        let semitones = if semitones.is_finite() {
            semitones.clamp(-12.0, 12.0)
        } else {
            0.0
        };
        self.master_pitch = 2f64.powf(semitones as f64 / 12.0);
    }

    pub fn master_pitch_ratio(&self) -> f64 {
        self.master_pitch
    }

    /// Master volume (0..1)
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Start a voice on `pad`
    ///
    /// Returns `None` if the pad has no loaded sample.
    pub fn note_on(&mut self, pad: PadId, velocity: u8) -> Option<Trigger> {
        let layer = self.pads[pad.index()].layer_for_velocity(velocity)?;

        let group = self.pads[pad.index()].mute_group;
        if group > 0 {
            self.choke_group(group, pad);
        }

        let slot = self.allocate(pad);
        self.clock += 1;
        self.voices[slot].trigger(
            &self.pads[pad.index()],
            layer,
            velocity,
            self.clock,
            self.sample_rate,
        );
        self.last_played = Some(pad);

        Some(Trigger {
            pad,
            layer,
            velocity,
        })
    }

    /// Release every sounding voice of `pad`
    ///
    /// Returns false without touching anything if the pad is one-shot.
    pub fn note_off(&mut self, pad: PadId) -> bool {
        if self.pads[pad.index()].one_shot {
            return false;
        }
        for voice in self.voices.iter_mut().filter(|v| v.pad() == Some(pad)) {
            voice.release();
        }
        true
    }

    /// Release every voice of `pad`, one-shot or not
    pub fn stop_pad(&mut self, pad: PadId) {
        for voice in self.voices.iter_mut().filter(|v| v.pad() == Some(pad)) {
            voice.release();
        }
    }

    /// Silence everything immediately
    pub fn kill_all(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
    }

    fn choke_group(&mut self, group: u8, except: PadId) {
        let pads = &self.pads;
        for voice in &mut self.voices {
            if let Some(id) = voice.pad() {
                if id != except && pads[id.index()].mute_group == group {
                    voice.release();
                }
            }
        }
    }

    fn oldest(&self, filter: impl Fn(&Voice) -> bool) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_active() && filter(v))
            .min_by_key(|(_, v)| v.age())
            .map(|(i, _)| i)
    }

    fn allocate(&mut self, pad: PadId) -> usize {
        let on_pad = self
            .voices
            .iter()
            .filter(|v| v.is_active() && v.pad() == Some(pad))
            .count();

        let slot = if on_pad >= self.voices_per_pad {
            self.oldest(|v| v.pad() == Some(pad) && v.state() == VoiceState::Playing)
                .or_else(|| self.oldest(|v| v.pad() == Some(pad)))
        } else {
            self.voices
                .iter()
                .position(|v| !v.is_active())
                .or_else(|| self.oldest(|v| v.state() == VoiceState::Releasing))
                .or_else(|| self.oldest(|_| true))
        };

        let slot = slot.unwrap_or(0);
        if self.voices[slot].is_active() {
            log::trace!(
                "Stealing voice {} from pad {:?} for pad {}",
                slot,
                self.voices[slot].pad(),
                pad
            );
            self.voices[slot].kill();
        }
        slot
    }

    /// Mix all sounding voices into the given output range
    ///
    /// `left` and `right` are the same frame range of the host's output;
    /// they are added to, so the caller clears them once per cycle.
    pub fn render(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.render(left, right, self.master_pitch);
        }
        if self.master_volume != 1.0 {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                *l *= self.master_volume;
                *r *= self.master_volume;
            }
        }
    }
}
