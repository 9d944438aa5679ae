//! Voice state machine
//!
//! ```text
//! Idle -> Triggered -> Playing -> Releasing -> Idle
//! ```
//!
//! A voice copies everything it needs from the pad at trigger time, so later
//! parameter changes never affect a note already sounding.

use basedrop::Shared;

use super::envelope::Envelope;
use super::pad::{Pad, SampleData};
use crate::types::{PadId, Sample};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VoiceState {
    #[default]
    Idle,
    /// Started this cycle; becomes `Playing` when first rendered
    Triggered,
    Playing,
    Releasing,
}

/// One playback instance of a pad's sample
#[derive(Default)]
pub struct Voice {
    state: VoiceState,
    pad: Option<PadId>,
    layer: usize,
    velocity: u8,
    sample: Option<Shared<SampleData>>,
    cursor: f64,
    /// Frames advanced per output frame before the master pitch ratio
    increment: f64,
    gain_left: Sample,
    gain_right: Sample,
    envelope: Envelope,
    one_shot: bool,
    /// Trigger order, lower is older
    age: u64,
}

impl Voice {
    /// Bind this voice to `pad` and start it
    ///
    /// Does nothing (stays idle) if the layer has no sample.
    pub fn trigger(&mut self, pad: &Pad, layer: usize, velocity: u8, age: u64, engine_rate: f32) {
        let Some(params) = pad.layers.get(layer) else {
            return;
        };
        let Some(sample) = params.sample.clone() else {
            return;
        };

        let level = params.gain * (velocity.min(127) as Sample / 127.0);
        let pan = params.pan.clamp(-1.0, 1.0);
        self.gain_left = level * (1.0 - pan).min(1.0);
        self.gain_right = level * (1.0 + pan).min(1.0);

        self.cursor = (params.start_point.clamp(0.0, 1.0) as f64 * sample.len() as f64).floor();
        self.increment = params.pitch as f64 * sample.sample_rate as f64 / engine_rate as f64;
        self.envelope.trigger(&pad.adsr, engine_rate);

        self.sample = Some(sample);
        self.pad = Some(pad.id());
        self.layer = layer;
        self.velocity = velocity;
        self.one_shot = pad.one_shot;
        self.age = age;
        self.state = VoiceState::Triggered;
    }

    /// Enter the release phase (note-off or choke)
    pub fn release(&mut self) {
        if matches!(self.state, VoiceState::Triggered | VoiceState::Playing) {
            self.envelope.release();
            self.state = if self.envelope.is_idle() {
                self.stop_state()
            } else {
                VoiceState::Releasing
            };
        }
    }

    /// Silence immediately
    pub fn kill(&mut self) {
        self.state = VoiceState::Idle;
        self.pad = None;
        // Dropping the last reference on the audio thread defers the free
        self.sample = None;
    }

    fn stop_state(&mut self) -> VoiceState {
        self.pad = None;
        self.sample = None;
        VoiceState::Idle
    }

    /// Mix this voice into `left`/`right`
    ///
    /// Both slices cover the same frame range. Stops the voice when the
    /// envelope finishes or the cursor runs past the end of the sample.
    pub fn render(&mut self, left: &mut [Sample], right: &mut [Sample], pitch_ratio: f64) {
        if self.state == VoiceState::Triggered {
            self.state = VoiceState::Playing;
        }
        if !self.is_active() {
            return;
        }
        let Some(sample) = self.sample.as_ref() else {
            self.state = VoiceState::Idle;
            return;
        };

        let step = self.increment * pitch_ratio;
        let mut finished = false;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let Some(frame) = sample.read(self.cursor) else {
                finished = true;
                break;
            };
            let env = self.envelope.next_level();
            *l += frame.left * self.gain_left * env;
            *r += frame.right * self.gain_right * env;
            self.cursor += step;

            if self.envelope.is_idle() {
                finished = true;
                break;
            }
        }

        if finished {
            self.state = self.stop_state();
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// True while the voice produces sound
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            VoiceState::Triggered | VoiceState::Playing | VoiceState::Releasing
        )
    }

    pub fn pad(&self) -> Option<PadId> {
        self.pad
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}
