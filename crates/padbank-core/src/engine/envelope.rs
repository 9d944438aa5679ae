//! Linear ADSR envelope

/// Envelope settings in seconds (sustain is a level in 0..1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Adsr {
    /// Instant attack, full sustain, the given release time
    pub fn with_release(release: f32) -> Self {
        Self {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release,
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::with_release(0.05)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-voice envelope generator, advanced one frame at a time
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    stage: Stage,
    level: f32,
    attack_step: f32,
    decay_step: f32,
    sustain: f32,
    release_frames: f32,
    release_step: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            level: 0.0,
            attack_step: 1.0,
            decay_step: f32::INFINITY,
            sustain: 1.0,
            release_frames: 0.0,
            release_step: f32::INFINITY,
        }
    }
}

#[inline]
fn frames(secs: f32, sample_rate: f32) -> f32 {
    (secs.max(0.0) * sample_rate).round()
}

impl Envelope {
    /// Start from zero with the given settings
    pub fn trigger(&mut self, adsr: &Adsr, sample_rate: f32) {
        let attack = frames(adsr.attack, sample_rate);
        let decay = frames(adsr.decay, sample_rate);

        self.sustain = adsr.sustain.clamp(0.0, 1.0);
        self.attack_step = if attack > 0.0 { 1.0 / attack } else { 1.0 };
        self.decay_step = if decay > 0.0 {
            (1.0 - self.sustain) / decay
        } else {
            f32::INFINITY
        };
        self.release_frames = frames(adsr.release, sample_rate);
        self.level = 0.0;
        self.stage = Stage::Attack;
    }

    /// Enter the release stage from the current level
    pub fn release(&mut self) {
        if self.stage == Stage::Idle || self.stage == Stage::Release {
            return;
        }
        if self.release_frames > 0.0 && self.level > 0.0 {
            self.release_step = self.level / self.release_frames;
            self.stage = Stage::Release;
        } else {
            self.level = 0.0;
            self.stage = Stage::Idle;
        }
    }

    /// Advance one frame and return the new level
    #[inline]
    pub fn next_level(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {}
            Stage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }
}
