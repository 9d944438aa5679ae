//! UI-side mirror of engine state
//!
//! The UI owns no authoritative state. It folds the engine's outbound
//! messages into a [`RemoteMirror`] and renders from that. Messages may be
//! late or lost; a `StateRequest` brings the mirror back in sync.
//!
//! Runs outside the audio thread and allocates freely.

use crate::atom::SequenceRef;
use crate::error::{LoadErrorKind, ProtocolError};
use crate::protocol::{JobId, Outbound, PadSnapshot};
use crate::types::{PadId, MAX_LAYERS, NUM_PADS};
use crate::urid::Uris;

/// What the UI knows about one pad
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PadView {
    /// Sample name per layer ("" = empty)
    pub samples: [String; MAX_LAYERS],
    pub waveform: Vec<f32>,
    /// Last full state received, if any
    pub state: Option<PadSnapshot>,
    /// Between a play echo and a stop echo
    pub held: bool,
    pub last_velocity: u8,
    pub plays: u64,
}

impl PadView {
    pub fn has_sample(&self) -> bool {
        self.samples.iter().any(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadFailure {
    pub pad: PadId,
    pub job_id: JobId,
    pub error: Option<LoadErrorKind>,
}

pub struct RemoteMirror {
    uris: Uris,
    pads: Vec<PadView>,
    last_played: Option<PadId>,
    failures: Vec<LoadFailure>,
    rejected: u64,
}

impl RemoteMirror {
    pub fn new(uris: Uris) -> Self {
        Self {
            uris,
            pads: vec![PadView::default(); NUM_PADS],
            last_played: None,
            failures: Vec::new(),
            rejected: 0,
        }
    }

    /// Fold one message into the mirror
    pub fn apply(&mut self, message: Outbound) {
        match message {
            Outbound::PadPlayed { pad, velocity, .. } => {
                let view = &mut self.pads[pad.index()];
                view.held = true;
                view.last_velocity = velocity;
                view.plays += 1;
                self.last_played = Some(pad);
            }
            Outbound::PadStopped { pad } => {
                self.pads[pad.index()].held = false;
            }
            Outbound::SampleLoaded {
                pad, layer, name, ..
            } => {
                let view = &mut self.pads[pad.index()];
                if let Some(slot) = view.samples.get_mut(layer) {
                    *slot = name;
                }
                if !view.has_sample() {
                    view.waveform.clear();
                }
            }
            Outbound::SampleWaveform { pad, peaks } => {
                self.pads[pad.index()].waveform = peaks;
            }
            Outbound::LoadFailed { pad, job_id, error } => {
                log::warn!(
                    "Load for pad {} failed (job {}): {}",
                    pad,
                    job_id,
                    error.map(|e| e.name()).unwrap_or("unknown error")
                );
                self.failures.push(LoadFailure { pad, job_id, error });
            }
            Outbound::PadState { pad, state } => {
                let view = &mut self.pads[pad.index()];
                // PadState carries the first loaded layer's name only
                if !state.sample.is_empty() && !view.samples.contains(&state.sample) {
                    view.samples[0] = state.sample.clone();
                }
                view.state = Some(state);
            }
        }
    }

    /// Fold every message of an output sequence; returns how many applied
    ///
    /// Messages this side can't parse are counted and skipped.
    pub fn apply_sequence(&mut self, bytes: &[u8]) -> usize {
        let sequence = match SequenceRef::parse(&self.uris.atom, bytes) {
            Ok(sequence) => sequence,
            Err(e) => {
                log::debug!("Unreadable output sequence: {}", e);
                self.rejected += 1;
                return 0;
            }
        };

        let mut applied = 0;
        for event in sequence.iter() {
            let parsed = event
                .as_object(&self.uris.atom)
                .map_err(ProtocolError::from)
                .and_then(|object| Outbound::parse(&self.uris, &object));
            match parsed {
                Ok(message) => {
                    self.apply(message);
                    applied += 1;
                }
                Err(e) => {
                    self.rejected += 1;
                    log::debug!("Skipping engine message: {}", e);
                }
            }
        }
        applied
    }

    pub fn pad(&self, pad: PadId) -> &PadView {
        &self.pads[pad.index()]
    }

    pub fn last_played(&self) -> Option<PadId> {
        self.last_played
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Messages that couldn't be parsed
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Pads with at least one sample
    pub fn loaded_pads(&self) -> impl Iterator<Item = PadId> + '_ {
        self.pads
            .iter()
            .enumerate()
            .filter(|(_, view)| view.has_sample())
            .filter_map(|(index, _)| PadId::from_index(index))
    }
}
