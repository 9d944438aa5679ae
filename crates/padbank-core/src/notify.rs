//! Outbound notifications (engine -> UI)
//!
//! A [`Notifier`] wraps the cycle's output sequence. Every notification is
//! either written whole or dropped and counted; frame offsets are forced to
//! be non-decreasing within the cycle.

use crate::atom::sequence::SequenceWriter;
use crate::atom::ValueRef;
use crate::engine::{Pad, Sampler, Trigger};
use crate::error::LoadErrorKind;
use crate::protocol::{self, JobId};
use crate::types::{PadId, NUM_PADS};
use crate::urid::{Urid, Uris};

pub struct Notifier<'a> {
    writer: Option<SequenceWriter<'a>>,
    uris: Uris,
    last_frame: i64,
    dropped: u64,
}

impl<'a> Notifier<'a> {
    /// Start an empty output sequence in `buf`
    ///
    /// A buffer too small even for the sequence header drops everything.
    pub fn new(buf: &'a mut [u8], uris: &Uris) -> Self {
        let writer = match SequenceWriter::new(buf, &uris.atom, uris.frame_unit) {
            Ok(writer) => Some(writer),
            Err(e) => {
                log::debug!("Output sequence unusable: {}", e);
                None
            }
        };
        Self {
            writer,
            uris: *uris,
            last_frame: 0,
            dropped: 0,
        }
    }

    /// Append one message; returns false (and counts a drop) if it didn't fit
    pub fn notify(&mut self, frame: i64, otype: Urid, properties: &[(Urid, ValueRef<'_>)]) -> bool {
        let frame = frame.max(self.last_frame);
        let Some(writer) = self.writer.as_mut() else {
            self.dropped += 1;
            return false;
        };
        match writer.push_object(frame, otype, properties) {
            Ok(()) => {
                self.last_frame = frame;
                true
            }
            Err(e) => {
                self.dropped += 1;
                log::trace!("Dropping notification: {}", e);
                false
            }
        }
    }

    pub fn pad_played(&mut self, frame: i64, trigger: &Trigger) -> bool {
        let props = protocol::pad_played(&self.uris.key, trigger.pad, trigger.layer, trigger.velocity);
        self.notify(frame, self.uris.object.pad_play, &props)
    }

    pub fn pad_stopped(&mut self, frame: i64, pad: PadId) -> bool {
        let props = protocol::pad_stopped(&self.uris.key, pad);
        self.notify(frame, self.uris.object.pad_stop, &props)
    }

    pub fn sample_loaded(&mut self, frame: i64, pad: PadId, layer: usize, job_id: JobId, name: &str) -> bool {
        let props = protocol::sample_loaded(&self.uris.key, pad, layer, job_id, name);
        self.notify(frame, self.uris.object.sample_loaded, &props)
    }

    pub fn sample_waveform(&mut self, frame: i64, pad: PadId, peaks: &[f32]) -> bool {
        let props = protocol::sample_waveform(&self.uris.key, pad, peaks);
        self.notify(frame, self.uris.object.sample_waveform, &props)
    }

    pub fn load_failed(&mut self, frame: i64, pad: PadId, job_id: JobId, error: LoadErrorKind) -> bool {
        let props = protocol::load_failed(&self.uris.key, pad, job_id, error);
        self.notify(frame, self.uris.object.load_failed, &props)
    }

    pub fn pad_state(&mut self, frame: i64, pad: &Pad) -> bool {
        let props = protocol::pad_state(&self.uris.key, pad);
        self.notify(frame, self.uris.object.pad_state, &props)
    }

    /// Bytes still free in the output sequence
    pub fn remaining(&self) -> usize {
        self.writer.as_ref().map(|w| w.remaining()).unwrap_or(0)
    }

    /// Notifications dropped so far this cycle
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Messages written this cycle
    pub fn written(&self) -> usize {
        self.writer.as_ref().map(|w| w.event_count()).unwrap_or(0)
    }
}

/// Walks all pads emitting `PadState`, a few per cycle
///
/// Started by a `StateRequest`; a pad whose message didn't fit is retried
/// next cycle.
#[derive(Debug, Default)]
pub struct StateRefresh {
    next: Option<usize>,
}

impl StateRefresh {
    /// Restart from the first pad
    pub fn start(&mut self) {
        self.next = Some(0);
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Emit up to `per_cycle` pad states at `frame`
    pub fn emit(&mut self, notifier: &mut Notifier<'_>, sampler: &Sampler, per_cycle: usize, frame: i64) {
        for _ in 0..per_cycle {
            let Some(index) = self.next else {
                return;
            };
            let Some(pad) = PadId::from_index(index) else {
                self.next = None;
                return;
            };
            if !notifier.pad_state(frame, sampler.pad(pad)) {
                return;
            }
            self.next = (index + 1 < NUM_PADS).then_some(index + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::sequence::{SequenceRef, MIN_SEQUENCE_SIZE};
    use crate::atom::encoded_size;
    use crate::config::EngineConfig;
    use crate::protocol::Outbound;
    use crate::urid::UridRegistry;

    fn uris() -> Uris {
        Uris::map(&UridRegistry::new())
    }

    fn trigger() -> Trigger {
        Trigger {
            pad: PadId::new(0, 4).unwrap(),
            layer: 0,
            velocity: 100,
        }
    }

    fn read_back(uris: &Uris, bytes: &[u8]) -> Vec<(i64, Outbound)> {
        let seq = SequenceRef::parse(&uris.atom, bytes).unwrap();
        seq.iter()
            .map(|event| {
                let object = event.as_object(&uris.atom).unwrap();
                (event.frames, Outbound::parse(uris, &object).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_pad_play_echo() {
        let uris = uris();
        let mut buf = vec![0u8; 256];
        let mut notifier = Notifier::new(&mut buf, &uris);
        assert!(notifier.pad_played(17, &trigger()));
        assert_eq!(notifier.written(), 1);
        drop(notifier);

        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize + 8;
        assert_eq!(
            read_back(&uris, &buf[..size]),
            vec![(
                17,
                Outbound::PadPlayed {
                    pad: PadId::new(0, 4).unwrap(),
                    layer: 0,
                    velocity: 100
                }
            )]
        );
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let uris = uris();
        let one = 8 + encoded_size(&protocol::pad_played(&uris.key, trigger().pad, 0, 100));
        let mut buf = vec![0u8; MIN_SEQUENCE_SIZE + 2 * one + 8];
        let mut notifier = Notifier::new(&mut buf, &uris);

        let accepted = (0..5).filter(|&i| notifier.pad_played(i, &trigger())).count();
        assert_eq!(accepted, 2);
        assert_eq!(notifier.dropped(), 3);
        drop(notifier);

        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize + 8;
        let messages = read_back(&uris, &buf[..size]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].0, 1);
    }

    #[test]
    fn test_frames_never_go_backwards() {
        let uris = uris();
        let mut buf = vec![0u8; 512];
        let mut notifier = Notifier::new(&mut buf, &uris);
        notifier.pad_played(40, &trigger());
        notifier.pad_stopped(10, trigger().pad);
        drop(notifier);

        let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize + 8;
        let frames: Vec<i64> = read_back(&uris, &buf[..size]).into_iter().map(|(f, _)| f).collect();
        assert_eq!(frames, vec![40, 40]);
    }

    #[test]
    fn test_tiny_buffer_drops_everything() {
        let uris = uris();
        let mut buf = [0u8; 4];
        let mut notifier = Notifier::new(&mut buf, &uris);
        assert!(!notifier.pad_played(0, &trigger()));
        assert_eq!(notifier.dropped(), 1);
    }

    #[test]
    fn test_state_refresh_covers_every_pad_across_cycles() {
        let uris = uris();
        let sampler = Sampler::new(48000.0, &EngineConfig::default());
        let mut refresh = StateRefresh::default();
        refresh.start();

        let mut seen = Vec::new();
        let mut cycles = 0;
        while refresh.is_running() && cycles < 100 {
            let mut buf = vec![0u8; 4096];
            let mut notifier = Notifier::new(&mut buf, &uris);
            refresh.emit(&mut notifier, &sampler, 4, 0);
            drop(notifier);

            let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize + 8;
            for (_, message) in read_back(&uris, &buf[..size]) {
                match message {
                    Outbound::PadState { pad, .. } => seen.push(pad.index()),
                    other => panic!("unexpected {:?}", other),
                }
            }
            cycles += 1;
        }

        assert_eq!(cycles, NUM_PADS / 4);
        assert_eq!(seen, (0..NUM_PADS).collect::<Vec<_>>());
    }
}
