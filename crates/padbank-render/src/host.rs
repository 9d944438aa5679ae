//! Offline host: drives a [`PadBank`] cycle by cycle like a plugin host

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};

use padbank_core::atom::{SequenceRef, SequenceWriter};
use padbank_core::config::EngineConfig;
use padbank_core::protocol::{self, Outbound};
use padbank_core::remote::RemoteMirror;
use padbank_core::urid::{UridRegistry, Uris};
use padbank_core::{Controls, Cycle, EngineCounters, HostFeatures, PadBank, Plugin, Port};

use crate::kit::KitConfig;
use crate::song::SongEvent;

/// Input/output sequence buffer size per cycle
const SEQUENCE_CAPACITY: usize = 16 * 1024;

/// Give up waiting for sample loads after this long
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OfflineHost {
    bank: PadBank,
    uris: Uris,
    controls: Controls,
    block: usize,
    input: Vec<u8>,
    output: Vec<u8>,
    left: Vec<f32>,
    right: Vec<f32>,
    mirror: RemoteMirror,
    queue_capacity: usize,
}

impl OfflineHost {
    pub fn new(sample_rate: u32, block: usize, config: EngineConfig) -> Result<Self> {
        if block == 0 {
            bail!("Block size must be at least one frame");
        }
        let queue_capacity = config.work_queue_capacity.max(1);
        let registry = Arc::new(UridRegistry::new());
        let mut bank = PadBank::instantiate(
            sample_rate as f64,
            HostFeatures::with_registry(registry),
            config,
        )
        .map_err(|e| anyhow!("Failed to instantiate engine: {}", e))?;
        bank.activate();

        let uris = *bank.uris();
        Ok(Self {
            bank,
            uris,
            controls: Controls::default(),
            block,
            input: vec![0u8; SEQUENCE_CAPACITY],
            output: vec![0u8; SEQUENCE_CAPACITY],
            left: vec![0.0; block],
            right: vec![0.0; block],
            mirror: RemoteMirror::new(uris),
            queue_capacity,
        })
    }

    pub fn mirror(&self) -> &RemoteMirror {
        &self.mirror
    }

    /// Run one cycle of `frames`; outbound messages go to the mirror too
    fn cycle(&mut self, frames: usize, fill: impl FnOnce(&mut SequenceWriter<'_>, &Uris)) -> Vec<Outbound> {
        let uris = self.uris;
        let len = match SequenceWriter::new(&mut self.input, &uris.atom, uris.frame_unit) {
            Ok(mut writer) => {
                fill(&mut writer, &uris);
                writer.bytes().len()
            }
            Err(_) => 0,
        };

        let mut cycle = Cycle {
            frames,
            events_in: &self.input[..len],
            events_out: &mut self.output,
            out_left: &mut self.left[..frames],
            out_right: &mut self.right[..frames],
            controls: self.controls,
        };
        self.bank.run(&mut cycle);

        let Ok(sequence) = SequenceRef::parse(&uris.atom, &self.output) else {
            return Vec::new();
        };
        let mut messages = Vec::new();
        for event in sequence.iter() {
            let Ok(object) = event.as_object(&uris.atom) else {
                continue;
            };
            match Outbound::parse(&uris, &object) {
                Ok(message) => {
                    self.mirror.apply(message.clone());
                    messages.push(message);
                }
                Err(e) => log::debug!(
                    "Unparsed engine message {}: {}",
                    self.bank.uri(object.otype()).unwrap_or_default(),
                    e
                ),
            }
        }
        messages
    }

    /// Send the kit's loads and parameters; returns once every load answered
    pub fn load_kit(&mut self, kit: &KitConfig) -> Result<()> {
        kit.validate()?;
        self.controls.set(Port::MasterVolume, kit.master_volume);
        self.controls.set(Port::MasterPitch, kit.master_pitch);

        let uris = self.uris;
        let mut loads: VecDeque<Vec<u8>> = VecDeque::new();
        let mut params: VecDeque<Vec<u8>> = VecDeque::new();
        for entry in &kit.pads {
            let Some(pad) = entry.id() else {
                continue;
            };
            let path = entry.sample.to_string_lossy();
            loads.push_back(protocol::set_sample(&uris, pad, entry.layer, &path).encode(&uris.atom));
            for (property, value) in entry.params() {
                let message = protocol::pad_param_request(&uris, pad, entry.layer, property, value);
                params.push_back(message.encode(&uris.atom));
            }
        }

        let expected = loads.len();
        let mut sent = 0usize;
        let mut answered = 0usize;
        let deadline = Instant::now() + LOAD_TIMEOUT;

        while answered < expected || !params.is_empty() {
            if Instant::now() > deadline {
                bail!("Timed out waiting for {} sample loads", expected - answered);
            }

            let in_flight = sent - answered;
            let budget = self.queue_capacity.saturating_sub(in_flight);
            let mut pushed = 0usize;
            let mut pushed_params = 0usize;
            let block = self.block;
            let messages = self.cycle(block, |writer, _| {
                for atom in loads.iter().take(budget) {
                    if writer.push_atom(0, atom).is_err() {
                        break;
                    }
                    pushed += 1;
                }
                for atom in params.iter() {
                    if writer.push_atom(0, atom).is_err() {
                        break;
                    }
                    pushed_params += 1;
                }
            });
            loads.drain(..pushed);
            params.drain(..pushed_params);
            sent += pushed;

            answered += messages
                .iter()
                .filter(|m| matches!(m, Outbound::SampleLoaded { .. } | Outbound::LoadFailed { .. }))
                .count();

            if answered < expected && pushed == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        let failed = self.mirror.failures().len();
        log::info!(
            "Kit loaded: {} samples, {} failed",
            expected - failed.min(expected),
            failed
        );
        Ok(())
    }

    /// Render the song plus `tail` frames, handing each block to `sink`
    pub fn render_song(
        &mut self,
        events: &[SongEvent],
        tail: u64,
        mut sink: impl FnMut(&[f32], &[f32]) -> Result<()>,
    ) -> Result<u64> {
        let total = events.last().map(|e| e.frame + 1).unwrap_or(0) + tail;
        let mut next = 0usize;
        let mut start = 0u64;

        while start < total {
            let frames = (self.block as u64).min(total - start) as usize;
            let end = start + frames as u64;
            let first = next;
            while next < events.len() && events[next].frame < end {
                next += 1;
            }
            let block_events = &events[first..next];

            self.cycle(frames, |writer, uris| {
                for event in block_events {
                    let offset = (event.frame - start) as i64;
                    if writer.push_raw(offset, uris.midi_event, &event.bytes).is_err() {
                        log::warn!("Input sequence full, dropping MIDI event at frame {}", event.frame);
                    }
                }
            });
            sink(&self.left[..frames], &self.right[..frames])?;
            start = end;
        }
        Ok(total)
    }

    /// Shut the engine down, returning its counters
    pub fn finish(mut self) -> EngineCounters {
        let counters = self.bank.counters();
        self.bank.deactivate();
        self.bank.cleanup();
        counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::KitPad;
    use padbank_core::types::PadId;
    use std::path::Path;

    fn write_fixture(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..2400 {
            writer.write_sample(8000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn kit_pad(bank: usize, pad: usize, sample: &Path) -> KitPad {
        KitPad {
            bank,
            pad,
            layer: 0,
            sample: sample.to_path_buf(),
            gain: Some(0.5),
            pan: None,
            pitch: None,
            start_point: None,
            mute_group: None,
            one_shot: None,
            release: None,
        }
    }

    #[test]
    fn test_kit_loads_and_song_renders() {
        let dir = tempfile::tempdir().unwrap();
        let kick = dir.path().join("kick.wav");
        write_fixture(&kick);

        let kit = KitConfig {
            pads: vec![
                kit_pad(0, 0, &kick),
                kit_pad(0, 1, &dir.path().join("missing.wav")),
            ],
            ..KitConfig::default()
        };

        let mut host = OfflineHost::new(48000, 128, EngineConfig::default()).unwrap();
        host.load_kit(&kit).unwrap();

        let kick_pad = PadId::new(0, 0).unwrap();
        assert_eq!(host.mirror().pad(kick_pad).samples[0], "kick.wav");
        assert_eq!(host.mirror().failures().len(), 1);
        assert_eq!(host.mirror().pad(kick_pad).state.as_ref().map(|s| s.gain), Some(0.5));

        let song = vec![SongEvent {
            frame: 300,
            bytes: [0x90, 36, 127],
        }];
        let mut left = Vec::new();
        let total = host
            .render_song(&song, 1000, |l, _| {
                left.extend_from_slice(l);
                Ok(())
            })
            .unwrap();

        assert_eq!(total, 1301);
        assert_eq!(left.len(), 1301);
        assert!(left[..300].iter().all(|&s| s == 0.0));
        assert!(left[300] > 0.0);
        assert_eq!(host.mirror().last_played(), Some(kick_pad));

        let counters = host.finish();
        assert_eq!(counters.dropped_notifications, 0);
    }

    #[test]
    fn test_duplicate_kit_entries_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_fixture(&a);
        write_fixture(&b);
        let kit = KitConfig {
            pads: vec![kit_pad(0, 0, &a), kit_pad(0, 0, &b)],
            ..KitConfig::default()
        };

        let mut host = OfflineHost::new(48000, 128, EngineConfig::default()).unwrap();
        let started = Instant::now();
        assert!(host.load_kit(&kit).is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
