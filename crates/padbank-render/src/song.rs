//! Standard MIDI file -> frame-stamped raw MIDI events

use anyhow::{Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

/// Tempo assumed until the first tempo event (120 BPM)
const DEFAULT_TEMPO_US: u32 = 500_000;

/// One channel message at an absolute frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SongEvent {
    pub frame: u64,
    pub bytes: [u8; 3],
}

/// Flatten every track of a MIDI file into note/CC events sorted by frame
pub fn load_song(data: &[u8], sample_rate: u32) -> Result<Vec<SongEvent>> {
    let smf = Smf::parse(data).context("Failed to parse MIDI file")?;

    // Merge all tracks on absolute ticks; tempo applies across tracks
    let mut timeline: Vec<(u64, usize, TrackEventKind<'_>)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            timeline.push((tick, timeline.len(), event.kind));
        }
    }
    timeline.sort_by_key(|(tick, order, _)| (*tick, *order));

    let rate = sample_rate as f64;
    let mut events = Vec::new();
    let mut tempo_us = DEFAULT_TEMPO_US;
    let mut last_tick = 0u64;
    let mut seconds = 0.0f64;

    for (tick, _, kind) in timeline {
        seconds += tick_seconds(smf.header.timing, tempo_us) * (tick - last_tick) as f64;
        last_tick = tick;

        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => tempo_us = tempo.as_int(),
            TrackEventKind::Midi { channel, message } => {
                let status = channel.as_int() & 0x0F;
                let bytes = match message {
                    MidiMessage::NoteOn { key, vel } => [0x90 | status, key.as_int(), vel.as_int()],
                    MidiMessage::NoteOff { key, vel } => [0x80 | status, key.as_int(), vel.as_int()],
                    MidiMessage::Controller { controller, value } => {
                        [0xB0 | status, controller.as_int(), value.as_int()]
                    }
                    _ => continue,
                };
                events.push(SongEvent {
                    frame: (seconds * rate).round() as u64,
                    bytes,
                });
            }
            _ => {}
        }
    }

    log::info!(
        "Song: {} events over {:.2}s",
        events.len(),
        seconds
    );
    Ok(events)
}

fn tick_seconds(timing: Timing, tempo_us: u32) -> f64 {
    match timing {
        Timing::Metrical(ticks_per_beat) => {
            tempo_us as f64 / 1_000_000.0 / ticks_per_beat.as_int().max(1) as f64
        }
        Timing::Timecode(fps, subframes) => 1.0 / (fps.as_f32() as f64 * subframes.max(1) as f64),
    }
}
