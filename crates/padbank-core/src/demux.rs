//! Event demultiplexer
//!
//! Walks one input sequence per cycle and splits it into raw MIDI and
//! protocol objects. Audio between events is rendered by the sink segment by
//! segment, so every event takes effect at its own frame offset.
//!
//! The demultiplexer only classifies. Whether a message is applied at once
//! or deferred to the worker is up to the [`EventSink`].

use crate::atom::SequenceRef;
use crate::midi::MidiEvent;
use crate::protocol::Inbound;
use crate::types::PadId;
use crate::urid::Uris;

/// Receiver of one cycle's classified events
pub trait EventSink {
    /// Produce audio for frames `start..end` of the cycle
    fn render(&mut self, start: usize, end: usize);

    fn note_on(&mut self, frame: i64, pad: PadId, velocity: u8);

    fn note_off(&mut self, frame: i64, pad: PadId);

    /// Control changes are accepted but currently unused
    fn control_change(&mut self, _frame: i64, _channel: u8, _cc: u8, _value: u8) {}

    /// A recognized protocol object; `body` is its encoded object body
    fn message(&mut self, frame: i64, message: Inbound<'_>, body: &[u8]);
}

/// Per-instance event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Events dispatched to the sink
    pub events: u64,
    /// Frame offsets out of order or out of range
    pub clamped: u64,
    /// Events dropped: malformed, unknown or out of range
    pub ignored: u64,
    /// Cycles whose input sequence ended in a partial event
    pub truncated: u64,
}

pub struct Demux {
    uris: Uris,
    stats: DemuxStats,
}

impl Demux {
    pub fn new(uris: Uris) -> Self {
        Self {
            uris,
            stats: DemuxStats::default(),
        }
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Dispatch one cycle of `frames` frames
    ///
    /// The sink sees its `render` calls cover `0..frames` exactly once, in
    /// order, interleaved with the events. A malformed input sequence still
    /// renders the full cycle.
    pub fn process<S: EventSink>(&mut self, input: &[u8], frames: usize, sink: &mut S) {
        let sequence = match SequenceRef::parse(&self.uris.atom, input) {
            Ok(sequence) => sequence,
            Err(e) => {
                log::debug!("Ignoring input sequence: {}", e);
                sink.render(0, frames);
                return;
            }
        };

        let mut cursor = 0usize;
        let mut events = sequence.iter();
        for event in events.by_ref() {
            let frame = self.clamp_frame(event.frames, cursor, frames);
            if frame > cursor {
                sink.render(cursor, frame);
                cursor = frame;
            }

            let offset = frame as i64;
            if event.type_urid == self.uris.midi_event {
                self.dispatch_midi(offset, event.body, sink);
            } else if event.type_urid == self.uris.atom.object {
                self.dispatch_object(offset, event.body, sink);
            } else {
                self.stats.ignored += 1;
                log::trace!("Skipping event of atom type #{}", event.type_urid);
            }
        }

        if events.is_truncated() {
            self.stats.truncated += 1;
            log::warn!("Input sequence ends in a truncated event");
        }

        if cursor < frames {
            sink.render(cursor, frames);
        }
    }

    /// Force an offset into `cursor..=frames`
    fn clamp_frame(&mut self, raw: i64, cursor: usize, frames: usize) -> usize {
        let frame = raw.clamp(cursor as i64, frames as i64) as usize;
        if frame as i64 != raw {
            self.stats.clamped += 1;
            log::warn!(
                "Event offset {} outside {}..={}, clamped to {}",
                raw,
                cursor,
                frames,
                frame
            );
        }
        frame
    }

    fn dispatch_midi<S: EventSink>(&mut self, frame: i64, data: &[u8], sink: &mut S) {
        let Some(event) = MidiEvent::parse(data) else {
            self.stats.ignored += 1;
            return;
        };

        match event {
            MidiEvent::ControlChange { channel, cc, value } => {
                self.stats.events += 1;
                sink.control_change(frame, channel, cc, value);
            }
            MidiEvent::NoteOn { velocity, .. } => match event.pad() {
                Some(pad) => {
                    self.stats.events += 1;
                    sink.note_on(frame, pad, velocity);
                }
                None => self.stats.ignored += 1,
            },
            MidiEvent::NoteOff { .. } => match event.pad() {
                Some(pad) => {
                    self.stats.events += 1;
                    sink.note_off(frame, pad);
                }
                None => self.stats.ignored += 1,
            },
        }
    }

    fn dispatch_object<S: EventSink>(&mut self, frame: i64, body: &[u8], sink: &mut S) {
        let object = match crate::atom::ObjectRef::from_body(&self.uris.atom, body) {
            Ok(object) => object,
            Err(e) => {
                self.stats.ignored += 1;
                log::debug!("Dropping malformed object: {}", e);
                return;
            }
        };

        match Inbound::parse(&self.uris, &object) {
            Ok(message) => {
                self.stats.events += 1;
                sink.message(frame, message, body);
            }
            Err(e) => {
                self.stats.ignored += 1;
                log::debug!("Dropping message of type #{}: {}", object.otype(), e);
            }
        }
    }
}
