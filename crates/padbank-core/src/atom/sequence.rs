//! Time-stamped event sequences
//!
//! One sequence per direction per cycle. The writer works over a host-owned
//! byte buffer of fixed capacity and only commits an event (by bumping the
//! sequence header's size) once all of its bytes are in place, so a reader
//! always sees a parseable prefix no matter how many pushes were refused.
//!
//! ```text
//! sequence = unit:u32 pad:u32 event*
//! event    = frames:i64 atom                         (padded to 8)
//! ```

use super::object::{encode_object, encoded_size, ObjectRef};
use super::{pad_size, read_u32, write_u32, ValueRef, HEADER_SIZE};
use crate::error::CodecError;
use crate::urid::{AtomTypes, Urid};

/// Sequence body prefix (`unit:u32 pad:u32`)
const SEQUENCE_PREFIX: usize = 8;

/// Event prefix before the atom (`frames:i64`)
const EVENT_PREFIX: usize = 8;

/// Smallest buffer that can hold an empty sequence
pub const MIN_SEQUENCE_SIZE: usize = HEADER_SIZE + SEQUENCE_PREFIX;

/// One event in a sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRef<'a> {
    /// Frame offset within the cycle
    pub frames: i64,
    /// Atom type of the payload
    pub type_urid: Urid,
    /// Atom body (without header or padding)
    pub body: &'a [u8],
}

impl<'a> EventRef<'a> {
    /// View the payload as an object, if it is one
    pub fn as_object(&self, types: &AtomTypes) -> Result<ObjectRef<'a>, CodecError> {
        if self.type_urid != types.object {
            return Err(CodecError::NotAnObject {
                found: self.type_urid,
            });
        }
        ObjectRef::from_body(types, self.body)
    }
}

/// A view of an encoded sequence atom
#[derive(Debug, Clone, Copy)]
pub struct SequenceRef<'a> {
    unit: Urid,
    events: &'a [u8],
}

impl<'a> SequenceRef<'a> {
    /// View a sequence atom (header included)
    pub fn parse(types: &AtomTypes, bytes: &'a [u8]) -> Result<Self, CodecError> {
        let size = read_u32(bytes, 0)? as usize;
        let type_urid = read_u32(bytes, 4)?;
        if type_urid != types.sequence {
            return Err(CodecError::NotASequence { found: type_urid });
        }
        if size < SEQUENCE_PREFIX {
            return Err(CodecError::Malformed("sequence body shorter than its prefix"));
        }
        let end = HEADER_SIZE + size;
        if bytes.len() < end {
            return Err(CodecError::Truncated {
                needed: end,
                available: bytes.len(),
            });
        }
        Ok(Self {
            unit: read_u32(bytes, HEADER_SIZE)?,
            events: &bytes[MIN_SEQUENCE_SIZE..end],
        })
    }

    /// Time unit URID (0 if the writer didn't specify one)
    pub fn unit(&self) -> Urid {
        self.unit
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> SequenceIter<'a> {
        SequenceIter {
            bytes: self.events,
            offset: 0,
            truncated: false,
        }
    }
}

impl<'a> IntoIterator for SequenceRef<'a> {
    type Item = EventRef<'a>;
    type IntoIter = SequenceIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over events; stops at the first event that doesn't fit
pub struct SequenceIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    truncated: bool,
}

impl SequenceIter<'_> {
    /// True once iteration stopped on a malformed or truncated event
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for SequenceIter<'a> {
    type Item = EventRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.truncated || self.offset >= self.bytes.len() {
            return None;
        }

        let start = self.offset;
        let Some(frame_bytes) = self.bytes.get(start..start + EVENT_PREFIX) else {
            self.truncated = true;
            return None;
        };
        let mut raw = [0u8; 8];
        raw.copy_from_slice(frame_bytes);
        let frames = i64::from_le_bytes(raw);

        let atom_start = start + EVENT_PREFIX;
        let (Ok(size), Ok(type_urid)) = (
            read_u32(self.bytes, atom_start),
            read_u32(self.bytes, atom_start + 4),
        ) else {
            self.truncated = true;
            return None;
        };

        let body_start = atom_start + HEADER_SIZE;
        let Some(body) = self.bytes.get(body_start..body_start + size as usize) else {
            self.truncated = true;
            return None;
        };

        self.offset = start + pad_size(EVENT_PREFIX + HEADER_SIZE + size as usize);
        Some(EventRef {
            frames,
            type_urid,
            body,
        })
    }
}

/// Appends events to a fixed-capacity sequence buffer
///
/// Never allocates. A push that doesn't fit is refused with
/// [`CodecError::Capacity`] and leaves the buffer untouched.
pub struct SequenceWriter<'a> {
    buf: &'a mut [u8],
    types: AtomTypes,
    len: usize,
    events: usize,
}

impl<'a> SequenceWriter<'a> {
    /// Start an empty sequence in `buf`, whose length is the capacity
    pub fn new(buf: &'a mut [u8], types: &AtomTypes, unit: Urid) -> Result<Self, CodecError> {
        if buf.len() < MIN_SEQUENCE_SIZE {
            return Err(CodecError::Capacity {
                needed: MIN_SEQUENCE_SIZE,
                available: buf.len(),
            });
        }
        write_u32(buf, 0, SEQUENCE_PREFIX as u32);
        write_u32(buf, 4, types.sequence);
        write_u32(buf, 8, unit);
        write_u32(buf, 12, 0);
        Ok(Self {
            buf,
            types: *types,
            len: MIN_SEQUENCE_SIZE,
            events: 0,
        })
    }

    /// Bytes still available for events
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Number of events written
    pub fn event_count(&self) -> usize {
        self.events
    }

    /// The sequence written so far, header included
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Drop all events, keeping the header
    pub fn reset(&mut self) {
        self.len = MIN_SEQUENCE_SIZE;
        self.events = 0;
        write_u32(self.buf, 0, SEQUENCE_PREFIX as u32);
    }

    /// Bytes an event with a body of `body_size` takes, padding included
    pub fn event_size(body_size: usize) -> usize {
        pad_size(EVENT_PREFIX + HEADER_SIZE + body_size)
    }

    fn reserve(&self, needed: usize) -> Result<usize, CodecError> {
        if needed > self.remaining() {
            return Err(CodecError::Capacity {
                needed,
                available: self.remaining(),
            });
        }
        Ok(self.len)
    }

    fn commit(&mut self, size: usize) {
        self.len += size;
        self.events += 1;
        write_u32(self.buf, 0, (self.len - HEADER_SIZE) as u32);
    }

    /// Append an event with an arbitrary atom payload (e.g. raw MIDI)
    pub fn push_raw(&mut self, frames: i64, type_urid: Urid, body: &[u8]) -> Result<(), CodecError> {
        let size = Self::event_size(body.len());
        let at = self.reserve(size)?;

        self.buf[at..at + EVENT_PREFIX].copy_from_slice(&frames.to_le_bytes());
        let atom = at + EVENT_PREFIX;
        write_u32(self.buf, atom, body.len() as u32);
        write_u32(self.buf, atom + 4, type_urid);
        let body_start = atom + HEADER_SIZE;
        self.buf[body_start..body_start + body.len()].copy_from_slice(body);
        self.buf[body_start + body.len()..at + size].fill(0);

        self.commit(size);
        Ok(())
    }

    /// Append an object event
    pub fn push_object(
        &mut self,
        frames: i64,
        otype: Urid,
        properties: &[(Urid, ValueRef<'_>)],
    ) -> Result<(), CodecError> {
        let object_size = encoded_size(properties);
        let size = EVENT_PREFIX + object_size;
        let at = self.reserve(size)?;

        self.buf[at..at + EVENT_PREFIX].copy_from_slice(&frames.to_le_bytes());
        encode_object(
            &self.types,
            0,
            otype,
            properties,
            &mut self.buf[at + EVENT_PREFIX..at + size],
        )?;

        self.commit(size);
        Ok(())
    }

    /// Append an already-encoded atom (header included)
    pub fn push_atom(&mut self, frames: i64, atom: &[u8]) -> Result<(), CodecError> {
        let size = read_u32(atom, 0)? as usize;
        let type_urid = read_u32(atom, 4)?;
        let body = atom
            .get(HEADER_SIZE..HEADER_SIZE + size)
            .ok_or(CodecError::Truncated {
                needed: HEADER_SIZE + size,
                available: atom.len(),
            })?;
        self.push_raw(frames, type_urid, body)
    }
}
