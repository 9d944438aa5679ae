//! Self-describing binary messages (atoms)
//!
//! Every exchange that is not raw MIDI (UI -> engine, engine -> UI,
//! engine -> worker) is an *object atom*: a type URID plus an ordered list of
//! `key -> typed value` properties, wrapped in a size-tagged envelope.
//!
//! # Layout (little-endian)
//!
//! ```text
//! atom     = size:u32 type:u32 body[size]            (padded to 8 in containers)
//! object   = id:u32 otype:u32 property*
//! property = key:u32 context:u32 atom                (padded to 8)
//! ```
//!
//! Numeric values are fixed width (i32 / f32 / u32). The total size of any
//! message is `8 + size`, so a reader can always skip a message without
//! understanding its contents, and [`encoded_size`] tells a writer how much
//! room it needs before writing a single byte.
//!
//! Two representations exist side by side:
//! - [`Object`] / [`Value`]: owned, for the UI side, the worker and tests
//! - [`ObjectRef`] / [`ValueRef`]: zero-copy views used on the audio thread,
//!   where decoding must not allocate

mod object;
pub mod sequence;

pub use object::{decode, encode_object, encoded_size, Object, ObjectRef, PropertyIter};
pub use sequence::{EventRef, SequenceIter, SequenceRef, SequenceWriter};

use crate::error::CodecError;
use crate::urid::{AtomTypes, Urid};

/// Size of an atom header (`size:u32 type:u32`)
pub const HEADER_SIZE: usize = 8;

/// Round a size up to the 8-byte container alignment
#[inline]
pub const fn pad_size(size: usize) -> usize {
    (size + 7) & !7
}

#[inline]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, CodecError> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(CodecError::Truncated {
            needed: offset + 4,
            available: bytes.len(),
        })
}

#[inline]
pub(crate) fn write_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// An owned, typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Bool(bool),
    Urid(Urid),
    String(String),
    /// Raw binary payload
    Chunk(Vec<u8>),
    /// Vector of 32-bit floats
    FloatVector(Vec<f32>),
    /// A value of a type this codec doesn't interpret, kept verbatim
    Other { type_urid: Urid, body: Vec<u8> },
}

impl Value {
    /// Borrow as a [`ValueRef`] for encoding
    pub fn as_ref(&self) -> ValueRef<'_> {
        match self {
            Value::Int(v) => ValueRef::Int(*v),
            Value::Float(v) => ValueRef::Float(*v),
            Value::Bool(v) => ValueRef::Bool(*v),
            Value::Urid(v) => ValueRef::Urid(*v),
            Value::String(s) => ValueRef::String(s),
            Value::Chunk(bytes) => ValueRef::Chunk(bytes),
            Value::FloatVector(values) => ValueRef::FloatVector(FloatVec::Native(values)),
            Value::Other { type_urid, body } => ValueRef::Other {
                type_urid: *type_urid,
                body,
            },
        }
    }
}

/// A borrowed property value, either decoded in place from wire bytes or
/// pointing at data about to be encoded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Int(i32),
    Float(f32),
    Bool(bool),
    Urid(Urid),
    String(&'a str),
    Chunk(&'a [u8]),
    FloatVector(FloatVec<'a>),
    Other { type_urid: Urid, body: &'a [u8] },
}

impl<'a> ValueRef<'a> {
    /// Atom type URID for this value
    pub fn type_urid(&self, types: &AtomTypes) -> Urid {
        match self {
            ValueRef::Int(_) => types.int,
            ValueRef::Float(_) => types.float,
            ValueRef::Bool(_) => types.bool,
            ValueRef::Urid(_) => types.urid,
            ValueRef::String(_) => types.string,
            ValueRef::Chunk(_) => types.chunk,
            ValueRef::FloatVector(_) => types.vector,
            ValueRef::Other { type_urid, .. } => *type_urid,
        }
    }

    /// Size of the encoded body in bytes (excluding header and padding)
    pub fn body_size(&self) -> usize {
        match self {
            ValueRef::Int(_) | ValueRef::Float(_) | ValueRef::Bool(_) | ValueRef::Urid(_) => 4,
            ValueRef::String(s) => s.len() + 1,
            ValueRef::Chunk(bytes) => bytes.len(),
            ValueRef::FloatVector(values) => 8 + 4 * values.len(),
            ValueRef::Other { body, .. } => body.len(),
        }
    }

    /// Write the body into `out`, which must be exactly `body_size()` long
    pub(crate) fn write_body(&self, types: &AtomTypes, out: &mut [u8]) {
        match self {
            ValueRef::Int(v) => out.copy_from_slice(&v.to_le_bytes()),
            ValueRef::Float(v) => out.copy_from_slice(&v.to_le_bytes()),
            ValueRef::Bool(v) => out.copy_from_slice(&(*v as i32).to_le_bytes()),
            ValueRef::Urid(v) => out.copy_from_slice(&v.to_le_bytes()),
            ValueRef::String(s) => {
                out[..s.len()].copy_from_slice(s.as_bytes());
                out[s.len()] = 0;
            }
            ValueRef::Chunk(bytes) => out.copy_from_slice(bytes),
            ValueRef::FloatVector(values) => {
                write_u32(out, 0, 4);
                write_u32(out, 4, types.float);
                for (i, v) in values.iter().enumerate() {
                    let at = 8 + i * 4;
                    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
                }
            }
            ValueRef::Other { body, .. } => out.copy_from_slice(body),
        }
    }

    /// Interpret a body of the given type. Never fails: anything not
    /// understood comes back as [`ValueRef::Other`].
    pub(crate) fn from_body(types: &AtomTypes, type_urid: Urid, body: &'a [u8]) -> Self {
        let word = || body.get(..4).map(|b| [b[0], b[1], b[2], b[3]]);
        let other = ValueRef::Other { type_urid, body };

        if type_urid == types.int {
            word().map(|w| ValueRef::Int(i32::from_le_bytes(w))).unwrap_or(other)
        } else if type_urid == types.float {
            word().map(|w| ValueRef::Float(f32::from_le_bytes(w))).unwrap_or(other)
        } else if type_urid == types.bool {
            word().map(|w| ValueRef::Bool(i32::from_le_bytes(w) != 0)).unwrap_or(other)
        } else if type_urid == types.urid {
            word().map(|w| ValueRef::Urid(u32::from_le_bytes(w))).unwrap_or(other)
        } else if type_urid == types.string {
            match body.split_last() {
                Some((0, text)) => std::str::from_utf8(text).map(ValueRef::String).unwrap_or(other),
                _ => other,
            }
        } else if type_urid == types.chunk {
            ValueRef::Chunk(body)
        } else if type_urid == types.vector {
            let child_size = read_u32(body, 0).ok();
            let child_type = read_u32(body, 4).ok();
            match (child_size, child_type) {
                (Some(4), Some(t)) if t == types.float && (body.len() - 8) % 4 == 0 => {
                    ValueRef::FloatVector(FloatVec::Wire(&body[8..]))
                }
                _ => other,
            }
        } else {
            other
        }
    }

    /// Copy into an owned [`Value`]
    pub fn to_owned(&self) -> Value {
        match self {
            ValueRef::Int(v) => Value::Int(*v),
            ValueRef::Float(v) => Value::Float(*v),
            ValueRef::Bool(v) => Value::Bool(*v),
            ValueRef::Urid(v) => Value::Urid(*v),
            ValueRef::String(s) => Value::String((*s).to_string()),
            ValueRef::Chunk(bytes) => Value::Chunk(bytes.to_vec()),
            ValueRef::FloatVector(values) => Value::FloatVector(values.to_vec()),
            ValueRef::Other { type_urid, body } => Value::Other {
                type_urid: *type_urid,
                body: body.to_vec(),
            },
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ValueRef::Int(v) => Some(*v),
            ValueRef::Bool(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// Numeric value as f32 (ints are converted)
    pub fn as_float(&self) -> Option<f32> {
        match self {
            ValueRef::Float(v) => Some(*v),
            ValueRef::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ValueRef::Bool(v) => Some(*v),
            ValueRef::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_urid(&self) -> Option<Urid> {
        match self {
            ValueRef::Urid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            ValueRef::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A float vector that is either still in wire bytes or a native slice
#[derive(Debug, Clone, Copy)]
pub enum FloatVec<'a> {
    /// Little-endian f32s, possibly unaligned
    Wire(&'a [u8]),
    Native(&'a [f32]),
}

impl<'a> FloatVec<'a> {
    pub fn len(&self) -> usize {
        match self {
            FloatVec::Wire(bytes) => bytes.len() / 4,
            FloatVec::Native(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        match self {
            FloatVec::Wire(bytes) => bytes
                .get(index * 4..index * 4 + 4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            FloatVec::Native(values) => values.get(index).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        let this = *self;
        (0..this.len()).filter_map(move |i| this.get(i))
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }
}

impl PartialEq for FloatVec<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}
