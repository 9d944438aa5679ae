//! Object atoms: encode, decode and zero-copy views

use super::{pad_size, read_u32, write_u32, Value, ValueRef, HEADER_SIZE};
use crate::error::CodecError;
use crate::urid::{AtomTypes, Urid};

/// Object body prefix (`id:u32 otype:u32`)
const OBJECT_PREFIX: usize = 8;

/// Property prefix (`key:u32 context:u32`) plus the value's atom header
const PROPERTY_PREFIX: usize = 8 + HEADER_SIZE;

/// Total encoded size of an object with these properties, header included
///
/// This is exact: [`encode_object`] writes precisely this many bytes.
pub fn encoded_size(properties: &[(Urid, ValueRef<'_>)]) -> usize {
    HEADER_SIZE
        + OBJECT_PREFIX
        + properties
            .iter()
            .map(|(_, value)| PROPERTY_PREFIX + pad_size(value.body_size()))
            .sum::<usize>()
}

/// Encode an object into `out`, returning the number of bytes written
///
/// Fails without touching `out` if it is smaller than [`encoded_size`].
/// Does not allocate, so it is safe on the audio thread.
pub fn encode_object(
    types: &AtomTypes,
    id: Urid,
    otype: Urid,
    properties: &[(Urid, ValueRef<'_>)],
    out: &mut [u8],
) -> Result<usize, CodecError> {
    let total = encoded_size(properties);
    if out.len() < total {
        return Err(CodecError::Capacity {
            needed: total,
            available: out.len(),
        });
    }

    write_u32(out, 0, (total - HEADER_SIZE) as u32);
    write_u32(out, 4, types.object);
    write_u32(out, 8, id);
    write_u32(out, 12, otype);

    let mut offset = HEADER_SIZE + OBJECT_PREFIX;
    for (key, value) in properties {
        let body_size = value.body_size();
        write_u32(out, offset, *key);
        write_u32(out, offset + 4, 0);
        write_u32(out, offset + 8, body_size as u32);
        write_u32(out, offset + 12, value.type_urid(types));

        let body_start = offset + PROPERTY_PREFIX;
        value.write_body(types, &mut out[body_start..body_start + body_size]);

        let padded_end = body_start + pad_size(body_size);
        out[body_start + body_size..padded_end].fill(0);
        offset = padded_end;
    }

    debug_assert_eq!(offset, total);
    Ok(total)
}

/// Decode an owned object (inverse of [`Object::encode`])
pub fn decode(types: &AtomTypes, bytes: &[u8]) -> Result<Object, CodecError> {
    ObjectRef::parse(types, bytes).map(|obj| obj.to_owned())
}

/// Owned object: type, id and ordered properties
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub id: Urid,
    pub otype: Urid,
    pub properties: Vec<(Urid, Value)>,
}

impl Object {
    /// Create an empty object of the given type
    pub fn new(otype: Urid) -> Self {
        Self {
            id: 0,
            otype,
            properties: Vec::new(),
        }
    }

    /// Builder-style property append
    pub fn with(mut self, key: Urid, value: Value) -> Self {
        self.properties.push((key, value));
        self
    }

    /// First property with the given key
    pub fn get(&self, key: Urid) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    fn property_refs(&self) -> Vec<(Urid, ValueRef<'_>)> {
        self.properties.iter().map(|(k, v)| (*k, v.as_ref())).collect()
    }

    /// Exact number of bytes [`Object::encode`] produces
    pub fn encoded_size(&self) -> usize {
        encoded_size(&self.property_refs())
    }

    /// Encode into a freshly allocated buffer
    pub fn encode(&self, types: &AtomTypes) -> Vec<u8> {
        let refs = self.property_refs();
        let mut out = vec![0u8; encoded_size(&refs)];
        // The buffer is sized from the same property list, so this can't fail
        let _ = encode_object(types, self.id, self.otype, &refs, &mut out);
        out
    }
}

/// A validated, zero-copy view of an encoded object
#[derive(Debug, Clone, Copy)]
pub struct ObjectRef<'a> {
    types: AtomTypes,
    id: Urid,
    otype: Urid,
    /// Property region (after the id/otype prefix)
    properties: &'a [u8],
}

impl<'a> ObjectRef<'a> {
    /// Validate and view an object atom (header included) in `bytes`
    ///
    /// Trailing bytes beyond the atom's declared size are ignored. Every
    /// property is bounds-checked here so iteration afterwards can't fail.
    pub fn parse(types: &AtomTypes, bytes: &'a [u8]) -> Result<Self, CodecError> {
        let size = read_u32(bytes, 0)? as usize;
        let type_urid = read_u32(bytes, 4)?;
        if type_urid != types.object {
            return Err(CodecError::NotAnObject { found: type_urid });
        }
        let end = HEADER_SIZE + size;
        if bytes.len() < end {
            return Err(CodecError::Truncated {
                needed: end,
                available: bytes.len(),
            });
        }
        Self::from_body(types, &bytes[HEADER_SIZE..end])
    }

    /// View an object from its body alone (header already consumed)
    pub fn from_body(types: &AtomTypes, body: &'a [u8]) -> Result<Self, CodecError> {
        if body.len() < OBJECT_PREFIX {
            return Err(CodecError::Malformed("object body shorter than id/otype"));
        }
        let id = read_u32(body, 0)?;
        let otype = read_u32(body, 4)?;
        let properties = &body[OBJECT_PREFIX..];

        let mut offset = 0;
        while offset < properties.len() {
            if properties.len() - offset < PROPERTY_PREFIX {
                return Err(CodecError::Malformed("truncated property header"));
            }
            let value_size = read_u32(properties, offset + 8)? as usize;
            let value_end = offset + PROPERTY_PREFIX + value_size;
            if value_end > properties.len() {
                return Err(CodecError::Truncated {
                    needed: value_end,
                    available: properties.len(),
                });
            }
            // The last property may omit its trailing padding
            offset = (offset + PROPERTY_PREFIX + pad_size(value_size)).min(properties.len());
        }

        Ok(Self {
            types: *types,
            id,
            otype,
            properties,
        })
    }

    pub fn id(&self) -> Urid {
        self.id
    }

    /// The object's type URID
    pub fn otype(&self) -> Urid {
        self.otype
    }

    /// Iterate properties in wire order
    pub fn properties(&self) -> PropertyIter<'a> {
        PropertyIter {
            types: self.types,
            bytes: self.properties,
            offset: 0,
        }
    }

    /// First property with the given key
    pub fn get(&self, key: Urid) -> Option<ValueRef<'a>> {
        self.properties().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_int(&self, key: Urid) -> Option<i32> {
        self.get(key).and_then(|v| v.as_int())
    }

    pub fn get_float(&self, key: Urid) -> Option<f32> {
        self.get(key).and_then(|v| v.as_float())
    }

    pub fn get_urid(&self, key: Urid) -> Option<Urid> {
        self.get(key).and_then(|v| v.as_urid())
    }

    pub fn get_str(&self, key: Urid) -> Option<&'a str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// Copy into an owned [`Object`]
    pub fn to_owned(&self) -> Object {
        Object {
            id: self.id,
            otype: self.otype,
            properties: self.properties().map(|(k, v)| (k, v.to_owned())).collect(),
        }
    }
}

/// Iterator over `(key, value)` pairs of a validated object
pub struct PropertyIter<'a> {
    types: AtomTypes,
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for PropertyIter<'a> {
    type Item = (Urid, ValueRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + PROPERTY_PREFIX > self.bytes.len() {
            return None;
        }
        let key = read_u32(self.bytes, self.offset).ok()?;
        let size = read_u32(self.bytes, self.offset + 8).ok()? as usize;
        let type_urid = read_u32(self.bytes, self.offset + 12).ok()?;
        let body_start = self.offset + PROPERTY_PREFIX;
        let body = self.bytes.get(body_start..body_start + size)?;

        self.offset = body_start + pad_size(size);
        Some((key, ValueRef::from_body(&self.types, type_urid, body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urid::{UridMap, UridRegistry, Uris};

    fn setup() -> (UridRegistry, Uris) {
        let registry = UridRegistry::new();
        let uris = Uris::map(&registry);
        (registry, uris)
    }

    #[test]
    fn test_roundtrip_all_value_kinds() {
        let (registry, uris) = setup();
        let unknown_type = registry.map("urn:test#Opaque");
        let object = Object::new(uris.object.pad_state)
            .with(uris.key.bank, Value::Int(2))
            .with(uris.key.gain, Value::Float(0.75))
            .with(uris.key.one_shot, Value::Bool(true))
            .with(uris.key.patch_property, Value::Urid(uris.key.sample))
            .with(uris.key.sample, Value::String("snare 01.flac".into()))
            .with(uris.key.job_id, Value::Chunk(vec![1, 2, 3, 4, 5]))
            .with(uris.key.waveform, Value::FloatVector(vec![0.0, 0.5, 1.0]))
            .with(
                registry.map("urn:test#extra"),
                Value::Other {
                    type_urid: unknown_type,
                    body: vec![9, 8, 7],
                },
            );

        let bytes = object.encode(&uris.atom);
        assert_eq!(bytes.len(), object.encoded_size());
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(decode(&uris.atom, &bytes).unwrap(), object);
    }

    #[test]
    fn test_empty_object_roundtrip() {
        let (_registry, uris) = setup();
        let object = Object::new(uris.object.state_request);
        let bytes = object.encode(&uris.atom);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode(&uris.atom, &bytes).unwrap(), object);
    }

    #[test]
    fn test_size_is_known_before_writing() {
        let (_registry, uris) = setup();
        let props = [
            (uris.key.bank, ValueRef::Int(0)),
            (uris.key.pad, ValueRef::Int(4)),
            (uris.key.velocity, ValueRef::Int(100)),
        ];
        let needed = encoded_size(&props);
        // header + id/otype + 3 * (prefix + padded int)
        assert_eq!(needed, 8 + 8 + 3 * (16 + 8));

        let mut small = vec![0u8; needed - 1];
        let err = encode_object(&uris.atom, 0, uris.object.pad_play, &props, &mut small).unwrap_err();
        assert_eq!(
            err,
            CodecError::Capacity {
                needed,
                available: needed - 1
            }
        );
        assert!(small.iter().all(|&b| b == 0), "failed encode must not write");

        let mut exact = vec![0u8; needed];
        assert_eq!(
            encode_object(&uris.atom, 0, uris.object.pad_play, &props, &mut exact),
            Ok(needed)
        );
    }

    #[test]
    fn test_view_lookup_and_unknown_keys() {
        let (registry, uris) = setup();
        let mystery = registry.map("urn:someone-else#colour");
        let bytes = Object::new(uris.object.pad_play)
            .with(uris.key.bank, Value::Int(1))
            .with(mystery, Value::String("red".into()))
            .with(uris.key.pad, Value::Int(9))
            .encode(&uris.atom);

        let view = ObjectRef::parse(&uris.atom, &bytes).unwrap();
        assert_eq!(view.otype(), uris.object.pad_play);
        assert_eq!(view.get_int(uris.key.bank), Some(1));
        assert_eq!(view.get_int(uris.key.pad), Some(9));
        assert_eq!(view.get_str(mystery), Some("red"));
        assert_eq!(view.get(uris.key.velocity), None);
        assert_eq!(view.properties().count(), 3);
    }

    #[test]
    fn test_rejects_non_object_and_truncation() {
        let (_registry, uris) = setup();
        let bytes = Object::new(uris.object.pad_play)
            .with(uris.key.bank, Value::Int(1))
            .encode(&uris.atom);

        assert!(matches!(
            ObjectRef::parse(&uris.atom, &bytes[..bytes.len() - 4]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            ObjectRef::parse(&uris.atom, &bytes[..6]),
            Err(CodecError::Truncated { .. })
        ));

        let mut wrong_type = bytes.clone();
        wrong_type[4..8].copy_from_slice(&uris.atom.int.to_le_bytes());
        assert!(matches!(
            ObjectRef::parse(&uris.atom, &wrong_type),
            Err(CodecError::NotAnObject { .. })
        ));

        // A property claiming more bytes than the object holds
        let mut lying = bytes.clone();
        lying[24..28].copy_from_slice(&64u32.to_le_bytes());
        assert!(ObjectRef::parse(&uris.atom, &lying).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let (_registry, uris) = setup();
        let object = Object::new(uris.object.pad_stop).with(uris.key.pad, Value::Int(3));
        let mut bytes = object.encode(&uris.atom);
        bytes.extend_from_slice(&[0xFF; 12]);
        assert_eq!(decode(&uris.atom, &bytes).unwrap(), object);
    }
}
