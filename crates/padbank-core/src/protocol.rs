//! UI <-> engine message protocol
//!
//! Typed views of the object atoms exchanged with the UI. Inbound messages
//! are parsed from zero-copy [`ObjectRef`]s on the audio thread; outbound
//! property lists are fixed-size arrays of [`ValueRef`]s, so building a
//! notification never allocates.
//!
//! The `*_request` / [`set_sample`] / [`set_param`] builders are the UI
//! side's counterpart and return owned [`Object`]s.

use crate::atom::{FloatVec, Object, ObjectRef, Value, ValueRef};
use crate::engine::{Pad, PadProperty};
use crate::error::{LoadErrorKind, ProtocolError};
use crate::types::{PadId, MAX_LAYERS};
use crate::urid::{Keys, Urid, Uris};

/// Correlation id of a deferred job (0 = none)
pub type JobId = u32;

// ────────────────────────────────────────────────────────────────────────────────
// Inbound (UI -> engine)
// ────────────────────────────────────────────────────────────────────────────────

/// A `patch:Set` on one pad property
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetRequest<'a> {
    pub pad: PadId,
    pub layer: usize,
    pub property: PadProperty,
    pub value: ValueRef<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inbound<'a> {
    /// Deferred to the worker
    Set(SetRequest<'a>),
    /// Trigger from the UI; velocity 0 releases
    Play { pad: PadId, velocity: u8 },
    Stop { pad: PadId },
    /// Immediate float parameter change
    Param {
        pad: PadId,
        layer: usize,
        property: PadProperty,
        value: f32,
    },
    StateRequest,
}

fn required_int(object: &ObjectRef<'_>, key: Urid, name: &'static str) -> Result<i32, ProtocolError> {
    object.get_int(key).ok_or(ProtocolError::MissingField(name))
}

fn pad_of(keys: &Keys, object: &ObjectRef<'_>) -> Result<PadId, ProtocolError> {
    let bank = required_int(object, keys.bank, "bank")?;
    let pad = required_int(object, keys.pad, "pad")?;
    PadId::from_wire(bank, pad).ok_or(ProtocolError::OutOfRange("bank/pad"))
}

fn layer_of(keys: &Keys, object: &ObjectRef<'_>) -> Result<usize, ProtocolError> {
    match object.get_int(keys.layer) {
        None => Ok(0),
        Some(layer) if (0..MAX_LAYERS as i32).contains(&layer) => Ok(layer as usize),
        Some(_) => Err(ProtocolError::OutOfRange("layer")),
    }
}

fn property_of(keys: &Keys, object: &ObjectRef<'_>) -> Result<PadProperty, ProtocolError> {
    let urid = object
        .get_urid(keys.patch_property)
        .ok_or(ProtocolError::MissingField("patch:property"))?;
    PadProperty::from_urid(keys, urid).ok_or(ProtocolError::UnknownProperty(urid))
}

impl<'a> Inbound<'a> {
    /// Classify and validate an inbound object. Never allocates.
    pub fn parse(uris: &Uris, object: &ObjectRef<'a>) -> Result<Self, ProtocolError> {
        let types = &uris.object;
        let keys = &uris.key;
        let otype = object.otype();

        if otype == types.patch_set {
            let value = object
                .get(keys.patch_value)
                .ok_or(ProtocolError::MissingField("patch:value"))?;
            Ok(Inbound::Set(SetRequest {
                pad: pad_of(keys, object)?,
                layer: layer_of(keys, object)?,
                property: property_of(keys, object)?,
                value,
            }))
        } else if otype == types.pad_play {
            let velocity = object.get_int(keys.velocity).unwrap_or(127).clamp(0, 127) as u8;
            Ok(Inbound::Play {
                pad: pad_of(keys, object)?,
                velocity,
            })
        } else if otype == types.pad_stop {
            Ok(Inbound::Stop {
                pad: pad_of(keys, object)?,
            })
        } else if otype == types.pad_param {
            let property = property_of(keys, object)?;
            let value = object
                .get_float(keys.patch_value)
                .ok_or(ProtocolError::MissingField("patch:value"))?;
            let value = property
                .clamp(value)
                .ok_or(ProtocolError::OutOfRange("patch:value"))?;
            Ok(Inbound::Param {
                pad: pad_of(keys, object)?,
                layer: layer_of(keys, object)?,
                property,
                value,
            })
        } else if otype == types.state_request {
            Ok(Inbound::StateRequest)
        } else {
            Err(ProtocolError::UnknownType(otype))
        }
    }
}

/// UI side: load `path` into a pad layer (an empty path unloads)
pub fn set_sample(uris: &Uris, pad: PadId, layer: usize, path: &str) -> Object {
    let k = &uris.key;
    Object::new(uris.object.patch_set)
        .with(k.bank, Value::Int(pad.bank() as i32))
        .with(k.pad, Value::Int(pad.pad() as i32))
        .with(k.layer, Value::Int(layer as i32))
        .with(k.patch_property, Value::Urid(k.sample))
        .with(k.patch_value, Value::String(path.to_string()))
}

/// UI side: deferred parameter change through `patch:Set`
pub fn set_param(uris: &Uris, pad: PadId, layer: usize, property: PadProperty, value: f32) -> Object {
    let k = &uris.key;
    Object::new(uris.object.patch_set)
        .with(k.bank, Value::Int(pad.bank() as i32))
        .with(k.pad, Value::Int(pad.pad() as i32))
        .with(k.layer, Value::Int(layer as i32))
        .with(k.patch_property, Value::Urid(property.urid(k)))
        .with(k.patch_value, Value::Float(value))
}

/// UI side: immediate parameter change
pub fn pad_param_request(
    uris: &Uris,
    pad: PadId,
    layer: usize,
    property: PadProperty,
    value: f32,
) -> Object {
    let k = &uris.key;
    Object::new(uris.object.pad_param)
        .with(k.bank, Value::Int(pad.bank() as i32))
        .with(k.pad, Value::Int(pad.pad() as i32))
        .with(k.layer, Value::Int(layer as i32))
        .with(k.patch_property, Value::Urid(property.urid(k)))
        .with(k.patch_value, Value::Float(value))
}

pub fn pad_play_request(uris: &Uris, pad: PadId, velocity: u8) -> Object {
    let k = &uris.key;
    Object::new(uris.object.pad_play)
        .with(k.bank, Value::Int(pad.bank() as i32))
        .with(k.pad, Value::Int(pad.pad() as i32))
        .with(k.velocity, Value::Int(velocity as i32))
}

pub fn pad_stop_request(uris: &Uris, pad: PadId) -> Object {
    let k = &uris.key;
    Object::new(uris.object.pad_stop)
        .with(k.bank, Value::Int(pad.bank() as i32))
        .with(k.pad, Value::Int(pad.pad() as i32))
}

pub fn state_request(uris: &Uris) -> Object {
    Object::new(uris.object.state_request)
}

// ────────────────────────────────────────────────────────────────────────────────
// Outbound (engine -> UI)
// ────────────────────────────────────────────────────────────────────────────────

/// Properties of a `PadPlay` echo
pub fn pad_played(keys: &Keys, pad: PadId, layer: usize, velocity: u8) -> [(Urid, ValueRef<'static>); 4] {
    [
        (keys.bank, ValueRef::Int(pad.bank() as i32)),
        (keys.pad, ValueRef::Int(pad.pad() as i32)),
        (keys.layer, ValueRef::Int(layer as i32)),
        (keys.velocity, ValueRef::Int(velocity as i32)),
    ]
}

pub fn pad_stopped(keys: &Keys, pad: PadId) -> [(Urid, ValueRef<'static>); 2] {
    [
        (keys.bank, ValueRef::Int(pad.bank() as i32)),
        (keys.pad, ValueRef::Int(pad.pad() as i32)),
    ]
}

pub fn sample_loaded<'a>(
    keys: &Keys,
    pad: PadId,
    layer: usize,
    job_id: JobId,
    name: &'a str,
) -> [(Urid, ValueRef<'a>); 5] {
    [
        (keys.bank, ValueRef::Int(pad.bank() as i32)),
        (keys.pad, ValueRef::Int(pad.pad() as i32)),
        (keys.layer, ValueRef::Int(layer as i32)),
        (keys.job_id, ValueRef::Int(job_id as i32)),
        (keys.sample, ValueRef::String(name)),
    ]
}

pub fn sample_waveform<'a>(keys: &Keys, pad: PadId, peaks: &'a [f32]) -> [(Urid, ValueRef<'a>); 3] {
    [
        (keys.bank, ValueRef::Int(pad.bank() as i32)),
        (keys.pad, ValueRef::Int(pad.pad() as i32)),
        (keys.waveform, ValueRef::FloatVector(FloatVec::Native(peaks))),
    ]
}

pub fn load_failed(keys: &Keys, pad: PadId, job_id: JobId, error: LoadErrorKind) -> [(Urid, ValueRef<'static>); 4] {
    [
        (keys.bank, ValueRef::Int(pad.bank() as i32)),
        (keys.pad, ValueRef::Int(pad.pad() as i32)),
        (keys.job_id, ValueRef::Int(job_id as i32)),
        (keys.error_code, ValueRef::Int(error.code())),
    ]
}

/// Full state of one pad (layer 0 parameters)
pub fn pad_state<'a>(keys: &Keys, pad: &'a Pad) -> [(Urid, ValueRef<'a>); 9] {
    let layer = &pad.layers[0];
    let id = pad.id();
    [
        (keys.bank, ValueRef::Int(id.bank() as i32)),
        (keys.pad, ValueRef::Int(id.pad() as i32)),
        (keys.gain, ValueRef::Float(layer.gain)),
        (keys.pan, ValueRef::Float(layer.pan)),
        (keys.pitch, ValueRef::Float(layer.pitch)),
        (keys.start_point, ValueRef::Float(layer.start_point)),
        (keys.mute_group, ValueRef::Int(pad.mute_group as i32)),
        (keys.one_shot, ValueRef::Bool(pad.one_shot)),
        (keys.sample, ValueRef::String(pad.sample_name())),
    ]
}

/// Snapshot carried by a `PadState` message
#[derive(Debug, Clone, PartialEq)]
pub struct PadSnapshot {
    pub gain: f32,
    pub pan: f32,
    pub pitch: f32,
    pub start_point: f32,
    pub mute_group: u8,
    pub one_shot: bool,
    pub sample: String,
}

/// Parsed outbound message, for the UI side
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    PadPlayed {
        pad: PadId,
        layer: usize,
        velocity: u8,
    },
    PadStopped {
        pad: PadId,
    },
    SampleLoaded {
        pad: PadId,
        layer: usize,
        job_id: JobId,
        name: String,
    },
    SampleWaveform {
        pad: PadId,
        peaks: Vec<f32>,
    },
    LoadFailed {
        pad: PadId,
        job_id: JobId,
        /// `None` for codes this build doesn't know
        error: Option<LoadErrorKind>,
    },
    PadState {
        pad: PadId,
        state: PadSnapshot,
    },
}

impl Outbound {
    pub fn parse(uris: &Uris, object: &ObjectRef<'_>) -> Result<Self, ProtocolError> {
        let types = &uris.object;
        let k = &uris.key;
        let otype = object.otype();
        let pad = pad_of(k, object)?;
        let float = |key: Urid, name: &'static str| {
            object.get_float(key).ok_or(ProtocolError::MissingField(name))
        };

        if otype == types.pad_play {
            Ok(Outbound::PadPlayed {
                pad,
                layer: layer_of(k, object)?,
                velocity: required_int(object, k.velocity, "velocity")?.clamp(0, 127) as u8,
            })
        } else if otype == types.pad_stop {
            Ok(Outbound::PadStopped { pad })
        } else if otype == types.sample_loaded {
            Ok(Outbound::SampleLoaded {
                pad,
                layer: layer_of(k, object)?,
                job_id: required_int(object, k.job_id, "jobId")? as JobId,
                name: object.get_str(k.sample).unwrap_or_default().to_string(),
            })
        } else if otype == types.sample_waveform {
            match object.get(k.waveform) {
                Some(ValueRef::FloatVector(peaks)) => Ok(Outbound::SampleWaveform {
                    pad,
                    peaks: peaks.to_vec(),
                }),
                _ => Err(ProtocolError::MissingField("waveform")),
            }
        } else if otype == types.load_failed {
            Ok(Outbound::LoadFailed {
                pad,
                job_id: required_int(object, k.job_id, "jobId")? as JobId,
                error: LoadErrorKind::from_code(required_int(object, k.error_code, "errorCode")?),
            })
        } else if otype == types.pad_state {
            Ok(Outbound::PadState {
                pad,
                state: PadSnapshot {
                    gain: float(k.gain, "gain")?,
                    pan: float(k.pan, "pan")?,
                    pitch: float(k.pitch, "pitch")?,
                    start_point: float(k.start_point, "startPoint")?,
                    mute_group: required_int(object, k.mute_group, "muteGroup")?.clamp(0, 255) as u8,
                    one_shot: object
                        .get(k.one_shot)
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    sample: object.get_str(k.sample).unwrap_or_default().to_string(),
                },
            })
        } else {
            Err(ProtocolError::UnknownType(otype))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::encode_object;
    use crate::urid::UridRegistry;

    fn uris() -> Uris {
        Uris::map(&UridRegistry::new())
    }

    fn parse_inbound(uris: &Uris, object: &Object) -> Result<Inbound<'static>, ProtocolError> {
        let bytes: &'static [u8] = Box::leak(object.encode(&uris.atom).into_boxed_slice());
        let view = ObjectRef::parse(&uris.atom, bytes)?;
        Inbound::parse(uris, &view)
    }

    fn roundtrip_outbound(uris: &Uris, otype: Urid, props: &[(Urid, ValueRef<'_>)]) -> Outbound {
        let mut buf = vec![0u8; crate::atom::encoded_size(props)];
        encode_object(&uris.atom, 0, otype, props, &mut buf).unwrap();
        let view = ObjectRef::parse(&uris.atom, &buf).unwrap();
        Outbound::parse(uris, &view).unwrap()
    }

    #[test]
    fn test_parse_set_sample() {
        let uris = uris();
        let pad = PadId::new(2, 7).unwrap();
        match parse_inbound(&uris, &set_sample(&uris, pad, 1, "/kits/snare.wav")).unwrap() {
            Inbound::Set(request) => {
                assert_eq!(request.pad, pad);
                assert_eq!(request.layer, 1);
                assert_eq!(request.property, PadProperty::Sample);
                assert_eq!(request.value.as_str(), Some("/kits/snare.wav"));
            }
            other => panic!("expected set, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_play_and_stop() {
        let uris = uris();
        let pad = PadId::new(0, 4).unwrap();
        assert_eq!(
            parse_inbound(&uris, &pad_play_request(&uris, pad, 100)).unwrap(),
            Inbound::Play { pad, velocity: 100 }
        );
        assert_eq!(
            parse_inbound(&uris, &pad_stop_request(&uris, pad)).unwrap(),
            Inbound::Stop { pad }
        );
        assert_eq!(
            parse_inbound(&uris, &state_request(&uris)).unwrap(),
            Inbound::StateRequest
        );
    }

    #[test]
    fn test_param_is_clamped() {
        let uris = uris();
        let pad = PadId::new(1, 0).unwrap();
        let request = pad_param_request(&uris, pad, 0, PadProperty::Pan, 5.0);
        assert_eq!(
            parse_inbound(&uris, &request).unwrap(),
            Inbound::Param {
                pad,
                layer: 0,
                property: PadProperty::Pan,
                value: 1.0
            }
        );
    }

    #[test]
    fn test_rejections() {
        let uris = uris();
        let k = &uris.key;

        let out_of_range = Object::new(uris.object.pad_play)
            .with(k.bank, Value::Int(4))
            .with(k.pad, Value::Int(0));
        assert_eq!(
            parse_inbound(&uris, &out_of_range),
            Err(ProtocolError::OutOfRange("bank/pad"))
        );

        let missing_pad = Object::new(uris.object.pad_stop).with(k.bank, Value::Int(0));
        assert_eq!(
            parse_inbound(&uris, &missing_pad),
            Err(ProtocolError::MissingField("pad"))
        );

        let unknown = Object::new(k.gain);
        assert_eq!(
            parse_inbound(&uris, &unknown),
            Err(ProtocolError::UnknownType(k.gain))
        );

        let bad_property = Object::new(uris.object.patch_set)
            .with(k.bank, Value::Int(0))
            .with(k.pad, Value::Int(0))
            .with(k.patch_property, Value::Urid(k.bank))
            .with(k.patch_value, Value::Float(1.0));
        assert_eq!(
            parse_inbound(&uris, &bad_property),
            Err(ProtocolError::UnknownProperty(k.bank))
        );
    }

    #[test]
    fn test_outbound_messages_parse_back() {
        let uris = uris();
        let k = &uris.key;
        let pad = PadId::new(0, 4).unwrap();

        assert_eq!(
            roundtrip_outbound(&uris, uris.object.pad_play, &pad_played(k, pad, 0, 100)),
            Outbound::PadPlayed {
                pad,
                layer: 0,
                velocity: 100
            }
        );
        assert_eq!(
            roundtrip_outbound(
                &uris,
                uris.object.load_failed,
                &load_failed(k, pad, 9, LoadErrorKind::NotFound)
            ),
            Outbound::LoadFailed {
                pad,
                job_id: 9,
                error: Some(LoadErrorKind::NotFound)
            }
        );
        assert_eq!(
            roundtrip_outbound(
                &uris,
                uris.object.sample_waveform,
                &sample_waveform(k, pad, &[0.0, 0.5])
            ),
            Outbound::SampleWaveform {
                pad,
                peaks: vec![0.0, 0.5]
            }
        );
    }

    #[test]
    fn test_pad_state_snapshot() {
        let uris = uris();
        let mut pad = Pad::new(PadId::new(3, 15).unwrap(), false, 0.1);
        pad.layers[0].gain = 0.5;
        pad.mute_group = 2;

        let message = roundtrip_outbound(&uris, uris.object.pad_state, &pad_state(&uris.key, &pad));
        assert_eq!(
            message,
            Outbound::PadState {
                pad: pad.id(),
                state: PadSnapshot {
                    gain: 0.5,
                    pan: 0.0,
                    pitch: 1.0,
                    start_point: 0.0,
                    mute_group: 2,
                    one_shot: false,
                    sample: String::new(),
                }
            }
        );
    }
}
