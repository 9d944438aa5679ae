//! URI to integer identifier mapping
//!
//! Every object type and property key on the wire is a URID: a small integer
//! handed out by a registry shared between the engine, the worker and the UI.
//! The host normally owns the registry; [`UridRegistry`] is an in-process
//! implementation for hosts that don't (and for tests and the render tool).
//!
//! [`Uris`] maps every identifier the protocol uses exactly once, at
//! instantiate, so the audio path only ever compares integers.

use std::collections::HashMap;
use std::sync::Mutex;

/// Mapped identifier. Zero is never a valid URID.
pub type Urid = u32;

/// Host-provided URI -> URID mapping (required host feature)
pub trait UridMap: Send + Sync {
    /// Map a URI to its identifier, allocating a new one on first use.
    /// Returns 0 if the URI can't be mapped.
    fn map(&self, uri: &str) -> Urid;
}

/// Host-provided URID -> URI reverse mapping (optional host feature)
pub trait UridUnmap: Send + Sync {
    fn unmap(&self, urid: Urid) -> Option<String>;
}

/// In-process registry implementing both directions
#[derive(Default)]
pub struct UridRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    ids: HashMap<String, Urid>,
    uris: Vec<String>,
}

impl UridRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of URIs mapped so far
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.uris.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UridMap for UridRegistry {
    fn map(&self, uri: &str) -> Urid {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        if let Some(&id) = inner.ids.get(uri) {
            return id;
        }
        inner.uris.push(uri.to_string());
        let id = inner.uris.len() as Urid;
        inner.ids.insert(uri.to_string(), id);
        id
    }
}

impl UridUnmap for UridRegistry {
    fn unmap(&self, urid: Urid) -> Option<String> {
        let inner = self.inner.lock().ok()?;
        let index = (urid as usize).checked_sub(1)?;
        inner.uris.get(index).cloned()
    }
}

pub const ATOM_PREFIX: &str = "http://lv2plug.in/ns/ext/atom#";
pub const PATCH_PREFIX: &str = "http://lv2plug.in/ns/ext/patch#";
pub const MIDI_EVENT_URI: &str = "http://lv2plug.in/ns/ext/midi#MidiEvent";
pub const UNITS_FRAME_URI: &str = "http://lv2plug.in/ns/extensions/units#frame";
pub const PADBANK_PREFIX: &str = "urn:padbank#";

/// Atom value types the codec understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomTypes {
    pub int: Urid,
    pub float: Urid,
    pub bool: Urid,
    pub urid: Urid,
    pub string: Urid,
    pub chunk: Urid,
    pub vector: Urid,
    pub object: Urid,
    pub sequence: Urid,
}

/// Protocol object types (values of an object's `otype` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTypes {
    pub patch_set: Urid,
    pub pad_play: Urid,
    pub pad_stop: Urid,
    pub pad_param: Urid,
    pub state_request: Urid,
    pub pad_state: Urid,
    pub sample_loaded: Urid,
    pub sample_waveform: Urid,
    pub load_failed: Urid,
}

/// Property keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keys {
    pub patch_property: Urid,
    pub patch_value: Urid,
    pub bank: Urid,
    pub pad: Urid,
    pub layer: Urid,
    pub velocity: Urid,
    pub waveform: Urid,
    pub error_code: Urid,
    pub job_id: Urid,
    pub sample: Urid,
    pub gain: Urid,
    pub pan: Urid,
    pub pitch: Urid,
    pub start_point: Urid,
    pub mute_group: Urid,
    pub one_shot: Urid,
    pub attack: Urid,
    pub decay: Urid,
    pub sustain: Urid,
    pub release: Urid,
}

/// Every identifier the protocol uses, mapped once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uris {
    pub atom: AtomTypes,
    pub midi_event: Urid,
    pub frame_unit: Urid,
    pub object: ObjectTypes,
    pub key: Keys,
}

impl Uris {
    /// Map all protocol URIs through the given registry
    pub fn map(map: &dyn UridMap) -> Self {
        let atom = |name: &str| map.map(&format!("{ATOM_PREFIX}{name}"));
        let patch = |name: &str| map.map(&format!("{PATCH_PREFIX}{name}"));
        let own = |name: &str| map.map(&format!("{PADBANK_PREFIX}{name}"));

        Self {
            atom: AtomTypes {
                int: atom("Int"),
                float: atom("Float"),
                bool: atom("Bool"),
                urid: atom("URID"),
                string: atom("String"),
                chunk: atom("Chunk"),
                vector: atom("Vector"),
                object: atom("Object"),
                sequence: atom("Sequence"),
            },
            midi_event: map.map(MIDI_EVENT_URI),
            frame_unit: map.map(UNITS_FRAME_URI),
            object: ObjectTypes {
                patch_set: patch("Set"),
                pad_play: own("PadPlay"),
                pad_stop: own("PadStop"),
                pad_param: own("PadParam"),
                state_request: own("StateRequest"),
                pad_state: own("PadState"),
                sample_loaded: own("SampleLoaded"),
                sample_waveform: own("SampleWaveform"),
                load_failed: own("LoadFailed"),
            },
            key: Keys {
                patch_property: patch("property"),
                patch_value: patch("value"),
                bank: own("bank"),
                pad: own("pad"),
                layer: own("layer"),
                velocity: own("velocity"),
                waveform: own("waveform"),
                error_code: own("errorCode"),
                job_id: own("jobId"),
                sample: own("sample"),
                gain: own("gain"),
                pan: own("pan"),
                pitch: own("pitch"),
                start_point: own("startPoint"),
                mute_group: own("muteGroup"),
                one_shot: own("oneShot"),
                attack: own("attack"),
                decay: own("decay"),
                sustain: own("sustain"),
                release: own("release"),
            },
        }
    }

    /// True if every identifier mapped to a non-zero URID
    pub fn is_complete(&self) -> bool {
        let a = &self.atom;
        let o = &self.object;
        let k = &self.key;
        [
            a.int, a.float, a.bool, a.urid, a.string, a.chunk, a.vector, a.object, a.sequence,
            self.midi_event, self.frame_unit,
            o.patch_set, o.pad_play, o.pad_stop, o.pad_param, o.state_request, o.pad_state,
            o.sample_loaded, o.sample_waveform, o.load_failed,
            k.patch_property, k.patch_value, k.bank, k.pad, k.layer, k.velocity, k.waveform,
            k.error_code, k.job_id, k.sample, k.gain, k.pan, k.pitch, k.start_point,
            k.mute_group, k.one_shot, k.attack, k.decay, k.sustain, k.release,
        ]
        .iter()
        .all(|&id| id != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_stable() {
        let registry = UridRegistry::new();
        let a = registry.map("urn:test#a");
        let b = registry.map("urn:test#b");
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(registry.map("urn:test#a"), a);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.unmap(b).as_deref(), Some("urn:test#b"));
        assert_eq!(registry.unmap(0), None);
        assert_eq!(registry.unmap(99), None);
    }

    #[test]
    fn test_uris_are_distinct_and_complete() {
        let registry = UridRegistry::new();
        let uris = Uris::map(&registry);
        assert!(uris.is_complete());
        assert_ne!(uris.object.pad_play, uris.object.patch_set);
        assert_ne!(uris.key.bank, uris.key.pad);

        // Mapping twice through the same registry yields the same table
        assert_eq!(Uris::map(&registry), uris);
    }

    #[test]
    fn test_failing_map_is_incomplete() {
        struct Broken;
        impl UridMap for Broken {
            fn map(&self, _uri: &str) -> Urid {
                0
            }
        }
        assert!(!Uris::map(&Broken).is_complete());
    }
}
