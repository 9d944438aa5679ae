//! Drum kit description (YAML)
//!
//! ```yaml
//! master_volume: 0.8
//! pads:
//!   - bank: 0
//!     pad: 0
//!     sample: kick.wav
//!   - bank: 0
//!     pad: 2
//!     layer: 1
//!     sample: snare_hard.wav
//!     gain: 0.9
//!     one_shot: false
//! ```
//!
//! Relative sample paths are resolved against the kit file's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use padbank_core::engine::PadProperty;
use padbank_core::types::PadId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitConfig {
    pub master_volume: f32,
    /// Semitones
    pub master_pitch: f32,
    pub pads: Vec<KitPad>,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            master_pitch: 0.0,
            pads: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitPad {
    pub bank: usize,
    pub pad: usize,
    #[serde(default)]
    pub layer: usize,
    pub sample: PathBuf,
    #[serde(default)]
    pub gain: Option<f32>,
    #[serde(default)]
    pub pan: Option<f32>,
    #[serde(default)]
    pub pitch: Option<f32>,
    #[serde(default)]
    pub start_point: Option<f32>,
    #[serde(default)]
    pub mute_group: Option<u8>,
    #[serde(default)]
    pub one_shot: Option<bool>,
    #[serde(default)]
    pub release: Option<f32>,
}

impl KitPad {
    pub fn id(&self) -> Option<PadId> {
        PadId::new(self.bank, self.pad)
    }

    /// Parameter overrides as (property, value) pairs
    pub fn params(&self) -> Vec<(PadProperty, f32)> {
        [
            (PadProperty::Gain, self.gain),
            (PadProperty::Pan, self.pan),
            (PadProperty::Pitch, self.pitch),
            (PadProperty::StartPoint, self.start_point),
            (PadProperty::MuteGroup, self.mute_group.map(f32::from)),
            (PadProperty::OneShot, self.one_shot.map(|b| if b { 1.0 } else { 0.0 })),
            (PadProperty::Release, self.release),
        ]
        .into_iter()
        .filter_map(|(property, value)| value.map(|v| (property, v)))
        .collect()
    }
}

impl KitConfig {
    /// Read and validate a kit file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read kit file {:?}", path))?;
        let mut kit: KitConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse kit file {:?}", path))?;

        kit.validate().with_context(|| format!("Invalid kit file {:?}", path))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut kit.pads {
            if entry.sample.is_relative() {
                entry.sample = base.join(&entry.sample);
            }
        }

        log::info!("Kit {:?}: {} pads", path, kit.pads.len());
        Ok(kit)
    }

    /// Every entry names a real pad and layer, and no (bank, pad, layer) twice
    ///
    /// A second load for the same layer supersedes the first inside the
    /// engine, so the first would never be acknowledged.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.pads {
            let Some(pad) = entry.id() else {
                bail!("Kit pad bank {} pad {} is out of range", entry.bank, entry.pad);
            };
            if entry.layer >= padbank_core::types::MAX_LAYERS {
                bail!("Kit pad {} has invalid layer {}", pad, entry.layer);
            }
            if !seen.insert((pad, entry.layer)) {
                bail!("Kit pad {} layer {} is listed more than once", pad, entry.layer);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kit.yaml");
        std::fs::write(
            &path,
            "master_volume: 0.5\npads:\n  - bank: 1\n    pad: 3\n    sample: snare.wav\n    gain: 0.7\n    one_shot: false\n  - bank: 0\n    pad: 0\n    sample: /abs/kick.wav\n",
        )
        .unwrap();

        let kit = KitConfig::load(&path).unwrap();
        assert_eq!(kit.master_volume, 0.5);
        assert_eq!(kit.master_pitch, 0.0);
        assert_eq!(kit.pads.len(), 2);
        assert_eq!(kit.pads[0].sample, dir.path().join("snare.wav"));
        assert_eq!(kit.pads[0].id(), PadId::new(1, 3));
        assert_eq!(
            kit.pads[0].params(),
            vec![(PadProperty::Gain, 0.7), (PadProperty::OneShot, 0.0)]
        );
        assert_eq!(kit.pads[1].sample, PathBuf::from("/abs/kick.wav"));
        assert!(kit.pads[1].params().is_empty());
    }

    #[test]
    fn test_out_of_range_pad_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kit.yaml");
        std::fs::write(&path, "pads:\n  - bank: 4\n    pad: 0\n    sample: x.wav\n").unwrap();
        assert!(KitConfig::load(&path).is_err());
    }

    #[test]
    fn test_duplicate_layer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kit.yaml");
        std::fs::write(
            &path,
            "pads:\n  - bank: 0\n    pad: 0\n    sample: a.wav\n  - bank: 0\n    pad: 0\n    sample: b.wav\n",
        )
        .unwrap();
        let err = KitConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));

        // Same pad on another layer is fine
        std::fs::write(
            &path,
            "pads:\n  - bank: 0\n    pad: 0\n    sample: a.wav\n  - bank: 0\n    pad: 0\n    layer: 1\n    sample: b.wav\n",
        )
        .unwrap();
        assert_eq!(KitConfig::load(&path).unwrap().pads.len(), 2);
    }
}
