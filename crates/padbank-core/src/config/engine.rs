//! Engine configuration

use serde::{Deserialize, Serialize};

/// Sizes and defaults fixed at instantiate
///
/// Everything here sizes a pre-allocated structure or seeds pad defaults;
/// nothing is re-read while the engine runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Simultaneous voices one pad may hold before its oldest is stolen
    /// Default: 4
    pub voices_per_pad: usize,

    /// Size of the global voice pool
    /// Default: 32
    pub max_voices: usize,

    /// Slots in the audio -> worker request queue
    /// Default: 64
    pub work_queue_capacity: usize,

    /// Slots in the worker -> audio response queue
    /// Default: 64
    pub response_queue_capacity: usize,

    /// `PadState` messages emitted per cycle while a state refresh is running
    /// Default: 4
    pub state_refresh_per_cycle: usize,

    /// Points in a sample's waveform overview
    /// Default: 128
    pub waveform_points: usize,

    /// Release time for new pads, in seconds
    /// Default: 0.05
    pub default_release_secs: f32,

    /// Whether new pads ignore note-off
    /// Default: true
    pub one_shot_by_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            voices_per_pad: 4,
            max_voices: 32,
            work_queue_capacity: 64,
            response_queue_capacity: 64,
            state_refresh_per_cycle: 4,
            waveform_points: 128,
            default_release_secs: 0.05,
            one_shot_by_default: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("max_voices: 8\n").unwrap();
        assert_eq!(config.max_voices, 8);
        assert_eq!(config.voices_per_pad, 4);
        assert!(config.one_shot_by_default);
    }
}
