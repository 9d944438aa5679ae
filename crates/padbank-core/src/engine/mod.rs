//! Voice/pad engine
//!
//! Per-pad playback parameters, the voice state machine and the sampler that
//! mixes voices into the host's output buffers.

pub mod envelope;
pub mod pad;
mod sampler;
pub mod voice;

pub use envelope::{Adsr, Envelope};
pub use pad::{Layer, Pad, PadProperty, SampleData};
pub use sampler::{Sampler, Trigger};
pub use voice::{Voice, VoiceState};
