//! Padbank Core - real-time drum sampler engine
//!
//! A 4 x 16 pad sampler that runs inside a host's audio callback. Raw MIDI
//! and structured object messages arrive in one time-stamped sequence per
//! cycle; sample loading happens on a worker; state changes flow back to the
//! UI as object messages in the output sequence.
//!
//! Entry point for hosts: [`plugin::PadBank`] through the [`plugin::Plugin`]
//! lifecycle. UI code uses [`protocol`] to build requests and
//! [`remote::RemoteMirror`] to follow the engine.

pub mod atom;
pub mod config;
pub mod demux;
pub mod engine;
pub mod error;
pub mod midi;
pub mod notify;
pub mod plugin;
pub mod protocol;
pub mod remote;
pub mod types;
pub mod urid;
pub mod worker;

pub use error::{CodecError, InstantiateError, LoadError, LoadErrorKind, ProtocolError};
pub use plugin::{Controls, Cycle, EngineCounters, HostFeatures, PadBank, Plugin, Port};
pub use types::*;
