//! Deferred work: sample loading and other non-real-time jobs
//!
//! The audio thread never touches the filesystem. A `patch:Set` is packed
//! into a fixed-size [`WorkRequest`] and handed to a [`WorkerLink`]; the job
//! runs elsewhere (the host's worker, or the built-in [`BackgroundWorker`])
//! and its [`WorkResponse`] comes back through the same link.
//!
//! ```text
//! audio thread                         worker thread
//! ────────────                         ─────────────
//! Coordinator::schedule ──request──▶  JobRunner::run  (decode, allocate)
//! Coordinator::poll     ◀─response──  Shared<SampleData> / error code
//! ```
//!
//! [`Coordinator`] assigns job ids and remembers the latest job per
//! pad/layer/property, so responses for superseded jobs are dropped no matter
//! what order they arrive in.

mod background;
mod coordinator;
pub mod loader;

pub use background::BackgroundWorker;
pub use coordinator::{Coordinator, CoordinatorStats, ScheduleError};

use std::path::Path;

use basedrop::{Handle, Shared};

use crate::atom::ObjectRef;
use crate::engine::{PadProperty, SampleData};
use crate::error::{LoadError, LoadErrorKind};
use crate::protocol::JobId;
use crate::types::PadId;
use crate::urid::Uris;

/// Largest encoded `patch:Set` body a request can carry
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// A job on its way to the worker
///
/// Fixed size so it can travel through a pre-allocated queue. `pad` is the
/// effective target (which may differ from the pad named in the payload when
/// record-over redirected it).
#[derive(Clone)]
pub struct WorkRequest {
    pub job_id: JobId,
    pub pad: PadId,
    pub layer: usize,
    pub property: PadProperty,
    len: usize,
    payload: [u8; MAX_PAYLOAD_SIZE],
}

impl WorkRequest {
    /// Copy an encoded object body into a request; `None` if it's too large
    pub fn new(
        job_id: JobId,
        pad: PadId,
        layer: usize,
        property: PadProperty,
        object: &[u8],
    ) -> Option<Self> {
        if object.len() > MAX_PAYLOAD_SIZE {
            return None;
        }
        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        payload[..object.len()].copy_from_slice(object);
        Some(Self {
            job_id,
            pad,
            layer,
            property,
            len: object.len(),
            payload,
        })
    }

    /// The encoded `patch:Set` object body (no atom header)
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

impl std::fmt::Debug for WorkRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkRequest")
            .field("job_id", &self.job_id)
            .field("pad", &self.pad)
            .field("layer", &self.layer)
            .field("property", &self.property)
            .field("len", &self.len)
            .finish()
    }
}

/// What a finished job produced
pub enum Outcome {
    /// New sample for the layer
    Loaded(Shared<SampleData>),
    /// Empty path: clear the layer
    Unloaded,
    /// Validated float parameter
    Param(f32),
    Failed(LoadErrorKind),
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Loaded(sample) => write!(f, "Loaded({:?})", sample.name),
            Outcome::Unloaded => write!(f, "Unloaded"),
            Outcome::Param(value) => write!(f, "Param({})", value),
            Outcome::Failed(kind) => write!(f, "Failed({:?})", kind),
        }
    }
}

/// A finished job on its way back to the audio thread
#[derive(Debug)]
pub struct WorkResponse {
    pub job_id: JobId,
    pub pad: PadId,
    pub layer: usize,
    pub property: PadProperty,
    pub outcome: Outcome,
}

impl WorkResponse {
    pub fn new(request: &WorkRequest, outcome: Outcome) -> Self {
        Self {
            job_id: request.job_id,
            pad: request.pad,
            layer: request.layer,
            property: request.property,
            outcome,
        }
    }
}

/// Real-time side of a worker
///
/// Both methods are called from the audio thread and must not block.
pub trait WorkerLink: Send {
    /// Hand a request to the worker; gives it back if the queue is full
    fn schedule(&mut self, request: WorkRequest) -> Result<(), WorkRequest>;

    /// Next finished job, if any
    fn poll(&mut self) -> Option<WorkResponse>;
}

/// Executes requests off the audio thread
///
/// Hosts that bring their own worker build one of these and call
/// [`JobRunner::run`] from their worker thread.
pub struct JobRunner {
    uris: Uris,
    waveform_points: usize,
    handle: Handle,
}

impl JobRunner {
    /// `handle` must belong to a collector that the worker thread drains
    pub fn new(uris: Uris, waveform_points: usize, handle: Handle) -> Self {
        Self {
            uris,
            waveform_points,
            handle,
        }
    }

    /// Execute one request. Blocks on I/O; never panics on bad input.
    pub fn run(&self, request: &WorkRequest) -> WorkResponse {
        let outcome = match self.execute(request) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Job {} for pad {} failed: {}", request.job_id, request.pad, e);
                Outcome::Failed(e.kind())
            }
        };
        WorkResponse::new(request, outcome)
    }

    fn execute(&self, request: &WorkRequest) -> Result<Outcome, LoadError> {
        let object = ObjectRef::from_body(&self.uris.atom, request.payload())
            .map_err(|_| LoadError::InvalidRequest("payload is not an object"))?;
        let value = object
            .get(self.uris.key.patch_value)
            .ok_or(LoadError::InvalidRequest("missing patch:value"))?;

        match request.property {
            PadProperty::Sample => {
                let path = value
                    .as_str()
                    .ok_or(LoadError::InvalidRequest("sample path is not a string"))?;
                if path.is_empty() {
                    log::info!("Unloading pad {} layer {}", request.pad, request.layer);
                    return Ok(Outcome::Unloaded);
                }
                let data = loader::load_sample(Path::new(path), self.waveform_points)?;
                Ok(Outcome::Loaded(Shared::new(&self.handle, data)))
            }
            property => {
                let raw = value
                    .as_float()
                    .ok_or(LoadError::InvalidRequest("value is not numeric"))?;
                property
                    .clamp(raw)
                    .map(Outcome::Param)
                    .ok_or(LoadError::InvalidRequest("value is not finite"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::HEADER_SIZE;
    use crate::protocol;
    use crate::urid::UridRegistry;
    use basedrop::Collector;

    fn request(uris: &Uris, object: &crate::atom::Object, property: PadProperty) -> WorkRequest {
        let pad = PadId::new(0, 7).unwrap();
        let bytes = object.encode(&uris.atom);
        WorkRequest::new(1, pad, 0, property, &bytes[HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn test_missing_sample_fails_with_not_found() {
        let uris = Uris::map(&UridRegistry::new());
        let collector = Collector::new();
        let runner = JobRunner::new(uris, 16, collector.handle());

        let pad = PadId::new(0, 7).unwrap();
        let set = protocol::set_sample(&uris, pad, 0, "/nonexistent/ride.wav");
        let response = runner.run(&request(&uris, &set, PadProperty::Sample));
        assert_eq!(response.job_id, 1);
        assert_eq!(response.pad, pad);
        assert!(matches!(response.outcome, Outcome::Failed(LoadErrorKind::NotFound)));
    }

    #[test]
    fn test_empty_path_unloads() {
        let uris = Uris::map(&UridRegistry::new());
        let collector = Collector::new();
        let runner = JobRunner::new(uris, 16, collector.handle());

        let set = protocol::set_sample(&uris, PadId::new(0, 7).unwrap(), 0, "");
        let response = runner.run(&request(&uris, &set, PadProperty::Sample));
        assert!(matches!(response.outcome, Outcome::Unloaded));
    }

    #[test]
    fn test_param_is_validated() {
        let uris = Uris::map(&UridRegistry::new());
        let collector = Collector::new();
        let runner = JobRunner::new(uris, 16, collector.handle());

        let set = protocol::set_param(&uris, PadId::new(0, 7).unwrap(), 0, PadProperty::Gain, 9.0);
        let response = runner.run(&request(&uris, &set, PadProperty::Gain));
        assert!(matches!(response.outcome, Outcome::Param(v) if v == 4.0));
    }

    #[test]
    fn test_loads_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clap.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..480 {
            writer.write_sample(((i % 32) * 512) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let uris = Uris::map(&UridRegistry::new());
        let collector = Collector::new();
        let runner = JobRunner::new(uris, 16, collector.handle());
        let set = protocol::set_sample(&uris, PadId::new(0, 7).unwrap(), 0, path.to_str().unwrap());
        let response = runner.run(&request(&uris, &set, PadProperty::Sample));
        match response.outcome {
            Outcome::Loaded(sample) => {
                assert_eq!(sample.name, "clap.wav");
                assert_eq!(sample.len(), 480);
                assert_eq!(sample.peaks.len(), 16);
            }
            other => panic!("expected a loaded sample, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_payload_is_refused() {
        let pad = PadId::new(0, 0).unwrap();
        let big = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert!(WorkRequest::new(1, pad, 0, PadProperty::Sample, &big).is_none());
    }
}
