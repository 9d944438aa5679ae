//! Plugin lifecycle and the per-cycle processing loop
//!
//! [`Plugin`] is the surface a host adapter drives:
//!
//! ```text
//! instantiate ─▶ activate ─▶ run, run, run ... ─▶ deactivate ─▶ cleanup
//!                    ▲                                │
//!                    └────────────────────────────────┘
//! ```
//!
//! Host capabilities arrive in an explicit [`HostFeatures`] struct instead of
//! being discovered at runtime; a missing required feature fails
//! `instantiate`.
//!
//! [`PadBank::run`] is the real-time entry point. Per cycle it:
//! 1. clears the outputs and reads the control ports
//! 2. applies finished jobs (new samples, validated parameters, failures)
//!    while the output sequence has room for their acknowledgements
//! 3. demultiplexes the input sequence, rendering audio between events
//! 4. continues any pending state refresh
//!
//! Nothing in `run` blocks, allocates or touches the filesystem.

use std::sync::Arc;

use crate::atom::{encoded_size, SequenceWriter, HEADER_SIZE};
use crate::config::EngineConfig;
use crate::demux::{Demux, EventSink};
use crate::engine::{PadProperty, Sampler};
use crate::error::InstantiateError;
use crate::notify::{Notifier, StateRefresh};
use crate::protocol::{self, Inbound};
use crate::types::{PadId, Sample};
use crate::urid::{Keys, Urid, UridMap, UridRegistry, UridUnmap, Uris};
use crate::worker::{BackgroundWorker, Coordinator, Outcome, WorkResponse, WorkerLink};

/// Lifecycle operations a host adapter calls
pub trait Plugin: Sized {
    /// Build an instance; fails fast on missing host features
    fn instantiate(
        sample_rate: f64,
        features: HostFeatures,
        config: EngineConfig,
    ) -> Result<Self, InstantiateError>;

    /// Called before the first `run` and after every `deactivate`
    fn activate(&mut self);

    /// Process one cycle. Real-time safe.
    fn run(&mut self, cycle: &mut Cycle<'_>);

    fn deactivate(&mut self);

    /// Release the instance. Joins the built-in worker, if any.
    fn cleanup(self);
}

/// Host capabilities handed to `instantiate`
#[derive(Default)]
pub struct HostFeatures {
    /// URI -> URID mapping (required)
    pub urid_map: Option<Arc<dyn UridMap>>,
    /// Reverse mapping for diagnostics off the audio thread
    pub urid_unmap: Option<Arc<dyn UridUnmap>>,
    /// Host worker; a built-in worker thread is spawned when absent
    pub worker: Option<Box<dyn WorkerLink>>,
}

impl HostFeatures {
    /// Map and unmap through an in-process registry
    pub fn with_registry(registry: Arc<UridRegistry>) -> Self {
        Self {
            urid_map: Some(registry.clone()),
            urid_unmap: Some(registry),
            worker: None,
        }
    }

    pub fn with_worker(mut self, worker: Box<dyn WorkerLink>) -> Self {
        self.worker = Some(worker);
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Control ports
// ────────────────────────────────────────────────────────────────────────────────

/// Float control ports the host may automate directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    MasterVolume,
    /// Semitones
    MasterPitch,
    /// > 0.5 redirects sample loads to the last played pad
    RecordOverLastPlayedPad,
}

impl Port {
    pub const ALL: [Port; 3] = [
        Port::MasterVolume,
        Port::MasterPitch,
        Port::RecordOverLastPlayedPad,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Port::MasterVolume => "master_volume",
            Port::MasterPitch => "master_pitch",
            Port::RecordOverLastPlayedPad => "record_over_last_played_pad",
        }
    }

    /// (min, max)
    pub fn range(self) -> (f32, f32) {
        match self {
            Port::MasterVolume => (0.0, 1.0),
            Port::MasterPitch => (-12.0, 12.0),
            Port::RecordOverLastPlayedPad => (0.0, 1.0),
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            Port::MasterVolume => 1.0,
            Port::MasterPitch | Port::RecordOverLastPlayedPad => 0.0,
        }
    }
}

/// Control port values for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controls {
    pub master_volume: f32,
    pub master_pitch: f32,
    pub record_over: f32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            master_volume: Port::MasterVolume.default_value(),
            master_pitch: Port::MasterPitch.default_value(),
            record_over: Port::RecordOverLastPlayedPad.default_value(),
        }
    }
}

impl Controls {
    pub fn get(&self, port: Port) -> f32 {
        match port {
            Port::MasterVolume => self.master_volume,
            Port::MasterPitch => self.master_pitch,
            Port::RecordOverLastPlayedPad => self.record_over,
        }
    }

    /// Set a port, clamped to its range
    pub fn set(&mut self, port: Port, value: f32) {
        let (min, max) = port.range();
        let value = if value.is_finite() {
            value.clamp(min, max)
        } else {
            port.default_value()
        };
        match port {
            Port::MasterVolume => self.master_volume = value,
            Port::MasterPitch => self.master_pitch = value,
            Port::RecordOverLastPlayedPad => self.record_over = value,
        }
    }

    pub fn record_over_enabled(&self) -> bool {
        self.record_over > 0.5
    }
}

/// Host buffers for one `run`
pub struct Cycle<'a> {
    pub frames: usize,
    /// Input sequence atom (header included)
    pub events_in: &'a [u8],
    /// Output sequence buffer; its length is the capacity
    pub events_out: &'a mut [u8],
    pub out_left: &'a mut [Sample],
    pub out_right: &'a mut [Sample],
    pub controls: Controls,
}

/// Counters accumulated over the instance's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCounters {
    pub dropped_notifications: u64,
    pub dropped_jobs: u64,
    pub stale_completions: u64,
    pub clamped_offsets: u64,
    pub ignored_events: u64,
}

// ────────────────────────────────────────────────────────────────────────────────
// PadBank
// ────────────────────────────────────────────────────────────────────────────────

/// Longest sample name a completion's output space is budgeted for
const NAME_BUDGET: usize = 255;

/// Output bytes one completion may need: `SampleLoaded` plus `SampleWaveform`
fn completion_reserve(keys: &Keys, waveform_points: usize) -> usize {
    let Some(pad) = PadId::from_index(0) else {
        return 0;
    };
    let name = "x".repeat(NAME_BUDGET);
    let peaks = vec![0.0f32; waveform_points];
    let loaded = encoded_size(&protocol::sample_loaded(keys, pad, 0, 0, &name));
    let waveform = encoded_size(&protocol::sample_waveform(keys, pad, &peaks));
    SequenceWriter::event_size(loaded - HEADER_SIZE) + SequenceWriter::event_size(waveform - HEADER_SIZE)
}

/// The drum sampler instance
pub struct PadBank {
    // Declared before the coordinator: samples must be released before the
    // built-in worker (and its collector) shuts down
    sampler: Sampler,
    coordinator: Coordinator,
    demux: Demux,
    refresh: StateRefresh,
    uris: Uris,
    unmap: Option<Arc<dyn UridUnmap>>,
    config: EngineConfig,
    completion_reserve: usize,
    active: bool,
    dropped_notifications: u64,
}

impl Plugin for PadBank {
    fn instantiate(
        sample_rate: f64,
        features: HostFeatures,
        config: EngineConfig,
    ) -> Result<Self, InstantiateError> {
        let map = features
            .urid_map
            .ok_or(InstantiateError::MissingFeature("urid:map"))?;
        if !sample_rate.is_finite() || sample_rate < 1.0 {
            return Err(InstantiateError::InvalidSampleRate(sample_rate));
        }

        let uris = Uris::map(map.as_ref());
        if !uris.is_complete() {
            return Err(InstantiateError::UnmappedUris);
        }

        let link: Box<dyn WorkerLink> = match features.worker {
            Some(worker) => worker,
            None => {
                log::warn!("Host provides no worker, starting a built-in worker thread");
                Box::new(BackgroundWorker::spawn(uris, &config)?)
            }
        };

        log::info!(
            "Instantiated at {} Hz ({} voices, {} per pad)",
            sample_rate,
            config.max_voices,
            config.voices_per_pad
        );

        Ok(Self {
            sampler: Sampler::new(sample_rate as f32, &config),
            coordinator: Coordinator::new(link),
            demux: Demux::new(uris),
            refresh: StateRefresh::default(),
            uris,
            unmap: features.urid_unmap,
            completion_reserve: completion_reserve(&uris.key, config.waveform_points),
            config,
            active: false,
            dropped_notifications: 0,
        })
    }

    fn activate(&mut self) {
        self.active = true;
        log::info!("Activated");
    }

    fn run(&mut self, cycle: &mut Cycle<'_>) {
        let frames = cycle.frames.min(cycle.out_left.len()).min(cycle.out_right.len());
        cycle.out_left[..frames].fill(0.0);
        cycle.out_right[..frames].fill(0.0);

        let mut notifier = Notifier::new(cycle.events_out, &self.uris);
        if !self.active {
            return;
        }

        self.sampler.set_master_volume(cycle.controls.master_volume);
        self.sampler.set_master_pitch(cycle.controls.master_pitch);

        // At least one per cycle; the rest wait in the response queue
        let mut applied = 0usize;
        while applied == 0 || notifier.remaining() >= self.completion_reserve {
            let Some(response) = self.coordinator.poll() else {
                break;
            };
            apply_completion(&mut self.sampler, &mut notifier, response);
            applied += 1;
        }

        let mut router = Router {
            sampler: &mut self.sampler,
            coordinator: &mut self.coordinator,
            notifier: &mut notifier,
            refresh: &mut self.refresh,
            record_over: cycle.controls.record_over_enabled(),
            left: &mut cycle.out_left[..frames],
            right: &mut cycle.out_right[..frames],
        };
        self.demux.process(cycle.events_in, frames, &mut router);

        let end = frames.saturating_sub(1) as i64;
        self.refresh
            .emit(&mut notifier, &self.sampler, self.config.state_refresh_per_cycle, end);

        self.dropped_notifications += notifier.dropped();
    }

    fn deactivate(&mut self) {
        self.sampler.kill_all();
        self.active = false;
        log::info!("Deactivated");
    }

    fn cleanup(self) {
        let counters = self.counters();
        log::info!(
            "Cleanup: {} notifications dropped, {} jobs dropped, {} stale completions",
            counters.dropped_notifications,
            counters.dropped_jobs,
            counters.stale_completions
        );
    }
}

impl PadBank {
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn uris(&self) -> &Uris {
        &self.uris
    }

    /// URI behind a URID, if the host can unmap. Locks; not for the audio thread.
    pub fn uri(&self, urid: Urid) -> Option<String> {
        self.unmap.as_ref().and_then(|unmap| unmap.unmap(urid))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn counters(&self) -> EngineCounters {
        let jobs = self.coordinator.stats();
        let events = self.demux.stats();
        EngineCounters {
            dropped_notifications: self.dropped_notifications,
            dropped_jobs: jobs.dropped,
            stale_completions: jobs.stale,
            clamped_offsets: events.clamped,
            ignored_events: events.ignored,
        }
    }
}

/// Install a finished job; reported at the start of the cycle
fn apply_completion(sampler: &mut Sampler, notifier: &mut Notifier<'_>, response: WorkResponse) {
    let WorkResponse {
        job_id,
        pad,
        layer,
        property,
        outcome,
    } = response;

    match outcome {
        Outcome::Loaded(sample) => {
            // The displaced sample (if any) is freed by the collector
            let _previous = sampler.pad_mut(pad).set_sample(layer, Some(sample.clone()));
            notifier.sample_loaded(0, pad, layer, job_id, &sample.name);
            notifier.sample_waveform(0, pad, &sample.peaks);
        }
        Outcome::Unloaded => {
            let _previous = sampler.pad_mut(pad).set_sample(layer, None);
            notifier.sample_loaded(0, pad, layer, job_id, "");
        }
        Outcome::Param(value) => {
            if sampler.pad_mut(pad).set_param(layer, property, value) {
                notifier.pad_state(0, sampler.pad(pad));
            }
        }
        Outcome::Failed(kind) => {
            log::debug!("Job {} for pad {} failed: {}", job_id, pad, kind.name());
            notifier.load_failed(0, pad, job_id, kind);
        }
    }
}

/// Routes one cycle's events into the engine
struct Router<'a, 'n> {
    sampler: &'a mut Sampler,
    coordinator: &'a mut Coordinator,
    notifier: &'a mut Notifier<'n>,
    refresh: &'a mut StateRefresh,
    record_over: bool,
    left: &'a mut [Sample],
    right: &'a mut [Sample],
}

impl Router<'_, '_> {
    fn schedule(&mut self, frame: i64, pad: PadId, layer: usize, property: PadProperty, body: &[u8]) {
        // Record-over only retargets sample loads
        let target = match (self.record_over, property, self.sampler.last_played()) {
            (true, PadProperty::Sample, Some(last)) => last,
            _ => pad,
        };

        match self.coordinator.schedule(target, layer, property, body) {
            Ok(job_id) => log::trace!(
                "Scheduled job {} ({} on pad {})",
                job_id,
                property.name(),
                target
            ),
            Err(e) => {
                self.notifier.load_failed(frame, target, e.job_id(), e.kind());
            }
        }
    }
}

impl EventSink for Router<'_, '_> {
    fn render(&mut self, start: usize, end: usize) {
        self.sampler
            .render(&mut self.left[start..end], &mut self.right[start..end]);
    }

    fn note_on(&mut self, frame: i64, pad: PadId, velocity: u8) {
        match self.sampler.note_on(pad, velocity) {
            Some(trigger) => {
                self.notifier.pad_played(frame, &trigger);
            }
            None => log::trace!("Pad {} has no sample, note ignored", pad),
        }
    }

    fn note_off(&mut self, frame: i64, pad: PadId) {
        if self.sampler.note_off(pad) {
            self.notifier.pad_stopped(frame, pad);
        }
    }

    fn message(&mut self, frame: i64, message: Inbound<'_>, body: &[u8]) {
        match message {
            Inbound::Set(set) => self.schedule(frame, set.pad, set.layer, set.property, body),
            Inbound::Play { pad, velocity: 0 } => self.note_off(frame, pad),
            Inbound::Play { pad, velocity } => self.note_on(frame, pad, velocity),
            Inbound::Stop { pad } => {
                self.sampler.stop_pad(pad);
                self.notifier.pad_stopped(frame, pad);
            }
            Inbound::Param {
                pad,
                layer,
                property,
                value,
            } => {
                if self.sampler.pad_mut(pad).set_param(layer, property, value) {
                    self.notifier.pad_state(frame, self.sampler.pad(pad));
                }
            }
            Inbound::StateRequest => self.refresh.start(),
        }
    }
}
