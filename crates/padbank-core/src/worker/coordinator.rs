//! Job ids and stale-completion filtering (audio thread side)

use super::{WorkRequest, WorkResponse, WorkerLink};
use crate::engine::PadProperty;
use crate::error::LoadErrorKind;
use crate::protocol::JobId;
use crate::types::{PadId, MAX_LAYERS, NUM_PADS};

/// Why a job never reached the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// The request queue was full
    QueueFull { job_id: JobId },
    /// The message doesn't fit in a request
    TooLarge { job_id: JobId },
}

impl ScheduleError {
    pub fn job_id(&self) -> JobId {
        match self {
            ScheduleError::QueueFull { job_id } | ScheduleError::TooLarge { job_id } => *job_id,
        }
    }

    /// Failure code reported to the UI
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            ScheduleError::QueueFull { .. } => LoadErrorKind::QueueFull,
            ScheduleError::TooLarge { .. } => LoadErrorKind::InvalidRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub scheduled: u64,
    /// Requests refused before reaching the worker
    pub dropped: u64,
    /// Responses for superseded or already-applied jobs
    pub stale: u64,
    pub completed: u64,
}

/// Schedules jobs and decides which completions still matter
///
/// The latest job id is tracked per (pad, layer, property). A completion is
/// applied only if it carries that id, so the most recently *scheduled* job
/// wins regardless of completion order, and a duplicate delivery of an
/// applied job is ignored.
pub struct Coordinator {
    link: Box<dyn WorkerLink>,
    next_job: JobId,
    latest: Vec<JobId>,
    stats: CoordinatorStats,
}

fn slot(pad: PadId, layer: usize, property: PadProperty) -> usize {
    let layer = if property.is_layer_param() {
        layer.min(MAX_LAYERS - 1)
    } else {
        0
    };
    (pad.index() * MAX_LAYERS + layer) * PadProperty::COUNT + property.index()
}

impl Coordinator {
    pub fn new(link: Box<dyn WorkerLink>) -> Self {
        Self {
            link,
            next_job: 1,
            latest: vec![0; NUM_PADS * MAX_LAYERS * PadProperty::COUNT],
            stats: CoordinatorStats::default(),
        }
    }

    fn allocate_id(&mut self) -> JobId {
        let id = self.next_job;
        self.next_job = self.next_job.wrapping_add(1).max(1);
        id
    }

    /// Queue a job carrying an encoded `patch:Set`. Never blocks.
    ///
    /// On failure the job is dropped and counted; the caller reports it.
    pub fn schedule(
        &mut self,
        pad: PadId,
        layer: usize,
        property: PadProperty,
        payload: &[u8],
    ) -> Result<JobId, ScheduleError> {
        let job_id = self.allocate_id();
        let Some(request) = WorkRequest::new(job_id, pad, layer, property, payload) else {
            self.stats.dropped += 1;
            return Err(ScheduleError::TooLarge { job_id });
        };

        if self.link.schedule(request).is_err() {
            self.stats.dropped += 1;
            log::warn!("Work queue full, dropping job {} for pad {}", job_id, pad);
            return Err(ScheduleError::QueueFull { job_id });
        }

        self.latest[slot(pad, layer, property)] = job_id;
        self.stats.scheduled += 1;
        Ok(job_id)
    }

    /// Next completion that is still relevant
    ///
    /// Stale responses are dropped here; any sample they carry is released
    /// through its collector, not freed on this thread.
    pub fn poll(&mut self) -> Option<WorkResponse> {
        loop {
            let response = self.link.poll()?;
            let index = slot(response.pad, response.layer, response.property);
            if self.latest[index] == response.job_id {
                self.latest[index] = 0;
                self.stats.completed += 1;
                return Some(response);
            }
            self.stats.stale += 1;
            log::debug!(
                "Discarding stale job {} for pad {} (latest {})",
                response.job_id,
                response.pad,
                self.latest[index]
            );
        }
    }

    /// Job still outstanding for this target, if any
    pub fn pending(&self, pad: PadId, layer: usize, property: PadProperty) -> Option<JobId> {
        match self.latest[slot(pad, layer, property)] {
            0 => None,
            id => Some(id),
        }
    }

    /// Number of targets with an outstanding job
    pub fn pending_count(&self) -> usize {
        self.latest.iter().filter(|&&id| id != 0).count()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Outcome;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Link whose completions the test delivers by hand
    #[derive(Default)]
    struct Script {
        capacity: usize,
        requests: VecDeque<WorkRequest>,
        responses: VecDeque<WorkResponse>,
    }

    #[derive(Clone)]
    struct ScriptedLink(Arc<Mutex<Script>>);

    impl WorkerLink for ScriptedLink {
        fn schedule(&mut self, request: WorkRequest) -> Result<(), WorkRequest> {
            let mut script = self.0.lock().unwrap();
            if script.requests.len() >= script.capacity {
                return Err(request);
            }
            script.requests.push_back(request);
            Ok(())
        }

        fn poll(&mut self) -> Option<WorkResponse> {
            self.0.lock().unwrap().responses.pop_front()
        }
    }

    fn setup(capacity: usize) -> (Coordinator, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script {
            capacity,
            ..Script::default()
        }));
        let coordinator = Coordinator::new(Box::new(ScriptedLink(script.clone())));
        (coordinator, script)
    }

    fn complete(script: &Arc<Mutex<Script>>, job_id: JobId, value: f32) {
        let mut script = script.lock().unwrap();
        let index = script
            .requests
            .iter()
            .position(|r| r.job_id == job_id)
            .unwrap();
        let request = script.requests.remove(index).unwrap();
        script
            .responses
            .push_back(WorkResponse::new(&request, Outcome::Param(value)));
    }

    #[test]
    fn test_later_schedule_wins_over_later_completion() {
        let (mut coordinator, script) = setup(8);
        let pad = PadId::new(0, 7).unwrap();

        let a = coordinator.schedule(pad, 0, PadProperty::Gain, &[0; 16]).unwrap();
        let b = coordinator.schedule(pad, 0, PadProperty::Gain, &[0; 16]).unwrap();
        assert_ne!(a, b);
        assert_eq!(coordinator.pending(pad, 0, PadProperty::Gain), Some(b));

        // B finishes first, A straggles in afterwards
        complete(&script, b, 0.2);
        complete(&script, a, 0.9);

        let applied = coordinator.poll().unwrap();
        assert_eq!(applied.job_id, b);
        assert!(matches!(applied.outcome, Outcome::Param(v) if v == 0.2));
        assert!(coordinator.poll().is_none());

        let stats = coordinator.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.stale, 1);
        assert_eq!(coordinator.pending(pad, 0, PadProperty::Gain), None);
    }

    #[test]
    fn test_in_order_completion_discards_first() {
        let (mut coordinator, script) = setup(8);
        let pad = PadId::new(1, 3).unwrap();

        let a = coordinator.schedule(pad, 0, PadProperty::Pitch, &[0; 16]).unwrap();
        let b = coordinator.schedule(pad, 0, PadProperty::Pitch, &[0; 16]).unwrap();
        complete(&script, a, 1.0);
        complete(&script, b, 2.0);

        assert_eq!(coordinator.poll().map(|r| r.job_id), Some(b));
        assert!(coordinator.poll().is_none());
    }

    #[test]
    fn test_independent_targets_do_not_supersede() {
        let (mut coordinator, script) = setup(8);
        let pad = PadId::new(0, 0).unwrap();
        let other = PadId::new(0, 1).unwrap();

        let gain = coordinator.schedule(pad, 0, PadProperty::Gain, &[0; 16]).unwrap();
        let pan = coordinator.schedule(pad, 0, PadProperty::Pan, &[0; 16]).unwrap();
        let elsewhere = coordinator.schedule(other, 0, PadProperty::Gain, &[0; 16]).unwrap();
        complete(&script, elsewhere, 0.1);
        complete(&script, gain, 0.1);
        complete(&script, pan, 0.1);

        let applied: Vec<JobId> = std::iter::from_fn(|| coordinator.poll()).map(|r| r.job_id).collect();
        assert_eq!(applied, vec![elsewhere, gain, pan]);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_completion_is_ignored() {
        let (mut coordinator, script) = setup(8);
        let pad = PadId::new(2, 2).unwrap();
        let job = coordinator.schedule(pad, 0, PadProperty::Gain, &[0; 16]).unwrap();
        let request = script.lock().unwrap().requests.pop_front().unwrap();
        {
            let mut script = script.lock().unwrap();
            script.responses.push_back(WorkResponse::new(&request, Outcome::Param(0.5)));
            script.responses.push_back(WorkResponse::new(&request, Outcome::Param(0.5)));
        }

        assert_eq!(coordinator.poll().map(|r| r.job_id), Some(job));
        assert!(coordinator.poll().is_none());
        assert_eq!(coordinator.stats().stale, 1);
    }

    #[test]
    fn test_queue_full_is_reported_and_counted() {
        let (mut coordinator, _script) = setup(1);
        let pad = PadId::new(0, 5).unwrap();

        let first = coordinator.schedule(pad, 0, PadProperty::Sample, &[0; 16]).unwrap();
        let err = coordinator
            .schedule(pad, 0, PadProperty::Sample, &[0; 16])
            .unwrap_err();
        assert!(matches!(err, ScheduleError::QueueFull { .. }));
        assert_eq!(err.kind(), LoadErrorKind::QueueFull);
        assert_ne!(err.job_id(), first);

        // The refused job doesn't supersede the one in flight
        assert_eq!(coordinator.pending(pad, 0, PadProperty::Sample), Some(first));
        assert_eq!(coordinator.stats().dropped, 1);
    }

    #[test]
    fn test_too_large_payload() {
        let (mut coordinator, _script) = setup(4);
        let pad = PadId::new(0, 5).unwrap();
        let big = vec![0u8; crate::worker::MAX_PAYLOAD_SIZE + 8];
        let err = coordinator.schedule(pad, 0, PadProperty::Sample, &big).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::InvalidRequest);
    }
}
