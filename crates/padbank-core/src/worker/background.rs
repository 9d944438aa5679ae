//! Built-in worker thread
//!
//! Used when the host doesn't provide a worker. Two `rtrb` queues connect the
//! audio thread and the worker; neither side ever blocks on the other. The
//! worker thread also owns the `basedrop` collector, so sample memory
//! released anywhere is reclaimed here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use basedrop::Collector;
use rtrb::{Consumer, Producer, PushError, RingBuffer};

use super::{JobRunner, WorkRequest, WorkResponse, WorkerLink};
use crate::config::EngineConfig;
use crate::urid::Uris;

/// Idle wait between queue checks; `schedule` unparks the thread early
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Wait while the response queue is full
const BACKOFF_WAIT: Duration = Duration::from_millis(1);

pub struct BackgroundWorker {
    requests: Producer<WorkRequest>,
    responses: Consumer<WorkResponse>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawn the worker thread with queues sized from `config`
    pub fn spawn(uris: Uris, config: &EngineConfig) -> std::io::Result<Self> {
        let (requests, request_rx) = RingBuffer::new(config.work_queue_capacity.max(1));
        let (response_tx, responses) = RingBuffer::new(config.response_queue_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let waveform_points = config.waveform_points;

        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name("padbank-worker".to_string())
            .spawn(move || {
                worker_thread(request_rx, response_tx, thread_running, uris, waveform_points);
            })?;

        log::info!(
            "Worker thread spawned (queues: {} requests, {} responses)",
            config.work_queue_capacity,
            config.response_queue_capacity
        );

        Ok(Self {
            requests,
            responses,
            running,
            handle: Some(handle),
        })
    }

    fn wake(&self) {
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }
}

impl WorkerLink for BackgroundWorker {
    fn schedule(&mut self, request: WorkRequest) -> Result<(), WorkRequest> {
        match self.requests.push(request) {
            Ok(()) => {
                self.wake();
                Ok(())
            }
            Err(PushError::Full(request)) => Err(request),
        }
    }

    fn poll(&mut self) -> Option<WorkResponse> {
        self.responses.pop().ok()
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Background Thread
// ────────────────────────────────────────────────────────────────────────────────

fn worker_thread(
    mut requests: Consumer<WorkRequest>,
    mut responses: Producer<WorkResponse>,
    running: Arc<AtomicBool>,
    uris: Uris,
    waveform_points: usize,
) {
    // The collector is created on this thread and never leaves it
    let mut collector = Collector::new();
    let runner = JobRunner::new(uris, waveform_points, collector.handle());
    log::info!("Worker thread started");

    while running.load(Ordering::Acquire) {
        collector.collect();

        let Ok(request) = requests.pop() else {
            thread::park_timeout(IDLE_WAIT);
            continue;
        };

        log::debug!(
            "Running job {} for pad {} ({})",
            request.job_id,
            request.pad,
            request.property.name()
        );
        let mut response = runner.run(&request);

        loop {
            match responses.push(response) {
                Ok(()) => break,
                Err(PushError::Full(returned)) => {
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    response = returned;
                    thread::park_timeout(BACKOFF_WAIT);
                }
            }
        }
    }

    drop(runner);
    collector.collect();
    log::info!("Worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::HEADER_SIZE;
    use crate::engine::PadProperty;
    use crate::error::LoadErrorKind;
    use crate::protocol;
    use crate::types::PadId;
    use crate::urid::UridRegistry;
    use crate::worker::Outcome;
    use std::time::Instant;

    fn wait_for(worker: &mut BackgroundWorker) -> Option<WorkResponse> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(response) = worker.poll() {
                return Some(response);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_job_roundtrip_through_thread() {
        let uris = Uris::map(&UridRegistry::new());
        let mut worker = BackgroundWorker::spawn(uris, &EngineConfig::default()).unwrap();

        let pad = PadId::new(0, 7).unwrap();
        let set = protocol::set_sample(&uris, pad, 0, "/nonexistent/tom.wav").encode(&uris.atom);
        let request = WorkRequest::new(42, pad, 0, PadProperty::Sample, &set[HEADER_SIZE..]).unwrap();
        worker.schedule(request).unwrap();

        let response = wait_for(&mut worker).expect("worker did not answer");
        assert_eq!(response.job_id, 42);
        assert!(matches!(response.outcome, Outcome::Failed(LoadErrorKind::NotFound)));
    }

    #[test]
    fn test_full_request_queue_returns_request() {
        let uris = Uris::map(&UridRegistry::new());
        let config = EngineConfig {
            work_queue_capacity: 1,
            ..EngineConfig::default()
        };
        let mut worker = BackgroundWorker::spawn(uris, &config).unwrap();
        // Stop the thread so nothing drains the queue
        worker.running.store(false, Ordering::Release);
        if let Some(handle) = worker.handle.take() {
            handle.thread().unpark();
            handle.join().unwrap();
        }

        let pad = PadId::new(0, 0).unwrap();
        let set = protocol::set_sample(&uris, pad, 0, "").encode(&uris.atom);
        let first = WorkRequest::new(1, pad, 0, PadProperty::Sample, &set[HEADER_SIZE..]).unwrap();
        let second = WorkRequest::new(2, pad, 0, PadProperty::Sample, &set[HEADER_SIZE..]).unwrap();
        assert!(worker.schedule(first).is_ok());
        let refused = worker.schedule(second).unwrap_err();
        assert_eq!(refused.job_id, 2);
    }
}
