// Bounded worker pool and the fan-out scheduler built on it

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::hardware::{VideoEncoder, probe_encoder};
use super::{
    Engine, FailureKind, FatalError, FfmpegEngine, JobFailure, PresetTable, TranscodeError,
    TranscodeJob, TranscodeJobResult, TranscodeReport, TranscodeRequest, encode_job,
};

/// Pool size when the request does not name one
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Workers never outnumber jobs, and there is always at least one.
pub fn pool_size(requested: Option<usize>, jobs: usize) -> usize {
    requested.unwrap_or(DEFAULT_MAX_WORKERS).min(jobs).max(1)
}

/// Message from worker to the scheduler thread
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// Job picked up from the queue
    JobStarted {
        job_id: Uuid,
        resolution: u32,
        worker_id: usize,
    },

    /// Job reached a terminal outcome (success or failure)
    JobFinished {
        worker_id: usize,
        result: TranscodeJobResult,
    },

    /// Queue is empty and the worker is exiting
    WorkerIdle { worker_id: usize },
}

/// Everything a worker needs to run a job, fixed for the whole request
pub struct JobContext {
    pub engine: Arc<dyn Engine>,
    pub encoder: VideoEncoder,
    pub presets: Arc<PresetTable>,
    pub deadline: Option<Instant>,
}

/// Lock that shrugs off poisoning; the data behind it stays consistent
/// because no critical section here can panic halfway.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sends `WorkerIdle` however the worker thread exits.
struct IdleGuard {
    worker_id: usize,
    tx: Sender<WorkerMessage>,
}

impl Drop for IdleGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMessage::WorkerIdle {
            worker_id: self.worker_id,
        });
    }
}

/// Fixed-size pool of worker threads draining a shared job queue
pub struct WorkerPool {
    size: usize,
    queue: Arc<Mutex<VecDeque<TranscodeJob>>>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    active_workers: Arc<Mutex<usize>>,
    peak_active: Arc<Mutex<usize>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel();

        Self {
            size: size.max(1),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            tx,
            rx,
            active_workers: Arc::new(Mutex::new(0)),
            peak_active: Arc::new(Mutex::new(0)),
        }
    }

    /// Get the maximum number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the number of workers currently running a job
    pub fn active_count(&self) -> usize {
        *lock(&self.active_workers)
    }

    /// Highest number of jobs that ran at the same time
    pub fn peak_active(&self) -> usize {
        *lock(&self.peak_active)
    }

    /// Run every job to a terminal result and return them in completion
    /// order. Always returns exactly one result per job.
    pub fn run_all(&self, jobs: Vec<TranscodeJob>, ctx: Arc<JobContext>) -> Vec<TranscodeJobResult> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let expected: Vec<(Uuid, TranscodeJob)> = jobs.iter().map(|j| (j.id, j.clone())).collect();
        lock(&self.queue).extend(jobs);

        let mut spawned = 0;
        for worker_id in 0..self.size.min(expected.len()) {
            match self.spawn_worker(worker_id, ctx.clone()) {
                Ok(()) => spawned += 1,
                Err(e) => error!(worker_id, error = %e, "Failed to spawn worker thread"),
            }
        }
        debug!(workers = spawned, jobs = expected.len(), "Worker pool started");

        let mut results = Vec::with_capacity(expected.len());
        let mut idle = 0;
        while idle < spawned {
            let Ok(message) = self.rx.recv() else { break };
            match message {
                WorkerMessage::JobStarted {
                    job_id,
                    resolution,
                    worker_id,
                } => {
                    debug!(%job_id, resolution, worker_id, "Job started");
                }
                WorkerMessage::JobFinished { worker_id, result } => {
                    debug!(
                        job_id = %result.job_id,
                        worker_id,
                        success = result.success,
                        "Job finished"
                    );
                    results.push(result);
                }
                WorkerMessage::WorkerIdle { worker_id } => {
                    debug!(worker_id, "Worker idle");
                    idle += 1;
                }
            }
        }

        // Anything still queued or unreported was lost with its worker
        lock(&self.queue).clear();
        let reported: HashSet<Uuid> = results.iter().map(|r| r.job_id).collect();
        for (id, job) in &expected {
            if !reported.contains(id) {
                warn!(job_id = %id, resolution = job.resolution, "Job never reported a result");
                results.push(TranscodeJobResult::failed(
                    job,
                    JobFailure::new(FailureKind::WorkerLost, "worker exited before reporting a result"),
                    std::time::Duration::ZERO,
                ));
            }
        }

        results
    }

    fn spawn_worker(&self, worker_id: usize, ctx: Arc<JobContext>) -> std::io::Result<()> {
        let tx = self.tx.clone();
        let queue = self.queue.clone();
        let active = self.active_workers.clone();
        let peak = self.peak_active.clone();

        thread::Builder::new()
            .name(format!("transcode-{}", worker_id))
            .spawn(move || {
                let _idle = IdleGuard {
                    worker_id,
                    tx: tx.clone(),
                };

                loop {
                    let Some(job) = lock(&queue).pop_front() else { break };

                    {
                        let mut count = lock(&active);
                        *count += 1;
                        let mut high = lock(&peak);
                        *high = (*high).max(*count);
                    }

                    let _ = tx.send(WorkerMessage::JobStarted {
                        job_id: job.id,
                        resolution: job.resolution,
                        worker_id,
                    });

                    let started = Instant::now();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        encode_job(
                            ctx.engine.as_ref(),
                            &job,
                            ctx.encoder,
                            &ctx.presets,
                            ctx.deadline,
                        )
                    }));
                    let result = outcome.unwrap_or_else(|payload| {
                        let reason = panic_message(payload.as_ref());
                        error!(job_id = %job.id, worker_id, reason = %reason, "Worker panicked during job");
                        TranscodeJobResult::failed(
                            &job,
                            JobFailure::new(FailureKind::WorkerLost, format!("worker panicked: {}", reason)),
                            started.elapsed(),
                        )
                    });

                    *lock(&active) -= 1;
                    let _ = tx.send(WorkerMessage::JobFinished { worker_id, result });
                }
            })?;

        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    EncoderResolved,
    Dispatching,
    AwaitingCompletion,
    Done,
}

impl SchedulerState {
    fn advance(&mut self, next: SchedulerState) {
        debug!(from = ?*self, to = ?next, "Scheduler state");
        *self = next;
    }
}

/// Fans one input out to many resolutions on a bounded pool.
///
/// The encoder is probed once per request and shared by every job, so all
/// outputs of a request come from the same encoder.
pub struct Transcoder {
    engine: Arc<dyn Engine>,
    presets: Arc<PresetTable>,
    preferred_encoder: Option<String>,
}

impl Transcoder {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            presets: Arc::new(PresetTable::builtin()),
            preferred_encoder: None,
        }
    }

    pub fn with_presets(mut self, presets: PresetTable) -> Self {
        self.presets = Arc::new(presets);
        self
    }

    pub fn with_preferred_encoder(mut self, name: Option<String>) -> Self {
        self.preferred_encoder = name;
        self
    }

    /// Transcode `request.input` into every requested resolution.
    ///
    /// Invalid requests and an uncreatable output directory are errors. A
    /// missing encoder is a fatal report with no jobs run. Everything else,
    /// including failed resolutions, lands in the report.
    pub fn run(&self, request: TranscodeRequest) -> Result<TranscodeReport, TranscodeError> {
        let started = Instant::now();
        let mut state = SchedulerState::Idle;

        request.validate()?;
        let deadline = request.timeout.map(|t| started + t);

        let Some(encoder) = probe_encoder(
            self.engine.as_ref(),
            self.preferred_encoder.as_deref(),
            deadline,
        ) else {
            error!(input = %request.input.display(), "No usable encoder; nothing dispatched");
            state.advance(SchedulerState::Done);
            let mut report = TranscodeReport::fatal(request.input, FatalError::EncoderUnavailable);
            report.total_duration_ms = started.elapsed().as_millis();
            return Ok(report);
        };
        state.advance(SchedulerState::EncoderResolved);

        fs::create_dir_all(&request.output_dir).map_err(|source| TranscodeError::OutputDir {
            path: request.output_dir.clone(),
            source,
        })?;

        state.advance(SchedulerState::Dispatching);
        let jobs: Vec<TranscodeJob> = request
            .resolutions
            .iter()
            .map(|&res| TranscodeJob::new(&request.input, res, &request.output_dir))
            .collect();
        let pool = WorkerPool::new(pool_size(request.max_workers, jobs.len()));
        info!(
            input = %request.input.display(),
            encoder = encoder.ffmpeg_name(),
            jobs = jobs.len(),
            workers = pool.size(),
            "Dispatching transcode jobs"
        );

        let ctx = Arc::new(JobContext {
            engine: self.engine.clone(),
            encoder,
            presets: self.presets.clone(),
            deadline,
        });

        state.advance(SchedulerState::AwaitingCompletion);
        let results = pool.run_all(jobs, ctx);

        let mut report = TranscodeReport::aggregate(results);
        report.input = request.input;
        report.encoder = Some(encoder.ffmpeg_name().to_string());
        report.total_duration_ms = started.elapsed().as_millis();
        state.advance(SchedulerState::Done);

        info!(
            produced = report.produced.len(),
            failed = report.failures.len(),
            total_ms = report.total_duration_ms as u64,
            "Transcode request complete"
        );
        Ok(report)
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(Arc::new(FfmpegEngine::default()))
    }
}

/// Transcode with the system `ffmpeg` and builtin presets.
pub fn transcode(
    input: impl Into<PathBuf>,
    resolutions: impl IntoIterator<Item = u32>,
    output_dir: impl Into<PathBuf>,
    max_workers: Option<usize>,
) -> Result<TranscodeReport, TranscodeError> {
    Transcoder::default().run(TranscodeRequest::new(input, resolutions, output_dir).with_max_workers(max_workers))
}
