//! Job controller: drives one compression job at a time against a single engine handle.

use std::sync::{Arc, Mutex};

use crate::{
    config::CompressConfig,
    engine::{
        EngineEvent, EngineFactory, EngineHandle, EngineManager, EngineState, HandleId,
        lifecycle::lock,
    },
    error::{CompressError, CompressResult},
    job::{InputFile, JobSnapshot, JobStatus, LogEntry, OutputVideo},
    stats::FpsStats,
    telemetry,
};

/// Receives a fresh snapshot after every change to the job state.
pub trait JobObserver: Send + Sync {
    fn on_update(&self, snapshot: &JobSnapshot);
}

impl<F> JobObserver for F
where
    F: Fn(&JobSnapshot) + Send + Sync,
{
    fn on_update(&self, snapshot: &JobSnapshot) {
        self(snapshot)
    }
}

#[derive(Debug, Default)]
struct JobState {
    job_id: u64,
    status: JobStatus,
    input: Option<InputFile>,
    progress: u8,
    logs: Vec<LogEntry>,
    stats: FpsStats,
    output: Option<OutputVideo>,
    /// Engine handle whose events belong to the running job.
    handle_id: Option<HandleId>,
}

impl JobState {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            status: self.status,
            input_name: self.input.as_ref().map(|i| i.name.clone()),
            progress: self.progress,
            logs: self.logs.clone(),
            median_fps: self.stats.median(),
            output: self.output.clone(),
        }
    }

    fn is_current(&self, job_id: u64, status: JobStatus) -> bool {
        self.job_id == job_id && self.status == status
    }

    fn apply_event(&mut self, handle: HandleId, event: EngineEvent) -> bool {
        if self.status != JobStatus::Running || self.handle_id != Some(handle) {
            return false;
        }

        match event {
            EngineEvent::Log { kind, message } => {
                if let Some(fps) = telemetry::parse_line(&message).fps() {
                    self.stats.record(fps);
                }
                self.logs.push(LogEntry::new(kind, message));
                true
            }
            EngineEvent::Progress { progress } => {
                let pct = progress_percent(progress);
                if pct <= self.progress {
                    return false;
                }
                self.progress = pct;
                true
            }
        }
    }
}

/// `floor(progress * 100)` clamped to `0..=100`.
pub fn progress_percent(progress: f64) -> u8 {
    if !progress.is_finite() {
        return 0;
    }
    (progress * 100.0).floor().clamp(0.0, 100.0) as u8
}

#[derive(Default)]
struct Shared {
    state: Mutex<JobState>,
    observers: Mutex<Vec<Arc<dyn JobObserver>>>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> R {
        let out = {
            let mut st = lock(&self.state);
            f(&mut *st)
        };
        self.notify();
        out
    }

    fn notify(&self) {
        let observers = lock(&self.observers).clone();
        if observers.is_empty() {
            return;
        }
        let snapshot = lock(&self.state).snapshot();
        for observer in observers {
            observer.on_update(&snapshot);
        }
    }

    fn on_engine_event(&self, handle: HandleId, event: EngineEvent) {
        let changed = lock(&self.state).apply_event(handle, event);
        if changed {
            self.notify();
        }
    }
}

/// Owns the job state and the engine handle; one job in flight at a time.
///
/// [`JobController::start`] blocks until the job reaches a terminal state, so a caller that
/// wants to cancel shares the controller (it is `Sync`) and calls [`JobController::stop`]
/// from another thread.
pub struct JobController {
    config: CompressConfig,
    shared: Arc<Shared>,
    engines: EngineManager,
}

impl JobController {
    pub fn new(
        config: CompressConfig,
        factory: impl EngineFactory + 'static,
    ) -> CompressResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared::default());
        let sink_shared = Arc::clone(&shared);
        let engines = EngineManager::new(
            Box::new(factory),
            config.assets.clone(),
            Arc::new(move |handle: HandleId, event: EngineEvent| {
                sink_shared.on_engine_event(handle, event)
            }),
        );

        Ok(Self {
            config,
            shared,
            engines,
        })
    }

    pub fn config(&self) -> &CompressConfig {
        &self.config
    }

    pub fn subscribe(&self, observer: impl JobObserver + 'static) {
        lock(&self.shared.observers).push(Arc::new(observer));
    }

    pub fn snapshot(&self) -> JobSnapshot {
        lock(&self.shared.state).snapshot()
    }

    pub fn status(&self) -> JobStatus {
        lock(&self.shared.state).status
    }

    pub fn median_fps(&self) -> Option<f64> {
        lock(&self.shared.state).stats.median()
    }

    pub fn engine_state(&self) -> EngineState {
        self.engines.state()
    }

    /// How many times an engine has been constructed and loaded.
    pub fn engine_load_count(&self) -> usize {
        self.engines.load_count()
    }

    /// Select the video to compress. `None` means the picker came back empty; the previous
    /// selection is kept in that case.
    pub fn select_input(&self, input: Option<InputFile>) {
        self.shared.update(|st| match input {
            Some(input) => st.input = Some(input),
            None => st.logs.push(LogEntry::error("No file selected")),
        });
    }

    pub fn clear_input(&self) {
        self.shared.update(|st| st.input = None);
    }

    /// Run one compression job with the selected input and return its final snapshot.
    ///
    /// Failures never escape: they end up as an error log entry plus the job status.
    #[tracing::instrument(skip(self))]
    pub fn start(&self) -> JobSnapshot {
        let begun = {
            let mut st = lock(&self.shared.state);
            if st.status.is_active() {
                tracing::warn!(job = st.job_id, "a job is already in flight");
                return st.snapshot();
            }
            match st.input.clone() {
                None => {
                    st.logs.push(LogEntry::error("No file selected"));
                    None
                }
                Some(input) => {
                    let previous = st.status;
                    st.job_id += 1;
                    st.status = JobStatus::Initializing;
                    st.handle_id = None;
                    Some((st.job_id, input, previous))
                }
            }
        };
        self.shared.notify();

        let Some((job_id, input, previous)) = begun else {
            return self.snapshot();
        };
        tracing::info!(
            job = job_id,
            input = %input.name,
            bytes = input.bytes.len(),
            "job initializing"
        );

        let handle = match self.engines.ensure_ready() {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.update(|st| {
                    if !st.is_current(job_id, JobStatus::Initializing) {
                        return;
                    }
                    tracing::warn!(job = job_id, %err, "engine unavailable");
                    st.status = previous;
                    st.logs.push(LogEntry::error(err.to_string()));
                });
                return self.snapshot();
            }
        };

        let running = self.shared.update(|st| {
            if !st.is_current(job_id, JobStatus::Initializing) {
                return false;
            }
            st.logs.clear();
            st.stats.reset();
            st.progress = 0;
            st.output = None;
            st.handle_id = Some(handle.id());
            st.status = JobStatus::Running;
            true
        });
        if !running {
            // Stopped while the engine was loading.
            self.engines.terminate(&handle);
            return self.snapshot();
        }
        tracing::info!(job = job_id, handle = handle.id(), "job running");

        let result = self.transcode(job_id, &handle, &input);

        if let Err(err) = &result
            && !matches!(err, CompressError::Transcode(_))
            && self.status() == JobStatus::Running
        {
            // The engine itself misbehaved; do not reuse it for the next job.
            self.engines.terminate(&handle);
        }

        self.shared.update(|st| {
            if !st.is_current(job_id, JobStatus::Running) {
                return;
            }
            st.handle_id = None;
            match result {
                Ok(output) => {
                    tracing::info!(
                        job = job_id,
                        bytes = output.len(),
                        url = %output.url,
                        "job succeeded"
                    );
                    st.progress = 100;
                    st.output = Some(output);
                    st.status = JobStatus::Succeeded;
                }
                Err(err) => {
                    tracing::warn!(job = job_id, %err, "job failed");
                    st.logs
                        .push(LogEntry::error(format!("Error transcoding video: {err}")));
                    st.status = JobStatus::Failed;
                }
            }
        });
        self.snapshot()
    }

    fn transcode(
        &self,
        job_id: u64,
        handle: &EngineHandle,
        input: &InputFile,
    ) -> CompressResult<OutputVideo> {
        let cfg = &self.config;

        handle.delete_file(&cfg.output_name)?;
        handle.write_file(&cfg.input_name, &input.bytes)?;

        let code = handle.exec(&cfg.transcode_args())?;
        if code != 0 {
            return Err(CompressError::transcode(format!(
                "engine exited with code {code}"
            )));
        }

        match handle.read_file(&cfg.output_name)? {
            Some(bytes) if !bytes.is_empty() => {
                Ok(OutputVideo::for_job(job_id, cfg.output_mime.clone(), bytes))
            }
            Some(_) => Err(CompressError::transcode("engine produced an empty output")),
            None => Err(CompressError::transcode("engine produced no output")),
        }
    }

    /// Cancel the in-flight job by terminating the engine. Returns whether a job was stopped.
    pub fn stop(&self) -> bool {
        let stopped = {
            let mut st = lock(&self.shared.state);
            if !st.status.is_active() {
                false
            } else {
                tracing::info!(job = st.job_id, "job cancelled");
                st.status = JobStatus::Cancelled;
                st.handle_id = None;
                st.logs.push(LogEntry::info("Compression stopped"));
                true
            }
        };
        if !stopped {
            return false;
        }

        self.engines.release();
        self.shared.notify();
        true
    }
}
