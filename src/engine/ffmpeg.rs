use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context as _;

use crate::{
    config::EngineAssets,
    engine::{Engine, EngineEvent, EngineFactory, EventSink, lifecycle::lock},
    error::{CompressError, CompressResult},
    job::LogKind,
    telemetry,
};

pub fn is_program_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn is_ffmpeg_on_path() -> bool {
    is_program_available(Path::new("ffmpeg"))
}

/// Builds [`FfmpegEngine`]s that run `program` (the system `ffmpeg` by default).
#[derive(Clone, Debug)]
pub struct FfmpegEngineFactory {
    program: PathBuf,
}

impl FfmpegEngineFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegEngineFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn create(&self, events: EventSink) -> CompressResult<Box<dyn Engine>> {
        Ok(Box::new(FfmpegEngine::new(self.program.clone(), events)))
    }
}

/// Engine backed by the native `ffmpeg` binary.
///
/// Working storage is a private temporary directory created on load and removed on
/// terminate. Commands run inside it, so file names in the argument vector resolve there.
/// The engine's stderr is split into log events (`\r` and `\n` both end a line) and the
/// fractional progress is derived from the input `Duration:` header and `time=` fields.
pub struct FfmpegEngine {
    program: PathBuf,
    events: EventSink,
    workdir: Mutex<Option<tempfile::TempDir>>,
    child: Mutex<Option<Child>>,
    terminated: AtomicBool,
}

impl FfmpegEngine {
    pub fn new(program: PathBuf, events: EventSink) -> Self {
        Self {
            program,
            events,
            workdir: Mutex::new(None),
            child: Mutex::new(None),
            terminated: AtomicBool::new(false),
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn storage_dir(&self) -> CompressResult<PathBuf> {
        if self.is_terminated() {
            return Err(CompressError::cancelled("ffmpeg engine was terminated"));
        }
        lock(&self.workdir)
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .ok_or_else(|| CompressError::engine_not_ready("ffmpeg engine is not loaded"))
    }

    fn storage_path(&self, name: &str) -> CompressResult<PathBuf> {
        validate_storage_name(name)?;
        Ok(self.storage_dir()?.join(name))
    }

    fn kill_child(&self) {
        if let Some(child) = lock(&self.child).as_mut()
            && let Err(err) = child.kill()
        {
            tracing::debug!(%err, "ffmpeg child already exited");
        }
    }
}

impl Engine for FfmpegEngine {
    fn load(&self, assets: &EngineAssets) -> CompressResult<()> {
        if self.is_terminated() {
            return Err(CompressError::cancelled("ffmpeg engine was terminated"));
        }

        // Native ffmpeg carries its own codecs; the browser asset urls are only reported.
        tracing::debug!(
            core_url = %assets.core_url,
            wasm_url = %assets.wasm_url,
            program = %self.program.display(),
            "probing ffmpeg"
        );
        if !is_program_available(&self.program) {
            return Err(CompressError::engine(format!(
                "'{}' was not found or did not run (is ffmpeg installed and on PATH?)",
                self.program.display()
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("vidpress-")
            .tempdir()
            .context("create engine working directory")?;
        tracing::debug!(dir = %dir.path().display(), "engine storage ready");
        *lock(&self.workdir) = Some(dir);
        Ok(())
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> CompressResult<()> {
        let path = self.storage_path(name)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("write '{name}' to engine storage"))?;
        Ok(())
    }

    fn exec(&self, args: &[String]) -> CompressResult<i32> {
        let dir = self.storage_dir()?;

        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&dir)
            .args(["-nostdin", "-y"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::debug!(?args, "exec ffmpeg");
        let mut child = cmd
            .spawn()
            .map_err(|e| CompressError::engine(format!("failed to spawn ffmpeg: {e}")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompressError::engine("failed to open ffmpeg stderr (unexpected)"))?;

        {
            let mut slot = lock(&self.child);
            if self.is_terminated() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CompressError::cancelled("ffmpeg engine was terminated"));
            }
            *slot = Some(child);
        }

        let pumped = pump_stderr(stderr, &self.events);

        let status = match lock(&self.child).take() {
            Some(mut child) => child
                .wait()
                .map_err(|e| CompressError::engine(format!("failed to wait for ffmpeg: {e}")))?,
            None => return Err(CompressError::cancelled("ffmpeg engine was terminated")),
        };

        if self.is_terminated() {
            return Err(CompressError::cancelled("ffmpeg was terminated mid-command"));
        }
        pumped.map_err(|e| CompressError::engine(format!("ffmpeg stderr read failed: {e}")))?;

        let code = status.code().unwrap_or(-1);
        tracing::debug!(code, "ffmpeg exited");
        Ok(code)
    }

    fn read_file(&self, name: &str) -> CompressResult<Option<Vec<u8>>> {
        let path = self.storage_path(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("read '{name}' from engine storage"))
                .into()),
        }
    }

    fn delete_file(&self, name: &str) -> CompressResult<bool> {
        let path = self.storage_path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("delete '{name}' from engine storage"))
                .into()),
        }
    }

    fn terminate(&self) -> CompressResult<()> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.kill_child();
        if let Some(dir) = lock(&self.workdir).take()
            && let Err(err) = dir.close()
        {
            return Err(CompressError::engine(format!(
                "failed to remove engine working directory: {err}"
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}

fn validate_storage_name(name: &str) -> CompressResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CompressError::engine(format!(
            "invalid engine storage name '{name}'"
        )));
    }
    Ok(())
}

/// Turns the `Duration:` header and `time=` fields into a completed fraction.
#[derive(Debug, Default)]
struct ProgressTracker {
    total: Option<Duration>,
}

impl ProgressTracker {
    fn observe(&mut self, line: &str) -> Option<f64> {
        if self.total.is_none() {
            if let Some(total) = parse_duration_header(line) {
                self.total = Some(total).filter(|d| !d.is_zero());
            }
            return None;
        }

        let total = self.total?;
        let elapsed = telemetry::parse_line(line).time()?;
        Some((elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0))
    }
}

fn parse_duration_header(line: &str) -> Option<Duration> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    telemetry::parse_timestamp(stamp)
}

fn pump_stderr(mut stderr: impl Read, events: &EventSink) -> std::io::Result<()> {
    let mut tracker = ProgressTracker::default();
    let mut emit = |raw: &[u8]| {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let progress = tracker.observe(line);
        events(EngineEvent::log(LogKind::Stderr, line));
        if let Some(p) = progress {
            events(EngineEvent::progress(p));
        }
    };

    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &b in &chunk[..n] {
            if b == b'\n' || b == b'\r' {
                emit(&pending);
                pending.clear();
            } else {
                pending.push(b);
            }
        }
    }
    emit(&pending);
    Ok(())
}
