use std::{path::Path, sync::Arc};

use anyhow::Context as _;

use crate::error::CompressResult;

/// Lifecycle of a compression job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Initializing,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// A job is in flight from the moment the engine is requested until it ends.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Initializing | JobStatus::Running)
    }
}

/// Origin of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Stdout,
    Stderr,
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, message)
    }

    pub fn is_error(&self) -> bool {
        self.kind == LogKind::Error
    }
}

/// A user-selected video, held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn open(path: &Path) -> CompressResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read input video '{}'", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }
}

/// Compressed result, addressable by an object-style URL.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct OutputVideo {
    pub url: String,
    pub mime: String,
    #[serde(rename = "size_bytes", serialize_with = "serialize_len")]
    pub bytes: Arc<[u8]>,
}

impl OutputVideo {
    pub fn for_job(job_id: u64, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            url: format!("blob:vidpress/job-{job_id}"),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn serialize_len<S: serde::Serializer>(bytes: &Arc<[u8]>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(bytes.len() as u64)
}

/// Point-in-time copy of the controller's job state.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct JobSnapshot {
    pub job_id: u64,
    pub status: JobStatus,
    pub input_name: Option<String>,
    /// Whole percent, 0..=100.
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    pub median_fps: Option<f64>,
    pub output: Option<OutputVideo>,
}

impl JobSnapshot {
    /// Drives the Compress/Stop toggle; independent of earlier failures.
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    pub fn error_count(&self) -> usize {
        self.logs.iter().filter(|l| l.is_error()).count()
    }
}
