//! The transcoding engine seam.
//!
//! An [`Engine`] is an opaque transcoder with private working storage. It is created by an
//! [`EngineFactory`] together with the [`EventSink`] it reports log and progress events to;
//! the sink is fixed for the engine's whole lifetime.

pub mod ffmpeg;
pub mod lifecycle;

use std::sync::Arc;

use crate::{config::EngineAssets, error::CompressResult, job::LogKind};

pub use ffmpeg::{FfmpegEngine, FfmpegEngineFactory};
pub use lifecycle::{EngineHandle, EngineManager, EngineState, HandleId};

/// Event emitted by an engine while it works.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Log { kind: LogKind, message: String },
    /// Fraction of the current command completed, nominally `0.0..=1.0`.
    Progress { progress: f64 },
}

impl EngineEvent {
    pub fn log(kind: LogKind, message: impl Into<String>) -> Self {
        Self::Log {
            kind,
            message: message.into(),
        }
    }

    pub fn progress(progress: f64) -> Self {
        Self::Progress { progress }
    }
}

pub type EventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Capability surface of an external transcoder.
///
/// Every method may be called from a different thread than the one that created the engine.
/// In particular [`Engine::terminate`] is called while [`Engine::exec`] is blocked and must
/// make it return promptly.
pub trait Engine: Send + Sync {
    /// Fetch/prepare whatever the engine needs before it can run commands.
    fn load(&self, assets: &EngineAssets) -> CompressResult<()>;

    fn write_file(&self, name: &str, bytes: &[u8]) -> CompressResult<()>;

    /// Run one command and return its exit code.
    fn exec(&self, args: &[String]) -> CompressResult<i32>;

    /// `Ok(None)` when the file does not exist in working storage.
    fn read_file(&self, name: &str) -> CompressResult<Option<Vec<u8>>>;

    /// Remove a file from working storage; returns whether it existed.
    fn delete_file(&self, name: &str) -> CompressResult<bool>;

    /// Stop everything immediately. Calling it more than once must be harmless.
    fn terminate(&self) -> CompressResult<()>;
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, events: EventSink) -> CompressResult<Box<dyn Engine>>;
}
