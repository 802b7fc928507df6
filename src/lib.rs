#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod job;
pub mod stats;
pub mod telemetry;

pub use config::{CompressConfig, EngineAssets};
pub use controller::{JobController, JobObserver, progress_percent};
pub use engine::{
    Engine, EngineEvent, EngineFactory, EngineHandle, EngineManager, EngineState, EventSink,
    FfmpegEngine, FfmpegEngineFactory, HandleId,
};
pub use error::{CompressError, CompressResult};
pub use job::{InputFile, JobSnapshot, JobStatus, LogEntry, LogKind, OutputVideo};
pub use stats::{FpsStats, median};
pub use telemetry::{TelemetryField, TelemetryFields, parse_line};
