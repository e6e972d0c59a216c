//! Pipeline stage workers.
//!
//! This crate provides:
//! - The generic claim/process/settle stage loop and its transition table
//! - Stages for description, conversion, spawning, scripting, scene
//!   extraction, narration and assembly (with scene expansion)
//! - Lease heartbeats and a sweeper for abandoned claims
//! - Request intake functions for an upload API
//! - Structured logging and Prometheus metrics

pub mod config;
pub mod context;
pub mod error;
pub mod intake;
pub mod lease;
pub mod logging;
pub mod metrics;
pub mod services;
pub mod stage;
pub mod stages;
pub mod transitions;

pub use config::{StoreBackend, WorkerConfig};
pub use context::{MediaPaths, WorkerContext};
pub use error::{WorkerError, WorkerResult};
pub use intake::{create_request, finalize_request, register_upload, NewFormat, NewVideoRequest};
pub use lease::LeaseSweeper;
pub use logging::RecordLogger;
pub use services::{AiService, FfmpegMedia, MediaService, ProviderAi};
pub use stage::{Outcome, Stage, StageRunner};
pub use transitions::StageSpec;
