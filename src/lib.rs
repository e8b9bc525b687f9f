//! framegrab
//!
//! Periodic still-image capture from local cameras and network video streams.
//!
//! Two programs are built on this crate:
//!
//! - `session_capture`: a timed multi-camera capture session. Every tick grabs one
//!   frame per camera and saves them as JPEGs under a shared counter; the console
//!   can pause, resume, or quit, and a plain-text session log is written on exit.
//! - `stream_snapshot`: one stream read continuously, with a frame saved at a
//!   fixed wall-clock interval as `frame_NNNNN.jpg` and an optional live preview.
//!
//! # Module Structure
//!
//! - `source`: camera source identifiers (device index or stream URL)
//! - `frame`: decoded RGB frames and JPEG output
//! - `ingest`: camera backends (synthetic `stub://`, GStreamer, V4L2)
//! - `control`: pause / resume / quit commands and the controller state machine
//! - `session`: image naming, session records, and the capture log
//! - `capture`: the multi-camera capture session
//! - `snapshot`: the interval-based stream snapshotter
//! - `preview`: live display for the snapshotter
//! - `config`, `prompt`, `ui`: settings, interactive prompts, and console stages

pub mod capture;
pub mod config;
pub mod control;
pub mod frame;
pub mod ingest;
pub mod preview;
pub mod prompt;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod ui;

pub use capture::{CaptureSettings, MultiCameraCapture, RunSummary, StopReason};
pub use config::FramegrabConfig;
pub use control::{Command, ControlSource, Controller};
pub use frame::Frame;
pub use ingest::{Camera, CameraConfig};
pub use preview::{Preview, PreviewAction};
pub use snapshot::{SnapshotSettings, SnapshotSummary, StreamSnapshotter};
pub use source::CameraSource;
