//! Frame ingestion sources.
//!
//! This module provides `Camera`, a handle over one of several backends:
//! - Synthetic `stub://` sources (tests, dry runs)
//! - Network / URI streams through GStreamer (feature: rtsp-gstreamer)
//! - Local capture devices through V4L2 (feature: ingest-v4l2)
//!
//! All backends produce RGB24 `Frame`s. A camera is opened once, read
//! sequentially by its owning thread, and released exactly once.

#[cfg(feature = "rtsp-gstreamer")]
mod gst_stream;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{Context, Result};

use crate::frame::Frame;
use crate::source::CameraSource;

#[cfg(feature = "rtsp-gstreamer")]
use self::gst_stream::GstreamerSource;
use self::synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use self::v4l2::V4l2Source;

/// Per-camera capture settings.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Keep at most one decoded frame queued so reads return the newest frame.
    pub low_latency: bool,
    /// Preferred frame width for devices that negotiate a format.
    pub width: u32,
    /// Preferred frame height for devices that negotiate a format.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            low_latency: false,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    /// Settings for `source`: network streams request minimal buffering.
    pub fn for_source(source: &CameraSource) -> Self {
        Self {
            low_latency: source.is_stream(),
            ..Self::default()
        }
    }
}

/// An open camera or stream.
pub struct Camera {
    id: usize,
    source: CameraSource,
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl Camera {
    /// Build the backend for `source` and connect to it.
    ///
    /// `id` is the 1-based ordinal used in file names and logs.
    pub fn open(id: usize, source: CameraSource, config: CameraConfig) -> Result<Self> {
        let mut backend = CameraBackend::new(&source, &config)?;
        backend
            .connect()
            .with_context(|| format!("could not open camera source {}", source))?;
        log::info!("camera {} connected ({})", id, source);
        Ok(Self {
            id,
            source,
            backend,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn source(&self) -> &CameraSource {
        &self.source
    }

    /// One throwaway read confirming the source actually produces frames.
    pub fn verify_liveness(&mut self) -> Result<()> {
        self.next_frame()
            .with_context(|| format!("could not read from camera source {}", self.source))?;
        Ok(())
    }

    /// Read the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "rtsp-gstreamer")]
            CameraBackend::Gstreamer(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "rtsp-gstreamer")]
            CameraBackend::Gstreamer(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        let frames_captured = match &self.backend {
            CameraBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "rtsp-gstreamer")]
            CameraBackend::Gstreamer(source) => source.frames_captured(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.frames_captured(),
        };
        CameraStats {
            frames_captured,
            source: self.source.display_name(),
        }
    }

    /// Stop the backend and drop the handle.
    pub fn release(mut self) {
        self.backend.stop();
        log::info!("camera {} released ({})", self.id, self.source);
    }
}

/// Statistics for a camera.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub source: String,
}

impl CameraBackend {
    fn new(source: &CameraSource, config: &CameraConfig) -> Result<Self> {
        match source {
            CameraSource::Stream(url) if source.is_stub() => {
                Ok(CameraBackend::Synthetic(SyntheticSource::new(url)?))
            }
            CameraSource::Stream(url) => {
                #[cfg(feature = "rtsp-gstreamer")]
                {
                    Ok(CameraBackend::Gstreamer(GstreamerSource::new(
                        url,
                        config.low_latency,
                    )?))
                }
                #[cfg(not(feature = "rtsp-gstreamer"))]
                {
                    let _ = (url, config);
                    anyhow::bail!(
                        "stream source {} requires the rtsp-gstreamer feature",
                        source
                    )
                }
            }
            CameraSource::Device(index) => {
                #[cfg(feature = "ingest-v4l2")]
                {
                    Ok(CameraBackend::V4l2(V4l2Source::new(*index, config)))
                }
                #[cfg(not(feature = "ingest-v4l2"))]
                {
                    let _ = config;
                    anyhow::bail!("capture device {} requires the ingest-v4l2 feature", index)
                }
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        match self {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "rtsp-gstreamer")]
            CameraBackend::Gstreamer(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.connect(),
        }
    }

    fn stop(&mut self) {
        match self {
            CameraBackend::Synthetic(source) => source.stop(),
            #[cfg(feature = "rtsp-gstreamer")]
            CameraBackend::Gstreamer(source) => source.stop(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.stop(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
