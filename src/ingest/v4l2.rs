//! V4L2 capture-device source.
//!
//! Device index `n` maps to `/dev/video{n}`. The source asks for RGB3 at the
//! configured size and accepts whatever the driver negotiates instead, as long
//! as `normalize` knows the pixel format.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::CameraConfig;
use crate::frame::Frame;

const HEALTH_GRACE: Duration = Duration::from_secs(2);

pub struct V4l2Source {
    device_path: String,
    config: CameraConfig,
    state: Option<V4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(index: u32, config: &CameraConfig) -> Self {
        Self {
            device_path: format!("/dev/video{}", index),
            active_width: config.width,
            active_height: config.height,
            active_format: PixelFormat::Rgb24,
            config: config.clone(),
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device_path)
            .with_context(|| format!("open v4l2 device {}", self.device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set RGB3 on {}: {}",
                    self.device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.active_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} negotiated unsupported pixel format {}",
                self.device_path,
                format.fourcc
            )
        })?;
        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        // Two buffers keep at most one stale frame between reads.
        let buffers = if self.config.low_latency { 2 } else { 4 };
        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, buffers)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::debug!(
            "V4l2Source: {} streaming {}x{} {:?}",
            self.device_path,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (width, height, format) = (self.active_width, self.active_height, self.active_format);
        let converted = state.with_mut(|fields| -> Result<(Vec<u8>, u32, u32)> {
            let (buf, meta) = fields
                .stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
            let used = (meta.bytesused as usize).min(buf.len());
            let data = if used == 0 { buf } else { &buf[..used] };
            normalize_to_rgb(data, width, height, format)
        });
        let (pixels, width, height) = converted.map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Frame::new(pixels, width, height)
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= HEALTH_GRACE
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    /// Dropping the stream stops capture and unmaps the buffers.
    pub fn stop(&mut self) {
        self.state = None;
    }
}
