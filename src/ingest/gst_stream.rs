//! Network / URI stream source using GStreamer.
//!
//! `rtsp://` URLs go through `rtspsrc`; every other URI goes through
//! `uridecodebin`. Both decode to RGB and land in an appsink the capture loop
//! pulls from. In low-latency mode the appsink keeps a single buffer and drops
//! older ones, so each read returns the newest decoded frame.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// How long a read waits for a decoded sample before the stream counts as stalled.
const PULL_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_GRACE: Duration = Duration::from_secs(10);

pub struct GstreamerSource {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
}

impl GstreamerSource {
    pub fn new(url: &str, low_latency: bool) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = pipeline_description(url, low_latency);
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build stream pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("stream pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_sync(false);
        if low_latency {
            appsink.set_max_buffers(1);
            appsink.set_drop(true);
        }

        Ok(Self {
            url: url.to_string(),
            pipeline,
            appsink,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            last_error: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set stream pipeline to Playing")?;
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.poll_bus();
        if let Some(err) = &self.last_error {
            return Err(anyhow!("stream {} failed: {}", self.url, err));
        }

        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_nseconds(
                PULL_TIMEOUT.as_nanos() as u64,
            ))
            .ok_or_else(|| anyhow!("stream stalled: no frame within {:?}", PULL_TIMEOUT))?;

        let (pixels, width, height) = sample_to_pixels(&sample)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height)
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= PULL_TIMEOUT;
        };
        last_frame_at.elapsed() <= HEALTH_GRACE
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn stop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("GstreamerSource: failed to stop pipeline: {}", err);
        }
        self.connected_at = None;
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

impl Drop for GstreamerSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

fn pipeline_description(url: &str, low_latency: bool) -> String {
    let queue = if low_latency {
        "max-buffers=1 drop=true"
    } else {
        "max-buffers=4 drop=false"
    };
    if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
        let latency = if low_latency { 0 } else { 200 };
        format!(
            "rtspsrc location=\"{}\" latency={} ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! appsink name=appsink sync=false {}",
            url, latency, queue
        )
    } else {
        format!(
            "uridecodebin uri=\"{}\" ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false {}",
            url, queue
        )
    }
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("stream sample missing buffer")?;
    let caps = sample.caps().context("stream sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse stream caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map stream buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("stream buffer shorter than frame")?
            .to_vec();
        return Ok((pixels, width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("stream buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtsp_urls_use_rtspsrc_with_zero_latency() {
        let description = pipeline_description("rtsp://cam:554/live", true);
        assert!(description.starts_with("rtspsrc"));
        assert!(description.contains("latency=0"));
        assert!(description.contains("max-buffers=1 drop=true"));
    }

    #[test]
    fn other_uris_use_uridecodebin() {
        let description = pipeline_description("http://cam/video.mjpg", false);
        assert!(description.starts_with("uridecodebin"));
        assert!(description.contains("drop=false"));
    }
}
