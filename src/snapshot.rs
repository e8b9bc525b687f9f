//! Single-stream screenshot saver.
//!
//! `StreamSnapshotter` reads one stream continuously, hands every frame to a
//! `Preview`, and saves a frame whenever a full interval has passed since the
//! previous save. Files are numbered `frame_00000.jpg`, `frame_00001.jpg`, ...
//! continuing after any frames already present in the output directory.
//!
//! Read failures are retried with a warning; by default forever.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::ingest::{Camera, CameraConfig};
use crate::preview::{Preview, PreviewAction};
use crate::source::CameraSource;

pub const DEFAULT_SNAPSHOT_DIR: &str = "helmet";
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

const FRAME_PREFIX: &str = "frame_";
const FRAME_SUFFIX: &str = ".jpg";

/// What to do when a read fails.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Give up after this many failures in a row; `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: None,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SnapshotSettings {
    pub output_dir: PathBuf,
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub retry: RetryPolicy,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            interval: DEFAULT_SAVE_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Decides when the next frame is due. The first save comes one interval after start.
#[derive(Clone, Debug)]
pub struct SaveSchedule {
    interval: Duration,
    last_save: Instant,
}

impl SaveSchedule {
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last_save: start,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_save) >= self.interval
    }

    pub fn mark_saved(&mut self, now: Instant) {
        self.last_save = now;
    }
}

pub fn snapshot_filename(index: u64) -> String {
    format!("{}{:05}{}", FRAME_PREFIX, index, FRAME_SUFFIX)
}

/// First index after every `frame_NNNNN.jpg` already in `dir`.
pub fn next_free_index(dir: &Path) -> Result<u64> {
    let mut next = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let index = name
            .strip_prefix(FRAME_PREFIX)
            .and_then(|rest| rest.strip_suffix(FRAME_SUFFIX))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(index) = index {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}

/// How the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotStop {
    /// The preview reported the quit key or a closed window.
    QuitKey,
    /// The stop flag was raised (Ctrl-C).
    Stopped,
}

#[derive(Clone, Debug)]
pub struct SnapshotSummary {
    pub frames_read: u64,
    pub saved: Vec<PathBuf>,
    pub read_failures: u64,
    pub stop: SnapshotStop,
}

pub struct StreamSnapshotter {
    camera: Option<Camera>,
    settings: SnapshotSettings,
    stop: Arc<AtomicBool>,
    next_index: u64,
}

impl StreamSnapshotter {
    /// Create the output directory and open the stream. Failure to open is fatal.
    pub fn new(source: CameraSource, settings: SnapshotSettings) -> Result<Self> {
        std::fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!(
                "create output directory {}",
                settings.output_dir.display()
            )
        })?;
        let next_index = next_free_index(&settings.output_dir)?;
        let config = CameraConfig::for_source(&source);
        let camera = Camera::open(1, source, config)?;
        Ok(Self {
            camera: Some(camera),
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            next_index,
        })
    }

    /// Raising this flag ends the loop after the current iteration.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run until quit or stop, then release the stream.
    pub fn run(&mut self, preview: &mut dyn Preview) -> Result<SnapshotSummary> {
        let mut camera = self
            .camera
            .take()
            .ok_or_else(|| anyhow!("stream already released"))?;
        let result = self.run_with(&mut camera, preview);
        camera.release();
        result
    }

    fn run_with(&mut self, camera: &mut Camera, preview: &mut dyn Preview) -> Result<SnapshotSummary> {
        let mut schedule = SaveSchedule::new(self.settings.interval, Instant::now());
        let mut summary = SnapshotSummary {
            frames_read: 0,
            saved: Vec::new(),
            read_failures: 0,
            stop: SnapshotStop::Stopped,
        };
        let mut consecutive_failures = 0u32;
        let mut last_health_log = Instant::now();

        loop {
            if self.stop.load(Ordering::Acquire) {
                summary.stop = SnapshotStop::Stopped;
                break;
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = camera.stats();
                log::info!(
                    "stream health={} frames={} source={}",
                    camera.is_healthy(),
                    stats.frames_captured,
                    stats.source
                );
                last_health_log = Instant::now();
            }

            let frame = match camera.next_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    frame
                }
                Err(err) => {
                    consecutive_failures += 1;
                    summary.read_failures += 1;
                    log::warn!("failed to grab frame, retrying: {:#}", err);
                    if let Some(max) = self.settings.retry.max_consecutive_failures {
                        if consecutive_failures >= max {
                            return Err(err.context(format!(
                                "stream failed {} times in a row",
                                consecutive_failures
                            )));
                        }
                    }
                    std::thread::sleep(self.settings.retry.delay);
                    continue;
                }
            };
            summary.frames_read += 1;

            let now = Instant::now();
            if schedule.is_due(now) {
                let path = self
                    .settings
                    .output_dir
                    .join(snapshot_filename(self.next_index));
                frame.write_jpeg(&path, self.settings.jpeg_quality)?;
                log::info!("saved {}", path.display());
                self.next_index += 1;
                schedule.mark_saved(now);
                summary.saved.push(path);
            }

            if preview.show(&frame)? == PreviewAction::Quit {
                summary.stop = SnapshotStop::QuitKey;
                break;
            }
        }

        log::info!(
            "stream snapshot stopped: {} frames read, {} saved, {} read failures",
            summary.frames_read,
            summary.saved.len(),
            summary.read_failures
        );
        Ok(summary)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
