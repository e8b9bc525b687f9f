//! Multi-camera session capture.
//!
//! `MultiCameraCapture` owns every camera of a session. Each tick reads one
//! frame per camera in source order and only then writes the images, so a read
//! failure leaves no files behind for that tick. The first failure ends the
//! session; the log is still written on the way out.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime, SubsecRound};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::{Controller, WaitOutcome};
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::ingest::{Camera, CameraConfig, CameraStats};
use crate::session::{image_filename, CaptureLog, CapturedFile, SessionRecord, FILE_TIMESTAMP_FORMAT};
use crate::source::CameraSource;

pub const DEFAULT_OUTPUT_DIR: &str = "captured_images";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub output_dir: PathBuf,
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            interval: DEFAULT_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Why a capture run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Quit command, Ctrl-C, or closed console input.
    QuitRequested,
    /// A camera read or image write failed mid-session.
    CaptureFailed(String),
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub ticks: u64,
    pub images: usize,
    pub stop_reason: StopReason,
    pub log_path: Option<PathBuf>,
    pub log_error: Option<String>,
    /// Per-camera read counts, in source order, taken just before release.
    pub cameras: Vec<CameraStats>,
}

pub struct MultiCameraCapture {
    settings: CaptureSettings,
    sources: Vec<CameraSource>,
    cameras: Vec<Camera>,
    next_counter: u64,
    records: Vec<SessionRecord>,
    started_at: Option<NaiveDateTime>,
    ended_at: Option<NaiveDateTime>,
}

impl MultiCameraCapture {
    /// Create the output directory, then open and liveness-check every source.
    ///
    /// Any failure releases the cameras opened so far and aborts startup.
    pub fn new(sources: Vec<CameraSource>, settings: CaptureSettings) -> Result<Self> {
        if sources.is_empty() {
            return Err(anyhow!("at least one camera source is required"));
        }
        std::fs::create_dir_all(&settings.output_dir).with_context(|| {
            format!(
                "create output directory {}",
                settings.output_dir.display()
            )
        })?;

        log::info!("initializing {} camera(s)...", sources.len());
        let mut cameras: Vec<Camera> = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            let id = i + 1;
            log::info!("connecting to camera {} at source {}...", id, source);
            match open_verified(id, source) {
                Ok(camera) => cameras.push(camera),
                Err(err) => {
                    for camera in cameras.drain(..) {
                        camera.release();
                    }
                    return Err(err);
                }
            }
        }
        log::info!("all cameras initialized successfully");

        Ok(Self {
            settings,
            sources,
            cameras,
            next_counter: 1,
            records: Vec::new(),
            started_at: None,
            ended_at: None,
        })
    }

    pub fn sources(&self) -> &[CameraSource] {
        &self.sources
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    /// Counter the next successful tick will use.
    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }

    /// Stamp the session start time (once).
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(now_seconds());
            log::info!("starting image capture...");
        }
    }

    /// Read one frame from every camera, then write them all.
    ///
    /// On any failure nothing from this tick remains on disk and the counter
    /// does not move.
    pub fn capture_tick(&mut self) -> Result<SessionRecord> {
        if self.cameras.is_empty() {
            return Err(anyhow!("capture session already finished"));
        }
        let timestamp = Local::now().format(FILE_TIMESTAMP_FORMAT).to_string();

        let mut frames: Vec<Frame> = Vec::with_capacity(self.cameras.len());
        for camera in &mut self.cameras {
            match camera.next_frame() {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    log::error!("failed to capture from camera {}: {:#}", camera.id(), err);
                    return Err(err.context(format!("failed to capture from camera {}", camera.id())));
                }
            }
        }

        let counter = self.next_counter;
        let camera_count = self.cameras.len();
        let mut written: Vec<PathBuf> = Vec::with_capacity(camera_count);
        let mut files = Vec::with_capacity(camera_count);
        for (camera, frame) in self.cameras.iter().zip(&frames) {
            let filename = image_filename(counter, camera.id(), camera_count, &timestamp);
            let path = self.settings.output_dir.join(&filename);
            if let Err(err) = frame.write_jpeg(&path, self.settings.jpeg_quality) {
                log::error!("failed to save image from camera {}: {:#}", camera.id(), err);
                discard(&written);
                return Err(err);
            }
            log::info!("captured from camera {}: {}", camera.id(), filename);
            written.push(path);
            files.push(CapturedFile {
                camera_id: camera.id(),
                camera_source: camera.source().clone(),
                filename,
                captured_at: frame.captured_at.naive_local().trunc_subsecs(0),
            });
        }

        let record = SessionRecord {
            counter,
            timestamp,
            files,
        };
        self.records.push(record.clone());
        self.next_counter += 1;
        Ok(record)
    }

    /// Capture until quit or failure, then release cameras and write the log.
    pub fn run(&mut self, controller: &mut Controller) -> RunSummary {
        self.start();
        let stop_reason = loop {
            if controller.block_while_paused() == WaitOutcome::Quit || controller.quit_requested() {
                break StopReason::QuitRequested;
            }
            if let Err(err) = self.capture_tick() {
                break StopReason::CaptureFailed(format!("{:#}", err));
            }
            if controller.wait(self.settings.interval) == WaitOutcome::Quit {
                break StopReason::QuitRequested;
            }
        };
        self.finish(stop_reason)
    }

    /// Release every camera, stamp the end time, and write the session log.
    ///
    /// A log-writing failure is reported in the summary, never returned.
    pub fn finish(&mut self, stop_reason: StopReason) -> RunSummary {
        self.start();
        self.ended_at = Some(now_seconds());
        let mut cameras = Vec::with_capacity(self.cameras.len());
        for camera in self.cameras.drain(..) {
            cameras.push(camera.stats());
            camera.release();
        }

        let log = CaptureLog {
            sources: &self.sources,
            started_at: self.started_at,
            ended_at: self.ended_at,
            records: &self.records,
        };
        let images = log.total_images();
        let (log_path, log_error) = match log.write(&self.settings.output_dir) {
            Ok(path) => {
                log::info!("log file created at {}", path.display());
                (Some(path), None)
            }
            Err(err) => {
                log::error!("error creating log file: {:#}", err);
                (None, Some(format!("{:#}", err)))
            }
        };

        RunSummary {
            cameras,
            ticks: self.records.len() as u64,
            images,
            stop_reason,
            log_path,
            log_error,
        }
    }
}

fn open_verified(id: usize, source: &CameraSource) -> Result<Camera> {
    let mut camera = Camera::open(id, source.clone(), CameraConfig::for_source(source))?;
    if let Err(err) = camera.verify_liveness() {
        camera.release();
        return Err(err);
    }
    Ok(camera)
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = std::fs::remove_file(path) {
            log::warn!("could not remove partial image {}: {}", path.display(), err);
        }
    }
}

fn now_seconds() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path) -> CaptureSettings {
        CaptureSettings {
            output_dir: dir.to_path_buf(),
            interval: Duration::from_millis(10),
            jpeg_quality: 80,
        }
    }

    fn stub(url: &str) -> CameraSource {
        CameraSource::Stream(url.to_string())
    }

    fn jpeg_count(dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jpg") {
                count += 1;
            }
        }
        Ok(count)
    }

    #[test]
    fn empty_source_list_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(MultiCameraCapture::new(Vec::new(), settings(dir.path())).is_err());
        Ok(())
    }

    #[test]
    fn startup_fails_when_any_camera_is_dead() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sources = vec![
            stub("stub://ok?width=16&height=16"),
            stub("stub://dead?width=16&height=16&fail_after=0"),
        ];
        let err = match MultiCameraCapture::new(sources, settings(dir.path())) {
            Ok(_) => panic!("startup must fail"),
            Err(err) => format!("{:#}", err),
        };
        assert!(err.contains("could not read from camera source stub://dead"));
        Ok(())
    }

    #[test]
    fn single_camera_names_omit_camera_ordinal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut capture = MultiCameraCapture::new(
            vec![stub("stub://solo?width=16&height=16")],
            settings(dir.path()),
        )?;
        let record = capture.capture_tick()?;
        assert_eq!(record.counter, 1);
        assert!(record.files[0].filename.starts_with("1_"));
        assert!(!record.files[0].filename.contains("camera"));
        Ok(())
    }

    #[test]
    fn failed_tick_writes_nothing_and_keeps_counter() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // Liveness read + one good tick, then the second camera dies.
        let sources = vec![
            stub("stub://a?width=16&height=16"),
            stub("stub://b?width=16&height=16&fail_after=2"),
        ];
        let mut capture = MultiCameraCapture::new(sources, settings(dir.path()))?;
        capture.capture_tick()?;
        assert_eq!(jpeg_count(dir.path())?, 2);

        assert!(capture.capture_tick().is_err());
        assert_eq!(jpeg_count(dir.path())?, 2);
        assert_eq!(capture.next_counter(), 2);
        assert_eq!(capture.records().len(), 1);
        Ok(())
    }

    #[test]
    fn write_failure_removes_partial_tick() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sources = vec![
            stub("stub://a?width=16&height=16"),
            stub("stub://b?width=16&height=16"),
        ];
        let mut capture = MultiCameraCapture::new(sources, settings(dir.path()))?;

        // Occupy camera 2's file name for this second so create-new fails.
        let timestamp = Local::now().format(FILE_TIMESTAMP_FORMAT).to_string();
        let blocker = dir.path().join(image_filename(1, 2, 2, &timestamp));
        std::fs::create_dir(&blocker)?;

        if capture.capture_tick().is_ok() {
            // The clock ticked over between our timestamp and the capture's.
            return Ok(());
        }
        assert_eq!(jpeg_count(dir.path())?, 0);
        assert_eq!(capture.next_counter(), 1);
        Ok(())
    }

    #[test]
    fn finish_releases_cameras_and_blocks_further_ticks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut capture = MultiCameraCapture::new(
            vec![stub("stub://solo?width=16&height=16")],
            settings(dir.path()),
        )?;
        capture.capture_tick()?;
        let summary = capture.finish(StopReason::QuitRequested);
        assert_eq!(summary.ticks, 1);
        assert_eq!(summary.images, 1);
        assert!(summary.log_path.is_some());
        assert!(capture.capture_tick().is_err());
        Ok(())
    }

    #[test]
    fn run_stops_on_capture_failure_and_still_logs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sources = vec![stub("stub://flaky?width=16&height=16&fail_after=3")];
        let mut capture = MultiCameraCapture::new(sources, settings(dir.path()))?;
        let (_sender, mut controller) = Controller::channel();

        let summary = capture.run(&mut controller);
        assert!(matches!(summary.stop_reason, StopReason::CaptureFailed(_)));
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.images, 2);
        // Liveness read plus two ticks; the failed read is not counted.
        assert_eq!(summary.cameras.len(), 1);
        assert_eq!(summary.cameras[0].frames_captured, 3);
        let log = std::fs::read_to_string(summary.log_path.unwrap())?;
        assert!(log.contains("Total Images Captured: 2\n"));
        Ok(())
    }
}
