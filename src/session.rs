//! Capture session records and the plain-text session log.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::source::CameraSource;

pub const LOG_FILE_NAME: &str = "capture_log.txt";
/// Timestamp embedded in image file names and session headers.
pub const FILE_TIMESTAMP_FORMAT: &str = "%d%m%Y_%H%M%S";
/// Timestamp used for log start / end times and per-file capture times.
pub const LOG_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// One image written during a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFile {
    pub camera_id: usize,
    pub camera_source: CameraSource,
    pub filename: String,
    pub captured_at: NaiveDateTime,
}

/// Everything one successful tick produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub counter: u64,
    pub timestamp: String,
    pub files: Vec<CapturedFile>,
}

/// Image file name for one camera in a tick. The camera ordinal is only
/// included when the session has more than one camera.
pub fn image_filename(counter: u64, camera_id: usize, camera_count: usize, timestamp: &str) -> String {
    if camera_count > 1 {
        format!("{}_camera{}_{}.jpg", counter, camera_id, timestamp)
    } else {
        format!("{}_{}.jpg", counter, timestamp)
    }
}

/// The summary written to `capture_log.txt` at shutdown.
pub struct CaptureLog<'a> {
    pub sources: &'a [CameraSource],
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub records: &'a [SessionRecord],
}

impl CaptureLog<'_> {
    pub fn total_images(&self) -> usize {
        self.records.iter().map(|record| record.files.len()).sum()
    }

    /// End minus start, clamped at zero if the wall clock stepped backwards.
    pub fn duration(&self) -> Option<TimeDelta> {
        let (start, end) = (self.started_at?, self.ended_at?);
        Some((end - start).max(TimeDelta::zero()))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "Capture Log")?;
        writeln!(out, "Number of Cameras: {}", self.sources.len())?;
        for (i, source) in self.sources.iter().enumerate() {
            writeln!(out, "Camera {}: {}", i + 1, source)?;
        }
        writeln!(out, "Start Time: {}", format_optional_time(self.started_at))?;
        writeln!(out, "End Time: {}", format_optional_time(self.ended_at))?;
        if let Some(duration) = self.duration() {
            writeln!(out, "Total Duration: {}", format_duration(duration))?;
        }
        writeln!(out, "Total Images Captured: {}", self.total_images())?;
        writeln!(out, "Captured Images:")?;
        for record in self.records {
            writeln!(
                out,
                "\n--- Capture Session {} at {} ---",
                record.counter, record.timestamp
            )?;
            for file in &record.files {
                writeln!(out, "Camera {} : {}", file.camera_id, file.filename)?;
            }
        }
        writeln!(out, "\nEnd of Log")
    }

    /// Write the log into `dir`, returning its path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(LOG_FILE_NAME);
        std::fs::write(&path, self.render())
            .with_context(|| format!("write capture log {}", path.display()))?;
        Ok(path)
    }
}

fn format_optional_time(time: Option<NaiveDateTime>) -> String {
    match time {
        Some(time) => time.format(LOG_TIMESTAMP_FORMAT).to_string(),
        None => "None".to_string(),
    }
}

/// `H:MM:SS`, with a `N day(s), ` prefix past 24 hours.
pub fn format_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let rest = total % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    fn record(counter: u64, cameras: usize) -> SessionRecord {
        let timestamp = format!("14032024_1000{:02}", counter);
        SessionRecord {
            counter,
            files: (1..=cameras)
                .map(|id| CapturedFile {
                    camera_id: id,
                    camera_source: CameraSource::Device(id as u32 - 1),
                    filename: image_filename(counter, id, cameras, &timestamp),
                    captured_at: at(10, 0, counter as u32),
                })
                .collect(),
            timestamp,
        }
    }

    #[test]
    fn filenames_include_camera_only_when_several() {
        assert_eq!(image_filename(3, 2, 2, "ts"), "3_camera2_ts.jpg");
        assert_eq!(image_filename(3, 1, 1, "ts"), "3_ts.jpg");
    }

    #[test]
    fn duration_formats_like_clock() {
        assert_eq!(format_duration(TimeDelta::seconds(6)), "0:00:06");
        assert_eq!(format_duration(TimeDelta::seconds(3_725)), "1:02:05");
        assert_eq!(format_duration(TimeDelta::seconds(86_400 + 61)), "1 day, 0:01:01");
        assert_eq!(format_duration(TimeDelta::seconds(2 * 86_400)), "2 days, 0:00:00");
    }

    #[test]
    fn log_totals_and_duration_match_records() {
        let sources = vec![CameraSource::Device(0), CameraSource::Device(1)];
        let records = vec![record(1, 2), record(2, 2), record(3, 2)];
        let log = CaptureLog {
            sources: &sources,
            started_at: Some(at(10, 0, 0)),
            ended_at: Some(at(10, 0, 6)),
            records: &records,
        };

        assert_eq!(log.total_images(), 6);
        assert_eq!(log.duration(), Some(TimeDelta::seconds(6)));

        let text = log.render();
        assert!(text.starts_with("Capture Log\nNumber of Cameras: 2\nCamera 1: 0\nCamera 2: 1\n"));
        assert!(text.contains("Start Time: 14-03-2024 10:00:00\n"));
        assert!(text.contains("End Time: 14-03-2024 10:00:06\n"));
        assert!(text.contains("Total Duration: 0:00:06\n"));
        assert!(text.contains("Total Images Captured: 6\n"));
        assert!(text.contains("\n--- Capture Session 2 at 14032024_100002 ---\n"));
        assert!(text.contains("Camera 2 : 3_camera2_14032024_100003.jpg\n"));
        assert!(text.ends_with("\nEnd of Log\n"));
    }

    #[test]
    fn backwards_clock_clamps_duration() {
        let log = CaptureLog {
            sources: &[],
            started_at: Some(at(10, 0, 5)),
            ended_at: Some(at(10, 0, 0)),
            records: &[],
        };
        assert_eq!(log.duration(), Some(TimeDelta::zero()));
    }

    #[test]
    fn missing_times_skip_duration() {
        let log = CaptureLog {
            sources: &[],
            started_at: None,
            ended_at: None,
            records: &[],
        };
        let text = log.render();
        assert!(text.contains("Start Time: None\n"));
        assert!(!text.contains("Total Duration"));
        assert!(text.contains("Total Images Captured: 0\n"));
    }

    #[test]
    fn writes_log_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sources = vec![CameraSource::Device(0)];
        let records = vec![record(1, 1)];
        let log = CaptureLog {
            sources: &sources,
            started_at: Some(at(9, 0, 0)),
            ended_at: Some(at(9, 0, 2)),
            records: &records,
        };
        let path = log.write(dir.path())?;
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(LOG_FILE_NAME));
        assert_eq!(std::fs::read_to_string(path)?, log.render());
        Ok(())
    }
}
