//! stream_snapshot - save a frame from one stream at a fixed interval
//!
//! Reads the stream continuously and writes `frame_NNNNN.jpg` every interval.
//! With the `preview-window` feature a live window is shown; `q`, `Esc`, or
//! closing it quits. Ctrl-C quits in every build.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use framegrab::config::{interval_from_secs, validate_jpeg_quality, FramegrabConfig};
use framegrab::preview::Preview;
use framegrab::snapshot::{RetryPolicy, SnapshotSettings, SnapshotStop, StreamSnapshotter};
use framegrab::source::CameraSource;
use framegrab::ui::{Ui, UiMode};

#[derive(Parser, Debug)]
#[command(author, version, about = "Save a frame from a video stream at a fixed interval")]
struct Args {
    /// Stream URL or device index
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Directory for saved frames
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Seconds between saved frames
    #[arg(long, value_name = "SECS")]
    interval: Option<f64>,

    /// JPEG quality (1-100)
    #[arg(long, value_name = "Q")]
    jpeg_quality: Option<u8>,

    /// Give up after this many consecutive read failures (default: retry forever)
    #[arg(long, value_name = "N")]
    max_failures: Option<u32>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());
    let config = FramegrabConfig::load()?;

    let source: CameraSource = match args.source {
        Some(raw) => raw.parse()?,
        None => config.snapshot.source.clone().ok_or_else(|| {
            anyhow!("no stream source: pass --source or set FRAMEGRAB_SNAPSHOT_SOURCE")
        })?,
    };
    let interval = match args.interval {
        Some(secs) => interval_from_secs(secs)
            .ok_or_else(|| anyhow!("--interval must be a non-negative number of seconds"))?,
        None => config.snapshot.interval,
    };
    let jpeg_quality = args.jpeg_quality.unwrap_or(config.jpeg_quality);
    validate_jpeg_quality(jpeg_quality)?;

    let settings = SnapshotSettings {
        output_dir: args.output_dir.unwrap_or(config.snapshot.output_dir),
        interval,
        jpeg_quality,
        retry: RetryPolicy {
            max_consecutive_failures: args
                .max_failures
                .or(config.snapshot.max_consecutive_failures),
            ..RetryPolicy::default()
        },
    };
    let output_dir = settings.output_dir.clone();

    let display_name = source.display_name();
    let mut snapshotter = {
        let stage = ui.stage("Open stream");
        match StreamSnapshotter::new(source, settings) {
            Ok(snapshotter) => snapshotter,
            Err(err) => {
                stage.fail();
                return Err(err);
            }
        }
    };

    let stop = snapshotter.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::Release);
    })
    .expect("error setting Ctrl-C handler");

    println!("Reading {}", display_name);
    println!(
        "Saving a frame every {}s to {}",
        interval.as_secs_f64(),
        output_dir.display()
    );

    let mut preview = make_preview(&display_name);
    let summary = snapshotter.run(preview.as_mut())?;

    match summary.stop {
        SnapshotStop::QuitKey => println!("Quit requested"),
        SnapshotStop::Stopped => println!("Interrupted"),
    }
    println!(
        "Saved {} frames ({} read, {} read failures)",
        summary.saved.len(),
        summary.frames_read,
        summary.read_failures
    );
    Ok(())
}

#[cfg(feature = "preview-window")]
fn make_preview(title: &str) -> Box<dyn Preview> {
    Box::new(framegrab::preview::WindowPreview::new(title))
}

#[cfg(not(feature = "preview-window"))]
fn make_preview(_title: &str) -> Box<dyn Preview> {
    println!("Press Ctrl-C to stop");
    Box::new(framegrab::preview::HeadlessPreview)
}
