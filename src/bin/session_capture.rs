//! session_capture - timed multi-camera still capture
//!
//! Opens every configured camera, then saves one JPEG per camera each interval
//! until `Q` (or Ctrl-C). `P` pauses and resumes. A session log is written to
//! the output directory on exit.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::mpsc;

use framegrab::capture::{CaptureSettings, MultiCameraCapture, StopReason};
use framegrab::config::{interval_from_secs, validate_jpeg_quality, FramegrabConfig};
use framegrab::control::{
    print_controls, spawn_console_reader, spawn_listener, ConsoleControl, ConsoleInput, Controller,
};
use framegrab::prompt::Prompter;
use framegrab::source::CameraSource;
use framegrab::ui::{Ui, UiMode};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture stills from several cameras at a fixed interval")]
struct Args {
    /// Camera source: a device index or a stream URL. Repeat for several cameras.
    #[arg(long = "source", value_name = "SOURCE")]
    sources: Vec<String>,

    /// Directory for images and the session log
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Seconds between capture ticks
    #[arg(long, value_name = "SECS")]
    interval: Option<f64>,

    /// JPEG quality (1-100)
    #[arg(long, value_name = "Q")]
    jpeg_quality: Option<u8>,

    /// Use configured defaults instead of asking for missing settings
    #[arg(long)]
    no_prompt: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());
    let config = FramegrabConfig::load()?;

    let sources = if args.sources.is_empty() {
        config.session.sources.clone()
    } else {
        args.sources
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<CameraSource>>>()?
    };
    let jpeg_quality = args.jpeg_quality.unwrap_or(config.jpeg_quality);
    validate_jpeg_quality(jpeg_quality)?;

    let cli_interval = match args.interval {
        Some(secs) => Some(
            interval_from_secs(secs)
                .ok_or_else(|| anyhow!("--interval must be a non-negative number of seconds"))?,
        ),
        None => None,
    };

    // Ctrl-C and stdin share one channel: at a prompt an interrupt falls back
    // to defaults, during capture it quits.
    let (console_tx, console_rx) = mpsc::channel();
    let interrupt = console_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(ConsoleInput::Interrupted);
    })
    .expect("error setting Ctrl-C handler");
    spawn_console_reader(std::io::BufReader::new(std::io::stdin()), console_tx)?;

    let (output_dir, interval) = if args.no_prompt {
        (
            args.output_dir.unwrap_or(config.session.output_dir),
            cli_interval.unwrap_or(config.session.interval),
        )
    } else {
        let mut prompter = Prompter::new(&console_rx, std::io::stdout());
        let output_dir = match args.output_dir {
            Some(dir) => dir,
            None => prompter.output_dir(&config.session.output_dir),
        };
        let interval = match cli_interval {
            Some(interval) => interval,
            None => prompter.interval(config.session.interval),
        };
        (output_dir, interval)
    };

    let settings = CaptureSettings {
        output_dir,
        interval,
        jpeg_quality,
    };
    let mut capture = {
        let stage = ui.stage("Initialize cameras");
        match MultiCameraCapture::new(sources, settings) {
            Ok(capture) => capture,
            Err(err) => {
                stage.fail();
                return Err(err);
            }
        }
    };

    println!();
    println!("Saving images to {}", capture.output_dir().display());
    for (index, source) in capture.sources().iter().enumerate() {
        println!("  camera {}: {}", index + 1, source.display_name());
    }
    println!("Capturing every {}s", interval.as_secs_f64());
    print_controls(&mut std::io::stdout())?;
    println!();

    let (sender, mut controller) = Controller::channel();
    spawn_listener(Box::new(ConsoleControl::new(console_rx)), sender)?;

    let summary = capture.run(&mut controller);

    println!();
    println!(
        "Captured {} images over {} ticks",
        summary.images, summary.ticks
    );
    for (index, camera) in summary.cameras.iter().enumerate() {
        println!(
            "  camera {}: {} frames read ({})",
            index + 1,
            camera.frames_captured,
            camera.source
        );
    }
    match (&summary.log_path, &summary.log_error) {
        (Some(path), _) => println!("Log file created at {}", path.display()),
        (None, Some(err)) => println!("Error creating log file: {}", err),
        (None, None) => {}
    }

    match summary.stop_reason {
        StopReason::QuitRequested => Ok(()),
        StopReason::CaptureFailed(err) => Err(anyhow!("capture stopped: {}", err)),
    }
}
