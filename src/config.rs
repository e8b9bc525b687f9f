use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{DEFAULT_INTERVAL, DEFAULT_OUTPUT_DIR};
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::snapshot::{DEFAULT_SAVE_INTERVAL, DEFAULT_SNAPSHOT_DIR};
use crate::source::{parse_source_list, CameraSource};

const DEFAULT_SESSION_SOURCE: CameraSource = CameraSource::Device(0);

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FramegrabConfigFile {
    jpeg_quality: Option<u8>,
    session: Option<SessionConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    sources: Option<Vec<String>>,
    output_dir: Option<PathBuf>,
    interval_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotConfigFile {
    source: Option<String>,
    output_dir: Option<PathBuf>,
    interval_secs: Option<f64>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FramegrabConfig {
    pub jpeg_quality: u8,
    pub session: SessionSettings,
    pub snapshot: SnapshotStreamSettings,
}

/// Program A settings before prompts and CLI flags are applied.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub sources: Vec<CameraSource>,
    pub output_dir: PathBuf,
    pub interval: Duration,
}

/// Program B settings before CLI flags are applied.
#[derive(Debug, Clone)]
pub struct SnapshotStreamSettings {
    pub source: Option<CameraSource>,
    pub output_dir: PathBuf,
    pub interval: Duration,
    pub max_consecutive_failures: Option<u32>,
}

impl Default for FramegrabConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            session: SessionSettings {
                sources: vec![DEFAULT_SESSION_SOURCE],
                output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
                interval: DEFAULT_INTERVAL,
            },
            snapshot: SnapshotStreamSettings {
                source: None,
                output_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
                interval: DEFAULT_SAVE_INTERVAL,
                max_consecutive_failures: None,
            },
        }
    }
}

impl FramegrabConfig {
    /// Defaults, then the file named by `FRAMEGRAB_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAMEGRAB_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FramegrabConfigFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(quality) = file.jpeg_quality {
            cfg.jpeg_quality = quality;
        }
        if let Some(session) = file.session {
            if let Some(sources) = session.sources {
                cfg.session.sources = sources
                    .iter()
                    .map(|s| s.parse())
                    .collect::<Result<Vec<CameraSource>>>()?;
            }
            if let Some(dir) = session.output_dir {
                cfg.session.output_dir = dir;
            }
            if let Some(secs) = session.interval_secs {
                cfg.session.interval = parse_interval_secs("session.interval_secs", secs)?;
            }
        }
        if let Some(snapshot) = file.snapshot {
            if let Some(source) = snapshot.source {
                cfg.snapshot.source = Some(source.parse()?);
            }
            if let Some(dir) = snapshot.output_dir {
                cfg.snapshot.output_dir = dir;
            }
            if let Some(secs) = snapshot.interval_secs {
                cfg.snapshot.interval = parse_interval_secs("snapshot.interval_secs", secs)?;
            }
            cfg.snapshot.max_consecutive_failures = snapshot.max_consecutive_failures;
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(sources) = std::env::var("FRAMEGRAB_SOURCES") {
            let parsed = parse_source_list(&sources)?;
            if !parsed.is_empty() {
                self.session.sources = parsed;
            }
        }
        if let Ok(dir) = std::env::var("FRAMEGRAB_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.session.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(secs) = std::env::var("FRAMEGRAB_INTERVAL_SECS") {
            self.session.interval = parse_interval_env("FRAMEGRAB_INTERVAL_SECS", &secs)?;
        }
        if let Ok(source) = std::env::var("FRAMEGRAB_SNAPSHOT_SOURCE") {
            if !source.trim().is_empty() {
                self.snapshot.source = Some(source.parse()?);
            }
        }
        if let Ok(dir) = std::env::var("FRAMEGRAB_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(secs) = std::env::var("FRAMEGRAB_SNAPSHOT_INTERVAL_SECS") {
            self.snapshot.interval =
                parse_interval_env("FRAMEGRAB_SNAPSHOT_INTERVAL_SECS", &secs)?;
        }
        if let Ok(quality) = std::env::var("FRAMEGRAB_JPEG_QUALITY") {
            self.jpeg_quality = quality
                .trim()
                .parse()
                .map_err(|_| anyhow!("FRAMEGRAB_JPEG_QUALITY must be an integer 1-100"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_jpeg_quality(self.jpeg_quality)?;
        if self.session.sources.is_empty() {
            return Err(anyhow!("at least one session camera source is required"));
        }
        Ok(())
    }
}

pub fn validate_jpeg_quality(quality: u8) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(anyhow!("jpeg quality must be between 1 and 100, got {}", quality));
    }
    Ok(())
}

/// Interval in seconds; finite and not negative.
pub fn interval_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn parse_interval_secs(name: &str, secs: f64) -> Result<Duration> {
    interval_from_secs(secs)
        .ok_or_else(|| anyhow!("{} must be a non-negative number of seconds", name))
}

fn parse_interval_env(name: &str, value: &str) -> Result<Duration> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number of seconds", name))?;
    parse_interval_secs(name, secs)
}

fn read_config_file(path: &Path) -> Result<FramegrabConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
