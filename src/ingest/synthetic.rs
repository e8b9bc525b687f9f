//! Synthetic frame source (`stub://`).
//!
//! Query parameters shape the stream:
//! - `width`, `height`: frame size (default 640x480)
//! - `fps`: pace reads to this rate, 0 = unpaced (default 0)
//! - `fail_after`: reads after the first N fail (default never)
//! - `fail_open`: any value other than `0` makes `connect` fail

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use url::Url;

use crate::frame::{rgb_len, Frame};

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub fail_after: Option<u64>,
    pub fail_open: bool,
}

impl SyntheticConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("parse stub url {}", raw))?;
        let mut config = Self {
            name: url.host_str().unwrap_or("stub").to_string(),
            width: 640,
            height: 480,
            fps: 0,
            fail_after: None,
            fail_open: false,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "width" => config.width = parse_param(&key, &value)?,
                "height" => config.height = parse_param(&key, &value)?,
                "fps" => config.fps = parse_param(&key, &value)?,
                "fail_after" => config.fail_after = Some(parse_param(&key, &value)?),
                "fail_open" => config.fail_open = value != "0",
                other => log::warn!("SyntheticSource: ignoring unknown parameter {}", other),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub frame size must be non-zero"));
        }
        Ok(config)
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid stub parameter {}={}", key, value))
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    connected: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            config: SyntheticConfig::parse(url)?,
            frame_count: 0,
            connected: false,
            last_frame_at: None,
        })
    }

    /// Synthetic sources are always "connected" unless told otherwise.
    pub fn connect(&mut self) -> Result<()> {
        if self.config.fail_open {
            return Err(anyhow!("stub {} refused to open", self.config.name));
        }
        self.connected = true;
        log::debug!("SyntheticSource: connected to {}", self.config.name);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("stub {} is not connected", self.config.name));
        }
        if let Some(limit) = self.config.fail_after {
            if self.frame_count >= limit {
                return Err(anyhow!(
                    "stub {} stopped producing frames after {}",
                    self.config.name,
                    limit
                ));
            }
        }
        self.pace();

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let pixels = self.generate_pixels()?;
        Frame::new(pixels, self.config.width, self.config.height)
    }

    pub fn is_healthy(&self) -> bool {
        match self.config.fail_after {
            Some(limit) => self.connected && self.frame_count < limit,
            None => self.connected,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn stop(&mut self) {
        self.connected = false;
    }

    fn pace(&self) {
        if self.config.fps == 0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.config.fps as f64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
    }

    /// Horizontal gradient that drifts with the frame count.
    fn generate_pixels(&self) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; rgb_len(self.config.width, self.config.height)?];
        let width = self.config.width as usize;
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % width) as u64;
            let y = (i / width) as u64;
            px[0] = ((x + self.frame_count) % 256) as u8;
            px[1] = (y % 256) as u8;
            px[2] = ((x + y) % 256) as u8;
        }
        Ok(pixels)
    }
}
